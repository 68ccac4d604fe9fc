use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Enriched attributes copied from each lookup result, in column order.
pub const FIELDS: [&str; 12] = [
    "country",
    "region",
    "admin_district",
    "admin_county",
    "admin_ward",
    "parish",
    "parliamentary_constituency",
    "european_electoral_region",
    "primary_care_trust",
    "ccg",
    "latitude",
    "longitude",
];

pub const POSTCODE_FIELD: &str = "postcode";

/// `["postcode", ...FIELDS]`, shared by the preview table and the CSV export.
pub fn header() -> Vec<&'static str> {
    std::iter::once(POSTCODE_FIELD)
        .chain(FIELDS.iter().copied())
        .collect()
}

/// A UK postcode in canonical form (`SW1A 1AA`).
///
/// Only the normalizer builds these, so every value is uppercase and unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PostalCode(String);

impl PostalCode {
    pub(crate) fn new_unchecked(canonical: String) -> Self {
        Self(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PostalCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One element of a bulk lookup response.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Matched {
        query: String,
        fields: serde_json::Map<String, serde_json::Value>,
    },
    Unmatched {
        query: String,
    },
}

impl LookupOutcome {
    pub fn query(&self) -> &str {
        match self {
            LookupOutcome::Matched { query, .. } | LookupOutcome::Unmatched { query } => query,
        }
    }
}

/// A flattened lookup result keyed by column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRow {
    data: HashMap<String, String>,
}

impl EnrichedRow {
    pub fn from_outcome(outcome: &LookupOutcome) -> Self {
        let mut data = HashMap::with_capacity(FIELDS.len() + 1);

        match outcome {
            LookupOutcome::Matched { query, fields } => {
                let postcode = fields
                    .get(POSTCODE_FIELD)
                    .map(json_to_cell)
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| query.clone());
                data.insert(POSTCODE_FIELD.to_string(), postcode.to_uppercase());

                for field in FIELDS {
                    let value = fields.get(field).map(json_to_cell).unwrap_or_default();
                    data.insert(field.to_string(), value);
                }
            }
            LookupOutcome::Unmatched { query } => {
                data.insert(POSTCODE_FIELD.to_string(), query.to_uppercase());
                for field in FIELDS {
                    data.insert(field.to_string(), String::new());
                }
            }
        }

        Self { data }
    }

    #[cfg(test)]
    pub(crate) fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.data.get(field).map(String::as_str)
    }

    pub fn postcode(&self) -> &str {
        self.get(POSTCODE_FIELD).unwrap_or_default()
    }

    /// Values in `header` order, empty for missing columns.
    pub fn values<'a>(&'a self, header: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
        header.iter().map(move |h| self.get(h).unwrap_or_default())
    }
}

fn json_to_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matched(query: &str, result: serde_json::Value) -> LookupOutcome {
        LookupOutcome::Matched {
            query: query.to_string(),
            fields: result.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_header_order() {
        let header = header();
        assert_eq!(header.len(), 13);
        assert_eq!(header[0], "postcode");
        assert_eq!(header[1], "country");
        assert_eq!(header[12], "longitude");
    }

    #[test]
    fn test_matched_row_flattens_fields() {
        let outcome = matched(
            "sw1a 1aa",
            json!({
                "postcode": "SW1A 1AA",
                "country": "England",
                "region": "London",
                "parish": null,
                "latitude": 51.501009,
                "longitude": -0.141588
            }),
        );

        let row = EnrichedRow::from_outcome(&outcome);

        assert_eq!(row.postcode(), "SW1A 1AA");
        assert_eq!(row.get("country"), Some("England"));
        assert_eq!(row.get("parish"), Some(""));
        assert_eq!(row.get("admin_ward"), Some(""));
        assert_eq!(row.get("latitude"), Some("51.501009"));
        assert_eq!(row.get("longitude"), Some("-0.141588"));
    }

    #[test]
    fn test_matched_without_postcode_uses_query() {
        let row = EnrichedRow::from_outcome(&matched("ec1a 1bb", json!({"country": "England"})));
        assert_eq!(row.postcode(), "EC1A 1BB");
    }

    #[test]
    fn test_unmatched_row_keeps_query() {
        let row = EnrichedRow::from_outcome(&LookupOutcome::Unmatched {
            query: "zz9 9zz".to_string(),
        });

        assert_eq!(row.postcode(), "ZZ9 9ZZ");
        for field in FIELDS {
            assert_eq!(row.get(field), Some(""));
        }
    }

    #[test]
    fn test_values_follow_header() {
        let row = EnrichedRow::from_pairs([("postcode", "AB1 2CD"), ("country", "Scotland")]);
        let header = ["country", "missing", "postcode"];
        let values: Vec<&str> = row.values(&header).collect();
        assert_eq!(values, vec!["Scotland", "", "AB1 2CD"]);
    }
}
