use crate::domain::model::EnrichedRow;
use chrono::{DateTime, Utc};
use std::borrow::Cow;

pub const CSV_CONTENT_TYPE: &str = "text/csv;charset=utf-8";

/// Quotes a value when it contains a comma, a double quote or a line break.
pub fn escape(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Serializes every row (no preview cap). Header names are written as-is,
/// lines are joined with `\n` and there is no trailing newline.
pub fn to_csv(rows: &[EnrichedRow], header: &[&str]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header.join(","));

    for row in rows {
        let line: Vec<Cow<'_, str>> = row.values(header).map(escape).collect();
        lines.push(line.join(","));
    }

    lines.join("\n")
}

/// `postcodes_enriched_2024-05-01T09-30-00.csv`
pub fn artifact_file_name(completed_at: DateTime<Utc>) -> String {
    format!(
        "postcodes_enriched_{}.csv",
        completed_at.format("%Y-%m-%dT%H-%M-%S")
    )
}
