pub mod controller;
pub mod csv_export;
pub mod enricher;
pub mod normalizer;
pub mod retry;
pub mod table;

pub use crate::domain::model::{EnrichedRow, LookupOutcome, PostalCode};
pub use crate::domain::ports::{ConfigProvider, LookupClient, Sleeper, StatusSink, Storage};
pub use crate::utils::error::Result;
