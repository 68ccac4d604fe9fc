pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig};

pub use adapters::http::HttpLookupClient;
pub use config::Settings;
pub use crate::core::{
    controller::{AppState, Controller, Phase, RunOutcome},
    enricher::BatchEnricher,
    retry::RetryPolicy,
};
pub use domain::artifact::{ArtifactStore, MemoryArtifactStore};
pub use utils::error::{EnrichError, Result};
