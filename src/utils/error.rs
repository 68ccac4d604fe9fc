use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API responded with status {status}")]
    HttpStatus { status: u16 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Batch {first}-{last} failed after {attempts} attempts: {last_error}")]
    BatchExhausted {
        first: usize,
        last: usize,
        attempts: u32,
        last_error: String,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Artifact {handle} has been released")]
    ArtifactReleased { handle: String },
}

impl EnrichError {
    /// 單批次失敗是否可以重試
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EnrichError::ApiError(_) | EnrichError::HttpStatus { .. } | EnrichError::SerializationError(_)
        )
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EnrichError::BatchExhausted { .. } => {
                "Lookup failed. Please try again in a moment.".to_string()
            }
            EnrichError::ApiError(_) | EnrichError::HttpStatus { .. } => {
                "The postcode lookup service could not be reached.".to_string()
            }
            EnrichError::IoError(e) => format!("Could not read or write a file: {}", e),
            EnrichError::SerializationError(_) => {
                "The lookup service returned an unexpected response.".to_string()
            }
            EnrichError::ConfigError { message } => format!("Configuration problem: {}", message),
            EnrichError::InvalidConfigValue { field, reason, .. } => {
                format!("Invalid setting '{}': {}", field, reason)
            }
            EnrichError::ArtifactReleased { .. } => {
                "The previous export is no longer available. Run again to regenerate it."
                    .to_string()
            }
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EnrichError::BatchExhausted { .. }
            | EnrichError::ApiError(_)
            | EnrichError::HttpStatus { .. } => {
                "Check your network connection or raise --max-attempts / --backoff-ms"
            }
            EnrichError::SerializationError(_) => "Verify that --api-endpoint points at a bulk postcode lookup",
            EnrichError::IoError(_) => "Check that the input file exists and the output path is writable",
            EnrichError::ConfigError { .. } | EnrichError::InvalidConfigValue { .. } => {
                "Fix the flag or config file value and run again"
            }
            EnrichError::ArtifactReleased { .. } => "Run the enrichment again",
        }
    }

    /// 對應 CLI 退出碼
    pub fn exit_code(&self) -> i32 {
        match self {
            EnrichError::ConfigError { .. } | EnrichError::InvalidConfigValue { .. } => 1,
            EnrichError::BatchExhausted { .. }
            | EnrichError::ApiError(_)
            | EnrichError::HttpStatus { .. }
            | EnrichError::SerializationError(_) => 2,
            EnrichError::IoError(_) | EnrichError::ArtifactReleased { .. } => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
