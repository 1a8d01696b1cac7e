use thiserror::Error;

/// Main error type for MetricOps shared code
#[derive(Error, Debug)]
pub enum MetricOpsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Unknown dimension '{0}': expected one of ship_state, category, fulfilment, ship_service_level")]
    UnknownDimension(String),

    #[error("top_n must be between {min} and {max}, got {value}")]
    TopNOutOfRange { value: u32, min: u32, max: u32 },

    #[error("Drivers payload does not match the {expected} layout: {reason}")]
    DriverShape { expected: &'static str, reason: String },
}

impl From<config::ConfigError> for MetricOpsError {
    fn from(error: config::ConfigError) -> Self {
        MetricOpsError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetricOpsError>;
