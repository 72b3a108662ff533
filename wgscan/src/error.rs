use thiserror::Error;

/// Failures a scan call can report.
///
/// Each variant is a distinct failure class so callers can tell a bad
/// input shape apart from an unusable device or an operator that could
/// not be turned into device code. Numeric overflow inside the operator is
/// never detected; it is the caller's responsibility.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid range: output holds {output} elements but input has {input}")]
    InvalidRange { input: usize, output: usize },
    #[error("operator generation failed: {0}")]
    OperatorGeneration(String),
    #[error("executor unavailable: {0}")]
    ExecutorUnavailable(String),
    #[error("device execution failed: {0}")]
    DeviceExecution(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("block_size must be at least 2, got {0}")]
    InvalidBlockSize(usize),
    #[error("device_block_size must be between 2 and 1024, got {0}")]
    InvalidDeviceBlockSize(usize),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}
