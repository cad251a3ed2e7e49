//! Domain error types.
//!
//! Missing prices and scores are not errors: they are `None` cells in a
//! [`Matrix`](super::matrix::Matrix) and are skipped by the engine.

/// Top-level error type for rotatrader.
#[derive(Debug, thiserror::Error)]
pub enum RotatraderError {
    /// Input that makes a simulation meaningless (empty matrix, empty range).
    #[error("degenerate input: {reason}")]
    DegenerateInput { reason: String },

    #[error("data format error in {file}: {reason}")]
    DataFormat { file: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RotatraderError {
    pub fn degenerate(reason: impl Into<String>) -> Self {
        RotatraderError::DegenerateInput {
            reason: reason.into(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RotatraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&RotatraderError> for std::process::ExitCode {
    fn from(err: &RotatraderError) -> Self {
        let code: u8 = match err {
            RotatraderError::Io(_) => 1,
            RotatraderError::ConfigParse { .. }
            | RotatraderError::ConfigMissing { .. }
            | RotatraderError::ConfigInvalid { .. } => 2,
            RotatraderError::DataFormat { .. } => 3,
            RotatraderError::DegenerateInput { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
