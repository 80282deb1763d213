//! Errors raised while loading or validating host settings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Settings parsed but cannot drive a sync client.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid API base URL: {0}")]
    InvalidApiUrl(#[from] url::ParseError),

    /// The settings file is not valid JSON for [`crate::Config`].
    #[error("Malformed settings file: {0}")]
    SettingsFormat(#[from] serde_json::Error),

    #[error("Home directory could not be determined")]
    HomeDirUnavailable,
}

pub type CoreResult<T> = Result<T, CoreError>;
