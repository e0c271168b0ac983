//! The error taxonomy used across the scheduling and execution-configuration engine

use std::fmt;

/// A failure encountered anywhere in the scale engine
#[derive(Debug)]
pub enum Error {
    /// A job-type manifest failed structural validation
    InvalidManifest(String),
    /// Job metadata failed structural validation
    InvalidMetadata(String),
    /// The caller is not authorized to read the requested secrets
    InvalidSecretsAuthorization(String),
    /// The secrets backend is misconfigured
    InvalidSecretsConfiguration(String),
    /// The request sent to the secrets backend was malformed
    InvalidSecretsRequest(String),
    /// The token used to authenticate to the secrets backend is invalid or expired
    InvalidSecretsToken(String),
    /// A value returned by the secrets backend failed validation
    InvalidSecretsValue(String),
    /// A generic, rarely-hit failure with a human readable message
    Generic(String),
    /// A json (de)serialization failure
    Serde(serde_json::Error),
    /// A configuration load failure
    Config(config::ConfigError),
    /// A timestamp failed to parse
    ChronoParse(chrono::ParseError),
    /// A uuid failed to parse
    Uuid(uuid::Error),
}

impl Error {
    /// Build a new generic [`Error`] from anything that can be turned into a `String`
    ///
    /// # Arguments
    ///
    /// * `msg` - The message to wrap
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Error::Generic(msg.into())
    }

    /// The short, stable name of this error's kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidManifest(_) => "InvalidManifest",
            Error::InvalidMetadata(_) => "InvalidMetadata",
            Error::InvalidSecretsAuthorization(_) => "InvalidSecretsAuthorization",
            Error::InvalidSecretsConfiguration(_) => "InvalidSecretsConfiguration",
            Error::InvalidSecretsRequest(_) => "InvalidSecretsRequest",
            Error::InvalidSecretsToken(_) => "InvalidSecretsToken",
            Error::InvalidSecretsValue(_) => "InvalidSecretsValue",
            Error::Generic(_) => "Generic",
            Error::Serde(_) => "Serde",
            Error::Config(_) => "Config",
            Error::ChronoParse(_) => "ChronoParse",
            Error::Uuid(_) => "Uuid",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidManifest(msg) => write!(f, "invalid manifest: {msg}"),
            Error::InvalidMetadata(msg) => write!(f, "invalid metadata: {msg}"),
            Error::InvalidSecretsAuthorization(msg) => {
                write!(f, "invalid secrets authorization: {msg}")
            }
            Error::InvalidSecretsConfiguration(msg) => {
                write!(f, "invalid secrets configuration: {msg}")
            }
            Error::InvalidSecretsRequest(msg) => write!(f, "invalid secrets request: {msg}"),
            Error::InvalidSecretsToken(msg) => write!(f, "invalid secrets token: {msg}"),
            Error::InvalidSecretsValue(msg) => write!(f, "invalid secrets value: {msg}"),
            Error::Generic(msg) => write!(f, "{msg}"),
            Error::Serde(err) => write!(f, "serde error: {err}"),
            Error::Config(err) => write!(f, "config error: {err}"),
            Error::ChronoParse(err) => write!(f, "chrono parse error: {err}"),
            Error::Uuid(err) => write!(f, "uuid error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Self {
        Error::ChronoParse(err)
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Error::Uuid(err)
    }
}
