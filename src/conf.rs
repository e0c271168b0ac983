//! Loads the settings that drive the scheduling and configuration engine
//!
//! Mirrors the layered YAML-file-plus-environment-overlay approach used across the rest of the
//! Thorium stack: a base file is read first and any `SCALE__`-prefixed environment variable
//! overrides it field by field.

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// Default container path that per-execution input volumes are mounted at
fn default_input_root() -> String {
    "/input".to_owned()
}

/// Default container path that per-execution output volumes are mounted at
fn default_output_root() -> String {
    "/output".to_owned()
}

/// Default number of minutes a cleanup task may run before it's considered stuck
fn default_cleanup_timeout_minutes() -> i64 {
    10
}

/// Default page size used by the bulk cancel command
fn default_max_cancel_batch() -> usize {
    1000
}

/// The settings needed to run the scheduling and execution-configuration engine
#[derive(Deserialize, Debug, Clone)]
pub struct Conf {
    /// The syslog address tasks should ship logs to, if log shipping is enabled
    #[serde(default)]
    pub syslog_address: Option<String>,
    /// The search-index endpoints registered on post tasks for legacy artifact registration
    #[serde(default)]
    pub search_index_urls: Vec<String>,
    /// The container path that per-execution input volumes are mounted at
    #[serde(default = "default_input_root")]
    pub input_root: String,
    /// The container path that per-execution output volumes are mounted at
    #[serde(default = "default_output_root")]
    pub output_root: String,
    /// How long a cleanup task may run before it is considered stuck
    #[serde(default = "default_cleanup_timeout_minutes")]
    pub cleanup_timeout_minutes: i64,
    /// The maximum number of jobs the bulk cancel command pages through at once
    #[serde(default = "default_max_cancel_batch")]
    pub max_cancel_batch: usize,
}

impl Conf {
    /// Load settings from a YAML file at `path`, overlaid with any `SCALE__`-prefixed env vars
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the base YAML settings file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("scale")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
