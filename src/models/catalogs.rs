//! Collaborator interfaces the configurators depend on
//!
//! The original implementation performs lazy, side-effectful ORM lookups straight from the
//! configurator (an input's workspace, an ingest record, a strike's configured workspace). Per
//! the side-effectful-lazy-attribute-lookups design note, those are replaced here with explicit,
//! injectable collaborator traits, in the same spirit as Thorium's repository-style backends
//! (`thorium::models::backends`) — the configurator only ever calls through these interfaces, so
//! it can be driven by a pure, pre-snapshotted view of the outside world.

use std::collections::BTreeMap;

use super::volumes::Volume;

/// A single file belonging to a job's input data
#[derive(Debug, Clone, PartialEq)]
pub struct InputFileDescriptor {
    /// The file's id
    pub id: u64,
    /// The workspace this file lives in
    pub workspace_ref: String,
    /// This file's path within its workspace
    pub workspace_path: String,
    /// Overridden local name, set when this file's basename collided with a sibling's
    pub local_file_name: Option<String>,
}

impl InputFileDescriptor {
    /// Creates a new input file descriptor with no local-name override
    ///
    /// # Arguments
    ///
    /// * `id` - The file's id
    /// * `workspace_ref` - The workspace this file lives in
    /// * `workspace_path` - This file's path within its workspace
    pub fn new<W: Into<String>, P: Into<String>>(id: u64, workspace_ref: W, workspace_path: P) -> Self {
        InputFileDescriptor {
            id,
            workspace_ref: workspace_ref.into(),
            workspace_path: workspace_path.into(),
            local_file_name: None,
        }
    }

    /// Returns this file's basename: the local-name override if one was assigned, else the
    /// final path component of `workspace_path`
    pub fn basename(&self) -> &str {
        if let Some(local) = &self.local_file_name {
            return local.as_str();
        }
        self.workspace_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.workspace_path)
    }
}

/// One job-data input: a literal scalar, a single file reference, or a list of file references
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// A literal value to pass straight through as an env var
    Scalar(String),
    /// A reference to a single input file
    FileId(u64),
    /// A reference to a list of input files
    FileIds(Vec<u64>),
}

/// The raw job data supplied at enqueue time
#[derive(Debug, Clone, Default)]
pub struct JobData {
    /// This job's declared inputs, by input name
    pub input_data: BTreeMap<String, InputValue>,
}

/// One setting declared by a job-type's interface
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDecl {
    /// The setting's name
    pub name: String,
    /// Whether this setting's value must be treated as a secret (masked in the redacted plan)
    pub secret: bool,
}

/// A job-type's interface: what it accepts on the command line, what it mounts, what it needs
#[derive(Debug, Clone, Default)]
pub struct InterfaceDefinition {
    /// The command line arguments passed to the main task
    pub command_args: Vec<String>,
    /// The names of mounts this interface declares
    pub mounts: Vec<String>,
    /// The settings this interface declares
    pub settings: Vec<SettingDecl>,
}

/// Job-type level metadata needed to finalise a plan at dispatch time
#[derive(Debug, Clone, Default)]
pub struct JobTypeMetadata {
    /// Shared memory, in MiB, to allocate to the main task; `0.0` disables shm-size entirely
    pub shared_mem_mib: f64,
    /// Volumes available to resolve interface-declared mounts against, by mount name
    pub mount_volumes: BTreeMap<String, Volume>,
    /// Extra container params appended to the main task regardless of settings/logging
    pub extra_container_params: Vec<(String, String)>,
}

/// Looks up a job's input files by input name
pub trait InputFileCatalog {
    /// Returns the ordered input files declared for `input_name` on this job
    ///
    /// # Arguments
    ///
    /// * `input_name` - The declared input name to look up files for
    fn files_for_input(&self, input_name: &str) -> Vec<InputFileDescriptor>;
}

/// Resolves workspace names to volumes
pub trait WorkspaceCatalog {
    /// Resolves a workspace name to the volume that backs it
    ///
    /// # Arguments
    ///
    /// * `name` - The workspace name to resolve
    fn resolve(&self, name: &str) -> Option<Volume>;

    /// Resolves a workspace id to its name
    ///
    /// # Arguments
    ///
    /// * `id` - The workspace id to resolve
    fn name_for_id(&self, id: u64) -> Option<String>;
}

/// Resolves `scale-ingest` system job properties to their workspaces
pub trait IngestCatalog {
    /// Looks up the source and destination workspace names for an ingest by id
    ///
    /// # Arguments
    ///
    /// * `ingest_id` - The ingest record's id
    fn workspaces_for_ingest(&self, ingest_id: &str) -> Option<(String, String)>;
}

/// Resolves `scale-strike` system job configuration to its workspace
pub trait StrikeCatalog {
    /// Looks up the workspace name configured for a strike
    ///
    /// # Arguments
    ///
    /// * `strike_ref` - The strike configuration reference
    fn workspace_for_strike(&self, strike_ref: &str) -> Option<String>;
}

/// Resolves `scale-scan` system job configuration to its workspace
pub trait ScanCatalog {
    /// Looks up the workspace name configured for a scan
    ///
    /// # Arguments
    ///
    /// * `scan_ref` - The scan configuration reference
    fn workspace_for_scan(&self, scan_ref: &str) -> Option<String>;
}

/// Looks up job-type metadata
pub trait JobTypeCatalog {
    /// Returns metadata for the job-type referenced by `job_type_ref`
    ///
    /// # Arguments
    ///
    /// * `job_type_ref` - The job-type reference to look up
    fn metadata(&self, job_type_ref: &str) -> Option<JobTypeMetadata>;
}

/// Retrieves secret setting values from the vault
pub trait SecretsProvider {
    /// Retrieves every secret setting registered for a job-type
    ///
    /// # Arguments
    ///
    /// * `job_index` - `"<type_name>-<version>"` with `.` replaced by `_`, per §6.3
    fn retrieve_job_type_secrets(
        &self,
        job_index: &str,
    ) -> Result<BTreeMap<String, Option<String>>, crate::error::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_uses_local_override_when_present() {
        let mut file = InputFileDescriptor::new(42, "ws", "dir/foo.bar");
        assert_eq!(file.basename(), "foo.bar");
        file.local_file_name = Some("42.foo.bar".to_owned());
        assert_eq!(file.basename(), "42.foo.bar");
    }
}
