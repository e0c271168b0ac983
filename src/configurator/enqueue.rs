//! Builds the initial execution plan at enqueue time
//!
//! Grounded in `scale.job.configuration.configurators.QueuedExecutionConfigurator`
//! (`original_source/scale/job/configuration/configurators.py`): derives the main task's
//! environment from the job's declared input data, resolves the workspaces it needs (either the
//! three named system-job specialisations or the job's declared output workspaces), and leaves
//! everything else for the dispatch-time configurator to finish.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::models::catalogs::{
    IngestCatalog, InputFileCatalog, InputFileDescriptor, InputValue, InterfaceDefinition, JobData,
    ScanCatalog, StrikeCatalog, WorkspaceCatalog,
};
use crate::models::execution::{Task, TaskType};
use crate::models::plan::{ExecutionPlan, Mode, WorkspaceBinding};
use crate::models::resources::ResourceVector;

/// The three built-in system jobs that get specialised workspace wiring, per §6.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemJobKind {
    /// `scale-ingest`
    Ingest,
    /// `scale-strike`
    Strike,
    /// `scale-scan`
    Scan,
}

impl SystemJobKind {
    /// Parses a job-type name into a known [`SystemJobKind`], if it is one
    ///
    /// # Arguments
    ///
    /// * `name` - The job-type name to check
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "scale-ingest" => Some(SystemJobKind::Ingest),
            "scale-strike" => Some(SystemJobKind::Strike),
            "scale-scan" => Some(SystemJobKind::Scan),
            _ => None,
        }
    }
}

/// The raw inputs the enqueue-time builder needs for one job
#[derive(Debug, Clone, Default)]
pub struct EnqueueJobInput {
    /// This execution's id
    pub exec_id: String,
    /// The execution's docker image
    pub docker_image: String,
    /// Which system job this is, if any
    pub system_job: Option<SystemJobKind>,
    /// The job's raw input data
    pub job_data: JobData,
    /// The ids of this job's declared output workspaces (regular jobs only)
    pub output_workspace_ids: Vec<u64>,
    /// Free-form properties read by system-job workspace resolution (`"Ingest ID"`,
    /// `"workspace"`, `"new_workspace"`, `"strike_ref"`, `"scan_ref"`)
    pub properties: BTreeMap<String, String>,
}

/// Replaces `-` with `_` and upper-cases `name`
///
/// Idempotent and injective over names differing only in `-` vs `_`; two input names that
/// collide once normalised are a configuration error the caller must avoid (§8 invariant 7).
pub fn normalize(name: &str) -> String {
    name.replace('-', "_").to_uppercase()
}

/// Builds the initial execution plan at enqueue time
pub struct QueuedConfigurator<'a> {
    /// Resolves a job's declared input files
    pub input_file_catalog: &'a dyn InputFileCatalog,
    /// Resolves workspace ids/names to volumes
    pub workspace_catalog: &'a dyn WorkspaceCatalog,
    /// Resolves `scale-ingest` properties to workspaces
    pub ingest_catalog: &'a dyn IngestCatalog,
    /// Resolves `scale-strike` configuration to a workspace
    pub strike_catalog: &'a dyn StrikeCatalog,
    /// Resolves `scale-scan` configuration to a workspace
    pub scan_catalog: &'a dyn ScanCatalog,
    /// The container path input files are mounted under
    pub input_root: String,
}

impl<'a> QueuedConfigurator<'a> {
    /// Builds the enqueue-time execution plan for one job
    ///
    /// # Arguments
    ///
    /// * `job` - The raw inputs for this job
    /// * `interface` - The job-type's declared interface
    pub fn configure_queued_job(
        &self,
        job: &EnqueueJobInput,
        interface: &InterfaceDefinition,
    ) -> Result<ExecutionPlan, Error> {
        let env = self.build_env(job)?;
        let (workspaces, output_workspaces) = self.resolve_workspaces(job)?;

        let mut main = Task::new(
            format!("{}_main", job.exec_id),
            TaskType::Main,
            String::new(),
            ResourceVector::new(),
        );
        main.command_args = interface.command_args.clone();
        main.env = env;
        main.workspaces = workspaces;

        let mut plan = ExecutionPlan::new(job.exec_id.clone(), job.system_job.is_some());
        plan.tasks.push(main);
        plan.output_workspaces = output_workspaces;
        Ok(plan)
    }

    /// Builds `input_files_dict` (per input name, the disambiguated file list) and derives the
    /// env vars that follow from `job_data.input_data`
    fn build_env(&self, job: &EnqueueJobInput) -> Result<BTreeMap<String, String>, Error> {
        let mut env = BTreeMap::new();
        for (name, value) in &job.job_data.input_data {
            match value {
                InputValue::Scalar(value) => {
                    env.insert(normalize(name), value.clone());
                }
                InputValue::FileId(id) => {
                    let files = dedupe_basenames(self.input_file_catalog.files_for_input(name));
                    let Some(file) = files.iter().find(|f| f.id == *id) else {
                        return Err(Error::InvalidMetadata(format!(
                            "input '{name}' references unknown file id {id}"
                        )));
                    };
                    let path = format!("{}/{}/{}", self.input_root, name, file.basename());
                    env.insert(normalize(name), path);
                }
                InputValue::FileIds(_) => {
                    let path = format!("{}/{}", self.input_root, name);
                    env.insert(normalize(name), path);
                }
            }
        }
        Ok(env)
    }

    /// Resolves the workspaces this job's main task needs, plus the output-workspace id→name
    /// cache for regular jobs (see `resolve_output_workspaces`)
    fn resolve_workspaces(
        &self,
        job: &EnqueueJobInput,
    ) -> Result<(Vec<WorkspaceBinding>, BTreeMap<u64, String>), Error> {
        match job.system_job {
            Some(SystemJobKind::Ingest) => Ok((self.resolve_ingest_workspaces(job)?, BTreeMap::new())),
            Some(SystemJobKind::Strike) => Ok((self.resolve_strike_workspace(job)?, BTreeMap::new())),
            Some(SystemJobKind::Scan) => Ok((self.resolve_scan_workspace(job)?, BTreeMap::new())),
            None => Ok((Vec::new(), self.resolve_output_workspaces(job)?)),
        }
    }

    /// `scale-ingest`: reads `Ingest ID`, `workspace`, `new_workspace`; falls back to an ingest
    /// record lookup by id when the workspace properties are absent
    fn resolve_ingest_workspaces(&self, job: &EnqueueJobInput) -> Result<Vec<WorkspaceBinding>, Error> {
        let names = match (
            job.properties.get("workspace"),
            job.properties.get("new_workspace"),
        ) {
            (Some(workspace), Some(new_workspace)) => (workspace.clone(), new_workspace.clone()),
            _ => {
                let ingest_id = job.properties.get("Ingest ID").ok_or_else(|| {
                    Error::InvalidMetadata("scale-ingest job missing 'Ingest ID' property".to_owned())
                })?;
                self.ingest_catalog.workspaces_for_ingest(ingest_id).ok_or_else(|| {
                    Error::InvalidMetadata(format!("unknown ingest record '{ingest_id}'"))
                })?
            }
        };
        Ok(vec![
            WorkspaceBinding::new(names.0, Mode::RW),
            WorkspaceBinding::new(names.1, Mode::RW),
        ])
    }

    /// `scale-strike`: resolves the workspace named in the associated strike configuration
    fn resolve_strike_workspace(&self, job: &EnqueueJobInput) -> Result<Vec<WorkspaceBinding>, Error> {
        let strike_ref = job
            .properties
            .get("strike_ref")
            .ok_or_else(|| Error::InvalidMetadata("scale-strike job missing 'strike_ref'".to_owned()))?;
        let name = self
            .strike_catalog
            .workspace_for_strike(strike_ref)
            .ok_or_else(|| Error::InvalidMetadata(format!("unknown strike config '{strike_ref}'")))?;
        Ok(vec![WorkspaceBinding::new(name, Mode::RW)])
    }

    /// `scale-scan`: resolves the workspace named in the associated scan configuration
    fn resolve_scan_workspace(&self, job: &EnqueueJobInput) -> Result<Vec<WorkspaceBinding>, Error> {
        let scan_ref = job
            .properties
            .get("scan_ref")
            .ok_or_else(|| Error::InvalidMetadata("scale-scan job missing 'scan_ref'".to_owned()))?;
        let name = self
            .scan_catalog
            .workspace_for_scan(scan_ref)
            .ok_or_else(|| Error::InvalidMetadata(format!("unknown scan config '{scan_ref}'")))?;
        Ok(vec![WorkspaceBinding::new(name, Mode::RW)])
    }

    /// Regular jobs: resolves declared output workspace ids to names, caching the mapping for
    /// later reference. Mirrors `QueuedExecutionConfigurator.configure_queued_job`'s
    /// `config.set_output_workspaces(...)` call: the mapping is cached but never attached to
    /// `main`'s (or any task's) workspaces — `task_workspaces` stays empty for regular jobs at
    /// enqueue time, consistent with what `dispatch.rs`'s output-workspace wiring assumes.
    fn resolve_output_workspaces(&self, job: &EnqueueJobInput) -> Result<BTreeMap<u64, String>, Error> {
        let mut cache: BTreeMap<u64, String> = BTreeMap::new();
        for id in &job.output_workspace_ids {
            if !cache.contains_key(id) {
                let name = self
                    .workspace_catalog
                    .name_for_id(*id)
                    .ok_or_else(|| Error::InvalidMetadata(format!("unknown workspace id {id}")))?;
                cache.insert(*id, name);
            }
        }
        Ok(cache)
    }
}

/// Assigns `local_file_name = "<id>.<basename>"` to every file in `files` whose basename was
/// already seen earlier in the same list, per §3's input-file-descriptor collision rule
fn dedupe_basenames(mut files: Vec<InputFileDescriptor>) -> Vec<InputFileDescriptor> {
    let mut seen = std::collections::BTreeSet::new();
    for file in &mut files {
        let basename = file.basename().to_owned();
        if seen.contains(&basename) {
            file.local_file_name = Some(format!("{}.{}", file.id, basename));
        } else {
            seen.insert(basename);
        }
    }
    files
}
