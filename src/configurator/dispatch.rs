//! Finalises a plan at dispatch time, producing a redacted copy and a hydrated copy
//!
//! Grounded in `scale.job.configuration.configurators.ScheduledExecutionConfigurator`
//! (`original_source/scale/job/configuration/configurators.py`). Builds one shared task skeleton
//! (main-task specifics, phase tasks, resource math, workspace/volume wiring, logging) and only
//! forks it into a redacted and a hydrated copy for the settings-and-secrets step, since that's
//! the only step whose output differs between the two.

use std::collections::{BTreeMap, BTreeSet};

use crate::conf::Conf;
use crate::error::Error;
use crate::models::catalogs::{InterfaceDefinition, JobTypeCatalog, JobTypeMetadata, SecretsProvider, WorkspaceCatalog};
use crate::models::execution::{Task, TaskType};
use crate::models::plan::{ExecutionPlan, Mode, WorkspaceBinding};
use crate::models::resources::ResourceVector;
use crate::models::volumes::Volume;

/// Value substituted for every secret when building the redacted (persisted) plan
pub const REDACTED_VALUE: &str = "*****";

/// The name of the resource kind representing disk, used in the main/post disk-adjustment math
const DISK_KIND: &str = "disk";

/// The job-type and interface level inputs the dispatch-time builder needs
#[derive(Debug, Clone, Default)]
pub struct DispatchJobInput {
    /// This execution's id
    pub exec_id: String,
    /// Whether this is a system job (main-only) or a regular job (full pull/pre/main/post triad)
    pub is_system: bool,
    /// The execution's docker image
    pub docker_image: String,
    /// The size, in bytes, of this execution's input data; subtracted from main's disk budget
    pub input_file_size: f64,
    /// The full resource vector this execution was granted
    pub required_resources: ResourceVector,
    /// The job-type's name, used to build the secrets-provider lookup key
    pub job_type_name: String,
    /// The job-type's version, used to build the secrets-provider lookup key
    pub job_type_version: String,
    /// The job-type's declared interface
    pub interface: InterfaceDefinition,
    /// The job-type reference looked up against [`JobTypeCatalog`] for shared memory, declared
    /// mount volumes, and extra container params
    pub job_type_ref: String,
    /// The names of this job's declared input workspaces
    pub input_workspace_names: Vec<String>,
    /// The names of this job's declared output workspaces
    pub output_workspace_names: Vec<String>,
}

/// The `job_index` key used to look up a job-type's secrets: `"<name>-<version>"` with `.`
/// replaced by `_`, per §6.3
fn job_index(name: &str, version: &str) -> String {
    format!("{name}-{version}").replace('.', "_")
}

/// Finalises execution plans at dispatch time
pub struct ScheduledConfigurator<'a> {
    /// Resolves workspace names to volumes
    pub workspace_catalog: &'a dyn WorkspaceCatalog,
    /// Resolves a job-type reference to its metadata
    pub job_type_catalog: &'a dyn JobTypeCatalog,
    /// Retrieves secret setting values from the vault
    pub secrets_provider: &'a dyn SecretsProvider,
    /// Non-secret settings applied uniformly across executions
    pub system_settings: &'a BTreeMap<String, String>,
    /// Ambient settings (syslog address, search-index urls, path roots)
    pub conf: &'a Conf,
}

impl<'a> ScheduledConfigurator<'a> {
    /// Finalises `enqueue_plan`, returning `(redacted_plan, hydrated_plan)`
    ///
    /// # Arguments
    ///
    /// * `enqueue_plan` - The plan built by [`crate::configurator::enqueue::QueuedConfigurator`]
    /// * `job` - The job-type/interface level inputs needed to finish the plan
    pub fn configure_scheduled_job(
        &self,
        enqueue_plan: &ExecutionPlan,
        job: &DispatchJobInput,
    ) -> Result<(ExecutionPlan, ExecutionPlan), Error> {
        let metadata = self
            .job_type_catalog
            .metadata(&job.job_type_ref)
            .ok_or_else(|| Error::InvalidMetadata(format!("unknown job-type '{}'", job.job_type_ref)))?;

        let mut plan = enqueue_plan.clone();

        self.configure_main_task(&mut plan, job, &metadata)?;
        if job.is_system {
            self.configure_system_job(&mut plan, job);
        } else {
            self.configure_regular_job(&mut plan, job);
        }
        self.configure_all_tasks(&mut plan, job)?;

        let mut redacted = plan.clone();
        let mut hydrated = plan;
        self.configure_secrets(&mut redacted, &mut hydrated, job)?;

        project_docker_params(&mut redacted, &metadata);
        project_docker_params(&mut hydrated, &metadata);

        Ok((redacted, hydrated))
    }

    /// Step 1: main-task specifics — shared memory and interface-declared mounts
    fn configure_main_task(
        &self,
        plan: &mut ExecutionPlan,
        job: &DispatchJobInput,
        metadata: &JobTypeMetadata,
    ) -> Result<(), Error> {
        let main = plan
            .task_mut(TaskType::Main)
            .ok_or_else(|| Error::InvalidMetadata("plan is missing its main task".to_owned()))?;

        let shared_mem_mib = metadata.shared_mem_mib;
        if shared_mem_mib > 0.0 {
            main.container_params
                .push(("shm-size".to_owned(), format!("{}m", shared_mem_mib.ceil() as i64)));
            main.env
                .insert("ALLOCATED_SHARED_MEM".to_owned(), shared_mem_mib.to_string());
        }

        for mount_name in &job.interface.mounts {
            let mut mount = crate::models::volumes::Mount::new(mount_name, "");
            if let Some(volume) = metadata.mount_volumes.get(mount_name) {
                mount.mount_path = volume.mount_path.clone();
                mount.volume = Some(volume.clone());
            }
            main.mounts.push(mount);
        }
        Ok(())
    }

    /// Step 2: regular jobs get the full `[pull, pre, main, post]` triad
    fn configure_regular_job(&self, plan: &mut ExecutionPlan, job: &DispatchJobInput) {
        let exec_id = &job.exec_id;
        let full_resources = job.required_resources.clone();
        let main_resources = full_resources.subtract(&ResourceVector::from_pairs([(
            DISK_KIND,
            job.input_file_size,
        )]));
        let post_resources = main_resources.remove_kind(DISK_KIND);

        let mut pull = Task::new(format!("{exec_id}_pull"), TaskType::Pull, String::new(), full_resources.clone());
        pull.command_args = vec![format!("docker pull {}", job.docker_image)];

        let mut pre = Task::new(format!("{exec_id}_pre"), TaskType::Pre, String::new(), full_resources);
        pre.command_args = vec![format!("scale_pre_steps -i {exec_id}")];

        let mut post = Task::new(format!("{exec_id}_post"), TaskType::Post, String::new(), post_resources);
        post.command_args = vec![format!("scale_post_steps -i {exec_id}")];

        for name in &job.input_workspace_names {
            pre.workspaces.push(WorkspaceBinding::new(name.clone(), Mode::RO));
            post.workspaces.push(WorkspaceBinding::new(name.clone(), Mode::RW));
        }
        // output workspace wiring walks the *input* workspace name list, not the output one;
        // preserved verbatim from the system this was distilled from (see DESIGN.md)
        for name in &job.input_workspace_names {
            post.workspaces.push(WorkspaceBinding::new(name.clone(), Mode::RW));
        }

        let private_input = private_volume(exec_id, "input", &self.conf.input_root);
        let private_output = private_volume(exec_id, "output", &self.conf.output_root);
        pre.workspaces.push(
            WorkspaceBinding::new(private_input.name.clone(), Mode::RW).with_volume(private_input.clone()),
        );
        pre.workspaces.push(
            WorkspaceBinding::new(private_output.name.clone(), Mode::RW).with_volume(private_output.clone()),
        );

        if let Some(main) = plan.task_mut(TaskType::Main) {
            for name in &job.input_workspace_names {
                main.workspaces.push(WorkspaceBinding::new(name.clone(), Mode::RO));
            }
            main.workspaces.push(
                WorkspaceBinding::new(private_input.name.clone(), Mode::RO).with_volume(private_input),
            );
            main.workspaces.push(
                WorkspaceBinding::new(private_output.name.clone(), Mode::RW).with_volume(private_output.clone()),
            );
            main.env.insert("OUTPUT_DIR".to_owned(), self.conf.output_root.clone());
            main.env.insert("job_output_dir".to_owned(), self.conf.output_root.clone());
            main.resources = main_resources;
        }

        post.workspaces.push(WorkspaceBinding::new(private_output.name.clone(), Mode::RO).with_volume(private_output));

        plan.tasks.insert(0, pull);
        // pre goes right before main
        let main_idx = plan.tasks.iter().position(|t| t.task_type == TaskType::Main).unwrap();
        plan.tasks.insert(main_idx, pre);
        plan.tasks.push(post);
    }

    /// Step 3: system jobs just get the resource vector applied to `main`
    fn configure_system_job(&self, plan: &mut ExecutionPlan, job: &DispatchJobInput) {
        if let Some(main) = plan.task_mut(TaskType::Main) {
            main.resources = job.required_resources.clone();
        }
    }

    /// Step 4: cross-task decoration shared by every task type — allocated-resource env vars,
    /// workspace volume materialisation, and syslog logging params
    fn configure_all_tasks(&self, plan: &mut ExecutionPlan, job: &DispatchJobInput) -> Result<(), Error> {
        for task in &mut plan.tasks {
            for kind in resource_kinds(&task.resources) {
                let env_name = format!("ALLOCATED_{}", crate::configurator::enqueue::normalize(&kind));
                task.env.insert(env_name, task.resources.get(&kind).to_string());
            }
            for binding in &mut task.workspaces {
                if binding.volume.is_none() {
                    binding.volume = self.workspace_catalog.resolve(&binding.name);
                }
            }
        }

        if !job.is_system {
            if let Some(addr) = &self.conf.syslog_address {
                for task_type in [TaskType::Pull, TaskType::Pre, TaskType::Main, TaskType::Post] {
                    if let Some(task) = plan.task_mut(task_type) {
                        task.container_params.push(("log-driver".to_owned(), "syslog".to_owned()));
                        task.container_params
                            .push(("log-opt".to_owned(), "syslog-format=rfc3164".to_owned()));
                        task.container_params
                            .push(("log-opt".to_owned(), format!("syslog-address={addr}")));
                        task.container_params
                            .push(("log-opt".to_owned(), format!("tag={}", task.id)));
                    }
                }
            }
            if let Some(post) = plan.task_mut(TaskType::Post) {
                post.env.insert(
                    "SEARCH_INDEX_URLS".to_owned(),
                    self.conf.search_index_urls.join(","),
                );
            }
        }
        Ok(())
    }

    /// Step 5: builds the redacted and hydrated settings/secrets copies
    fn configure_secrets(
        &self,
        redacted: &mut ExecutionPlan,
        hydrated: &mut ExecutionPlan,
        job: &DispatchJobInput,
    ) -> Result<(), Error> {
        if job.is_system {
            apply_system_settings(redacted, TaskType::Main, self.system_settings, true);
            apply_system_settings(hydrated, TaskType::Main, self.system_settings, false);
            return Ok(());
        }

        apply_system_settings(redacted, TaskType::Pre, self.system_settings, true);
        apply_system_settings(redacted, TaskType::Post, self.system_settings, true);
        apply_system_settings(hydrated, TaskType::Pre, self.system_settings, false);
        apply_system_settings(hydrated, TaskType::Post, self.system_settings, false);

        let index = job_index(&job.job_type_name, &job.job_type_version);
        let secrets = self.secrets_provider.retrieve_job_type_secrets(&index)?;

        for decl in &job.interface.settings {
            let value = secrets.get(&decl.name).cloned().flatten().unwrap_or_default();
            let redacted_value = if decl.secret { REDACTED_VALUE.to_owned() } else { value.clone() };
            if let Some(main) = redacted.task_mut(TaskType::Main) {
                let env_name = crate::configurator::enqueue::normalize(&decl.name);
                main.settings.insert(decl.name.clone(), redacted_value.clone());
                main.env.insert(env_name, redacted_value);
            }
            if let Some(main) = hydrated.task_mut(TaskType::Main) {
                let env_name = crate::configurator::enqueue::normalize(&decl.name);
                main.settings.insert(decl.name.clone(), value.clone());
                main.env.insert(env_name, value);
            }
        }
        Ok(())
    }
}

/// Applies `system_settings` to `task_type`'s env, masking every value if `redact` is set
fn apply_system_settings(
    plan: &mut ExecutionPlan,
    task_type: TaskType,
    system_settings: &BTreeMap<String, String>,
    redact: bool,
) {
    let Some(task) = plan.task_mut(task_type) else {
        return;
    };
    for (name, value) in system_settings {
        let applied = if redact { REDACTED_VALUE.to_owned() } else { value.clone() };
        let env_name = crate::configurator::enqueue::normalize(name);
        task.settings.insert(name.clone(), applied.clone());
        task.env.insert(env_name, applied);
    }
}

/// Step 6: docker parameterisation — one `env` param per env var, one volume-attach param per
/// bound workspace (the first task to reference a volume creates it), plus job-type extras on
/// main
fn project_docker_params(plan: &mut ExecutionPlan, metadata: &JobTypeMetadata) {
    let mut created_volumes: BTreeSet<String> = BTreeSet::new();
    for task in &mut plan.tasks {
        for (name, value) in &task.env {
            task.container_params.push(("env".to_owned(), format!("{name}={value}")));
        }
        for binding in &task.workspaces {
            let Some(volume) = &binding.volume else { continue };
            let first_occurrence = created_volumes.insert(volume.name.clone());
            task.container_params
                .push(("volume".to_owned(), volume_attach_param(volume, binding.mode, first_occurrence)));
        }
    }
    if let Some(main) = plan.task_mut(TaskType::Main) {
        main.container_params.extend(metadata.extra_container_params.clone());
    }
}

/// Builds the container parameter value for attaching `volume`, creating it on first occurrence
fn volume_attach_param(volume: &Volume, mode: Mode, first_occurrence: bool) -> String {
    let ro = matches!(mode, Mode::RO);
    match &volume.source {
        crate::models::volumes::VolumeSource::HostPath { host_path } => {
            format!(
                "type=bind,source={host_path},destination={}{}",
                volume.mount_path,
                if ro { ",readonly" } else { "" }
            )
        }
        crate::models::volumes::VolumeSource::Driver { driver, options } => {
            if first_occurrence {
                let opts: String = options
                    .iter()
                    .map(|(k, v)| format!(",driver-opt={k}={v}"))
                    .collect();
                format!(
                    "name={},driver={driver}{opts},destination={}{}",
                    volume.name,
                    volume.mount_path,
                    if ro { ",readonly" } else { "" }
                )
            } else {
                format!(
                    "name={},destination={}{}",
                    volume.name,
                    volume.mount_path,
                    if ro { ",readonly" } else { "" }
                )
            }
        }
    }
}

/// Builds the per-execution private volume mounted at `root` for this execution
fn private_volume(exec_id: &str, suffix: &str, root: &str) -> Volume {
    Volume::driver(format!("{exec_id}_{suffix}"), root, "local", BTreeMap::new(), false)
}

/// Returns every resource kind present in `resources`, via its json projection
fn resource_kinds(resources: &ResourceVector) -> Vec<String> {
    match resources.to_json() {
        serde_json::Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

impl WorkspaceBinding {
    /// Attaches a resolved volume to this binding, builder-style
    #[must_use]
    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volume = Some(volume);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalogs::SettingDecl;

    struct FakeWorkspaces;
    impl WorkspaceCatalog for FakeWorkspaces {
        fn resolve(&self, name: &str) -> Option<Volume> {
            Some(Volume::host_path(name, format!("/mnt/{name}"), format!("/host/{name}"), false))
        }
        fn name_for_id(&self, id: u64) -> Option<String> {
            Some(format!("workspace-{id}"))
        }
    }

    struct FakeJobTypes;
    impl JobTypeCatalog for FakeJobTypes {
        fn metadata(&self, _job_type_ref: &str) -> Option<JobTypeMetadata> {
            Some(JobTypeMetadata::default())
        }
    }

    struct FakeSecrets;
    impl SecretsProvider for FakeSecrets {
        fn retrieve_job_type_secrets(
            &self,
            _job_index: &str,
        ) -> Result<BTreeMap<String, Option<String>>, Error> {
            let mut map = BTreeMap::new();
            map.insert("token".to_owned(), Some("xyz".to_owned()));
            Ok(map)
        }
    }

    fn base_conf() -> Conf {
        Conf {
            syslog_address: None,
            search_index_urls: Vec::new(),
            input_root: "/input".to_owned(),
            output_root: "/output".to_owned(),
            cleanup_timeout_minutes: 10,
            max_cancel_batch: 1000,
        }
    }

    // S7 secret redaction
    #[test]
    fn secret_setting_is_masked_in_redacted_but_not_hydrated() {
        let workspaces = FakeWorkspaces;
        let secrets = FakeSecrets;
        let job_types = FakeJobTypes;
        let system_settings = BTreeMap::new();
        let conf = base_conf();
        let cfg = ScheduledConfigurator {
            workspace_catalog: &workspaces,
            job_type_catalog: &job_types,
            secrets_provider: &secrets,
            system_settings: &system_settings,
            conf: &conf,
        };

        let mut enqueue_plan = ExecutionPlan::new("exec-1", true);
        enqueue_plan.tasks.push(Task::new("exec-1_main", TaskType::Main, String::new(), ResourceVector::new()));

        let mut interface = InterfaceDefinition::default();
        interface.settings.push(SettingDecl { name: "token".to_owned(), secret: true });

        let job = DispatchJobInput {
            exec_id: "exec-1".to_owned(),
            is_system: true,
            docker_image: "example:latest".to_owned(),
            required_resources: ResourceVector::from_pairs([("cpu", 1.0)]),
            interface,
            ..Default::default()
        };

        let (redacted, hydrated) = cfg.configure_scheduled_job(&enqueue_plan, &job).unwrap();
        let redacted_main = redacted.task(TaskType::Main).unwrap();
        let hydrated_main = hydrated.task(TaskType::Main).unwrap();
        assert_eq!(redacted_main.env.get("TOKEN"), Some(&"*****".to_owned()));
        assert_eq!(hydrated_main.env.get("TOKEN"), Some(&"xyz".to_owned()));
    }

    #[test]
    fn system_job_only_touches_main_task() {
        let workspaces = FakeWorkspaces;
        let secrets = FakeSecrets;
        let job_types = FakeJobTypes;
        let system_settings = BTreeMap::new();
        let conf = base_conf();
        let cfg = ScheduledConfigurator {
            workspace_catalog: &workspaces,
            job_type_catalog: &job_types,
            secrets_provider: &secrets,
            system_settings: &system_settings,
            conf: &conf,
        };

        let mut enqueue_plan = ExecutionPlan::new("exec-2", true);
        enqueue_plan.tasks.push(Task::new("exec-2_main", TaskType::Main, String::new(), ResourceVector::new()));

        let job = DispatchJobInput {
            exec_id: "exec-2".to_owned(),
            is_system: true,
            docker_image: "example:latest".to_owned(),
            required_resources: ResourceVector::from_pairs([("cpu", 2.0), ("mem", 4.0)]),
            ..Default::default()
        };

        let (redacted, _) = cfg.configure_scheduled_job(&enqueue_plan, &job).unwrap();
        assert_eq!(redacted.tasks.len(), 1);
        let main = redacted.task(TaskType::Main).unwrap();
        assert!(main.resources.is_equal(&ResourceVector::from_pairs([("cpu", 2.0), ("mem", 4.0)])));
    }

    #[test]
    fn regular_job_builds_full_triad_with_disk_math() {
        let workspaces = FakeWorkspaces;
        let secrets = FakeSecrets;
        let job_types = FakeJobTypes;
        let system_settings = BTreeMap::new();
        let conf = base_conf();
        let cfg = ScheduledConfigurator {
            workspace_catalog: &workspaces,
            job_type_catalog: &job_types,
            secrets_provider: &secrets,
            system_settings: &system_settings,
            conf: &conf,
        };

        let mut enqueue_plan = ExecutionPlan::new("exec-3", false);
        enqueue_plan.tasks.push(Task::new("exec-3_main", TaskType::Main, String::new(), ResourceVector::new()));

        let job = DispatchJobInput {
            exec_id: "exec-3".to_owned(),
            is_system: false,
            docker_image: "example:latest".to_owned(),
            input_file_size: 5.0,
            required_resources: ResourceVector::from_pairs([("cpu", 2.0), ("disk", 20.0)]),
            input_workspace_names: vec!["inputs".to_owned()],
            output_workspace_names: vec!["outputs".to_owned()],
            ..Default::default()
        };

        let (redacted, _) = cfg.configure_scheduled_job(&enqueue_plan, &job).unwrap();
        assert_eq!(redacted.tasks.len(), 4);
        let main = redacted.task(TaskType::Main).unwrap();
        assert_eq!(main.resources.get("disk"), 15.0);
        let post = redacted.task(TaskType::Post).unwrap();
        assert_eq!(post.resources.get("disk"), 0.0);
        assert_eq!(main.env.get("OUTPUT_DIR"), Some(&"/output".to_owned()));
    }
}
