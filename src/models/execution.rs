//! Executions and the tasks that make them up

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::plan::{Mount, WorkspaceBinding};
use super::resources::ResourceVector;

/// The lifecycle phase of a job execution
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting to be matched to a node
    Queued,
    /// Matched to a node; waiting for its next task to be scheduled
    NextTaskPending,
    /// Actively running on a node
    Running,
    /// Canceled; no further tasks will be scheduled
    Canceled,
    /// Completed, successfully or not
    Finished,
}

/// The kind of container launch a [`Task`] represents
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    /// Pulls the execution's docker image
    Pull,
    /// Runs the execution's pre-processing step
    Pre,
    /// Runs the execution's main step
    Main,
    /// Runs the execution's post-processing step
    Post,
    /// A node health check
    Health,
    /// A node cleanup sweep
    Cleanup,
    /// Any other node-level maintenance task
    NodeOther,
}

/// A single container launch, belonging either to an execution or to node maintenance
#[derive(Debug, Clone)]
pub struct Task {
    /// This task's id
    pub id: String,
    /// What kind of task this is
    pub task_type: TaskType,
    /// The agent this task is destined for
    pub agent_id: String,
    /// The resources this task requires
    pub resources: ResourceVector,
    /// The command line arguments passed to the container
    pub command_args: Vec<String>,
    /// The environment variables passed to the container, insertion-ordered
    pub env: BTreeMap<String, String>,
    /// Ordered `(key, value)` container parameters (env, log options, shm-size, volumes, ...)
    pub container_params: Vec<(String, String)>,
    /// Mounts declared by the job-type interface, resolved against the job-type's configuration
    pub mounts: Vec<Mount>,
    /// Workspace volumes bound into this task
    pub workspaces: Vec<WorkspaceBinding>,
    /// Settings (system and job-type declared) projected onto this task, name to value
    pub settings: BTreeMap<String, String>,
}

impl Task {
    /// Creates a new, empty task of the given type
    ///
    /// # Arguments
    ///
    /// * `id` - This task's id
    /// * `task_type` - What kind of task this is
    /// * `agent_id` - The agent this task is destined for
    /// * `resources` - The resources this task requires
    pub fn new<T: Into<String>, A: Into<String>>(
        id: T,
        task_type: TaskType,
        agent_id: A,
        resources: ResourceVector,
    ) -> Self {
        Task {
            id: id.into(),
            task_type,
            agent_id: agent_id.into(),
            resources,
            command_args: Vec::new(),
            env: BTreeMap::new(),
            container_params: Vec::new(),
            mounts: Vec::new(),
            workspaces: Vec::new(),
            settings: BTreeMap::new(),
        }
    }
}

/// The core's abstract view of a single attempt at running one job
///
/// The real job-catalog record (persistence, retries, timestamps) lives outside this crate;
/// the scheduler and configurators only need the fields below.
#[derive(Debug, Clone)]
pub struct JobExecution {
    /// This execution's id
    pub id: String,
    /// The cluster this execution belongs to
    pub cluster_id: String,
    /// The docker image to run
    pub docker_image: String,
    /// The size, in bytes, of this execution's input data
    pub input_file_size: f64,
    /// The resources required to run this execution's next task
    pub required_resources: ResourceVector,
    /// A reference to this execution's job-type
    pub job_type_ref: String,
    /// A reference to this execution's interface definition
    pub interface_ref: String,
    /// This execution's priority; lower numeric value is higher priority
    pub priority: i32,
    /// This execution's current lifecycle phase
    pub phase: Phase,
    /// The node id this execution was provided to, once accepted
    pub provided_node_id: Option<u64>,
    /// The next task to run, if any is currently pending
    next_task: Option<Task>,
}

impl JobExecution {
    /// Creates a new job execution
    ///
    /// # Arguments
    ///
    /// * `id` - This execution's id
    /// * `cluster_id` - The cluster this execution belongs to
    /// * `docker_image` - The docker image to run
    /// * `required_resources` - The resources required to run this execution's next task
    /// * `priority` - This execution's priority; lower numeric value is higher priority
    pub fn new<T: Into<String>, C: Into<String>, I: Into<String>>(
        id: T,
        cluster_id: C,
        docker_image: I,
        required_resources: ResourceVector,
        priority: i32,
    ) -> Self {
        JobExecution {
            id: id.into(),
            cluster_id: cluster_id.into(),
            docker_image: docker_image.into(),
            input_file_size: 0.0,
            required_resources,
            job_type_ref: String::new(),
            interface_ref: String::new(),
            priority,
            phase: Phase::Queued,
            provided_node_id: None,
            next_task: None,
        }
    }

    /// Sets the task that should be returned by [`JobExecution::next_task`]
    ///
    /// # Arguments
    ///
    /// * `task` - The task to stage as this execution's next task
    pub fn stage_next_task(&mut self, task: Task) {
        self.next_task = Some(task);
        self.phase = Phase::NextTaskPending;
    }

    /// Returns this execution's next task, or `None` if it's canceled, finished, or has none
    pub fn next_task(&self) -> Option<Task> {
        if matches!(self.phase, Phase::Canceled | Phase::Finished) {
            return None;
        }
        self.next_task.clone()
    }

    /// Marks this execution as canceled
    ///
    /// After this call, [`JobExecution::next_task`] always returns `None`.
    pub fn execution_canceled(&mut self) {
        self.phase = Phase::Canceled;
    }

    /// Returns true if this execution has been canceled
    pub fn is_canceled(&self) -> bool {
        self.phase == Phase::Canceled
    }
}
