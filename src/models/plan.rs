//! The execution plan: the fully-typed record the configurators build and the launcher consumes
//!
//! Thorium's job catalog represents a job's launch configuration as a free-form mapping; per the
//! dynamic-dict-plans-to-typed-record design note, here it's a tagged record instead, built up
//! task by task by the enqueue and dispatch configurators (`crate::configurator`).

use std::collections::BTreeMap;

use super::execution::Task;

/// Whether a workspace is bound read-only or read-write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read-only
    RO,
    /// Read-write
    RW,
}

/// A workspace a task needs mounted, and how
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceBinding {
    /// The workspace's name
    pub name: String,
    /// Whether this task needs read-only or read-write access
    pub mode: Mode,
    /// The volume this workspace resolves to, once the workspace catalog has been consulted
    pub volume: Option<super::volumes::Volume>,
}

impl WorkspaceBinding {
    /// Creates a new, unresolved workspace binding
    ///
    /// # Arguments
    ///
    /// * `name` - The workspace's name
    /// * `mode` - Whether this task needs read-only or read-write access
    pub fn new<T: Into<String>>(name: T, mode: Mode) -> Self {
        WorkspaceBinding {
            name: name.into(),
            mode,
            volume: None,
        }
    }
}

pub use super::volumes::Mount;

/// An execution's fully materialised set of tasks
///
/// Invariant: `main` is always present. `pull`/`pre`/`post` are present iff `pull` is present
/// (the regular-job triad); system jobs carry only `main`.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// The execution this plan belongs to
    pub exec_id: String,
    /// Whether this plan belongs to a system job (main-only) or a regular job (full triad)
    pub is_system: bool,
    /// This plan's tasks, in launch order
    pub tasks: Vec<Task>,
    /// Regular jobs only: the declared output-workspace id→name mapping, cached at enqueue time.
    /// Not attached to any task's workspaces — see `configurator::enqueue`'s grounding note.
    pub output_workspaces: BTreeMap<u64, String>,
}

impl ExecutionPlan {
    /// Creates a new, empty plan
    ///
    /// # Arguments
    ///
    /// * `exec_id` - The execution this plan belongs to
    /// * `is_system` - Whether this plan belongs to a system job
    pub fn new<T: Into<String>>(exec_id: T, is_system: bool) -> Self {
        ExecutionPlan {
            exec_id: exec_id.into(),
            is_system,
            tasks: Vec::new(),
            output_workspaces: BTreeMap::new(),
        }
    }

    /// Returns a mutable reference to this plan's task of the given type, if present
    ///
    /// # Arguments
    ///
    /// * `task_type` - The task type to look up
    pub fn task_mut(&mut self, task_type: super::execution::TaskType) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.task_type == task_type)
    }

    /// Returns a reference to this plan's task of the given type, if present
    ///
    /// # Arguments
    ///
    /// * `task_type` - The task type to look up
    pub fn task(&self, task_type: super::execution::TaskType) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_type == task_type)
    }
}
