//! The per-node runtime view the scheduler consults each tick

use chrono::{DateTime, Utc};

use super::execution::Task;

/// The readiness and identity surface a node exposes to the scheduler
///
/// This is a thin collaborator boundary: the concrete node implementation (tracking agent
/// health, drain state, pending maintenance work) lives outside this crate. The scheduler only
/// ever asks a node these questions.
pub trait NodeRef {
    /// The agent id this node runs on
    fn agent_id(&self) -> &str;
    /// The hostname of this node, for logging
    fn hostname(&self) -> &str;
    /// The node's numeric id, stamped onto accepted queued executions
    fn id(&self) -> u64;
    /// Whether this node will currently accept a brand new queued execution
    fn is_ready_for_new_job(&self) -> bool;
    /// Whether this node will currently accept the next task of an already-running execution
    fn is_ready_for_next_job_task(&self) -> bool;
    /// Returns the maintenance tasks (health checks, pulls, cleanup, etc.) due to run right now
    ///
    /// # Arguments
    ///
    /// * `now` - The current time, used to decide which maintenance tasks are due
    fn get_next_tasks(&self, now: DateTime<Utc>) -> Vec<Task>;
}

#[cfg(test)]
pub mod test_support {
    use std::cell::RefCell;

    use super::*;

    /// A scriptable [`NodeRef`] for exercising the scheduling node in tests
    pub struct FakeNode {
        pub agent_id: String,
        pub hostname: String,
        pub id: u64,
        pub ready_for_new_job: bool,
        pub ready_for_next_job_task: bool,
        pub next_tasks: RefCell<Vec<Task>>,
    }

    impl FakeNode {
        pub fn new(id: u64) -> Self {
            FakeNode {
                agent_id: "agent_1".to_owned(),
                hostname: "host_1".to_owned(),
                id,
                ready_for_new_job: true,
                ready_for_next_job_task: true,
                next_tasks: RefCell::new(Vec::new()),
            }
        }

        pub fn with_next_tasks(mut self, tasks: Vec<Task>) -> Self {
            self.next_tasks = RefCell::new(tasks);
            self
        }
    }

    impl NodeRef for FakeNode {
        fn agent_id(&self) -> &str {
            &self.agent_id
        }

        fn hostname(&self) -> &str {
            &self.hostname
        }

        fn id(&self) -> u64 {
            self.id
        }

        fn is_ready_for_new_job(&self) -> bool {
            self.ready_for_new_job
        }

        fn is_ready_for_next_job_task(&self) -> bool {
            self.ready_for_next_job_task
        }

        fn get_next_tasks(&self, _now: DateTime<Utc>) -> Vec<Task> {
            self.next_tasks.borrow_mut().drain(..).collect()
        }
    }
}
