//! The per-node scheduling state machine
//!
//! Grounded in `scaler::libs::schedulers::allocatable::Allocatable` and its `ClusterResources`/
//! `NodeResources` helpers: a greedy, first-fit allocator that tracks remaining vs. allocated
//! resources as a pair of running totals, logs every accept/reject decision through `tracing`
//! spans, and sheds the cheapest work first when supply shrinks. Unlike `Allocatable`, which owns
//! a whole cluster's worth of nodes across ticks, a `SchedulingNode` is built fresh each tick from
//! one node's offer snapshot and discarded at tick end (§5).

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::models::execution::{JobExecution, Task};
use crate::models::node::NodeRef;
use crate::models::offer::{Offer, ResourceSet};
use crate::models::resources::ResourceVector;

/// A handle to a job execution shared between the scheduler and the outer loop
///
/// Executions can be canceled out-of-band mid-tick (`execution_canceled`); sharing a handle lets
/// [`SchedulingNode::start_job_exe_tasks`] observe that without the scheduler re-fetching state.
pub type ExecHandle = Rc<RefCell<JobExecution>>;

/// Sums the resources required by a slice of tasks
fn sum_task_resources(tasks: &[Task]) -> ResourceVector {
    tasks
        .iter()
        .fold(ResourceVector::new(), |acc, task| acc.add(&task.resources))
}

/// The per-node scheduling state machine
///
/// Constructed once per scheduling tick from an offer snapshot; mutated only by the accept/score/
/// reset/finalize operations below; discarded at tick end. See §3 and §4.2-§4.3.
pub struct SchedulingNode {
    /// The agent this node schedules for
    agent_id: String,
    /// The node's readiness/identity surface
    node_ref: Box<dyn NodeRef>,
    /// Maintenance tasks this node was already running before this tick
    existing_maintenance_tasks: Vec<Task>,
    /// Running executions this node was already hosting before this tick, used for reservation
    /// scoring against higher-priority work
    existing_running_execs: Vec<ExecHandle>,
    /// This tick's resource set: offered, used by pre-existing tasks, and watermark
    resource_set: ResourceSet,
    /// Maintenance tasks accepted this tick
    allocated_maintenance_tasks: Vec<Task>,
    /// `(execution, next task)` pairs accepted this tick for already-running executions
    allocated_next_tasks: Vec<(ExecHandle, Task)>,
    /// Newly accepted queued executions
    allocated_new_execs: Vec<ExecHandle>,
    /// Offers folded into this node so far this tick
    allocated_offers: Vec<Offer>,
    /// Tasks promoted out of `allocated_next_tasks` by [`SchedulingNode::start_job_exe_tasks`]
    allocated_tasks: Vec<Task>,
    /// Resources left after all allocations so far
    remaining_resources: ResourceVector,
    /// Resources consumed by all allocations so far
    allocated_resources: ResourceVector,
}

impl SchedulingNode {
    /// Creates a new scheduling node for this tick
    ///
    /// # Arguments
    ///
    /// * `agent_id` - The agent this node schedules for
    /// * `node_ref` - The node's readiness/identity surface
    /// * `existing_maintenance_tasks` - Maintenance tasks already running on this node
    /// * `existing_running_execs` - Executions already running on this node
    /// * `resource_set` - This tick's offered/used/watermark resource vectors
    pub fn new(
        agent_id: impl Into<String>,
        node_ref: Box<dyn NodeRef>,
        existing_maintenance_tasks: Vec<Task>,
        existing_running_execs: Vec<ExecHandle>,
        resource_set: ResourceSet,
    ) -> Self {
        let remaining_resources = resource_set.offered.clone();
        SchedulingNode {
            agent_id: agent_id.into(),
            node_ref,
            existing_maintenance_tasks,
            existing_running_execs,
            resource_set,
            allocated_maintenance_tasks: Vec::new(),
            allocated_next_tasks: Vec::new(),
            allocated_new_execs: Vec::new(),
            allocated_offers: Vec::new(),
            allocated_tasks: Vec::new(),
            remaining_resources,
            allocated_resources: ResourceVector::new(),
        }
    }

    /// The agent this node schedules for
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Resources left after all allocations so far
    pub fn remaining_resources(&self) -> &ResourceVector {
        &self.remaining_resources
    }

    /// Resources consumed by all allocations so far
    pub fn allocated_resources(&self) -> &ResourceVector {
        &self.allocated_resources
    }

    /// Maintenance tasks accepted this tick
    pub fn allocated_maintenance_tasks(&self) -> &[Task] {
        &self.allocated_maintenance_tasks
    }

    /// `(execution, next task)` pairs accepted this tick
    pub fn allocated_next_tasks(&self) -> &[(ExecHandle, Task)] {
        &self.allocated_next_tasks
    }

    /// Newly accepted queued executions
    pub fn allocated_new_execs(&self) -> &[ExecHandle] {
        &self.allocated_new_execs
    }

    /// Tasks promoted out of next-task allocations by [`SchedulingNode::start_job_exe_tasks`]
    pub fn allocated_tasks(&self) -> &[Task] {
        &self.allocated_tasks
    }

    /// Subtracts `cost` from `remaining_resources` and adds it to `allocated_resources`
    fn commit(&mut self, cost: &ResourceVector) {
        self.remaining_resources = self.remaining_resources.subtract(cost);
        self.allocated_resources = self.allocated_resources.add(cost);
    }

    /// Reverses a previous [`SchedulingNode::commit`]
    fn uncommit(&mut self, cost: &ResourceVector) {
        self.remaining_resources = self.remaining_resources.add(cost);
        self.allocated_resources = self.allocated_resources.subtract(cost);
    }

    /// Accepts this node's pending maintenance tasks, all-or-nothing
    ///
    /// # Arguments
    ///
    /// * `now` - The current time, passed through to [`NodeRef::get_next_tasks`]
    /// * `waiting_out` - Tasks that couldn't be accepted are appended here
    ///
    /// Returns `true` if there were tasks to schedule but they didn't all fit.
    #[instrument(skip(self, waiting_out), fields(agent_id = %self.agent_id))]
    pub fn accept_node_tasks(&mut self, now: DateTime<Utc>, waiting_out: &mut Vec<Task>) -> bool {
        let tasks = self.node_ref.get_next_tasks(now);
        if tasks.is_empty() {
            return false;
        }
        let cost = sum_task_resources(&tasks);
        if self.remaining_resources.dominates(&cost) {
            self.commit(&cost);
            self.allocated_maintenance_tasks.extend(tasks);
            false
        } else {
            tracing::event!(
                tracing::Level::INFO,
                agent_id = %self.agent_id,
                "node maintenance tasks did not fit; deferred"
            );
            waiting_out.extend(tasks);
            true
        }
    }

    /// Accepts the next task of an already-running execution
    ///
    /// # Arguments
    ///
    /// * `exec` - The execution to accept the next task of
    /// * `waiting_out` - The task is appended here if it doesn't fit
    ///
    /// Returns `true` if there was a task to schedule but it didn't fit.
    #[instrument(skip(self, exec, waiting_out), fields(agent_id = %self.agent_id))]
    pub fn accept_job_exe_next_task(&mut self, exec: &ExecHandle, waiting_out: &mut Vec<Task>) -> bool {
        if !self.node_ref.is_ready_for_next_job_task() {
            return false;
        }
        let Some(task) = exec.borrow().next_task() else {
            return false;
        };
        if self.remaining_resources.dominates(&task.resources) {
            self.commit(&task.resources);
            self.allocated_next_tasks.push((Rc::clone(exec), task));
            false
        } else {
            waiting_out.push(task);
            true
        }
    }

    /// Accepts a brand new queued execution
    ///
    /// # Arguments
    ///
    /// * `exec` - The execution to accept
    ///
    /// Callers must feed executions in non-increasing priority order; this node accepts
    /// greedily, first-fit by call order.
    #[instrument(skip(self, exec), fields(agent_id = %self.agent_id))]
    pub fn accept_new_job_exe(&mut self, exec: &ExecHandle) -> bool {
        if !self.node_ref.is_ready_for_new_job() {
            return false;
        }
        let required = exec.borrow().required_resources.clone();
        if self.remaining_resources.dominates(&required) {
            self.commit(&required);
            exec.borrow_mut().provided_node_id = Some(self.node_ref.id());
            self.allocated_new_execs.push(Rc::clone(exec));
            true
        } else {
            false
        }
    }

    /// Reverses every acceptance made by [`SchedulingNode::accept_new_job_exe`] this tick
    ///
    /// Maintenance tasks and next-task allocations are left untouched.
    pub fn reset_new_job_exes(&mut self) {
        for exec in self.allocated_new_execs.drain(..) {
            let required = exec.borrow().required_resources.clone();
            self.uncommit(&required);
            exec.borrow_mut().provided_node_id = None;
        }
    }

    /// Folds newly received offers into this node, shedding allocations if supply has shrunk
    ///
    /// Sheds, in order, until the summed offers dominate `allocated_resources`: all new queued
    /// executions, then all running-exec next-tasks, then all maintenance tasks.
    ///
    /// # Arguments
    ///
    /// * `offers` - The offers to fold in
    #[instrument(skip(self, offers), fields(agent_id = %self.agent_id))]
    pub fn add_allocated_offers(&mut self, offers: Vec<Offer>) {
        let available = Offer::sum(&offers);

        if !available.dominates(&self.allocated_resources) {
            tracing::event!(
                tracing::Level::WARN,
                agent_id = %self.agent_id,
                "offers shrank below allocated resources; shedding"
            );
            self.shed_new_execs();
        }
        if !available.dominates(&self.allocated_resources) {
            self.shed_next_tasks();
        }
        if !available.dominates(&self.allocated_resources) {
            self.shed_maintenance_tasks();
        }

        self.allocated_offers.extend(offers);
    }

    /// Drops every allocated new execution, restoring its resources
    fn shed_new_execs(&mut self) {
        for exec in self.allocated_new_execs.drain(..) {
            let required = exec.borrow().required_resources.clone();
            self.uncommit(&required);
            exec.borrow_mut().provided_node_id = None;
        }
    }

    /// Drops every allocated running-exec next-task, restoring its resources
    fn shed_next_tasks(&mut self) {
        for (_, task) in self.allocated_next_tasks.drain(..) {
            self.uncommit(&task.resources);
        }
    }

    /// Drops every allocated maintenance task, restoring its resources
    fn shed_maintenance_tasks(&mut self) {
        for task in self.allocated_maintenance_tasks.drain(..) {
            self.uncommit(&task.resources);
        }
    }

    /// Promotes every next-task allocation whose execution is still live into `allocated_tasks`
    ///
    /// Executions observed to be canceled (or otherwise out of tasks) mid-tick are dropped
    /// silently, per the cancellation semantics in §5.
    pub fn start_job_exe_tasks(&mut self) {
        for (exec, task) in self.allocated_next_tasks.drain(..) {
            if exec.borrow().next_task().is_some() {
                self.allocated_tasks.push(task);
            }
        }
    }

    /// Scores a candidate execution for plain scheduling fit
    ///
    /// `available = watermark - used_by_existing_tasks - allocated_resources - exec.required`.
    /// Returns `None` if any component of `available` would be negative; otherwise the count of
    /// `job_type_resource_samples` that fit within `available`.
    ///
    /// # Arguments
    ///
    /// * `exec` - The candidate execution
    /// * `job_type_resource_samples` - Representative resource footprints of other job types
    #[instrument(skip(self, exec, job_type_resource_samples), fields(agent_id = %self.agent_id))]
    pub fn score_job_exe_for_scheduling(
        &self,
        exec: &ExecHandle,
        job_type_resource_samples: &[ResourceVector],
    ) -> Option<usize> {
        let required = exec.borrow().required_resources.clone();
        let spoken_for = self
            .resource_set
            .used_by_existing_tasks
            .add(&self.allocated_resources)
            .add(&required);
        let available = self.resource_set.watermark.checked_subtract(&spoken_for)?;
        Some(
            job_type_resource_samples
                .iter()
                .filter(|sample| available.dominates(sample))
                .count(),
        )
    }

    /// Scores a candidate execution for reservation against higher-priority work
    ///
    /// `available` additionally subtracts maintenance-task costs and the requirements of any
    /// higher-priority existing running execution or newly accepted execution (lower numeric
    /// priority value is higher priority; strictly higher than the candidate's own).
    ///
    /// # Arguments
    ///
    /// * `exec` - The candidate execution
    /// * `job_type_resource_samples` - Representative resource footprints of other job types
    #[instrument(skip(self, exec, job_type_resource_samples), fields(agent_id = %self.agent_id))]
    pub fn score_job_exe_for_reservation(
        &self,
        exec: &ExecHandle,
        job_type_resource_samples: &[ResourceVector],
    ) -> Option<usize> {
        let candidate_priority = exec.borrow().priority;
        let maintenance_cost = sum_task_resources(&self.existing_maintenance_tasks)
            .add(&sum_task_resources(&self.allocated_maintenance_tasks));

        let higher_priority_existing = self
            .existing_running_execs
            .iter()
            .filter(|e| e.borrow().priority < candidate_priority)
            .fold(ResourceVector::new(), |acc, e| {
                acc.add(&e.borrow().required_resources)
            });

        let higher_priority_new = self
            .allocated_new_execs
            .iter()
            .filter(|e| e.borrow().priority < candidate_priority)
            .fold(ResourceVector::new(), |acc, e| {
                acc.add(&e.borrow().required_resources)
            });

        let required = exec.borrow().required_resources.clone();
        let spoken_for = maintenance_cost
            .add(&higher_priority_existing)
            .add(&higher_priority_new)
            .add(&required);

        let available = self.resource_set.watermark.checked_subtract(&spoken_for)?;
        Some(
            job_type_resource_samples
                .iter()
                .filter(|sample| available.dominates(sample))
                .count(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::execution::TaskType;
    use crate::models::node::test_support::FakeNode;

    fn resources(pairs: &[(&str, f64)]) -> ResourceVector {
        ResourceVector::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)))
    }

    fn node_with(offered: ResourceVector, watermark: ResourceVector) -> SchedulingNode {
        let resource_set = ResourceSet::new(offered, ResourceVector::new(), watermark);
        SchedulingNode::new(
            "agent_1",
            Box::new(FakeNode::new(1)),
            Vec::new(),
            Vec::new(),
            resource_set,
        )
    }

    fn exec_handle(required: ResourceVector, priority: i32) -> ExecHandle {
        let mut job_exe = JobExecution::new(
            "exec-1",
            "cluster-1",
            "example:latest",
            required,
            priority,
        );
        job_exe.stage_next_task(Task::new("t1", TaskType::Main, "agent_1", ResourceVector::new()));
        Rc::new(RefCell::new(job_exe))
    }

    // S1 resource fit
    #[test]
    fn accept_job_exe_next_task_fits() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        let mut waiting = Vec::new();

        let had_waiting = node.accept_job_exe_next_task(&exec, &mut waiting);

        assert!(!had_waiting);
        assert_eq!(node.allocated_next_tasks().len(), 1);
        assert!(node.allocated_resources().is_equal(&resources(&[("cpu", 1.0), ("mem", 10.0)])));
        assert!(node.remaining_resources().is_equal(&resources(&[("cpu", 9.0), ("mem", 40.0)])));
        assert!(waiting.is_empty());
    }

    // S2 resource miss
    #[test]
    fn accept_job_exe_next_task_insufficient_resources() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 11.0), ("mem", 10.0)]), 10);
        let mut waiting = Vec::new();

        let had_waiting = node.accept_job_exe_next_task(&exec, &mut waiting);

        assert!(had_waiting);
        assert!(node.allocated_next_tasks().is_empty());
        assert!(node.allocated_resources().is_equal(&ResourceVector::new()));
        assert!(node.remaining_resources().is_equal(&resources(&[("cpu", 10.0), ("mem", 50.0)])));
        assert_eq!(waiting.len(), 1);
    }

    // S3 canceled exec
    #[test]
    fn accept_job_exe_next_task_canceled() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        exec.borrow_mut().execution_canceled();
        let mut waiting = Vec::new();

        let had_waiting = node.accept_job_exe_next_task(&exec, &mut waiting);

        assert!(!had_waiting);
        assert!(node.allocated_next_tasks().is_empty());
        assert!(node.remaining_resources().is_equal(&resources(&[("cpu", 10.0), ("mem", 50.0)])));
        assert!(waiting.is_empty());
    }

    #[test]
    fn accept_job_exe_next_task_no_jobs() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        node.node_ref = Box::new({
            let mut fake = FakeNode::new(1);
            fake.ready_for_next_job_task = false;
            fake
        });
        let exec = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        let mut waiting = Vec::new();

        let had_waiting = node.accept_job_exe_next_task(&exec, &mut waiting);

        assert!(!had_waiting);
        assert!(node.allocated_next_tasks().is_empty());
        assert!(waiting.is_empty());
    }

    #[test]
    fn accept_new_job_exe_fits_and_stamps_node_id() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);

        let accepted = node.accept_new_job_exe(&exec);

        assert!(accepted);
        assert_eq!(node.allocated_new_execs().len(), 1);
        assert!(node.allocated_resources().is_equal(&resources(&[("cpu", 1.0), ("mem", 10.0)])));
        assert_eq!(exec.borrow().provided_node_id, Some(1));
    }

    #[test]
    fn accept_new_job_exe_insufficient_resources() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 11.0), ("mem", 10.0)]), 10);

        let accepted = node.accept_new_job_exe(&exec);

        assert!(!accepted);
        assert!(node.allocated_new_execs().is_empty());
        assert_eq!(exec.borrow().provided_node_id, None);
    }

    #[test]
    fn reset_new_job_exes_restores_state() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        node.accept_new_job_exe(&exec);

        node.reset_new_job_exes();

        assert!(node.allocated_new_execs().is_empty());
        assert!(node.allocated_resources().is_equal(&ResourceVector::new()));
        assert!(node.remaining_resources().is_equal(&resources(&[("cpu", 10.0), ("mem", 50.0)])));
        assert_eq!(exec.borrow().provided_node_id, None);
    }

    // S4 offer shed
    #[test]
    fn add_allocated_offers_sheds_new_execs_and_next_tasks_before_maintenance() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 2048.0)]),
            resources(&[("cpu", 100.0), ("mem", 5000.0)]),
        );
        let maintenance_cost = resources(&[("cpu", 0.6), ("mem", 1024.0)]);
        node.allocated_maintenance_tasks.push(Task::new(
            "health",
            TaskType::Health,
            "agent_1",
            resources(&[("cpu", 0.3), ("mem", 512.0)]),
        ));
        node.allocated_maintenance_tasks.push(Task::new(
            "pull",
            TaskType::Pull,
            "agent_1",
            resources(&[("cpu", 0.3), ("mem", 512.0)]),
        ));
        node.commit(&maintenance_cost);

        let exec_a = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        node.accept_job_exe_next_task(&exec_a, &mut Vec::new());
        let exec_b = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        node.accept_job_exe_next_task(&exec_b, &mut Vec::new());

        let offers = vec![Offer::new(
            "offer-1",
            "agent_1",
            "framework_1",
            maintenance_cost.clone(),
            Utc::now(),
        )];
        node.add_allocated_offers(offers);

        assert!(node.allocated_next_tasks().is_empty());
        assert_eq!(node.allocated_maintenance_tasks().len(), 2);
        assert!(node.allocated_resources().is_equal(&maintenance_cost));
    }

    #[test]
    fn start_job_exe_tasks_drops_canceled_executions() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        node.accept_job_exe_next_task(&exec, &mut Vec::new());
        exec.borrow_mut().execution_canceled();

        node.start_job_exe_tasks();

        assert!(node.allocated_tasks().is_empty());
    }

    #[test]
    fn start_job_exe_tasks_promotes_live_executions() {
        let mut node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 100.0), ("mem", 500.0)]),
        );
        let exec = exec_handle(resources(&[("cpu", 1.0), ("mem", 10.0)]), 10);
        node.accept_job_exe_next_task(&exec, &mut Vec::new());

        node.start_job_exe_tasks();

        assert_eq!(node.allocated_tasks().len(), 1);
    }

    // S5 reservation score
    #[test]
    fn score_job_exe_for_reservation_counts_fitting_samples() {
        let mut node = node_with(
            resources(&[("cpu", 200.0), ("mem", 700.0)]),
            resources(&[("cpu", 200.0), ("mem", 700.0)]),
        );
        node.existing_maintenance_tasks.push(Task::new(
            "health",
            TaskType::Health,
            "agent_1",
            resources(&[("cpu", 0.1), ("mem", 32.0)]),
        ));
        let existing = exec_handle(resources(&[("cpu", 56.0), ("mem", 15.0)]), 1);
        node.existing_running_execs.push(existing);
        let new_exec = exec_handle(resources(&[("cpu", 8.0), ("mem", 40.0)]), 1);
        node.allocated_new_execs.push(new_exec);

        let candidate = exec_handle(resources(&[("cpu", 130.0), ("mem", 600.0)]), 5);
        let samples = vec![
            resources(&[("cpu", 2.0), ("mem", 10.0)]),
            resources(&[("cpu", 5.5), ("mem", 12.0)]),
            resources(&[("cpu", 6.0), ("mem", 10.0)]),
            resources(&[("cpu", 2.0), ("mem", 14.0)]),
        ];

        let score = node.score_job_exe_for_reservation(&candidate, &samples);

        assert_eq!(score, Some(2));
    }

    #[test]
    fn score_returns_none_on_negative_component() {
        let node = node_with(
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
            resources(&[("cpu", 10.0), ("mem", 50.0)]),
        );
        let candidate = exec_handle(resources(&[("cpu", 20.0), ("mem", 10.0)]), 5);
        assert_eq!(node.score_job_exe_for_scheduling(&candidate, &[]), None);
    }
}
