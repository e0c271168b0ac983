//! Plans the shell-script cleanup task a node runs to reclaim stopped containers and volumes
//!
//! Grounded in `original_source/scale/job/execution/tasks/cleanup_task.py`: a cleanup task is
//! either an *initial sweep* (no executions named, runs right after agent registration and wipes
//! every non-running container/dangling volume on the node) or a *targeted sweep* (a list of
//! execution ids, runs after those executions finish and only touches resources that match their
//! names), plus a safety-net loop that force-kills containers still running past the timeout.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::conf::Conf;
use crate::models::execution::{Task, TaskType};
use crate::models::resources::ResourceVector;

/// Resources reserved for a cleanup task: a sliver of CPU and a fixed MiB allowance
fn cleanup_resources() -> ResourceVector {
    ResourceVector::from_pairs([("cpus", 0.1), ("mem", 32.0)])
}

/// Monotonic counter giving every cleanup task a unique id on this process
static CLEANUP_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Builds the `docker ps` filter that matches every non-running container
fn all_nonrunning_containers_cmd() -> String {
    "docker ps -aq --filter status=exited --filter status=dead".to_owned()
}

/// Builds the `docker volume ls` filter that matches every dangling volume
fn all_scale_dangling_volumes_cmd() -> String {
    "docker volume ls -qf dangling=true".to_owned()
}

/// Builds a grep-style alternation pattern matching any of `executions`
fn name_alternation(executions: &[String]) -> String {
    executions.join("|")
}

/// Lists the non-running containers whose names reference one of `executions`
fn targeted_containers_cmd(executions: &[String]) -> String {
    format!(
        "docker ps -a --format '{{{{.ID}}}} {{{{.Names}}}}' | grep -E '({})' | awk '{{print $1}}'",
        name_alternation(executions)
    )
}

/// Lists the volumes whose names reference one of `executions`
fn targeted_volumes_cmd(executions: &[String]) -> String {
    format!("docker volume ls -q | grep -E '({})'", name_alternation(executions))
}

/// A loop that force-kills containers belonging to `executions` still running past `timeout_minutes`
fn stuck_container_safety_net(executions: &[String], timeout_minutes: i64) -> String {
    format!(
        "for cid in $(docker ps -q --format '{{{{.ID}}}} {{{{.Names}}}}' | grep -E '({})' | awk '{{print $1}}'); do \
         started=$(docker inspect -f '{{{{.State.StartedAt}}}}' \"$cid\"); \
         elapsed=$(( ($(date +%s) - $(date -d \"$started\" +%s)) / 60 )); \
         if [ \"$elapsed\" -gt {timeout_minutes} ]; then docker kill \"$cid\"; fi; \
         done",
        name_alternation(executions)
    )
}

/// Plans cleanup tasks for nodes
pub struct CleanupPlanner<'a> {
    /// The scheduling framework's id, embedded in every cleanup task's id
    pub framework_id: String,
    /// Ambient settings, read for the stuck-container timeout
    pub conf: &'a Conf,
}

impl<'a> CleanupPlanner<'a> {
    /// Plans a cleanup task for `node_id`
    ///
    /// # Arguments
    ///
    /// * `node_id` - The node this task will run on
    /// * `executions` - The finished execution ids to target; empty means an initial sweep of
    ///   everything non-running on the node
    pub fn plan_cleanup(&self, node_id: u64, executions: &[String]) -> Task {
        let n = CLEANUP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let id = format!("scale_cleanup_{}_{n}", self.framework_id);

        let (containers_cmd, volumes_cmd) = if executions.is_empty() {
            (all_nonrunning_containers_cmd(), all_scale_dangling_volumes_cmd())
        } else {
            (targeted_containers_cmd(executions), targeted_volumes_cmd(executions))
        };

        let stuck_cmd = if executions.is_empty() {
            String::new()
        } else {
            stuck_container_safety_net(executions, self.conf.cleanup_timeout_minutes)
        };

        let delete_containers = format!("docker rm -v $({containers_cmd}) 2>/dev/null");
        let delete_volumes = format!("docker volume rm $({volumes_cmd}) 2>/dev/null");
        let command = format!("{delete_containers}; {stuck_cmd}; {delete_volumes}");

        let mut task = Task::new(id, TaskType::Cleanup, format!("node-{node_id}"), cleanup_resources());
        task.command_args = vec![command];
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf() -> Conf {
        Conf {
            syslog_address: None,
            search_index_urls: Vec::new(),
            input_root: "/input".to_owned(),
            output_root: "/output".to_owned(),
            cleanup_timeout_minutes: 10,
            max_cancel_batch: 1000,
        }
    }

    #[test]
    fn initial_sweep_targets_every_nonrunning_container() {
        let conf = conf();
        let planner = CleanupPlanner { framework_id: "fw-1".to_owned(), conf: &conf };
        let task = planner.plan_cleanup(7, &[]);
        let command = &task.command_args[0];
        assert!(command.contains("status=exited"));
        assert!(command.contains("dangling=true"));
        assert!(task.id.starts_with("scale_cleanup_fw-1_"));
    }

    #[test]
    fn targeted_sweep_greps_for_execution_names() {
        let conf = conf();
        let planner = CleanupPlanner { framework_id: "fw-1".to_owned(), conf: &conf };
        let executions = vec!["exec-1".to_owned(), "exec-2".to_owned()];
        let task = planner.plan_cleanup(7, &executions);
        let command = &task.command_args[0];
        assert!(command.contains("exec-1|exec-2"));
        assert!(command.contains("-gt 10"));
    }

    #[test]
    fn cleanup_task_ids_are_unique_across_calls() {
        let conf = conf();
        let planner = CleanupPlanner { framework_id: "fw-1".to_owned(), conf: &conf };
        let first = planner.plan_cleanup(1, &[]);
        let second = planner.plan_cleanup(1, &[]);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn cleanup_task_resources_are_fixed() {
        let conf = conf();
        let planner = CleanupPlanner { framework_id: "fw-1".to_owned(), conf: &conf };
        let task = planner.plan_cleanup(1, &[]);
        assert_eq!(task.resources.get("cpus"), 0.1);
        assert_eq!(task.resources.get("mem"), 32.0);
    }
}
