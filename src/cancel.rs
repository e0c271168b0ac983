//! The bulk job-cancel command: descending-id pagination over a filter, one page at a time
//!
//! Grounded in `original_source/scale/job/messages/cancel_jobs_bulk.py`: a single command instance
//! only ever cancels one page of jobs. When a page comes back exactly full, it hands off a
//! successor message carrying the last id it saw so the caller can re-queue it and keep paging;
//! a page that comes back short means the filter is exhausted.

/// One job id a bulk-cancel page considered, and whether it was eligible to be canceled
#[derive(Debug, Clone, Copy)]
pub struct CancelCandidate {
    /// The job's id
    pub id: u64,
    /// Whether this job's current status allows it to be canceled
    pub cancelable: bool,
}

/// Looks up jobs matching a cancel filter, one descending-id page at a time
pub trait CancelJobCatalog {
    /// Returns up to `limit` jobs matching `filter`, strictly below `before_id` if given, in
    /// descending id order
    ///
    /// # Arguments
    ///
    /// * `filter` - The opaque filter expression jobs are matched against
    /// * `before_id` - Only return jobs with an id strictly less than this
    /// * `limit` - The maximum number of jobs to return
    fn next_page(&self, filter: &str, before_id: Option<u64>, limit: usize) -> Vec<CancelCandidate>;
}

/// A bulk-cancel command: a filter plus the cursor left by any prior page
#[derive(Debug, Clone)]
pub struct CancelJobsBulk {
    /// The filter expression selecting which jobs to cancel
    pub filter: String,
    /// The last job id seen by the prior page, if this is a successor message
    pub current_job_id: Option<u64>,
}

/// The outcome of running one page of a bulk-cancel command
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    /// The ids actually marked canceled on this page
    pub canceled_job_ids: Vec<u64>,
    /// The successor message to re-queue, if this page came back exactly full
    pub successor: Option<CancelJobsBulk>,
}

/// Executes bulk-cancel commands a page at a time
pub struct CancelExecutor<'a> {
    /// Looks up jobs matching a filter
    pub catalog: &'a dyn CancelJobCatalog,
    /// The page size; mirrors [`crate::conf::Conf::max_cancel_batch`]
    pub max_batch: usize,
}

impl<'a> CancelExecutor<'a> {
    /// Runs one page of `command`
    ///
    /// Always succeeds: an empty or short page simply means there's nothing left to cancel, not
    /// an error.
    ///
    /// # Arguments
    ///
    /// * `command` - The bulk-cancel command (and cursor) to run
    pub fn execute(&self, command: &CancelJobsBulk) -> CancelOutcome {
        let page = self
            .catalog
            .next_page(&command.filter, command.current_job_id, self.max_batch);

        let mut canceled_job_ids = Vec::new();
        let mut last_job_id = command.current_job_id;
        for candidate in &page {
            last_job_id = Some(candidate.id);
            if candidate.cancelable {
                canceled_job_ids.push(candidate.id);
            }
        }

        let successor = if page.len() == self.max_batch {
            Some(CancelJobsBulk {
                filter: command.filter.clone(),
                current_job_id: last_job_id,
            })
        } else {
            None
        };

        CancelOutcome { canceled_job_ids, successor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeJobs {
        /// Job ids `1..=count`, all cancelable
        count: u64,
    }

    impl CancelJobCatalog for FakeJobs {
        fn next_page(&self, _filter: &str, before_id: Option<u64>, limit: usize) -> Vec<CancelCandidate> {
            let ceiling = before_id.unwrap_or(self.count + 1);
            let mut ids: Vec<u64> = (1..ceiling).rev().collect();
            ids.truncate(limit);
            ids.into_iter().map(|id| CancelCandidate { id, cancelable: true }).collect()
        }
    }

    // S8: 2,500 jobs paginate as 2500..1501, 1500..501, 500..1
    #[test]
    fn bulk_cancel_pages_through_every_job_descending() {
        let catalog = FakeJobs { count: 2500 };
        let executor = CancelExecutor { catalog: &catalog, max_batch: 1000 };

        let first = executor.execute(&CancelJobsBulk { filter: "all".to_owned(), current_job_id: None });
        assert_eq!(first.canceled_job_ids.len(), 1000);
        assert_eq!(first.canceled_job_ids[0], 2500);
        assert_eq!(*first.canceled_job_ids.last().unwrap(), 1501);
        let successor = first.successor.expect("full page should hand off a successor");

        let second = executor.execute(&successor);
        assert_eq!(second.canceled_job_ids.len(), 1000);
        assert_eq!(second.canceled_job_ids[0], 1500);
        assert_eq!(*second.canceled_job_ids.last().unwrap(), 501);
        let successor = second.successor.expect("full page should hand off a successor");

        let third = executor.execute(&successor);
        assert_eq!(third.canceled_job_ids.len(), 500);
        assert_eq!(third.canceled_job_ids[0], 500);
        assert_eq!(*third.canceled_job_ids.last().unwrap(), 1);
        assert!(third.successor.is_none());
    }

    #[test]
    fn empty_filter_result_has_no_successor() {
        let catalog = FakeJobs { count: 0 };
        let executor = CancelExecutor { catalog: &catalog, max_batch: 1000 };
        let outcome = executor.execute(&CancelJobsBulk { filter: "none".to_owned(), current_job_id: None });
        assert!(outcome.canceled_job_ids.is_empty());
        assert!(outcome.successor.is_none());
    }
}
