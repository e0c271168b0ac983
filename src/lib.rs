//! Scale: the scheduling and execution-configuration engine for cluster job execution
//!
//! [`scheduler`] matches offered node resources to waiting job executions one tick at a time.
//! [`configurator`] turns a job's declared inputs into a fully materialised, launchable task plan
//! in two passes: [`configurator::enqueue`] at queue time and [`configurator::dispatch`] once a
//! node has been chosen. [`cleanup`] and [`cancel`] round out the node- and job-lifecycle
//! maintenance commands this engine is responsible for planning.

pub mod cancel;
pub mod cleanup;
pub mod conf;
pub mod configurator;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod utils;

pub use conf::Conf;
pub use error::Error;
