//! Builds execution plans in two passes: enqueue time, then dispatch time

pub mod dispatch;
pub mod enqueue;

pub use dispatch::{DispatchJobInput, ScheduledConfigurator};
pub use enqueue::{normalize, EnqueueJobInput, QueuedConfigurator, SystemJobKind};
