//! The per-tick scheduling engine

pub mod scheduling_node;

pub use scheduling_node::SchedulingNode;
