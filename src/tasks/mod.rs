//! Background Tasks Module
//!
//! # Tasks
//! - Expiry sweep: drops expired entries from every registered cache
//! - Invalidation listener: applies process-wide cache events

mod cleanup;
mod invalidation;

pub use cleanup::spawn_cleanup_task;
pub use invalidation::{spawn_invalidation_listener, CacheEvent};
