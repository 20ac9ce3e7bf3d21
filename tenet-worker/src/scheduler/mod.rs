//! Scheduler layer for the worker
//!
//! The poll loop that claims pending jobs and runs them, and the periodic
//! ticker used by the reaper and the retention sweep.

pub mod poller;
pub mod ticker;

pub use poller::JobPoller;
pub use ticker::spawn_periodic;
