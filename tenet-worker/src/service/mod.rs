//! Service Module
//!
//! Business logic between the HTTP/scheduler layers and the stores.

pub mod claim;
pub mod job;
pub mod qa;
pub mod reaper;
pub mod retention;

pub use claim::{ClaimService, TriggerClaim};
pub use qa::{QaError, QaService};
pub use reaper::{Reaper, ReaperReport};
pub use retention::RetentionSweep;
