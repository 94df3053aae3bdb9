//! Outbound scheduling: pacing math and the campaign scheduler.

pub mod campaign;
pub mod pacing;

pub use campaign::{CampaignScheduler, SchedulerSettings, SchedulerStats};
pub use pacing::{DistributionPattern, base_delay, compute_delay, typing_delay};
