//! Application layer - the maintenance run controller
//!
//! Scheduling, batch execution, retry policy and notification assembly.
//! Everything here depends only on the domain traits.

pub mod batch;
pub mod maintenance;
pub mod notifications;
pub mod retry;
pub mod run_state;
pub mod schedule;
pub mod settings;
pub mod status;

pub use batch::BatchSummary;
pub use maintenance::{
    BatchHandle, ControlError, MaintenanceController, MaintenanceServices, StartOutcome,
    StopOutcome,
};
pub use retry::{RetryFailure, RetryPolicy};
pub use run_state::RunFlags;
pub use schedule::WeeklySchedule;
pub use settings::MaintenanceSettings;
pub use status::{ProcessingAccount, StatusSnapshot};
