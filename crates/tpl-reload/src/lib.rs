//! Cache invalidation after a tariff plan load.
//!
//! The identifiers a pass touched become an [`InvalidationPlan`]. The
//! [`Orchestrator`] then runs an ordered list of [`InvalidationStep`]s
//! against the configured services:
//!
//! 1. cache reload with the plan
//! 2. one batched filter-index clear
//! 3. scheduler reload, if action plans changed
//! 4. users reload, if users changed
//!
//! Remote failures are logged and recorded in the [`InvalidationReport`];
//! they never fail the pass.

pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod service;
pub mod state;
pub mod step;

pub use error::{ReloadError, ReloadResult};
pub use orchestrator::{services_from_config, InvalidationReport, Orchestrator, StepReport};
pub use plan::{IdSelection, InvalidationPlan};
pub use service::{CacheService, SchedulerService, UsersService};
pub use state::{PassState, StepOutcome};
pub use step::{
    default_steps, CacheReloadStep, IndexClearStep, InvalidationStep, SchedulerReloadStep,
    ServiceSet, UsersReloadStep,
};
