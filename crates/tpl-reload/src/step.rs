use std::sync::Arc;

use async_trait::async_trait;
use tpl_types::EntityCategory;

use crate::error::ReloadResult;
use crate::plan::InvalidationPlan;
use crate::service::{CacheService, SchedulerService, UsersService};
use crate::state::{PassState, StepOutcome};

/// The remote services a pass may notify.
///
/// The cache service is mandatory: without it no invalidation runs at all.
#[derive(Clone)]
pub struct ServiceSet {
    pub cache: Arc<dyn CacheService>,
    pub scheduler: Option<Arc<dyn SchedulerService>>,
    pub users: Option<Arc<dyn UsersService>>,
}

impl ServiceSet {
    pub fn new(cache: Arc<dyn CacheService>) -> Self {
        Self {
            cache,
            scheduler: None,
            users: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerService>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_users(mut self, users: Arc<dyn UsersService>) -> Self {
        self.users = Some(users);
        self
    }
}

/// One step of the invalidation pipeline.
///
/// A step either does its remote call (`Ok(Completed)`), decides it has
/// nothing to do (`Ok(Skipped)`), or fails. Failures are turned into
/// [`StepOutcome::Failed`] by the orchestrator and never stop the pipeline.
#[async_trait]
pub trait InvalidationStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// State the pass is in once this step is behind it.
    fn reached(&self) -> PassState;

    async fn execute(
        &self,
        services: &ServiceSet,
        plan: &InvalidationPlan,
    ) -> ReloadResult<StepOutcome>;
}

/// `ApierV1.ReloadCache` with the full plan.
pub struct CacheReloadStep;

#[async_trait]
impl InvalidationStep for CacheReloadStep {
    fn name(&self) -> &'static str {
        "cache-reload"
    }

    fn reached(&self) -> PassState {
        PassState::CacheReloaded
    }

    async fn execute(
        &self,
        services: &ServiceSet,
        plan: &InvalidationPlan,
    ) -> ReloadResult<StepOutcome> {
        services.cache.reload_cache(plan).await?;
        Ok(StepOutcome::Completed)
    }
}

/// One batched `CacheSv1.Clear` for the implicated filter indexes.
///
/// Issued even when no index is implicated, with an empty key list.
pub struct IndexClearStep;

#[async_trait]
impl InvalidationStep for IndexClearStep {
    fn name(&self) -> &'static str {
        "index-clear"
    }

    fn reached(&self) -> PassState {
        PassState::IndexesCleared
    }

    async fn execute(
        &self,
        services: &ServiceSet,
        plan: &InvalidationPlan,
    ) -> ReloadResult<StepOutcome> {
        services.cache.clear_indexes(plan.index_keys()).await?;
        Ok(StepOutcome::Completed)
    }
}

/// `ApierV1.ReloadScheduler`, only when action plans changed.
pub struct SchedulerReloadStep;

#[async_trait]
impl InvalidationStep for SchedulerReloadStep {
    fn name(&self) -> &'static str {
        "scheduler-reload"
    }

    fn reached(&self) -> PassState {
        PassState::SchedulerReloaded
    }

    async fn execute(
        &self,
        services: &ServiceSet,
        plan: &InvalidationPlan,
    ) -> ReloadResult<StepOutcome> {
        let Some(scheduler) = services.scheduler.as_ref() else {
            return Ok(StepOutcome::skipped("no scheduler configured"));
        };
        if !plan.contains(EntityCategory::ActionPlans) {
            return Ok(StepOutcome::skipped("no action plans loaded"));
        }
        scheduler.reload_scheduler().await?;
        Ok(StepOutcome::Completed)
    }
}

/// `UsersV1.ReloadUsers`, only when users changed.
pub struct UsersReloadStep;

#[async_trait]
impl InvalidationStep for UsersReloadStep {
    fn name(&self) -> &'static str {
        "users-reload"
    }

    fn reached(&self) -> PassState {
        PassState::AuxReloaded
    }

    async fn execute(
        &self,
        services: &ServiceSet,
        plan: &InvalidationPlan,
    ) -> ReloadResult<StepOutcome> {
        let Some(users) = services.users.as_ref() else {
            return Ok(StepOutcome::skipped("no users service configured"));
        };
        if !plan.contains(EntityCategory::Users) {
            return Ok(StepOutcome::skipped("no users loaded"));
        }
        users.reload_users().await?;
        Ok(StepOutcome::Completed)
    }
}

/// The standard pipeline, in the order the calls must be issued.
pub fn default_steps() -> Vec<Box<dyn InvalidationStep>> {
    vec![
        Box::new(CacheReloadStep),
        Box::new(IndexClearStep),
        Box::new(SchedulerReloadStep),
        Box::new(UsersReloadStep),
    ]
}
