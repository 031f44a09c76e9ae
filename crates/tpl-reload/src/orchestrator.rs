use std::sync::Arc;
use std::time::{Duration, Instant};

use tpl_config::{LoaderConfig, RpcConfig};
use tpl_rpc::RpcClient;
use tpl_types::LoadedIdSet;
use tracing::{debug, info, warn};

use crate::plan::InvalidationPlan;
use crate::state::{PassState, StepOutcome};
use crate::step::{default_steps, InvalidationStep, ServiceSet};

/// Outcome of one step, as recorded in the report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepReport {
    pub name: &'static str,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

/// Everything an invalidation pass did.
#[derive(Clone, Debug)]
pub struct InvalidationReport {
    /// The plan sent to the cache service. `None` when invalidation is disabled.
    pub plan: Option<InvalidationPlan>,
    pub steps: Vec<StepReport>,
    pub final_state: PassState,
    pub elapsed: Duration,
}

impl InvalidationReport {
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == step).map(|s| &s.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_failed())
    }

    /// `true` when no step failed.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Drives the post-load invalidation pipeline.
///
/// Steps run strictly in order, one remote call at a time. Whatever a step
/// does, the next one still runs.
pub struct Orchestrator {
    services: Option<ServiceSet>,
    steps: Vec<Box<dyn InvalidationStep>>,
}

impl Orchestrator {
    /// `None` disables invalidation entirely.
    pub fn new(services: Option<ServiceSet>) -> Self {
        Self {
            services,
            steps: default_steps(),
        }
    }

    /// Build RPC clients for the configured services.
    ///
    /// Services sharing an address share one connection. Nothing is dialed
    /// until the first call.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(services_from_config(config))
    }

    pub fn is_enabled(&self) -> bool {
        self.services.is_some()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Invalidate what a pass touched. `loaded` is `None` when nothing was tracked.
    pub async fn run(&self, loaded: Option<&LoadedIdSet>, flush: bool) -> InvalidationReport {
        match (loaded, self.services.is_some()) {
            (Some(loaded), true) => {
                self.execute(InvalidationPlan::from_loaded(loaded, flush))
                    .await
            }
            (None, true) => {
                warn!("no loaded ids were tracked, skipping cache invalidation");
                self.skip_all("nothing tracked")
            }
            (_, false) => self.disabled(),
        }
    }

    /// Run every step against an explicit plan.
    pub async fn execute(&self, plan: InvalidationPlan) -> InvalidationReport {
        let start = Instant::now();
        let Some(services) = self.services.as_ref() else {
            return self.disabled();
        };

        let mut state = PassState::Written.advance();
        info!(
            categories = plan.categories().count(),
            indexes = plan.index_keys().len(),
            flush_all = plan.flush_all,
            "invalidation plan built"
        );

        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let step_start = Instant::now();
            let outcome = match step.execute(services, &plan).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(step = step.name(), error = %e, "invalidation step failed");
                    StepOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            match &outcome {
                StepOutcome::Completed => info!(step = step.name(), "done"),
                StepOutcome::Skipped { reason } => debug!(step = step.name(), %reason, "skipped"),
                StepOutcome::Failed { .. } => {}
            }
            steps.push(StepReport {
                name: step.name(),
                outcome,
                elapsed: step_start.elapsed(),
            });
            state = step.reached();
        }

        InvalidationReport {
            plan: Some(plan),
            steps,
            final_state: state.advance(),
            elapsed: start.elapsed(),
        }
    }

    fn disabled(&self) -> InvalidationReport {
        warn!("automatic cache reloading is disabled");
        self.skip_all("cache reloading disabled")
    }

    fn skip_all(&self, reason: &str) -> InvalidationReport {
        InvalidationReport {
            plan: None,
            steps: self
                .steps
                .iter()
                .map(|step| StepReport {
                    name: step.name(),
                    outcome: StepOutcome::skipped(reason),
                    elapsed: Duration::ZERO,
                })
                .collect(),
            final_state: PassState::Done,
            elapsed: Duration::ZERO,
        }
    }
}

/// Clients for the configured services, one per distinct address.
pub fn services_from_config(config: &LoaderConfig) -> Option<ServiceSet> {
    let cache_conn = config.caches.as_ref()?;
    let mut pool = Vec::new();
    let cache = client_for(&mut pool, &cache_conn.address, &config.rpc);
    let mut services = ServiceSet::new(cache);
    if let Some(conn) = &config.scheduler {
        services = services.with_scheduler(client_for(&mut pool, &conn.address, &config.rpc));
    }
    if let Some(conn) = &config.users {
        services = services.with_users(client_for(&mut pool, &conn.address, &config.rpc));
    }
    Some(services)
}

fn client_for(pool: &mut Vec<Arc<RpcClient>>, address: &str, limits: &RpcConfig) -> Arc<RpcClient> {
    if let Some(client) = pool.iter().find(|c| c.address() == address) {
        debug!(address, "reusing connection");
        return Arc::clone(client);
    }
    let client = Arc::new(RpcClient::new(address, limits.clone()));
    pool.push(Arc::clone(&client));
    client
}
