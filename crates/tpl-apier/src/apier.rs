use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tpl_store::{Account, DataStore};
use tpl_types::EntityCategory;
use tracing::{info, warn};

use crate::cost::{
    CallCost, CallDescriptor, DataCost, EventCost, DIRECTION_OUT, TOR_DATA, TOR_VOICE,
};
use crate::duration::parse_duration_with_nanos;
use crate::error::{ApierError, ApierResult};
use crate::resource::TempResource;

/// Subject the cost simulation provisions its throwaway resources under.
pub const SIMULATOR_SUBJECT: &str = "simulator";

/// Activation time of the simulated rating profile.
pub const SIMULATOR_ACTIVATION: &str = "1970-01-01T00:00:00Z";

/// Rates a call descriptor.
pub trait Responder: Send + Sync {
    fn get_cost(&self, cd: &CallDescriptor) -> ApierResult<CallCost>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrSetAccount {
    pub tenant: String,
    pub account: String,
    pub allow_negative: Option<bool>,
    pub disabled: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrRemoveAccount {
    pub tenant: String,
    pub account: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingActivation {
    pub activation_time: String,
    pub rating_plan_id: String,
    #[serde(default)]
    pub fallback_subjects: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrSetRatingProfile {
    pub tenant: String,
    pub category: String,
    pub direction: String,
    pub subject: String,
    pub activations: Vec<RatingActivation>,
    /// Replace an existing profile instead of failing.
    #[serde(default)]
    pub overwrite: bool,
}

impl AttrSetRatingProfile {
    pub fn key(&self) -> String {
        rating_profile_id(&self.direction, &self.tenant, &self.category, &self.subject)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrRemoveRatingProfile {
    pub tenant: String,
    pub category: String,
    pub direction: String,
    pub subject: String,
}

/// `<direction>:<tenant>:<category>:<subject>`
pub fn rating_profile_id(direction: &str, tenant: &str, category: &str, subject: &str) -> String {
    format!("{direction}:{tenant}:{category}:{subject}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrGetCost {
    pub tenant: String,
    pub category: String,
    pub subject: String,
    pub answer_time: DateTime<Utc>,
    pub destination: String,
    /// See [`parse_duration_with_nanos`].
    pub usage: String,
    /// Rate against this plan instead of the subject's own profile.
    #[serde(default)]
    pub rating_plan_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrGetDataCost {
    pub tenant: String,
    pub category: String,
    pub subject: String,
    pub answer_time: DateTime<Utc>,
    pub usage: Duration,
}

/// Administrative API over the primary store.
pub struct Apier<S: DataStore + ?Sized, R: Responder> {
    store: Arc<S>,
    responder: R,
}

impl<S: DataStore + ?Sized, R: Responder> Apier<S, R> {
    pub fn new(store: Arc<S>, responder: R) -> Self {
        Self { store, responder }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    /// Create or update an account.
    pub fn set_account(&self, attrs: &AttrSetAccount) -> ApierResult<()> {
        if attrs.tenant.is_empty() {
            return Err(ApierError::MandatoryMissing("Tenant"));
        }
        if attrs.account.is_empty() {
            return Err(ApierError::MandatoryMissing("Account"));
        }
        let mut account = self
            .store
            .get_account(&attrs.tenant, &attrs.account)?
            .unwrap_or_else(|| Account::new(&attrs.tenant, &attrs.account));
        if let Some(allow_negative) = attrs.allow_negative {
            account.allow_negative = allow_negative;
        }
        if let Some(disabled) = attrs.disabled {
            account.disabled = disabled;
        }
        self.store.set_account(&account)?;
        self.store.commit()?;
        Ok(())
    }

    pub fn remove_account(&self, attrs: &AttrRemoveAccount) -> ApierResult<()> {
        if !self.store.remove_account(&attrs.tenant, &attrs.account)? {
            return Err(ApierError::NotFound(format!("account {}:{}", attrs.tenant, attrs.account)));
        }
        self.store.commit()?;
        Ok(())
    }

    /// Store a rating profile. Every referenced rating plan must exist.
    pub fn set_rating_profile(&self, attrs: &AttrSetRatingProfile) -> ApierResult<()> {
        for (field, value) in [
            ("Tenant", &attrs.tenant),
            ("Category", &attrs.category),
            ("Direction", &attrs.direction),
            ("Subject", &attrs.subject),
        ] {
            if value.is_empty() {
                return Err(ApierError::MandatoryMissing(field));
            }
        }
        if attrs.activations.is_empty() {
            return Err(ApierError::MandatoryMissing("RatingPlanActivations"));
        }
        for activation in &attrs.activations {
            DateTime::parse_from_rfc3339(&activation.activation_time).map_err(|_| {
                ApierError::InvalidActivationTime(activation.activation_time.clone())
            })?;
            if self
                .store
                .get(EntityCategory::RatingPlans, &activation.rating_plan_id)?
                .is_none()
            {
                return Err(ApierError::NotFound(format!(
                    "rating plan {}",
                    activation.rating_plan_id
                )));
            }
        }

        let key = attrs.key();
        if !attrs.overwrite && self.store.get(EntityCategory::RatingProfiles, &key)?.is_some() {
            return Err(ApierError::AlreadyExists(format!("rating profile {key}")));
        }
        let body = serde_json::json!({ "activations": attrs.activations });
        self.store.set(EntityCategory::RatingProfiles, &key, &body)?;
        self.store.commit()?;
        Ok(())
    }

    pub fn remove_rating_profile(&self, attrs: &AttrRemoveRatingProfile) -> ApierResult<()> {
        let key = rating_profile_id(
            &attrs.direction,
            &attrs.tenant,
            &attrs.category,
            &attrs.subject,
        );
        if !self.store.remove(EntityCategory::RatingProfiles, &key)? {
            return Err(ApierError::NotFound(format!("rating profile {key}")));
        }
        self.store.commit()?;
        Ok(())
    }

    /// Rate a call.
    ///
    /// With a `rating_plan_id` and no `subject`, the call is rated against
    /// that plan through a throwaway account and rating profile which are
    /// removed again before returning, whatever the outcome.
    pub fn get_cost(&self, attrs: &AttrGetCost) -> ApierResult<EventCost> {
        let usage = parse_duration_with_nanos(&attrs.usage)?;
        let mut subject = attrs.subject.clone();

        // Dropped in reverse order: profile first, then account.
        let mut _account_guard = None;
        let mut _profile_guard = None;
        if !attrs.rating_plan_id.is_empty() {
            if !subject.is_empty() {
                warn!(
                    subject = %subject,
                    rating_plan = %attrs.rating_plan_id,
                    "ignoring rating plan as subject given"
                );
            } else {
                subject = SIMULATOR_SUBJECT.to_string();
                info!(
                    destination = %attrs.destination,
                    rating_plan = %attrs.rating_plan_id,
                    "simulating call"
                );

                let account = AttrSetAccount {
                    tenant: attrs.tenant.clone(),
                    account: subject.clone(),
                    ..Default::default()
                };
                let removal = AttrRemoveAccount {
                    tenant: account.tenant.clone(),
                    account: account.account.clone(),
                };
                _account_guard = Some(TempResource::acquire(
                    "account",
                    || self.set_account(&account),
                    move || self.remove_account(&removal),
                )?);

                let profile = AttrSetRatingProfile {
                    tenant: attrs.tenant.clone(),
                    category: "call".to_string(),
                    direction: DIRECTION_OUT.to_string(),
                    subject: subject.clone(),
                    activations: vec![RatingActivation {
                        activation_time: SIMULATOR_ACTIVATION.to_string(),
                        rating_plan_id: attrs.rating_plan_id.clone(),
                        fallback_subjects: String::new(),
                    }],
                    overwrite: true,
                };
                let removal = AttrRemoveRatingProfile {
                    tenant: profile.tenant.clone(),
                    category: profile.category.clone(),
                    direction: profile.direction.clone(),
                    subject: profile.subject.clone(),
                };
                _profile_guard = Some(TempResource::acquire(
                    "rating profile",
                    || self.set_rating_profile(&profile),
                    move || self.remove_rating_profile(&removal),
                )?);
            }
        }

        let cd = CallDescriptor {
            direction: DIRECTION_OUT.to_string(),
            category: attrs.category.clone(),
            tenant: attrs.tenant.clone(),
            subject,
            destination: attrs.destination.clone(),
            time_start: attrs.answer_time,
            time_end: end_time(attrs.answer_time, usage)?,
            duration_index: usage,
            tor: TOR_VOICE.to_string(),
        };
        let cc = self.rate(&cd)?;
        let mut ec = EventCost::from_call_cost(&cc);
        ec.compute();
        Ok(ec)
    }

    /// Rate a data session for an existing subject.
    pub fn get_data_cost(&self, attrs: &AttrGetDataCost) -> ApierResult<DataCost> {
        let cd = CallDescriptor {
            direction: DIRECTION_OUT.to_string(),
            category: attrs.category.clone(),
            tenant: attrs.tenant.clone(),
            subject: attrs.subject.clone(),
            destination: String::new(),
            time_start: attrs.answer_time,
            time_end: end_time(attrs.answer_time, attrs.usage)?,
            duration_index: attrs.usage,
            tor: TOR_DATA.to_string(),
        };
        self.rate(&cd)?.to_data_cost()
    }

    fn rate(&self, cd: &CallDescriptor) -> ApierResult<CallCost> {
        self.responder.get_cost(cd).map_err(|e| match e {
            ApierError::Server(_) => e,
            other => ApierError::Server(other.to_string()),
        })
    }
}

fn end_time(start: DateTime<Utc>, usage: Duration) -> ApierResult<DateTime<Utc>> {
    let out_of_range = || ApierError::InvalidUsage {
        input: format!("{usage:?}"),
        reason: "out of range".to_string(),
    };
    let delta = chrono::TimeDelta::from_std(usage).map_err(|_| out_of_range())?;
    start.checked_add_signed(delta).ok_or_else(out_of_range)
}
