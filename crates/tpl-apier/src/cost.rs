use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApierError, ApierResult};

pub const DIRECTION_OUT: &str = "*out";
pub const TOR_VOICE: &str = "*voice";
pub const TOR_DATA: &str = "*data";

/// A rating request as handed to the responder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub direction: String,
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub destination: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub duration_index: Duration,
    pub tor: String,
}

/// One rated slice of a call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    pub cost: f64,
    #[serde(default)]
    pub rate_id: String,
}

impl TimeSpan {
    pub fn duration(&self) -> Duration {
        (self.time_end - self.time_start).to_std().unwrap_or_default()
    }
}

/// The responder's answer to a [`CallDescriptor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallCost {
    pub direction: String,
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    pub tor: String,
    pub cost: f64,
    pub timespans: Vec<TimeSpan>,
}

impl CallCost {
    /// Convert to a data cost. Fails unless the call was rated as data.
    pub fn to_data_cost(&self) -> ApierResult<DataCost> {
        if self.tor != TOR_DATA {
            return Err(ApierError::Server(format!("not a data call: {}", self.tor)));
        }
        let origin = self.timespans.first().map(|ts| ts.time_start);
        let offset = |t: DateTime<Utc>| {
            origin
                .and_then(|o| (t - o).to_std().ok())
                .unwrap_or_default()
                .as_secs_f64()
        };
        Ok(DataCost {
            category: self.category.clone(),
            tenant: self.tenant.clone(),
            subject: self.subject.clone(),
            account: self.account.clone(),
            tor: self.tor.clone(),
            cost: self.cost,
            data_spans: self
                .timespans
                .iter()
                .map(|ts| DataSpan {
                    data_start: offset(ts.time_start),
                    data_end: offset(ts.time_end),
                    cost: ts.cost,
                    rate_id: ts.rate_id.clone(),
                })
                .collect(),
        })
    }
}

/// Usage-oriented cost of an event, derived from a [`CallCost`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventCost {
    pub start_time: Option<DateTime<Utc>>,
    pub usage: Duration,
    pub cost: f64,
    pub account: String,
    pub charges: Vec<ChargingInterval>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChargingInterval {
    pub usage: Duration,
    pub cost: f64,
    pub rate_id: String,
}

impl EventCost {
    pub fn from_call_cost(cc: &CallCost) -> Self {
        Self {
            start_time: cc.timespans.first().map(|ts| ts.time_start),
            usage: Duration::ZERO,
            cost: 0.0,
            account: cc.account.clone(),
            charges: cc
                .timespans
                .iter()
                .map(|ts| ChargingInterval {
                    usage: ts.duration(),
                    cost: ts.cost,
                    rate_id: ts.rate_id.clone(),
                })
                .collect(),
        }
    }

    /// Recompute the totals from the charging intervals.
    pub fn compute(&mut self) {
        self.usage = self.charges.iter().map(|c| c.usage).sum();
        self.cost = self.charges.iter().map(|c| c.cost).sum();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataCost {
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub tor: String,
    pub cost: f64,
    pub data_spans: Vec<DataSpan>,
}

/// A rated slice of data usage, offsets in units from the first span.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataSpan {
    pub data_start: f64,
    pub data_end: f64,
    pub cost: f64,
    pub rate_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn call_cost(tor: &str) -> CallCost {
        CallCost {
            direction: DIRECTION_OUT.into(),
            category: "call".into(),
            tenant: "cgrates.org".into(),
            subject: "1001".into(),
            account: "1001".into(),
            destination: "49151".into(),
            tor: tor.into(),
            cost: 0.7,
            timespans: vec![
                TimeSpan {
                    time_start: at(0),
                    time_end: at(60),
                    cost: 0.4,
                    rate_id: "RT_FIRST".into(),
                },
                TimeSpan {
                    time_start: at(60),
                    time_end: at(90),
                    cost: 0.3,
                    rate_id: "RT_NEXT".into(),
                },
            ],
        }
    }

    #[test]
    fn event_cost_totals() {
        let mut ec = EventCost::from_call_cost(&call_cost(TOR_VOICE));
        ec.compute();
        assert_eq!(ec.usage, Duration::from_secs(90));
        assert!((ec.cost - 0.7).abs() < 1e-9);
        assert_eq!(ec.start_time, Some(at(0)));
        assert_eq!(ec.charges.len(), 2);
    }

    #[test]
    fn data_cost_offsets() {
        let dc = call_cost(TOR_DATA).to_data_cost().unwrap();
        assert_eq!(dc.data_spans[1].data_start, 60.0);
        assert_eq!(dc.data_spans[1].data_end, 90.0);
    }

    #[test]
    fn voice_call_is_not_data() {
        let err = call_cost(TOR_VOICE).to_data_cost().unwrap_err();
        assert!(matches!(err, ApierError::Server(_)));
    }
}
