use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BrokerId, BrokerProfile, PropertySnapshot};

/// Relative weight of each cost axis. Defaults keep workload dominant, then performance,
/// location, and staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentWeights {
    pub workload: f64,
    pub performance: f64,
    pub location: f64,
    pub staleness: f64,
}

impl Default for AssignmentWeights {
    fn default() -> Self {
        Self {
            workload: 10.0,
            performance: 8.0,
            location: 4.0,
            staleness: 2.0,
        }
    }
}

/// Idle-time penalty curve. The default cap keeps the weighted staleness cost below the
/// default location cost.
#[derive(Debug, Clone, PartialEq)]
pub struct StalenessPolicy {
    pub recent_threshold: Duration,
    pub long_absence_threshold: Duration,
    pub base_penalty: f64,
    pub max_penalty: f64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            recent_threshold: Duration::hours(1),
            long_absence_threshold: Duration::days(3),
            base_penalty: 1.0,
            max_penalty: 1.5,
        }
    }
}

impl StalenessPolicy {
    /// Zero while recently seen, flat base penalty until the long-absence threshold, then linear
    /// growth capped at `max_penalty`. Never decreases as idle time grows.
    pub fn penalty(&self, last_seen_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(last_seen_at) = last_seen_at else {
            return self.max_penalty;
        };

        let idle = now - last_seen_at;
        if idle <= self.recent_threshold {
            return 0.0;
        }
        if idle <= self.long_absence_threshold {
            return self.base_penalty;
        }

        let long_hours = hours(self.long_absence_threshold).max(1.0);
        let beyond = hours(idle - self.long_absence_threshold);
        (self.base_penalty * (1.0 + beyond / long_hours)).min(self.max_penalty)
    }
}

fn hours(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 3600.0
}

/// Scorer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub weights: AssignmentWeights,
    pub staleness: StalenessPolicy,
    pub location_penalty: f64,
    /// Performance assumed for brokers without any handled inquiries in the window.
    pub neutral_performance: f64,
    pub completion_window: Duration,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            weights: AssignmentWeights::default(),
            staleness: StalenessPolicy::default(),
            location_penalty: 1.0,
            neutral_performance: 0.5,
            completion_window: Duration::days(30),
        }
    }
}

/// Counters fetched for one broker at scoring time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub active_inquiries: u32,
    pub active_clients: u32,
    pub completion_rate: Option<f64>,
}

impl WorkloadSnapshot {
    pub fn workload(&self) -> u32 {
        self.active_inquiries + self.active_clients
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFactor {
    Workload,
    Performance,
    Location,
    Staleness,
}

/// Weighted contribution of one axis, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComponent {
    pub factor: CostFactor,
    pub raw: f64,
    pub weighted: f64,
    pub notes: String,
}

/// Composite assignment cost; lower is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentCost {
    pub total: f64,
    pub components: Vec<CostComponent>,
}

/// An eligible broker with its computed cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedBroker {
    pub broker_id: BrokerId,
    pub cost: AssignmentCost,
    pub workload: u32,
}

/// Stateless scorer applying [`FitConfig`] to a broker/property pair.
#[derive(Debug, Clone, Default)]
pub struct FitScorer {
    config: FitConfig,
}

impl FitScorer {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn score(
        &self,
        broker: &BrokerProfile,
        snapshot: &WorkloadSnapshot,
        property: Option<&PropertySnapshot>,
        now: DateTime<Utc>,
    ) -> AssignmentCost {
        let weights = &self.config.weights;
        let mut components = Vec::with_capacity(4);

        let workload = snapshot.workload() as f64;
        components.push(CostComponent {
            factor: CostFactor::Workload,
            raw: workload,
            weighted: weights.workload * workload,
            notes: format!(
                "{} open inquiries, {} active clients",
                snapshot.active_inquiries, snapshot.active_clients
            ),
        });

        let (performance, notes) = match snapshot.completion_rate {
            Some(rate) => {
                let rate = rate.clamp(0.0, 1.0);
                (rate, format!("completion rate {:.2}", rate))
            }
            None => (
                self.config.neutral_performance,
                "no recent history, neutral performance".to_string(),
            ),
        };
        components.push(CostComponent {
            factor: CostFactor::Performance,
            raw: performance,
            weighted: weights.performance * (1.0 - performance),
            notes,
        });

        let municipality = property.and_then(|property| property.municipality.as_deref());
        let (location, notes) = match municipality {
            Some(place) if !broker.prefers(place) => (
                self.config.location_penalty,
                format!("{place} outside preferred locations"),
            ),
            Some(place) => (0.0, format!("{place} within preferred locations")),
            None => (0.0, "property has no municipality".to_string()),
        };
        components.push(CostComponent {
            factor: CostFactor::Location,
            raw: location,
            weighted: weights.location * location,
            notes,
        });

        let staleness = self.config.staleness.penalty(broker.last_seen_at, now);
        components.push(CostComponent {
            factor: CostFactor::Staleness,
            raw: staleness,
            weighted: weights.staleness * staleness,
            notes: match broker.last_seen_at {
                Some(seen) => format!("last seen {}", seen.to_rfc3339()),
                None => "never seen".to_string(),
            },
        });

        let total = components.iter().map(|component| component.weighted).sum();
        AssignmentCost { total, components }
    }

    /// Score eligible brokers and order them best first: lowest cost, then lowest workload, then
    /// broker id ascending. Ineligible brokers are dropped before scoring.
    pub fn rank<'a, I>(
        &self,
        candidates: I,
        property: Option<&PropertySnapshot>,
        now: DateTime<Utc>,
    ) -> Vec<RankedBroker>
    where
        I: IntoIterator<Item = (&'a BrokerProfile, WorkloadSnapshot)>,
    {
        let mut ranked: Vec<RankedBroker> = candidates
            .into_iter()
            .filter(|(broker, _)| broker.is_eligible())
            .map(|(broker, snapshot)| RankedBroker {
                broker_id: broker.id.clone(),
                cost: self.score(broker, &snapshot, property, now),
                workload: snapshot.workload(),
            })
            .collect();

        ranked.sort_by(compare_ranked);
        ranked
    }
}

fn compare_ranked(left: &RankedBroker, right: &RankedBroker) -> Ordering {
    left.cost
        .total
        .total_cmp(&right.cost.total)
        .then_with(|| left.workload.cmp(&right.workload))
        .then_with(|| left.broker_id.cmp(&right.broker_id))
}
