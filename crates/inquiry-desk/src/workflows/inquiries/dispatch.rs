use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{BrokerId, Inquiry, InquiryId};
use super::repository::{BrokerDirectory, InquiryRepository, RepositoryError, WorkloadQuery};
use super::workload::{FitScorer, RankedBroker, WorkloadSnapshot};

/// Optimistic writes are attempted this many times before giving up.
const ASSIGNMENT_ATTEMPTS: usize = 2;

/// Picks the cheapest eligible broker for an inquiry and re-routes work away from brokers that
/// become unavailable.
pub struct AssignmentDispatcher<R, D> {
    repository: Arc<R>,
    directory: Arc<D>,
    scorer: FitScorer,
}

impl<R, D> AssignmentDispatcher<R, D>
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>, scorer: FitScorer) -> Self {
        Self {
            repository,
            directory,
            scorer,
        }
    }

    pub fn scorer(&self) -> &FitScorer {
        &self.scorer
    }

    /// Eligible brokers for `inquiry`, best first, optionally leaving one broker out.
    pub fn rank_candidates(
        &self,
        inquiry: &Inquiry,
        exclude: Option<&BrokerId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedBroker>, DispatchError> {
        let property = self.directory.property(&inquiry.property_id)?;
        let brokers: Vec<_> = self
            .directory
            .list_eligible_brokers(&inquiry.property_id)?
            .into_iter()
            .filter(|broker| broker.is_eligible() && Some(&broker.id) != exclude)
            .collect();

        let since = now - self.scorer.config().completion_window;
        let mut candidates = Vec::with_capacity(brokers.len());
        for broker in &brokers {
            let snapshot = WorkloadSnapshot {
                active_inquiries: self.directory.active_inquiry_count(&broker.id)?,
                active_clients: self.directory.active_client_count(&broker.id)?,
                completion_rate: self.directory.recent_completion_rate(&broker.id, since)?,
            };
            candidates.push((broker, snapshot));
        }

        Ok(self.scorer.rank(candidates, property.as_ref(), now))
    }

    /// Assign the inquiry to its lowest-cost eligible broker.
    ///
    /// Returns the existing broker when the inquiry is already assigned and `None` when nobody
    /// is eligible. Only `assigned_broker_id` is written; property ownership is left alone.
    pub fn assign(
        &self,
        inquiry_id: &InquiryId,
        now: DateTime<Utc>,
    ) -> Result<Option<BrokerId>, DispatchError> {
        for attempt in 1..=ASSIGNMENT_ATTEMPTS {
            let inquiry = self
                .repository
                .fetch(inquiry_id)?
                .ok_or(RepositoryError::NotFound)?;

            if let Some(existing) = inquiry.assigned_broker_id {
                return Ok(Some(existing));
            }

            let ranked = self.rank_candidates(&inquiry, None, now)?;
            let Some(best) = ranked.into_iter().next() else {
                info!(inquiry = %inquiry_id.0, "no eligible broker for inquiry");
                return Ok(None);
            };

            if self
                .repository
                .assign_if_unassigned(inquiry_id, &best.broker_id)?
            {
                info!(
                    inquiry = %inquiry_id.0,
                    broker = %best.broker_id.0,
                    cost = best.cost.total,
                    "inquiry assigned"
                );
                return Ok(Some(best.broker_id));
            }

            warn!(inquiry = %inquiry_id.0, attempt, "assignment write lost a race");
        }

        Err(DispatchError::AssignmentRaceLost {
            inquiry_id: inquiry_id.clone(),
        })
    }

    /// Move every open inquiry held by `broker` to the best remaining broker.
    ///
    /// Each inquiry is written independently; inquiries without an alternate stay with `broker`.
    pub fn reassign_open_work(
        &self,
        broker: &BrokerId,
        now: DateTime<Utc>,
    ) -> Result<ReassignmentReport, DispatchError> {
        let mut report = ReassignmentReport {
            broker_id: broker.clone(),
            moved: Vec::new(),
            retained: Vec::new(),
        };

        let held = self.repository.open_assigned_to(broker)?;
        for inquiry in held {
            if !inquiry.is_open() || inquiry.assigned_broker_id.as_ref() != Some(broker) {
                continue;
            }

            let ranked = self.rank_candidates(&inquiry, Some(broker), now)?;
            let Some(best) = ranked.into_iter().next() else {
                report.retained.push(inquiry.id);
                continue;
            };

            if self
                .repository
                .reassign_if_held(&inquiry.id, broker, &best.broker_id)?
            {
                report.moved.push(Reassignment {
                    inquiry_id: inquiry.id,
                    to: best.broker_id,
                });
            } else {
                debug!(inquiry = %inquiry.id.0, "inquiry left broker before reassignment");
            }
        }

        info!(
            broker = %broker.0,
            moved = report.moved.len(),
            retained = report.retained.len(),
            "reassignment sweep finished"
        );

        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub inquiry_id: InquiryId,
    pub to: BrokerId,
}

/// Outcome of a reassignment sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReassignmentReport {
    pub broker_id: BrokerId,
    pub moved: Vec<Reassignment>,
    /// Open inquiries left with the broker because no alternate was eligible.
    pub retained: Vec<InquiryId>,
}

impl ReassignmentReport {
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("assignment for inquiry {} lost repeated write races", .inquiry_id.0)]
    AssignmentRaceLost { inquiry_id: InquiryId },
}
