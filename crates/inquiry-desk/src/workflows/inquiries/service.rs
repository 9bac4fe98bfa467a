use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::config::DeskConfig;
use super::dispatch::{AssignmentDispatcher, DispatchError, ReassignmentReport};
use super::domain::{BrokerId, Inquiry, InquiryId, InquirySubmission};
use super::duplicates::{CandidateInquiry, DuplicateCheck, DuplicateGuard, DuplicateGuardError};
use super::repository::{
    ActivityLog, BrokerDirectory, InquiryRepository, LogError, RepositoryError, StatusChange,
    UnassignedNotice, WorkloadQuery,
};
use super::status::{InquiryStatus, InvalidTransition};
use super::workload::FitScorer;

/// Service composing the duplicate guard, inquiry store, and assignment dispatcher.
pub struct InquiryDeskService<R, D, L> {
    guard: Arc<DuplicateGuard>,
    repository: Arc<R>,
    directory: Arc<D>,
    log: Arc<L>,
    dispatcher: Arc<AssignmentDispatcher<R, D>>,
}

static INQUIRY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_inquiry_id() -> InquiryId {
    let id = INQUIRY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    InquiryId(format!("inq-{id:06}"))
}

/// Stored inquiry plus the guard verdict that let it through.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub inquiry: Inquiry,
    pub check: DuplicateCheck,
    /// Why routing could not finish after the inquiry was stored. The inquiry stays unassigned.
    pub dispatch_error: Option<String>,
}

impl SubmissionReceipt {
    pub fn flagged_for_review(&self) -> bool {
        self.check.is_duplicate
    }
}

impl<R, D, L> InquiryDeskService<R, D, L>
where
    R: InquiryRepository + 'static,
    D: BrokerDirectory + WorkloadQuery + 'static,
    L: ActivityLog + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>, log: Arc<L>, config: DeskConfig) -> Self {
        let DeskConfig { duplicates, fit } = config;
        let dispatcher =
            AssignmentDispatcher::new(repository.clone(), directory.clone(), FitScorer::new(fit));

        Self {
            guard: Arc::new(DuplicateGuard::with_policy(duplicates)),
            repository,
            directory,
            log,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn dispatcher(&self) -> &AssignmentDispatcher<R, D> {
        &self.dispatcher
    }

    pub fn submit(
        &self,
        submission: InquirySubmission,
    ) -> Result<SubmissionReceipt, InquiryServiceError> {
        self.submit_at(submission, Utc::now())
    }

    /// Screen, store, and dispatch a new inquiry.
    ///
    /// Rejections never reach the store. Flagged submissions are stored with their
    /// classification and dispatched like any other inquiry. Once stored, the receipt is always
    /// returned; routing failures leave the inquiry unassigned and show up in `dispatch_error`.
    pub fn submit_at(
        &self,
        submission: InquirySubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, InquiryServiceError> {
        validate(&submission)?;

        let candidate = CandidateInquiry {
            email: submission.email.clone(),
            property_id: submission.property_id.clone(),
            message: submission.message.clone(),
            ip_address: submission.ip_address,
            submitted_at: now,
        };
        let check = self
            .guard
            .screen(&candidate, self.repository.as_ref(), self.log.as_ref())?;

        if check.is_rejected() {
            warn!(
                property = %submission.property_id.0,
                verdict = %check.summary(),
                "submission rejected"
            );
            return Err(InquiryServiceError::DuplicateRejected(check));
        }

        let inquiry = Inquiry {
            id: next_inquiry_id(),
            property_id: submission.property_id,
            name: submission.name.trim().to_string(),
            email: submission.email,
            phone: submission.phone,
            message: submission.message,
            kind: submission.kind,
            client_id: submission.client_id,
            assigned_broker_id: None,
            status: InquiryStatus::initial(),
            contacted_at: None,
            scheduled_at: None,
            responded_at: None,
            completed_at: None,
            ip_address: submission.ip_address,
            created_at: now,
            review_flag: check.duplicate_type,
        };

        let mut stored = self.repository.insert(inquiry)?;
        info!(
            inquiry = %stored.id.0,
            property = %stored.property_id.0,
            verdict = %check.summary(),
            "inquiry created"
        );

        let mut dispatch_error = None;
        let assigned = match self.dispatcher.assign(&stored.id, now) {
            Ok(assigned) => assigned,
            Err(err) => {
                warn!(inquiry = %stored.id.0, error = %err, "assignment failed after intake");
                dispatch_error = Some(err.to_string());
                None
            }
        };

        match assigned {
            Some(broker) => stored.assigned_broker_id = Some(broker),
            None => {
                let notice = UnassignedNotice {
                    inquiry_id: stored.id.clone(),
                    property_id: stored.property_id.clone(),
                    recorded_at: now,
                };
                if let Err(err) = self.log.record_unassigned(notice) {
                    warn!(inquiry = %stored.id.0, error = %err, "unassigned notice not recorded");
                    dispatch_error.get_or_insert_with(|| err.to_string());
                }
            }
        }

        Ok(SubmissionReceipt {
            inquiry: stored,
            check,
            dispatch_error,
        })
    }

    pub fn transition(
        &self,
        inquiry_id: &InquiryId,
        target: InquiryStatus,
    ) -> Result<Inquiry, InquiryServiceError> {
        self.transition_at(inquiry_id, target, Utc::now())
    }

    /// Apply a broker-driven status change. The stored status is untouched on failure.
    ///
    /// Only the status and its stamps are written, and only while the status read here is still
    /// current. A concurrent status change surfaces as [`RepositoryError::Conflict`].
    pub fn transition_at(
        &self,
        inquiry_id: &InquiryId,
        target: InquiryStatus,
        now: DateTime<Utc>,
    ) -> Result<Inquiry, InquiryServiceError> {
        let previous = self.get(inquiry_id)?.status;
        let next = previous.transition_to(target)?;

        let change = StatusChange::stamped(previous, next, now);
        let inquiry = self
            .repository
            .apply_status_change(inquiry_id, previous, &change)?
            .ok_or(RepositoryError::Conflict)?;
        info!(
            inquiry = %inquiry_id.0,
            from = previous.label(),
            to = inquiry.status.label(),
            "inquiry status changed"
        );
        Ok(inquiry)
    }

    pub fn assign(&self, inquiry_id: &InquiryId) -> Result<Option<BrokerId>, InquiryServiceError> {
        self.assign_at(inquiry_id, Utc::now())
    }

    pub fn assign_at(
        &self,
        inquiry_id: &InquiryId,
        now: DateTime<Utc>,
    ) -> Result<Option<BrokerId>, InquiryServiceError> {
        Ok(self.dispatcher.assign(inquiry_id, now)?)
    }

    /// Take a broker off the roster, then re-route their open work.
    pub fn deactivate_broker(
        &self,
        broker: &BrokerId,
    ) -> Result<ReassignmentReport, InquiryServiceError> {
        self.deactivate_broker_at(broker, Utc::now())
    }

    pub fn deactivate_broker_at(
        &self,
        broker: &BrokerId,
        now: DateTime<Utc>,
    ) -> Result<ReassignmentReport, InquiryServiceError> {
        if !self.directory.deactivate_broker(broker, now)? {
            return Err(RepositoryError::NotFound.into());
        }
        info!(broker = %broker.0, "broker deactivated");
        self.reassign_open_work_at(broker, now)
    }

    /// Re-route a deactivated broker's open work, returning how many inquiries moved.
    pub fn on_broker_deactivated(&self, broker: &BrokerId) -> Result<usize, InquiryServiceError> {
        self.on_broker_deactivated_at(broker, Utc::now())
    }

    pub fn on_broker_deactivated_at(
        &self,
        broker: &BrokerId,
        now: DateTime<Utc>,
    ) -> Result<usize, InquiryServiceError> {
        Ok(self.reassign_open_work_at(broker, now)?.moved_count())
    }

    pub fn reassign_open_work(
        &self,
        broker: &BrokerId,
    ) -> Result<ReassignmentReport, InquiryServiceError> {
        self.reassign_open_work_at(broker, Utc::now())
    }

    pub fn reassign_open_work_at(
        &self,
        broker: &BrokerId,
        now: DateTime<Utc>,
    ) -> Result<ReassignmentReport, InquiryServiceError> {
        Ok(self.dispatcher.reassign_open_work(broker, now)?)
    }

    pub fn get(&self, inquiry_id: &InquiryId) -> Result<Inquiry, InquiryServiceError> {
        let inquiry = self
            .repository
            .fetch(inquiry_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(inquiry)
    }
}

fn validate(submission: &InquirySubmission) -> Result<(), SubmissionError> {
    if submission.property_id.0.trim().is_empty() {
        return Err(SubmissionError::MissingProperty);
    }
    if submission.name.trim().is_empty() {
        return Err(SubmissionError::MissingName);
    }
    if let Some(email) = submission.email.as_deref().map(str::trim) {
        if !email.is_empty() && !email.contains('@') {
            return Err(SubmissionError::InvalidEmail(email.to_string()));
        }
    }
    Ok(())
}

/// Payload problems caught before the duplicate guard runs.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("inquiry must reference a property")]
    MissingProperty,
    #[error("inquiry must include a contact name")]
    MissingName,
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
}

/// Error raised by the inquiry desk service.
#[derive(Debug, thiserror::Error)]
pub enum InquiryServiceError {
    #[error(transparent)]
    Validation(#[from] SubmissionError),
    #[error("submission rejected: {}", .0.summary())]
    DuplicateRejected(DuplicateCheck),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Log(#[from] LogError),
}

impl From<DuplicateGuardError> for InquiryServiceError {
    fn from(value: DuplicateGuardError) -> Self {
        match value {
            DuplicateGuardError::Repository(err) => Self::Repository(err),
            DuplicateGuardError::Log(err) => Self::Log(err),
        }
    }
}
