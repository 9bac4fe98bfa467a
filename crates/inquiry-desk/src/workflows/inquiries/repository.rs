use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BrokerId, BrokerProfile, Inquiry, InquiryId, PropertyId, PropertySnapshot};
use super::duplicates::{DuplicateAction, DuplicateType};
use super::status::InquiryStatus;

/// Storage abstraction over inquiries so the guard and dispatcher run without a database.
pub trait InquiryRepository: Send + Sync {
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError>;
    fn fetch(&self, id: &InquiryId) -> Result<Option<Inquiry>, RepositoryError>;

    /// Applies `change` only while the stored status still equals `expected`. Never writes
    /// `assigned_broker_id`. Returns `None` when another writer moved the status first.
    fn apply_status_change(
        &self,
        id: &InquiryId,
        expected: InquiryStatus,
        change: &StatusChange,
    ) -> Result<Option<Inquiry>, RepositoryError>;

    /// Sets `assigned_broker_id` only while it is still unset. Returns `false` when another
    /// writer got there first.
    fn assign_if_unassigned(
        &self,
        id: &InquiryId,
        broker: &BrokerId,
    ) -> Result<bool, RepositoryError>;

    /// Moves an inquiry from `from` to `to` only while it is still held by `from`.
    fn reassign_if_held(
        &self,
        id: &InquiryId,
        from: &BrokerId,
        to: &BrokerId,
    ) -> Result<bool, RepositoryError>;

    fn find_recent_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError>;
    fn find_recent_by_ip(
        &self,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError>;
    fn find_recent_by_property(
        &self,
        property: &PropertyId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError>;

    /// Non-terminal inquiries currently assigned to `broker`.
    fn open_assigned_to(&self, broker: &BrokerId) -> Result<Vec<Inquiry>, RepositoryError>;
}

/// Broker and listing lookups owned by the surrounding platform.
pub trait BrokerDirectory: Send + Sync {
    /// Approved, active brokers that may take work on `property`.
    fn list_eligible_brokers(
        &self,
        property: &PropertyId,
    ) -> Result<Vec<BrokerProfile>, RepositoryError>;
    fn property(&self, property: &PropertyId) -> Result<Option<PropertySnapshot>, RepositoryError>;

    /// Marks the broker inactive so later rankings skip them. `false` for an unknown broker.
    fn deactivate_broker(
        &self,
        broker: &BrokerId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

/// Derived workload and performance counters, computed at scoring time.
pub trait WorkloadQuery: Send + Sync {
    fn active_inquiry_count(&self, broker: &BrokerId) -> Result<u32, RepositoryError>;
    fn active_client_count(&self, broker: &BrokerId) -> Result<u32, RepositoryError>;
    /// Completed ÷ handled inquiries since `since`; `None` when the broker handled nothing.
    fn recent_completion_rate(
        &self,
        broker: &BrokerId,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, RepositoryError>;
}

/// Status write plus the lifecycle stamps it sets. Stamps left as `None` keep their stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub status: InquiryStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub contacted_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// Stamps implied by moving from `previous` to `status` at `now`.
    pub fn stamped(previous: InquiryStatus, status: InquiryStatus, now: DateTime<Utc>) -> Self {
        let at = |target: InquiryStatus| (status == target).then_some(now);
        Self {
            status,
            responded_at: previous.requires_response().then_some(now),
            contacted_at: at(InquiryStatus::Contacted),
            scheduled_at: at(InquiryStatus::Scheduled),
            completed_at: at(InquiryStatus::Completed),
        }
    }

    /// Writes the change onto a stored row. A first response time is never overwritten.
    pub fn apply(&self, inquiry: &mut Inquiry) {
        inquiry.status = self.status;
        if inquiry.responded_at.is_none() {
            inquiry.responded_at = self.responded_at;
        }
        if let Some(at) = self.contacted_at {
            inquiry.contacted_at = Some(at);
        }
        if let Some(at) = self.scheduled_at {
            inquiry.scheduled_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            inquiry.completed_at = Some(at);
        }
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record was written concurrently or already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound audit hooks for abuse analytics and admin follow-up.
pub trait ActivityLog: Send + Sync {
    fn record_duplicate(&self, entry: DuplicateLogEntry) -> Result<(), LogError>;
    fn record_unassigned(&self, notice: UnassignedNotice) -> Result<(), LogError>;
}

/// Audit record for a flagged or rejected submission. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateLogEntry {
    pub email: String,
    pub property_id: PropertyId,
    pub duplicate_type: DuplicateType,
    pub action: DuplicateAction,
    pub original_inquiry_id: Option<InquiryId>,
    pub recorded_at: DateTime<Utc>,
}

/// Raised when an inquiry was stored but no broker could take it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedNotice {
    pub inquiry_id: InquiryId,
    pub property_id: PropertyId,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("activity log unavailable: {0}")]
    Transport(String),
}

/// Sanitized representation of an inquiry's handling state.
#[derive(Debug, Clone, Serialize)]
pub struct InquiryStatusView {
    pub inquiry_id: InquiryId,
    pub status: &'static str,
    pub awaiting_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_broker_id: Option<BrokerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_flag: Option<&'static str>,
}

impl Inquiry {
    pub fn status_view(&self) -> InquiryStatusView {
        InquiryStatusView {
            inquiry_id: self.id.clone(),
            status: self.status.label(),
            awaiting_response: self.status.requires_response(),
            assigned_broker_id: self.assigned_broker_id.clone(),
            review_flag: self.review_flag.map(DuplicateType::label),
        }
    }
}
