use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::workflows::inquiries::domain::{
    BrokerId, BrokerProfile, Inquiry, InquiryId, InquiryKind, InquirySubmission, PropertyId,
    PropertySnapshot,
};
use crate::workflows::inquiries::repository::{
    ActivityLog, BrokerDirectory, DuplicateLogEntry, InquiryRepository, LogError,
    RepositoryError, StatusChange, UnassignedNotice, WorkloadQuery,
};
use crate::workflows::inquiries::status::InquiryStatus;
use crate::workflows::inquiries::workload::WorkloadSnapshot;
use crate::workflows::inquiries::{DeskConfig, InquiryDeskService};

pub(super) const LISTING: &str = "prop-riverside-12";
pub(super) const BUYER_EMAIL: &str = "buyer@example.com";
pub(super) const VIEWING_MESSAGE: &str =
    "I would like to schedule a viewing of this house on Saturday.";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn property_id(raw: &str) -> PropertyId {
    PropertyId(raw.to_string())
}

pub(super) fn broker_id(raw: &str) -> BrokerId {
    BrokerId(raw.to_string())
}

pub(super) fn inquiry_id(raw: &str) -> InquiryId {
    InquiryId(raw.to_string())
}

pub(super) fn ip(raw: &str) -> IpAddr {
    raw.parse().expect("valid ip")
}

pub(super) fn stored_inquiry(id: &str, property: &str, minutes_ago: i64) -> Inquiry {
    Inquiry {
        id: inquiry_id(id),
        property_id: property_id(property),
        name: "Jordan Buyer".to_string(),
        email: Some(BUYER_EMAIL.to_string()),
        phone: None,
        message: Some(VIEWING_MESSAGE.to_string()),
        kind: InquiryKind::Viewing,
        client_id: None,
        assigned_broker_id: None,
        status: InquiryStatus::New,
        contacted_at: None,
        scheduled_at: None,
        responded_at: None,
        completed_at: None,
        ip_address: None,
        created_at: now() - Duration::minutes(minutes_ago),
        review_flag: None,
    }
}

pub(super) fn submission() -> InquirySubmission {
    InquirySubmission {
        property_id: property_id(LISTING),
        name: "Jordan Buyer".to_string(),
        email: Some(BUYER_EMAIL.to_string()),
        phone: Some("+46 70 123 45 67".to_string()),
        message: Some(VIEWING_MESSAGE.to_string()),
        kind: InquiryKind::Viewing,
        client_id: None,
        ip_address: Some(ip("10.0.0.8")),
    }
}

pub(super) fn broker(id: &str) -> BrokerProfile {
    BrokerProfile {
        id: broker_id(id),
        name: format!("Broker {id}"),
        approved: true,
        active: true,
        deactivated_at: None,
        last_seen_at: Some(now() - Duration::minutes(10)),
        preferred_locations: BTreeSet::new(),
    }
}

pub(super) fn property(id: &str, municipality: &str, owner: &str) -> PropertySnapshot {
    PropertySnapshot {
        id: property_id(id),
        owner_broker_id: Some(broker_id(owner)),
        status: Some("published".to_string()),
        municipality: Some(municipality.to_string()),
    }
}

pub(super) fn workload(inquiries: u32, clients: u32, rate: Option<f64>) -> WorkloadSnapshot {
    WorkloadSnapshot {
        active_inquiries: inquiries,
        active_clients: clients,
        completion_rate: rate,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<InquiryId, Inquiry>>>,
}

impl MemoryRepository {
    pub(super) fn with(inquiries: impl IntoIterator<Item = Inquiry>) -> Self {
        let repository = Self::default();
        {
            let mut guard = repository.records.lock().expect("repository mutex poisoned");
            for inquiry in inquiries {
                guard.insert(inquiry.id.clone(), inquiry);
            }
        }
        repository
    }

    pub(super) fn stored(&self, id: &str) -> Inquiry {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(&inquiry_id(id))
            .cloned()
            .expect("inquiry stored")
    }

    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("repository mutex poisoned").len()
    }

    fn matching(&self, predicate: impl Fn(&Inquiry) -> bool) -> Vec<Inquiry> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut found: Vec<Inquiry> = guard
            .values()
            .filter(|inquiry| predicate(inquiry))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}

impl InquiryRepository for MemoryRepository {
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&inquiry.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(inquiry.id.clone(), inquiry.clone());
        Ok(inquiry)
    }

    fn fetch(&self, id: &InquiryId) -> Result<Option<Inquiry>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn apply_status_change(
        &self,
        id: &InquiryId,
        expected: InquiryStatus,
        change: &StatusChange,
    ) -> Result<Option<Inquiry>, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let inquiry = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if inquiry.status != expected {
            return Ok(None);
        }
        change.apply(inquiry);
        Ok(Some(inquiry.clone()))
    }

    fn assign_if_unassigned(
        &self,
        id: &InquiryId,
        broker: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let inquiry = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if inquiry.assigned_broker_id.is_some() {
            return Ok(false);
        }
        inquiry.assigned_broker_id = Some(broker.clone());
        Ok(true)
    }

    fn reassign_if_held(
        &self,
        id: &InquiryId,
        from: &BrokerId,
        to: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let inquiry = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if inquiry.assigned_broker_id.as_ref() != Some(from) {
            return Ok(false);
        }
        inquiry.assigned_broker_id = Some(to.clone());
        Ok(true)
    }

    fn find_recent_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        let email = email.to_ascii_lowercase();
        Ok(self.matching(|inquiry| {
            inquiry.normalized_email().as_deref() == Some(email.as_str())
                && inquiry.created_at >= since
        }))
    }

    fn find_recent_by_ip(
        &self,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        Ok(self.matching(|inquiry| inquiry.ip_address == Some(ip) && inquiry.created_at >= since))
    }

    fn find_recent_by_property(
        &self,
        property: &PropertyId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        Ok(self.matching(|inquiry| {
            &inquiry.property_id == property && inquiry.created_at >= since
        }))
    }

    fn open_assigned_to(&self, broker: &BrokerId) -> Result<Vec<Inquiry>, RepositoryError> {
        Ok(self.matching(|inquiry| {
            inquiry.assigned_broker_id.as_ref() == Some(broker) && inquiry.is_open()
        }))
    }
}

/// Repository whose optimistic writes lose to a simulated concurrent writer.
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
    pub(super) rival: Option<BrokerId>,
    pub(super) losses: AtomicUsize,
    pub(super) max_losses: usize,
    /// Reassignment that lands between a status read and its write.
    pub(super) handoff: Option<(BrokerId, BrokerId)>,
    /// Status another writer sets between a status read and its write.
    pub(super) competing_status: Option<InquiryStatus>,
}

impl RacingRepository {
    pub(super) fn new(inner: MemoryRepository, rival: Option<BrokerId>, max_losses: usize) -> Self {
        Self {
            inner,
            rival,
            losses: AtomicUsize::new(0),
            max_losses,
            handoff: None,
            competing_status: None,
        }
    }

    pub(super) fn with_handoff(mut self, from: &str, to: &str) -> Self {
        self.handoff = Some((broker_id(from), broker_id(to)));
        self
    }

    pub(super) fn with_competing_status(mut self, status: InquiryStatus) -> Self {
        self.competing_status = Some(status);
        self
    }
}

impl InquiryRepository for RacingRepository {
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError> {
        self.inner.insert(inquiry)
    }

    fn fetch(&self, id: &InquiryId) -> Result<Option<Inquiry>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn apply_status_change(
        &self,
        id: &InquiryId,
        expected: InquiryStatus,
        change: &StatusChange,
    ) -> Result<Option<Inquiry>, RepositoryError> {
        if let Some((from, to)) = &self.handoff {
            self.inner.reassign_if_held(id, from, to)?;
        }
        if let Some(status) = self.competing_status {
            if let Some(inquiry) = self
                .inner
                .records
                .lock()
                .expect("repository mutex poisoned")
                .get_mut(id)
            {
                inquiry.status = status;
            }
        }
        self.inner.apply_status_change(id, expected, change)
    }

    fn assign_if_unassigned(
        &self,
        id: &InquiryId,
        broker: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        if self.losses.fetch_add(1, Ordering::SeqCst) < self.max_losses {
            if let Some(rival) = &self.rival {
                self.inner.assign_if_unassigned(id, rival)?;
            }
            return Ok(false);
        }
        self.inner.assign_if_unassigned(id, broker)
    }

    fn reassign_if_held(
        &self,
        id: &InquiryId,
        from: &BrokerId,
        to: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        self.inner.reassign_if_held(id, from, to)
    }

    fn find_recent_by_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        self.inner.find_recent_by_email(email, since)
    }

    fn find_recent_by_ip(
        &self,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        self.inner.find_recent_by_ip(ip, since)
    }

    fn find_recent_by_property(
        &self,
        property: &PropertyId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        self.inner.find_recent_by_property(property, since)
    }

    fn open_assigned_to(&self, broker: &BrokerId) -> Result<Vec<Inquiry>, RepositoryError> {
        self.inner.open_assigned_to(broker)
    }
}

pub(super) struct UnavailableRepository;

impl InquiryRepository for UnavailableRepository {
    fn insert(&self, _inquiry: Inquiry) -> Result<Inquiry, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &InquiryId) -> Result<Option<Inquiry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn apply_status_change(
        &self,
        _id: &InquiryId,
        _expected: InquiryStatus,
        _change: &StatusChange,
    ) -> Result<Option<Inquiry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn assign_if_unassigned(
        &self,
        _id: &InquiryId,
        _broker: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn reassign_if_held(
        &self,
        _id: &InquiryId,
        _from: &BrokerId,
        _to: &BrokerId,
    ) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_recent_by_email(
        &self,
        _email: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_recent_by_ip(
        &self,
        _ip: IpAddr,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_recent_by_property(
        &self,
        _property: &PropertyId,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn open_assigned_to(&self, _broker: &BrokerId) -> Result<Vec<Inquiry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    brokers: Mutex<Vec<BrokerProfile>>,
    properties: Mutex<HashMap<PropertyId, PropertySnapshot>>,
    workloads: Mutex<HashMap<BrokerId, WorkloadSnapshot>>,
}

impl MemoryDirectory {
    pub(super) fn with_property(property: PropertySnapshot) -> Self {
        let directory = Self::default();
        directory
            .properties
            .lock()
            .expect("directory mutex poisoned")
            .insert(property.id.clone(), property);
        directory
    }

    pub(super) fn add_broker(&self, broker: BrokerProfile, snapshot: WorkloadSnapshot) {
        self.workloads
            .lock()
            .expect("directory mutex poisoned")
            .insert(broker.id.clone(), snapshot);
        self.brokers
            .lock()
            .expect("directory mutex poisoned")
            .push(broker);
    }

    pub(super) fn property_snapshot(&self, id: &str) -> PropertySnapshot {
        self.properties
            .lock()
            .expect("directory mutex poisoned")
            .get(&property_id(id))
            .cloned()
            .expect("property stored")
    }

    fn snapshot(&self, broker: &BrokerId) -> WorkloadSnapshot {
        self.workloads
            .lock()
            .expect("directory mutex poisoned")
            .get(broker)
            .copied()
            .unwrap_or_default()
    }
}

impl BrokerDirectory for MemoryDirectory {
    fn list_eligible_brokers(
        &self,
        _property: &PropertyId,
    ) -> Result<Vec<BrokerProfile>, RepositoryError> {
        // Returned unfiltered so callers' own eligibility checks are exercised.
        Ok(self.brokers.lock().expect("directory mutex poisoned").clone())
    }

    fn property(&self, property: &PropertyId) -> Result<Option<PropertySnapshot>, RepositoryError> {
        Ok(self
            .properties
            .lock()
            .expect("directory mutex poisoned")
            .get(property)
            .cloned())
    }

    fn deactivate_broker(
        &self,
        broker: &BrokerId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.brokers.lock().expect("directory mutex poisoned");
        Ok(match guard.iter_mut().find(|profile| &profile.id == broker) {
            Some(profile) => {
                profile.active = false;
                profile.deactivated_at = Some(at);
                true
            }
            None => false,
        })
    }
}

impl WorkloadQuery for MemoryDirectory {
    fn active_inquiry_count(&self, broker: &BrokerId) -> Result<u32, RepositoryError> {
        Ok(self.snapshot(broker).active_inquiries)
    }

    fn active_client_count(&self, broker: &BrokerId) -> Result<u32, RepositoryError> {
        Ok(self.snapshot(broker).active_clients)
    }

    fn recent_completion_rate(
        &self,
        broker: &BrokerId,
        _since: DateTime<Utc>,
    ) -> Result<Option<f64>, RepositoryError> {
        Ok(self.snapshot(broker).completion_rate)
    }
}

#[derive(Default)]
pub(super) struct MemoryLog {
    duplicates: Mutex<Vec<DuplicateLogEntry>>,
    unassigned: Mutex<Vec<UnassignedNotice>>,
}

impl MemoryLog {
    pub(super) fn duplicates(&self) -> Vec<DuplicateLogEntry> {
        self.duplicates.lock().expect("log mutex poisoned").clone()
    }

    pub(super) fn unassigned(&self) -> Vec<UnassignedNotice> {
        self.unassigned.lock().expect("log mutex poisoned").clone()
    }
}

impl ActivityLog for MemoryLog {
    fn record_duplicate(&self, entry: DuplicateLogEntry) -> Result<(), LogError> {
        self.duplicates
            .lock()
            .expect("log mutex poisoned")
            .push(entry);
        Ok(())
    }

    fn record_unassigned(&self, notice: UnassignedNotice) -> Result<(), LogError> {
        self.unassigned
            .lock()
            .expect("log mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) type MemoryService = InquiryDeskService<MemoryRepository, MemoryDirectory, MemoryLog>;

pub(super) fn build_service(
    directory: MemoryDirectory,
) -> (
    MemoryService,
    Arc<MemoryRepository>,
    Arc<MemoryDirectory>,
    Arc<MemoryLog>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let directory = Arc::new(directory);
    let log = Arc::new(MemoryLog::default());
    let service = InquiryDeskService::new(
        repository.clone(),
        directory.clone(),
        log.clone(),
        DeskConfig::default(),
    );
    (service, repository, directory, log)
}
