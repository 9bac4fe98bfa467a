use chrono::{DateTime, Duration, Utc};
use inquiry_desk::workflows::inquiries::{
    ActivityLog, BrokerDirectory, BrokerId, BrokerProfile, DuplicateLogEntry, Inquiry, InquiryId,
    InquiryRepository, InquiryStatus, LogError, PropertyId, PropertySnapshot, RepositoryError,
    StatusChange, UnassignedNotice, WorkloadQuery,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryInquiryRepository {
    records: Arc<Mutex<HashMap<InquiryId, Inquiry>>>,
}

impl InMemoryInquiryRepository {
    fn select(
        &self,
        predicate: impl Fn(&Inquiry) -> bool,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        let mut found: Vec<Inquiry> = guard
            .values()
            .filter(|inquiry| predicate(inquiry))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("in-memory store poisoned".to_string())
}

impl InquiryRepository for InMemoryInquiryRepository {
    fn insert(&self, inquiry: Inquiry) -> Result<Inquiry, RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        if guard.contains_key(&inquiry.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(inquiry.id.clone(), inquiry.clone());
        Ok(inquiry)
    }

    fn fetch(&self, id: &InquiryId) -> Result<Option<Inquiry>, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    fn apply_status_change(
        &self,
        id: &InquiryId,
        expected: InquiryStatus,
        change: &StatusChange,
    ) -> Result<Option<Inquiry>, RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
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
        let mut guard = self.records.lock().map_err(poisoned)?;
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
        let mut guard = self.records.lock().map_err(poisoned)?;
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
        self.select(|inquiry| {
            inquiry.created_at >= since && inquiry.normalized_email().as_deref() == Some(email)
        })
    }

    fn find_recent_by_ip(
        &self,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        self.select(|inquiry| inquiry.created_at >= since && inquiry.ip_address == Some(ip))
    }

    fn find_recent_by_property(
        &self,
        property: &PropertyId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        self.select(|inquiry| inquiry.created_at >= since && &inquiry.property_id == property)
    }

    fn open_assigned_to(&self, broker: &BrokerId) -> Result<Vec<Inquiry>, RepositoryError> {
        self.select(|inquiry| {
            inquiry.is_open() && inquiry.assigned_broker_id.as_ref() == Some(broker)
        })
    }
}

/// Broker roster and listings held in memory. Workload counters are derived from the live
/// inquiry store at scoring time.
#[derive(Clone)]
pub(crate) struct InMemoryBrokerDirectory {
    brokers: Arc<Mutex<Vec<BrokerProfile>>>,
    properties: Arc<Mutex<HashMap<PropertyId, PropertySnapshot>>>,
    inquiries: InMemoryInquiryRepository,
}

impl InMemoryBrokerDirectory {
    pub(crate) fn new(inquiries: InMemoryInquiryRepository) -> Self {
        Self {
            brokers: Arc::new(Mutex::new(Vec::new())),
            properties: Arc::new(Mutex::new(HashMap::new())),
            inquiries,
        }
    }

    pub(crate) fn add_broker(&self, broker: BrokerProfile) {
        if let Ok(mut guard) = self.brokers.lock() {
            guard.push(broker);
        }
    }

    pub(crate) fn add_property(&self, property: PropertySnapshot) {
        if let Ok(mut guard) = self.properties.lock() {
            guard.insert(property.id.clone(), property);
        }
    }

    fn assigned_since(
        &self,
        broker: &BrokerId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Inquiry>, RepositoryError> {
        self.inquiries.select(|inquiry| {
            inquiry.created_at >= since && inquiry.assigned_broker_id.as_ref() == Some(broker)
        })
    }
}

impl BrokerDirectory for InMemoryBrokerDirectory {
    fn list_eligible_brokers(
        &self,
        _property: &PropertyId,
    ) -> Result<Vec<BrokerProfile>, RepositoryError> {
        let guard = self.brokers.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|broker| broker.is_eligible())
            .cloned()
            .collect())
    }

    fn property(&self, property: &PropertyId) -> Result<Option<PropertySnapshot>, RepositoryError> {
        let guard = self.properties.lock().map_err(poisoned)?;
        Ok(guard.get(property).cloned())
    }

    fn deactivate_broker(
        &self,
        broker: &BrokerId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.brokers.lock().map_err(poisoned)?;
        let Some(profile) = guard.iter_mut().find(|profile| &profile.id == broker) else {
            return Ok(false);
        };
        profile.active = false;
        profile.deactivated_at = Some(at);
        Ok(true)
    }
}

impl WorkloadQuery for InMemoryBrokerDirectory {
    fn active_inquiry_count(&self, broker: &BrokerId) -> Result<u32, RepositoryError> {
        Ok(self.inquiries.open_assigned_to(broker)?.len() as u32)
    }

    fn active_client_count(&self, broker: &BrokerId) -> Result<u32, RepositoryError> {
        let clients: HashSet<_> = self
            .inquiries
            .open_assigned_to(broker)?
            .into_iter()
            .filter_map(|inquiry| inquiry.client_id)
            .collect();
        Ok(clients.len() as u32)
    }

    fn recent_completion_rate(
        &self,
        broker: &BrokerId,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, RepositoryError> {
        let handled = self.assigned_since(broker, since)?;
        if handled.is_empty() {
            return Ok(None);
        }
        let completed = handled
            .iter()
            .filter(|inquiry| inquiry.completed_at.is_some())
            .count();
        Ok(Some(completed as f64 / handled.len() as f64))
    }
}

/// Activity log that writes through `tracing` and keeps a copy for inspection.
#[derive(Default, Clone)]
pub(crate) struct TracingActivityLog {
    duplicates: Arc<Mutex<Vec<DuplicateLogEntry>>>,
    unassigned: Arc<Mutex<Vec<UnassignedNotice>>>,
}

impl TracingActivityLog {
    pub(crate) fn duplicates(&self) -> Vec<DuplicateLogEntry> {
        self.duplicates
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub(crate) fn unassigned(&self) -> Vec<UnassignedNotice> {
        self.unassigned
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ActivityLog for TracingActivityLog {
    fn record_duplicate(&self, entry: DuplicateLogEntry) -> Result<(), LogError> {
        warn!(
            email = %entry.email,
            property = %entry.property_id.0,
            duplicate_type = entry.duplicate_type.label(),
            action = entry.action.label(),
            "duplicate inquiry detected"
        );
        self.duplicates
            .lock()
            .map_err(|_| LogError::Transport("duplicate log poisoned".to_string()))?
            .push(entry);
        Ok(())
    }

    fn record_unassigned(&self, notice: UnassignedNotice) -> Result<(), LogError> {
        info!(
            inquiry = %notice.inquiry_id.0,
            property = %notice.property_id.0,
            "inquiry waiting for a broker"
        );
        self.unassigned
            .lock()
            .map_err(|_| LogError::Transport("unassigned log poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}

/// Sample roster and listings used by `serve` and `demo`.
pub(crate) fn seed_sample_roster(directory: &InMemoryBrokerDirectory, now: DateTime<Utc>) {
    let roster = [
        (
            "broker-anna",
            "Anna Berg",
            &["Stockholm", "Solna"][..],
            Duration::minutes(5),
        ),
        ("broker-erik", "Erik Holm", &["Stockholm"][..], Duration::hours(6)),
        ("broker-lina", "Lina Sand", &["Uppsala"][..], Duration::minutes(30)),
    ];
    for (id, name, locations, idle) in roster {
        directory.add_broker(BrokerProfile {
            id: BrokerId(id.to_string()),
            name: name.to_string(),
            approved: true,
            active: true,
            deactivated_at: None,
            last_seen_at: Some(now - idle),
            preferred_locations: locations
                .iter()
                .map(|place| place.to_string())
                .collect::<BTreeSet<_>>(),
        });
    }

    for (id, municipality, owner) in [
        ("prop-sodermalm-7", "Stockholm", "broker-anna"),
        ("prop-fyris-2", "Uppsala", "broker-lina"),
    ] {
        directory.add_property(PropertySnapshot {
            id: PropertyId(id.to_string()),
            owner_broker_id: Some(BrokerId(owner.to_string())),
            status: Some("published".to_string()),
            municipality: Some(municipality.to_string()),
        });
    }
}
