use std::collections::BTreeSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::duplicates::DuplicateType;
use super::status::InquiryStatus;

/// Identifier wrapper for stored inquiries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InquiryId(pub String);

/// Identifier of a listed property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Identifier of a broker account. Ordering doubles as the final dispatch tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BrokerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryKind {
    #[default]
    General,
    Viewing,
    Purchase,
    Information,
}

impl InquiryKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Viewing => "viewing",
            Self::Purchase => "purchase",
            Self::Information => "information",
        }
    }
}

/// Buyer-provided payload accepted by the intake pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquirySubmission {
    pub property_id: PropertyId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub kind: InquiryKind,
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub ip_address: Option<IpAddr>,
}

/// One buyer inquiry against one property.
///
/// `assigned_broker_id` names whoever is working the lead. It is unrelated to
/// [`PropertySnapshot::owner_broker_id`], which this engine never writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: InquiryId,
    pub property_id: PropertyId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub kind: InquiryKind,
    pub client_id: Option<ClientId>,
    pub assigned_broker_id: Option<BrokerId>,
    pub status: InquiryStatus,
    pub contacted_at: Option<DateTime<Utc>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    /// Set when the inquiry reaches `Completed` and kept through a later close.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub ip_address: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
    /// Duplicate classification attached when the guard flagged the submission for review.
    pub review_flag: Option<DuplicateType>,
}

impl Inquiry {
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Lowercased, trimmed email used for duplicate comparisons.
    pub fn normalized_email(&self) -> Option<String> {
        normalize_email(self.email.as_deref())
    }
}

pub(crate) fn normalize_email(email: Option<&str>) -> Option<String> {
    email
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Read-only view of a listed property used for location affinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub id: PropertyId,
    pub owner_broker_id: Option<BrokerId>,
    /// Listing status as reported by the catalog. Informational only.
    #[serde(default)]
    pub status: Option<String>,
    pub municipality: Option<String>,
}

/// Broker account fields relevant to eligibility and fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerProfile {
    pub id: BrokerId,
    pub name: String,
    pub approved: bool,
    pub active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Empty means the broker accepts work in any municipality.
    #[serde(default)]
    pub preferred_locations: BTreeSet<String>,
}

impl BrokerProfile {
    pub fn is_eligible(&self) -> bool {
        self.approved && self.active && self.deactivated_at.is_none()
    }

    pub fn prefers(&self, municipality: &str) -> bool {
        self.preferred_locations.is_empty()
            || self
                .preferred_locations
                .iter()
                .any(|location| location.trim().eq_ignore_ascii_case(municipality.trim()))
    }
}
