use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{normalize_email, Inquiry, InquiryId, PropertyId};
use super::repository::{
    ActivityLog, DuplicateLogEntry, InquiryRepository, LogError, RepositoryError,
};
use super::similarity::similarity;

/// Classification attached to a flagged or rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateType {
    ExactMatch,
    IpFrequency,
    ClientFrequency,
    PropertySpam,
    SimilarContent,
}

impl DuplicateType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::IpFrequency => "ip_frequency",
            Self::ClientFrequency => "client_frequency",
            Self::PropertySpam => "property_spam",
            Self::SimilarContent => "similar_content",
        }
    }

    /// Severity-derived action for each classification.
    pub const fn action(self) -> DuplicateAction {
        match self {
            Self::ExactMatch | Self::IpFrequency => DuplicateAction::Reject,
            Self::ClientFrequency | Self::PropertySpam | Self::SimilarContent => {
                DuplicateAction::Flag
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    Allow,
    Flag,
    Reject,
}

impl DuplicateAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Flag => "flag",
            Self::Reject => "reject",
        }
    }
}

/// Guard verdict for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub duplicate_type: Option<DuplicateType>,
    pub action: DuplicateAction,
    pub original_inquiry_id: Option<InquiryId>,
}

impl DuplicateCheck {
    pub fn allow() -> Self {
        Self {
            is_duplicate: false,
            duplicate_type: None,
            action: DuplicateAction::Allow,
            original_inquiry_id: None,
        }
    }

    fn matched(duplicate_type: DuplicateType, original: Option<&Inquiry>) -> Self {
        Self {
            is_duplicate: true,
            duplicate_type: Some(duplicate_type),
            action: duplicate_type.action(),
            original_inquiry_id: original.map(|inquiry| inquiry.id.clone()),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.action == DuplicateAction::Reject
    }

    pub fn summary(&self) -> String {
        match (self.duplicate_type, &self.original_inquiry_id) {
            (None, _) => "submission allowed".to_string(),
            (Some(kind), Some(original)) => format!(
                "{} ({}) against inquiry {}",
                kind.label(),
                self.action.label(),
                original.0
            ),
            (Some(kind), None) => format!("{} ({})", kind.label(), self.action.label()),
        }
    }
}

const DEFAULT_EXACT_WINDOW_HOURS: i64 = 24;
const DEFAULT_FREQUENCY_WINDOW_MINUTES: i64 = 60;
const DEFAULT_IP_THRESHOLD: usize = 5;
const DEFAULT_CLIENT_THRESHOLD: usize = 3;
const DEFAULT_PROPERTY_THRESHOLD: usize = 10;
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Lookback windows and thresholds for each rule of the cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatePolicy {
    pub exact_window: Duration,
    pub ip_window: Duration,
    pub ip_threshold: usize,
    pub client_window: Duration,
    pub client_threshold: usize,
    pub property_window: Duration,
    pub property_threshold: usize,
    pub similar_window: Duration,
    pub similarity_threshold: f64,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self {
            exact_window: Duration::hours(DEFAULT_EXACT_WINDOW_HOURS),
            ip_window: Duration::minutes(DEFAULT_FREQUENCY_WINDOW_MINUTES),
            ip_threshold: DEFAULT_IP_THRESHOLD,
            client_window: Duration::minutes(DEFAULT_FREQUENCY_WINDOW_MINUTES),
            client_threshold: DEFAULT_CLIENT_THRESHOLD,
            property_window: Duration::minutes(DEFAULT_FREQUENCY_WINDOW_MINUTES),
            property_threshold: DEFAULT_PROPERTY_THRESHOLD,
            similar_window: Duration::hours(DEFAULT_EXACT_WINDOW_HOURS),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl DuplicatePolicy {
    fn sender_lookback(&self) -> Duration {
        self.exact_window
            .max(self.similar_window)
            .max(self.client_window)
    }
}

/// Submission fields the guard compares against recent history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateInquiry {
    pub email: Option<String>,
    pub property_id: PropertyId,
    pub message: Option<String>,
    pub ip_address: Option<IpAddr>,
    pub submitted_at: DateTime<Utc>,
}

/// History already fetched for a candidate, newest first or in any order.
#[derive(Debug, Clone, Default)]
pub struct RecentActivity {
    pub same_sender: Vec<Inquiry>,
    pub same_ip: Vec<Inquiry>,
    pub same_property: Vec<Inquiry>,
}

/// Ordered duplicate cascade; the first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct DuplicateGuard {
    policy: DuplicatePolicy,
}

impl DuplicateGuard {
    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DuplicatePolicy {
        &self.policy
    }

    /// Fetch recent history, classify, and record any non-allow verdict.
    pub fn screen<R, L>(
        &self,
        candidate: &CandidateInquiry,
        repository: &R,
        log: &L,
    ) -> Result<DuplicateCheck, DuplicateGuardError>
    where
        R: InquiryRepository + ?Sized,
        L: ActivityLog + ?Sized,
    {
        let Some((email, _)) = comparable(candidate) else {
            return Ok(DuplicateCheck::allow());
        };

        let now = candidate.submitted_at;
        let activity = RecentActivity {
            same_sender: repository
                .find_recent_by_email(&email, now - self.policy.sender_lookback())?,
            same_ip: match candidate.ip_address {
                Some(ip) => repository.find_recent_by_ip(ip, now - self.policy.ip_window)?,
                None => Vec::new(),
            },
            same_property: repository.find_recent_by_property(
                &candidate.property_id,
                now - self.policy.property_window,
            )?,
        };

        let check = self.classify(candidate, &activity);
        if let Some(duplicate_type) = check.duplicate_type {
            log.record_duplicate(DuplicateLogEntry {
                email,
                property_id: candidate.property_id.clone(),
                duplicate_type,
                action: check.action,
                original_inquiry_id: check.original_inquiry_id.clone(),
                recorded_at: now,
            })?;
        }

        Ok(check)
    }

    /// Pure classification over already fetched history.
    pub fn classify(
        &self,
        candidate: &CandidateInquiry,
        activity: &RecentActivity,
    ) -> DuplicateCheck {
        let Some((email, message)) = comparable(candidate) else {
            return DuplicateCheck::allow();
        };
        let now = candidate.submitted_at;
        let policy = &self.policy;

        let exact = same_listing(activity, candidate, &email, policy.exact_window)
            .filter(|inquiry| same_text(message, inquiry))
            .max_by_key(|inquiry| inquiry.created_at);
        if let Some(original) = exact {
            return DuplicateCheck::matched(DuplicateType::ExactMatch, Some(original));
        }

        if candidate.ip_address.is_some() {
            let from_ip: Vec<&Inquiry> = activity
                .same_ip
                .iter()
                .filter(|inquiry| {
                    inquiry.ip_address == candidate.ip_address
                        && within(inquiry, now, policy.ip_window)
                })
                .collect();
            if from_ip.len() >= policy.ip_threshold {
                return DuplicateCheck::matched(DuplicateType::IpFrequency, latest(&from_ip));
            }
        }

        let from_sender: Vec<&Inquiry> = activity
            .same_sender
            .iter()
            .filter(|inquiry| {
                inquiry.normalized_email().as_deref() == Some(email.as_str())
                    && within(inquiry, now, policy.client_window)
            })
            .collect();
        if from_sender.len() >= policy.client_threshold {
            return DuplicateCheck::matched(DuplicateType::ClientFrequency, latest(&from_sender));
        }

        let for_property: Vec<&Inquiry> = activity
            .same_property
            .iter()
            .filter(|inquiry| {
                inquiry.property_id == candidate.property_id
                    && within(inquiry, now, policy.property_window)
            })
            .collect();
        if for_property.len() >= policy.property_threshold {
            return DuplicateCheck::matched(DuplicateType::PropertySpam, latest(&for_property));
        }

        let similar = same_listing(activity, candidate, &email, policy.similar_window)
            .map(|inquiry| (message_similarity(message, inquiry), inquiry))
            .filter(|(score, _)| *score >= policy.similarity_threshold)
            .max_by(|(left, _), (right, _)| left.total_cmp(right));
        if let Some((_, original)) = similar {
            return DuplicateCheck::matched(DuplicateType::SimilarContent, Some(original));
        }

        DuplicateCheck::allow()
    }
}

/// Normalized email and message, or `None` when either is missing.
fn comparable(candidate: &CandidateInquiry) -> Option<(String, &str)> {
    let email = normalize_email(candidate.email.as_deref())?;
    let message = candidate
        .message
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty())?;
    Some((email, message))
}

/// Same sender, same property, inside `window`.
fn same_listing<'a>(
    activity: &'a RecentActivity,
    candidate: &'a CandidateInquiry,
    email: &'a str,
    window: Duration,
) -> impl Iterator<Item = &'a Inquiry> + 'a {
    activity.same_sender.iter().filter(move |inquiry| {
        inquiry.property_id == candidate.property_id
            && inquiry.normalized_email().as_deref() == Some(email)
            && within(inquiry, candidate.submitted_at, window)
    })
}

fn within(inquiry: &Inquiry, now: DateTime<Utc>, window: Duration) -> bool {
    inquiry.created_at >= now - window && inquiry.created_at <= now
}

/// Same message text, ignoring only surrounding and repeated whitespace.
fn same_text(message: &str, inquiry: &Inquiry) -> bool {
    inquiry
        .message
        .as_deref()
        .is_some_and(|other| message.split_whitespace().eq(other.split_whitespace()))
}

fn message_similarity(message: &str, inquiry: &Inquiry) -> f64 {
    inquiry
        .message
        .as_deref()
        .map(|other| similarity(message, other.trim()))
        .unwrap_or(0.0)
}

fn latest<'a>(inquiries: &[&'a Inquiry]) -> Option<&'a Inquiry> {
    inquiries
        .iter()
        .copied()
        .max_by_key(|inquiry| inquiry.created_at)
}

#[derive(Debug, thiserror::Error)]
pub enum DuplicateGuardError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Log(#[from] LogError),
}
