use serde::{Deserialize, Serialize};

/// Human-handling lifecycle of a single inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    New,
    Contacted,
    Scheduled,
    Completed,
    Closed,
}

impl InquiryStatus {
    pub const fn initial() -> Self {
        Self::New
    }

    pub const fn ordered() -> [Self; 5] {
        [
            Self::New,
            Self::Contacted,
            Self::Scheduled,
            Self::Completed,
            Self::Closed,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    /// Transition table: the statuses reachable in one step from `self`.
    pub const fn allowed_targets(self) -> &'static [InquiryStatus] {
        match self {
            Self::New => &[Self::Contacted, Self::Closed],
            Self::Contacted => &[Self::Scheduled, Self::Closed],
            Self::Scheduled => &[Self::Completed, Self::Closed],
            Self::Completed => &[Self::Closed],
            Self::Closed => &[],
        }
    }

    pub fn can_transition(self, target: InquiryStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// FSM terminality. Only `Closed` has no legal move.
    pub fn has_outgoing_transitions(self) -> bool {
        !self.allowed_targets().is_empty()
    }

    /// Workflow completion: no further broker action is expected.
    ///
    /// `Completed` reports true here while still allowing the move to `Closed`, so callers that
    /// need FSM terminality must ask [`InquiryStatus::has_outgoing_transitions`] instead.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Closed)
    }

    /// Whether the inquiry still waits for a first broker response.
    pub const fn requires_response(self) -> bool {
        matches!(self, Self::New)
    }

    pub fn transition_to(self, target: InquiryStatus) -> Result<InquiryStatus, InvalidTransition> {
        if self.can_transition(target) {
            Ok(target)
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
            })
        }
    }
}

impl Default for InquiryStatus {
    fn default() -> Self {
        Self::initial()
    }
}

/// Raised when a requested status change is outside the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move inquiry from {} to {}", .from.label(), .to.label())]
pub struct InvalidTransition {
    pub from: InquiryStatus,
    pub to: InquiryStatus,
}
