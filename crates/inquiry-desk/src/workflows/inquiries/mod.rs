//! Inquiry intake, duplicate screening, status lifecycle, and broker assignment.
//!
//! Pure pieces (status table, similarity, duplicate classification, cost scoring) take already
//! fetched records; the service and dispatcher reach storage only through the collaborator
//! traits in [`repository`].

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod duplicates;
pub mod repository;
pub mod router;
pub mod service;
pub mod similarity;
pub mod status;
pub mod workload;

#[cfg(test)]
mod tests;

pub use config::DeskConfig;
pub use dispatch::{AssignmentDispatcher, DispatchError, Reassignment, ReassignmentReport};
pub use domain::{
    BrokerId, BrokerProfile, ClientId, Inquiry, InquiryId, InquiryKind, InquirySubmission,
    PropertyId, PropertySnapshot,
};
pub use duplicates::{
    CandidateInquiry, DuplicateAction, DuplicateCheck, DuplicateGuard, DuplicateGuardError,
    DuplicatePolicy, DuplicateType, RecentActivity,
};
pub use repository::{
    ActivityLog, BrokerDirectory, DuplicateLogEntry, InquiryRepository, InquiryStatusView,
    LogError, RepositoryError, StatusChange, UnassignedNotice, WorkloadQuery,
};
pub use router::{inquiry_router, AssignmentView, SubmissionView, TransitionRequest};
pub use service::{InquiryDeskService, InquiryServiceError, SubmissionError, SubmissionReceipt};
pub use similarity::similarity;
pub use status::{InquiryStatus, InvalidTransition};
pub use workload::{
    AssignmentCost, AssignmentWeights, CostComponent, CostFactor, FitConfig, FitScorer,
    RankedBroker, StalenessPolicy, WorkloadSnapshot,
};
