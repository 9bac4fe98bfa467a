use super::duplicates::DuplicatePolicy;
use super::workload::FitConfig;

/// Engine tuning shared by the duplicate guard and the dispatcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeskConfig {
    pub duplicates: DuplicatePolicy,
    pub fit: FitConfig,
}
