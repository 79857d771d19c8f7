use tenant_core::{AddonScope, BillingCycle};
use thiserror::Error;

/// A selection the wizard cannot accept as-is. Raised by edits and by
/// pre-submission validation; never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("no plan selected")]
    NoPlanSelected,
    #[error("plan `{0}` is not in the catalog")]
    UnknownPlan(String),
    #[error("branch count {count} is outside 1..={max}")]
    InvalidBranchCount { count: u32, max: u32 },
    #[error("branch {0} does not exist")]
    UnknownBranch(u32),
    #[error("add-on `{0}` is not offered by the selected plan")]
    UnknownAddon(String),
    #[error("add-on `{addon_id}` is {expected}-scoped")]
    ScopeMismatch { addon_id: String, expected: AddonScope },
    #[error("add-on `{addon_id}` has no feature level `{level}`")]
    UnknownFeatureLevel { addon_id: String, level: String },
    #[error("add-on `{0}` is included with the plan and cannot be removed")]
    IncludedAddon(String),
    #[error("add-on `{0}` is not selected")]
    NotSelected(String),
    #[error("add-on `{addon_id}` references missing branch {branch_index}")]
    OrphanedAddon { addon_id: String, branch_index: u32 },
    #[error("plan `{plan_id}` is not offered with {cycle} billing")]
    CycleNotOffered { plan_id: String, cycle: BillingCycle },
    #[error("branch name must not be empty")]
    EmptyBranchName,
}
