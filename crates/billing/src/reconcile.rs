//! Invariant repair for a wizard selection, run after every mutation and
//! after restoring persisted state.

use tenant_core::{AddonScope, BillingCycle, WizardSelection};
use tracing::{debug, warn};

use crate::addons::AddonSelector;
use crate::branches::{included_count, BranchConfigurator};
use crate::catalog::PlanCatalog;
use crate::error::SelectionError;

/// Plan-independent bounds on a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    pub max_branches: u32,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self { max_branches: 50 }
    }
}

/// Return a copy of `selection` that satisfies every selection invariant:
///
/// - an unknown plan id is dropped;
/// - branch count is clamped to `1..=max_branches` and the branch list is
///   rebuilt to match, with included flags from the plan;
/// - the billing cycle falls back to monthly if the plan does not offer it;
/// - add-ons are pruned to the plan catalog and live branches, deduplicated,
///   re-priced, and the plan's included add-ons are present at zero price.
///
/// Idempotent: `reconcile(reconcile(s)) == reconcile(s)`.
pub fn reconcile(
    selection: WizardSelection,
    catalog: &PlanCatalog,
    limits: &SelectionLimits,
) -> WizardSelection {
    let mut next = selection;

    let plan = match next.plan_id.as_deref() {
        Some(id) => {
            let plan = catalog.get(id);
            if plan.is_none() {
                warn!(plan_id = id, "Selected plan no longer in catalog, clearing selection");
                next.plan_id = None;
            }
            plan
        }
        None => None,
    };

    let max = limits.max_branches.max(1);
    let count = next.branch_count.clamp(1, max);
    if count != next.branch_count {
        debug!(requested = next.branch_count, clamped = count, "Branch count clamped");
    }
    next.branch_count = count;
    next.branches = BranchConfigurator::resize(&next.branches, count, included_count(plan, count)).branches;
    AddonSelector::prune_branches(&mut next.addons, count);

    match plan {
        Some(plan) => {
            if !plan.offers_cycle(next.billing_cycle) {
                debug!(
                    plan_id = %plan.id,
                    cycle = %next.billing_cycle,
                    "Billing cycle not offered by plan, falling back to monthly"
                );
                next.billing_cycle = BillingCycle::Monthly;
            }
            AddonSelector::new(plan).apply_plan(&mut next);
        }
        None => {
            next.billing_cycle = BillingCycle::Monthly;
            next.addons.clear();
        }
    }

    next
}

/// Check a selection is ready for submission without modifying it.
pub fn validate(
    selection: &WizardSelection,
    catalog: &PlanCatalog,
    limits: &SelectionLimits,
) -> Result<(), SelectionError> {
    let plan_id = selection
        .plan_id
        .as_deref()
        .ok_or(SelectionError::NoPlanSelected)?;
    let plan = catalog
        .get(plan_id)
        .ok_or_else(|| SelectionError::UnknownPlan(plan_id.to_string()))?;

    if selection.branch_count == 0 || selection.branch_count > limits.max_branches {
        return Err(SelectionError::InvalidBranchCount {
            count: selection.branch_count,
            max: limits.max_branches,
        });
    }
    if !plan.offers_cycle(selection.billing_cycle) {
        return Err(SelectionError::CycleNotOffered {
            plan_id: plan.id.clone(),
            cycle: selection.billing_cycle,
        });
    }

    for assignment in &selection.addons {
        let addon = plan
            .addon(&assignment.addon_id)
            .ok_or_else(|| SelectionError::UnknownAddon(assignment.addon_id.clone()))?;
        let placed = match assignment.branch_index {
            Some(_) => AddonScope::Branch,
            None => AddonScope::Organization,
        };
        if assignment.scope != addon.scope || placed != addon.scope {
            return Err(SelectionError::ScopeMismatch {
                addon_id: assignment.addon_id.clone(),
                expected: addon.scope,
            });
        }
        if let Some(index) = assignment.branch_index {
            if index >= selection.branch_count || !selection.has_branch(index) {
                return Err(SelectionError::OrphanedAddon {
                    addon_id: assignment.addon_id.clone(),
                    branch_index: index,
                });
            }
        }
    }
    Ok(())
}
