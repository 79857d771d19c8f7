//! Branch configurator: derives the editable branch list from a requested
//! branch count and keeps add-on assignments pointing at live branches.

use tenant_core::{Branch, Plan, SelectedAddonAssignment, WizardSelection};
use tracing::debug;

use crate::addons::AddonSelector;
use crate::error::SelectionError;

/// Outcome of resizing a branch list.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchResize {
    pub branches: Vec<Branch>,
    /// Indices that existed before and are gone now.
    pub removed: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct BranchConfigurator {
    max_branches: u32,
}

impl BranchConfigurator {
    pub fn new(max_branches: u32) -> Self {
        Self {
            max_branches: max_branches.max(1),
        }
    }

    pub fn max_branches(&self) -> u32 {
        self.max_branches
    }

    /// Build a list of `count` branches. Names survive for indices that still
    /// exist; new indices get "Branch k". The first `included_count` branches
    /// are flagged included, the rest extra.
    pub fn resize(current: &[Branch], count: u32, included_count: u32) -> BranchResize {
        let branches = (0..count)
            .map(|index| {
                let name = current
                    .iter()
                    .find(|b| b.index == index)
                    .map(|b| b.name.clone())
                    .unwrap_or_else(|| Branch::default_name(index));
                Branch {
                    index,
                    name,
                    is_included: index < included_count,
                }
            })
            .collect();
        let removed = current
            .iter()
            .map(|b| b.index)
            .filter(|index| *index >= count)
            .collect();
        BranchResize { branches, removed }
    }

    /// Change the branch count of `selection`.
    ///
    /// Branch-scoped assignments on removed branches are pruned and handed to
    /// `on_addons_affected` before returning; shrinking below the number of
    /// branches with add-ons is never an error.
    pub fn set_branch_count<F>(
        &self,
        selection: &mut WizardSelection,
        plan: Option<&Plan>,
        count: u32,
        on_addons_affected: F,
    ) -> Result<BranchResize, SelectionError>
    where
        F: FnOnce(&[SelectedAddonAssignment]),
    {
        if count == 0 || count > self.max_branches {
            return Err(SelectionError::InvalidBranchCount {
                count,
                max: self.max_branches,
            });
        }

        let included = included_count(plan, count);
        let resize = Self::resize(&selection.branches, count, included);
        selection.branch_count = count;
        selection.branches = resize.branches.clone();

        let pruned = AddonSelector::prune_branches(&mut selection.addons, count);
        if !pruned.is_empty() {
            debug!(
                branch_count = count,
                pruned = pruned.len(),
                "Dropped add-ons of removed branches"
            );
            on_addons_affected(&pruned);
        }

        if let Some(plan) = plan {
            AddonSelector::new(plan).apply_plan(selection);
        }

        Ok(resize)
    }

    pub fn rename_branch(
        selection: &mut WizardSelection,
        index: u32,
        name: &str,
    ) -> Result<(), SelectionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SelectionError::EmptyBranchName);
        }
        let branch = selection
            .branches
            .iter_mut()
            .find(|b| b.index == index)
            .ok_or(SelectionError::UnknownBranch(index))?;
        branch.name = name.to_string();
        Ok(())
    }
}

/// Branches covered by the plan. Without a plan nothing is billed, so every
/// branch counts as included.
pub(crate) fn included_count(plan: Option<&Plan>, count: u32) -> u32 {
    plan.map(|p| p.included_branches_count).unwrap_or(count)
}
