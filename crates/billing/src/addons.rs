//! Add-on selector: tracks which catalog add-ons are switched on, at which
//! feature level and quantity, per organization or per branch.

use tenant_core::{AddonScope, CatalogAddon, Plan, SelectedAddonAssignment, WizardSelection};
use tracing::debug;

use crate::error::SelectionError;

/// Add-on operations against the catalog of one plan.
#[derive(Debug, Clone, Copy)]
pub struct AddonSelector<'a> {
    plan: &'a Plan,
}

impl<'a> AddonSelector<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        Self { plan }
    }

    /// Switch an add-on on or off. Returns `true` when it is now selected.
    pub fn toggle_addon(
        &self,
        selection: &mut WizardSelection,
        addon_id: &str,
        scope: AddonScope,
        branch_index: Option<u32>,
    ) -> Result<bool, SelectionError> {
        let addon = self.catalog_addon(addon_id)?;
        check_target(addon, scope, branch_index, selection)?;

        if let Some(pos) = selection
            .addons
            .iter()
            .position(|a| a.matches(addon_id, branch_index))
        {
            if addon.is_included {
                return Err(SelectionError::IncludedAddon(addon_id.to_string()));
            }
            selection.addons.remove(pos);
            debug!(addon_id, ?branch_index, "Add-on deselected");
            return Ok(false);
        }

        selection.addons.push(new_assignment(addon, branch_index));
        debug!(addon_id, ?branch_index, "Add-on selected");
        Ok(true)
    }

    pub fn set_feature_level(
        &self,
        selection: &mut WizardSelection,
        addon_id: &str,
        branch_index: Option<u32>,
        level: &str,
    ) -> Result<(), SelectionError> {
        let addon = self.catalog_addon(addon_id)?;
        if addon.feature_level(level).is_none() {
            return Err(SelectionError::UnknownFeatureLevel {
                addon_id: addon_id.to_string(),
                level: level.to_string(),
            });
        }
        let assignment = find_mut(selection, addon_id, branch_index)?;
        assignment.feature_level = Some(level.to_string());
        assignment.unit_price = addon.unit_price(Some(level));
        Ok(())
    }

    /// Set the quantity, clamped to the add-on's bounds. Returns the stored value.
    pub fn set_quantity(
        &self,
        selection: &mut WizardSelection,
        addon_id: &str,
        branch_index: Option<u32>,
        quantity: u32,
    ) -> Result<u32, SelectionError> {
        let addon = self.catalog_addon(addon_id)?;
        let assignment = find_mut(selection, addon_id, branch_index)?;
        assignment.quantity = addon.clamp_quantity(quantity);
        Ok(assignment.quantity)
    }

    /// Bring every assignment in line with this plan's catalog: drop add-ons
    /// the plan does not offer (or whose scope/branch no longer fits),
    /// re-resolve names, levels, quantities and prices, and force-add the
    /// plan's included add-ons at zero price.
    pub fn apply_plan(&self, selection: &mut WizardSelection) {
        let before = selection.addons.len();
        let branches: Vec<u32> = selection.branches.iter().map(|b| b.index).collect();

        let mut kept: Vec<SelectedAddonAssignment> = Vec::with_capacity(selection.addons.len());
        for mut assignment in selection.addons.drain(..) {
            let Some(addon) = self.plan.addon(&assignment.addon_id) else {
                continue;
            };
            let fits = match (addon.scope, assignment.branch_index) {
                (AddonScope::Organization, None) => true,
                (AddonScope::Branch, Some(index)) => branches.contains(&index),
                _ => false,
            };
            if !fits || kept.iter().any(|k| k.matches(&addon.id, assignment.branch_index)) {
                continue;
            }
            resolve(addon, &mut assignment);
            kept.push(assignment);
        }

        let dropped = before - kept.len();
        if dropped > 0 {
            debug!(plan_id = %self.plan.id, dropped, "Dropped add-ons incompatible with plan");
        }

        for addon in self.plan.included_addons() {
            match addon.scope {
                AddonScope::Organization => {
                    if !kept.iter().any(|k| k.matches(&addon.id, None)) {
                        kept.push(new_assignment(addon, None));
                    }
                }
                AddonScope::Branch => {
                    for index in &branches {
                        if !kept.iter().any(|k| k.matches(&addon.id, Some(*index))) {
                            kept.push(new_assignment(addon, Some(*index)));
                        }
                    }
                }
            }
        }

        selection.addons = kept;
    }

    /// Remove branch-scoped assignments whose branch index is `>= branch_count`.
    /// Returns the removed assignments in their original order.
    pub fn prune_branches(
        addons: &mut Vec<SelectedAddonAssignment>,
        branch_count: u32,
    ) -> Vec<SelectedAddonAssignment> {
        let (pruned, kept): (Vec<_>, Vec<_>) = addons
            .drain(..)
            .partition(|a| matches!(a.branch_index, Some(index) if index >= branch_count));
        *addons = kept;
        pruned
    }

    fn catalog_addon(&self, addon_id: &str) -> Result<&'a CatalogAddon, SelectionError> {
        self.plan
            .addon(addon_id)
            .ok_or_else(|| SelectionError::UnknownAddon(addon_id.to_string()))
    }
}

fn check_target(
    addon: &CatalogAddon,
    scope: AddonScope,
    branch_index: Option<u32>,
    selection: &WizardSelection,
) -> Result<(), SelectionError> {
    let mismatch = || SelectionError::ScopeMismatch {
        addon_id: addon.id.clone(),
        expected: addon.scope,
    };
    if scope != addon.scope {
        return Err(mismatch());
    }
    match (addon.scope, branch_index) {
        (AddonScope::Organization, None) => Ok(()),
        (AddonScope::Branch, Some(index)) if selection.has_branch(index) => Ok(()),
        (AddonScope::Branch, Some(index)) => Err(SelectionError::UnknownBranch(index)),
        _ => Err(mismatch()),
    }
}

fn find_mut<'s>(
    selection: &'s mut WizardSelection,
    addon_id: &str,
    branch_index: Option<u32>,
) -> Result<&'s mut SelectedAddonAssignment, SelectionError> {
    selection
        .addons
        .iter_mut()
        .find(|a| a.matches(addon_id, branch_index))
        .ok_or_else(|| SelectionError::NotSelected(addon_id.to_string()))
}

fn new_assignment(addon: &CatalogAddon, branch_index: Option<u32>) -> SelectedAddonAssignment {
    let feature_level = addon.default_feature_level().map(|l| l.level.clone());
    SelectedAddonAssignment {
        addon_id: addon.id.clone(),
        name: addon.name.clone(),
        scope: addon.scope,
        unit_price: addon.unit_price(feature_level.as_deref()),
        feature_level,
        quantity: addon.clamp_quantity(1),
        branch_index,
    }
}

fn resolve(addon: &CatalogAddon, assignment: &mut SelectedAddonAssignment) {
    let level_known = assignment
        .feature_level
        .as_deref()
        .is_some_and(|l| addon.feature_level(l).is_some());
    if !level_known {
        assignment.feature_level = addon.default_feature_level().map(|l| l.level.clone());
    }
    assignment.name = addon.name.clone();
    assignment.scope = addon.scope;
    assignment.quantity = addon.clamp_quantity(assignment.quantity);
    assignment.unit_price = addon.unit_price(assignment.feature_level.as_deref());
}
