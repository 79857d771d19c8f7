//! The in-progress wizard selection: what gets priced, persisted, and submitted.

use serde::{Deserialize, Serialize};

use crate::catalog::{AddonScope, BillingCycle};

/// One branch of the tenant's organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub index: u32,
    pub name: String,
    /// Covered by the plan's included-branch allotment.
    pub is_included: bool,
}

impl Branch {
    pub fn default_name(index: u32) -> String {
        format!("Branch {}", index + 1)
    }
}

/// An add-on the user switched on, at organization level or for one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAddonAssignment {
    pub addon_id: String,
    pub name: String,
    pub scope: AddonScope,
    #[serde(default)]
    pub feature_level: Option<String>,
    pub quantity: u32,
    /// Owning branch; set exactly when `scope` is `Branch`.
    #[serde(default)]
    pub branch_index: Option<u32>,
    pub unit_price: f64,
}

impl SelectedAddonAssignment {
    pub fn matches(&self, addon_id: &str, branch_index: Option<u32>) -> bool {
        self.addon_id == addon_id && self.branch_index == branch_index
    }
}

/// Aggregate persisted between sessions and submitted on confirmation.
/// Totals are derived from it on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardSelection {
    pub plan_id: Option<String>,
    pub billing_cycle: BillingCycle,
    pub branch_count: u32,
    pub branches: Vec<Branch>,
    pub addons: Vec<SelectedAddonAssignment>,
}

impl Default for WizardSelection {
    fn default() -> Self {
        Self {
            plan_id: None,
            billing_cycle: BillingCycle::Monthly,
            branch_count: 1,
            branches: vec![Branch {
                index: 0,
                name: Branch::default_name(0),
                is_included: true,
            }],
            addons: Vec::new(),
        }
    }
}

impl WizardSelection {
    pub fn organization_addons(&self) -> impl Iterator<Item = &SelectedAddonAssignment> {
        self.addons
            .iter()
            .filter(|a| a.scope == AddonScope::Organization)
    }

    pub fn branch_addons(&self, index: u32) -> impl Iterator<Item = &SelectedAddonAssignment> {
        self.addons
            .iter()
            .filter(move |a| a.scope == AddonScope::Branch && a.branch_index == Some(index))
    }

    pub fn assignment(&self, addon_id: &str, branch_index: Option<u32>) -> Option<&SelectedAddonAssignment> {
        self.addons.iter().find(|a| a.matches(addon_id, branch_index))
    }

    pub fn has_branch(&self, index: u32) -> bool {
        self.branches.iter().any(|b| b.index == index)
    }
}
