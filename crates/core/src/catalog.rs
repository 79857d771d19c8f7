//! Plan catalog model: plans, their catalog add-ons, and the billing cycles
//! a plan can be bought under.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::TenantError;

/// Payment period of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
    Biennial,
    Triennial,
}

impl BillingCycle {
    pub const ALL: &'static [BillingCycle] = &[
        Self::Monthly,
        Self::Yearly,
        Self::Biennial,
        Self::Triennial,
    ];

    /// Number of months billed up front for one cycle.
    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
            Self::Biennial => 24,
            Self::Triennial => 36,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Biennial => "biennial",
            Self::Triennial => "triennial",
        }
    }
}

#[allow(clippy::derivable_impls)]
impl Default for BillingCycle {
    fn default() -> Self {
        Self::Monthly
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" | "month" => Ok(Self::Monthly),
            "yearly" | "annual" | "year" => Ok(Self::Yearly),
            "biennial" => Ok(Self::Biennial),
            "triennial" => Ok(Self::Triennial),
            other => Err(TenantError::Config(format!("unknown billing cycle `{other}`"))),
        }
    }
}

/// Whether an add-on is bought once for the organization or per branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonScope {
    Organization,
    Branch,
}

impl fmt::Display for AddonScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization => f.write_str("organization"),
            Self::Branch => f.write_str("branch"),
        }
    }
}

/// A priced tier of an add-on (e.g. "basic" / "advanced").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLevel {
    pub level: String,
    pub name: String,
    pub price: f64,
}

/// An add-on offered in a plan's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAddon {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scope: AddonScope,
    /// Monthly base price, used when no feature level applies.
    pub price: f64,
    #[serde(default)]
    pub feature_levels: Vec<FeatureLevel>,
    #[serde(default)]
    pub min_quantity: Option<u32>,
    #[serde(default)]
    pub max_quantity: Option<u32>,
    /// Bundled free with the plan.
    #[serde(default)]
    pub is_included: bool,
}

impl CatalogAddon {
    pub fn feature_level(&self, level: &str) -> Option<&FeatureLevel> {
        self.feature_levels.iter().find(|l| l.level == level)
    }

    /// Level pre-selected when the add-on is toggled on.
    pub fn default_feature_level(&self) -> Option<&FeatureLevel> {
        self.feature_levels.first()
    }

    /// Unit price for the given level. Included add-ons are always free.
    pub fn unit_price(&self, level: Option<&str>) -> f64 {
        if self.is_included {
            return 0.0;
        }
        level
            .and_then(|l| self.feature_level(l))
            .map(|l| l.price)
            .unwrap_or(self.price)
    }

    /// Clamp a requested quantity into the add-on's allowed range (never below 1).
    pub fn clamp_quantity(&self, quantity: u32) -> u32 {
        let min = self.min_quantity.unwrap_or(1).max(1);
        let clamped = quantity.max(min);
        match self.max_quantity {
            Some(max) if max >= min => clamped.min(max),
            _ => clamped,
        }
    }
}

/// A purchasable subscription plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub monthly_price: f64,
    pub included_branches_count: u32,
    /// Discount percentage (20.0 = 20 %) per billing cycle.
    #[serde(default)]
    pub discount_percentages: BTreeMap<BillingCycle, f64>,
    #[serde(default)]
    pub addons: Vec<CatalogAddon>,
    #[serde(default)]
    pub is_featured: bool,
    /// Price of each branch beyond `included_branches_count`, charged once
    /// per billing cycle whatever its length. `None` means extra branches
    /// carry no charge.
    #[serde(default)]
    pub extra_branch_price: Option<f64>,
}

impl Plan {
    pub fn addon(&self, addon_id: &str) -> Option<&CatalogAddon> {
        self.addons.iter().find(|a| a.id == addon_id)
    }

    pub fn discount_percentage(&self, cycle: BillingCycle) -> f64 {
        self.discount_percentages.get(&cycle).copied().unwrap_or(0.0)
    }

    /// Monthly billing is always offered; other cycles only when the plan
    /// publishes a discount entry for them.
    pub fn offers_cycle(&self, cycle: BillingCycle) -> bool {
        cycle == BillingCycle::Monthly || self.discount_percentages.contains_key(&cycle)
    }

    pub fn offered_cycles(&self) -> Vec<BillingCycle> {
        BillingCycle::ALL
            .iter()
            .copied()
            .filter(|c| self.offers_cycle(*c))
            .collect()
    }

    pub fn included_addons(&self) -> impl Iterator<Item = &CatalogAddon> {
        self.addons.iter().filter(|a| a.is_included)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiered_addon() -> CatalogAddon {
        CatalogAddon {
            id: "reports".into(),
            name: "Reports".into(),
            description: String::new(),
            scope: AddonScope::Branch,
            price: 5.0,
            feature_levels: vec![
                FeatureLevel { level: "basic".into(), name: "Basic".into(), price: 5.0 },
                FeatureLevel { level: "pro".into(), name: "Pro".into(), price: 12.5 },
            ],
            min_quantity: Some(2),
            max_quantity: Some(4),
            is_included: false,
        }
    }

    #[test]
    fn test_cycle_months_and_parse() {
        assert_eq!(BillingCycle::Monthly.months(), 1);
        assert_eq!(BillingCycle::Yearly.months(), 12);
        assert_eq!(BillingCycle::Triennial.months(), 36);
        assert_eq!("Annual".parse::<BillingCycle>().unwrap(), BillingCycle::Yearly);
        assert!("weekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn test_cycle_serializes_snake_case() {
        let json = serde_json::to_string(&BillingCycle::Biennial).unwrap();
        assert_eq!(json, "\"biennial\"");
    }

    #[test]
    fn test_unit_price_by_level() {
        let addon = tiered_addon();
        assert_eq!(addon.unit_price(None), 5.0);
        assert_eq!(addon.unit_price(Some("pro")), 12.5);
        assert_eq!(addon.unit_price(Some("unknown")), 5.0);

        let included = CatalogAddon { is_included: true, ..addon };
        assert_eq!(included.unit_price(Some("pro")), 0.0);
    }

    #[test]
    fn test_clamp_quantity() {
        let addon = tiered_addon();
        assert_eq!(addon.clamp_quantity(0), 2);
        assert_eq!(addon.clamp_quantity(3), 3);
        assert_eq!(addon.clamp_quantity(9), 4);

        let unbounded = CatalogAddon { min_quantity: None, max_quantity: None, ..tiered_addon() };
        assert_eq!(unbounded.clamp_quantity(0), 1);
        assert_eq!(unbounded.clamp_quantity(250), 250);
    }

    #[test]
    fn test_offered_cycles() {
        let mut discounts = BTreeMap::new();
        discounts.insert(BillingCycle::Yearly, 20.0);
        let plan = Plan {
            id: "pro".into(),
            name: "Pro".into(),
            description: String::new(),
            monthly_price: 100.0,
            included_branches_count: 1,
            discount_percentages: discounts,
            addons: vec![],
            is_featured: false,
            extra_branch_price: None,
        };
        assert_eq!(plan.offered_cycles(), vec![BillingCycle::Monthly, BillingCycle::Yearly]);
        assert!(!plan.offers_cycle(BillingCycle::Biennial));
        assert_eq!(plan.discount_percentage(BillingCycle::Yearly), 20.0);
        assert_eq!(plan.discount_percentage(BillingCycle::Monthly), 0.0);
    }
}
