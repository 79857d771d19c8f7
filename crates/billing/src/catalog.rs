//! Plan catalog accessor: the read-only list of plans fetched once per
//! wizard session, plus the demo catalog used in offline mode.

use std::collections::BTreeMap;
use tenant_core::{AddonScope, BillingCycle, CatalogAddon, FeatureLevel, Plan};
use tracing::{info, warn};

/// Immutable plan list, in the order the service returned it.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build a catalog, dropping any plan whose id was already seen.
    pub fn new(plans: Vec<Plan>) -> Self {
        let mut unique: Vec<Plan> = Vec::with_capacity(plans.len());
        for plan in plans {
            if unique.iter().any(|p| p.id == plan.id) {
                warn!(plan_id = %plan.id, "Duplicate plan in catalog, keeping first");
                continue;
            }
            unique.push(plan);
        }
        info!(plans = unique.len(), "Plan catalog loaded");
        Self { plans: unique }
    }

    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Plan pre-selected for a fresh wizard: the first featured plan, else
    /// the first plan.
    pub fn default_plan(&self) -> Option<&Plan> {
        self.plans
            .iter()
            .find(|p| p.is_featured)
            .or_else(|| self.plans.first())
    }

    /// Built-in catalog: 3 plans with a mix of organization and branch add-ons.
    pub fn demo() -> Self {
        let analytics = |included: bool| CatalogAddon {
            id: "analytics".into(),
            name: "Analytics Dashboard".into(),
            description: "Sales and traffic reports across all branches".into(),
            scope: AddonScope::Organization,
            price: 19.0,
            feature_levels: vec![],
            min_quantity: None,
            max_quantity: None,
            is_included: included,
        };
        let loyalty = CatalogAddon {
            id: "loyalty".into(),
            name: "Loyalty Program".into(),
            description: "Points, tiers, and rewards for repeat customers".into(),
            scope: AddonScope::Organization,
            price: 10.0,
            feature_levels: vec![],
            min_quantity: None,
            max_quantity: None,
            is_included: false,
        };
        let sso = CatalogAddon {
            id: "sso".into(),
            name: "Single Sign-On".into(),
            description: "SAML / OIDC login for staff accounts".into(),
            scope: AddonScope::Organization,
            price: 25.0,
            feature_levels: vec![],
            min_quantity: None,
            max_quantity: None,
            is_included: false,
        };
        let online_ordering = CatalogAddon {
            id: "online_ordering".into(),
            name: "Online Ordering".into(),
            description: "Web and app ordering for a branch".into(),
            scope: AddonScope::Branch,
            price: 15.0,
            feature_levels: vec![
                FeatureLevel { level: "basic".into(), name: "Basic".into(), price: 15.0 },
                FeatureLevel { level: "advanced".into(), name: "Advanced".into(), price: 29.0 },
            ],
            min_quantity: None,
            max_quantity: None,
            is_included: false,
        };
        let kitchen_display = CatalogAddon {
            id: "kitchen_display".into(),
            name: "Kitchen Display".into(),
            description: "Order screens for the kitchen, priced per screen".into(),
            scope: AddonScope::Branch,
            price: 8.0,
            feature_levels: vec![],
            min_quantity: Some(1),
            max_quantity: Some(10),
            is_included: false,
        };

        let starter = Plan {
            id: "starter".into(),
            name: "Starter".into(),
            description: "Single location essentials".into(),
            monthly_price: 29.0,
            included_branches_count: 1,
            discount_percentages: BTreeMap::from([(BillingCycle::Yearly, 10.0)]),
            addons: vec![analytics(false), loyalty.clone(), online_ordering.clone()],
            is_featured: false,
            extra_branch_price: None,
        };
        let growth = Plan {
            id: "growth".into(),
            name: "Growth".into(),
            description: "Multi-branch operations".into(),
            monthly_price: 79.0,
            included_branches_count: 3,
            discount_percentages: BTreeMap::from([
                (BillingCycle::Yearly, 20.0),
                (BillingCycle::Biennial, 25.0),
            ]),
            addons: vec![
                analytics(true),
                loyalty.clone(),
                sso.clone(),
                online_ordering.clone(),
                kitchen_display.clone(),
            ],
            is_featured: true,
            extra_branch_price: Some(15.0),
        };
        let enterprise = Plan {
            id: "enterprise".into(),
            name: "Enterprise".into(),
            description: "Chains with central management".into(),
            monthly_price: 199.0,
            included_branches_count: 10,
            discount_percentages: BTreeMap::from([
                (BillingCycle::Yearly, 20.0),
                (BillingCycle::Biennial, 25.0),
                (BillingCycle::Triennial, 30.0),
            ]),
            addons: vec![
                analytics(true),
                CatalogAddon { is_included: true, ..loyalty },
                sso,
                online_ordering,
                kitchen_display,
            ],
            is_featured: false,
            extra_branch_price: Some(10.0),
        };

        Self::new(vec![starter, growth, enterprise])
    }
}
