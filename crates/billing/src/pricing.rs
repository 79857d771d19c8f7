//! Pricing calculator: turns a plan, billing cycle, branch list and add-on
//! selection into a cost breakdown.
//!
//! Pure and cheap (bounded by the add-on count), so it is re-run on every
//! change instead of caching partial sums.

use serde::{Deserialize, Serialize};
use std::fmt;
use tenant_core::{AddonScope, BillingCycle, Branch, Plan, SelectedAddonAssignment};

/// Cost breakdown of a selection. Every field is rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Plan price for the whole cycle, before discount.
    pub plan_cost: f64,
    pub addon_cost: f64,
    pub extra_branch_cost: f64,
    pub discount_amount: f64,
    pub total: f64,
}

impl PriceBreakdown {
    /// Plan cost after the cycle discount.
    pub fn net_plan_cost(&self) -> f64 {
        round_currency(self.plan_cost - self.discount_amount)
    }
}

impl fmt::Display for PriceBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Plan:           {:>12}", format_amount(self.plan_cost))?;
        writeln!(f, "  Discount:      -{:>12}", format_amount(self.discount_amount))?;
        writeln!(f, "  Extra branches: {:>12}", format_amount(self.extra_branch_cost))?;
        writeln!(f, "  Add-ons:        {:>12}", format_amount(self.addon_cost))?;
        write!(f, "  Total:          {:>12}", format_amount(self.total))
    }
}

/// Compute the cost of a selection.
///
/// - plan cost = monthly price × months in the cycle
/// - discount = plan cost × the plan's percentage for the cycle (0 if none)
/// - extra branches = `extra_branch_price` × branches not covered by the plan
/// - add-ons = unit price × quantity for branch add-ons, unit price for
///   organization add-ons; add-ons included with the plan are free
///
/// Only the plan cost scales with the cycle. Extra-branch and add-on
/// amounts are flat per-cycle charges: a yearly quote adds them once, not
/// twelve times.
///
/// Extra branches are counted from the `is_included` flags of `branches`;
/// with an empty branch list they are derived from `branch_count`.
pub fn compute_total(
    plan: &Plan,
    billing_cycle: BillingCycle,
    branch_count: u32,
    branches: &[Branch],
    addons: &[SelectedAddonAssignment],
) -> PriceBreakdown {
    let plan_cost = plan.monthly_price * f64::from(billing_cycle.months());
    let discount_amount = plan_cost * plan.discount_percentage(billing_cycle) / 100.0;

    let extra_branches = if branches.is_empty() {
        branch_count.saturating_sub(plan.included_branches_count)
    } else {
        branches.iter().filter(|b| !b.is_included).count() as u32
    };
    let extra_branch_cost = plan
        .extra_branch_price
        .map(|rate| rate * f64::from(extra_branches))
        .unwrap_or(0.0);

    let addon_cost: f64 = addons
        .iter()
        .map(|assignment| addon_line_cost(plan, assignment))
        .sum();

    let total = plan_cost - discount_amount + extra_branch_cost + addon_cost;

    PriceBreakdown {
        plan_cost: round_currency(plan_cost),
        addon_cost: round_currency(addon_cost),
        extra_branch_cost: round_currency(extra_branch_cost),
        discount_amount: round_currency(discount_amount),
        total: round_currency(total),
    }
}

fn addon_line_cost(plan: &Plan, assignment: &SelectedAddonAssignment) -> f64 {
    if plan
        .addon(&assignment.addon_id)
        .is_some_and(|addon| addon.is_included)
    {
        return 0.0;
    }
    match assignment.scope {
        AddonScope::Organization => assignment.unit_price,
        AddonScope::Branch => assignment.unit_price * f64::from(assignment.quantity),
    }
}

/// Round half-up to two decimals.
pub fn round_currency(value: f64) -> f64 {
    let cents = value * 100.0;
    // 1.005 is stored as 1.00499999...; nudge past the representation error.
    let nudged = cents + cents.signum() * 1e-6;
    let rounded = nudged.round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Format an amount with exactly two decimals.
pub fn format_amount(value: f64) -> String {
    format!("{:.2}", round_currency(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tenant_core::CatalogAddon;

    fn plan(monthly_price: f64, included: u32, extra: Option<f64>) -> Plan {
        Plan {
            id: "a".into(),
            name: "Plan A".into(),
            description: String::new(),
            monthly_price,
            included_branches_count: included,
            discount_percentages: BTreeMap::from([
                (BillingCycle::Yearly, 20.0),
                (BillingCycle::Biennial, 25.0),
            ]),
            addons: vec![CatalogAddon {
                id: "analytics".into(),
                name: "Analytics".into(),
                description: String::new(),
                scope: AddonScope::Organization,
                price: 19.0,
                feature_levels: vec![],
                min_quantity: None,
                max_quantity: None,
                is_included: true,
            }],
            is_featured: false,
            extra_branch_price: extra,
        }
    }

    fn branches(count: u32, included: u32) -> Vec<Branch> {
        (0..count)
            .map(|index| Branch {
                index,
                name: Branch::default_name(index),
                is_included: index < included,
            })
            .collect()
    }

    fn org_addon(id: &str, price: f64) -> SelectedAddonAssignment {
        SelectedAddonAssignment {
            addon_id: id.into(),
            name: id.into(),
            scope: AddonScope::Organization,
            feature_level: None,
            quantity: 3,
            branch_index: None,
            unit_price: price,
        }
    }

    #[test]
    fn test_yearly_discount() {
        let plan = plan(100.0, 1, None);
        let monthly = compute_total(&plan, BillingCycle::Monthly, 1, &branches(1, 1), &[]);
        assert_eq!(monthly.plan_cost, 100.0);
        assert_eq!(monthly.discount_amount, 0.0);
        assert_eq!(monthly.total, 100.0);

        let yearly = compute_total(&plan, BillingCycle::Yearly, 1, &branches(1, 1), &[]);
        assert_eq!(yearly.plan_cost, 1200.0);
        assert_eq!(yearly.discount_amount, 240.0);
        assert_eq!(yearly.net_plan_cost(), 960.0);
        assert_eq!(format_amount(yearly.total), "960.00");
    }

    #[test]
    fn test_extra_branches_and_addons_charged_once_per_cycle() {
        let plan = plan(100.0, 1, Some(15.0));
        let addons = vec![org_addon("loyalty", 10.0)];
        let monthly = compute_total(&plan, BillingCycle::Monthly, 3, &branches(3, 1), &addons);
        let yearly = compute_total(&plan, BillingCycle::Yearly, 3, &branches(3, 1), &addons);

        assert_eq!(yearly.plan_cost, 12.0 * monthly.plan_cost);
        assert_eq!(monthly.extra_branch_cost, 30.0);
        assert_eq!(yearly.extra_branch_cost, 30.0);
        assert_eq!(yearly.addon_cost, monthly.addon_cost);
        assert_eq!(yearly.total, 960.0 + 30.0 + 10.0);
    }

    #[test]
    fn test_cycle_without_discount_is_undiscounted() {
        let plan = plan(10.0, 1, None);
        let triennial = compute_total(&plan, BillingCycle::Triennial, 1, &[], &[]);
        assert_eq!(triennial.plan_cost, 360.0);
        assert_eq!(triennial.discount_amount, 0.0);
    }

    #[test]
    fn test_organization_addon_without_extra_branch_fee() {
        let plan = plan(50.0, 1, None);
        let addons = vec![org_addon("loyalty", 10.0)];
        let breakdown = compute_total(&plan, BillingCycle::Monthly, 3, &branches(3, 1), &addons);
        assert_eq!(breakdown.extra_branch_cost, 0.0);
        // organization add-ons ignore quantity
        assert_eq!(breakdown.addon_cost, 10.0);
        assert_eq!(format_amount(breakdown.total), "60.00");
    }

    #[test]
    fn test_extra_branch_fee_and_branch_quantities() {
        let plan = plan(50.0, 1, Some(15.0));
        let addons = vec![SelectedAddonAssignment {
            addon_id: "screens".into(),
            name: "Screens".into(),
            scope: AddonScope::Branch,
            feature_level: None,
            quantity: 3,
            branch_index: Some(1),
            unit_price: 8.0,
        }];
        let breakdown = compute_total(&plan, BillingCycle::Monthly, 3, &branches(3, 1), &addons);
        assert_eq!(breakdown.extra_branch_cost, 30.0);
        assert_eq!(breakdown.addon_cost, 24.0);
        assert_eq!(breakdown.total, 104.0);

        let without_list = compute_total(&plan, BillingCycle::Monthly, 3, &[], &[]);
        assert_eq!(without_list.extra_branch_cost, 30.0);
    }

    #[test]
    fn test_included_addon_is_free_even_with_stale_price() {
        let plan = plan(50.0, 1, None);
        let addons = vec![org_addon("analytics", 19.0)];
        let breakdown = compute_total(&plan, BillingCycle::Monthly, 1, &branches(1, 1), &addons);
        assert_eq!(breakdown.addon_cost, 0.0);
        assert_eq!(breakdown.total, 50.0);
    }

    #[test]
    fn test_deterministic() {
        let plan = plan(33.33, 1, Some(7.77));
        let addons = vec![org_addon("loyalty", 9.99)];
        let a = compute_total(&plan, BillingCycle::Biennial, 4, &branches(4, 1), &addons);
        let b = compute_total(&plan, BillingCycle::Biennial, 4, &branches(4, 1), &addons);
        assert_eq!(a, b);
    }

    #[test]
    fn test_round_currency_half_up() {
        assert_eq!(round_currency(1.005), 1.01);
        assert_eq!(round_currency(2.675), 2.68);
        assert_eq!(round_currency(0.125), 0.13);
        assert_eq!(round_currency(10.0), 10.0);
        assert_eq!(format_amount(0.1 + 0.2), "0.30");
        assert_eq!(format_amount(7.0), "7.00");
    }
}
