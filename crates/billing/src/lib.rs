//! Plan and add-on assignment engine for the tenant subscription wizard.
//!
//! Holds the plan catalog, keeps branches and add-on selections consistent
//! with the chosen plan, and prices a selection. Everything here is pure and
//! synchronous; persistence and submission live in `tenant-cache` and
//! `tenant-wizard`.

pub mod addons;
pub mod branches;
pub mod catalog;
pub mod error;
pub mod pricing;
pub mod reconcile;

pub use addons::AddonSelector;
pub use branches::{BranchConfigurator, BranchResize};
pub use catalog::PlanCatalog;
pub use error::SelectionError;
pub use pricing::{compute_total, format_amount, round_currency, PriceBreakdown};
pub use reconcile::{reconcile, validate, SelectionLimits};
