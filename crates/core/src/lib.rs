pub mod assignment;
pub mod catalog;
pub mod config;
pub mod error;
pub mod selection;

pub use catalog::{AddonScope, BillingCycle, CatalogAddon, FeatureLevel, Plan};
pub use config::AppConfig;
pub use error::{TenantError, TenantResult};
pub use selection::{Branch, SelectedAddonAssignment, WizardSelection};
