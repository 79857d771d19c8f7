//! Wire types exchanged with the Tenant Subscription Service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{AddonScope, BillingCycle};

/// Response envelope used by the service: `{ success, message, data? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ServiceEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: "OK".to_string(),
            data: Some(data),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonAssignmentPayload {
    pub addon_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchAddonAssignments {
    pub branch_id: u32,
    pub addon_assignments: Vec<AddonAssignmentPayload>,
}

/// Body of the "assign plan to tenant" call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignPlanRequest {
    pub plan_id: String,
    pub billing_cycle: BillingCycle,
    pub branches_count: u32,
    pub organization_addon_assignments: Vec<AddonAssignmentPayload>,
    pub branch_addon_assignments: Vec<BranchAddonAssignments>,
}

/// `data` of a successful assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReceipt {
    pub tenant_id: Uuid,
    pub plan_id: String,
    pub subscription_status: String,
    pub billing_cycle: BillingCycle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedBranch {
    pub branch_id: u32,
    pub name: String,
    #[serde(default)]
    pub is_included: bool,
}

/// An add-on as resolved by the service, with its billed price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedAddon {
    pub addon_id: String,
    pub name: String,
    pub scope: AddonScope,
    #[serde(default)]
    pub feature_level: Option<String>,
    #[serde(default)]
    pub branch_id: Option<u32>,
    pub price: f64,
}

/// View-only summary of the plan currently assigned to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedPlan {
    pub tenant_id: Uuid,
    pub plan_id: String,
    pub plan_name: String,
    pub billing_cycle: BillingCycle,
    pub branches_count: u32,
    #[serde(default)]
    pub branches: Vec<AssignedBranch>,
    #[serde(default)]
    pub addons: Vec<AssignedAddon>,
    pub subscription_status: String,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
}

/// Handle returned when resource provisioning is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningTicket {
    pub request_id: String,
    pub status_url: String,
    /// Human-readable estimate as reported by the service (e.g. "5 minutes").
    pub estimated_time: String,
}
