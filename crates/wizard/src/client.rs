//! Tenant Subscription Service port and its implementations.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tenant_core::assignment::{
    AssignPlanRequest, AssignedAddon, AssignedBranch, AssignedPlan, AssignmentReceipt,
    ProvisioningTicket, ServiceEnvelope,
};
use tenant_core::config::ServiceConfig;
use tenant_core::{AddonScope, Branch, Plan};
use tracing::debug;
use uuid::Uuid;

use crate::error::ServiceError;

/// Remote operations the wizard depends on.
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    async fn list_plans(&self) -> Result<Vec<Plan>, ServiceError>;

    async fn assign_plan(
        &self,
        tenant_id: Uuid,
        request: &AssignPlanRequest,
    ) -> Result<AssignmentReceipt, ServiceError>;

    async fn assigned_plan(&self, tenant_id: Uuid) -> Result<AssignedPlan, ServiceError>;

    async fn start_provisioning(&self, tenant_id: Uuid) -> Result<ProvisioningTicket, ServiceError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct HttpSubscriptionClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpSubscriptionClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &'static str,
    ) -> Result<T, ServiceError> {
        let body = self.send(request, endpoint).await?;
        decode(&body)
    }

    /// Send `request` and return the body of a 2xx response.
    async fn send(&self, request: RequestBuilder, endpoint: &'static str) -> Result<String, ServiceError> {
        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        metrics::histogram!("wizard.service.latency_ms", "endpoint" => endpoint)
            .record(start.elapsed().as_secs_f64() * 1000.0);
        debug!(endpoint, status = status.as_u16(), "Subscription service responded");

        if !status.is_success() {
            return Err(status_error(status, error_message(&body, status)));
        }
        Ok(body)
    }
}

#[async_trait]
impl SubscriptionService for HttpSubscriptionClient {
    async fn list_plans(&self) -> Result<Vec<Plan>, ServiceError> {
        self.execute(self.http.get(self.url("/plans")), "list_plans")
            .await
    }

    async fn assign_plan(
        &self,
        tenant_id: Uuid,
        request: &AssignPlanRequest,
    ) -> Result<AssignmentReceipt, ServiceError> {
        let url = self.url(&format!("/tenants/{tenant_id}/plan"));
        let body = self.send(self.http.post(url).json(request), "assign_plan").await?;
        match decode_optional(&body)? {
            Some(receipt) => Ok(receipt),
            None => {
                debug!(%tenant_id, "Assignment accepted without receipt data");
                Ok(AssignmentReceipt {
                    tenant_id,
                    plan_id: request.plan_id.clone(),
                    subscription_status: ACCEPTED_STATUS.to_string(),
                    billing_cycle: request.billing_cycle,
                })
            }
        }
    }

    async fn assigned_plan(&self, tenant_id: Uuid) -> Result<AssignedPlan, ServiceError> {
        let url = self.url(&format!("/tenants/{tenant_id}/plan"));
        self.execute(self.http.get(url), "assigned_plan").await
    }

    async fn start_provisioning(&self, tenant_id: Uuid) -> Result<ProvisioningTicket, ServiceError> {
        let url = self.url(&format!("/tenants/{tenant_id}/provision"));
        self.execute(self.http.post(url), "start_provisioning")
            .await
    }
}

/// The service answers either with a `{ success, message, data }` envelope
/// or with the payload itself.
#[derive(Deserialize)]
#[serde(untagged)]
enum Body<T> {
    Envelope(ServiceEnvelope<T>),
    Bare(T),
}

/// Status reported for an assignment the service accepted without echoing it back.
const ACCEPTED_STATUS: &str = "assigned";

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ServiceError> {
    decode_optional(body)?
        .ok_or_else(|| ServiceError::Decode("response carries no data".to_string()))
}

/// Like [`decode`], but a successful envelope without `data` yields `None`.
fn decode_optional<T: DeserializeOwned>(body: &str) -> Result<Option<T>, ServiceError> {
    match serde_json::from_str::<Body<T>>(body) {
        Ok(Body::Envelope(envelope)) if !envelope.success => Err(ServiceError::Rejected(
            if envelope.message.is_empty() {
                "request was not accepted".to_string()
            } else {
                envelope.message
            },
        )),
        Ok(Body::Envelope(envelope)) => Ok(envelope.data),
        Ok(Body::Bare(payload)) => Ok(Some(payload)),
        Err(e) => Err(ServiceError::Decode(e.to_string())),
    }
}

fn status_error(status: StatusCode, message: String) -> ServiceError {
    match status.as_u16() {
        409 => ServiceError::Conflict(message),
        400 | 422 => ServiceError::Validation(message),
        404 => ServiceError::NotFound(message),
        400..=499 => ServiceError::Rejected(message),
        code => ServiceError::Server {
            status: code,
            message,
        },
    }
}

const MAX_ERROR_BODY: usize = 200;

fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "error"] {
            if let Some(message) = value.get(field).and_then(|m| m.as_str()) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

// ---------------------------------------------------------------------------
// In-process service
// ---------------------------------------------------------------------------

/// Stand-in for the remote service, used for offline runs and tests.
/// Assignments live in memory for the lifetime of the value.
pub struct InMemorySubscriptionService {
    plans: Vec<Plan>,
    assignments: DashMap<Uuid, AssignedPlan>,
    provisioning: DashMap<Uuid, ProvisioningTicket>,
    fail_next: Mutex<Option<ServiceError>>,
    last_request: Mutex<Option<AssignPlanRequest>>,
    assign_calls: AtomicUsize,
    latency: Duration,
}

impl InMemorySubscriptionService {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self {
            plans,
            assignments: DashMap::new(),
            provisioning: DashMap::new(),
            fail_next: Mutex::new(None),
            last_request: Mutex::new(None),
            assign_calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Delay every assignment call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next assignment call fail with `error`.
    pub fn fail_next(&self, error: ServiceError) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn assign_calls(&self) -> usize {
        self.assign_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<AssignPlanRequest> {
        self.last_request.lock().clone()
    }

    fn build_assignment(
        &self,
        tenant_id: Uuid,
        request: &AssignPlanRequest,
    ) -> Result<AssignedPlan, ServiceError> {
        let plan = self
            .plans
            .iter()
            .find(|p| p.id == request.plan_id)
            .ok_or_else(|| ServiceError::Validation(format!("unknown plan {}", request.plan_id)))?;
        if !plan.offers_cycle(request.billing_cycle) {
            return Err(ServiceError::Validation(format!(
                "plan {} is not sold with {} billing",
                plan.id, request.billing_cycle
            )));
        }
        if request.branches_count == 0 {
            return Err(ServiceError::Validation("branches_count must be at least 1".into()));
        }

        let mut addons = Vec::new();
        for payload in &request.organization_addon_assignments {
            addons.push(resolve_addon(plan, &payload.addon_id, payload.feature_level.as_deref(), None)?);
        }
        for group in &request.branch_addon_assignments {
            if group.branch_id >= request.branches_count {
                return Err(ServiceError::Validation(format!(
                    "branch {} is outside the {} requested branches",
                    group.branch_id, request.branches_count
                )));
            }
            for payload in &group.addon_assignments {
                addons.push(resolve_addon(
                    plan,
                    &payload.addon_id,
                    payload.feature_level.as_deref(),
                    Some(group.branch_id),
                )?);
            }
        }

        Ok(AssignedPlan {
            tenant_id,
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            billing_cycle: request.billing_cycle,
            branches_count: request.branches_count,
            branches: (0..request.branches_count)
                .map(|index| AssignedBranch {
                    branch_id: index,
                    name: Branch::default_name(index),
                    is_included: index < plan.included_branches_count,
                })
                .collect(),
            addons,
            subscription_status: "active".to_string(),
            assigned_at: Some(Utc::now()),
        })
    }
}

fn resolve_addon(
    plan: &Plan,
    addon_id: &str,
    feature_level: Option<&str>,
    branch_id: Option<u32>,
) -> Result<AssignedAddon, ServiceError> {
    let addon = plan
        .addon(addon_id)
        .ok_or_else(|| ServiceError::Validation(format!("plan {} has no add-on {addon_id}", plan.id)))?;
    let expected = if branch_id.is_some() {
        AddonScope::Branch
    } else {
        AddonScope::Organization
    };
    if addon.scope != expected {
        return Err(ServiceError::Validation(format!(
            "add-on {addon_id} is {}-scoped",
            addon.scope
        )));
    }
    Ok(AssignedAddon {
        addon_id: addon.id.clone(),
        name: addon.name.clone(),
        scope: addon.scope,
        feature_level: feature_level.map(str::to_string),
        branch_id,
        price: addon.unit_price(feature_level),
    })
}

#[async_trait]
impl SubscriptionService for InMemorySubscriptionService {
    async fn list_plans(&self) -> Result<Vec<Plan>, ServiceError> {
        Ok(self.plans.clone())
    }

    async fn assign_plan(
        &self,
        tenant_id: Uuid,
        request: &AssignPlanRequest,
    ) -> Result<AssignmentReceipt, ServiceError> {
        self.assign_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let injected = self.fail_next.lock().take();
        if let Some(error) = injected {
            return Err(error);
        }
        if self.provisioning.contains_key(&tenant_id) {
            return Err(ServiceError::Conflict(format!(
                "tenant {tenant_id} is already provisioned"
            )));
        }

        let assigned = self.build_assignment(tenant_id, request)?;
        let receipt = AssignmentReceipt {
            tenant_id,
            plan_id: assigned.plan_id.clone(),
            subscription_status: assigned.subscription_status.clone(),
            billing_cycle: assigned.billing_cycle,
        };
        self.assignments.insert(tenant_id, assigned);
        debug!(%tenant_id, plan_id = %receipt.plan_id, "Plan assigned in memory");
        Ok(receipt)
    }

    async fn assigned_plan(&self, tenant_id: Uuid) -> Result<AssignedPlan, ServiceError> {
        self.assignments
            .get(&tenant_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("tenant {tenant_id} has no plan")))
    }

    async fn start_provisioning(&self, tenant_id: Uuid) -> Result<ProvisioningTicket, ServiceError> {
        if !self.assignments.contains_key(&tenant_id) {
            return Err(ServiceError::NotFound(format!("tenant {tenant_id} has no plan")));
        }
        if self.provisioning.contains_key(&tenant_id) {
            return Err(ServiceError::Conflict(format!(
                "provisioning already started for tenant {tenant_id}"
            )));
        }
        let request_id = Uuid::new_v4().to_string();
        let ticket = ProvisioningTicket {
            status_url: format!("/tenants/{tenant_id}/provision/{request_id}"),
            request_id,
            estimated_time: "5 minutes".to_string(),
        };
        self.provisioning.insert(tenant_id, ticket.clone());
        Ok(ticket)
    }
}
