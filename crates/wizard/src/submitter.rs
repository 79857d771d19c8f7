//! Assignment submitter: validates the final selection, turns it into the
//! service payload, and sends it. At most one submission is in flight per
//! submitter.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tenant_billing::{validate, PlanCatalog, SelectionError, SelectionLimits};
use tenant_core::assignment::{
    AddonAssignmentPayload, AssignPlanRequest, AssignedPlan, AssignmentReceipt,
    BranchAddonAssignments, ProvisioningTicket,
};
use tenant_core::{SelectedAddonAssignment, WizardSelection};
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::SubscriptionService;
use crate::error::{ServiceError, SubmitError};

pub struct AssignmentSubmitter {
    service: Arc<dyn SubscriptionService>,
    catalog: Arc<PlanCatalog>,
    limits: SelectionLimits,
    is_submitting: AtomicBool,
    /// Tenants with a successful assignment seen by this submitter.
    assigned: DashMap<Uuid, AssignmentReceipt>,
}

/// Clears the in-flight flag however the submission ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AssignmentSubmitter {
    pub fn new(
        service: Arc<dyn SubscriptionService>,
        catalog: Arc<PlanCatalog>,
        limits: SelectionLimits,
    ) -> Self {
        Self {
            service,
            catalog,
            limits,
            is_submitting: AtomicBool::new(false),
            assigned: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn limits(&self) -> &SelectionLimits {
        &self.limits
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting.load(Ordering::SeqCst)
    }

    pub fn is_assigned(&self, tenant_id: Uuid) -> bool {
        self.assigned.contains_key(&tenant_id)
    }

    /// Validate `selection` and build the assignment payload from it.
    ///
    /// Branch groups are listed in branch order and only for branches that
    /// carry at least one add-on.
    pub fn build_request(&self, selection: &WizardSelection) -> Result<AssignPlanRequest, SelectionError> {
        validate(selection, &self.catalog, &self.limits)?;
        let plan_id = selection
            .plan_id
            .clone()
            .ok_or(SelectionError::NoPlanSelected)?;

        let organization_addon_assignments = selection.organization_addons().map(payload).collect();
        let branch_addon_assignments = selection
            .branches
            .iter()
            .filter_map(|branch| {
                let addon_assignments: Vec<_> = selection.branch_addons(branch.index).map(payload).collect();
                (!addon_assignments.is_empty()).then_some(BranchAddonAssignments {
                    branch_id: branch.index,
                    addon_assignments,
                })
            })
            .collect();

        Ok(AssignPlanRequest {
            plan_id,
            billing_cycle: selection.billing_cycle,
            branches_count: selection.branch_count,
            organization_addon_assignments,
            branch_addon_assignments,
        })
    }

    /// Submit `selection` for `tenant_id`.
    ///
    /// Invalid selections fail before any network call. A second call while
    /// one is in flight fails with [`SubmitError::Busy`].
    pub async fn try_submit(
        &self,
        tenant_id: Uuid,
        selection: &WizardSelection,
    ) -> Result<AssignmentReceipt, SubmitError> {
        let request = match self.build_request(selection) {
            Ok(request) => request,
            Err(e) => {
                metrics::counter!("wizard.submit.invalid").increment(1);
                return Err(e.into());
            }
        };

        if self
            .is_submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SubmitError::Busy);
        }
        let _in_flight = InFlight(&self.is_submitting);

        match self.service.assign_plan(tenant_id, &request).await {
            Ok(receipt) => {
                metrics::counter!("wizard.submit.success").increment(1);
                info!(
                    target: "assignment_submitter",
                    %tenant_id,
                    plan_id = %receipt.plan_id,
                    billing_cycle = %receipt.billing_cycle,
                    status = %receipt.subscription_status,
                    "Plan assigned"
                );
                self.assigned.insert(tenant_id, receipt.clone());
                Ok(receipt)
            }
            Err(e) => {
                metrics::counter!("wizard.submit.failure").increment(1);
                warn!(
                    target: "assignment_submitter",
                    %tenant_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Subscription service refused assignment"
                );
                Err(e.into())
            }
        }
    }

    /// Submit and report only whether the assignment succeeded. Failures
    /// are logged.
    pub async fn submit(&self, tenant_id: Uuid, selection: &WizardSelection) -> bool {
        match self.try_submit(tenant_id, selection).await {
            Ok(_) => true,
            Err(SubmitError::Service(_)) => false,
            Err(e) => {
                warn!(target: "assignment_submitter", %tenant_id, error = %e, "Plan assignment not sent");
                false
            }
        }
    }

    /// Start resource provisioning. Refused until the tenant has an assigned
    /// plan, either through this submitter or already on the service.
    pub async fn start_provisioning(&self, tenant_id: Uuid) -> Result<ProvisioningTicket, SubmitError> {
        if !self.is_assigned(tenant_id) {
            match self.service.assigned_plan(tenant_id).await {
                Ok(_) => {}
                Err(ServiceError::NotFound(_)) => return Err(SubmitError::NotAssigned(tenant_id)),
                Err(e) => return Err(e.into()),
            }
        }

        let ticket = self.service.start_provisioning(tenant_id).await?;
        info!(
            %tenant_id,
            request_id = %ticket.request_id,
            estimated_time = %ticket.estimated_time,
            "Provisioning started"
        );
        Ok(ticket)
    }

    pub async fn assigned_plan(&self, tenant_id: Uuid) -> Result<AssignedPlan, ServiceError> {
        self.service.assigned_plan(tenant_id).await
    }
}

fn payload(assignment: &SelectedAddonAssignment) -> AddonAssignmentPayload {
    AddonAssignmentPayload {
        addon_id: assignment.addon_id.clone(),
        feature_level: assignment.feature_level.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemorySubscriptionService;
    use std::time::Duration;
    use tenant_billing::reconcile;
    use tenant_core::{AddonScope, BillingCycle};

    fn setup(service: InMemorySubscriptionService) -> (Arc<InMemorySubscriptionService>, AssignmentSubmitter) {
        let service = Arc::new(service);
        let submitter = AssignmentSubmitter::new(
            service.clone(),
            Arc::new(PlanCatalog::demo()),
            SelectionLimits::default(),
        );
        (service, submitter)
    }

    fn growth_selection(submitter: &AssignmentSubmitter) -> WizardSelection {
        let mut selection = WizardSelection {
            plan_id: Some("growth".into()),
            billing_cycle: BillingCycle::Yearly,
            branch_count: 4,
            ..Default::default()
        };
        selection = reconcile(selection, submitter.catalog(), submitter.limits());
        let plan = submitter.catalog().get("growth").unwrap().clone();
        let selector = tenant_billing::AddonSelector::new(&plan);
        selector
            .toggle_addon(&mut selection, "sso", AddonScope::Organization, None)
            .unwrap();
        selector
            .toggle_addon(&mut selection, "online_ordering", AddonScope::Branch, Some(2))
            .unwrap();
        selector
            .set_feature_level(&mut selection, "online_ordering", Some(2), "advanced")
            .unwrap();
        selection
    }

    #[test]
    fn test_build_request_shapes_payload() {
        let (_, submitter) = setup(InMemorySubscriptionService::new(PlanCatalog::demo().plans().to_vec()));
        let request = submitter.build_request(&growth_selection(&submitter)).unwrap();

        assert_eq!(request.plan_id, "growth");
        assert_eq!(request.billing_cycle, BillingCycle::Yearly);
        assert_eq!(request.branches_count, 4);
        let org: Vec<_> = request
            .organization_addon_assignments
            .iter()
            .map(|a| a.addon_id.as_str())
            .collect();
        assert!(org.contains(&"sso"));
        assert!(org.contains(&"analytics"));
        assert_eq!(request.branch_addon_assignments.len(), 1);
        assert_eq!(request.branch_addon_assignments[0].branch_id, 2);
        assert_eq!(
            request.branch_addon_assignments[0].addon_assignments[0].feature_level.as_deref(),
            Some("advanced")
        );
    }

    #[tokio::test]
    async fn test_submit_without_plan_never_calls_service() {
        let (service, submitter) = setup(InMemorySubscriptionService::new(PlanCatalog::demo().plans().to_vec()));
        let tenant_id = Uuid::new_v4();

        assert!(!submitter.submit(tenant_id, &WizardSelection::default()).await);
        assert!(matches!(
            submitter.try_submit(tenant_id, &WizardSelection::default()).await,
            Err(SubmitError::Invalid(SelectionError::NoPlanSelected))
        ));
        assert_eq!(service.assign_calls(), 0);
        assert!(!submitter.is_submitting());
    }

    #[tokio::test]
    async fn test_failed_submit_resets_in_flight_flag() {
        let (service, submitter) = setup(InMemorySubscriptionService::new(PlanCatalog::demo().plans().to_vec()));
        service.fail_next(ServiceError::Server {
            status: 500,
            message: "down".into(),
        });
        let tenant_id = Uuid::new_v4();
        let selection = growth_selection(&submitter);

        assert!(!submitter.submit(tenant_id, &selection).await);
        assert!(!submitter.is_submitting());
        assert!(!submitter.is_assigned(tenant_id));

        assert!(submitter.submit(tenant_id, &selection).await);
        assert!(submitter.is_assigned(tenant_id));
        assert_eq!(service.assign_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_submit_is_busy() {
        let (service, submitter) = setup(
            InMemorySubscriptionService::new(PlanCatalog::demo().plans().to_vec())
                .with_latency(Duration::from_millis(50)),
        );
        let tenant_id = Uuid::new_v4();
        let selection = growth_selection(&submitter);

        let (first, second) = tokio::join!(
            submitter.try_submit(tenant_id, &selection),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                submitter.try_submit(tenant_id, &selection).await
            }
        );
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), SubmitError::Busy);
        assert_eq!(service.assign_calls(), 1);
        assert!(!submitter.is_submitting());
    }

    #[tokio::test]
    async fn test_provisioning_requires_assignment() {
        let (_, submitter) = setup(InMemorySubscriptionService::new(PlanCatalog::demo().plans().to_vec()));
        let tenant_id = Uuid::new_v4();

        assert_eq!(
            submitter.start_provisioning(tenant_id).await.unwrap_err(),
            SubmitError::NotAssigned(tenant_id)
        );

        assert!(submitter.submit(tenant_id, &growth_selection(&submitter)).await);
        let ticket = submitter.start_provisioning(tenant_id).await.unwrap();
        assert!(ticket.status_url.contains(&ticket.request_id));
        assert!(matches!(
            submitter.start_provisioning(tenant_id).await,
            Err(SubmitError::Service(ServiceError::Conflict(_)))
        ));
    }
}
