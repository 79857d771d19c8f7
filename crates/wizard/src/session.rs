//! One assign-plan wizard instance for one tenant.
//!
//! Every edit is applied to a copy of the selection, repaired with
//! [`reconcile`], stored, and scheduled for a debounced save. The quote is
//! derived from the selection on demand and never stored.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tenant_billing::{
    compute_total, reconcile, AddonSelector, BranchConfigurator, PlanCatalog, PriceBreakdown,
    SelectionError,
};
use tenant_cache::WizardStateStore;
use tenant_core::assignment::{AssignedPlan, ProvisioningTicket};
use tenant_core::{AddonScope, BillingCycle, Plan, SelectedAddonAssignment, TenantResult, WizardSelection};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, SubmitError, WizardError};
use crate::submitter::AssignmentSubmitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    /// Not mounted yet.
    Idle,
    Selecting,
    Submitting,
    /// Plan assigned; stored progress has been cleared.
    Completed,
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::Submitting => "submitting",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

pub struct WizardSession {
    tenant_id: Uuid,
    submitter: Arc<AssignmentSubmitter>,
    store: WizardStateStore,
    branches: BranchConfigurator,
    selection: WizardSelection,
    state: WizardState,
    last_error: Option<String>,
}

impl WizardSession {
    pub fn new(tenant_id: Uuid, submitter: Arc<AssignmentSubmitter>, store: WizardStateStore) -> Self {
        let branches = BranchConfigurator::new(submitter.limits().max_branches);
        Self {
            tenant_id,
            submitter,
            store,
            branches,
            selection: WizardSelection::default(),
            state: WizardState::Idle,
            last_error: None,
        }
    }

    /// Seed the selection from stored progress, or from defaults when there
    /// is none, and enter `Selecting`. Returns whether progress was restored.
    pub async fn mount(&mut self) -> bool {
        let stored = self.store.load().await;
        let restored = stored.is_some();
        let selection = stored.unwrap_or_else(|| self.defaults());

        let reconciled = reconcile(selection.clone(), self.catalog(), self.submitter.limits());
        if restored && reconciled != selection {
            debug!(tenant_id = %self.tenant_id, "Stored selection repaired on restore");
            self.store.save(&reconciled);
        }
        self.selection = reconciled;
        self.state = WizardState::Selecting;

        info!(
            tenant_id = %self.tenant_id,
            restored,
            plan_id = ?self.selection.plan_id,
            branch_count = self.selection.branch_count,
            "Assign-plan wizard mounted"
        );
        restored
    }

    /// Fresh selection: the featured plan (or the first one), monthly
    /// billing, one branch.
    pub fn defaults(&self) -> WizardSelection {
        let selection = WizardSelection {
            plan_id: self.catalog().default_plan().map(|p| p.id.clone()),
            ..WizardSelection::default()
        };
        reconcile(selection, self.catalog(), self.submitter.limits())
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn selection(&self) -> &WizardSelection {
        &self.selection
    }

    /// Message of the last refused submission, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn catalog(&self) -> &PlanCatalog {
        self.submitter.catalog()
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.selection
            .plan_id
            .as_deref()
            .and_then(|id| self.catalog().get(id))
    }

    /// Price of the current selection, `None` while no plan is selected.
    pub fn quote(&self) -> Option<PriceBreakdown> {
        let plan = self.plan()?;
        Some(compute_total(
            plan,
            self.selection.billing_cycle,
            self.selection.branch_count,
            &self.selection.branches,
            &self.selection.addons,
        ))
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    pub fn select_plan(&mut self, plan_id: &str) -> Result<(), WizardError> {
        self.edit(|selection, catalog| {
            let plan = catalog
                .get(plan_id)
                .ok_or_else(|| SelectionError::UnknownPlan(plan_id.to_string()))?;
            // add-ons that came free with the previous plan are not carried over
            if let Some(previous) = selection.plan_id.as_deref().and_then(|id| catalog.get(id)) {
                if previous.id != plan.id {
                    selection
                        .addons
                        .retain(|a| !previous.addon(&a.addon_id).is_some_and(|addon| addon.is_included));
                }
            }
            selection.plan_id = Some(plan.id.clone());
            Ok(())
        })
    }

    pub fn set_billing_cycle(&mut self, cycle: BillingCycle) -> Result<(), WizardError> {
        self.edit(|selection, catalog| {
            let plan = selected_plan(selection, catalog)?;
            if !plan.offers_cycle(cycle) {
                return Err(SelectionError::CycleNotOffered {
                    plan_id: plan.id.clone(),
                    cycle,
                });
            }
            selection.billing_cycle = cycle;
            Ok(())
        })
    }

    /// Resize the branch list. Returns the branch add-ons that were dropped
    /// together with removed branches.
    pub fn set_branch_count(&mut self, count: u32) -> Result<Vec<SelectedAddonAssignment>, WizardError> {
        let configurator = self.branches;
        let tenant_id = self.tenant_id;
        self.edit(|selection, catalog| {
            let plan = selection.plan_id.as_deref().and_then(|id| catalog.get(id));
            let mut pruned = Vec::new();
            configurator.set_branch_count(selection, plan, count, |affected| {
                warn!(
                    %tenant_id,
                    branch_count = count,
                    removed = affected.len(),
                    "Branch add-ons removed along with their branches"
                );
                pruned.extend_from_slice(affected);
            })?;
            Ok(pruned)
        })
    }

    pub fn rename_branch(&mut self, index: u32, name: &str) -> Result<(), WizardError> {
        self.edit(|selection, _| BranchConfigurator::rename_branch(selection, index, name))
    }

    /// Switch an add-on on or off for the organization (`branch_index` of
    /// `None`) or for one branch. Returns whether it is now selected.
    pub fn toggle_addon(&mut self, addon_id: &str, branch_index: Option<u32>) -> Result<bool, WizardError> {
        self.edit(|selection, catalog| {
            let plan = selected_plan(selection, catalog)?;
            AddonSelector::new(plan).toggle_addon(selection, addon_id, scope_for(branch_index), branch_index)
        })
    }

    pub fn set_feature_level(
        &mut self,
        addon_id: &str,
        branch_index: Option<u32>,
        level: &str,
    ) -> Result<(), WizardError> {
        self.edit(|selection, catalog| {
            let plan = selected_plan(selection, catalog)?;
            AddonSelector::new(plan).set_feature_level(selection, addon_id, branch_index, level)
        })
    }

    pub fn set_quantity(
        &mut self,
        addon_id: &str,
        branch_index: Option<u32>,
        quantity: u32,
    ) -> Result<u32, WizardError> {
        self.edit(|selection, catalog| {
            let plan = selected_plan(selection, catalog)?;
            AddonSelector::new(plan).set_quantity(selection, addon_id, branch_index, quantity)
        })
    }

    /// Discard the current selection and start over from defaults.
    pub fn reset(&mut self) -> Result<(), WizardError> {
        let defaults = self.defaults();
        self.edit(|selection, _| {
            *selection = defaults;
            Ok(())
        })
    }

    fn edit<T, F>(&mut self, apply: F) -> Result<T, WizardError>
    where
        F: FnOnce(&mut WizardSelection, &PlanCatalog) -> Result<T, SelectionError>,
    {
        if self.state != WizardState::Selecting {
            return Err(WizardError::Locked(self.state));
        }

        let submitter = Arc::clone(&self.submitter);
        let mut next = self.selection.clone();
        let out = apply(&mut next, submitter.catalog())?;
        self.selection = reconcile(next, submitter.catalog(), submitter.limits());
        self.store.save(&self.selection);
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submit the selection. Stored progress is cleared only when the
    /// service accepts the assignment. Any failure returns the wizard to
    /// `Selecting` with the message in [`last_error`](Self::last_error).
    pub async fn submit(&mut self) -> bool {
        if self.state != WizardState::Selecting {
            warn!(tenant_id = %self.tenant_id, state = %self.state, "Submit ignored");
            return false;
        }
        if let Err(e) = self.store.flush().await {
            warn!(tenant_id = %self.tenant_id, error = %e, "Could not persist selection before submit");
        }

        self.state = WizardState::Submitting;
        match self.submitter.try_submit(self.tenant_id, &self.selection).await {
            Ok(_) => {
                self.state = WizardState::Completed;
                self.last_error = None;
                if let Err(e) = self.store.clear().await {
                    warn!(tenant_id = %self.tenant_id, error = %e, "Could not clear stored selection");
                }
                true
            }
            Err(e) => {
                warn!(tenant_id = %self.tenant_id, error = %e, "Plan assignment failed");
                self.state = WizardState::Selecting;
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Start provisioning. Only reachable once this wizard has completed.
    pub async fn start_provisioning(&self) -> Result<ProvisioningTicket, SubmitError> {
        if self.state != WizardState::Completed {
            return Err(SubmitError::NotAssigned(self.tenant_id));
        }
        self.submitter.start_provisioning(self.tenant_id).await
    }

    pub async fn assigned_plan(&self) -> Result<AssignedPlan, ServiceError> {
        self.submitter.assigned_plan(self.tenant_id).await
    }

    /// Write any pending debounced save now.
    pub async fn flush(&self) -> TenantResult<()> {
        self.store.flush().await
    }
}

fn selected_plan<'c>(selection: &WizardSelection, catalog: &'c PlanCatalog) -> Result<&'c Plan, SelectionError> {
    let plan_id = selection
        .plan_id
        .as_deref()
        .ok_or(SelectionError::NoPlanSelected)?;
    catalog
        .get(plan_id)
        .ok_or_else(|| SelectionError::UnknownPlan(plan_id.to_string()))
}

fn scope_for(branch_index: Option<u32>) -> AddonScope {
    match branch_index {
        Some(_) => AddonScope::Branch,
        None => AddonScope::Organization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemorySubscriptionService;
    use std::time::Duration;
    use tenant_billing::SelectionLimits;
    use tenant_cache::MemoryStorage;

    const KEY: &str = "tenant-admin:assign-plan:session-test";

    struct Harness {
        storage: MemoryStorage,
        service: Arc<InMemorySubscriptionService>,
        submitter: Arc<AssignmentSubmitter>,
    }

    impl Harness {
        fn new() -> Self {
            let catalog = PlanCatalog::demo();
            let service = Arc::new(InMemorySubscriptionService::new(catalog.plans().to_vec()));
            let submitter = Arc::new(AssignmentSubmitter::new(
                service.clone(),
                Arc::new(catalog),
                SelectionLimits::default(),
            ));
            Self {
                storage: MemoryStorage::new(),
                service,
                submitter,
            }
        }

        fn session(&self) -> WizardSession {
            let store = WizardStateStore::new(
                Arc::new(self.storage.clone()),
                KEY,
                Duration::from_millis(5),
            );
            WizardSession::new(Uuid::new_v4(), self.submitter.clone(), store)
        }
    }

    #[tokio::test]
    async fn test_mount_defaults_to_featured_plan() {
        let harness = Harness::new();
        let mut session = harness.session();
        assert_eq!(session.state(), WizardState::Idle);

        assert!(!session.mount().await);
        assert_eq!(session.state(), WizardState::Selecting);
        assert_eq!(session.selection().plan_id.as_deref(), Some("growth"));
        assert_eq!(session.selection().billing_cycle, BillingCycle::Monthly);
        assert_eq!(session.selection().branch_count, 1);
        // analytics comes with growth
        assert!(session.selection().assignment("analytics", None).is_some());
        assert_eq!(session.quote().unwrap().total, 79.0);
    }

    #[tokio::test]
    async fn test_edits_reprice_and_persist() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.mount().await;

        session.set_billing_cycle(BillingCycle::Yearly).unwrap();
        session.set_branch_count(5).unwrap();
        assert!(session.toggle_addon("sso", None).unwrap());
        assert!(session.toggle_addon("kitchen_display", Some(4)).unwrap());
        assert_eq!(session.set_quantity("kitchen_display", Some(4), 3).unwrap(), 3);

        // 79*12 = 948, -20% = 758.40, 2 extra branches at 15, sso 25, 3 screens at 8
        let quote = session.quote().unwrap();
        assert_eq!(quote.plan_cost, 948.0);
        assert_eq!(quote.discount_amount, 189.6);
        assert_eq!(quote.extra_branch_cost, 30.0);
        assert_eq!(quote.addon_cost, 49.0);
        assert_eq!(quote.total, 837.4);

        session.flush().await.unwrap();
        let mut restored = harness.session();
        assert!(restored.mount().await);
        assert_eq!(restored.selection(), session.selection());
    }

    #[tokio::test]
    async fn test_shrinking_branches_reports_pruned_addons() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.mount().await;

        session.set_branch_count(4).unwrap();
        session.toggle_addon("online_ordering", Some(3)).unwrap();
        session.toggle_addon("online_ordering", Some(0)).unwrap();

        let pruned = session.set_branch_count(2).unwrap();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].branch_index, Some(3));
        assert!(session.selection().assignment("online_ordering", Some(0)).is_some());

        assert!(matches!(
            session.set_branch_count(0),
            Err(WizardError::Selection(SelectionError::InvalidBranchCount { .. }))
        ));
    }

    #[tokio::test]
    async fn test_switching_plan_drops_unsupported_addons() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.mount().await;

        session.set_billing_cycle(BillingCycle::Biennial).unwrap();
        session.toggle_addon("sso", None).unwrap();
        session.select_plan("starter").unwrap();

        let selection = session.selection();
        assert_eq!(selection.plan_id.as_deref(), Some("starter"));
        assert_eq!(selection.billing_cycle, BillingCycle::Monthly);
        assert!(selection.assignment("sso", None).is_none());
        assert!(selection.assignment("analytics", None).is_none());

        assert!(matches!(
            session.set_billing_cycle(BillingCycle::Triennial),
            Err(WizardError::Selection(SelectionError::CycleNotOffered { .. }))
        ));
        assert!(matches!(
            session.select_plan("platinum"),
            Err(WizardError::Selection(SelectionError::UnknownPlan(_)))
        ));
    }

    #[tokio::test]
    async fn test_restored_unknown_plan_is_cleared() {
        let harness = Harness::new();
        let mut first = harness.session();
        first.mount().await;
        let mut stale = first.selection().clone();
        stale.plan_id = Some("retired".into());
        WizardStateStore::new(Arc::new(harness.storage.clone()), KEY, Duration::ZERO)
            .save_now(&stale)
            .await
            .unwrap();

        let mut session = harness.session();
        assert!(session.mount().await);
        assert!(session.selection().plan_id.is_none());
        assert!(session.selection().addons.is_empty());
        assert!(session.quote().is_none());
        assert!(!session.submit().await);
        assert_eq!(session.state(), WizardState::Selecting);
        assert_eq!(harness.service.assign_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_progress_then_retry_completes() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.mount().await;
        session.set_branch_count(2).unwrap();

        harness.service.fail_next(ServiceError::Conflict("busy tenant".into()));
        assert!(!session.submit().await);
        assert_eq!(session.state(), WizardState::Selecting);
        assert!(session.last_error().unwrap().contains("busy tenant"));
        assert!(harness.storage.contains(KEY));
        assert!(!harness.submitter.is_submitting());

        // still editable after the refusal
        session.set_billing_cycle(BillingCycle::Yearly).unwrap();
        assert_eq!(session.state(), WizardState::Selecting);

        assert!(session.submit().await);
        assert_eq!(session.state(), WizardState::Completed);
        assert!(!harness.storage.contains(KEY));
        assert!(matches!(
            session.toggle_addon("sso", None),
            Err(WizardError::Locked(WizardState::Completed))
        ));
        assert!(!session.submit().await);
    }

    #[test]
    fn test_edits_outside_runtime_are_persisted_on_flush() {
        let harness = Harness::new();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut session = harness.session();
        runtime.block_on(session.mount());

        session.set_branch_count(3).unwrap();
        session.toggle_addon("online_ordering", Some(2)).unwrap();
        assert!(!harness.storage.contains(KEY));

        runtime.block_on(session.flush()).unwrap();
        assert!(harness.storage.contains(KEY));
    }

    #[tokio::test]
    async fn test_provisioning_only_after_completion() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.mount().await;

        assert_eq!(
            session.start_provisioning().await.unwrap_err(),
            SubmitError::NotAssigned(session.tenant_id())
        );

        assert!(session.submit().await);
        let assigned = session.assigned_plan().await.unwrap();
        assert_eq!(assigned.plan_id, "growth");
        let ticket = session.start_provisioning().await.unwrap();
        assert_eq!(ticket.estimated_time, "5 minutes");
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let harness = Harness::new();
        let mut session = harness.session();
        session.mount().await;
        session.select_plan("enterprise").unwrap();
        session.set_branch_count(12).unwrap();
        session.rename_branch(0, "  Downtown ").unwrap();
        assert_eq!(session.selection().branches[0].name, "Downtown");

        session.reset().unwrap();
        assert_eq!(session.selection(), &session.defaults());
    }
}
