//! Tenant Admin CLI: browse subscription plans, walk a tenant through the
//! assign-plan wizard, submit the assignment, and start provisioning.
//!
//! Wizard progress is persisted between invocations (see
//! `TENANT_ADMIN__WIZARD__STORAGE`), so each `wizard` subcommand applies one
//! edit to the stored selection.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tenant_billing::{
    compute_total, format_amount, reconcile, AddonSelector, PlanCatalog, SelectionLimits,
};
use tenant_cache::{FileStorage, MemoryStorage, RedisStorage, SelectionStorage, WizardStateStore};
use tenant_core::assignment::AssignedPlan;
use tenant_core::config::{AppConfig, StorageBackend};
use tenant_core::{AddonScope, BillingCycle, WizardSelection};
use tenant_wizard::{
    AssignmentSubmitter, HttpSubscriptionClient, InMemorySubscriptionService, SubscriptionService,
    WizardSession,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tenant-admin")]
#[command(about = "Assign subscription plans and add-ons to tenants")]
#[command(version)]
struct Cli {
    /// Tenant UUID the wizard commands act on
    #[arg(long, global = true, env = "TENANT_ADMIN__TENANT_ID")]
    tenant: Option<Uuid>,

    /// Subscription service base URL (overrides config)
    #[arg(long, global = true, env = "TENANT_ADMIN__SERVICE__BASE_URL")]
    base_url: Option<String>,

    /// Use the demo catalog and an in-process subscription service
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the plans in the catalog
    Plans,

    /// Price a selection without touching stored wizard progress
    Quote {
        /// Plan id
        plan: String,

        /// Billing cycle: monthly, yearly, biennial, triennial
        #[arg(long, default_value = "monthly")]
        cycle: BillingCycle,

        /// Number of branches
        #[arg(long, default_value_t = 1)]
        branches: u32,

        /// Add-on as `id`, `id@branch` or `id@branch:level` (repeatable)
        #[arg(long = "addon")]
        addons: Vec<String>,
    },

    /// Edit the tenant's in-progress selection
    Wizard {
        #[command(subcommand)]
        action: WizardAction,
    },

    /// Submit the selection to the subscription service
    Submit {
        /// Start provisioning right after a successful assignment
        #[arg(long, default_value_t = false)]
        provision: bool,
    },

    /// Start resource provisioning for a tenant with an assigned plan
    Provision,

    /// Show the plan currently assigned to the tenant
    Assigned,
}

#[derive(Subcommand)]
enum WizardAction {
    /// Show the selection and its quote
    Show,

    /// Select a plan
    Plan { plan_id: String },

    /// Set the billing cycle
    Cycle { cycle: BillingCycle },

    /// Set the number of branches
    Branches { count: u32 },

    /// Rename a branch (zero-based index)
    RenameBranch { index: u32, name: String },

    /// Toggle an add-on; pass --branch for branch add-ons
    Addon {
        addon_id: String,
        #[arg(long)]
        branch: Option<u32>,
    },

    /// Set the feature level of a selected add-on
    Level {
        addon_id: String,
        level: String,
        #[arg(long)]
        branch: Option<u32>,
    },

    /// Set the quantity of a selected add-on
    Quantity {
        addon_id: String,
        quantity: u32,
        #[arg(long)]
        branch: Option<u32>,
    },

    /// Discard the selection and start over
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenant_admin=info,tenant_wizard=info,assignment_submitter=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(url) = cli.base_url {
        config.service.base_url = url;
    }

    let service: Arc<dyn SubscriptionService> = if cli.offline {
        info!("Offline mode, using the demo catalog");
        Arc::new(InMemorySubscriptionService::new(
            PlanCatalog::demo().plans().to_vec(),
        ))
    } else {
        info!(base_url = %config.service.base_url, "Using subscription service");
        Arc::new(HttpSubscriptionClient::new(&config.service)?)
    };

    let plans = service
        .list_plans()
        .await
        .context("failed to fetch the plan catalog")?;
    let catalog = Arc::new(PlanCatalog::new(plans));
    let limits = SelectionLimits {
        max_branches: config.wizard.max_branches,
    };

    match cli.command {
        Commands::Plans => print_plans(&catalog),
        Commands::Quote {
            plan,
            cycle,
            branches,
            addons,
        } => cmd_quote(&catalog, &limits, &plan, cycle, branches, &addons)?,
        Commands::Assigned => {
            let tenant_id = require_tenant(cli.tenant)?;
            let assigned = service.assigned_plan(tenant_id).await?;
            print_assigned(&assigned);
        }
        Commands::Provision => {
            let tenant_id = require_tenant(cli.tenant)?;
            let submitter = AssignmentSubmitter::new(service, catalog, limits);
            let ticket = submitter.start_provisioning(tenant_id).await?;
            println!("Provisioning started");
            println!("  Request ID:   {}", ticket.request_id);
            println!("  Status URL:   {}", ticket.status_url);
            println!("  Estimated:    {}", ticket.estimated_time);
        }
        Commands::Wizard { action } => {
            let tenant_id = require_tenant(cli.tenant)?;
            let submitter = Arc::new(AssignmentSubmitter::new(service, catalog, limits));
            let mut session = open_session(&config, tenant_id, submitter).await?;
            cmd_wizard(&mut session, action)?;
            session.flush().await?;
            print_session(&session);
        }
        Commands::Submit { provision } => {
            let tenant_id = require_tenant(cli.tenant)?;
            let submitter = Arc::new(AssignmentSubmitter::new(service, catalog, limits));
            let mut session = open_session(&config, tenant_id, submitter).await?;
            cmd_submit(&mut session, provision).await?;
        }
    }

    Ok(())
}

fn require_tenant(tenant: Option<Uuid>) -> anyhow::Result<Uuid> {
    tenant.context("--tenant (or TENANT_ADMIN__TENANT_ID) is required for this command")
}

async fn open_session(
    config: &AppConfig,
    tenant_id: Uuid,
    submitter: Arc<AssignmentSubmitter>,
) -> anyhow::Result<WizardSession> {
    let storage: Arc<dyn SelectionStorage> = match config.wizard.storage {
        StorageBackend::Memory => {
            warn!("Memory storage selected, wizard progress ends with this process");
            Arc::new(MemoryStorage::new())
        }
        StorageBackend::File => Arc::new(FileStorage::new(&config.wizard.state_dir)),
        StorageBackend::Redis => Arc::new(RedisStorage::new(&config.redis).await?),
    };
    let store = WizardStateStore::new(
        storage,
        config.wizard.storage_key(&tenant_id),
        Duration::from_millis(config.wizard.debounce_ms),
    );

    let mut session = WizardSession::new(tenant_id, submitter, store);
    session.mount().await;
    Ok(session)
}

// ---------------------------------------------------------------------------
// Catalog commands
// ---------------------------------------------------------------------------

fn print_plans(catalog: &PlanCatalog) {
    println!("Available plans:");
    for plan in catalog.plans() {
        println!();
        let featured = if plan.is_featured { "  [featured]" } else { "" };
        println!("  {} ({}){featured}", plan.name, plan.id);
        if !plan.description.is_empty() {
            println!("    {}", plan.description);
        }
        println!("    Monthly price:      ${}", format_amount(plan.monthly_price));
        println!("    Included branches:  {}", plan.included_branches_count);
        if let Some(rate) = plan.extra_branch_price {
            println!("    Extra branch:       ${} per cycle", format_amount(rate));
        }
        let cycles: Vec<String> = plan
            .offered_cycles()
            .into_iter()
            .map(|c| match plan.discount_percentage(c) {
                d if d > 0.0 => format!("{c} (-{d}%)"),
                _ => c.to_string(),
            })
            .collect();
        println!("    Billing cycles:     {}", cycles.join(", "));
        println!("    Add-ons:");
        for addon in &plan.addons {
            let price = if addon.is_included {
                "included".to_string()
            } else {
                format!("${}", format_amount(addon.price))
            };
            println!("      {:<18} {:<13} {}", addon.id, addon.scope, price);
            for level in &addon.feature_levels {
                println!("        - {:<14} ${}", level.level, format_amount(level.price));
            }
        }
    }
}

fn cmd_quote(
    catalog: &PlanCatalog,
    limits: &SelectionLimits,
    plan_id: &str,
    cycle: BillingCycle,
    branches: u32,
    addons: &[String],
) -> anyhow::Result<()> {
    let Some(plan) = catalog.get(plan_id) else {
        bail!("unknown plan `{plan_id}`");
    };
    if !plan.offers_cycle(cycle) {
        bail!("plan `{plan_id}` is not offered with {cycle} billing");
    }
    if branches == 0 || branches > limits.max_branches {
        bail!("branches must be between 1 and {}", limits.max_branches);
    }

    let mut selection = reconcile(
        WizardSelection {
            plan_id: Some(plan.id.clone()),
            billing_cycle: cycle,
            branch_count: branches,
            ..WizardSelection::default()
        },
        catalog,
        limits,
    );

    let selector = AddonSelector::new(plan);
    for arg in addons {
        let (addon_id, branch, level) = parse_addon_arg(arg)?;
        let scope = if branch.is_some() {
            AddonScope::Branch
        } else {
            AddonScope::Organization
        };
        if selection.assignment(addon_id, branch).is_none() {
            selector.toggle_addon(&mut selection, addon_id, scope, branch)?;
        }
        if let Some(level) = level {
            selector.set_feature_level(&mut selection, addon_id, branch, level)?;
        }
    }

    let quote = compute_total(
        plan,
        selection.billing_cycle,
        selection.branch_count,
        &selection.branches,
        &selection.addons,
    );
    println!("Quote for {} ({}), {} branch(es):", plan.name, cycle, branches);
    println!("{quote}");
    Ok(())
}

/// `id`, `id@branch`, `id:level` or `id@branch:level`.
fn parse_addon_arg(arg: &str) -> anyhow::Result<(&str, Option<u32>, Option<&str>)> {
    let (target, level) = match arg.split_once(':') {
        Some((target, level)) => (target, Some(level)),
        None => (arg, None),
    };
    let (addon_id, branch) = match target.split_once('@') {
        Some((id, branch)) => {
            let branch = branch
                .parse::<u32>()
                .with_context(|| format!("invalid branch index in `{arg}`"))?;
            (id, Some(branch))
        }
        None => (target, None),
    };
    if addon_id.is_empty() {
        bail!("empty add-on id in `{arg}`");
    }
    Ok((addon_id, branch, level))
}

// ---------------------------------------------------------------------------
// Wizard commands
// ---------------------------------------------------------------------------

fn cmd_wizard(session: &mut WizardSession, action: WizardAction) -> anyhow::Result<()> {
    match action {
        WizardAction::Show => {}
        WizardAction::Plan { plan_id } => session.select_plan(&plan_id)?,
        WizardAction::Cycle { cycle } => session.set_billing_cycle(cycle)?,
        WizardAction::Branches { count } => {
            for removed in session.set_branch_count(count)? {
                println!(
                    "Removed {} from branch [{}]",
                    removed.name,
                    removed.branch_index.unwrap_or_default()
                );
            }
        }
        WizardAction::RenameBranch { index, name } => session.rename_branch(index, &name)?,
        WizardAction::Addon { addon_id, branch } => {
            let selected = session.toggle_addon(&addon_id, branch)?;
            println!("{addon_id} {}", if selected { "selected" } else { "removed" });
        }
        WizardAction::Level {
            addon_id,
            level,
            branch,
        } => session.set_feature_level(&addon_id, branch, &level)?,
        WizardAction::Quantity {
            addon_id,
            quantity,
            branch,
        } => {
            let stored = session.set_quantity(&addon_id, branch, quantity)?;
            if stored != quantity {
                println!("Quantity clamped to {stored}");
            }
        }
        WizardAction::Reset => session.reset()?,
    }
    Ok(())
}

async fn cmd_submit(session: &mut WizardSession, provision: bool) -> anyhow::Result<()> {
    if !session.submit().await {
        bail!(
            "plan assignment failed: {}",
            session.last_error().unwrap_or("unknown error")
        );
    }
    println!("Plan assigned to tenant {}", session.tenant_id());

    if provision {
        let ticket = session.start_provisioning().await?;
        println!("Provisioning started");
        println!("  Request ID:   {}", ticket.request_id);
        println!("  Status URL:   {}", ticket.status_url);
        println!("  Estimated:    {}", ticket.estimated_time);
    }
    Ok(())
}

fn print_session(session: &WizardSession) {
    let selection = session.selection();

    println!("=== Assign Plan: tenant {} ===", session.tenant_id());
    println!();
    let Some(plan) = session.plan() else {
        println!("  No plan selected");
        return;
    };
    println!("  Plan:           {} ({})", plan.name, plan.id);
    let discount = plan.discount_percentage(selection.billing_cycle);
    if discount > 0.0 {
        println!("  Billing cycle:  {} (-{discount}%)", selection.billing_cycle);
    } else {
        println!("  Billing cycle:  {}", selection.billing_cycle);
    }

    let organization: Vec<_> = selection.organization_addons().collect();
    println!();
    println!("  Organization add-ons:");
    if organization.is_empty() {
        println!("    (none)");
    }
    for addon in organization {
        println!("    - {:<24} {}", addon.name, addon_price(plan, addon));
    }

    println!();
    println!("  Branches ({}):", selection.branch_count);
    for branch in &selection.branches {
        let kind = if branch.is_included { "included" } else { "extra" };
        println!("    [{}] {:<20} {}", branch.index, branch.name, kind);
        for addon in selection.branch_addons(branch.index) {
            let level = addon
                .feature_level
                .as_deref()
                .map(|l| format!(" ({l})"))
                .unwrap_or_default();
            println!(
                "        - {:<20} x{:<3} {}",
                format!("{}{level}", addon.name),
                addon.quantity,
                addon_price(plan, addon)
            );
        }
    }

    if let Some(quote) = session.quote() {
        println!();
        println!("  Quote ({}):", selection.billing_cycle);
        println!("{quote}");
    }
}

fn addon_price(plan: &tenant_core::Plan, addon: &tenant_core::SelectedAddonAssignment) -> String {
    if plan.addon(&addon.addon_id).is_some_and(|a| a.is_included) {
        "included".to_string()
    } else {
        format!("${}", format_amount(addon.unit_price))
    }
}

fn print_assigned(assigned: &AssignedPlan) {
    println!("=== Assigned Plan: tenant {} ===", assigned.tenant_id);
    println!();
    println!("  Plan:           {} ({})", assigned.plan_name, assigned.plan_id);
    println!("  Billing cycle:  {}", assigned.billing_cycle);
    println!("  Status:         {}", assigned.subscription_status);
    if let Some(at) = assigned.assigned_at {
        println!("  Assigned at:    {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("  Branches:       {}", assigned.branches_count);
    for branch in &assigned.branches {
        let kind = if branch.is_included { "included" } else { "extra" };
        println!("    [{}] {:<20} {}", branch.branch_id, branch.name, kind);
    }
    println!("  Add-ons:");
    for addon in &assigned.addons {
        let target = match addon.branch_id {
            Some(id) => format!("branch [{id}]"),
            None => "organization".to_string(),
        };
        let level = addon.feature_level.as_deref().unwrap_or("-");
        println!(
            "    - {:<24} {:<14} {:<10} ${}",
            addon.name,
            target,
            level,
            format_amount(addon.price)
        );
    }
}
