use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uplink_core::commands::{ensure_initialized_at, ensure_initialized_once};
use uplink_core::model::{DealStatus, NewDeal, NewPartner, ProductCategory};
use uplink_core::services::RepairPlan;
use uplink_core::Engine;

#[derive(Parser)]
#[command(
    name = "uplink-admin",
    about = "Operator helpers for the Uplink partner hierarchy and commission ledger"
)]
struct Cli {
    /// Data root; defaults to $UPLINK_ROOT or ./.uplink
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Lay out the data root (config, schedules, logbook, database)
    Init,
    /// Register a partner, optionally under a sponsor code
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        sponsor: Option<String>,
    },
    /// Link an unsponsored partner under a sponsor code
    Attach {
        #[arg(long)]
        partner: String,
        #[arg(long)]
        sponsor: String,
    },
    /// Soft-delete a partner
    Deactivate {
        #[arg(long)]
        partner: String,
    },
    /// Record a deal in `submitted` state
    DealSubmit {
        #[arg(long)]
        partner: String,
        #[arg(long)]
        value_pence: i64,
        #[arg(long)]
        category: ProductCategory,
        #[arg(long, default_value_t = 1)]
        locations: u32,
    },
    /// Move a deal to another status
    DealStatus {
        #[arg(long)]
        deal: String,
        #[arg(long)]
        status: DealStatus,
    },
    /// Pay out a completed deal (safe to re-run)
    Distribute {
        #[arg(long)]
        deal: String,
    },
    /// Show a partner's ancestors
    Upline {
        #[arg(long)]
        partner: String,
        /// Walk sponsor pointers instead of the closure table
        #[arg(long)]
        pointers: bool,
    },
    /// Diff one partner's closure rows against its sponsor chain
    Audit {
        #[arg(long)]
        partner: String,
    },
    /// Apply a plan previously printed by `audit` (JSON file)
    Repair {
        #[arg(long)]
        plan: PathBuf,
    },
    /// Audit every partner; never writes
    Sweep,
    /// Team size and revenue for a partner
    Stats {
        #[arg(long)]
        partner: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Cmd::Init = cli.cmd {
        let report = match &cli.root {
            Some(root) => ensure_initialized_at(root)?,
            None => ensure_initialized_once()?.clone(),
        };
        println!("initialized {} (created: {})", report.root.display(), report.created.join(", "));
        return Ok(());
    }

    let mut engine = open_engine(cli.root.as_ref())?;
    match cli.cmd {
        Cmd::Init => Ok(()),
        Cmd::Register { name, email, sponsor } => {
            let partner = engine.register_partner(sponsor.as_deref(), &NewPartner { name, email })?;
            print_json(&partner)
        }
        Cmd::Attach { partner, sponsor } => {
            let edges = engine.attach_sponsor(&partner, &sponsor)?;
            println!("attached {partner} under {sponsor} ({edges} closure rows)");
            Ok(())
        }
        Cmd::Deactivate { partner } => {
            if engine.deactivate_partner(&partner)? {
                println!("deactivated {partner}");
            } else {
                println!("{partner} was already inactive");
            }
            Ok(())
        }
        Cmd::DealSubmit {
            partner,
            value_pence,
            category,
            locations,
        } => {
            let deal = engine.submit_deal(&NewDeal {
                submitting_partner_id: partner,
                value_pence,
                category,
                locations,
            })?;
            print_json(&deal)
        }
        Cmd::DealStatus { deal, status } => print_json(&engine.set_deal_status(&deal, status)?),
        Cmd::Distribute { deal } => print_json(&engine.distribute(&deal)?),
        Cmd::Upline { partner, pointers } => {
            let max = engine.settings().max_levels;
            let upline = if pointers {
                engine.resolve_upline_by_pointers(&partner, max)?
            } else {
                engine.resolve_upline(&partner, max)?
            };
            print_json(&upline)
        }
        Cmd::Audit { partner } => print_json(&engine.audit_partner(&partner)?),
        Cmd::Repair { plan } => {
            let text = std::fs::read_to_string(&plan).with_context(|| format!("read plan {:?}", plan))?;
            let plan: RepairPlan = serde_json::from_str(&text).context("parse repair plan")?;
            if plan.is_clean() {
                println!("plan for {} has nothing to do", plan.partner_id);
                return Ok(());
            }
            print_json(&engine.apply_repair(&plan)?)
        }
        Cmd::Sweep => {
            let report = engine.sweep()?;
            print_json(&report)?;
            anyhow::ensure!(
                report.drifted.is_empty() && report.failures.is_empty(),
                "{} drifted, {} unwalkable",
                report.drifted.len(),
                report.failures.len()
            );
            Ok(())
        }
        Cmd::Stats { partner } => print_json(&engine.partner_stats(&partner)?),
    }
}

fn open_engine(root: Option<&PathBuf>) -> Result<Engine> {
    tracing::debug!(root = ?root, "opening engine");
    match root {
        Some(root) => {
            let report = ensure_initialized_at(root)?;
            Engine::open(&report.config)
        }
        None => Engine::open_default(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
