//! CLI subcommands — init, validate, plan, apply, render, drift, status, completions.

use crate::core::error::Error;
use crate::core::executor::{self, ApplyConfig};
use crate::core::types::{
    ExecutionPlan, PlanAction, ProvenanceEvent, RecetaConfig, ResourceType, TimestampedEvent,
    ValuePolicy,
};
use crate::core::{parser, state};
use crate::tripwire::{drift, eventlog};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "receta",
    version,
    about = "Declarative machine recipes: packages, files and templates with BLAKE3 state"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new receta project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate receta.yaml and its recipes without touching any machine
    Validate {
        /// Path to receta.yaml
        #[arg(short, long, default_value = "receta.yaml")]
        file: PathBuf,
    },

    /// Show execution plan (diff desired vs current)
    Plan {
        /// Path to receta.yaml
        #[arg(short, long, default_value = "receta.yaml")]
        file: PathBuf,

        /// Target specific machine
        #[arg(short, long)]
        machine: Option<String>,

        /// Target specific resource
        #[arg(short, long)]
        resource: Option<String>,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Generated value policy (regenerate, stable, seeded)
        #[arg(long)]
        values: Option<ValuePolicy>,

        /// Seed for --values seeded
        #[arg(long)]
        seed: Option<String>,
    },

    /// Converge machines to the declared state
    Apply {
        /// Path to receta.yaml
        #[arg(short, long, default_value = "receta.yaml")]
        file: PathBuf,

        /// Target specific machine
        #[arg(short, long)]
        machine: Option<String>,

        /// Target specific resource
        #[arg(short, long)]
        resource: Option<String>,

        /// Force re-apply all resources
        #[arg(long)]
        force: bool,

        /// Show what would be executed without running
        #[arg(long)]
        dry_run: bool,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Generated value policy (regenerate, stable, seeded)
        #[arg(long)]
        values: Option<ValuePolicy>,

        /// Seed for --values seeded
        #[arg(long)]
        seed: Option<String>,
    },

    /// Print the payloads files and templates would deploy
    Render {
        /// Path to receta.yaml
        #[arg(short, long, default_value = "receta.yaml")]
        file: PathBuf,

        /// Target specific machine
        #[arg(short, long)]
        machine: Option<String>,

        /// Target specific resource
        #[arg(short, long)]
        resource: Option<String>,

        /// State directory (read for --values stable)
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Generated value policy (regenerate, stable, seeded)
        #[arg(long)]
        values: Option<ValuePolicy>,

        /// Seed for --values seeded
        #[arg(long)]
        seed: Option<String>,
    },

    /// Detect unauthorized changes (tripwire)
    Drift {
        /// Path to receta.yaml
        #[arg(short, long, default_value = "receta.yaml")]
        file: PathBuf,

        /// Target specific machine
        #[arg(short, long)]
        machine: Option<String>,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Exit non-zero on any drift (for CI/cron)
        #[arg(long)]
        tripwire: bool,

        /// Mark drifted resources in the lock so the next apply re-converges them
        #[arg(long)]
        mark: bool,
    },

    /// Show current state from lock files and the last run of each machine
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Target specific machine
        #[arg(short, long)]
        machine: Option<String>,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Flags shared by plan, apply and render.
struct RunArgs<'a> {
    state_dir: &'a Path,
    machine: Option<&'a str>,
    resource: Option<&'a str>,
    values: Option<ValuePolicy>,
    seed: Option<&'a str>,
}

impl<'a> RunArgs<'a> {
    fn apply_config(&self, config: &'a RecetaConfig) -> ApplyConfig<'a> {
        let mut cfg = ApplyConfig::new(config, self.state_dir);
        cfg.machine_filter = self.machine;
        cfg.resource_filter = self.resource;
        cfg.values = self.values.clone();
        cfg.seed = self.seed;
        cfg
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan {
            file,
            machine,
            resource,
            state_dir,
            values,
            seed,
        } => cmd_plan(
            &file,
            &RunArgs {
                state_dir: &state_dir,
                machine: machine.as_deref(),
                resource: resource.as_deref(),
                values,
                seed: seed.as_deref(),
            },
        ),
        Commands::Apply {
            file,
            machine,
            resource,
            force,
            dry_run,
            state_dir,
            values,
            seed,
        } => cmd_apply(
            &file,
            &RunArgs {
                state_dir: &state_dir,
                machine: machine.as_deref(),
                resource: resource.as_deref(),
                values,
                seed: seed.as_deref(),
            },
            force,
            dry_run,
        ),
        Commands::Render {
            file,
            machine,
            resource,
            state_dir,
            values,
            seed,
        } => cmd_render(
            &file,
            &RunArgs {
                state_dir: &state_dir,
                machine: machine.as_deref(),
                resource: resource.as_deref(),
                values,
                seed: seed.as_deref(),
            },
        ),
        Commands::Drift {
            file,
            machine,
            state_dir,
            tripwire,
            mark,
        } => cmd_drift(&file, &state_dir, machine.as_deref(), tripwire, mark),
        Commands::Status { state_dir, machine } => cmd_status(&state_dir, machine.as_deref()),
        Commands::Completions { shell } => {
            write_completions(shell, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn write_completions(shell: clap_complete::Shell, out: &mut dyn std::io::Write) {
    clap_complete::generate(shell, &mut Cli::command(), "receta", out);
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("receta.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;
    for sub in ["files", "templates"] {
        std::fs::create_dir_all(path.join(sub))
            .map_err(|e| format!("cannot create {}/: {}", sub, e))?;
    }

    let template = r#"version: "1.0"
name: my-machines
description: "Managed by receta"

params: {}

machines: {}

recipes: {}

resources: {}

policy:
  failure: stop_on_first
  tripwire: true
  lock_file: true
  generated_values: regenerate
"#;
    std::fs::write(&config_path, template)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized receta project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

/// Load a config, printing each validation message on failure.
fn load_valid(file: &Path) -> Result<RecetaConfig, String> {
    match parser::load_and_validate(file) {
        Ok(config) => Ok(config),
        Err(Error::Validation(messages)) => {
            for m in &messages {
                eprintln!("  ERROR: {}", m);
            }
            Err(format!("{} validation error(s)", messages.len()))
        }
        Err(e) => Err(e.to_string()),
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = load_valid(file)?;
    println!(
        "OK: {} ({} machines, {} recipes, {} resources)",
        config.name,
        config.machines.len(),
        config.recipes.len(),
        config.resources.len()
    );
    Ok(())
}

fn cmd_plan(file: &Path, args: &RunArgs) -> Result<(), String> {
    let config = load_valid(file)?;
    let prepared = executor::prepare(&args.apply_config(&config)).map_err(|e| e.to_string())?;
    print_plan(&prepared.plan, args.machine, args.resource);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &ExecutionPlan, machine_filter: Option<&str>, resource_filter: Option<&str>) {
    println!("Planning: {} ({} resources)", plan.name, plan.changes.len());
    println!();

    let mut current_machine = String::new();
    for change in &plan.changes {
        if machine_filter.is_some_and(|f| f != change.machine)
            || resource_filter.is_some_and(|f| f != change.resource_id)
        {
            continue;
        }
        if change.machine != current_machine {
            current_machine.clone_from(&change.machine);
            println!("{}:", current_machine);
        }
        let symbol = match change.action {
            PlanAction::Create => "+",
            PlanAction::Update => "~",
            PlanAction::Destroy => "-",
            PlanAction::NoOp => " ",
        };
        println!("  {} {}", symbol, change.description);
    }

    println!();
    println!(
        "Plan: {} to add, {} to change, {} to destroy, {} unchanged.",
        plan.to_create, plan.to_update, plan.to_destroy, plan.unchanged
    );
}

fn cmd_apply(file: &Path, args: &RunArgs, force: bool, dry_run: bool) -> Result<(), String> {
    let config = load_valid(file)?;

    let mut cfg = args.apply_config(&config);
    cfg.force = force;
    cfg.dry_run = dry_run;

    if dry_run {
        let prepared = executor::prepare(&cfg).map_err(|e| e.to_string())?;
        print_plan(&prepared.plan, args.machine, args.resource);
        println!("Dry run: no changes applied.");
        return Ok(());
    }

    let results = executor::apply(&cfg).map_err(|e| e.to_string())?;

    let mut total_converged = 0;
    let mut total_unchanged = 0;
    let mut total_failed = 0;

    for result in &results {
        println!(
            "{}: {} converged, {} unchanged, {} failed ({:.1}s)",
            result.machine,
            result.resources_converged,
            result.resources_unchanged,
            result.resources_failed,
            result.total_duration.as_secs_f64()
        );
        for (id, outcome) in &result.outcomes {
            println!("  {}: {}", id, outcome);
        }
        total_converged += result.resources_converged;
        total_unchanged += result.resources_unchanged;
        total_failed += result.resources_failed;
    }

    println!();
    if total_failed > 0 {
        println!(
            "Apply completed with errors: {} converged, {} unchanged, {} FAILED",
            total_converged, total_unchanged, total_failed
        );
        return Err(format!("{} resource(s) failed", total_failed));
    }

    println!(
        "Apply complete: {} converged, {} unchanged.",
        total_converged, total_unchanged
    );
    Ok(())
}

fn cmd_render(file: &Path, args: &RunArgs) -> Result<(), String> {
    let config = load_valid(file)?;
    let mut cfg = args.apply_config(&config);
    cfg.dry_run = true;
    let prepared = executor::prepare(&cfg).map_err(|e| e.to_string())?;

    let mut failed = 0;
    for eval in &prepared.evaluations {
        for (id, result) in &eval.resources {
            if args.resource.is_some_and(|f| f != id) {
                continue;
            }
            let resolved = match result {
                Ok(r) => r,
                Err(e) => {
                    println!("==> {}/{}: {} [{}]", eval.machine, id, e, e.category());
                    failed += 1;
                    continue;
                }
            };
            let (Some(payload), Some(path)) = (&resolved.payload, &resolved.resource.path) else {
                continue;
            };
            match resolved.resource.resource_type {
                ResourceType::Template => {
                    println!("==> {}/{} -> {}", eval.machine, id, path);
                    for (name, value) in &resolved.generated {
                        println!("    # {} = {}", name, value);
                    }
                    print!("{}", String::from_utf8_lossy(payload));
                    if !payload.ends_with(b"\n") {
                        println!();
                    }
                }
                _ => println!(
                    "==> {}/{} -> {} ({} bytes, {})",
                    eval.machine,
                    id,
                    path,
                    payload.len(),
                    crate::tripwire::hasher::hash_bytes(payload)
                ),
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} resource(s) could not be evaluated", failed));
    }
    Ok(())
}

fn cmd_drift(
    file: &Path,
    state_dir: &Path,
    machine_filter: Option<&str>,
    tripwire_mode: bool,
    mark: bool,
) -> Result<(), String> {
    let config = parser::load_config(file).map_err(|e| e.to_string())?;
    let mut total_drift = 0;

    for name in state::list_locked_machines(state_dir).map_err(|e| e.to_string())? {
        if machine_filter.is_some_and(|f| f != name) {
            continue;
        }
        let Some(mut lock) = state::load_lock(state_dir, &name).map_err(|e| e.to_string())?
        else {
            continue;
        };

        let Some(machine) = executor::resolve_machine(&config, &name) else {
            log::warn!("machine '{}' is not in the inventory, skipping", name);
            continue;
        };

        println!("Checking {} ({} resources)...", name, lock.resources.len());
        let findings = match drift::detect_machine_drift(&lock, &machine) {
            Ok(findings) => findings,
            Err(e) => {
                log::warn!("drift check on {} failed: {}", name, e);
                println!("  Unreachable, not checked.");
                continue;
            }
        };

        if findings.is_empty() {
            println!("  No drift detected.");
            continue;
        }

        for f in &findings {
            println!("  DRIFTED: {} ({})", f.resource_id, f.detail);
            println!("    Expected: {}", f.expected_hash);
            println!("    Actual:   {}", f.actual_hash);
            if config.policy.tripwire {
                let event = ProvenanceEvent::DriftDetected {
                    machine: name.clone(),
                    resource: f.resource_id.clone(),
                    expected_hash: f.expected_hash.clone(),
                    actual_hash: f.actual_hash.clone(),
                };
                if let Err(e) = eventlog::append_event(state_dir, &name, event) {
                    log::warn!("cannot record drift event: {}", e);
                }
            }
        }
        total_drift += findings.len();

        if mark {
            let marked = drift::mark_drifted(&mut lock, &findings);
            state::save_lock(state_dir, &lock).map_err(|e| e.to_string())?;
            println!("  Marked {} resource(s) drifted.", marked);
        }
    }

    if total_drift > 0 {
        println!();
        println!("Drift detected: {} resource(s)", total_drift);
        if tripwire_mode {
            return Err(format!("{} drift finding(s)", total_drift));
        }
    } else {
        println!("No drift detected.");
    }

    Ok(())
}

/// Summary line for the most recent completed run in an event log.
fn last_run(events: &[TimestampedEvent]) -> Option<String> {
    events.iter().rev().find_map(|te| match &te.event {
        ProvenanceEvent::ApplyCompleted {
            run_id,
            resources_converged,
            resources_unchanged,
            resources_failed,
            total_seconds,
            ..
        } => Some(format!(
            "{} at {}: {} converged, {} unchanged, {} failed ({:.1}s)",
            run_id,
            te.ts,
            resources_converged,
            resources_unchanged,
            resources_failed,
            total_seconds
        )),
        _ => None,
    })
}

fn cmd_status(state_dir: &Path, machine_filter: Option<&str>) -> Result<(), String> {
    let mut found = false;

    for name in state::list_locked_machines(state_dir).map_err(|e| e.to_string())? {
        if machine_filter.is_some_and(|f| f != name) {
            continue;
        }
        let Some(lock) = state::load_lock(state_dir, &name).map_err(|e| e.to_string())? else {
            continue;
        };
        found = true;

        println!("Machine: {} ({})", lock.machine, lock.hostname);
        println!("  Generated: {}", lock.generated_at);
        println!("  Generator: {}", lock.generator);
        let events = eventlog::read_events(state_dir, &name).map_err(|e| e.to_string())?;
        if let Some(run) = last_run(&events) {
            println!("  Last run:  {}", run);
        }
        println!("  Resources: {}", lock.resources.len());

        for (id, rl) in &lock.resources {
            let duration = rl
                .duration_seconds
                .map(|d| format!(" ({:.2}s)", d))
                .unwrap_or_default();
            println!("    {}: {} [{}]{}", id, rl.status, rl.resource_type, duration);
            for (key, value) in &rl.generated {
                println!("      {} = {}", key, value);
            }
        }
        println!();
    }

    if !found {
        println!("No state found. Run `receta apply` first.");
    }

    Ok(())
}
