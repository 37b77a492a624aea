//! Executor — orchestration loop for apply.
//!
//! Applies resources in topological order per machine:
//! DAG → evaluate → plan → for each resource: codegen → transport → hash → state → events

use super::codegen;
use super::error::{Error, Result};
use super::evaluator::{self, Evaluation};
use super::planner;
use super::resolver;
use super::state;
use super::types::*;
use super::values;
use crate::transport;
use crate::tripwire::{eventlog, hasher};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

/// Configuration for an apply run.
pub struct ApplyConfig<'a> {
    pub config: &'a RecetaConfig,
    pub state_dir: &'a Path,
    pub force: bool,
    pub dry_run: bool,
    pub machine_filter: Option<&'a str>,
    pub resource_filter: Option<&'a str>,
    /// Overrides `policy.generated_values` when set
    pub values: Option<ValuePolicy>,
    /// Overrides `policy.seed` when set
    pub seed: Option<&'a str>,
}

impl<'a> ApplyConfig<'a> {
    /// Defaults for everything but the config and state directory.
    pub fn new(config: &'a RecetaConfig, state_dir: &'a Path) -> Self {
        Self {
            config,
            state_dir,
            force: false,
            dry_run: false,
            machine_filter: None,
            resource_filter: None,
            values: None,
            seed: None,
        }
    }

    fn value_policy(&self) -> ValuePolicy {
        self.values
            .clone()
            .unwrap_or_else(|| self.config.policy.generated_values.clone())
    }

    fn value_seed(&self) -> Option<&'a str> {
        self.seed.or(self.config.policy.seed.as_deref())
    }
}

/// Everything computed before any script runs.
#[derive(Debug)]
pub struct Prepared {
    pub plan: ExecutionPlan,
    pub evaluations: Vec<Evaluation>,
    pub locks: HashMap<String, StateLock>,
}

/// Order resources, load locks, evaluate each machine and plan.
pub fn prepare(cfg: &ApplyConfig) -> Result<Prepared> {
    let execution_order = resolver::build_execution_order(cfg.config)?;
    let policy = cfg.value_policy();
    let seed = cfg.value_seed();

    let mut locks: HashMap<String, StateLock> = HashMap::new();
    let mut evaluations = Vec::new();

    for machine_name in selected_machines(cfg) {
        let lock = state::load_lock(cfg.state_dir, &machine_name)?;
        let mut provider = values::provider_for(&policy, seed, lock.as_ref())?;
        evaluations.push(evaluator::evaluate_machine(
            cfg.config,
            &machine_name,
            &execution_order,
            provider.as_mut(),
        ));
        if let Some(lock) = lock {
            locks.insert(machine_name, lock);
        }
    }

    let plan = planner::plan(cfg.config, &execution_order, &evaluations, &locks);
    log::info!(
        "plan {}: {} to create, {} to update, {} to destroy, {} unchanged",
        plan.name,
        plan.to_create,
        plan.to_update,
        plan.to_destroy,
        plan.unchanged
    );

    Ok(Prepared {
        plan,
        evaluations,
        locks,
    })
}

/// Execute the apply loop.
pub fn apply(cfg: &ApplyConfig) -> Result<Vec<ApplyResult>> {
    let Prepared {
        plan,
        evaluations,
        mut locks,
    } = prepare(cfg)?;

    let mut results = Vec::new();

    for eval in &evaluations {
        let Some(machine) = resolve_machine(cfg.config, &eval.machine) else {
            log::warn!("machine '{}' is not in the inventory, skipping", eval.machine);
            continue;
        };

        if cfg.dry_run {
            results.push(dry_run_result(&plan, &eval.machine));
            continue;
        }

        results.push(apply_machine(cfg, &machine, eval, &plan, &mut locks)?);
    }

    Ok(results)
}

/// Inventory entry for a machine name, with `localhost` implicit.
pub fn resolve_machine(config: &RecetaConfig, name: &str) -> Option<Machine> {
    match config.machines.get(name) {
        Some(m) => Some(m.clone()),
        None if name == "localhost" => Some(Machine::localhost()),
        None => None,
    }
}

fn selected_machines(cfg: &ApplyConfig) -> Vec<String> {
    evaluator::target_machines(cfg.config)
        .into_iter()
        .filter(|m| cfg.machine_filter.is_none_or(|f| f == m))
        .collect()
}

fn dry_run_result(plan: &ExecutionPlan, machine: &str) -> ApplyResult {
    let unchanged = plan
        .changes
        .iter()
        .filter(|c| c.machine == machine && c.action == PlanAction::NoOp)
        .count() as u32;
    ApplyResult {
        machine: machine.to_string(),
        resources_converged: 0,
        resources_unchanged: unchanged,
        resources_failed: 0,
        outcomes: indexmap::IndexMap::new(),
        total_duration: std::time::Duration::ZERO,
    }
}

/// Shared context for recording resource outcomes.
struct RecordCtx<'a> {
    lock: &'a mut StateLock,
    state_dir: &'a Path,
    machine_name: &'a str,
    tripwire: bool,
    failure_policy: &'a FailurePolicy,
}

impl RecordCtx<'_> {
    fn event(&self, event: ProvenanceEvent) {
        log_tripwire(self.state_dir, self.machine_name, self.tripwire, event);
    }
}

/// Record a successful resource application into the lock and event log.
fn record_success(
    ctx: &mut RecordCtx,
    resolved: &ResolvedResource,
    machine: &Machine,
    duration: f64,
) {
    let desired_hash = planner::hash_desired_state(resolved);

    let mut details = build_resource_details(resolved);
    if let Some(live_hash) = live_state_hash(resolved, machine) {
        details.insert(
            "live_hash".to_string(),
            serde_yaml_ng::Value::String(live_hash),
        );
    }

    ctx.lock.resources.insert(
        resolved.id.clone(),
        ResourceLock {
            resource_type: resolved.resource.resource_type.clone(),
            status: ResourceStatus::Converged,
            applied_at: Some(eventlog::now_iso8601()),
            duration_seconds: Some(duration),
            hash: desired_hash.clone(),
            details,
            generated: resolved.generated.clone(),
        },
    );

    log::info!(
        "{}: {} converged in {:.2}s",
        ctx.machine_name,
        resolved.id,
        duration
    );
    ctx.event(ProvenanceEvent::ResourceConverged {
        machine: ctx.machine_name.to_string(),
        resource: resolved.id.clone(),
        duration_seconds: duration,
        hash: desired_hash,
    });
}

/// Hash of the state-query output, recorded for diagnostics.
fn live_state_hash(resolved: &ResolvedResource, machine: &Machine) -> Option<String> {
    let query = codegen::state_query_script(resolved).ok()?;
    match transport::query(machine, &query) {
        Ok(out) if out.success() => Some(hasher::hash_string(&out.stdout)),
        Ok(out) => {
            log::debug!("state query for {} exited {}", resolved.id, out.exit_code);
            None
        }
        Err(e) => {
            log::debug!("state query for {} failed: {}", resolved.id, e);
            None
        }
    }
}

/// Record a resource failure into the lock and event log. Returns true if
/// the machine's run should stop.
fn record_failure(
    ctx: &mut RecordCtx,
    resource_id: &str,
    resource_type: &ResourceType,
    duration: f64,
    error: &Error,
) -> bool {
    // Keep recorded generated values so `stable` reuses them after the failure
    let generated = ctx
        .lock
        .resources
        .get(resource_id)
        .map(|rl| rl.generated.clone())
        .unwrap_or_default();
    ctx.lock.resources.insert(
        resource_id.to_string(),
        ResourceLock {
            resource_type: resource_type.clone(),
            status: ResourceStatus::Failed,
            applied_at: Some(eventlog::now_iso8601()),
            duration_seconds: Some(duration),
            hash: String::new(),
            details: HashMap::new(),
            generated,
        },
    );

    log::warn!(
        "{}: {} failed ({}): {}",
        ctx.machine_name,
        resource_id,
        error.category(),
        error
    );
    ctx.event(ProvenanceEvent::ResourceFailed {
        machine: ctx.machine_name.to_string(),
        resource: resource_id.to_string(),
        category: error.category().to_string(),
        error: error.to_string(),
    });

    if *ctx.failure_policy == FailurePolicy::StopOnFirst {
        log::error!(
            "stopping {} after failure on {}: {}",
            ctx.machine_name,
            resource_id,
            error
        );
        return true;
    }

    false
}

/// Run the apply script for one resolved resource.
fn run_apply(resolved: &ResolvedResource, machine: &Machine) -> Result<()> {
    let script = codegen::apply_script(resolved)?;
    transport::exec_script(machine, &script)?.into_result()?;
    Ok(())
}

/// Log a tripwire event if tripwire is enabled.
fn log_tripwire(state_dir: &Path, machine: &str, tripwire: bool, event: ProvenanceEvent) {
    if tripwire {
        if let Err(e) = eventlog::append_event(state_dir, machine, event) {
            log::warn!("cannot write event for {}: {}", machine, e);
        }
    }
}

fn apply_machine(
    cfg: &ApplyConfig,
    machine: &Machine,
    eval: &Evaluation,
    plan: &ExecutionPlan,
    locks: &mut HashMap<String, StateLock>,
) -> Result<ApplyResult> {
    let machine_name = eval.machine.as_str();
    let machine_start = Instant::now();
    let run_id = eventlog::generate_run_id();
    let tripwire = cfg.config.policy.tripwire;

    let mut lock = locks
        .remove(machine_name)
        .unwrap_or_else(|| state::new_lock(machine_name, &machine.hostname));

    log::info!("{}: apply {} started", machine_name, run_id);
    log_tripwire(
        cfg.state_dir,
        machine_name,
        tripwire,
        ProvenanceEvent::ApplyStarted {
            machine: machine_name.to_string(),
            run_id: run_id.clone(),
            receta_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );

    let mut converged = 0u32;
    let mut unchanged = 0u32;
    let mut failed = 0u32;
    let mut outcomes = indexmap::IndexMap::new();
    let mut failed_ids: HashSet<String> = HashSet::new();

    let mut ctx = RecordCtx {
        lock: &mut lock,
        state_dir: cfg.state_dir,
        machine_name,
        tripwire,
        failure_policy: &cfg.config.policy.failure,
    };

    for change in plan.changes.iter().filter(|c| c.machine == machine_name) {
        if cfg.resource_filter.is_some_and(|f| f != change.resource_id) {
            continue;
        }
        let Some(evaluated) = eval.resources.get(&change.resource_id) else {
            continue;
        };

        if change.action == PlanAction::NoOp && !cfg.force {
            unchanged += 1;
            outcomes.insert(change.resource_id.clone(), Outcome::Unchanged);
            continue;
        }

        let start = Instant::now();
        let blocked_by = cfg
            .config
            .resources
            .get(&change.resource_id)
            .and_then(|r| r.depends_on.iter().find(|d| failed_ids.contains(*d)));

        let result = match (blocked_by, evaluated) {
            (Some(dep), _) => Err(Error::Blocked(format!("dependency '{}' failed", dep))),
            (None, Err(e)) => Err(e.clone()),
            (None, Ok(resolved)) => {
                ctx.event(ProvenanceEvent::ResourceStarted {
                    machine: machine_name.to_string(),
                    resource: change.resource_id.clone(),
                    action: change.action.to_string(),
                });
                run_apply(resolved, machine).map(|()| resolved)
            }
        };
        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(resolved) => {
                record_success(&mut ctx, resolved, machine, duration);
                converged += 1;
                outcomes.insert(change.resource_id.clone(), Outcome::Converged);
            }
            Err(e) => {
                failed += 1;
                failed_ids.insert(change.resource_id.clone());
                outcomes.insert(change.resource_id.clone(), Outcome::Failed(e.to_string()));
                if record_failure(
                    &mut ctx,
                    &change.resource_id,
                    &change.resource_type,
                    duration,
                    &e,
                ) {
                    break;
                }
            }
        }
    }

    let lock = ctx.lock;
    lock.generated_at = eventlog::now_iso8601();
    if cfg.config.policy.lock_file {
        state::save_lock(cfg.state_dir, lock)?;
    }

    let total = machine_start.elapsed();
    log::info!(
        "{}: apply {} finished: {} converged, {} unchanged, {} failed",
        machine_name,
        run_id,
        converged,
        unchanged,
        failed
    );
    log_tripwire(
        cfg.state_dir,
        machine_name,
        tripwire,
        ProvenanceEvent::ApplyCompleted {
            machine: machine_name.to_string(),
            run_id,
            resources_converged: converged,
            resources_unchanged: unchanged,
            resources_failed: failed,
            total_seconds: total.as_secs_f64(),
        },
    );

    Ok(ApplyResult {
        machine: machine_name.to_string(),
        resources_converged: converged,
        resources_unchanged: unchanged,
        resources_failed: failed,
        outcomes,
        total_duration: total,
    })
}

/// Build resource-specific details for the lock entry.
fn build_resource_details(resolved: &ResolvedResource) -> HashMap<String, serde_yaml_ng::Value> {
    let r = &resolved.resource;
    let mut details = HashMap::new();
    let mut put = |key: &str, value: String| {
        details.insert(key.to_string(), serde_yaml_ng::Value::String(value));
    };

    match r.resource_type {
        ResourceType::Package => {
            put("provider", r.provider.clone().unwrap_or_else(|| "apt".to_string()));
            put("state", r.state.clone().unwrap_or_else(|| "present".to_string()));
        }
        ResourceType::File | ResourceType::Template => {
            put("action", r.file_action().to_string());
            for (key, value) in [
                ("path", &r.path),
                ("owner", &r.owner),
                ("group", &r.group),
                ("mode", &r.mode),
            ] {
                if let Some(v) = value {
                    put(key, v.clone());
                }
            }
            if let Some(ref payload) = resolved.payload {
                put("content_hash", hasher::hash_bytes(payload));
            }
        }
    }

    if !r.packages.is_empty() {
        details.insert(
            "packages".to_string(),
            serde_yaml_ng::Value::Sequence(
                r.packages
                    .iter()
                    .map(|p| serde_yaml_ng::Value::String(p.clone()))
                    .collect(),
            ),
        );
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn local_config(dir: &Path) -> RecetaConfig {
        let yaml = format!(
            r#"
version: "1.0"
name: test
machines:
  local:
    hostname: localhost
    addr: 127.0.0.1
resources:
  test-file:
    type: file
    machine: local
    path: {}/out/test-file.txt
    content: "hello from receta"
    mode: "0640"
policy:
  failure: stop_on_first
"#,
            dir.display()
        );
        serde_yaml_ng::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_selected_machines() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let mut cfg = ApplyConfig::new(&config, dir.path());
        assert_eq!(selected_machines(&cfg), vec!["local"]);
        cfg.machine_filter = Some("other");
        assert!(selected_machines(&cfg).is_empty());
    }

    #[test]
    fn test_resolve_machine_localhost_implicit() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        assert_eq!(resolve_machine(&config, "localhost").unwrap().addr, "127.0.0.1");
        assert_eq!(resolve_machine(&config, "local").unwrap().hostname, "localhost");
        assert!(resolve_machine(&config, "ghost").is_none());
    }

    #[test]
    fn test_seeded_policy_takes_seed_at_run_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(dir.path());
        config.policy.generated_values = ValuePolicy::Seeded;
        assert!(crate::core::parser::validate_config(&config).is_empty());

        let state_dir = dir.path().join("state");
        let mut cfg = ApplyConfig::new(&config, &state_dir);
        assert!(prepare(&cfg).is_err());
        cfg.seed = Some("from-cli");
        assert_eq!(prepare(&cfg).unwrap().plan.to_create, 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let state_dir = dir.path().join("state");
        let mut cfg = ApplyConfig::new(&config, &state_dir);
        cfg.dry_run = true;
        let results = apply(&cfg).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].resources_converged, 0);
        assert!(!dir.path().join("out/test-file.txt").exists());
        assert!(!state_dir.exists());
    }

    #[test]
    fn test_apply_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let state_dir = dir.path().join("state");
        let results = apply(&ApplyConfig::new(&config, &state_dir)).unwrap();
        assert_eq!(results[0].resources_converged, 1);
        assert_eq!(results[0].outcomes["test-file"], Outcome::Converged);

        let target = dir.path().join("out/test-file.txt");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello from receta");

        let lock = state::load_lock(&state_dir, "local").unwrap().unwrap();
        let rl = &lock.resources["test-file"];
        assert_eq!(rl.status, ResourceStatus::Converged);
        assert_eq!(
            rl.details["content_hash"],
            serde_yaml_ng::Value::String(hasher::hash_string("hello from receta"))
        );
        assert!(rl.details.contains_key("live_hash"));

        let events = eventlog::read_events(&state_dir, "local").unwrap();
        assert!(matches!(
            events.first().map(|e| &e.event),
            Some(ProvenanceEvent::ApplyStarted { .. })
        ));
        assert!(matches!(
            events.last().map(|e| &e.event),
            Some(ProvenanceEvent::ApplyCompleted { resources_converged: 1, .. })
        ));
    }

    #[test]
    fn test_apply_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let state_dir = dir.path().join("state");

        let r1 = apply(&ApplyConfig::new(&config, &state_dir)).unwrap();
        assert_eq!(r1[0].resources_converged, 1);

        let r2 = apply(&ApplyConfig::new(&config, &state_dir)).unwrap();
        assert_eq!(r2[0].resources_unchanged, 1);
        assert_eq!(r2[0].resources_converged, 0);
        assert_eq!(r2[0].outcomes["test-file"], Outcome::Unchanged);
    }

    #[test]
    fn test_force_reapply() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let state_dir = dir.path().join("state");
        apply(&ApplyConfig::new(&config, &state_dir)).unwrap();

        let mut cfg = ApplyConfig::new(&config, &state_dir);
        cfg.force = true;
        let r2 = apply(&cfg).unwrap();
        assert_eq!(r2[0].resources_converged, 1);
    }

    #[test]
    fn test_resource_filter() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path());
        let state_dir = dir.path().join("state");
        let mut cfg = ApplyConfig::new(&config, &state_dir);
        cfg.resource_filter = Some("nonexistent-resource");
        let results = apply(&cfg).unwrap();
        assert_eq!(results[0].resources_converged, 0);
        assert_eq!(results[0].resources_unchanged, 0);
        assert!(results[0].outcomes.is_empty());
    }

    #[test]
    fn test_stop_on_first_and_continue_independent() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
version: "1.0"
name: test
resources:
  a-bad:
    type: file
    path: {root}/bad.txt
    content: x
    owner: no-such-user-receta
  b-dependent:
    type: file
    path: {root}/dep.txt
    content: x
    depends_on: [a-bad]
  c-independent:
    type: file
    path: {root}/ind.txt
    content: x
"#,
            root = dir.path().display()
        );
        let mut config: RecetaConfig = serde_yaml_ng::from_str(&yaml).unwrap();
        let state_dir = dir.path().join("state");

        let r = apply(&ApplyConfig::new(&config, &state_dir)).unwrap();
        assert_eq!(r[0].resources_failed, 1);
        assert_eq!(r[0].outcomes.len(), 1);
        assert!(!dir.path().join("bad.txt").exists());
        assert!(!dir.path().join("ind.txt").exists());

        config.policy.failure = FailurePolicy::ContinueIndependent;
        let r = apply(&ApplyConfig::new(&config, &state_dir)).unwrap();
        assert_eq!(r[0].resources_failed, 2);
        assert_eq!(r[0].resources_converged, 1);
        assert!(matches!(
            r[0].outcomes["b-dependent"],
            Outcome::Failed(ref m) if m.contains("a-bad")
        ));
        assert!(dir.path().join("ind.txt").exists());
        assert!(!dir.path().join("dep.txt").exists());

        let events = std::fs::read_to_string(state_dir.join("localhost/events.jsonl")).unwrap();
        let blocked = events
            .lines()
            .filter(|l| l.contains("resource_failed") && l.contains("b-dependent"))
            .last()
            .unwrap();
        assert!(blocked.contains("\"category\":\"execution\""));
    }

    #[test]
    fn test_record_failure_keeps_generated_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = state::new_lock("test", "test-box");
        let mut previous = ResourceLock {
            resource_type: ResourceType::Template,
            status: ResourceStatus::Converged,
            applied_at: None,
            duration_seconds: None,
            hash: "blake3:old".to_string(),
            details: HashMap::new(),
            generated: indexmap::IndexMap::new(),
        };
        previous
            .generated
            .insert("var".to_string(), "5f0c6e1a-2b3d-4c5e-8f9a-0b1c2d3e4f5a".to_string());
        lock.resources.insert("qux".to_string(), previous);

        let mut ctx = RecordCtx {
            lock: &mut lock,
            state_dir: dir.path(),
            machine_name: "test",
            tripwire: false,
            failure_policy: &FailurePolicy::ContinueIndependent,
        };
        let err = Error::Blocked("dependency 'app' failed".to_string());
        record_failure(&mut ctx, "qux", &ResourceType::Template, 0.0, &err);

        let rl = &lock.resources["qux"];
        assert_eq!(rl.status, ResourceStatus::Failed);
        assert_eq!(rl.generated["var"], "5f0c6e1a-2b3d-4c5e-8f9a-0b1c2d3e4f5a");
    }

    #[test]
    fn test_record_failure_stop_on_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = state::new_lock("test", "test-box");
        let mut ctx = RecordCtx {
            lock: &mut lock,
            state_dir: dir.path(),
            machine_name: "test",
            tripwire: true,
            failure_policy: &FailurePolicy::StopOnFirst,
        };

        let err = Error::from_script_failure(100, "E: Unable to locate package crno");
        let should_stop =
            record_failure(&mut ctx, "failing-pkg", &ResourceType::Package, 0.5, &err);

        assert!(should_stop);
        let rl = &ctx.lock.resources["failing-pkg"];
        assert_eq!(rl.status, ResourceStatus::Failed);
        assert_eq!(rl.hash, "");

        let content = std::fs::read_to_string(dir.path().join("test/events.jsonl")).unwrap();
        assert!(content.contains("resource_failed"));
        assert!(content.contains("\"category\":\"resolution\""));
    }

    #[test]
    fn test_record_failure_continue() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = state::new_lock("test", "test-box");
        let mut ctx = RecordCtx {
            lock: &mut lock,
            state_dir: dir.path(),
            machine_name: "test",
            tripwire: false,
            failure_policy: &FailurePolicy::ContinueIndependent,
        };

        let err = Error::Binding("unbound template variable: var".into());
        assert!(!record_failure(&mut ctx, "qux", &ResourceType::Template, 1.0, &err));
        assert_eq!(ctx.lock.resources["qux"].status, ResourceStatus::Failed);
        assert!(!dir.path().join("test/events.jsonl").exists());
    }

    #[test]
    fn test_record_success_keeps_generated_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = state::new_lock("test", "test-box");
        let mut resource = Resource::new(ResourceType::Template);
        resource.path = Some(dir.path().join("qux.txt").display().to_string());
        let resolved = ResolvedResource {
            id: "qux".to_string(),
            resource,
            payload: Some(b"id=abc".to_vec()),
            generated: IndexMap::from([("var".to_string(), "abc".to_string())]),
        };
        let mut ctx = RecordCtx {
            lock: &mut lock,
            state_dir: dir.path(),
            machine_name: "test",
            tripwire: true,
            failure_policy: &FailurePolicy::StopOnFirst,
        };

        record_success(&mut ctx, &resolved, &Machine::localhost(), 0.1);

        let rl = &ctx.lock.resources["qux"];
        assert_eq!(rl.status, ResourceStatus::Converged);
        assert!(rl.hash.starts_with("blake3:"));
        assert_eq!(rl.generated["var"], "abc");
        assert!(rl.details.contains_key("content_hash"));
        assert_eq!(
            rl.details["action"],
            serde_yaml_ng::Value::String("create".into())
        );
    }

    #[test]
    fn test_build_resource_details_package() {
        let mut r = Resource::new(ResourceType::Package);
        r.packages = vec!["cron".to_string()];
        let resolved = ResolvedResource {
            id: "cron".to_string(),
            resource: r,
            payload: None,
            generated: IndexMap::new(),
        };
        let details = build_resource_details(&resolved);
        assert_eq!(details["provider"], serde_yaml_ng::Value::String("apt".into()));
        assert!(matches!(
            details["packages"],
            serde_yaml_ng::Value::Sequence(ref s) if s.len() == 1
        ));
        assert!(!details.contains_key("path"));
    }
}
