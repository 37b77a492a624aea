//! Plan generation — diff evaluated desired state against lock state.

use super::evaluator::Evaluation;
use super::types::*;
use crate::tripwire::hasher;
use std::collections::HashMap;

/// Generate an execution plan by comparing evaluated resources to lock state.
pub fn plan(
    config: &RecetaConfig,
    execution_order: &[String],
    evaluations: &[Evaluation],
    locks: &HashMap<String, StateLock>,
) -> ExecutionPlan {
    let mut changes = Vec::new();
    let mut to_create = 0u32;
    let mut to_update = 0u32;
    let mut to_destroy = 0u32;
    let mut unchanged = 0u32;

    for eval in evaluations {
        let lock = locks.get(&eval.machine);
        for (resource_id, evaluated) in &eval.resources {
            let lock_entry = lock.and_then(|l| l.resources.get(resource_id));
            let (action, resource_type, description) = match evaluated {
                Ok(resolved) => {
                    let action = determine_action(resolved, lock_entry);
                    let description = describe_action(resolved, &action);
                    (action, resolved.resource.resource_type.clone(), description)
                }
                Err(e) => {
                    let action = if lock_entry.is_some() {
                        PlanAction::Update
                    } else {
                        PlanAction::Create
                    };
                    let resource_type = match config.resources.get(resource_id) {
                        Some(r) => r.resource_type.clone(),
                        None => continue,
                    };
                    (
                        action,
                        resource_type,
                        format!("{}: cannot evaluate: {}", resource_id, e),
                    )
                }
            };

            match action {
                PlanAction::Create => to_create += 1,
                PlanAction::Update => to_update += 1,
                PlanAction::Destroy => to_destroy += 1,
                PlanAction::NoOp => unchanged += 1,
            }

            changes.push(PlannedChange {
                resource_id: resource_id.clone(),
                machine: eval.machine.clone(),
                resource_type,
                action,
                description,
            });
        }
    }

    ExecutionPlan {
        name: config.name.clone(),
        changes,
        execution_order: execution_order.to_vec(),
        to_create,
        to_update,
        to_destroy,
        unchanged,
    }
}

/// Determine what action to take for an evaluated resource.
pub fn determine_action(
    resolved: &ResolvedResource,
    lock_entry: Option<&ResourceLock>,
) -> PlanAction {
    let desired_hash = hash_desired_state(resolved);
    let converged_same = lock_entry
        .map(|rl| rl.status == ResourceStatus::Converged && rl.hash == desired_hash)
        .unwrap_or(false);

    if resolved.resource.is_removal() {
        return if converged_same {
            PlanAction::NoOp
        } else {
            PlanAction::Destroy
        };
    }

    match lock_entry {
        Some(_) if converged_same => PlanAction::NoOp,
        // Stale hash, failed or drifted: re-apply
        Some(_) => PlanAction::Update,
        None => PlanAction::Create,
    }
}

/// Compute a hash of the desired state for comparison.
///
/// Covers every field the apply script acts on, plus the payload bytes, so
/// a re-rendered template with a fresh generated value hashes differently.
pub fn hash_desired_state(resolved: &ResolvedResource) -> String {
    let r = &resolved.resource;
    let mut components: Vec<String> = vec![r.resource_type.to_string()];

    match r.resource_type {
        ResourceType::Package => {
            components.push(r.provider.clone().unwrap_or_else(|| "apt".to_string()));
            components.push(r.state.clone().unwrap_or_else(|| "present".to_string()));
            components.extend(r.packages.iter().cloned());
        }
        ResourceType::File | ResourceType::Template => {
            components.push(r.file_action().to_string());
            components.push(r.path.clone().unwrap_or_default());
            for field in [&r.owner, &r.group, &r.mode] {
                components.push(field.clone().unwrap_or_default());
            }
            if let Some(ref payload) = resolved.payload {
                components.push(hasher::hash_bytes(payload));
            }
        }
    }

    let refs: Vec<&str> = components.iter().map(String::as_str).collect();
    hasher::composite_hash(&refs)
}

/// Generate a human-readable description of a planned action.
fn describe_action(resolved: &ResolvedResource, action: &PlanAction) -> String {
    let id = &resolved.id;
    let r = &resolved.resource;
    let path = r.path.as_deref().unwrap_or("?");
    match action {
        PlanAction::Create => match r.resource_type {
            ResourceType::Package => format!("{}: install {}", id, r.packages.join(", ")),
            ResourceType::File if r.file_action() == FileAction::Touch => {
                format!("{}: touch {}", id, path)
            }
            ResourceType::File => format!("{}: create {}", id, path),
            ResourceType::Template => format!("{}: render {}", id, path),
        },
        PlanAction::Update => match r.resource_type {
            ResourceType::Template if !resolved.generated.is_empty() => {
                format!("{}: re-render {} (generated values)", id, path)
            }
            _ => format!("{}: update (state changed)", id),
        },
        PlanAction::Destroy => match r.resource_type {
            ResourceType::Package => format!("{}: remove {}", id, r.packages.join(", ")),
            _ => format!("{}: delete {}", id, path),
        },
        PlanAction::NoOp => format!("{}: no changes", id),
    }
}
