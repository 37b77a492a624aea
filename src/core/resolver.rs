//! Template resolution and dependency DAG construction.
//!
//! Resolves `{{params.key}}`, `{{machine.name.field}}` and, inside templates,
//! bare `{{var}}` bindings. Builds a DAG from explicit depends_on edges and
//! computes topological order using Kahn's algorithm with deterministic
//! (alphabetical) tie-breaking.

use super::error::{Error, Result};
use super::types::*;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

/// Values visible to `{{...}}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub params: &'a HashMap<String, serde_yaml_ng::Value>,
    pub machines: &'a IndexMap<String, Machine>,
    /// Template bindings; `None` outside template bodies
    pub vars: Option<&'a IndexMap<String, String>>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(config: &'a RecetaConfig) -> Self {
        Self {
            params: &config.params,
            machines: &config.machines,
            vars: None,
        }
    }

    pub fn with_vars(self, vars: &'a IndexMap<String, String>) -> Self {
        Self {
            vars: Some(vars),
            ..self
        }
    }
}

/// Resolve all template variables in a string.
pub fn resolve_template(template: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| Error::Binding(format!("unclosed placeholder at position {}", open)))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = lookup(key, ctx)?;

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

fn lookup(key: &str, ctx: &TemplateContext<'_>) -> Result<String> {
    if let Some(param_key) = key.strip_prefix("params.") {
        return ctx
            .params
            .get(param_key)
            .map(yaml_value_to_string)
            .ok_or_else(|| Error::Binding(format!("unknown param: {}", param_key)));
    }

    if key.starts_with("machine.") {
        let parts: Vec<&str> = key.splitn(3, '.').collect();
        if parts.len() != 3 {
            return Err(Error::Binding(format!("invalid machine ref: {}", key)));
        }
        let machine = ctx
            .machines
            .get(parts[1])
            .ok_or_else(|| Error::Binding(format!("unknown machine: {}", parts[1])))?;
        return match parts[2] {
            "addr" => Ok(machine.addr.clone()),
            "hostname" => Ok(machine.hostname.clone()),
            "user" => Ok(machine.user.clone()),
            "arch" => Ok(machine.arch.clone()),
            _ => Err(Error::Binding(format!(
                "unknown machine field: {}",
                parts[2]
            ))),
        };
    }

    match ctx.vars {
        Some(vars) => vars
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Binding(format!("unbound template variable: {}", key))),
        None => Err(Error::Binding(format!("unknown template variable: {}", key))),
    }
}

/// Resolve all templates in a resource's string fields.
pub fn resolve_resource_templates(
    resource: &Resource,
    ctx: &TemplateContext<'_>,
) -> Result<Resource> {
    let mut resolved = resource.clone();

    if let Some(ref content) = resolved.content {
        resolved.content = Some(resolve_template(content, ctx)?);
    }
    if let Some(ref source) = resolved.source {
        resolved.source = Some(resolve_template(source, ctx)?);
    }
    if let Some(ref path) = resolved.path {
        resolved.path = Some(resolve_template(path, ctx)?);
    }
    if let Some(ref owner) = resolved.owner {
        resolved.owner = Some(resolve_template(owner, ctx)?);
    }
    if let Some(ref group) = resolved.group {
        resolved.group = Some(resolve_template(group, ctx)?);
    }
    if let Some(ref mode) = resolved.mode {
        resolved.mode = Some(resolve_template(mode, ctx)?);
    }
    resolved.packages = resolved
        .packages
        .iter()
        .map(|p| resolve_template(p, ctx))
        .collect::<Result<Vec<_>>>()?;

    Ok(resolved)
}

/// Build a topological execution order from resource dependencies.
/// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
pub fn build_execution_order(config: &RecetaConfig) -> Result<Vec<String>> {
    let resource_ids: Vec<String> = config.resources.keys().cloned().collect();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for id in &resource_ids {
        in_degree.insert(id.clone(), 0);
        adjacency.insert(id.clone(), Vec::new());
    }

    for (id, resource) in &config.resources {
        for dep in &resource.depends_on {
            let Some(dependents) = adjacency.get_mut(dep) else {
                return Err(Error::Config(format!(
                    "resource '{}' depends on unknown '{}'",
                    id, dep
                )));
            };
            dependents.push(id.clone());
            *in_degree.entry(id.clone()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<String> = VecDeque::new();
    let mut zero_degree: Vec<String> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| id.clone())
        .collect();
    zero_degree.sort();
    queue.extend(zero_degree);

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.clone());

        let mut next_ready: Vec<String> = Vec::new();
        if let Some(neighbors) = adjacency.get(&current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(neighbor.clone());
                    }
                }
            }
        }
        next_ready.sort();
        queue.extend(next_ready);
    }

    if order.len() != resource_ids.len() {
        let ordered: HashSet<_> = order.iter().collect();
        let mut cycle_members: Vec<String> = resource_ids
            .iter()
            .filter(|id| !ordered.contains(id))
            .cloned()
            .collect();
        cycle_members.sort();
        return Err(Error::Cycle(cycle_members));
    }

    Ok(order)
}
