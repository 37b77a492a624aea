//! Recipe loading, input validation, and expansion into resources.
//!
//! A recipe is a directory holding `recipe.yaml` plus its own `files/` and
//! `templates/`. The yaml declares typed inputs and a set of resources. When
//! instantiated from `receta.yaml`, the recipe's resources are expanded into
//! the config with namespaced IDs (e.g., `app_setup/cron`) and their content
//! references resolve inside the recipe directory.

use super::error::{Error, Result};
use super::types::{Binding, MachineTarget, RecetaConfig, RecipeRef, Resource};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// File name of the recipe manifest inside a recipe directory.
pub const RECIPE_FILE: &str = "recipe.yaml";

/// A recipe file: declared inputs and resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeFile {
    pub recipe: RecipeMetadata,
    #[serde(default)]
    pub resources: IndexMap<String, Resource>,
}

/// Recipe metadata and input declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeMetadata {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, RecipeInput>,
}

/// A recipe input declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeInput {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<serde_yaml_ng::Value>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub choices: Vec<String>,
}

/// Load a recipe from its directory.
pub fn load_recipe(dir: &Path) -> Result<RecipeFile> {
    let path = dir.join(RECIPE_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::Resolution(format!("cannot read recipe {}: {}", path.display(), e))
    })?;
    parse_recipe(&content).map_err(|e| match e {
        Error::Parse { message, .. } => Error::Parse {
            origin: path.display().to_string(),
            message,
        },
        other => other,
    })
}

/// Parse a recipe from a YAML string.
pub fn parse_recipe(yaml: &str) -> Result<RecipeFile> {
    serde_yaml_ng::from_str(yaml).map_err(|e| Error::Parse {
        origin: "recipe".to_string(),
        message: e.to_string(),
    })
}

/// Validate recipe inputs against their declarations.
pub fn validate_inputs(
    recipe: &RecipeMetadata,
    provided: &HashMap<String, serde_yaml_ng::Value>,
) -> Result<HashMap<String, String>> {
    let mut resolved = HashMap::new();

    for name in provided.keys() {
        if !recipe.inputs.contains_key(name) {
            return Err(Error::Config(format!(
                "recipe '{}' has no input '{}'",
                recipe.name, name
            )));
        }
    }

    for (name, decl) in &recipe.inputs {
        let value = if let Some(v) = provided.get(name) {
            v.clone()
        } else if let Some(ref default) = decl.default {
            default.clone()
        } else {
            return Err(Error::Config(format!(
                "recipe '{}' requires input '{}' (type: {})",
                recipe.name, name, decl.input_type
            )));
        };

        let string_val = validate_input_type(name, &value, decl)?;
        resolved.insert(name.clone(), string_val);
    }

    Ok(resolved)
}

/// Validate a single input value against its declared type.
fn validate_input_type(
    name: &str,
    value: &serde_yaml_ng::Value,
    decl: &RecipeInput,
) -> Result<String> {
    let invalid = |what: String| Error::Config(format!("input '{}' {}", name, what));

    match decl.input_type.as_str() {
        "string" => match value {
            serde_yaml_ng::Value::String(s) => Ok(s.clone()),
            serde_yaml_ng::Value::Number(n) => Ok(n.to_string()),
            serde_yaml_ng::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(invalid("must be a string".to_string())),
        },
        "int" => {
            let n = match value {
                serde_yaml_ng::Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| invalid("must be an integer".to_string()))?,
                _ => return Err(invalid("must be an integer".to_string())),
            };
            if let Some(min) = decl.min {
                if n < min {
                    return Err(invalid(format!("must be >= {}", min)));
                }
            }
            if let Some(max) = decl.max {
                if n > max {
                    return Err(invalid(format!("must be <= {}", max)));
                }
            }
            Ok(n.to_string())
        }
        "bool" => match value {
            serde_yaml_ng::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(invalid("must be a boolean".to_string())),
        },
        "path" => match value {
            serde_yaml_ng::Value::String(s) if s.starts_with('/') => Ok(s.clone()),
            serde_yaml_ng::Value::String(_) => Err(invalid("must be an absolute path".to_string())),
            _ => Err(invalid("must be a path string".to_string())),
        },
        "enum" => match value {
            serde_yaml_ng::Value::String(s) => {
                if !decl.choices.is_empty() && !decl.choices.contains(s) {
                    return Err(invalid(format!(
                        "must be one of: {}",
                        decl.choices.join(", ")
                    )));
                }
                Ok(s.clone())
            }
            _ => Err(invalid("must be a string".to_string())),
        },
        other => Err(Error::Config(format!(
            "unknown input type '{}' for '{}'",
            other, name
        ))),
    }
}

/// Resolve `{{inputs.X}}` templates in a string.
fn resolve_input_template(template: &str, inputs: &HashMap<String, String>) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{inputs.") {
        let open = start + open;
        let close = result[open..].find("}}").ok_or_else(|| {
            Error::Binding(format!("unclosed input placeholder at position {}", open))
        })?;
        let close = open + close + 2;
        let key = result[open + 9..close - 2].trim();

        let value = inputs
            .get(key)
            .ok_or_else(|| Error::Binding(format!("unknown input: {}", key)))?
            .clone();

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

fn resolve_opt(field: &Option<String>, inputs: &HashMap<String, String>) -> Result<Option<String>> {
    field
        .as_deref()
        .map(|s| resolve_input_template(s, inputs))
        .transpose()
}

/// Resolve input templates in all string fields of a resource.
fn resolve_resource_inputs(
    resource: &Resource,
    inputs: &HashMap<String, String>,
) -> Result<Resource> {
    let mut r = resource.clone();

    r.path = resolve_opt(&r.path, inputs)?;
    r.content = resolve_opt(&r.content, inputs)?;
    r.source = resolve_opt(&r.source, inputs)?;
    r.owner = resolve_opt(&r.owner, inputs)?;
    r.group = resolve_opt(&r.group, inputs)?;
    r.mode = resolve_opt(&r.mode, inputs)?;
    r.packages = r
        .packages
        .iter()
        .map(|p| resolve_input_template(p, inputs))
        .collect::<Result<Vec<_>>>()?;

    for binding in r.variables.values_mut() {
        if let Binding::Literal(serde_yaml_ng::Value::String(s)) = binding {
            *s = resolve_input_template(s, inputs)?;
        }
    }

    Ok(r)
}

/// Namespace a dependency if it names a resource inside the recipe.
fn namespace_dep(recipe_id: &str, recipe_file: &RecipeFile, dep: &str) -> String {
    if recipe_file.resources.contains_key(dep) {
        format!("{}/{}", recipe_id, dep)
    } else {
        dep.to_string()
    }
}

/// Expand a recipe instance into namespaced resources.
///
/// Every expanded resource targets `machine` and resolves content under
/// `content_root`. Resources with no dependency inside the recipe also get
/// `external_depends_on`, so nothing in the recipe runs before them.
pub fn expand_recipe(
    recipe_id: &str,
    recipe_file: &RecipeFile,
    machine: &MachineTarget,
    provided_inputs: &HashMap<String, serde_yaml_ng::Value>,
    external_depends_on: &[String],
    content_root: &Path,
) -> Result<IndexMap<String, Resource>> {
    let resolved_inputs = validate_inputs(&recipe_file.recipe, provided_inputs)?;

    let mut expanded = IndexMap::new();

    for (res_name, resource) in &recipe_file.resources {
        let namespaced_id = format!("{}/{}", recipe_id, res_name);

        let mut resolved = resolve_resource_inputs(resource, &resolved_inputs)?;
        resolved.machine = machine.clone();
        resolved.content_root = Some(content_root.to_path_buf());

        let internal_root = !resolved
            .depends_on
            .iter()
            .any(|d| recipe_file.resources.contains_key(d));

        let mut deps: Vec<String> = resolved
            .depends_on
            .iter()
            .map(|dep| namespace_dep(recipe_id, recipe_file, dep))
            .collect();
        if internal_root {
            deps.extend(external_depends_on.iter().cloned());
        }
        resolved.depends_on = deps;

        expanded.insert(namespaced_id, resolved);
    }

    Ok(expanded)
}

/// Load and expand one recipe reference relative to the project root.
pub fn expand_reference(
    recipe_id: &str,
    reference: &RecipeRef,
    project_root: &Path,
) -> Result<IndexMap<String, Resource>> {
    let dir = project_root.join(&reference.path);
    let recipe_file = load_recipe(&dir)?;
    log::debug!(
        "expanding recipe {} ({}) from {}: {} resource(s)",
        recipe_id,
        recipe_file.recipe.name,
        dir.display(),
        recipe_file.resources.len()
    );
    expand_recipe(
        recipe_id,
        &recipe_file,
        &reference.machine,
        &reference.inputs,
        &reference.depends_on,
        &dir,
    )
}

/// Expand every recipe in the config into its resource map.
pub fn expand_all(config: &mut RecetaConfig, project_root: &Path) -> Result<()> {
    let recipes = config.recipes.clone();
    for (recipe_id, reference) in &recipes {
        for (id, resource) in expand_reference(recipe_id, reference, project_root)? {
            if config.resources.contains_key(&id) {
                return Err(Error::Config(format!(
                    "recipe '{}' expands to '{}', which is already declared",
                    recipe_id, id
                )));
            }
            config.resources.insert(id, resource);
        }
    }
    Ok(())
}
