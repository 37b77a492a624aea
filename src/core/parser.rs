//! YAML parsing and validation.
//!
//! Parses receta.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Machine references in resources and recipes must exist
//! - depends_on references must exist
//! - Required fields and value syntax per resource type

use super::error::{Error, Result};
use super::recipe;
use super::types::*;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static MODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-7]{3,4}$").expect("static regex"));
static PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9+.-]+$").expect("static regex"));
static IDENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]*\$?$|^[0-9]+$").expect("static regex"));

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a receta.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<RecetaConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Parse {
        origin: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_config(&content).map_err(|e| match e {
        Error::Parse { message, .. } => Error::Parse {
            origin: path.display().to_string(),
            message,
        },
        other => other,
    })
}

/// Parse a receta.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<RecetaConfig> {
    serde_yaml_ng::from_str(yaml).map_err(|e| Error::Parse {
        origin: "receta.yaml".to_string(),
        message: e.to_string(),
    })
}

/// Parse a config file, attach content roots and expand its recipes.
///
/// Inline resources resolve content under the config's directory; recipe
/// resources under their recipe directory.
pub fn load_config(path: &Path) -> Result<RecetaConfig> {
    let mut config = parse_config_file(path)?;
    let project_root = project_root(path);

    for resource in config.resources.values_mut() {
        resource.content_root = Some(project_root.to_path_buf());
    }
    recipe::expand_all(&mut config, project_root)?;

    log::debug!(
        "loaded {} from {}: {} machine(s), {} recipe(s), {} resource(s)",
        config.name,
        path.display(),
        config.machines.len(),
        config.recipes.len(),
        config.resources.len()
    );
    Ok(config)
}

/// Directory a config file lives in.
pub fn project_root(config_path: &Path) -> &Path {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Load and validate; validation failures become `Error::Validation`.
pub fn load_and_validate(path: &Path) -> Result<RecetaConfig> {
    let config = load_config(path)?;
    let errors = validate_config(&config);
    if errors.is_empty() {
        Ok(config)
    } else {
        Err(Error::Validation(
            errors.into_iter().map(|e| e.message).collect(),
        ))
    }
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &RecetaConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut err = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        err(format!(
            "version must be \"1.0\", got \"{}\"",
            config.version
        ));
    }

    if config.name.is_empty() {
        err("name must not be empty".to_string());
    }

    for (id, reference) in &config.recipes {
        for machine_name in reference.machine.to_vec() {
            if !known_machine(config, &machine_name) {
                err(format!(
                    "recipe '{}' references unknown machine '{}'",
                    id, machine_name
                ));
            }
        }
    }

    for (id, resource) in &config.resources {
        for machine_name in resource.machine.to_vec() {
            if !known_machine(config, &machine_name) {
                err(format!(
                    "resource '{}' references unknown machine '{}'",
                    id, machine_name
                ));
            }
        }

        for dep in &resource.depends_on {
            if dep == id {
                err(format!("resource '{}' depends on itself", id));
            } else if !config.resources.contains_key(dep) {
                err(format!(
                    "resource '{}' depends on unknown resource '{}'",
                    id, dep
                ));
            }
        }

        for message in validate_resource(id, resource) {
            err(message);
        }
    }

    errors
}

fn known_machine(config: &RecetaConfig, name: &str) -> bool {
    name == "localhost" || config.machines.contains_key(name)
}

/// Type-specific checks for one resource.
fn validate_resource(id: &str, resource: &Resource) -> Vec<String> {
    let mut errors = Vec::new();

    match resource.resource_type {
        ResourceType::Package => {
            if resource.packages.is_empty() {
                errors.push(format!("resource '{}' (package) has no packages", id));
            }
            if let Some(ref provider) = resource.provider {
                if provider != "apt" {
                    errors.push(format!(
                        "resource '{}' (package) has unsupported provider '{}'",
                        id, provider
                    ));
                }
            }
            for pkg in &resource.packages {
                if !pkg.contains("{{") && !PACKAGE_RE.is_match(pkg) {
                    errors.push(format!(
                        "resource '{}' (package) has invalid package name '{}'",
                        id, pkg
                    ));
                }
            }
            match resource.state.as_deref() {
                None | Some("present") | Some("absent") => {}
                Some(other) => errors.push(format!(
                    "resource '{}' (package) has invalid state '{}' (expected present or absent)",
                    id, other
                )),
            }
        }
        ResourceType::File => {
            check_path(id, "file", resource, &mut errors);
            if resource.file_action() == FileAction::Create {
                match (&resource.source, &resource.content) {
                    (Some(_), Some(_)) => errors.push(format!(
                        "resource '{}' (file) has both source and content",
                        id
                    )),
                    (None, None) => errors.push(format!(
                        "resource '{}' (file) needs source or content",
                        id
                    )),
                    _ => {}
                }
            }
        }
        ResourceType::Template => {
            check_path(id, "template", resource, &mut errors);
            match resource.file_action() {
                FileAction::Touch => errors.push(format!(
                    "resource '{}' (template) does not support action touch",
                    id
                )),
                FileAction::Create if resource.source.is_none() => errors.push(format!(
                    "resource '{}' (template) has no source",
                    id
                )),
                _ => {}
            }
        }
    }

    if matches!(
        resource.resource_type,
        ResourceType::File | ResourceType::Template
    ) {
        if let Some(ref mode) = resource.mode {
            if !mode.contains("{{") && !MODE_RE.is_match(mode) {
                errors.push(format!(
                    "resource '{}' has invalid mode '{}' (expected 3-4 octal digits)",
                    id, mode
                ));
            }
        }
        for (field, value) in [("owner", &resource.owner), ("group", &resource.group)] {
            if let Some(name) = value {
                if !name.contains("{{") && !IDENTITY_RE.is_match(name) {
                    errors.push(format!(
                        "resource '{}' has invalid {} '{}'",
                        id, field, name
                    ));
                }
            }
        }
    }

    errors
}

fn check_path(id: &str, kind: &str, resource: &Resource, errors: &mut Vec<String>) {
    match resource.path.as_deref() {
        None => errors.push(format!("resource '{}' ({}) has no path", id, kind)),
        Some(p) if !p.starts_with('/') && !p.starts_with("{{") => errors.push(format!(
            "resource '{}' ({}) path '{}' must be absolute",
            id, kind, p
        )),
        Some(p) if p == "/" => errors.push(format!(
            "resource '{}' ({}) path must not be /",
            id, kind
        )),
        _ => {}
    }
}
