//! Template resource handler.
//!
//! A template is rendered on the control side and deployed through the
//! file write path, so scripts here delegate to [`super::file`].

use super::file;
use crate::core::content::ContentStore;
use crate::core::error::{Error, Result};
use crate::core::resolver::{resolve_template, TemplateContext};
use crate::core::types::{yaml_value_to_string, Binding, Resource};
use crate::core::values::{ValueKey, ValueProvider};
use indexmap::IndexMap;
use std::path::Path;

/// A rendered template and the generated values it consumed.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub generated: IndexMap<String, String>,
}

/// Resolve bindings to strings, asking `values` for generated ones.
pub fn bind_variables(
    machine: &str,
    resource_id: &str,
    resource: &Resource,
    values: &mut dyn ValueProvider,
) -> (IndexMap<String, String>, IndexMap<String, String>) {
    let mut vars = IndexMap::new();
    let mut generated = IndexMap::new();

    for (name, binding) in &resource.variables {
        let value = match binding {
            Binding::Literal(v) => yaml_value_to_string(v),
            Binding::Generated { generate } => {
                let key = ValueKey {
                    machine,
                    resource: resource_id,
                    name,
                };
                let v = values.generate(&key, generate);
                generated.insert(name.clone(), v.clone());
                v
            }
        };
        vars.insert(name.clone(), value);
    }

    (vars, generated)
}

/// Render a template resource for one machine.
pub fn render(
    machine: &str,
    resource_id: &str,
    resource: &Resource,
    ctx: &TemplateContext<'_>,
    values: &mut dyn ValueProvider,
) -> Result<Rendered> {
    let source = resource
        .source
        .as_deref()
        .ok_or_else(|| Error::Config(format!("template '{}' has no source", resource_id)))?;
    let root = resource.content_root.as_deref().unwrap_or(Path::new("."));
    let body = ContentStore::new(root).read_template(source)?;

    let (vars, generated) = bind_variables(machine, resource_id, resource, values);
    let text = resolve_template(&body, &ctx.with_vars(&vars)).map_err(|e| match e {
        Error::Binding(msg) => Error::Binding(format!("{} in template '{}'", msg, source)),
        other => other,
    })?;

    Ok(Rendered { text, generated })
}

pub fn check_script(resource: &Resource) -> Result<String> {
    file::check_script(resource)
}

pub fn apply_script(resource: &Resource, payload: Option<&[u8]>) -> Result<String> {
    file::apply_script(resource, payload)
}

pub fn state_query_script(resource: &Resource) -> Result<String> {
    file::state_query_script(resource)
}
