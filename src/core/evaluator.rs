//! Per-machine evaluation of resource declarations.
//!
//! Evaluation resolves `{{params.*}}`/`{{machine.*}}` in declaration fields,
//! loads file content, renders templates and captures generated values. The
//! result is what the planner hashes and the executor deploys. Errors are
//! kept per resource so one bad template does not hide the rest of the plan.

use super::error::Result;
use super::resolver::{resolve_resource_templates, TemplateContext};
use super::types::{FileAction, RecetaConfig, ResolvedResource, Resource, ResourceType};
use super::values::ValueProvider;
use crate::resources::{file, template};
use indexmap::IndexMap;

/// Evaluated resources for one machine, in execution order.
#[derive(Debug)]
pub struct Evaluation {
    pub machine: String,
    pub resources: IndexMap<String, Result<ResolvedResource>>,
}

impl Evaluation {
    /// Resources that evaluated cleanly.
    pub fn resolved(&self) -> impl Iterator<Item = &ResolvedResource> {
        self.resources.values().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> usize {
        self.resources.values().filter(|r| r.is_err()).count()
    }
}

/// Evaluate one resource for one machine.
pub fn evaluate_resource(
    config: &RecetaConfig,
    machine: &str,
    id: &str,
    resource: &Resource,
    values: &mut dyn ValueProvider,
) -> Result<ResolvedResource> {
    let ctx = TemplateContext::new(config);
    let resolved = resolve_resource_templates(resource, &ctx)?;

    let mut payload = None;
    let mut generated = IndexMap::new();

    match (&resolved.resource_type, resolved.file_action()) {
        (ResourceType::Package, _)
        | (_, FileAction::Delete)
        | (ResourceType::File, FileAction::Touch) => {}
        (ResourceType::File, FileAction::Create) => {
            payload = Some(file::load_payload(&resolved)?);
        }
        (ResourceType::Template, _) => {
            let rendered = template::render(machine, id, &resolved, &ctx, values)?;
            payload = Some(rendered.text.into_bytes());
            generated = rendered.generated;
        }
    }

    Ok(ResolvedResource {
        id: id.to_string(),
        resource: resolved,
        payload,
        generated,
    })
}

/// Evaluate every resource in `order` that targets `machine`.
pub fn evaluate_machine(
    config: &RecetaConfig,
    machine: &str,
    order: &[String],
    values: &mut dyn ValueProvider,
) -> Evaluation {
    let mut resources = IndexMap::new();

    for id in order {
        let Some(resource) = config.resources.get(id) else {
            continue;
        };
        if !resource.machine.to_vec().iter().any(|m| m == machine) {
            continue;
        }
        let result = evaluate_resource(config, machine, id, resource, values);
        if let Err(ref e) = result {
            log::warn!("{}: cannot evaluate {}: {} ({})", machine, id, e, e.category());
        }
        resources.insert(id.clone(), result);
    }

    log::debug!(
        "{}: evaluated {} resource(s), {} failed",
        machine,
        resources.len(),
        resources.values().filter(|r| r.is_err()).count()
    );

    Evaluation {
        machine: machine.to_string(),
        resources,
    }
}

/// Machines targeted by at least one resource, in first-seen order.
pub fn target_machines(config: &RecetaConfig) -> Vec<String> {
    let mut machines: Vec<String> = Vec::new();
    for resource in config.resources.values() {
        for m in resource.machine.to_vec() {
            if !machines.contains(&m) {
                machines.push(m);
            }
        }
    }
    machines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{Error, ErrorCategory};
    use crate::core::values::{is_uuid, RandomValues, SeededValues};
    use std::path::Path;

    fn project(dir: &Path) -> RecetaConfig {
        std::fs::create_dir_all(dir.join("files")).unwrap();
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(dir.join("files/qux.txt"), "static\n").unwrap();
        std::fs::write(dir.join("templates/qux.txt.tmpl"), "{{params.app}} {{var}}\n").unwrap();
        std::fs::write(dir.join("templates/broken.tmpl"), "{{nope}}").unwrap();

        let yaml = r#"
version: "1.0"
name: eval
params:
  app: demo
machines:
  web:
    hostname: web
    addr: 10.0.0.1
resources:
  cron:
    type: package
    packages: [cron]
  app-setup:
    type: file
    path: /app_setup.txt
    source: qux.txt
  qux:
    type: template
    path: /qux.txt
    source: qux.txt.tmpl
    variables:
      var: { generate: uuid }
  broken:
    type: template
    path: /broken.txt
    source: broken.tmpl
  remote-only:
    type: file
    machine: web
    path: /etc/motd
    content: "hello {{params.app}}"
"#;
        let mut config: RecetaConfig = serde_yaml_ng::from_str(yaml).unwrap();
        for r in config.resources.values_mut() {
            r.content_root = Some(dir.to_path_buf());
        }
        config
    }

    fn order(config: &RecetaConfig) -> Vec<String> {
        config.resources.keys().cloned().collect()
    }

    #[test]
    fn test_evaluate_machine_filters_and_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());
        let eval = evaluate_machine(&config, "localhost", &order(&config), &mut RandomValues);

        assert_eq!(eval.machine, "localhost");
        assert!(!eval.resources.contains_key("remote-only"));
        assert_eq!(eval.failures(), 1);

        let cron = eval.resources["cron"].as_ref().unwrap();
        assert!(cron.payload.is_none());

        let file = eval.resources["app-setup"].as_ref().unwrap();
        assert_eq!(file.payload.as_deref(), Some(b"static\n".as_slice()));

        let qux = eval.resources["qux"].as_ref().unwrap();
        let text = String::from_utf8(qux.payload.clone().unwrap()).unwrap();
        let uuid = text.trim().strip_prefix("demo ").unwrap();
        assert!(is_uuid(uuid));
        assert_eq!(qux.generated["var"], uuid);

        let broken = eval.resources["broken"].as_ref().unwrap_err();
        assert_eq!(broken.category(), ErrorCategory::Binding);
    }

    #[test]
    fn test_inline_content_resolves_params() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());
        let eval = evaluate_machine(&config, "web", &order(&config), &mut RandomValues);
        assert_eq!(eval.resources.len(), 1);
        let motd = eval.resources["remote-only"].as_ref().unwrap();
        assert_eq!(motd.payload.as_deref(), Some(b"hello demo".as_slice()));
    }

    #[test]
    fn test_seeded_evaluation_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());
        let ids = order(&config);
        let a = evaluate_machine(&config, "localhost", &ids, &mut SeededValues::new("x"));
        let b = evaluate_machine(&config, "localhost", &ids, &mut SeededValues::new("x"));
        let pa = &a.resources["qux"].as_ref().unwrap().payload;
        let pb = &b.resources["qux"].as_ref().unwrap().payload;
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_missing_source_is_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = project(dir.path());
        config.resources["app-setup"].source = Some("gone.txt".to_string());
        let r = &config.resources["app-setup"];
        let err = evaluate_resource(&config, "localhost", "app-setup", r, &mut RandomValues)
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_delete_needs_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = project(dir.path());
        let r = &mut config.resources["qux"];
        r.action = Some(FileAction::Delete);
        r.source = Some("not-there.tmpl".to_string());
        let r = config.resources["qux"].clone();
        let resolved =
            evaluate_resource(&config, "localhost", "qux", &r, &mut RandomValues).unwrap();
        assert!(resolved.payload.is_none());
        assert!(resolved.generated.is_empty());
    }

    #[test]
    fn test_target_machines() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());
        assert_eq!(target_machines(&config), vec!["localhost", "web"]);
    }
}
