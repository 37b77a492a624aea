//! Configuration, lock and provenance types.
//!
//! Defines the YAML schema for `receta.yaml`, machines, resources, policy,
//! state locks and provenance events. All persisted types derive
//! Serialize/Deserialize for YAML roundtripping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Top-level receta.yaml
// ============================================================================

/// Root configuration: the desired state of a set of machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecetaConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable project name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Global parameters (templatable)
    #[serde(default)]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Machine inventory
    #[serde(default)]
    pub machines: IndexMap<String, Machine>,

    /// Recipe instances, expanded into namespaced resources on load
    #[serde(default)]
    pub recipes: IndexMap<String, RecipeRef>,

    /// Resource declarations (order-preserving)
    #[serde(default)]
    pub resources: IndexMap<String, Resource>,

    /// Execution policy
    #[serde(default)]
    pub policy: Policy,
}

// ============================================================================
// Machines
// ============================================================================

/// A managed machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Machine hostname
    pub hostname: String,

    /// Network address (IP or DNS)
    pub addr: String,

    /// SSH user
    #[serde(default = "default_user")]
    pub user: String,

    /// CPU architecture
    #[serde(default = "default_arch")]
    pub arch: String,

    /// Path to SSH private key
    #[serde(default)]
    pub ssh_key: Option<String>,

    /// Roles for this machine (informational)
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Machine {
    /// The implicit `localhost` machine used when a resource targets it
    /// without an inventory entry.
    pub fn localhost() -> Self {
        Self {
            hostname: "localhost".to_string(),
            addr: "127.0.0.1".to_string(),
            user: default_user(),
            arch: default_arch(),
            ssh_key: None,
            roles: vec![],
        }
    }
}

fn default_user() -> String {
    "root".to_string()
}

fn default_arch() -> String {
    "x86_64".to_string()
}

// ============================================================================
// Recipes
// ============================================================================

/// A recipe instance in `receta.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRef {
    /// Recipe directory, relative to the project root
    pub path: String,

    /// Target machine(s) for every resource in the recipe
    #[serde(default)]
    pub machine: MachineTarget,

    /// Input values
    #[serde(default)]
    pub inputs: HashMap<String, serde_yaml_ng::Value>,

    /// Resources the recipe's first resource depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
}

// ============================================================================
// Resources
// ============================================================================

/// A single resource declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Target machine(s) — single name or list
    #[serde(default)]
    pub machine: MachineTarget,

    /// Package state (present/absent)
    #[serde(default)]
    pub state: Option<String>,

    /// Dependencies (other resource IDs that must be applied first)
    #[serde(default)]
    pub depends_on: Vec<String>,

    // -- Package fields --
    /// Package provider (apt)
    #[serde(default)]
    pub provider: Option<String>,

    /// Package list
    #[serde(default)]
    pub packages: Vec<String>,

    // -- File / template fields --
    /// Target path
    #[serde(default)]
    pub path: Option<String>,

    /// Inline file content
    #[serde(default)]
    pub content: Option<String>,

    /// Content reference (`files/` for file, `templates/` for template)
    #[serde(default)]
    pub source: Option<String>,

    /// File owner
    #[serde(default)]
    pub owner: Option<String>,

    /// File group
    #[serde(default)]
    pub group: Option<String>,

    /// File mode (e.g., "0644")
    #[serde(default)]
    pub mode: Option<String>,

    /// File action (create/delete/touch)
    #[serde(default)]
    pub action: Option<FileAction>,

    /// Template variable bindings
    #[serde(default)]
    pub variables: IndexMap<String, Binding>,

    /// Directory holding `files/` and `templates/` for this resource.
    /// Set on load: the project root for inline resources, the recipe
    /// directory for expanded ones.
    #[serde(skip)]
    pub content_root: Option<PathBuf>,
}

impl Resource {
    /// An empty declaration of the given type targeting `localhost`.
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            machine: MachineTarget::default(),
            state: None,
            depends_on: vec![],
            provider: None,
            packages: vec![],
            path: None,
            content: None,
            source: None,
            owner: None,
            group: None,
            mode: None,
            action: None,
            variables: IndexMap::new(),
            content_root: None,
        }
    }

    /// Effective file action (create when unset).
    pub fn file_action(&self) -> FileAction {
        self.action.clone().unwrap_or_default()
    }

    /// Whether this declaration removes what it manages.
    pub fn is_removal(&self) -> bool {
        match self.resource_type {
            ResourceType::Package => self.state.as_deref() == Some("absent"),
            ResourceType::File | ResourceType::Template => {
                self.file_action() == FileAction::Delete
            }
        }
    }
}

/// Resource type enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Package,
    File,
    Template,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package => write!(f, "package"),
            Self::File => write!(f, "file"),
            Self::Template => write!(f, "template"),
        }
    }
}

/// What a file or template declaration does with its target path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    /// Write content, then apply ownership and mode
    #[default]
    Create,
    /// Remove the path if present
    Delete,
    /// Create empty if missing, bump mtime, apply ownership and mode
    Touch,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
            Self::Touch => write!(f, "touch"),
        }
    }
}

/// A template variable binding, literal or generated at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Generated { generate: Generator },
    Literal(serde_yaml_ng::Value),
}

/// Value generators available to bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    Uuid,
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid => write!(f, "uuid"),
        }
    }
}

/// Machine target — single machine or multiple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MachineTarget {
    Single(String),
    Multiple(Vec<String>),
}

impl Default for MachineTarget {
    fn default() -> Self {
        Self::Single("localhost".to_string())
    }
}

impl MachineTarget {
    /// Expand to a list of machine names.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(v) => v.clone(),
        }
    }
}

/// A resource after evaluation for one machine: templated fields resolved,
/// content loaded or rendered, generated values captured.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub id: String,
    pub resource: Resource,
    /// Bytes to write for file/template create
    pub payload: Option<Vec<u8>>,
    /// Values produced by generators, keyed by variable name
    pub generated: IndexMap<String, String>,
}

// ============================================================================
// Policy
// ============================================================================

/// Execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Failure handling
    #[serde(default)]
    pub failure: FailurePolicy,

    /// Write provenance events on every apply
    #[serde(default = "default_true")]
    pub tripwire: bool,

    /// Persist BLAKE3 state after apply
    #[serde(default = "default_true")]
    pub lock_file: bool,

    /// How generated binding values are produced across runs
    #[serde(default)]
    pub generated_values: ValuePolicy,

    /// Seed for `generated_values: seeded`
    #[serde(default)]
    pub seed: Option<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            failure: FailurePolicy::default(),
            tripwire: true,
            lock_file: true,
            generated_values: ValuePolicy::default(),
            seed: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Failure handling strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    StopOnFirst,
    ContinueIndependent,
}

/// Generated value policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuePolicy {
    /// Fresh value on every evaluation
    #[default]
    Regenerate,
    /// Reuse the value recorded in the lock file
    Stable,
    /// Derive deterministically from `policy.seed`
    Seeded,
}

impl fmt::Display for ValuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regenerate => write!(f, "regenerate"),
            Self::Stable => write!(f, "stable"),
            Self::Seeded => write!(f, "seeded"),
        }
    }
}

impl std::str::FromStr for ValuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regenerate" => Ok(Self::Regenerate),
            "stable" => Ok(Self::Stable),
            "seeded" => Ok(Self::Seeded),
            other => Err(format!(
                "unknown value policy '{}' (expected regenerate, stable or seeded)",
                other
            )),
        }
    }
}

// ============================================================================
// State / Lock file
// ============================================================================

/// Per-machine state lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateLock {
    /// Schema version
    pub schema: String,

    /// Machine name
    pub machine: String,

    /// Machine hostname
    pub hostname: String,

    /// When the lock was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// BLAKE3 version
    pub blake3_version: String,

    /// Per-resource state
    pub resources: IndexMap<String, ResourceLock>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Resource type
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Convergence status
    pub status: ResourceStatus,

    /// When the resource was last applied
    #[serde(default)]
    pub applied_at: Option<String>,

    /// Duration of last apply in seconds
    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// BLAKE3 hash of the resource's desired state
    pub hash: String,

    /// Resource-specific details
    #[serde(default)]
    pub details: HashMap<String, serde_yaml_ng::Value>,

    /// Generated binding values from the last apply
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub generated: IndexMap<String, String>,
}

/// Resource convergence status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Converged,
    Failed,
    Drifted,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "CONVERGED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Drifted => write!(f, "DRIFTED"),
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Action to take on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    Destroy,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Destroy => write!(f, "DESTROY"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    /// Resource ID
    pub resource_id: String,

    /// Target machine
    pub machine: String,

    /// Resource type
    pub resource_type: ResourceType,

    /// Action to take
    pub action: PlanAction,

    /// Human-readable description
    pub description: String,
}

/// Full execution plan.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Config name
    pub name: String,

    /// Planned changes grouped by machine
    pub changes: Vec<PlannedChange>,

    /// Topological execution order (resource IDs)
    pub execution_order: Vec<String>,

    /// Summary counts
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub unchanged: u32,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    ApplyStarted {
        machine: String,
        run_id: String,
        receta_version: String,
    },
    ResourceStarted {
        machine: String,
        resource: String,
        action: String,
    },
    ResourceConverged {
        machine: String,
        resource: String,
        duration_seconds: f64,
        hash: String,
    },
    ResourceFailed {
        machine: String,
        resource: String,
        category: String,
        error: String,
    },
    ApplyCompleted {
        machine: String,
        run_id: String,
        resources_converged: u32,
        resources_unchanged: u32,
        resources_failed: u32,
        total_seconds: f64,
    },
    DriftDetected {
        machine: String,
        resource: String,
        expected_hash: String,
        actual_hash: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

// ============================================================================
// Apply result
// ============================================================================

/// Per-resource outcome reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Converged,
    /// Already compliant, nothing to do
    Unchanged,
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Unchanged => write!(f, "already compliant"),
            Self::Failed(e) => write!(f, "FAILED: {}", e),
        }
    }
}

/// Result of applying to a single machine.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub machine: String,
    pub resources_converged: u32,
    pub resources_unchanged: u32,
    pub resources_failed: u32,
    pub outcomes: IndexMap<String, Outcome>,
    pub total_duration: std::time::Duration,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse() {
        let yaml = r#"
version: "1.0"
name: testproject
params:
  app: demo
machines:
  web:
    hostname: web-01
    addr: 10.0.0.5
    user: deploy
resources:
  cron:
    type: package
    machine: web
    packages: [cron]
policy:
  failure: stop_on_first
  generated_values: stable
"#;
        let config: RecetaConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.name, "testproject");
        assert_eq!(config.machines["web"].user, "deploy");
        assert_eq!(
            config.resources["cron"].resource_type,
            ResourceType::Package
        );
        assert_eq!(config.policy.generated_values, ValuePolicy::Stable);
        assert!(config.recipes.is_empty());
    }

    #[test]
    fn test_machine_defaults() {
        let yaml = r#"
hostname: test
addr: 1.2.3.4
"#;
        let m: Machine = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(m.user, "root");
        assert_eq!(m.arch, "x86_64");
        assert!(m.roles.is_empty());
    }

    #[test]
    fn test_machine_target_multiple() {
        let t: MachineTarget = serde_yaml_ng::from_str("[intel, jetson]").unwrap();
        assert_eq!(t.to_vec(), vec!["intel", "jetson"]);
        assert_eq!(MachineTarget::default().to_vec(), vec!["localhost"]);
    }

    #[test]
    fn test_file_resource_parse() {
        let yaml = r#"
type: file
path: /app_setup.txt
source: app_setup/qux.txt
owner: root
group: root
mode: "0777"
action: create
"#;
        let r: Resource = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(r.resource_type, ResourceType::File);
        assert_eq!(r.file_action(), FileAction::Create);
        assert_eq!(r.mode.as_deref(), Some("0777"));
        assert!(r.content_root.is_none());
    }

    #[test]
    fn test_binding_parse() {
        let yaml = r#"
type: template
path: /qux.txt
source: app_setup/qux.txt.tmpl
variables:
  var: { generate: uuid }
  greeting: hello
  port: 8080
"#;
        let r: Resource = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(
            r.variables["var"],
            Binding::Generated {
                generate: Generator::Uuid
            }
        );
        assert_eq!(
            r.variables["greeting"],
            Binding::Literal(serde_yaml_ng::Value::String("hello".into()))
        );
        assert!(matches!(r.variables["port"], Binding::Literal(_)));
    }

    #[test]
    fn test_unknown_generator_rejected_as_literal() {
        // An unknown generator is not a Generated binding; it stays a literal map
        let b: Binding = serde_yaml_ng::from_str("{ generate: dice }").unwrap();
        assert!(matches!(b, Binding::Literal(_)));
    }

    #[test]
    fn test_is_removal() {
        let mut pkg = Resource::new(ResourceType::Package);
        assert!(!pkg.is_removal());
        pkg.state = Some("absent".to_string());
        assert!(pkg.is_removal());

        let mut file = Resource::new(ResourceType::File);
        assert!(!file.is_removal());
        file.action = Some(FileAction::Delete);
        assert!(file.is_removal());
    }

    #[test]
    fn test_policy_defaults() {
        let p = Policy::default();
        assert_eq!(p.failure, FailurePolicy::StopOnFirst);
        assert_eq!(p.generated_values, ValuePolicy::Regenerate);
        assert!(p.tripwire);
        assert!(p.lock_file);
        assert!(p.seed.is_none());
    }

    #[test]
    fn test_value_policy_from_str() {
        assert_eq!("stable".parse::<ValuePolicy>().unwrap(), ValuePolicy::Stable);
        assert_eq!("seeded".parse::<ValuePolicy>().unwrap(), ValuePolicy::Seeded);
        assert!("sometimes".parse::<ValuePolicy>().is_err());
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(ResourceType::Template.to_string(), "template");
        assert_eq!(FileAction::Touch.to_string(), "touch");
        assert_eq!(ResourceStatus::Drifted.to_string(), "DRIFTED");
        assert_eq!(PlanAction::NoOp.to_string(), "NO-OP");
        assert_eq!(Outcome::Unchanged.to_string(), "already compliant");
        assert_eq!(Outcome::Failed("x".into()).to_string(), "FAILED: x");
    }

    #[test]
    fn test_state_lock_roundtrip_with_generated() {
        let lock = StateLock {
            schema: "1.0".to_string(),
            machine: "web".to_string(),
            hostname: "web-01".to_string(),
            generated_at: "2026-10-19T14:00:00Z".to_string(),
            generator: "receta 0.3.0".to_string(),
            blake3_version: "1.8".to_string(),
            resources: IndexMap::from([(
                "app_setup/qux".to_string(),
                ResourceLock {
                    resource_type: ResourceType::Template,
                    status: ResourceStatus::Converged,
                    applied_at: Some("2026-10-19T14:00:01Z".to_string()),
                    duration_seconds: Some(0.2),
                    hash: "blake3:abc123".to_string(),
                    details: HashMap::new(),
                    generated: IndexMap::from([(
                        "var".to_string(),
                        "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
                    )]),
                },
            )]),
        };
        let yaml = serde_yaml_ng::to_string(&lock).unwrap();
        let lock2: StateLock = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(
            lock2.resources["app_setup/qux"].generated["var"],
            "0f8fad5b-d9cb-469f-a165-70867728950e"
        );
    }

    #[test]
    fn test_provenance_event_serde() {
        let event = ProvenanceEvent::ResourceFailed {
            machine: "web".to_string(),
            resource: "qux".to_string(),
            category: "binding".to_string(),
            error: "unbound variable".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"resource_failed\""));
        assert!(json.contains("\"category\":\"binding\""));
    }

    #[test]
    fn test_yaml_value_to_string() {
        assert_eq!(
            yaml_value_to_string(&serde_yaml_ng::Value::String("hello".into())),
            "hello"
        );
        assert_eq!(yaml_value_to_string(&serde_yaml_ng::Value::Bool(true)), "true");
        assert_eq!(yaml_value_to_string(&serde_yaml_ng::Value::Null), "");
    }
}
