//! Resource Registry - Load resource definitions from JSON
//!
//! Every resource kind is described as data: endpoint templates, identity and
//! name fields, the fields accepted on create, the closed set of updatable
//! fields and, for long-running kinds, how to read job status. The generic
//! manager interprets these definitions.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/core.json"),
    include_str!("../resources/git.json"),
    include_str!("../resources/pipelines.json"),
];

const DEFAULT_API_VERSION: &str = "7.1";

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_response_path() -> String {
    "value".to_string()
}

/// Type of a resource's identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    #[default]
    String,
    Integer,
}

/// Value type accepted by a create or update field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    Object,
    Array,
}

/// HTTP verb used for a mutating call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl WriteMethod {
    pub fn as_method(self) -> Method {
        match self {
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }
}

fn default_update_method() -> WriteMethod {
    WriteMethod::Patch
}

fn default_delete_method() -> WriteMethod {
    WriteMethod::Delete
}

/// One field of a create or update payload
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    /// Identifier callers use
    pub key: String,
    /// Dot-separated location in the request body
    pub internal_name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Prepended to string values that lack it (e.g. `refs/heads/`)
    #[serde(default)]
    pub prefix: Option<String>,
}

impl FieldDef {
    /// Validate a caller value and convert it to its wire representation
    pub fn serialize(&self, value: &Value) -> Result<Value, String> {
        match (self.field_type, value) {
            (FieldType::String, Value::String(s)) => Ok(Value::String(match &self.prefix {
                Some(prefix) if !s.starts_with(prefix.as_str()) => format!("{}{}", prefix, s),
                _ => s.clone(),
            })),
            (FieldType::Integer, Value::Number(n)) if n.is_i64() => Ok(value.clone()),
            (FieldType::Integer, Value::String(s)) => s
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("{} expects an integer, got {:?}", self.key, s)),
            (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (FieldType::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("{} expects a boolean, got {:?}", self.key, s)),
            },
            (FieldType::Object, Value::Object(_)) | (FieldType::Array, Value::Array(_)) => {
                Ok(value.clone())
            },
            (expected, _) => Err(format!("{} expects {:?}, got {}", self.key, expected, value)),
        }
    }
}

/// How a kind is deleted
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteDef {
    #[serde(default = "default_delete_method")]
    pub method: WriteMethod,
    /// Defaults to the item path
    #[serde(default)]
    pub path: Option<String>,
    /// Some kinds are closed rather than removed (pull requests are abandoned)
    #[serde(default)]
    pub body: Option<Value>,
}

/// A request issued right after a successful create, e.g. seeding a new
/// repository with its first commit
#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpDef {
    /// Boolean create parameter that skips this call when `false`
    #[serde(default)]
    pub toggle: Option<String>,
    #[serde(default = "default_follow_up_method")]
    pub method: WriteMethod,
    /// May reference the new resource as `{id}`
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
}

fn default_follow_up_method() -> WriteMethod {
    WriteMethod::Post
}

impl FollowUpDef {
    /// Whether the caller left this follow-up switched on
    pub fn enabled(&self, params: &Map<String, Value>) -> bool {
        self.toggle
            .as_ref()
            .and_then(|t| params.get(t))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

/// Status mapping for long-running kinds (builds, pipeline runs)
#[derive(Debug, Clone, Deserialize)]
pub struct JobDef {
    /// Create parameter (or scope variable) naming the definition to run
    pub definition_param: String,
    /// Whether the definition is a URL scope variable rather than a payload field
    #[serde(default)]
    pub definition_in_scope: bool,
    #[serde(default)]
    pub branch_param: Option<String>,
    #[serde(default)]
    pub parameters_param: Option<String>,
    pub state_field: String,
    pub terminal_states: Vec<String>,
    pub result_field: String,
    pub succeeded_results: Vec<String>,
    pub canceled_results: Vec<String>,
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub list_path: String,
    #[serde(default)]
    pub list_query: BTreeMap<String, String>,
    #[serde(default)]
    pub item_path: Option<String>,
    #[serde(default)]
    pub create_path: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_response_path")]
    pub response_path: String,
    pub id_field: String,
    #[serde(default)]
    pub id_type: IdType,
    pub name_field: String,
    /// The platform guarantees names are unique, skip the ambiguity check
    #[serde(default)]
    pub unique_names: bool,
    #[serde(default)]
    pub create_fields: Vec<FieldDef>,
    /// Constant parts of every create payload
    #[serde(default)]
    pub create_defaults: Map<String, Value>,
    /// The create endpoint takes a one-element array (git refs)
    #[serde(default)]
    pub create_as_list: bool,
    /// Re-read the resource after create when the response is partial
    #[serde(default)]
    pub refetch_after_create: bool,
    #[serde(default)]
    pub after_create: Vec<FollowUpDef>,
    #[serde(default)]
    pub updatable_fields: Vec<FieldDef>,
    #[serde(default = "default_update_method")]
    pub update_method: WriteMethod,
    #[serde(default)]
    pub delete: Option<DeleteDef>,
    /// Kind whose deletion takes this kind's resources with it
    #[serde(default)]
    pub owned_by: Option<String>,
    /// Scope variable holding the owner's identity
    #[serde(default)]
    pub owner_param: Option<String>,
    #[serde(default)]
    pub job: Option<JobDef>,
}

impl ResourceDef {
    pub fn updatable_field(&self, key: &str) -> Option<&FieldDef> {
        self.updatable_fields.iter().find(|f| f.key == key)
    }

    pub fn updatable_keys(&self) -> Vec<&str> {
        self.updatable_fields.iter().map(|f| f.key.as_str()).collect()
    }

    /// Validate create parameters and build the request body.
    ///
    /// Parameters that are neither create fields nor scope variables of the
    /// create path are rejected.
    pub fn build_create_payload(&self, params: &Map<String, Value>) -> Result<Value, String> {
        let mut payload = Value::Object(self.create_defaults.clone());

        for field in &self.create_fields {
            match params.get(&field.key) {
                Some(value) => insert_path(&mut payload, &field.internal_name, field.serialize(value)?),
                None if field.required => return Err(format!("missing required field {}", field.key)),
                None => {},
            }
        }

        let template = self.create_path.as_deref().unwrap_or(&self.list_path);
        for (key, value) in params {
            if self.is_toggle(key) {
                if !value.is_boolean() {
                    return Err(format!("{} expects a boolean, got {}", key, value));
                }
                continue;
            }
            let known = self.create_fields.iter().any(|f| &f.key == key)
                || template.contains(&format!("{{{}}}", key));
            if !known {
                return Err(format!("unknown field {}", key));
            }
        }

        if self.create_as_list {
            return Ok(Value::Array(vec![payload]));
        }
        Ok(payload)
    }

    fn is_toggle(&self, key: &str) -> bool {
        self.after_create
            .iter()
            .any(|f| f.toggle.as_deref() == Some(key))
    }

    /// Check the definition is internally consistent
    pub fn validate(&self, key: &str) -> Result<(), String> {
        if self.job.is_some() && self.item_path.is_none() {
            return Err(format!("{}: job kinds need an item_path to poll", key));
        }
        if self.owned_by.is_some() != self.owner_param.is_some() {
            return Err(format!("{}: owned_by and owner_param go together", key));
        }
        if let Some(delete) = &self.delete {
            if delete.path.is_none() && self.item_path.is_none() {
                return Err(format!("{}: delete needs a path", key));
            }
        }
        if !self.create_fields.is_empty() && self.create_path.is_none() {
            return Err(format!("{}: create_fields without create_path", key));
        }
        if !self.after_create.is_empty() && self.create_path.is_none() {
            return Err(format!("{}: after_create without create_path", key));
        }
        Ok(())
    }
}

/// Set `value` at a dot-separated path, creating intermediate objects
pub fn insert_path(target: &mut Value, path: &str, value: Value) {
    let mut current = target;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Get all resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    keys.sort_unstable();
    keys
}
