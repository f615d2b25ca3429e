//! Resource records
//!
//! The shape shared by every resource kind: a stable identity, the kind key
//! and the remote object's attributes as of the last fetch or mutation.

use super::fetcher::lookup_path;
use super::registry::{IdType, ResourceDef};
use crate::error::{AdoError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Key the backend uses to address a resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identity {
    Int(i64),
    Str(String),
}

impl Identity {
    /// Read an identity out of a JSON value, coercing to the kind's id type
    pub fn from_value(value: &Value, id_type: IdType) -> Option<Self> {
        match (id_type, value) {
            (IdType::Integer, Value::Number(n)) => n.as_i64().map(Self::Int),
            (IdType::Integer, Value::String(s)) => s.parse().ok().map(Self::Int),
            (IdType::String, Value::String(s)) => Some(Self::Str(s.clone())),
            (IdType::String, Value::Number(n)) => Some(Self::Str(n.to_string())),
            _ => None,
        }
    }

    /// Parse user input (CLI arguments, state files) for a kind
    pub fn parse(raw: &str, id_type: IdType) -> Result<Self> {
        match id_type {
            IdType::Integer => raw
                .parse()
                .map(Self::Int)
                .map_err(|_| AdoError::Internal(format!("{} is not an integer identity", raw))),
            IdType::String => Ok(Self::Str(raw.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A remote object of some kind.
///
/// Two records are equal when kind and identity match; field values may be stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    pub identity: Identity,
    pub fields: Map<String, Value>,
}

impl ResourceRecord {
    /// Build a record from a backend payload
    pub fn from_payload(kind: &str, def: &ResourceDef, payload: Value) -> Result<Self> {
        let fields = match payload {
            Value::Object(fields) => fields,
            other => {
                return Err(AdoError::transport(format!(
                    "expected a {} object, got {}",
                    kind,
                    type_name(&other)
                )))
            },
        };

        let identity = lookup_path_in(&fields, &def.id_field)
            .and_then(|v| Identity::from_value(v, def.id_type))
            .ok_or_else(|| {
                AdoError::transport(format!("{} payload has no usable {}", kind, def.id_field))
            })?;

        Ok(Self {
            kind: kind.to_string(),
            identity,
            fields,
        })
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path_in(&self.fields, path)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Value of the kind's name field
    pub fn name<'a>(&'a self, def: &ResourceDef) -> Option<&'a str> {
        self.get_str(&def.name_field)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl PartialEq for ResourceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.identity == other.identity
    }
}

impl Eq for ResourceRecord {}

impl Hash for ResourceRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.identity.hash(state);
    }
}

fn lookup_path_in<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, tail) = match path.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (path, None),
    };
    let value = fields.get(head)?;
    match tail {
        Some(tail) => lookup_path(value, tail),
        None => Some(value),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
