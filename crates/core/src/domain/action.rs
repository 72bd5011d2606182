// Action Domain Models

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// Free-form trigger metadata used to parameterize property resolution.
pub type Meta = BTreeMap<String, Value>;

/// How the trigger's `action` field is to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionSource {
    /// `action` holds an inline [`Action`].
    Literal,
    /// `action` holds a symbolic path resolved through the entity store.
    Path,
}

/// Wire format of a property's payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataFormat {
    #[default]
    Json,
    Bytes,
}

impl DataFormat {
    /// Decode fetched entity bytes into a JSON value. Raw bytes are carried
    /// as a base64 string so they survive JSON message bodies.
    pub fn decode(&self, data: &[u8]) -> Result<Value> {
        match self {
            DataFormat::Json => Ok(serde_json::from_slice(data)?),
            DataFormat::Bytes => Ok(Value::String(BASE64.encode(data))),
        }
    }
}

/// The inbound event that creates or identifies a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTrigger {
    pub jid: String,
    #[serde(default)]
    pub meta: Meta,
    pub action_source: ActionSource,
    /// Inline action object or a path string, per `action_source`.
    pub action: Value,
}

impl ActionTrigger {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A named unit of work routed to the executor queue for its `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    pub properties: Vec<ActionProperty>,
}

impl Action {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// One typed action input. Serializes as
/// `{"name", "kind", "data_format", "value"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProperty {
    pub name: String,
    #[serde(flatten)]
    pub source: PropertySource,
}

/// Where a property's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertySource {
    /// Inline JSON value.
    Literal { value: Value },
    /// Entity-store path, fetched at resolution time.
    Path {
        value: String,
        #[serde(default)]
        data_format: DataFormat,
    },
    /// `value` names a meta key whose entry becomes a literal.
    MetaField { value: String },
    /// `value` names a meta key whose entry is an entity path.
    MetaEntity {
        value: String,
        #[serde(default)]
        data_format: DataFormat,
    },
}

impl ActionProperty {
    pub fn literal(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            source: PropertySource::Literal { value },
        }
    }

    pub fn path(name: impl Into<String>, path: impl Into<String>, data_format: DataFormat) -> Self {
        Self {
            name: name.into(),
            source: PropertySource::Path {
                value: path.into(),
                data_format,
            },
        }
    }

    /// Same property with a different payload source.
    pub fn with_source(&self, source: PropertySource) -> Self {
        Self {
            name: self.name.clone(),
            source,
        }
    }

    /// Collapse meta-sourced variants against `meta`: META_FIELD becomes a
    /// literal (missing keys resolve to null), META_ENTITY becomes a path.
    pub fn simplify(&self, meta: &Meta) -> Self {
        match &self.source {
            PropertySource::MetaField { value: key } => {
                let value = meta.get(key).cloned().unwrap_or(Value::Null);
                self.with_source(PropertySource::Literal { value })
            }
            PropertySource::MetaEntity {
                value: key,
                data_format,
            } => match meta.get(key) {
                Some(Value::String(path)) => self.with_source(PropertySource::Path {
                    value: path.clone(),
                    data_format: *data_format,
                }),
                found => {
                    tracing::warn!(
                        name = %self.name,
                        key = %key,
                        found = ?found,
                        "meta entity key did not hold a path"
                    );
                    self.with_source(PropertySource::Literal { value: Value::Null })
                }
            },
            _ => self.clone(),
        }
    }
}

/// Encode a frozen property list for the `variables` record field.
pub fn encode_variables(variables: &[ActionProperty]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(variables)?)
}

/// Decode the `variables` record field.
pub fn decode_variables(data: &[u8]) -> Result<Vec<ActionProperty>> {
    Ok(serde_json::from_slice(data)?)
}
