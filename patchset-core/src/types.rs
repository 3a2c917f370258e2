//! Domain types for tracked resource objects.
//!
//! Objects are modeled after a versioned remote store: a metadata block with
//! a stable [`Uid`] and a version token, a main body, and an optional
//! top-level `status` aspect written through a separate path.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level field holding an object's status aspect.
pub const STATUS_FIELD: &str = "status";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable unique identity of an object across the life of a batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Uid(pub String);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Address of an object in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Cluster-scoped key.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
        }
    }

    /// Reads `metadata.namespace` / `metadata.name` from a serialized object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let meta = value.get("metadata")?;
        let name = meta.get("name")?.as_str()?.to_owned();
        let namespace = meta
            .get("namespace")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => self.name.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// An independently-writable facet of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aspect {
    /// Everything except `status`.
    Main,
    Status,
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aspect::Main => write!(f, "main"),
            Aspect::Status => write!(f, "status"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Metadata shared by every stored object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub uid: Uid,
    /// Version token used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Deletion marker. Set once the store has begun removing the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// A single observed condition in an object's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: None,
            message: None,
            last_transition_time: None,
        }
    }
}

/// Upserts `condition` by type.
///
/// The existing transition time is kept when the status does not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            } else if condition.last_transition_time.is_none() {
                condition.last_transition_time = Some(Utc::now());
            }
            *existing = condition;
        }
        None => {
            if condition.last_transition_time.is_none() {
                condition.last_transition_time = Some(Utc::now());
            }
            conditions.push(condition);
        }
    }
}

/// Looks up a condition by type.
pub fn condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

// ---------------------------------------------------------------------------
// Resource trait
// ---------------------------------------------------------------------------

/// A typed object that can be tracked and patched.
///
/// The serialized form must be a JSON object with a `metadata` field; its
/// optional top-level `status` field is the status aspect.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn uid(&self) -> &Uid {
        &self.meta().uid
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::from_meta(self.meta())
    }
}

/// Caller-owned handle to a live object.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wraps an object in a [`Shared`] handle.
pub fn shared<T>(object: T) -> Shared<T> {
    Arc::new(RwLock::new(object))
}

/// An untyped object: known metadata plus arbitrary top-level fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl DynamicObject {
    /// Status conditions, or an empty list when absent or malformed.
    pub fn conditions(&self) -> Vec<Condition> {
        self.data
            .get(STATUS_FIELD)
            .and_then(|s| s.get("conditions"))
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default()
    }

    /// Upserts a status condition, creating the status block if needed.
    pub fn set_condition(&mut self, condition: Condition) -> Result<(), serde_json::Error> {
        let mut conditions = self.conditions();
        set_condition(&mut conditions, condition);
        let encoded = serde_json::to_value(conditions)?;

        let status = self
            .data
            .entry(STATUS_FIELD)
            .or_insert_with(|| Value::Object(Map::new()));
        if !status.is_object() {
            *status = Value::Object(Map::new());
        }
        if let Value::Object(fields) = status {
            fields.insert("conditions".to_owned(), encoded);
        }
        Ok(())
    }
}

impl Resource for DynamicObject {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(Uid::from("abc-123").to_string(), "abc-123");
        assert_eq!(ObjectKey::named("tkr").to_string(), "tkr");
        assert_eq!(ObjectKey::namespaced("ns", "tkr").to_string(), "ns/tkr");
    }

    #[test]
    fn key_from_value_reads_metadata() {
        let value = serde_json::json!({
            "metadata": {"name": "a", "namespace": "b"}
        });
        assert_eq!(
            ObjectKey::from_value(&value),
            Some(ObjectKey::namespaced("b", "a"))
        );
        assert_eq!(ObjectKey::from_value(&serde_json::json!({})), None);
    }

    #[test]
    fn meta_serializes_camel_case_and_skips_empty() {
        let meta = ObjectMeta {
            name: "x".into(),
            uid: Uid::from("u1"),
            resource_version: "3".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&meta).expect("serialize");
        assert_eq!(value["resourceVersion"], "3");
        assert!(value.get("labels").is_none());
        assert!(value.get("deletionTimestamp").is_none());
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_unchanged() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, Condition::new("Ready", ConditionStatus::False));
        let first = conditions[0].last_transition_time;
        assert!(first.is_some());

        let mut again = Condition::new("Ready", ConditionStatus::False);
        again.reason = Some("Waiting".into());
        set_condition(&mut conditions, again);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first);
        assert_eq!(conditions[0].reason.as_deref(), Some("Waiting"));
    }

    #[test]
    fn dynamic_object_flattens_extra_fields() {
        let yaml = r#"
apiVersion: run.example.io/v1
kind: Release
metadata:
  name: v1.18.2
  uid: u-1
spec:
  version: 1.18.2
"#;
        let mut obj: DynamicObject = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(obj.kind, "Release");
        assert_eq!(obj.data["spec"]["version"], "1.18.2");
        assert!(obj.conditions().is_empty());

        obj.set_condition(Condition::new("Compatible", ConditionStatus::True))
            .expect("set");
        assert_eq!(
            condition(&obj.conditions(), "Compatible").map(|c| c.status),
            Some(ConditionStatus::True)
        );
    }
}
