//! Remote store interface and an in-process implementation.
//!
//! A store holds serialized objects addressed by [`ObjectKey`]. Every write
//! carries the version token the caller last observed; a stale token is a
//! [`StoreError::Conflict`]. Main-body patches never touch `status`, and
//! status patches touch nothing else.
//!
//! # Store files
//!
//! [`load_store_file`] / [`save_store_file`] persist a [`MemoryStore`] as a
//! YAML list of objects. Writes use the `.tmp` + rename pattern.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::{io_err, StoreError};
use crate::types::{Aspect, DynamicObject, ObjectKey, Resource, STATUS_FIELD};

// ---------------------------------------------------------------------------
// RemoteStore
// ---------------------------------------------------------------------------

/// Capabilities the patch orchestrator needs from a remote store.
///
/// Patches are JSON merge patches (RFC 7396). Both patch calls return the
/// object's new version token on success.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Current serialized object.
    async fn get(&self, key: &ObjectKey) -> Result<Value, StoreError>;

    /// Patch everything except `status`.
    async fn patch(&self, key: &ObjectKey, patch: &Value, version: &str)
        -> Result<String, StoreError>;

    /// Patch only `status`. `patch` is a merge patch of the status value itself.
    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &Value,
        version: &str,
    ) -> Result<String, StoreError>;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    async fn get(&self, key: &ObjectKey) -> Result<Value, StoreError> {
        (**self).get(key).await
    }

    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &Value,
        version: &str,
    ) -> Result<String, StoreError> {
        (**self).patch(key, patch, version).await
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &Value,
        version: &str,
    ) -> Result<String, StoreError> {
        (**self).patch_status(key, patch, version).await
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// A write call observed by a [`MemoryStore`], successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub key: ObjectKey,
    pub aspect: Aspect,
}

#[derive(Debug, Clone)]
struct StoredObject {
    value: Value,
    version: u64,
}

impl StoredObject {
    fn bump(&mut self) -> String {
        self.version += 1;
        let token = self.version.to_string();
        if let Some(meta) = self.value.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert("resourceVersion".to_owned(), Value::String(token.clone()));
        }
        token
    }
}

/// In-process store with integer version tokens.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, StoredObject>>,
    calls: Mutex<Vec<WriteCall>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces an object and returns the stored copy, with its
    /// version token filled in.
    pub fn insert<T: Resource>(&self, object: &T) -> Result<T, StoreError> {
        let stored = self.insert_value(serde_json::to_value(object)?)?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Untyped [`MemoryStore::insert`].
    pub fn insert_value(&self, value: Value) -> Result<Value, StoreError> {
        let key = ObjectKey::from_value(&value)
            .ok_or_else(|| StoreError::Other("object has no metadata.name".to_owned()))?;
        let mut objects = self.objects.lock();
        let version = objects.get(&key).map(|o| o.version).unwrap_or(0);
        let mut stored = StoredObject { value, version };
        stored.bump();
        let value = stored.value.clone();
        objects.insert(key, stored);
        Ok(value)
    }

    /// Loads a stored object with the version token it was last written at.
    fn seed(&self, value: Value) -> Result<(), StoreError> {
        let key = ObjectKey::from_value(&value)
            .ok_or_else(|| StoreError::Other("object has no metadata.name".to_owned()))?;
        let version = value
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut stored = StoredObject { value, version };
        if version == 0 {
            stored.bump();
        }
        self.objects.lock().insert(key, stored);
        Ok(())
    }

    pub fn get_typed<T: Resource>(&self, key: &ObjectKey) -> Result<T, StoreError> {
        let value = self.get_value(key)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn get_value(&self, key: &ObjectKey) -> Result<Value, StoreError> {
        self.objects
            .lock()
            .get(key)
            .map(|o| o.value.clone())
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    /// Removes an object outright.
    pub fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.objects
            .lock()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    /// Sets the deletion marker without removing the object.
    pub fn mark_deleting(&self, key: &ObjectKey) -> Result<String, StoreError> {
        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
        if let Some(meta) = stored.value.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert(
                "deletionTimestamp".to_owned(),
                serde_json::to_value(Utc::now())?,
            );
        }
        Ok(stored.bump())
    }

    /// Replaces the status aspect unconditionally, as another writer would.
    pub fn write_status(&self, key: &ObjectKey, status: Value) -> Result<String, StoreError> {
        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
        if let Some(fields) = stored.value.as_object_mut() {
            fields.insert(STATUS_FIELD.to_owned(), status);
        }
        Ok(stored.bump())
    }

    /// Every stored object, ordered by key.
    pub fn values(&self) -> Vec<Value> {
        self.objects.lock().values().map(|o| o.value.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Write calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<WriteCall> {
        self.calls.lock().clone()
    }

    fn apply(
        &self,
        key: &ObjectKey,
        patch: &Value,
        version: &str,
        aspect: Aspect,
    ) -> Result<String, StoreError> {
        self.calls.lock().push(WriteCall {
            key: key.clone(),
            aspect,
        });

        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

        let current = stored.version.to_string();
        if current != version {
            return Err(StoreError::Conflict {
                key: key.clone(),
                message: format!(
                    "version {version} is stale (current {current}); re-read the object before patching"
                ),
            });
        }

        match aspect {
            Aspect::Main => {
                let mut patch = patch.clone();
                if let Some(fields) = patch.as_object_mut() {
                    fields.remove(STATUS_FIELD);
                }
                json_patch::merge(&mut stored.value, &patch);
            }
            Aspect::Status => {
                json_patch::merge(&mut stored.value, &json!({ STATUS_FIELD: patch }));
            }
        }

        let token = stored.bump();
        tracing::trace!(%key, %aspect, version = %token, "applied patch");
        Ok(token)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Value, StoreError> {
        self.get_value(key)
    }

    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &Value,
        version: &str,
    ) -> Result<String, StoreError> {
        self.apply(key, patch, version, Aspect::Main)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &Value,
        version: &str,
    ) -> Result<String, StoreError> {
        self.apply(key, patch, version, Aspect::Status)
    }
}

// ---------------------------------------------------------------------------
// Store files
// ---------------------------------------------------------------------------

/// Load a store file (YAML list of objects) into a fresh [`MemoryStore`].
///
/// A missing file yields an empty store.
pub fn load_store_file(path: &Path) -> Result<MemoryStore, StoreError> {
    let store = MemoryStore::new();
    if !path.exists() {
        return Ok(store);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let objects: Vec<DynamicObject> =
        serde_yaml::from_str(&contents).map_err(|e| StoreError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?;
    for object in objects {
        store.seed(serde_json::to_value(object)?)?;
    }
    Ok(store)
}

/// Atomically write every object in `store` to `path`.
pub fn save_store_file(path: &Path, store: &MemoryStore) -> Result<(), StoreError> {
    let objects = store
        .values()
        .into_iter()
        .map(serde_json::from_value::<DynamicObject>)
        .collect::<Result<Vec<_>, _>>()?;
    let yaml = serde_yaml::to_string(&objects).map_err(|e| StoreError::Yaml {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectMeta, Uid};
    use tempfile::TempDir;

    fn object(name: &str) -> DynamicObject {
        DynamicObject {
            api_version: "v1".into(),
            kind: "Thing".into(),
            metadata: ObjectMeta {
                name: name.into(),
                uid: Uid::from(format!("uid-{name}")),
                ..Default::default()
            },
            data: serde_json::Map::new(),
        }
    }

    #[test]
    fn insert_assigns_version_token() {
        let store = MemoryStore::new();
        let stored = store.insert(&object("a")).expect("insert");
        assert_eq!(stored.metadata.resource_version, "1");

        let again = store.insert(&object("a")).expect("replace");
        assert_eq!(again.metadata.resource_version, "2");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stale_version_is_conflict() {
        let store = MemoryStore::new();
        store.insert(&object("a")).expect("insert");
        let key = ObjectKey::named("a");

        let v2 = store
            .patch(&key, &json!({"metadata": {"labels": {"x": "1"}}}), "1")
            .await
            .expect("patch");
        assert_eq!(v2, "2");

        let err = store
            .patch(&key, &json!({"metadata": {"labels": {"x": "2"}}}), "1")
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "got: {err}");
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn main_patch_ignores_status_and_status_patch_only_touches_status() {
        let store = MemoryStore::new();
        store.insert(&object("a")).expect("insert");
        let key = ObjectKey::named("a");

        let v = store
            .patch(&key, &json!({"spec": {"v": 1}, "status": {"phase": "bad"}}), "1")
            .await
            .expect("main");
        let stored = store.get_value(&key).expect("get");
        assert_eq!(stored["spec"]["v"], 1);
        assert!(stored.get("status").is_none());

        store
            .patch_status(&key, &json!({"phase": "Ready"}), &v)
            .await
            .expect("status");
        let stored = store.get_value(&key).expect("get");
        assert_eq!(stored["status"]["phase"], "Ready");
        assert_eq!(stored["spec"]["v"], 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .patch_status(&ObjectKey::named("ghost"), &json!({}), "1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn store_file_roundtrip_preserves_versions() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("store.yaml");

        let store = MemoryStore::new();
        store.insert(&object("a")).expect("a");
        store.insert(&object("b")).expect("b");
        store.mark_deleting(&ObjectKey::named("b")).expect("mark");
        save_store_file(&path, &store).expect("save");
        assert!(!path.with_extension("yaml.tmp").exists());

        let loaded = load_store_file(&path).expect("load");
        assert_eq!(loaded.len(), 2);
        let b: DynamicObject = loaded.get_typed(&ObjectKey::named("b")).expect("b");
        assert_eq!(b.metadata.resource_version, "2");
        assert!(b.metadata.is_deleting());
    }

    #[test]
    fn missing_store_file_loads_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = load_store_file(&dir.path().join("absent.yaml")).expect("load");
        assert!(store.is_empty());
    }
}
