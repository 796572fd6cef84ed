//! In-memory ResourceStore and EventPublisher for unit testing
//!
//! `MockStore` keeps objects as JSON documents and mimics the API server
//! behaviour reconcilers depend on:
//! - every write bumps `metadata.resourceVersion`
//! - patches carrying a stale `metadata.resourceVersion` fail with a conflict
//! - objects with finalizers are soft-deleted (deletionTimestamp) and removed
//!   once a patch empties their finalizers
//! - failures can be injected per operation

mod events;

pub use events::{RecordedEvent, RecordingEventPublisher};

use std::collections::{BTreeMap, VecDeque};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::StoreError;
use crate::merge;
use crate::store_trait::ResourceStore;

/// Store operation a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    /// `get`
    Get,
    /// `list`
    List,
    /// `create`
    Create,
    /// `delete`
    Delete,
    /// `patch`
    Patch,
    /// `patch_status`
    PatchStatus,
}

/// Kind of failure returned by an injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Generic backend failure
    Backend,
    /// Optimistic concurrency conflict
    Conflict,
    /// Name already taken
    AlreadyExists,
    /// Object missing
    NotFound,
}

impl InjectedFailure {
    fn into_error(self, op: MockOp) -> StoreError {
        let message = format!("injected failure on {op:?}");
        match self {
            InjectedFailure::Backend => StoreError::Backend(message),
            InjectedFailure::Conflict => StoreError::Conflict(message),
            InjectedFailure::AlreadyExists => StoreError::AlreadyExists(message),
            InjectedFailure::NotFound => StoreError::NotFound(message),
        }
    }
}

type ObjectKey = (String, String);

/// Mock ResourceStore for testing
#[derive(Debug)]
pub struct MockStore<K> {
    pub(crate) objects: Arc<Mutex<BTreeMap<ObjectKey, Value>>>,
    pub(crate) next_version: Arc<Mutex<u64>>,
    pub(crate) failures: Arc<Mutex<VecDeque<(MockOp, InjectedFailure)>>>,
    pub(crate) created: Arc<Mutex<Vec<String>>>,
    pub(crate) deleted: Arc<Mutex<Vec<String>>>,
    pub(crate) status_writes: Arc<Mutex<u64>>,
    pub(crate) clock: Arc<Mutex<Option<DateTime<Utc>>>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for MockStore<K> {
    fn clone(&self) -> Self {
        Self {
            objects: Arc::clone(&self.objects),
            next_version: Arc::clone(&self.next_version),
            failures: Arc::clone(&self.failures),
            created: Arc::clone(&self.created),
            deleted: Arc::clone(&self.deleted),
            status_writes: Arc::clone(&self.status_writes),
            clock: Arc::clone(&self.clock),
            _kind: PhantomData,
        }
    }
}

impl<K> Default for MockStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> MockStore<K> {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            next_version: Arc::new(Mutex::new(1)),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            status_writes: Arc::new(Mutex::new(0)),
            clock: Arc::new(Mutex::new(None)),
            _kind: PhantomData,
        }
    }

    /// Pin the time used for creation and deletion timestamps
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap() = Some(now);
    }

    /// Make the next call of `op` fail with `failure`
    pub fn fail_next(&self, op: MockOp, failure: InjectedFailure) {
        self.failures.lock().unwrap().push_back((op, failure));
    }

    /// `namespace/name` of every object created through the store
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    /// `namespace/name` of every object a delete was requested for
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Number of successful `patch_status` calls
    pub fn status_writes(&self) -> u64 {
        *self.status_writes.lock().unwrap()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove an object outright, bypassing finalizers
    pub fn remove(&self, namespace: Option<&str>, name: &str) {
        self.objects.lock().unwrap().remove(&key(namespace, name));
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.lock().unwrap().unwrap_or_else(Utc::now)
    }

    fn take_failure(&self, op: MockOp) -> Result<(), StoreError> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|(o, _)| *o == op) {
            if let Some((_, failure)) = failures.remove(pos) {
                return Err(failure.into_error(op));
            }
        }
        Ok(())
    }

    fn bump_version(&self, object: &mut Value) {
        let mut next = self.next_version.lock().unwrap();
        object["metadata"]["resourceVersion"] = json!(next.to_string());
        *next += 1;
    }

    fn stamp_new(&self, object: &mut Value) {
        let now = self.now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let uid = format!("uid-{}", *self.next_version.lock().unwrap());
        let metadata = &mut object["metadata"];
        if metadata.get("creationTimestamp").is_none_or(Value::is_null) {
            metadata["creationTimestamp"] = json!(now);
        }
        if metadata.get("uid").is_none_or(Value::is_null) {
            metadata["uid"] = json!(uid);
        }
        if metadata.get("generation").is_none_or(Value::is_null) {
            metadata["generation"] = json!(1);
        }
        self.bump_version(object);
    }
}

impl<K> MockStore<K>
where
    K: Serialize + DeserializeOwned,
{
    /// Seed an object directly (for test setup), overwriting any existing one
    pub fn insert(&self, object: &K) -> K {
        let mut value = serde_json::to_value(object).unwrap();
        self.stamp_new(&mut value);
        let (namespace, name) = identity(&value).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(key(namespace.as_deref(), &name), value.clone());
        serde_json::from_value(value).unwrap()
    }

    /// Current stored version of an object
    pub fn get_object(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(&key(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    /// Every stored object
    pub fn all(&self) -> Vec<K> {
        self.objects
            .lock()
            .unwrap()
            .values()
            .map(|v| serde_json::from_value(v.clone()).unwrap())
            .collect()
    }

    /// Mutate a stored object in place without bumping its version
    /// (simulates another actor, e.g. a backup reconciler updating status)
    pub fn update_object(&self, namespace: Option<&str>, name: &str, update: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        if let Some(value) = objects.get_mut(&key(namespace, name)) {
            let mut object: K = serde_json::from_value(value.clone()).unwrap();
            update(&mut object);
            *value = serde_json::to_value(&object).unwrap();
        }
    }

    fn write_patch(
        &self,
        op: MockOp,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.take_failure(op)?;
        let mut objects = self.objects.lock().unwrap();
        let object_key = key(namespace, name);
        let Some(stored) = objects.get_mut(&object_key) else {
            return Err(StoreError::NotFound(format!("{}/{}", object_key.0, object_key.1)));
        };

        if let Some(expected) = patch.pointer("/metadata/resourceVersion").and_then(Value::as_str) {
            let current = stored
                .pointer("/metadata/resourceVersion")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if expected != current {
                return Err(StoreError::Conflict(format!(
                    "resourceVersion {expected} is stale (current {current})"
                )));
            }
        }

        match op {
            MockOp::PatchStatus => {
                let status_patch = patch.get("status").cloned().unwrap_or(Value::Null);
                let status = stored
                    .as_object_mut()
                    .map(|o| o.entry("status").or_insert(Value::Null));
                if let Some(status) = status {
                    if status_patch.is_null() {
                        *status = Value::Null;
                    } else {
                        merge::apply(status, &status_patch);
                    }
                }
                *self.status_writes.lock().unwrap() += 1;
            }
            _ => merge::apply(stored, patch),
        }
        self.bump_version(stored);

        let result: K = serde_json::from_value(stored.clone())?;
        if is_deleting(stored) && !has_finalizers(stored) {
            objects.remove(&object_key);
        }
        Ok(result)
    }
}

#[async_trait::async_trait]
impl<K> ResourceStore<K> for MockStore<K>
where
    K: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, StoreError> {
        self.take_failure(MockOp::Get)?;
        let objects = self.objects.lock().unwrap();
        match objects.get(&key(namespace, name)) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        self.take_failure(MockOp::List)?;
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns.as_str()))
            .filter(|(_, v)| {
                labels.iter().all(|(k, expected)| {
                    v.pointer("/metadata/labels")
                        .and_then(|l| l.get(k))
                        .and_then(Value::as_str)
                        == Some(expected.as_str())
                })
            })
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn create(&self, object: &K) -> Result<K, StoreError> {
        self.take_failure(MockOp::Create)?;
        let mut value = serde_json::to_value(object)?;
        let (namespace, name) = identity(&value)?;
        let object_key = key(namespace.as_deref(), &name);

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&object_key) {
            return Err(StoreError::AlreadyExists(format!("{}/{}", object_key.0, object_key.1)));
        }
        self.stamp_new(&mut value);
        self.created
            .lock()
            .unwrap()
            .push(format!("{}/{}", object_key.0, object_key.1));
        objects.insert(object_key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        self.take_failure(MockOp::Delete)?;
        let object_key = key(namespace, name);
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&object_key) else {
            return Ok(());
        };
        if is_deleting(stored) {
            return Ok(());
        }
        self.deleted
            .lock()
            .unwrap()
            .push(format!("{}/{}", object_key.0, object_key.1));
        if has_finalizers(stored) {
            stored["metadata"]["deletionTimestamp"] =
                json!(self.now().to_rfc3339_opts(SecondsFormat::Secs, true));
            self.bump_version(stored);
        } else {
            objects.remove(&object_key);
        }
        Ok(())
    }

    async fn patch(&self, namespace: Option<&str>, name: &str, patch: &Value) -> Result<K, StoreError> {
        self.write_patch(MockOp::Patch, namespace, name, patch)
    }

    async fn patch_status(
        &self,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.write_patch(MockOp::PatchStatus, namespace, name, patch)
    }
}

fn key(namespace: Option<&str>, name: &str) -> ObjectKey {
    (namespace.unwrap_or_default().to_string(), name.to_string())
}

fn identity(value: &Value) -> Result<(Option<String>, String), StoreError> {
    let name = value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidObject("metadata.name is required".to_string()))?;
    let namespace = value
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((namespace, name.to_string()))
}

fn is_deleting(value: &Value) -> bool {
    value
        .pointer("/metadata/deletionTimestamp")
        .is_some_and(|v| !v.is_null())
}

fn has_finalizers(value: &Value) -> bool {
    value
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty())
}
