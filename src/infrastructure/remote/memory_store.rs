use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::ports::remote_store::{
    Document, FieldGuard, LiveSubscription, QueryFilter, RemoteError, RemoteStore, SnapshotEvent,
    WriteStep,
};

/// In-process reference implementation of the remote store port: collection
/// maps, guarded all-or-nothing transactions, live snapshot re-broadcast, and
/// connectivity fault injection. Backs tests and local development; the
/// hosted-database adapter lives outside this crate.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    watchers: Vec<Watcher>,
    online: bool,
    unresponsive: bool,
}

struct Watcher {
    collection: String,
    filters: Vec<QueryFilter>,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            collections: HashMap::new(),
            watchers: Vec::new(),
            online: true,
            unresponsive: false,
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Fault injection: offline makes every call fail `unavailable` and pushes
    /// an error event to live subscribers; coming back online re-emits fresh
    /// snapshots so subscribers recover.
    pub fn set_online(&self, online: bool) {
        let mut inner = self.inner.lock().unwrap();
        if inner.online == online {
            return;
        }
        inner.online = online;
        if online {
            let collections: Vec<String> = inner
                .watchers
                .iter()
                .map(|w| w.collection.clone())
                .collect();
            Self::notify(&mut inner, &collections);
        } else {
            inner.watchers.retain(|w| {
                w.tx.send(Err(RemoteError::unavailable("remote store offline")))
                    .is_ok()
            });
        }
    }

    /// Fault injection: calls hang and subscriptions stay silent, as with a
    /// black-holed connection. Used to exercise timeout paths.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.inner.lock().unwrap().unresponsive = unresponsive;
    }

    /// Inserts a document under a fixed id, bypassing connectivity checks.
    pub fn seed(&self, collection: &str, id: &str, fields: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Self::notify(&mut inner, &[collection.to_string()]);
    }

    pub fn document_count(&self, collection: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.collections.get(collection).map_or(0, BTreeMap::len)
    }

    fn check_reachable(inner: &Inner) -> Result<(), RemoteError> {
        if inner.online {
            Ok(())
        } else {
            Err(RemoteError::unavailable("remote store offline"))
        }
    }

    async fn hang_if_unresponsive(&self) {
        let unresponsive = self.inner.lock().unwrap().unresponsive;
        if unresponsive {
            futures::future::pending::<()>().await;
        }
    }

    fn snapshot(inner: &Inner, collection: &str, filters: &[QueryFilter]) -> Vec<Document> {
        inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| filters.iter().all(|f| f.matches(fields)))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(inner: &mut Inner, collections: &[String]) {
        let mut snapshots: Vec<Option<SnapshotEvent>> = Vec::with_capacity(inner.watchers.len());
        for watcher in &inner.watchers {
            if collections.iter().any(|c| c == &watcher.collection) {
                snapshots.push(Some(Ok(Self::snapshot(
                    inner,
                    &watcher.collection,
                    &watcher.filters,
                ))));
            } else {
                snapshots.push(None);
            }
        }
        let mut events = snapshots.into_iter();
        inner.watchers.retain(|watcher| match events.next() {
            Some(Some(event)) => watcher.tx.send(event).is_ok(),
            _ => !watcher.tx.is_closed(),
        });
    }

    fn check_guards(
        inner: &Inner,
        collection: &str,
        id: &str,
        guards: &[FieldGuard],
    ) -> Result<(), RemoteError> {
        let doc = inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .ok_or_else(|| RemoteError::not_found(format!("{collection}/{id}")))?;

        for guard in guards {
            if doc.get(&guard.field) != Some(&guard.expected) {
                return Err(RemoteError::failed_precondition(format!(
                    "guard on {collection}/{id}.{} no longer holds",
                    guard.field
                )));
            }
        }
        Ok(())
    }

    fn merge(target: &mut Value, fields: Value) {
        if let (Value::Object(target), Value::Object(fields)) = (target, fields) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn live_query(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> Result<LiveSubscription, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();

        if !inner.unresponsive {
            let event = if inner.online {
                Ok(Self::snapshot(&inner, collection, filters))
            } else {
                Err(RemoteError::unavailable("remote store offline"))
            };
            let _ = tx.send(event);
        }

        inner.watchers.push(Watcher {
            collection: collection.to_string(),
            filters: filters.to_vec(),
            tx,
        });
        Ok(LiveSubscription::new(rx))
    }

    async fn query_once(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> Result<Vec<Document>, RemoteError> {
        self.hang_if_unresponsive().await;
        let inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;
        Ok(Self::snapshot(&inner, collection, filters))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RemoteError> {
        self.hang_if_unresponsive().await;
        let inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn transactional_write(&self, steps: Vec<WriteStep>) -> Result<String, RemoteError> {
        self.hang_if_unresponsive().await;
        let mut inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;

        // Validate every guard before applying anything.
        for step in &steps {
            match step {
                WriteStep::Update {
                    collection,
                    id,
                    guards,
                    ..
                } => Self::check_guards(&inner, collection, id, guards)?,
                WriteStep::Delete { collection, id } => {
                    Self::check_guards(&inner, collection, id, &[])?
                }
                WriteStep::Create { .. } => {}
            }
        }

        let mut result_id: Option<String> = None;
        let mut fallback_id: Option<String> = None;
        let mut touched: Vec<String> = Vec::new();

        for step in steps {
            match step {
                WriteStep::Create { collection, fields } => {
                    let id = Uuid::new_v4().simple().to_string();
                    inner
                        .collections
                        .entry(collection.clone())
                        .or_default()
                        .insert(id.clone(), fields);
                    result_id.get_or_insert(id);
                    touched.push(collection);
                }
                WriteStep::Update {
                    collection,
                    id,
                    fields,
                    ..
                } => {
                    if let Some(doc) = inner
                        .collections
                        .entry(collection.clone())
                        .or_default()
                        .get_mut(&id)
                    {
                        Self::merge(doc, fields);
                    }
                    fallback_id.get_or_insert(id);
                    touched.push(collection);
                }
                WriteStep::Delete { collection, id } => {
                    inner
                        .collections
                        .entry(collection.clone())
                        .or_default()
                        .remove(&id);
                    fallback_id.get_or_insert(id);
                    touched.push(collection);
                }
            }
        }

        Self::notify(&mut inner, &touched);
        result_id
            .or(fallback_id)
            .ok_or_else(|| RemoteError::failed_precondition("empty transaction"))
    }

    async fn simple_write(&self, collection: &str, fields: Value) -> Result<String, RemoteError> {
        self.transactional_write(vec![WriteStep::Create {
            collection: collection.to_string(),
            fields,
        }])
        .await
    }

    async fn simple_set(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        self.hang_if_unresponsive().await;
        let mut inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;

        let docs = inner.collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(doc) => Self::merge(doc, fields),
            None => {
                docs.insert(id.to_string(), fields);
            }
        }
        Self::notify(&mut inner, &[collection.to_string()]);
        Ok(())
    }

    async fn simple_update(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        self.hang_if_unresponsive().await;
        let mut inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;

        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| RemoteError::not_found(format!("{collection}/{id}")))?;
        Self::merge(doc, fields);
        Self::notify(&mut inner, &[collection.to_string()]);
        Ok(())
    }

    async fn simple_delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.hang_if_unresponsive().await;
        let mut inner = self.inner.lock().unwrap();
        Self::check_reachable(&inner)?;

        inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .ok_or_else(|| RemoteError::not_found(format!("{collection}/{id}")))?;
        Self::notify(&mut inner, &[collection.to_string()]);
        Ok(())
    }
}
