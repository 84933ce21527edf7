use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::application::ports::actor::{Actor, ActorProvider};
use crate::application::ports::remote_store::{Document, QueryFilter, RemoteStore};
use crate::application::services::fallback_reader::FallbackReader;
use crate::domain::value_objects::is_local_id;
use crate::infrastructure::cache::LocalMirror;
use crate::infrastructure::queue::PendingQueue;
use crate::shared::config::SyncConfig;
use crate::shared::error::{AppError, Result};

/// Published when a locally-queued create lands remotely, so consumers can
/// rewrite references that still point at the temporary id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdReconciliation {
    pub collection: String,
    pub local_id: String,
    pub remote_id: String,
}

/// Explicitly constructed sync context shared by every service: the remote
/// port, the durable queue's pool, the in-memory mirror, the acting user, and
/// configuration. One instance per database; no module-level state.
#[derive(Clone)]
pub struct SyncContext {
    remote: Arc<dyn RemoteStore>,
    pool: SqlitePool,
    mirror: Arc<LocalMirror>,
    actor: Arc<dyn ActorProvider>,
    config: SyncConfig,
    reconciliations: broadcast::Sender<IdReconciliation>,
    reconciled: Arc<RwLock<HashMap<String, String>>>,
}

impl SyncContext {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        pool: SqlitePool,
        actor: Arc<dyn ActorProvider>,
        config: SyncConfig,
    ) -> Self {
        let (reconciliations, _) = broadcast::channel(64);
        Self {
            remote,
            pool,
            mirror: Arc::new(LocalMirror::new()),
            actor,
            config,
            reconciliations,
            reconciled: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        self.remote.clone()
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn queue(&self, slot: &str) -> PendingQueue {
        PendingQueue::new(self.pool.clone(), slot)
    }

    pub fn actor(&self) -> Result<Actor> {
        self.actor
            .current_actor()
            .ok_or_else(|| AppError::Unauthorized("no signed-in actor".to_string()))
    }

    /// Fallback-aware reader over a collection, using the configured timeout.
    pub fn reader(
        &self,
        collection: &str,
        filters: Vec<QueryFilter>,
        fallback_data: Vec<Document>,
    ) -> FallbackReader {
        FallbackReader::spawn(
            self.remote.clone(),
            collection,
            filters,
            fallback_data,
            self.config.read_timeout(),
        )
    }

    pub fn subscribe_reconciliations(&self) -> broadcast::Receiver<IdReconciliation> {
        self.reconciliations.subscribe()
    }

    /// Maps a possibly-local id to its reconciled remote id, if known.
    pub fn resolve_id(&self, id: &str) -> String {
        if !is_local_id(id) {
            return id.to_string();
        }
        let reconciled = self.reconciled.read().unwrap();
        reconciled.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    pub(crate) fn record_reconciliation(&self, collection: &str, local_id: &str, remote_id: &str) {
        {
            let mut reconciled = self.reconciled.write().unwrap();
            reconciled.insert(local_id.to_string(), remote_id.to_string());
        }
        self.mirror.remove(collection, local_id);
        // No receivers is fine; the mapping above still serves replay.
        let _ = self.reconciliations.send(IdReconciliation {
            collection: collection.to_string(),
            local_id: local_id.to_string(),
            remote_id: remote_id.to_string(),
        });
        tracing::info!(
            collection,
            local_id,
            remote_id,
            "reconciled temporary id after replay"
        );
    }
}
