use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::infrastructure::queue::DrainOutcome;
use crate::shared::config::SyncConfig;
use crate::shared::error::Result;

/// A service owning one named queue slot. The driver never inspects the
/// queued payloads; each participant replays its own operations.
#[async_trait]
pub trait SyncParticipant: Send + Sync {
    fn slot(&self) -> &str;
    async fn pending(&self) -> Result<u32>;
    async fn sync_pending(&self) -> Result<DrainOutcome>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotReport {
    pub slot: String,
    pub attempted: u32,
    pub replayed: u32,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub ran_at: DateTime<Utc>,
    pub slots: Vec<SlotReport>,
}

impl SyncReport {
    pub fn fully_drained(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.remaining == 0 && slot.error.is_none())
    }
}

/// Lightweight snapshot for status surfaces (settings page, diagnostics).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    /// Slot failures accumulated since startup.
    pub error_count: u64,
}

/// Periodic sync driver: drains every registered slot once immediately,
/// then again on a fixed interval. Entries that fail to replay stay queued
/// for the next cycle; nothing is dropped.
pub struct SyncService {
    participants: Vec<Arc<dyn SyncParticipant>>,
    interval: Duration,
    last_report: RwLock<Option<SyncReport>>,
    is_syncing: AtomicBool,
    error_count: AtomicU64,
}

impl SyncService {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            participants: Vec::new(),
            interval: config.sync_interval(),
            last_report: RwLock::new(None),
            is_syncing: AtomicBool::new(false),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn register(&mut self, participant: Arc<dyn SyncParticipant>) {
        self.participants.push(participant);
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().ok().and_then(|r| r.clone())
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            is_syncing: self.is_syncing.load(Ordering::SeqCst),
            last_sync: self.last_report().map(|report| report.ran_at),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }

    /// Pending counts per slot, for status surfaces.
    pub async fn pending_counts(&self) -> Result<Vec<(String, u32)>> {
        let mut counts = Vec::with_capacity(self.participants.len());
        for participant in &self.participants {
            counts.push((participant.slot().to_string(), participant.pending().await?));
        }
        Ok(counts)
    }

    /// Runs one sync cycle across all slots. A slot that errors is reported
    /// and skipped; the cycle always visits every slot.
    pub async fn sync_once(&self) -> SyncReport {
        self.is_syncing.store(true, Ordering::SeqCst);
        let mut slots = Vec::with_capacity(self.participants.len());
        for participant in &self.participants {
            let slot = participant.slot().to_string();
            match participant.sync_pending().await {
                Ok(outcome) => {
                    if outcome.attempted > 0 {
                        tracing::info!(
                            slot = %slot,
                            attempted = outcome.attempted,
                            replayed = outcome.replayed,
                            remaining = outcome.remaining,
                            "sync cycle drained slot"
                        );
                    }
                    slots.push(SlotReport {
                        slot,
                        attempted: outcome.attempted,
                        replayed: outcome.replayed,
                        remaining: outcome.remaining,
                        error: None,
                    });
                }
                Err(err) => {
                    tracing::error!(slot = %slot, error = %err, "sync cycle failed for slot");
                    self.error_count.fetch_add(1, Ordering::SeqCst);
                    slots.push(SlotReport {
                        slot,
                        attempted: 0,
                        replayed: 0,
                        remaining: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let report = SyncReport {
            ran_at: Utc::now(),
            slots,
        };
        if let Ok(mut last) = self.last_report.write() {
            *last = Some(report.clone());
        }
        self.is_syncing.store(false, Ordering::SeqCst);
        report
    }

    /// Spawns the periodic loop. The first cycle runs immediately; stop it
    /// by aborting the returned handle.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sync_once().await;
            }
        })
    }
}
