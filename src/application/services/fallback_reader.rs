use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::application::ports::remote_store::{Document, QueryFilter, RemoteStore};

/// Connection state of a live read. `Connecting` is transient: it resolves
/// to `Live` on the first snapshot, or to `OfflineFallback` when the remote
/// errors out or the arming timeout fires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Connecting,
    Live,
    OfflineFallback,
}

/// What a consumer sees at any moment: the state, the documents backing it,
/// and the error that caused a degrade (if any). In fallback the documents
/// are the locally-known ones supplied at spawn time, never an empty screen.
#[derive(Debug, Clone)]
pub struct ReadView {
    pub state: ReadState,
    pub documents: Vec<Document>,
    pub error: Option<String>,
    /// The degrade was caused by connectivity (unreachable, timed out,
    /// feed closed), as opposed to a permission or data error.
    pub offline: bool,
}

impl ReadView {
    fn connecting() -> Self {
        Self {
            state: ReadState::Connecting,
            documents: Vec::new(),
            error: None,
            offline: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state == ReadState::Connecting
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn is_using_fallback(&self) -> bool {
        self.state == ReadState::OfflineFallback
    }

    /// One-line status for display surfaces. Degraded views report the
    /// cause captured in `error`.
    pub fn status_message(&self) -> String {
        match self.state {
            ReadState::Connecting => "connecting to the remote".to_string(),
            ReadState::Live => "live".to_string(),
            ReadState::OfflineFallback => match &self.error {
                Some(cause) => format!("showing local data: {cause}"),
                None => "showing local data".to_string(),
            },
        }
    }
}

/// A self-arming live read over one collection. Subscribes to the remote,
/// publishes every snapshot through a watch channel, and degrades to the
/// supplied fallback documents instead of hanging forever. The degraded
/// view upgrades in place if a snapshot arrives later.
pub struct FallbackReader {
    view: watch::Receiver<ReadView>,
    retry_tx: mpsc::UnboundedSender<()>,
    handle: JoinHandle<()>,
}

impl FallbackReader {
    pub fn spawn(
        remote: Arc<dyn RemoteStore>,
        collection: &str,
        filters: Vec<QueryFilter>,
        fallback: Vec<Document>,
        timeout: Duration,
    ) -> Self {
        let (view_tx, view) = watch::channel(ReadView::connecting());
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(
            remote,
            collection.to_string(),
            filters,
            fallback,
            timeout,
            view_tx,
            retry_rx,
        ));
        Self {
            view,
            retry_tx,
            handle,
        }
    }

    pub fn current(&self) -> ReadView {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> ReadState {
        self.view.borrow().state
    }

    /// Resolves after the next published view change.
    pub async fn changed(&mut self) -> bool {
        self.view.changed().await.is_ok()
    }

    /// Waits until the reader has left `Connecting`, returning the settled
    /// view.
    pub async fn settled(&mut self) -> ReadView {
        loop {
            let view = self.view.borrow().clone();
            if view.state != ReadState::Connecting {
                return view;
            }
            if self.view.changed().await.is_err() {
                return view;
            }
        }
    }

    /// Tears down the current subscription and dials the remote again.
    pub fn retry_connection(&self) {
        let _ = self.retry_tx.send(());
    }

    /// Stops the background task. Dropping the reader does the same.
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for FallbackReader {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    remote: Arc<dyn RemoteStore>,
    collection: String,
    filters: Vec<QueryFilter>,
    fallback: Vec<Document>,
    timeout: Duration,
    view_tx: watch::Sender<ReadView>,
    mut retry_rx: mpsc::UnboundedReceiver<()>,
) {
    loop {
        let mut subscription = match remote.live_query(&collection, &filters).await {
            Ok(sub) => sub,
            Err(err) => {
                tracing::warn!(collection = %collection, error = %err, "live read failed to start, serving fallback");
                let offline = err.is_connectivity();
                if publish_fallback(&view_tx, &fallback, Some(err.to_string()), offline).is_err() {
                    return;
                }
                // Stay degraded until someone asks for a retry.
                if retry_rx.recv().await.is_none() {
                    return;
                }
                continue;
            }
        };

        let arming = tokio::time::sleep(timeout);
        tokio::pin!(arming);
        let mut armed = true;
        let mut want_retry = false;

        loop {
            tokio::select! {
                event = subscription.next() => match event {
                    Some(Ok(documents)) => {
                        armed = false;
                        let send = view_tx.send(ReadView {
                            state: ReadState::Live,
                            documents,
                            error: None,
                            offline: false,
                        });
                        if send.is_err() {
                            return;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(
                            collection = %collection,
                            error = %err,
                            "live read errored, serving fallback"
                        );
                        armed = false;
                        let offline = err.is_connectivity();
                        if publish_fallback(&view_tx, &fallback, Some(err.to_string()), offline)
                            .is_err()
                        {
                            return;
                        }
                    }
                    None => break,
                },
                _ = &mut arming, if armed => {
                    armed = false;
                    if view_tx.borrow().state == ReadState::Connecting {
                        tracing::warn!(
                            collection = %collection,
                            timeout_secs = timeout.as_secs(),
                            "live read never answered, serving fallback"
                        );
                        let cause = format!(
                            "no snapshot within {}s, remote presumed unreachable",
                            timeout.as_secs()
                        );
                        if publish_fallback(&view_tx, &fallback, Some(cause), true).is_err() {
                            return;
                        }
                    }
                }
                request = retry_rx.recv() => match request {
                    Some(()) => {
                        want_retry = true;
                        break;
                    }
                    None => return,
                },
            }
        }

        if !want_retry {
            // Subscription ended on its own; degrade and wait for a retry.
            let cause = Some("live feed closed by the remote".to_string());
            if publish_fallback(&view_tx, &fallback, cause, true).is_err() {
                return;
            }
            if retry_rx.recv().await.is_none() {
                return;
            }
        }
    }
}

fn publish_fallback(
    view_tx: &watch::Sender<ReadView>,
    fallback: &[Document],
    error: Option<String>,
    offline: bool,
) -> std::result::Result<(), watch::error::SendError<ReadView>> {
    view_tx.send(ReadView {
        state: ReadState::OfflineFallback,
        documents: fallback.to_vec(),
        error,
        offline,
    })
}
