//! Request/response correlation over a single long-lived transform worker.
//!
//! Many logical callers share one worker. Each call registers a pending
//! entry under a fresh correlation id, sends the tagged request into the
//! worker's bounded mailbox, and receives its chunk stream back through a
//! per-call channel. Responses are matched purely by id; callers may never
//! assume anything about arrival order relative to other calls.
//!
//! Pending entries carry a deadline and are swept periodically, so a hung
//! worker surfaces as an `Evicted` error instead of leaking callers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task;
use tokio::time::{interval, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::transform;
use crate::types::{TransformChunk, TransformRequest};

const MAILBOX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub chunk_size: usize,
    /// How long a pending call may sit without receiving any chunk before
    /// the sweeper evicts it; every delivered chunk restarts the clock.
    pub call_ttl: Duration,
    pub sweep_period: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            chunk_size: transform::DEFAULT_CHUNK_SIZE,
            call_ttl: Duration::from_secs(300),
            sweep_period: Duration::from_secs(5),
        }
    }
}

struct Envelope {
    id: Uuid,
    request: TransformRequest,
}

enum WorkerReply {
    Chunk(TransformChunk),
    Failed { id: Uuid, reason: String },
}

struct Pending {
    reply: mpsc::UnboundedSender<Result<TransformChunk, DispatchError>>,
    deadline: Instant,
}

type PendingMap = Arc<Mutex<HashMap<Uuid, Pending>>>;

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Envelope>,
    pending: PendingMap,
    call_ttl: Duration,
}

impl Dispatcher {
    /// Starts the worker, the response router, and the eviction sweeper.
    /// All three wind down once the last `Dispatcher` handle is dropped:
    /// the mailbox closes, the worker drains and exits, and the sweeper
    /// notices its map has no owners left.
    pub fn spawn(config: DispatcherConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope>(MAILBOX_DEPTH);
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WorkerReply>();
        let pending: PendingMap = Arc::default();

        let chunk_size = config.chunk_size.max(1);
        tokio::spawn(async move {
            // One request at a time, processed to completion in arrival order.
            while let Some(Envelope { id, request }) = rx.recv().await {
                let chunk_tx = reply_tx.clone();
                let joined = task::spawn_blocking(move || {
                    let mut emit = |chunk: TransformChunk| {
                        let _ = chunk_tx.send(WorkerReply::Chunk(chunk));
                    };
                    transform::run(id, request, chunk_size, &mut emit)
                })
                .await;
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        let _ = reply_tx.send(WorkerReply::Failed {
                            id,
                            reason: err.to_string(),
                        });
                    }
                    Err(err) => {
                        let _ = reply_tx.send(WorkerReply::Failed {
                            id,
                            reason: format!("transform task panicked: {err}"),
                        });
                    }
                }
            }
            debug!("transform worker mailbox closed, worker exiting");
        });

        let route_pending = pending.clone();
        let route_ttl = config.call_ttl;
        tokio::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                route(&route_pending, reply, route_ttl).await;
            }
        });

        let sweep_pending = Arc::downgrade(&pending);
        let sweep_period = config.sweep_period;
        tokio::spawn(async move {
            let mut ticker = interval(sweep_period);
            loop {
                ticker.tick().await;
                let Some(pending) = sweep_pending.upgrade() else {
                    break;
                };
                let now = Instant::now();
                pending.lock().await.retain(|id, entry| {
                    if entry.deadline > now {
                        return true;
                    }
                    warn!(%id, "evicting pending call past its deadline");
                    let _ = entry.reply.send(Err(DispatchError::Evicted));
                    false
                });
            }
        });

        Self {
            tx,
            pending,
            call_ttl: config.call_ttl,
        }
    }

    /// Submits one job and returns a handle to its chunk stream. The id is
    /// never reused while the call is outstanding; the pending entry is
    /// removed exactly once, on the terminal chunk, a failure, or eviction.
    pub async fn call(&self, request: TransformRequest) -> Result<CallHandle, DispatchError> {
        let id = Uuid::new_v4();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        self.pending.lock().await.insert(
            id,
            Pending {
                reply: reply_tx,
                deadline: Instant::now() + self.call_ttl,
            },
        );
        if self.tx.send(Envelope { id, request }).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(DispatchError::WorkerGone);
        }
        Ok(CallHandle { id, rx: reply_rx })
    }
}

async fn route(pending: &PendingMap, reply: WorkerReply, ttl: Duration) {
    match reply {
        WorkerReply::Chunk(chunk) => {
            let id = chunk.id;
            let complete = chunk.complete;
            let mut pending = pending.lock().await;
            match pending.get_mut(&id) {
                Some(entry) => {
                    let delivered = entry.reply.send(Ok(chunk)).is_ok();
                    if complete || !delivered {
                        pending.remove(&id);
                    } else {
                        // A streaming job is alive; only silence is evicted.
                        entry.deadline = Instant::now() + ttl;
                    }
                }
                None => warn!(%id, "dropping chunk for unknown or evicted call"),
            }
        }
        WorkerReply::Failed { id, reason } => {
            let mut pending = pending.lock().await;
            match pending.remove(&id) {
                Some(entry) => {
                    let _ = entry.reply.send(Err(DispatchError::JobFailed(reason)));
                }
                None => error!(%id, %reason, "worker reported failure for unknown call"),
            }
        }
    }
}

/// The caller's side of one outstanding correlation id.
pub struct CallHandle {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Result<TransformChunk, DispatchError>>,
}

impl CallHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next chunk of this call. Yields `None` once the stream has closed,
    /// which is only expected after the terminal chunk was delivered.
    pub async fn recv(&mut self) -> Option<Result<TransformChunk, DispatchError>> {
        self.rx.recv().await
    }

    /// Drains the call to its terminal chunk and returns every chunk seen.
    pub async fn collect(mut self) -> Result<Vec<TransformChunk>, DispatchError> {
        let mut chunks = Vec::new();
        while let Some(message) = self.rx.recv().await {
            let chunk = message?;
            let complete = chunk.complete;
            chunks.push(chunk);
            if complete {
                return Ok(chunks);
            }
        }
        Err(DispatchError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AirBeamReading, CanonicalRecord, FlowPayload};

    fn airbeam_request(sensor: i64, value: f64, rows: usize) -> TransformRequest {
        TransformRequest::AirBeam(
            (0..rows)
                .map(|i| AirBeamReading {
                    sensor,
                    timestamp_ms: 1_675_089_365_000 + i as i64 * 1_000,
                    latitude: 39.1,
                    longitude: -84.5,
                    value,
                })
                .collect(),
        )
    }

    fn dispatcher(chunk_size: usize) -> Dispatcher {
        Dispatcher::spawn(DispatcherConfig {
            chunk_size,
            ..DispatcherConfig::default()
        })
    }

    #[tokio::test]
    async fn concurrent_calls_resolve_by_correlation_id_not_order() {
        let dispatcher = dispatcher(8);

        // issue B before A, then await A's stream first
        let b = dispatcher
            .call(airbeam_request(2, 10.0, 3))
            .await
            .expect("call b");
        let a = dispatcher
            .call(airbeam_request(1, 20.0, 5))
            .await
            .expect("call a");
        assert_ne!(a.id(), b.id());

        let a_chunks = a.collect().await.expect("a chunks");
        let b_chunks = b.collect().await.expect("b chunks");

        let a_rows: Vec<_> = a_chunks.iter().flat_map(|c| c.results.iter()).collect();
        assert_eq!(a_rows.len(), 5);
        for record in a_rows {
            let CanonicalRecord::AirBeam(record) = record else {
                panic!("expected airbeam record");
            };
            assert_eq!(record.sensor, 1);
            assert_eq!(record.value, 20);
        }

        let b_rows: usize = b_chunks.iter().map(|c| c.results.len()).sum();
        assert_eq!(b_rows, 3);
    }

    #[tokio::test]
    async fn chunk_stream_matches_the_emission_contract() {
        let dispatcher = dispatcher(2);
        let handle = dispatcher
            .call(airbeam_request(1, 5.0, 5))
            .await
            .expect("call");
        let chunks = handle.collect().await.expect("chunks");

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].results.len(), 2);
        assert!(!chunks[0].complete);
        assert_eq!(chunks[2].results.len(), 1);
        assert!(chunks[2].complete);
        for chunk in &chunks {
            assert_eq!(chunk.id, chunks[0].id);
        }
    }

    #[tokio::test]
    async fn structurally_invalid_jobs_fail_only_their_own_call() {
        let dispatcher = dispatcher(8);

        let bad = dispatcher
            .call(TransformRequest::Flow(FlowPayload {
                spatial: Vec::new(),
                measures: Vec::new(),
            }))
            .await
            .expect("bad call accepted");
        let good = dispatcher
            .call(airbeam_request(1, 1.0, 1))
            .await
            .expect("good call accepted");

        match bad.collect().await {
            Err(DispatchError::JobFailed(reason)) => {
                assert!(reason.contains("position samples"), "reason: {reason}");
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }

        let chunks = good.collect().await.expect("good call still resolves");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].complete);
    }

    #[tokio::test]
    async fn routed_chunks_push_the_eviction_deadline_back() {
        let pending: PendingMap = Arc::default();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let original = Instant::now() + Duration::from_millis(50);
        pending.lock().await.insert(
            id,
            Pending {
                reply: reply_tx,
                deadline: original,
            },
        );

        let chunk = TransformChunk {
            id,
            complete: false,
            results: Vec::new(),
        };
        route(&pending, WorkerReply::Chunk(chunk), Duration::from_secs(300)).await;

        let deadline = pending
            .lock()
            .await
            .get(&id)
            .map(|entry| entry.deadline)
            .expect("non-terminal chunk keeps the entry");
        assert!(deadline > original, "delivery must restart the ttl clock");
        assert!(reply_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn empty_job_round_trips_a_single_terminal_chunk() {
        let dispatcher = dispatcher(256);
        let chunks = dispatcher
            .call(airbeam_request(1, 0.0, 0))
            .await
            .expect("call")
            .collect()
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].complete);
        assert!(chunks[0].results.is_empty());
    }
}
