//! Dispatch gateway protecting the daemon from bursts.
//!
//! # Dispatch Model
//!
//! Callers enqueue a [`QueuedCall`] and await a oneshot completion. A single dispatcher task
//! owns the pending queues and is the only code path that starts upstream calls:
//!
//! ```text
//! submit() ──► [priority | normal] ──► dispatcher ──► permit (≤ C) ──► spawned upstream call
//!                                          │                                │
//!                                      pacing delay                   caller races it
//!                                                                     against its timeout
//! ```
//!
//! The concurrency ceiling is a counting semaphore with exactly C permits, so the in-flight
//! count cannot exceed C no matter how many callers arrive at once. A permit is held by the
//! spawned call task and released when that call completes or when its caller times out,
//! whichever happens first. A timed-out call keeps running at the transport level; its
//! eventual result is discarded.
//!
//! The dispatcher task is spawned by the first [`DispatchGateway::submit`], so a gateway can be
//! constructed outside a Tokio runtime.
//!
//! The gateway never retries. Retry policy belongs to the callers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore},
    time::Instant,
};

use super::{UpstreamError, UpstreamTransport};
use crate::metrics::MetricsCollector;

/// Gateway tunables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Concurrency ceiling C.
    pub max_in_flight: usize,
    /// Timeout applied when a caller does not specify one.
    pub default_timeout: Duration,
    /// Delay inserted between two successive dispatches.
    pub pacing: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            default_timeout: Duration::from_secs(30),
            pacing: Duration::from_millis(25),
        }
    }
}

/// Per-call submission options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Priority calls are dispatched before every queued non-priority call.
    pub priority: bool,
    /// Overrides [`GatewayConfig::default_timeout`].
    pub timeout: Option<Duration>,
}

impl SubmitOptions {
    #[must_use]
    pub fn priority() -> Self {
        Self { priority: true, timeout: None }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Read-only gateway counters for operational tooling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub pending: usize,
    pub priority_pending: usize,
    pub in_flight: usize,
    pub dispatched_total: u64,
    pub timeouts_total: u64,
}

type Completion = oneshot::Sender<Result<Value, UpstreamError>>;

/// A call waiting for a dispatch slot.
struct QueuedCall {
    method: String,
    params: Vec<Value>,
    timeout: Duration,
    enqueued_at: Instant,
    completion: Completion,
}

#[derive(Default)]
struct PendingQueue {
    priority: VecDeque<QueuedCall>,
    normal: VecDeque<QueuedCall>,
    closed: bool,
}

impl PendingQueue {
    fn pop(&mut self) -> Option<QueuedCall> {
        self.priority.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.priority.len() + self.normal.len()
    }
}

struct GatewayInner {
    transport: Arc<dyn UpstreamTransport>,
    config: GatewayConfig,
    queue: Mutex<PendingQueue>,
    wakeup: Notify,
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
    dispatched_total: AtomicU64,
    timeouts_total: AtomicU64,
    dispatcher_started: AtomicBool,
    metrics: Arc<MetricsCollector>,
}

/// Concurrency-limited, priority-aware front door to the daemon.
///
/// Cheap to clone; all clones share one queue and one dispatcher.
#[derive(Clone)]
pub struct DispatchGateway {
    inner: Arc<GatewayInner>,
}

impl DispatchGateway {
    /// Creates the gateway and spawns its dispatcher on the current tokio runtime.
    #[must_use]
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        mut config: GatewayConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        config.max_in_flight = config.max_in_flight.max(1);
        let inner = Arc::new(GatewayInner {
            transport,
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            queue: Mutex::new(PendingQueue::default()),
            wakeup: Notify::new(),
            in_flight: AtomicUsize::new(0),
            dispatched_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            dispatcher_started: AtomicBool::new(false),
            metrics,
        });

        Self { inner }
    }

    fn ensure_dispatcher(&self) {
        if self.inner.dispatcher_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_dispatcher().await });
    }

    /// Submits a call and waits for its outcome.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Timeout`] when no response arrives within the call's bound, measured
    ///   from the moment the call is dispatched
    /// - [`UpstreamError::Transport`] / [`UpstreamError::Rpc`] /
    ///   [`UpstreamError::InvalidResponse`] as reported by the transport
    /// - [`UpstreamError::QueueClosed`] when the gateway is closed before dispatch
    pub async fn submit(
        &self,
        method: &str,
        params: Vec<Value>,
        options: SubmitOptions,
    ) -> Result<Value, UpstreamError> {
        let (tx, rx) = oneshot::channel();
        let call = QueuedCall {
            method: method.to_string(),
            params,
            timeout: options.timeout.unwrap_or(self.inner.config.default_timeout),
            enqueued_at: Instant::now(),
            completion: tx,
        };

        let depth = {
            let mut queue = self.inner.queue.lock();
            if queue.closed {
                return Err(UpstreamError::QueueClosed);
            }
            if options.priority {
                queue.priority.push_back(call);
            } else {
                queue.normal.push_back(call);
            }
            queue.len()
        };

        tracing::trace!(method = method, priority = options.priority, depth = depth, "call enqueued");
        self.inner.metrics.record_gateway_depth(depth, self.inner.in_flight.load(Ordering::Acquire));
        self.ensure_dispatcher();
        self.inner.wakeup.notify_one();

        rx.await.unwrap_or(Err(UpstreamError::QueueClosed))
    }

    /// Stops accepting calls and rejects everything still queued with
    /// [`UpstreamError::QueueClosed`]. Calls already in flight run to completion.
    pub fn close(&self) {
        let drained: Vec<QueuedCall> = {
            let mut queue = self.inner.queue.lock();
            queue.closed = true;
            let mut drained: Vec<QueuedCall> = queue.priority.drain(..).collect();
            drained.extend(queue.normal.drain(..));
            drained
        };

        if !drained.is_empty() {
            tracing::debug!(rejected = drained.len(), "gateway closed with queued calls");
        }
        for call in drained {
            let _ = call.completion.send(Err(UpstreamError::QueueClosed));
        }
        self.inner.wakeup.notify_one();
    }

    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        let queue = self.inner.queue.lock();
        GatewayStats {
            pending: queue.len(),
            priority_pending: queue.priority.len(),
            in_flight: self.inner.in_flight.load(Ordering::Acquire),
            dispatched_total: self.inner.dispatched_total.load(Ordering::Relaxed),
            timeouts_total: self.inner.timeouts_total.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.inner.config.max_in_flight
    }
}

/// Permit plus the in-flight mirror, released together.
struct InFlightGuard {
    _permit: OwnedSemaphorePermit,
    inner: Arc<GatewayInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let remaining = self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::trace!(in_flight = remaining, "dispatch slot released");
        self.inner.wakeup.notify_one();
    }
}

impl GatewayInner {
    async fn run_dispatcher(self: Arc<Self>) {
        tracing::debug!(
            max_in_flight = self.config.max_in_flight,
            pacing_ms = self.config.pacing.as_millis() as u64,
            "gateway dispatcher started"
        );

        loop {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };

            let next = loop {
                let notified = self.wakeup.notified();
                {
                    let mut queue = self.queue.lock();
                    if let Some(call) = queue.pop() {
                        break Some(call);
                    }
                    if queue.closed {
                        break None;
                    }
                }
                notified.await;
            };

            let Some(call) = next else {
                tracing::debug!("gateway dispatcher stopped");
                break;
            };

            if call.completion.is_closed() {
                tracing::trace!(method = %call.method, "caller gone before dispatch, skipping");
                drop(permit);
                continue;
            }

            let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
            self.dispatched_total.fetch_add(1, Ordering::Relaxed);
            let guard = InFlightGuard { _permit: permit, inner: Arc::clone(&self) };

            tracing::trace!(
                method = %call.method,
                in_flight = in_flight,
                queued_ms = call.enqueued_at.elapsed().as_millis() as u64,
                "call dispatched"
            );

            Arc::clone(&self).dispatch(call, guard);

            if !self.config.pacing.is_zero() {
                tokio::time::sleep(self.config.pacing).await;
            }
        }
    }

    fn dispatch(self: Arc<Self>, call: QueuedCall, guard: InFlightGuard) {
        let QueuedCall { method, params, timeout, completion, .. } = call;

        tokio::spawn(async move {
            let slot = Arc::new(Mutex::new(Some(guard)));
            let upstream_slot = Arc::clone(&slot);
            let transport = Arc::clone(&self.transport);
            let upstream_method = method.clone();
            let started = Instant::now();

            let upstream = tokio::spawn(async move {
                let result = transport.invoke(&upstream_method, &params).await;
                upstream_slot.lock().take();
                result
            });

            let outcome = match tokio::time::timeout(timeout, upstream).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => {
                    tracing::error!(method = %method, error = %join_error, "upstream call task failed");
                    Err(UpstreamError::Transport("upstream call aborted".to_string()))
                }
                Err(_) => {
                    self.timeouts_total.fetch_add(1, Ordering::Relaxed);
                    self.metrics.record_gateway_timeout(&method);
                    tracing::debug!(
                        method = %method,
                        timeout_ms = timeout.as_millis() as u64,
                        "call timed out, discarding late result"
                    );
                    Err(UpstreamError::Timeout)
                }
            };
            slot.lock().take();

            self.metrics.record_upstream_call(&method, started.elapsed(), outcome.as_ref().err());
            let _ = completion.send(outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::testing::ScriptedTransport;
    use serde_json::json;

    fn metrics() -> Arc<MetricsCollector> {
        Arc::new(MetricsCollector::new().unwrap())
    }

    fn gateway(transport: Arc<ScriptedTransport>, config: GatewayConfig) -> DispatchGateway {
        DispatchGateway::new(transport, config, metrics())
    }

    #[test]
    fn test_construction_needs_no_runtime() {
        let gw = gateway(Arc::new(ScriptedTransport::echo()), GatewayConfig::default());
        assert_eq!(gw.stats().pending, 0);
        gw.close();
    }

    #[tokio::test]
    async fn test_submit_returns_transport_result() {
        let transport = Arc::new(ScriptedTransport::echo());
        let gw = gateway(transport.clone(), GatewayConfig::default());

        let value = gw.submit("getblockcount", vec![], SubmitOptions::default()).await.unwrap();
        assert_eq!(value, json!("getblockcount"));
        assert_eq!(gw.stats().dispatched_total, 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| {
            Err(UpstreamError::Rpc { code: -28, message: "Loading block index".into() })
        }));
        let gw = gateway(transport.clone(), GatewayConfig::default());

        let err = gw.submit("getblockcount", vec![], SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Rpc { code: -28, .. }));
        assert_eq!(transport.call_count("getblockcount"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ten_calls_never_exceed_ceiling_of_four() {
        let transport =
            Arc::new(ScriptedTransport::echo().with_latency(Duration::from_millis(40)));
        let gw = gateway(
            transport.clone(),
            GatewayConfig { max_in_flight: 4, pacing: Duration::ZERO, ..Default::default() },
        );

        let sampler = {
            let gw = gw.clone();
            tokio::spawn(async move {
                let mut peak = 0;
                for _ in 0..100 {
                    peak = peak.max(gw.stats().in_flight);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                peak
            })
        };

        let calls: Vec<_> = (0..10)
            .map(|i| {
                let gw = gw.clone();
                tokio::spawn(async move {
                    gw.submit("getblockhash", vec![json!(i)], SubmitOptions::default()).await
                })
            })
            .collect();

        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
        let sampled_peak = sampler.await.unwrap();

        assert!(sampled_peak <= 4, "sampled in-flight {sampled_peak} exceeded ceiling");
        assert!(transport.max_active() <= 4, "transport saw {} concurrent calls", transport.max_active());
        assert_eq!(transport.call_count("getblockhash"), 10);
        assert_eq!(gw.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_priority_calls_dispatch_before_queued_normal_calls() {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(ScriptedTransport::echo().with_gate(gate.clone()));
        let gw = gateway(
            transport.clone(),
            GatewayConfig { max_in_flight: 1, pacing: Duration::ZERO, ..Default::default() },
        );

        // Occupies the single slot so everything else queues up behind it.
        let blocker = {
            let gw = gw.clone();
            tokio::spawn(async move { gw.submit("blocker", vec![], SubmitOptions::default()).await })
        };
        while transport.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let mut handles = Vec::new();
        for (queued, (method, options)) in [
            ("normal-1", SubmitOptions::default()),
            ("normal-2", SubmitOptions::default()),
            ("priority-1", SubmitOptions::priority()),
            ("priority-2", SubmitOptions::priority()),
        ]
        .into_iter()
        .enumerate()
        {
            let submitter = gw.clone();
            handles.push(tokio::spawn(async move { submitter.submit(method, vec![], options).await }));
            while gw.stats().pending <= queued {
                tokio::task::yield_now().await;
            }
        }
        assert_eq!(gw.stats().priority_pending, 2);

        gate.add_permits(5);
        blocker.await.unwrap().unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let order: Vec<String> = transport.calls().into_iter().map(|(m, _)| m).collect();
        assert_eq!(order, ["blocker", "priority-1", "priority-2", "normal-1", "normal-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_slot_and_discards_late_result() {
        let transport =
            Arc::new(ScriptedTransport::echo().with_latency(Duration::from_secs(10)));
        let gw = gateway(
            transport.clone(),
            GatewayConfig { max_in_flight: 1, pacing: Duration::ZERO, ..Default::default() },
        );

        let err = gw
            .submit(
                "gettxoutsetinfo",
                vec![],
                SubmitOptions::default().with_timeout(Duration::from_millis(500)),
            )
            .await
            .unwrap_err();
        assert_eq!(err, UpstreamError::Timeout);
        assert_eq!(gw.stats().timeouts_total, 1);
        assert_eq!(gw.stats().in_flight, 0);

        // The single slot is free again even though the first call is still running.
        let next = gw
            .submit("getblockcount", vec![], SubmitOptions::default().with_timeout(Duration::from_secs(60)))
            .await;
        assert_eq!(next.unwrap(), json!("getblockcount"));
    }

    #[tokio::test]
    async fn test_close_rejects_queued_calls() {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(ScriptedTransport::echo().with_gate(gate.clone()));
        let gw = gateway(
            transport.clone(),
            GatewayConfig { max_in_flight: 1, pacing: Duration::ZERO, ..Default::default() },
        );

        let running = {
            let gw = gw.clone();
            tokio::spawn(async move { gw.submit("first", vec![], SubmitOptions::default()).await })
        };
        while transport.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        let queued = {
            let gw = gw.clone();
            tokio::spawn(async move { gw.submit("second", vec![], SubmitOptions::default()).await })
        };
        while gw.stats().pending == 0 {
            tokio::task::yield_now().await;
        }

        gw.close();
        assert_eq!(queued.await.unwrap().unwrap_err(), UpstreamError::QueueClosed);

        gate.add_permits(1);
        assert!(running.await.unwrap().is_ok());
        assert_eq!(
            gw.submit("third", vec![], SubmitOptions::default()).await.unwrap_err(),
            UpstreamError::QueueClosed
        );
    }
}
