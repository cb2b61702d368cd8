use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::message::{Hold, Message, MessageRequest};
use crate::transport::Transport;

/// Delivery tuning, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Floor duration: while the current message has been on the board for
    /// less than this, no preemption happens regardless of pending content.
    /// The physical flaps need settle time between flips.
    pub min_hold: Duration,
    /// Pending priority threshold at or above which a message may cut a
    /// current hold short (once the floor has elapsed).
    pub interrupt_priority: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_hold: Duration::from_secs(60),
            interrupt_priority: 8,
        }
    }
}

/// Counters the worker and admission path keep current. Scraped by the
/// service's metrics endpoint.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub admitted: AtomicU64,
    pub expired: AtomicU64,
    pub sent: AtomicU64,
    pub send_failures: AtomicU64,
    pub preemptions: AtomicU64,
}

struct Inner {
    pending: BinaryHeap<Message>,
    next_seq: u64,
    /// Clear-display request: ends the current hold immediately, exempt from
    /// the min_hold floor. Consumed when the worker re-enters its pop phase.
    interrupted: bool,
    shutting_down: bool,
}

/// Accepts messages from any number of producer tasks and drives the single
/// worker that owns the board.
///
/// The pending heap is the only state shared between producers and the
/// worker; everything goes through the one mutex here. [`admit`] never blocks
/// on I/O or on the worker.
///
/// [`admit`]: DeliveryEngine::admit
pub struct DeliveryEngine {
    config: EngineConfig,
    inner: Mutex<Inner>,
    notify: Notify,
    pub stats: EngineStats,
}

impl DeliveryEngine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Mutex::new(Inner {
                pending: BinaryHeap::new(),
                next_seq: 0,
                interrupted: false,
                shutting_down: false,
            }),
            notify: Notify::new(),
            stats: EngineStats::default(),
        })
    }

    /// Admit a rendered message into the pending set.
    ///
    /// Safe to call from any task at any time. After [`shutdown`] this is a
    /// logged no-op.
    ///
    /// [`shutdown`]: DeliveryEngine::shutdown
    pub fn admit(&self, req: MessageRequest) {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        if inner.shutting_down {
            warn!(name = %req.name, "admission after shutdown, dropping");
            return;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let msg = Message::new(seq, req, Instant::now());
        debug!(name = %msg.name, seq, priority = msg.priority, "admitted");
        inner.pending.push(msg);
        drop(inner);
        self.stats.admitted.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Clear-display request: wake the worker and end the current hold
    /// immediately, bypassing the min_hold floor. This is explicit
    /// cancellation (a stop event), not content contention. A no-op while
    /// idle.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        inner.interrupted = true;
        drop(inner);
        self.notify.notify_one();
    }

    /// Signal the worker to exit after finishing or abandoning the current
    /// hold. Remaining pending messages are not drained.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().expect("engine lock poisoned").pending.len()
    }

    /// Discard expired messages from the top of the heap until a deliverable
    /// one (or nothing) remains. Expiry is a pure discard with a log and a
    /// counter bump; it must never influence what the caller does next.
    fn prune_expired(&self, inner: &mut Inner, now: Instant) {
        while inner.pending.peek().is_some_and(|m| m.expired(now)) {
            if let Some(msg) = inner.pending.pop() {
                info!(
                    name = %msg.name,
                    waited_s = now.saturating_duration_since(msg.enqueued_at).as_secs(),
                    timeout_s = msg.timeout.as_secs(),
                    "discarding expired message"
                );
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Pop the best pending message, discarding any that expired while
    /// queued. Returns None when the heap is empty or shutdown was signaled.
    fn pop_valid(&self) -> Result<Option<Message>, ShuttingDown> {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        if inner.shutting_down {
            return Err(ShuttingDown);
        }
        // Re-entering the pop phase consumes any pending interrupt; there is
        // no longer a hold for it to cut short.
        inner.interrupted = false;
        self.prune_expired(&mut inner, Instant::now());
        Ok(inner.pending.pop())
    }

    /// Whether the best deliverable pending message qualifies to preempt the
    /// current one (threshold and strictly higher priority). Expired messages
    /// are pruned before peeking: a message that timed out while the floor
    /// ran may not cut the hold short on its way to the discard pile. The
    /// min_hold floor is the worker's concern, not checked here.
    fn preemption_pending(&self, current_priority: u8) -> bool {
        let mut inner = self.inner.lock().expect("engine lock poisoned");
        self.prune_expired(&mut inner, Instant::now());
        inner.pending.peek().is_some_and(|best| {
            best.priority >= self.config.interrupt_priority && best.priority > current_priority
        })
    }

    fn flags(&self) -> (bool, bool) {
        let inner = self.inner.lock().expect("engine lock poisoned");
        (inner.shutting_down, inner.interrupted)
    }

    /// The worker loop. Run exactly one instance; it is the only task that
    /// ever touches the transport, so sends never overlap.
    pub async fn run(self: Arc<Self>, transport: Arc<dyn Transport>) {
        info!(
            min_hold_s = self.config.min_hold.as_secs(),
            interrupt_priority = self.config.interrupt_priority,
            "delivery worker started"
        );
        loop {
            let msg = match self.pop_valid() {
                Err(ShuttingDown) => break,
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    // IDLE: block until an admission, interrupt, or shutdown.
                    self.notify.notified().await;
                    continue;
                }
            };

            info!(
                name = %msg.name,
                seq = msg.seq,
                priority = msg.priority,
                hold = ?msg.hold,
                "sending to board"
            );
            if let Err(e) = transport.send(&msg.payload).await {
                // Abandoned, not retried; the next pop proceeds immediately.
                warn!(name = %msg.name, error = %e, "send failed");
                self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.stats.sent.fetch_add(1, Ordering::Relaxed);

            if self.hold(&msg).await.is_err() {
                break;
            }
        }
        info!("delivery worker stopped");
    }

    /// HOLDING: keep the sent message current until its hold elapses, a
    /// qualifying preemption fires, or an interrupt/shutdown arrives.
    async fn hold(&self, current: &Message) -> Result<(), ShuttingDown> {
        let hold_start = Instant::now();
        let hold_deadline = match current.hold {
            Hold::For(d) => Some(hold_start + d),
            Hold::UntilInterrupted => None,
        };
        let floor = hold_start + self.config.min_hold;

        loop {
            let (shutting_down, interrupted) = self.flags();
            if shutting_down {
                return Err(ShuttingDown);
            }
            if interrupted {
                debug!(name = %current.name, "hold interrupted");
                return Ok(());
            }

            let now = Instant::now();
            if hold_deadline.is_some_and(|d| now >= d) {
                return Ok(());
            }

            let preempt = self.preemption_pending(current.priority);
            if preempt && now >= floor {
                info!(name = %current.name, "hold preempted by higher-priority message");
                self.stats.preemptions.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }

            // Earliest instant at which anything can change on its own: the
            // hold deadline, or the floor if a qualifying message is already
            // waiting. Notifications wake us sooner.
            let wake_at = match (hold_deadline, preempt) {
                (Some(d), true) => Some(d.min(floor)),
                (Some(d), false) => Some(d),
                (None, true) => Some(floor),
                (None, false) => None,
            };
            match wake_at {
                Some(t) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(t) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }
}

struct ShuttingDown;
