use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A finalized grid of board-native character codes, rows × columns.
///
/// Constructed by the renderer, which guarantees every row has the same
/// width. Serializes as the raw array-of-arrays the board's write API
/// expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    pub codes: Vec<Vec<u8>>,
}

impl Grid {
    pub fn rows(&self) -> usize {
        self.codes.len()
    }

    pub fn cols(&self) -> usize {
        self.codes.first().map_or(0, Vec::len)
    }
}

/// How long a message stays on the board once it becomes current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// Fixed hold; the worker moves on when it elapses.
    For(Duration),
    /// Hold until an interrupt or a qualifying preemption. Used for
    /// now-playing content that is cleared by an explicit stop event.
    UntilInterrupted,
}

/// What a producer hands to [`DeliveryEngine::admit`]. The engine stamps
/// the sequence number and admission time itself.
///
/// [`DeliveryEngine::admit`]: crate::engine::DeliveryEngine::admit
#[derive(Debug, Clone)]
pub struct MessageRequest {
    pub name: String,
    /// 0..=10; higher dequeues first.
    pub priority: u8,
    /// Maximum time the message may sit pending before being discarded unseen.
    pub timeout: Duration,
    pub hold: Hold,
    pub payload: Grid,
}

/// One admitted unit of rendered content, immutable from admission until the
/// worker drops it.
#[derive(Debug, Clone)]
pub struct Message {
    pub seq: u64,
    pub name: String,
    pub priority: u8,
    pub enqueued_at: Instant,
    pub timeout: Duration,
    pub hold: Hold,
    pub payload: Grid,
}

impl Message {
    pub(crate) fn new(seq: u64, req: MessageRequest, now: Instant) -> Self {
        Self {
            seq,
            name: req.name,
            priority: req.priority,
            enqueued_at: now,
            timeout: req.timeout,
            hold: req.hold,
            payload: req.payload,
        }
    }

    /// Whether the message sat pending past its timeout.
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.enqueued_at) > self.timeout
    }
}

// Ordering for the pending heap: higher priority first, then earlier
// admission. Sequence numbers are unique, so this is a strict total order
// and heap pops are deterministic under priority ties.
impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Message {}
