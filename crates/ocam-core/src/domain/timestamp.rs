//! Presentation-timestamp reconciliation.
//!
//! The device stamps every packet with its own capture clock (microseconds
//! since some device-defined epoch).  The host cannot compare that clock with
//! its own, so each stream is re-anchored after every (re)connect: the first
//! eligible packet fixes an offset such that its presentation time equals the
//! local monotonic clock at receipt, and every later packet keeps the same
//! offset.
//!
//! Video and audio each own a reconciler.  They are not cross-synchronised;
//! both are simply derived from the same local clock.

use crate::protocol::messages::StreamKind;

/// Nanoseconds per device timestamp unit (the device counts microseconds).
pub const DEVICE_UNIT_NS: i64 = 1_000;

/// Which device timestamps may anchor the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorPolicy {
    /// Zero is reserved as the restart sentinel and never anchors (video).
    NonZeroOnly,
    /// The first packet anchors unconditionally (audio).
    AnyTimestamp,
}

impl From<StreamKind> for AnchorPolicy {
    fn from(kind: StreamKind) -> Self {
        if kind.has_restart_sentinel() {
            AnchorPolicy::NonZeroOnly
        } else {
            AnchorPolicy::AnyTimestamp
        }
    }
}

/// Scales a device timestamp to nanoseconds, saturating on overflow.
pub fn device_to_ns(device_ts: u64) -> i64 {
    i64::try_from(device_ts)
        .unwrap_or(i64::MAX)
        .saturating_mul(DEVICE_UNIT_NS)
}

/// Per-stream `(first_packet_seen, offset)` pair.
///
/// The offset is only meaningful once [`is_anchored`](Self::is_anchored)
/// returns `true`; before that it is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampReconciler {
    policy: AnchorPolicy,
    anchored: bool,
    offset_ns: i64,
}

impl TimestampReconciler {
    pub fn new(policy: AnchorPolicy) -> Self {
        Self {
            policy,
            anchored: false,
            offset_ns: 0,
        }
    }

    /// Forgets the anchor; the next eligible packet computes a fresh offset.
    pub fn reset(&mut self) {
        self.anchored = false;
        self.offset_ns = 0;
    }

    /// Whether the offset has been fixed since the last reset.
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// The current offset in nanoseconds (zero until anchored).
    pub fn offset_ns(&self) -> i64 {
        self.offset_ns
    }

    /// Observes one packet and returns its presentation time in local-clock
    /// nanoseconds.
    ///
    /// `now_ns` is the local monotonic clock at receipt; it is only consulted
    /// when this packet becomes the anchor.
    pub fn observe(&mut self, device_ts: u64, now_ns: i64) -> i64 {
        let scaled = device_to_ns(device_ts);
        if !self.anchored && self.may_anchor(device_ts) {
            self.offset_ns = now_ns.saturating_sub(scaled);
            self.anchored = true;
        }
        self.presentation_time_ns(device_ts)
    }

    /// Maps a device timestamp through the current offset without anchoring.
    pub fn presentation_time_ns(&self, device_ts: u64) -> i64 {
        device_to_ns(device_ts).saturating_add(self.offset_ns)
    }

    fn may_anchor(&self, device_ts: u64) -> bool {
        match self.policy {
            AnchorPolicy::NonZeroOnly => device_ts != 0,
            AnchorPolicy::AnyTimestamp => true,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
