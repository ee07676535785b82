// src/io/types.rs
//
// Shared types: directional tags, the immutable Message unit, sink events
// and the cooperative stop signal used by every loop.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};

use super::codec::{self, CodecSpec};

// ============================================================================
// Roles and Directions
// ============================================================================

/// Role of a channel in MITM mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Dce,
    Dte,
}

impl Role {
    pub fn peer(self) -> Role {
        match self {
            Role::Dce => Role::Dte,
            Role::Dte => Role::Dce,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Dce => "DCE",
            Role::Dte => "DTE",
        })
    }
}

/// Direction tag carried by every Message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
    RelayedToDce,
    RelayedToDte,
    InjectedToDce,
    InjectedToDte,
}

const DIRECTION_LABELS: [(Direction, &str); 6] = [
    (Direction::Sent, "TX"),
    (Direction::Received, "RX"),
    (Direction::RelayedToDce, "DTE>DCE"),
    (Direction::RelayedToDte, "DCE>DTE"),
    (Direction::InjectedToDce, "INJ>DCE"),
    (Direction::InjectedToDte, "INJ>DTE"),
];

impl Direction {
    /// Tag for bytes read from the channel with role `source`
    pub fn relayed_from(source: Role) -> Direction {
        match source {
            Role::Dte => Direction::RelayedToDce,
            Role::Dce => Direction::RelayedToDte,
        }
    }

    /// Tag for operator bytes written to the channel with role `target`
    pub fn injected_to(target: Role) -> Direction {
        match target {
            Role::Dce => Direction::InjectedToDce,
            Role::Dte => Direction::InjectedToDte,
        }
    }

    /// Role the traffic is heading to, if the tag names one
    pub fn destination(self) -> Option<Role> {
        match self {
            Direction::RelayedToDce | Direction::InjectedToDce => Some(Role::Dce),
            Direction::RelayedToDte | Direction::InjectedToDte => Some(Role::Dte),
            Direction::Sent | Direction::Received => None,
        }
    }

    pub fn label(self) -> &'static str {
        DIRECTION_LABELS
            .iter()
            .find(|(d, _)| *d == self)
            .map(|(_, l)| *l)
            .unwrap_or("?")
    }

    pub fn from_label(label: &str) -> Option<Direction> {
        DIRECTION_LABELS
            .iter()
            .find(|(_, l)| l.eq_ignore_ascii_case(label.trim()))
            .map(|(d, _)| *d)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Message
// ============================================================================

/// One displayable/loggable unit of traffic. Immutable once built.
#[derive(Clone, Debug)]
pub struct Message {
    timestamp: Option<DateTime<Local>>,
    direction: Direction,
    payload: Arc<[u8]>,
    hex: String,
    text: String,
}

impl Message {
    pub fn new(direction: Direction, payload: Vec<u8>, codec: CodecSpec, timestamps: bool) -> Self {
        let (hex, text) = codec::decode(codec, &payload);
        Message {
            timestamp: timestamps.then(Local::now),
            direction,
            payload: payload.into(),
            hex,
            text,
        }
    }

    pub fn timestamp(&self) -> Option<&DateTime<Local>> {
        self.timestamp.as_ref()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

// ============================================================================
// Sink Events
// ============================================================================

/// Everything the single-writer sink can be asked to write
#[derive(Clone, Debug)]
pub enum SinkEvent {
    /// Traffic, written to the console and the log file
    Message(Message),
    /// Operator-facing notice (errors, help, status), console only
    Notice(String),
}

/// Sender side of the sink queue, cloned into every producer
pub type SinkSender = mpsc::Sender<SinkEvent>;

// ============================================================================
// Stop Signal
// ============================================================================

/// Shared, cooperative shutdown flag.
///
/// Blocking loops poll `is_set` between reads; async tasks await `wait`.
#[derive(Clone, Debug)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        StopSignal { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has been triggered (immediately if it already was).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_direction_labels_roundtrip() {
        for (dir, label) in DIRECTION_LABELS {
            assert_eq!(dir.label(), label);
            assert_eq!(Direction::from_label(label), Some(dir));
        }
        assert_eq!(Direction::from_label(" dce>dte "), Some(Direction::RelayedToDte));
        assert_eq!(Direction::from_label("2026-01-01"), None);
    }

    #[test]
    fn test_direction_by_role() {
        assert_eq!(Direction::relayed_from(Role::Dte), Direction::RelayedToDce);
        assert_eq!(Direction::relayed_from(Role::Dce), Direction::RelayedToDte);
        assert_eq!(Direction::injected_to(Role::Dte), Direction::InjectedToDte);
        assert_eq!(Direction::InjectedToDte.destination(), Some(Role::Dte));
        assert_eq!(Direction::Received.destination(), None);
        assert_eq!(Role::Dte.peer(), Role::Dce);
    }

    #[test]
    fn test_message_renders_payload() {
        let msg = Message::new(Direction::Received, vec![0x48, 0x69, 0x00], CodecSpec::Latin1, false);
        assert!(msg.timestamp().is_none());
        assert_eq!(msg.payload(), &[0x48, 0x69, 0x00]);
        assert_eq!(msg.hex(), "48 69 00");
        assert_eq!(msg.text(), "Hi.");

        let stamped = Message::new(Direction::Sent, vec![], CodecSpec::Latin1, true);
        assert!(stamped.timestamp().is_some());
    }

    #[tokio::test]
    async fn test_stop_signal_wakes_waiters() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());

        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.wait().await })
        };
        stop.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not wake")
            .unwrap();
        assert!(stop.is_set());

        // Already-set signal resolves immediately
        tokio::time::timeout(Duration::from_millis(100), stop.wait())
            .await
            .expect("wait on a set signal should not block");
    }
}
