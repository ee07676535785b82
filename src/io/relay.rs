// src/io/relay.rs
//
// Monitor-in-the-middle relay core.
//
// Bridges a DTE-role and a DCE-role channel. Each channel's read loop holds a
// `Forwarder` that cross-writes freshly read bytes to the peer while the relay
// is relaying and forwarding is on. Operator injections go through the same
// per-channel write locks, so forwarded and injected bytes never interleave.
//
// Phases: Idle -> Relaying -> Closed (terminal). Any read or write failure
// closes the relay; nothing is forwarded afterwards.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::error::{HextermError, HextermResult};
use super::serial::{ChannelWriter, SerialChannel};
use super::types::Role;

// ============================================================================
// Phase
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayPhase {
    /// Channels open, read loops not started yet
    Idle,
    /// Read loops running
    Relaying,
    /// Shut down or failed; terminal
    Closed,
}

impl fmt::Display for RelayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayPhase::Idle => "idle",
            RelayPhase::Relaying => "relaying",
            RelayPhase::Closed => "closed",
        })
    }
}

#[derive(Debug)]
struct RelayShared {
    forwarding: AtomicBool,
    phase: Mutex<RelayPhase>,
}

impl RelayShared {
    fn phase(&self) -> RelayPhase {
        // A poisoned lock only means a holder panicked; treat as closed.
        self.phase.lock().map(|p| *p).unwrap_or(RelayPhase::Closed)
    }

    fn close(&self) -> bool {
        match self.phase.lock() {
            Ok(mut phase) if *phase != RelayPhase::Closed => {
                *phase = RelayPhase::Closed;
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Relay State
// ============================================================================

/// Coordination object for MITM mode.
///
/// Holds the write halves of both channels; the channels themselves stay
/// owned by the session coordinator.
#[derive(Debug)]
pub struct RelayState {
    dce: ChannelWriter,
    dte: ChannelWriter,
    shared: Arc<RelayShared>,
}

impl RelayState {
    /// Create an idle relay over an opened DCE/DTE pair.
    pub fn new(dce: &SerialChannel, dte: &SerialChannel, forwarding: bool) -> HextermResult<Self> {
        if dce.role() != Role::Dce || dte.role() != Role::Dte {
            return Err(HextermError::config(format!(
                "relay needs one DCE and one DTE channel, got {} and {}",
                dce.role(),
                dte.role()
            )));
        }
        Ok(RelayState {
            dce: dce.writer(),
            dte: dte.writer(),
            shared: Arc::new(RelayShared {
                forwarding: AtomicBool::new(forwarding),
                phase: Mutex::new(RelayPhase::Idle),
            }),
        })
    }

    /// Idle -> Relaying. Fails if the relay was already closed.
    pub fn start(&self) -> HextermResult<()> {
        let mut phase = self
            .shared
            .phase
            .lock()
            .map_err(|_| HextermError::config("relay state poisoned"))?;
        match *phase {
            RelayPhase::Idle => {
                *phase = RelayPhase::Relaying;
                tlog!(
                    "[relay] Relaying {} <-> {} (forwarding: {})",
                    self.dte.port(),
                    self.dce.port(),
                    self.forwarding()
                );
                Ok(())
            }
            RelayPhase::Relaying => Ok(()),
            RelayPhase::Closed => Err(HextermError::config("relay is already closed")),
        }
    }

    pub fn phase(&self) -> RelayPhase {
        self.shared.phase()
    }

    pub fn forwarding(&self) -> bool {
        self.shared.forwarding.load(Ordering::SeqCst)
    }

    /// Takes effect for bytes read after this call.
    pub fn set_forwarding(&self, on: bool) {
        self.shared.forwarding.store(on, Ordering::SeqCst);
        tlog!("[relay] Forwarding {}", if on { "enabled" } else { "disabled" });
    }

    /// Flip forwarding and return the new setting.
    pub fn toggle_forwarding(&self) -> bool {
        let on = !self.shared.forwarding.fetch_xor(true, Ordering::SeqCst);
        tlog!("[relay] Forwarding {}", if on { "enabled" } else { "disabled" });
        on
    }

    fn writer_for(&self, role: Role) -> &ChannelWriter {
        match role {
            Role::Dce => &self.dce,
            Role::Dte => &self.dte,
        }
    }

    /// Forwarder for the read loop of the channel with role `source`.
    pub fn forwarder_for(&self, source: Role) -> Forwarder {
        Forwarder {
            target: self.writer_for(source.peer()).clone(),
            shared: self.shared.clone(),
        }
    }

    /// Write operator bytes to the channel with role `target`.
    /// A write failure closes the relay.
    pub fn inject(&self, target: Role, bytes: &[u8]) -> HextermResult<()> {
        let writer = self.writer_for(target);
        if self.phase() != RelayPhase::Relaying {
            return Err(HextermError::port_io(
                writer.port(),
                std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    format!("relay is {}", self.phase()),
                ),
            ));
        }
        writer.write_all(bytes).inspect_err(|e| {
            if self.shared.close() {
                tlog!("[relay] Closed after inject failure: {}", e);
            }
        })
    }

    /// Move to Closed. Idempotent.
    pub fn close(&self) {
        if self.shared.close() {
            tlog!("[relay] Closed");
        }
    }
}

// ============================================================================
// Forwarder
// ============================================================================

/// Per-read-loop handle that cross-writes to the peer channel
#[derive(Debug, Clone)]
pub struct Forwarder {
    target: ChannelWriter,
    shared: Arc<RelayShared>,
}

impl Forwarder {
    /// Sample the forwarding rule. Read loops call this before each read so a
    /// toggle never reaches bytes already in flight.
    pub fn enabled(&self) -> bool {
        self.shared.forwarding.load(Ordering::SeqCst)
    }

    /// Forward one freshly read chunk under `enabled`, the rule sampled before
    /// the read. Returns whether the bytes were written to the peer.
    pub fn forward(&self, bytes: &[u8], enabled: bool) -> HextermResult<bool> {
        if !enabled || self.shared.phase() != RelayPhase::Relaying {
            return Ok(false);
        }
        self.target.write_all(bytes)?;
        Ok(true)
    }

    /// Close the relay after a failure on this loop's channel.
    pub fn close_relay(&self) {
        if self.shared.close() {
            tlog!("[relay] Closed by channel failure (peer {})", self.target.port());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::{mock_channel, SharedBuf, TrickleWriter};

    fn relay_pair(forwarding: bool) -> (RelayState, SharedBuf, SharedBuf) {
        let dce_out = SharedBuf::default();
        let dte_out = SharedBuf::default();
        let dce = mock_channel("dce0", Role::Dce, vec![], dce_out.clone());
        let dte = mock_channel("dte0", Role::Dte, vec![], dte_out.clone());
        let relay = RelayState::new(&dce, &dte, forwarding).unwrap();
        (relay, dce_out, dte_out)
    }

    #[test]
    fn test_phase_transitions() {
        let (relay, _, _) = relay_pair(true);
        assert_eq!(relay.phase(), RelayPhase::Idle);
        relay.start().unwrap();
        assert_eq!(relay.phase(), RelayPhase::Relaying);
        relay.close();
        assert_eq!(relay.phase(), RelayPhase::Closed);
        assert!(relay.start().is_err());
        relay.close();
        assert_eq!(relay.phase(), RelayPhase::Closed);
    }

    #[test]
    fn test_forwarder_writes_to_peer_in_order() {
        let (relay, dce_out, dte_out) = relay_pair(true);
        relay.start().unwrap();

        let from_dte = relay.forwarder_for(Role::Dte);
        assert!(from_dte.forward(&[0x01, 0x02], from_dte.enabled()).unwrap());
        assert!(from_dte.forward(&[0x03], from_dte.enabled()).unwrap());
        assert_eq!(dce_out.contents(), vec![0x01, 0x02, 0x03]);
        assert!(dte_out.contents().is_empty());
    }

    #[test]
    fn test_forwarding_disabled_writes_nothing() {
        let (relay, dce_out, dte_out) = relay_pair(false);
        relay.start().unwrap();

        let from_dce = relay.forwarder_for(Role::Dce);
        assert!(!from_dce.forward(&[0x01, 0x02], from_dce.enabled()).unwrap());
        assert!(dce_out.contents().is_empty());
        assert!(dte_out.contents().is_empty());
    }

    #[test]
    fn test_toggle_applies_to_later_chunks() {
        let (relay, _, dte_out) = relay_pair(true);
        relay.start().unwrap();
        let from_dce = relay.forwarder_for(Role::Dce);

        from_dce.forward(&[0xAA], from_dce.enabled()).unwrap();
        assert!(!relay.toggle_forwarding());
        from_dce.forward(&[0xBB], from_dce.enabled()).unwrap();
        relay.set_forwarding(true);
        from_dce.forward(&[0xCC], from_dce.enabled()).unwrap();

        assert_eq!(dte_out.contents(), vec![0xAA, 0xCC]);
    }

    #[test]
    fn test_rule_sampled_before_toggle_still_applies() {
        let (relay, _, dte_out) = relay_pair(true);
        relay.start().unwrap();
        let from_dce = relay.forwarder_for(Role::Dce);

        // Chunk read under "on"; the toggle lands before it is forwarded
        let rule = from_dce.enabled();
        relay.set_forwarding(false);
        assert!(from_dce.forward(&[0x11], rule).unwrap());
        assert!(!from_dce.forward(&[0x22], from_dce.enabled()).unwrap());

        assert_eq!(dte_out.contents(), vec![0x11]);
    }

    #[test]
    fn test_forwarded_and_injected_writes_never_interleave() {
        const ROUNDS: usize = 300;
        const CHUNK: usize = 48;

        // The writer takes a few bytes per call, so only the channel lock
        // keeps a chunk contiguous
        let dce_out = SharedBuf::default();
        let dce = SerialChannel::from_parts(
            "dce0",
            Role::Dce,
            Box::new(std::io::empty()),
            Box::new(TrickleWriter::new(dce_out.clone(), 3)),
        );
        let dte = mock_channel("dte0", Role::Dte, vec![], SharedBuf::default());
        let relay = Arc::new(RelayState::new(&dce, &dte, true).unwrap());
        relay.start().unwrap();

        let from_dte = relay.forwarder_for(Role::Dte);
        let forwarding = std::thread::spawn(move || {
            for _ in 0..ROUNDS {
                assert!(from_dte.forward(&[0xAA; CHUNK], true).unwrap());
            }
        });
        let injecting = {
            let relay = relay.clone();
            std::thread::spawn(move || {
                for _ in 0..ROUNDS {
                    relay.inject(Role::Dce, &[0x55; CHUNK]).unwrap();
                }
            })
        };
        forwarding.join().unwrap();
        injecting.join().unwrap();

        let out = dce_out.contents();
        assert_eq!(out.len(), 2 * ROUNDS * CHUNK);
        for chunk in out.chunks(CHUNK) {
            assert!(chunk.iter().all(|&b| b == chunk[0]), "interleaved chunk {:02x?}", chunk);
        }
        let forwarded = out.chunks(CHUNK).filter(|c| c[0] == 0xAA).count();
        assert_eq!(forwarded, ROUNDS);
    }

    #[test]
    fn test_no_forwarding_before_start_or_after_close() {
        let (relay, dce_out, _) = relay_pair(true);
        let from_dte = relay.forwarder_for(Role::Dte);
        assert!(!from_dte.forward(&[0x01], true).unwrap());

        relay.start().unwrap();
        from_dte.close_relay();
        assert_eq!(relay.phase(), RelayPhase::Closed);
        assert!(!from_dte.forward(&[0x02], true).unwrap());
        assert!(dce_out.contents().is_empty());
    }

    #[test]
    fn test_inject_targets_one_channel() {
        let (relay, dce_out, dte_out) = relay_pair(true);
        relay.start().unwrap();

        relay.inject(Role::Dte, &[0x48, 0x65]).unwrap();
        assert_eq!(dte_out.contents(), vec![0x48, 0x65]);
        assert!(dce_out.contents().is_empty());

        relay.close();
        assert!(matches!(relay.inject(Role::Dce, &[0x01]), Err(HextermError::PortIo { .. })));
    }

    #[test]
    fn test_rejects_mismatched_roles() {
        let a = mock_channel("a", Role::Dce, vec![], SharedBuf::default());
        let b = mock_channel("b", Role::Dce, vec![], SharedBuf::default());
        assert!(RelayState::new(&a, &b, true).is_err());
    }
}
