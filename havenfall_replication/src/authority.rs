// Authority election and hand-off.
//
// Exactly one peer at a time is the authority: it runs the simulation tick,
// streams volatile fields, and owns the property bag. `AuthorityCoordinator`
// tracks who that is on each peer, through the states
//
//   NoAuthority -> Active(peer) -> Migrating -> Active(new peer)
//
// Election rule: the surviving peer with the lowest id. No vote is exchanged.
// This is only valid because of two transport facts, both provided by the
// relay: actor ids are assigned monotonically (so the lowest id is the
// longest-lived peer, and a joiner can never displace a live authority), and
// membership events arrive on the same ordered stream as everything else, so
// every peer sees the same membership at every point in its message history.
// If the transport ever stopped delivering membership changes in a single
// order, peers could disagree about the authority — the rule leans on the
// ordering guarantee, deliberately and explicitly.
//
// Authority loss is not fatal: the departed peer's mirror stays serviceable
// everywhere, the new authority announces itself with a snapshot sync, and
// the only player-visible effect is a bounded staleness window.
//
// See also: `engine.rs`, which feeds membership events in and reacts when
// the local peer is elected.

use havenfall_world::types::PeerId;
use std::collections::BTreeSet;

/// Where the authority currently lives, as this peer understands it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthorityState {
    /// No peers known yet (before the handshake completes) or none left.
    #[default]
    NoAuthority,
    /// This peer id is the authority.
    Active(PeerId),
    /// The authority disappeared; a successor has not been chosen yet.
    Migrating { departed: PeerId },
}

/// Tracks the authority through membership changes.
#[derive(Clone, Debug, Default)]
pub struct AuthorityCoordinator {
    state: AuthorityState,
}

impl AuthorityCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AuthorityState {
        self.state
    }

    /// The current authority, if any.
    pub fn current(&self) -> Option<PeerId> {
        match self.state {
            AuthorityState::Active(peer) => Some(peer),
            _ => None,
        }
    }

    /// Initial election when this peer joins and learns the membership list.
    /// The first peer to establish the session has the lowest id and becomes
    /// (or already is) the authority.
    pub fn establish(&mut self, members: &BTreeSet<PeerId>) -> Option<PeerId> {
        let elected = members.iter().next().copied();
        self.state = match elected {
            Some(peer) => AuthorityState::Active(peer),
            None => AuthorityState::NoAuthority,
        };
        elected
    }

    /// A peer left. If it was the authority, enter `Migrating`; the caller
    /// follows up with `elect()`. Returns `true` if migration started.
    pub fn begin_migration(&mut self, departed: PeerId) -> bool {
        if self.state == AuthorityState::Active(departed) {
            self.state = AuthorityState::Migrating { departed };
            true
        } else {
            false
        }
    }

    /// Deterministically pick the new authority from the survivors: lowest
    /// surviving id wins, everywhere, without a message exchanged.
    pub fn elect(&mut self, remaining: &BTreeSet<PeerId>) -> Option<PeerId> {
        let elected = remaining.iter().next().copied();
        self.state = match elected {
            Some(peer) => AuthorityState::Active(peer),
            None => AuthorityState::NoAuthority,
        };
        elected
    }
}
