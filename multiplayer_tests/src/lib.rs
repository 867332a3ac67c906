// Test-only peer harness for multiplayer integration tests.
//
// Wraps a real `ReplicationEngine` with a synthetic clock and blocking poll
// helpers, so tests can exercise the full pipeline —
// peer -> relay -> fan-out -> validator replay -> converged mirrors —
// through exactly the code paths the live game uses. The only test-specific
// pieces are the clock (10 synthetic ms per tick, so regrowth and frame
// cadences are controllable) and the timeout loops.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use havenfall_replication::ReplicationEngine;
use havenfall_world::config::{SeedResource, WorldConfig};
use havenfall_world::types::{GridPos, ResourceKind};

/// Wall-clock bound on any blocking wait.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Real sleep between pump rounds, leaving the relay threads room to run.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Synthetic milliseconds the engine clock advances per tick.
pub const TICK_MS: u64 = 10;

/// The world config every test peer runs: a small grid and two seeded
/// nodes, with regrowth delays short enough to cross inside a test.
pub fn test_config() -> WorldConfig {
    let mut config = WorldConfig::default();
    config.grid_size = (16, 16);
    for spec in &mut config.resource_specs {
        spec.regrowth_delay_ms = 200;
    }
    config.seed_resources = vec![
        SeedResource {
            position: GridPos::new(3, 0, 3),
            kind: ResourceKind::Wood,
            amount: 10,
        },
        SeedResource {
            position: GridPos::new(5, 0, 5),
            kind: ResourceKind::Stone,
            amount: 25,
        },
    ];
    config
}

/// One test peer: a real engine plus a synthetic monotonic clock.
pub struct TestPeer {
    pub engine: ReplicationEngine,
    now_ms: u64,
}

impl TestPeer {
    /// Connect with the shared test config.
    pub fn connect(addr: SocketAddr, name: &str) -> Self {
        Self::connect_with_config(addr, name, test_config())
    }

    pub fn connect_with_config(addr: SocketAddr, name: &str, config: WorldConfig) -> Self {
        let engine = ReplicationEngine::connect(&addr.to_string(), name, config, None)
            .expect("TestPeer::connect failed");
        Self { engine, now_ms: 0 }
    }

    /// One pump at the current synthetic time, then advance the clock.
    pub fn tick(&mut self) {
        self.engine.pump(self.now_ms);
        self.now_ms += TICK_MS;
    }

    /// Pump a fixed number of rounds with real sleeps in between.
    pub fn pump_for(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.tick();
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }
}

/// Pump every peer until `cond` holds, panicking after `POLL_TIMEOUT`.
pub fn pump_until(
    peers: &mut [&mut TestPeer],
    what: &str,
    mut cond: impl FnMut(&[&mut TestPeer]) -> bool,
) {
    let start = Instant::now();
    loop {
        for peer in peers.iter_mut() {
            peer.tick();
        }
        if cond(peers) {
            return;
        }
        assert!(
            start.elapsed() < POLL_TIMEOUT,
            "timed out waiting for {what}"
        );
        thread::sleep(POLL_INTERVAL);
    }
}
