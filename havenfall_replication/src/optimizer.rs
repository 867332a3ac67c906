// Bandwidth-adaptive replication tuning.
//
// Runs only on the authority. From measured relay round-trip latency it
// derives a network-quality tier (Low/Medium/High against fixed thresholds),
// and from tier + peer count it derives the three tunables:
//
// - streamed-frame interval,
// - per-frame entity batch limit (structures/resources per frame),
// - spatial relevance radius (entities outside a peer's radius are left out
//   of that peer's frames).
//
// Tier re-evaluation sits behind a cooldown so a single slow ping cannot
// flap the settings. Property-bag entries accumulate in a pending queue and
// flush when the queue reaches the batch limit or the interval elapses,
// whichever comes first.
//
// All decisions are pure functions of the recorded inputs — timestamps come
// from the caller, never from a clock read here.
//
// See also: `engine.rs`, which records RTT samples from Pong messages and
// asks `frame_due`/`take_due_properties` every pump.

use havenfall_protocol::PropertyEntry;
use log::debug;

/// Network quality tier, from measured round-trip latency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkQuality {
    Low,
    Medium,
    High,
}

/// The three tunables the optimizer controls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptimizerSettings {
    pub frame_interval_ms: u64,
    pub batch_limit: usize,
    pub relevance_radius: f32,
}

/// RTT below this is High quality.
const RTT_HIGH_BELOW_MS: u64 = 60;
/// RTT below this (and above the High threshold) is Medium quality.
const RTT_MEDIUM_BELOW_MS: u64 = 150;
/// Minimum spacing between quality re-evaluations.
const QUALITY_COOLDOWN_MS: u64 = 2_000;
/// Peer counts above this trigger the crowd adjustment.
const CROWD_THRESHOLD: usize = 8;

fn classify(rtt_ms: u64) -> NetworkQuality {
    if rtt_ms < RTT_HIGH_BELOW_MS {
        NetworkQuality::High
    } else if rtt_ms < RTT_MEDIUM_BELOW_MS {
        NetworkQuality::Medium
    } else {
        NetworkQuality::Low
    }
}

fn settings_for(quality: NetworkQuality, peer_count: usize) -> OptimizerSettings {
    let mut settings = match quality {
        NetworkQuality::High => OptimizerSettings {
            frame_interval_ms: 50,
            batch_limit: 64,
            relevance_radius: 120.0,
        },
        NetworkQuality::Medium => OptimizerSettings {
            frame_interval_ms: 100,
            batch_limit: 32,
            relevance_radius: 80.0,
        },
        NetworkQuality::Low => OptimizerSettings {
            frame_interval_ms: 250,
            batch_limit: 16,
            relevance_radius: 48.0,
        },
    };
    // Larger groups pay for fan-out: stretch the interval, shrink frames.
    if peer_count > CROWD_THRESHOLD {
        settings.frame_interval_ms = settings.frame_interval_ms * 3 / 2;
        settings.batch_limit = (settings.batch_limit / 2).max(4);
        settings.relevance_radius *= 0.75;
    }
    settings
}

/// Adapts replication frequency and scope to measured conditions.
#[derive(Debug)]
pub struct BandwidthOptimizer {
    quality: NetworkQuality,
    peer_count: usize,
    settings: OptimizerSettings,
    last_quality_eval_ms: Option<u64>,
    last_frame_ms: Option<u64>,
    last_property_flush_ms: Option<u64>,
    pending: Vec<PropertyEntry>,
}

impl BandwidthOptimizer {
    pub fn new() -> Self {
        let quality = NetworkQuality::Medium;
        let peer_count = 1;
        Self {
            quality,
            peer_count,
            settings: settings_for(quality, peer_count),
            last_quality_eval_ms: None,
            last_frame_ms: None,
            last_property_flush_ms: None,
            pending: Vec::new(),
        }
    }

    pub fn quality(&self) -> NetworkQuality {
        self.quality
    }

    pub fn settings(&self) -> OptimizerSettings {
        self.settings
    }

    /// Feed one RTT sample. Inside the cooldown window this is a no-op;
    /// otherwise the tier is re-derived and, if tier or peer count moved,
    /// the settings are retuned.
    pub fn record_rtt(&mut self, rtt_ms: u64, peer_count: usize, now_ms: u64) {
        if let Some(last) = self.last_quality_eval_ms {
            if now_ms.saturating_sub(last) < QUALITY_COOLDOWN_MS {
                return;
            }
        }
        self.last_quality_eval_ms = Some(now_ms);
        let quality = classify(rtt_ms);
        if quality != self.quality || peer_count != self.peer_count {
            self.quality = quality;
            self.peer_count = peer_count;
            self.settings = settings_for(quality, peer_count);
            debug!(
                "retuned replication: quality={quality:?} peers={peer_count} \
                 interval={}ms batch={} radius={}",
                self.settings.frame_interval_ms,
                self.settings.batch_limit,
                self.settings.relevance_radius,
            );
        }
    }

    /// Whether a streamed frame should go out now. Advances the frame clock
    /// when it returns `true`.
    pub fn frame_due(&mut self, now_ms: u64) -> bool {
        let due = match self.last_frame_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.settings.frame_interval_ms,
            None => true,
        };
        if due {
            self.last_frame_ms = Some(now_ms);
        }
        due
    }

    /// Queue a property entry for the next flush. Re-publishing a key
    /// replaces the queued value (last writer wins, even in the queue).
    pub fn queue_property(&mut self, entry: PropertyEntry) {
        self.pending.retain(|e| e.key != entry.key);
        self.pending.push(entry);
    }

    /// Take the pending property batch if it is due: either the queue
    /// reached the batch limit or the interval elapsed since the last flush.
    pub fn take_due_properties(&mut self, now_ms: u64) -> Option<Vec<PropertyEntry>> {
        if self.pending.is_empty() {
            return None;
        }
        let interval_elapsed = match self.last_property_flush_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.settings.frame_interval_ms,
            None => true,
        };
        if self.pending.len() >= self.settings.batch_limit || interval_elapsed {
            self.last_property_flush_ms = Some(now_ms);
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    pub fn pending_properties(&self) -> usize {
        self.pending.len()
    }
}

impl Default for BandwidthOptimizer {
    fn default() -> Self {
        Self::new()
    }
}
