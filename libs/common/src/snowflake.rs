use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Discord epoch: 2015-01-01T00:00:00Z in milliseconds since Unix epoch.
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1; // 4095

struct State {
    last_ms: u64,
    sequence: u64,
}

/// Generator for Discord-shaped snowflake IDs, rendered as decimal strings
/// the way the platform API serializes them.
///
/// Layout (MSB → LSB):
/// - Bits 63–22: Timestamp (42 bits), ms since Discord epoch
/// - Bits 21–12: Worker + process ID (10 bits)
/// - Bits 11–0:  Sequence (12 bits)
pub struct SnowflakeGenerator {
    worker_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: (worker_id as u64) & ((1 << WORKER_BITS) - 1),
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // A clock step backwards reuses the last timestamp.
        let mut now_ms = current_ms().max(state.last_ms);

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                while now_ms <= state.last_ms {
                    now_ms = current_ms();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;

        let ts = now_ms.saturating_sub(DISCORD_EPOCH_MS);
        (ts << (WORKER_BITS + SEQUENCE_BITS)) | (self.worker_id << SEQUENCE_BITS) | state.sequence
    }

    /// Generate an ID in the decimal string form used on the wire.
    pub fn generate_string(&self) -> String {
        self.generate().to_string()
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(DISCORD_EPOCH_MS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_unique_ids() {
        let gen = SnowflakeGenerator::new(0);
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let id = gen.generate();
            assert!(ids.insert(id), "duplicate snowflake: {id}");
        }
    }

    #[test]
    fn ids_are_monotonically_increasing() {
        let gen = SnowflakeGenerator::new(1);
        let mut prev = 0u64;
        for _ in 0..1_000 {
            let id = gen.generate();
            assert!(id > prev, "not monotonic: {prev} >= {id}");
            prev = id;
        }
    }
}
