//! Snowflake ID Generator
//!
//! Time-ordered 63-bit unique IDs: 41 bits of milliseconds since a custom
//! epoch, 5 bits of machine ID, 5 bits of node ID, 12 bits of sequence.
//! Time ordering gives message paging a stable tie-break for equal
//! timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Custom epoch (2015-01-01T00:00:00.000Z)
const EPOCH_MS: u64 = 1_420_070_400_000;

const MACHINE_BITS: u64 = 5;
const NODE_BITS: u64 = 5;
const SEQUENCE_BITS: u64 = 12;

const MACHINE_SHIFT: u64 = NODE_BITS + SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u64 = MACHINE_BITS + NODE_BITS + SEQUENCE_BITS;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Default)]
struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

/// Snowflake ID generator.
///
/// Sequence bookkeeping sits behind one small mutex; the critical section is
/// a few arithmetic operations, and the generator is shared via `Arc`.
pub struct SnowflakeGenerator {
    machine_id: u64,
    node_id: u64,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    pub fn new(machine_id: u64, node_id: u64) -> Self {
        Self {
            machine_id: machine_id & ((1 << MACHINE_BITS) - 1),
            node_id: node_id & ((1 << NODE_BITS) - 1),
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// Generate the next ID.
    pub fn generate(&self) -> i64 {
        let now = current_millis();

        let mut state = self.state.lock();
        let sequence = if now == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            state.sequence
        } else {
            state.last_timestamp = now;
            state.sequence = 0;
            0
        };
        drop(state);

        let id = ((now - EPOCH_MS) << TIMESTAMP_SHIFT)
            | (self.machine_id << MACHINE_SHIFT)
            | (self.node_id << SEQUENCE_BITS)
            | sequence;

        id as i64
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the Unix epoch")
        .as_millis() as u64
}

/// Milliseconds-since-Unix-epoch encoded in an ID.
pub fn extract_timestamp(snowflake: i64) -> u64 {
    ((snowflake as u64) >> TIMESTAMP_SHIFT) + EPOCH_MS
}
