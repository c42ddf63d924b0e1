//! # Proof-of-History Sequencer
//!
//! A deterministic, verifiable hash chain providing a shared ordering
//! of events without distributed voting (spec.md §4.F), plus the
//! static round-robin leader schedule that rides on top of it
//! (spec.md §4.G). No networking and no locking here — the node
//! coordinator owns the single writer and guards reader access with a
//! short critical section, per spec.md §5.

pub mod sequencer;
pub mod slot;

pub use sequencer::{verify, verify_with_payloads, PohEntry, PohSequencer, PohSnapshot};
pub use slot::{LeaderSchedule, DEFAULT_SLOT_DURATION, DEFAULT_TICKS_PER_SLOT};
