//! Proof-of-History sequencer: a deterministic, verifiable hash chain,
//! per spec.md §3/§4.F.

use eastsea_crypto::{sha256, Hash};

/// A single recorded step in the PoH chain. `num_hashes == 1` marks a
/// mix-in entry (the payload is not retained here; see
/// `verify_with_payloads` for the accompanying-payload variant named
/// in spec.md §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PohEntry {
    pub hash: Hash,
    pub num_hashes: u64,
}

/// The sequencer's running state: current hash, tick count, and the
/// recorded entry log. A single writer advances this; readers observe
/// `snapshot()` under a short critical section (spec.md §5) — the lock
/// itself lives one layer up, in the node coordinator, so this type
/// stays plain and easy to unit test.
#[derive(Debug, Clone)]
pub struct PohSequencer {
    current_hash: Hash,
    tick_count: u64,
    entries: Vec<PohEntry>,
}

/// A read-only snapshot of the sequencer's clock, taken atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PohSnapshot {
    pub current_hash: Hash,
    pub tick_count: u64,
}

impl PohSequencer {
    /// Start a fresh sequencer from `seed` (conventionally the genesis
    /// block hash or a random startup value).
    pub fn new(seed: Hash) -> Self {
        Self {
            current_hash: seed,
            tick_count: 0,
            entries: Vec::new(),
        }
    }

    /// Advance one tick: `current_hash <- sha256(current_hash)`.
    pub fn tick(&mut self) {
        self.current_hash = sha256(&self.current_hash);
        self.tick_count += 1;
    }

    /// Mix external data into the chain: `current_hash <-
    /// sha256(current_hash || data)`.
    pub fn mix_in(&mut self, data: &[u8]) {
        let mut buf = Vec::with_capacity(32 + data.len());
        buf.extend_from_slice(&self.current_hash);
        buf.extend_from_slice(data);
        self.current_hash = sha256(&buf);
        self.tick_count += 1;
    }

    /// Record the current hash as an entry covering `num_hashes` prior
    /// advances (either a batch of ticks, or a single mix-in).
    pub fn record_entry(&mut self, num_hashes: u64) {
        self.entries.push(PohEntry {
            hash: self.current_hash,
            num_hashes,
        });
    }

    pub fn snapshot(&self) -> PohSnapshot {
        PohSnapshot {
            current_hash: self.current_hash,
            tick_count: self.tick_count,
        }
    }

    pub fn entries(&self) -> &[PohEntry] {
        &self.entries
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn current_hash(&self) -> Hash {
        self.current_hash
    }
}

/// Verify a pure-tick entry sequence starting from `initial_hash`:
/// replaying each entry's declared `num_hashes` of `sha256` from the
/// running hash must produce the entry's recorded hash (spec.md §4.F).
/// Pure and re-entrant — takes no lock, touches no sequencer state.
pub fn verify(initial_hash: Hash, entries: &[PohEntry]) -> bool {
    let mut running = initial_hash;
    for entry in entries {
        for _ in 0..entry.num_hashes {
            running = sha256(&running);
        }
        if running != entry.hash {
            return false;
        }
    }
    true
}

/// Verify a sequence that may contain mix-in entries, given the
/// payload mixed in at each such entry (`None` for a pure-tick entry).
/// `payloads[i]` corresponds to `entries[i]`; a mix-in entry with a
/// missing payload cannot be verified by hashing alone (spec.md §4.F)
/// and is treated as a failure rather than silently skipped.
pub fn verify_with_payloads(
    initial_hash: Hash,
    entries: &[PohEntry],
    payloads: &[Option<Vec<u8>>],
) -> bool {
    if entries.len() != payloads.len() {
        return false;
    }
    let mut running = initial_hash;
    for (entry, payload) in entries.iter().zip(payloads) {
        match payload {
            None => {
                for _ in 0..entry.num_hashes {
                    running = sha256(&running);
                }
            }
            Some(data) => {
                if entry.num_hashes != 1 {
                    return false;
                }
                let mut buf = Vec::with_capacity(32 + data.len());
                buf.extend_from_slice(&running);
                buf.extend_from_slice(data);
                running = sha256(&buf);
            }
        }
        if running != entry.hash {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_hash_and_count() {
        let mut seq = PohSequencer::new([0u8; 32]);
        let before = seq.snapshot();
        seq.tick();
        assert_eq!(seq.tick_count(), before.tick_count + 1);
        assert_eq!(seq.current_hash(), sha256(&before.current_hash));
    }

    #[test]
    fn mix_in_folds_data_into_running_hash() {
        let mut seq = PohSequencer::new([0u8; 32]);
        let before = seq.current_hash();
        seq.mix_in(b"tx");
        let mut expected_input = before.to_vec();
        expected_input.extend_from_slice(b"tx");
        assert_eq!(seq.current_hash(), sha256(&expected_input));
        assert_eq!(seq.tick_count(), 1);
    }

    #[test]
    fn verifier_accepts_a_legal_tick_batch() {
        let seed = [3u8; 32];
        let mut seq = PohSequencer::new(seed);
        for _ in 0..64 {
            seq.tick();
        }
        seq.record_entry(64);
        assert!(verify(seed, seq.entries()));
    }

    #[test]
    fn verifier_rejects_a_flipped_bit() {
        let seed = [3u8; 32];
        let mut seq = PohSequencer::new(seed);
        for _ in 0..10 {
            seq.tick();
        }
        seq.record_entry(10);
        let mut tampered = seq.entries().to_vec();
        tampered[0].hash[0] ^= 0x01;
        assert!(!verify(seed, &tampered));
    }

    /// spec.md §8 scenario S4: 100 ticks, one mix-in, 100 more ticks.
    #[test]
    fn scenario_s4_full_sequence_then_tamper() {
        let seed = [7u8; 32];
        let mut seq = PohSequencer::new(seed);
        for _ in 0..100 {
            seq.tick();
        }
        seq.record_entry(100);
        seq.mix_in(b"tx");
        seq.record_entry(1);
        for _ in 0..100 {
            seq.tick();
        }
        seq.record_entry(100);

        let payloads = vec![None, Some(b"tx".to_vec()), None];
        assert!(verify_with_payloads(seed, seq.entries(), &payloads));

        let mut tampered = seq.entries().to_vec();
        let last = tampered.len() - 1;
        tampered[last].hash[0] ^= 0xFF;
        assert!(!verify_with_payloads(seed, &tampered, &payloads));
    }

    #[test]
    fn pure_tick_verify_ignores_mix_in_semantics_and_still_matches_hash_chain() {
        // A mix-in entry's hash is still a valid output of one more
        // sha256 application over *some* input, but `verify` only ever
        // replays sha256(running) num_hashes times — so a mix-in entry
        // (data-dependent) will not match unless num_hashes happens to
        // coincide, which it won't here.
        let seed = [1u8; 32];
        let mut seq = PohSequencer::new(seed);
        seq.mix_in(b"payload");
        seq.record_entry(1);
        assert!(!verify(seed, seq.entries()));
    }
}
