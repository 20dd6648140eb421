//! Time-Sorted ID generation
//!
//! A TSID is a 64-bit value: 42 bits of milliseconds since 2020-01-01 UTC
//! followed by 22 random bits. It is rendered as 13 Crockford Base32
//! characters, so lexical order matches creation order.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const TSID_EPOCH_MILLIS: u64 = 1_577_836_800_000;
const RANDOM_BITS: u32 = 22;
const TSID_LEN: usize = 13;

static LAST: AtomicU64 = AtomicU64::new(0);

pub struct TsidGenerator;

impl TsidGenerator {
    /// Generate a new TSID string, strictly greater than any previously generated in this process
    pub fn generate() -> String {
        Self::encode(Self::next_value())
    }

    fn next_value() -> u64 {
        let millis = (chrono::Utc::now().timestamp_millis() as u64).saturating_sub(TSID_EPOCH_MILLIS);
        let random: u64 = rand::thread_rng().gen_range(0..(1u64 << RANDOM_BITS));
        let candidate = (millis << RANDOM_BITS) | random;

        let mut last = LAST.load(Ordering::Relaxed);
        loop {
            let next = if candidate > last { candidate } else { last + 1 };
            match LAST.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn encode(value: u64) -> String {
        let mut out = [0u8; TSID_LEN];
        for (i, slot) in out.iter_mut().enumerate() {
            let shift = 5 * (TSID_LEN - 1 - i) as u32;
            *slot = ALPHABET[((value >> shift) & 0x1F) as usize];
        }
        out.iter().map(|&b| b as char).collect()
    }

    pub fn is_valid(id: &str) -> bool {
        id.len() == TSID_LEN && id.bytes().all(|b| ALPHABET.contains(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let id = TsidGenerator::generate();
        assert_eq!(id.len(), 13);
        assert!(TsidGenerator::is_valid(&id));
    }

    #[test]
    fn test_monotonic() {
        let ids: Vec<String> = (0..1000).map(|_| TsidGenerator::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(!TsidGenerator::is_valid("not-a-tsid"));
        assert!(!TsidGenerator::is_valid("0123456789ABU"));
    }
}
