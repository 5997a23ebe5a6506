//! Correlation id generation.
//!
//! Ids are derived from a time-based (version 1) UUID: 60-bit timestamp,
//! 14-bit clock sequence and a 6-byte node value. The canonical UUID text is
//! digested with SHA-256 and the first 16 bytes are hex encoded, giving a
//! fixed 32 character token that reveals nothing about the host.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::{Uuid, Variant, Version};

/// Length of a correlation id in characters.
pub const CORRELATION_ID_LEN: usize = 32;

/// Length of the short id returned by [`IdGenerator::mini`].
pub const MINI_ID_LEN: usize = 6;

/// 100ns intervals between 1582-10-15 and 1970-01-01.
const GREGORIAN_OFFSET: u64 = 0x01B2_1DD2_1381_4000;

const CLOCK_SEQUENCE_MASK: u16 = 0x3fff;

lazy_static! {
    static ref DEFAULT_GENERATOR: IdGenerator = IdGenerator::new();
}

/// Error returned when a string is not a well-formed correlation id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a correlation id (expected 32 lowercase hex characters)")]
pub struct InvalidCorrelationId(pub String);

/// Opaque token referencing a host-side resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidCorrelationId> {
        let value = value.into();
        if Self::is_correlation_id(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidCorrelationId(value))
        }
    }

    /// Shape check only: 32 characters of `[0-9a-f]`.
    pub fn is_correlation_id(value: &str) -> bool {
        value.len() == CORRELATION_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First six characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..MINI_ID_LEN]
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = InvalidCorrelationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = InvalidCorrelationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of 100ns ticks since the Gregorian epoch.
pub trait Clock: Send + Sync {
    fn ticks(&self) -> u64;
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn ticks(&self) -> u64 {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        GREGORIAN_OFFSET + (since_unix.as_nanos() / 100) as u64
    }
}

#[derive(Debug)]
struct ClockState {
    last_ticks: u64,
    sequence: u16,
}

/// Generator of [`CorrelationId`]s.
///
/// Safe to share between threads. The clock-sequence lock is held only while
/// the timestamp and sequence are read and updated.
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    node: [u8; 6],
    state: Mutex<ClockState>,
}

impl IdGenerator {
    /// Generator over the system clock with a random node value.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let mut node = [0u8; 6];
        fill_random(&mut node);
        // Multicast bit marks a node value that is not a real MAC address.
        node[0] |= 0x01;
        Self::with_node(clock, node)
    }

    pub fn with_node(clock: Arc<dyn Clock>, node: [u8; 6]) -> Self {
        let mut seed = [0u8; 2];
        fill_random(&mut seed);
        Self {
            clock,
            node,
            state: Mutex::new(ClockState {
                last_ticks: 0,
                sequence: u16::from_be_bytes(seed) & CLOCK_SEQUENCE_MASK,
            }),
        }
    }

    /// Process-wide generator, created on first use.
    pub fn global() -> &'static IdGenerator {
        &DEFAULT_GENERATOR
    }

    /// Next fresh correlation id.
    pub fn generate(&self) -> CorrelationId {
        let uuid = self.next_uuid();
        let digest = Sha256::digest(uuid.hyphenated().to_string().as_bytes());
        CorrelationId(hex::encode(&digest[..CORRELATION_ID_LEN / 2]))
    }

    /// Six character id for places where global uniqueness is not needed.
    pub fn mini(&self) -> String {
        let mut id = self.generate().0;
        id.truncate(MINI_ID_LEN);
        id
    }

    /// Next version-1 UUID from this generator's clock and node.
    pub fn next_uuid(&self) -> Uuid {
        let (ticks, sequence) = self.observe();

        let time_low = (ticks & 0xffff_ffff) as u32;
        let time_mid = ((ticks >> 32) & 0xffff) as u16;
        let time_high = ((ticks >> 48) & 0x0fff) as u16;

        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&time_low.to_be_bytes());
        bytes[4..6].copy_from_slice(&time_mid.to_be_bytes());
        bytes[6..8].copy_from_slice(&time_high.to_be_bytes());
        bytes[8..10].copy_from_slice(&sequence.to_be_bytes());
        bytes[10..16].copy_from_slice(&self.node);

        uuid::Builder::from_bytes(bytes)
            .with_variant(Variant::RFC4122)
            .with_version(Version::Mac)
            .into_uuid()
    }

    fn observe(&self) -> (u64, u16) {
        let now = self.clock.ticks();
        let mut state = self.state.lock();
        if now <= state.last_ticks {
            state.sequence = state.sequence.wrapping_add(1) & CLOCK_SEQUENCE_MASK;
        }
        state.last_ticks = now;
        (now, state.sequence)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("node", &hex::encode(self.node))
            .finish_non_exhaustive()
    }
}

fn fill_random(dest: &mut [u8]) {
    if let Err(error) = OsRng.try_fill_bytes(dest) {
        // No low-entropy fallback.
        panic!("operating system randomness unavailable: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(ticks: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(ticks)))
        }

        fn set(&self, ticks: u64) {
            self.0.store(ticks, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn ticks(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn clock_sequence(uuid: &Uuid) -> u16 {
        let bytes = uuid.as_bytes();
        u16::from_be_bytes([bytes[8], bytes[9]]) & CLOCK_SEQUENCE_MASK
    }

    #[test]
    fn generated_ids_are_32_lowercase_hex() {
        let generator = IdGenerator::new();
        for _ in 0..100 {
            let id = generator.generate();
            assert_eq!(id.as_str().len(), 32);
            assert!(CorrelationId::is_correlation_id(id.as_str()), "{id}");
        }
    }

    #[test]
    fn mini_ids_are_six_hex_chars() {
        let mini = IdGenerator::global().mini();
        assert_eq!(mini.len(), MINI_ID_LEN);
        assert!(mini.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn uuids_are_version_one() {
        let uuid = IdGenerator::new().next_uuid();
        assert_eq!(uuid.get_version(), Some(Version::Mac));
        assert_eq!(uuid.get_variant(), Variant::RFC4122);
    }

    #[test]
    fn frozen_clock_still_yields_distinct_ids() {
        let clock = ManualClock::at(GREGORIAN_OFFSET + 42);
        let generator = IdGenerator::with_clock(clock);
        let ids: HashSet<_> = (0..1_000).map(|_| generator.generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn clock_going_backwards_bumps_sequence() {
        let clock = ManualClock::at(GREGORIAN_OFFSET + 1_000);
        let generator = IdGenerator::with_node(clock.clone(), [1, 2, 3, 4, 5, 6]);

        let first = generator.next_uuid();
        clock.set(GREGORIAN_OFFSET + 500);
        let second = generator.next_uuid();
        clock.set(GREGORIAN_OFFSET + 2_000);
        let third = generator.next_uuid();

        let seq = clock_sequence(&first);
        assert_eq!(clock_sequence(&second), (seq + 1) & CLOCK_SEQUENCE_MASK);
        assert_eq!(clock_sequence(&third), clock_sequence(&second));
        assert_ne!(first, second);
    }

    #[test]
    fn node_is_embedded_in_uuid() {
        let clock = ManualClock::at(GREGORIAN_OFFSET);
        let generator = IdGenerator::with_node(clock, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let uuid = generator.next_uuid();
        assert_eq!(&uuid.as_bytes()[10..], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(CorrelationId::parse("abc").is_err());
        assert!(CorrelationId::parse("A".repeat(32)).is_err());
        assert!(CorrelationId::parse("g".repeat(32)).is_err());
        assert!(CorrelationId::parse("0123456789abcdef0123456789abcdef").is_ok());
    }

    #[test]
    fn serde_uses_plain_string() {
        let id = IdGenerator::global().generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<CorrelationId>("\"nope\"").is_err());
    }
}
