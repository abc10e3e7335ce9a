//! Session id generation.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Symbols used by chunked ids, indexed by the random value of each character.
pub const ID_ALPHABET: &[u8; 64] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-,";

/// Longest id accepted by [`is_well_formed`].
pub const MAX_ID_LENGTH: usize = 256;

const CHUNK_COUNT: usize = 5;
const MIN_CHUNK_LEN: usize = 4;
const MAX_CHUNK_LEN: usize = 12;

/// How new session ids are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdStrategy {
    /// Version-4 UUID
    #[default]
    Uuid,
    /// Five dash-joined chunks of 4 to 12 characters each
    Chunked {
        /// Random bits consumed per character (4, 5 or 6)
        bits_per_character: u8,
    },
}

impl IdStrategy {
    /// Bits per character used when none is configured.
    pub const DEFAULT_BITS: u8 = 5;

    /// Chunked strategy with the given bits per character.
    pub const fn chunked(bits_per_character: u8) -> Self {
        IdStrategy::Chunked { bits_per_character }
    }
}

/// Produces unguessable, transport-safe session ids.
///
/// All randomness comes from [`rand::rng`], a CSPRNG seeded from the
/// operating system. Uniqueness is not enforced here; strict hosts check new
/// ids against the store through `validate_id`.
///
/// # Examples
///
/// ```
/// use armature_dbsession::{IdGenerator, IdStrategy, is_well_formed};
///
/// let generator = IdGenerator::new(IdStrategy::chunked(5)).with_prefix("app-");
/// let id = generator.create();
/// assert!(id.starts_with("app-"));
/// assert!(is_well_formed(&id));
/// ```
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    prefix: String,
    strategy: IdStrategy,
}

impl IdGenerator {
    /// Create a generator with no prefix.
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            prefix: String::new(),
            strategy,
        }
    }

    /// Set the string prepended to every id.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// The configured strategy.
    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    /// Generate a new id.
    pub fn create(&self) -> String {
        let body = match self.strategy {
            IdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Chunked { bits_per_character } => {
                chunked_id(bits_per_character.clamp(4, 6))
            }
        };
        format!("{}{}", self.prefix, body)
    }
}

fn chunked_id(bits: u8) -> String {
    let mut rng = rand::rng();
    let chunks: Vec<String> = (0..CHUNK_COUNT)
        .map(|_| {
            let len = rng.random_range(MIN_CHUNK_LEN..=MAX_CHUNK_LEN);
            let mut bytes = vec![0u8; (len * bits as usize).div_ceil(8)];
            rng.fill_bytes(&mut bytes);
            encode_bits(&bytes, bits, len)
        })
        .collect();
    chunks.join("-")
}

/// Map `len` consecutive `bits`-wide groups of `bytes` through [`ID_ALPHABET`].
///
/// Groups are taken least-significant bit first. `bytes` must hold at least
/// `len * bits` bits.
fn encode_bits(bytes: &[u8], bits: u8, len: usize) -> String {
    let bits = u32::from(bits);
    let mask = (1u32 << bits) - 1;
    let mut out = String::with_capacity(len);
    let mut acc = 0u32;
    let mut have = 0u32;
    let mut input = bytes.iter();

    while out.len() < len {
        if have < bits {
            match input.next() {
                Some(byte) => {
                    acc |= u32::from(*byte) << have;
                    have += 8;
                }
                None => break,
            }
        }
        out.push(ID_ALPHABET[(acc & mask) as usize] as char);
        acc >>= bits;
        have -= bits;
    }

    out
}

/// Whether `c` may appear in a session id.
pub fn is_safe_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == ','
}

/// Syntax check for a candidate session id.
///
/// Accepts non-empty ids of at most [`MAX_ID_LENGTH`] characters drawn from
/// `0-9`, `a-z`, `A-Z`, `-` and `,`.
pub fn is_well_formed(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LENGTH && id.chars().all(is_safe_id_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_strategy_is_v4() {
        let id = IdGenerator::new(IdStrategy::Uuid).create();
        let parsed = uuid::Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_prefix_is_prepended() {
        let id = IdGenerator::new(IdStrategy::Uuid).with_prefix("web,").create();
        assert!(id.starts_with("web,"));
        assert!(is_well_formed(&id));
    }

    #[test]
    fn test_chunked_shape() {
        for bits in 4..=6 {
            let generator = IdGenerator::new(IdStrategy::chunked(bits));
            for _ in 0..200 {
                let id = generator.create();
                let chunks: Vec<&str> = id.split('-').filter(|c| !c.is_empty()).collect();
                // '-' is also an alphabet symbol at 6 bits
                if bits < 6 {
                    assert_eq!(chunks.len(), CHUNK_COUNT, "{}", id);
                    for chunk in chunks {
                        assert!((MIN_CHUNK_LEN..=MAX_CHUNK_LEN).contains(&chunk.len()));
                    }
                }
                assert!(is_well_formed(&id), "{}", id);
            }
        }
    }

    #[test]
    fn test_chunked_reachable_alphabet() {
        let generator = IdGenerator::new(IdStrategy::chunked(4));
        for _ in 0..100 {
            let id = generator.create();
            assert!(id.chars().all(|c| c == '-' || (c.is_ascii_hexdigit() && !c.is_ascii_uppercase())));
        }
    }

    #[test]
    fn test_encode_bits_lsb_first() {
        // 0b1111_1010, 0b0000_0001 → groups 11010 (26), 01111 (15)
        assert_eq!(encode_bits(&[0b1111_1010, 0b0000_0001], 5, 2), "qf");
        assert_eq!(encode_bits(&[0xff, 0xff, 0xff], 6, 4), ",,,,");
        assert_eq!(encode_bits(&[0x21], 4, 2), "12");
    }

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed("abc-DEF,123"));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("has space"));
        assert!(!is_well_formed("semi;colon"));
        assert!(!is_well_formed(&"a".repeat(MAX_ID_LENGTH + 1)));
    }
}
