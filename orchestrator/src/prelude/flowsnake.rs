use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{Debug, Formatter},
    str::FromStr,
    sync::Mutex,
};

/// A time-ordered 64-bit identifier, written as 13 base32 characters.
///
/// Layout (high to low): 34 bits of unix seconds, 12 bits of worker id,
/// 18 bits of sequence number.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct FlowSnake(pub u64);

pub const TIMESTAMP_BITS: u32 = 34;
pub const WORKER_ID_BITS: u32 = 12;
pub const SEQUENCE_BITS: u32 = 18;

const ENCODED_LEN: usize = 13;

const BASE32_ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

const CHAR_TO_BASE32: [u8; 128] = [
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 255, 255, 255,
    255, 255, 255, 255, 10, 11, 12, 13, 14, 15, 16, 17, 255, 18, 19, 255, 20, 21, 255, 22, 23, 24,
    25, 26, 255, 27, 28, 29, 30, 31, 255, 255, 255, 255, 255, 255, 10, 11, 12, 13, 14, 15, 16, 17,
    255, 18, 19, 255, 20, 21, 255, 22, 23, 24, 25, 26, 255, 27, 28, 29, 30, 31, 255, 255, 255, 255,
    255,
];

struct GeneratorState {
    worker_id: Option<u64>,
    last_time: u64,
    seq: u64,
}

static GENERATOR: Mutex<GeneratorState> = Mutex::new(GeneratorState {
    worker_id: None,
    last_time: 0,
    seq: 0,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidFlowSnake;

impl std::fmt::Display for InvalidFlowSnake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("expected a 13-character base32 id")
    }
}

impl std::error::Error for InvalidFlowSnake {}

impl FlowSnake {
    pub fn new_parts(timestamp: u64, worker_id: u64, seq: u64) -> FlowSnake {
        let n = ((timestamp & ((1 << TIMESTAMP_BITS) - 1)) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | ((worker_id & ((1 << WORKER_ID_BITS) - 1)) << SEQUENCE_BITS)
            | (seq & ((1 << SEQUENCE_BITS) - 1));
        FlowSnake(n)
    }

    pub fn generate() -> FlowSnake {
        let time = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        // a poisoned generator still holds a usable state
        let mut state = GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
        let worker_id = *state.worker_id.get_or_insert_with(rand::random::<u64>);
        let seq = if time <= state.last_time {
            state.seq += 1;
            state.seq
        } else {
            state.last_time = time;
            // leave headroom so that a burst within one second does not wrap
            state.seq = rand::random::<u64>() % ((1 << SEQUENCE_BITS) - (1 << (SEQUENCE_BITS - 2)));
            state.seq
        };

        FlowSnake::new_parts(state.last_time.max(time), worker_id, seq)
    }

    pub fn timestamp(&self) -> u64 {
        self.0 >> (WORKER_ID_BITS + SEQUENCE_BITS)
    }

    pub fn parse(s: &str) -> Result<FlowSnake, InvalidFlowSnake> {
        if s.len() != ENCODED_LEN {
            return Err(InvalidFlowSnake);
        }
        let mut n = 0u64;
        for (idx, ch) in s.bytes().enumerate() {
            let five_bit = *CHAR_TO_BASE32
                .get(ch as usize)
                .ok_or(InvalidFlowSnake)? as u64;
            // 13 * 5 = 65 bits, so the leading character only carries 4 of them
            if five_bit == 255 || (idx == 0 && five_bit > 0xf) {
                return Err(InvalidFlowSnake);
            }
            n = (n << 5) | five_bit;
        }
        Ok(FlowSnake(n))
    }

    fn encode(&self) -> [u8; ENCODED_LEN] {
        let mut buf = [0u8; ENCODED_LEN];
        for (i, slot) in buf.iter_mut().enumerate() {
            let shift = 5 * (ENCODED_LEN - 1 - i);
            *slot = BASE32_ALPHABET[((self.0 >> shift) & 0x1f) as usize];
        }
        buf
    }
}

impl std::fmt::Display for FlowSnake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let buf = self.encode();
        // the alphabet is pure ASCII
        f.write_str(std::str::from_utf8(&buf).map_err(|_| std::fmt::Error)?)
    }
}

impl Debug for FlowSnake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for FlowSnake {
    type Err = InvalidFlowSnake;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowSnake::parse(s)
    }
}

impl Serialize for FlowSnake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

struct FlowSnakeVisitor;

impl<'de> Visitor<'de> for FlowSnakeVisitor {
    type Value = FlowSnake;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("A 13-byte base32 string")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(FlowSnake(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        FlowSnake::parse(v).map_err(|_| {
            serde::de::Error::invalid_value(serde::de::Unexpected::Str(v), &"A 13-byte base32 string")
        })
    }
}

impl<'de> Deserialize<'de> for FlowSnake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FlowSnakeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let id = FlowSnake::new_parts(1_700_000_000, 42, 7);
        let printed = id.to_string();
        assert_eq!(printed.len(), 13);
        assert_eq!(FlowSnake::parse(&printed), Ok(id));
        assert_eq!(FlowSnake::parse(&printed.to_uppercase()), Ok(id));
        assert_eq!(id.timestamp(), 1_700_000_000);
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(FlowSnake::parse("short").is_err());
        assert!(FlowSnake::parse("0000000000ooo").is_err());
        assert!(FlowSnake::parse("z000000000000").is_err());
    }

    #[test]
    fn generated_ids_are_unique_and_ordered_by_time() {
        let a = FlowSnake::generate();
        let b = FlowSnake::generate();
        assert_ne!(a, b);
        assert!(a.timestamp() <= b.timestamp());
    }

    #[test]
    fn serializes_as_string() {
        let id = FlowSnake::new_parts(12345, 1, 2);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: FlowSnake = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
