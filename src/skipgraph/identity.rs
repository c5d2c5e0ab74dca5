use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-length binary string used for prefix routing.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(String);

impl NameId {
    /// Builds a name from an iterator of bits, most significant first.
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        NameId(
            bits.into_iter()
                .map(|bit| if bit { '1' } else { '0' })
                .collect(),
        )
    }

    /// Left-padded binary form of `num` on `bits` bits.
    pub fn from_num(num: u64, bits: usize) -> Self {
        Self::from_bits((0..bits).rev().map(|i| i < 64 && (num >> i) & 1 == 1))
    }

    pub fn zeros(bits: usize) -> Self {
        NameId("0".repeat(bits))
    }

    /// Integer value of the name. Names longer than 64 bits keep their low 64 bits.
    pub fn to_num(&self) -> u64 {
        self.0
            .bytes()
            .fold(0u64, |acc, b| (acc << 1) | u64::from(b == b'1'))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bit(&self, index: usize) -> Option<bool> {
        self.0.as_bytes().get(index).map(|b| *b == b'1')
    }
}

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NameId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.bytes().all(|b| b == b'0' || b == b'1') {
            Ok(NameId(s.to_string()))
        } else {
            Err(anyhow::anyhow!("name id must be a binary string, got {}", s))
        }
    }
}

/// Length of the shared leading-bit prefix of two names, `None` when their lengths differ.
pub fn common_bits(a: &NameId, b: &NameId) -> Option<usize> {
    if a.len() != b.len() {
        return None;
    }
    Some(
        a.0.bytes()
            .zip(b.0.bytes())
            .take_while(|(x, y)| x == y)
            .count(),
    )
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::Left => 0,
            Direction::Right => 1,
        }
    }
}

/// Routable (address, numID, nameID) triple for a peer or a data item.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub address: String,
    pub num_id: u64,
    pub name_id: NameId,
}

impl Identity {
    pub fn new(address: impl Into<String>, num_id: u64, name_id: NameId) -> Self {
        Self {
            address: address.into(),
            num_id,
            name_id,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.address, self.num_id, self.name_id)
    }
}
