use std::fmt;

use crate::error::HarnessError;
use crate::TbResult;

/// Four-state logic bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Logic {
    Zero,
    One,
    #[default]
    X,
    Z,
}

impl Logic {
    pub fn to_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
            Logic::Z => 'z',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'u' | '-' => Some(Logic::X),
            'z' => Some(Logic::Z),
            _ => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }
}

impl From<bool> for Logic {
    fn from(b: bool) -> Self {
        if b {
            Logic::One
        } else {
            Logic::Zero
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// A fixed-width vector of [`Logic`] bits, LSB first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Value {
    bits: Vec<Logic>,
}

impl Value {
    pub const MAX_WIDTH: usize = 64;

    pub fn filled(width: usize, bit: Logic) -> Self {
        Self { bits: vec![bit; width] }
    }

    pub fn unknown(width: usize) -> Self {
        Self::filled(width, Logic::X)
    }

    pub fn bit(bit: Logic) -> Self {
        Self { bits: vec![bit] }
    }

    /// Builds a value from the low `width` bits of `v`.
    pub fn from_u64(width: usize, v: u64) -> Self {
        let bits = (0..width)
            .map(|i| Logic::from(i < 64 && (v >> i) & 1 == 1))
            .collect();
        Self { bits }
    }

    /// Parses a binary string, MSB first. `_` and a leading `0b` are ignored.
    pub fn from_bin(s: &str) -> TbResult<Self> {
        let stripped = s.trim_start_matches("0b").replace('_', "");
        let mut bits = Vec::with_capacity(stripped.len());
        for c in stripped.chars().rev() {
            let bit = Logic::from_char(c).ok_or_else(|| HarnessError::InvalidValue {
                value: s.to_string(),
            })?;
            bits.push(bit);
        }
        if bits.is_empty() || bits.len() > Self::MAX_WIDTH {
            return Err(HarnessError::InvalidValue {
                value: s.to_string(),
            });
        }
        Ok(Self { bits })
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn get(&self, index: usize) -> Logic {
        self.bits.get(index).copied().unwrap_or(Logic::X)
    }

    pub fn lsb(&self) -> Logic {
        self.get(0)
    }

    pub fn is_known(&self) -> bool {
        self.bits.iter().all(|b| b.is_known())
    }

    /// Integer interpretation, `None` if any bit is X or Z.
    pub fn to_u64(&self) -> Option<u64> {
        let mut out = 0u64;
        for (i, bit) in self.bits.iter().enumerate() {
            match bit {
                Logic::One => out |= 1 << i,
                Logic::Zero => {}
                _ => return None,
            }
        }
        Some(out)
    }

    /// MSB-first binary string.
    pub fn bin(&self) -> String {
        self.bits.iter().rev().map(|b| b.to_char()).collect()
    }
}

impl From<Logic> for Value {
    fn from(bit: Logic) -> Self {
        Value::bit(bit)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width() == 1 {
            write!(f, "'{}'", self.lsb())
        } else {
            write!(f, "\"{}\"", self.bin())
        }
    }
}
