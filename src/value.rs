//! Variable values.
//!
//! A scenario variable is either a 64-bit integer (signed or unsigned) or an
//! opaque byte string. Byte strings are what message payloads substitute and
//! what authentication material (RAND, AUTN, RES, ...) is stored as.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a scenario variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    Uint64,
    /// Arbitrary bytes (or text).
    #[serde(alias = "string")]
    Bytes,
}

impl VarType {
    /// Whether arithmetic and ordered comparison apply to this type.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Uint64)
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64 => write!(f, "int64"),
            Self::Uint64 => write!(f, "uint64"),
            Self::Bytes => write!(f, "bytes"),
        }
    }
}

/// Runtime value held by a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl VarValue {
    /// Build a byte value from text.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Bytes(s.into().into_bytes())
    }

    /// The type this value belongs to.
    #[must_use]
    pub fn var_type(&self) -> VarType {
        match self {
            Self::Int(_) => VarType::Int64,
            Self::Uint(_) => VarType::Uint64,
            Self::Bytes(_) => VarType::Bytes,
        }
    }

    /// Zero value of a type, used for declarations without an initializer.
    #[must_use]
    pub fn zero(ty: VarType) -> Self {
        match ty {
            VarType::Int64 => Self::Int(0),
            VarType::Uint64 => Self::Uint(0),
            VarType::Bytes => Self::Bytes(Vec::new()),
        }
    }

    /// Numeric view widened to `i128`, `None` for bytes.
    #[must_use]
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(i128::from(*v)),
            Self::Uint(v) => Some(i128::from(*v)),
            Self::Bytes(_) => None,
        }
    }

    /// Raw bytes of a byte value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Bytes substituted into an outgoing payload.
    ///
    /// Integers render as decimal text, byte strings verbatim.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        match self {
            Self::Int(v) => v.to_string().into_bytes(),
            Self::Uint(v) => v.to_string().into_bytes(),
            Self::Bytes(b) => b.clone(),
        }
    }

    /// Add `delta` with two's-complement wrap-around, `None` for bytes.
    #[must_use]
    pub fn wrapping_step(&self, delta: i64) -> Option<Self> {
        match self {
            Self::Int(v) => Some(Self::Int(v.wrapping_add(delta))),
            Self::Uint(v) => Some(Self::Uint(v.wrapping_add_signed(delta))),
            Self::Bytes(_) => None,
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "{s:?}"),
                Err(_) => {
                    write!(f, "0x")?;
                    for byte in b {
                        write!(f, "{byte:02x}")?;
                    }
                    Ok(())
                }
            },
        }
    }
}
