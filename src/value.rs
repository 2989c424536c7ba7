//! Untyped node configuration values.
//!
//! Node configuration arrives from a parsed document where a number may be
//! encoded as an integer or as a float. Accessors narrow explicitly and
//! accept both encodings for numeric fields.

use std::collections::BTreeMap;
use std::fmt;

/// Configuration mapping of a node: field name to value.
pub type Config = BTreeMap<String, ConfigValue>;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ConfigValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer encoding of a number.
    Int(i64),
    /// Floating-point encoding of a number.
    Float(f64),
    /// String.
    String(String),
    /// Ordered list.
    List(Vec<ConfigValue>),
    /// Nested mapping.
    Map(Config),
}

/// Why a value could not be narrowed to the requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The value has a different type.
    Type(&'static str),
    /// The value is a negative number.
    Negative,
    /// The value is a number with a fractional part, or out of range.
    NotWhole,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Type(expected) => write!(f, "must be a {expected}"),
            Mismatch::Negative => f.write_str("must not be negative"),
            Mismatch::NotWhole => f.write_str("must be a whole number"),
        }
    }
}

impl ConfigValue {
    /// Name of this value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) | ConfigValue::Float(_) => "number",
            ConfigValue::String(_) => "string",
            ConfigValue::List(_) => "list",
            ConfigValue::Map(_) => "map",
        }
    }

    /// The string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean value, if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The list items, if this is a list.
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// The nested mapping, if this is a map.
    pub fn as_map(&self) -> Option<&Config> {
        match self {
            ConfigValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns `true` for either numeric encoding.
    pub fn is_number(&self) -> bool {
        matches!(self, ConfigValue::Int(_) | ConfigValue::Float(_))
    }

    /// Narrow a number to a signed integer, accepting whole floats.
    pub fn to_i64(&self) -> Result<i64, Mismatch> {
        match *self {
            ConfigValue::Int(i) => Ok(i),
            ConfigValue::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
                {
                    Ok(f as i64)
                } else {
                    Err(Mismatch::NotWhole)
                }
            }
            _ => Err(Mismatch::Type("number")),
        }
    }

    /// Narrow a number to a non-negative quantity (size, count, duration).
    pub fn to_quantity(&self) -> Result<u64, Mismatch> {
        if let ConfigValue::Float(f) = *self {
            if f < 0.0 {
                return Err(Mismatch::Negative);
            }
        }
        let i = self.to_i64()?;
        u64::try_from(i).map_err(|_| Mismatch::Negative)
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v.into())
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Config> for ConfigValue {
    fn from(map: Config) -> Self {
        ConfigValue::Map(map)
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for ConfigValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ConfigValue::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
