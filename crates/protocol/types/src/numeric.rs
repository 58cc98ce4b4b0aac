//! Numeric coercion for values that upstream encodes inconsistently.
//!
//! Peers return amounts (quantity, reward, weave size, difficulty, ...) either as JSON numbers or
//! as decimal strings, and omit them or send `""` when they are zero. Everything is funnelled
//! through [`Numeric::coerce`] so the rules live in one place.

use crate::CoercionError;
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serializer};

/// A numeric value as it may arrive from upstream or from a stored cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Numeric {
    /// The value is absent.
    #[default]
    Unset,
    /// A decimal string. The empty string is zero.
    Text(String),
    /// A machine integer.
    Int(u64),
    /// An already-coerced big integer, passed through untouched.
    Big(U256),
}

impl Numeric {
    /// Coerces the value into an exact [`U256`].
    pub fn coerce(&self) -> Result<U256, CoercionError> {
        match self {
            Self::Unset => Ok(U256::ZERO),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(U256::ZERO);
                }
                if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(CoercionError::NotNumeric(s.clone()));
                }
                U256::from_str_radix(trimmed, 10).map_err(|_| CoercionError::NotNumeric(s.clone()))
            }
            Self::Int(v) => Ok(U256::from(*v)),
            Self::Big(v) => Ok(*v),
        }
    }

    /// Coerces the value into a `u64`, failing if it does not fit.
    pub fn coerce_u64(&self) -> Result<u64, CoercionError> {
        let value = self.coerce()?;
        u64::try_from(value).map_err(|_| CoercionError::Overflow(value.to_string()))
    }
}

impl From<Option<String>> for Numeric {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Unset, Self::Text)
    }
}

impl From<&str> for Numeric {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for Numeric {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<U256> for Numeric {
    fn from(value: U256) -> Self {
        Self::Big(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumeric {
    Int(u64),
    Text(String),
}

impl From<Option<RawNumeric>> for Numeric {
    fn from(raw: Option<RawNumeric>) -> Self {
        match raw {
            None => Self::Unset,
            Some(RawNumeric::Int(v)) => Self::Int(v),
            Some(RawNumeric::Text(s)) => Self::Text(s),
        }
    }
}

/// Serde adapter for [`U256`] fields that accept a JSON number, a decimal string, `""` or `null`.
///
/// Serializes as a decimal string.
pub mod lenient_u256 {
    use super::*;

    /// Serializes the value as a decimal string.
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserializes a lenient numeric value.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = Option::<RawNumeric>::deserialize(deserializer)?;
        Numeric::from(raw).coerce().map_err(serde::de::Error::custom)
    }

    /// Adapter for optional fields: `null` and absent stay `None`, everything else is coerced.
    pub mod option {
        use super::*;

        /// Serializes the value as an optional decimal string.
        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.collect_str(v),
                None => serializer.serialize_none(),
            }
        }

        /// Deserializes an optional lenient numeric value.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            match Option::<RawNumeric>::deserialize(deserializer)? {
                None => Ok(None),
                raw => Numeric::from(raw).coerce().map(Some).map_err(serde::de::Error::custom),
            }
        }
    }
}

/// Serde adapter for `u64` fields that accept a JSON number or a decimal string.
pub mod lenient_u64 {
    use super::*;

    /// Serializes the value as a JSON number.
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    /// Deserializes a lenient numeric value that must fit in 64 bits.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = Option::<RawNumeric>::deserialize(deserializer)?;
        Numeric::from(raw).coerce_u64().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::unset(Numeric::Unset, U256::ZERO)]
    #[case::empty(Numeric::from(""), U256::ZERO)]
    #[case::whitespace(Numeric::from("  "), U256::ZERO)]
    #[case::small(Numeric::from("42"), U256::from(42u64))]
    #[case::int(Numeric::Int(7), U256::from(7u64))]
    #[case::big(Numeric::Big(U256::MAX), U256::MAX)]
    fn test_coerce(#[case] input: Numeric, #[case] expected: U256) {
        assert_eq!(input.coerce().unwrap(), expected);
    }

    #[test]
    fn test_coerce_beyond_u64() {
        let winston = "66000000000000000000000";
        let value = Numeric::from(winston).coerce().unwrap();
        assert_eq!(value.to_string(), winston);
        assert!(Numeric::from(winston).coerce_u64().is_err());
    }

    #[test]
    fn test_coerce_rejects_garbage() {
        assert!(matches!(Numeric::from("12a").coerce(), Err(CoercionError::NotNumeric(_))));
        assert!(matches!(Numeric::from("-1").coerce(), Err(CoercionError::NotNumeric(_))));
    }

    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Amounts {
        #[serde(default, with = "lenient_u256")]
        quantity: U256,
        #[serde(default, with = "lenient_u256::option")]
        weave_size: Option<U256>,
        #[serde(default, with = "lenient_u64")]
        last_retarget: u64,
    }

    #[test]
    fn test_lenient_deserialize_mixed_encodings() {
        let parsed: Amounts =
            serde_json::from_str(r#"{"quantity":"", "weave_size": 1200, "last_retarget": "99"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            Amounts {
                quantity: U256::ZERO,
                weave_size: Some(U256::from(1200u64)),
                last_retarget: 99
            }
        );

        let parsed: Amounts = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.weave_size, None);
        assert_eq!(parsed.quantity, U256::ZERO);
    }

    proptest! {
        #[test]
        fn prop_decimal_strings_roundtrip_exactly(limbs in proptest::array::uniform4(any::<u64>())) {
            let value = U256::from_limbs(limbs);
            let coerced = Numeric::Text(value.to_string()).coerce().unwrap();
            prop_assert_eq!(coerced, value);
        }
    }
}
