//! Lenient number deserializers for judge responses.
//!
//! The judge reports `time` as a string (`"0.012"`) and `memory` as a number,
//! and either may be `null`. Anything that is not a usable number becomes
//! `None` instead of failing the whole response.

use serde::{de, de::Visitor, Deserializer};
use std::{fmt, marker::PhantomData, str::FromStr};

/// A number type that can be read leniently.
pub trait LenientNumber: FromStr + Sized {
    fn from_f64(v: f64) -> Option<Self>;
    fn from_i64(v: i64) -> Option<Self>;
    fn from_u64(v: u64) -> Option<Self>;
    fn usable(&self) -> bool;
}

impl LenientNumber for f64 {
    fn from_f64(v: f64) -> Option<Self> {
        Some(v)
    }
    fn from_i64(v: i64) -> Option<Self> {
        Some(v as f64)
    }
    fn from_u64(v: u64) -> Option<Self> {
        Some(v as f64)
    }
    fn usable(&self) -> bool {
        self.is_finite()
    }
}

impl LenientNumber for u64 {
    fn from_f64(v: f64) -> Option<Self> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
            Some(v as u64)
        } else {
            None
        }
    }
    fn from_i64(v: i64) -> Option<Self> {
        u64::try_from(v).ok()
    }
    fn from_u64(v: u64) -> Option<Self> {
        Some(v)
    }
    fn usable(&self) -> bool {
        true
    }
}

/// Deserialize a number, a numeric string or `null` into `Option<T>`.
/// Use together with `#[serde(default)]`.
pub fn lenient_number<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: LenientNumber,
    D: Deserializer<'de>,
{
    struct LenientVisitor<T>(PhantomData<fn() -> T>);

    macro_rules! forward_number {
        ($ident:ident, $ty:ty, $conv:ident, $as:ty) => {
            fn $ident<E>(self, v: $ty) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(T::$conv(v as $as).filter(|n| n.usable()))
            }
        };
    }

    impl<'de, T> Visitor<'de> for LenientVisitor<T>
    where
        T: LenientNumber,
    {
        type Value = Option<T>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, a numeric string or null")
        }

        forward_number!(visit_i8, i8, from_i64, i64);
        forward_number!(visit_i16, i16, from_i64, i64);
        forward_number!(visit_i32, i32, from_i64, i64);
        forward_number!(visit_i64, i64, from_i64, i64);
        forward_number!(visit_u8, u8, from_u64, u64);
        forward_number!(visit_u16, u16, from_u64, u64);
        forward_number!(visit_u32, u32, from_u64, u64);
        forward_number!(visit_u64, u64, from_u64, u64);
        forward_number!(visit_f32, f32, from_f64, f64);
        forward_number!(visit_f64, f64, from_f64, f64);

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let v = v.trim();
            let parsed = v
                .parse::<T>()
                .ok()
                .or_else(|| v.parse::<f64>().ok().and_then(T::from_f64));
            Ok(parsed.filter(|n| n.usable()))
        }

        fn visit_bool<E>(self, _v: bool) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            while seq.next_element::<de::IgnoredAny>()?.is_some() {}
            Ok(None)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            while map
                .next_entry::<de::IgnoredAny, de::IgnoredAny>()?
                .is_some()
            {}
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(LenientVisitor(PhantomData))
        }
    }

    deserializer.deserialize_any(LenientVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient_number")]
        time: Option<f64>,
        #[serde(default, deserialize_with = "lenient_number")]
        memory: Option<u64>,
    }

    fn parse(json: &str) -> Sample {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        let s = parse(r#"{"time": "0.012", "memory": 3456}"#);
        assert_eq!(s.time, Some(0.012));
        assert_eq!(s.memory, Some(3456));

        let s = parse(r#"{"time": 1, "memory": "2048"}"#);
        assert_eq!(s.time, Some(1.0));
        assert_eq!(s.memory, Some(2048));
    }

    #[test]
    fn non_numeric_values_become_none() {
        let s = parse(r#"{"time": "fast", "memory": -3}"#);
        assert_eq!(s.time, None);
        assert_eq!(s.memory, None);

        let s = parse(r#"{"time": null, "memory": true}"#);
        assert_eq!(s.time, None);
        assert_eq!(s.memory, None);

        let s = parse(r#"{"time": "NaN", "memory": 1.5}"#);
        assert_eq!(s.time, None);
        assert_eq!(s.memory, None);

        let s = parse(r#"{"time": {"x": 1}, "memory": [1, [2]]}"#);
        assert_eq!(s.time, None);
        assert_eq!(s.memory, None);
    }

    #[test]
    fn missing_fields_are_none() {
        let s = parse("{}");
        assert_eq!(s.time, None);
        assert_eq!(s.memory, None);
    }
}
