//! Serde helpers for JSON APIs that encode integers inconsistently

use serde::de::{self, Deserializer};

/// Accept an unsigned integer encoded either as a JSON number or a string
pub fn deserialize_string_or_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrU64Visitor;

    impl de::Visitor<'_> for StringOrU64Visitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or unsigned integer")
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<u64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<u64, E>
        where
            E: de::Error,
        {
            u64::try_from(value).map_err(|_| de::Error::custom(format!("negative value {}", value)))
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<u64, E>
        where
            E: de::Error,
        {
            value.parse::<u64>().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(StringOrU64Visitor)
}

/// Accept an identifier encoded either as a JSON string or a number
pub fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrNumberVisitor;

    impl de::Visitor<'_> for StringOrNumberVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer")
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "deserialize_string_or_u64")]
        value: u64,
    }

    #[test]
    fn test_number_and_string() {
        let from_number: Wrapper = serde_json::from_str(r#"{"value": 42}"#).unwrap();
        assert_eq!(from_number.value, 42);

        let from_string: Wrapper = serde_json::from_str(r#"{"value": "42"}"#).unwrap();
        assert_eq!(from_string.value, 42);
    }

    #[derive(Debug, Deserialize)]
    struct IdWrapper {
        #[serde(deserialize_with = "deserialize_string_or_number")]
        id: String,
    }

    #[test]
    fn test_identifier_from_either_form() {
        let numeric: IdWrapper = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(numeric.id, "7");
        let text: IdWrapper = serde_json::from_str(r#"{"id": "7"}"#).unwrap();
        assert_eq!(text.id, "7");
        assert!(serde_json::from_str::<IdWrapper>(r#"{"id": null}"#).is_err());
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"value": "abc"}"#).is_err());
        assert!(serde_json::from_str::<Wrapper>(r#"{"value": -1}"#).is_err());
        assert!(serde_json::from_str::<Wrapper>(r#"{"value": 1.5}"#).is_err());
    }
}
