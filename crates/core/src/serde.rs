//! Serde helpers for query-string and form deserialization.
//!
//! Browsers submit empty inputs as empty strings; these helpers turn them
//! into `None` for optional fields.

use serde::{Deserialize, Deserializer};

/// Deserialize an optional string, treating blank strings as None.
pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

/// Deserialize an optional unsigned number that may arrive as a blank string.
pub fn deserialize_optional_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u32),
        Str(String),
    }

    match Option::<NumOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumOrString::Num(n)) => Ok(Some(n)),
        Some(NumOrString::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(NumOrString::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Query {
        #[serde(default, deserialize_with = "deserialize_optional_string")]
        search: Option<String>,
        #[serde(default, deserialize_with = "deserialize_optional_u32")]
        limit: Option<u32>,
    }

    #[test]
    fn blank_values_become_none() {
        let q: Query =
            serde_json::from_str(r#"{"search": "  ", "limit": ""}"#).unwrap();
        assert_eq!(
            q,
            Query {
                search: None,
                limit: None
            }
        );
    }

    #[test]
    fn missing_fields_become_none() {
        let q: Query = serde_json::from_str("{}").unwrap();
        assert_eq!(q.search, None);
        assert_eq!(q.limit, None);
    }

    #[test]
    fn values_are_parsed() {
        let q: Query =
            serde_json::from_str(r#"{"search": " run ", "limit": "25"}"#)
                .unwrap();
        assert_eq!(q.search.as_deref(), Some("run"));
        assert_eq!(q.limit, Some(25));
    }

    #[test]
    fn numeric_limit_is_accepted() {
        let q: Query = serde_json::from_str(r#"{"limit": 10}"#).unwrap();
        assert_eq!(q.limit, Some(10));
    }

    #[test]
    fn bad_number_is_an_error() {
        assert!(serde_json::from_str::<Query>(r#"{"limit": "ten"}"#).is_err());
    }
}
