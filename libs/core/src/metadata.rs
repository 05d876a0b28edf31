use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wire encoding used on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Payload bytes go over the wire untouched
    Bytes,
    Json,
    Bincode,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Bytes => "bytes",
            Format::Json => "json",
            Format::Bincode => "bincode",
        };
        f.write_str(name)
    }
}

/// Delivery and retention policy attached to a channel at open time
///
/// Providers decide how much of this they honor; every provider must at
/// least support `BestEffort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Persistence {
    /// At-most-once, nothing retained
    #[default]
    BestEffort,
    /// Keep messages around for the given duration
    Retain(Duration),
    Durable,
}

/// Typed tag attached to a channel when it is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metadata {
    Format(Format),
    Tag { key: String, value: String },
}

impl Metadata {
    pub fn tag(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Tag {
            key: key.into(),
            value: value.into(),
        }
    }

    /// First explicit format in `metadata`, if any
    pub fn find_format(metadata: &[Metadata]) -> Option<Format> {
        metadata.iter().find_map(|m| match m {
            Metadata::Format(format) => Some(*format),
            _ => None,
        })
    }

    pub fn find_tag<'a>(metadata: &'a [Metadata], key: &str) -> Option<&'a str> {
        metadata.iter().find_map(|m| match m {
            Metadata::Tag { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_format_returns_first_explicit_format() {
        let metadata = vec![
            Metadata::tag("owner", "cli"),
            Metadata::Format(Format::Bincode),
            Metadata::Format(Format::Json),
        ];
        assert_eq!(Metadata::find_format(&metadata), Some(Format::Bincode));
    }

    #[test]
    fn find_format_is_none_without_format_tag() {
        assert_eq!(Metadata::find_format(&[Metadata::tag("a", "b")]), None);
        assert_eq!(Metadata::find_format(&[]), None);
    }

    #[test]
    fn find_tag_matches_key() {
        let metadata = vec![Metadata::tag("owner", "cli")];
        assert_eq!(Metadata::find_tag(&metadata, "owner"), Some("cli"));
        assert_eq!(Metadata::find_tag(&metadata, "missing"), None);
    }

    #[test]
    fn persistence_defaults_to_best_effort() {
        assert_eq!(Persistence::default(), Persistence::BestEffort);
    }
}
