//! Request header sets.
//!
//! Headers are ordered key/value pairs with duplicates allowed, carried by
//! JOB requests (requirements on the processing worker) and by REGISTER
//! commands (capabilities of the worker). On the wire each header is one
//! `key=value` text frame.

use std::fmt;

use crate::error::ProtocolError;

/// An ordered key/value multiset of headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, keeping insertion order. Duplicate names are allowed.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value of the named header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of the named header, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All entries, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses one `key=value` frame into an entry.
    pub fn parse_entry(frame: &str) -> Result<(String, String), ProtocolError> {
        match frame.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ProtocolError::Malformed {
                command: "header",
                detail: format!("expected key=value, got '{frame}'"),
            }),
        }
    }

    /// Renders the entries as `key=value` frames, in order.
    pub fn to_frames(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(|(k, v)| format!("{k}={v}"))
    }
}

impl fmt::Display for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_kept_in_order() {
        let mut headers = HeaderSet::new();
        headers.insert("env", "cpu");
        headers.insert("env", "gpu");
        headers.insert("tenant", "acme");

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("env"), Some("cpu"));
        let all: Vec<_> = headers.get_all("env").collect();
        assert_eq!(all, vec!["cpu", "gpu"]);
    }

    #[test]
    fn parse_entry_splits_on_first_equals() {
        let (k, v) = HeaderSet::parse_entry("limit=a=b").unwrap();
        assert_eq!(k, "limit");
        assert_eq!(v, "a=b");
    }

    #[test]
    fn parse_entry_rejects_missing_key() {
        assert!(HeaderSet::parse_entry("=value").is_err());
        assert!(HeaderSet::parse_entry("no-equals").is_err());
    }

    #[test]
    fn frames_round_trip() {
        let headers: HeaderSet = [("tenant", "acme"), ("threads", "4")].into_iter().collect();
        let rebuilt: HeaderSet = headers
            .to_frames()
            .map(|f| HeaderSet::parse_entry(&f).unwrap())
            .collect();
        assert_eq!(rebuilt, headers);
    }
}
