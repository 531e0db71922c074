//! Message headers.
//!
//! Header names are case-sensitive: `request_id` and `REQUEST_ID` are two
//! different keys. Every key maps to an ordered list of values.

use std::collections::HashMap;
use std::collections::hash_map;

/// A multi-valued header map with case-sensitive keys.
///
/// # Example
///
/// ```
/// use micromw_core::Headers;
///
/// let mut headers = Headers::new();
/// headers.add("accept-encoding", "gzip");
/// headers.add("accept-encoding", "deflate");
/// assert_eq!(headers.get("accept-encoding"), "gzip");
/// assert_eq!(headers.values("accept-encoding"), ["gzip", "deflate"]);
///
/// headers.set("accept-encoding", "identity");
/// assert_eq!(headers.values("accept-encoding"), ["identity"]);
/// assert_eq!(headers.get("Accept-Encoding"), "");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(HashMap<String, Vec<String>>);

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Get the first value for `key`, or `""` if the key is absent.
    pub fn get(&self, key: &str) -> &str {
        self.0
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Get all values for `key` in insertion order.
    pub fn values(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace all values for `key` with a single value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), vec![value.into()]);
    }

    /// Append a value for `key`, keeping existing values.
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Remove `key` and all of its values.
    pub fn delete(&mut self, key: &str) {
        self.0.remove(key);
    }

    /// Returns true if `key` has at least one value.
    pub fn contains(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(|values| !values.is_empty())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys and their value lists.
    pub fn iter(&self) -> hash_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (key, value) in iter {
            headers.add(key, value);
        }
        headers
    }
}

impl IntoIterator for Headers {
    type Item = (String, Vec<String>);
    type IntoIter = hash_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = hash_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_empty() {
        let headers = Headers::new();
        assert_eq!(headers.get("encoding"), "");
        assert!(headers.values("encoding").is_empty());
        assert!(!headers.contains("encoding"));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let mut headers = Headers::new();
        headers.set("request_id", "abc");
        assert_eq!(headers.get("request_id"), "abc");
        assert_eq!(headers.get("REQUEST_ID"), "");
    }

    #[test]
    fn test_add_appends_and_set_replaces() {
        let mut headers = Headers::new();
        headers.add("x", "1");
        headers.add("x", "2");
        assert_eq!(headers.values("x"), ["1", "2"]);
        assert_eq!(headers.get("x"), "1");

        headers.set("x", "3");
        assert_eq!(headers.values("x"), ["3"]);
    }

    #[test]
    fn test_delete() {
        let mut headers: Headers = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(headers.len(), 2);
        headers.delete("a");
        assert!(!headers.contains("a"));
        assert_eq!(headers.len(), 1);
        // Deleting a missing key is a no-op
        headers.delete("missing");
        assert_eq!(headers.len(), 1);
    }
}
