//! Header storage and header-value helpers.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::proto::h1::Parse;

/// A header name as it appeared on the wire (or as supplied by the caller),
/// paired with its canonical lowercase form.
#[derive(Debug, Clone)]
pub struct OriginalName {
    name: HeaderName,
    original: Bytes,
}

impl OriginalName {
    pub(crate) fn new(name: HeaderName, original: Bytes) -> Self {
        Self { name, original }
    }

    /// The canonical (lowercase) name.
    #[must_use]
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// The spelling to use on HTTP/1 emit.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.original
    }
}

impl From<HeaderName> for OriginalName {
    fn from(name: HeaderName) -> Self {
        let original = Bytes::copy_from_slice(name.as_str().as_bytes());
        Self { name, original }
    }
}

/// An ordered multimap of headers.
///
/// Lookup is case-insensitive through the backing [`HeaderMap`]; iteration
/// preserves insertion order and the originally supplied name case, which
/// is what the HTTP/1 writer emits.
#[derive(Debug, Clone, Default)]
pub struct OrderedHeaders {
    map: HeaderMap,
    order: Vec<OriginalName>,
}

impl OrderedHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            map: HeaderMap::with_capacity(n),
            order: Vec::with_capacity(n),
        }
    }

    /// Appends a header, validating name and value; the supplied name case
    /// is preserved for emit.
    pub fn append(
        &mut self,
        name: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<(), Parse> {
        let raw = name.as_ref();
        let name = HeaderName::from_bytes(raw).map_err(|_| Parse::Header)?;
        let value = HeaderValue::from_bytes(value.as_ref()).map_err(|_| Parse::Header)?;
        self.append_original(OriginalName::new(name, Bytes::copy_from_slice(raw)), value);
        Ok(())
    }

    pub(crate) fn append_original(&mut self, name: OriginalName, value: HeaderValue) {
        self.map.append(name.name.clone(), value);
        self.order.push(name);
    }

    /// First value for `name`, case-insensitive.
    #[must_use]
    pub fn get(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        HeaderName::from_bytes(name.as_ref().as_bytes())
            .ok()
            .and_then(|n| self.map.get(n))
    }

    #[must_use]
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.map.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The canonical map behind this collection.
    #[must_use]
    pub fn header_map(&self) -> &HeaderMap {
        &self.map
    }

    /// Entries in insertion order with original name case.
    pub fn iter(&self) -> impl Iterator<Item = (&OriginalName, &HeaderValue)> {
        // Duplicate names pull their values off `get_all` in order; the
        // side list only records where each occurrence sits globally.
        let mut seen: fnv::FnvHashMap<&HeaderName, usize> = fnv::FnvHashMap::default();
        self.order.iter().filter_map(move |name| {
            let idx = seen.entry(&name.name).or_insert(0);
            let value = self.map.get_all(&name.name).iter().nth(*idx)?;
            *idx += 1;
            Some((name, value))
        })
    }
}

impl<'a> IntoIterator for &'a OrderedHeaders {
    type Item = (&'a OriginalName, &'a HeaderValue);
    type IntoIter = Box<dyn Iterator<Item = Self::Item> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

// ===== header value scanning =====

/// Scans a comma-separated `Connection` style value for `needle`.
fn token_list_contains(value: &HeaderValue, needle: &str) -> bool {
    value.to_str().is_ok_and(|s| {
        s.split(',')
            .any(|token| token.trim().eq_ignore_ascii_case(needle))
    })
}

pub(crate) fn connection_close(value: &HeaderValue) -> bool {
    token_list_contains(value, "close")
}

pub(crate) fn connection_keep_alive(value: &HeaderValue) -> bool {
    token_list_contains(value, "keep-alive")
}

pub(crate) fn connection_upgrade(value: &HeaderValue) -> bool {
    token_list_contains(value, "upgrade")
}

/// `true` when `chunked` is the final transfer coding.
pub(crate) fn is_chunked(value: &HeaderValue) -> bool {
    value.to_str().is_ok_and(|s| {
        s.rsplit(',')
            .next()
            .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
    })
}

pub(crate) fn content_length_parse(value: &HeaderValue) -> Option<u64> {
    value.to_str().ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order_and_case() {
        let mut headers = OrderedHeaders::new();
        headers.append("X-First", "1").unwrap();
        headers.append("Content-Type", "text/plain").unwrap();
        headers.append("X-FIRST", "2").unwrap();

        let emitted: Vec<(String, String)> = headers
            .iter()
            .map(|(n, v)| {
                (
                    String::from_utf8(n.as_bytes().to_vec()).unwrap(),
                    v.to_str().unwrap().to_owned(),
                )
            })
            .collect();
        assert_eq!(
            emitted,
            vec![
                ("X-First".to_owned(), "1".to_owned()),
                ("Content-Type".to_owned(), "text/plain".to_owned()),
                ("X-FIRST".to_owned(), "2".to_owned()),
            ]
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = OrderedHeaders::new();
        headers.append("X-Token", "abc").unwrap();
        assert_eq!(headers.get("x-token").unwrap(), "abc");
        assert_eq!(headers.get("X-TOKEN").unwrap(), "abc");
    }

    #[test]
    fn rejects_embedded_crlf_and_colon() {
        let mut headers = OrderedHeaders::new();
        assert!(headers.append("bad:name", "v").is_err());
        assert!(headers.append("bad\r\nname", "v").is_err());
        assert!(headers.append("name", "bad\r\nvalue").is_err());
    }

    #[test]
    fn chunked_must_be_final_coding() {
        let v = HeaderValue::from_static("gzip, chunked");
        assert!(is_chunked(&v));
        let v = HeaderValue::from_static("chunked, gzip");
        assert!(!is_chunked(&v));
    }
}
