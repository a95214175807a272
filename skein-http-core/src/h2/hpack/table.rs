//! The static table of RFC 7541 Appendix A and the per-connection dynamic
//! table.
//!
//! The two tables form one logical address space: indices 1..=61 are the
//! static entries, 62 and up address the dynamic table with 62 at the
//! newest entry.

use std::collections::VecDeque;

use bytes::Bytes;
use http::Method;

use super::header::Name;
use super::{DecoderError, Header};

pub(super) const STATIC_TABLE_LEN: usize = 61;

/// `(name, value)` per RFC 7541 Appendix A; index = position + 1.
const STATIC_TABLE: [(&str, &str); STATIC_TABLE_LEN] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// Materializes static entry `index` (1..=61).
pub(super) fn get_static(index: usize) -> Result<Header, DecoderError> {
    if index == 0 || index > STATIC_TABLE_LEN {
        return Err(DecoderError::InvalidTableIndex);
    }
    let (name, value) = STATIC_TABLE[index - 1];
    Header::try_from_parts(
        name.as_bytes(),
        Bytes::from_static(value.as_bytes()),
        false,
    )
    .map_err(|_| DecoderError::InvalidTableIndex)
}

/// Full `(name, value)` match against the static table.
pub(super) fn static_full_index(header: &Header) -> Option<usize> {
    match header {
        Header::Method(m) if *m == Method::GET => Some(2),
        Header::Method(m) if *m == Method::POST => Some(3),
        Header::Path(p) if &**p == "/" => Some(4),
        Header::Path(p) if &**p == "/index.html" => Some(5),
        Header::Scheme(s) if &**s == "http" => Some(6),
        Header::Scheme(s) if &**s == "https" => Some(7),
        Header::Status(s) => match s.as_u16() {
            200 => Some(8),
            204 => Some(9),
            206 => Some(10),
            304 => Some(11),
            400 => Some(12),
            404 => Some(13),
            500 => Some(14),
            _ => None,
        },
        Header::Field { name, value } => STATIC_TABLE.iter().position(|&(n, v)| {
            // Empty-valued entries are name-only candidates.
            !v.is_empty() && n == name.as_str() && v.as_bytes() == value.as_bytes()
        })
        .map(|pos| pos + 1),
        _ => None,
    }
}

/// Name-only match against the static table.
pub(super) fn static_name_index(header: &Header) -> Option<usize> {
    match header.name() {
        Name::Authority => Some(1),
        Name::Method => Some(2),
        Name::Path => Some(4),
        Name::Scheme => Some(6),
        Name::Status => Some(8),
        Name::Field(name) => STATIC_TABLE
            .iter()
            .position(|&(n, _)| n == name.as_str())
            .map(|pos| pos + 1),
    }
}

/// The dynamic table: newest entry at the front, evicted from the back.
///
/// "Size" is the sum over entries of `name.len + value.len + 32`; it never
/// exceeds `max_size` on entry to or exit from any operation.
#[derive(Debug)]
pub(super) struct Table {
    entries: VecDeque<Header>,
    size: usize,
    max_size: usize,
}

impl Table {
    pub(super) fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub(super) fn size(&self) -> usize {
        self.size
    }

    pub(super) fn max_size(&self) -> usize {
        self.max_size
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entry by 0-based dynamic index (0 = newest).
    pub(super) fn get(&self, index: usize) -> Result<&Header, DecoderError> {
        self.entries.get(index).ok_or(DecoderError::InvalidTableIndex)
    }

    /// Front-inserts the entry, evicting from the back until the size bound
    /// holds. An entry larger than the whole table empties it.
    pub(super) fn insert(&mut self, entry: Header) {
        let entry_size = entry.len();
        if entry_size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }
        while self.size + entry_size > self.max_size {
            if let Some(evicted) = self.entries.pop_back() {
                self.size -= evicted.len();
            } else {
                break;
            }
        }
        self.size += entry_size;
        self.entries.push_front(entry);
    }

    pub(super) fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        while self.size > self.max_size {
            if let Some(evicted) = self.entries.pop_back() {
                self.size -= evicted.len();
            } else {
                break;
            }
        }
    }

    /// 0-based position of a full `(name, value)` match.
    pub(super) fn full_index(&self, header: &Header) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name_eq(header) && e.value_eq(header))
    }

    /// 0-based position of a name match.
    pub(super) fn name_index(&self, header: &Header) -> Option<usize> {
        self.entries.iter().position(|e| e.name_eq(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &'static str, value: &'static str) -> Header {
        Header::try_from_parts(
            name.as_bytes(),
            Bytes::from_static(value.as_bytes()),
            false,
        )
        .unwrap()
    }

    #[test]
    fn static_lookup() {
        assert_eq!(static_full_index(&field("accept-encoding", "gzip, deflate")), Some(16));
        assert_eq!(static_full_index(&field("accept-encoding", "br")), None);
        assert_eq!(static_name_index(&field("accept-encoding", "br")), Some(16));
        assert_eq!(static_name_index(&field("x-custom", "1")), None);
    }

    #[test]
    fn eviction_from_the_back() {
        // Each entry is 32 + 1 + 1 = 34 octets.
        let mut table = Table::new(34 * 2);
        table.insert(field("a", "1"));
        table.insert(field("b", "2"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.size(), 68);

        table.insert(field("c", "3"));
        assert_eq!(table.len(), 2);
        // Oldest ("a") was evicted; newest sits at index 0.
        assert!(table.get(0).unwrap().name_eq(&field("c", "")));
        assert!(table.get(1).unwrap().name_eq(&field("b", "")));
    }

    #[test]
    fn oversized_entry_clears_table() {
        let mut table = Table::new(40);
        table.insert(field("a", "1"));
        table.insert(field("x-very-long-header-name", "with-a-long-value"));
        assert_eq!(table.len(), 0);
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn shrinking_max_size_evicts() {
        let mut table = Table::new(200);
        table.insert(field("a", "1"));
        table.insert(field("b", "2"));
        table.set_max_size(34);
        assert_eq!(table.len(), 1);
        assert!(table.size() <= 34);
    }
}
