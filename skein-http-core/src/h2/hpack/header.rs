use std::fmt;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, StatusCode};

use super::{DecoderError, NeedMore};

/// A decoded header: a pseudo-header or a regular field.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Header {
    Field {
        name: HeaderName,
        value: HeaderValue,
    },
    Authority(BytesStr),
    Method(Method),
    Scheme(BytesStr),
    Path(BytesStr),
    Status(StatusCode),
}

/// The name half of a header, usable without its value.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Name<'a> {
    Field(&'a HeaderName),
    Authority,
    Method,
    Scheme,
    Path,
    Status,
}

/// Bytes checked to be valid UTF-8.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct BytesStr(Bytes);

fn len(name: &HeaderName, value: &HeaderValue) -> usize {
    32 + name.as_str().len() + value.len()
}

impl Header {
    /// Builds a header from raw name/value bytes. `sensitive` marks values
    /// carried by the never-indexed literal form.
    pub fn try_from_parts(
        name: &[u8],
        value: Bytes,
        sensitive: bool,
    ) -> Result<Self, DecoderError> {
        if name.is_empty() {
            return Err(DecoderError::NeedMore(NeedMore::UnexpectedEndOfStream));
        }
        if name[0] == b':' {
            match &name[1..] {
                b"authority" => Ok(Self::Authority(BytesStr::try_from(value)?)),
                b"method" => {
                    let method =
                        Method::from_bytes(&value).map_err(|_| DecoderError::InvalidPseudoheader)?;
                    Ok(Self::Method(method))
                }
                b"scheme" => Ok(Self::Scheme(BytesStr::try_from(value)?)),
                b"path" => Ok(Self::Path(BytesStr::try_from(value)?)),
                b"status" => {
                    let status = StatusCode::from_bytes(&value)
                        .map_err(|_| DecoderError::InvalidStatusCode)?;
                    Ok(Self::Status(status))
                }
                _ => Err(DecoderError::InvalidPseudoheader),
            }
        } else {
            // HTTP/2 requires lower case header names.
            let name = HeaderName::from_lowercase(name)
                .map_err(|_| DecoderError::InvalidHeaderName)?;
            let mut value =
                HeaderValue::from_maybe_shared(value).map_err(|_| DecoderError::InvalidHeaderValue)?;
            value.set_sensitive(sensitive);

            Ok(Self::Field { name, value })
        }
    }

    /// The table size of the entry: name + value + 32 octets.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match self {
            Self::Field { name, value } => len(name, value),
            Self::Authority(v) => 32 + 10 + v.len(),
            Self::Method(v) => 32 + 7 + v.as_str().len(),
            Self::Scheme(v) => 32 + 7 + v.len(),
            Self::Path(v) => 32 + 5 + v.len(),
            Self::Status(_) => 32 + 7 + 3,
        }
    }

    pub fn name(&self) -> Name<'_> {
        match self {
            Self::Field { name, .. } => Name::Field(name),
            Self::Authority(..) => Name::Authority,
            Self::Method(..) => Name::Method,
            Self::Scheme(..) => Name::Scheme,
            Self::Path(..) => Name::Path,
            Self::Status(..) => Name::Status,
        }
    }

    pub fn value_slice(&self) -> &[u8] {
        match self {
            Self::Field { value, .. } => value.as_ref(),
            Self::Authority(v) | Self::Scheme(v) | Self::Path(v) => v.as_ref(),
            Self::Method(v) => v.as_str().as_bytes(),
            Self::Status(v) => v.as_str().as_bytes(),
        }
    }

    pub fn name_eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }

    pub fn value_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Field { value: a, .. }, Self::Field { value: b, .. }) => a == b,
            (Self::Authority(a), Self::Authority(b)) => a == b,
            (Self::Method(a), Self::Method(b)) => a == b,
            (Self::Scheme(a), Self::Scheme(b)) => a == b,
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Status(a), Self::Status(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_sensitive(&self) -> bool {
        match self {
            Self::Field { value, .. } => value.is_sensitive(),
            _ => false,
        }
    }

    /// Values the encoder should not enter into the dynamic table even
    /// when the header itself is not marked sensitive.
    pub fn skip_value_index(&self) -> bool {
        use http::header;

        match self {
            Self::Field { name, .. } => matches!(
                *name,
                header::AGE
                    | header::AUTHORIZATION
                    | header::CONTENT_LENGTH
                    | header::ETAG
                    | header::IF_MODIFIED_SINCE
                    | header::IF_NONE_MATCH
                    | header::LOCATION
                    | header::COOKIE
                    | header::SET_COOKIE
            ),
            Self::Path(..) => true,
            _ => false,
        }
    }
}

impl Name<'_> {
    pub fn into_entry(self, value: Bytes) -> Result<Header, DecoderError> {
        match self {
            Name::Field(name) => {
                let value = HeaderValue::from_maybe_shared(value)
                    .map_err(|_| DecoderError::InvalidHeaderValue)?;
                Ok(Header::Field {
                    name: name.clone(),
                    value,
                })
            }
            Name::Authority => Ok(Header::Authority(BytesStr::try_from(value)?)),
            Name::Method => Ok(Header::Method(
                Method::from_bytes(&value).map_err(|_| DecoderError::InvalidPseudoheader)?,
            )),
            Name::Scheme => Ok(Header::Scheme(BytesStr::try_from(value)?)),
            Name::Path => Ok(Header::Path(BytesStr::try_from(value)?)),
            Name::Status => Ok(Header::Status(
                StatusCode::from_bytes(&value).map_err(|_| DecoderError::InvalidStatusCode)?,
            )),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Name::Field(name) => name.as_ref(),
            Name::Authority => b":authority",
            Name::Method => b":method",
            Name::Scheme => b":scheme",
            Name::Path => b":path",
            Name::Status => b":status",
        }
    }
}

// ===== impl BytesStr =====

impl BytesStr {
    pub(crate) const fn from_static(value: &'static str) -> Self {
        Self(Bytes::from_static(value.as_bytes()))
    }

    pub(crate) fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }

    pub(crate) fn try_from(bytes: Bytes) -> Result<Self, DecoderError> {
        std::str::from_utf8(bytes.as_ref()).map_err(|_| DecoderError::InvalidUtf8)?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Validity checked in the constructors.
        std::str::from_utf8(self.0.as_ref()).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::ops::Deref for BytesStr {
    type Target = str;
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<[u8]> for BytesStr {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Debug for BytesStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
