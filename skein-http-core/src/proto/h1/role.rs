//! Client and server transaction roles.

use bytes::{Bytes, BytesMut};
use http::{HeaderValue, Method, StatusCode, Uri, Version, header};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::headers::{self, OriginalName, OrderedHeaders};
use crate::proto::h1::{
    DEFAULT_MAX_HEADERS, Encode, Encoder, Http1Transaction, Parse, ParseContext, ParseResult,
    ParsedMessage,
};
use crate::proto::{BodyLength, DecodedLength, MessageHead, RequestLine};

const MAX_URI_LEN: usize = (u16::MAX - 1) as usize;
const AVERAGE_HEADER_SIZE: usize = 30;

pub(crate) enum Client {}

pub(crate) enum Server {}

#[derive(Clone, Copy)]
struct HeaderIndices {
    name: (usize, usize),
    value: (usize, usize),
}

// ===== impl Server =====

impl Http1Transaction for Server {
    type Incoming = RequestLine;
    type Outgoing = StatusCode;

    fn parse(buf: &mut BytesMut, ctx: ParseContext<'_>) -> ParseResult<RequestLine> {
        debug_assert!(!buf.is_empty(), "parse called with empty buf");

        unfold_obsolete_lws(buf);

        let mut headers_indices: SmallVec<[HeaderIndices; DEFAULT_MAX_HEADERS]> = SmallVec::new();
        let (len, method, path_range, version, mut keep_alive) = {
            let mut parsed = [httparse::EMPTY_HEADER; DEFAULT_MAX_HEADERS];
            let mut req = httparse::Request::new(&mut parsed);
            trace!("Request.parse: bytes={}", buf.len());
            match req.parse(buf) {
                Ok(httparse::Status::Complete(parsed_len)) => {
                    trace!("Request.parse complete({parsed_len})");
                    let path = req.path.ok_or(Parse::Uri)?;
                    if path.len() > MAX_URI_LEN {
                        return Err(Parse::Uri);
                    }
                    let method = Method::from_bytes(req.method.ok_or(Parse::Method)?.as_bytes())
                        .map_err(|_| Parse::Method)?;
                    let path_range = subslice_range(buf, path.as_bytes());
                    let (version, keep_alive) = if req.version.ok_or(Parse::Version)? == 1 {
                        (Version::HTTP_11, true)
                    } else {
                        (Version::HTTP_10, false)
                    };
                    record_header_indices(buf, req.headers, &mut headers_indices)?;
                    (parsed_len, method, path_range, version, keep_alive)
                }
                Ok(httparse::Status::Partial) => return Ok(None),
                Err(httparse::Error::Version) if ctx.allow_http09 => {
                    return parse_http09_request(buf);
                }
                Err(httparse::Error::Token) => {
                    return Err(if req.method.is_none() {
                        Parse::Method
                    } else {
                        Parse::Uri
                    });
                }
                Err(err) => return Err(err.into()),
            }
        };

        let slice = buf.split_to(len).freeze();
        let uri = Uri::try_from(&slice[path_range.0..path_range.1]).map_err(|_| Parse::Uri)?;
        let subject = RequestLine(method, uri);
        let is_http_11 = version == Version::HTTP_11;

        // Request body framing per RFC 7230 §3.3.3: chunked wins, multiple
        // differing Content-Length values are fatal, otherwise no body.
        let mut decode = DecodedLength::ZERO;
        let mut con_len = None;
        let mut is_te = false;
        let mut is_te_chunked = false;
        let mut wants_upgrade = subject.0 == Method::CONNECT;

        let mut parsed_headers = OrderedHeaders::with_capacity(headers_indices.len());
        for indices in &headers_indices {
            let name = header_name(&slice, indices)?;
            let value = header_value(&slice, indices)?;

            match *name.name() {
                header::TRANSFER_ENCODING => {
                    if !is_http_11 {
                        debug!("HTTP/1.0 request with Transfer-Encoding");
                        return Err(Parse::Header);
                    }
                    is_te = true;
                    if headers::is_chunked(&value) {
                        is_te_chunked = true;
                        decode = DecodedLength::CHUNKED;
                    } else {
                        is_te_chunked = false;
                    }
                }
                header::CONTENT_LENGTH => {
                    if is_te {
                        parsed_headers.append_original(name, value);
                        continue;
                    }
                    let len = headers::content_length_parse(&value).ok_or(Parse::Header)?;
                    if let Some(prev) = con_len {
                        if prev != len {
                            debug!("multiple Content-Length values: {prev} vs {len}");
                            return Err(Parse::Header);
                        }
                        continue;
                    }
                    decode = DecodedLength::checked_new(len)?;
                    con_len = Some(len);
                }
                header::CONNECTION => {
                    keep_alive = if is_http_11 {
                        !headers::connection_close(&value)
                    } else {
                        headers::connection_keep_alive(&value)
                    };
                }
                header::UPGRADE => wants_upgrade = is_http_11,
                _ => {}
            }

            parsed_headers.append_original(name, value);
        }

        if is_te && !is_te_chunked {
            debug!("Transfer-Encoding without final chunked coding");
            return Err(Parse::Header);
        }

        Ok(Some(ParsedMessage {
            head: MessageHead {
                version,
                subject,
                headers: parsed_headers,
            },
            decode,
            keep_alive,
            wants_upgrade,
        }))
    }

    fn encode(msg: Encode<'_, StatusCode>, dst: &mut Vec<u8>) -> Result<Encoder, Parse> {
        let status = msg.head.subject;
        trace!("Server::encode status={status:?} body={:?}", msg.body);

        if msg.head.version == Version::HTTP_09 {
            // A 0.9 exchange has no status line and no headers.
            return Ok(Encoder::close_delimited());
        }

        dst.reserve(30 + msg.head.headers.len() * AVERAGE_HEADER_SIZE);
        match msg.head.version {
            Version::HTTP_10 => extend(dst, b"HTTP/1.0 "),
            _ => extend(dst, b"HTTP/1.1 "),
        }
        extend(dst, status.as_str().as_bytes());
        extend(dst, b" ");
        extend(dst, status.canonical_reason().unwrap_or("<none>").as_bytes());
        extend(dst, b"\r\n");

        encode_headers(&msg, dst)?;

        let no_body = status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || status == StatusCode::SWITCHING_PROTOCOLS;

        let encoder = if no_body {
            extend(dst, b"\r\n");
            Encoder::length(0)
        } else {
            encode_body_framing(&msg, dst)
        };

        Ok(encoder)
    }
}

// ===== impl Client =====

impl Http1Transaction for Client {
    type Incoming = StatusCode;
    type Outgoing = RequestLine;

    fn parse(buf: &mut BytesMut, ctx: ParseContext<'_>) -> ParseResult<StatusCode> {
        debug_assert!(!buf.is_empty(), "parse called with empty buf");

        // A version-less reply is HTTP/0.9: the whole stream is the body.
        let prefix_len = buf.len().min(5);
        if buf[..prefix_len] != b"HTTP/"[..prefix_len] {
            return if ctx.allow_http09 {
                trace!("response without status line, promoting to HTTP/0.9");
                Ok(Some(ParsedMessage {
                    head: MessageHead {
                        version: Version::HTTP_09,
                        subject: StatusCode::OK,
                        headers: OrderedHeaders::new(),
                    },
                    decode: DecodedLength::CLOSE_DELIMITED,
                    keep_alive: false,
                    wants_upgrade: false,
                }))
            } else {
                Err(Parse::Version)
            };
        }
        if buf.len() < 5 {
            return Ok(None);
        }

        unfold_obsolete_lws(buf);

        let mut headers_indices: SmallVec<[HeaderIndices; DEFAULT_MAX_HEADERS]> = SmallVec::new();
        let (len, status, version) = {
            let mut parsed = [httparse::EMPTY_HEADER; DEFAULT_MAX_HEADERS];
            let mut res = httparse::Response::new(&mut parsed);
            trace!("Response.parse: bytes={}", buf.len());
            match res.parse(buf) {
                Ok(httparse::Status::Complete(parsed_len)) => {
                    trace!("Response.parse complete({parsed_len})");
                    let status = StatusCode::from_u16(res.code.ok_or(Parse::Status)?)
                        .map_err(|_| Parse::Status)?;
                    let version = if res.version.ok_or(Parse::Version)? == 1 {
                        Version::HTTP_11
                    } else {
                        Version::HTTP_10
                    };
                    record_header_indices(buf, res.headers, &mut headers_indices)?;
                    (parsed_len, status, version)
                }
                Ok(httparse::Status::Partial) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        };

        let slice = buf.split_to(len).freeze();
        let is_http_11 = version == Version::HTTP_11;
        let mut keep_alive = is_http_11;

        let mut parsed_headers = OrderedHeaders::with_capacity(headers_indices.len());
        let mut te_chunked = false;
        let mut con_len = None;
        for indices in &headers_indices {
            let name = header_name(&slice, indices)?;
            let value = header_value(&slice, indices)?;
            match *name.name() {
                header::TRANSFER_ENCODING => {
                    if is_http_11 && headers::is_chunked(&value) {
                        te_chunked = true;
                    }
                }
                header::CONTENT_LENGTH => {
                    let len = headers::content_length_parse(&value).ok_or(Parse::Header)?;
                    if let Some(prev) = con_len {
                        if prev != len {
                            return Err(Parse::Header);
                        }
                        continue;
                    }
                    con_len = Some(len);
                }
                header::CONNECTION => {
                    keep_alive = if is_http_11 {
                        !headers::connection_close(&value)
                    } else {
                        headers::connection_keep_alive(&value)
                    };
                }
                _ => {}
            }
            parsed_headers.append_original(name, value);
        }

        let decode = response_decoded_length(
            status,
            ctx.req_method,
            te_chunked,
            con_len,
        )?;
        let wants_upgrade = status == StatusCode::SWITCHING_PROTOCOLS;

        Ok(Some(ParsedMessage {
            head: MessageHead {
                version,
                subject: status,
                headers: parsed_headers,
            },
            decode,
            keep_alive,
            wants_upgrade,
        }))
    }

    fn encode(msg: Encode<'_, RequestLine>, dst: &mut Vec<u8>) -> Result<Encoder, Parse> {
        let RequestLine(ref method, ref uri) = msg.head.subject;
        let target = msg.target.unwrap_or("/");
        trace!("Client::encode method={method:?} target={target:?}");

        if msg.head.version == Version::HTTP_09 {
            extend(dst, method.as_str().as_bytes());
            extend(dst, b" ");
            extend(dst, target.as_bytes());
            extend(dst, b"\r\n");
            return Ok(Encoder::length(0));
        }

        dst.reserve(
            method.as_str().len()
                + target.len()
                + 32
                + msg.head.headers.len() * AVERAGE_HEADER_SIZE,
        );
        extend(dst, method.as_str().as_bytes());
        extend(dst, b" ");
        extend(dst, target.as_bytes());
        match msg.head.version {
            Version::HTTP_10 => extend(dst, b" HTTP/1.0\r\n"),
            _ => extend(dst, b" HTTP/1.1\r\n"),
        }

        // Host comes from the request context, never from the header list.
        extend(dst, codec_name(&msg, b"Host: ", b"host: "));
        extend(dst, host_header_value(uri).as_bytes());
        extend(dst, b"\r\n");

        encode_headers(&msg, dst)?;
        Ok(encode_body_framing(&msg, dst))
    }
}

/// `host[:port]`, dropping the default port of the scheme.
fn host_header_value(uri: &Uri) -> String {
    let host = uri.host().unwrap_or_default();
    match uri.port_u16() {
        Some(port) if !is_default_port(uri.scheme_str(), port) => format!("{host}:{port}"),
        _ => host.to_owned(),
    }
}

fn is_default_port(scheme: Option<&str>, port: u16) -> bool {
    matches!(
        (scheme, port),
        (Some("http" | "ws"), 80) | (Some("https" | "wss"), 443)
    )
}

fn response_decoded_length(
    status: StatusCode,
    req_method: Option<&Method>,
    te_chunked: bool,
    con_len: Option<u64>,
) -> Result<DecodedLength, Parse> {
    if req_method == Some(&Method::HEAD) {
        return Ok(DecodedLength::ZERO);
    }
    if req_method == Some(&Method::CONNECT) && status.is_success() {
        return Ok(DecodedLength::ZERO);
    }
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(DecodedLength::ZERO);
    }
    if te_chunked {
        return Ok(DecodedLength::CHUNKED);
    }
    if let Some(len) = con_len {
        return DecodedLength::checked_new(len);
    }
    Ok(DecodedLength::CLOSE_DELIMITED)
}

/// Writes the caller-supplied headers, applying the emit rules: Host and
/// Content-Length are owned by the codec, names and values were validated
/// on insertion, casing follows the lowercase flag.
fn encode_headers<S>(msg: &Encode<'_, S>, dst: &mut Vec<u8>) -> Result<(), Parse> {
    for (name, value) in msg.head.headers.iter() {
        if *name.name() == header::HOST || *name.name() == header::CONTENT_LENGTH {
            if msg.invalid_header_is_error {
                debug!("rejecting reserved header {:?}", name.name());
                return Err(Parse::Header);
            }
            trace!("skipping reserved header {:?}", name.name());
            continue;
        }
        if msg.lowercase_headers {
            extend(dst, name.name().as_str().as_bytes());
        } else {
            extend(dst, name.as_bytes());
        }
        extend(dst, b": ");
        extend(dst, value.as_bytes());
        extend(dst, b"\r\n");
    }
    Ok(())
}

/// Emits the body-framing header (if any), the blank line, and returns the
/// matching body encoder.
fn encode_body_framing<S>(msg: &Encode<'_, S>, dst: &mut Vec<u8>) -> Encoder {
    let encoder = match msg.body {
        None | Some(BodyLength::Known(0)) => Encoder::length(0),
        Some(BodyLength::Known(len)) => {
            extend(dst, codec_name(msg, b"Content-Length: ", b"content-length: "));
            let mut buf = itoa::Buffer::new();
            extend(dst, buf.format(len).as_bytes());
            extend(dst, b"\r\n");
            Encoder::length(len)
        }
        Some(BodyLength::Unknown) => {
            if msg.head.version == Version::HTTP_11 {
                extend(dst, codec_name(msg, b"Transfer-Encoding: ", b"transfer-encoding: "));
                extend(dst, b"chunked\r\n");
                Encoder::chunked()
            } else {
                Encoder::close_delimited()
            }
        }
    };
    if !msg.keep_alive && msg.head.version == Version::HTTP_11 {
        extend(dst, codec_name(msg, b"Connection: ", b"connection: "));
        extend(dst, b"close\r\n");
    } else if msg.keep_alive && msg.head.version == Version::HTTP_10 {
        extend(dst, codec_name(msg, b"Connection: ", b"connection: "));
        extend(dst, b"keep-alive\r\n");
    }
    extend(dst, b"\r\n");
    encoder
}

/// The spelling for a header line the codec itself emits: lowercase when
/// the small-header-case flag asks for it.
fn codec_name<'a, S>(msg: &Encode<'_, S>, name: &'a [u8], small: &'a [u8]) -> &'a [u8] {
    if msg.small_header_case { small } else { name }
}

fn parse_http09_request(buf: &mut BytesMut) -> ParseResult<RequestLine> {
    let Some(line_end) = memchr::memchr(b'\n', buf) else {
        return Ok(None);
    };
    let line = buf.split_to(line_end + 1);
    let line = &line[..line_end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let mut parts = line.split(|&b| b == b' ').filter(|p| !p.is_empty());
    let method = parts.next().ok_or(Parse::Method)?;
    let path = parts.next().ok_or(Parse::Uri)?;
    if parts.next().is_some() {
        return Err(Parse::Version);
    }
    let method = Method::from_bytes(method).map_err(|_| Parse::Method)?;
    let uri = Uri::try_from(path).map_err(|_| Parse::Uri)?;
    trace!("parsed HTTP/0.9 request line");
    Ok(Some(ParsedMessage {
        head: MessageHead {
            version: Version::HTTP_09,
            subject: RequestLine(method, uri),
            headers: OrderedHeaders::new(),
        },
        decode: DecodedLength::ZERO,
        keep_alive: false,
        wants_upgrade: false,
    }))
}

/// Rewrites obsolete line folding (CRLF + WSP) into spaces, bounded by the
/// end of the header section, so the strict parser accepts it.
fn unfold_obsolete_lws(buf: &mut BytesMut) {
    let head_end = memchr::memmem::find(buf, b"\r\n\r\n")
        .map(|i| i + 2)
        .unwrap_or(buf.len());
    // The fold may not start on the first line (that would be an empty
    // start line), so begin scanning after the first byte.
    let mut i = 1;
    while i + 2 < head_end {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' && (buf[i + 2] == b' ' || buf[i + 2] == b'\t') {
            buf[i] = b' ';
            buf[i + 1] = b' ';
        }
        i += 1;
    }
}

fn record_header_indices(
    bytes: &[u8],
    headers: &[httparse::Header<'_>],
    indices: &mut SmallVec<[HeaderIndices; DEFAULT_MAX_HEADERS]>,
) -> Result<(), Parse> {
    let base = bytes.as_ptr() as usize;
    for header in headers {
        let name_start = header.name.as_ptr() as usize - base;
        let value_start = header.value.as_ptr() as usize - base;
        indices.push(HeaderIndices {
            name: (name_start, name_start + header.name.len()),
            value: (value_start, value_start + header.value.len()),
        });
    }
    Ok(())
}

fn subslice_range(outer: &[u8], inner: &[u8]) -> (usize, usize) {
    let start = inner.as_ptr() as usize - outer.as_ptr() as usize;
    (start, start + inner.len())
}

fn header_name(slice: &Bytes, indices: &HeaderIndices) -> Result<OriginalName, Parse> {
    let raw = slice.slice(indices.name.0..indices.name.1);
    let name = http::HeaderName::from_bytes(&raw).map_err(|_| Parse::Header)?;
    Ok(OriginalName::new(name, raw))
}

fn header_value(slice: &Bytes, indices: &HeaderIndices) -> Result<HeaderValue, Parse> {
    let raw = slice.slice(indices.value.0..indices.value.1);
    HeaderValue::from_maybe_shared(raw).map_err(|_| Parse::Header)
}

fn extend(dst: &mut Vec<u8>, data: &[u8]) {
    dst.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::h1::ParseContext;

    fn parse_ctx() -> ParseContext<'static> {
        ParseContext {
            req_method: None,
            allow_http09: false,
        }
    }

    #[test]
    fn parse_get_request() {
        let mut buf = BytesMut::from(&b"GET /index.html?q=1 HTTP/1.1\r\nHost: example\r\n\r\n"[..]);
        let msg = Server::parse(&mut buf, parse_ctx()).unwrap().unwrap();
        assert_eq!(msg.head.subject.0, Method::GET);
        assert_eq!(msg.head.subject.1.path(), "/index.html");
        assert_eq!(msg.head.subject.1.query(), Some("q=1"));
        assert_eq!(msg.head.version, Version::HTTP_11);
        assert!(msg.keep_alive);
        assert_eq!(msg.decode, DecodedLength::ZERO);
    }

    #[test]
    fn parse_request_without_path_is_an_error() {
        let mut buf = BytesMut::from(&b"GET HTTP/1.1\r\n\r\n"[..]);
        assert!(Server::parse(&mut buf, parse_ctx()).is_err());
    }

    #[test]
    fn parse_http09_request_line() {
        let mut buf = BytesMut::from(&b"GET /legacy\r\n"[..]);
        let ctx = ParseContext {
            req_method: None,
            allow_http09: true,
        };
        let msg = Server::parse(&mut buf, ctx).unwrap().unwrap();
        assert_eq!(msg.head.version, Version::HTTP_09);
        assert_eq!(msg.head.subject.1.path(), "/legacy");

        let mut buf = BytesMut::from(&b"GET /legacy\r\n"[..]);
        assert!(Server::parse(&mut buf, parse_ctx()).is_err());
    }

    #[test]
    fn parse_response_with_content_length() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK"[..]);
        let msg = Client::parse(&mut buf, parse_ctx()).unwrap().unwrap();
        assert_eq!(msg.head.subject, StatusCode::OK);
        assert_eq!(msg.decode, DecodedLength::checked_new(2).unwrap());
        assert_eq!(buf.as_ref(), b"OK");
    }

    #[test]
    fn parse_response_obsolete_folding() {
        let mut buf =
            BytesMut::from(&b"HTTP/1.1 200 OK\r\nX-Note: one\r\n two\r\nContent-Length: 0\r\n\r\n"[..]);
        let msg = Client::parse(&mut buf, parse_ctx()).unwrap().unwrap();
        let note = msg.head.headers.get("x-note").unwrap();
        let note = note.to_str().unwrap();
        assert!(note.starts_with("one") && note.ends_with("two"), "{note:?}");
    }

    #[test]
    fn parse_request_obsolete_folding() {
        let mut buf = BytesMut::from(
            &b"GET / HTTP/1.1\r\nX-Note: one\r\n\ttwo\r\nHost: example\r\n\r\n"[..],
        );
        let msg = Server::parse(&mut buf, parse_ctx()).unwrap().unwrap();
        let note = msg.head.headers.get("x-note").unwrap();
        assert!(note.to_str().unwrap().contains("two"));
    }

    #[test]
    fn chunked_beats_content_length() {
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nTransfer-Encoding: chunked\r\n\r\n"[..],
        );
        let msg = Client::parse(&mut buf, parse_ctx()).unwrap().unwrap();
        assert_eq!(msg.decode, DecodedLength::CHUNKED);
    }

    #[test]
    fn head_response_has_no_body() {
        let method = Method::HEAD;
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n"[..]);
        let ctx = ParseContext {
            req_method: Some(&method),
            allow_http09: false,
        };
        let msg = Client::parse(&mut buf, ctx).unwrap().unwrap();
        assert_eq!(msg.decode, DecodedLength::ZERO);
    }

    #[test]
    fn connection_close_disables_reuse() {
        let mut buf =
            BytesMut::from(&b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"[..]);
        let msg = Client::parse(&mut buf, parse_ctx()).unwrap().unwrap();
        assert!(!msg.keep_alive);
    }

    #[test]
    fn encode_get_request_expected_bytes() {
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: RequestLine(Method::GET, Uri::try_from("http://example/").unwrap()),
            headers: OrderedHeaders::new(),
        };
        let mut dst = Vec::new();
        let _enc = Client::encode(
            Encode {
                head: &head,
                body: None,
                keep_alive: true,
                target: Some("/"),
                lowercase_headers: false,
                small_header_case: false,
                invalid_header_is_error: false,
            },
            &mut dst,
        )
        .unwrap();
        assert_eq!(dst, b"GET / HTTP/1.1\r\nHost: example\r\n\r\n");
    }

    #[test]
    fn encode_request_with_body_adds_content_length() {
        let mut headers = OrderedHeaders::new();
        headers.append("Accept", "*/*").unwrap();
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: RequestLine(Method::POST, Uri::try_from("http://example:8080/x").unwrap()),
            headers,
        };
        let mut dst = Vec::new();
        let _enc = Client::encode(
            Encode {
                head: &head,
                body: Some(BodyLength::Known(4)),
                keep_alive: true,
                target: Some("/x"),
                lowercase_headers: false,
                small_header_case: false,
                invalid_header_is_error: false,
            },
            &mut dst,
        )
        .unwrap();
        let text = String::from_utf8(dst).unwrap();
        assert!(text.starts_with("POST /x HTTP/1.1\r\nHost: example:8080\r\n"));
        assert!(text.contains("Accept: */*\r\n"));
        assert!(text.ends_with("Content-Length: 4\r\n\r\n"));
    }

    #[test]
    fn user_supplied_host_is_dropped() {
        let mut headers = OrderedHeaders::new();
        headers.append("Host", "evil.example").unwrap();
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: RequestLine(Method::GET, Uri::try_from("http://example/").unwrap()),
            headers,
        };
        let mut dst = Vec::new();
        let _enc = Client::encode(
            Encode {
                head: &head,
                body: None,
                keep_alive: true,
                target: Some("/"),
                lowercase_headers: false,
                small_header_case: false,
                invalid_header_is_error: false,
            },
            &mut dst,
        )
        .unwrap();
        let text = String::from_utf8(dst).unwrap();
        assert!(!text.contains("evil"));
    }

    #[test]
    fn encode_response_status_line() {
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: StatusCode::NOT_FOUND,
            headers: OrderedHeaders::new(),
        };
        let mut dst = Vec::new();
        let _enc = Server::encode(
            Encode {
                head: &head,
                body: Some(BodyLength::Known(0)),
                keep_alive: true,
                target: None,
                lowercase_headers: false,
                small_header_case: false,
                invalid_header_is_error: false,
            },
            &mut dst,
        )
        .unwrap();
        assert!(dst.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    }

    #[test]
    fn small_header_case_lowercases_codec_lines_only() {
        let mut headers = OrderedHeaders::new();
        headers.append("X-Mixed-Case", "kept").unwrap();
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: RequestLine(Method::POST, Uri::try_from("http://example/up").unwrap()),
            headers,
        };
        let mut dst = Vec::new();
        let _enc = Client::encode(
            Encode {
                head: &head,
                body: Some(BodyLength::Known(2)),
                keep_alive: true,
                target: Some("/up"),
                lowercase_headers: false,
                small_header_case: true,
                invalid_header_is_error: false,
            },
            &mut dst,
        )
        .unwrap();
        let text = String::from_utf8(dst).unwrap();
        // The codec's own lines go lowercase; the caller's spelling stays.
        assert!(text.contains("host: example\r\n"), "{text:?}");
        assert!(text.contains("content-length: 2\r\n"), "{text:?}");
        assert!(text.contains("X-Mixed-Case: kept\r\n"), "{text:?}");
    }

    #[test]
    fn lowercase_headers_lowercases_caller_lines_only() {
        let mut headers = OrderedHeaders::new();
        headers.append("X-Mixed-Case", "folded").unwrap();
        let head = MessageHead {
            version: Version::HTTP_11,
            subject: RequestLine(Method::POST, Uri::try_from("http://example/up").unwrap()),
            headers,
        };
        let mut dst = Vec::new();
        let _enc = Client::encode(
            Encode {
                head: &head,
                body: Some(BodyLength::Known(2)),
                keep_alive: true,
                target: Some("/up"),
                lowercase_headers: true,
                small_header_case: false,
                invalid_header_is_error: false,
            },
            &mut dst,
        )
        .unwrap();
        let text = String::from_utf8(dst).unwrap();
        // The caller's names fold to canonical lowercase; the codec's own
        // lines keep their capitalized spelling.
        assert!(text.contains("x-mixed-case: folded\r\n"), "{text:?}");
        assert!(text.contains("Host: example\r\n"), "{text:?}");
        assert!(text.contains("Content-Length: 2\r\n"), "{text:?}");
    }
}
