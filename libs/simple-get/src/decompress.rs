//! Transparent response decoding.
//!
//! [`decode_response`] looks at `Content-Encoding` and, for `gzip` and
//! `deflate`, splices a streaming decoder between the raw body and the caller.
//! Status and headers are left untouched, so a decoded response and a raw one
//! look the same from the outside. Malformed compressed data is reported as
//! [`HttpError::Decode`] from the body stream, after the response itself has
//! already been handed out.

use crate::error::HttpError;
use crate::response::ResponseBody;
use bytes::{Buf, Bytes, BytesMut};
use flate2::{Crc, Decompress, FlushDecompress, Status};
use http::{HeaderMap, Response, header};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Content codings the proxy can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncoding {
    /// RFC 1952 gzip (also spelled `x-gzip`)
    Gzip,
    /// RFC 1950 zlib stream; raw RFC 1951 deflate is accepted too
    Deflate,
}

impl ContentEncoding {
    /// Detect a supported coding from response headers.
    ///
    /// Returns `None` for a missing header, `identity`, unknown values and
    /// stacked codings such as `gzip, br`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(header::CONTENT_ENCODING)?.to_str().ok()?.trim();
        if value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip") {
            Some(Self::Gzip)
        } else if value.eq_ignore_ascii_case("deflate") {
            Some(Self::Deflate)
        } else {
            None
        }
    }

    /// Header spelling of the coding
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrap the terminal response body with a decoder if it is compressed.
///
/// Returns the response (status and headers unchanged) and the coding that
/// was decoded, if any.
#[must_use]
pub fn decode_response(
    response: Response<ResponseBody>,
) -> (Response<ResponseBody>, Option<ContentEncoding>) {
    let Some(encoding) = ContentEncoding::from_headers(response.headers()) else {
        return (response, None);
    };

    tracing::debug!(encoding = %encoding, "decoding response body");
    let response = response.map(|body| DecodedBody::new(body, encoding).boxed());
    (response, Some(encoding))
}

/// Upper bound on the size of one decoded frame.
const OUTPUT_CHUNK: usize = 32 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_FIXED_HEADER_LEN: usize = 10;
const GZIP_TRAILER_LEN: usize = 8;

// gzip FLG bits (RFC 1952 section 2.3.1)
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const FRESERVED: u8 = 0xe0;

/// Position of the decoder within the compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Waiting for a complete gzip member header
    GzipHeader,
    /// `deflate` whose wrapping is not known yet
    SniffDeflate,
    Inflate,
    /// Waiting for the CRC32 and ISIZE of a gzip member
    GzipTrailer,
    /// After a gzip member: another member or trailing bytes may follow
    GzipNext,
    /// Stream complete; further input is ignored
    Done,
}

/// Incremental decoder that hands out at most [`OUTPUT_CHUNK`] bytes per step.
///
/// Compressed input is buffered until the inflater consumes it, so the
/// decoded size of a single wire frame never has to fit in memory at once.
struct Decoder {
    encoding: ContentEncoding,
    stage: Stage,
    input: BytesMut,
    inflate: Decompress,
    crc: Crc,
}

impl Decoder {
    fn new(encoding: ContentEncoding) -> Self {
        let stage = match encoding {
            ContentEncoding::Gzip => Stage::GzipHeader,
            ContentEncoding::Deflate => Stage::SniffDeflate,
        };
        Self {
            encoding,
            stage,
            input: BytesMut::new(),
            inflate: Decompress::new(false),
            crc: Crc::new(),
        }
    }

    fn push(&mut self, data: &[u8]) {
        if self.stage != Stage::Done {
            self.input.extend_from_slice(data);
        }
    }

    /// Decode the next chunk of output.
    ///
    /// `Ok(None)` means more input is needed or, once `eof` is set, that the
    /// stream is complete.
    fn next_chunk(&mut self, eof: bool) -> io::Result<Option<Bytes>> {
        loop {
            match self.stage {
                Stage::GzipHeader => {
                    let Some(len) = gzip_header_len(&self.input)? else {
                        return incomplete(eof, "gzip header");
                    };
                    self.input.advance(len);
                    self.inflate.reset(false);
                    self.crc.reset();
                    self.stage = Stage::Inflate;
                }
                Stage::SniffDeflate => match self.input.as_ref() {
                    [cmf, flg, ..] => {
                        self.inflate = Decompress::new(is_zlib_header(*cmf, *flg));
                        self.stage = Stage::Inflate;
                    }
                    [_] if eof => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "deflate stream ended after a single byte",
                        ));
                    }
                    _ => return Ok(None),
                },
                Stage::Inflate => {
                    let (out, status, consumed) = self.inflate_step()?;
                    if status == Status::StreamEnd {
                        self.stage = match self.encoding {
                            ContentEncoding::Gzip => Stage::GzipTrailer,
                            ContentEncoding::Deflate => Stage::Done,
                        };
                    }
                    if !out.is_empty() {
                        return Ok(Some(out));
                    }
                    if status != Status::StreamEnd && consumed == 0 {
                        return incomplete(eof, "compressed data");
                    }
                }
                Stage::GzipTrailer => {
                    let Some(&[c0, c1, c2, c3, s0, s1, s2, s3]) =
                        self.input.get(..GZIP_TRAILER_LEN)
                    else {
                        return incomplete(eof, "gzip trailer");
                    };
                    let crc = u32::from_le_bytes([c0, c1, c2, c3]);
                    let size = u32::from_le_bytes([s0, s1, s2, s3]);
                    if crc != self.crc.sum() || size != self.crc.amount() {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "gzip checksum mismatch",
                        ));
                    }
                    self.input.advance(GZIP_TRAILER_LEN);
                    self.stage = Stage::GzipNext;
                }
                Stage::GzipNext => {
                    match self.input.as_ref() {
                        [] => return Ok(None),
                        [first] if !eof && *first == GZIP_MAGIC[0] => return Ok(None),
                        _ => {}
                    }
                    if self.input.starts_with(&GZIP_MAGIC) {
                        self.stage = Stage::GzipHeader;
                    } else {
                        tracing::debug!(
                            bytes = self.input.len(),
                            "ignoring trailing data after gzip stream"
                        );
                        self.input.clear();
                        self.stage = Stage::Done;
                    }
                }
                Stage::Done => {
                    self.input.clear();
                    return Ok(None);
                }
            }
        }
    }

    /// Run the inflater once over the buffered input.
    fn inflate_step(&mut self) -> io::Result<(Bytes, Status, usize)> {
        let mut out = Vec::with_capacity(OUTPUT_CHUNK);
        let before = self.inflate.total_in();
        let status = self
            .inflate
            .decompress_vec(&self.input, &mut out, FlushDecompress::None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let consumed = usize::try_from(self.inflate.total_in() - before)
            .unwrap_or(usize::MAX)
            .min(self.input.len());
        self.input.advance(consumed);
        if self.encoding == ContentEncoding::Gzip {
            self.crc.update(&out);
        }
        Ok((Bytes::from(out), status, consumed))
    }
}

fn incomplete(eof: bool, what: &str) -> io::Result<Option<Bytes>> {
    if eof {
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("body ended inside the {what}"),
        ))
    } else {
        Ok(None)
    }
}

/// Length of the gzip member header at the start of `buf`, once it is complete.
fn gzip_header_len(buf: &[u8]) -> io::Result<Option<usize>> {
    let invalid = |msg: &'static str| io::Error::new(io::ErrorKind::InvalidData, msg);

    if buf.iter().zip(GZIP_MAGIC).any(|(byte, magic)| *byte != magic) {
        return Err(invalid("invalid gzip header"));
    }
    let Some(&[_, _, method, flags, ..]) = buf.get(..GZIP_FIXED_HEADER_LEN) else {
        return Ok(None);
    };
    if method != 8 {
        return Err(invalid("unsupported gzip compression method"));
    }
    if flags & FRESERVED != 0 {
        return Err(invalid("reserved gzip header flags set"));
    }

    let mut pos = GZIP_FIXED_HEADER_LEN;
    if flags & FEXTRA != 0 {
        let Some(&[lo, hi]) = buf.get(pos..pos + 2) else {
            return Ok(None);
        };
        pos += 2 + usize::from(u16::from_le_bytes([lo, hi]));
    }
    for field in [FNAME, FCOMMENT] {
        if flags & field != 0 {
            let Some(nul) = buf
                .get(pos..)
                .and_then(|rest| rest.iter().position(|&b| b == 0))
            else {
                return Ok(None);
            };
            pos += nul + 1;
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }
    Ok((buf.len() >= pos).then_some(pos))
}

/// RFC 1950 header check: deflate method with a valid FCHECK.
fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0f == 8 && ((u16::from(cmf) << 8) | u16::from(flg)) % 31 == 0
}

pin_project! {
    /// Body that decodes a compressed body as it streams.
    ///
    /// Decoded frames are at most 32 KiB. Trailers of the raw body are not
    /// forwarded. After the first decode error the body reports end of stream.
    pub struct DecodedBody {
        #[pin]
        inner: ResponseBody,
        decoder: Option<Decoder>,
        seen_input: bool,
        eof: bool,
    }
}

impl DecodedBody {
    /// Wrap `inner`, decoding it as `encoding`
    #[must_use]
    pub fn new(inner: ResponseBody, encoding: ContentEncoding) -> Self {
        Self {
            inner,
            decoder: Some(Decoder::new(encoding)),
            seen_input: false,
            eof: false,
        }
    }
}

impl Body for DecodedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            let Some(decoder) = this.decoder.as_mut() else {
                return Poll::Ready(None);
            };

            match decoder.next_chunk(*this.eof) {
                Ok(Some(out)) => return Poll::Ready(Some(Ok(Frame::data(out)))),
                Ok(None) if *this.eof => {
                    *this.decoder = None;
                    return Poll::Ready(None);
                }
                Ok(None) => {}
                Err(e) => {
                    *this.decoder = None;
                    return Poll::Ready(Some(Err(HttpError::Decode(e))));
                }
            }

            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data()
                        && !data.is_empty()
                    {
                        *this.seen_input = true;
                        decoder.push(&data);
                    }
                }
                Some(Err(e)) => {
                    *this.decoder = None;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    *this.eof = true;
                    // An empty body (HEAD, 204, 304) has nothing to decode
                    if !*this.seen_input {
                        *this.decoder = None;
                        return Poll::Ready(None);
                    }
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.decoder.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        // Decoded length is unrelated to the wire length
        SizeHint::default()
    }
}

impl fmt::Debug for DecodedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedBody")
            .field("finished", &self.decoder.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use flate2::Compression;
    use http::StatusCode;
    use http_body_util::{Full, StreamBody};
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn full_body(data: Vec<u8>) -> ResponseBody {
        Full::new(Bytes::from(data))
            .map_err(|never| match never {})
            .boxed()
    }

    /// Body that delivers `data` in `chunk`-sized frames.
    fn chunked_body(data: &[u8], chunk: usize) -> ResponseBody {
        let frames: Vec<Result<Frame<Bytes>, HttpError>> = data
            .chunks(chunk)
            .map(|c| Ok(Frame::data(Bytes::copy_from_slice(c))))
            .collect();
        StreamBody::new(futures::stream::iter(frames)).boxed()
    }

    fn response(encoding: Option<&str>, body: ResponseBody) -> Response<ResponseBody> {
        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header("x-origin", "test");
        if let Some(encoding) = encoding {
            builder = builder.header(header::CONTENT_ENCODING, encoding);
        }
        builder.body(body).unwrap()
    }

    async fn collect(body: ResponseBody) -> Result<Bytes, HttpError> {
        Ok(body.collect().await?.to_bytes())
    }

    #[test]
    fn test_encoding_detection() {
        let detect = |value: &str| {
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_ENCODING, value.parse().unwrap());
            ContentEncoding::from_headers(&headers)
        };

        assert_eq!(detect("gzip"), Some(ContentEncoding::Gzip));
        assert_eq!(detect("GZIP"), Some(ContentEncoding::Gzip));
        assert_eq!(detect("x-gzip"), Some(ContentEncoding::Gzip));
        assert_eq!(detect(" deflate "), Some(ContentEncoding::Deflate));
        assert_eq!(detect("br"), None);
        assert_eq!(detect("identity"), None);
        assert_eq!(detect("gzip, br"), None);
        assert_eq!(ContentEncoding::from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_zlib_header_check() {
        let stream = zlib(b"x");
        assert!(is_zlib_header(stream[0], stream[1]));

        let raw = raw_deflate(b"x");
        assert!(!is_zlib_header(raw[0], raw[1]));
    }

    #[tokio::test]
    async fn test_passthrough_without_encoding() {
        let (resp, encoding) = decode_response(response(None, full_body(b"plain".to_vec())));
        assert_eq!(encoding, None);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"plain");
    }

    #[tokio::test]
    async fn test_passthrough_unknown_encoding() {
        let (resp, encoding) = decode_response(response(Some("br"), full_body(b"opaque".to_vec())));
        assert_eq!(encoding, None);
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"opaque");
    }

    #[tokio::test]
    async fn test_gzip_decoded_headers_kept() {
        let (resp, encoding) =
            decode_response(response(Some("gzip"), full_body(gzip(b"response"))));
        assert_eq!(encoding, Some(ContentEncoding::Gzip));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-origin").unwrap(), "test");
        assert_eq!(resp.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"response");
    }

    #[tokio::test]
    async fn test_gzip_in_small_chunks() {
        let original = "chunked gzip payload ".repeat(200);
        let body = chunked_body(&gzip(original.as_bytes()), 7);
        let (resp, _) = decode_response(response(Some("gzip"), body));
        assert_eq!(
            collect(resp.into_body()).await.unwrap(),
            Bytes::from(original)
        );
    }

    #[tokio::test]
    async fn test_deflate_zlib_wrapped() {
        let (resp, encoding) =
            decode_response(response(Some("deflate"), full_body(zlib(b"response"))));
        assert_eq!(encoding, Some(ContentEncoding::Deflate));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"response");
    }

    #[tokio::test]
    async fn test_deflate_raw_fallback() {
        let (resp, _) = decode_response(response(Some("deflate"), full_body(raw_deflate(b"raw"))));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"raw");
    }

    #[tokio::test]
    async fn test_deflate_one_byte_chunks() {
        let original = b"sniffing needs two bytes".to_vec();
        let body = chunked_body(&zlib(&original), 1);
        let (resp, _) = decode_response(response(Some("deflate"), body));
        assert_eq!(collect(resp.into_body()).await.unwrap().to_vec(), original);
    }

    #[tokio::test]
    async fn test_empty_encoded_body() {
        let (resp, _) = decode_response(response(Some("gzip"), full_body(Vec::new())));
        assert!(collect(resp.into_body()).await.unwrap().is_empty());

        let (resp, _) = decode_response(response(Some("deflate"), full_body(Vec::new())));
        assert!(collect(resp.into_body()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_gzip_is_stream_error() {
        let (resp, encoding) = decode_response(response(
            Some("gzip"),
            full_body(b"definitely not gzip".to_vec()),
        ));
        // The response itself is fine; the failure shows up in the body
        assert_eq!(encoding, Some(ContentEncoding::Gzip));
        assert_eq!(resp.status(), StatusCode::OK);

        let err = collect(resp.into_body()).await.unwrap_err();
        assert!(matches!(err, HttpError::Decode(_)), "got {err:?}");
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_malformed_deflate_is_stream_error() {
        let (resp, _) = decode_response(response(
            Some("deflate"),
            full_body(b"not compressed at all".to_vec()),
        ));
        let err = collect(resp.into_body()).await.unwrap_err();
        assert!(matches!(err, HttpError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_body_ends_after_decode_error() {
        let mut body = DecodedBody::new(full_body(b"garbage!".to_vec()), ContentEncoding::Gzip);
        let first = body.frame().await.unwrap();
        assert!(first.is_err());
        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_gzip_multiple_members() {
        let mut stream = gzip(b"hello ");
        stream.extend(gzip(b"world"));

        let (resp, _) = decode_response(response(Some("gzip"), full_body(stream.clone())));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"hello world");

        // Member boundary split across frames
        let (resp, _) = decode_response(response(Some("gzip"), chunked_body(&stream, 3)));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"hello world");
    }

    #[tokio::test]
    async fn test_gzip_trailing_bytes_ignored() {
        let mut stream = gzip(b"hello");
        stream.push(b'\n');

        let (resp, _) = decode_response(response(Some("gzip"), full_body(stream.clone())));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"hello");

        let (resp, _) = decode_response(response(Some("gzip"), chunked_body(&stream, 1)));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"hello");

        // A lone magic byte at the end is not a second member
        let mut stream = gzip(b"hello");
        stream.push(0x1f);
        let (resp, _) = decode_response(response(Some("gzip"), full_body(stream)));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_zlib_trailing_bytes_ignored() {
        let mut stream = zlib(b"deflated");
        stream.extend_from_slice(b"\r\n");
        let (resp, _) = decode_response(response(Some("deflate"), full_body(stream)));
        assert_eq!(&collect(resp.into_body()).await.unwrap()[..], b"deflated");
    }

    #[tokio::test]
    async fn test_gzip_header_with_optional_fields() {
        let mut encoder = flate2::GzBuilder::new()
            .filename("payload.txt")
            .comment("generated")
            .extra(vec![1, 2, 3, 4])
            .write(Vec::new(), Compression::default());
        encoder.write_all(b"with header fields").unwrap();
        let stream = encoder.finish().unwrap();

        let (resp, _) = decode_response(response(Some("gzip"), chunked_body(&stream, 2)));
        assert_eq!(
            &collect(resp.into_body()).await.unwrap()[..],
            b"with header fields"
        );
    }

    #[tokio::test]
    async fn test_gzip_checksum_mismatch_is_stream_error() {
        let mut stream = gzip(b"checksummed payload");
        let crc_at = stream.len() - 8;
        stream[crc_at] ^= 0xff;

        let (resp, _) = decode_response(response(Some("gzip"), full_body(stream)));
        let err = collect(resp.into_body()).await.unwrap_err();
        assert!(matches!(err, HttpError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_truncated_deflate_is_stream_error() {
        let mut stream = zlib(&"truncated zlib stream ".repeat(50).into_bytes());
        stream.truncate(stream.len() / 2);

        let (resp, _) = decode_response(response(Some("deflate"), full_body(stream)));
        let err = collect(resp.into_body()).await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::Decode(ref e) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[tokio::test]
    async fn test_decoded_frames_are_bounded() {
        let original = vec![0u8; 8 * 1024 * 1024];
        let compressed = gzip(&original);
        assert!(compressed.len() < 64 * 1024);

        // The whole compressed body arrives as one frame
        let mut body = DecodedBody::new(full_body(compressed), ContentEncoding::Gzip);
        let mut total = 0;
        let mut frames = 0;
        while let Some(frame) = body.frame().await {
            let data = frame.unwrap().into_data().unwrap();
            assert!(data.len() <= OUTPUT_CHUNK, "frame of {} bytes", data.len());
            assert!(data.iter().all(|&b| b == 0));
            total += data.len();
            frames += 1;
        }
        assert_eq!(total, original.len());
        assert!(frames >= original.len() / OUTPUT_CHUNK);
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let frames: Vec<Result<Frame<Bytes>, HttpError>> = vec![Err(HttpError::Transport(
            "connection reset".into(),
        ))];
        let body: ResponseBody = StreamBody::new(futures::stream::iter(frames)).boxed();
        let (resp, _) = decode_response(response(Some("gzip"), body));
        let err = collect(resp.into_body()).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
