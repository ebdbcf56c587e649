use std::io::Read;

use anyhow::{Result, bail};
use flate2::{Decompress, FlushDecompress, Status, read::MultiGzDecoder};
use tracing::{debug, warn};

use super::Payload;

const COMPRESSED_EXTENSIONS: &[&str] = &[".gz", ".gzip"];
const COMPRESSED_ENCODINGS: &[&str] = &["gzip", "x-gzip", "deflate"];

/// True if `url` (ignoring query and fragment) ends in a recognized compressed extension.
pub(crate) fn is_compressed_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    COMPRESSED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Body bytes ready for parsing.
///
/// Compressed bodies (by extension or declared encoding) go through the streaming gzip
/// decoder first, then a whole-buffer zlib inflate. If both fail and the body is valid
/// UTF-8 it is returned as-is, since some servers mislabel plain text as compressed.
pub(crate) fn decode_body(url: &str, payload: &Payload) -> Result<Vec<u8>> {
    let declared = payload.content_encoding.as_deref()
        .is_some_and(|enc| COMPRESSED_ENCODINGS.contains(&enc));
    if !declared && !is_compressed_url(url) {
        return Ok(payload.bytes.to_vec());
    }

    let bytes = &payload.bytes[..];
    match gunzip_streaming(bytes) {
        Ok(out) => return Ok(out),
        Err(e) => debug!("Streaming gzip decode failed for {url}: {e}"),
    }
    match inflate_buffer(bytes) {
        Ok(out) => return Ok(out),
        Err(e) => debug!("Buffer inflate failed for {url}: {e}"),
    }
    if std::str::from_utf8(bytes).is_ok() {
        warn!("{url} is labelled compressed but is plain text; using it as-is");
        return Ok(bytes.to_vec());
    }
    bail!("Could not decompress {url}")
}

fn gunzip_streaming(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    MultiGzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// One-shot zlib inflate into a growing buffer.
fn inflate_buffer(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    loop {
        if out.capacity() == out.len() { out.reserve(out.len().max(4096)) }
        let consumed = inflater.total_in() as usize;
        match inflater.decompress_vec(&bytes[consumed..], &mut out, FlushDecompress::Finish)? {
            Status::StreamEnd => return Ok(out),
            Status::Ok => continue,
            Status::BufError if out.len() < out.capacity() => bail!("truncated deflate stream"),
            Status::BufError => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::{GzEncoder, ZlibEncoder}};
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(text.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn extension_detection_ignores_query() {
        assert!(is_compressed_url("https://x.org/a.csv.gz?token=1"));
        assert!(!is_compressed_url("https://x.org/a.csv"));
    }

    #[test]
    fn gzip_by_extension() {
        let payload = Payload::new(gzip("a,b\n1,2\n"));
        assert_eq!(decode_body("s.csv.gz", &payload).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn gzip_by_declared_encoding() {
        let payload = Payload::new(gzip("x")).with_encoding("GZIP");
        assert_eq!(decode_body("s.csv", &payload).unwrap(), b"x");
    }

    #[test]
    fn zlib_body_falls_back_to_buffer_inflate() {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"date,vri\n").unwrap();
        let payload = Payload::new(enc.finish().unwrap()).with_encoding("deflate");
        assert_eq!(decode_body("s.csv", &payload).unwrap(), b"date,vri\n");
    }

    #[test]
    fn mislabelled_plain_text_passes_through() {
        let payload = Payload::new("date,vri\n2024-01-01,0.3\n");
        assert_eq!(decode_body("s.csv.gz", &payload).unwrap(), b"date,vri\n2024-01-01,0.3\n");
    }

    #[test]
    fn binary_garbage_fails() {
        let payload = Payload::new(vec![0xff, 0xfe, 0x00, 0x81]);
        assert!(decode_body("s.csv.gz", &payload).is_err());
    }

    #[test]
    fn uncompressed_is_untouched() {
        let payload = Payload::new("plain");
        assert_eq!(decode_body("s.csv", &payload).unwrap(), b"plain");
    }
}
