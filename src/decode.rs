//! Incremental charset decoding of byte streams
//!
//! Network bodies arrive in arbitrary chunks, so a multi-byte sequence may be
//! split across two reads. [`ChunkDecoder`] holds back an incomplete trailing
//! sequence and completes it with the next chunk; only a sequence that is
//! invalid in its own right is reported as an error.

use std::io::{ErrorKind, Read};

use encoding_rs::{CoderResult, Decoder, DecoderResult, Encoding, UTF_8};

use crate::error::{Error, Result};

/// Read size used by [`DecodedChunks`] when none is given.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Look up an encoding by its charset label, falling back to UTF-8.
pub fn encoding_for_label(label: Option<&str>) -> &'static Encoding {
    let Some(label) = label else {
        return UTF_8;
    };
    Encoding::for_label(label.trim().as_bytes()).unwrap_or_else(|| {
        tracing::debug!(charset = %label, "unknown charset, decoding as UTF-8");
        UTF_8
    })
}

/// Stateful decoder turning successive byte chunks into text.
pub struct ChunkDecoder {
    decoder: Decoder,
    encoding: &'static Encoding,
    consumed: usize,
}

impl ChunkDecoder {
    /// Create a decoder for the given encoding.
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_with_bom_removal(),
            encoding,
            consumed: 0,
        }
    }

    /// The encoding this decoder was created for.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decode the next chunk.
    ///
    /// An incomplete multi-byte sequence at the end of `chunk` is retained
    /// and prepended to the next call. Bytes that can never form a valid
    /// sequence fail with [`Error::Decode`].
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length_without_replacement(chunk.len())
            .unwrap_or(chunk.len());
        let mut text = String::with_capacity(capacity);
        let mut src = chunk;

        loop {
            let (result, read) =
                self.decoder
                    .decode_to_string_without_replacement(src, &mut text, false);
            self.consumed += read;
            src = &src[read..];

            match result {
                DecoderResult::InputEmpty => return Ok(text),
                DecoderResult::OutputFull => {
                    let more = self
                        .decoder
                        .max_utf8_buffer_length_without_replacement(src.len())
                        .unwrap_or(src.len())
                        .max(4);
                    text.reserve(more);
                }
                DecoderResult::Malformed(bad, extra) => {
                    return Err(Error::Decode {
                        encoding: self.encoding.name(),
                        position: self.consumed.saturating_sub(bad as usize + extra as usize),
                    });
                }
            }
        }
    }

    /// Flush the decoder at end of input.
    ///
    /// A sequence still incomplete at end of input is dropped rather than
    /// reported, since end of input is never an error.
    pub fn finish(mut self) -> String {
        let mut text = String::with_capacity(16);
        let (result, _, _) = self.decoder.decode_to_string(b"", &mut text, true);
        if matches!(result, CoderResult::OutputFull) {
            tracing::debug!(encoding = self.encoding.name(), "decoder tail did not fit");
        }
        // The replacement-mode flush turns a dangling sequence into U+FFFD.
        if let Some(stripped) = text.strip_suffix('\u{FFFD}') {
            tracing::debug!(
                encoding = self.encoding.name(),
                "dropping incomplete sequence at end of input"
            );
            return stripped.to_string();
        }
        text
    }
}

/// Lazily decoded chunks of a byte source.
///
/// Each item is the text decoded from one read of roughly `chunk_size`
/// bytes. The sequence is single-pass: it consumes the reader, ends at EOF,
/// and yields nothing further after the first error.
pub struct DecodedChunks<R> {
    reader: R,
    decoder: Option<ChunkDecoder>,
    buf: Vec<u8>,
}

impl<R: Read> DecodedChunks<R> {
    /// Decode `reader` in reads of [`DEFAULT_CHUNK_SIZE`] bytes.
    pub fn new(reader: R, encoding: &'static Encoding) -> Self {
        Self::with_chunk_size(reader, encoding, DEFAULT_CHUNK_SIZE)
    }

    /// Decode `reader` in reads of `chunk_size` bytes.
    pub fn with_chunk_size(reader: R, encoding: &'static Encoding, chunk_size: usize) -> Self {
        Self {
            reader,
            decoder: Some(ChunkDecoder::new(encoding)),
            buf: vec![0; chunk_size.max(1)],
        }
    }
}

impl<R: Read> Iterator for DecodedChunks<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let decoder = self.decoder.as_mut()?;
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    let tail = self.decoder.take()?.finish();
                    return (!tail.is_empty()).then_some(Ok(tail));
                }
                Ok(n) => {
                    let decoded = decoder.decode(&self.buf[..n]);
                    if decoded.is_err() {
                        self.decoder = None;
                    }
                    return Some(decoded);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.decoder = None;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use encoding_rs::WINDOWS_1252;

    fn decode_split(bytes: &[u8], at: usize) -> Result<String> {
        let mut decoder = ChunkDecoder::new(UTF_8);
        let mut text = decoder.decode(&bytes[..at])?;
        text.push_str(&decoder.decode(&bytes[at..])?);
        text.push_str(&decoder.finish());
        Ok(text)
    }

    #[test]
    fn test_every_split_point_matches_whole_decode() {
        let original = "naïve café — 日本語 🎉 done";
        let bytes = original.as_bytes();
        for at in 0..=bytes.len() {
            assert_eq!(decode_split(bytes, at).unwrap(), original, "split at {at}");
        }
    }

    #[test]
    fn test_every_chunk_size_matches_whole_decode() {
        let original = "ünïcödé ✓ across reads ✓ 🦀";
        for size in 1..=8 {
            let chunks: Vec<String> =
                DecodedChunks::with_chunk_size(original.as_bytes(), UTF_8, size)
                    .collect::<Result<_>>()
                    .unwrap();
            assert_eq!(chunks.concat(), original, "chunk size {size}");
        }
    }

    #[test]
    fn test_genuine_error_fails_at_every_split_point() {
        let bytes = b"abc\xffdef";
        for at in 0..=bytes.len() {
            let err = decode_split(bytes, at).unwrap_err();
            assert!(
                matches!(err, Error::Decode { position: 3, .. }),
                "split at {at}: {err:?}"
            );
        }
    }

    #[test]
    fn test_error_stops_iteration() {
        let mut chunks = DecodedChunks::with_chunk_size(&b"ok\xff\xfemore"[..], UTF_8, 2);
        assert_eq!(chunks.next().unwrap().unwrap(), "ok");
        assert!(chunks.next().unwrap().is_err());
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_truncated_tail_is_dropped() {
        let chunks: Vec<String> = DecodedChunks::new(&b"caf\xc3"[..], UTF_8)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks.concat(), "caf");
    }

    #[test]
    fn test_single_byte_encoding() {
        let mut decoder = ChunkDecoder::new(WINDOWS_1252);
        assert_eq!(decoder.decode(b"caf\xe9").unwrap(), "café");
    }

    #[test]
    fn test_encoding_labels() {
        assert_eq!(encoding_for_label(Some("utf-8")), UTF_8);
        assert_eq!(encoding_for_label(Some(" latin1 ")), WINDOWS_1252);
        assert_eq!(encoding_for_label(Some("no-such-charset")), UTF_8);
        assert_eq!(encoding_for_label(None), UTF_8);
    }
}
