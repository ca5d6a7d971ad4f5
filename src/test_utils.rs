//! Test fixtures for lowhum tests.
//!
//! Byte-level RIFF/WAVE builders so parser tests can assemble valid and
//! deliberately malformed containers without binary blobs in the test
//! source.

use std::path::PathBuf;

use tempfile::TempDir;

/// Encode a single RIFF chunk: id + little-endian size + payload.
pub fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Wrap chunks in a RIFF/WAVE container with a correct declared size.
pub fn riff_wave(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body_len: usize = chunks.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(12 + body_len);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((4 + body_len) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    for c in chunks {
        out.extend_from_slice(c);
    }
    out
}

/// A standard 16-byte PCM `fmt ` chunk.
pub fn fmt_chunk(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;
    let mut payload = Vec::with_capacity(16);
    payload.extend_from_slice(&1u16.to_le_bytes()); // PCM
    payload.extend_from_slice(&channels.to_le_bytes());
    payload.extend_from_slice(&sample_rate.to_le_bytes());
    payload.extend_from_slice(&byte_rate.to_le_bytes());
    payload.extend_from_slice(&block_align.to_le_bytes());
    payload.extend_from_slice(&bits_per_sample.to_le_bytes());
    chunk(b"fmt ", &payload)
}

/// A `data` chunk holding the given interleaved 16-bit samples.
pub fn data_chunk(samples: &[i16]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        payload.extend_from_slice(&s.to_le_bytes());
    }
    chunk(b"data", &payload)
}

/// A minimal valid mono WAV: fmt directly followed by data.
pub fn mono_wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    riff_wave(&[fmt_chunk(sample_rate, 1, 16), data_chunk(samples)])
}

/// Write raw bytes to `name` inside the temp dir and return the path.
pub fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("Failed to write test fixture");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_layout() {
        let c = chunk(b"fact", &[1, 2, 3, 4]);
        assert_eq!(&c[..4], b"fact");
        assert_eq!(u32::from_le_bytes(c[4..8].try_into().unwrap()), 4);
        assert_eq!(&c[8..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_mono_wav_bytes_has_canonical_size() {
        // 12-byte RIFF header + 24-byte fmt + 8-byte data header + samples
        let bytes = mono_wav_bytes(44_100, &[0i16; 10]);
        assert_eq!(bytes.len(), 12 + 24 + 8 + 20);
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
    }
}
