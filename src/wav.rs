//! WAV container header parsing.
//!
//! Walks the RIFF chunk list generically instead of assuming a fixed 44-byte
//! header, since real files carry `LIST`, `fact` and other metadata chunks
//! before the sample data. Only header bytes are read: the sample region is
//! located, never loaded, so opening a multi-hour file is instantaneous.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};

/// Parsed WAV metadata plus the location of the sample region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count (1 or 2)
    pub channels: u16,
    /// Bit depth (16 only)
    pub bits_per_sample: u16,
    /// Byte position of the first sample
    pub data_offset: u64,
    /// Byte length of the sample region
    pub data_size: u64,
}

impl WavInfo {
    /// Bytes occupied by one interleaved sample frame.
    pub fn bytes_per_frame(&self) -> u64 {
        u64::from(self.bits_per_sample / 8) * u64::from(self.channels)
    }

    /// Total sample-frame count in the data region.
    pub fn frame_count(&self) -> u64 {
        self.data_size / self.bytes_per_frame()
    }
}

/// The interpreted first 16 bytes of a `fmt ` chunk.
struct FmtFields {
    compression: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Parse a RIFF/WAVE header and return metadata plus the data offset.
///
/// Fails with [`Error::Format`] for a missing `RIFF`/`WAVE` magic, a stream
/// that ends before a `data` chunk, a `data` chunk with no preceding `fmt `,
/// or a format this player does not support (anything but 16-bit PCM in one
/// or two channels).
pub fn parse_header(path: &Path) -> Result<WavInfo> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| Error::format(path, "file too short for a RIFF header"))?;
    if &magic != b"RIFF" {
        return Err(Error::format(path, "not a RIFF file"));
    }
    // Declared RIFF size; the chunk walk is bounded by EOF instead.
    reader.seek(SeekFrom::Current(4))?;
    reader
        .read_exact(&mut magic)
        .map_err(|_| Error::format(path, "file too short for a RIFF header"))?;
    if &magic != b"WAVE" {
        return Err(Error::format(path, "not a WAVE file"));
    }

    let mut fmt: Option<FmtFields> = None;

    loop {
        let mut id = [0u8; 4];
        if reader.read_exact(&mut id).is_err() {
            return Err(Error::format(path, "no data chunk found"));
        }
        let mut size_buf = [0u8; 4];
        reader
            .read_exact(&mut size_buf)
            .map_err(|_| Error::format(path, "truncated chunk header"))?;
        let chunk_size = u32::from_le_bytes(size_buf);

        match &id {
            b"fmt " => {
                fmt = Some(read_fmt(&mut reader, chunk_size, path)?);
            }
            b"data" => {
                let Some(fmt) = fmt else {
                    return Err(Error::format(path, "data chunk before fmt chunk"));
                };
                return finish(path, fmt, &mut reader, chunk_size, file_len);
            }
            _ => {
                // Unknown chunk (LIST, fact, ...): skip by declared size.
                reader.seek(SeekFrom::Current(i64::from(chunk_size)))?;
            }
        }
    }
}

/// Interpret the first 16 bytes of a `fmt ` chunk and skip any
/// format-extension bytes after them.
fn read_fmt(reader: &mut BufReader<File>, chunk_size: u32, path: &Path) -> Result<FmtFields> {
    if chunk_size < 16 {
        return Err(Error::format(path, "fmt chunk too short"));
    }
    let mut buf = [0u8; 16];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::format(path, "truncated fmt chunk"))?;

    let fields = FmtFields {
        compression: u16::from_le_bytes([buf[0], buf[1]]),
        channels: u16::from_le_bytes([buf[2], buf[3]]),
        sample_rate: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        // Bytes 8..14 are byte rate and block alignment, both derivable.
        bits_per_sample: u16::from_le_bytes([buf[14], buf[15]]),
    };

    reader.seek(SeekFrom::Current(i64::from(chunk_size - 16)))?;
    Ok(fields)
}

/// Validate the format fields against what the engine supports and bound the
/// data region against the real file length.
fn finish(
    path: &Path,
    fmt: FmtFields,
    reader: &mut BufReader<File>,
    data_size: u32,
    file_len: u64,
) -> Result<WavInfo> {
    if fmt.compression != 1 {
        return Err(Error::format(
            path,
            format!("unsupported compression code {} (PCM only)", fmt.compression),
        ));
    }
    if fmt.bits_per_sample != 16 {
        return Err(Error::format(
            path,
            format!("unsupported bit depth {} (16-bit only)", fmt.bits_per_sample),
        ));
    }
    if fmt.channels == 0 || fmt.channels > 2 {
        return Err(Error::format(
            path,
            format!("unsupported channel count {} (mono or stereo only)", fmt.channels),
        ));
    }
    if fmt.sample_rate == 0 {
        return Err(Error::format(path, "sample rate is zero"));
    }
    if data_size == 0 {
        return Err(Error::format(path, "empty data chunk"));
    }

    let data_offset = reader.stream_position()?;
    let data_size = u64::from(data_size);
    if data_offset + data_size > file_len {
        return Err(Error::format(path, "data chunk extends past end of file"));
    }

    Ok(WavInfo {
        sample_rate: fmt.sample_rate,
        channels: fmt.channels,
        bits_per_sample: fmt.bits_per_sample,
        data_offset,
        data_size,
    })
}
