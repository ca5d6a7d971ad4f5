//! The stream engine: one hardware output stream fed from a memory-mapped
//! sample window.
//!
//! Each engine instance serves a single playback attempt. The audio backend
//! invokes the buffer-fill callback on its own real-time thread; the
//! callback only copies samples, advances a position counter and checks an
//! atomic cancellation flag, with no locks and no allocation. A supervising loop
//! outside the callback polls in 100ms increments purely to know when to
//! release the stream and the mapping.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, StreamTrait};
use memmap2::Mmap;

use super::devices;
use crate::error::{Error, Result};
use crate::wav::{self, WavInfo};

/// Fixed callback buffer size in frames. Bounds stop latency to roughly one
/// buffer period at the file's sample rate.
const BUFFER_FRAMES: u32 = 2048;

/// Supervising loop poll granularity.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);

/// How a stream run ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamOutcome {
    /// The file played to its end (non-looping).
    Completed,
    /// A stop was requested and honored.
    Stopped,
}

/// Read-only view of a WAV file's sample region.
///
/// Mapping instead of loading keeps a multi-hour file at negligible working
/// memory; the mapping is released when the engine instance is dropped.
struct SampleRegion {
    map: Mmap,
    offset: usize,
    len: usize,
}

impl SampleRegion {
    fn open(path: &Path, info: &WavInfo) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the source file is not
        // written while a session streams from it.
        let map = unsafe { Mmap::map(&file)? };
        let offset = info.data_offset as usize;
        let len = info.data_size as usize;
        if map.len() < offset + len {
            // The file shrank between parse and map.
            return Err(Error::format(path, "data chunk extends past end of file"));
        }
        Ok(Self { map, offset, len })
    }

    fn bytes(&self) -> &[u8] {
        &self.map[self.offset..self.offset + self.len]
    }
}

/// Parse, map, open and supervise one playback attempt on the current
/// thread. Returns once the track ends (non-looping), the stop flag is
/// raised, or the stream fails.
///
/// `playing` is raised only after the hardware stream starts and lowered
/// before the stream handle is released.
pub(crate) fn run(
    path: &Path,
    device_index: Option<usize>,
    looped: bool,
    stop: &Arc<AtomicBool>,
    playing: &Arc<AtomicBool>,
) -> Result<StreamOutcome> {
    let info = wav::parse_header(path)?;
    let region = Arc::new(SampleRegion::open(path, &info)?);

    let device = devices::resolve(device_index)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(
        device = %device_name,
        sample_rate = info.sample_rate,
        channels = info.channels,
        frames = info.frame_count(),
        looped,
        "Opening output stream"
    );

    let config = cpal::StreamConfig {
        channels: info.channels,
        sample_rate: cpal::SampleRate(info.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(BUFFER_FRAMES),
    };

    let sample_format = device
        .default_output_config()
        .map_err(|e| Error::stream(e.to_string()))?
        .sample_format();

    // Raised by the callback at end-of-data (non-looping) and by the error
    // callback on hardware failure.
    let finished = Arc::new(AtomicBool::new(false));

    let channels = usize::from(info.channels);
    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, region, channels, looped, stop, &finished),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, region, channels, looped, stop, &finished),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, region, channels, looped, stop, &finished),
        format => {
            return Err(Error::stream(format!("unsupported sample format {format:?}")));
        }
    }
    .map_err(|e| Error::stream(e.to_string()))?;

    stream.play().map_err(|e| Error::stream(e.to_string()))?;
    playing.store(true, Ordering::SeqCst);

    while !stop.load(Ordering::SeqCst) && !finished.load(Ordering::SeqCst) {
        thread::sleep(SUPERVISE_INTERVAL);
    }

    let outcome = if stop.load(Ordering::SeqCst) {
        StreamOutcome::Stopped
    } else {
        StreamOutcome::Completed
    };

    playing.store(false, Ordering::SeqCst);
    drop(stream);
    tracing::info!(?outcome, "Output stream closed");
    Ok(outcome)
}

/// Build the output stream for any sample format the device natively wants;
/// the fill itself always works in i16 against the mapped window.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    region: Arc<SampleRegion>,
    channels: usize,
    looped: bool,
    stop: &Arc<AtomicBool>,
    finished: &Arc<AtomicBool>,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    // Callback-owned state: the frame cursor and a pre-sized scratch buffer
    // so the callback never allocates.
    let mut pos: usize = 0;
    let mut scratch: Vec<i16> = vec![0; BUFFER_FRAMES as usize * channels];
    let stop = Arc::clone(stop);
    let finished = Arc::clone(finished);
    let err_finished = Arc::clone(&finished);

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if stop.load(Ordering::Relaxed) || finished.load(Ordering::Relaxed) {
                // Abort requested or already drained: emit silence until the
                // supervising loop releases the stream.
                data.fill(T::from_sample(0i16));
                return;
            }
            if data.len() > scratch.len() {
                // Only reachable when the backend ignores the fixed buffer
                // size; grows once, then stays allocation-free.
                scratch.resize(data.len(), 0);
            }
            let out = &mut scratch[..data.len()];
            let outcome = fill_frames(out, region.bytes(), &mut pos, channels, looped);
            for (dst, &sample) in data.iter_mut().zip(out.iter()) {
                *dst = T::from_sample(sample);
            }
            if outcome == FillOutcome::Complete {
                finished.store(true, Ordering::Relaxed);
            }
        },
        move |err| {
            tracing::error!("Audio stream error: {err}");
            err_finished.store(true, Ordering::Relaxed);
        },
        None,
    )
}

/// Result of one buffer fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FillOutcome {
    /// More data remains (or the source loops forever).
    Continue,
    /// Non-looping tail reached; the buffer's remainder was zero-filled.
    Complete,
}

/// Fill `out` with interleaved frames from the little-endian 16-bit sample
/// bytes in `src`, starting at frame `*pos`.
///
/// Looping wraps from the source's end back to frame 0, a click-free seam
/// only because the source audio is pre-crossfaded there; no blending
/// happens at runtime. Non-looping fills the remaining tail, zero-fills the
/// rest and reports [`FillOutcome::Complete`].
pub(crate) fn fill_frames(
    out: &mut [i16],
    src: &[u8],
    pos: &mut usize,
    channels: usize,
    looped: bool,
) -> FillOutcome {
    let total = src.len() / (2 * channels);
    let want = out.len() / channels;

    if total == 0 {
        out.fill(0);
        return FillOutcome::Complete;
    }

    if !looped {
        let remaining = total - *pos;
        if want <= remaining {
            copy_frames(out, src, channels, *pos, 0, want);
            *pos += want;
            return FillOutcome::Continue;
        }
        copy_frames(out, src, channels, *pos, 0, remaining);
        out[remaining * channels..].fill(0);
        *pos = total;
        return FillOutcome::Complete;
    }

    let mut filled = 0;
    let mut p = *pos;
    while filled < want {
        let run = (total - p).min(want - filled);
        copy_frames(out, src, channels, p, filled, run);
        filled += run;
        p += run;
        if p == total {
            p = 0;
        }
    }
    *pos = p;
    FillOutcome::Continue
}

fn copy_frames(
    out: &mut [i16],
    src: &[u8],
    channels: usize,
    src_frame: usize,
    out_frame: usize,
    frames: usize,
) {
    for i in 0..frames * channels {
        let s = (src_frame * channels + i) * 2;
        out[out_frame * channels + i] = i16::from_le_bytes([src[s], src[s + 1]]);
    }
}
