//! Brown-noise generation. Runs once, caches the result to disk.
//!
//! Integrated white noise band-limited to roughly 1-500 Hz with a sub-bass
//! high-pass near 20 Hz. The signal is synthesized in chunks that are RMS
//! normalized for consistent loudness and crossfaded into each other; the
//! file's tail is also crossfaded into its head, so the player's loop
//! wraparound lands on a pre-blended seam and never clicks.

use std::f32::consts::TAU;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::Result;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Normalization target: RMS level of each chunk in full-scale units.
const TARGET_RMS: f32 = 0.3;

/// Synthesis parameters.
#[derive(Debug, Clone)]
pub struct NoiseSpec {
    pub sample_rate: u32,
    pub duration_secs: u64,
    /// Synthesis chunk length; also the RMS normalization window
    pub chunk_secs: u64,
    /// Crossfade length between chunks and across the loop seam
    pub crossfade_secs: u64,
}

impl Default for NoiseSpec {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            duration_secs: 3600,
            chunk_secs: 300,
            crossfade_secs: 1,
        }
    }
}

impl NoiseSpec {
    /// The default spec with a custom duration.
    pub fn with_minutes(minutes: u64) -> Self {
        Self {
            duration_secs: minutes * 60,
            ..Self::default()
        }
    }

    fn chunk_frames(&self) -> usize {
        let total = (self.sample_rate as u64 * self.duration_secs) as usize;
        ((self.sample_rate as u64 * self.chunk_secs) as usize).min(total).max(1)
    }

    fn crossfade_frames(&self) -> usize {
        // The crossfade must fit twice in a chunk: once for the held-back
        // tail, once for the rewritten head.
        ((self.sample_rate as u64 * self.crossfade_secs) as usize).min(self.chunk_frames() / 2)
    }

    fn chunk_count(&self) -> usize {
        let total = (self.sample_rate as u64 * self.duration_secs) as usize;
        (total / self.chunk_frames()).max(1)
    }

    /// Frames the generated file will contain. Each chunk contributes its
    /// length minus one crossfade (the tail is blended into what follows).
    pub fn output_frames(&self) -> u64 {
        (self.chunk_count() * (self.chunk_frames() - self.crossfade_frames())) as u64
    }
}

/// Default cache location for the generated file.
pub fn default_audio_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("lowhum").join("deep_brown_noise_1hr.wav"))
}

/// Return the path to the noise file, generating it on first call.
pub fn ensure_audio() -> Result<PathBuf> {
    let path = default_audio_path()
        .ok_or_else(|| std::io::Error::other("could not determine user data directory"))?;
    if path.exists() {
        return Ok(path);
    }
    tracing::info!(path = %path.display(), "Generating brown noise audio (first run)");
    generate(&path, &NoiseSpec::default())?;
    Ok(path)
}

/// Generate brown noise per `spec` and write it as a 16-bit PCM mono WAV.
pub fn generate(path: &Path, spec: &NoiseSpec) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let chunk_frames = spec.chunk_frames();
    let xfade = spec.crossfade_frames();
    let keep = chunk_frames - xfade;
    let data_bytes = spec.output_frames() as u32 * 2;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_wav_header(&mut writer, spec.sample_rate, data_bytes)?;

    let mut rng = rand::rng();
    // Tail of the previous chunk, fade-out already applied.
    let mut carry: Vec<f32> = Vec::new();
    // Raw head of the first chunk, rewritten at the end for the loop seam.
    let mut head: Vec<f32> = Vec::new();

    for i in 0..spec.chunk_count() {
        let mut chunk = synth_chunk(chunk_frames, spec.sample_rate, &mut rng);

        if i == 0 {
            head = chunk[..xfade].to_vec();
        } else {
            for (j, sample) in chunk[..xfade].iter_mut().enumerate() {
                let fade_in = j as f32 / xfade as f32;
                *sample = *sample * fade_in + carry[j];
            }
        }

        carry = chunk[keep..]
            .iter()
            .enumerate()
            .map(|(j, &s)| s * (1.0 - j as f32 / xfade as f32))
            .collect();

        for &sample in &chunk[..keep] {
            writer.write_all(&to_i16(sample).to_le_bytes())?;
        }
    }

    // Loop seam: blend the final faded-out tail into the (already written)
    // file head and rewrite those frames in place.
    let mut file = writer.into_inner().map_err(|e| e.into_error())?;
    file.seek(SeekFrom::Start(44))?;
    for (j, (&h, &c)) in head.iter().zip(carry.iter()).enumerate() {
        let fade_in = j as f32 / xfade as f32;
        file.write_all(&to_i16(h * fade_in + c).to_le_bytes())?;
    }
    file.flush()?;

    tracing::info!(path = %path.display(), frames = spec.output_frames(), "Noise file written");
    Ok(())
}

/// Synthesize one chunk of band-limited brown noise, RMS normalized.
fn synth_chunk(frames: usize, sample_rate: u32, rng: &mut impl Rng) -> Vec<f32> {
    let mut hp_drift = HighPass::new(1.0, sample_rate);
    let mut lp_band = OnePole::new(500.0, sample_rate);
    let mut hp_sub = HighPass::new(20.0, sample_rate);

    let mut acc = 0.0f32;
    let mut out = Vec::with_capacity(frames);
    for _ in 0..frames {
        let white: f32 = rng.random_range(-1.0..1.0);
        acc += white;
        let y = hp_sub.process(lp_band.lowpass(hp_drift.process(acc)));
        out.push(y);
    }

    // Per-chunk RMS normalization keeps volume consistent across chunks.
    let mean_sq = out.iter().map(|&s| f64::from(s) * f64::from(s)).sum::<f64>() / frames as f64;
    let rms = mean_sq.sqrt() as f32;
    if rms > f32::EPSILON {
        let gain = TARGET_RMS / rms;
        for sample in &mut out {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }
    out
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32_767.0) as i16
}

/// Canonical 44-byte header: RIFF/WAVE, 16-byte PCM fmt, data.
fn write_wav_header<W: Write>(w: &mut W, sample_rate: u32, data_bytes: u32) -> std::io::Result<()> {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);

    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_bytes).to_le_bytes())?;
    w.write_all(b"WAVE")?;
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?; // PCM
    w.write_all(&CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&byte_rate.to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;
    w.write_all(b"data")?;
    w.write_all(&data_bytes.to_le_bytes())?;
    Ok(())
}

/// Single-pole RC low-pass.
struct OnePole {
    coeff: f32,
    state: f32,
}

impl OnePole {
    fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        let rc = 1.0 / (TAU * cutoff_hz);
        let dt = 1.0 / sample_rate as f32;
        Self {
            coeff: dt / (rc + dt),
            state: 0.0,
        }
    }

    fn lowpass(&mut self, x: f32) -> f32 {
        self.state += self.coeff * (x - self.state);
        self.state
    }
}

/// High-pass as input minus its low-passed copy.
struct HighPass(OnePole);

impl HighPass {
    fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        Self(OnePole::new(cutoff_hz, sample_rate))
    }

    fn process(&mut self, x: f32) -> f32 {
        x - self.0.lowpass(x)
    }
}
