//! Slow-scan television (SSTV) line synchronization and image decoding.
//!
//! Ported from the decode service's `sstv_sync.py` (Goertzel tone detection,
//! VIS code table, sync pulse detection) and `sstv_decoder.py` (per-pixel
//! frequency-to-intensity mapping). Operates on a real-valued audio-rate
//! signal, not on baseband IQ directly — callers demodulate upstream (FM,
//! matching the decode service's pipeline) before handing samples here.

use std::f64::consts::PI;
use std::time::Duration;

use rustfft::num_complex::Complex32 as FftComplex32;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

pub const SYNC_FREQ_HZ: f64 = 1200.0;
const REFERENCE_FREQ_HZ: f64 = 2000.0;
const VIS_BIT0_FREQ_HZ: f64 = 1100.0;
const VIS_BIT1_FREQ_HZ: f64 = 1300.0;
pub const BLACK_FREQ_HZ: f64 = 1500.0;
pub const WHITE_FREQ_HZ: f64 = 2300.0;

const VIS_BIT_SECS: f64 = 0.030;
const SYNC_PULSE_SECS: f64 = 0.030;
const VIS_SCAN_WINDOW_SECS: f64 = 2.0;
const VIS_TIMEOUT_SECS: f64 = 5.0;
const DISCRIMINATION_FACTOR: f64 = 3.0;

/// Evaluate the magnitude of a single DFT bin near `target_freq_hz` over
/// `samples`, via the Goertzel recurrence (no full FFT needed for one bin).
pub fn goertzel_magnitude(samples: &[f32], target_freq_hz: f64, sample_rate_hz: f64) -> f64 {
    let n = samples.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let k = (0.5 + n * target_freq_hz / sample_rate_hz).floor();
    let omega = 2.0 * PI * k / n;
    let coeff = 2.0 * omega.cos();

    let mut q1 = 0.0_f64;
    let mut q2 = 0.0_f64;
    for &sample in samples {
        let q0 = coeff * q1 - q2 + sample as f64;
        q2 = q1;
        q1 = q0;
    }
    (q1 * q1 + q2 * q2 - q1 * q2 * coeff).max(0.0).sqrt()
}

/// A tone is "present" if its Goertzel magnitude exceeds a reference tone's
/// magnitude by a factor of three.
pub fn tone_present(samples: &[f32], target_freq_hz: f64, sample_rate_hz: f64) -> bool {
    let target_mag = goertzel_magnitude(samples, target_freq_hz, sample_rate_hz);
    let reference_mag = goertzel_magnitude(samples, REFERENCE_FREQ_HZ, sample_rate_hz);
    target_mag > reference_mag * DISCRIMINATION_FACTOR
}

fn detect_sync_pulse(samples: &[f32], sample_rate_hz: f64) -> bool {
    tone_present(samples, SYNC_FREQ_HZ, sample_rate_hz)
}

/// Dominant frequency within `[lo_hz, hi_hz]`, found by FFT peak search. Used
/// for per-pixel intensity mapping in the DECODING state.
pub fn dominant_frequency_in_range(
    samples: &[f32],
    sample_rate_hz: f64,
    lo_hz: f64,
    hi_hz: f64,
) -> f64 {
    let n = samples.len();
    if n == 0 {
        return (lo_hz + hi_hz) / 2.0;
    }
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<FftComplex32> = samples.iter().map(|&s| FftComplex32::new(s, 0.0)).collect();
    fft.process(&mut buffer);

    let mut best_freq = (lo_hz + hi_hz) / 2.0;
    let mut best_mag = -1.0f32;
    for (k, bin) in buffer.iter().enumerate().take(n / 2 + 1) {
        let freq = k as f64 * sample_rate_hz / n as f64;
        if freq < lo_hz || freq > hi_hz {
            continue;
        }
        let mag = bin.norm();
        if mag > best_mag {
            best_mag = mag;
            best_freq = freq;
        }
    }
    best_freq
}

/// Supported SSTV modes, keyed by their standard VIS code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SstvMode {
    MartinM1,
    MartinM2,
    ScottieS1,
    ScottieS2,
    Robot36,
}

impl SstvMode {
    pub fn from_vis_code(code: u8) -> Option<Self> {
        match code {
            0x2C => Some(SstvMode::MartinM1),
            0x28 => Some(SstvMode::MartinM2),
            0x24 => Some(SstvMode::ScottieS1),
            0x20 => Some(SstvMode::ScottieS2),
            0x3C => Some(SstvMode::Robot36),
            _ => None,
        }
    }

    pub fn params(self) -> ModeParams {
        match self {
            SstvMode::MartinM1 => ModeParams { line_time_secs: 0.146, width: 320, height: 256 },
            SstvMode::MartinM2 => ModeParams { line_time_secs: 0.073, width: 320, height: 256 },
            SstvMode::ScottieS1 => ModeParams { line_time_secs: 0.138, width: 320, height: 256 },
            SstvMode::ScottieS2 => ModeParams { line_time_secs: 0.088, width: 320, height: 256 },
            SstvMode::Robot36 => ModeParams { line_time_secs: 0.150, width: 320, height: 240 },
        }
    }
}

/// Per-mode line timing and image dimensions.
#[derive(Debug, Clone, Copy)]
pub struct ModeParams {
    pub line_time_secs: f64,
    pub width: usize,
    pub height: usize,
}

/// Reference mode used for the 5-second VIS-timeout fallback (spec.md's
/// "320x256, 0.146-s-per-line progressive colour mode").
const DEFAULT_MODE: SstvMode = SstvMode::MartinM1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    WaitingForVis,
    WaitingForSync,
    Decoding,
}

/// Events the decoder emits as it progresses through an image.
#[derive(Debug, Clone)]
pub enum SstvEvent {
    VisDetected { mode: SstvMode },
    DefaultModeFallback { mode: SstvMode },
    SyncLocked,
    ScanLine { line: usize },
    CompleteImage { width: usize, height: usize, image: Vec<u8> },
}

/// Streaming SSTV decoder. Consumes successive audio-rate chunks and emits
/// [`SstvEvent`]s as VIS codes, sync pulses, scan lines and complete images
/// are recognized.
pub struct SstvDecoder {
    sample_rate_hz: f64,
    state: DecodeState,
    mode: SstvMode,
    width: usize,
    height: usize,
    samples_per_pixel: usize,
    image: Vec<u8>,
    line: usize,
    column: usize,
    pixel_buffer: Vec<f32>,
    vis_scan_buffer: Vec<f32>,
    vis_elapsed_samples: u64,
    sync_probe_buffer: Vec<f32>,
}

impl SstvDecoder {
    pub fn new(sample_rate_hz: f64) -> Self {
        let params = DEFAULT_MODE.params();
        let mut decoder = Self {
            sample_rate_hz,
            state: DecodeState::WaitingForVis,
            mode: DEFAULT_MODE,
            width: params.width,
            height: params.height,
            samples_per_pixel: 0,
            image: Vec::new(),
            line: 0,
            column: 0,
            pixel_buffer: Vec::new(),
            vis_scan_buffer: Vec::new(),
            vis_elapsed_samples: 0,
            sync_probe_buffer: Vec::new(),
        };
        decoder.reset_image_for_mode(DEFAULT_MODE);
        decoder
    }

    fn reset_image_for_mode(&mut self, mode: SstvMode) {
        let params = mode.params();
        self.mode = mode;
        self.width = params.width;
        self.height = params.height;
        self.samples_per_pixel =
            ((self.sample_rate_hz * params.line_time_secs) / params.width as f64).floor() as usize;
        self.samples_per_pixel = self.samples_per_pixel.max(1);
        self.image = vec![0u8; params.width * params.height * 3];
        self.line = 0;
        self.column = 0;
        self.pixel_buffer.clear();
    }

    fn elapsed_vis_wait(&self) -> Duration {
        Duration::from_secs_f64(self.vis_elapsed_samples as f64 / self.sample_rate_hz)
    }

    /// Feed one chunk of audio-rate samples, returning any events produced.
    pub fn process_audio(&mut self, audio: &[f32]) -> Vec<SstvEvent> {
        match self.state {
            DecodeState::WaitingForVis => self.run_waiting_for_vis(audio),
            DecodeState::WaitingForSync => self.run_waiting_for_sync(audio),
            DecodeState::Decoding => self.run_decoding(audio),
        }
    }

    fn run_waiting_for_vis(&mut self, audio: &[f32]) -> Vec<SstvEvent> {
        let mut events = Vec::new();
        self.vis_scan_buffer.extend_from_slice(audio);
        self.vis_elapsed_samples += audio.len() as u64;

        let scan_window_samples = (self.sample_rate_hz * VIS_SCAN_WINDOW_SECS) as usize;
        if self.vis_scan_buffer.len() >= scan_window_samples {
            if let Some(mode) = self.try_decode_vis(&self.vis_scan_buffer.clone()) {
                events.push(SstvEvent::VisDetected { mode });
                self.reset_image_for_mode(mode);
                self.state = DecodeState::WaitingForSync;
                self.vis_scan_buffer.clear();
                return events;
            }
            // Keep only the most recent window so VIS detection can retry on
            // fresh data rather than re-scanning the same stale audio.
            let excess = self.vis_scan_buffer.len() - scan_window_samples;
            self.vis_scan_buffer.drain(..excess);
        }

        if self.elapsed_vis_wait() >= Duration::from_secs_f64(VIS_TIMEOUT_SECS) {
            events.push(SstvEvent::DefaultModeFallback { mode: DEFAULT_MODE });
            self.reset_image_for_mode(DEFAULT_MODE);
            self.state = DecodeState::Decoding;
            self.vis_scan_buffer.clear();
        }
        events
    }

    fn try_decode_vis(&self, audio: &[f32]) -> Option<SstvMode> {
        let bit_samples = (self.sample_rate_hz * VIS_BIT_SECS) as usize;
        if bit_samples == 0 || audio.len() < bit_samples * 10 {
            return None;
        }
        let step = (bit_samples / 2).max(1);
        let mut offset = 0;
        while offset + bit_samples * 9 <= audio.len() {
            let start_bit = &audio[offset..offset + bit_samples];
            if detect_sync_pulse(start_bit, self.sample_rate_hz) {
                let mut vis_bits = Vec::with_capacity(7);
                for bit_num in 0..7 {
                    let bit_offset = offset + bit_samples * (bit_num + 1);
                    if bit_offset + bit_samples > audio.len() {
                        break;
                    }
                    let segment = &audio[bit_offset..bit_offset + bit_samples];
                    let mag0 = goertzel_magnitude(segment, VIS_BIT0_FREQ_HZ, self.sample_rate_hz);
                    let mag1 = goertzel_magnitude(segment, VIS_BIT1_FREQ_HZ, self.sample_rate_hz);
                    vis_bits.push(if mag1 > mag0 { 1u8 } else { 0u8 });
                }
                if vis_bits.len() == 7 {
                    let code: u8 = vis_bits.iter().enumerate().fold(0u8, |acc, (i, &b)| acc | (b << i));
                    if let Some(mode) = SstvMode::from_vis_code(code) {
                        return Some(mode);
                    }
                }
            }
            offset += step;
        }
        None
    }

    fn run_waiting_for_sync(&mut self, audio: &[f32]) -> Vec<SstvEvent> {
        let mut events = Vec::new();
        self.sync_probe_buffer.extend_from_slice(audio);
        let pulse_samples = (self.sample_rate_hz * SYNC_PULSE_SECS) as usize;
        if pulse_samples == 0 {
            return events;
        }
        while self.sync_probe_buffer.len() >= pulse_samples {
            let probe: Vec<f32> = self.sync_probe_buffer.drain(..pulse_samples).collect();
            if detect_sync_pulse(&probe, self.sample_rate_hz) {
                events.push(SstvEvent::SyncLocked);
                self.state = DecodeState::Decoding;
                self.sync_probe_buffer.clear();
                break;
            }
        }
        events
    }

    fn run_decoding(&mut self, audio: &[f32]) -> Vec<SstvEvent> {
        let mut events = Vec::new();
        for &sample in audio {
            self.pixel_buffer.push(sample);
            if self.pixel_buffer.len() < self.samples_per_pixel {
                continue;
            }
            let freq = dominant_frequency_in_range(
                &self.pixel_buffer,
                self.sample_rate_hz,
                BLACK_FREQ_HZ,
                WHITE_FREQ_HZ,
            );
            self.pixel_buffer.clear();

            let intensity = (((freq - BLACK_FREQ_HZ) / (WHITE_FREQ_HZ - BLACK_FREQ_HZ)) * 255.0)
                .clamp(0.0, 255.0) as u8;
            let idx = (self.line * self.width + self.column) * 3;
            if idx + 3 <= self.image.len() {
                self.image[idx] = intensity;
                self.image[idx + 1] = intensity;
                self.image[idx + 2] = intensity;
            }

            self.column += 1;
            if self.column == self.width {
                self.column = 0;
                events.push(SstvEvent::ScanLine { line: self.line });
                self.line += 1;
                if self.line == self.height {
                    events.push(SstvEvent::CompleteImage {
                        width: self.width,
                        height: self.height,
                        image: std::mem::take(&mut self.image),
                    });
                    self.state = DecodeState::WaitingForSync;
                    self.reset_image_for_mode(self.mode);
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq_hz: f64, sample_rate_hz: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / sample_rate_hz).sin() as f32)
            .collect()
    }

    #[test]
    fn goertzel_favors_target_frequency_over_distant_tone() {
        let sample_rate = 12_000.0;
        let samples = tone(1200.0, sample_rate, 400);
        let target_mag = goertzel_magnitude(&samples, 1200.0, sample_rate);
        let distant_mag = goertzel_magnitude(&samples, 2000.0, sample_rate);
        assert!(target_mag > distant_mag * 3.0);
    }

    #[test]
    fn sync_pulse_is_detected_on_1200hz_tone() {
        let sample_rate = 12_000.0;
        let samples = tone(SYNC_FREQ_HZ, sample_rate, (sample_rate * SYNC_PULSE_SECS) as usize);
        assert!(detect_sync_pulse(&samples, sample_rate));
    }

    #[test]
    fn vis_timeout_falls_back_to_default_mode() {
        let sample_rate = 4_000.0;
        let mut decoder = SstvDecoder::new(sample_rate);
        // Feed 6 seconds of non-SSTV (silent) audio in 0.5s chunks.
        let chunk = vec![0.0f32; (sample_rate * 0.5) as usize];
        let mut saw_fallback = false;
        for _ in 0..12 {
            for event in decoder.process_audio(&chunk) {
                if let SstvEvent::DefaultModeFallback { mode } = event {
                    assert_eq!(mode, SstvMode::MartinM1);
                    saw_fallback = true;
                }
            }
        }
        assert!(saw_fallback);
        assert_eq!(decoder.state, DecodeState::Decoding);
    }

    #[test]
    fn dominant_frequency_detects_white_tone() {
        let sample_rate = 12_000.0;
        let samples = tone(WHITE_FREQ_HZ, sample_rate, 64);
        let freq = dominant_frequency_in_range(&samples, sample_rate, BLACK_FREQ_HZ, WHITE_FREQ_HZ);
        assert!((freq - WHITE_FREQ_HZ).abs() < 200.0);
    }

    #[test]
    fn vis_code_table_maps_known_codes() {
        assert_eq!(SstvMode::from_vis_code(0x2C), Some(SstvMode::MartinM1));
        assert_eq!(SstvMode::from_vis_code(0x3C), Some(SstvMode::Robot36));
        assert_eq!(SstvMode::from_vis_code(0xFF), None);
    }
}
