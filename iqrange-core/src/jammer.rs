//! Jammer waveform synthesis.
//!
//! Owned by the pipeline task. Carries its own sample counter for phase
//! continuity across chunks; the counter resets to zero whenever the
//! waveform kind, target frequency, or tuning state changes, matching the
//! original signal mixer's `sample_counter` reset-on-retune behaviour.

use num_complex::Complex32;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::config::{JammerConfig, JammerKind, TuningState};

const SWEEP_WIDTH_HZ: f64 = 50_000.0;
const SWEEP_RATE_HZ: f64 = 10.0;
const PULSE_PERIOD_SAMPLES: usize = 1000;
const PULSE_WIDTH_SAMPLES: usize = 100;
const CHIRP_RATE_HZ_PER_SEC: f64 = 100_000.0;
const CHIRP_WIDTH_HZ: f64 = 50_000.0;
const FHSS_HOP_SECONDS: f64 = 0.01;
const FHSS_HOP_OFFSETS_HZ: [f64; 5] = [-40_000.0, -20_000.0, 0.0, 20_000.0, 40_000.0];

/// Whether `target_freq_hz` falls within the receiver's current passband,
/// `|target - center| < sample_rate / 2`.
pub fn in_passband(target_freq_hz: f64, tuning: &TuningState) -> bool {
    let offset = target_freq_hz - tuning.center_freq_hz;
    offset.abs() < tuning.sample_rate_hz as f64 / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    kind: JammerKind,
    target_freq_hz: f64,
    amplitude_bits: u32,
    tuning: TuningState,
}

pub struct JammerSynth {
    sample_counter: u64,
    last_snapshot: Option<Snapshot>,
    rng: ChaCha8Rng,
}

impl JammerSynth {
    pub fn new(seed: u64) -> Self {
        Self {
            sample_counter: 0,
            last_snapshot: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Force the phase counter to zero on the next `chunk` call, regardless
    /// of whether the jammer config/tuning snapshot changed. Used when the
    /// source file is swapped: the jammer config itself is untouched, but
    /// the pacing clock restarts at a new offset-zero, so phase continuity
    /// with the pre-swap stream would be meaningless.
    pub fn reset_phase(&mut self) {
        self.sample_counter = 0;
        self.last_snapshot = None;
    }

    /// Generate `n` jamming samples for the current configuration. Returns
    /// all-zero samples when disabled or when the target frequency falls
    /// outside the current passband (barrage noise is an exception: it is
    /// wideband by construction and is always injected when enabled).
    pub fn chunk(&mut self, n: usize, config: &JammerConfig, tuning: &TuningState) -> Vec<Complex32> {
        let snapshot = Snapshot {
            kind: config.kind,
            target_freq_hz: config.target_freq_hz,
            amplitude_bits: config.amplitude.to_bits(),
            tuning: *tuning,
        };
        if self.last_snapshot != Some(snapshot) {
            self.sample_counter = 0;
            self.last_snapshot = Some(snapshot);
        }

        if !config.enabled {
            return vec![Complex32::new(0.0, 0.0); n];
        }

        let out = match config.kind {
            JammerKind::Barrage => self.barrage(n, config.amplitude),
            JammerKind::Spot => self.spot(n, config, tuning),
            JammerKind::Sweep => self.sweep(n, config, tuning),
            JammerKind::Pulse => self.pulse(n, config, tuning),
            JammerKind::Chirp => self.chirp(n, config, tuning),
            JammerKind::Fhss => self.fhss(n, config, tuning),
        };
        self.sample_counter += n as u64;
        out
    }

    fn barrage(&mut self, n: usize, amplitude: f32) -> Vec<Complex32> {
        let normal = Normal::new(0.0, amplitude as f64).expect("amplitude is finite and >= 0");
        (0..n)
            .map(|_| {
                let i = normal.sample(&mut self.rng) as f32;
                let q = normal.sample(&mut self.rng) as f32;
                Complex32::new(i, q)
            })
            .collect()
    }

    fn spot(&self, n: usize, config: &JammerConfig, tuning: &TuningState) -> Vec<Complex32> {
        if !in_passband(config.target_freq_hz, tuning) {
            return vec![Complex32::new(0.0, 0.0); n];
        }
        let freq_offset = config.target_freq_hz - tuning.center_freq_hz;
        let freq_normalized = freq_offset / tuning.sample_rate_hz as f64;
        (0..n)
            .map(|k| {
                let t = (self.sample_counter + k as u64) as f64;
                let phase = 2.0 * std::f64::consts::PI * freq_normalized * t;
                complex_from_phase(phase, config.amplitude)
            })
            .collect()
    }

    fn sweep(&self, n: usize, config: &JammerConfig, tuning: &TuningState) -> Vec<Complex32> {
        if !in_passband(config.target_freq_hz, tuning) {
            return vec![Complex32::new(0.0, 0.0); n];
        }
        let freq_offset = config.target_freq_hz - tuning.center_freq_hz;
        let sample_rate = tuning.sample_rate_hz as f64;
        let mut phase_acc = 0.0;
        let mut out = Vec::with_capacity(n);
        for k in 0..n {
            let t = (self.sample_counter + k as u64) as f64;
            let instantaneous_offset = freq_offset
                + SWEEP_WIDTH_HZ * (2.0 * std::f64::consts::PI * SWEEP_RATE_HZ * t / sample_rate).sin();
            phase_acc += 2.0 * std::f64::consts::PI * instantaneous_offset / sample_rate;
            out.push(complex_from_phase(phase_acc, config.amplitude));
        }
        out
    }

    fn pulse(&self, n: usize, config: &JammerConfig, tuning: &TuningState) -> Vec<Complex32> {
        if !in_passband(config.target_freq_hz, tuning) {
            return vec![Complex32::new(0.0, 0.0); n];
        }
        let freq_offset = config.target_freq_hz - tuning.center_freq_hz;
        let freq_normalized = freq_offset / tuning.sample_rate_hz as f64;
        let mut out = vec![Complex32::new(0.0, 0.0); n];
        let mut i = 0;
        while i < n {
            let end = (i + PULSE_WIDTH_SAMPLES).min(n);
            for (offset, sample) in out[i..end].iter_mut().enumerate() {
                let t = (self.sample_counter + i as u64 + offset as u64) as f64;
                let phase = 2.0 * std::f64::consts::PI * freq_normalized * t;
                *sample = complex_from_phase(phase, config.amplitude);
            }
            i += PULSE_PERIOD_SAMPLES;
        }
        out
    }

    fn chirp(&self, n: usize, config: &JammerConfig, tuning: &TuningState) -> Vec<Complex32> {
        if !in_passband(config.target_freq_hz, tuning) {
            return vec![Complex32::new(0.0, 0.0); n];
        }
        let freq_offset = config.target_freq_hz - tuning.center_freq_hz;
        let sample_rate = tuning.sample_rate_hz as f64;
        let sweep_time = sample_rate / CHIRP_RATE_HZ_PER_SEC;
        let mut phase_acc = 0.0;
        let mut out = Vec::with_capacity(n);
        for k in 0..n {
            let t = (self.sample_counter + k as u64) as f64;
            let phase_fraction = (t % sweep_time) / sweep_time;
            let instantaneous_freq = freq_offset + CHIRP_WIDTH_HZ * (phase_fraction - 0.5);
            phase_acc += 2.0 * std::f64::consts::PI * instantaneous_freq / sample_rate;
            out.push(complex_from_phase(phase_acc, config.amplitude));
        }
        out
    }

    fn fhss(&mut self, n: usize, config: &JammerConfig, tuning: &TuningState) -> Vec<Complex32> {
        if !in_passband(config.target_freq_hz, tuning) {
            return vec![Complex32::new(0.0, 0.0); n];
        }
        let freq_offset = config.target_freq_hz - tuning.center_freq_hz;
        let sample_rate = tuning.sample_rate_hz as f64;
        let hop_duration = (FHSS_HOP_SECONDS * sample_rate) as usize;
        let hop_duration = hop_duration.max(1);
        let mut out = vec![Complex32::new(0.0, 0.0); n];
        let mut i = 0;
        while i < n {
            let end = (i + hop_duration).min(n);
            let hop_offset =
                FHSS_HOP_OFFSETS_HZ[self.rng.gen_range(0..FHSS_HOP_OFFSETS_HZ.len())];
            let total_offset = freq_offset + hop_offset;
            for (t, sample) in out[i..end].iter_mut().enumerate() {
                let phase = 2.0 * std::f64::consts::PI * total_offset / sample_rate * t as f64;
                *sample = complex_from_phase(phase, config.amplitude);
            }
            i += hop_duration;
        }
        out
    }
}

fn complex_from_phase(phase: f64, amplitude: f32) -> Complex32 {
    Complex32::new(
        amplitude * phase.cos() as f32,
        amplitude * phase.sin() as f32,
    )
}
