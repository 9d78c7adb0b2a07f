//! End-to-end scenarios exercising the playback, jamming, and decode stack
//! together, rather than one module at a time.

use std::io::Write;

use iqrange_core::ais::AisDecoder;
use iqrange_core::config::{JammerConfig, JammerKind, TuningState};
use iqrange_core::dongle_server::{dequantize, quantize};
use iqrange_core::jammer::JammerSynth;
use iqrange_core::mixer::mix;
use iqrange_core::sample_source::SampleSource;
use iqrange_core::sstv::SstvDecoder;
use num_complex::Complex32;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A temp IQ file of `n` zero samples, cleaned up on drop.
struct ZeroIqFile {
    path: std::path::PathBuf,
}

impl ZeroIqFile {
    fn new(n: usize) -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("iqrange-integration-{}-{}.iq", std::process::id(), n));
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = std::io::BufWriter::new(file);
        let zero = [0u8; 8];
        for _ in 0..n {
            writer.write_all(&zero).unwrap();
        }
        writer.flush().unwrap();
        Self { path }
    }
}

impl Drop for ZeroIqFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn goertzel_power(samples: &[Complex32], freq_offset_hz: f64, sample_rate_hz: f64) -> f64 {
    let n = samples.len();
    let k = (n as f64) * freq_offset_hz / sample_rate_hz;
    let omega = 2.0 * std::f64::consts::PI * k / n as f64;
    let (mut s_prev, mut s_prev2) = (0.0, 0.0);
    let coeff = 2.0 * omega.cos();
    for s in samples {
        let s0 = s.re as f64 + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s0;
    }
    let power = s_prev2 * s_prev2 + s_prev * s_prev - coeff * s_prev * s_prev2;
    power / (n as f64 * n as f64)
}

#[test]
fn clean_spot_jammer_in_band_produces_a_spectral_line_at_offset() {
    let sample_rate = 1_024_000u32;
    let file = ZeroIqFile::new(sample_rate as usize);
    let mut source = SampleSource::load(&file.path).unwrap();

    let tuning = TuningState {
        center_freq_hz: 100_000_000.0,
        sample_rate_hz: sample_rate,
    };
    let jammer_config = JammerConfig {
        enabled: true,
        kind: JammerKind::Spot,
        amplitude: 0.5,
        target_freq_hz: 100_100_000.0,
    };
    let mut synth = JammerSynth::new(0);

    let clean = source.chunk(sample_rate as usize).unwrap();
    let jamming = synth.chunk(clean.len(), &jammer_config, &tuning);
    let mixed = mix(&clean, &jamming);

    let on_tone = goertzel_power(&mixed, 100_000.0, sample_rate as f64);
    let off_tone = goertzel_power(&mixed, -100_000.0, sample_rate as f64);
    assert!(on_tone > off_tone * 10.0, "on={on_tone} off={off_tone}");
}

#[test]
fn out_of_band_spot_jammer_leaves_output_silent() {
    let sample_rate = 1_024_000u32;
    let file = ZeroIqFile::new(sample_rate as usize);
    let mut source = SampleSource::load(&file.path).unwrap();

    let tuning = TuningState {
        center_freq_hz: 100_000_000.0,
        sample_rate_hz: sample_rate,
    };
    let jammer_config = JammerConfig {
        enabled: true,
        kind: JammerKind::Spot,
        amplitude: 0.5,
        target_freq_hz: 100_800_000.0,
    };
    let mut synth = JammerSynth::new(0);

    let clean = source.chunk(sample_rate as usize).unwrap();
    let jamming = synth.chunk(clean.len(), &jammer_config, &tuning);
    assert!(jamming.iter().all(|s| s.re == 0.0 && s.im == 0.0));

    let mixed = mix(&clean, &jamming);
    assert!(mixed.iter().all(|s| s.re == 0.0 && s.im == 0.0));
}

#[test]
fn barrage_noise_floor_falls_in_expected_variance_band() {
    let sample_rate = 1_024_000u32;
    let tuning = TuningState {
        center_freq_hz: 100_000_000.0,
        sample_rate_hz: sample_rate,
    };
    let jammer_config = JammerConfig {
        enabled: true,
        kind: JammerKind::Barrage,
        amplitude: 0.3,
        target_freq_hz: 100_000_000.0,
    };
    let mut synth = JammerSynth::new(42);
    let jamming = synth.chunk(100_000, &jammer_config, &tuning);

    let mean: f64 = jamming.iter().map(|s| s.re as f64).sum::<f64>() / jamming.len() as f64;
    let variance: f64 = jamming.iter().map(|s| (s.re as f64 - mean).powi(2)).sum::<f64>() / jamming.len() as f64;
    assert!(variance >= 0.08 && variance <= 0.10, "variance={variance}");
}

#[test]
fn file_swap_resets_position_and_jammer_phase() {
    let old_file = ZeroIqFile::new(1_000);
    let new_file = ZeroIqFile::new(300);
    let mut source = SampleSource::load(&old_file.path).unwrap();
    source.chunk(500).unwrap();

    source.switch(&new_file.path).unwrap();
    source.play();
    assert_eq!(source.total_samples(), 300);

    let tuning = TuningState::default();
    let config = JammerConfig {
        enabled: true,
        kind: JammerKind::Spot,
        amplitude: 0.5,
        target_freq_hz: 100_100_000.0,
    };
    let mut synth = JammerSynth::new(0);
    synth.chunk(1000, &config, &tuning);
    synth.reset_phase();

    let after_reset = synth.chunk(4, &config, &tuning);
    let mut fresh = JammerSynth::new(0);
    let from_scratch = fresh.chunk(4, &config, &tuning);
    for (a, b) in after_reset.iter().zip(from_scratch.iter()) {
        assert!((a.re - b.re).abs() < 1e-5);
        assert!((a.im - b.im).abs() < 1e-5);
    }
}

#[test]
fn tuning_command_mid_stream_retunes_passband() {
    let sample_rate = 1_024_000u32;
    let config = JammerConfig {
        enabled: true,
        kind: JammerKind::Spot,
        amplitude: 0.5,
        target_freq_hz: 100_500_000.0,
    };
    let mut synth = JammerSynth::new(0);

    let mut tuning = TuningState {
        center_freq_hz: 100_000_000.0,
        sample_rate_hz: sample_rate,
    };
    assert!(!iqrange_core::jammer::in_passband(config.target_freq_hz, &tuning));
    let silent = synth.chunk(sample_rate as usize, &config, &tuning);
    assert!(silent.iter().all(|s| s.re == 0.0 && s.im == 0.0));

    tuning.center_freq_hz = 100_400_000.0;
    assert!(iqrange_core::jammer::in_passband(config.target_freq_hz, &tuning));
    let audible = synth.chunk(sample_rate as usize, &config, &tuning);
    assert!(audible.iter().any(|s| s.re != 0.0 || s.im != 0.0));
}

#[test]
fn quantized_wire_samples_recover_within_tolerance() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..10_000 {
        let v: f32 = rng.gen_range(-1.0..=1.0);
        let recovered = dequantize(quantize(v));
        assert!((recovered - v).abs() <= 1.0 / 127.5 + 1e-6);
    }
}

#[test]
fn sstv_decoder_falls_back_to_default_mode_after_vis_timeout() {
    let sample_rate_hz = 8_000.0;
    let mut decoder = SstvDecoder::new(sample_rate_hz);

    // Six seconds of silence: no VIS tone is ever detected.
    let silence = vec![0.0f32; (sample_rate_hz * 6.0) as usize];
    let events: Vec<_> = silence
        .chunks(800)
        .flat_map(|chunk| decoder.process_audio(chunk))
        .collect();

    assert!(events
        .iter()
        .any(|e| matches!(e, iqrange_core::sstv::SstvEvent::DefaultModeFallback { .. })));
}

#[test]
fn ais_decoder_on_pure_noise_never_panics_and_reports_nothing() {
    let mut decoder = AisDecoder::new(48_000.0);
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let noise: Vec<Complex32> = (0..48_000)
        .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    let audio = iqrange_core::ais::fm_discriminator(&noise);
    let reports = decoder.process_audio(&audio);
    assert!(reports.is_empty());
}
