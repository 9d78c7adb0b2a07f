use criterion::{criterion_group, criterion_main, Criterion};
use iqrange_core::config::{JammerConfig, JammerKind, TuningState};
use iqrange_core::jammer::JammerSynth;

fn bench_jammer_kinds(c: &mut Criterion) {
    let tuning = TuningState {
        center_freq_hz: 100_000_000.0,
        sample_rate_hz: 1_024_000,
    };

    for kind in [
        JammerKind::Barrage,
        JammerKind::Spot,
        JammerKind::Sweep,
        JammerKind::Pulse,
        JammerKind::Chirp,
        JammerKind::Fhss,
    ] {
        let config = JammerConfig {
            enabled: true,
            kind,
            amplitude: 0.5,
            target_freq_hz: 100_010_000.0,
        };
        let mut synth = JammerSynth::new(42);
        c.bench_function(&format!("jammer_{kind}"), |b| {
            b.iter(|| synth.chunk(16_384, &config, &tuning))
        });
    }
}

criterion_group!(benches, bench_jammer_kinds);
criterion_main!(benches);
