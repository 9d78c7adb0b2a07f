//! Telemetry sampling and statistical aggregation for a running decode session.

use crate::logging::{StatSummary, TelemetryEvent};
use chrono::Utc;
use std::time::Instant;

/// Accumulates signal-quality samples and decode-event counts, and emits
/// periodic [`TelemetryEvent`]s and a final statistical summary.
pub struct TelemetryAggregator {
    snr_samples: Vec<f64>,
    ber_samples: Vec<f64>,
    signal_strength_samples: Vec<f64>,

    last_sample_time: Instant,
    events_decoded: usize,
    chunks_processed: usize,
    current_packet_success: f64,
    current_healthy: bool,

    sample_interval_secs: f64,
}

impl TelemetryAggregator {
    pub fn new(sample_interval_secs: f64) -> Self {
        Self {
            snr_samples: Vec::new(),
            ber_samples: Vec::new(),
            signal_strength_samples: Vec::new(),
            last_sample_time: Instant::now(),
            events_decoded: 0,
            chunks_processed: 0,
            current_packet_success: 0.0,
            current_healthy: false,
            sample_interval_secs,
        }
    }

    /// Record a signal-quality sample from the metrics decoder.
    pub fn record_metrics(&mut self, snr_db: f64, ber: f64, signal_strength_dbm: f64, packet_success_rate: f64) {
        self.chunks_processed += 1;
        self.current_packet_success = packet_success_rate;
        self.current_healthy = packet_success_rate >= 0.9;
        self.snr_samples.push(snr_db);
        self.ber_samples.push(ber);
        self.signal_strength_samples.push(signal_strength_dbm);
    }

    /// Record that the AIS or SSTV decoder produced an event this chunk.
    pub fn record_event(&mut self) {
        self.events_decoded += 1;
        self.current_healthy = true;
    }

    pub fn record_chunk(&mut self) {
        self.chunks_processed += 1;
    }

    pub fn should_sample(&self) -> bool {
        self.last_sample_time.elapsed().as_secs_f64() >= self.sample_interval_secs
    }

    /// Generate a telemetry event and reset the sampling timer.
    pub fn sample(&mut self) -> Option<TelemetryEvent> {
        if !self.should_sample() {
            return None;
        }

        let event = TelemetryEvent {
            timestamp: Utc::now(),
            snr_db: self.mean(&self.snr_samples).unwrap_or(0.0),
            ber: self.mean(&self.ber_samples).unwrap_or(0.0),
            signal_strength_dbm: self.mean(&self.signal_strength_samples).unwrap_or(-100.0),
            packet_success_rate: self.current_packet_success,
            events_decoded: self.events_decoded,
            chunks_processed: self.chunks_processed,
            healthy: self.current_healthy,
        };

        self.last_sample_time = Instant::now();
        Some(event)
    }

    /// Compute a statistical summary for all accumulated samples.
    pub fn compute_statistics(&self) -> (StatSummary, StatSummary, StatSummary) {
        (
            self.compute_stat_summary(&self.snr_samples),
            self.compute_stat_summary(&self.ber_samples),
            self.compute_stat_summary(&self.signal_strength_samples),
        )
    }

    fn compute_stat_summary(&self, samples: &[f64]) -> StatSummary {
        if samples.is_empty() {
            return StatSummary { mean: 0.0, stddev: 0.0, min: 0.0, max: 0.0, samples: 0 };
        }

        let mean = self.mean(samples).unwrap_or(0.0);
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        let stddev = variance.sqrt();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        StatSummary { mean, stddev, min, max, samples: samples.len() }
    }

    fn mean(&self, samples: &[f64]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    pub fn total_events(&self) -> usize {
        self.events_decoded
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks_processed
    }
}
