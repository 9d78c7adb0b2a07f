//! Gardner timing-error detector for symbol/bit synchronization.
//!
//! Ported from the decode service's `GardnerClockRecovery`: a non-data-aided
//! timing loop that locks onto a real-valued signal's symbol rate without
//! needing a matched filter or training sequence. Used by [`crate::ais`] to
//! recover NRZI bits from the FM-discriminated AIS channel.

/// Samples-per-symbol deviation the omega estimate is allowed to drift by.
const OMEGA_LIMIT: f64 = 0.5;

/// Gardner clock recovery loop. Carries `mu` (fractional sample offset) and
/// `omega` (current samples-per-symbol estimate) across calls to [`process`],
/// so a decoder can feed it successive chunks of a longer signal and get
/// continuous bit timing, restarting only when a fresh signal segment begins.
///
/// [`process`]: GardnerClockRecovery::process
#[derive(Debug, Clone)]
pub struct GardnerClockRecovery {
    sps: f64,
    mu: f64,
    omega: f64,
    gain_mu: f64,
    gain_omega: f64,
    last_sample: f32,
}

impl GardnerClockRecovery {
    /// `samples_per_symbol` is the nominal (not necessarily integer) ratio of
    /// input sample rate to symbol rate. `loop_bandwidth` trades lock speed
    /// against jitter; the decode service uses 0.01 for AIS at 9600 baud.
    pub fn new(samples_per_symbol: f64, loop_bandwidth: f64) -> Self {
        Self {
            sps: samples_per_symbol,
            mu: 0.0,
            omega: samples_per_symbol,
            gain_mu: loop_bandwidth,
            gain_omega: loop_bandwidth * loop_bandwidth / 4.0,
            last_sample: 0.0,
        }
    }

    /// Run the loop over `samples`, emitting one decided bit per recovered
    /// symbol. Mutates internal loop state so the next call continues the
    /// same timing track; feed a fresh instance for an unrelated segment.
    pub fn process(&mut self, samples: &[f32]) -> Vec<u8> {
        let mut bits = Vec::new();
        let mut i: i64 = 0;
        let n = samples.len() as i64;

        while i < n - self.omega as i64 {
            let curr_idx = i + self.mu as i64;
            if curr_idx < 0 || curr_idx >= n {
                break;
            }
            let curr_sample = samples[curr_idx as usize];

            let mid_idx = i + self.mu as i64 - (self.omega / 2.0) as i64;
            let mid_sample = if mid_idx >= 0 && mid_idx < n {
                samples[mid_idx as usize]
            } else {
                0.0
            };

            let error = (curr_sample - self.last_sample) * mid_sample;

            self.mu += self.gain_mu * error as f64;
            self.omega = (self.omega + self.gain_omega * error as f64)
                .clamp(self.sps - OMEGA_LIMIT, self.sps + OMEGA_LIMIT);

            bits.push(if curr_sample > 0.0 { 1 } else { 0 });

            i += self.omega as i64;
            self.mu -= self.omega as i64 as f64;
            if self.mu < 0.0 {
                self.mu += self.omega;
                i -= 1;
            }

            self.last_sample = curr_sample;
        }

        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A synthetic NRZ bitstream at a known samples-per-symbol, oversampled
    /// with a simple rectangular pulse shape, should round-trip through the
    /// loop with the same bit values (allowing the loop a short settling
    /// prefix before it tracks).
    #[test]
    fn recovers_known_bit_pattern_from_rectangular_pulses() {
        let sps = 8.0;
        let tx_bits = [1u8, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1];
        let mut samples = Vec::new();
        for &b in &tx_bits {
            let level = if b == 1 { 1.0 } else { -1.0 };
            for _ in 0..sps as usize {
                samples.push(level);
            }
        }

        let mut recovery = GardnerClockRecovery::new(sps, 0.01);
        let bits = recovery.process(&samples);

        // Skip the loop's settling prefix; the remaining bits should match
        // the transmitted pattern exactly once locked.
        assert!(bits.len() >= tx_bits.len() - 2);
        let tail_len = tx_bits.len() - 4;
        assert_eq!(&bits[bits.len() - tail_len..], &tx_bits[tx_bits.len() - tail_len..]);
    }

    #[test]
    fn omega_stays_within_configured_deviation() {
        let sps = 4.0;
        let samples: Vec<f32> = (0..400)
            .map(|i| if (i / 4) % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let mut recovery = GardnerClockRecovery::new(sps, 0.05);
        recovery.process(&samples);
        assert!((recovery.omega - sps).abs() <= OMEGA_LIMIT + 1e-9);
    }

    #[test]
    fn empty_input_yields_no_bits() {
        let mut recovery = GardnerClockRecovery::new(4.0, 0.01);
        assert!(recovery.process(&[]).is_empty());
    }
}
