//! Combines a clean IQ chunk with a synthesized jamming chunk.

use num_complex::Complex32;

/// Elementwise-sum the clean signal with the jamming signal. A zero-length
/// or all-zero jamming chunk is a cheap passthrough, matching the original
/// mixer's behaviour of returning the clean signal unchanged when jamming
/// produced nothing (disabled, or out of passband).
pub fn mix(clean: &[Complex32], jamming: &[Complex32]) -> Vec<Complex32> {
    debug_assert_eq!(clean.len(), jamming.len());
    clean
        .iter()
        .zip(jamming.iter())
        .map(|(c, j)| c + j)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_with_silence_is_a_passthrough() {
        let clean = vec![Complex32::new(0.1, -0.2), Complex32::new(0.3, 0.4)];
        let silence = vec![Complex32::new(0.0, 0.0); 2];
        let mixed = mix(&clean, &silence);
        assert_eq!(mixed, clean);
    }

    #[test]
    fn mixing_adds_elementwise() {
        let clean = vec![Complex32::new(0.1, 0.1)];
        let jam = vec![Complex32::new(0.5, -0.2)];
        let mixed = mix(&clean, &jam);
        assert!((mixed[0].re - 0.6).abs() < 1e-6);
        assert!((mixed[0].im - -0.1).abs() < 1e-6);
    }
}
