//! AIS (Automatic Identification System) ship-report decoding.
//!
//! Pipeline, following the decode service's `ais_decoder.py` /
//! `clock_recovery.py`: FM-discriminate baseband IQ to a real-valued signal,
//! recover bits with Gardner timing recovery, NRZI-decode, remove HDLC bit
//! stuffing, hunt for the alternating preamble, try candidate payload
//! lengths against a CRC-16-CCITT check, and extract message type + MMSI
//! from any frame that passes.

use std::collections::HashMap;
use std::time::Instant;

use num_complex::Complex32;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::clock_recovery::GardnerClockRecovery;

pub const AIS_BAUD_RATE: f64 = 9600.0;
const MIN_PACKET_BITS: usize = 256;
const PREAMBLE_LEN: usize = 24;
const CANDIDATE_LENGTHS: [usize; 3] = [168, 256, 424];
const CRC_POLY: u16 = 0x1021;
const CRC_INIT: u16 = 0xFFFF;

/// FM/phase discriminator: instantaneous frequency from consecutive samples,
/// via the conjugate-delay-multiply form (numerically equivalent to
/// differencing unwrapped phase, without the unwrap discontinuities).
/// Matches `AudioDemodulator.fm_demod`'s role of turning baseband IQ into a
/// real-valued signal before bit-level processing.
pub fn fm_discriminator(samples: &[Complex32]) -> Vec<f32> {
    if samples.len() < 2 {
        return Vec::new();
    }
    samples
        .windows(2)
        .map(|pair| {
            let product = pair[1] * pair[0].conj();
            product.im.atan2(product.re) / std::f32::consts::PI
        })
        .collect()
}

/// NRZI decode: no transition between consecutive bits yields `1`, a
/// transition yields `0`. `seed` is the assumed line state immediately
/// before the first input bit.
pub fn nrzi_decode(bits: &[u8], seed: u8) -> Vec<u8> {
    let mut last = seed;
    bits.iter()
        .map(|&bit| {
            let decoded = if bit == last { 1 } else { 0 };
            last = bit;
            decoded
        })
        .collect()
}

/// Inverse of [`nrzi_decode`]: re-encode a decoded bit sequence back to line
/// bits, given the same seed line state.
pub fn nrzi_encode(bits: &[u8], seed: u8) -> Vec<u8> {
    let mut last = seed;
    bits.iter()
        .map(|&bit| {
            let line_bit = if bit == 1 { last } else { 1 - last };
            last = line_bit;
            line_bit
        })
        .collect()
}

/// Remove HDLC bit stuffing: drop any `0` immediately following five
/// consecutive `1`s.
pub fn destuff(bits: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.len());
    let mut ones_run = 0u32;
    let mut i = 0;
    while i < bits.len() {
        let bit = bits[i];
        if ones_run == 5 && bit == 0 {
            ones_run = 0;
            i += 1;
            continue;
        }
        out.push(bit);
        ones_run = if bit == 1 { ones_run + 1 } else { 0 };
        i += 1;
    }
    out
}

/// Inverse of [`destuff`]: insert a stuffed `0` after every run of five
/// consecutive `1`s.
pub fn stuff(bits: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bits.len() + bits.len() / 5);
    let mut ones_run = 0u32;
    for &bit in bits {
        out.push(bit);
        if bit == 1 {
            ones_run += 1;
            if ones_run == 5 {
                out.push(0);
                ones_run = 0;
            }
        } else {
            ones_run = 0;
        }
    }
    out
}

/// CRC-16-CCITT, polynomial `0x1021`, initial value `0xFFFF`, MSB-first,
/// matching `calculate_crc` in the decode service.
pub fn crc16_ccitt(bits: &[u8]) -> u16 {
    let mut crc = CRC_INIT;
    for &bit in bits {
        crc ^= (bit as u16) << 15;
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ CRC_POLY
        } else {
            crc << 1
        };
    }
    crc
}

/// Verify a frame whose last 16 bits are the CRC of everything before them.
pub fn verify_crc(bits: &[u8]) -> bool {
    if bits.len() < 16 {
        return false;
    }
    let (data, crc_bits) = bits.split_at(bits.len() - 16);
    let received = crc_bits
        .iter()
        .fold(0u16, |acc, &b| (acc << 1) | b as u16);
    received == crc16_ccitt(data)
}

/// Search for the 24-bit alternating preamble `0101…`, returning the index
/// of its first bit.
pub fn find_preamble(bits: &[u8]) -> Option<usize> {
    if bits.len() < PREAMBLE_LEN {
        return None;
    }
    (0..=bits.len() - PREAMBLE_LEN).find(|&start| {
        (0..PREAMBLE_LEN).all(|j| bits[start + j] == (j % 2) as u8)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VesselType {
    Cargo,
    Tanker,
    Passenger,
}

impl VesselType {
    fn for_mmsi(mmsi: u32) -> Self {
        match mmsi % 3 {
            0 => VesselType::Cargo,
            1 => VesselType::Tanker,
            _ => VesselType::Passenger,
        }
    }
}

/// Persistent per-MMSI ship state, dead-reckoned between sightings.
#[derive(Debug, Clone)]
pub struct ShipRecord {
    pub mmsi: u32,
    pub name: String,
    pub vessel_type: VesselType,
    pub lat: f64,
    pub lon: f64,
    pub speed_knots: f64,
    pub heading_deg: f64,
    last_seen: Instant,
}

impl ShipRecord {
    fn new(mmsi: u32, rng: &mut ChaCha8Rng) -> Self {
        Self {
            mmsi,
            name: format!("VESSEL-{}", mmsi % 10_000),
            vessel_type: VesselType::for_mmsi(mmsi),
            lat: -33.8688 + rng.gen_range(-0.1..0.1),
            lon: 151.2093 + rng.gen_range(-0.1..0.1),
            speed_knots: 10.0,
            heading_deg: rng.gen_range(0.0..360.0),
            last_seen: Instant::now(),
        }
    }

    /// Advance position by dead reckoning using the elapsed wall-clock time
    /// since the last sighting, then apply a small heading/position drift to
    /// emulate sensor noise (as the original decode service does).
    fn dead_reckon(&mut self, rng: &mut ChaCha8Rng) {
        let now = Instant::now();
        let dt_seconds = now.duration_since(self.last_seen).as_secs_f64().max(0.0);
        self.last_seen = now;

        let heading_rad = self.heading_deg.to_radians();
        let distance_nm = self.speed_knots * dt_seconds / 3600.0;
        let distance_deg_lat = distance_nm / 60.0;
        let distance_deg_lon = distance_nm / (60.0 * self.lat.to_radians().cos());

        self.lat += distance_deg_lat * heading_rad.cos();
        self.lon += distance_deg_lon * heading_rad.sin();
        self.lat += rng.gen_range(-0.0001..0.0001);
        self.lon += rng.gen_range(-0.0001..0.0001);
        self.heading_deg = (self.heading_deg + rng.gen_range(-2.0..2.0)).rem_euclid(360.0);
    }
}

/// A decoded and CRC-verified AIS position report, ready to hand to an
/// observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisReport {
    pub message_id: u64,
    pub mmsi: u32,
    pub message_type: u8,
    pub ship_name: String,
    pub vessel_type: VesselType,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_knots: f64,
    pub heading_degrees: u16,
}

/// Streaming AIS decoder: owns the Gardner loop, the NRZI line state, the
/// destuffed bit accumulator, and the per-MMSI ship table. Consumes
/// successive IQ chunks from a [`crate::stream_client::StreamClient`].
pub struct AisDecoder {
    clock_recovery: GardnerClockRecovery,
    nrzi_state: u8,
    bit_buffer: Vec<u8>,
    ships: HashMap<u32, ShipRecord>,
    message_count: u64,
    rng: ChaCha8Rng,
}

impl AisDecoder {
    /// `audio_rate_hz` is the rate of the FM-discriminated signal fed to the
    /// Gardner loop (the decode service uses 12 kHz for a 9600-baud AIS
    /// channel, i.e. 1.25 samples/bit).
    pub fn new(audio_rate_hz: f64) -> Self {
        let samples_per_bit = audio_rate_hz / AIS_BAUD_RATE;
        Self {
            clock_recovery: GardnerClockRecovery::new(samples_per_bit, 0.01),
            nrzi_state: 0,
            bit_buffer: Vec::new(),
            ships: HashMap::new(),
            message_count: 0,
            rng: ChaCha8Rng::seed_from_u64(0xA15),
        }
    }

    /// Feed one chunk of already-discriminated, real-valued audio samples
    /// (see [`fm_discriminator`]) and return any AIS reports decoded from it.
    pub fn process_audio(&mut self, audio: &[f32]) -> Vec<AisReport> {
        let raw_bits = self.clock_recovery.process(audio);
        let decoded = nrzi_decode(&raw_bits, self.nrzi_state);
        if let Some(&last) = raw_bits.last() {
            self.nrzi_state = last;
        }
        let unstuffed = destuff(&decoded);
        self.bit_buffer.extend(unstuffed);

        let mut reports = Vec::new();
        while self.bit_buffer.len() >= MIN_PACKET_BITS {
            let Some(preamble_pos) = find_preamble(&self.bit_buffer) else {
                let keep_from = self.bit_buffer.len().saturating_sub(MIN_PACKET_BITS);
                self.bit_buffer.drain(..keep_from);
                break;
            };

            let packet_start = preamble_pos + PREAMBLE_LEN;
            let mut decoded_one = false;
            for &len in &CANDIDATE_LENGTHS {
                if self.bit_buffer.len() < packet_start + len {
                    continue;
                }
                let frame = &self.bit_buffer[packet_start..packet_start + len];
                if verify_crc(frame) {
                    if let Some(report) = self.accept_frame(frame) {
                        reports.push(report);
                    }
                    self.bit_buffer.drain(..packet_start + len);
                    decoded_one = true;
                    break;
                }
            }
            if !decoded_one {
                if self.bit_buffer.len() < packet_start + MIN_PACKET_BITS {
                    break; // not enough bits yet to try any candidate length
                }
                self.bit_buffer.drain(..preamble_pos + 1);
            }
        }

        reports
    }

    fn accept_frame(&mut self, frame: &[u8]) -> Option<AisReport> {
        if frame.len() < 38 {
            return None;
        }
        let message_type = bits_to_u32(&frame[0..6]) as u8;
        let mmsi = bits_to_u32(&frame[8..38]);

        if !(1..=3).contains(&message_type) {
            return None;
        }

        self.message_count += 1;
        let rng = &mut self.rng;
        let ship = self
            .ships
            .entry(mmsi)
            .or_insert_with(|| ShipRecord::new(mmsi, rng));
        ship.dead_reckon(&mut self.rng);
        let ship = &self.ships[&mmsi];

        Some(AisReport {
            message_id: self.message_count,
            mmsi,
            message_type,
            ship_name: ship.name.clone(),
            vessel_type: ship.vessel_type,
            latitude: ship.lat,
            longitude: ship.lon,
            speed_knots: ship.speed_knots,
            heading_degrees: (ship.heading_deg as u16) % 360,
        })
    }
}

fn bits_to_u32(bits: &[u8]) -> u32 {
    bits.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nrzi_is_an_involution_for_any_seed() {
        let bits = [1u8, 1, 0, 0, 1, 0, 1, 1, 1, 0, 0, 0, 1];
        for seed in [0u8, 1] {
            let encoded = nrzi_encode(&bits, seed);
            let decoded = nrzi_decode(&encoded, seed);
            assert_eq!(decoded, bits);
        }
    }

    #[test]
    fn destuff_inverts_stuff() {
        let bits = [1u8, 1, 1, 1, 1, 1, 0, 1, 1, 1, 1, 1, 1, 0, 0, 1];
        let stuffed = stuff(&bits);
        assert_eq!(destuff(&stuffed), bits);
    }

    #[test]
    fn crc_detects_single_bit_flips() {
        let data = [1u8, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 1, 0, 1];
        let crc = crc16_ccitt(&data);
        let mut frame: Vec<u8> = data.to_vec();
        for shift in (0..16).rev() {
            frame.push(((crc >> shift) & 1) as u8);
        }
        assert!(verify_crc(&frame));

        for i in 0..frame.len() {
            let mut flipped = frame.clone();
            flipped[i] ^= 1;
            assert!(!verify_crc(&flipped), "flip at bit {i} should break CRC");
        }
    }

    #[test]
    fn finds_preamble_at_correct_offset() {
        let mut bits = vec![1, 1, 1, 0, 0];
        let preamble: Vec<u8> = (0..24).map(|j| (j % 2) as u8).collect();
        bits.extend(&preamble);
        bits.extend([0, 1, 1, 0]);
        assert_eq!(find_preamble(&bits), Some(5));
    }

    #[test]
    fn no_preamble_returns_none() {
        let bits = vec![1u8; 30];
        assert_eq!(find_preamble(&bits), None);
    }

    #[test]
    fn fm_discriminator_is_silent_for_constant_phase() {
        let samples = vec![Complex32::new(1.0, 0.0); 10];
        let discriminated = fm_discriminator(&samples);
        assert!(discriminated.iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn position_reports_only_for_message_types_one_to_three() {
        let mut decoder = AisDecoder::new(12_000.0);
        let mut frame = vec![0u8; 38];
        // message type = 5 (not a position report): type bits 0..6 = 000101
        frame[3] = 1;
        frame[5] = 1;
        frame.resize(168, 0);
        // Not CRC-valid, so accept_frame would never be called in practice;
        // exercise the gate directly.
        assert!(decoder.accept_frame(&frame).is_none());
    }
}
