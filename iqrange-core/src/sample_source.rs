//! Memory-mapped complex-baseband IQ file source.
//!
//! Owned exclusively by the pipeline task: playback control (`play`,
//! `pause`, `stop`, `switch`) is driven by [`PipelineCommand`] values sent
//! over a channel rather than by cross-task field mutation, so this type
//! never needs to be `Sync`.

use std::path::{Path, PathBuf};

use memmap2::Mmap;
use num_complex::Complex32;

use crate::errors::SourceError;

const BYTES_PER_SAMPLE: usize = 8; // two little-endian f32s: I, Q

/// A loaded IQ file, memory-mapped for cheap chunked reads.
pub struct SampleSource {
    path: PathBuf,
    mmap: Mmap,
    total_samples: usize,
    position: usize,
    playing: bool,
}

impl SampleSource {
    /// Load (memory-map) an IQ file. The file must contain complex64 samples
    /// as interleaved little-endian `f32` pairs, i.e. a byte length that is a
    /// multiple of 8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path).map_err(|_| SourceError::NotFound {
            path: path.display().to_string(),
        })?;
        let len = file
            .metadata()
            .map_err(|_| SourceError::NotFound {
                path: path.display().to_string(),
            })?
            .len() as usize;
        if len == 0 {
            return Err(SourceError::Empty {
                path: path.display().to_string(),
            });
        }
        if len % BYTES_PER_SAMPLE != 0 {
            return Err(SourceError::InvalidFormat { len });
        }
        // Safety: the mapping is read-only for the lifetime of this struct;
        // external truncation of the backing file is the only unsoundness
        // risk, which the dongle server's operating model does not exercise.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|_| SourceError::InvalidFormat { len })?;

        Ok(Self {
            total_samples: len / BYTES_PER_SAMPLE,
            path,
            mmap,
            position: 0,
            playing: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.position = 0;
    }

    /// Replace the loaded file, resetting playback position. Leaves playback
    /// stopped regardless of the previous state: the caller must re-issue
    /// `play()`.
    pub fn switch(&mut self, path: impl AsRef<Path>) -> Result<(), SourceError> {
        let mut replacement = Self::load(path)?;
        replacement.playing = false;
        *self = replacement;
        Ok(())
    }

    /// Read the next `n` samples, looping back to the start of the file when
    /// the end is reached (matching the original IQ file reader's
    /// wrap-around behaviour). Returns `None` only when paused/stopped.
    pub fn chunk(&mut self, n: usize) -> Option<Vec<Complex32>> {
        if !self.playing {
            return None;
        }

        let mut out = Vec::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let available = self.total_samples - self.position;
            let take = remaining.min(available);
            let start = self.position * BYTES_PER_SAMPLE;
            let bytes = &self.mmap[start..start + take * BYTES_PER_SAMPLE];
            out.extend(bytes.chunks_exact(BYTES_PER_SAMPLE).map(|sample| {
                let re = f32::from_le_bytes(sample[0..4].try_into().unwrap());
                let im = f32::from_le_bytes(sample[4..8].try_into().unwrap());
                Complex32::new(re, im)
            }));

            self.position += take;
            remaining -= take;
            if self.position >= self.total_samples {
                self.position = 0;
            }
        }
        Some(out)
    }
}

/// Commands the control plane relays to the pipeline task for it to apply to
/// its locally-owned [`SampleSource`].
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    Play,
    Pause,
    Stop,
    Switch(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_iq_file(samples: &[(f32, f32)]) -> tempfile_path::TempIqFile {
        tempfile_path::TempIqFile::new(samples)
    }

    // Minimal temp-file helper kept local to this test module; the crate has
    // no dev-dependency on `tempfile`, and one file's worth of bytes does not
    // warrant adding one.
    mod tempfile_path {
        use std::io::Write;
        use std::path::PathBuf;

        pub struct TempIqFile {
            pub path: PathBuf,
        }

        impl TempIqFile {
            pub fn new(samples: &[(f32, f32)]) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!(
                    "iqrange-test-{}-{}.iq",
                    std::process::id(),
                    samples.len()
                ));
                let mut file = std::fs::File::create(&path).unwrap();
                for (i, q) in samples {
                    file.write_all(&i.to_le_bytes()).unwrap();
                    file.write_all(&q.to_le_bytes()).unwrap();
                }
                Self { path }
            }
        }

        impl Drop for TempIqFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn loads_and_reads_samples_in_order() {
        let tmp = write_iq_file(&[(0.1, 0.2), (0.3, 0.4), (0.5, 0.6)]);
        let mut source = SampleSource::load(&tmp.path).unwrap();
        assert_eq!(source.total_samples(), 3);
        let chunk = source.chunk(2).unwrap();
        assert_eq!(chunk.len(), 2);
        assert!((chunk[0].re - 0.1).abs() < 1e-6);
        assert!((chunk[1].im - 0.4).abs() < 1e-6);
    }

    #[test]
    fn wraps_around_at_end_of_file() {
        let tmp = write_iq_file(&[(1.0, 0.0), (2.0, 0.0)]);
        let mut source = SampleSource::load(&tmp.path).unwrap();
        let chunk = source.chunk(3).unwrap();
        assert_eq!(chunk.len(), 3);
        assert!((chunk[2].re - 1.0).abs() < 1e-6);
    }

    #[test]
    fn paused_source_returns_none() {
        let tmp = write_iq_file(&[(1.0, 0.0)]);
        let mut source = SampleSource::load(&tmp.path).unwrap();
        source.pause();
        assert!(source.chunk(1).is_none());
    }

    #[test]
    fn stop_resets_position_to_start() {
        let tmp = write_iq_file(&[(1.0, 0.0), (2.0, 0.0)]);
        let mut source = SampleSource::load(&tmp.path).unwrap();
        source.chunk(1).unwrap();
        source.stop();
        source.play();
        let chunk = source.chunk(1).unwrap();
        assert!((chunk[0].re - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_missing_file() {
        assert!(matches!(
            SampleSource::load("/nonexistent/path.iq"),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn rejects_misaligned_length() {
        let mut path = std::env::temp_dir();
        path.push(format!("iqrange-test-bad-{}.iq", std::process::id()));
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0u8; 5])
            .unwrap();
        let result = SampleSource::load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(SourceError::InvalidFormat { .. })));
    }
}
