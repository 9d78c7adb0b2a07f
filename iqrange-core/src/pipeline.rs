//! The pipeline task: owns `SampleSource`, `JammerSynth` and the mixing and
//! quantization stage, paces itself to the file's declared sample rate, and
//! broadcasts each mixed chunk through the dongle-emulation server.
//!
//! This is the single task the concurrency model designates as owner of
//! playback and jammer synthesis (§5): it is the sole reader of the shared
//! jammer/tuning state the control plane writes, and the sole writer of the
//! [`PlaybackState`] the control plane reads back for status snapshots.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::PipelineConfig;
use crate::control_plane::PlaybackState;
use crate::dongle_server::{quantize_chunk, DongleServer, SharedState};
use crate::errors::SourceError;
use crate::jammer::JammerSynth;
use crate::logging::PipelineLogger;
use crate::mixer;
use crate::sample_source::{PipelineCommand, SampleSource};

/// Owns the real-time playback loop. Constructed once per running instance
/// and driven to completion by [`Pipeline::run`], which never returns under
/// normal operation.
pub struct Pipeline {
    source: SampleSource,
    jammer: JammerSynth,
    config: PipelineConfig,
    state: Arc<SharedState>,
    dongle: Arc<DongleServer>,
    playback: Arc<parking_lot::Mutex<PlaybackState>>,
    logger: Arc<PipelineLogger>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        state: Arc<SharedState>,
        dongle: Arc<DongleServer>,
        playback: Arc<parking_lot::Mutex<PlaybackState>>,
        logger: Arc<PipelineLogger>,
    ) -> Result<Self, SourceError> {
        let source = SampleSource::load(&config.iq_file_path)?;
        *playback.lock() = PlaybackState {
            running: true,
            paused: false,
            file: config.iq_file_path.display().to_string(),
        };
        Ok(Self {
            source,
            jammer: JammerSynth::new(0),
            config,
            state,
            dongle,
            playback,
            logger,
        })
    }

    fn apply_command(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::Play => {
                self.source.play();
                self.logger.info("SOURCE", "playback resumed");
            }
            PipelineCommand::Pause => {
                self.source.pause();
                self.logger.info("SOURCE", "playback paused");
            }
            PipelineCommand::Stop => {
                self.source.stop();
                self.logger.info("SOURCE", "playback stopped");
            }
            PipelineCommand::Switch(path) => match self.source.switch(&path) {
                Ok(()) => {
                    self.jammer.reset_phase();
                    self.logger
                        .info("SOURCE", format!("switched source to {}", path.display()));
                }
                Err(err) => self
                    .logger
                    .warn("SOURCE", format!("failed to switch source to {}: {err}", path.display())),
            },
        }
        self.sync_playback_status();
    }

    fn sync_playback_status(&self) {
        *self.playback.lock() = PlaybackState {
            running: true,
            paused: !self.source.is_playing(),
            file: self.source.path().display().to_string(),
        };
    }

    /// Drive the pipeline forever: drain pending commands, read one chunk,
    /// synthesize and mix the jammer, quantize, and broadcast, then sleep
    /// for the pacing interval. A stop command is applied at the top of the
    /// next iteration, so any chunk already read is always flushed first.
    pub async fn run(mut self, mut commands: mpsc::Receiver<PipelineCommand>) {
        loop {
            while let Ok(command) = commands.try_recv() {
                self.apply_command(command);
            }

            let tuning = self.state.tuning_snapshot();
            let jammer_config = self.state.jammer_snapshot();

            match self.source.chunk(self.config.chunk_size) {
                Some(clean) => {
                    let jamming = self.jammer.chunk(clean.len(), &jammer_config, &tuning);
                    let mixed = mixer::mix(&clean, &jamming);
                    self.dongle.broadcast(quantize_chunk(&mixed));
                }
                None => {
                    // Paused or stopped: nothing to broadcast this tick.
                }
            }

            tokio::time::sleep(self.config.chunk_pacing()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JammerConfig, TuningState};
    use std::io::Write;

    fn write_iq_file(samples: &[(f32, f32)]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("iqrange-pipeline-test-{}-{}.iq", std::process::id(), samples.len()));
        let mut file = std::fs::File::create(&path).unwrap();
        for (i, q) in samples {
            file.write_all(&i.to_le_bytes()).unwrap();
            file.write_all(&q.to_le_bytes()).unwrap();
        }
        path
    }

    fn test_config(path: std::path::PathBuf, chunk_size: usize) -> PipelineConfig {
        PipelineConfig {
            iq_file_path: path,
            chunk_size,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn new_loads_source_and_publishes_initial_playback_status() {
        let path = write_iq_file(&[(0.1, 0.2), (0.3, 0.4)]);
        let state = SharedState::new(TuningState::default(), JammerConfig::default());
        let dongle = DongleServer::new(1, 29, state.clone(), Arc::new(PipelineLogger::default()));
        let playback = Arc::new(parking_lot::Mutex::new(PlaybackState::default()));

        let pipeline = Pipeline::new(
            test_config(path.clone(), 1),
            state,
            dongle,
            playback.clone(),
            Arc::new(PipelineLogger::default()),
        )
        .unwrap();

        assert!(!playback.lock().paused);
        assert_eq!(playback.lock().file, path.display().to_string());
        drop(pipeline);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn apply_command_pause_updates_playback_status() {
        let path = write_iq_file(&[(0.0, 0.0)]);
        let state = SharedState::new(TuningState::default(), JammerConfig::default());
        let dongle = DongleServer::new(1, 29, state.clone(), Arc::new(PipelineLogger::default()));
        let playback = Arc::new(parking_lot::Mutex::new(PlaybackState::default()));

        let mut pipeline = Pipeline::new(
            test_config(path.clone(), 1),
            state,
            dongle,
            playback.clone(),
            Arc::new(PipelineLogger::default()),
        )
        .unwrap();

        pipeline.apply_command(PipelineCommand::Pause);
        assert!(playback.lock().paused);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_fails_construction() {
        let state = SharedState::new(TuningState::default(), JammerConfig::default());
        let dongle = DongleServer::new(1, 29, state.clone(), Arc::new(PipelineLogger::default()));
        let playback = Arc::new(parking_lot::Mutex::new(PlaybackState::default()));

        let result = Pipeline::new(
            test_config(std::path::PathBuf::from("/nonexistent/file.iq"), 1024),
            state,
            dongle,
            playback,
            Arc::new(PipelineLogger::default()),
        );
        assert!(result.is_err());
    }
}
