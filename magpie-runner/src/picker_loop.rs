use crate::camera::FrameSource;
use crate::command_source::{CommandSource, Heard};
use magpie_controller::command_dispatcher::{Command, CommandDispatcher, DispatchOutcome};
use magpie_controller::detector::{self, ColorDetector, Detection};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// pause before retrying after a failed acquisition
    pub acquisition_retry: Duration,
    pub command_timeout: Duration,
    /// where to write the annotated frame every cycle
    pub annotated_output: Option<PathBuf>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        LoopOptions {
            acquisition_retry: Duration::from_secs(1),
            command_timeout: Duration::from_secs(10),
            annotated_output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// nothing usable this cycle, try again
    Skipped,
    Acted(DispatchOutcome),
    Stop,
}

/// Acquire, detect, listen, act. One cycle at a time, a maneuver always
/// completes before the next frame is taken.
pub struct PickerLoop {
    camera: Box<dyn FrameSource>,
    detector: ColorDetector,
    commands: Box<dyn CommandSource>,
    dispatcher: CommandDispatcher,
    options: LoopOptions,
}

impl PickerLoop {
    pub fn new(
        camera: Box<dyn FrameSource>,
        detector: ColorDetector,
        commands: Box<dyn CommandSource>,
        dispatcher: CommandDispatcher,
        options: LoopOptions,
    ) -> Self {
        PickerLoop {
            camera,
            detector,
            commands,
            dispatcher,
            options,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub async fn run(&mut self) {
        while self.run_cycle().await != CycleOutcome::Stop {}
        tracing::info!("Bye");
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let detection = match self.acquire().await {
            Some(detection) => detection,
            None => {
                sleep(self.options.acquisition_retry).await;
                return CycleOutcome::Skipped;
            }
        };

        let word = match self.commands.listen(self.options.command_timeout).await {
            Heard::Word(word) => word,
            Heard::Nothing => return CycleOutcome::Skipped,
            Heard::Closed => {
                tracing::info!("Command source closed");
                return CycleOutcome::Stop;
            }
        };
        let command = match Command::parse(&word, &self.detector.labels()) {
            Ok(command) => command,
            Err(error) => {
                tracing::warn!(%error, "Ignoring command");
                return CycleOutcome::Skipped;
            }
        };

        if matches!(command, Command::Color(_)) && self.dispatcher.sequencer().needs_homing() {
            tracing::warn!("Arm pose unknown after a failed maneuver, send home first");
            return CycleOutcome::Skipped;
        }

        match self.dispatcher.dispatch(&command, &detection).await {
            Ok(DispatchOutcome::Terminate) => CycleOutcome::Stop,
            Ok(outcome) => {
                tracing::info!(?outcome, "Command handled");
                CycleOutcome::Acted(outcome)
            }
            Err(error) => {
                tracing::error!(%error, ?command, "Maneuver failed");
                CycleOutcome::Skipped
            }
        }
    }

    async fn acquire(&mut self) -> Option<Detection> {
        let frame = match self.camera.fetch().await {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "No image");
                return None;
            }
        };
        let detection = match self.detector.detect(&frame) {
            Ok(detection) => detection,
            Err(error) => {
                tracing::warn!(%error, "Detection skipped");
                return None;
            }
        };
        for label in detection.labels() {
            tracing::debug!(color = label, centroids = ?detection.centroids(label), "Detected");
        }
        if let Some(path) = &self.options.annotated_output {
            if let Err(error) = detector::annotate(&frame, &detection).save(path) {
                tracing::warn!(%error, path = %path.display(), "Failed to write annotated frame");
            }
        }
        Some(detection)
    }
}
