use crate::coordinate_mapper::CoordinateMapper;
use crate::detector::{Centroid, Detection};
use crate::motion_sequencer::{MotionSequencer, SequencerError};
use crate::pose::RobotPose;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized command {0:?}")]
pub struct CommandUnrecognized(pub String);

/// Resolved operator word
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Color(String),
    Home,
    Stop,
}

impl Command {
    /// Maps a recognized word onto a command.
    ///
    /// Colour labels are only accepted if the detector knows them.
    pub fn parse(word: &str, known_labels: &[&str]) -> Result<Command, CommandUnrecognized> {
        let word = word.trim().to_lowercase();
        match word.as_str() {
            "home" | "go home" => Ok(Command::Home),
            "stop" | "bye" => Ok(Command::Stop),
            label if known_labels.contains(&label) => Ok(Command::Color(word.clone())),
            _ => Err(CommandUnrecognized(word)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// caller should end the loop
    Terminate,
    Homed,
    PickedAndPlaced {
        label: String,
        pixel: Centroid,
        target: RobotPose,
    },
    /// colour was asked for but not seen in the last detection
    NothingDetected(String),
}

/// Turns commands into maneuvers using the latest detection
pub struct CommandDispatcher {
    mapper: CoordinateMapper,
    sequencer: MotionSequencer,
}

impl CommandDispatcher {
    pub fn new(mapper: CoordinateMapper, sequencer: MotionSequencer) -> CommandDispatcher {
        CommandDispatcher { mapper, sequencer }
    }

    pub fn sequencer(&self) -> &MotionSequencer {
        &self.sequencer
    }

    pub async fn dispatch(
        &mut self,
        command: &Command,
        detection: &Detection,
    ) -> Result<DispatchOutcome, SequencerError> {
        match command {
            Command::Stop => {
                tracing::info!("Stop requested");
                Ok(DispatchOutcome::Terminate)
            }
            Command::Home => {
                self.sequencer.go_home().await?;
                Ok(DispatchOutcome::Homed)
            }
            Command::Color(label) => {
                let pixel = match detection.first(label) {
                    Some(pixel) => pixel,
                    None => {
                        tracing::warn!(color = %label, "Nothing detected for command");
                        return Ok(DispatchOutcome::NothingDetected(label.clone()));
                    }
                };
                tracing::info!(
                    color = %label,
                    x = pixel.x,
                    y = pixel.y,
                    candidates = detection.blobs(label).len(),
                    "Target selected"
                );
                let target = self.mapper.centroid_to_robot(pixel);
                self.sequencer.pick_and_place(&target).await?;
                Ok(DispatchOutcome::PickedAndPlaced {
                    label: label.clone(),
                    pixel,
                    target,
                })
            }
        }
    }
}
