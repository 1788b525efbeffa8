use crate::arm_driver::{DriverError, MotionDriver, MoveCommand, Result};
use crate::gripper_driver::GripperDriver;
use crate::pose::RobotPose;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

/// Everything sent to the rig, in send order across both channels
#[derive(Debug, Clone, PartialEq)]
pub enum RigEvent {
    Move(MoveCommand),
    Gripper(u8),
}

/// A recorded event and when it was sent
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub at: Instant,
    pub event: RigEvent,
}

#[derive(Debug, Default)]
struct Events {
    entries: VecDeque<TimedEvent>,
    /// oldest entries are dropped beyond this
    capacity: Option<usize>,
}

/// Shared, ordered record of the commands both recording drivers received
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Events>>,
}

impl EventLog {
    pub fn new() -> EventLog {
        EventLog::default()
    }

    /// Keeps only the latest `capacity` events, for long dry runs
    pub fn bounded(capacity: usize) -> EventLog {
        EventLog {
            events: Arc::new(Mutex::new(Events {
                entries: VecDeque::with_capacity(capacity),
                capacity: Some(capacity),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Events> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: RigEvent) {
        let mut events = self.lock();
        if let Some(capacity) = events.capacity {
            if capacity == 0 {
                return;
            }
            while events.entries.len() >= capacity {
                events.entries.pop_front();
            }
        }
        events.entries.push_back(TimedEvent {
            at: Instant::now(),
            event,
        });
    }

    pub fn timed_events(&self) -> Vec<TimedEvent> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<RigEvent> {
        self.lock()
            .entries
            .iter()
            .map(|entry| entry.event.clone())
            .collect()
    }

    pub fn moves(&self) -> Vec<MoveCommand> {
        self.lock()
            .entries
            .iter()
            .filter_map(|entry| match entry.event {
                RigEvent::Move(command) => Some(command),
                RigEvent::Gripper(_) => None,
            })
            .collect()
    }

    pub fn gripper_positions(&self) -> Vec<u8> {
        self.lock()
            .entries
            .iter()
            .filter_map(|entry| match entry.event {
                RigEvent::Gripper(position) => Some(position),
                RigEvent::Move(_) => None,
            })
            .collect()
    }

    /// Last commanded pose, which is where the arm ends up once settled
    pub fn last_pose(&self) -> Option<RobotPose> {
        self.moves().last().map(|command| command.pose)
    }

    pub fn last_gripper_position(&self) -> Option<u8> {
        self.gripper_positions().last().copied()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum FailureMode {
    Never,
    /// every send from this index on fails
    From(usize),
    /// only the send at this index fails
    At(usize),
}

/// Motion driver that logs instead of moving anything
pub struct RecordingMotionDriver {
    log: EventLog,
    failure: FailureMode,
    attempts: usize,
}

impl RecordingMotionDriver {
    pub fn new(log: EventLog) -> Box<Self> {
        Self::with_failure(log, FailureMode::Never)
    }

    /// Accepts `count` moves, then fails every send like a dropped socket
    pub fn failing_after(log: EventLog, count: usize) -> Box<Self> {
        Self::with_failure(log, FailureMode::From(count))
    }

    /// Fails only the send at `index`, counting from zero
    pub fn failing_once_at(log: EventLog, index: usize) -> Box<Self> {
        Self::with_failure(log, FailureMode::At(index))
    }

    fn with_failure(log: EventLog, failure: FailureMode) -> Box<Self> {
        Box::new(RecordingMotionDriver {
            log,
            failure,
            attempts: 0,
        })
    }

    fn should_fail(&self) -> bool {
        match self.failure {
            FailureMode::Never => false,
            FailureMode::From(index) => self.attempts >= index,
            FailureMode::At(index) => self.attempts == index,
        }
    }
}

#[async_trait]
impl MotionDriver for RecordingMotionDriver {
    async fn send_move(&mut self, command: &MoveCommand) -> Result<()> {
        let fail = self.should_fail();
        self.attempts += 1;
        if fail {
            return Err(DriverError::IoError(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "recording motion driver configured to fail",
            )));
        }
        tracing::info!(command = %command, "Recorded move");
        self.log.push(RigEvent::Move(*command));
        Ok(())
    }
}

pub struct RecordingGripperDriver {
    log: EventLog,
}

impl RecordingGripperDriver {
    pub fn new(log: EventLog) -> Box<Self> {
        Box::new(RecordingGripperDriver { log })
    }
}

#[async_trait]
impl GripperDriver for RecordingGripperDriver {
    async fn set_position(&mut self, position: u8) -> Result<()> {
        tracing::info!(position, "Recorded gripper position");
        self.log.push(RigEvent::Gripper(position));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm_driver::MoveKind;
    use crate::rig_config::MoveSpeed;

    fn command() -> MoveCommand {
        MoveCommand::new(
            MoveKind::Linear,
            RobotPose::default(),
            MoveSpeed::new(0.5, 0.5),
        )
    }

    #[tokio::test]
    async fn both_drivers_share_one_ordered_log() {
        let log = EventLog::new();
        let mut motion = RecordingMotionDriver::new(log.clone());
        let mut gripper = RecordingGripperDriver::new(log.clone());
        gripper.set_position(0).await.unwrap();
        motion.send_move(&command()).await.unwrap();
        gripper.set_position(100).await.unwrap();
        assert_eq!(
            log.events(),
            vec![
                RigEvent::Gripper(0),
                RigEvent::Move(command()),
                RigEvent::Gripper(100)
            ]
        );
        assert_eq!(log.last_gripper_position(), Some(100));
        assert_eq!(log.last_pose(), Some(RobotPose::default()));
    }

    #[tokio::test]
    async fn failing_driver_stops_recording() {
        let log = EventLog::new();
        let mut motion = RecordingMotionDriver::failing_after(log.clone(), 1);
        motion.send_move(&command()).await.unwrap();
        assert!(motion.send_move(&command()).await.is_err());
        assert!(motion.send_move(&command()).await.is_err());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn single_failure_recovers() {
        let log = EventLog::new();
        let mut motion = RecordingMotionDriver::failing_once_at(log.clone(), 0);
        assert!(motion.send_move(&command()).await.is_err());
        motion.send_move(&command()).await.unwrap();
        assert_eq!(log.moves(), vec![command()]);
    }

    #[tokio::test]
    async fn bounded_log_keeps_latest_events() {
        let log = EventLog::bounded(2);
        let mut gripper = RecordingGripperDriver::new(log.clone());
        for position in [0, 100, 255] {
            gripper.set_position(position).await.unwrap();
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.gripper_positions(), vec![100, 255]);
    }

    #[tokio::test(start_paused = true)]
    async fn events_carry_send_time() {
        let log = EventLog::new();
        let mut gripper = RecordingGripperDriver::new(log.clone());
        let start = Instant::now();
        gripper.set_position(0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        gripper.set_position(255).await.unwrap();
        let timed = log.timed_events();
        assert_eq!(timed[0].at, start);
        assert!(timed[1].at - timed[0].at >= std::time::Duration::from_millis(1500));
    }
}
