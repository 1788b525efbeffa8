use crate::arm_driver::{DriverError, MotionDriver};
use crate::gripper_driver::GripperDriver;
use crate::pose::RobotPose;
use crate::rig_config::{
    GripperConfig, MotionParameters, PlacementConfig, RigConfig, SettleTimings,
};
use nalgebra as na;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("transport failed mid maneuver, arm pose unknown until homed")]
    Transport(#[from] DriverError),
}

type Result<T> = std::result::Result<T, SequencerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Homing,
    Picking,
    Placing,
}

/// Orders motion and gripper commands for home, pick and place.
///
/// Neither channel reports completion so every command is followed by a
/// fixed settle delay. A failed send aborts the maneuver where it stands,
/// there is no rollback.
pub struct MotionSequencer {
    motion: Box<dyn MotionDriver>,
    gripper: Box<dyn GripperDriver>,
    home_pose: RobotPose,
    drop_pose: RobotPose,
    motion_parameters: MotionParameters,
    timings: SettleTimings,
    gripper_config: GripperConfig,
    placement: PlacementConfig,
    cycle_counter: u8,
    state: SequencerState,
    needs_homing: bool,
}

impl MotionSequencer {
    pub fn new(
        motion: Box<dyn MotionDriver>,
        gripper: Box<dyn GripperDriver>,
        config: &RigConfig,
    ) -> MotionSequencer {
        MotionSequencer {
            motion,
            gripper,
            home_pose: config.home_pose(),
            drop_pose: config.drop_pose(),
            motion_parameters: config.motion.clone(),
            timings: config.timings.clone(),
            gripper_config: config.gripper.clone(),
            placement: config.placement.clone(),
            cycle_counter: 0,
            state: SequencerState::Idle,
            needs_homing: false,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn cycle_counter(&self) -> u8 {
        self.cycle_counter
    }

    /// True after a transport failure left the arm somewhere unknown
    pub fn needs_homing(&self) -> bool {
        self.needs_homing
    }

    pub fn drop_pose(&self) -> RobotPose {
        self.drop_pose
    }

    /// Lateral offset the next place will use
    pub fn placement_offset(&self) -> f64 {
        if self.cycle_counter % 2 == 1 {
            self.placement.odd_offset
        } else {
            self.placement.even_offset
        }
    }

    /// Moves home and cycles the gripper closed and open again.
    ///
    /// Safe to call at any point, this is also the only way to clear
    /// `needs_homing`.
    pub async fn go_home(&mut self) -> Result<()> {
        self.enter(SequencerState::Homing);
        tracing::info!("Going home");
        let result = self.home_sequence().await;
        self.check_transport(result)?;
        self.needs_homing = false;
        self.enter(SequencerState::Idle);
        Ok(())
    }

    /// Grasps an object lying below `target`.
    ///
    /// `target` is expected at capture height, approach and grasp heights are
    /// taken below it.
    pub async fn pick(&mut self, target: &RobotPose) -> Result<()> {
        self.enter(SequencerState::Picking);
        tracing::info!(
            x = target.position.x,
            y = target.position.y,
            z = target.position.z,
            "Picking"
        );
        let result = self.pick_sequence(target).await;
        self.check_transport(result)
    }

    /// Releases the held object next to `drop`, shifted by the rotating offset
    pub async fn place(&mut self, drop: &RobotPose) -> Result<()> {
        self.enter(SequencerState::Placing);
        let offset = self.placement_offset();
        tracing::info!(
            counter = self.cycle_counter,
            offset,
            x = drop.position.x,
            y = drop.position.y,
            z = drop.position.z,
            "Placing"
        );
        let result = self.place_sequence(drop, offset).await;
        self.check_transport(result)?;
        self.cycle_counter += 1;
        if self.cycle_counter >= self.placement.cycle_length {
            self.cycle_counter = 0;
        }
        Ok(())
    }

    /// Full cycle: pick at `target`, place at the configured drop pose, home
    pub async fn pick_and_place(&mut self, target: &RobotPose) -> Result<()> {
        self.pick(target).await?;
        let drop = self.drop_pose;
        self.place(&drop).await?;
        self.go_home().await
    }

    fn enter(&mut self, state: SequencerState) {
        tracing::debug!(from = ?self.state, to = ?state, "Sequencer state");
        self.state = state;
    }

    /// A failed send leaves the arm part way through a maneuver
    fn check_transport(&mut self, result: std::result::Result<(), DriverError>) -> Result<()> {
        if let Err(error) = result {
            tracing::error!(
                %error,
                state = ?self.state,
                "Maneuver aborted, send home before continuing"
            );
            self.needs_homing = true;
            return Err(error.into());
        }
        Ok(())
    }

    async fn home_sequence(&mut self) -> std::result::Result<(), DriverError> {
        let speed = self.motion_parameters.home;
        let home = self.home_pose;
        self.motion.move_joint(&home, speed).await?;
        settle(self.timings.home_move).await;
        self.gripper.set_position(self.gripper_config.closed).await?;
        settle(self.timings.home_gripper_close).await;
        self.gripper.set_position(self.gripper_config.open).await?;
        settle(self.timings.home_gripper_open).await;
        Ok(())
    }

    async fn pick_sequence(
        &mut self,
        target: &RobotPose,
    ) -> std::result::Result<(), DriverError> {
        let parameters = &self.motion_parameters;
        let approach = target.with_z(target.position.z - parameters.pick_approach_depth);
        let grasp = target.with_z(target.position.z - parameters.pick_grasp_depth);
        let (approach_speed, descend_speed, retract_speed) = (
            parameters.pick_approach,
            parameters.pick_descend,
            parameters.pick_retract,
        );

        settle(self.timings.pick_start).await;
        self.gripper.set_position(self.gripper_config.open).await?;
        settle(self.timings.pick_gripper_open).await;
        self.motion.move_linear(&approach, approach_speed).await?;
        settle(self.timings.pick_approach).await;
        self.motion.move_linear(&grasp, descend_speed).await?;
        settle(self.timings.pick_descend).await;
        self.gripper.set_position(self.gripper_config.grip).await?;
        settle(self.timings.pick_grip).await;
        self.motion.move_linear(&approach, retract_speed).await?;
        settle(self.timings.pick_retract).await;
        Ok(())
    }

    async fn place_sequence(
        &mut self,
        drop: &RobotPose,
        offset: f64,
    ) -> std::result::Result<(), DriverError> {
        let parameters = &self.motion_parameters;
        let release = drop.translated(na::Vector3::new(offset, 0.0, 0.0));
        let above = release.translated(na::Vector3::new(0.0, 0.0, parameters.place_clearance));
        let (approach_speed, descend_speed, retract_speed) = (
            parameters.place_approach,
            parameters.place_descend,
            parameters.place_retract,
        );

        self.motion.move_joint(&above, approach_speed).await?;
        settle(self.timings.place_approach).await;
        self.motion.move_linear(&release, descend_speed).await?;
        settle(self.timings.place_descend).await;
        self.gripper.set_position(self.gripper_config.open).await?;
        settle(self.timings.place_release).await;
        self.motion.move_linear(&above, retract_speed).await?;
        settle(self.timings.place_retract).await;
        Ok(())
    }
}

async fn settle(duration: Duration) {
    sleep(duration).await;
}
