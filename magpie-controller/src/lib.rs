//! Colour sorting pick and place for a UR arm with a socket driven gripper.
//!
//! A frame goes through the [`detector`], the chosen centroid through the
//! [`coordinate_mapper`] and the resulting pose is handed to the
//! [`motion_sequencer`] by the [`command_dispatcher`].

pub mod arm_driver;
pub mod command_dispatcher;
pub mod coordinate_mapper;
pub mod detector;
pub mod gripper_driver;
pub mod motion_sequencer;
pub mod pose;
pub mod recording_driver;
pub mod rig_config;
