use anyhow::Result;
use clap::Parser;
use magpie_controller::{
    arm_driver::{MotionDriver, TcpMotionDriver},
    command_dispatcher::CommandDispatcher,
    coordinate_mapper::CoordinateMapper,
    detector::ColorDetector,
    gripper_driver::{GripperDriver, TcpGripperDriver},
    motion_sequencer::MotionSequencer,
    recording_driver::{EventLog, RecordingGripperDriver, RecordingMotionDriver},
    rig_config::RigConfig,
};
use magpie_runner::{
    camera::HttpCamera,
    command_source::StdinCommandSource,
    logging,
    picker_loop::{LoopOptions, PickerLoop},
};
use std::{path::PathBuf, time::Duration};

/// recorded commands kept during a dry run, every one is also logged
const DRY_RUN_LOG_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// Rig config, json or yaml. Uses the included config if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Robot address, overrides the config
    #[arg(long)]
    host: Option<String>,

    /// Camera still image url, overrides the config
    #[arg(long)]
    camera_url: Option<String>,

    /// Log commands instead of talking to the robot
    #[arg(long)]
    dry_run: bool,

    /// Write the annotated frame here every cycle
    #[arg(long)]
    annotated: Option<PathBuf>,

    /// Seconds to wait for a command each cycle
    #[arg(long, default_value_t = 10.0)]
    command_timeout: f64,

    /// Log as json
    #[arg(long)]
    json_logs: bool,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbose, args.json_logs);

    let mut config = match &args.config {
        Some(path) => RigConfig::load(path)?,
        None => RigConfig::included(),
    };
    if let Some(host) = args.host {
        config.robot_host = host;
    }
    if let Some(camera_url) = args.camera_url {
        config.camera_url = camera_url;
    }
    tracing::info!(
        host = %config.robot_host,
        camera = %config.camera_url,
        dry_run = args.dry_run,
        "Starting magpie"
    );

    let motion: Box<dyn MotionDriver>;
    let gripper: Box<dyn GripperDriver>;
    if args.dry_run {
        let log = EventLog::bounded(DRY_RUN_LOG_CAPACITY);
        motion = RecordingMotionDriver::new(log.clone());
        gripper = RecordingGripperDriver::new(log);
    } else {
        motion = TcpMotionDriver::connect(&config.robot_host, config.motion_port).await?;
        gripper = TcpGripperDriver::new(
            &config.robot_host,
            config.gripper_port,
            config.gripper.speed,
        );
    }

    let mut sequencer = MotionSequencer::new(motion, gripper, &config);
    sequencer.go_home().await?;

    let dispatcher = CommandDispatcher::new(
        CoordinateMapper::new(config.calibration.clone()),
        sequencer,
    );
    let camera = HttpCamera::new(&config.camera_url, config.camera_timeout)?;
    let options = LoopOptions {
        command_timeout: Duration::from_secs_f64(args.command_timeout),
        annotated_output: args.annotated,
        ..Default::default()
    };
    let mut picker = PickerLoop::new(
        Box::new(camera),
        ColorDetector::from_config(&config),
        Box::new(StdinCommandSource::new()),
        dispatcher,
        options,
    );

    tokio::select! {
        _ = picker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Detected Ctrl+c");
        }
    }

    Ok(())
}
