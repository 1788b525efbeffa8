use crate::pose::RobotPose;
use crate::rig_config::MoveSpeed;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed when talking to arm")]
    IoError(#[from] std::io::Error),
    #[error("gripper answered {0:?} instead of ack")]
    UnexpectedAck(String),
    #[error("connection closed by remote")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// movej, interpolated in joint space
    Joint,
    /// movel, straight line of the tool point
    Linear,
}

impl MoveKind {
    fn script_function(self) -> &'static str {
        match self {
            MoveKind::Joint => "movej",
            MoveKind::Linear => "movel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    pub kind: MoveKind,
    pub pose: RobotPose,
    pub speed: MoveSpeed,
}

impl MoveCommand {
    pub fn new(kind: MoveKind, pose: RobotPose, speed: MoveSpeed) -> MoveCommand {
        MoveCommand { kind, pose, speed }
    }
}

impl fmt::Display for MoveCommand {
    /// Single URScript statement without the trailing newline
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, a={:.2}, v={:.2})",
            self.kind.script_function(),
            self.pose,
            self.speed.acceleration,
            self.speed.velocity
        )
    }
}

/// Fire and forget motion channel.
///
/// Nothing is read back, a successful send says nothing about the arm
/// having reached the pose.
#[async_trait]
pub trait MotionDriver: Send + Sync {
    async fn send_move(&mut self, command: &MoveCommand) -> Result<()>;

    async fn move_joint(&mut self, pose: &RobotPose, speed: MoveSpeed) -> Result<()> {
        self.send_move(&MoveCommand::new(MoveKind::Joint, *pose, speed))
            .await
    }

    async fn move_linear(&mut self, pose: &RobotPose, speed: MoveSpeed) -> Result<()> {
        self.send_move(&MoveCommand::new(MoveKind::Linear, *pose, speed))
            .await
    }
}

/// Streams URScript lines to the controller's secondary interface
pub struct TcpMotionDriver {
    stream: TcpStream,
}

impl TcpMotionDriver {
    pub async fn connect(host: &str, port: u16) -> Result<Box<Self>> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        tracing::info!(host, port, "Connected to motion channel");
        Ok(Box::new(TcpMotionDriver { stream }))
    }
}

#[async_trait]
impl MotionDriver for TcpMotionDriver {
    async fn send_move(&mut self, command: &MoveCommand) -> Result<()> {
        let line = format!("{}\n", command);
        tracing::debug!(command = %command, "Sending move");
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
