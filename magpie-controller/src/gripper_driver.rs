use crate::arm_driver::{DriverError, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const ACK: &str = "ack";

#[async_trait]
pub trait GripperDriver: Send + Sync {
    /// 0 is fully open
    /// 255 is fully closed
    async fn set_position(&mut self, position: u8) -> Result<()>;
}

/// Gripper controller speaking the `SET SPE` / `SET POS` line protocol.
///
/// The connection is opened on first use and kept for the session. Any
/// failure drops it and the next command reconnects.
pub struct TcpGripperDriver {
    host: String,
    port: u16,
    speed: u8,
    stream: Option<BufReader<TcpStream>>,
}

impl TcpGripperDriver {
    pub fn new(host: &str, port: u16, speed: u8) -> Box<Self> {
        Box::new(TcpGripperDriver {
            host: host.to_owned(),
            port,
            speed,
            stream: None,
        })
    }

    async fn connection(&mut self) -> Result<&mut BufReader<TcpStream>> {
        if self.stream.is_none() {
            let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
            stream.set_nodelay(true)?;
            tracing::info!(host = %self.host, port = self.port, "Connected to gripper");
            self.stream = Some(BufReader::new(stream));
        }
        self.stream.as_mut().ok_or(DriverError::ConnectionClosed)
    }

    async fn send_position(&mut self, position: u8) -> Result<()> {
        let speed = self.speed;
        let stream = self.connection().await?;
        exchange(stream, &format!("SET SPE {}", speed)).await?;
        exchange(stream, &format!("SET POS {}", position)).await?;
        Ok(())
    }
}

/// Sends one command and reads its single line acknowledgement
async fn exchange(stream: &mut BufReader<TcpStream>, command: &str) -> Result<()> {
    stream
        .get_mut()
        .write_all(format!("{}\n", command).as_bytes())
        .await?;
    let mut response = String::new();
    if stream.read_line(&mut response).await? == 0 {
        return Err(DriverError::ConnectionClosed);
    }
    let response = response.trim();
    tracing::debug!(command, response, "Gripper exchange");
    if response != ACK {
        return Err(DriverError::UnexpectedAck(response.to_owned()));
    }
    Ok(())
}

#[async_trait]
impl GripperDriver for TcpGripperDriver {
    async fn set_position(&mut self, position: u8) -> Result<()> {
        let result = self.send_position(position).await;
        if let Err(error) = &result {
            tracing::warn!(%error, position, "Gripper command failed, dropping connection");
            self.stream = None;
        }
        result
    }
}
