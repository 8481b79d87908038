/*!
 * bluedeck Daemon Client
 * One-shot JSON requests against a running bluedeckd
 */

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::ipc::{Request, Response};

pub struct BluedeckClient {
    socket_path: String,
}

impl BluedeckClient {
    pub fn new(socket_path: String) -> Self {
        Self { socket_path }
    }

    pub async fn send_request(&self, request: Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| anyhow!("cannot reach daemon at {}: {}", self.socket_path, e))?;
        let (reader, mut writer) = stream.into_split();

        let mut request_json = serde_json::to_vec(&request)?;
        request_json.push(b'\n');
        writer.write_all(&request_json).await?;

        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await?;
        if line.is_empty() {
            return Err(anyhow!("daemon closed the connection without replying"));
        }

        Ok(serde_json::from_str(&line)?)
    }
}
