/*!
 * IPC Server for the bluedeck daemon
 * JSON-lines protocol over Unix socket
 */

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use uuid::Uuid;

use crate::device::{Address, Device};
use crate::dispatcher::Action;
use crate::jobs::Job;
use crate::service::BluedeckService;

/// Longest request line accepted, newline included.
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    ListDevices,
    ScanStatus,
    Action { action: Action, mac: String },
    SetVolume {
        mac: String,
        #[serde(default)]
        volume: Value,
    },
    ScanOn,
    JobStatus { id: Uuid },
    Battery { mac: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Devices { devices: Vec<Device> },
    Scanning { scanning: bool },
    Output { output: String },
    Ok { ok: bool },
    Job { job: Job },
    Battery { mac: Address, battery: Option<u8> },
    Error { message: String },
}

pub struct IpcServer {
    listener: UnixListener,
    service: Arc<BluedeckService>,
}

impl IpcServer {
    pub fn new(listener: UnixListener, service: Arc<BluedeckService>) -> Self {
        Self { listener, service }
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("IPC server listening for connections...");

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    tracing::debug!("New client connected");
                    let service = Arc::clone(&self.service);

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, service).await {
                            tracing::error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_client(stream: UnixStream, service: Arc<BluedeckService>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_REQUEST_BYTES)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            break;
        }

        // No newline within the limit: the stream cannot be resynchronised
        if read as u64 == MAX_REQUEST_BYTES && line.last() != Some(&b'\n') {
            tracing::warn!("Dropping client after oversized request");
            let response = Response::Error {
                message: format!("request exceeds {} bytes", MAX_REQUEST_BYTES),
            };
            write_response(&mut writer, &response).await?;
            break;
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        tracing::debug!("Received request: {}", String::from_utf8_lossy(&line).trim());

        let response = match serde_json::from_slice::<Request>(&line) {
            Ok(request) => handle_request(&service, request).await,
            Err(e) => Response::Error {
                message: format!("malformed request: {}", e),
            },
        };
        write_response(&mut writer, &response).await?;
    }

    tracing::debug!("Client disconnected");
    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<()> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    Ok(())
}

pub async fn handle_request(service: &BluedeckService, request: Request) -> Response {
    let result = match request {
        Request::ListDevices => service
            .devices()
            .await
            .map(|devices| Response::Devices { devices }),
        Request::ScanStatus => service
            .scanning()
            .await
            .map(|scanning| Response::Scanning { scanning }),
        Request::Action { action, mac } => service
            .action(action, &mac)
            .await
            .map(|output| Response::Output { output }),
        Request::SetVolume { mac, volume } => service
            .set_volume(&mac, &volume)
            .await
            .map(|ok| Response::Ok { ok }),
        Request::ScanOn => Ok(Response::Job {
            job: service.scan_on().await,
        }),
        Request::JobStatus { id } => service.job(id).await.map(|job| Response::Job { job }),
        Request::Battery { mac } => service
            .battery(&mac)
            .await
            .map(|(mac, battery)| Response::Battery { mac, battery }),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!("Request failed: {}", e);
        Response::Error {
            message: e.to_string(),
        }
    })
}
