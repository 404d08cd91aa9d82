//! Line-delimited JSON bridge between TCP clients and the in-process bus.
//!
//! Each line is one [`GatewayFrame`]. Clients send `subscribe` and `publish`
//! frames; the gateway answers with `subscribed`, `published` or `error` and
//! streams matching bus traffic back as `message` frames.

use crate::bus::{BusMessage, InMemoryBus, Subscription, Transport, MAX_MESSAGE_SIZE};
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const MAX_FRAME_SIZE: usize = 8192;

const_assert!(MAX_FRAME_SIZE > MAX_MESSAGE_SIZE);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayFrame {
    Subscribe { pattern: String },
    Publish { topic: String, payload: String },
    Subscribed { pattern: String },
    Published { topic: String, receivers: usize },
    Message { topic: String, payload: String },
    Error { message: String },
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

enum InboundLine {
    Frame(Vec<u8>),
    Oversized,
    Closed,
}

/// Reads one newline-terminated line, buffering at most `MAX_FRAME_SIZE`
/// bytes. A final line without a newline is still returned.
async fn read_line_bounded<R>(reader: &mut R) -> Result<InboundLine, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let limit = (MAX_FRAME_SIZE + 1) as u64;
    let read = reader.take(limit).read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Ok(InboundLine::Closed);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    } else if line.len() > MAX_FRAME_SIZE {
        return Ok(InboundLine::Oversized);
    }
    Ok(InboundLine::Frame(line))
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &GatewayFrame) -> Result<(), TransportError> {
    let line = serde_json::to_string(frame).map_err(|e| TransportError::Frame(e.to_string()))?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn send_shared(writer: &SharedWriter, frame: &GatewayFrame) -> Result<(), TransportError> {
    let mut guard = writer.lock().await;
    write_frame(&mut guard, frame).await
}

/// Accepts gateway clients until the listener fails.
pub async fn serve(listener: TcpListener, bus: Arc<InMemoryBus>) -> Result<(), TransportError> {
    info!(address = %listener.local_addr()?, "Gateway listening");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "Gateway client connected");
                let client_bus = Arc::clone(&bus);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_bus).await {
                        warn!(%addr, error = %e, "Gateway client error");
                    }
                    info!(%addr, "Gateway client disconnected");
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept gateway connection");
            }
        }
    }
}

fn spawn_forwarder(mut subscription: Subscription, writer: SharedWriter) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            let frame = GatewayFrame::Message {
                topic: message.topic.clone(),
                payload: message.payload_str(),
            };
            if let Err(e) = send_shared(&writer, &frame).await {
                debug!(error = %e, "Stopping forwarder");
                break;
            }
        }
    })
}

fn reply_for(bus: &InMemoryBus, frame: GatewayFrame, forward: &mut Vec<Subscription>) -> GatewayFrame {
    match frame {
        GatewayFrame::Subscribe { pattern } => match bus.subscribe(&pattern) {
            Ok(subscription) => {
                forward.push(subscription);
                GatewayFrame::Subscribed { pattern }
            }
            Err(e) => GatewayFrame::Error { message: e.to_string() },
        },
        GatewayFrame::Publish { topic, payload } => match bus.publish(&topic, payload.as_bytes()) {
            Ok(receivers) => GatewayFrame::Published { topic, receivers },
            Err(e) => GatewayFrame::Error { message: e.to_string() },
        },
        other => GatewayFrame::Error {
            message: format!("unexpected frame from client: {:?}", other),
        },
    }
}

async fn handle_client(stream: TcpStream, bus: Arc<InMemoryBus>) -> Result<(), TransportError> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

    let result = async {
        loop {
            let line = match read_line_bounded(&mut reader).await? {
                InboundLine::Frame(line) => line,
                InboundLine::Closed => break,
                // The rest of the line is never read, so the client is dropped
                InboundLine::Oversized => {
                    let message = format!("frame exceeds {} bytes", MAX_FRAME_SIZE);
                    send_shared(&writer, &GatewayFrame::Error { message: message.clone() }).await?;
                    return Err(TransportError::Frame(message));
                }
            };

            let reply = match std::str::from_utf8(&line).map(str::trim) {
                Ok("") => continue,
                Ok(text) => match serde_json::from_str::<GatewayFrame>(text) {
                    Ok(frame) => {
                        let mut new_subscriptions = Vec::new();
                        let reply = reply_for(&bus, frame, &mut new_subscriptions);
                        // Acknowledge before the forwarder can interleave messages
                        send_shared(&writer, &reply).await?;
                        for subscription in new_subscriptions {
                            forwarders.push(spawn_forwarder(subscription, Arc::clone(&writer)));
                        }
                        continue;
                    }
                    Err(e) => GatewayFrame::Error {
                        message: format!("invalid frame: {}", e),
                    },
                },
                Err(_) => GatewayFrame::Error {
                    message: TransportError::NonUtf8Payload.to_string(),
                },
            };
            send_shared(&writer, &reply).await?;
        }
        Ok::<(), TransportError>(())
    }
    .await;

    for forwarder in forwarders {
        forwarder.abort();
    }
    result
}

/// Async client for the gateway protocol.
pub struct GatewayClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pending: VecDeque<BusMessage>,
}

impl GatewayClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            pending: VecDeque::new(),
        })
    }

    pub async fn subscribe(&mut self, pattern: &str) -> Result<(), TransportError> {
        write_frame(
            &mut self.writer,
            &GatewayFrame::Subscribe {
                pattern: pattern.to_string(),
            },
        )
        .await?;

        match self.next_reply().await? {
            GatewayFrame::Subscribed { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Returns how many bus subscribers received the message.
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<usize, TransportError> {
        let payload = std::str::from_utf8(payload).map_err(|_| TransportError::NonUtf8Payload)?;
        write_frame(
            &mut self.writer,
            &GatewayFrame::Publish {
                topic: topic.to_string(),
                payload: payload.to_string(),
            },
        )
        .await?;

        match self.next_reply().await? {
            GatewayFrame::Published { receivers, .. } => Ok(receivers),
            other => Err(unexpected(other)),
        }
    }

    pub async fn next_message(&mut self) -> Result<BusMessage, TransportError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        match self.read_frame().await? {
            GatewayFrame::Message { topic, payload } => Ok(BusMessage::new(&topic, payload.as_bytes())),
            other => Err(unexpected(other)),
        }
    }

    async fn read_frame(&mut self) -> Result<GatewayFrame, TransportError> {
        match read_line_bounded(&mut self.reader).await? {
            InboundLine::Frame(line) => {
                serde_json::from_slice(&line).map_err(|e| TransportError::Frame(e.to_string()))
            }
            InboundLine::Oversized => Err(TransportError::Frame(format!(
                "frame exceeds {} bytes",
                MAX_FRAME_SIZE
            ))),
            InboundLine::Closed => Err(TransportError::Closed),
        }
    }

    /// Next non-message frame; messages that arrive first are queued.
    async fn next_reply(&mut self) -> Result<GatewayFrame, TransportError> {
        loop {
            match self.read_frame().await? {
                GatewayFrame::Message { topic, payload } => {
                    self.pending.push_back(BusMessage::new(&topic, payload.as_bytes()));
                }
                reply => return Ok(reply),
            }
        }
    }
}

fn unexpected(frame: GatewayFrame) -> TransportError {
    match frame {
        GatewayFrame::Error { message } => TransportError::Remote(message),
        other => TransportError::Frame(format!("unexpected frame: {:?}", other)),
    }
}
