//! Framed RPC connection to one service endpoint.
//!
//! Every call writes one request frame and reads exactly one response frame
//! carrying the same request id. The whole exchange runs under a single
//! per-call timeout. Any connectivity failure drops the underlying stream, so
//! a connection is never reused after it may have been left mid-frame.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use gpr_network::{
    Command, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_FRAME_SIZE, ErrorPayload, Frame, WireMessage,
    encode_frame, parse_frame,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};

/// Transport settings shared by every connection of a run.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
    pub buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(4),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

pub struct RpcConnection {
    addr: String,
    stream: Option<TcpStream>,
    read_buffer: BytesMut,
    next_request_id: u64,
    max_frame_size: usize,
}

impl RpcConnection {
    /// Connect to `addr` (`host:port`), failing after `connect_timeout`.
    pub async fn connect(addr: &str, config: &TransportConfig) -> Result<Self> {
        debug!(target: "gpr::rpc", addr, "Connecting");

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(ClientError::ConnectionFailed)?;

        stream.set_nodelay(true)?;

        debug!(target: "gpr::rpc", addr, "Connected");

        Ok(Self {
            addr: addr.to_string(),
            stream: Some(stream),
            read_buffer: BytesMut::with_capacity(config.buffer_size),
            next_request_id: 1,
            max_frame_size: config.max_frame_size,
        })
    }

    #[inline]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Issue one request and return the response payload.
    ///
    /// An `ErrorResponse` frame becomes [`ClientError::Application`].
    pub async fn call(
        &mut self,
        command: Command,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Bytes> {
        let result = match tokio::time::timeout(timeout, self.exchange(command, payload)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };

        if let Err(e) = &result {
            if e.is_retryable() {
                warn!(
                    target: "gpr::rpc",
                    addr = %self.addr,
                    command = ?command,
                    error = %e,
                    "Dropping connection after transport failure"
                );
                self.stream = None;
                self.read_buffer.clear();
            }
        }

        result
    }

    /// Encode `request`, call, and decode the typed response.
    pub async fn request<Req, Resp>(
        &mut self,
        command: Command,
        request: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: WireMessage,
        Resp: WireMessage,
    {
        let payload = self.call(command, request.to_bytes(), timeout).await?;
        Resp::from_bytes(&payload).map_err(|e| {
            // a payload that does not decode leaves the channel in an unknown state
            self.stream = None;
            self.read_buffer.clear();
            ClientError::from(e)
        })
    }

    async fn exchange(&mut self, command: Command, payload: Bytes) -> Result<Bytes> {
        let expected = command.response().ok_or_else(|| {
            ClientError::Protocol(format!("{:?} is not a request command", command))
        })?;

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let frame = Frame::new(command, request_id, payload);
        let stream = self.stream.as_mut().ok_or(ClientError::ConnectionClosed)?;
        stream.write_all(&encode_frame(&frame)).await?;

        trace!(
            target: "gpr::rpc",
            addr = %self.addr,
            request_id,
            command = ?command,
            "Request sent"
        );

        let response = self.recv_frame().await?;
        if response.request_id() != request_id {
            return Err(ClientError::OutOfSequence {
                expected: request_id,
                actual: response.request_id(),
            });
        }

        match response.command() {
            cmd if cmd == expected => Ok(response.payload),
            Command::ErrorResponse => {
                let error = ErrorPayload::from_bytes(&response.payload)?;
                Err(ClientError::Application {
                    code: error.code,
                    message: error.message,
                })
            },
            other => Err(ClientError::Protocol(format!(
                "Expected {:?}, got {:?}",
                expected, other
            ))),
        }
    }

    async fn recv_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some((frame, consumed)) = parse_frame(&self.read_buffer, self.max_frame_size)? {
                self.read_buffer.advance(consumed);
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(ClientError::ConnectionClosed)?;
            let n = stream.read_buf(&mut self.read_buffer).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
    }

    /// Shut the stream down. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(target: "gpr::rpc", addr = %self.addr, error = %e, "Shutdown failed");
            }
            debug!(target: "gpr::rpc", addr = %self.addr, "Connection closed");
        }
        self.read_buffer.clear();
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("addr", &self.addr)
            .field("open", &self.is_open())
            .field("next_request_id", &self.next_request_id)
            .finish()
    }
}
