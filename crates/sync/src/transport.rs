// SPDX-License-Identifier: MIT
// Copyright (c) 2026 PulseLink Health

//! Transport abstraction for the realtime channel.
//!
//! Provides a trait-based transport layer that enables:
//! - Real WebSocket connections for production
//! - Mock transports for unit testing
//!
//! Authentication happens once per connection: the bearer credential is
//! presented during the WebSocket handshake.

use std::future::Future;
use std::pin::Pin;

use pulselink_core::EventEnvelope;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The handshake was rejected because the credential is invalid or
    /// expired. Distinct from [`ConnectionFailed`](Self::ConnectionFailed):
    /// retrying with the same token cannot succeed.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport trait for the persistent bidirectional connection.
///
/// This trait abstracts over the actual transport mechanism, allowing for
/// easy testing with mock implementations. The channel driver owns the
/// transport exclusively; callers never touch it directly.
pub trait Transport: Send + 'static {
    /// Connects to the server, presenting the bearer credential during the
    /// handshake.
    fn connect(
        &mut self,
        url: &str,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Closes the connection and clears the handle.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Sends one event to the server.
    fn send(
        &mut self,
        envelope: EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Receives the next event from the server.
    ///
    /// Returns `None` when the server closed the connection. Must be
    /// cancel-safe: the channel driver polls it inside a `select!`.
    fn recv(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<EventEnvelope>>> + Send + '_>>;

    /// Whether a connection handle is currently held.
    fn is_connected(&self) -> bool;
}

/// WebSocket transport implementation using tokio-tungstenite.
pub struct WebSocketTransport {
    /// The WebSocket connection, if connected.
    ws: Option<WebSocketConnection>,
}

/// Internal WebSocket connection wrapper.
struct WebSocketConnection {
    sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        tokio_tungstenite::tungstenite::Message,
    >,
    stream: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl WebSocketTransport {
    /// Creates a new, disconnected WebSocket transport.
    pub fn new() -> Self {
        WebSocketTransport { ws: None }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn connect(
        &mut self,
        url: &str,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        let url = url.to_string();
        let bearer = format!("Bearer {}", token);
        Box::pin(async move {
            use futures_util::StreamExt;
            use tokio_tungstenite::tungstenite::client::IntoClientRequest;
            use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
            use tokio_tungstenite::tungstenite::http::HeaderValue;

            let mut request = url
                .into_client_request()
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            let header = HeaderValue::from_str(&bearer)
                .map_err(|_| TransportError::ConnectionFailed("malformed auth token".to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, header);

            match tokio_tungstenite::connect_async(request).await {
                Ok((ws_stream, _response)) => {
                    let (sink, stream) = ws_stream.split();
                    self.ws = Some(WebSocketConnection { sink, stream });
                    Ok(())
                }
                Err(tokio_tungstenite::tungstenite::Error::Http(response))
                    if matches!(response.status().as_u16(), 401 | 403) =>
                {
                    Err(TransportError::AuthRejected(format!(
                        "handshake rejected with status {}",
                        response.status()
                    )))
                }
                Err(e) => Err(TransportError::ConnectionFailed(e.to_string())),
            }
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(mut ws) = self.ws.take() {
                use futures_util::SinkExt;
                let _ = ws.sink.close().await;
            }
            Ok(())
        })
    }

    fn send(
        &mut self,
        envelope: EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            use futures_util::SinkExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

            let json = envelope
                .to_json()
                .map_err(|e| TransportError::Serialization(e.to_string()))?;

            if let Err(e) = ws.sink.send(Message::Text(json.into())).await {
                // Connection is broken, clear it
                self.ws = None;
                return Err(TransportError::SendFailed(e.to_string()));
            }

            // Flush so the frame actually leaves and send failures surface here
            if let Err(e) = ws.sink.flush().await {
                self.ws = None;
                return Err(TransportError::SendFailed(e.to_string()));
            }

            Ok(())
        })
    }

    fn recv(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<EventEnvelope>>> + Send + '_>> {
        Box::pin(async move {
            use futures_util::StreamExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

            loop {
                match ws.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let envelope = EventEnvelope::from_json(&text)
                            .map_err(|e| TransportError::Serialization(e.to_string()))?;
                        return Ok(Some(envelope));
                    }
                    Some(Ok(Message::Close(_))) => {
                        self.ws = None;
                        return Ok(None);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Keepalive traffic, not events
                        continue;
                    }
                    Some(Ok(_)) => {
                        // Ignore other frame types
                        continue;
                    }
                    Some(Err(e)) => {
                        self.ws = None;
                        return Err(TransportError::ReceiveFailed(e.to_string()));
                    }
                    None => {
                        self.ws = None;
                        return Ok(None);
                    }
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.ws.is_some()
    }
}
