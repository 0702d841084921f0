//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries presence protocol messages as WebSocket text
//! frames. `ws://` and `wss://` URLs are both accepted; the community URL given
//! on the command line is handed to [`WebSocketTransport::connect_with_timeout`]
//! as-is.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::error::ProbeError;
use crate::transport::Transport;

/// The underlying WebSocket stream, see [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a `tokio-tungstenite` WebSocket stream.
///
/// Only text frames are surfaced; pings are answered by tungstenite and
/// binary frames are skipped. [`recv`](Transport::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open the link to a community URL.
    ///
    /// # Errors
    ///
    /// [`ProbeError::Io`] for a malformed URL or a failed handshake. I/O
    /// failures keep their [`ErrorKind`](std::io::ErrorKind); anything else
    /// becomes [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, ProbeError> {
        tracing::debug!(%url, "opening presence link");
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(handshake_error)?;
        tracing::info!(%url, "presence link up");
        Ok(Self::from_stream(stream))
    }

    /// Wrap a stream that was connected elsewhere (custom TLS, proxies).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect), giving up after `limit`.
    ///
    /// # Errors
    ///
    /// [`ProbeError::Timeout`] once `limit` elapses, otherwise whatever
    /// [`connect`](Self::connect) reports.
    pub async fn connect_with_timeout(
        url: &str,
        limit: std::time::Duration,
    ) -> Result<Self, ProbeError> {
        match tokio::time::timeout(limit, Self::connect(url)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

fn handshake_error(e: WsError) -> ProbeError {
    let kind = if let WsError::Io(io) = &e {
        io.kind()
    } else {
        std::io::ErrorKind::Other
    };
    ProbeError::Io(std::io::Error::new(kind, e))
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ProbeError> {
        if self.closed {
            return Err(ProbeError::TransportClosed);
        }
        let frame = Message::Text(message.into());
        if let Err(e) = self.stream.send(frame).await {
            return Err(ProbeError::TransportSend(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ProbeError>> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(close)) => {
                    tracing::debug!(?close, "presence service closed the link");
                    return None;
                }
                Ok(Message::Binary(payload)) => {
                    tracing::warn!(bytes = payload.len(), "ignoring binary frame");
                }
                // Control frames; tungstenite answers pings itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(ProbeError::TransportReceive(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.stream
            .close(None)
            .await
            .map_err(|e| ProbeError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on an ephemeral port and hand it to
    /// `handler`. Returns the URL to connect to.
    async fn start_mock_service<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // TEST-NET-1 is never routable.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProbeError::Timeout));
    }

    #[tokio::test]
    async fn recv_yields_text_and_skips_binary() {
        let url = start_mock_service(|mut ws| async move {
            ws.send(Message::Binary(vec![0x01, 0x02].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"Pong"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":"Pong"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn whisper_reaches_the_service() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = start_mock_service(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"type":"Chat","data":{"text":"hi"}}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            seen_rx.await.unwrap(),
            r#"{"type":"Chat","data":{"text":"hi"}}"#
        );
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_service(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Closing twice is harmless.
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, ProbeError::TransportClosed));
    }
}
