//! WebSocket connector backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use wsbus_core::{ClientError, Connector, TransportEvent, TransportHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` / `wss://` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str, protocols: &[String]) -> Result<TransportHandle, ClientError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::TransportOpen(e.to_string()))?;
        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| ClientError::TransportOpen(e.to_string()))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ClientError::TransportOpen(e.to_string()))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws_stream, out_rx, in_tx));
        Ok(TransportHandle::new(out_tx, in_rx))
    }
}

/// Shuttles frames between the socket and the handle's channels until
/// either side goes away.
async fn pump(
    ws_stream: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    let reason = loop {
        tokio::select! {
            frame = out_rx.recv() => {
                match frame {
                    // Handle dropped: the owner closed the connection.
                    None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return;
                    }
                    Some(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                            break e.to_string();
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break "stream ended".to_string(),
                    Some(Err(e)) => break e.to_string(),
                    Some(Ok(WsMessage::Text(text))) => {
                        let _ = in_tx.send(TransportEvent::Frame(text.to_string()));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame
                            .map(|f| format!("closed by peer ({}): {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by peer".to_string());
                    }
                    // Binary frames are not part of the protocol; control
                    // frames are answered by tungstenite.
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    tracing::debug!(reason = %reason, "websocket pump exiting");
    let _ = in_tx.send(TransportEvent::Closed(reason));
}
