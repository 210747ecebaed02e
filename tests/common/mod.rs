//! Shared fixtures for the integration tests

#![allow(dead_code)]

use exchange_net::core::config::{RestExchangeOptions, SocketExchangeOptions};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;
use wiremock::MockServer;

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn endpoint(server: &MockServer, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), path)).expect("mock server uri is a valid url")
}

pub fn rest_options() -> RestExchangeOptions {
    RestExchangeOptions::default().with_request_timeout(Duration::from_secs(5))
}

pub fn socket_options() -> SocketExchangeOptions {
    SocketExchangeOptions::default()
        .with_connect_timeout(Duration::from_secs(5))
        .with_response_timeout(Duration::from_secs(2))
}

/// Frames the scripted socket server received, in order
pub type ReceivedFrames = mpsc::UnboundedReceiver<String>;

/// Start a socket server that accepts one client
///
/// Every text frame is forwarded to the returned receiver and answered with
/// the frames `respond` returns. A `close` text frame makes the server close
/// the connection.
pub async fn spawn_socket_server<F>(respond: F) -> (String, ReceivedFrames)
where
    F: Fn(&str) -> Vec<String> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    let _ = tx.send(text.clone());
                    if text == "close" {
                        let _ = ws.close(None).await;
                        break;
                    }
                    for reply in respond(&text) {
                        if ws.send(Message::Text(reply)).await.is_err() {
                            return;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    (format!("ws://127.0.0.1:{}/ws", port), rx)
}

/// Start a socket server that accepts one client and never sends anything
pub async fn spawn_silent_socket_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        // read without answering so the client sees no data
        while let Some(Ok(_)) = ws.next().await {}
    });

    format!("ws://127.0.0.1:{}/ws", port)
}
