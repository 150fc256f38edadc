/// Example client that keeps a connection to a chat-style server and greets it every few seconds.
///
/// Run with `cargo run --example client --features json,logging -- ws://localhost:9000`.
use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use securews::{CloseNotification, ConnectionObserver, Options, WebSocketConnection};
use serde::Serialize;
use tokio::time::interval;

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "Type")]
    kind: &'a str,
    #[serde(rename = "Message")]
    message: &'a str,
}

struct Logger;

impl ConnectionObserver for Logger {
    fn on_open(&self) {
        log::info!("Connected");
    }

    fn on_close(&self, code: CloseNotification, reason: &str) {
        log::info!("Closed ({code}): {reason}");
    }

    fn on_text_message(&self, payload: String) {
        log::info!("Text: {payload}");
    }

    fn on_binary_message(&self, payload: Bytes) {
        log::info!("Binary: {} bytes", payload.len());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Debug)?;

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9000".to_string());

    let connection = WebSocketConnection::new();
    let options = Options::default()
        .with_socket_receive_timeout(1_000)
        .with_max_missed_receive_timeouts(30)
        .with_reconnect_interval(5_000);
    connection
        .connect(url.parse()?, Arc::new(Logger), options)
        .await?;

    let mut ival = interval(Duration::from_secs(3));
    loop {
        tokio::select! {
            _ = ival.tick() => {
                let greeting = Envelope { kind: "standard", message: "hello" };
                if let Err(err) = connection.send_json(&greeting) {
                    log::debug!("Not sent: {err}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    connection.disconnect();
    // leave time for the close handshake
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}
