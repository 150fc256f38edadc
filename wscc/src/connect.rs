use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use clap::Args;
use rustyline::ExternalPrinter;
use securews::{
    notify::{ChannelSink, Notification, NotificationSink},
    settings::ConnectionSettings,
    CloseNotification, ConnectionObserver, ConnectionState, WebSocketConnection,
};
use tokio::{
    runtime,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::{
    message::{self, Routed},
    settings,
};

/// How long to wait for the server to answer our close frame on exit.
const CLOSE_WAIT: Duration = Duration::from_secs(5);

/// Connect to a server and exchange text messages interactively.
///
/// Host, port and timeout default to the values used last time; the values used are saved
/// for the next run.
#[derive(Args)]
#[command(alias = "c")]
pub struct Cmd {
    /// Server host name or address.
    host: Option<String>,

    /// Server port.
    port: Option<u16>,

    /// Maximum duration to wait when establishing the connection.
    /// Accepts human-readable formats like "5s", "1m", "500ms".
    #[arg(short, long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Delay before reopening a lost connection. "0s" never reconnects.
    #[arg(short, long, value_parser = humantime::parse_duration, default_value = "0s")]
    reconnect: Duration,

    /// Log connection details.
    #[arg(short, long)]
    verbose: bool,
}

enum Output {
    Line(String),
    /// The connection is closed and will not reopen.
    Closed,
}

/// Observer printing server messages and raising notifications.
struct Console {
    output: UnboundedSender<Output>,
    sink: ChannelSink,
    notifications_disabled: bool,
    replace_notifications: bool,
}

impl Console {
    fn print(&self, line: impl Into<String>) {
        let _ = self.output.send(Output::Line(line.into()));
    }
}

impl ConnectionObserver for Console {
    fn on_open(&self) {
        self.print("<Connected>");
    }

    fn on_close(&self, code: CloseNotification, reason: &str) {
        log::info!("connection closed: {code}, {reason}");
        self.print(format!("<{code}: {reason}>"));
        if code != CloseNotification::Reconnect {
            let _ = self.output.send(Output::Closed);
        }
    }

    fn on_text_message(&self, payload: String) {
        match message::route(&payload) {
            Routed::Standard(text) => self.print(format!("[SERVER] {text}")),
            Routed::Notification(text) => {
                if self.notifications_disabled {
                    log::info!("notifications are disabled");
                    return;
                }
                self.sink
                    .notify(Notification::new("wscc", text, self.replace_notifications));
                self.print("[SERVER] Asynchronous Notification");
            }
            Routed::Ignored => log::debug!("message without Type/Message ignored"),
            Routed::Invalid => {
                log::error!("received invalid JSON from server");
                self.print("<Invalid JSON received from server>");
            }
        }
    }

    fn on_raw_text_message(&self, payload: Bytes) {
        log::error!("unexpected raw text message ({} bytes)", payload.len());
    }

    fn on_binary_message(&self, payload: Bytes) {
        log::error!("unexpected binary message ({} bytes)", payload.len());
    }
}

pub fn run(cmd: Cmd) -> anyhow::Result<()> {
    let level = if cmd.verbose {
        log::Level::Debug
    } else {
        log::Level::Warn
    };
    simple_logger::init_with_level(level)?;

    let store = settings::store()?;
    let mut saved = ConnectionSettings::load(&store);
    if let Some(host) = cmd.host {
        saved.hostname = Some(host);
    }
    if let Some(port) = cmd.port {
        saved.port = Some(port);
    }
    if let Some(timeout) = cmd.timeout {
        saved.timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }
    let url = saved.url()?;
    saved.save(&store)?;

    let reconnect = i64::try_from(cmd.reconnect.as_millis()).unwrap_or(i64::MAX);
    let options = saved.options().with_reconnect_interval(reconnect);

    let history_path = home::home_dir()
        .ok_or(anyhow::anyhow!("unable to determine home path"))?
        .join(".wscc_history");

    let mut rl = rustyline::DefaultEditor::with_config(
        rustyline::Config::builder()
            .auto_add_history(true)
            .completion_type(rustyline::CompletionType::List)
            .max_history_size(1000)?
            .build(),
    )?;
    // a missing history file is fine
    let _ = rl.load_history(&history_path);
    let printer = rl.create_external_printer()?;

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;

    let (sink, notifications) = ChannelSink::new();
    let (output_tx, output_rx) = unbounded_channel();
    let console = Arc::new(Console {
        output: output_tx,
        sink,
        notifications_disabled: saved.notifications_disabled,
        replace_notifications: saved.multiple_notifications_disabled,
    });

    println!("> Connecting to {url}");
    let connection = WebSocketConnection::new();
    runtime.block_on(connection.connect(url, console, options))?;

    let (input_tx, input_rx) = unbounded_channel();
    runtime.spawn_blocking(move || loop {
        match rl.readline("> ") {
            Ok(mut line) => {
                // commented line
                if let Some(pos) = line.rfind("//") {
                    let _ = line.split_off(pos);
                }
                let _ = rl.save_history(&history_path);

                if input_tx.send(line).is_err() {
                    break;
                }
            }
            Err(_) => {
                let _ = rl.save_history(&history_path);
                break;
            }
        }
    });

    runtime.block_on(interact(
        connection,
        input_rx,
        output_rx,
        notifications,
        printer,
    ));
    runtime.shutdown_background();

    Ok(())
}

async fn interact(
    connection: WebSocketConnection,
    mut input: UnboundedReceiver<String>,
    mut output: UnboundedReceiver<Output>,
    mut notifications: UnboundedReceiver<Notification>,
    mut printer: impl ExternalPrinter,
) {
    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match connection.send_text_message(line) {
                    Ok(()) => {
                        let _ = printer.print(format!("[CLIENT] {line}"));
                    }
                    Err(err) => {
                        let _ = printer.print(format!("unable to send: {err}"));
                    }
                }
            }
            event = output.recv() => match event {
                Some(Output::Line(line)) => {
                    let _ = printer.print(line);
                }
                Some(Output::Closed) | None => return,
            },
            Some(notification) = notifications.recv() => {
                let _ = printer.print(format!(
                    "[NOTIFICATION #{}] {}: {}",
                    notification.id, notification.title, notification.body
                ));
            }
        }
    }

    connection.disconnect();
    if connection.state() == ConnectionState::Disconnected {
        return;
    }

    let closing = async {
        while let Some(event) = output.recv().await {
            match event {
                Output::Line(line) => {
                    let _ = printer.print(line);
                }
                Output::Closed => break,
            }
        }
    };
    let _ = tokio::time::timeout(CLOSE_WAIT, closing).await;
}
