use clap::{Parser, Subcommand};

mod connect;
mod message;
mod settings;

/// Interactive WebSocket client.
///
/// Lines typed at the prompt are sent to the server as text messages. Inline comments
/// starting with // are stripped before sending and stay searchable in history with ctrl+r.
///
/// Examples:
///   wscc connect 192.168.1.20 8080
///   wscc settings --notifications off
#[derive(Parser)]
#[command(author, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Connect(connect::Cmd),
    Settings(settings::Cmd),
}

fn main() {
    let args = Cli::parse();
    let res = match args.command {
        Commands::Connect(cmd) => connect::run(cmd),
        Commands::Settings(cmd) => settings::run(cmd),
    };
    if let Err(err) = res {
        eprintln!("{:?}", err);
    }
}
