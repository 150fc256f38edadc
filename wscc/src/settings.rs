use std::path::PathBuf;

use clap::{Args, ValueEnum};
use securews::settings::{ConnectionSettings, JsonFileStore};

/// Show or change the saved settings.
#[derive(Args)]
pub struct Cmd {
    /// Whether "notification" messages raise a notification.
    #[arg(long)]
    notifications: Option<Toggle>,

    /// Whether every notification is kept, or each one replaces the previous.
    #[arg(long)]
    multiple_notifications: Option<Toggle>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

pub fn store() -> anyhow::Result<JsonFileStore> {
    let path = settings_path()?;
    Ok(JsonFileStore::open(path)?)
}

fn settings_path() -> anyhow::Result<PathBuf> {
    Ok(home::home_dir()
        .ok_or(anyhow::anyhow!("unable to determine home path"))?
        .join(".wscc_settings.json"))
}

pub fn run(cmd: Cmd) -> anyhow::Result<()> {
    let store = store()?;
    let mut settings = ConnectionSettings::load(&store);

    if let Some(toggle) = cmd.notifications {
        settings.notifications_disabled = matches!(toggle, Toggle::Off);
    }
    if let Some(toggle) = cmd.multiple_notifications {
        settings.multiple_notifications_disabled = matches!(toggle, Toggle::Off);
    }
    if cmd.notifications.is_some() || cmd.multiple_notifications.is_some() {
        settings.save(&store)?;
    }

    println!("settings file:          {}", settings_path()?.display());
    println!(
        "hostname:               {}",
        settings.hostname.as_deref().unwrap_or("-")
    );
    println!(
        "port:                   {}",
        settings.port.map_or_else(|| "-".to_string(), |port| port.to_string())
    );
    println!("connect timeout:        {}ms", settings.timeout);
    println!(
        "notifications:          {}",
        on_off(!settings.notifications_disabled)
    );
    println!(
        "multiple notifications: {}",
        on_off(!settings.multiple_notifications_disabled)
    );

    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
