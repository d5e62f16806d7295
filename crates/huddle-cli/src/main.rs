mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands, SettingsAction};
use huddle_core::engine::{CameraFacing, RemoteParticipantState};
use huddle_core::loopback::{LoopbackConfig, LoopbackEngine};
use huddle_core::participants::ParticipantInfo;
use huddle_core::{
    Command, EventEmitter, SessionEvent, SessionEventListener, SessionHandle, Settings,
    SettingsStore,
};

/// Prints every session event as one JSON line on stdout.
struct JsonLines;

impl SessionEventListener for JsonLines {
    fn on_event(&self, event: SessionEvent) {
        println!("{}", event.to_json());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_core=info,huddle_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let store = SettingsStore::new(&data_dir);

    match cli.command {
        Commands::Call {
            room,
            token,
            video,
            data,
            remotes,
            background,
        } => {
            let script = Script {
                video,
                data,
                background,
            };
            run_call(&store.get(), &room, &token, remotes, script).await
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                println!("{}", serde_json::to_string_pretty(&store.get())?);
                Ok(())
            }
            SettingsAction::Set { key, value } => {
                apply_setting(&store, &key, &value)?;
                tracing::info!("{key} = {value} saved in {}", data_dir.display());
                Ok(())
            }
        },
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("no data directory for this platform")?;
    Ok(base.join("huddle"))
}

struct Script {
    video: bool,
    data: bool,
    background: bool,
}

async fn run_call(
    settings: &Settings,
    room: &str,
    token: &str,
    remotes: Vec<String>,
    script: Script,
) -> Result<()> {
    let mut config = settings.connect_config(room, token);
    config.enable_data_track |= script.data;

    let loopback = LoopbackConfig {
        remote_participants: remotes
            .iter()
            .enumerate()
            .map(|(i, identity)| RemoteParticipantState {
                info: ParticipantInfo::new(format!("PAremote{i}"), identity.clone()),
                publications: Vec::new(),
            })
            .collect(),
        ..LoopbackConfig::default()
    };

    let emitter = EventEmitter::new();
    emitter.add_listener(Arc::new(JsonLines));
    let (handle, task) = SessionHandle::spawn(emitter, |sink| LoopbackEngine::new(loopback, sink));

    tracing::info!("joining {room}");
    handle.send(Command::Connect(config));
    handle.settle().await;

    if script.video {
        handle.send(Command::ToggleVideo(true));
        handle.send(Command::SwitchCamera);
    }
    if script.data {
        handle.send(Command::SendString(format!("hello from {room}")));
        handle.send(Command::SendBinary("aHVkZGxl".into()));
    }
    if script.background {
        handle.send(Command::HostPaused);
        handle.send(Command::HostResumed);
    }
    handle.send(Command::GetStats);
    handle.send(Command::FetchRoom);
    handle.settle().await;

    handle.send(Command::Disconnect);
    handle.settle().await;
    drop(handle);
    task.await.context("session task panicked")?;
    Ok(())
}

fn apply_setting(store: &SettingsStore, key: &str, value: &str) -> Result<()> {
    if key == "camera-type" {
        let facing = match value {
            "front" => CameraFacing::Front,
            "back" => CameraFacing::Back,
            other => bail!("camera-type must be front or back, got {other}"),
        };
        store.set_camera_type(facing)?;
        return Ok(());
    }

    let enabled: bool = value
        .parse()
        .with_context(|| format!("{key} expects true or false"))?;
    match key {
        "audio-on-join" => store.set_audio_enabled_on_join(enabled)?,
        "video-on-join" => store.set_video_enabled_on_join(enabled)?,
        "remote-audio" => store.update(|s| s.enable_remote_audio = enabled)?,
        "network-quality" => store.update(|s| s.enable_network_quality_reporting = enabled)?,
        "dominant-speaker" => store.update(|s| s.dominant_speaker_enabled = enabled)?,
        "keep-video-in-background" => {
            store.update(|s| s.maintain_video_in_background = enabled)?
        }
        "h264" => store.update(|s| s.enable_h264 = enabled)?,
        "data-track" => store.update(|s| s.enable_data_track = enabled)?,
        other => bail!("unknown setting {other}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_camera_type_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        apply_setting(&store, "camera-type", "back").unwrap();
        apply_setting(&store, "h264", "true").unwrap();
        apply_setting(&store, "audio-on-join", "false").unwrap();

        let reloaded = SettingsStore::new(dir.path()).get();
        assert_eq!(reloaded.camera_type, CameraFacing::Back);
        assert!(reloaded.enable_h264);
        assert!(!reloaded.audio_enabled_on_join);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert!(apply_setting(&store, "volume", "true").is_err());
        assert!(apply_setting(&store, "h264", "yes").is_err());
        assert!(apply_setting(&store, "camera-type", "side").is_err());
        assert_eq!(store.get(), Settings::default());
    }
}
