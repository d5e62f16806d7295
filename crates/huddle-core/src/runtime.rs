//! Owner task for a [`SessionController`].
//!
//! Host commands and engine callbacks are both queued onto one tokio task
//! and applied one at a time, so session state has a single writer.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::data_track::DataTrackWorker;
use crate::engine::{engine_channel, EngineEventSink, EngineInbox, MediaEngine};
use crate::events::EventEmitter;
use crate::room::{ConnectConfig, SessionController};

/// Host commands, one per bridge method.
#[derive(Debug)]
pub enum Command {
    Connect(ConnectConfig),
    Disconnect,
    SwitchCamera,
    ToggleVideo(bool),
    ToggleAudio(bool),
    ToggleDataTrack(bool),
    ToggleScreenSharing(bool),
    PublishLocalVideo(bool),
    PublishLocalAudio(bool),
    PublishLocalDataTrack(bool),
    SetRemoteAudioPlayback { participant_sid: String, enabled: bool },
    ToggleRemoteAudio(bool),
    SendString(String),
    SendBinary(String),
    GetStats,
    FetchRoom,
    HostPaused,
    HostResumed,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Disconnect => "disconnect",
            Self::SwitchCamera => "switchCamera",
            Self::ToggleVideo(_) => "toggleVideo",
            Self::ToggleAudio(_) => "toggleAudio",
            Self::ToggleDataTrack(_) => "toggleDataTrack",
            Self::ToggleScreenSharing(_) => "toggleScreenSharing",
            Self::PublishLocalVideo(_) => "publishLocalVideo",
            Self::PublishLocalAudio(_) => "publishLocalAudio",
            Self::PublishLocalDataTrack(_) => "publishLocalDataTrack",
            Self::SetRemoteAudioPlayback { .. } => "setRemoteAudioPlayback",
            Self::ToggleRemoteAudio(_) => "toggleRemoteAudio",
            Self::SendString(_) => "sendString",
            Self::SendBinary(_) => "sendBinary",
            Self::GetStats => "getStats",
            Self::FetchRoom => "fetchRoom",
            Self::HostPaused => "hostPaused",
            Self::HostResumed => "hostResumed",
        }
    }
}

enum Message {
    Command(Command),
    Settle(oneshot::Sender<()>),
}

/// Handle to a running session owner task. Dropping every handle stops the
/// task once its queue is drained.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl SessionHandle {
    /// Spawn the data-track worker and the owner task. `make_engine`
    /// receives the sink the engine must report through.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<E, F>(emitter: EventEmitter, make_engine: F) -> (Self, JoinHandle<()>)
    where
        E: MediaEngine + 'static,
        F: FnOnce(EngineEventSink) -> E,
    {
        let data = DataTrackWorker::spawn(emitter.clone());
        let (sink, inbox) = engine_channel(data.clone());
        let controller = SessionController::new(make_engine(sink), emitter, data);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(controller, inbox, rx));
        (Self { tx }, task)
    }

    pub fn send(&self, command: Command) {
        let name = command.name();
        if self.tx.send(Message::Command(command)).is_err() {
            tracing::warn!("command {name} dropped: session task has stopped");
        }
    }

    /// Resolves once every command sent before this call, and every engine
    /// callback they caused, has been applied and delivered.
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Message::Settle(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run<E: MediaEngine>(
    mut controller: SessionController<E>,
    mut inbox: EngineInbox,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        tokio::select! {
            biased;
            Some(event) = inbox.recv() => controller.handle(event),
            message = rx.recv() => match message {
                Some(Message::Command(command)) => {
                    tracing::debug!("command {}", command.name());
                    apply(&mut controller, command);
                }
                Some(Message::Settle(done)) => {
                    while let Some(event) = inbox.try_recv() {
                        controller.handle(event);
                    }
                    controller.data.flush().await;
                    let _ = done.send(());
                }
                None => break,
            },
        }
    }
    tracing::debug!("session task ended");
}

fn apply<E: MediaEngine>(controller: &mut SessionController<E>, command: Command) {
    match command {
        Command::Connect(config) => controller.connect(config),
        Command::Disconnect => controller.disconnect(),
        Command::SwitchCamera => controller.switch_camera(),
        Command::ToggleVideo(enabled) => controller.toggle_video(enabled),
        Command::ToggleAudio(enabled) => controller.toggle_audio(enabled),
        Command::ToggleDataTrack(enabled) => controller.toggle_data_track(enabled),
        Command::ToggleScreenSharing(enabled) => controller.toggle_screen_sharing(enabled),
        Command::PublishLocalVideo(enabled) => controller.publish_local_video(enabled),
        Command::PublishLocalAudio(enabled) => controller.publish_local_audio(enabled),
        Command::PublishLocalDataTrack(enabled) => controller.publish_local_data_track(enabled),
        Command::SetRemoteAudioPlayback {
            participant_sid,
            enabled,
        } => controller.set_remote_audio_playback(&participant_sid, enabled),
        Command::ToggleRemoteAudio(enabled) => controller.toggle_remote_audio(enabled),
        Command::SendString(message) => controller.send_string(&message),
        Command::SendBinary(payload) => controller.send_binary(&payload),
        Command::GetStats => controller.get_stats(),
        Command::FetchRoom => controller.fetch_room(),
        Command::HostPaused => controller.host_paused(),
        Command::HostResumed => controller.host_resumed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DataPayload, EngineEvent, RemoteCallback};
    use crate::events::testing::EventCapture;
    use crate::loopback::{LoopbackConfig, LoopbackEngine};
    use crate::participants::ParticipantInfo;
    use crate::tracks::{TrackKind, TrackPublication};
    use std::sync::{Arc, Mutex};

    fn config() -> ConnectConfig {
        ConnectConfig {
            room_name: "standup".into(),
            access_token: "token".into(),
            enable_data_track: true,
            ..ConnectConfig::default()
        }
    }

    #[tokio::test]
    async fn commands_and_callbacks_run_on_owner_task() {
        let emitter = EventEmitter::new();
        let capture = EventCapture::attach(&emitter);
        let (handle, task) = SessionHandle::spawn(emitter, |sink| {
            LoopbackEngine::new(LoopbackConfig::default(), sink)
        });

        handle.send(Command::Connect(config()));
        handle.send(Command::ToggleVideo(true));
        handle.send(Command::SendString("hello".into()));
        handle.send(Command::FetchRoom);
        handle.settle().await;

        let names = capture.names();
        assert_eq!(names[0], "onLocalParticipantSupportedCodecs");
        assert!(names.contains(&"onRoomDidConnect"));
        assert!(names.contains(&"onVideoChanged"));
        assert_eq!(capture.count("onRoomFetched"), 1);

        handle.send(Command::Disconnect);
        handle.settle().await;
        assert_eq!(capture.count("onRoomDidDisconnect"), 1);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn remote_data_flows_through_worker() {
        let emitter = EventEmitter::new();
        let capture = EventCapture::attach(&emitter);
        let sink_slot = Arc::new(Mutex::new(None));
        let keep = sink_slot.clone();
        let bob = ParticipantInfo::new("PAbob", "bob");
        let loopback = LoopbackConfig {
            remote_participants: vec![crate::engine::RemoteParticipantState {
                info: bob.clone(),
                publications: Vec::new(),
            }],
            ..LoopbackConfig::default()
        };
        let (handle, _task) = SessionHandle::spawn(emitter, move |sink| {
            *keep.lock().unwrap() = Some(sink.clone());
            LoopbackEngine::new(loopback, sink)
        });
        let sink = sink_slot.lock().unwrap().clone().unwrap();

        handle.send(Command::Connect(config()));
        handle.settle().await;

        let data = TrackPublication::new("MTdata", "data", TrackKind::Data, true);
        sink.send(EngineEvent::Remote {
            participant: bob.clone(),
            callback: RemoteCallback::TrackSubscribed(data),
        });
        for i in 0..3 {
            sink.data_message("MTdata", DataPayload::Text(format!("m{i}")));
        }
        handle.settle().await;

        let texts: Vec<_> = capture
            .events()
            .into_iter()
            .filter(|e| e.name() == "onDataTrackMessageReceived")
            .map(|e| e.payload()["message"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(texts, ["m0", "m1", "m2"]);
    }

    #[test]
    fn command_names_match_bridge_methods() {
        assert_eq!(Command::ToggleDataTrack(true).name(), "toggleDataTrack");
        assert_eq!(
            Command::SetRemoteAudioPlayback {
                participant_sid: "PA1".into(),
                enabled: false,
            }
            .name(),
            "setRemoteAudioPlayback"
        );
    }
}
