use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, oneshot};

use crate::engine::DataPayload;
use crate::events::{EventEmitter, SessionEvent};
use crate::participants::ParticipantInfo;

/// Messages kept per track while its listener is not attached yet.
const MAX_PARKED_MESSAGES: usize = 256;

enum Job {
    Attach {
        track_sid: String,
        participant: ParticipantInfo,
    },
    Detach {
        track_sid: String,
    },
    DetachAll,
    Deliver {
        track_sid: String,
        payload: DataPayload,
    },
    Flush(oneshot::Sender<()>),
}

/// Dedicated serial worker for remote data-track messages.
///
/// One FIFO, one consumer task. Listener attach/detach is queued on the
/// same FIFO as message delivery, so per-track ordering holds and a message
/// that overtakes its "subscribed" callback is parked until the attach job
/// runs instead of being lost. The session owner task never blocks on it.
#[derive(Clone)]
pub struct DataTrackWorker {
    tx: mpsc::UnboundedSender<Job>,
}

impl DataTrackWorker {
    /// Must be called from within a tokio runtime.
    pub fn spawn(emitter: EventEmitter) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, DataTrackRouter::new(emitter)));
        Self { tx }
    }

    pub fn attach(&self, track_sid: String, participant: ParticipantInfo) {
        self.post(Job::Attach { track_sid, participant });
    }

    pub fn detach(&self, track_sid: String) {
        self.post(Job::Detach { track_sid });
    }

    pub fn detach_all(&self) {
        self.post(Job::DetachAll);
    }

    pub(crate) fn deliver(&self, track_sid: String, payload: DataPayload) {
        self.post(Job::Deliver { track_sid, payload });
    }

    /// Resolves once every job queued before this call has been processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.post(Job::Flush(tx));
        let _ = rx.await;
    }

    fn post(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("data track worker has stopped");
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Job>, mut router: DataTrackRouter) {
    while let Some(job) = rx.recv().await {
        router.apply(job);
    }
    tracing::debug!("data track worker ended");
}

struct DataTrackRouter {
    emitter: EventEmitter,
    attached: HashMap<String, ParticipantInfo>,
    parked: HashMap<String, VecDeque<DataPayload>>,
}

impl DataTrackRouter {
    fn new(emitter: EventEmitter) -> Self {
        Self {
            emitter,
            attached: HashMap::new(),
            parked: HashMap::new(),
        }
    }

    fn apply(&mut self, job: Job) {
        match job {
            Job::Attach { track_sid, participant } => {
                tracing::debug!(
                    "data track {track_sid} attached for {}",
                    participant.identity
                );
                self.attached.insert(track_sid.clone(), participant);
                if let Some(parked) = self.parked.remove(&track_sid) {
                    for payload in parked {
                        self.emit(&track_sid, payload);
                    }
                }
            }
            Job::Detach { track_sid } => {
                self.attached.remove(&track_sid);
                self.parked.remove(&track_sid);
            }
            Job::DetachAll => {
                self.attached.clear();
                self.parked.clear();
            }
            Job::Deliver { track_sid, payload } => {
                if self.attached.contains_key(&track_sid) {
                    self.emit(&track_sid, payload);
                } else {
                    let queue = self.parked.entry(track_sid).or_default();
                    queue.push_back(payload);
                    // Drop oldest rather than grow without bound.
                    if queue.len() > MAX_PARKED_MESSAGES {
                        queue.pop_front();
                    }
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn emit(&self, track_sid: &str, payload: DataPayload) {
        self.emitter.emit(SessionEvent::DataTrackMessageReceived {
            track_sid: track_sid.to_string(),
            message: payload,
        });
    }
}
