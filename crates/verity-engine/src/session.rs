use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use anyhow::anyhow;
use serde_json::Value;
use verity_contracts::analysis::AnalysisPrompt;
use verity_contracts::events::{new_session_id, EventLog, EventPayload};
use verity_contracts::report::parse_report;
use verity_contracts::session::SessionState;

use crate::ingest::{ingest_file, load_bundled_sample, SAMPLE_REPORT};
use crate::AnalysisProvider;

struct SessionSlot {
    generation: u64,
    state: SessionState,
}

/// Owns the session state machine and sequences ingestion, analysis, and
/// parsing on worker threads so the interactive surface never blocks.
///
/// Every operation captures a generation token when it starts; a completion
/// is applied only while its token is still current, so a newer upload
/// supersedes anything in flight and stale results are discarded rather than
/// applied. Single writer discipline: all transitions go through the one
/// mutex-guarded slot, and readers get cloned snapshots.
pub struct SessionController {
    session_id: String,
    slot: Arc<Mutex<SessionSlot>>,
    provider: Arc<dyn AnalysisProvider>,
    prompt: AnalysisPrompt,
    events: Option<EventLog>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            session_id: new_session_id(),
            slot: Arc::new(Mutex::new(SessionSlot {
                generation: 0,
                state: SessionState::Idle,
            })),
            provider,
            prompt: AnalysisPrompt::default(),
            events: None,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// The default way a session begins: construct, then immediately enter
    /// the bootstrap path with no user action.
    pub fn start(provider: Arc<dyn AnalysisProvider>) -> Self {
        let controller = Self::new(provider);
        controller.bootstrap();
        controller
    }

    pub fn with_prompt(mut self, prompt: AnalysisPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    /// Installs an append-only JSONL lifecycle log. Without one, the
    /// controller writes nothing anywhere.
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        let log = EventLog::new(path, self.session_id.clone());
        let _ = log.emit("session_started", EventPayload::new());
        self.events = Some(log);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> SessionState {
        lock(&self.slot).state.clone()
    }

    /// Enters the no-network default state: the bundled sample image and its
    /// fixed report are fed straight to the parser. The analysis provider is
    /// never consulted on this path.
    pub fn bootstrap(&self) {
        let generation = {
            let mut guard = lock(&self.slot);
            guard.generation += 1;
            guard.state = SessionState::Bootstrapping;
            guard.generation
        };
        self.emit("bootstrap_started", EventPayload::new());

        let slot = Arc::clone(&self.slot);
        let events = self.events.clone();
        self.spawn("verity-bootstrap", generation, move || {
            let next = match load_bundled_sample() {
                Ok(image) => SessionState::Ready {
                    image,
                    blocks: parse_report(SAMPLE_REPORT),
                },
                Err(err) => SessionState::Failed {
                    image: None,
                    message: err.user_message().to_string(),
                },
            };
            apply_if_current(&slot, events.as_ref(), generation, "bootstrap_settled", next);
        });
    }

    /// Accepts an upload from any state, superseding whatever is in flight.
    /// Ingest failures keep the prior image; analysis failures keep the
    /// failed image so a retry needs no re-upload.
    pub fn request_upload(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let (generation, prior_image) = {
            let mut guard = lock(&self.slot);
            guard.generation += 1;
            (guard.generation, guard.state.image().cloned())
        };
        let mut payload = EventPayload::new();
        payload.insert(
            "path".to_string(),
            Value::String(path.display().to_string()),
        );
        self.emit("upload_accepted", payload);

        let slot = Arc::clone(&self.slot);
        let events = self.events.clone();
        let provider = Arc::clone(&self.provider);
        let prompt = self.prompt.clone();
        self.spawn("verity-upload", generation, move || {
            let image = match ingest_file(&path) {
                Ok(image) => image,
                Err(err) => {
                    apply_if_current(
                        &slot,
                        events.as_ref(),
                        generation,
                        "ingest_failed",
                        SessionState::Failed {
                            image: prior_image,
                            message: err.user_message().to_string(),
                        },
                    );
                    return;
                }
            };

            let analyzing = SessionState::Analyzing {
                image: image.clone(),
            };
            if !apply_if_current(&slot, events.as_ref(), generation, "analysis_started", analyzing)
            {
                return;
            }

            let next = match provider.analyze(&image, &prompt) {
                Ok(report) => SessionState::Ready {
                    blocks: parse_report(report.as_str()),
                    image,
                },
                Err(err) => SessionState::Failed {
                    image: Some(image),
                    message: err.user_message(),
                },
            };
            apply_if_current(&slot, events.as_ref(), generation, "analysis_settled", next);
        });
    }

    /// Joins every outstanding worker. Completions that were superseded have
    /// already been discarded by then; this only drains the threads.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        let handles: Vec<thread::JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow!("session worker panicked"))?;
        }
        Ok(())
    }

    fn spawn(&self, name: &str, generation: u64, job: impl FnOnce() + Send + 'static) {
        let spawned = thread::Builder::new().name(name.to_string()).spawn(job);
        match spawned {
            Ok(handle) => {
                let mut workers = lock(&self.workers);
                workers.retain(|worker| !worker.is_finished());
                workers.push(handle);
            }
            Err(err) => {
                let prior_image = lock(&self.slot).state.image().cloned();
                apply_if_current(
                    &self.slot,
                    self.events.as_ref(),
                    generation,
                    "worker_spawn_failed",
                    SessionState::Failed {
                        image: prior_image,
                        message: format!("Failed to start background work: {err}"),
                    },
                );
            }
        }
    }

    fn emit(&self, event_type: &str, payload: EventPayload) {
        if let Some(log) = self.events.as_ref() {
            let _ = log.emit(event_type, payload);
        }
    }
}

fn apply_if_current(
    slot: &Mutex<SessionSlot>,
    events: Option<&EventLog>,
    generation: u64,
    event_type: &str,
    next: SessionState,
) -> bool {
    let applied = {
        let mut guard = lock(slot);
        if guard.generation == generation {
            guard.state = next.clone();
            true
        } else {
            false
        }
    };
    if let Some(log) = events {
        let event_type = if applied {
            event_type
        } else {
            "stale_result_discarded"
        };
        let _ = log.emit(event_type, state_payload(&next));
    }
    applied
}

fn state_payload(state: &SessionState) -> EventPayload {
    let mut payload = EventPayload::new();
    payload.insert(
        "phase".to_string(),
        Value::String(state.phase().to_string()),
    );
    if let Some(image) = state.image() {
        payload.insert(
            "image_sha256".to_string(),
            Value::String(image.sha256.clone()),
        );
    }
    if let SessionState::Failed { message, .. } = state {
        payload.insert("message".to_string(), Value::String(message.clone()));
    }
    payload
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
