use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::designer::cancel::CancelSignal;
use crate::designer::form::decode_preview;
use crate::designer::workflow::{RequestContext, SubmissionWorkflow, SubmitError};
use crate::designer::{ResultState, RoomDesigner};
use crate::llm::media::MediaFile;

#[derive(Debug)]
struct ChatSession {
    designer: RoomDesigner,
    last_active: Instant,
}

impl ChatSession {
    fn new() -> Self {
        ChatSession {
            designer: RoomDesigner::default(),
            last_active: Instant::now(),
        }
    }
}

type SessionMap = Arc<Mutex<HashMap<i64, ChatSession>>>;

/// A submission that passed validation and is ready to run.
///
/// Dropping it before `run_submission` commits an outcome releases the
/// session's loading state, so an early return can never leave a chat busy.
#[derive(Debug)]
pub struct PendingSubmission {
    chat_id: i64,
    pub context: RequestContext,
    cancel: CancelSignal,
    sessions: SessionMap,
    settled: bool,
}

impl Drop for PendingSubmission {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let submission_id = self.context.submission_id;
        let mut sessions = self.sessions.lock();
        let released = sessions
            .get_mut(&self.chat_id)
            .map(|session| session.designer.abandon_submission(submission_id))
            .unwrap_or(false);
        if released {
            warn!(
                chat_id = self.chat_id,
                submission_id, "Submission abandoned before completion; loading cleared"
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    sessions: SessionMap,
    pub workflow: Arc<SubmissionWorkflow>,
}

impl AppState {
    pub fn new(workflow: SubmissionWorkflow) -> Self {
        AppState {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            workflow: Arc::new(workflow),
        }
    }

    /// Runs `f` against the chat's session, creating it on first use. The
    /// lock is released before `f`'s result is returned, so `f` must not await.
    pub fn with_session<R>(&self, chat_id: i64, f: impl FnOnce(&mut RoomDesigner) -> R) -> R {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(chat_id).or_insert_with(ChatSession::new);
        session.last_active = Instant::now();
        f(&mut session.designer)
    }

    /// Stores the file, then encodes its preview without holding the lock.
    /// Returns false when the file was replaced before its preview was ready.
    pub async fn ingest_file(&self, chat_id: i64, file: MediaFile) -> bool {
        let ticket = self.with_session(chat_id, |session| session.begin_ingest(file.clone()));
        let preview = decode_preview(file).await;
        self.with_session(chat_id, |session| session.finish_ingest(ticket, preview))
    }

    pub fn begin_submission(&self, chat_id: i64) -> Result<PendingSubmission, SubmitError> {
        let (context, cancel) = self.with_session(chat_id, RoomDesigner::begin_submission)?;
        Ok(PendingSubmission {
            chat_id,
            context,
            cancel,
            sessions: Arc::clone(&self.sessions),
            settled: false,
        })
    }

    /// Runs the workflow and commits its outcome. `Cancelled` means a reset
    /// superseded the run and nothing was written.
    pub async fn run_submission(
        &self,
        mut pending: PendingSubmission,
    ) -> Result<ResultState, SubmitError> {
        let outcome = self
            .workflow
            .run(&pending.context, &pending.cancel)
            .await;
        let submission_id = pending.context.submission_id;
        let committed = self.with_session(pending.chat_id, |session| {
            if session.finish_submission(submission_id, outcome) {
                Ok(session.result().clone())
            } else {
                Err(SubmitError::Cancelled)
            }
        });
        pending.settled = true;
        committed
    }

    pub fn reset(&self, chat_id: i64) {
        self.with_session(chat_id, RoomDesigner::reset);
    }

    /// Drops sessions idle for at least `max_idle`. Sessions with a
    /// submission in flight are kept. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.evict_idle_at(Instant::now(), max_idle)
    }

    fn evict_idle_at(&self, now: Instant, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.designer.result().is_loading
                || now.saturating_duration_since(session.last_active) < max_idle
        });
        before - sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Periodically evicts idle sessions so photos and generated images do not
/// accumulate for chats that went quiet.
pub fn spawn_session_sweeper(state: AppState, max_idle: Duration) {
    let period = (max_idle / 4).max(Duration::from_secs(30));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle(max_idle);
            if evicted > 0 {
                info!(
                    evicted,
                    remaining = state.session_count(),
                    "Evicted idle designer sessions"
                );
            }
        }
    });
}
