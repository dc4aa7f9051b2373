//! Debounced persistence pipeline.
//!
//! Watches diagram changes, waits for a quiet period, then commits through
//! the [`IdentityResolver`]. Only one commit runs at a time; edits made while
//! it is in flight are picked up by the next debounce cycle.

use super::diagram_service::{ChangeListener, ChangeOrigin, DiagramChange, DiagramService};
use super::identity_resolver::{CommitError, IdentityResolver};
use super::session::AuthSession;
use crate::models::Diagram;
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Saved,
    /// Saved to the device cache only; no session to sync with.
    SavedLocally,
    Unsaved,
    Saving,
}

impl SaveStatus {
    pub fn is_saved(self) -> bool {
        matches!(self, SaveStatus::Saved | SaveStatus::SavedLocally)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Committed { id: Uuid, promoted: bool },
    SavedLocally,
    SkippedEmpty,
    /// Another commit was in flight; this request rides the next cycle.
    Coalesced,
    /// The diagram was replaced while committing; result discarded.
    Superseded,
}

/// User-visible, dismissible failure notice.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveNotice {
    pub message: String,
}

struct SchedulerState {
    status: SaveStatus,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    in_flight: bool,
    dirty_during_flight: bool,
    rerun_after_flight: bool,
    last_error: Option<StorageError>,
}

pub struct AutosaveScheduler {
    me: Weak<AutosaveScheduler>,
    diagram: Arc<DiagramService>,
    identity: Arc<IdentityResolver>,
    auth: Arc<AuthSession>,
    debounce: Duration,
    state: Mutex<SchedulerState>,
    status_tx: watch::Sender<SaveStatus>,
    notices: broadcast::Sender<SaveNotice>,
}

impl AutosaveScheduler {
    pub fn new(
        diagram: Arc<DiagramService>,
        identity: Arc<IdentityResolver>,
        auth: Arc<AuthSession>,
        debounce: Duration,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(SaveStatus::Saved);
        let (notices, _) = broadcast::channel(16);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            diagram,
            identity,
            auth,
            debounce,
            state: Mutex::new(SchedulerState {
                status: SaveStatus::Saved,
                timer: None,
                timer_generation: 0,
                in_flight: false,
                dirty_during_flight: false,
                rerun_after_flight: false,
                last_error: None,
            }),
            status_tx,
            notices,
        })
    }

    pub fn status(&self) -> SaveStatus {
        self.state.lock().status
    }

    pub fn watch_status(&self) -> watch::Receiver<SaveStatus> {
        self.status_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SaveNotice> {
        self.notices.subscribe()
    }

    pub fn last_error(&self) -> Option<StorageError> {
        self.state.lock().last_error.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    fn set_status(&self, state: &mut SchedulerState, status: SaveStatus) {
        if state.status != status {
            debug!("[Autosave] {:?} -> {:?}", state.status, status);
        }
        state.status = status;
        self.status_tx.send_replace(status);
    }

    /// Restarts the debounce wait.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        self.arm(&mut state);
    }

    /// Drops any pending debounce without saving.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        Self::disarm(&mut state);
    }

    fn disarm(state: &mut SchedulerState) {
        state.timer_generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    fn arm(&self, state: &mut SchedulerState) {
        Self::disarm(state);
        let generation = state.timer_generation;
        let me = self.me.clone();
        let delay = self.debounce;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("[Autosave] No async runtime, debounce not scheduled");
            return;
        };
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(scheduler) = me.upgrade() else {
                return;
            };
            {
                let mut state = scheduler.state.lock();
                if state.timer_generation != generation {
                    return;
                }
                // Past this point the task is no longer abortable via `timer`.
                state.timer = None;
            }
            if let Err(e) = scheduler.run_save().await {
                debug!("[Autosave] Debounced save failed: {}", e);
            }
        }));
    }

    /// Manual save: cancels the pending debounce and saves immediately.
    pub async fn fire_now(&self) -> Result<SaveOutcome, StorageError> {
        self.cancel();
        self.run_save().await
    }

    async fn run_save(&self) -> Result<SaveOutcome, StorageError> {
        {
            let mut state = self.state.lock();
            if state.in_flight {
                state.rerun_after_flight = true;
                debug!("[Autosave] Commit in flight, coalescing");
                return Ok(SaveOutcome::Coalesced);
            }
            state.in_flight = true;
            state.dirty_during_flight = false;
            state.rerun_after_flight = false;
        }

        // Epoch before snapshot: a load in between makes the commit stale.
        let epoch = self.identity.epoch();
        let diagram = self.diagram.snapshot();
        let caller = self.auth.capability();

        if diagram.is_empty() {
            self.finish(Some(SaveStatus::Saved), None);
            return Ok(SaveOutcome::SkippedEmpty);
        }

        if !caller.is_authenticated() {
            return self.save_locally(&diagram);
        }

        {
            let mut state = self.state.lock();
            self.set_status(&mut state, SaveStatus::Saving);
        }

        match self.identity.commit(&diagram, &caller, epoch).await {
            Ok(outcome) => {
                let id = outcome.receipt.id;
                if !self.adopt(epoch, id, outcome.receipt.committed_at) {
                    debug!("[Autosave] Diagram replaced before {} was stamped", id);
                    self.finish(None, None);
                    return Ok(SaveOutcome::Superseded);
                }
                self.finish(Some(SaveStatus::Saved), None);
                info!("[Autosave] Committed {} (promoted: {})", id, outcome.promoted);
                Ok(SaveOutcome::Committed {
                    id,
                    promoted: outcome.promoted,
                })
            }
            Err(CommitError::Superseded) => {
                self.finish(None, None);
                Ok(SaveOutcome::Superseded)
            }
            Err(CommitError::Store(StorageError::Unauthenticated)) => {
                warn!("[Autosave] Session rejected by store, keeping changes locally");
                self.save_locally(&diagram)
            }
            Err(CommitError::Store(e)) => {
                error!("[Autosave] Commit failed: {}", e);
                Err(self.fail(e))
            }
        }
    }

    /// Stamps the committed id unless the diagram was replaced meanwhile.
    fn adopt(&self, epoch: u64, id: Uuid, committed_at: DateTime<Utc>) -> bool {
        self.diagram.set_identity_if(
            || self.identity.epoch() == epoch,
            Some(id),
            Some(committed_at),
        )
    }

    fn save_locally(&self, diagram: &Diagram) -> Result<SaveOutcome, StorageError> {
        if let Err(e) = self.identity.cache().store_draft(&self.identity.local_draft(diagram)) {
            error!("[Autosave] Failed to write local draft: {}", e);
            return Err(self.fail(StorageError::Other(format!("Local save failed: {}", e))));
        }
        self.finish(Some(SaveStatus::SavedLocally), None);
        Ok(SaveOutcome::SavedLocally)
    }

    fn fail(&self, e: StorageError) -> StorageError {
        self.finish(Some(SaveStatus::Unsaved), Some(e.clone()));
        let _ = self.notices.send(SaveNotice {
            message: format!("Save failed: {}", e),
        });
        e
    }

    /// Ends a flight. `None` leaves the status alone (stale result).
    fn finish(&self, status: Option<SaveStatus>, failure: Option<StorageError>) {
        let mut state = self.state.lock();
        state.in_flight = false;
        state.last_error = failure;

        let follow_up = state.dirty_during_flight || state.rerun_after_flight;
        state.dirty_during_flight = false;
        state.rerun_after_flight = false;

        if follow_up {
            self.set_status(&mut state, SaveStatus::Unsaved);
            self.arm(&mut state);
        } else if let Some(status) = status {
            self.set_status(&mut state, status);
        }
    }
}

impl ChangeListener for AutosaveScheduler {
    fn on_change(&self, change: &DiagramChange, _diagram: &Diagram) {
        let mut state = self.state.lock();
        match change.origin {
            ChangeOrigin::Load => {
                Self::disarm(&mut state);
                state.dirty_during_flight = false;
                state.rerun_after_flight = false;
                state.last_error = None;
                self.set_status(&mut state, SaveStatus::Saved);
            }
            ChangeOrigin::Local | ChangeOrigin::Remote => {
                if state.in_flight {
                    state.dirty_during_flight = true;
                }
                // An in-flight commit keeps showing Saving until it resolves.
                if state.status != SaveStatus::Saving {
                    self.set_status(&mut state, SaveStatus::Unsaved);
                }
                self.arm(&mut state);
            }
        }
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}
