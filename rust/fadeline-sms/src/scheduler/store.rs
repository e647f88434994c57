//! Backend-synchronized message collection.
//!
//! The store owns the single authoritative list of [`ScheduledMessage`]s and
//! mediates every remote operation. Nothing mutates optimistically: remote
//! writes land on a working copy first and commit into the collection only
//! after the backend accepts them, so a failed save or delete leaves local
//! state exactly as it was.
//!
//! Concurrency rules:
//! - loads carry a sequence number; a response is discarded when a newer
//!   load was issued while it was in flight
//! - a loaded list stays fresh for [`REFRESH_WINDOW_MINUTES`]; reads inside
//!   the window reuse it
//! - at most one save per message id is in flight at a time

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::{ContentValidator, ScheduleTransport, StorageStatus, StoredMessage};
use crate::error::{EngineError, PreconditionError};
use crate::logging::OpTimer;
use crate::scheduler::{
    check_body_for_submission, CronFields, Lifecycle, Meridiem, Recurrence, SaveMode,
    ScheduledMessage, TimeOfDay, MAX_MESSAGES, REFRESH_WINDOW_MINUTES,
};

/// Denial reason attached to records whose stored cron expression could not
/// be interpreted.
pub const PARSE_FAILURE_REASON: &str = "Failed to parse schedule";

/// Partial update applied to one message. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub time: Option<TimeOfDay>,
}

struct StoreState {
    messages: Vec<ScheduledMessage>,
    /// Pre-edit copies of records with an open edit session, by id.
    snapshots: HashMap<String, ScheduledMessage>,
    loaded_at: Option<DateTime<Utc>>,
}

/// The schedule collection plus its backend clients.
pub struct ScheduleStore {
    transport: Arc<dyn ScheduleTransport>,
    validator: Arc<dyn ContentValidator>,
    state: Mutex<StoreState>,
    saves_in_flight: Mutex<HashSet<String>>,
    load_seq: AtomicU64,
}

impl std::fmt::Debug for ScheduleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleStore")
            .field("transport", &"ScheduleTransport")
            .field("validator", &"ContentValidator")
            .field("load_seq", &self.load_seq.load(Ordering::SeqCst))
            .finish()
    }
}

impl ScheduleStore {
    #[must_use]
    pub fn new(transport: Arc<dyn ScheduleTransport>, validator: Arc<dyn ContentValidator>) -> Self {
        Self {
            transport,
            validator,
            state: Mutex::new(StoreState {
                messages: Vec::new(),
                snapshots: HashMap::new(),
                loaded_at: None,
            }),
            saves_in_flight: Mutex::new(HashSet::new()),
            load_seq: AtomicU64::new(0),
        }
    }

    /// Current list, in display order.
    #[must_use]
    pub fn list(&self) -> Vec<ScheduledMessage> {
        self.state.lock().messages.clone()
    }

    /// One message by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ScheduledMessage> {
        let state = self.state.lock();
        state.messages.iter().find(|m| m.id == id).cloned()
    }

    /// Fetch the stored list and replace the persisted records.
    ///
    /// Local drafts that were never saved survive a load; open edit sessions
    /// do not, since their record may have been replaced. If a newer load was
    /// issued while this one was in flight, its response is discarded and the
    /// current (fresher) list is returned instead.
    pub async fn load(&self) -> Result<Vec<ScheduledMessage>, EngineError> {
        let seq = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = OpTimer::new("store", "load");
        let result = self.transport.fetch_messages().await;
        timer.finish_with_result(&result);
        let stored = result?;

        let mut loaded: Vec<ScheduledMessage> =
            stored.into_iter().map(decode_stored).collect();

        let mut state = self.state.lock();
        if seq != self.load_seq.load(Ordering::SeqCst) {
            debug!(seq, "discarding stale load response");
            return Ok(state.messages.clone());
        }
        loaded.extend(state.messages.iter().filter(|m| !m.persisted).cloned());
        state.messages = loaded;
        state.snapshots.clear();
        state.loaded_at = Some(Utc::now());
        Ok(state.messages.clone())
    }

    /// Return the cached list, reloading first when it is older than the
    /// freshness window or was never loaded.
    pub async fn refresh_if_stale(&self) -> Result<Vec<ScheduledMessage>, EngineError> {
        self.refresh_if_stale_at(Utc::now()).await
    }

    /// [`Self::refresh_if_stale`] with an explicit notion of now.
    pub async fn refresh_if_stale_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>, EngineError> {
        let fresh = {
            let state = self.state.lock();
            state
                .loaded_at
                .is_some_and(|at| now - at < Duration::minutes(REFRESH_WINDOW_MINUTES))
        };
        if fresh {
            return Ok(self.list());
        }
        self.load().await
    }

    /// Add a new local draft.
    ///
    /// Rejected when the collection already holds [`MAX_MESSAGES`] records
    /// or another never-saved draft is still open. Nothing is sent to the
    /// backend; persistence happens on the first save.
    pub fn create(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        recurrence: Recurrence,
        time: TimeOfDay,
    ) -> Result<ScheduledMessage, EngineError> {
        let mut state = self.state.lock();
        if state.messages.len() >= MAX_MESSAGES {
            return Err(PreconditionError::MessageLimitReached.into());
        }
        if state.messages.iter().any(|m| !m.persisted) {
            return Err(PreconditionError::DraftAlreadyOpen.into());
        }
        let msg = ScheduledMessage::draft(title, body, recurrence, time)?;
        debug!(id = %msg.id, "created draft");
        state.messages.push(msg.clone());
        Ok(msg)
    }

    /// Merge a partial update into one message.
    ///
    /// Every patched field is range-checked before the merge. Unsaved drafts
    /// are updated in place and stay local. Persisted records must be in an
    /// edit session; the merged record is written to the backend and the
    /// session ends when the write succeeds. A body change resets the
    /// lifecycle to draft either way.
    pub async fn update(
        &self,
        id: &str,
        patch: MessagePatch,
    ) -> Result<ScheduledMessage, EngineError> {
        let original = {
            let state = self.state.lock();
            let msg = find(&state.messages, id)?;
            if msg.persisted && !msg.editing {
                return Err(PreconditionError::NotEditing { id: id.to_string() }.into());
            }
            msg.clone()
        };

        let mut working = original;
        if let Some(title) = patch.title {
            working.edit_title(title)?;
        }
        if let Some(body) = patch.body {
            working.edit_body(body)?;
        }
        if let Some(recurrence) = patch.recurrence {
            recurrence.check()?;
            working.recurrence = recurrence;
        }
        if let Some(time) = patch.time {
            time.check()?;
            working.time = time;
        }

        if !working.persisted {
            let mut state = self.state.lock();
            replace(&mut state.messages, working.clone())?;
            return Ok(working);
        }

        check_body_for_submission(&working.body)?;
        let _guard = self.begin_save(id)?;
        working.editing = false;
        let stored = to_stored(&working);
        let timer = OpTimer::new("store", "update");
        let result = self.transport.persist_message(&stored).await;
        timer.finish_with_result(&result);
        result?;

        let mut state = self.state.lock();
        state.snapshots.remove(id);
        replace(&mut state.messages, working.clone())?;
        Ok(working)
    }

    /// Submit a message's body to the validation gateway and record the
    /// verdict.
    ///
    /// State and length preconditions are checked first; an undersized body
    /// never produces a network call. A gateway failure leaves the message
    /// untouched.
    pub async fn validate(&self, id: &str) -> Result<ScheduledMessage, EngineError> {
        let body = {
            let state = self.state.lock();
            let msg = find(&state.messages, id)?;
            msg.check_validate()?;
            msg.body.clone()
        };

        let timer = OpTimer::new("store", "validate");
        let result = self.validator.verify(&body).await;
        timer.finish_with_result(&result);
        let verdict = result?;

        let mut state = self.state.lock();
        let msg = find_mut(&mut state.messages, id)?;
        msg.apply_verdict(verdict)?;
        Ok(msg.clone())
    }

    /// Persist a message, as a draft or as an active schedule.
    ///
    /// The lifecycle transition is computed before the write and committed
    /// only after the backend accepts it. At most one save per id runs at a
    /// time; a second call while one is in flight is rejected.
    pub async fn save(&self, id: &str, mode: SaveMode) -> Result<ScheduledMessage, EngineError> {
        let _guard = self.begin_save(id)?;

        let mut working = {
            let state = self.state.lock();
            find(&state.messages, id)?.clone()
        };
        let target = working.save_target(mode)?;
        working.complete_save(target);

        let stored = to_stored(&working);
        let timer = OpTimer::new("store", "save");
        let result = self.transport.persist_message(&stored).await;
        timer.finish_with_result(&result);
        result?;

        let mut state = self.state.lock();
        state.snapshots.remove(id);
        replace(&mut state.messages, working.clone())?;
        Ok(working)
    }

    /// Delete a message.
    ///
    /// Persisted records are removed remotely first; the local record only
    /// disappears once the backend confirms, so a failed delete leaves the
    /// list unchanged. Unsaved drafts are dropped without any network call.
    pub async fn delete(&self, id: &str) -> Result<(), EngineError> {
        let persisted = {
            let state = self.state.lock();
            find(&state.messages, id)?.persisted
        };

        if persisted {
            let timer = OpTimer::new("store", "delete");
            let result = self.transport.delete_message(id).await;
            timer.finish_with_result(&result);
            result?;
        }

        let mut state = self.state.lock();
        state.messages.retain(|m| m.id != id);
        state.snapshots.remove(id);
        Ok(())
    }

    /// Open an edit session on a persisted record, keeping a snapshot for
    /// rollback. Calling it again on an open session is a no-op.
    pub fn enable_edit(&self, id: &str) -> Result<ScheduledMessage, EngineError> {
        let mut state = self.state.lock();
        let (snapshot, current) = {
            let msg = find_mut(&mut state.messages, id)?;
            if msg.editing {
                return Ok(msg.clone());
            }
            let snapshot = msg.clone();
            msg.begin_editing()?;
            (snapshot, msg.clone())
        };
        state.snapshots.insert(id.to_string(), snapshot);
        Ok(current)
    }

    /// Abandon an edit session, restoring the record to its snapshot.
    pub fn cancel_edit(&self, id: &str) -> Result<ScheduledMessage, EngineError> {
        let mut state = self.state.lock();
        let snapshot = state
            .snapshots
            .remove(id)
            .ok_or_else(|| PreconditionError::NoSnapshot { id: id.to_string() })?;
        replace(&mut state.messages, snapshot.clone())?;
        Ok(snapshot)
    }

    /// Flip a saved message between active and paused inside an edit
    /// session, without persisting.
    pub fn toggle_enabled(&self, id: &str) -> Result<ScheduledMessage, EngineError> {
        let mut state = self.state.lock();
        let msg = find_mut(&mut state.messages, id)?;
        msg.toggle_enabled()?;
        Ok(msg.clone())
    }

    /// Suspend an active message and persist the change.
    pub async fn pause(&self, id: &str) -> Result<ScheduledMessage, EngineError> {
        self.set_enabled(id, false).await
    }

    /// Reactivate a paused message and persist the change.
    pub async fn resume(&self, id: &str) -> Result<ScheduledMessage, EngineError> {
        self.set_enabled(id, true).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<ScheduledMessage, EngineError> {
        let target = if enabled {
            Lifecycle::SavedActive
        } else {
            Lifecycle::SavedPaused
        };

        let working = {
            let state = self.state.lock();
            let msg = find(&state.messages, id)?;
            if msg.lifecycle == target {
                return Ok(msg.clone());
            }
            let mut working = msg.clone();
            if !working.editing {
                working.begin_editing()?;
            }
            working.toggle_enabled()?;
            working.editing = false;
            working
        };

        let _guard = self.begin_save(id)?;
        let stored = to_stored(&working);
        let timer = OpTimer::new("store", if enabled { "resume" } else { "pause" });
        let result = self.transport.persist_message(&stored).await;
        timer.finish_with_result(&result);
        result?;

        let mut state = self.state.lock();
        state.snapshots.remove(id);
        replace(&mut state.messages, working.clone())?;
        Ok(working)
    }

    /// Send a one-off test delivery of a message's current content.
    /// Lifecycle state is unaffected.
    pub async fn test_send(&self, id: &str) -> Result<(), EngineError> {
        let (title, body) = {
            let state = self.state.lock();
            let msg = find(&state.messages, id)?;
            (msg.title.clone(), msg.body.clone())
        };
        let timer = OpTimer::new("store", "test_send");
        let result = self.transport.send_test(&title, &body).await;
        timer.finish_with_result(&result);
        result
    }

    fn begin_save(&self, id: &str) -> Result<SaveGuard<'_>, PreconditionError> {
        let mut in_flight = self.saves_in_flight.lock();
        if !in_flight.insert(id.to_string()) {
            return Err(PreconditionError::SaveInFlight { id: id.to_string() });
        }
        Ok(SaveGuard {
            store: self,
            id: id.to_string(),
        })
    }
}

/// Releases the per-id save slot when the operation finishes, on success and
/// on every error path alike.
struct SaveGuard<'a> {
    store: &'a ScheduleStore,
    id: String,
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.store.saves_in_flight.lock().remove(&self.id);
    }
}

fn find<'a>(
    messages: &'a [ScheduledMessage],
    id: &str,
) -> Result<&'a ScheduledMessage, PreconditionError> {
    messages
        .iter()
        .find(|m| m.id == id)
        .ok_or_else(|| PreconditionError::UnknownMessage { id: id.to_string() })
}

fn find_mut<'a>(
    messages: &'a mut [ScheduledMessage],
    id: &str,
) -> Result<&'a mut ScheduledMessage, PreconditionError> {
    messages
        .iter_mut()
        .find(|m| m.id == id)
        .ok_or_else(|| PreconditionError::UnknownMessage { id: id.to_string() })
}

fn replace(
    messages: &mut [ScheduledMessage],
    updated: ScheduledMessage,
) -> Result<(), PreconditionError> {
    let slot = find_mut(messages, &updated.id)?;
    *slot = updated;
    Ok(())
}

/// Wire status for a record in the given lifecycle state.
///
/// Only an active schedule writes `ACCEPTED`; an accepted-but-unactivated
/// verdict is not persisted, otherwise a reload would activate a message the
/// user chose to keep as a draft. Paused is not representable on the wire at
/// all and goes out as `DRAFT`.
fn storage_status(lifecycle: Lifecycle) -> StorageStatus {
    match lifecycle {
        Lifecycle::SavedActive => StorageStatus::Accepted,
        Lifecycle::ValidatedDenied => StorageStatus::Denied,
        Lifecycle::Draft
        | Lifecycle::ValidatedAccepted
        | Lifecycle::SavedDraft
        | Lifecycle::SavedPaused => StorageStatus::Draft,
    }
}

fn lifecycle_from_status(status: StorageStatus) -> Lifecycle {
    match status {
        StorageStatus::Draft => Lifecycle::SavedDraft,
        StorageStatus::Accepted => Lifecycle::SavedActive,
        StorageStatus::Denied => Lifecycle::ValidatedDenied,
    }
}

fn to_stored(msg: &ScheduledMessage) -> StoredMessage {
    StoredMessage {
        id: msg.id.clone(),
        title: msg.title.clone(),
        message: msg.body.clone(),
        cron: CronFields::encode(msg.recurrence, msg.time).to_string(),
        status: storage_status(msg.lifecycle),
    }
}

/// Decode one stored record into the domain model.
///
/// A record whose cron expression fails to parse is kept in the list as a
/// disabled placeholder carrying [`PARSE_FAILURE_REASON`], so one corrupt
/// row cannot hide the rest of the user's messages.
fn decode_stored(stored: StoredMessage) -> ScheduledMessage {
    let StoredMessage {
        id,
        title,
        message,
        cron,
        status,
    } = stored;

    match cron.parse::<CronFields>().and_then(|fields| fields.decode()) {
        Ok((recurrence, time)) => ScheduledMessage {
            id,
            title,
            body: message,
            recurrence,
            time,
            lifecycle: lifecycle_from_status(status),
            validation_reason: None,
            editing: false,
            persisted: true,
        },
        Err(err) => {
            warn!(id = %id, error = %err, "failed to parse stored schedule, disabling record");
            ScheduledMessage {
                id,
                title,
                body: message,
                recurrence: Recurrence::Weekly { weekday: 0 },
                time: TimeOfDay {
                    hour: 12,
                    minute: 0,
                    meridiem: Meridiem::Pm,
                },
                lifecycle: Lifecycle::SavedDraft,
                validation_reason: Some(PARSE_FAILURE_REASON.to_string()),
                editing: false,
                persisted: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::Operation;
    use crate::scheduler::Verdict;

    fn body_of(len: usize) -> String {
        "x".repeat(len)
    }

    fn weekly_9am() -> (Recurrence, TimeOfDay) {
        (
            Recurrence::Weekly { weekday: 2 },
            TimeOfDay::new(9, 0, Meridiem::Am).unwrap(),
        )
    }

    fn stored(id: &str, cron: &str, status: StorageStatus) -> StoredMessage {
        StoredMessage {
            id: id.to_string(),
            title: format!("title-{id}"),
            message: body_of(120),
            cron: cron.to_string(),
            status,
        }
    }

    fn http_error(operation: Operation) -> EngineError {
        EngineError::Http {
            operation,
            status: 500,
            body: "Internal Server Error".to_string(),
        }
    }

    /// Records every call; backs fetches with a scripted list.
    #[derive(Default)]
    struct RecordingTransport {
        remote: Mutex<Vec<StoredMessage>>,
        fetch_calls: AtomicUsize,
        persist_calls: AtomicUsize,
        delete_calls: AtomicUsize,
        persisted: Mutex<Vec<StoredMessage>>,
        test_sends: Mutex<Vec<(String, String)>>,
        fail_persist: AtomicBool,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl ScheduleTransport for RecordingTransport {
        async fn fetch_messages(&self) -> Result<Vec<StoredMessage>, EngineError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.remote.lock().clone())
        }

        async fn persist_message(&self, message: &StoredMessage) -> Result<(), EngineError> {
            self.persist_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_persist.load(Ordering::SeqCst) {
                return Err(http_error(Operation::Save));
            }
            self.persisted.lock().push(message.clone());
            Ok(())
        }

        async fn delete_message(&self, _id: &str) -> Result<(), EngineError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(http_error(Operation::Delete));
            }
            Ok(())
        }

        async fn send_test(&self, title: &str, body: &str) -> Result<(), EngineError> {
            self.test_sends
                .lock()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Always answers with the configured verdict, counting calls.
    struct ScriptedValidator {
        verdict: Mutex<Verdict>,
        calls: AtomicUsize,
    }

    impl ScriptedValidator {
        fn accepting() -> Self {
            Self {
                verdict: Mutex::new(Verdict::Accepted),
                calls: AtomicUsize::new(0),
            }
        }

        fn denying(reason: &str) -> Self {
            Self {
                verdict: Mutex::new(Verdict::Denied {
                    reason: Some(reason.to_string()),
                }),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentValidator for ScriptedValidator {
        async fn verify(&self, _body: &str) -> Result<Verdict, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.lock().clone())
        }
    }

    struct FailingValidator;

    #[async_trait]
    impl ContentValidator for FailingValidator {
        async fn verify(&self, _body: &str) -> Result<Verdict, EngineError> {
            Err(EngineError::Network {
                operation: Operation::Validate,
                reason: "connection refused".to_string(),
            })
        }
    }

    fn store_with(
        transport: Arc<RecordingTransport>,
        validator: Arc<dyn ContentValidator>,
    ) -> ScheduleStore {
        ScheduleStore::new(transport, validator)
    }

    fn basic_store(transport: Arc<RecordingTransport>) -> ScheduleStore {
        store_with(transport, Arc::new(ScriptedValidator::accepting()))
    }

    #[tokio::test]
    async fn test_create_caps_collection_size() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();

        for i in 0..MAX_MESSAGES {
            let msg = store
                .create(format!("msg {i}"), body_of(120), recurrence, time)
                .unwrap();
            store.save(&msg.id, SaveMode::Draft).await.unwrap();
        }

        let err = store
            .create("one too many", body_of(120), recurrence, time)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::MessageLimitReached)
        ));
        assert_eq!(store.list().len(), MAX_MESSAGES);
    }

    #[test]
    fn test_only_one_unsaved_draft_at_a_time() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(transport);
        let (recurrence, time) = weekly_9am();

        store.create("first", body_of(120), recurrence, time).unwrap();
        let err = store
            .create("second", body_of(120), recurrence, time)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::DraftAlreadyOpen)
        ));
    }

    #[tokio::test]
    async fn test_saving_the_draft_reopens_the_slot() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();

        let first = store.create("first", body_of(120), recurrence, time).unwrap();
        store.save(&first.id, SaveMode::Draft).await.unwrap();

        assert!(store.create("second", body_of(120), recurrence, time).is_ok());
    }

    #[tokio::test]
    async fn test_save_draft_persists_and_marks_record() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();

        let msg = store.create("special", body_of(150), recurrence, time).unwrap();
        let saved = store.save(&msg.id, SaveMode::Draft).await.unwrap();

        assert_eq!(saved.lifecycle, Lifecycle::SavedDraft);
        assert!(saved.persisted);

        let writes = transport.persisted.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].id, msg.id);
        assert_eq!(writes[0].status, StorageStatus::Draft);
        assert_eq!(writes[0].cron, "0 9 * * 2");
    }

    #[tokio::test]
    async fn test_activation_requires_accepted_verdict() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();

        let msg = store.create("special", body_of(150), recurrence, time).unwrap();
        let err = store.save(&msg.id, SaveMode::Activate).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::NotAccepted { .. })
        ));
        assert_eq!(transport.persist_calls.load(Ordering::SeqCst), 0);

        store.validate(&msg.id).await.unwrap();
        let saved = store.save(&msg.id, SaveMode::Activate).await.unwrap();
        assert_eq!(saved.lifecycle, Lifecycle::SavedActive);
        assert_eq!(
            transport.persisted.lock()[0].status,
            StorageStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_body_at_minimum_length_activates() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();

        let msg = store.create("floor", body_of(100), recurrence, time).unwrap();
        store.validate(&msg.id).await.unwrap();
        let saved = store.save(&msg.id, SaveMode::Activate).await.unwrap();

        assert_eq!(saved.lifecycle, Lifecycle::SavedActive);
        assert_eq!(
            transport.persisted.lock()[0].status,
            StorageStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_save_failure_leaves_message_unsaved() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_persist.store(true, Ordering::SeqCst);
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();

        let msg = store.create("special", body_of(150), recurrence, time).unwrap();
        let err = store.save(&msg.id, SaveMode::Draft).await.unwrap_err();
        assert!(matches!(err, EngineError::Http { status: 500, .. }));

        let current = store.get(&msg.id).unwrap();
        assert_eq!(current.lifecycle, Lifecycle::Draft);
        assert!(!current.persisted);
    }

    #[tokio::test]
    async fn test_short_body_validation_makes_no_network_call() {
        let transport = Arc::new(RecordingTransport::default());
        let validator = Arc::new(ScriptedValidator::accepting());
        let store = store_with(transport, validator.clone());
        let (recurrence, time) = weekly_9am();

        let msg = store.create("short", body_of(99), recurrence, time).unwrap();
        let err = store.validate(&msg.id).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::BodyTooShort { len: 99 })
        ));
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_denied_verdict_recorded_with_reason() {
        let transport = Arc::new(RecordingTransport::default());
        let validator = Arc::new(ScriptedValidator::denying("too promotional"));
        let store = store_with(transport, validator);
        let (recurrence, time) = weekly_9am();

        let msg = store.create("salesy", body_of(150), recurrence, time).unwrap();
        let denied = store.validate(&msg.id).await.unwrap();

        assert_eq!(denied.lifecycle, Lifecycle::ValidatedDenied);
        assert_eq!(denied.validation_reason.as_deref(), Some("too promotional"));
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_message_untouched() {
        let transport = Arc::new(RecordingTransport::default());
        let store = store_with(transport, Arc::new(FailingValidator));
        let (recurrence, time) = weekly_9am();

        let msg = store.create("special", body_of(150), recurrence, time).unwrap();
        let err = store.validate(&msg.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Network { .. }));

        let current = store.get(&msg.id).unwrap();
        assert_eq!(current.lifecycle, Lifecycle::Draft);
        assert!(current.validation_reason.is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_record() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("kept", "0 9 * * 2", StorageStatus::Accepted));
        let store = basic_store(Arc::clone(&transport));
        store.load().await.unwrap();

        transport.fail_delete.store(true, Ordering::SeqCst);
        let err = store.delete("kept").await.unwrap_err();
        assert!(matches!(err, EngineError::Http { status: 500, .. }));
        assert!(store.get("kept").is_some());
    }

    #[tokio::test]
    async fn test_delete_success_removes_record() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("gone", "0 9 * * 2", StorageStatus::Draft));
        let store = basic_store(Arc::clone(&transport));
        store.load().await.unwrap();

        store.delete("gone").await.unwrap();
        assert!(store.get("gone").is_none());
        assert_eq!(transport.delete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deleting_unsaved_draft_skips_the_backend() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();

        let msg = store.create("local", body_of(120), recurrence, time).unwrap();
        store.delete(&msg.id).await.unwrap();

        assert!(store.get(&msg.id).is_none());
        assert_eq!(transport.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_maps_statuses_to_lifecycles() {
        let transport = Arc::new(RecordingTransport::default());
        {
            let mut remote = transport.remote.lock();
            remote.push(stored("d", "0 9 * * 1", StorageStatus::Draft));
            remote.push(stored("a", "30 18 * * 5", StorageStatus::Accepted));
            remote.push(stored("x", "0 12 15 * *", StorageStatus::Denied));
        }
        let store = basic_store(transport);
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].lifecycle, Lifecycle::SavedDraft);
        assert_eq!(loaded[1].lifecycle, Lifecycle::SavedActive);
        assert_eq!(loaded[2].lifecycle, Lifecycle::ValidatedDenied);
        assert!(loaded.iter().all(|m| m.persisted));
        assert_eq!(
            loaded[1].time,
            TimeOfDay::new(6, 30, Meridiem::Pm).unwrap()
        );
        assert_eq!(
            loaded[2].recurrence,
            Recurrence::Monthly { day_of_month: 15 }
        );
    }

    #[tokio::test]
    async fn test_unparseable_record_becomes_placeholder() {
        let transport = Arc::new(RecordingTransport::default());
        {
            let mut remote = transport.remote.lock();
            remote.push(stored("bad", "*/5 9 * * 2", StorageStatus::Accepted));
            remote.push(stored("good", "0 9 * * 2", StorageStatus::Accepted));
        }
        let store = basic_store(transport);
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.len(), 2);
        let bad = &loaded[0];
        assert_eq!(bad.lifecycle, Lifecycle::SavedDraft);
        assert_eq!(bad.validation_reason.as_deref(), Some(PARSE_FAILURE_REASON));
        assert_eq!(loaded[1].lifecycle, Lifecycle::SavedActive);
    }

    #[tokio::test]
    async fn test_load_keeps_unsaved_draft() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("remote", "0 9 * * 2", StorageStatus::Draft));
        let store = basic_store(transport);
        let (recurrence, time) = weekly_9am();

        let draft = store.create("local", body_of(120), recurrence, time).unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().any(|m| m.id == draft.id && !m.persisted));
    }

    #[tokio::test]
    async fn test_refresh_inside_window_reuses_cache() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));

        store.load().await.unwrap();
        assert_eq!(transport.fetch_calls.load(Ordering::SeqCst), 1);

        let soon = Utc::now() + Duration::minutes(REFRESH_WINDOW_MINUTES - 1);
        store.refresh_if_stale_at(soon).await.unwrap();
        assert_eq!(transport.fetch_calls.load(Ordering::SeqCst), 1);

        let later = Utc::now() + Duration::minutes(REFRESH_WINDOW_MINUTES + 1);
        store.refresh_if_stale_at(later).await.unwrap();
        assert_eq!(transport.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_loads_when_never_loaded() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));

        store.refresh_if_stale().await.unwrap();
        assert_eq!(transport.fetch_calls.load(Ordering::SeqCst), 1);
    }

    /// First fetch blocks until released, second answers immediately.
    struct OverlappingFetch {
        calls: AtomicUsize,
        first_started: Notify,
        release_first: Notify,
        first: Vec<StoredMessage>,
        second: Vec<StoredMessage>,
    }

    #[async_trait]
    impl ScheduleTransport for OverlappingFetch {
        async fn fetch_messages(&self) -> Result<Vec<StoredMessage>, EngineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.first_started.notify_one();
                self.release_first.notified().await;
                Ok(self.first.clone())
            } else {
                Ok(self.second.clone())
            }
        }

        async fn persist_message(&self, _message: &StoredMessage) -> Result<(), EngineError> {
            Ok(())
        }

        async fn delete_message(&self, _id: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn send_test(&self, _title: &str, _body: &str) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stale_load_response_is_discarded() {
        let transport = Arc::new(OverlappingFetch {
            calls: AtomicUsize::new(0),
            first_started: Notify::new(),
            release_first: Notify::new(),
            first: vec![stored("old", "0 9 * * 1", StorageStatus::Draft)],
            second: vec![stored("new", "0 9 * * 2", StorageStatus::Draft)],
        });
        let store = Arc::new(ScheduleStore::new(
            transport.clone(),
            Arc::new(ScriptedValidator::accepting()),
        ));

        let slow = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.load().await }
        });
        transport.first_started.notified().await;

        // a newer load resolves while the first is still in flight
        let fresh = store.load().await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "new");

        transport.release_first.notify_one();
        let stale = slow.await.unwrap().unwrap();

        // the late response was discarded; both callers see the fresher list
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "new");
        assert_eq!(store.list()[0].id, "new");
    }

    /// Persist blocks until released.
    struct GatedPersist {
        persist_started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ScheduleTransport for GatedPersist {
        async fn fetch_messages(&self) -> Result<Vec<StoredMessage>, EngineError> {
            Ok(Vec::new())
        }

        async fn persist_message(&self, _message: &StoredMessage) -> Result<(), EngineError> {
            self.persist_started.notify_one();
            self.release.notified().await;
            Ok(())
        }

        async fn delete_message(&self, _id: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn send_test(&self, _title: &str, _body: &str) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_second_save_rejected_while_first_in_flight() {
        let transport = Arc::new(GatedPersist {
            persist_started: Notify::new(),
            release: Notify::new(),
        });
        let store = Arc::new(ScheduleStore::new(
            transport.clone(),
            Arc::new(ScriptedValidator::accepting()),
        ));
        let (recurrence, time) = weekly_9am();
        let msg = store.create("slow", body_of(120), recurrence, time).unwrap();
        let id = msg.id.clone();

        let first = tokio::spawn({
            let store = Arc::clone(&store);
            let id = id.clone();
            async move { store.save(&id, SaveMode::Draft).await }
        });
        transport.persist_started.notified().await;

        let err = store.save(&id, SaveMode::Draft).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::SaveInFlight { .. })
        ));

        transport.release.notify_one();
        first.await.unwrap().unwrap();
        assert!(store.get(&id).unwrap().persisted);

        // slot is free again once the first save settles
        let current = store.get(&id).unwrap();
        assert_eq!(current.lifecycle, Lifecycle::SavedDraft);
    }

    #[tokio::test]
    async fn test_edit_session_snapshot_and_rollback() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Draft));
        let store = basic_store(transport);
        store.load().await.unwrap();

        let opened = store.enable_edit("m").unwrap();
        assert!(opened.editing);

        store
            .update(
                "m",
                MessagePatch {
                    title: Some("changed".to_string()),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap();

        // the update committed remotely and closed the session
        let current = store.get("m").unwrap();
        assert_eq!(current.title, "changed");
        assert!(!current.editing);
    }

    #[tokio::test]
    async fn test_cancel_edit_restores_snapshot() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Accepted));
        let store = basic_store(transport);
        store.load().await.unwrap();

        store.enable_edit("m").unwrap();
        store.toggle_enabled("m").unwrap();
        assert_eq!(store.get("m").unwrap().lifecycle, Lifecycle::SavedPaused);

        let restored = store.cancel_edit("m").unwrap();
        assert_eq!(restored.lifecycle, Lifecycle::SavedActive);
        assert!(!store.get("m").unwrap().editing);
    }

    #[test]
    fn test_cancel_edit_without_session_fails() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(transport);
        let (recurrence, time) = weekly_9am();
        let msg = store.create("m", body_of(120), recurrence, time).unwrap();

        let err = store.cancel_edit(&msg.id).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::NoSnapshot { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_requires_edit_session_for_persisted_records() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Draft));
        let store = basic_store(transport);
        store.load().await.unwrap();

        let err = store
            .update(
                "m",
                MessagePatch {
                    title: Some("nope".to_string()),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::NotEditing { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_of_unsaved_draft_stays_local() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();
        let msg = store.create("m", body_of(120), recurrence, time).unwrap();

        let updated = store
            .update(
                &msg.id,
                MessagePatch {
                    body: Some(body_of(130)),
                    time: Some(TimeOfDay::new(7, 30, Meridiem::Pm).unwrap()),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.body_chars(), 130);
        assert!(!updated.persisted);
        assert_eq!(transport.persist_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_body_resets_validation_on_persisted_record() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Accepted));
        let store = basic_store(Arc::clone(&transport));
        store.load().await.unwrap();

        store.enable_edit("m").unwrap();
        let updated = store
            .update(
                "m",
                MessagePatch {
                    body: Some(body_of(160)),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.lifecycle, Lifecycle::Draft);
        let writes = transport.persisted.lock();
        assert_eq!(writes[0].status, StorageStatus::Draft);
    }

    #[tokio::test]
    async fn test_recurrence_switch_swaps_day_fields() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Accepted));
        let store = basic_store(Arc::clone(&transport));
        store.load().await.unwrap();

        // weekly to monthly: the weekday field must come back as a wildcard
        store.enable_edit("m").unwrap();
        let updated = store
            .update(
                "m",
                MessagePatch {
                    recurrence: Some(Recurrence::Monthly { day_of_month: 15 }),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.recurrence, Recurrence::Monthly { day_of_month: 15 });
        assert_eq!(transport.persisted.lock()[0].cron, "0 9 15 * *");

        // and back: the day-of-month field clears again
        store.enable_edit("m").unwrap();
        let updated = store
            .update(
                "m",
                MessagePatch {
                    recurrence: Some(Recurrence::Weekly { weekday: 5 }),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.recurrence, Recurrence::Weekly { weekday: 5 });
        assert_eq!(transport.persisted.lock()[1].cron, "0 9 * * 5");
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_range_schedule_fields() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Accepted));
        let store = basic_store(Arc::clone(&transport));
        store.load().await.unwrap();
        store.enable_edit("m").unwrap();

        // the fields are public, so a patch can carry values the
        // constructors would have refused
        let err = store
            .update(
                "m",
                MessagePatch {
                    recurrence: Some(Recurrence::Monthly { day_of_month: 42 }),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::DayOfMonthOutOfRange { day: 42 })
        ));

        let err = store
            .update(
                "m",
                MessagePatch {
                    time: Some(TimeOfDay {
                        hour: 13,
                        minute: 75,
                        meridiem: Meridiem::Am,
                    }),
                    ..MessagePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::HourOutOfRange { hour: 13 })
        ));

        // nothing was written and the record kept its schedule
        assert!(transport.persisted.lock().is_empty());
        assert_eq!(
            store.get("m").unwrap().recurrence,
            Recurrence::Weekly { weekday: 2 }
        );
    }

    #[tokio::test]
    async fn test_pause_and_resume_round_trip() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Accepted));
        let store = basic_store(Arc::clone(&transport));
        store.load().await.unwrap();

        let paused = store.pause("m").await.unwrap();
        assert_eq!(paused.lifecycle, Lifecycle::SavedPaused);
        // paused is not representable on the wire
        assert_eq!(
            transport.persisted.lock().last().unwrap().status,
            StorageStatus::Draft
        );

        let resumed = store.resume("m").await.unwrap();
        assert_eq!(resumed.lifecycle, Lifecycle::SavedActive);
        assert_eq!(
            transport.persisted.lock().last().unwrap().status,
            StorageStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let transport = Arc::new(RecordingTransport::default());
        transport
            .remote
            .lock()
            .push(stored("m", "0 9 * * 2", StorageStatus::Accepted));
        let store = basic_store(Arc::clone(&transport));
        store.load().await.unwrap();

        store.pause("m").await.unwrap();
        store.pause("m").await.unwrap();
        assert_eq!(transport.persist_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pause_rejected_for_unsaved_draft() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(transport);
        let (recurrence, time) = weekly_9am();
        let msg = store.create("m", body_of(120), recurrence, time).unwrap();

        let err = store.pause(&msg.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Precondition(PreconditionError::NotPersisted { .. })
        ));
    }

    #[tokio::test]
    async fn test_test_send_passes_content_through() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(Arc::clone(&transport));
        let (recurrence, time) = weekly_9am();
        let msg = store.create("Promo", body_of(120), recurrence, time).unwrap();

        store.test_send(&msg.id).await.unwrap();

        let sends = transport.test_sends.lock();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "Promo");
        assert_eq!(sends[0].1, body_of(120));
    }

    #[test]
    fn test_unknown_id_is_rejected() {
        let transport = Arc::new(RecordingTransport::default());
        let store = basic_store(transport);
        assert!(store.get("missing").is_none());
        assert!(matches!(
            store.enable_edit("missing").unwrap_err(),
            EngineError::Precondition(PreconditionError::UnknownMessage { .. })
        ));
    }

    #[test]
    fn test_storage_status_mapping() {
        assert_eq!(storage_status(Lifecycle::SavedActive), StorageStatus::Accepted);
        assert_eq!(storage_status(Lifecycle::ValidatedDenied), StorageStatus::Denied);
        assert_eq!(storage_status(Lifecycle::SavedDraft), StorageStatus::Draft);
        assert_eq!(storage_status(Lifecycle::SavedPaused), StorageStatus::Draft);
        assert_eq!(storage_status(Lifecycle::Draft), StorageStatus::Draft);
        assert_eq!(
            storage_status(Lifecycle::ValidatedAccepted),
            StorageStatus::Draft
        );
    }

    #[test]
    fn test_lifecycle_from_status_mapping() {
        assert_eq!(
            lifecycle_from_status(StorageStatus::Draft),
            Lifecycle::SavedDraft
        );
        assert_eq!(
            lifecycle_from_status(StorageStatus::Accepted),
            Lifecycle::SavedActive
        );
        assert_eq!(
            lifecycle_from_status(StorageStatus::Denied),
            Lifecycle::ValidatedDenied
        );
    }

    #[test]
    fn test_paused_decodes_as_saved_draft() {
        // pause survives a save but not a reload; the wire has no paused state
        let (recurrence, time) = weekly_9am();
        let mut msg =
            ScheduledMessage::draft("m", body_of(120), recurrence, time).unwrap();
        msg.complete_save(Lifecycle::SavedPaused);

        let decoded = decode_stored(to_stored(&msg));
        assert_eq!(decoded.lifecycle, Lifecycle::SavedDraft);
    }
}
