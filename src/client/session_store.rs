use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::travel_data::TravelDataRecord;
use crate::util::lock::{rw_read, rw_write};

use super::api::{ClientError, TravelDataSource};
use super::storage::SessionIdStorage;

/// Rows requested by the initial load of a session.
pub const INITIAL_LOAD_PAGE_SIZE: u32 = 1000;

const LOCK_TARGET: &str = "client::session_store";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No session is selected.
    NoSession,
    /// Rows were already present; nothing was fetched.
    AlreadyLoaded,
    /// The fetched page replaced the local rows.
    Loaded(usize),
    /// The session changed while the fetch was in flight; the result was dropped.
    Superseded,
}

/// A confirmed local change, replayed onto pages fetched while it happened.
#[derive(Debug, Clone)]
enum LocalEdit {
    Add(TravelDataRecord),
    Update(TravelDataRecord),
    Remove(Uuid),
}

impl LocalEdit {
    fn apply(self, records: &mut Vec<TravelDataRecord>) -> bool {
        match self {
            LocalEdit::Add(record) => {
                match records.iter_mut().find(|row| row.id == record.id) {
                    Some(row) => *row = record,
                    None => records.insert(0, record),
                }
                true
            }
            LocalEdit::Update(record) => match records.iter_mut().find(|row| row.id == record.id) {
                Some(row) => {
                    *row = record;
                    true
                }
                None => false,
            },
            LocalEdit::Remove(id) => {
                let before = records.len();
                records.retain(|row| row.id != id);
                records.len() != before
            }
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session_id: Option<String>,
    records: Vec<TravelDataRecord>,
    generation: u64,
    /// Fetches currently running; edits are only logged while this is non-zero.
    in_flight: usize,
    edits: Vec<LocalEdit>,
}

impl SessionState {
    fn edit(&mut self, edit: LocalEdit) -> bool {
        if self.in_flight > 0 {
            self.edits.push(edit.clone());
        }
        edit.apply(&mut self.records)
    }
}

/// Local view of the active upload session's rows.
pub struct SessionDataStore {
    source: Arc<dyn TravelDataSource>,
    storage: Arc<dyn SessionIdStorage>,
    state: RwLock<SessionState>,
}

impl SessionDataStore {
    /// Restore the persisted session id. Rows start empty.
    pub fn open(
        source: Arc<dyn TravelDataSource>,
        storage: Arc<dyn SessionIdStorage>,
    ) -> Result<Self, ClientError> {
        let session_id = storage.load()?;
        Ok(Self {
            source,
            storage,
            state: RwLock::new(SessionState {
                session_id,
                ..SessionState::default()
            }),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        rw_read(&self.state, LOCK_TARGET, "session_id")
            .session_id
            .clone()
    }

    pub fn items(&self) -> Vec<TravelDataRecord> {
        rw_read(&self.state, LOCK_TARGET, "items").records.clone()
    }

    /// Persist the new id and drop rows belonging to the previous session.
    pub fn set_session_id(&self, session_id: Option<String>) -> Result<(), ClientError> {
        self.storage.store(session_id.as_deref())?;
        let mut state = rw_write(&self.state, LOCK_TARGET, "set_session_id");
        state.session_id = session_id;
        state.records.clear();
        state.edits.clear();
        state.generation += 1;
        Ok(())
    }

    /// Replace the row with the same id. Returns `false` when it is not held locally.
    pub fn update_item(&self, record: TravelDataRecord) -> bool {
        rw_write(&self.state, LOCK_TARGET, "update_item").edit(LocalEdit::Update(record))
    }

    pub fn remove_item(&self, id: Uuid) -> bool {
        rw_write(&self.state, LOCK_TARGET, "remove_item").edit(LocalEdit::Remove(id))
    }

    /// Newest rows come first, matching the list endpoint.
    pub fn add_item(&self, record: TravelDataRecord) {
        rw_write(&self.state, LOCK_TARGET, "add_item").edit(LocalEdit::Add(record));
    }

    /// Fetch page 1 only when a session is selected and no rows are held.
    pub async fn load_if_empty(&self) -> Result<LoadOutcome, ClientError> {
        let (session_id, generation) = {
            let state = rw_read(&self.state, LOCK_TARGET, "load_if_empty");
            let Some(session_id) = state.session_id.clone() else {
                return Ok(LoadOutcome::NoSession);
            };
            if !state.records.is_empty() {
                return Ok(LoadOutcome::AlreadyLoaded);
            }
            (session_id, state.generation)
        };
        self.fetch_into(session_id, generation).await
    }

    /// Always fetch page 1, replacing whatever is held.
    pub async fn refetch(&self) -> Result<LoadOutcome, ClientError> {
        let (session_id, generation) = {
            let state = rw_read(&self.state, LOCK_TARGET, "refetch");
            let Some(session_id) = state.session_id.clone() else {
                return Ok(LoadOutcome::NoSession);
            };
            (session_id, state.generation)
        };
        self.fetch_into(session_id, generation).await
    }

    async fn fetch_into(
        &self,
        session_id: String,
        generation: u64,
    ) -> Result<LoadOutcome, ClientError> {
        let in_flight = InFlight::begin(&self.state);
        let page = self
            .source
            .fetch_page(&session_id, 1, INITIAL_LOAD_PAGE_SIZE)
            .await?;

        let mut state = rw_write(&self.state, LOCK_TARGET, "fetch_into");
        let edits = state.edits[in_flight.mark.min(state.edits.len())..].to_vec();
        if state.generation != generation {
            debug!(
                target = "ledgerdesk::client",
                session_id = %session_id,
                "session changed during load, discarding page"
            );
            return Ok(LoadOutcome::Superseded);
        }
        let mut records = page.data;
        let fetched = records.len();
        for edit in edits {
            edit.apply(&mut records);
        }
        let loaded = records.len();
        state.records = records;
        if page.total > fetched as u64 {
            warn!(
                target = "ledgerdesk::client",
                session_id = %session_id,
                total = page.total,
                loaded = fetched,
                "session holds more rows than the initial page"
            );
        }
        Ok(LoadOutcome::Loaded(loaded))
    }

    /// Run [`Self::load_if_empty`] in the background. Dropping the guard
    /// cancels a fetch that has not finished.
    pub fn spawn_initial_load(self: &Arc<Self>) -> LoadGuard {
        let store = Arc::clone(self);
        LoadGuard {
            handle: Some(tokio::spawn(async move { store.load_if_empty().await })),
        }
    }
}

/// Registers a running fetch so edits made meanwhile are logged. Dropping it,
/// including when the fetch is aborted, clears the log once no fetch remains.
struct InFlight<'a> {
    state: &'a RwLock<SessionState>,
    mark: usize,
}

impl<'a> InFlight<'a> {
    fn begin(state: &'a RwLock<SessionState>) -> Self {
        let mut guard = rw_write(state, LOCK_TARGET, "fetch_begin");
        guard.in_flight += 1;
        let mark = guard.edits.len();
        Self { state, mark }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut guard = rw_write(self.state, LOCK_TARGET, "fetch_end");
        guard.in_flight = guard.in_flight.saturating_sub(1);
        if guard.in_flight == 0 {
            guard.edits.clear();
        }
    }
}

#[must_use = "dropping the guard cancels the load"]
pub struct LoadGuard {
    handle: Option<JoinHandle<Result<LoadOutcome, ClientError>>>,
}

impl LoadGuard {
    /// Wait for the load to finish.
    pub async fn wait(mut self) -> Result<LoadOutcome, ClientError> {
        let Some(handle) = self.handle.take() else {
            return Err(ClientError::Task("load already consumed".to_string()));
        };
        handle
            .await
            .map_err(|err| ClientError::Task(err.to_string()))?
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
