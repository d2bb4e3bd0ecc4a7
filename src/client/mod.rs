//! Client-side view of one upload session's travel data.
//!
//! [`SessionDataStore`] holds the rows a front end renders. Its mutators only
//! touch local state; callers confirm a write through [`HttpTravelDataSource`]
//! first and then reflect the confirmed record locally.

mod api;
mod session_store;
mod storage;

pub use api::{ClientError, HttpTravelDataSource, TravelDataSource};
pub use session_store::{INITIAL_LOAD_PAGE_SIZE, LoadGuard, LoadOutcome, SessionDataStore};
pub use storage::{FileSessionStorage, MemorySessionStorage, SESSION_ID_KEY, SessionIdStorage};
