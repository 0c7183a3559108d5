//! Optimistic reconciliation: a confirmed base, a queue of local patches, and
//! the machinery that keeps them in step with an authority.

mod events;
mod memory;
mod session;
mod sink;
mod state;

pub use events::{ReconciliationConflict, RemoteEvent, RemoteEventError};
pub use memory::MemoryStore;
pub use session::{DocumentSession, SessionConfig, SessionError, SessionEvent};
pub use sink::{CommitError, CommitResult, MutationResult, PatchOptions, TransactionSink};
pub use state::WorkingState;
