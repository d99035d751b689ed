//! Durable stores for runs and result sessions.
//!
//! Both are JSON documents on local disk, each guarded by a single mutex for
//! the whole read-modify-write critical section.

mod json;
mod runs;
mod sessions;

pub use json::StoreError;
pub(crate) use json::{load_document, save_document};
pub use runs::{RunDocument, RunStore};
pub use sessions::{SessionDocument, SessionStore};
