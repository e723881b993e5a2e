// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! LABGATE Session Layer
//! Browser sessions, the upstream tokens they hold and their connection state.

mod manager;
mod store;
mod types;

pub use manager::SessionManager;
pub use store::{MemoryStore, SessionStore};
pub use types::{Session, SessionRecord, UpstreamToken};
