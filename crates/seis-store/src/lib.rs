//! Shared entity store for the seismic analysis working cache.
//!
//! One store instance is the authoritative copy of every event and signal
//! detection. Sessions read through it and commit into it; it never
//! interprets what it holds.
//!
//! # Storage Backends
//!
//! All backends implement the [`SharedStore`] trait:
//!
//! - [`InMemorySharedStore`] -- `HashMap`-based, single-process store
//!
//! # Design Rules
//!
//! 1. Last write wins per `(kind, id)`. No concurrency token is checked.
//! 2. The only validation is a well-formed (non-nil) id.
//! 3. Conflicts between analysts are a property of associations, not of the store.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemorySharedStore;
pub use traits::SharedStore;
