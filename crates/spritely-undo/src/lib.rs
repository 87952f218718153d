#![forbid(unsafe_code)]

//! Undo/redo engine for the Spritely document model.
//!
//! # Role in Spritely
//! `spritely-undo` records reversible, typed modifications to a document's
//! object graph and replays them bidirectionally. Every recorded mutation
//! is stored as a self-contained binary chunk whose inversion re-encodes
//! the opposite chunk before touching live state, so arbitrary undo/redo
//! sequences restore document state byte for byte.
//!
//! # Primary responsibilities
//! - **ObjectsContainer**: arena owning every document object behind a
//!   stable numeric id.
//! - **Chunk codecs**: one encoder/inverter pair per action kind.
//! - **UndoStream**: ordered chunk list with total memory accounting.
//! - **UndoHistory**: dual-stream controller handling grouping, saved-state
//!   tracking, and budget-driven eviction of the oldest actions.
//!
//! # How it fits in the system
//! Editor code calls `record_*` before mutating the document, then
//! [`UndoHistory::undo`]/[`UndoHistory::redo`] to traverse the edit
//! timeline. The engine borrows the container only for the duration of
//! each call; chunks reference objects by id and tolerate objects deleted
//! between recording and inversion.

pub mod chunk;
mod chunks;
pub mod config;
pub mod cursor;
pub mod error;
pub mod history;
pub mod objects;
mod raw;
pub mod stream;

pub use chunk::{Chunk, ChunkKind};
pub use config::UndoConfig;
pub use error::{Result, UndoError};
pub use history::UndoHistory;
pub use objects::{Object, ObjectsContainer};
pub use stream::UndoStream;

pub use spritely_raster::ObjectId;
