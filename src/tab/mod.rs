//! Tab-side data structures.
//!
//! - [`item`]: items (MIME payload maps) and their typed sync metadata
//! - [`model`]: the ordered, observable tab model with its mute gate

pub mod item;
pub mod model;

pub use item::{ItemData, SyncMeta};
pub use model::{ModelGate, ModelId, RowEvent, RowId, SharedModel, TabModel};
