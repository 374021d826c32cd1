//! Convenience re-exports for common use.

pub use crate::agent::{Agent, Verbosity};
pub use crate::config::HyvConfig;
pub use crate::error::{HyvError, Result};
pub use crate::model::ModelAdapter;
pub use crate::pipeline::{get_result, sequence, sequence_in, sprint, sprint_in};
pub use crate::side_effect::{SideEffect, SideEffectPolicy, SideEffects};
pub use crate::store::{FsStore, MemoryStore, StoreAdapter};
pub use crate::types::{Message, StoredMessage};
