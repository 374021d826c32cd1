//! Agents: one model call wrapped in hooks, side effects and persistence.

pub mod agent;
pub mod hooks;

pub use agent::{Agent, Verbosity};
pub use hooks::{FinallyHookFn, MessageHookFn};
