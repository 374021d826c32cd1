//! Utility modules: id generation, retry, timeout.

pub mod id;
pub mod retry;
pub mod timeout;
