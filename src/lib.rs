//! hyv: pipelines of JSON-speaking agents.
//!
//! An [`Agent`](agent::Agent) wraps one model call in `before`/`after`
//! hooks, fires side effects for matching output fields, and persists the
//! result in a store. Pipelines chain agents by message id.
//!
//! # Quick Start
//!
//! ```no_run
//! use hyv::prelude::*;
//! use hyv::model::{GptModelAdapter, GptOptions};
//! use hyv::side_effect::FileWriter;
//!
//! # async fn example() -> hyv::error::Result<()> {
//! let config = HyvConfig::from_env();
//! let model = GptModelAdapter::from_config(&config, GptOptions::default())?;
//! let agent = Agent::new(model).with_side_effect(FileWriter::new("out"));
//!
//! let stored = agent.assign(Message::new().with("question", "Write a haiku")).await?;
//! println!("{}: {}", stored.id, stored.message);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod side_effect;
pub mod store;
pub mod types;
pub mod util;
