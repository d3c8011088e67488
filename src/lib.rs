pub mod cli;
pub mod collector;
pub mod config;
pub mod conflict;
pub mod emitter;
pub mod model;
pub mod placement;
pub mod registry;
pub mod resolver;
pub mod tree;

mod api;

pub use api::{Agentpack, AgentpackBuilder, CompileOptions, LockMode};
