//! Agentflow client
//!
//! Async client for the agent and flow automation backend. It runs
//! parameterized flows with live progress, tracks executions to completion,
//! and keeps an agent's conversation history in sync with the server.
//!
//! # Architecture
//!
//! - **Stream consumer**: turns the SSE body of a flow execution into typed
//!   events; transport failures become a final failed event pair
//! - **Execution poller**: background task with backoff that watches an
//!   execution until it reaches a terminal status
//! - **Thread reconciler**: merges the server thread list with a locally
//!   created thread without ever listing an id twice
//!
//! # Modules
//!
//! - [`client`]: HTTP client and per-backend API accessors
//! - [`flows`]: flow, run and execution types plus their endpoints
//! - [`stream`]: SSE decoding for flow executions and agent runs
//! - [`polling`]: execution status poller
//! - [`threads`]: conversation threads and the reconciler
//! - [`agents`]: custom agents (assistants), model presets, tool services
//! - [`config`]: layered configuration
//! - [`cli`]: command-line front end

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod agents;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod flows;
pub mod polling;
pub mod stream;
pub mod text;
pub mod threads;

pub use client::Client;
pub use error::{Error, Result};
