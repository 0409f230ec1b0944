//! Agent runtime: the bounded tool-calling loop and its configuration.
//!
//! - [`turn::Agent`] — the loop itself. Start here.
//! - [`config::TurnConfig`] — model, sampling, iteration budget, purge and
//!   compression thresholds.

pub mod config;
pub mod turn;

pub use config::TurnConfig;
pub use turn::{Agent, BUDGET_EXCEEDED_REPLY, ToolInvocation, TurnOutcome, TurnState};
