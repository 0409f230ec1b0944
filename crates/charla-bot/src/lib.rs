//! Telegram webhook transport for the charla agent runtime.
//!
//! The library half holds the axum router and Telegram types so the
//! integration tests can exercise the endpoints; the binary wires them to
//! an [`Agent`](charla::agent::Agent) worker.
//!
//! Incoming updates are acknowledged immediately and queued on an mpsc
//! channel; a single worker consumes the queue, so turns are processed one
//! at a time and concurrent updates for the same chat can never race on the
//! persisted history.

pub mod server;
pub mod telegram;

pub use server::{build_router, start_server};
pub use telegram::{TelegramSender, Update, escape_markdown};
