//! Typed errors for the agent core.
//!
//! Only failures the loop cannot recover from locally become an
//! [`AgentError`]: a transport failure, an endpoint rejection, or an
//! undecodable response. Tool failures are recovered in place (they become
//! `tool` message content), and persistence failures are logged without
//! failing the user-facing turn.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The model endpoint could not be reached or the request did not
    /// complete. The turn is aborted: the loop cannot synthesize a
    /// plausible continuation without a response.
    #[error("model endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("model endpoint returned HTTP {status}: {body}")]
    Endpoint { status: u16, body: String },

    /// The endpoint's response body could not be decoded.
    #[error("failed to decode model response: {0}")]
    Decode(#[from] serde_json::Error),
}
