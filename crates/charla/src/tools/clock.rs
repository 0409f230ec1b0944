//! Current date and time.

use crate::tools::core::{Tool, ToolFuture};
use crate::{ToolDef, json_schema_for};
use chrono::Local;
use schemars::JsonSchema;
use serde::Deserialize;

/// No arguments; present so the declared schema is still an object.
#[derive(Deserialize, JsonSchema)]
pub struct CurrentTimeArgs {}

/// Report the host's local date and time.
pub struct CurrentTime;

impl Tool for CurrentTime {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "get_current_time",
            "Returns today's date and time in the server's local timezone. \
             Translate it to a human friendly format.",
            json_schema_for::<CurrentTimeArgs>(),
        )
    }

    fn invoke(&self, _arguments: &serde_json::Value) -> ToolFuture<'_> {
        Box::pin(async { Ok(Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()) })
    }
}
