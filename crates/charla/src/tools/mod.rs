//! Tools the model can call, and the registry that dispatches them.
//!
//! [`core`] defines the [`Tool`] trait and the schema-validating
//! [`ToolRegistry`]; the sibling modules hold the built-in tools. Most
//! deployments just call [`default_registry`].

pub mod clock;
pub mod core;
pub mod disk;
pub mod math;
pub mod web;
pub mod weather;

pub use self::core::{TOOL_NOT_FOUND, Tool, ToolFuture, ToolRegistry};
pub use clock::CurrentTime;
pub use disk::{ListLocalDir, ReadFile, WriteFile};
pub use math::MathOperations;
pub use weather::WeatherForecast;
pub use web::BrowseWebsite;

use crate::AgentError;
use std::path::Path;

/// Build a registry with every built-in tool.
///
/// Disk tools operate under `data_root`; the weather tool is registered
/// only when an OpenWeatherMap API key is supplied.
pub fn default_registry(
    data_root: impl AsRef<Path>,
    weather_api_key: Option<String>,
) -> Result<ToolRegistry, AgentError> {
    let root = data_root.as_ref();
    let mut registry = ToolRegistry::new()
        .with(CurrentTime)
        .with(MathOperations)
        .with(BrowseWebsite::new()?)
        .with(WriteFile::new(root))
        .with(ReadFile::new(root))
        .with(ListLocalDir::new(root));
    if let Some(key) = weather_api_key {
        registry.register(WeatherForecast::new(key)?);
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_without_weather_key() {
        let registry = default_registry("data", None).unwrap();
        assert_eq!(registry.len(), 6);
        let names: Vec<String> = registry
            .definitions()
            .iter()
            .map(|d| d.function.name.clone())
            .collect();
        assert!(!names.contains(&"get_weather_forecast".to_string()));
    }

    #[test]
    fn default_registry_with_weather_key() {
        let registry = default_registry("data", Some("key".into())).unwrap();
        assert_eq!(registry.len(), 7);
    }
}
