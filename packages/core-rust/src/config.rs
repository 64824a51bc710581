use serde::{Deserialize, Serialize};

/// Generator-level configuration: marker names recognized on declared
/// surfaces and the naming conventions applied to synthesized methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Attribute carrying operation kinds on domain methods
    /// (`#[factory(fetch, remote)]`) and marking factory types.
    pub factory_marker: String,
    /// Attribute carrying governed operations on policy methods and the
    /// policy association on domain types.
    pub authorize_marker: String,
    /// Parameter attribute marking an injected parameter.
    pub service_marker: String,
    /// Type-level attribute marking save-state tracking.
    pub save_state_marker: String,
    /// Type names (last path segment) treated as injected pass-through
    /// parameters without an explicit marker.
    pub passthrough_types: Vec<String>,
    /// Base name of synthesized save methods.
    pub save_name: String,
    /// Prefix of synthesized authorization probes.
    pub probe_prefix: String,
    /// Prefix of the non-throwing save variant.
    pub try_prefix: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            factory_marker: "factory".to_string(),
            authorize_marker: "authorize".to_string(),
            service_marker: "service".to_string(),
            save_state_marker: "save_state".to_string(),
            passthrough_types: vec!["CancellationToken".to_string()],
            save_name: "save".to_string(),
            probe_prefix: "can_".to_string(),
            try_prefix: "try_".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_config_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.factory_marker, "factory");
        assert_eq!(config.service_marker, "service");
        assert_eq!(config.save_name, "save");
        assert_eq!(config.probe_prefix, "can_");
        assert_eq!(config.try_prefix, "try_");
        assert_eq!(config.passthrough_types, vec!["CancellationToken"]);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: GeneratorConfig =
            serde_json::from_str(r#"{ "probe_prefix": "may_" }"#).unwrap();
        assert_eq!(config.probe_prefix, "may_");
        assert_eq!(config.try_prefix, "try_");
    }
}
