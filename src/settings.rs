//! Engine settings and the resolver that normalizes them.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings as supplied by the caller, before normalization.
///
/// Every field is optional in a settings file:
///
/// ```toml
/// default_action = false
/// path_as_array = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    /// Always perform the underlying operation; callbacks only observe.
    pub default_action: Option<bool>,
    /// Attach operations that happen during a call to that call's event.
    pub contain_function_events: bool,
    /// Deliver paths as segment lists instead of strings.
    pub path_as_array: bool,
}

impl RawSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_action(mut self, enabled: bool) -> Self {
        self.default_action = Some(enabled);
        self
    }

    pub fn contain_function_events(mut self, enabled: bool) -> Self {
        self.contain_function_events = enabled;
        self
    }

    pub fn path_as_array(mut self, enabled: bool) -> Self {
        self.path_as_array = enabled;
        self
    }

    pub fn from_toml_str(source: &str) -> Result<Self, EngineError> {
        toml::from_str(source).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Normalize into effective settings.
    ///
    /// `default_action` defaults to true. Buffering call events only applies
    /// while the real call runs, so it is turned off without default action.
    pub fn resolve(&self) -> Settings {
        let default_action = self.default_action.unwrap_or(true);
        Settings {
            default_action,
            contain_function_events: default_action && self.contain_function_events,
            path_as_array: self.path_as_array,
        }
    }
}

/// Effective settings, fixed for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub default_action: bool,
    pub contain_function_events: bool,
    pub path_as_array: bool,
}

impl Settings {
    /// Take the flags literally, without normalization. An absent
    /// `default_action` counts as false. Used by handler-mode engines.
    pub fn unresolved(raw: &RawSettings) -> Self {
        Self {
            default_action: raw.default_action.unwrap_or(false),
            contain_function_events: raw.contain_function_events,
            path_as_array: raw.path_as_array,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        RawSettings::default().resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_to_default_action() {
        let settings = Settings::default();
        assert!(settings.default_action);
        assert!(!settings.contain_function_events);
        assert!(!settings.path_as_array);
    }

    #[test]
    fn containment_requires_default_action() {
        let settings = RawSettings::new()
            .default_action(false)
            .contain_function_events(true)
            .resolve();
        assert!(!settings.default_action);
        assert!(!settings.contain_function_events);

        let settings = RawSettings::new().contain_function_events(true).resolve();
        assert!(settings.contain_function_events);
    }

    #[test]
    fn unresolved_keeps_flags_literal() {
        let raw = RawSettings::new().contain_function_events(true);
        let settings = Settings::unresolved(&raw);
        assert!(!settings.default_action);
        assert!(settings.contain_function_events);
    }

    #[test]
    fn parses_toml() {
        let raw = RawSettings::from_toml_str("default_action = false\npath_as_array = true\n")
            .expect("parse");
        assert_eq!(raw.default_action, Some(false));
        assert!(raw.path_as_array);
        assert!(!raw.contain_function_events);

        assert!(matches!(
            RawSettings::from_toml_str("default_action = \"yes\""),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "contain_function_events = true").expect("write");

        let raw = RawSettings::load(file.path()).expect("load");
        assert!(raw.contain_function_events);
        assert_eq!(raw.default_action, None);
    }
}
