//! Extension manifest parsing and validation.
//!
//! Each extension directory carries a `manifest.json` declaring identity,
//! entry point, permissions, dependencies, and default configuration.
//! Required fields: `id`, `name`, `version`, `entry`. Everything else
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::Permission;
use crate::error::{ExtensionError, ExtensionResult};

/// Manifest file name inside an extension directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A parsed extension manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionManifest {
    /// Globally unique id; loading a duplicate id is rejected.
    pub id: String,
    pub name: String,
    /// Semver version string.
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: Option<String>,
    /// Names the registered factory that constructs this extension.
    pub entry: String,
    /// Whether the extension should load on startup.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form category tag surfaced in the management UI.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Capability permissions this extension requests.
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Ids of extensions that must be active before this one loads.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Default configuration, seeded into the settings store on first load.
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

/// Validate an extension id against `^[a-z][a-z0-9-]{1,63}$`.
///
/// Ids name settings namespaces, route prefixes, and channel namespaces, so
/// the alphabet is deliberately narrow.
fn validate_id(id: &str) -> ExtensionResult<()> {
    let len = id.len();
    if !(2..=64).contains(&len) {
        return Err(ExtensionError::Manifest(format!(
            "id must be 2-64 characters, got {len}"
        )));
    }
    let mut chars = id.chars();
    let first = chars.next().expect("length checked above");
    if !first.is_ascii_lowercase() {
        return Err(ExtensionError::Manifest(format!(
            "id must start with a lowercase letter, got '{first}'"
        )));
    }
    for ch in chars {
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' {
            return Err(ExtensionError::Manifest(format!(
                "id contains invalid character '{ch}'"
            )));
        }
    }
    Ok(())
}

impl ExtensionManifest {
    /// Parses a manifest from a JSON string. Missing required fields are a
    /// parse error; everything else is checked by [`validate`](Self::validate).
    pub fn parse(json: &str) -> ExtensionResult<Self> {
        let manifest: ExtensionManifest =
            serde_json::from_str(json).map_err(|e| ExtensionError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reads and parses `manifest.json` from an extension directory.
    pub fn load(dir: &Path) -> ExtensionResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            ExtensionError::Manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Validates all fields of a parsed manifest.
    pub fn validate(&self) -> ExtensionResult<()> {
        validate_id(&self.id)?;

        if self.name.trim().is_empty() {
            return Err(ExtensionError::Manifest("name must not be empty".into()));
        }

        semver::Version::parse(&self.version).map_err(|_| {
            ExtensionError::Manifest(format!("version is not valid semver: '{}'", self.version))
        })?;

        if self.entry.trim().is_empty() || self.entry.contains(char::is_whitespace) {
            return Err(ExtensionError::Manifest(format!(
                "entry must be a non-empty identifier, got '{}'",
                self.entry
            )));
        }

        if self.dependencies.iter().any(|dep| dep == &self.id) {
            return Err(ExtensionError::Manifest(
                "an extension cannot depend on itself".into(),
            ));
        }

        Ok(())
    }

    /// Settings-store namespace for this extension's configuration.
    pub fn config_namespace(&self) -> String {
        format!("ext:{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "id": "greeter",
            "name": "Greeter",
            "version": "1.0.0",
            "entry": "greeter",
        })
    }

    #[test]
    fn minimal_manifest_parses_with_defaults() {
        let manifest = ExtensionManifest::parse(&minimal().to_string()).unwrap();
        assert!(manifest.enabled);
        assert!(manifest.permissions.is_empty());
        assert!(manifest.dependencies.is_empty());
        assert_eq!(manifest.config_namespace(), "ext:greeter");
    }

    #[test]
    fn missing_required_field_is_a_manifest_error() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("entry");
        assert!(matches!(
            ExtensionManifest::parse(&value.to_string()),
            Err(ExtensionError::Manifest(_))
        ));
    }

    #[test]
    fn rejects_bad_ids() {
        for id in ["X", "UPPER", "has space", "1starts-with-digit", "a"] {
            let mut value = minimal();
            value["id"] = json!(id);
            assert!(
                ExtensionManifest::parse(&value.to_string()).is_err(),
                "id '{id}' should be rejected"
            );
        }
    }

    #[test]
    fn rejects_bad_semver() {
        let mut value = minimal();
        value["version"] = json!("one point oh");
        assert!(ExtensionManifest::parse(&value.to_string()).is_err());
    }

    #[test]
    fn rejects_self_dependency() {
        let mut value = minimal();
        value["dependencies"] = json!(["greeter"]);
        assert!(ExtensionManifest::parse(&value.to_string()).is_err());
    }

    #[test]
    fn parses_permissions() {
        let mut value = minimal();
        value["permissions"] = json!(["events", "config", "broadcast"]);
        let manifest = ExtensionManifest::parse(&value.to_string()).unwrap();
        assert_eq!(manifest.permissions.len(), 3);
        assert!(manifest.permissions.contains(&Permission::Events));
    }
}
