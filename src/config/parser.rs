use crate::config::types::Policy;
use crate::error::{Result, SftrError};
use std::path::Path;

/// Parse a policy file from the given path.
///
/// Files ending in `.toml` are read as TOML; anything else is YAML.
pub fn parse_policy_file(path: &Path) -> Result<Policy> {
	let content = std::fs::read_to_string(path).map_err(|source| SftrError::ConfigReadError {
		path: path.to_path_buf(),
		source,
	})?;

	if path.extension().is_some_and(|ext| ext == "toml") {
		parse_policy_toml(&content, path)
	} else {
		parse_policy_str(&content, path)
	}
}

/// Parse a YAML policy from a string (useful for testing).
pub fn parse_policy_str(content: &str, path: &Path) -> Result<Policy> {
	// An empty document deserializes as null; treat it as an empty policy.
	if content.trim().is_empty() {
		return Ok(Policy::default());
	}

	serde_yaml::from_str(content).map_err(|source| SftrError::ConfigParseError {
		path: path.to_path_buf(),
		source,
	})
}

/// Parse a TOML policy from a string.
pub fn parse_policy_toml(content: &str, path: &Path) -> Result<Policy> {
	toml::from_str(content).map_err(|source| SftrError::ConfigParseTomlError {
		path: path.to_path_buf(),
		source,
	})
}
