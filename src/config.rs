//! Configuration file parsing
//!
//! Reads formatted-changelog.toml configuration files.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub changelog: ChangeLogConfig,

    /// Parameters registered with the expander before parsing begins,
    /// as if each had appeared in a `property` directive at the top of
    /// the root changelog.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChangeLogConfig {
    /// Base directory that relative changelog/resource paths resolve
    /// against.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Host-language dialect to parse directives for. Only "sql" is
    /// implemented.
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// What to do with a `${name}` token that has no registered value:
    /// "leave" keeps the token verbatim, "error" fails the parse.
    #[serde(default = "default_unresolved_parameter_policy")]
    pub unresolved_parameter_policy: String,
}

impl Default for ChangeLogConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            dialect: default_dialect(),
            unresolved_parameter_policy: default_unresolved_parameter_policy(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_dialect() -> String {
    "sql".to_string()
}

fn default_unresolved_parameter_policy() -> String {
    "leave".to_string()
}

/// Valid section names for `--explain-config`.
const VALID_SECTIONS: &[&str] = &["changelog", "parameters"];

const SECTION_CHANGELOG: &str = "\
[changelog]

  base_dir = \".\"
    Base directory that relative changelog/resource paths resolve against.
    Type: path
    Default: \".\"

  dialect = \"sql\"
    Host-language dialect to parse directives for. Only \"sql\" is
    implemented.
    Type: string
    Values: \"sql\"
    Default: \"sql\"

  unresolved_parameter_policy = \"leave\"
    What to do with a ${name} token that has no registered value.
    Type: string
    Values: \"leave\", \"error\"
    Default: \"leave\"
";

const SECTION_PARAMETERS: &str = "\
[parameters]

  Arbitrary key = value pairs, registered with the expander before
  parsing begins, as if each had appeared in a `property` directive at
  the top of the root changelog.
  Example: schema = \"public\"
";

/// Print configuration reference for a specific section, or all sections.
///
/// Pass `"all"` to print everything, or a section name like `"changelog"`.
/// Returns an error for unknown section names.
pub fn explain_config(section: &str) -> Result<(), ConfigError> {
    let sections: &[(&str, &str)] = &[
        ("changelog", SECTION_CHANGELOG),
        ("parameters", SECTION_PARAMETERS),
    ];

    if section == "all" {
        for (i, (_, text)) in sections.iter().enumerate() {
            if i > 0 {
                println!();
            }
            print!("{text}");
        }
    } else if let Some((_, text)) = sections.iter().find(|(name, _)| *name == section) {
        print!("{text}");
    } else {
        return Err(ConfigError::Validation(format!(
            "unknown config section '{}'. Valid sections: {}",
            section,
            VALID_SECTIONS.join(", ")
        )));
    }

    Ok(())
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.changelog.dialect != "sql" {
            return Err(ConfigError::Validation(format!(
                "unsupported dialect '{}'. Valid values: sql",
                self.changelog.dialect
            )));
        }
        match self.changelog.unresolved_parameter_policy.as_str() {
            "leave" | "error" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "invalid unresolved_parameter_policy '{}'. Valid values: leave, error",
                    other
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_and_validate(toml_str: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.changelog.dialect, "sql");
        assert_eq!(config.changelog.unresolved_parameter_policy, "leave");
    }

    #[test]
    fn rejects_unsupported_dialect() {
        let toml = "[changelog]\ndialect = \"xml\"";
        let err = parse_and_validate(toml).unwrap_err();
        assert!(err.to_string().contains("unsupported dialect"));
    }

    #[test]
    fn rejects_invalid_unresolved_parameter_policy() {
        let toml = "[changelog]\nunresolved_parameter_policy = \"garbage\"";
        let err = parse_and_validate(toml).unwrap_err();
        assert!(err.to_string().contains("invalid unresolved_parameter_policy"));
    }

    #[test]
    fn parses_parameters_table() {
        let toml = "[parameters]\nschema = \"public\"\nenv = \"prod\"";
        let config = parse_and_validate(toml).unwrap();
        assert_eq!(config.parameters.get("schema").map(String::as_str), Some("public"));
        assert_eq!(config.parameters.get("env").map(String::as_str), Some("prod"));
    }
}
