//! Configuration management for pnpmd.
//!
//! Parses `pnpmd.toml` with serde and discovers it in the working directory
//! or one of its parents. CLI flags are applied on top through
//! [`CliSettings`].
//!
//! ```toml
//! [rules]
//! path = "${PAPERS}/pnpmd.map"
//!
//! [toc]
//! enabled = true
//! section = "Abstract"
//!
//! [output]
//! suffix = "pnp.md"
//! number_sections = true
//!
//! [references]
//! namespaces = ["sec", "fig", "eq", "tbl"]
//! nameref_command = "nameref"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `rules.path` and `toc.section` support `${VAR}` and `${VAR:-default}`.

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "pnpmd.toml";

/// Symbol map filename searched for when no rules path is configured.
pub const RULES_FILENAME: &str = "pnpmd.map";

/// CLI settings that override configuration file values.
///
/// Only `Some` values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override table-of-contents insertion.
    pub toc_enabled: Option<bool>,
    /// Override section numbering.
    pub number_sections: Option<bool>,
    /// Skip all preprocessing.
    pub bypass: Option<bool>,
    /// Override the section the table of contents follows.
    pub toc_section: Option<String>,
    /// Override the symbol map path.
    pub rules_path: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Symbol map location (relative string from TOML).
    rules: RulesConfigRaw,
    /// Table-of-contents placement.
    pub toc: TocConfig,
    /// Output file settings.
    pub output: OutputConfig,
    /// Cross-reference settings.
    pub references: ReferencesConfig,

    /// Skip all preprocessing (CLI only).
    #[serde(skip)]
    pub bypass: bool,
    /// Resolved symbol map path, when configured (set after loading).
    #[serde(skip)]
    pub rules_path: Option<PathBuf>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Raw rules configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RulesConfigRaw {
    path: Option<String>,
}

/// Table-of-contents configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TocConfig {
    /// Whether a table of contents is inserted.
    pub enabled: bool,
    /// Title prefix of the section the table of contents follows.
    pub section: String,
    /// Marker line authors write to place the table of contents.
    pub marker: String,
    /// Renderer directive that replaces the marker.
    pub directive: String,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            section: "Abstract".to_owned(),
            marker: "[[TOC]]".to_owned(),
            directive: "\\tableofcontents".to_owned(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Suffix of the intermediate file (`paper.md` becomes `paper.<suffix>`).
    pub suffix: String,
    /// Whether the renderer numbers sections.
    pub number_sections: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: "pnp.md".to_owned(),
            number_sections: true,
        }
    }
}

impl OutputConfig {
    /// Intermediate file path for `source`.
    #[must_use]
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        source.with_file_name(format!("{stem}.{}", self.suffix))
    }
}

/// Cross-reference configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReferencesConfig {
    /// Namespaces rewritten to named references (`@sec:intro`).
    pub namespaces: Vec<String>,
    /// TeX command used for named references, without the backslash.
    pub nameref_command: String,
}

impl Default for ReferencesConfig {
    fn default() -> Self {
        Self {
            namespaces: ["sec", "fig", "eq", "tbl"]
                .iter()
                .map(|&ns| ns.to_owned())
                .collect(),
            nameref_command: "nameref".to_owned(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`rules.path`").
        field: String,
        /// Error message (e.g., "${`PAPERS`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Namespace names look like `sec` or `fig-alt`: a letter, then letters,
/// digits, `_` or `-`.
fn is_namespace(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Walk from `start` up to the filesystem root looking for `filename`.
fn find_upwards(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `pnpmd.toml` in the current directory and its parents, falling back
    /// to defaults.
    ///
    /// CLI settings are applied last and take precedence.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(enabled) = settings.toc_enabled {
            self.toc.enabled = enabled;
        }
        if let Some(number_sections) = settings.number_sections {
            self.output.number_sections = number_sections;
        }
        if let Some(bypass) = settings.bypass {
            self.bypass = bypass;
        }
        if let Some(section) = &settings.toc_section {
            self.toc.section.clone_from(section);
        }
        if let Some(path) = &settings.rules_path {
            self.rules_path = Some(path.clone());
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        Self::discover_config_from(&cwd)
    }

    /// Search for config file in `start` and its parents.
    #[must_use]
    pub fn discover_config_from(start: &Path) -> Option<PathBuf> {
        find_upwards(start, CONFIG_FILENAME)
    }

    /// Symbol map to use for a document in `document_dir`.
    ///
    /// A configured path wins. Otherwise `pnpmd.map` is searched for in
    /// `document_dir` and its parents. `None` means no symbol map.
    #[must_use]
    pub fn rules_file(&self, document_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.rules_path {
            return Some(path.clone());
        }
        let found = find_upwards(document_dir, RULES_FILENAME);
        tracing::debug!(dir = %document_dir.display(), found = ?found, "Symbol map lookup");
        found
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_toc()?;
        self.validate_output()?;
        self.validate_references()?;
        Ok(())
    }

    fn validate_toc(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.toc.section, "toc.section")?;
        require_non_empty(&self.toc.marker, "toc.marker")?;
        require_non_empty(&self.toc.directive, "toc.directive")?;
        if self.toc.marker.trim() == self.toc.directive.trim() {
            return Err(ConfigError::Validation(
                "toc.marker and toc.directive must differ".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_output(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.output.suffix, "output.suffix")?;
        if self.output.suffix.starts_with('.') || self.output.suffix.contains('/') {
            return Err(ConfigError::Validation(format!(
                "output.suffix must be a bare suffix like \"pnp.md\", got \"{}\"",
                self.output.suffix
            )));
        }
        if self.output.suffix == "md" {
            return Err(ConfigError::Validation(
                "output.suffix \"md\" would overwrite the source".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_references(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.references.namespaces.iter().find(|ns| !is_namespace(ns)) {
            return Err(ConfigError::Validation(format!(
                "references.namespaces: invalid namespace \"{bad}\""
            )));
        }
        let command = &self.references.nameref_command;
        require_non_empty(command, "references.nameref_command")?;
        if !command.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Validation(format!(
                "references.nameref_command must contain only letters, got \"{command}\""
            )));
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref path) = self.rules.path {
            self.rules.path = Some(expand::expand_env(path, "rules.path")?);
        }
        self.toc.section = expand::expand_env(&self.toc.section, "toc.section")?;
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.rules_path = self.rules.path.as_deref().map(|p| config_dir.join(p));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.toc.enabled);
        assert_eq!(config.toc.section, "Abstract");
        assert_eq!(config.toc.marker, "[[TOC]]");
        assert_eq!(config.toc.directive, "\\tableofcontents");
        assert_eq!(config.output.suffix, "pnp.md");
        assert!(config.output.number_sections);
        assert_eq!(config.references.namespaces, vec!["sec", "fig", "eq", "tbl"]);
        assert!(!config.bypass);
        assert!(config.rules_path.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.toc.section, "Abstract");
        assert_eq!(config.output.suffix, "pnp.md");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[rules]
path = "maps/symbols.map"

[toc]
enabled = false
section = "Keywords"

[output]
suffix = "pandoc.md"
number_sections = false

[references]
namespaces = ["sec", "thm"]
nameref_command = "autoref"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/papers"));

        assert!(!config.toc.enabled);
        assert_eq!(config.toc.section, "Keywords");
        assert_eq!(config.toc.marker, "[[TOC]]");
        assert_eq!(config.output.suffix, "pandoc.md");
        assert!(!config.output.number_sections);
        assert_eq!(config.references.namespaces, vec!["sec", "thm"]);
        assert_eq!(config.references.nameref_command, "autoref");
        assert_eq!(
            config.rules_path,
            Some(PathBuf::from("/papers/maps/symbols.map"))
        );
    }

    #[test]
    fn test_wrong_value_type_is_parse_error() {
        let result: Result<Config, _> = toml::from_str("[toc]\nenabled = \"yes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default();
        config.apply_cli_settings(&CliSettings {
            toc_enabled: Some(false),
            number_sections: Some(false),
            bypass: Some(true),
            toc_section: Some("Keywords".to_owned()),
            rules_path: Some(PathBuf::from("custom.map")),
        });

        assert!(!config.toc.enabled);
        assert!(!config.output.number_sections);
        assert!(config.bypass);
        assert_eq!(config.toc.section, "Keywords");
        assert_eq!(config.rules_path, Some(PathBuf::from("custom.map")));
    }

    #[test]
    fn test_empty_cli_settings_change_nothing() {
        let mut config = Config::default();
        config.apply_cli_settings(&CliSettings::default());
        assert!(config.toc.enabled);
        assert_eq!(config.toc.section, "Abstract");
    }

    #[test]
    fn test_validate_empty_section() {
        let mut config = Config::default();
        config.toc.section = "  ".to_owned();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: toc.section cannot be empty");
    }

    #[test]
    fn test_validate_suffix() {
        let mut config = Config::default();
        config.output.suffix = ".pnp.md".to_owned();
        assert!(config.validate().is_err());

        config.output.suffix = "md".to_owned();
        assert!(config.validate().is_err());

        config.output.suffix = "pandoc.md".to_owned();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_namespaces() {
        let mut config = Config::default();
        config.references.namespaces = vec!["sec".to_owned(), "1bad".to_owned()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("1bad"));
    }

    #[test]
    fn test_validate_nameref_command() {
        let mut config = Config::default();
        config.references.nameref_command = "name ref".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_marker_differs_from_directive() {
        let mut config = Config::default();
        config.toc.marker = "\\tableofcontents".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_path() {
        let output = OutputConfig::default();
        assert_eq!(
            output.output_path(Path::new("/papers/draft.md")),
            PathBuf::from("/papers/draft.pnp.md")
        );
    }

    #[test]
    fn test_load_from_file_resolves_rules_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pnpmd.toml");
        std::fs::write(&path, "[rules]\npath = \"symbols.map\"\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.rules_path, Some(dir.path().join("symbols.map")));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pnpmd.toml");
        std::fs::write(&path, "[output]\nsuffix = \"\"\n").unwrap();
        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_rejects_invalid_cli_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pnpmd.toml");
        std::fs::write(&path, "").unwrap();
        let settings = CliSettings {
            toc_section: Some(String::new()),
            ..CliSettings::default()
        };
        assert!(Config::load(Some(&path), Some(&settings)).is_err());
    }

    #[test]
    fn test_discover_config_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("pnpmd.toml"), "").unwrap();

        assert_eq!(
            Config::discover_config_from(&nested),
            Some(dir.path().join("pnpmd.toml"))
        );
    }

    #[test]
    fn test_rules_file_search() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("papers/draft");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("papers/pnpmd.map"), "a=b\n").unwrap();

        let config = Config::default();
        assert_eq!(
            config.rules_file(&nested),
            Some(dir.path().join("papers/pnpmd.map"))
        );
    }

    #[test]
    fn test_configured_rules_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pnpmd.map"), "a=b\n").unwrap();

        let config = Config {
            rules_path: Some(PathBuf::from("/elsewhere/custom.map")),
            ..Config::default()
        };
        assert_eq!(
            config.rules_file(dir.path()),
            Some(PathBuf::from("/elsewhere/custom.map"))
        );
    }
}
