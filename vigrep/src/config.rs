use config::{Config as ConfigBuilder, ConfigError, File};
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::container::Ident;
use crate::errors::{VigrepError, VigrepResult};

/// Configuration for a scan.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.vigrep.yaml` in the current directory
/// 3. Global `$HOME/.config/vigrep/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Literal text to look for (or a regex with use_regex)
/// pattern: "Initialize"
///
/// # File or directory to scan
/// root_path: "."
///
/// # Extension of scanned files, compared case-sensitively
/// extension: "vi"
///
/// # Blocks whose identifier contains one of these codes are decoded
/// region_codes:
///   front_panel: "FPH"
///   block_diagram: "BDH"
///
/// # Text encoding label; defaults to the locale's charset
/// encoding: "windows-1252"
///
/// # lenient keeps text when the integrity check fails, strict skips the file
/// sanity_policy: lenient
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "warn"
/// ```
///
/// Command-line arguments take precedence over config file values, see
/// [`ScanConfig::merge_with_cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// The text to search for
    #[serde(default)]
    pub pattern: String,

    /// File or directory to scan
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Treat the pattern as a regular expression instead of a literal
    #[serde(default)]
    pub use_regex: bool,

    /// Extension of the files to scan, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Identifier substrings selecting the blocks to decode
    #[serde(default)]
    pub region_codes: RegionCodes,

    /// Encoding label for heap text; None uses the locale
    #[serde(default)]
    pub encoding: Option<String>,

    /// What to do when the post-decode integrity check fails
    #[serde(default)]
    pub sanity_policy: SanityPolicy,

    /// Silence decoder diagnostics while a file is processed
    #[serde(default = "default_true")]
    pub quiet_decoder: bool,

    /// Also walk hidden files and honour .gitignore/.ignore files
    #[serde(default)]
    pub respect_ignore_files: bool,

    /// Show a progress bar while scanning
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// The two identifier substrings that select front panel and block diagram
/// heap blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCodes {
    #[serde(default = "default_front_panel")]
    pub front_panel: String,
    #[serde(default = "default_block_diagram")]
    pub block_diagram: String,
}

impl Default for RegionCodes {
    fn default() -> Self {
        Self {
            front_panel: default_front_panel(),
            block_diagram: default_block_diagram(),
        }
    }
}

impl RegionCodes {
    /// Whether `ident` contains either code. Empty codes match nothing.
    pub fn matches(&self, ident: &Ident) -> bool {
        [&self.front_panel, &self.block_diagram]
            .iter()
            .any(|code| !code.is_empty() && ident.contains(code))
    }
}

/// Handling of a failed integrity check after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanityPolicy {
    /// Keep the text already extracted and record a warning
    #[default]
    Lenient,
    /// Treat the whole file as failed
    Strict,
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_extension() -> String {
    "vi".to_string()
}

fn default_front_panel() -> String {
    "FPH".to_string()
}

fn default_block_diagram() -> String {
    "BDH".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            root_path: default_root_path(),
            use_regex: false,
            extension: default_extension(),
            region_codes: RegionCodes::default(),
            encoding: None,
            sanity_policy: SanityPolicy::default(),
            quiet_decoder: true,
            respect_ignore_files: false,
            show_progress: true,
            log_level: default_log_level(),
        }
    }
}

impl ScanConfig {
    /// Creates a configuration with defaults for everything but the pattern
    /// and the root.
    pub fn new(pattern: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            root_path: root_path.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file,
    /// which must exist.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("vigrep/config.yaml")),
            Some(PathBuf::from(".vigrep.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_config: ScanConfig) -> Self {
        let defaults = ScanConfig::default();

        // Positional arguments always come from the command line
        self.pattern = cli_config.pattern;
        self.root_path = cli_config.root_path;

        if cli_config.use_regex {
            self.use_regex = true;
        }
        if cli_config.extension != defaults.extension {
            self.extension = cli_config.extension;
        }
        if cli_config.region_codes.front_panel != defaults.region_codes.front_panel {
            self.region_codes.front_panel = cli_config.region_codes.front_panel;
        }
        if cli_config.region_codes.block_diagram != defaults.region_codes.block_diagram {
            self.region_codes.block_diagram = cli_config.region_codes.block_diagram;
        }
        if cli_config.encoding.is_some() {
            self.encoding = cli_config.encoding;
        }
        if cli_config.sanity_policy == SanityPolicy::Strict {
            self.sanity_policy = SanityPolicy::Strict;
        }
        if !cli_config.quiet_decoder {
            self.quiet_decoder = false;
        }
        if cli_config.respect_ignore_files {
            self.respect_ignore_files = true;
        }
        if !cli_config.show_progress {
            self.show_progress = false;
        }
        if cli_config.log_level != defaults.log_level {
            self.log_level = cli_config.log_level;
        }
        self
    }

    /// The encoding used to decode heap text: the configured label, or the
    /// locale's charset.
    pub fn resolve_encoding(&self) -> VigrepResult<&'static Encoding> {
        match &self.encoding {
            Some(label) => Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
                VigrepError::config_error(format!("Unknown encoding label '{}'", label))
            }),
            None => Ok(locale_encoding()),
        }
    }
}

/// Extracts the charset of a POSIX locale string such as `de_DE.ISO-8859-1`
/// or `en_US.UTF-8@euro`.
pub fn encoding_from_locale(locale: &str) -> Option<&'static Encoding> {
    let charset = locale.split_once('.')?.1;
    let charset = charset.split('@').next().unwrap_or(charset);
    Encoding::for_label(charset.as_bytes())
}

/// The encoding preferred by the process locale, UTF-8 if none is set.
pub fn locale_encoding() -> &'static Encoding {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| encoding_from_locale(&value))
        .unwrap_or(UTF_8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            pattern: "Initialize"
            root_path: "projects"
            use_regex: true
            extension: "vit"
            region_codes:
              front_panel: "FPX"
              block_diagram: "BDX"
            encoding: "windows-1252"
            sanity_policy: strict
            show_progress: false
            log_level: "debug"
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = ScanConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.pattern, "Initialize");
        assert_eq!(config.root_path, PathBuf::from("projects"));
        assert!(config.use_regex);
        assert_eq!(config.extension, "vit");
        assert_eq!(config.region_codes.front_panel, "FPX");
        assert_eq!(config.region_codes.block_diagram, "BDX");
        assert_eq!(config.encoding.as_deref(), Some("windows-1252"));
        assert_eq!(config.sanity_policy, SanityPolicy::Strict);
        assert!(!config.show_progress);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"pattern: \"x\"\n").unwrap();

        let config = ScanConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.root_path, PathBuf::from("."));
        assert_eq!(config.extension, "vi");
        assert_eq!(config.region_codes, RegionCodes::default());
        assert_eq!(config.encoding, None);
        assert_eq!(config.sanity_policy, SanityPolicy::Lenient);
        assert!(config.quiet_decoder);
        assert!(config.show_progress);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_merge_with_cli() {
        let file_config = ScanConfig {
            extension: "vit".to_string(),
            encoding: Some("windows-1252".to_string()),
            sanity_policy: SanityPolicy::Strict,
            log_level: "info".to_string(),
            ..ScanConfig::new("from-file", "src")
        };

        let cli_config = ScanConfig {
            region_codes: RegionCodes {
                front_panel: "FPX".to_string(),
                block_diagram: default_block_diagram(),
            },
            show_progress: false,
            ..ScanConfig::new("from-cli", "tests")
        };

        let merged = file_config.merge_with_cli(cli_config);
        assert_eq!(merged.pattern, "from-cli");
        assert_eq!(merged.root_path, PathBuf::from("tests"));
        assert_eq!(merged.extension, "vit"); // File value (CLI default)
        assert_eq!(merged.region_codes.front_panel, "FPX"); // CLI value
        assert_eq!(merged.region_codes.block_diagram, "BDH");
        assert_eq!(merged.encoding.as_deref(), Some("windows-1252"));
        assert_eq!(merged.sanity_policy, SanityPolicy::Strict);
        assert!(!merged.show_progress);
        assert_eq!(merged.log_level, "info");
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"sanity_policy: sometimes\nregion_codes: 12\n")
            .unwrap();

        assert!(ScanConfig::load_from(Some(&config_path)).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ScanConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_region_codes_match() {
        let codes = RegionCodes::default();
        assert!(codes.matches(&Ident(*b"FPHb")));
        assert!(codes.matches(&Ident(*b"BDHc")));
        assert!(!codes.matches(&Ident(*b"LVSR")));

        let codes = RegionCodes {
            front_panel: String::new(),
            block_diagram: "BDH".to_string(),
        };
        assert!(!codes.matches(&Ident(*b"FPHb")));
    }

    #[test]
    fn test_encoding_from_locale() {
        assert_eq!(encoding_from_locale("en_US.UTF-8"), Some(UTF_8));
        assert_eq!(encoding_from_locale("de_DE.ISO-8859-1@euro"), Some(WINDOWS_1252));
        assert_eq!(encoding_from_locale("C"), None);
        assert_eq!(encoding_from_locale("xx_XX.no-such-charset"), None);
    }

    #[test]
    fn test_resolve_encoding() {
        let mut config = ScanConfig::new("x", ".");
        config.encoding = Some("latin1".to_string());
        assert_eq!(config.resolve_encoding().unwrap(), WINDOWS_1252);

        config.encoding = Some("klingon".to_string());
        assert!(matches!(
            config.resolve_encoding(),
            Err(VigrepError::ConfigError(_))
        ));
    }
}
