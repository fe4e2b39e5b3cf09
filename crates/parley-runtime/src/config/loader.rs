//! Layered loading of [`ParleyConfig`].
//!
//! Sources, later ones overriding earlier ones:
//!
//! | source | example |
//! |---|---|
//! | built-in defaults | `bot.prefixes = ["+"]` |
//! | [`ConfigLoader::merge`] | a config assembled in code |
//! | config file | `parley.toml`, `parley.yaml` or `parley.yml` |
//! | profile overlay | `parley.production.toml` beside the config file |
//! | environment | `PARLEY_ADAPTERS__DISCORD__TOKEN=...` |
//!
//! Nested keys in environment variables are joined with `__`.
//! `PARLEY_PROFILE` picks the overlay and is not a config key itself. TOML
//! needs the `toml-config` feature and YAML the `yaml-config` feature.
//!
//! ```rust,ignore
//! use parley_runtime::config::ConfigLoader;
//!
//! // Reads ./bot/parley.toml, then ./bot/parley.production.toml if present.
//! let config = ConfigLoader::new()
//!     .profile("prod")
//!     .file("./bot/parley.toml")
//!     .load()?;
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::ParleyConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PARLEY_";

/// Environment variable selecting the profile.
pub const PROFILE_ENV: &str = "PARLEY_PROFILE";

/// File name, without extension, searched for in every search path.
const FILE_STEM: &str = "parley";

/// Deployment profile. Picks the overlay file merged over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, case-insensitively; `dev` and `prod` are accepted.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "dev" | "development" => Self::Development,
            "prod" | "production" => Self::Production,
            _ => Self::Custom(name),
        }
    }

    /// Reads `PARLEY_PROFILE`. Unset means development.
    pub fn from_env() -> Self {
        match std::env::var(PROFILE_ENV) {
            Ok(name) => Self::parse(&name),
            Err(_) => Self::default(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A config file syntax compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    /// Enabled formats, in lookup order.
    #[allow(unused_mut)]
    fn enabled() -> Vec<Self> {
        let mut formats = Vec::new();
        #[cfg(feature = "toml-config")]
        formats.push(Self::Toml);
        #[cfg(feature = "yaml-config")]
        formats.push(Self::Yaml);
        formats
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(OsStr::to_str)?;
        Self::enabled()
            .into_iter()
            .find(|format| format.extensions().contains(&ext))
    }

    fn merge_into(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

/// `parley.toml` with profile `production` gives `parley.production.toml`.
fn overlay_path(path: &Path, profile: &Profile) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    Some(path.with_file_name(format!("{stem}.{profile}.{ext}")))
}

/// Collects config sources and extracts a [`ParleyConfig`] from them.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    explicit_file: Option<PathBuf>,
    read_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader for the `PARLEY_PROFILE` profile that reads the environment.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            explicit_file: None,
            read_env: true,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a directory to look for `parley.*` in. Without any, the current
    /// directory and the user config directory are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Reads this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.read_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// Layers `config` over the defaults, below files and environment.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    pub fn load(self) -> ConfigResult<ParleyConfig> {
        let profile = self.profile.clone();
        let config: ParleyConfig = self.into_figment()?.extract()?;
        debug!(
            profile = %profile,
            adapters = ?config.adapters.keys().collect::<Vec<_>>(),
            "configuration loaded"
        );
        Ok(config)
    }

    fn into_figment(self) -> ConfigResult<Figment> {
        let files = match &self.explicit_file {
            Some(path) => self.explicit(path)?,
            None => self.discover(),
        };

        let mut figment = Figment::from(Serialized::defaults(ParleyConfig::default()))
            .merge(self.overrides);
        for (path, format) in files {
            info!(path = %path.display(), "reading config file");
            figment = format.merge_into(figment, &path);
        }

        if self.read_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["PROFILE"]).split("__"));
        }
        Ok(figment)
    }

    fn explicit(&self, path: &Path) -> ConfigResult<Vec<(PathBuf, FileFormat)>> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let format = FileFormat::for_path(path).ok_or_else(|| {
            ConfigError::ParseError(format!(
                "{} is not a config format this build reads",
                path.display()
            ))
        })?;
        Ok(self.with_overlay(path.to_path_buf(), format))
    }

    /// Takes the first `parley.<ext>` found across the search paths.
    fn discover(&self) -> Vec<(PathBuf, FileFormat)> {
        let dirs = self.search_dirs();
        for dir in &dirs {
            for format in FileFormat::enabled() {
                for ext in format.extensions() {
                    let path = dir.join(format!("{FILE_STEM}.{ext}"));
                    if path.exists() {
                        return self.with_overlay(path, format);
                    }
                }
            }
        }
        warn!(paths = ?dirs, "no config file found; using defaults and environment");
        Vec::new()
    }

    fn with_overlay(&self, path: PathBuf, format: FileFormat) -> Vec<(PathBuf, FileFormat)> {
        let overlay = overlay_path(&path, &self.profile).filter(|overlay| overlay.exists());
        let mut files = vec![(path, format)];
        if let Some(overlay) = overlay {
            debug!(profile = %self.profile, path = %overlay.display(), "profile overlay found");
            files.push((overlay, format));
        }
        files
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join(FILE_STEM)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.logging.level, LogLevel::Info);
            assert_eq!(config.bot.prefixes, vec!["+"]);
            Ok(())
        });
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse(" Development "), Profile::Development);
        assert_eq!(Profile::parse("Staging"), Profile::Custom("staging".into()));
        assert_eq!(Profile::Custom("staging".into()).to_string(), "staging");
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env(PROFILE_ENV, "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            Ok(())
        });
    }

    #[test]
    fn test_overlay_path() {
        assert_eq!(
            overlay_path(Path::new("/etc/bot/parley.yml"), &Profile::Production),
            Some(PathBuf::from("/etc/bot/parley.production.yml"))
        );
        assert_eq!(overlay_path(Path::new("parley"), &Profile::Development), None);
    }

    #[test]
    fn test_env_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("PARLEY_LOGGING__LEVEL", "debug");
            jail.set_env("PARLEY_ADAPTERS__DISCORD__TOKEN", "from-env");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();

            assert_eq!(config.logging.level, LogLevel::Debug);
            let discord = config.adapters.get("discord").unwrap();
            assert_eq!(
                discord.find_ref("token").and_then(|v| v.as_str()),
                Some("from-env")
            );
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .without_env()
            .file("/definitely/not/here/parley.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unreadable_format_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("parley.ini", "[bot]\n")?;
            let result = ConfigLoader::new()
                .without_env()
                .file(jail.directory().join("parley.ini"))
                .load();
            assert!(matches!(result, Err(ConfigError::ParseError(_))));
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "parley.toml",
                r#"
                [bot]
                admins = ["1"]
                prefixes = ["!"]

                [adapters.discord]
                token = "from-file"
                "#,
            )?;
            jail.set_env("PARLEY_ADAPTERS__DISCORD__TOKEN", "from-env");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();

            assert_eq!(config.bot.admins, vec!["1"]);
            assert_eq!(config.bot.prefixes, vec!["!"]);
            let discord = config.adapters.get("discord").unwrap();
            assert_eq!(
                discord.find_ref("token").and_then(|v| v.as_str()),
                Some("from-env")
            );
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_overlay_beside_explicit_file_wins() {
        Jail::expect_with(|jail| {
            jail.create_file("bot.toml", "[bot]\nadmins = [\"1\"]\nprefixes = [\"+\"]\n")?;
            jail.create_file("bot.production.toml", "[bot]\nprefixes = [\"!\"]\n")?;

            let config = ConfigLoader::new()
                .profile("production")
                .file(jail.directory().join("bot.toml"))
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.bot.admins, vec!["1"]);
            assert_eq!(config.bot.prefixes, vec!["!"]);
            Ok(())
        });
    }

    #[cfg(feature = "yaml-config")]
    #[test]
    fn test_yaml_profile_overlay() {
        Jail::expect_with(|jail| {
            jail.create_file("parley.yaml", "logging:\n  level: warn\n")?;
            jail.create_file("parley.production.yaml", "bot:\n  moderators: [\"9\"]\n")?;

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.logging.level, LogLevel::Warn);
            assert_eq!(config.bot.moderators, vec!["9"]);
            Ok(())
        });
    }
}
