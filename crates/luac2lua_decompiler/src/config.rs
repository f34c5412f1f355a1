use std::path::Path;

use anyhow::{Context, Result};
use log::LevelFilter;
use luadec_core::RenderOptions;
use serde::{Deserialize, Serialize};

/// Filters handed to `env_logger` before `RUST_LOG` is applied on top.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggerConfig {
    /// Applies to this binary and `luadec_core`.
    pub app_level_filter: LevelFilter,
    pub level_filter: LevelFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { app_level_filter: LevelFilter::Info, level_filter: LevelFilter::Warn }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderOptions,
    pub logger: LoggerConfig,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn init_logger(&self) {
        let mut builder = env_logger::Builder::new();
        builder
            .filter_level(self.logger.level_filter)
            .filter_module("luadec_core", self.logger.app_level_filter)
            .filter_module("luac2lua_decompiler", self.logger.app_level_filter)
            .parse_env(env_logger::Env::default());
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn sections_override_individually() {
        let cfg = AppConfig::from_toml(
            r#"
            [render]
            line_comments = true

            [logger]
            app_level_filter = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.indent, "  ");
        assert!(cfg.render.line_comments);
        assert_eq!(cfg.logger.app_level_filter, LevelFilter::Debug);
        assert_eq!(cfg.logger.level_filter, LevelFilter::Warn);
    }

    #[test]
    fn bad_level_is_rejected() {
        assert!(AppConfig::from_toml("[logger]\nlevel_filter = \"loud\"\n").is_err());
    }
}
