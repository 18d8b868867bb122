use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

pub const CONFIG_ENV: &str = "FIELD_WEAVER_CONFIG";

/// Naming and schema conventions shared with the runtime layer.
///
/// Every name here is part of a contract with code generated elsewhere, so
/// the defaults only change together with that runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    pub model_annotation: String,
    pub ignore_annotation: String,
    pub model_interface: String,
    pub root_model_type: String,
    pub proxy_supertype: String,
    pub getter_prefix: String,
    pub setter_prefix: String,
    pub proxy_interface_suffix: String,
    pub context_hook: String,
    pub transform_marker: String,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            model_annotation: "io.weaver.annotations.ModelClass".to_string(),
            ignore_annotation: "io.weaver.annotations.Ignore".to_string(),
            model_interface: "io.weaver.Model".to_string(),
            root_model_type: "io.weaver.ModelObject".to_string(),
            proxy_supertype: "io.weaver.internal.ModelProxy".to_string(),
            getter_prefix: "get$".to_string(),
            setter_prefix: "set$".to_string(),
            proxy_interface_suffix: "ProxyInterface".to_string(),
            context_hook: "weaver$injectObjectContext".to_string(),
            transform_marker: "weaver$transformerApplied".to_string(),
        }
    }
}

impl WeaverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.getter_prefix.is_empty() || self.setter_prefix.is_empty() {
            anyhow::bail!("Accessor prefixes must not be empty");
        }
        if self.getter_prefix.starts_with(&self.setter_prefix)
            || self.setter_prefix.starts_with(&self.getter_prefix)
        {
            anyhow::bail!(
                "Getter prefix {:?} and setter prefix {:?} overlap",
                self.getter_prefix,
                self.setter_prefix
            );
        }
        for (key, value) in [
            ("model_annotation", &self.model_annotation),
            ("model_interface", &self.model_interface),
            ("proxy_supertype", &self.proxy_supertype),
            ("context_hook", &self.context_hook),
            ("transform_marker", &self.transform_marker),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("Config value {key} must not be empty");
            }
        }
        Ok(())
    }

    pub fn is_accessor_name(&self, method: &str) -> bool {
        method.starts_with(&self.getter_prefix) || method.starts_with(&self.setter_prefix)
    }
}

pub fn resolve_config_path(cli: &Cli) -> Result<Option<PathBuf>> {
    if let Some(p) = cli.config.clone() {
        return Ok(Some(p));
    }

    if let Ok(p) = env::var(CONFIG_ENV) {
        return Ok(Some(PathBuf::from(p)));
    }

    let default_path = field_weaver_home()?.join("config.json");
    if default_path.exists() {
        return Ok(Some(default_path));
    }

    Ok(None)
}

pub fn load_config(cli: &Cli) -> Result<WeaverConfig> {
    match resolve_config_path(cli)? {
        Some(path) => WeaverConfig::load(&path),
        None => Ok(WeaverConfig::default()),
    }
}

fn field_weaver_home() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve config directory"))?;
    Ok(base.join("field-weaver"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "field_weaver_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn partial_config_keeps_defaults() -> Result<()> {
        let path = temp_path("config_partial.json");
        std::fs::write(&path, r#"{ "getter_prefix": "storeGet$", "setter_prefix": "storeSet$" }"#)?;

        let config = WeaverConfig::load(&path)?;
        assert_eq!(config.getter_prefix, "storeGet$");
        assert_eq!(config.setter_prefix, "storeSet$");
        assert_eq!(config.model_interface, WeaverConfig::default().model_interface);

        std::fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn overlapping_prefixes_are_rejected() {
        let config = WeaverConfig {
            getter_prefix: "x$".to_string(),
            setter_prefix: "x$set".to_string(),
            ..WeaverConfig::default()
        };
        assert!(config.validate().is_err());

        let empty = WeaverConfig {
            setter_prefix: String::new(),
            ..WeaverConfig::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn accessor_names_match_either_prefix() {
        let config = WeaverConfig::default();
        assert!(config.is_accessor_name("get$name"));
        assert!(config.is_accessor_name("set$name"));
        assert!(!config.is_accessor_name("getName"));
    }
}
