use super::{Config, EcosystemConfig};
use std::path::{Path, PathBuf};

/// Config loader with auto-discovery
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            search_paths: vec![
                PathBuf::from("."),
                PathBuf::from("./config"),
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            ],
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Auto-discover and load config from various sources
    pub async fn load(&self) -> crate::Result<Config> {
        // Priority order:
        // 1. runctl.json
        // 2. ecosystem.config.json
        // 3. pm2.config.json
        // 4. ecosystem.config.js / pm2.config.js (rejected with guidance)

        for dir in &self.search_paths {
            let native = dir.join("runctl.json");
            if native.exists() {
                return self.load_native_json(&native).await;
            }

            for candidate in ["ecosystem.config.json", "pm2.config.json"] {
                let path = dir.join(candidate);
                if path.exists() {
                    return self.load_ecosystem_json(&path).await;
                }
            }

            for candidate in ["ecosystem.config.js", "pm2.config.js"] {
                let path = dir.join(candidate);
                if path.exists() {
                    // Surfaces the conversion instructions.
                    let ecosystem = EcosystemConfig::load_from_js(&path).await?;
                    return self.ecosystem_to_config(ecosystem);
                }
            }
        }

        // No config found, return default
        Ok(Config::default())
    }

    async fn load_native_json(&self, path: &Path) -> crate::Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse runctl.json: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    async fn load_ecosystem_json(&self, path: &Path) -> crate::Result<Config> {
        let ecosystem = EcosystemConfig::load_from_json(path).await?;
        self.ecosystem_to_config(ecosystem)
    }

    fn ecosystem_to_config(&self, ecosystem: EcosystemConfig) -> crate::Result<Config> {
        let apps = ecosystem
            .apps
            .iter()
            .map(|app| app.to_spec())
            .collect::<crate::Result<Vec<_>>>()?;
        let config = Config {
            apps,
            ..Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a specific config file
    pub async fn load_file(&self, path: &Path) -> crate::Result<Config> {
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let filename = path.file_name().and_then(|s| s.to_str()).unwrap_or("");

        match (extension, filename) {
            // Always refused; the error carries conversion guidance.
            ("js", _) => {
                let ecosystem = EcosystemConfig::load_from_js(path).await?;
                self.ecosystem_to_config(ecosystem)
            }
            ("json", _) if filename.contains("ecosystem") || filename.contains("pm2") => {
                self.load_ecosystem_json(path).await
            }
            _ => {
                // Native format first, ecosystem as fallback.
                if let Ok(config) = self.load_native_json(path).await {
                    Ok(config)
                } else {
                    self.load_ecosystem_json(path).await
                }
            }
        }
    }
}
