/// Service configuration loaded from a JSON file
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration. Every field has a default, so `{}` is a valid file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub address: String,
    pub port: u16,
    /// SQLite database file
    pub database_path: String,
    /// Default `tracing` filter, overridden by `RUST_LOG`
    pub log_level: String,
    /// Term shown when a request does not name one
    pub academic_year: i32,
    pub semester: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            database_path: "timetable.db".to_string(),
            log_level: "info".to_string(),
            academic_year: 2024,
            semester: 1,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// # Arguments
    /// * `path` - Path to the config file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` - The parsed configuration, or the defaults if the file doesn't exist
    /// * `Err` - If the file can't be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        if !(1..=3).contains(&config.semester) {
            return Err(format!("semester must be 1, 2 or 3, got {}", config.semester).into());
        }
        Ok(config)
    }

    /// The `address:port` pair to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
