use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

const ENV_PREFIX: &str = "LIVE_DETECT";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub api_base: String,
    pub camera_url: String,
    pub poll_interval_ms: u64,
    pub camera_poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub jpeg_quality: f32,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub default_threshold: f32,
    pub default_classes: Vec<String>,
    pub update_buffer_size: usize,
    pub command_buffer_size: usize,
    pub log_level: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5000".to_string(),
            camera_url: "http://localhost:8080/snapshot.jpg".to_string(),
            poll_interval_ms: 120,
            camera_poll_interval_ms: 33,
            request_timeout_ms: 10_000,
            jpeg_quality: 0.85,
            ideal_width: 960,
            ideal_height: 540,
            default_threshold: 0.5,
            default_classes: vec!["person".to_string(), "car".to_string(), "dog".to_string()],
            update_buffer_size: 16,
            command_buffer_size: 32,
            log_level: "info".to_string(),
        }
    }
}

impl Configuration {
    /// Layers an optional config file and `LIVE_DETECT__*` environment
    /// variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("default_classes")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize::<Configuration>()?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn camera_poll_interval(&self) -> Duration {
        Duration::from_millis(self.camera_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_reference_client() {
        let configuration = Configuration::default();
        assert_eq!(configuration.poll_interval(), Duration::from_millis(120));
        assert_eq!(configuration.jpeg_quality, 0.85);
        assert_eq!((configuration.ideal_width, configuration.ideal_height), (960, 540));
        assert_eq!(configuration.default_threshold, 0.5);
    }

    #[test]
    fn file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("live-detect-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "api_base = \"http://detector:9000\"").unwrap();
        writeln!(file, "poll_interval_ms = 250").unwrap();
        writeln!(file, "default_classes = [\"cat\"]").unwrap();
        drop(file);

        let configuration = Configuration::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(configuration.api_base, "http://detector:9000");
        assert_eq!(configuration.poll_interval_ms, 250);
        assert_eq!(configuration.default_classes, vec!["cat".to_string()]);
        // untouched fields keep their defaults
        assert_eq!(configuration.request_timeout_ms, 10_000);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("live-detect-does-not-exist.toml");
        assert!(Configuration::load(Some(&path)).is_err());
    }
}
