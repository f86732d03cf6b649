use crate::error::WorkerError;
use crate::result::Result;

use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

const DEBUG_IMAGE_PATH: &str = "debug.jpg";

/// Least specific first; later files override earlier ones.
const DOTENV_FILES: [&str; 6] = [
    "../.env",
    "../.env.local",
    "../.env.development.local",
    ".env",
    ".env.local",
    ".env.development.local",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub modify: bool,
    pub poll_interval_secs: u64,
    pub max_concurrency: usize,
    pub pending_queue: String,
    pub posts_index: String,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            modify: true,
            poll_interval_secs: 5,
            max_concurrency: 8,
            pending_queue: "pending".to_owned(),
            posts_index: "posts".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    /// Kept out of `host` so it never needs URL escaping.
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "redis://127.0.0.1/".to_owned(),
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    pub url: String,
    pub api_key: String,
    pub chat_model: String,
    pub vision_model: String,
    pub image_model: String,
    pub image_size: String,
    pub image_quality: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub debug_image_path: Option<PathBuf>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1".to_owned(),
            api_key: String::new(),
            chat_model: "gpt-3.5-turbo".to_owned(),
            vision_model: "gpt-4-vision-preview".to_owned(),
            image_model: "dall-e-3".to_owned(),
            image_size: "1024x1024".to_owned(),
            image_quality: "standard".to_owned(),
            max_tokens: 512,
            timeout_secs: 120,
            debug_image_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Config {
    pub fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", self.bucket, key)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub redis: RedisConfig,
    pub openai: OpenAIConfig,
    pub s3: S3Config,
    pub export: ExportConfig,
}

impl Config {
    pub fn from_file(filename: &str) -> Result<Config> {
        let config = fs::read_to_string(filename)
            .map_err(|err| WorkerError::Config(format!("Could not read {}: {}", filename, err)))?;
        Self::parse(&config)
    }

    pub fn parse(config: &str) -> Result<Config> {
        toml::from_str(config)
            .map_err(|err| WorkerError::Config(format!("Could not parse config: {}", err)))
    }

    /// Reads the config file, then layers `.env` files and the process
    /// environment on top of it. Existing environment variables win over
    /// `.env` entries.
    pub fn load(filename: &str) -> Result<Config> {
        Self::load_from(filename, Path::new("."), |name| std::env::var(name).ok())
    }

    pub fn load_from<F>(filename: &str, dir: &Path, env: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(filename)?;
        let dotenv = dotenv_values(dir)?;

        config.apply_env(|name| {
            env(name)
                .filter(|value| !value.is_empty())
                .or_else(|| dotenv.get(name).cloned())
        });
        config.validate()?;

        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = api_key;
        }

        if let Some(host) = lookup("REDIS_HOST") {
            let port = lookup("REDIS_PORT").unwrap_or_else(|| "6379".to_owned());
            self.redis.host = format!("redis://{}:{}/", host, port);
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }

        if let Some(access_key_id) = lookup("AWS_ACCESS_KEY_ID") {
            self.s3.access_key_id = access_key_id;
        }
        if let Some(secret_access_key) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.s3.secret_access_key = secret_access_key;
        }
        if let Some(region) = lookup("AWS_S3_REGION") {
            self.s3.region = region;
        }
        if let Some(bucket) = lookup("AWS_BUCKET_NAME") {
            self.s3.bucket = bucket;
        }

        if let Some(flag) = lookup("DEBUG_STORE_IMG") {
            if matches!(flag.as_str(), "1" | "true" | "True") {
                self.openai.debug_image_path = Some(PathBuf::from(DEBUG_IMAGE_PATH));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.max_concurrency == 0 {
            return Err(WorkerError::Config(
                "worker.max_concurrency must be at least 1".to_owned(),
            ));
        }

        if self.worker.pending_queue.is_empty() || self.worker.posts_index.is_empty() {
            return Err(WorkerError::Config(
                "worker.pending_queue and worker.posts_index must be set".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Merges the `.env` files around `dir` without touching the process
/// environment. Missing files are skipped.
fn dotenv_values(dir: &Path) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();

    for dotenv in DOTENV_FILES {
        let path = dir.join(dotenv);
        let entries = match dotenvy::from_path_iter(&path) {
            Ok(entries) => entries,
            Err(err) if err.not_found() => continue,
            Err(err) => {
                return Err(WorkerError::Config(format!(
                    "Could not load {}: {}",
                    path.display(),
                    err
                )))
            }
        };

        for entry in entries {
            let (name, value) = entry.map_err(|err| {
                WorkerError::Config(format!("Could not load {}: {}", path.display(), err))
            })?;
            values.insert(name, value);
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file() {
        let config = Config::from_file(DEFAULT_CONFIG_PATH).unwrap();
        assert_eq!(config.redis.host, "redis://127.0.0.1/");
        assert_eq!(config.worker.pending_queue, "pending");
        assert_eq!(config.worker.posts_index, "posts");
        assert_eq!(config.worker.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_failure() {
        let err = Config::from_file("should_fail.toml").unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn test_from_tempfile_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nmodify = false\nmax_concurrency = 2").unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert!(!config.worker.modify);
        assert_eq!(config.worker.max_concurrency, 2);
        assert_eq!(config.worker.poll_interval_secs, 5);
        assert_eq!(config.openai.chat_model, "gpt-3.5-turbo");
        assert_eq!(config.export.path, PathBuf::from("data.jsonl"));
    }

    #[test]
    fn test_apply_env() {
        let env = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "p@ss/w0rd:#50%"),
            ("AWS_BUCKET_NAME", "images"),
            ("AWS_S3_REGION", "eu-west-1"),
            ("DEBUG_STORE_IMG", "true"),
        ]);

        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|value| value.to_string()));

        assert_eq!(config.openai.api_key, "sk-test");
        assert_eq!(config.redis.host, "redis://cache.internal:6380/");
        assert_eq!(config.redis.password.as_deref(), Some("p@ss/w0rd:#50%"));
        assert_eq!(config.s3.bucket, "images");
        assert_eq!(config.s3.region, "eu-west-1");
        assert_eq!(
            config.openai.debug_image_path,
            Some(PathBuf::from("debug.jpg"))
        );
        assert_eq!(
            config.s3.object_url("processed/a.jpg"),
            "https://images.s3.amazonaws.com/processed/a.jpg"
        );
    }

    #[test]
    fn test_apply_env_ignores_empty_values() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "OPENAI_API_KEY" => Some(String::new()),
            "DEBUG_STORE_IMG" => Some("0".to_owned()),
            _ => None,
        });

        assert!(config.openai.api_key.is_empty());
        assert_eq!(config.redis.host, "redis://127.0.0.1/");
        assert!(config.openai.debug_image_path.is_none());
    }

    #[test]
    fn test_load_from_prefers_local_dotenv() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("worker");
        fs::create_dir(&dir).unwrap();
        fs::write(
            root.path().join(".env"),
            "AWS_BUCKET_NAME=from_parent_env\nOPENAI_API_KEY=sk-parent\n",
        )
        .unwrap();
        fs::write(dir.join(".env"), "AWS_S3_REGION=eu-west-1\n").unwrap();
        fs::write(
            dir.join(".env.development.local"),
            "AWS_BUCKET_NAME=from_local_dev\n",
        )
        .unwrap();

        let config = Config::load_from(DEFAULT_CONFIG_PATH, &dir, |_| None).unwrap();

        assert_eq!(config.s3.bucket, "from_local_dev");
        assert_eq!(config.s3.region, "eu-west-1");
        assert_eq!(config.openai.api_key, "sk-parent");
    }

    #[test]
    fn test_load_from_environment_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env.local"),
            "AWS_BUCKET_NAME=from_dotenv\nREDIS_PASSWORD=from_dotenv\n",
        )
        .unwrap();
        let env = HashMap::from([("AWS_BUCKET_NAME", "from_env"), ("REDIS_PASSWORD", "")]);

        let config = Config::load_from(DEFAULT_CONFIG_PATH, dir.path(), |name| {
            env.get(name).map(|value| value.to_string())
        })
        .unwrap();

        assert_eq!(config.s3.bucket, "from_env");
        assert_eq!(config.redis.password.as_deref(), Some("from_dotenv"));
    }

    #[test]
    fn test_load_from_without_dotenv() {
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_from(DEFAULT_CONFIG_PATH, dir.path(), |_| None).unwrap();

        assert!(config.s3.bucket.is_empty());
        assert_eq!(config.redis.password, None);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.worker.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(WorkerError::Config(_))));
    }
}
