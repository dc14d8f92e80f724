use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Deserialize)]
pub struct Config {
    pub game: GameConfig,
    pub word_bank: WordBankConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameConfig {
    pub max_misses: u8,
    pub finish_delay_ms: u64,
    pub event_buffer: usize, // 消息通道容量
}

#[derive(Debug, Deserialize, Clone)]
pub struct WordBankConfig {
    /// 文件路径或 http(s) 地址
    pub source: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Memory,
    File,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub key: String,
    pub directory: String,
    pub redis_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Config {
    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = config::Config::builder()
            .set_default("game.max_misses", i64::from(crate::game::MAX_MISSES))?
            .set_default("game.finish_delay_ms", crate::game::FINISH_DELAY.as_millis() as i64)?
            .set_default("game.event_buffer", 64_i64)?
            .set_default("word_bank.source", "words.json")?
            .set_default("storage.backend", "file")?
            .set_default("storage.key", crate::storage::DEFAULT_STORAGE_KEY)?
            .set_default("storage.directory", ".hangman")?
            .set_default("log.level", "info")?;
        Ok(builder)
    }

    pub fn load() -> Result<Self> {
        Self::assemble(config::File::with_name("config").required(false), None)
    }

    /// 从指定文件加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::assemble(config::File::from(path.as_ref()), None)
    }

    /// 合并默认值、配置文件和 `HANGMAN_` 环境变量，`env` 为 None 时读取进程环境
    fn assemble<S>(file: S, env: Option<config::Map<String, String>>) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Self::builder()?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("HANGMAN")
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()?;

        let config = config.try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.game.max_misses == 0 {
            anyhow::bail!("game.max_misses 必须大于 0");
        }
        if self.game.event_buffer == 0 {
            anyhow::bail!("game.event_buffer 必须大于 0");
        }
        Ok(())
    }

    /// 初始化全局配置
    pub fn init(path: Option<&Path>) -> Result<()> {
        let config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        CONFIG
            .set(config)
            .map_err(|_| anyhow::anyhow!("配置已经初始化"))?;
        Ok(())
    }

    /// 获取全局配置实例
    pub fn get() -> &'static Config {
        CONFIG.get().expect("配置未初始化，请先调用 Config::init()")
    }

    pub fn finish_delay(&self) -> Duration {
        self.game.finish_delay()
    }

    pub fn log_filter(&self) -> String {
        format!("hangman={}", self.log.level)
    }
}

impl GameConfig {
    pub fn finish_delay(&self) -> Duration {
        Duration::from_millis(self.finish_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[game]
max_misses = 8

[storage]
backend = "memory"

[log]
level = "debug"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.game.max_misses, 8);
        assert_eq!(config.finish_delay(), Duration::from_millis(500));
        assert_eq!(config.game.event_buffer, 64);
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
        assert_eq!(config.storage.key, "ahorcado_juego_guardado");
        assert_eq!(config.storage.redis_url, None);
        assert_eq!(config.word_bank.source, "words.json");
        assert_eq!(config.log_filter(), "hangman=debug");
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[game]\nmax_misses = 8\n").unwrap();

        let env: config::Map<String, String> = [
            ("HANGMAN_GAME__MAX_MISSES", "9"),
            ("HANGMAN_STORAGE__BACKEND", "memory"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        let config = Config::assemble(config::File::from(file.path()), Some(env)).unwrap();

        assert_eq!(config.game.max_misses, 9);
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
    }

    #[test]
    fn rejects_zero_limits() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[game]\nevent_buffer = 0\n").unwrap();
        assert!(Config::load_from(file.path()).is_err());

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[game]\nmax_misses = 0\n").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[storage]\nbackend = \"sqlite\"\n").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }
}
