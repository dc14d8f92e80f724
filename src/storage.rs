use crate::Result;
use crate::config::{StorageBackendKind, StorageConfig};
use crate::word_bank::Difficulty;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 默认存储键
pub const DEFAULT_STORAGE_KEY: &str = "ahorcado_juego_guardado";

/// 可恢复的游戏快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GameSnapshot {
    #[serde(alias = "dificultad")]
    pub difficulty: Difficulty,
    #[serde(alias = "palabraId")]
    pub word_id: String,
    #[serde(alias = "letrasAdivinadas")]
    pub guessed_letters: BTreeSet<char>,
    #[serde(alias = "fallos")]
    pub miss_count: u8,
}

impl GameSnapshot {
    /// 校验快照结构，任何不一致都视为没有快照
    pub fn validate(&self, max_misses: u8) -> std::result::Result<(), String> {
        if self.word_id.is_empty() {
            return Err("wordId 为空".to_string());
        }

        if let Some(letter) = self
            .guessed_letters
            .iter()
            .find(|letter| !letter.is_ascii_uppercase())
        {
            return Err(format!("无效的字母: {:?}", letter));
        }

        if self.miss_count >= max_misses {
            return Err(format!(
                "失误次数 {} 已达到上限 {}",
                self.miss_count, max_misses
            ));
        }

        if usize::from(self.miss_count) > self.guessed_letters.len() {
            return Err(format!(
                "失误次数 {} 大于已猜字母数 {}",
                self.miss_count,
                self.guessed_letters.len()
            ));
        }

        Ok(())
    }
}

/// 键值存储后端
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send;
    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
    fn contains(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// 单一存储键下的快照读写
pub struct SnapshotStore<B> {
    backend: B,
    key: String,
    max_misses: u8,
}

impl<B: KeyValueStore> SnapshotStore<B> {
    pub fn new(backend: B, key: impl Into<String>, max_misses: u8) -> Self {
        SnapshotStore {
            backend,
            key: key.into(),
            max_misses,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 保存快照，覆盖旧值
    pub async fn save(&self, snapshot: &GameSnapshot) -> Result<()> {
        let value =
            serde_json::to_string(snapshot).map_err(|e| crate::Error::Storage(e.to_string()))?;
        self.backend.set(&self.key, value).await?;
        debug!("快照已保存: {}", self.key);
        Ok(())
    }

    /// 加载快照，缺失或格式不正确时返回 None
    pub async fn load(&self) -> Result<Option<GameSnapshot>> {
        let Some(value) = self.backend.get(&self.key).await? else {
            return Ok(None);
        };

        let snapshot: GameSnapshot = match serde_json::from_str(&value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("快照格式错误, 忽略: {}", e);
                return Ok(None);
            }
        };

        if let Err(e) = snapshot.validate(self.max_misses) {
            warn!("快照校验失败, 忽略: {}", e);
            return Ok(None);
        }

        Ok(Some(snapshot))
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.remove(&self.key).await?;
        debug!("快照已清除: {}", self.key);
        Ok(())
    }

    pub async fn exists(&self) -> Result<bool> {
        self.backend.contains(&self.key).await
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().await.contains_key(key))
    }
}

/// 文件存储，每个键对应 `<directory>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        FileStore {
            directory: directory.into(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(crate::Error::Storage(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        // 先写临时文件再替换，避免留下半截内容
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(crate::Error::Storage(e.to_string())),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        tokio::fs::try_exists(self.path(key))
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))
    }
}

/// Redis 存储
#[derive(Clone)]
pub struct RedisStore {
    manager: Arc<Mutex<ConnectionManager>>,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| crate::Error::Storage(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))?;
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }
}

impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.lock().await;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.manager.lock().await;
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.lock().await;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.lock().await;
        conn.exists::<_, bool>(key)
            .await
            .map_err(|e| crate::Error::Storage(e.to_string()))
    }
}

/// 按配置选择的存储后端
pub enum StorageBackend {
    Memory(MemoryStore),
    File(FileStore),
    Redis(RedisStore),
}

impl StorageBackend {
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let backend = match config.backend {
            StorageBackendKind::Memory => StorageBackend::Memory(MemoryStore::new()),
            StorageBackendKind::File => StorageBackend::File(FileStore::new(&config.directory)),
            StorageBackendKind::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    crate::Error::Config("redis 存储需要配置 storage.redis_url".to_string())
                })?;
                StorageBackend::Redis(RedisStore::new(url).await?)
            }
        };
        Ok(backend)
    }
}

impl KeyValueStore for StorageBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            StorageBackend::Memory(store) => store.get(key).await,
            StorageBackend::File(store) => store.get(key).await,
            StorageBackend::Redis(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        match self {
            StorageBackend::Memory(store) => store.set(key, value).await,
            StorageBackend::File(store) => store.set(key, value).await,
            StorageBackend::Redis(store) => store.set(key, value).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self {
            StorageBackend::Memory(store) => store.remove(key).await,
            StorageBackend::File(store) => store.remove(key).await,
            StorageBackend::Redis(store) => store.remove(key).await,
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        match self {
            StorageBackend::Memory(store) => store.contains(key).await,
            StorageBackend::File(store) => store.contains(key).await,
            StorageBackend::Redis(store) => store.contains(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn snapshot() -> GameSnapshot {
        GameSnapshot {
            difficulty: Difficulty::Easy,
            word_id: "f001".to_string(),
            guessed_letters: ['G', 'X'].into_iter().collect(),
            miss_count: 1,
        }
    }

    fn memory_store() -> SnapshotStore<MemoryStore> {
        SnapshotStore::new(MemoryStore::new(), DEFAULT_STORAGE_KEY, 6)
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = memory_store();
        assert!(!store.exists().await.unwrap());
        assert_eq!(store.load().await.unwrap(), None);

        store.save(&snapshot()).await.unwrap();
        assert!(store.exists().await.unwrap());
        assert_eq!(store.load().await.unwrap(), Some(snapshot()));
    }

    #[tokio::test]
    async fn save_overwrites_previous_value() {
        let store = memory_store();
        store.save(&snapshot()).await.unwrap();

        let mut newer = snapshot();
        newer.guessed_letters.insert('A');
        store.save(&newer).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn clear_is_unconditional() {
        let store = memory_store();
        store.clear().await.unwrap();

        store.save(&snapshot()).await.unwrap();
        store.clear().await.unwrap();
        assert!(!store.exists().await.unwrap());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[test]
    fn snapshot_accepts_legacy_field_names() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "difficulty": "easy",
                "wordId": "f001",
                "guessedLetters": ["G", "X"],
                "missCount": 1
            })
        );

        let legacy: GameSnapshot = serde_json::from_str(
            r#"{"dificultad":"facil","palabraId":"f001","letrasAdivinadas":["X","G"],"fallos":1}"#,
        )
        .unwrap();
        assert_eq!(legacy, snapshot());
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_values_read_as_missing() {
        let store = memory_store();
        let bad = [
            "not json",
            r#"{"difficulty":"easy","wordId":"f001","guessedLetters":["GA"],"missCount":0}"#,
            r#"{"difficulty":"easy","wordId":"f001","guessedLetters":["g"],"missCount":0}"#,
            r#"{"difficulty":"easy","wordId":"f001","guessedLetters":[],"missCount":0,"extra":1}"#,
            r#"{"difficulty":"extreme","wordId":"f001","guessedLetters":[],"missCount":0}"#,
            r#"{"difficulty":"easy","wordId":"","guessedLetters":[],"missCount":0}"#,
            r#"{"difficulty":"easy","wordId":"f001","guessedLetters":["A"],"missCount":2}"#,
            r#"{"difficulty":"easy","wordId":"f001","guessedLetters":["A","B","C","D","E","F"],"missCount":6}"#,
        ];

        for value in bad {
            store
                .backend()
                .set(store.key(), value.to_string())
                .await
                .unwrap();
            assert_eq!(store.load().await.unwrap(), None, "{}", value);
            // 格式错误的值依然存在
            assert!(store.exists().await.unwrap());
        }
        assert!(logs_contain("忽略"));
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(
            FileStore::new(dir.path().join("saves")),
            DEFAULT_STORAGE_KEY,
            6,
        );

        assert!(!store.exists().await.unwrap());
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();

        store.save(&snapshot()).await.unwrap();
        assert!(store.exists().await.unwrap());

        // 模拟重启：新的存储实例读取同一目录
        let reopened = SnapshotStore::new(
            FileStore::new(dir.path().join("saves")),
            DEFAULT_STORAGE_KEY,
            6,
        );
        assert_eq!(reopened.load().await.unwrap(), Some(snapshot()));

        reopened.clear().await.unwrap();
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn backend_enum_dispatches() {
        let config = StorageConfig {
            backend: StorageBackendKind::Memory,
            key: DEFAULT_STORAGE_KEY.to_string(),
            directory: ".".to_string(),
            redis_url: None,
        };
        let store = SnapshotStore::new(StorageBackend::open(&config).await.unwrap(), &config.key, 6);

        store.save(&snapshot()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snapshot()));

        let redis_without_url = StorageConfig {
            backend: StorageBackendKind::Redis,
            ..config
        };
        assert!(StorageBackend::open(&redis_without_url).await.is_err());
    }
}
