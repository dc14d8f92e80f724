use crate::Result;
use anyhow::Context;
use rand::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

/// 难度为空时返回的占位词 id
pub const SENTINEL_ID: &str = "null";
/// 难度为空时返回的占位词
pub const SENTINEL_TEXT: &str = "VACIO";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Difficulty {
    #[serde(rename = "easy", alias = "facil")]
    Easy,
    #[serde(rename = "medium", alias = "intermedio")]
    Medium,
    #[serde(rename = "hard", alias = "dificil")]
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" | "facil" => Some(Difficulty::Easy),
            "medium" | "intermedio" => Some(Difficulty::Medium),
            "hard" | "dificil" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: String,
    #[serde(alias = "palabra")]
    pub text: String,
}

impl Word {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Word {
            id: id.into(),
            text: text.into(),
        }
    }

    /// 占位词
    pub fn sentinel() -> Self {
        Word::new(SENTINEL_ID, SENTINEL_TEXT)
    }

    /// 无法解析的词语，保留 id，没有字母
    pub fn unresolved(id: impl Into<String>) -> Self {
        Word::new(id, "")
    }

    pub fn is_playable(&self) -> bool {
        is_playable_text(&self.text)
    }
}

fn is_playable_text(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_uppercase())
}

/// 词库文件格式
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct WordBankData {
    pub tiers: HashMap<Difficulty, Vec<Word>>,
}

impl<'de> Deserialize<'de> for WordBankData {
    /// 未知难度跳过，不影响其他难度
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = HashMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut tiers: HashMap<Difficulty, Vec<Word>> = HashMap::new();

        for (key, value) in raw {
            let Some(difficulty) = Difficulty::parse(&key) else {
                warn!("忽略未知难度: {}", key);
                continue;
            };
            let words: Vec<Word> = serde_json::from_value(value).map_err(de::Error::custom)?;
            tiers.entry(difficulty).or_default().extend(words);
        }

        Ok(WordBankData { tiers })
    }
}

impl WordBankData {
    pub fn from_json(content: &str) -> Result<Self> {
        let data = serde_json::from_str(content).with_context(|| "无法解析词库文件格式")?;
        Ok(data)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取词库文件: {}", path.display()))?;
        Self::from_json(&content)
    }

    /// 默认词库
    pub fn fallback() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(
            Difficulty::Easy,
            vec![
                Word::new("f001", "GATOS"),
                Word::new("f002", "PERRO"),
                Word::new("f003", "ROBOT"),
            ],
        );
        tiers.insert(
            Difficulty::Medium,
            vec![
                Word::new("i001", "JAVASCRIPT"),
                Word::new("i002", "MONTANA"),
            ],
        );
        tiers.insert(
            Difficulty::Hard,
            vec![
                Word::new("d001", "PROGRAMADOR"),
                Word::new("d002", "TECNOLOGIA"),
            ],
        );
        WordBankData { tiers }
    }

    /// 验证词库完整性
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for difficulty in Difficulty::ALL {
            let Some(words) = self.tiers.get(&difficulty) else {
                errors.push(format!("难度 '{}' 缺失", difficulty));
                continue;
            };

            if words.is_empty() {
                errors.push(format!("难度 '{}' 没有词语", difficulty));
            }

            let mut seen = HashSet::new();
            for (i, word) in words.iter().enumerate() {
                if !seen.insert(word.id.as_str()) {
                    errors.push(format!("难度 '{}' 的 id '{}' 重复", difficulty, word.id));
                }

                if word.text.is_empty() {
                    errors.push(format!("难度 '{}' 第{}个词语为空", difficulty, i + 1));
                } else if !is_playable_text(&word.text.to_uppercase()) {
                    errors.push(format!(
                        "难度 '{}' 第{}个词语 '{}' 包含非字母字符",
                        difficulty,
                        i + 1,
                        word.text
                    ));
                }
            }
        }

        errors
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordBankStats {
    pub total_words: usize,
    pub tier_counts: HashMap<Difficulty, usize>,
}

/// 按难度划分的只读词库
#[derive(Debug, Clone, Default)]
pub struct WordRepository {
    tiers: HashMap<Difficulty, Vec<Word>>,
}

impl WordRepository {
    /// 从URL或文件加载词库，失败时使用默认词库
    pub async fn load(source: &str) -> Self {
        match Self::fetch(source).await {
            Ok(data) => {
                let repository = Self::from_data(data);
                debug!("词库加载成功: {} 个词语", repository.stats().total_words);
                repository
            }
            Err(e) => {
                warn!("无法加载词库 {}: {}, 使用默认词库", source, e);
                Self::fallback()
            }
        }
    }

    async fn fetch(source: &str) -> Result<WordBankData> {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let data = reqwest::get(url)
                    .await
                    .and_then(|response| response.error_for_status())
                    .with_context(|| format!("无法请求词库: {}", source))?
                    .json::<WordBankData>()
                    .await
                    .with_context(|| "无法解析词库文件格式")?;
                Ok(data)
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| crate::Error::WordBank(format!("无效的文件地址: {}", source)))?;
                Self::read_file(&path).await
            }
            _ => Self::read_file(Path::new(source)).await,
        }
    }

    async fn read_file(path: &Path) -> Result<WordBankData> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("无法读取词库文件: {}", path.display()))?;
        WordBankData::from_json(&content)
    }

    pub fn fallback() -> Self {
        Self::from_data(WordBankData::fallback())
    }

    /// 转为大写并过滤无效词语
    pub fn from_data(data: WordBankData) -> Self {
        let tiers = data
            .tiers
            .into_iter()
            .map(|(difficulty, words)| {
                let words = words
                    .into_iter()
                    .map(|word| Word::new(word.id, word.text.to_uppercase()))
                    .filter(|word| {
                        let playable = word.is_playable();
                        if !playable {
                            warn!("跳过无效词语 {} ({}): '{}'", word.id, difficulty, word.text);
                        }
                        playable
                    })
                    .collect();
                (difficulty, words)
            })
            .collect();

        WordRepository { tiers }
    }

    pub fn to_data(&self) -> WordBankData {
        WordBankData {
            tiers: self.tiers.clone(),
        }
    }

    pub fn words(&self, difficulty: Difficulty) -> &[Word] {
        self.tiers
            .get(&difficulty)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn pick_random(&self, difficulty: Difficulty) -> Word {
        let mut rng = rand::rng();
        self.pick_random_with(difficulty, &mut rng)
    }

    pub fn pick_random_with<R: Rng + ?Sized>(&self, difficulty: Difficulty, rng: &mut R) -> Word {
        match self.words(difficulty).choose(rng) {
            Some(word) => word.clone(),
            None => {
                warn!("难度 '{}' 没有词语, 使用占位词", difficulty);
                Word::sentinel()
            }
        }
    }

    pub fn find_by_id(&self, difficulty: Difficulty, id: &str) -> Option<&Word> {
        self.words(difficulty).iter().find(|word| word.id == id)
    }

    /// 添加词语到指定难度
    pub fn add(&mut self, difficulty: Difficulty, word: Word) -> Result<()> {
        let word = Word::new(word.id, word.text.to_uppercase());
        if !word.is_playable() {
            return Err(crate::Error::WordBank(format!(
                "词语 '{}' 只能包含字母",
                word.text
            )));
        }
        if self.find_by_id(difficulty, &word.id).is_some() {
            return Err(crate::Error::WordBank(format!(
                "难度 '{}' 已存在 id '{}'",
                difficulty, word.id
            )));
        }

        self.tiers.entry(difficulty).or_default().push(word);
        Ok(())
    }

    /// 保存词库到文件
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(&self.to_data()).with_context(|| "无法序列化词库")?;
        std::fs::write(path, content)
            .with_context(|| format!("无法写入词库文件: {}", path.display()))?;
        Ok(())
    }

    /// 获取词库统计信息
    pub fn stats(&self) -> WordBankStats {
        let tier_counts: HashMap<Difficulty, usize> = Difficulty::ALL
            .into_iter()
            .map(|difficulty| (difficulty, self.words(difficulty).len()))
            .collect();

        WordBankStats {
            total_words: tier_counts.values().sum(),
            tier_counts,
        }
    }
}
