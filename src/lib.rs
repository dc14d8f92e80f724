pub mod config;
pub mod game;
pub mod machine;
pub mod message;
pub mod storage;
pub mod word_bank;

pub use config::Config;
pub use game::{GameSession, GameState, GameStateType, GuessOutcome};
pub use machine::{GameSettings, GameStateMachine};
pub use message::{BoardView, GameMessage, KeyState};
pub use storage::*;
pub use word_bank::{Difficulty, Word, WordRepository};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("数据源错误: {0}")]
    Source(#[from] anyhow::Error),
    #[error("游戏错误: {0}")]
    Game(String),
    #[error("词库错误: {0}")]
    WordBank(String),
    #[error("存储错误: {0}")]
    Storage(String),
    #[error("配置错误: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
