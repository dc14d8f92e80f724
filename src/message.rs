use crate::word_bank::Difficulty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 发给界面的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GameMessage {
    SessionStarted { board: BoardView },
    /// 恢复存档后重新计算的界面状态
    SessionRestored { board: BoardView },
    LetterRevealed { letter: char, positions: Vec<usize> },
    LetterMissed { letter: char, miss_count: u8 },
    GameFinished { won: bool, word: String },
    /// 是否显示“继续”按钮
    ResumeAvailable { available: bool },
    ReturnedToMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Unused,
    Correct,
    Incorrect,
}

/// 界面状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardView {
    pub difficulty: Difficulty,
    /// 每个字母位置，未揭示为 None
    pub slots: Vec<Option<char>>,
    pub keys: BTreeMap<char, KeyState>,
    pub miss_count: u8,
    pub max_misses: u8,
}

impl BoardView {
    /// 未揭示的位置显示为 `_`
    pub fn masked_word(&self) -> String {
        self.slots
            .iter()
            .map(|slot| slot.unwrap_or('_').to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn used_letters(&self) -> impl Iterator<Item = (char, KeyState)> + '_ {
        self.keys
            .iter()
            .filter(|(_, state)| **state != KeyState::Unused)
            .map(|(letter, state)| (*letter, *state))
    }
}
