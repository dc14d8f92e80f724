use crate::message::{BoardView, KeyState};
use crate::storage::GameSnapshot;
use crate::word_bank::{Difficulty, Word, WordRepository};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

/// 默认失误上限
pub const MAX_MISSES: u8 = 6;

/// 最后一个字母揭示后到显示结果之间的延迟
pub const FINISH_DELAY: Duration = Duration::from_millis(500);

/// 一局游戏
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub difficulty: Difficulty,
    pub word: Word,
    pub guessed_letters: BTreeSet<char>,
    pub miss_count: u8,
}

/// 猜测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuessOutcome {
    /// 已经猜过，状态不变
    Repeated,
    Hit { positions: Vec<usize>, solved: bool },
    Miss { miss_count: u8, exhausted: bool },
}

impl GuessOutcome {
    /// 本次猜测是否结束了这局游戏
    pub fn ends_game(&self) -> bool {
        matches!(
            self,
            GuessOutcome::Hit { solved: true, .. } | GuessOutcome::Miss { exhausted: true, .. }
        )
    }
}

impl GameSession {
    pub fn new(difficulty: Difficulty, word: Word) -> Self {
        GameSession {
            difficulty,
            word,
            guessed_letters: BTreeSet::new(),
            miss_count: 0,
        }
    }

    /// 从快照恢复，词语 id 无法解析时使用空词语
    pub fn from_snapshot(snapshot: GameSnapshot, words: &WordRepository) -> Self {
        let word = match words.find_by_id(snapshot.difficulty, &snapshot.word_id) {
            Some(word) => word.clone(),
            None => {
                warn!(
                    "无法在难度 '{}' 中找到词语 {}, 以空词语继续",
                    snapshot.difficulty, snapshot.word_id
                );
                Word::unresolved(snapshot.word_id)
            }
        };

        GameSession {
            difficulty: snapshot.difficulty,
            word,
            guessed_letters: snapshot.guessed_letters,
            miss_count: snapshot.miss_count,
        }
    }

    pub fn to_snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            difficulty: self.difficulty,
            word_id: self.word.id.clone(),
            guessed_letters: self.guessed_letters.clone(),
            miss_count: self.miss_count,
        }
    }

    /// 每个字母位置都已被猜中
    pub fn is_solved(&self) -> bool {
        self.word
            .text
            .chars()
            .all(|c| self.guessed_letters.contains(&c))
    }

    pub fn is_lost(&self, max_misses: u8) -> bool {
        self.miss_count >= max_misses
    }

    /// 字母在词语中的位置
    pub fn positions_of(&self, letter: char) -> Vec<usize> {
        self.word
            .text
            .chars()
            .enumerate()
            .filter(|(_, c)| *c == letter)
            .map(|(i, _)| i)
            .collect()
    }

    /// 猜一个字母，字母必须已经是大写
    pub fn guess(&mut self, letter: char, max_misses: u8) -> GuessOutcome {
        if !self.guessed_letters.insert(letter) {
            return GuessOutcome::Repeated;
        }

        let positions = self.positions_of(letter);
        if positions.is_empty() {
            self.miss_count = self.miss_count.saturating_add(1).min(max_misses);
            GuessOutcome::Miss {
                miss_count: self.miss_count,
                exhausted: self.is_lost(max_misses),
            }
        } else {
            GuessOutcome::Hit {
                positions,
                solved: self.is_solved(),
            }
        }
    }

    pub fn key_state(&self, letter: char) -> KeyState {
        if !self.guessed_letters.contains(&letter) {
            KeyState::Unused
        } else if self.word.text.contains(letter) {
            KeyState::Correct
        } else {
            KeyState::Incorrect
        }
    }

    /// 由会话字段计算界面状态
    pub fn board(&self, max_misses: u8) -> BoardView {
        BoardView {
            difficulty: self.difficulty,
            slots: self
                .word
                .text
                .chars()
                .map(|c| self.guessed_letters.contains(&c).then_some(c))
                .collect(),
            keys: ('A'..='Z')
                .map(|letter| (letter, self.key_state(letter)))
                .collect(),
            miss_count: self.miss_count,
            max_misses,
        }
    }
}

/// 把输入转换为大写字母，非 A-Z 返回 None
pub fn normalize_letter(letter: char) -> Option<char> {
    let letter = letter.to_ascii_uppercase();
    letter.is_ascii_uppercase().then_some(letter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStateType {
    Idle,
    Active,
    Revealing,
    Finished,
}

/// 游戏状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GameState {
    /// 菜单
    #[default]
    Idle,
    Active { session: GameSession },
    /// 结果已确定，等待揭示动画结束
    Revealing { session: GameSession, won: bool },
    Finished { session: GameSession, won: bool },
}

impl GameState {
    pub fn new() -> Self {
        GameState::Idle
    }

    /// 开始新的一局，任何状态下都允许
    pub fn start(&mut self, session: GameSession) {
        *self = GameState::Active { session };
    }

    /// 猜字母
    pub fn guess(&mut self, letter: char, max_misses: u8) -> Result<GuessOutcome, String> {
        let letter = normalize_letter(letter).ok_or_else(|| format!("无效的字母: {:?}", letter))?;

        match self {
            GameState::Active { session } => {
                let outcome = session.guess(letter, max_misses);
                let won = match outcome {
                    GuessOutcome::Hit { solved: true, .. } => Some(true),
                    GuessOutcome::Miss {
                        exhausted: true, ..
                    } => Some(false),
                    _ => None,
                };

                if let Some(won) = won {
                    let session = session.clone();
                    *self = GameState::Revealing { session, won };
                }

                Ok(outcome)
            }
            _ => Err("当前没有进行中的游戏".to_string()),
        }
    }

    /// 揭示结束，进入结果阶段
    pub fn conclude(&mut self) -> Result<bool, String> {
        match self {
            GameState::Revealing { session, won } => {
                let won = *won;
                let session = session.clone();
                *self = GameState::Finished { session, won };
                Ok(won)
            }
            _ => Err("当前不是揭示阶段".to_string()),
        }
    }

    /// 离开进行中的游戏，返回离开时的会话和它是否仍可继续
    pub fn leave(&mut self) -> Result<(GameSession, bool), String> {
        match std::mem::take(self) {
            GameState::Active { session } => Ok((session, true)),
            GameState::Revealing { session, .. } => Ok((session, false)),
            other => {
                *self = other;
                Err("当前没有进行中的游戏".to_string())
            }
        }
    }

    /// 结果阶段返回菜单
    pub fn return_to_menu(&mut self) -> Result<(), String> {
        match self {
            GameState::Finished { .. } | GameState::Revealing { .. } => {
                *self = GameState::Idle;
                Ok(())
            }
            _ => Err("游戏尚未结束".to_string()),
        }
    }

    pub fn get_state_type(&self) -> GameStateType {
        match self {
            GameState::Idle => GameStateType::Idle,
            GameState::Active { .. } => GameStateType::Active,
            GameState::Revealing { .. } => GameStateType::Revealing,
            GameState::Finished { .. } => GameStateType::Finished,
        }
    }

    pub fn session(&self) -> Option<&GameSession> {
        match self {
            GameState::Idle => None,
            GameState::Active { session }
            | GameState::Revealing { session, .. }
            | GameState::Finished { session, .. } => Some(session),
        }
    }

    /// 游戏结果，尚未结束时为 None
    pub fn outcome(&self) -> Option<bool> {
        match self {
            GameState::Revealing { won, .. } | GameState::Finished { won, .. } => Some(*won),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session(text: &str) -> GameSession {
        GameSession::new(Difficulty::Easy, Word::new("t001", text))
    }

    fn active(text: &str) -> GameState {
        let mut state = GameState::new();
        state.start(session(text));
        state
    }

    #[test]
    fn cat_wins_in_any_order() {
        for order in [['C', 'A', 'T'], ['T', 'C', 'A'], ['A', 'T', 'C']] {
            let mut state = active("CAT");
            for letter in order {
                state.guess(letter, MAX_MISSES).unwrap();
            }
            assert_eq!(state.get_state_type(), GameStateType::Revealing);
            assert_eq!(state.outcome(), Some(true));
        }
    }

    #[test]
    fn misses_do_not_prevent_a_win() {
        let mut state = active("CAT");
        for letter in ['C', 'X', 'A', 'Y'] {
            state.guess(letter, MAX_MISSES).unwrap();
        }
        assert_eq!(state.get_state_type(), GameStateType::Active);

        let outcome = state.guess('T', MAX_MISSES).unwrap();
        assert_eq!(
            outcome,
            GuessOutcome::Hit {
                positions: vec![2],
                solved: true
            }
        );
        assert_eq!(state.session().unwrap().miss_count, 2);
        assert_eq!(state.outcome(), Some(true));
    }

    #[test]
    fn sixth_miss_loses() {
        let mut state = active("CAT");
        let mut last = 0;
        for (i, letter) in ['B', 'D', 'E', 'F', 'G'].into_iter().enumerate() {
            let outcome = state.guess(letter, MAX_MISSES).unwrap();
            assert_eq!(
                outcome,
                GuessOutcome::Miss {
                    miss_count: i as u8 + 1,
                    exhausted: false
                }
            );
            let misses = state.session().unwrap().miss_count;
            assert!(misses > last);
            last = misses;
        }
        assert_eq!(state.get_state_type(), GameStateType::Active);

        let outcome = state.guess('H', MAX_MISSES).unwrap();
        assert!(outcome.ends_game());
        assert_eq!(state.outcome(), Some(false));
        assert_eq!(state.session().unwrap().miss_count, MAX_MISSES);

        // 结束后不再接受猜测
        assert!(state.guess('I', MAX_MISSES).is_err());
        assert_eq!(state.session().unwrap().miss_count, MAX_MISSES);
    }

    #[test]
    fn repeated_guess_is_a_no_op() {
        let mut once = active("GATOS");
        once.guess('X', MAX_MISSES).unwrap();

        let mut twice = active("GATOS");
        twice.guess('X', MAX_MISSES).unwrap();
        assert_eq!(twice.guess('X', MAX_MISSES).unwrap(), GuessOutcome::Repeated);
        assert_eq!(twice.guess('x', MAX_MISSES).unwrap(), GuessOutcome::Repeated);

        assert_eq!(once, twice);
    }

    #[test]
    fn repeated_letters_fill_together() {
        let mut s = session("PERRO");
        assert_eq!(
            s.guess('R', MAX_MISSES),
            GuessOutcome::Hit {
                positions: vec![2, 3],
                solved: false
            }
        );
        assert_eq!(
            s.board(MAX_MISSES).slots,
            vec![None, None, Some('R'), Some('R'), None]
        );
    }

    #[test]
    fn lowercase_is_normalized_and_symbols_rejected() {
        let mut state = active("GATOS");
        assert_eq!(
            state.guess('g', MAX_MISSES).unwrap(),
            GuessOutcome::Hit {
                positions: vec![0],
                solved: false
            }
        );
        assert!(state.guess('1', MAX_MISSES).is_err());
        assert!(state.guess('Ñ', MAX_MISSES).is_err());
        assert_eq!(state.session().unwrap().guessed_letters.len(), 1);
    }

    #[test]
    fn guess_requires_active_game() {
        let mut state = GameState::new();
        assert!(state.guess('A', MAX_MISSES).is_err());
        assert_eq!(state, GameState::Idle);
    }

    #[test]
    fn restore_from_snapshot() {
        let words = WordRepository::fallback();
        let snapshot = GameSnapshot {
            difficulty: Difficulty::Easy,
            word_id: "f001".to_string(),
            guessed_letters: ['G', 'Z'].into_iter().collect(),
            miss_count: 1,
        };

        let session = GameSession::from_snapshot(snapshot.clone(), &words);
        assert_eq!(session.word, Word::new("f001", "GATOS"));
        assert_eq!(session.to_snapshot(), snapshot);

        let board = session.board(MAX_MISSES);
        assert_eq!(board.slots, vec![Some('G'), None, None, None, None]);
        assert_eq!(board.keys[&'G'], KeyState::Correct);
        assert_eq!(board.keys[&'Z'], KeyState::Incorrect);
        assert_eq!(board.keys[&'A'], KeyState::Unused);
        assert_eq!(board.keys.len(), 26);
        assert_eq!(board.miss_count, 1);
    }

    #[test]
    fn unresolved_word_degrades_to_empty() {
        let words = WordRepository::fallback();
        let snapshot = GameSnapshot {
            difficulty: Difficulty::Hard,
            word_id: "f001".to_string(),
            guessed_letters: BTreeSet::new(),
            miss_count: 0,
        };

        let session = GameSession::from_snapshot(snapshot, &words);
        assert_eq!(session.word, Word::unresolved("f001"));
        assert!(session.board(MAX_MISSES).slots.is_empty());

        // 空词语下每次猜测都是失误
        let mut state = GameState::new();
        state.start(session);
        for letter in ['A', 'B', 'C', 'D', 'E', 'F'] {
            assert!(matches!(
                state.guess(letter, MAX_MISSES).unwrap(),
                GuessOutcome::Miss { .. }
            ));
        }
        assert_eq!(state.outcome(), Some(false));
    }

    #[test]
    fn leave_and_menu_transitions() {
        let mut state = active("CAT");
        let (session, resumable) = state.leave().unwrap();
        assert!(resumable);
        assert_eq!(session.word.text, "CAT");
        assert_eq!(state, GameState::Idle);
        assert!(state.leave().is_err());
        assert!(state.return_to_menu().is_err());

        let mut state = active("A");
        state.guess('A', MAX_MISSES).unwrap();
        assert_eq!(state.conclude(), Ok(true));
        assert!(state.conclude().is_err());
        assert!(state.leave().is_err());
        assert_eq!(state.get_state_type(), GameStateType::Finished);
        state.return_to_menu().unwrap();
        assert_eq!(state, GameState::Idle);
    }
}
