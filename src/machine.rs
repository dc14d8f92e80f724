use crate::Result;
use crate::config::GameConfig;
use crate::game::{
    FINISH_DELAY, GameSession, GameState, GameStateType, GuessOutcome, MAX_MISSES,
    normalize_letter,
};
use crate::message::{BoardView, GameMessage};
use crate::storage::{GameSnapshot, KeyValueStore, SnapshotStore};
use crate::word_bank::{Difficulty, WordRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSettings {
    pub max_misses: u8,
    pub finish_delay: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            max_misses: MAX_MISSES,
            finish_delay: FINISH_DELAY,
        }
    }
}

impl From<&GameConfig> for GameSettings {
    fn from(config: &GameConfig) -> Self {
        GameSettings {
            max_misses: config.max_misses,
            finish_delay: config.finish_delay(),
        }
    }
}

struct Inner {
    state: GameState,
    /// 每次开始或恢复游戏时递增，过期的结束任务据此失效
    generation: u64,
    pending_finish: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_pending(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.pending_finish.take() {
            handle.abort();
        }
    }
}

/// 游戏状态机，负责状态转换、存档和界面消息
pub struct GameStateMachine<B> {
    inner: Arc<Mutex<Inner>>,
    words: Arc<WordRepository>,
    store: Arc<SnapshotStore<B>>,
    events: mpsc::Sender<GameMessage>,
    settings: GameSettings,
}

impl<B: KeyValueStore> GameStateMachine<B> {
    pub fn new(
        words: Arc<WordRepository>,
        store: Arc<SnapshotStore<B>>,
        settings: GameSettings,
        events: mpsc::Sender<GameMessage>,
    ) -> Self {
        GameStateMachine {
            inner: Arc::new(Mutex::new(Inner {
                state: GameState::new(),
                generation: 0,
                pending_finish: None,
            })),
            words,
            store,
            events,
            settings,
        }
    }

    /// 开始新游戏，清除旧存档
    pub async fn start(&self, difficulty: Difficulty) -> BoardView {
        let mut inner = self.inner.lock().await;
        inner.cancel_pending();
        self.clear_snapshot().await;

        let word = self.words.pick_random(difficulty);
        debug!("开始新游戏: {} ({})", word.id, difficulty);
        let session = GameSession::new(difficulty, word);
        let board = session.board(self.settings.max_misses);
        inner.state.start(session);

        // 持有锁时发送，保证消息顺序与状态转换一致
        publish(
            &self.events,
            GameMessage::SessionStarted {
                board: board.clone(),
            },
        )
        .await;
        board
    }

    /// 从存档恢复，没有存档时不做任何事
    pub async fn resume(&self) -> Option<BoardView> {
        let mut inner = self.inner.lock().await;

        let snapshot = match self.store.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("没有可恢复的存档");
                return None;
            }
            Err(e) => {
                error!("读取存档失败: {}", e);
                return None;
            }
        };

        let session = GameSession::from_snapshot(snapshot, &self.words);
        if session.word.is_playable() && session.is_solved() {
            // 已经猜中的词语没有可继续的内容
            warn!("存档中的词语 {} 已全部揭示, 丢弃存档", session.word.id);
            self.clear_snapshot().await;
            return None;
        }

        inner.cancel_pending();
        debug!(
            "恢复游戏: {} ({}), 已猜 {} 个字母, 失误 {}",
            session.word.id,
            session.difficulty,
            session.guessed_letters.len(),
            session.miss_count
        );
        let board = session.board(self.settings.max_misses);
        inner.state.start(session);

        publish(
            &self.events,
            GameMessage::SessionRestored {
                board: board.clone(),
            },
        )
        .await;
        Some(board)
    }

    /// 猜字母
    pub async fn guess_letter(&self, letter: char) -> Result<GuessOutcome> {
        let letter = normalize_letter(letter)
            .ok_or_else(|| crate::Error::Game(format!("无效的字母: {:?}", letter)))?;

        let mut inner = self.inner.lock().await;
        let outcome = inner
            .state
            .guess(letter, self.settings.max_misses)
            .map_err(crate::Error::Game)?;

        match &outcome {
            GuessOutcome::Repeated => {
                debug!("字母 {} 已经猜过", letter);
                return Ok(outcome);
            }
            GuessOutcome::Hit { positions, .. } => {
                publish(
                    &self.events,
                    GameMessage::LetterRevealed {
                        letter,
                        positions: positions.clone(),
                    },
                )
                .await;
            }
            GuessOutcome::Miss { miss_count, .. } => {
                publish(
                    &self.events,
                    GameMessage::LetterMissed {
                        letter,
                        miss_count: *miss_count,
                    },
                )
                .await;
            }
        }

        if outcome.ends_game() {
            self.clear_snapshot().await;
            self.schedule_finish(&mut inner);
        } else if let Some(session) = inner.state.session() {
            self.save_snapshot(&session.to_snapshot()).await;
        }

        Ok(outcome)
    }

    /// 保存并返回菜单
    pub async fn exit_saving(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let (session, resumable) = inner.state.leave().map_err(crate::Error::Game)?;
        inner.cancel_pending();

        // 已经结束的游戏不再存档
        if resumable {
            self.save_snapshot(&session.to_snapshot()).await;
        }

        self.announce_menu().await;
        Ok(())
    }

    /// 放弃存档并返回菜单
    pub async fn exit_discarding(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state.leave().map_err(crate::Error::Game)?;
        inner.cancel_pending();
        self.clear_snapshot().await;

        self.announce_menu().await;
        Ok(())
    }

    /// 结果页返回菜单，不修改存档
    pub async fn return_to_menu(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.state.return_to_menu().map_err(crate::Error::Game)?;
        inner.cancel_pending();

        self.announce_menu().await;
        Ok(())
    }

    /// 是否存在可继续的存档
    pub async fn has_saved_game(&self) -> bool {
        match self.store.exists().await {
            Ok(exists) => exists,
            Err(e) => {
                error!("检查存档失败: {}", e);
                false
            }
        }
    }

    pub async fn state_type(&self) -> GameStateType {
        self.inner.lock().await.state.get_state_type()
    }

    pub async fn session(&self) -> Option<GameSession> {
        self.inner.lock().await.state.session().cloned()
    }

    pub async fn board(&self) -> Option<BoardView> {
        self.session()
            .await
            .map(|session| session.board(self.settings.max_misses))
    }

    /// 游戏结果，尚未结束时为 None
    pub async fn outcome(&self) -> Option<bool> {
        self.inner.lock().await.state.outcome()
    }

    pub fn settings(&self) -> GameSettings {
        self.settings
    }

    pub fn words(&self) -> &WordRepository {
        &self.words
    }

    fn schedule_finish(&self, inner: &mut Inner) {
        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let events = self.events.clone();
        let delay = self.settings.finish_delay;

        inner.pending_finish = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut inner = shared.lock().await;
            if inner.generation != generation {
                debug!("忽略过期的结束任务: {} != {}", generation, inner.generation);
                return;
            }
            inner.pending_finish = None;

            match inner.state.conclude() {
                Ok(won) => {
                    let word = inner
                        .state
                        .session()
                        .map(|session| session.word.text.clone())
                        .unwrap_or_default();
                    debug!("游戏结束: {} ({})", if won { "胜利" } else { "失败" }, word);
                    publish(&events, GameMessage::GameFinished { won, word }).await;
                }
                Err(e) => debug!("结束任务未执行: {}", e),
            }
        }));
    }

    async fn announce_menu(&self) {
        publish(&self.events, GameMessage::ReturnedToMenu).await;
        let available = self.has_saved_game().await;
        publish(&self.events, GameMessage::ResumeAvailable { available }).await;
    }

    async fn save_snapshot(&self, snapshot: &GameSnapshot) {
        if let Err(e) = self.store.save(snapshot).await {
            error!("保存存档失败: {}", e);
        }
    }

    async fn clear_snapshot(&self) {
        if let Err(e) = self.store.clear().await {
            error!("清除存档失败: {}", e);
        }
    }
}

async fn publish(events: &mpsc::Sender<GameMessage>, message: GameMessage) {
    if let Err(e) = events.send(message).await {
        debug!("界面已关闭, 丢弃消息: {}", e);
    }
}
