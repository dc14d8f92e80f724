use anyhow::Context;
use clap::Parser;
use hangman::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[clap(name = "hangman", version, about = "终端版猜词游戏")]
struct Args {
    /// 配置文件路径，默认读取当前目录的 config.toml
    #[clap(short, long)]
    config: Option<PathBuf>,
}

enum Command {
    Start(Difficulty),
    Resume,
    Guess(char),
    ExitSaving,
    ExitDiscarding,
    Menu,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let mut chars = line.chars();
    if let (Some(letter), None) = (chars.next(), chars.next()) {
        return Some(Command::Guess(letter));
    }

    let mut parts = line.split_whitespace();
    match parts.next()?.to_lowercase().as_str() {
        "play" | "start" => parts.next().and_then(Difficulty::parse).map(Command::Start),
        "continue" | "resume" => Some(Command::Resume),
        "save" => Some(Command::ExitSaving),
        "discard" => Some(Command::ExitDiscarding),
        "menu" => Some(Command::Menu),
        "help" => Some(Command::Help),
        "quit" | "exit" => Some(Command::Quit),
        other => Difficulty::parse(other).map(Command::Start),
    }
}

fn print_help() {
    println!("命令: play <easy|medium|hard>, continue, <字母>, save, discard, menu, quit");
}

fn print_board(board: &BoardView) {
    println!("[{}] {}", board.difficulty, board.masked_word());
    let used: String = board
        .used_letters()
        .map(|(letter, state)| match state {
            KeyState::Incorrect => format!("{}✗ ", letter),
            _ => format!("{} ", letter),
        })
        .collect();
    println!("失误 {}/{}  已猜: {}", board.miss_count, board.max_misses, used.trim_end());
}

/// 根据消息维护并打印界面状态
async fn render(mut rx: mpsc::Receiver<GameMessage>) {
    let mut board: Option<BoardView> = None;

    while let Some(message) = rx.recv().await {
        match message {
            GameMessage::SessionStarted { board: view } | GameMessage::SessionRestored { board: view } => {
                print_board(&view);
                board = Some(view);
            }
            GameMessage::LetterRevealed { letter, positions } => {
                if let Some(view) = board.as_mut() {
                    for i in positions {
                        if let Some(slot) = view.slots.get_mut(i) {
                            *slot = Some(letter);
                        }
                    }
                    view.keys.insert(letter, KeyState::Correct);
                    print_board(view);
                }
            }
            GameMessage::LetterMissed { letter, miss_count } => {
                if let Some(view) = board.as_mut() {
                    view.keys.insert(letter, KeyState::Incorrect);
                    view.miss_count = miss_count;
                    print_board(view);
                }
            }
            GameMessage::GameFinished { won, word } => {
                if won {
                    println!("你赢了！词语是 {}", word);
                } else {
                    println!("你输了，词语是 {}", word);
                }
                println!("输入 play <难度> 再来一局，或 menu 返回菜单");
            }
            GameMessage::ReturnedToMenu => {
                board = None;
                println!("已返回菜单");
            }
            GameMessage::ResumeAvailable { available } => {
                if available {
                    println!("有未完成的游戏，输入 continue 继续");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化全局配置
    Config::init(args.config.as_deref())?;
    let config = Config::get();

    // 初始化日志
    tracing_subscriber::registry()
        .with(EnvFilter::new(config.log_filter()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("配置加载成功: {:?}", config);

    let words = Arc::new(WordRepository::load(&config.word_bank.source).await);
    let settings = GameSettings::from(&config.game);
    let backend = StorageBackend::open(&config.storage).await?;
    let store = Arc::new(SnapshotStore::new(
        backend,
        &config.storage.key,
        settings.max_misses,
    ));

    let (tx, rx) = mpsc::channel(config.game.event_buffer);
    let machine = GameStateMachine::new(words, store, settings, tx);
    let renderer = tokio::spawn(render(rx));

    print_help();
    if machine.has_saved_game().await {
        println!("有未完成的游戏，输入 continue 继续");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("读取输入失败")? {
        let result = match parse_command(&line) {
            Some(Command::Start(difficulty)) => {
                machine.start(difficulty).await;
                Ok(())
            }
            Some(Command::Resume) => {
                if machine.resume().await.is_none() {
                    println!("没有可继续的游戏");
                }
                Ok(())
            }
            Some(Command::Guess(letter)) => machine.guess_letter(letter).await.map(|_| ()),
            Some(Command::ExitSaving) => machine.exit_saving().await,
            Some(Command::ExitDiscarding) => machine.exit_discarding().await,
            Some(Command::Menu) => machine.return_to_menu().await,
            Some(Command::Help) | None => {
                print_help();
                Ok(())
            }
            Some(Command::Quit) => break,
        };

        if let Err(e) = result {
            println!("{}", e);
        }
    }

    drop(machine);
    renderer.await.context("界面任务异常退出")?;

    Ok(())
}
