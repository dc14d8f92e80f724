use clap::{App, Arg, SubCommand};
use hangman::word_bank::{Difficulty, Word, WordBankData, WordRepository};

fn main() {
    let matches = App::new("词语管理器")
        .version("1.0")
        .about("管理猜词游戏词库")
        .arg(
            Arg::with_name("file")
                .long("file")
                .short('f')
                .takes_value(true)
                .help("词库文件路径，默认使用配置中的 word_bank.source"),
        )
        .subcommand(SubCommand::with_name("list").about("列出所有难度和词语"))
        .subcommand(
            SubCommand::with_name("add")
                .about("添加新词语")
                .arg(
                    Arg::with_name("difficulty")
                        .help("难度 (easy/medium/hard)")
                        .required(true)
                        .index(1),
                )
                .arg(Arg::with_name("id").help("词语 id").required(true).index(2))
                .arg(
                    Arg::with_name("word")
                        .help("词语，只能包含字母")
                        .required(true)
                        .index(3),
                ),
        )
        .subcommand(SubCommand::with_name("stats").about("显示词库统计信息"))
        .subcommand(SubCommand::with_name("validate").about("验证词库完整性"))
        .subcommand(
            SubCommand::with_name("export").about("导出词库到文件").arg(
                Arg::with_name("file")
                    .help("输出文件路径")
                    .required(true)
                    .index(1),
            ),
        )
        .get_matches();

    let file_path = match matches.value_of("file") {
        Some(path) => path.to_string(),
        None => {
            // 初始化配置
            if let Err(e) = hangman::config::Config::init(None) {
                eprintln!("配置初始化失败: {}", e);
                return;
            }
            hangman::config::Config::get().word_bank.source.clone()
        }
    };

    let data = match WordBankData::from_file(&file_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("无法加载词库文件: {}, 使用默认词库", e);
            WordBankData::fallback()
        }
    };

    match matches.subcommand() {
        Some(("list", _)) => {
            let word_bank = WordRepository::from_data(data);
            println!("词库难度列表:");
            for difficulty in Difficulty::ALL {
                let words = word_bank.words(difficulty);
                println!("  {}: {} 个词语", difficulty, words.len());
                for word in words {
                    println!("    {} - {}", word.id, word.text);
                }
            }
        }
        Some(("add", args)) => {
            let Some(difficulty) = args.value_of("difficulty").and_then(Difficulty::parse) else {
                eprintln!("难度必须是 easy、medium 或 hard");
                return;
            };
            let id = args.value_of("id").unwrap_or_default();
            let text = args.value_of("word").unwrap_or_default();

            let mut word_bank = WordRepository::from_data(data);
            if let Err(e) = word_bank.add(difficulty, Word::new(id, text)) {
                eprintln!("添加词语失败: {}", e);
                return;
            }

            // 保存到文件
            if let Err(e) = word_bank.save_to_file(&file_path) {
                eprintln!("保存词库失败: {}", e);
            } else {
                println!("成功添加词语: {} - {}", id, text.to_uppercase());
            }
        }
        Some(("stats", _)) => {
            let stats = WordRepository::from_data(data).stats();
            println!("词库统计信息:");
            println!("  总词语数: {}", stats.total_words);
            println!("  难度分布:");
            for difficulty in Difficulty::ALL {
                println!("    {}: {}", difficulty, stats.tier_counts[&difficulty]);
            }
        }
        Some(("validate", _)) => {
            let errors = data.validate();
            if errors.is_empty() {
                println!("词库验证通过！");
            } else {
                println!("词库验证发现 {} 个问题:", errors.len());
                for error in errors {
                    println!("  - {}", error);
                }
            }
        }
        Some(("export", args)) => {
            let output = args.value_of("file").unwrap_or_default();
            if let Err(e) = WordRepository::from_data(data).save_to_file(output) {
                eprintln!("导出失败: {}", e);
            } else {
                println!("成功导出词库到: {}", output);
            }
        }
        _ => {
            println!("请使用 --help 查看可用命令");
        }
    }
}
