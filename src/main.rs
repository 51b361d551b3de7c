//! 词典管理命令行入口

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use lexistream::config::{AppConfig, ConfigManager};
use lexistream::dictionary::{
    ConflictPolicy, DictionaryBuilder, DictionaryEntry, DictionarySource, DictionaryStore,
    ExportFileSource, Tag,
};
use lexistream::env::{core::LogLevel, generate_env_docs, EnvVar};
use lexistream::error::{helpers, DictionaryError};
use lexistream::translation::{LookupService, ProgressiveTranslator, SessionEvent};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(
    name = "lexistream",
    version,
    about = "Canonical dictionary manager and progressive translator"
)]
struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dictionary store path, overrides the configuration
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Never call the online translation services
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the dictionary from export files
    Combine {
        /// Export files, defaults to `builder.sources` from the configuration
        files: Vec<PathBuf>,

        /// tag-then-latest, keep-first, keep-last or prefer-tag
        #[arg(long)]
        policy: Option<ConflictPolicy>,

        /// Carry the current entries forward as the lowest-priority source
        #[arg(long)]
        include_live: bool,

        /// Add the built-in common words
        #[arg(long)]
        seed: bool,
    },
    /// Look a word up in the local dictionary
    Lookup { word: String },
    /// Look a word up, falling back to the online services and saving the result
    Online { word: String },
    /// Add or replace a word in the dictionary
    Add { word: String, translation: String },
    /// Export the dictionary as tab-separated text, to stdout without FILE
    Export { file: Option<PathBuf> },
    /// Interactive dictionary management
    Interactive,
    /// Show dictionary statistics
    Stats,
    /// Translate text word by word
    Translate {
        text: String,

        /// Print every intermediate state of the sentences
        #[arg(long)]
        progressive: bool,
    },
    /// Write an example configuration file
    InitConfig {
        #[arg(default_value = "lexistream.toml")]
        path: PathBuf,
    },
    /// List the supported environment variables
    EnvDocs,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        if let Ok(e) = e.downcast::<DictionaryError>() {
            let _ = helpers::log_error::<()>(*e);
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let level = LogLevel::get().unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult<()> {
    match &cli.command {
        Command::InitConfig { path } => {
            ConfigManager::generate_example_config(path)?;
            println!("Wrote example configuration to {}", path.display());
            return Ok(());
        }
        Command::EnvDocs => {
            print!("{}", generate_env_docs());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli)?;
    let store = Arc::new(DictionaryStore::open_with(&config.store)?);

    match cli.command {
        Command::Combine {
            files,
            policy,
            include_live,
            seed,
        } => combine(store, &config, files, policy, include_live, seed),
        Command::Lookup { word } => lookup_local(&store, &word),
        Command::Online { word } => {
            let lookup = LookupService::from_config(store, config.lookup.clone())?;
            lookup_online(&lookup, &word).await;
            Ok(())
        }
        Command::Add { word, translation } => add(&store, &word, &translation),
        Command::Export { file } => export(&store, file.as_deref()),
        Command::Interactive => {
            let lookup = LookupService::from_config(store, config.lookup.clone())?;
            interactive(&lookup).await
        }
        Command::Stats => stats(&store),
        Command::Translate { text, progressive } => {
            let lookup = LookupService::from_config(store, config.lookup.clone())?;
            let translator = ProgressiveTranslator::new(lookup, config.session.clone());
            translate(&translator, &text, progressive).await
        }
        Command::InitConfig { .. } | Command::EnvDocs => Ok(()),
    }
}

fn load_config(cli: &Cli) -> CliResult<AppConfig> {
    let mut config = ConfigManager::load(cli.config.as_deref())?.into_config();

    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }
    if cli.offline {
        config.lookup.remote_enabled = false;
    }

    Ok(config)
}

fn combine(
    store: Arc<DictionaryStore>,
    config: &AppConfig,
    files: Vec<PathBuf>,
    policy: Option<ConflictPolicy>,
    include_live: bool,
    seed: bool,
) -> CliResult<()> {
    let mut builder_config = config.builder.clone();
    builder_config.include_live_entries |= include_live;
    builder_config.seed_common_words |= seed;
    if let Some(policy) = policy {
        builder_config.policy = policy;
    }

    let paths = if files.is_empty() {
        builder_config.sources.clone()
    } else {
        files
    };

    let sources: Vec<ExportFileSource> = paths.iter().map(ExportFileSource::new).collect();
    let refs: Vec<&dyn DictionarySource> =
        sources.iter().map(|s| s as &dyn DictionarySource).collect();

    println!("Combining {} dictionary file(s)...", sources.len());
    let report = DictionaryBuilder::new(store, builder_config).build(&refs)?;

    for source in &report.sources {
        println!(
            "  - {}: {} records, {} accepted, {} rejected",
            source.name, source.records, source.accepted, source.rejected
        );
    }
    println!(
        "Published generation {} with {} entries ({} conflicts resolved, {} rejected)",
        report.generation, report.published, report.conflicts_resolved, report.rejected
    );

    Ok(())
}

fn lookup_local(store: &DictionaryStore, word: &str) -> CliResult<()> {
    match store.get(word)? {
        Some(entry) => println!(
            "'{}' -> '{}' ({})",
            entry.normalized_word, entry.translation, entry.tag
        ),
        None => println!("'{}' not found in dictionary", word.trim()),
    }
    Ok(())
}

async fn lookup_online(lookup: &LookupService, word: &str) {
    let result = lookup.translate(word).await;
    if result.is_resolved() {
        println!("'{}' -> '{}' ({})", word.trim(), result.text, result.origin);
    } else {
        println!("Could not find a translation for '{}'", word.trim());
    }
}

fn add(store: &DictionaryStore, word: &str, translation: &str) -> CliResult<()> {
    let entry = DictionaryEntry::new(word.to_string(), translation.to_string(), Tag::Common);
    store.upsert(entry)?;

    match store.get(word)? {
        Some(entry) => println!(
            "Added '{}' -> '{}' to dictionary",
            entry.normalized_word, entry.translation
        ),
        None => println!("Failed to add '{}' to dictionary", word.trim()),
    }
    Ok(())
}

fn export(store: &DictionaryStore, file: Option<&Path>) -> CliResult<()> {
    match file {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            let count = store.export_to_writer(&mut writer)?;
            println!("Exported {} translations to {}", count, path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            store.export_to_writer(&mut writer)?;
        }
    }
    Ok(())
}

fn stats(store: &DictionaryStore) -> CliResult<()> {
    let stats = store.stats()?;

    println!("Database: {}", store.path().display());
    println!("Generation: {}", stats.generation);
    println!(
        "Total translations: {} (common {}, rare {}, unverified {})",
        stats.entries, stats.common, stats.rare, stats.unverified
    );
    println!("Sources: {}", stats.sources.len());
    for source in &stats.sources {
        println!(
            "  - {}: {} accepted of {} records (built {})",
            source.name,
            source.accepted,
            source.records,
            source.built_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn translate(
    translator: &ProgressiveTranslator,
    text: &str,
    progressive: bool,
) -> CliResult<()> {
    let (handle, mut events) = translator.start(text);
    let mut lines: Vec<Vec<String>> = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Placeholders(units) => {
                lines = units
                    .iter()
                    .map(|unit| unit.translations.iter().map(|t| t.text.clone()).collect())
                    .collect();
                if progressive {
                    for line in &lines {
                        println!("{}", line.join(" "));
                    }
                }
            }
            SessionEvent::TokenResolved {
                sentence,
                token,
                text,
                ..
            } => {
                if let Some(slot) = lines.get_mut(sentence).and_then(|l| l.get_mut(token)) {
                    *slot = text;
                }
                if progressive {
                    if let Some(line) = lines.get(sentence) {
                        println!("{}", line.join(" "));
                    }
                }
            }
            SessionEvent::Finished(state) => {
                tracing::debug!("翻译会话结束: {:?}", state);
            }
        }
    }

    let report = handle.join().await;
    if !progressive {
        for line in &report.lines {
            println!("{}", line);
        }
    }
    eprintln!(
        "{:?}: {} resolved, {} fallback, {} pending",
        report.state, report.resolved, report.fallback, report.pending
    );

    Ok(())
}

const INTERACTIVE_HELP: &str = "\
Available commands:
  lookup <word>              Look up a word locally
  online <word>              Look up a word, online if needed
  add <word> <translation>   Add a word to the dictionary
  export <file>              Export the dictionary to a tab-separated file
  stats                      Show dictionary statistics
  help                       Show this help
  exit                       Exit";

async fn interactive(lookup: &LookupService) -> CliResult<()> {
    let store = lookup.store();

    println!("lexistream dictionary manager - interactive mode");
    println!("{}", INTERACTIVE_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };

        let mut parts = input.trim().splitn(3, char::is_whitespace);
        let command = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next();
        let rest = parts.next().map(str::trim);

        // 单条命令失败只打印，不退出会话
        let outcome: CliResult<()> = match (command.as_str(), arg, rest) {
            ("", _, _) => Ok(()),
            ("exit" | "quit", _, _) => break,
            ("help", _, _) => {
                println!("{}", INTERACTIVE_HELP);
                Ok(())
            }
            ("lookup", Some(word), _) => lookup_local(store, word),
            ("online", Some(word), _) => {
                lookup_online(lookup, word).await;
                Ok(())
            }
            ("add", Some(word), Some(translation)) if !translation.is_empty() => {
                add(store, word, translation)
            }
            ("export", Some(file), _) => export(store, Some(Path::new(file))),
            ("stats", _, _) => stats(store),
            ("lookup", None, _) => usage("lookup <word>"),
            ("online", None, _) => usage("online <word>"),
            ("add", _, _) => usage("add <word> <translation>"),
            ("export", None, _) => usage("export <file>"),
            (other, _, _) => {
                println!("Unknown command: {}", other);
                Ok(())
            }
        };

        if let Err(e) = outcome {
            println!("Error: {}", e);
        }
    }

    Ok(())
}

fn usage(text: &str) -> CliResult<()> {
    println!("Usage: {}", text);
    Ok(())
}
