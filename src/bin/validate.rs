//! Score candidate topics from a JSON file and print the survivors as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context};
use topicforge::{EngineConfig, MarketConfig, Topic, TopicValidator};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Args {
    topics: PathBuf,
    config: Option<PathBuf>,
    market: MarketConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("topicforge-validate failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let Some(args) = parse_args(std::env::args().skip(1).collect())? else {
        print_usage();
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let path = EngineConfig::default_config_path();
            if path.exists() {
                EngineConfig::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?
            } else {
                EngineConfig::default()
            }
        }
    };
    config.validate()?;

    let raw = std::fs::read_to_string(&args.topics)
        .with_context(|| format!("reading {}", args.topics.display()))?;
    let topics: Vec<Topic> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing topics from {}", args.topics.display()))?;

    let validator = TopicValidator::new(config.validator);
    let survivors = validator.validate(&topics, &args.market);
    println!("{}", serde_json::to_string_pretty(&survivors)?);
    Ok(())
}

fn parse_args(args: Vec<String>) -> anyhow::Result<Option<Args>> {
    let mut topics = None;
    let mut config = None;
    let mut market = MarketConfig::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .with_context(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "help" | "--help" | "-h" => return Ok(None),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--market" => market.market = value("--market")?,
            "--language" => market.language = value("--language")?,
            "--vertical" => market.vertical = value("--vertical")?,
            "--domain" => market.domain = value("--domain")?,
            "--seeds" => {
                market.seed_keywords = value("--seeds")?
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            flag if flag.starts_with("--") => bail!("unknown option `{flag}`"),
            path => {
                if topics.is_some() {
                    bail!("only one topics file may be given");
                }
                topics = Some(PathBuf::from(path));
            }
        }
    }

    let Some(topics) = topics else {
        bail!("missing topics file (see --help)");
    };
    Ok(Some(Args {
        topics,
        config,
        market,
    }))
}

fn print_usage() {
    println!(
        "usage: topicforge-validate <topics.json> [--config <path>] [--market <code>] \
         [--language <code>] [--vertical <name>] [--domain <host>] [--seeds <a,b,c>]"
    );
}
