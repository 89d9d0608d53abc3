use std::path::PathBuf;
use std::time::Duration;

mod config;
mod db;
mod error;
mod export;
mod ingest;
mod models;
mod normalize;
mod sources;

use config::Config;
use db::Store;
use error::{AppError, Result};
use export::Exporter;
use ingest::{FixedDelay, IngestDriver, NoDelay, RunReport};
use models::ItemType;
use sources::{
    variant, ArxivAdapter, BlogAdapter, GithubAdapter, SourceAdapter, Target, WebDriverSession,
    VARIANTS,
};

const USAGE: &str = "usage: ai-infra-tracker [--config PATH] <command>

commands:
  init                      create the database
  github                    fetch tracked repositories
  arxiv                     fetch recent papers
  blogs <variant>           scrape blog posts through the browser
  export [DIR]              write JSON files for the site
  stats                     print row counts
  like <type> <id>          mark a repo, paper or blog post as liked
  unlike <type> <id>
  likes                     list liked items
  hide <blog-id>            exclude a blog post from exports
  unhide <blog-id>";

#[derive(Debug, PartialEq)]
enum Command {
    Init,
    Github,
    Arxiv,
    Blogs(String),
    Export(Option<PathBuf>),
    Stats,
    Like(ItemType, i64),
    Unlike(ItemType, i64),
    Likes,
    Hide(i64, bool),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if let Err(e) = run(args).await {
        match e {
            AppError::Usage(msg) => eprintln!("{msg}\n\n{USAGE}"),
            e => tracing::error!("{e}"),
        }
        std::process::exit(1);
    }
}

async fn run(args: Vec<String>) -> Result<()> {
    let (config_path, command) = parse_args(&args)?;

    let mut config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    config.apply_env_token(std::env::var("GITHUB_TOKEN").ok());

    let store = Store::load(&config.db_path).await?;

    match command {
        Command::Init => {
            store.persist().await?;
            println!("Database ready at {}", config.db_path);
        }
        Command::Github => {
            let mut adapter =
                GithubAdapter::new(&config.github.api_base, config.github_token.clone())?;
            if config.github_token.is_none() {
                tracing::warn!("No GitHub token configured, using the anonymous rate limit");
            }
            let delay = Duration::from_millis(config.github.delay_ms);
            let report = ingest(&store, &mut adapter, &config.github_targets(), delay).await?;
            print_report(&report);
        }
        Command::Arxiv => {
            let mut adapter = ArxivAdapter::new(
                &config.arxiv.api_base,
                config.arxiv.max_results,
                config.arxiv.per_category_cap,
            )?;
            let delay = Duration::from_millis(config.arxiv.delay_ms);
            let report = ingest(&store, &mut adapter, &config.arxiv_targets(), delay).await?;
            print_report(&report);
        }
        Command::Blogs(name) => {
            let blog_variant = variant(&name).ok_or_else(|| {
                let known: Vec<_> = VARIANTS.iter().map(|v| v.name).collect();
                AppError::Usage(format!(
                    "unknown blog variant '{name}', expected one of: {}",
                    known.join(", ")
                ))
            })?;
            let targets = config.blog_targets(blog_variant);

            let session = WebDriverSession::attach(
                &config.browser.webdriver_url,
                config.browser.debugger_address(),
                config.browser.page_load_timeout(),
            )
            .await?;
            let mut adapter = BlogAdapter::new(session, blog_variant)?;

            let report = ingest(&store, &mut adapter, &targets, blog_variant.target_delay).await?;
            print_report(&report);
        }
        Command::Export(dir) => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.export_dir));
            let written = Exporter::new(&store)
                .export_all(&dir, &config.export_sources)
                .await?;
            for (file, count) in written {
                println!("{:>6}  {}", count, dir.join(file).display());
            }
        }
        Command::Stats => {
            let counts = store.counts().await?;
            println!("repos:  {}", counts.repos);
            println!("papers: {}", counts.papers);
            println!("blogs:  {}", counts.blogs);
            println!("likes:  {}", counts.likes);
        }
        Command::Like(item_type, id) => {
            if store.like(item_type, id).await? {
                store.persist().await?;
                println!("Liked {item_type} {id}");
            } else {
                println!("{item_type} {id} was already liked");
            }
        }
        Command::Unlike(item_type, id) => {
            if store.unlike(item_type, id).await? {
                store.persist().await?;
                println!("Removed like on {item_type} {id}");
            } else {
                println!("{item_type} {id} was not liked");
            }
        }
        Command::Likes => {
            for like in store.likes().await? {
                println!(
                    "{}  {:<5} {}",
                    like.liked_at.format("%Y-%m-%d %H:%M"),
                    like.item_type,
                    like.item_id
                );
            }
        }
        Command::Hide(id, hidden) => {
            if !store.set_blog_deleted(id, hidden).await? {
                return Err(AppError::Usage(format!("no blog post with id {id}")));
            }
            store.persist().await?;
            let verb = if hidden { "Hid" } else { "Restored" };
            println!("{verb} blog post {id}");
        }
    }

    Ok(())
}

async fn ingest<A: SourceAdapter>(
    store: &Store,
    adapter: &mut A,
    targets: &[Target],
    delay: Duration,
) -> Result<RunReport> {
    if delay.is_zero() {
        IngestDriver::new(store, NoDelay).run(adapter, targets).await
    } else {
        IngestDriver::new(store, FixedDelay(delay)).run(adapter, targets).await
    }
}

fn print_report(report: &RunReport) {
    println!(
        "{}: {} added, {} candidates, {}/{} targets failed",
        report.source, report.added, report.candidates, report.failed_targets, report.targets
    );
    for failure in &report.failures {
        println!("  {failure}");
    }
    if report.replaced > 0 {
        println!("{}: replaced {} previous posts", report.source, report.replaced);
    }
}

fn parse_args(args: &[String]) -> Result<(Option<PathBuf>, Command)> {
    let mut config_path = None;
    let mut rest = args;
    if rest.first().map(String::as_str) == Some("--config") {
        let path = rest
            .get(1)
            .ok_or_else(|| AppError::Usage("--config needs a path".to_string()))?;
        config_path = Some(PathBuf::from(path));
        rest = &rest[2..];
    }

    let words: Vec<&str> = rest.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        ["init"] => Command::Init,
        ["github"] => Command::Github,
        ["arxiv"] => Command::Arxiv,
        ["blogs", name] => Command::Blogs(name.to_string()),
        ["export"] => Command::Export(None),
        ["export", dir] => Command::Export(Some(PathBuf::from(*dir))),
        ["stats"] => Command::Stats,
        ["like", kind, id] => Command::Like(kind.parse()?, parse_id(id)?),
        ["unlike", kind, id] => Command::Unlike(kind.parse()?, parse_id(id)?),
        ["likes"] => Command::Likes,
        ["hide", id] => Command::Hide(parse_id(id)?, true),
        ["unhide", id] => Command::Hide(parse_id(id)?, false),
        [] => return Err(AppError::Usage("missing command".to_string())),
        _ => return Err(AppError::Usage(format!("unrecognized arguments: {}", words.join(" ")))),
    };
    Ok((config_path, command))
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| AppError::Usage(format!("'{raw}' is not a valid id")))
}
