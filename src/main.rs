use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use blogroll::config::Config;
use blogroll::feed::{build_http_client, HttpFeedClient, HttpFetcher};
use blogroll::storage::SqliteStore;
use blogroll::util::sanitize_for_terminal;
use blogroll::{AggregatedList, Blogroll, BlogrollError, SubscriptionEntry};

const USER_AGENT: &str = concat!("blogroll/", env!("CARGO_PKG_VERSION"));

/// Get the config directory path (~/.config/blogroll/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("blogroll"))
}

/// Create the config directory with user-only permissions.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "blogroll",
    version,
    about = "Ranked list of subscribed sites, built from a live OPML link"
)]
struct Args {
    /// Config file (default: ~/.config/blogroll/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// OPML subscription list URL, overriding `source_url` from the config
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Blogroll instance (cache namespace), overriding `instance_id`
    #[arg(long, value_name = "ID")]
    instance: Option<String>,

    /// Drop the cached list and refresh its feeds instead of printing
    #[arg(long)]
    invalidate: bool,

    /// Print the list as JSON
    #[arg(long)]
    json: bool,

    /// Cache database (default: ~/.config/blogroll/cache.db)
    #[arg(long, value_name = "FILE")]
    cache_db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(source) = args.source {
        config.source_url = Some(source);
    }
    if let Some(instance) = args.instance {
        config.instance_id = instance;
    }
    let config = config.validate();

    let db_path = match args.cache_db {
        Some(path) => path,
        None => {
            ensure_config_dir(&config_dir)?;
            config_dir.join("cache.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in cache database path"))?;
    let store = SqliteStore::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open cache database {}", db_path.display()))?;

    let client = build_http_client(USER_AGENT).context("Failed to build HTTP client")?;
    let fetcher = HttpFetcher::new(client).with_host_policy(config.host_policy());
    let feeds = HttpFeedClient::new(
        fetcher.clone().with_timeout(config.feed_timeout()),
        config.feed_cache_capacity,
    );
    let blogroll = Blogroll::new(
        fetcher.with_timeout(config.fetch_timeout()),
        feeds,
        store,
        config.to_options(),
    );

    match blogroll.cache().purge_expired().await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired cache records"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired cache records"),
    }

    if args.invalidate {
        let refreshed = blogroll
            .invalidate(&config.instance_id)
            .await
            .context("Failed to invalidate cached blogroll")?;
        println!(
            "Invalidated blogroll '{}' ({} feeds refreshed)",
            sanitize_for_terminal(&config.instance_id),
            refreshed
        );
        return Ok(());
    }

    let source_url = config.source_url.as_deref().unwrap_or_default();
    let list = match blogroll.get_blogroll(&config.instance_id, source_url).await {
        Ok(list) => list,
        Err(BlogrollError::NoSource) => {
            eprintln!("Error: No subscription list configured");
            eprintln!();
            eprintln!("Pass one on the command line:");
            eprintln!("  blogroll --source https://example.com/subscriptions.opml");
            eprintln!();
            eprintln!("Or set source_url in {}.", config_path.display());
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to build blogroll"),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&list).context("Failed to encode blogroll")?;
        println!("{json}");
    } else {
        print_list(&config.title, &list);
    }

    Ok(())
}

fn print_list(title: &str, list: &AggregatedList) {
    let title = sanitize_for_terminal(title);
    println!("{title}");
    println!("{}", "=".repeat(title.chars().count()));

    if list.is_empty() {
        println!("(no subscriptions)");
        return;
    }

    for entry in list {
        println!();
        print_entry(entry);
    }
}

fn print_entry(entry: &SubscriptionEntry) {
    let name = sanitize_for_terminal(&entry.title);
    if entry.handle.is_empty() {
        println!("{name}");
    } else {
        println!("{name} (@{})", sanitize_for_terminal(&entry.handle));
    }
    println!("  {}", sanitize_for_terminal(&entry.html_url));

    if let Some(post) = &entry.latest_post {
        if post.published_display.is_empty() {
            println!("  Latest: {}", sanitize_for_terminal(&post.title));
        } else {
            println!(
                "  Latest: {} ({})",
                sanitize_for_terminal(&post.title),
                sanitize_for_terminal(&post.published_display)
            );
        }
        if !post.permalink.is_empty() {
            println!("          {}", sanitize_for_terminal(&post.permalink));
        }
    }
}
