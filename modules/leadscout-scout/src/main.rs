use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apify_client::ApifyClient;
use hubspot_client::HubSpotClient;
use leadscout_common::{Config, PostSeed};
use leadscout_ledger::{Ledger, PgLedger};
use leadscout_scout::cycle::{Cycle, CycleDeps};
use leadscout_scout::infra::{ApifyEnricher, ApifyPostMedia, ApifyScraper, HubSpotCrm};
use leadscout_scout::notify::{NoopBackend, NotifyBackend, SlackWebhook};

#[derive(Parser)]
#[command(name = "leadscout")]
#[command(about = "Scrape LinkedIn post engagement and forward qualified leads to HubSpot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Manage the tracked posts
    #[command(subcommand)]
    Posts(PostsCommand),

    /// Show what the next cycle would scrape, without running it
    Plan,

    /// Run one cycle: select, scrape, post media, enrich, sync
    Run {
        /// Skip post media lookup
        #[arg(long)]
        skip_media: bool,

        /// Skip profile enrichment
        #[arg(long)]
        skip_enrich: bool,

        /// Skip forwarding leads to HubSpot
        #[arg(long)]
        skip_sync: bool,
    },

    /// List posts whose scrape count disagrees with their scrape history
    Audit,
}

#[derive(Subcommand)]
enum PostsCommand {
    /// Track a single post
    Add {
        #[arg(long)]
        url: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Track every post in a JSON array of {post_url, post_name}
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("leadscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.log_redacted();

    let ledger = PgLedger::connect(&config.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            ledger.migrate().await?;
            println!("Migrations applied");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Posts(cmd) => cmd_posts(&ledger, cmd).await,
        Commands::Plan => cmd_plan(&config, ledger).await,
        Commands::Run {
            skip_media,
            skip_enrich,
            skip_sync,
        } => {
            let stages = RunStages {
                skip_media,
                skip_enrich,
                skip_sync,
            };
            cmd_run(&config, ledger, stages).await
        }
        Commands::Audit => cmd_audit(&ledger).await,
    }
}

async fn cmd_posts(ledger: &PgLedger, cmd: PostsCommand) -> Result<ExitCode> {
    let seeds = match cmd {
        PostsCommand::Add { url, name } => vec![PostSeed {
            post_url: url,
            post_name: name,
        }],
        PostsCommand::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            serde_json::from_str::<Vec<PostSeed>>(&raw)
                .with_context(|| format!("{} is not a JSON array of posts", file.display()))?
        }
    };

    let stats = ledger.upsert_posts(&seeds).await?;
    println!(
        "Posts: {} new, {} renamed, {} unchanged, {} rejected",
        stats.inserted, stats.renamed, stats.unchanged, stats.rejected
    );
    Ok(ExitCode::SUCCESS)
}

async fn cmd_plan(config: &Config, ledger: PgLedger) -> Result<ExitCode> {
    // Plan never scrapes, so any scraper will do; avoid requiring a key.
    let scraper = ApifyScraper::new(
        ApifyClient::new(config.apify_api_key.clone().unwrap_or_default()),
        config.scrape.max_reaction_pages,
    );
    let cycle = Cycle::new(
        CycleDeps::builder()
            .ledger(Arc::new(ledger))
            .scraper(Arc::new(scraper))
            .scheduler(config.scheduler.clone())
            .build(),
    );

    let plan = cycle.plan().await?;
    if plan.is_empty() {
        println!("Nothing to scrape");
    }
    for (i, post) in plan.scheduled.iter().enumerate() {
        println!("{:>3}. [{:?}] {}", i + 1, post.reason, post.post_url);
    }
    println!(
        "\n{} selected, {} deferred, {} not eligible (exhausted={}, cooling={}, no reactions={})",
        plan.scheduled.len(),
        plan.deferred,
        plan.skipped.total(),
        plan.skipped.exhausted,
        plan.skipped.cooling_down,
        plan.skipped.diminishing_returns
    );
    Ok(ExitCode::SUCCESS)
}

struct RunStages {
    skip_media: bool,
    skip_enrich: bool,
    skip_sync: bool,
}

async fn cmd_run(config: &Config, ledger: PgLedger, stages: RunStages) -> Result<ExitCode> {
    let apify_key = config.require_apify_key()?.to_string();

    let notifier: Arc<dyn NotifyBackend> = match &config.slack_webhook_url {
        Some(url) => {
            info!("Slack notifications enabled");
            Arc::new(SlackWebhook::new(url.clone()))
        }
        None => {
            info!("No SLACK_WEBHOOK_URL set, notifications disabled");
            Arc::new(NoopBackend)
        }
    };

    let mut deps = CycleDeps::builder()
        .ledger(Arc::new(ledger))
        .scraper(Arc::new(ApifyScraper::new(
            ApifyClient::new(apify_key.clone()),
            config.scrape.max_reaction_pages,
        )))
        .notifier(notifier)
        .scheduler(config.scheduler.clone())
        .scrape(config.scrape.clone())
        .media_config(config.media.clone())
        .enrich(config.enrich.clone())
        .sync(config.sync.clone())
        .build();
    if !stages.skip_media {
        deps.media = Some(Arc::new(ApifyPostMedia::new(ApifyClient::new(apify_key.clone()))));
    }
    if !stages.skip_enrich {
        deps.enricher = Some(Arc::new(ApifyEnricher::new(ApifyClient::new(apify_key))));
    }
    if !stages.skip_sync {
        let hubspot_key = config.require_hubspot_key()?.to_string();
        deps.crm = Some(Arc::new(HubSpotCrm::new(HubSpotClient::new(hubspot_key))));
    }

    let cycle = Cycle::new(deps);
    tokio::select! {
        result = cycle.run() => {
            result?;
            Ok(ExitCode::SUCCESS)
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning in-flight work");
            Ok(ExitCode::from(130))
        }
    }
}

async fn cmd_audit(ledger: &PgLedger) -> Result<ExitCode> {
    let mismatches = ledger.audit().await?;
    if mismatches.is_empty() {
        println!("Ledger consistent");
        return Ok(ExitCode::SUCCESS);
    }
    for m in &mismatches {
        println!(
            "{}  scrape_count={}  events={}",
            m.post_url, m.scrape_count, m.event_count
        );
    }
    println!("\n{} post(s) inconsistent", mismatches.len());
    Ok(ExitCode::from(2))
}
