use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rollcall_client::GatewayClient;
use rollcall_core::config::{
    default_channels_path, load_channels_config, save_channels_config, ChannelsConfig,
};
use rollcall_core::export::ExportService;
use rollcall_core::models::Channel;
use rollcall_core::progress::TracingReporter;
use rollcall_core::traits::{MemberStore, ProviderClient};
use rollcall_core::HarvestService;
use rollcall_store::MemberRepository;

mod config;

use config::{ChannelsAction, Command, Config};

const DB_MAX_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let args = Config::parse();

    let client = GatewayClient::new(&args.gateway_url)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    match args.command {
        Command::Channels { action } => {
            handle_channels(&client, args.channels_file, action).await?;
        }
        Command::Harvest { channel, job_id } => {
            let channel = lookup_channel(args.channels_file, &channel)?;
            let repo = connect(&args.database_url).await?;
            let service = HarvestService::new(client, repo.clone());
            let job_id = job_id.unwrap_or_else(|| chrono::Utc::now().timestamp());

            // Ctrl-C requests cooperative cancellation; the job keeps its
            // partial buffer for export below.
            let registry = service.registry().clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Cancelling job {}...", job_id);
                    registry.cancel(job_id);
                }
            });

            info!(job_id, "Harvesting {}", channel.title);
            let result = service
                .harvest_channel(&channel, job_id, &TracingReporter)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            if result.status == rollcall_core::JobState::Cancelled {
                if let Some(partial) = service.registry().export_partial(job_id) {
                    let exporter = ExportService::new(repo);
                    let path = exporter
                        .export_partial(&channel, &partial, std::path::Path::new("."))
                        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
                    println!(
                        "Cancelled; {} partial members written to {}",
                        partial.len(),
                        path.display()
                    );
                }
            }

            println!("Status:        {}", result.status);
            println!("Discovered:    {}", result.discovered);
            println!("Already known: {}", result.sync.already_known);
            println!("New members:   {}", result.sync.new_count);
            println!(
                "Stored total:  {} -> {}",
                result.sync.before_count, result.sync.after_count
            );
            if result.sync.batches_failed > 0 {
                eprintln!(
                    "Warning: {} batch(es) failed to write; re-run to retry",
                    result.sync.batches_failed
                );
            }
        }
        Command::Enrich { channel } => {
            let channel = lookup_channel(args.channels_file, &channel)?;
            let repo = connect(&args.database_url).await?;
            let service = HarvestService::new(client, repo);
            let job_id = chrono::Utc::now().timestamp();

            info!(job_id, "Enriching {}", channel.title);
            let report = service
                .enrich_channel(&channel, job_id, &TracingReporter)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            println!("Processed: {}", report.processed);
            println!("Enriched:  {}", report.enriched);
            println!("Skipped:   {}", report.skipped);
        }
        Command::Export { channel, output } => {
            let channel = lookup_channel(args.channels_file, &channel)?;
            let repo = connect(&args.database_url).await?;
            let service = ExportService::new(repo);

            let (path, count) = service
                .export_channel(&channel, &output)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Exported {} members to {}", count, path.display());
        }
        Command::Stats { channel } => {
            let channel = lookup_channel(args.channels_file, &channel)?;
            let repo = connect(&args.database_url).await?;

            let total = repo
                .count(channel.id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            let pending = repo
                .needing_enrichment(channel.id)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            println!("Channel:              {} ({})", channel.title, channel.id);
            println!("Stored members:       {}", total);
            println!("Awaiting enrichment:  {}", pending.len());
        }
    }

    Ok(())
}

async fn connect(database_url: &str) -> anyhow::Result<MemberRepository> {
    info!("Connecting to database...");
    let pool = rollcall_store::connect(database_url, DB_MAX_CONNECTIONS)
        .await
        .context("Failed to connect to database")?;
    Ok(MemberRepository::new(pool))
}

fn registry_path(custom: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    custom
        .or_else(default_channels_path)
        .context("Could not determine a channels file path; pass --channels-file")
}

/// Resolves a CLI channel argument (handle or numeric id) against the
/// registry.
fn lookup_channel(channels_file: Option<PathBuf>, arg: &str) -> anyhow::Result<Channel> {
    let registry = load_channels_config(channels_file)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let found = match arg.parse::<i64>() {
        Ok(id) => registry.find_by_id(id),
        Err(_) => registry.find_by_handle(arg),
    };

    found.cloned().ok_or_else(|| {
        anyhow::anyhow!(
            "Channel '{}' is not registered. Add it first with `rollcall channels add`",
            arg
        )
    })
}

async fn handle_channels(
    client: &GatewayClient,
    channels_file: Option<PathBuf>,
    action: ChannelsAction,
) -> anyhow::Result<()> {
    let path = registry_path(channels_file)?;
    let mut registry = if path.exists() {
        load_channels_config(Some(path.clone())).map_err(|e| anyhow::anyhow!(e.user_message()))?
    } else {
        ChannelsConfig::default()
    };

    match action {
        ChannelsAction::Add { handle } => {
            let channel = client
                .resolve_channel(&handle)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            let title = channel.title.clone();
            let id = channel.id;
            if registry.add(channel) {
                save_channels_config(&registry, &path)
                    .map_err(|e| anyhow::anyhow!(e.user_message()))?;
                println!("Added {} ({})", title, id);
            } else {
                println!("{} ({}) is already registered", title, id);
            }
        }
        ChannelsAction::Remove { id } => {
            if registry.remove(id) {
                save_channels_config(&registry, &path)
                    .map_err(|e| anyhow::anyhow!(e.user_message()))?;
                println!("Removed channel {}", id);
            } else {
                println!("Channel {} is not registered", id);
            }
        }
        ChannelsAction::List => {
            if registry.channels.is_empty() {
                println!("No channels registered");
            }
            for channel in &registry.channels {
                let handle = channel
                    .username
                    .as_deref()
                    .map(|u| format!("@{}", u))
                    .unwrap_or_else(|| "-".to_string());
                let usable = if channel.is_usable() { "" } else { "  [no credential]" };
                println!("{:>12}  {:<24} {}{}", channel.id, handle, channel.title, usable);
            }
        }
    }

    Ok(())
}
