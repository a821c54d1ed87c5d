//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Member harvesting for access-controlled channels.
#[derive(Parser, Debug)]
#[command(name = "rollcall", version, about)]
pub struct Config {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Base URL of the provider gateway.
    #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8787")]
    pub gateway_url: String,

    /// Channel registry file (defaults to ~/.config/rollcall/channels.toml).
    #[arg(long)]
    pub channels_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the channel registry.
    Channels {
        #[command(subcommand)]
        action: ChannelsAction,
    },

    /// Harvest members from a registered channel.
    Harvest {
        /// Channel handle or numeric id.
        channel: String,

        /// Job id for cancellation from another surface. Defaults to the
        /// current timestamp.
        #[arg(long)]
        job_id: Option<i64>,
    },

    /// Fill missing bios and join dates for stored members.
    Enrich {
        /// Channel handle or numeric id.
        channel: String,
    },

    /// Export stored members to a CSV file.
    Export {
        /// Channel handle or numeric id.
        channel: String,

        /// Directory for the CSV artifact.
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },

    /// Show stored member counts for a channel.
    Stats {
        /// Channel handle or numeric id.
        channel: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChannelsAction {
    /// Resolve a channel by handle and add it to the registry.
    Add {
        /// Channel handle, with or without the leading `@`.
        handle: String,
    },

    /// Remove a channel from the registry by numeric id.
    Remove { id: i64 },

    /// List registered channels.
    List,
}
