use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory (defaults to $MAILRAG_DATA_DIR or ~/.mailrag)
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch emails from the mail source and index them
    Ingest {
        /// Gmail label to fetch emails from
        #[clap(long)]
        label: Option<String>,

        /// Maximum number of emails to fetch
        #[clap(long)]
        limit: Option<usize>,
    },

    /// Search indexed emails
    Query {
        /// Query to search through emails
        #[clap(short, long)]
        query: String,

        /// Maximum number of results to return
        #[clap(short, long)]
        limit: Option<usize>,

        /// Distance threshold for filtering results
        #[clap(short, long)]
        threshold: Option<f32>,
    },

    /// Search indexed emails and stream a generated answer
    Ask {
        /// Question to answer from the email corpus
        #[clap(short, long)]
        query: String,

        /// Maximum number of results to ground the answer on
        #[clap(short, long)]
        limit: Option<usize>,

        /// Distance threshold for filtering results
        #[clap(short, long)]
        threshold: Option<f32>,
    },

    /// Delete a named collection
    DeleteIndex {
        /// Collection to delete (defaults to the configured one)
        #[clap(long)]
        name: Option<String>,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
}
