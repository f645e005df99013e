use std::io::Write as _;
use std::path::Path;

use anyhow::{bail, Context};
use clap::Parser;
use inquire::error::InquireResult;

mod cli;
mod config;
mod document;
mod embed;
mod generate;
mod index;
mod ingest;
mod mail;
mod prompt;
mod retrieve;
mod service;
#[cfg(test)]
mod tests;

use config::Config;
use generate::OllamaClient;
use mail::{GmailSource, MailSource};
use service::RagService;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let base_path = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => Config::default_base_path()?,
    };
    let config = Config::load_with(&base_path)?;

    match args.command {
        cli::Command::Ingest { label, limit } => {
            let label = label.unwrap_or_else(|| config.gmail.default_label.clone());
            let limit = limit.unwrap_or(config.gmail.default_limit);

            let source = GmailSource::from_token_file(Path::new(&config.gmail.token_path))?;
            let documents = source.fetch(&label, limit)?;
            let fetched = documents.len();

            let service = RagService::new(config);
            let report = service.ingest(documents, true)?;

            println!("Processed {} emails ({})", fetched, report);
            Ok(())
        }

        cli::Command::Query {
            query,
            limit,
            threshold,
        } => {
            let k = limit.unwrap_or(config.default_limit);
            let threshold = threshold.unwrap_or(config.default_threshold);

            let service = RagService::new(config);
            let hits = service.retrieve(&query, k, threshold)?;

            print!("{}", prompt::render_results(&query, &hits));
            Ok(())
        }

        cli::Command::Ask {
            query,
            limit,
            threshold,
        } => {
            let k = limit.unwrap_or(config.default_limit);
            let threshold = threshold.unwrap_or(config.default_threshold);
            let ollama = config.ollama.clone();

            let service = RagService::new(config);
            let hits = service.retrieve(&query, k, threshold)?;

            print!("{}", prompt::render_results(&query, &hits));

            let messages = prompt::compose(&query, &hits);
            let client = OllamaClient::new(&ollama.endpoint, &ollama.model)?;

            let mut stdout = std::io::stdout();
            for chunk in client.chat_stream(&messages)? {
                let chunk = chunk.context("generation stream failed")?;
                stdout.write_all(chunk.as_bytes())?;
                stdout.flush()?;
            }
            println!();
            Ok(())
        }

        cli::Command::DeleteIndex { name, yes } => {
            let mut config = config;
            if let Some(name) = name {
                config.collection = name;
            }
            let collection = config.collection.clone();

            if !yes {
                match inquire::prompt_confirmation(format!(
                    "Are you sure you want to delete collection '{}'?",
                    collection
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            let service = RagService::new(config);
            service.delete_collection()?;

            println!("Collection '{}' deleted successfully.", collection);
            Ok(())
        }
    }
}
