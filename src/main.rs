use clap::Parser;
use serde::Serialize;

mod catalog;
mod cli;
mod commentary;
mod config;
mod context;
mod errors;
mod filter;
mod images;
mod lexical;
mod resilience;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod vocabulary;
mod web;

use cli::Command;
use config::Config;
use context::{AppContext, ContextOptions};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = Config::load_with(config::base_path()?)?;

    match args.command {
        Command::Search { query, top_n } => {
            let ctx = AppContext::load(config, ContextOptions::default())?;
            print_json(&ctx.lexical_search(&query, top_n))?;
        }

        Command::Semantic {
            query,
            filters,
            k,
            comment,
        } => {
            let options = ContextOptions {
                semantic: true,
                commentary: comment,
                ..Default::default()
            };
            let ctx = AppContext::load(config, options)?;
            let results = ctx.semantic_search(&query, filters.into(), k, comment)?;
            print_json(&results)?;
        }

        Command::Random { count } => {
            let ctx = AppContext::load(config, ContextOptions::default())?;
            print_json(&ctx.random(count))?;
        }

        Command::Filters {} => {
            let ctx = AppContext::load(config, ContextOptions::default())?;
            print_json(ctx.vocabulary())?;
        }

        Command::Index { rebuild } => {
            let options = ContextOptions {
                rebuild_index: rebuild,
                ..Default::default()
            };
            let ctx = AppContext::load(config, options)?;
            print_json(&ctx.index_status())?;
        }

        Command::Daemon { addr } => {
            let options = ContextOptions {
                semantic: true,
                commentary: true,
                ..Default::default()
            };
            let ctx = AppContext::load(config, options)?;
            web::start_daemon(ctx, &addr)?;
        }
    }

    Ok(())
}
