use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod builder;
mod cli;
mod config;
mod corpus;
mod errors;
mod images;
mod retrieval;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use corpus::Source;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build(ctx: &app::AppContext, source: Source) -> anyhow::Result<()> {
    let embedder = (ctx.embedder_factory())()?;
    let report = ctx.build_index(embedder.as_ref(), source, true)?;

    if report.indexed == 0 {
        println!("No {source} documents found, nothing saved.");
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();
    let ctx = app::AppContext::load()?;

    match args.command {
        cli::Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| ctx.config.listen_addr.clone());
            let state = ctx.shared_state(ctx.embedder_factory());
            web::start_daemon(state, addr)
        }

        cli::Command::BuildNotes {} => build(&ctx, Source::Note),

        cli::Command::BuildDiscourse {} => build(&ctx, Source::Discourse),

        cli::Command::Search {
            question,
            source,
            top_k,
        } => {
            let retrieval = ctx.retrieval(ctx.embedder_factory());
            let top_k = top_k.unwrap_or(ctx.config.default_top_k);
            let answers = retrieval.search(&question, top_k, source)?;

            println!("{}", serde_json::to_string_pretty(&answers)?);
            Ok(())
        }
    }
}
