use clap::{Parser, Subcommand};

use crate::retrieval::SourceFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Semantic question answering over course notes and forum posts", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP service.
    Serve {
        /// Listen address, overrides `listen_addr` from config.yaml
        #[clap(short, long)]
        addr: Option<String>,
    },

    /// Embed the notes listed in the notes metadata file and save their index.
    BuildNotes {},

    /// Embed the forum post collection and save its index.
    BuildDiscourse {},

    /// Answer a question from the command line.
    Search {
        question: String,

        /// note, discourse or all
        #[clap(short, long, default_value = "all")]
        source: SourceFilter,

        /// Number of answers, `default_top_k` from config.yaml if unset
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },
}
