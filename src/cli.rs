use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "rpg-vault rating engine")]
pub struct Cli {
    /// Command
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Create the database schema
    Init,
    /// Register a new item
    AddItem {
        #[arg(short, long)]
        title: String,
        /// fantasy, sci-fi, horror, modern, historical, superhero or other
        #[arg(short, long, default_value = "other")]
        genre: String,
    },
    /// Submit a review and refresh the item's rating
    Review {
        #[arg(short, long)]
        item: i64,
        #[arg(short, long)]
        user: i64,
        /// Score between 1.0 and 10.0
        #[arg(short, long)]
        rating: f64,
        #[arg(long)]
        text: Option<String>,
    },
    /// Recompute one item's rating from its reviews
    Refresh {
        #[arg(short, long)]
        item: i64,
    },
    /// Recompute the global average and every item's rating
    Recalculate,
    /// Show the top rated items
    Top {
        /// Genre or ranking category, defaults to overall
        #[arg(short, long)]
        genre: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
}
