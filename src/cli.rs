use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recommend episodes similar to one or more seed episodes
    Recommend {
        /// Seed episode title (repeatable)
        #[clap(short, long = "title", required = true)]
        titles: Vec<String>,

        /// Number of episodes to return
        #[clap(short = 'n', long, default_value = "5")]
        count: usize,

        /// Comma separated weights, one per feature family:
        /// dialogue,keywords,summary,rating,votes,emotion,character_count
        #[clap(long, value_delimiter = ',')]
        weights: Option<Vec<f32>>,
    },

    /// Search episode dialogue by meaning
    Query {
        /// Free text to search for
        text: String,

        /// Only search these seasons (repeatable)
        #[clap(short, long)]
        season: Vec<u32>,

        /// Lowest rating to include
        #[clap(long, requires = "max_rating")]
        min_rating: Option<f32>,

        /// Highest rating to include
        #[clap(long, requires = "min_rating")]
        max_rating: Option<f32>,

        /// Only episodes in which this character speaks (repeatable)
        #[clap(short, long)]
        character: Vec<String>,
    },

    /// Embed every dialogue line and write the embedding shards.
    /// Required once before `query`.
    Precompute {
        /// Hide the progress bar
        #[clap(long, default_value = "false")]
        quiet: bool,
    },

    /// Dialogue line counts per character, most lines first
    Characters {
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Print the dialogue of an episode
    Script {
        /// Episode title
        title: String,
    },

    /// Print the default feature weights
    Weights {},
}
