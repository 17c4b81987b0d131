use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::vocabulary::FilterRequest;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Genre to include (repeatable)
    #[clap(long = "genre")]
    pub genres: Vec<String>,

    /// Director to include (repeatable)
    #[clap(long = "director")]
    pub directors: Vec<String>,

    /// Actor to include (repeatable)
    #[clap(long = "actor")]
    pub actors: Vec<String>,

    /// Earliest release year
    #[clap(long)]
    pub year_min: Option<i32>,

    /// Latest release year
    #[clap(long)]
    pub year_max: Option<i32>,

    /// Lowest rating
    #[clap(long)]
    pub rating_min: Option<f32>,

    /// Highest rating
    #[clap(long)]
    pub rating_max: Option<f32>,
}

impl From<FilterArgs> for FilterRequest {
    fn from(args: FilterArgs) -> Self {
        FilterRequest {
            genres: args.genres,
            directors: args.directors,
            actors: args.actors,
            year_min: args.year_min,
            year_max: args.year_max,
            rating_min: args.rating_min,
            rating_max: args.rating_max,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keyword search over titles, genres, descriptions and cast
    Search {
        query: String,

        /// Maximum number of results
        #[clap(short = 'n', long)]
        top_n: Option<usize>,
    },

    /// Meaning-based search with optional filters.
    ///
    /// Genre, director and actor filters broaden each other: a movie
    /// matching any of them qualifies. Year and rating ranges must both hold.
    Semantic {
        query: String,

        #[clap(flatten)]
        filters: FilterArgs,

        /// Number of results
        #[clap(short, long)]
        k: Option<usize>,

        /// Add a critic's commentary to every result
        #[clap(long, default_value = "false")]
        comment: bool,
    },

    /// Show a random selection of movies
    Random {
        #[clap(short, long, default_value = "10")]
        count: usize,
    },

    /// List known genres, directors, actors, years and ratings
    Filters {},

    /// Fit or load the keyword index
    Index {
        /// Refit even if a cached index matches the catalog
        #[clap(long, default_value = "false")]
        rebuild: bool,
    },

    /// Serve the JSON API
    Daemon {
        #[clap(long, default_value = "0.0.0.0:8080")]
        addr: String,
    },
}
