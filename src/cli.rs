use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Match titles only
    #[default]
    Title,
    /// Match description chunks only
    Description,
    /// Rank books by title and best description chunk together
    Combined,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build the vector store from the catalog, replacing any existing one
    Build {
        /// Don't draw a progress bar
        #[clap(long, default_value = "false")]
        no_progress: bool,
    },

    /// Search the catalog
    Search {
        /// Free text query
        query: String,

        #[clap(short, long, value_enum, default_value_t = SearchMode::Title)]
        mode: SearchMode,

        /// Maximum results to print
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Print the raw per-row scores for a query
    Raw {
        query: String,
    },

    /// Print engine status and model info
    Status {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = Args::parse_from(["bookseek", "search", "graph theory", "-m", "combined", "-l", "5"]);
        match args.command {
            Command::Search { query, mode, limit } => {
                assert_eq!(query, "graph theory");
                assert_eq!(mode, SearchMode::Combined);
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_search_defaults_to_title() {
        let args = Args::parse_from(["bookseek", "search", "compilers"]);
        assert!(matches!(
            args.command,
            Command::Search {
                mode: SearchMode::Title,
                limit: None,
                ..
            }
        ));
    }
}
