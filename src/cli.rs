use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// SQL Query Guard - Safety gate and repair layer for generated SQL
#[derive(Parser, Debug)]
#[command(name = "sql-query-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

impl Cli {
    /// Whether the selected subcommand asked for verbose output
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Check {
                output, ..
            }
            | Commands::Correct {
                output, ..
            }
            | Commands::Suggest {
                output, ..
            }
            | Commands::Tables {
                output, ..
            } => output.verbose
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a query for injection and policy violations
    Check {
        #[command(flatten)]
        input:  QueryArgs,
        #[command(flatten)]
        output: OutputArgs
    },

    /// Propose ranked corrections for a query
    Correct {
        #[command(flatten)]
        input:    QueryArgs,
        /// Database error message the query produced
        #[arg(short, long)]
        error:    Option<String>,
        /// Correction strategy (defaults to the configured one)
        #[arg(short, long, value_enum)]
        strategy: Option<Strategy>,
        #[command(flatten)]
        output:   OutputArgs
    },

    /// List advisory suggestions for a query
    Suggest {
        #[command(flatten)]
        input:  QueryArgs,
        #[command(flatten)]
        output: OutputArgs
    },

    /// Select the tables most relevant to a question
    Tables {
        /// Table descriptors file (.json, .yaml or .yml)
        #[arg(short, long)]
        schema:    PathBuf,
        /// Natural language question
        #[arg(short, long)]
        question:  String,
        /// Maximum number of tables to return
        #[arg(short, long)]
        max:       Option<usize>,
        /// Embedding cache directory
        #[arg(long, env = "VS_CACHE_DIR")]
        cache_dir: Option<PathBuf>,
        /// Discard the embedding cache before selecting
        #[arg(long)]
        rebuild:   bool,
        #[command(flatten)]
        output:    OutputArgs
    }
}

/// Where the query text comes from; stdin when neither is given
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Query text
    #[arg(short, long, conflicts_with = "file")]
    pub query: Option<String>,

    /// File with the query (use - for stdin)
    #[arg(short = 'i', long = "input")]
    pub file: Option<PathBuf>
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    pub output_format: Format,

    /// Enable verbose output and debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Strategy {
    Conservative,
    Moderate,
    Aggressive
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Yaml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_inline() {
        let cli = Cli::parse_from(["sql-query-guard", "check", "-q", "SELECT 1", "-v"]);
        assert!(cli.verbose());
        match cli.command {
            Commands::Check {
                input, ..
            } => assert_eq!(input.query.as_deref(), Some("SELECT 1")),
            other => panic!("unexpected command: {:?}", other)
        }
    }

    #[test]
    fn test_query_and_file_conflict() {
        let result = Cli::try_parse_from(["sql-query-guard", "check", "-q", "x", "-i", "f.sql"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_correct_strategy() {
        let cli = Cli::parse_from([
            "sql-query-guard",
            "correct",
            "-q",
            "SELCET 1",
            "-s",
            "aggressive",
            "-f",
            "json"
        ]);
        match cli.command {
            Commands::Correct {
                strategy,
                output,
                ..
            } => {
                assert!(matches!(strategy, Some(Strategy::Aggressive)));
                assert!(matches!(output.output_format, Format::Json));
            }
            other => panic!("unexpected command: {:?}", other)
        }
    }
}
