//! # SQL Query Guard
//!
//! Safety gate and repair layer for SQL written by language-model agents.
//!
//! `sql-query-guard` validates generated SQL for injection patterns and
//! policy violations, proposes ranked corrections for broken queries and
//! narrows a schema down to the tables relevant to a question.
//!
//! # Quick Start
//!
//! ```bash
//! # Validate a query (exit code 2 when blocked)
//! sql-query-guard check -q "SELECT name FROM users WHERE 1=1 OR 1=1"
//!
//! # Repair typos and missing clauses
//! sql-query-guard correct -q "SELCET id FORM users" -s conservative
//!
//! # Repair using the error the database returned
//! sql-query-guard correct -q "SELECT usr_nam FROM users" -e 'column "usr_nam" does not exist'
//!
//! # Stream a query from stdin, JSON output
//! echo "SELECT * FROM orders" | sql-query-guard suggest -f json
//!
//! # Pick relevant tables for a question
//! sql-query-guard tables -s tables.json -q "total amount per customer"
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from (in order of precedence):
//!
//! 1. Command-line arguments
//! 2. Environment variables (`SIMILARITY_THRESHOLD`, `MAX_RELEVANT_TABLES`,
//!    `VS_CACHE_DIR`, `SQL_GUARD_MAX_RETRIES`, ...)
//! 3. `.sql-query-guard.toml` in current directory
//! 4. `~/.config/sql-query-guard/config.toml`
//!
//! ## Example Configuration
//!
//! ```toml
//! [security]
//! require_limit = true
//! max_limit_value = 1000
//!
//! [correction]
//! default_strategy = "conservative"
//!
//! [selector]
//! similarity_threshold = 0.35
//! max_tables = 6
//! ```
//!
//! # Exit Codes
//!
//! - `0` - Query is safe, no warnings
//! - `1` - Query is safe but has warnings
//! - `2` - Query is blocked
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`,
//! `-v` raises it to `debug`).

use std::{io, process};

use clap::Parser;
use sql_query_guard::{
    app::{
        CommandOutput, CorrectParams, QueryParams, TablesParams, convert_strategy,
        create_output_options, query_source, run_check, run_correct, run_suggest, run_tables
    },
    cli::{Cli, Commands},
    config::Config,
    error::AppResult
};
use tokio::main;
use tracing_subscriber::EnvFilter;

#[main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose());

    match run(cli).await {
        Ok(output) => {
            for line in output.stdout {
                print!("{}", line);
                if !line.ends_with('\n') {
                    println!();
                }
            }
            process::exit(output.exit_code)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> AppResult<CommandOutput> {
    let config = Config::load()?;

    match cli.command {
        Commands::Check {
            input,
            output
        } => run_check(
            &QueryParams {
                source: query_source(input),
                output: create_output_options(&output)
            },
            &config
        ),
        Commands::Correct {
            input,
            error,
            strategy,
            output
        } => run_correct(
            &CorrectParams {
                query: QueryParams {
                    source: query_source(input),
                    output: create_output_options(&output)
                },
                error,
                strategy: strategy.map(convert_strategy)
            },
            &config
        ),
        Commands::Suggest {
            input,
            output
        } => run_suggest(
            &QueryParams {
                source: query_source(input),
                output: create_output_options(&output)
            },
            &config
        ),
        Commands::Tables {
            schema,
            question,
            max,
            cache_dir,
            rebuild,
            output
        } => {
            run_tables(
                TablesParams {
                    schema_path: schema,
                    question,
                    max_tables: max,
                    cache_dir,
                    rebuild,
                    output: create_output_options(&output)
                },
                config
            )
            .await
        }
    }
}
