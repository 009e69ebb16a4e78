use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// migrun - apply and roll back timestamped SQL migrations
#[derive(Parser, Debug)]
#[command(name = "migrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Config file (YAML, TOML or .environment); discovered in the working
    /// directory when omitted
    #[arg(short, long, global = true, env = "MIGRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit structured JSON logs
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List migrations and whether each is applied
    Status(StatusArgs),

    /// Apply pending migrations
    Up(UpArgs),

    /// Roll back the most recently applied migrations
    Down(DownArgs),

    /// Print a migration's metadata and statements
    Show(ShowArgs),

    /// Create a new, empty migration file
    Create(CreateArgs),
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct UpArgs {
    /// Apply at most this many migrations
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DownArgs {
    /// Number of migrations to roll back
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Migration ID (file name without extension)
    pub migration_id: String,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Short label, turned into the file name suffix
    pub label: String,

    /// Description header; defaults to the configured default description
    #[arg(short, long)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn down_defaults_to_one() {
        let cli = Cli::try_parse_from(["migrun", "down"]).unwrap();
        match cli.command {
            Commands::Down(args) => assert_eq!(args.count, 1),
            other => panic!("expected down, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli =
            Cli::try_parse_from(["migrun", "up", "-n", "2", "--config", "db/migrun.yml", "-v"])
                .unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.config, Some(PathBuf::from("db/migrun.yml")));
        match cli.command {
            Commands::Up(args) => assert_eq!(args.count, Some(2)),
            other => panic!("expected up, got {other:?}"),
        }
    }

    #[test]
    fn create_takes_label_and_description() {
        let cli = Cli::try_parse_from(["migrun", "create", "add users", "-d", "first"]).unwrap();
        match cli.command {
            Commands::Create(args) => {
                assert_eq!(args.label, "add users");
                assert_eq!(args.description.as_deref(), Some("first"));
            }
            other => panic!("expected create, got {other:?}"),
        }
    }
}
