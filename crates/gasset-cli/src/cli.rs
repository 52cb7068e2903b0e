use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gasset",
    about = "Snapshot the asset directories of a git project into a backup repository",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Start the project root search here instead of the current directory
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Directory holding connection files [default: the user config directory]
    #[arg(long, global = true, env = "GASSET_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect this machine to the project's repository
    Init(InitArgs),
    /// Snapshot every source directory declared in the project
    Snap(SnapArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Create a new repository in empty storage
    #[arg(short, long)]
    pub create: bool,
}

#[derive(Args)]
pub struct SnapArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["gasset", "init"]).unwrap();
        let Command::Init(args) = cli.command else {
            panic!("expected init");
        };
        assert!(!args.create);
    }

    #[test]
    fn parse_init_create() {
        for flag in ["-c", "--create"] {
            let cli = Cli::try_parse_from(["gasset", "init", flag]).unwrap();
            let Command::Init(args) = cli.command else {
                panic!("expected init");
            };
            assert!(args.create);
        }
    }

    #[test]
    fn parse_snap() {
        let cli = Cli::try_parse_from(["gasset", "snap"]).unwrap();
        assert!(matches!(cli.command, Command::Snap(_)));
    }

    #[test]
    fn parse_global_flags_after_command() {
        let cli = Cli::try_parse_from([
            "gasset", "snap", "--verbose", "--project", "/work/game", "--config-dir", "/tmp/conf",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.project, Some(PathBuf::from("/work/game")));
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/conf")));
    }

    #[test]
    fn missing_command_is_an_error() {
        assert!(Cli::try_parse_from(["gasset"]).is_err());
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(Cli::try_parse_from(["gasset", "restore"]).is_err());
    }
}
