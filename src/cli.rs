/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build timestamp injected at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "vtc-backup")]
#[command(author, version = VERSION_WITH_BUILD, about = "Backup and restore for the VTC platform database", long_about = None)]
pub struct Cli {
    /// Environment file merged under the process environment
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backup operations
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Show how the runtime environment is classified
    Env,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run HTTP API server mode
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,
    },
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a backup (native dump, or JSON snapshot when restricted)
    Create {
        /// Write a JSON snapshot file instead of a native dump
        #[arg(long)]
        json: bool,
    },

    /// List stored backups
    List,

    /// Delete a stored native backup
    Delete { name: String },

    /// Restore the database, replacing its contents
    Restore {
        /// Stored backup name
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        name: Option<String>,

        /// Local JSON snapshot to restore from
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write a JSON snapshot of the database to a file
    Export {
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// View configuration
    View,

    /// Validate configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_restore_by_name_or_file() {
        let cli = Cli::try_parse_from(["vtc-backup", "backup", "restore", "vtc-backup-x.bak"]).unwrap();
        match cli.command {
            Commands::Backup {
                command: BackupCommands::Restore { name, file },
            } => {
                assert_eq!(name.as_deref(), Some("vtc-backup-x.bak"));
                assert!(file.is_none());
            }
            _ => panic!("expected backup restore"),
        }

        let cli = Cli::try_parse_from(["vtc-backup", "backup", "restore", "--file", "snap.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Backup {
                command: BackupCommands::Restore { name: None, file: Some(_) }
            }
        ));

        assert!(Cli::try_parse_from(["vtc-backup", "backup", "restore"]).is_err());
        assert!(Cli::try_parse_from(["vtc-backup", "backup", "restore", "a.bak", "--file", "b.json"]).is_err());
    }

    #[test]
    fn test_global_env_file() {
        let cli = Cli::try_parse_from(["vtc-backup", "env", "--env-file", "prod.env"]).unwrap();
        assert_eq!(cli.env_file, PathBuf::from("prod.env"));

        let cli = Cli::try_parse_from(["vtc-backup", "backup", "list"]).unwrap();
        assert_eq!(cli.env_file, PathBuf::from(".env"));
    }
}
