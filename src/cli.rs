//! Command-line argument parsing for the `switchboard` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::classify::ClassifierKind;
use crate::config::{Config, STATE_DB_ENV, UPLOAD_DIR_ENV};
use crate::connection::ActivationPolicy;
use crate::dialect::Dialect;
use crate::error::{GatewayError, Result};

/// Output format for result tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Tab-separated rows with a header line.
    #[default]
    Text,
    /// The table as a JSON object with `columns` and `rows`.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// A multi-tenant SQL gateway for PostgreSQL, MySQL and SQLite.
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Backend connection string (postgres://, mysql:// or a SQLite path/URL)
    #[arg(value_name = "CONNECTION_STRING", env = "SWITCHBOARD_DATABASE_URL")]
    pub connection_string: Option<String>,

    /// Backend dialect: postgres, mysql or sqlite
    #[arg(short = 'D', long, value_name = "DIALECT", default_value = "postgres")]
    pub dialect: Dialect,

    /// Label for the connection (generated when omitted)
    #[arg(short = 'l', long, value_name = "LABEL")]
    pub label: Option<String>,

    /// Upload a SQLite database file instead of using a connection string
    #[arg(long, value_name = "PATH", conflicts_with = "connection_string")]
    pub upload: Option<PathBuf>,

    /// Login name
    #[arg(short = 'u', long, value_name = "USER", env = "SWITCHBOARD_USER")]
    pub user: String,

    /// Password
    #[arg(long, value_name = "PASSWORD", env = "SWITCHBOARD_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Register the user before logging in
    #[arg(long)]
    pub register: bool,

    /// SQL statement to run
    #[arg(short = 'e', long, value_name = "SQL")]
    pub execute: Option<String>,

    /// File whose full content is run as one SQL text
    #[arg(short = 'f', long, value_name = "PATH", conflicts_with = "execute")]
    pub file: Option<PathBuf>,

    /// List the tables of the connected database
    #[arg(long)]
    pub tables: bool,

    /// Print statement history for the connected database
    #[arg(long)]
    pub history: bool,

    /// Only print the most recent N history entries
    #[arg(long, value_name = "N", requires = "history")]
    pub history_limit: Option<i64>,

    /// Print connections made recently by the user
    #[arg(long)]
    pub recent: bool,

    /// Output format for result tables: text or json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output: OutputFormat,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// State database path
    #[arg(long, value_name = "PATH", env = STATE_DB_ENV)]
    pub state_db: Option<PathBuf>,

    /// Root directory for uploaded databases
    #[arg(long, value_name = "PATH", env = UPLOAD_DIR_ENV)]
    pub upload_dir: Option<PathBuf>,

    /// Activation policy: last_active_wins or exclusive
    #[arg(long, value_name = "POLICY")]
    pub activation: Option<ActivationPolicy>,

    /// Statement classifier: substring or parser
    #[arg(long, value_name = "KIND")]
    pub classifier: Option<ClassifierKind>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path (from --config or the default location).
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies CLI overrides on top of file and environment configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(path) = &self.state_db {
            config.state_db = Some(path.clone());
        }
        if let Some(path) = &self.upload_dir {
            config.upload_dir = Some(path.clone());
        }
        if let Some(policy) = self.activation {
            config.gateway.activation = policy;
        }
        if let Some(kind) = self.classifier {
            config.gateway.classifier = kind;
        }
    }

    /// Checks combinations clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.upload.is_some() && self.dialect != Dialect::Sqlite {
            return Err(GatewayError::unsupported_dialect(format!(
                "--upload needs --dialect sqlite, got {}",
                self.dialect
            )));
        }
        let wants_backend =
            self.execute.is_some() || self.file.is_some() || self.tables || self.history;
        if wants_backend && self.connection_string.is_none() && self.upload.is_none() {
            return Err(GatewayError::config(
                "a connection string or --upload is required to run statements",
            ));
        }
        Ok(())
    }
}
