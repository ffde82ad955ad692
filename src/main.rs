//! switchboard - command-line front end for the db-switchboard gateway.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use db_switchboard::cli::{Cli, OutputFormat};
use db_switchboard::config::Config;
use db_switchboard::gateway::Gateway;
use db_switchboard::history::to_text_rows;
use db_switchboard::logging;
use db_switchboard::persistence::{HistoryFilter, StateDb};
use db_switchboard::query::TabularResult;
use db_switchboard::uploads::LocalBlobStore;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => {
            if let Err(e) = logging::init_file_logging(path) {
                eprintln!("Warning: {e}");
            }
        }
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    cli.validate()?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env();
    cli.apply_to(&mut config);

    let state_path = config.state_db_path()?;
    let state_db = StateDb::open(&state_path)
        .await
        .with_context(|| format!("cannot open state database {}", state_path.display()))?;
    let uploads = LocalBlobStore::new(config.upload_root()?);
    let gateway = Gateway::new(
        Arc::new(state_db.clone()),
        Arc::new(uploads),
        &config.gateway,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = session(&gateway, &cli, &cancel).await;

    gateway.logout(&cli.user).await;
    gateway.shutdown().await;
    state_db.close().await;
    outcome
}

async fn session(gateway: &Gateway, cli: &Cli, cancel: &CancellationToken) -> Result<()> {
    if cli.register {
        gateway.register(&cli.user, &cli.password).await?;
    }
    gateway.login(&cli.user, &cli.password).await?;

    let tenant = cli.user.as_str();
    let label = cli.label.as_deref();

    if let Some(path) = &cli.upload {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let filename = upload_name(path)?;
        let connection = gateway
            .connect_from_upload(tenant, cli.dialect, label, &filename, &bytes)
            .await?;
        info!(label = %connection.database_label, "Connected to uploaded database");
    } else if let Some(connection_string) = &cli.connection_string {
        let connection = gateway
            .connect(tenant, cli.dialect, connection_string, label)
            .await?;
        info!(label = %connection.database_label, "Connected");
    }

    if let Some(sql) = &cli.execute {
        let result = gateway.execute_query(tenant, sql, cancel).await?;
        print_result(result.as_ref(), cli.output)?;
    } else if let Some(path) = &cli.file {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        let result = gateway.execute_from_file(tenant, Some(file), cancel).await?;
        print_result(result.as_ref(), cli.output)?;
    }

    if cli.tables {
        for table in gateway.list_tables(tenant, cancel).await? {
            println!("{table}");
        }
    }

    if cli.history {
        let filter = HistoryFilter {
            dialect: None,
            limit: cli.history_limit,
        };
        let records = gateway.get_history(tenant, &filter).await?;
        let table = TabularResult::new(
            ["database", "dialect", "statement", "executed_at"]
                .map(String::from)
                .to_vec(),
            to_text_rows(&records),
        );
        print_result(Some(&table), cli.output)?;
    }

    if cli.recent {
        for record in gateway.recent_connections(tenant).await? {
            println!(
                "{}\t{}\t{}\t{}",
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.dialect,
                record.database_label,
                record.connection_string
            );
        }
    }

    Ok(())
}

fn upload_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

fn print_result(result: Option<&TabularResult>, format: OutputFormat) -> Result<()> {
    let Some(table) = result else {
        println!("OK");
        return Ok(());
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(table)?);
        }
        OutputFormat::Text => {
            for row in table.with_header_row() {
                println!("{}", row.join("\t"));
            }
            println!("({} rows)", table.row_count());
        }
    }
    Ok(())
}
