//! DAAL command-line interface: run one adapter operation and print its
//! response envelope as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use daal::{build_adapter, BackendAdapter, BackendKind, FilterSpec, QueryOptions, Record, ResponseEnvelope};
use daal_config_and_utils::{init_logging, Config, Paths};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Parser)]
#[command(name = "daal")]
#[command(about = "Query and authenticate against any configured DAAL backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend to use (mock, http, embedded, sql); overrides the config file
    #[arg(short, long, global = true, env = "DAAL_BACKEND")]
    backend: Option<BackendKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, storage and logs. Defaults to ~/.daal
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Select rows
    Select {
        table: String,
        /// Filter as JSON, e.g. '{"age":{"gte":18}}'
        #[arg(short, long)]
        filter: Option<String>,
        /// Comma-separated columns
        #[arg(short, long, default_value = "*")]
        columns: String,
        /// Order column; prefix with '-' for descending
        #[arg(short, long)]
        order: Option<String>,
        #[arg(short, long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
        /// Return at most one row (null when none match)
        #[arg(long)]
        single: bool,
    },
    /// Count rows matching a filter
    Count {
        table: String,
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Insert one record, or several when given a JSON array
    Insert { table: String, data: String },
    /// Patch every row matching the filter
    Update {
        table: String,
        #[arg(short, long)]
        filter: String,
        patch: String,
    },
    /// Delete every row matching the filter
    Delete {
        table: String,
        #[arg(short, long)]
        filter: String,
    },
    /// Insert or merge by id
    Upsert { table: String, data: String },
    /// Call a server-side procedure
    Rpc {
        function: String,
        /// Parameters as JSON
        #[arg(default_value = "null")]
        params: String,
    },
    /// Sign in with email and password
    SignIn { email: String, password: String },
    /// Create an account and sign in
    SignUp { email: String, password: String },
    /// Drop the current session
    SignOut,
    /// Show the signed-in principal
    Whoami,
}

fn parse_json(label: &str, raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("invalid {} JSON: {}", label, e))
}

fn parse_filter(raw: Option<&str>) -> anyhow::Result<FilterSpec> {
    match raw {
        Some(raw) => FilterSpec::from_wire(parse_json("filter", raw)?)
            .map_err(|e| anyhow::anyhow!("invalid filter: {}", e)),
        None => Ok(FilterSpec::new()),
    }
}

fn parse_record(label: &str, raw: &str) -> anyhow::Result<Record> {
    match parse_json(label, raw)? {
        Value::Object(record) => Ok(record),
        other => anyhow::bail!("{} must be a JSON object, got {}", label, other),
    }
}

fn parse_order(raw: &str) -> daal::OrderBy {
    match raw.strip_prefix('-') {
        Some(column) => daal::OrderBy::desc(column),
        None => daal::OrderBy::asc(raw),
    }
}

fn print<T: Serialize>(envelope: &ResponseEnvelope<T>) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(envelope.success)
}

async fn run(adapter: &dyn BackendAdapter, command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Select {
            table,
            filter,
            columns,
            order,
            limit,
            offset,
            single,
        } => {
            let filters = parse_filter(filter.as_deref())?;
            if single {
                return print(&adapter.select_one(&table, &columns, &filters).await);
            }
            let mut options = QueryOptions::columns(&columns);
            options.order_by = order.as_deref().map(parse_order);
            options.limit = limit;
            options.offset = offset;
            print(&adapter.query(&table, &filters, &options).await)
        }
        Commands::Count { table, filter } => {
            let filters = parse_filter(filter.as_deref())?;
            print(&adapter.count(&table, &filters).await)
        }
        Commands::Insert { table, data } => match parse_json("data", &data)? {
            Value::Array(items) => {
                let records = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(record) => Ok(record),
                        other => anyhow::bail!("data items must be objects, got {}", other),
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                print(&adapter.insert_many(&table, records).await)
            }
            _ => print(&adapter.insert(&table, parse_record("data", &data)?).await),
        },
        Commands::Update {
            table,
            filter,
            patch,
        } => {
            let filters = parse_filter(Some(&filter))?;
            print(&adapter.update(&table, &filters, parse_record("patch", &patch)?).await)
        }
        Commands::Delete { table, filter } => {
            let filters = parse_filter(Some(&filter))?;
            print(&adapter.delete(&table, &filters).await)
        }
        Commands::Upsert { table, data } => {
            print(&adapter.upsert(&table, parse_record("data", &data)?).await)
        }
        Commands::Rpc { function, params } => {
            print(&adapter.rpc(&function, parse_json("params", &params)?).await)
        }
        // Print the principal, never the token.
        Commands::SignIn { email, password } => {
            print(&adapter.sign_in(&email, &password).await.map(|s| s.principal))
        }
        Commands::SignUp { email, password } => {
            print(&adapter.sign_up(&email, &password).await.map(|s| s.principal))
        }
        Commands::SignOut => print(&adapter.sign_out().await),
        Commands::Whoami => print(&adapter.get_current_user().await),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, Some(paths.log_file()));
    debug!(backend = %config.backend, "Configuration loaded");

    let adapter = build_adapter(&config, &paths).await?;
    if !run(adapter.as_ref(), cli.command).await? {
        std::process::exit(1);
    }
    Ok(())
}
