//! dimql CLI - compile and run report queries over a dimensional schema
//!
//! Usage:
//!   dimql run --schema <schema.toml> --query <query.json> [--db <file>] [--format table|json]
//!   dimql explain --schema <schema.toml> --query <query.json> [--dialect <dialect>]
//!   dimql describe --schema <schema.toml>
//!
//! Settings come from `dimql.toml` (or `DIMQL_CONFIG`); `RUST_LOG` overrides
//! the configured log level.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use dimql::backend::SqliteBackend;
use dimql::config::Settings;
use dimql::query::{Query, QueryOptions};
use dimql::schema::{self, Schema, TypeKind};
use dimql::sql::Dialect;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dimql")]
#[command(about = "dimql - compile report queries over a dimensional schema into SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print its rows
    Run {
        /// Schema definition (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Query options (.json or .toml)
        #[arg(short, long)]
        query: PathBuf,

        /// SQLite database file (defaults to database.path from settings)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the SQL a query compiles to
    Explain {
        /// Schema definition (TOML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Query options (.json or .toml)
        #[arg(short, long)]
        query: PathBuf,

        /// SQL dialect to render (defaults to database.dialect from settings)
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },

    /// List the types of a schema
    Describe {
        /// Schema definition (TOML)
        #[arg(short, long)]
        schema: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Sqlite,
    Postgres,
    Mysql,
    Tsql,
    Duckdb,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Sqlite => Dialect::Sqlite,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Tsql => Dialect::TSql,
            DialectArg::Duckdb => Dialect::DuckDb,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Aligned text table
    Table,
    /// Column descriptors and rows as JSON
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings);

    match cli.command {
        Commands::Run {
            schema,
            query,
            db,
            format,
        } => cmd_run(&settings, schema, query, db, format),
        Commands::Explain {
            schema,
            query,
            dialect,
        } => cmd_explain(&settings, schema, query, dialect),
        Commands::Describe { schema } => cmd_describe(schema),
    }
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_schema(path: &Path) -> Result<Arc<Schema>, String> {
    schema::load_file(path)
        .map(Arc::new)
        .map_err(|e| format!("Error loading schema '{}': {}", path.display(), e))
}

fn load_query(schema: Arc<Schema>, path: &Path) -> Result<Query, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Error reading query '{}': {}", path.display(), e))?;
    let options = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => QueryOptions::from_toml(&content),
        _ => QueryOptions::from_json(&content),
    }
    .map_err(|e| format!("Error in query '{}': {}", path.display(), e))?;
    debug!("Query options: {:?}", options);
    Query::new(schema, options).map_err(|e| format!("Error in query '{}': {}", path.display(), e))
}

fn open_backend(settings: &Settings, db: Option<PathBuf>) -> Result<SqliteBackend, String> {
    let path = match db {
        Some(path) => Some(path),
        None => settings
            .database
            .resolved_path()
            .map_err(|e| format!("Error in settings: {}", e))?,
    };
    match path {
        Some(path) => SqliteBackend::open(&path)
            .map_err(|e| format!("Error opening database '{}': {}", path.display(), e)),
        None => SqliteBackend::open_in_memory().map_err(|e| format!("Error opening database: {}", e)),
    }
}

fn cmd_run(
    settings: &Settings,
    schema: PathBuf,
    query: PathBuf,
    db: Option<PathBuf>,
    format: OutputFormat,
) -> ExitCode {
    let result = (|| {
        let schema = load_schema(&schema)?;
        let query = load_query(schema, &query)?;
        let backend = open_backend(settings, db)?;
        match format {
            OutputFormat::Table => {
                let table = query
                    .to_table(&backend, &settings.query)
                    .map_err(|e| format!("Error running query: {}", e))?;
                print_table(&table);
            }
            OutputFormat::Json => {
                let data = query
                    .to_data(&backend, &settings.query)
                    .map_err(|e| format!("Error running query: {}", e))?;
                let text = serde_json::to_string_pretty(&data)
                    .map_err(|e| format!("Error writing JSON: {}", e))?;
                println!("{}", text);
            }
        }
        Ok::<_, String>(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_explain(settings: &Settings, schema: PathBuf, query: PathBuf, dialect: Option<DialectArg>) -> ExitCode {
    let result = (|| {
        let dialect = match dialect {
            Some(d) => d.into(),
            None => settings
                .database
                .dialect()
                .map_err(|e| format!("Error in settings: {}", e))?,
        };
        let schema = load_schema(&schema)?;
        let query = load_query(schema, &query)?;
        // Temp tables for table-less types still have to be created somewhere.
        let backend = SqliteBackend::open_in_memory().map_err(|e| format!("Error opening database: {}", e))?;
        query
            .explain(&backend, &settings.query, dialect)
            .map_err(|e| format!("Error compiling query: {}", e))
    })();

    match result {
        Ok(sql) => {
            println!("{}", sql);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_describe(schema: PathBuf) -> ExitCode {
    let schema = match load_schema(&schema) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    for kind in [TypeKind::Fact, TypeKind::Dimension] {
        let types: Vec<_> = schema.types().filter(|t| t.kind == kind).collect();
        if types.is_empty() {
            continue;
        }
        println!("{}:", if kind == TypeKind::Fact { "Facts" } else { "Dimensions" });
        for ty in types {
            match &ty.table {
                Some(table) => println!("  {} (table {})", ty.name, table),
                None => println!("  {} (generated)", ty.name),
            }
            for dimension in &ty.dimensions {
                let mut flags = Vec::new();
                if dimension.primary {
                    flags.push("primary");
                }
                if dimension.null {
                    flags.push("null");
                }
                if dimension.filterable {
                    flags.push("filterable");
                }
                if !dimension.group_by {
                    flags.push("no group_by");
                }
                println!("    - {}: {} [{}]", dimension.name, dimension.type_name, flags.join(", "));
            }
        }
        println!();
    }
    ExitCode::SUCCESS
}

fn print_table(table: &[Vec<String>]) {
    let Some(header) = table.first() else {
        return;
    };
    let widths: Vec<usize> = (0..header.len())
        .map(|i| table.iter().map(|row| row[i].chars().count()).max().unwrap_or(0))
        .collect();
    for (n, row) in table.iter().enumerate() {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        println!("{}", cells.join(" | ").trim_end());
        if n == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            println!("{}", rule.join("-+-"));
        }
    }
}
