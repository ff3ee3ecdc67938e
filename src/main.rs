use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use dtogen::codegen::{generate_files, GenerationInput};
use dtogen::config::{package_name, Config, ConnectionInfo, DbmsKind};
use dtogen::queries::load_custom_queries;
use dtogen::schema::Metadata;

#[derive(Parser, Debug)]
#[command(name = "dtogen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Target directory holding db.json; generated files are written here
    directory: PathBuf,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("dtogen v{}", env!("CARGO_PKG_VERSION"));
    info!(directory = ?cli.directory, "Starting code generation");

    if !cli.directory.is_dir() {
        bail!("Target directory {} does not exist", cli.directory.display());
    }
    let package = package_name(&cli.directory).context("Invalid target directory")?;
    debug!(package = ?package, "Package name");

    // Load configuration
    let config = Config::load(&cli.directory).context("Failed to load configuration")?;
    let dbms = config.connection.dbms_kind()?;
    let language = config.target_language()?;
    info!(dbms = %dbms, language = %language, "Configuration ready");

    // Introspect database
    let metadata = introspect_database(dbms, &config.connection)?;

    if metadata.tables.is_empty() {
        warn!(schemas = ?config.connection.schemas, "No tables found");
    }

    for table in &metadata.tables {
        debug!(
            schema = ?table.schema,
            table = ?table.name,
            columns = ?table.columns.len(),
            "Table"
        );
        for column in &table.columns {
            debug!("    {}", column);
        }
    }

    let queries = load_custom_queries(&cli.directory).context("Failed to read custom queries")?;

    let input = GenerationInput {
        package: &package,
        connection: &config.connection,
        metadata: &metadata,
        queries: &queries,
    };
    let written = generate_files(language, &input, &cli.directory)
        .context("Failed to generate code")?;

    info!(files = ?written.len(), directory = ?cli.directory, "Done");
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn introspect_database(dbms: DbmsKind, connection: &ConnectionInfo) -> Result<Metadata> {
    match dbms {
        DbmsKind::PostgreSql => introspect_postgres(connection),
    }
}

#[cfg(feature = "postgres")]
fn introspect_postgres(connection: &ConnectionInfo) -> Result<Metadata> {
    use dtogen::error::DtoGenError;
    use dtogen::introspect::Introspector;
    use dtogen::PostgresIntrospector;
    use postgres::NoTls;

    info!(connection = ?connection.redacted_connection_string(), "Connecting to PostgreSQL");

    let mut client = postgres::Client::connect(&connection.connection_string(), NoTls)
        .map_err(|e| DtoGenError::Connection(e.to_string()))
        .with_context(|| {
            format!(
                "Failed to connect to PostgreSQL at {}",
                connection.redacted_connection_string()
            )
        })?;

    info!("Connected to database");

    let mut introspector = PostgresIntrospector::new(&mut client);
    let metadata = introspector
        .introspect(&connection.database, &connection.schemas)
        .context("Failed to introspect schema")?;

    if let Err(e) = client.close() {
        warn!(error = ?e, "Failed to close database connection");
    }

    Ok(metadata)
}

#[cfg(not(feature = "postgres"))]
fn introspect_postgres(_connection: &ConnectionInfo) -> Result<Metadata> {
    bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}
