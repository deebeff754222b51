use clap::Parser;
use querygate::cli::{self, Cli, Command};
use querygate::config::GatewaySettings;
use querygate::credentials::CredentialResolver;
use querygate::error::GatewayError;
use querygate::format_detect::{self, OutputFormat};
use querygate::table::ResultTable;
use querygate::validation::{self, Classification};
use querygate::{QueryClient, QueryRequest, format, format_csv, logging, output};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            output::print_error(&err);
            process::exit(1);
        }
    }
}

/// Returns whether the command succeeded; errors are printed by the caller.
async fn run(cli: Cli) -> Result<bool, GatewayError> {
    let settings = GatewaySettings::load(cli.config.as_deref())?;
    logging::init(cli.verbose || settings.verbose);

    match cli.command {
        Command::Query(ref args) => {
            query(args, settings, &cli).await?;
            Ok(true)
        }
        Command::TestConnection => {
            let client = QueryClient::new(
                CredentialResolver::layered(cli.env_file.as_deref()),
                settings,
            );
            let healthy = client.test_connection().await;
            println!("{}", if healthy { "ok" } else { "failed" });
            Ok(healthy)
        }
        Command::Validate(ref input) => {
            let sql = resolve_sql(input)?;
            match validation::classify(&sql) {
                Classification::Allowed => {
                    println!("allowed");
                    Ok(true)
                }
                Classification::Blocked(reason) => {
                    println!("blocked: {}", reason.detail);
                    Ok(false)
                }
            }
        }
    }
}

async fn query(
    args: &cli::QueryArgs,
    settings: GatewaySettings,
    cli: &Cli,
) -> Result<(), GatewayError> {
    let sql = resolve_sql(&args.input)?;

    // Detect output format before query (fail-fast on bad extension)
    let format_info = match args.output {
        Some(ref path) => Some(format_detect::detect_format(path)?),
        None => None,
    };

    let mut request = QueryRequest::new(sql);
    if let Some(ref name) = args.name {
        request = request.with_name(name.clone());
    }
    if let Some(secs) = args.timeout {
        request = request.with_timeout(Duration::from_secs(secs));
    }

    let client = QueryClient::new(
        CredentialResolver::layered(cli.env_file.as_deref()),
        settings,
    );
    let mut table = client.execute(&request).await?;
    if args.coerce {
        table = table.coerced();
    }

    output_result(&table, format_info)
}

// --- Helpers ---

fn resolve_sql(input: &cli::SqlInput) -> Result<String, GatewayError> {
    if let Some(ref sql) = input.sql {
        return Ok(sql.clone());
    }
    if let Some(ref path) = input.sql_file {
        let content = std::fs::read_to_string(path).map_err(|e| GatewayError::Configuration {
            message: format!("cannot read SQL file {}: {}", path.display(), e),
        })?;
        return Ok(content);
    }
    Err(GatewayError::Configuration {
        message: "no SQL provided, use a positional argument or --file".to_string(),
    })
}

fn output_result(
    table: &ResultTable,
    format_info: Option<(OutputFormat, PathBuf)>,
) -> Result<(), GatewayError> {
    let Some((format, path)) = format_info else {
        output::print_result(&format::to_toon(table)?);
        if table.is_truncated() {
            output::print_truncation_warning(table.num_rows());
        }
        return Ok(());
    };

    tracing::debug!(format = format.label(), path = %path.display(), "writing output file");
    match format {
        OutputFormat::Toon => output::write_file(&format::to_toon(table)?, &path)?,
        OutputFormat::Csv => format_csv::write_csv(table, &path)?,
    }
    output::print_summary(table.num_rows(), &path, table.is_truncated())
}
