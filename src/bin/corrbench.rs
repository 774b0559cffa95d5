use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use corrbench::app::{App, FetchOptions};
use corrbench::config::{ConfigLoader, ResolvedConfig};
use corrbench::domain::{Benchmark, Split, SubClass, ThresholdPolicy};
use corrbench::drive::{DriveHttpClient, DriveSession, DriveTransport};
use corrbench::error::{CorrError, ErrorKind};
use corrbench::output::{ConsoleOutput, JsonOutput, OutputMode};
use corrbench::store::Store;

#[derive(Parser)]
#[command(name = "corrbench")]
#[command(about = "Fetches and lays out semantic-correspondence benchmark datasets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Root directory holding one folder per benchmark.
    #[arg(long, global = true)]
    datapath: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download and unpack benchmarks that are not present yet")]
    Fetch(FetchArgs),
    #[command(about = "List known benchmarks and their local state")]
    List,
    #[command(about = "Show one benchmark's local state and loader settings")]
    Info(InfoArgs),
    #[command(about = "Remove a benchmark's directory and download leftovers")]
    Clear(BenchmarkArg),
}

#[derive(Args)]
struct FetchArgs {
    benchmarks: Vec<String>,

    #[arg(long, conflicts_with = "benchmarks")]
    all: bool,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct BenchmarkArg {
    benchmark: String,
}

#[derive(Args)]
struct InfoArgs {
    benchmark: String,

    /// Override the configured PCK threshold policy.
    #[arg(long)]
    thres: Option<ThresholdPolicy>,

    #[arg(long)]
    split: Option<Split>,

    #[arg(long)]
    feature_size: Option<u32>,

    #[arg(long)]
    sub_class: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CorrError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CorrError) -> u8 {
    match error.kind() {
        ErrorKind::Configuration | ErrorKind::ManualAcquisition => 2,
        ErrorKind::Network => 3,
        ErrorKind::CorruptArchive => 4,
        ErrorKind::Other => match error {
            CorrError::DatasetNotFound(_) => 2,
            _ => 1,
        },
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let datapath = cli.datapath.unwrap_or_else(|| resolved.datapath.clone());
    tracing::debug!(%datapath, endpoint = %resolved.endpoint, "configuration resolved");
    let store = Store::new(datapath);

    match cli.command {
        Commands::Fetch(args) => {
            let drive = DriveHttpClient::with_endpoint(&resolved.endpoint)?;
            run_fetch(args, &resolved, App::new(store, drive), output_mode)
        }
        Commands::List => run_list(App::new(store, NopDrive), output_mode),
        Commands::Info(args) => {
            run_info(args, &resolved, App::new(store, NopDrive), output_mode)
        }
        Commands::Clear(args) => run_clear(args, App::new(store, NopDrive), output_mode),
    }
}

/// Stands in for the HTTP client where no subcommand needs the network.
struct NopDrive;

impl DriveTransport for NopDrive {
    fn open_session(&self) -> Result<Box<dyn DriveSession + '_>, CorrError> {
        Err(CorrError::Network("drive client not configured".to_string()))
    }
}

fn run_fetch<T: DriveTransport>(
    args: FetchArgs,
    resolved: &ResolvedConfig,
    app: App<T>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let FetchArgs {
        benchmarks,
        all,
        force,
        dry_run,
    } = args;

    let benchmarks = if all {
        Benchmark::ALL.to_vec()
    } else if !benchmarks.is_empty() {
        benchmarks
            .iter()
            .map(|value| value.parse::<Benchmark>())
            .collect::<Result<Vec<_>, _>>()?
    } else {
        resolved
            .benchmarks
            .iter()
            .map(|request| request.benchmark)
            .collect()
    };
    if benchmarks.is_empty() {
        return Err(CorrError::Configuration(
            "no benchmarks requested (pass names, --all, or list them in corrbench.json)"
                .to_string(),
        )
        .into());
    }

    let options = FetchOptions { force, dry_run };
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch(&benchmarks, options, &JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.fetch(&benchmarks, options, &ConsoleOutput)?;
            ConsoleOutput::print_fetch(&result);
        }
    }
    Ok(())
}

fn run_list<T: DriveTransport>(app: App<T>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.list(&JsonOutput)?;
            JsonOutput::print_list(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.list(&ConsoleOutput)?;
            ConsoleOutput::print_list(&result);
        }
    }
    Ok(())
}

fn run_info<T: DriveTransport>(
    args: InfoArgs,
    resolved: &ResolvedConfig,
    app: App<T>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let InfoArgs {
        benchmark,
        thres,
        split,
        feature_size,
        sub_class,
    } = args;
    let mut request = resolved.request_for(benchmark.parse::<Benchmark>()?);
    if let Some(thres) = thres {
        request.thres = thres;
    }
    if let Some(split) = split {
        request.split = split;
    }
    if let Some(feature_size) = feature_size {
        request.feature_size = feature_size;
    }
    if let Some(sub_class) = sub_class.as_deref() {
        request.sub_class = SubClass::from(sub_class);
    }

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.info(&request, &JsonOutput)?;
            JsonOutput::print_info(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.info(&request, &ConsoleOutput)?;
            ConsoleOutput::print_info(&result);
        }
    }
    Ok(())
}

fn run_clear<T: DriveTransport>(
    args: BenchmarkArg,
    app: App<T>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let benchmark = args.benchmark.parse::<Benchmark>()?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.clear(benchmark, &JsonOutput)?;
            JsonOutput::print_clear(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.clear(benchmark, &ConsoleOutput)?;
            ConsoleOutput::print_clear(&result);
        }
    }
    Ok(())
}
