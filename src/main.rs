use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use stackdump::convert::{ConversionTask, ConvertOptions};
use stackdump::discover;
use stackdump::pool::{self, PoolOptions};
use stackdump::schema::HeaderStyle;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "stackdump")]
#[command(about = "Convert StackExchange XML dumps into CSV for Neo4j bulk import")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every known dump (Posts, Tags, Users) found in a directory
    Dir(DirArgs),
    /// Convert the given files, with optional column lists (PATH[:SPEC,...])
    Files(FilesArgs),
}

#[derive(Args)]
struct DirArgs {
    /// Directory holding [gzipped] XML files of a StackExchange dump
    source_dir: PathBuf,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct FilesArgs {
    /// Dump files, each optionally followed by ':' and comma-separated
    /// column specs (sourceName#outputName[:TYPE])
    #[arg(required = true)]
    files: Vec<String>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct RunArgs {
    /// Output directory (defaults to each source file's directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of files converted concurrently
    #[arg(long, default_value_t = stackdump::config::WORKER_THREADS)]
    threads: usize,

    /// Give up waiting for conversions after this many minutes
    #[arg(long, default_value_t = stackdump::config::DRAIN_TIMEOUT_MINUTES)]
    timeout_minutes: u64,

    /// Rows sampled for new columns when no column list is given
    #[arg(long, default_value_t = stackdump::config::SAMPLE_ROWS)]
    sample_rows: u64,

    /// Values longer than this many characters are left empty
    #[arg(long, default_value_t = stackdump::config::MAX_VALUE_LEN)]
    max_value_len: usize,

    /// Keep type annotations in headers (e.g. id:ID(Post))
    #[arg(long)]
    typed_headers: bool,
}

impl RunArgs {
    fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            sample_rows: self.sample_rows,
            max_value_len: self.max_value_len,
            header_style: if self.typed_headers {
                HeaderStyle::Typed
            } else {
                HeaderStyle::Plain
            },
        }
    }

    fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            threads: self.threads,
            drain_timeout: Duration::from_secs(self.timeout_minutes.saturating_mul(60)),
            show_progress: std::io::stderr().is_terminal(),
        }
    }

    fn prepare_output_dir(&self) -> Result<Option<&Path>> {
        if let Some(dir) = &self.output_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        }
        Ok(self.output_dir.as_deref())
    }
}

fn run_dir(args: DirArgs) -> Result<()> {
    let output_dir = args.run.prepare_output_dir()?;
    let tasks = discover::discover_tasks(&args.source_dir, output_dir)?;
    run_conversions(tasks, &args.run)
}

fn run_files(args: FilesArgs) -> Result<()> {
    let output_dir = args.run.prepare_output_dir()?;
    let tasks = args
        .files
        .iter()
        .map(|arg| discover::parse_file_arg(arg, output_dir))
        .collect::<Result<Vec<_>>>()?;
    discover::check_unique_outputs(&tasks)?;
    run_conversions(tasks, &args.run)
}

fn run_conversions(tasks: Vec<ConversionTask>, run: &RunArgs) -> Result<()> {
    let start = Instant::now();
    let file_count = tasks.len();
    let summary = pool::run_tasks(tasks, &run.convert_options(), &run.pool_options())?;
    let stats = summary.stats.clone();

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", start.elapsed().as_secs_f64());
    println!();
    println!("Files:              {}", file_count);
    println!("Files converted:    {}", stats.converted());
    println!("Files failed:       {}", stats.failed());
    println!("Rows written:       {}", stats.rows());
    println!("Edges written:      {}", stats.edges());
    println!("Oversized values:   {}", stats.oversized());
    println!("Unmapped values:    {}", stats.unmapped());

    summary.into_result().map(|_| ())
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Dir(args) => run_dir(args),
        Commands::Files(args) => run_files(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
