use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use runprobe::cli::{self, exec::ExecChecks, Context};
use runprobe::errors::Result;
use runprobe::suggestions::display_error_with_suggestions;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "RUNPROBE_LOG";

#[derive(Parser)]
#[command(name = "runprobe")]
#[command(about = "End-to-end checks for container build and runtime images", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (defaults to .runprobe.yml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append debug reports to this file instead of stderr
    #[arg(long, global = true)]
    report_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a scenario's application, run it, and check its HTTP response
    BuildRun {
        /// Scenario file
        scenario: PathBuf,
    },

    /// Run a scenario's application without building it first
    Run {
        /// Scenario file
        scenario: PathBuf,
    },

    /// Run a one-shot container and check its exit code and output
    Exec {
        /// Image to run
        image: String,

        /// Expected exit code (default: any success)
        #[arg(long)]
        expect_exit: Option<i32>,

        /// Expected stdout, compared with newlines normalized
        #[arg(long)]
        expect_stdout: Option<String>,

        /// Text stdout must contain (repeatable)
        #[arg(long)]
        stdout_contains: Vec<String>,

        /// Text stderr must contain (repeatable)
        #[arg(long)]
        stderr_contains: Vec<String>,

        /// Environment variable NAME=value (repeatable)
        #[arg(short, long)]
        env: Vec<String>,

        /// Command and arguments to run in the container
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Check the version and commit stamp of a runtime image (CI only)
    VersionCheck {
        /// Image to check
        image: String,

        /// Base version the build number is appended to
        #[arg(long)]
        base_version: Option<String>,
    },

    /// Parse `docker port` output and print the host port
    Port {
        /// Mapping text, e.g. "6379/tcp -> 0.0.0.0:32774"
        mapping: String,

        /// Print the full mapping as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a free host port
    FreePort,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "runprobe=warn",
        1 => "runprobe=info",
        2 => "runprobe=debug",
        _ => "runprobe=trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(args: Cli) -> Result<()> {
    let load_context = || Context::load(args.config.as_deref(), args.report_file.as_deref());

    match &args.command {
        Commands::BuildRun { scenario } => {
            cli::build_run::run(&load_context()?, scenario, false).await?
        }
        Commands::Run { scenario } => cli::build_run::run(&load_context()?, scenario, true).await?,
        Commands::Exec {
            image,
            expect_exit,
            expect_stdout,
            stdout_contains,
            stderr_contains,
            env,
            command,
        } => {
            let checks = ExecChecks {
                exit_code: *expect_exit,
                stdout: expect_stdout.clone(),
                stdout_contains: stdout_contains.clone(),
                stderr_contains: stderr_contains.clone(),
            };
            cli::exec::run(&load_context()?, image, command, env, &checks).await?
        }
        Commands::VersionCheck {
            image,
            base_version,
        } => cli::version::run(&load_context()?, image, base_version.as_deref()).await?,
        Commands::Port { mapping, json } => cli::ports::parse(mapping, *json)?,
        Commands::FreePort => cli::ports::free()?,
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "runprobe",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match dispatch(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display_error_with_suggestions(&e);
            ExitCode::FAILURE
        }
    }
}
