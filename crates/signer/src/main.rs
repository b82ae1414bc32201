use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use remote_signer::{
    AppState, ArtifactFormat, DigestDescriptor, Invocation, LocalEngine, ProcessEngine, ServerConfig,
    SigningEngine, engine, run,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
enum EngineKind {
    /// Re-run this executable for every request.
    Process,
    /// Sign on the server's own blocking thread pool. The deadline is
    /// advisory: an overrunning job is reported as timed out but keeps
    /// running until it finishes.
    Local,
}

#[derive(Parser)]
#[command(about = "Sign artifacts for remote clients without handing out keys")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve signing requests over HTTP.
    Serve(ServeArgs),
    /// Engine operation for CAB files.
    SignCab(EngineArgs),
    /// Engine operation for JAR files.
    SignJar(EngineArgs),
    /// Engine operation for PE executables.
    SignPe(EngineArgs),
    /// Engine operation for any other file.
    SignBlob(EngineArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[clap(long, env = "SIGNER_HOST", default_value = "127.0.0.1")]
    host: String,
    #[clap(long, env = "SIGNER_PORT", default_value = "3000")]
    port: u16,
    #[clap(long, env = "SIGNER_CONFIG")]
    config: PathBuf,
    /// Where signing runs. Only `process` enforces key timeouts by killing
    /// the engine; with `local` the deadline is advisory.
    #[clap(long, env = "SIGNER_ENGINE", value_enum, default_value = "process")]
    engine: EngineKind,
}

#[derive(Args)]
struct EngineArgs {
    #[clap(long, env = "SIGNER_CONFIG")]
    config: PathBuf,
    #[clap(long)]
    key: String,
    /// Artifact to sign, or `-` for stdin.
    #[clap(long)]
    file: String,
    /// Where to write the result; stdout when omitted or `-`.
    #[clap(long)]
    output: Option<String>,
    /// Write a binary patch instead of the signed artifact.
    #[clap(long)]
    patch: bool,
    /// Digest the caller computed, as `<algorithm>:<hex>`.
    #[clap(long)]
    digest: Option<DigestDescriptor>,
    /// Manifest alias (JAR only).
    #[clap(long)]
    key_alias: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve(args) => {
            init_tracing();
            serve(args).await
        }
        Command::SignCab(args) => sign(ArtifactFormat::Cab, args).await,
        Command::SignJar(args) => sign(ArtifactFormat::Jar, args).await,
        Command::SignPe(args) => sign(ArtifactFormat::Pe, args).await,
        Command::SignBlob(args) => sign(ArtifactFormat::Blob, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Engine stderr becomes the diagnostic the server reports, so
            // keep it to a single line.
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = Arc::new(
        ServerConfig::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?,
    );
    let engine: Arc<dyn SigningEngine> = match args.engine {
        EngineKind::Process => {
            Arc::new(ProcessEngine::current_exe().context("locating signer executable")?)
        }
        EngineKind::Local => Arc::new(LocalEngine::new(Arc::clone(&config))),
    };
    run(args.host, args.port, AppState::new(config, engine)).await
}

async fn sign(format: ArtifactFormat, args: EngineArgs) -> Result<()> {
    let config = ServerConfig::load(&args.config)?;

    let input = if args.file == "-" {
        let mut input = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut input)
            .await
            .context("reading artifact from stdin")?;
        input
    } else {
        tokio::fs::read(&args.file)
            .await
            .with_context(|| format!("reading {}", args.file))?
    };

    let invocation = Invocation {
        format,
        config_path: args.config,
        key: args.key,
        patch: args.patch,
        digest: args.digest,
        key_alias: args.key_alias,
    };
    let output = tokio::task::spawn_blocking(move || engine::execute(&config, &invocation, &input))
        .await
        .context("signing task panicked")??;

    match args.output.as_deref() {
        None | Some("-") => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&output).await.context("writing to stdout")?;
            stdout.flush().await.context("flushing stdout")?;
        }
        Some(path) => {
            let destination = PathBuf::from(path);
            tokio::task::spawn_blocking(move || {
                binpatch::write_atomically(&destination, |file| Write::write_all(file, &output))
            })
            .await
            .context("output task panicked")?
            .with_context(|| format!("writing {path}"))?;
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
