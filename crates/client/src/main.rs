use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use remote_signer_client::{ClientError, RemoteSigner, SignRequest, Signed};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Sign local artifacts with keys held by a remote signing server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign a file and write the result back.
    Sign(SignArgs),
}

#[derive(Args)]
struct SignArgs {
    /// Base URL of the signing server.
    #[clap(long, env = "SIGNER_URL", default_value = "http://127.0.0.1:3000")]
    url: String,
    #[clap(short, long)]
    file: PathBuf,
    #[clap(short, long)]
    key: String,
    /// Output path, `-` for stdout. Signs in place when omitted.
    #[clap(short, long)]
    output: Option<String>,
    /// Manifest alias, only sent for `.jar` files.
    #[clap(long, default_value = "SIGNER")]
    key_alias: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Sign(args) => sign(args).await,
    };

    match result {
        Ok(signed) => {
            eprintln!("Signed {}", signed.source.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn sign(args: SignArgs) -> Result<Signed, ClientError> {
    let request =
        SignRequest::new(args.file, args.key, args.output.as_deref())?.with_key_alias(args.key_alias);
    let signer = RemoteSigner::new(&args.url)?;
    signer.sign(&request).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
