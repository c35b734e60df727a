//! Command line entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use eps_coordinator::{logging, Config, Coordinator};
use eps_spine_response::{RequestContext, TranslatedResponse};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "eps-coordinator", version, about = "Talk to Spine on behalf of the prescription service")]
struct Cli {
    /// Config file; defaults to ./coordinator.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send an HL7v3 payload and print the translated reply
    Send {
        /// Interaction id of the payload, e.g. PORX_IN020101SM31
        #[arg(short, long)]
        interaction: String,

        /// File holding the payload XML
        payload: PathBuf,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Resume an exchange from a polling URL
    Poll {
        polling_url: String,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Translate a saved Spine response body
    Dispatch {
        response: PathBuf,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Verify the signature of a parent prescription
    Verify { prescription: PathBuf },
    /// Check that Spine is reachable
    Status,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Caller header as name=value, e.g. nhsd-session-urid=555086718101
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

impl RequestArgs {
    fn context(&self) -> RequestContext {
        RequestContext::from_headers(self.headers.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _logging_guard = logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.logging.deployment_environment,
        "Starting EPS coordinator"
    );

    let coordinator = Coordinator::from_config(&config).context("Invalid configuration")?;

    match cli.command {
        Command::Send {
            interaction,
            payload,
            request,
        } => {
            let payload = read_file(&payload).await?;
            let response = coordinator
                .send_and_translate(&interaction, &payload, request.context())
                .await;
            print_response(&response)
        }
        Command::Poll { polling_url, request } => {
            let response = coordinator.poll(&polling_url, request.context()).await;
            print_response(&response)
        }
        Command::Dispatch { response, request } => {
            let body = read_file(&response).await?;
            let response = coordinator.dispatcher(request.context()).translate(body.as_bytes()).await;
            print_response(&response)
        }
        Command::Verify { prescription } => {
            let document = read_file(&prescription).await?;
            match coordinator.verify(document.as_bytes()) {
                Ok(verified) => {
                    let report = json!({
                        "valid": true,
                        "digestValue": verified.digest_value,
                        "digestAlgorithm": verified.digest_algorithm.uri(),
                        "signatureAlgorithm": verified.signature_algorithm.uri(),
                        "signer": verified.signer_subject,
                        "signingTime": verified.signing_time.to_rfc3339(),
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %prescription.display(), "Signature verification failed");
                    println!("{e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Status => {
            let health = coordinator.status().await.context("Health check failed")?;
            println!("{}", if health.pass { "pass" } else { "fail" });
            tracing::info!(status_code = health.status_code, pass = health.pass, "Spine health check");
            Ok(if health.pass { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

async fn read_file(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn print_response(response: &TranslatedResponse) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
