use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use ems_gateway::observability::CORRELATION_ID_HEADER;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Command-line client for the ems-gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Bearer token sent with every request
    #[arg(short, long, env = "EMS_GATEWAY_TOKEN")]
    token: Option<String>,

    /// Correlation id to send instead of letting the gateway assign one
    #[arg(long)]
    correlation_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the gateway health snapshot
    Health,
    /// Fetch an employee together with its department
    Employee { id: String },
    /// Send a GET for an arbitrary path through the gateway
    Request { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
    }
    if let Some(id) = &cli.correlation_id {
        headers.insert(CORRELATION_ID_HEADER, HeaderValue::from_str(id)?);
    }

    let path = match &cli.command {
        Commands::Health => "/actuator/health".to_string(),
        Commands::Employee { id } => format!("/api/employees/{id}"),
        Commands::Request { path } if path.starts_with('/') => path.clone(),
        Commands::Request { path } => format!("/{path}"),
    };

    let res = client
        .get(format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let correlation_id = res
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    eprintln!("{status} ({CORRELATION_ID_HEADER}: {correlation_id})");

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
