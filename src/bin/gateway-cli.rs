use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the pipeline gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the gateway and every stage
    Health,
    /// Show the configured stages
    Pipeline,
    /// Show circuit breaker state per stage
    Circuits,
    /// Send text through the pipeline
    Process {
        text: String,
        /// Print progress events as they arrive
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health/all", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Pipeline => {
            let res = client.get(format!("{}/api/pipeline", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Circuits => {
            let res = client.get(format!("{}/api/circuits", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Process { text, stream: false } => {
            let res = client
                .post(format!("{}/process/json", base))
                .json(&json!({ "text": text }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Process { text, stream: true } => {
            let mut res = client
                .post(format!("{}/process/stream", base))
                .json(&json!({ "text": text }))
                .send()
                .await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }

            let mut buffer = String::new();
            while let Some(chunk) = res.chunk().await? {
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(end) = buffer.find("\n\n") {
                    let frame: String = buffer.drain(..end + 2).collect();
                    print_frame(&frame);
                }
            }
        }
    }

    Ok(())
}

fn print_frame(frame: &str) {
    let mut event = "message";
    let mut data = "";
    for line in frame.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            event = name;
        } else if let Some(body) = line.strip_prefix("data: ") {
            data = body;
        }
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => println!("[{}] {}", event, value),
        Err(_) => println!("[{}] {}", event, data),
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
