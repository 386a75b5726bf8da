use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Client for a running ai-relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000", env = "RELAY_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay liveness
    Health,
    /// Send a chat completion request read from a JSON file
    Chat { request: PathBuf },
    /// Transcribe an audio file
    Transcribe { audio: PathBuf },
    /// Analyze note images, with optional text
    Notes {
        #[arg(short, long)]
        text: Option<String>,
        images: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            let status = res.status();
            println!("{} {}", status, res.text().await?);
            if let Some(failure) = relay_failure(status) {
                return Err(failure.into());
            }
        }
        Commands::Chat { request } => {
            let body = tokio::fs::read(&request).await?;
            let res = client
                .post(format!("{base}/api/openai/chat"))
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Transcribe { audio } => {
            let form = Form::new().part("file", file_part(&audio).await?);
            let res = client
                .post(format!("{base}/api/openai/transcribe"))
                .multipart(form)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Notes { text, images } => {
            let mut form = Form::new();
            if let Some(text) = text {
                form = form.text("text", text);
            }
            for image in &images {
                form = form.part("images", file_part(image).await?);
            }
            let res = client
                .post(format!("{base}/api/openai/process-notes"))
                .multipart(form)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn file_part(path: &Path) -> Result<Part, Box<dyn std::error::Error>> {
    let data = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime = mime_for(path);
    Ok(Part::bytes(data).file_name(file_name).mime_str(mime)?)
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp3" | "mpeg" => "audio/mpeg",
        "mp4" => "audio/mp4",
        "m4a" => "audio/m4a",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        _ => "application/octet-stream",
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(failure) = relay_failure(status) {
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Err(failure.into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Error text for a non-2xx relay status, so the process exits non-zero.
fn relay_failure(status: reqwest::StatusCode) -> Option<String> {
    (!status.is_success()).then(|| format!("relay returned status {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_error_statuses_are_failures() {
        assert_eq!(relay_failure(StatusCode::OK), None);
        assert_eq!(
            relay_failure(StatusCode::TOO_MANY_REQUESTS).as_deref(),
            Some("relay returned status 429 Too Many Requests")
        );
        assert!(relay_failure(StatusCode::INTERNAL_SERVER_ERROR).is_some());
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_for(Path::new("clip.M4A")), "audio/m4a");
        assert_eq!(mime_for(Path::new("page.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("notes")), "application/octet-stream");
    }
}
