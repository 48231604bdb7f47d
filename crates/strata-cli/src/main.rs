use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use strata_contracts::events::EventWriter;
use strata_contracts::session::{PendingInput, Upload};
use strata_engine::{
    data_uri, proxy, ChainOrchestrator, GatewayConfig, HttpInferenceGateway, OrchestratorConfig,
    PollPolicy,
};

#[derive(Debug, Parser)]
#[command(
    name = "strata",
    version,
    about = "Layered inpainting edits against a remote inference service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload an image, then apply each mask in order on top of the last result.
    Edit(EditArgs),
    /// Send one image through the local submission endpoint.
    Submit(SubmitArgs),
    /// Look up a prediction by id through the local lookup endpoint.
    Lookup(LookupArgs),
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long = "mask")]
    masks: Vec<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long, default_value_t = 1.0)]
    poll_interval: f64,
    #[arg(long, default_value_t = 120.0)]
    poll_timeout: f64,
    /// Record data-URI outputs inline instead of moving them to local handles.
    #[arg(long)]
    keep_remote_outputs: bool,
}

#[derive(Debug, Parser)]
struct SubmitArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    mask: Option<PathBuf>,
    #[arg(long)]
    api_base: Option<String>,
}

#[derive(Debug, Parser)]
struct LookupArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    api_base: Option<String>,
}

const PRINT_VALUE_MAX_CHARS: usize = 96;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("strata error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Edit(args) => run_edit(args),
        Command::Submit(args) => run_submit(args),
        Command::Lookup(args) => run_lookup(args),
    }
}

fn run_edit(args: EditArgs) -> Result<i32> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = args
        .out
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("session-{}", unix_epoch_millis()));

    let gateway = Arc::new(HttpInferenceGateway::new(gateway_config(
        args.api_base.as_deref(),
    ))?);
    let orchestrator = ChainOrchestrator::with_config(
        gateway,
        OrchestratorConfig {
            poll: PollPolicy::new(args.poll_interval, args.poll_timeout),
            localize_outputs: !args.keep_remote_outputs,
        },
    )
    .with_events(EventWriter::new(&events_path, session_id));

    let mut steps = vec![PendingInput::upload(read_upload(&args.image)?)];
    for mask_path in &args.masks {
        steps.push(PendingInput::mask(read_as_data_uri(mask_path)?));
    }

    let downloads = HttpClient::new();
    let mut exit_code = 0;
    for (idx, step) in steps.into_iter().enumerate() {
        let label = if idx == 0 {
            "upload".to_string()
        } else {
            format!("mask {idx}")
        };
        match orchestrator.submit_edit(step) {
            Ok(view) => {
                let Some(output) = view.latest_output() else {
                    bail!("{label}: chain has no output after a successful edit");
                };
                let index = view.chain.len();
                let layer_path =
                    write_layer(&orchestrator, &downloads, &args.out, index, output)?;
                println!("Layer {index} ({label}): {}", layer_path.display());
            }
            Err(err) => {
                eprintln!("Edit failed ({label}): {}", err.session_message());
                exit_code = 1;
                break;
            }
        }
    }

    let released = orchestrator.reset();
    println!("Session reset, released {released} local handle(s)");
    println!("Events: {}", events_path.display());
    Ok(exit_code)
}

fn run_submit(args: SubmitArgs) -> Result<i32> {
    let gateway = HttpInferenceGateway::new(gateway_config(args.api_base.as_deref()))?;
    let mask = match &args.mask {
        Some(path) => Some(read_as_data_uri(path)?),
        None => None,
    };
    let body = json!({
        "image": read_as_data_uri(&args.image)?,
        "mask": mask,
    });
    let reply = proxy::submit(&gateway, body);
    print_reply(reply.status, &reply.body)?;
    Ok(if reply.is_success() { 0 } else { 1 })
}

fn run_lookup(args: LookupArgs) -> Result<i32> {
    let gateway = HttpInferenceGateway::new(gateway_config(args.api_base.as_deref()))?;
    let reply = proxy::lookup(&gateway, &args.id);
    print_reply(reply.status, &reply.body)?;
    Ok(if reply.is_success() { 0 } else { 1 })
}

fn gateway_config(api_base: Option<&str>) -> GatewayConfig {
    let from_env = GatewayConfig::from_env();
    match api_base.map(str::trim).filter(|value| !value.is_empty()) {
        Some(base) => GatewayConfig::new(base).with_timeout(from_env.timeout),
        None => from_env,
    }
}

fn read_upload(path: &Path) -> Result<Upload> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(str::to_string);
    Ok(match name {
        Some(name) => Upload::named(bytes, name),
        None => Upload::new(bytes),
    })
}

fn read_as_data_uri(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    Ok(data_uri::encode_sniffed(&bytes))
}

fn write_layer(
    orchestrator: &ChainOrchestrator,
    downloads: &HttpClient,
    out_dir: &Path,
    index: usize,
    output: &str,
) -> Result<PathBuf> {
    let (bytes, mime_type) = match orchestrator.resolve_output(output) {
        Some(blob) => (blob.bytes, blob.mime_type),
        None => download_image(downloads, output)?,
    };
    let layer_path = out_dir.join(format!(
        "layer-{index:02}.{}",
        data_uri::extension_for_mime(&mime_type)
    ));
    fs::write(&layer_path, bytes)
        .with_context(|| format!("failed to write {}", layer_path.display()))?;
    Ok(layer_path)
}

fn download_image(http: &HttpClient, url: &str) -> Result<(Vec<u8>, String)> {
    let response = http
        .get(url)
        .send()
        .with_context(|| format!("failed downloading layer ({url})"))?;
    if !response.status().is_success() {
        let code = response.status().as_u16();
        bail!("layer download failed ({code}): {url}");
    }
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();
    let bytes = response
        .bytes()
        .context("failed reading layer bytes")?
        .to_vec();
    let mime_type = if mime_type.is_empty() {
        data_uri::sniff_mime(&bytes).to_string()
    } else {
        mime_type
    };
    Ok((bytes, mime_type))
}

fn print_reply(status: u16, body: &Value) -> Result<()> {
    let printable = json!({
        "status": status,
        "body": shorten_strings(body),
    });
    println!("{}", serde_json::to_string_pretty(&printable)?);
    Ok(())
}

/// Inline image payloads are unreadable on a terminal; keep their head only.
fn shorten_strings(value: &Value) -> Value {
    match value {
        Value::String(text) if text.chars().count() > PRINT_VALUE_MAX_CHARS => {
            let head = text.chars().take(PRINT_VALUE_MAX_CHARS).collect::<String>();
            Value::String(format!("{head}… ({} chars)", text.chars().count()))
        }
        Value::Array(rows) => Value::Array(rows.iter().map(shorten_strings).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(key, value)| (key.clone(), shorten_strings(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn unix_epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}
