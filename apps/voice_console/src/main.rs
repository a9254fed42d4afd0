use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use shared::domain::UploadedFile;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_core::{
    CommercialTerm, Dispatcher, FunctionRegistry, GeminiClient, GeminiConfig, Severity, UiBridge,
    View, VoiceAssistant,
};

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides GEMINI_API_KEY.
    #[arg(long)]
    api_key: Option<String>,
    /// Overrides GEMINI_ENDPOINT.
    #[arg(long)]
    endpoint: Option<String>,
    /// Overrides GEMINI_MODEL.
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    max_output_tokens: Option<u32>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Type utterances and let the model drive the voice functions (default).
    Chat,
    /// Run one voice function directly, without the model.
    Call {
        name: String,
        /// JSON object of arguments.
        #[arg(default_value = "{}")]
        args: String,
    },
    /// Print the function declarations sent to the model.
    Functions,
}

/// Stands in for the presentation layer: every slot becomes a log line, and
/// notifications are echoed to the terminal.
struct ConsoleBridge;

impl UiBridge for ConsoleBridge {
    fn set_show_upload_form(&self, visible: bool) {
        info!(visible, "ui: upload form");
    }

    fn set_current_step(&self, step: u8) {
        info!(step, "ui: wizard step");
    }

    fn navigate_to(&self, view: View) {
        info!(view = view.as_str(), "ui: navigate");
    }

    fn update_files(&self, files: &[UploadedFile]) {
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        info!(?names, "ui: files");
    }

    fn show_notification(&self, message: &str, severity: Severity) {
        println!("[{severity:?}] {message}");
    }

    fn set_show_system_info(&self, visible: bool) {
        info!(visible, "ui: system info");
    }

    fn set_detail_panel(&self, feature_id: Option<&str>) {
        info!(?feature_id, "ui: detail panel");
    }

    fn set_commercial_term(&self, term: CommercialTerm, value: &str) {
        info!(term = term.label(), value, "ui: commercial term");
    }
}

fn gemini_config(cli: &Cli) -> GeminiConfig {
    let mut config = GeminiConfig::from_env();
    if let Some(api_key) = &cli.api_key {
        config.api_key = Some(api_key.clone());
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if cli.temperature.is_some() {
        config.temperature = cli.temperature;
    }
    if cli.max_output_tokens.is_some() {
        config.max_output_tokens = cli.max_output_tokens;
    }
    config
}

fn dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new(FunctionRegistry::with_builtin_functions());
    dispatcher.initialize(Arc::new(ConsoleBridge));
    dispatcher
}

async fn chat(config: GeminiConfig) -> Result<()> {
    info!(model = %config.model, "starting voice console");
    let client = GeminiClient::new(config)?;
    let options = client.default_options();
    let mut assistant = VoiceAssistant::new(client, dispatcher()).with_options(options);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "reset" => {
                assistant.dispatcher_mut().registry_mut().reset_state();
                assistant.reinitialize();
                println!("conversation reset");
                continue;
            }
            _ => {}
        }

        match assistant.handle_utterance(line).await {
            Ok(reply) => {
                if !reply.spoken.is_empty() {
                    println!("robbie: {}", reply.spoken);
                }
                assistant.speech_finished();
            }
            Err(err) => println!("voice assistant unavailable: {err} (type 'reset' to retry)"),
        }
    }
    Ok(())
}

async fn call(name: &str, raw_args: &str) -> Result<()> {
    let args: Map<String, Value> = match serde_json::from_str(raw_args)
        .with_context(|| format!("arguments are not valid JSON: {raw_args}"))?
    {
        Value::Object(map) => map,
        other => bail!("arguments must be a JSON object, got {other}"),
    };
    let mut dispatcher = dispatcher();
    let result = dispatcher.execute(name, args).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        None | Some(Command::Chat) => chat(gemini_config(&cli)).await?,
        Some(Command::Call { name, args }) => call(name, args).await?,
        Some(Command::Functions) => {
            let declarations = FunctionRegistry::with_builtin_functions().declarations();
            println!("{}", serde_json::to_string_pretty(&declarations)?);
        }
    }
    Ok(())
}
