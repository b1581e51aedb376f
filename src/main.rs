//! tailgen - Tailwind/HTML generator with a live preview
//!
//! USAGE:
//!   tailgen                          # interactive loop
//!   tailgen -p "a red button"        # one exchange, then exit
//!   tailgen doctor                   # check config, key, network
//!   tailgen config set key <value>   # non-interactive config

use anyhow::Result;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tailgen::client::{CompletionBackend, OpenAiClient};
use tailgen::config::{self, Config};
use tailgen::controller::{FormController, Settings, Submit};
use tailgen::credential::CREDENTIAL_KEY;
use tailgen::prompt::SystemPrompt;
use tailgen::renderer::FilePreview;
use tailgen::store::{FileStore, KeyValueStore};
use tailgen::ui::{TerminalForm, TerminalPrompt};

// ═══════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Overrides {
    model: Option<String>,
    preview: Option<PathBuf>,
}

#[derive(Debug)]
enum Command {
    Interactive(Overrides),
    Once { prompt: String, overrides: Overrides },
    Doctor,
    ConfigSet { key: String, value: String },
    Help,
}

fn parse_args() -> Command {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_args_from(&args)
}

fn parse_args_from(args: &[String]) -> Command {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Command::Help;
    }

    match args.first().map(|s| s.as_str()) {
        Some("doctor") => return Command::Doctor,
        Some("config") if args.get(1).map(|s| s.as_str()) == Some("set") => {
            return Command::ConfigSet {
                key: args.get(2).cloned().unwrap_or_default(),
                value: args.get(3).cloned().unwrap_or_default(),
            };
        }
        _ => {}
    }

    let mut overrides = Overrides::default();
    let mut prompt = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--model" | "-m" => {
                i += 1;
                overrides.model = args.get(i).cloned();
            }
            "--output" | "-o" => {
                i += 1;
                overrides.preview = args.get(i).map(PathBuf::from);
            }
            "--prompt" | "-p" => {
                i += 1;
                prompt = args.get(i).cloned();
            }
            _ => {}
        }
        i += 1;
    }

    match prompt {
        Some(prompt) => Command::Once { prompt, overrides },
        None => Command::Interactive(overrides),
    }
}

fn print_help() {
    println!(r#"tailgen - Tailwind/HTML generator with a live preview

USAGE:
    tailgen [-m <model>] [-o <path>]    # interactive loop
    tailgen -p "<prompt>"               # one exchange, then exit
    tailgen doctor                      # check config, key, network
    tailgen config set <key> <value>    # set config value

FLAGS:
    -p, --prompt <text>     One-shot mode
    -m, --model <id>        Generation model (default gpt-4o)
    -o, --output <path>     Preview file
    -h, --help              Show this help

CONFIG KEYS:
    key, model, validation-model, base-url, preview, render-interval, max-tokens

FILES:
    ~/.config/tailgen/config.json         Model, preview path, sampling
    ~/.config/tailgen/credentials.json    Stored API key
    ~/.local/state/tailgen/preview.html   Live preview (open it in a browser)

ENVIRONMENT:
    OPENAI_BASE_URL     Override the API base URL
    RUST_LOG            Log filter (default: warn)

INTERACTIVE:
    /reset    Start a new conversation
    /quit     Exit (also Ctrl-D)
"#);
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ═══════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    match parse_args() {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Doctor => run_doctor().await,
        Command::ConfigSet { key, value } => run_config_set(&key, &value),
        Command::Once { prompt, overrides } => run_once(&prompt, overrides).await,
        Command::Interactive(overrides) => run_interactive(overrides).await,
    }
}

// ═══════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════

async fn run_doctor() -> Result<()> {
    println!("tailgen doctor\n");

    let cfg = Config::load()?;
    let config_path = config::config_path()?;
    println!("[{}] Config: {}",
        if config_path.exists() { "✓" } else { "-" },
        config_path.display()
    );
    println!("    model: {}  validation: {}", cfg.model, cfg.validation_model);
    println!("    preview: {}", cfg.resolved_preview_path()?.display());

    let store = FileStore::open_default()?;
    let key = store.get(CREDENTIAL_KEY)?.filter(|k| !k.is_empty());
    println!("[{}] API key: {}",
        if key.is_some() { "✓" } else { "✗" },
        if key.is_some() { "stored" } else { "missing" }
    );

    let Some(key) = key else {
        return Ok(());
    };

    let base_url = cfg.effective_base_url();
    print!("[?] API: checking {}...", base_url);
    let client = OpenAiClient::new(&base_url)?;
    match client.validate(&key, &cfg.validation_model).await {
        Ok(()) => println!("\r[✓] API: key accepted by {}", base_url),
        Err(e) => println!("\r[✗] API: {}", e),
    }

    Ok(())
}

fn run_config_set(key: &str, value: &str) -> Result<()> {
    if key == "key" || key == "api_key" {
        if value.trim().is_empty() {
            anyhow::bail!("API key must not be empty");
        }
        let mut store = FileStore::open_default()?;
        store.set(CREDENTIAL_KEY, value.trim())?;
        println!("API key saved to {}", store.path().display());
        return Ok(());
    }

    let mut cfg = Config::load()?;
    cfg.set(key, value)?;
    cfg.save()?;
    println!("{} set to: {}", key, value);
    Ok(())
}

type TerminalController = FormController<OpenAiClient, FileStore, TerminalPrompt, TerminalForm>;

fn build(overrides: Overrides) -> Result<(TerminalController, FilePreview)> {
    let mut cfg = Config::load()?;
    if let Some(model) = overrides.model {
        cfg.model = model;
    }
    if let Some(preview) = overrides.preview {
        cfg.preview_path = Some(preview);
    }

    let preview = FilePreview::new(cfg.resolved_preview_path()?)?;
    let system_prompt = SystemPrompt::new()
        .with_placeholder_image(&cfg.placeholder_image)
        .build();

    let controller = FormController::new(
        OpenAiClient::new(&cfg.effective_base_url())?,
        FileStore::open_default()?,
        TerminalPrompt,
        TerminalForm::new(preview.path().to_path_buf()),
        Settings::from(&cfg),
        system_prompt,
    );

    Ok((controller, preview))
}

async fn run_once(prompt: &str, overrides: Overrides) -> Result<()> {
    let (mut controller, mut preview) = build(overrides)?;
    match controller.submit_and_wait(prompt, &mut preview).await? {
        Some(markup) => println!("{}", markup),
        None => anyhow::bail!("Nothing generated"),
    }
    Ok(())
}

async fn run_interactive(overrides: Overrides) -> Result<()> {
    let (mut controller, mut preview) = build(overrides)?;
    println!("Describe a component; the preview updates while it streams.");
    println!("Preview file: {}\n", preview.path().display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        controller.form().prompt()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                controller.reset_conversation();
                continue;
            }
            _ => {}
        }

        let mut exchange = match controller.submit(&line).await {
            Ok(Submit::Started(exchange)) => exchange,
            Ok(Submit::Ignored(_)) | Ok(Submit::Aborted) => continue,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                continue;
            }
        };

        match exchange.run(&mut preview).await {
            Ok(markup) => controller.complete(markup),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                controller.fail(&e);
            }
        }
    }

    Ok(())
}
