use endless_markup::SanitizedFragment;
use endless_session::config::credential_from_env;
use endless_session::logging::{self, LogFormat};
use endless_session::{
    Activation, MemoryNavigationStack, Phase, ProviderRegistry, ProviderSettings, Renderer,
    Session, SessionConfig, SessionError,
};
use std::env;
use std::process;
use tokio::io::{AsyncBufReadExt, BufReader};

struct Args {
    config: Option<String>,
    provider: Option<String>,
    theme: Option<String>,
    kind: Option<String>,
    json_logs: bool,
}

fn usage() -> ! {
    eprintln!("Usage: endless-play [--config FILE] [--provider KEY] [--theme TEXT] [--kind TEXT] [--json-logs]");
    eprintln!();
    eprintln!("Starts an endless session in the terminal. Once a scene is shown:");
    eprintln!("  <n>        activate interactive element n");
    eprintln!("  back       previous entry");
    eprintln!("  forward    next entry");
    eprintln!("  goto <i>   jump to history entry i");
    eprintln!("  regen      generate a fresh entry in the same theme");
    eprintln!("  retry      re-issue the request that failed");
    eprintln!("  history    list history entries");
    eprintln!("  quit       leave");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  GEMINI_API_KEY=... endless-play --theme \"Clockwork jungle\"");
    eprintln!("  endless-play --provider scripted");
    process::exit(1);
}

fn parse_args() -> Args {
    let mut args = Args {
        config: None,
        provider: None,
        theme: None,
        kind: None,
        json_logs: false,
    };
    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(it.next().unwrap_or_else(|| usage())),
            "--provider" => args.provider = Some(it.next().unwrap_or_else(|| usage())),
            "--theme" => args.theme = Some(it.next().unwrap_or_else(|| usage())),
            "--kind" => args.kind = Some(it.next().unwrap_or_else(|| usage())),
            "--json-logs" => args.json_logs = true,
            _ => usage(),
        }
    }
    args
}

/// Prints scenes as plain text with numbered choices.
struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn mount(&mut self, fragment: &SanitizedFragment, index: usize) {
        println!();
        println!("── entry {} ──", index);
        println!("{}", fragment.fragment().visible_text());
        for element in fragment.interactive_elements() {
            println!("  [{}] {} ({})", element.index, element.label, element.kind.as_str());
        }
    }

    fn show_phase(&mut self, phase: &Phase) {
        eprintln!("  … {}", phase);
    }

    fn show_error(&mut self, error: &SessionError, retryable: bool) {
        eprintln!("✗ {}", error);
        if retryable {
            eprintln!("  type 'retry' to try again");
        }
    }

    fn show_failure_panel(&mut self, message: &str) {
        eprintln!("✗ {}", message);
    }

    fn set_controls_enabled(&mut self, _enabled: bool) {}

    fn notify(&mut self, message: &str) {
        println!("» {}", message);
    }
}

#[tokio::main]
async fn main() {
    let args = parse_args();
    logging::init(if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Plain
    });

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {}", e);
            process::exit(1);
        }
    };

    let settings = ProviderSettings {
        api_key: credential_from_env(),
    };
    let backend = match ProviderRegistry::with_builtin().build(&config.provider, &settings) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("✗ {}", e);
            process::exit(1);
        }
    };

    let mut session = Session::new(
        config,
        backend,
        Box::new(MemoryNavigationStack::new()),
        Box::new(TerminalRenderer),
    );

    if let Err(e) = session.start(args.theme, args.kind).await {
        if !e.is_retryable() {
            process::exit(1);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("✗ failed to read input: {}", e);
                process::exit(1);
            }
        };
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        match command {
            "" => {}
            "quit" | "exit" => break,
            "back" => {
                if !session.traverse(-1) {
                    eprintln!("  nothing before this entry");
                }
            }
            "forward" => {
                if !session.traverse(1) {
                    eprintln!("  nothing after this entry");
                }
            }
            "goto" => match words.next().and_then(|w| w.parse::<usize>().ok()) {
                Some(index) if session.navigate(index) => {}
                _ => eprintln!("  usage: goto <index of an existing entry>"),
            },
            "regen" => {
                if let Err(SessionError::NotStarted) = session.regenerate().await {
                    eprintln!("  nothing to regenerate yet");
                }
            }
            "retry" => {
                if let Err(SessionError::NothingToRetry) = session.retry().await {
                    eprintln!("  nothing to retry");
                }
            }
            "history" => {
                let cursor = session.history().cursor();
                for (i, entry) in session.history().entries().iter().enumerate() {
                    let marker = if Some(i) == cursor { "*" } else { " " };
                    eprintln!("{} {:>3}  {}", marker, i, entry.context_label);
                }
            }
            other => match other.parse::<usize>() {
                Ok(index) => match session.activate(index).await {
                    Ok(Activation::Notified(_)) | Ok(Activation::Generated(_)) => {}
                    Err(SessionError::NoSuchElement(i)) => eprintln!("  no element [{}]", i),
                    Err(_) => {}
                },
                Err(_) => eprintln!("  unknown command '{}'", other),
            },
        }
    }
}

fn load_config(args: &Args) -> Result<SessionConfig, SessionError> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    }
    .apply_env()?;
    if let Some(provider) = &args.provider {
        config.provider = provider.clone();
    }
    config.validate()?;
    Ok(config)
}
