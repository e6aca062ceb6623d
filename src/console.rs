//! Line-oriented front end over the control surface.
//!
//! A plain line submits the current form (question in `qa` mode, topic in
//! `note` mode). Slash commands edit the form, the admin credential, and
//! trigger the operational actions. Health polling runs in the background
//! for the whole session and stops when the loop exits.

use std::error::Error;
use std::io::Write as _;
use std::sync::Arc;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use rag_console::config::admin_key::FileKeyStore;
use rag_console::config::console_config::ConsoleConfig;
use rag_console::health_monitor::Reachability;
use rag_console::notifications::Severity;
use rag_console::services::query_service::NoteTemplate;
use rag_console::{ConsoleController, QueryMode, RagConsoleError, RunState};

const HELP: &str = "\
commands:
  /mode qa|note        switch between question answering and note cards
  /template NAME       note template: disease, drug, procedure, general
  /extra TEXT          optional retriever hint ('/extra' alone clears it)
  /stream              toggle streaming output
  /debug               toggle retrieved-context debug (unary runs only)
  /key VALUE           save the admin key ('/key' alone clears it)
  /health              probe both services now
  /models              list models known to Ollama
  /model NAME          switch the active generation model
  /restart api|ollama  restart a backing process
  /status              show form, admin and health state
  /quit                exit
anything else is submitted as the question or topic.";

pub async fn run() -> Result<(), Box<dyn Error>> {
    let config = ConsoleConfig::from_env()?;
    let key_store = Arc::new(FileKeyStore::new(config.admin_key_file.clone()));
    let controller = Arc::new(ConsoleController::new(&config, key_store)?);
    let _poll = controller.start_polling();

    println!("{}", "MedNotes RAG console".bold());
    println!("connected to {}; type /help for commands", config.base_url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt(&controller);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(&controller, command).await {
                break;
            }
        } else {
            submit(&controller, &line).await;
        }
        print_notifications(&controller);
    }

    Ok(())
}

/// Executes one slash command. Returns `false` to exit the loop.
async fn handle_command(controller: &Arc<ConsoleController>, command: &str) -> bool {
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "help" => println!("{HELP}"),
        "mode" => match arg {
            "qa" => controller.update_form(|f| f.mode = QueryMode::Qa),
            "note" => controller.update_form(|f| f.mode = QueryMode::Note),
            _ => eprintln!("{}", "usage: /mode qa|note".yellow()),
        },
        "template" => match NoteTemplate::parse(arg) {
            Some(template) => controller.update_form(|f| f.template = template),
            None => eprintln!(
                "{}",
                "usage: /template disease|drug|procedure|general".yellow()
            ),
        },
        "extra" => controller.update_form(|f| f.extra = arg.to_string()),
        "stream" => controller.update_form(|f| f.stream = !f.stream),
        "debug" => controller.update_form(|f| f.debug = !f.debug),
        "key" => match controller.set_admin_key(arg) {
            Ok(()) => println!("admin key {}", if arg.is_empty() { "cleared" } else { "saved" }),
            Err(err) => eprintln!("{}", err.to_string().red()),
        },
        "health" => {
            controller.monitor().check_api().await;
            controller.monitor().check_ollama().await;
            print_health(controller);
        }
        "models" => {
            let status = controller.monitor().ollama_status();
            if status.models.is_empty() {
                println!("no models known; try /health first");
            } else {
                for model in &status.models {
                    let marker = if status.current_model.as_deref() == Some(model) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {model}");
                }
            }
        }
        "model" => {
            if arg.is_empty() {
                eprintln!("{}", "usage: /model NAME".yellow());
            } else {
                let action = controller.admin().set_model(arg);
                print_pending(controller);
                action.await;
                print_admin_error(controller);
            }
        }
        "restart" => match arg {
            "api" => {
                let action = controller.admin().restart_api();
                print_pending(controller);
                action.await;
                print_admin_error(controller);
            }
            "ollama" => {
                let action = controller.admin().restart_ollama();
                print_pending(controller);
                action.await;
                print_admin_error(controller);
            }
            _ => eprintln!("{}", "usage: /restart api|ollama".yellow()),
        },
        "status" => {
            print_form(controller);
            print_health(controller);
            print_admin_error(controller);
        }
        "quit" | "exit" => return false,
        _ => eprintln!("unknown command; /help lists them"),
    }
    true
}

async fn submit(controller: &Arc<ConsoleController>, text: &str) {
    controller.update_form(|f| f.text = text.to_string());

    let streaming = controller.form().stream;
    let result = controller
        .submit(|chunk| {
            if streaming {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            }
        })
        .await;
    if streaming {
        println!();
    }

    match result {
        Err(RagConsoleError::EmptyInput) => {
            eprintln!("{}", "Please enter a question or topic.".yellow());
            return;
        }
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            return;
        }
        Ok(()) => {}
    }

    match controller.run_state() {
        RunState::Done => {
            if !streaming {
                println!("{}", controller.answer());
            }
            let contexts = controller.contexts();
            if !contexts.is_empty() {
                println!("{}", "retrieved context:".dimmed());
                for record in &contexts {
                    println!("  {}", record.summary().dimmed());
                }
            }
        }
        RunState::Error(msg) => eprintln!("{}", msg.red()),
        _ => {}
    }
}

fn print_prompt(controller: &Arc<ConsoleController>) {
    let form = controller.form();
    let mode = match form.mode {
        QueryMode::Qa => "qa".to_string(),
        QueryMode::Note => format!("note/{}", form.template.as_str()),
    };
    let mut flags = String::new();
    if form.stream {
        flags.push_str(" stream");
    }
    if form.debug {
        flags.push_str(" debug");
    }
    print!("{} ", format!("[{mode}{flags}]>").cyan());
    let _ = std::io::stdout().flush();
}

fn print_form(controller: &Arc<ConsoleController>) {
    let form = controller.form();
    println!(
        "mode={:?} template={} stream={} debug={} extra={:?} key={}",
        form.mode,
        form.template.as_str(),
        form.stream,
        form.debug,
        form.extra,
        if controller.admin_key().is_some() { "set" } else { "unset" },
    );
}

fn print_health(controller: &Arc<ConsoleController>) {
    let api = controller.monitor().api_status();
    let ollama = controller.monitor().ollama_status();

    println!("api:    {}", reachability_label(api.reachability, api.last_error.as_deref()));
    let model = ollama.current_model.as_deref().unwrap_or("?");
    println!(
        "ollama: {} (model {model}, {} available)",
        reachability_label(ollama.reachability, ollama.last_error.as_deref()),
        ollama.models.len(),
    );
}

fn reachability_label(reachability: Reachability, error: Option<&str>) -> String {
    match reachability {
        Reachability::Up => "up".green().to_string(),
        Reachability::Down => {
            format!("{} ({})", "down".red(), error.unwrap_or("unknown error"))
        }
        Reachability::Unknown => "unknown".dimmed().to_string(),
    }
}

fn print_pending(controller: &Arc<ConsoleController>) {
    if let Some(pending) = controller.admin().state().pending {
        println!("{}", format!("{pending}…").dimmed());
    }
}

fn print_admin_error(controller: &Arc<ConsoleController>) {
    if let Some(err) = controller.admin().state().last_error {
        eprintln!("{}", err.red());
    }
}

fn print_notifications(controller: &Arc<ConsoleController>) {
    for n in controller.notifications().snapshot() {
        let line = match n.severity {
            Severity::Success => n.text.green(),
            Severity::Error => n.text.red(),
            Severity::Info => n.text.normal(),
        };
        println!("{} {}", "•".dimmed(), line);
    }
}
