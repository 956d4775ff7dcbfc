use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};

use docfill::chat::{ChatBackend, OpenAiCompatClient};
use docfill::config::{init_default_config, resolve_config};
use docfill::dialogue::PromptSet;
use docfill::placeholder::scan;
use docfill::progress::ConsoleProgress;
use docfill::session::{BeginOutcome, Session};

#[derive(Parser, Debug)]
#[command(name = "docfill")]
#[command(about = "Fill the placeholders of a .docx template through a guided chat", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Template .docx
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Output .docx (default: completed_<name> next to the input)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Config file path (default: search for docfill.toml upwards, or DOCFILL_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat model (overrides [chat].model)
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible base URL (overrides [chat].base_url)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// List placeholders with their context and exit (no chat)
    #[arg(long)]
    scan_only: bool,

    /// Write the chat transcript as JSON on exit
    #[arg(long, value_name = "JSON")]
    transcript_json: Option<PathBuf>,

    /// Timestamped status lines on stderr
    #[arg(short, long)]
    verbose: bool,
}

const HELP: &str = "commands: :edit <placeholder> <value>  :progress  :preview  :restart  :save  :quit";

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = dotenvy::dotenv();
    let progress = ConsoleProgress::new(args.verbose);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let input = match args.input.clone() {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nTIPS:\n  - docfill template.docx starts a guided session.\n  - Default config search: docfill.toml (upwards), or set DOCFILL_CONFIG.\n"
            );
            return Ok(());
        }
    };
    let bytes = std::fs::read(&input).with_context(|| format!("read input: {}", input.display()))?;
    let name = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document.docx")
        .to_string();

    if args.scan_only {
        let result = scan(&bytes)?;
        if result.is_empty() {
            println!("No placeholders found.");
        }
        for (i, ph) in result.placeholders.iter().enumerate() {
            println!("{:>3}. {ph}\n     {}", i + 1, result.context_of(ph));
        }
        return Ok(());
    }

    let workdir = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let resolved = resolve_config(args.config.clone(), &workdir).context("load config")?;
    if resolved.found {
        progress.info(format!("config: {}", resolved.path.display()));
    }
    let mut settings = resolved.chat_settings();
    if let Some(m) = args.model.clone() {
        settings.model = m;
    }
    if let Some(u) = args.base_url.clone() {
        settings.base_url = u;
    }
    let prompts = PromptSet::load(&resolved).context("load prompts")?;
    let api_key = settings.api_key()?;
    let client = OpenAiCompatClient::new(api_key, &settings)?;
    progress.info(format!("chat: {} via {}", client.model(), client.endpoint()));

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| input.with_file_name(docfill::session::output_file_name(&name)));

    let mut session = Session::new(client, prompts, progress);
    let result = run_interactive(&mut session, &name, bytes, &output);

    if let Some(path) = args.transcript_json.as_ref() {
        let json = serde_json::to_string_pretty(session.transcript())
            .context("serialize transcript")?;
        std::fs::write(path, json).with_context(|| format!("write transcript: {}", path.display()))?;
    }
    result
}

fn run_interactive<B: ChatBackend>(
    session: &mut Session<B>,
    name: &str,
    bytes: Vec<u8>,
    output: &Path,
) -> anyhow::Result<()> {
    match session.begin_session(name, bytes) {
        Ok(BeginOutcome::NoPlaceholders) => {
            println!("No placeholders found in {name}. Nothing to fill.");
            return Ok(());
        }
        Ok(BeginOutcome::Started {
            placeholder_count,
            first_question,
        }) => {
            println!("Found {placeholder_count} placeholder(s). {HELP}\n");
            say(&first_question);
        }
        Err(e) if e.is_retryable() => {
            eprintln!("error: {e}\n(type :restart to try again)");
        }
        Err(e) => return Err(e.into()),
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().context("flush stdout")?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(cmd) = line.strip_prefix(':') {
            let (command, rest) = cmd.split_once(' ').unwrap_or((cmd, ""));
            match command {
                "quit" | "q" => break,
                "progress" => {
                    let (filled, total) = session.progress();
                    println!("{filled}/{total} filled ({:.0}%)", session.progress_ratio() * 100.0);
                    for (ph, v) in session.filled_entries() {
                        println!("  {ph} = {v}");
                    }
                }
                "preview" => println!("{}", session.preview().unwrap_or_default()),
                "edit" => match split_edit_args(rest.trim_start(), session.placeholders()) {
                    Some((ph, value)) => match session.edit_value(ph, value) {
                        Ok(()) => println!("Updated {ph}."),
                        Err(e) => eprintln!("error: {e}"),
                    },
                    None => eprintln!("usage: :edit <placeholder> <value>"),
                },
                "restart" => match session.restart() {
                    Ok(q) => say(&q),
                    Err(e) => eprintln!("error: {e}"),
                },
                "save" => save(session, output)?,
                _ => eprintln!("{HELP}"),
            }
            continue;
        }

        match session.submit_answer(line) {
            Ok(reply) => {
                say(&reply);
                if session.is_ready_to_download() {
                    save(session, output)?;
                    break;
                }
            }
            Err(e) if e.is_retryable() => {
                eprintln!("error: {e}\n(your answer was not saved; send it again to retry)");
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

/// Splits `<placeholder> <value>`. Known placeholders may contain spaces, so the longest
/// one that prefixes `rest` wins; otherwise the first word is taken as the placeholder.
fn split_edit_args<'a>(rest: &'a str, placeholders: &[String]) -> Option<(&'a str, &'a str)> {
    let known = placeholders
        .iter()
        .filter(|ph| {
            rest.strip_prefix(ph.as_str())
                .is_some_and(|tail| tail.is_empty() || tail.starts_with(char::is_whitespace))
        })
        .max_by_key(|ph| ph.len());
    let (ph, value) = match known {
        Some(ph) => rest.split_at(ph.len()),
        None => rest.split_once(char::is_whitespace)?,
    };
    let value = value.trim();
    (!ph.is_empty() && !value.is_empty()).then_some((ph, value))
}

fn save<B: ChatBackend>(session: &Session<B>, output: &Path) -> anyhow::Result<()> {
    let doc = session.materialize()?;
    std::fs::write(output, &doc.bytes)
        .with_context(|| format!("write output: {}", output.display()))?;
    if doc.is_final {
        println!("Saved completed document: {}", output.display());
    } else {
        let (filled, total) = session.progress();
        println!(
            "Saved partial document ({filled}/{total} filled, not final): {}",
            output.display()
        );
    }
    if !doc.split_tokens.is_empty() {
        eprintln!(
            "warning: these placeholders are split by formatting and were left as-is: {}",
            doc.split_tokens.join(", ")
        );
    }
    Ok(())
}

fn say(text: &str) {
    println!("{}\n", text.trim());
}

#[cfg(test)]
mod tests {
    use super::split_edit_args;

    fn slots(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn edit_args_accept_placeholders_with_spaces() {
        let known = slots(&["[Client]", "[Client Name]", "{Date}"]);
        assert_eq!(
            split_edit_args("[Client Name] Acme Corp", &known),
            Some(("[Client Name]", "Acme Corp"))
        );
        assert_eq!(split_edit_args("[Client] Bob", &known), Some(("[Client]", "Bob")));
        assert_eq!(split_edit_args("{Date}   1 May ", &known), Some(("{Date}", "1 May")));
    }

    #[test]
    fn edit_args_fall_back_to_first_word() {
        let known = slots(&["[Client Name]"]);
        assert_eq!(split_edit_args("{Other} value", &known), Some(("{Other}", "value")));
        assert_eq!(split_edit_args("[Client Name]", &known), None);
        assert_eq!(split_edit_args("", &known), None);
    }
}
