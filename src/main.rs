use std::sync::Arc;

use clap::Parser;
use storyloom::cascade::book::BookCascade;
use storyloom::cascade::text::TextCascade;
use storyloom::cli::{Cli, Command, read_text};
use storyloom::config::CascadeConfig;
use storyloom::local::OllamaRuntime;
use storyloom::model::{BookDraft, ChapterDraft};
use storyloom::placeholder::render_placeholder;
use storyloom::quality::{is_junk, is_meta_response};
use storyloom::structure::fallback_book;
use storyloom::{Guardian, HealthRegistry, LoomResult};

fn main() {
    storyloom::logging::init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> LoomResult<()> {
    let cli = Cli::parse();
    let config = CascadeConfig::from_env();
    let health = Arc::new(HealthRegistry::new());
    let local = Arc::new(OllamaRuntime::new(config.local_timeout));

    match cli.command {
        Command::Polish(args) => {
            let raw = read_text(args.input.as_deref())?;
            let cascade = TextCascade::new(Arc::clone(&health))
                .with_backoff(config.backoff.clone())
                .with_local(local);
            let guardian = Guardian::new(Arc::clone(&health));
            let result = guardian.execute(
                "text_refinement",
                || Ok(cascade.refine(&raw)),
                Some(|| {
                    Ok(storyloom::model::CascadeResult::accepted(
                        storyloom::baseline::baseline_polish(&raw),
                        storyloom::model::Tier::DeterministicBaseline,
                    ))
                }),
                storyloom::model::CascadeResult::accepted(
                    raw.clone(),
                    storyloom::model::Tier::DeterministicBaseline,
                ),
            );

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "value": result.value,
                        "tier": result.tier,
                        "accepted": result.accepted,
                    }))?
                );
            } else {
                println!("{}", result.value);
            }
            Ok(())
        }
        Command::Book(args) => {
            let transcript = std::fs::read_to_string(&args.input)?;
            let cascade = BookCascade::new(Arc::clone(&health))
                .with_backoff(config.backoff.clone())
                .with_local(local);
            let guardian = Guardian::new(Arc::clone(&health));
            let book = guardian.execute(
                "book_generation",
                || Ok(cascade.generate(&transcript, &args.title).value),
                Some(|| Ok(fallback_book(&transcript, &args.title))),
                BookDraft {
                    title: args.title.clone(),
                    subtitle: "A journey of legacy".to_owned(),
                    chapters: vec![ChapterDraft {
                        chapter_title: "My Legacy".to_owned(),
                        chapter_summary: String::new(),
                        content: transcript.clone(),
                    }],
                },
            );

            println!("{}", serde_json::to_string_pretty(&book)?);
            Ok(())
        }
        Command::Placeholder(args) => {
            let bytes = render_placeholder(&args.title);
            std::fs::write(&args.output, &bytes)?;
            println!("{}", args.output.display());
            Ok(())
        }
        Command::Junk(args) => {
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({
                    "junk": is_junk(&args.text),
                    "meta_response": is_meta_response(&args.text),
                }))?
            );
            Ok(())
        }
        Command::Health => {
            let payload = serde_json::json!({
                "event": "health",
                "report": health.status_report(),
                "runtimes": storyloom::local::diagnostics(),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
    }
}
