//! CLI entry point for RepoMentor.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use repomentor_core::eval::{self, LATENCY_THRESHOLD};
use repomentor_core::{
    app_data_dir, config_path, load_config, save_config, source_label, status, Answer, Config,
    OllamaClient, Session, Source,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "repomentor")]
#[command(about = "RepoMentor: ask questions about a code repository")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Clone)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Zip archive of the repository.
    #[arg(long, value_name = "FILE")]
    zip: Option<PathBuf>,
    /// Public git URL to shallow-clone.
    #[arg(long, value_name = "URL")]
    git: Option<String>,
    /// Local directory to copy.
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,
}

impl SourceArgs {
    fn source(self) -> Source {
        match (self.zip, self.git, self.dir) {
            (Some(zip), _, _) => Source::Zip(zip),
            (_, Some(url), _) => Source::Git(url),
            (_, _, Some(dir)) => Source::Directory(dir),
            // clap's arg group guarantees exactly one is set
            (None, None, None) => Source::Directory(PathBuf::from(".")),
        }
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where RepoMentor stores its config and sessions (app data directory).
    DataDir,
    /// Show or initialize the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Fetch a repository and build its index. Prints the session id.
    Ingest {
        #[command(flatten)]
        source: SourceArgs,
        /// Reuse (and replace) an existing session.
        #[arg(long)]
        session: Option<String>,
    },
    /// Ask a question about an ingested repository.
    Ask {
        #[arg(long)]
        session: String,
        /// Number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
        /// Override the chat model.
        #[arg(long)]
        model: Option<String>,
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Explain one indexed file.
    Explain {
        #[arg(long)]
        session: String,
        #[arg(long)]
        model: Option<String>,
        /// Path relative to the repository root, as listed by `files`.
        path: String,
    },
    /// List the files of a session that can be explained.
    Files {
        #[arg(long)]
        session: String,
    },
    /// Delete a session's repository and index.
    Drop {
        #[arg(long)]
        session: String,
    },
    /// Ingest into a throwaway session and answer questions from stdin.
    Chat {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Ask a case file of questions and have the model grade the answers.
    Eval {
        /// Repository directory to evaluate against.
        #[arg(long, value_name = "PATH")]
        dir: PathBuf,
        /// TOML file of `[[case]]` entries.
        #[arg(long, value_name = "FILE")]
        cases: PathBuf,
        /// Where to write the JSON report.
        #[arg(long, default_value = "evaluation_report.json")]
        report: PathBuf,
        /// Seconds to wait between questions (for rate-limited endpoints).
        #[arg(long, default_value_t = 0)]
        pause_secs: u64,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print the effective config as TOML.
    Show,
    /// Write the effective config to the config file.
    Init,
    /// Print the config file location.
    Path,
}

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "repomentor=info,repomentor_core=info";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config();

    match run(cli.command.unwrap_or(Commands::Status), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("command failed: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

async fn run(command: Commands, config: Config) -> CliResult {
    match command {
        Commands::Status => {
            println!("RepoMentor backend");
            println!("  core: {}", status());
            println!("  ollama: {}", config.ollama_url);
            println!("  models: embed={} chat={}", config.embed_model, config.chat_model);
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", toml::to_string_pretty(&config)?),
            ConfigAction::Init => println!("Wrote {}", save_config(&config)?.display()),
            ConfigAction::Path => match config_path() {
                Some(p) => println!("{}", p.display()),
                None => eprintln!("Could not determine app data directory."),
            },
        },
        Commands::Ingest { source, session } => {
            let mut session = match session {
                Some(id) => Session::open(&id)?,
                None => Session::create()?,
            };
            let client = OllamaClient::from_config(&config)?;
            let report = session
                .prepare(&source.source(), &client, &config.ingest())
                .await?;
            if report.chunks_indexed == 0 {
                println!("No valid files found.");
            }
            println!(
                "Indexed {} chunk(s) from {} file(s).",
                report.chunks_indexed, report.files_indexed
            );
            println!("session: {}", session.id());
        }
        Commands::Ask {
            session,
            top_k,
            model,
            question,
        } => {
            let session = Session::open(&session)?;
            let client = client_with_model(&config, model)?;
            let answer = session
                .ask(
                    &question.join(" "),
                    &client,
                    &client,
                    top_k.unwrap_or(config.top_k),
                )
                .await;
            print_answer(&answer);
        }
        Commands::Explain {
            session,
            model,
            path,
        } => {
            let session = Session::open(&session)?;
            let client = client_with_model(&config, model)?;
            println!("{}", session.explain(&path, &client).await);
        }
        Commands::Files { session } => {
            for f in Session::open(&session)?.files()? {
                println!("{f}");
            }
        }
        Commands::Drop { session } => {
            Session::open(&session)?.teardown()?;
            println!("Dropped session {session}");
        }
        Commands::Chat { source } => chat(source.source(), &config).await?,
        Commands::Eval {
            dir,
            cases,
            report,
            pause_secs,
        } => {
            let cases = eval::load_cases(&cases)?;
            let mut session = Session::create()?;
            let outcome = run_eval(&mut session, dir, &cases, &report, pause_secs, &config).await;
            session.teardown()?;
            outcome?;
        }
    }
    Ok(())
}

/// Ingest `dir` into a throwaway session, grade every case and write the report.
async fn run_eval(
    session: &mut Session,
    dir: PathBuf,
    cases: &[eval::EvalCase],
    report: &Path,
    pause_secs: u64,
    config: &Config,
) -> CliResult {
    let client = OllamaClient::from_config(config)?;
    session
        .prepare(&Source::Directory(dir), &client, &config.ingest())
        .await?;
    println!("Grading {} question(s) with {}...", cases.len(), client.chat_model());
    let summary = eval::evaluate(
        session,
        cases,
        &client,
        &client,
        config.top_k,
        Duration::from_secs(pause_secs),
    )
    .await;
    print_summary(&summary);
    eval::write_report(&summary, report)?;
    println!("Saved detailed report to {}", report.display());
    Ok(())
}

fn client_with_model(
    config: &Config,
    model: Option<String>,
) -> Result<OllamaClient, Box<dyn std::error::Error>> {
    let client = OllamaClient::from_config(config)?;
    Ok(match model {
        Some(m) => client.with_chat_model(m),
        None => client,
    })
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if answer.sources.is_empty() {
        return;
    }
    println!("\n### Sources");
    for src in &answer.sources {
        println!("\n{}", source_label(src));
        println!("{}", src.content);
    }
}

fn print_summary(summary: &eval::EvalSummary) {
    for (i, r) in summary.results.iter().enumerate() {
        let q: String = r.question.chars().take(40).collect();
        let status = if r.passed() { "ok" } else { "low" };
        println!(
            "{:>2}. {q:40} | Score: {}/5 | Time: {:.2}s {status}",
            i + 1,
            r.score,
            r.latency_secs
        );
    }
    println!("{}", "=".repeat(50));
    println!("Avg Score:   {:.2} / 5.0", summary.average_score);
    println!("Avg Latency: {:.2}s", summary.average_latency_secs);
    if summary.slow_answers > 0 {
        println!(
            "{} answer(s) slower than {:.1}s",
            summary.slow_answers,
            LATENCY_THRESHOLD.as_secs_f64()
        );
    }
    println!("{}", "=".repeat(50));
}

/// Interactive loop. A failed action prints its message and the loop continues.
async fn chat(source: Source, config: &Config) -> CliResult {
    let client = OllamaClient::from_config(config)?;
    let mut session = Session::create()?;
    println!("Preparing {source}...");
    match session.prepare(&source, &client, &config.ingest()).await {
        Ok(report) => println!("Ready! {} chunk(s) indexed.", report.chunks_indexed),
        Err(e) => {
            tracing::warn!(session = session.id(), "chat setup failed: {e}");
            session.teardown()?;
            return Err(e.into());
        }
    }
    println!("Ask a question, or use :files, :explain PATH, :quit");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            tracing::debug!("stdin closed");
            break;
        }
        let input = line.trim();
        match input {
            "" => {}
            ":quit" | ":q" => break,
            ":files" => match session.files() {
                Ok(files) => files.iter().for_each(|f| println!("{f}")),
                Err(e) => {
                    tracing::warn!(session = session.id(), "listing files failed: {e}");
                    println!("Error: {e}");
                }
            },
            _ => {
                if let Some(path) = input.strip_prefix(":explain") {
                    let path = path.trim();
                    if path.is_empty() {
                        println!("Usage: :explain PATH");
                    } else {
                        println!("{}", session.explain(path, &client).await);
                    }
                } else {
                    print_answer(&session.ask(input, &client, &client, config.top_k).await);
                }
            }
        }
    }
    tracing::info!(session = session.id(), "chat ended");
    session.teardown()?;
    Ok(())
}
