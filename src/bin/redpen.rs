//! Redpen CLI - chunked, resumable LLM review of LaTeX documents.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use rayon::prelude::*;
use redpen::builder::Traversal;
use redpen::client::{OpenAiClient, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use redpen::engine::{same_document, Engine, EngineOptions, TraversalState};
use redpen::errors::{exit_code, RedpenError};
use redpen::output::{format_chunk, format_number, OutputFormat, DEFAULT_WIDTH};
use redpen::pricing::{CostLedger, ModelPrice, PriceTable};
use redpen::reader::{count_lines, LineReader, ReadOptions};
use redpen::review::{ReviewMode, DEFAULT_TOPIC};
use redpen::session::{Outcome, Session, SessionConfig};
use redpen::tokens::{count_tokens_with_encoding, estimate_units, Encoding, DEFAULT_MAX_TOKENS};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "redpen")]
#[command(about = "Chunked, resumable LLM review of LaTeX documents")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review a document interactively, one chunk at a time
    Review {
        /// Root LaTeX document
        root: PathBuf,

        /// Subject of the document, used in the review instructions
        #[arg(long, default_value = DEFAULT_TOPIC)]
        topic: String,

        /// Model backend to use
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Review mode: default, harsh or reviewer2
        #[arg(long, default_value = "default")]
        mode: String,

        /// Unit ceiling per chunk (1 unit ~ 3 characters)
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: usize,

        /// First line of the root document to review (1-based)
        #[arg(long, default_value_t = 1)]
        start_line: usize,

        /// Treat \input directives as plain text
        #[arg(long)]
        no_follow_includes: bool,

        /// Wrap column for feedback
        #[arg(long, default_value_t = DEFAULT_WIDTH)]
        width: usize,

        /// API key for the analysis service
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Base URL of an OpenAI-compatible service
        #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
        base_url: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout_secs: u64,

        /// Price for the model as INPUT:OUTPUT USD per million tokens
        #[arg(long)]
        price: Option<ModelPrice>,
    },

    /// Print a single chunk and the state needed to resume
    Chunk {
        /// Root LaTeX document
        #[arg(required_unless_present = "state")]
        root: Option<PathBuf>,

        /// Resume from a state printed by a previous call
        #[arg(long)]
        state: Option<String>,

        /// Unit ceiling per chunk
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: usize,

        /// First line of the root document (1-based)
        #[arg(long, default_value_t = 1, conflicts_with = "state")]
        start_line: usize,

        /// Treat \input directives as plain text
        #[arg(long)]
        no_follow_includes: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count lines, units and tokens across the inclusion tree
    Tokens {
        /// Root LaTeX document
        root: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Show per-document breakdown
        #[arg(long)]
        per_file: bool,

        /// Model used for the token encoding and projected cost
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Treat \input directives as plain text
        #[arg(long)]
        no_follow_includes: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_output = json_flag(&cli.command);

    let result = match cli.command {
        Commands::Review {
            root,
            topic,
            model,
            mode,
            max_tokens,
            start_line,
            no_follow_includes,
            width,
            api_key,
            base_url,
            timeout_secs,
            price,
        } => run_review(ReviewArgs {
            root,
            topic,
            model,
            mode,
            max_tokens,
            start_line,
            follow_includes: !no_follow_includes,
            width,
            api_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            price,
        }),
        Commands::Chunk {
            root,
            state,
            max_tokens,
            start_line,
            no_follow_includes,
            json,
        } => run_chunk(root, state, max_tokens, start_line, !no_follow_includes, json),
        Commands::Tokens {
            root,
            json,
            per_file,
            model,
            no_follow_includes,
        } => run_tokens(root, json, per_file, &model, !no_follow_includes),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "redpen", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        if json_output {
            #[derive(Serialize)]
            struct ErrorOutput {
                error: String,
            }

            let payload = ErrorOutput {
                error: e.to_string(),
            };

            let json = serde_json::to_string(&payload)
                .unwrap_or_else(|_| "{\"error\":\"serialization failed\"}".to_string());
            eprintln!("{json}");
        } else {
            eprintln!("error: {}", e);
        }
        std::process::exit(exit_code(&e));
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn json_flag(cmd: &Commands) -> bool {
    match cmd {
        Commands::Review { .. } => false,
        Commands::Chunk { json, .. } => *json,
        Commands::Tokens { json, .. } => *json,
        Commands::Completions { .. } => false,
    }
}

// --- Review command ---

struct ReviewArgs {
    root: PathBuf,
    topic: String,
    model: String,
    mode: String,
    max_tokens: usize,
    start_line: usize,
    follow_includes: bool,
    width: usize,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    price: Option<ModelPrice>,
}

fn run_review(args: ReviewArgs) -> Result<(), RedpenError> {
    // Configuration is validated before any document is opened
    let mode: ReviewMode = args.mode.parse()?;
    let mut prices = PriceTable::default();
    if let Some(price) = args.price {
        prices = prices.with_price(args.model.clone(), price);
    }
    let api_key = args.api_key.ok_or_else(|| {
        RedpenError::Config("no API key: set OPENAI_API_KEY or pass --api-key".into())
    })?;

    let (engine, state) = Traversal::new(&args.root)
        .max_tokens(args.max_tokens)
        .start_line(args.start_line)
        .follow_includes(args.follow_includes)
        .into_parts()?;

    let client = OpenAiClient::with_options(api_key, &args.model, args.base_url, args.timeout)?;
    info!(model = %args.model, %mode, root = %args.root.display(), "starting review");

    let config = SessionConfig {
        topic: args.topic,
        mode,
        width: args.width,
    };
    let mut session = Session::new(
        engine,
        state,
        client,
        CostLedger::new(args.model, prices),
        config,
        std::io::stdin().lock(),
        std::io::stdout(),
    );

    if session.run()? == Outcome::Finished {
        println!("Cheers!");
    }
    Ok(())
}

// --- Chunk command ---

fn run_chunk(
    root: Option<PathBuf>,
    state: Option<String>,
    max_tokens: usize,
    start_line: usize,
    follow_includes: bool,
    json: bool,
) -> Result<(), RedpenError> {
    let (engine, state) = match state {
        Some(state) => {
            let state = TraversalState::from_json(&state)?;
            check_resume_root(&state, root.as_deref())?;
            let options = EngineOptions {
                max_tokens,
                follow_includes,
                ..Default::default()
            };
            (Engine::new(options), state)
        }
        None => {
            let root = root.ok_or_else(|| {
                RedpenError::Config("a root document or --state is required".into())
            })?;
            Traversal::new(root)
                .max_tokens(max_tokens)
                .start_line(start_line)
                .follow_includes(follow_includes)
                .into_parts()?
        }
    };

    let chunk = engine.next_chunk(state)?;
    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    print!("{}", format_chunk(&chunk, format)?);
    if json {
        println!();
    }
    Ok(())
}

fn check_resume_root(state: &TraversalState, root: Option<&Path>) -> Result<(), RedpenError> {
    let Some(state_root) = state.root() else {
        return Err(RedpenError::InvalidState("traversal already finished".into()));
    };
    match root {
        Some(root) if !same_document(root, state_root) => Err(RedpenError::InvalidState(format!(
            "state belongs to {}, not {}",
            state_root.display(),
            root.display()
        ))),
        _ => Ok(()),
    }
}

// --- Tokens command ---

#[derive(Serialize)]
struct DocumentTokens {
    document: String,
    lines: usize,
    content_lines: usize,
    units: usize,
    tokens: usize,
}

fn run_tokens(
    root: PathBuf,
    json: bool,
    per_file: bool,
    model: &str,
    follow_includes: bool,
) -> Result<(), RedpenError> {
    let (engine, state) = Traversal::new(&root)
        .max_tokens(usize::MAX)
        .follow_includes(follow_includes)
        .into_parts()?;

    let documents: Vec<PathBuf> = engine
        .run_to_end(state)?
        .into_iter()
        .flat_map(|chunk| chunk.finished)
        .collect();

    let encoding = Encoding::for_model(model);
    let base = root.parent().map(Path::to_path_buf).unwrap_or_default();
    // one entry per inclusion, in reading order
    let per_document: Vec<DocumentTokens> = documents
        .par_iter()
        .map(|path| {
            let relative = path.strip_prefix(&base).unwrap_or(path);
            document_tokens(path, relative.display().to_string(), encoding)
        })
        .collect::<Result<_, RedpenError>>()?;

    let total_units: usize = per_document.iter().map(|d| d.units).sum();
    let total_tokens: usize = per_document.iter().map(|d| d.tokens).sum();
    let projected_cost = PriceTable::default()
        .price_for(model)
        .ok()
        .map(|price| (total_tokens as f64 / 1_000_000.0) * price.input_per_million);

    if json {
        #[derive(Serialize)]
        struct Output {
            documents: usize,
            units: usize,
            tokens: usize,
            encoding: String,
            model: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            projected_cost: Option<f64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            files: Option<Vec<DocumentTokens>>,
        }

        let output = Output {
            documents: per_document.len(),
            units: total_units,
            tokens: total_tokens,
            encoding: encoding.to_string(),
            model: model.to_string(),
            projected_cost,
            files: per_file.then_some(per_document),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        use std::io::{BufWriter, Write};
        let stdout = std::io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        if per_file {
            for stats in &per_document {
                writeln!(
                    out,
                    "{}: {} lines ({} content), ~{} units, {} tokens",
                    stats.document,
                    format_number(stats.lines),
                    format_number(stats.content_lines),
                    format_number(stats.units),
                    format_number(stats.tokens)
                )?;
            }
        }
        writeln!(
            out,
            "Total: {} documents, ~{} units, {} tokens ({})",
            per_document.len(),
            format_number(total_units),
            format_number(total_tokens),
            encoding
        )?;
        match projected_cost {
            Some(cost) => writeln!(out, "Projected input cost for {}: ${:.4}", model, cost)?,
            None => writeln!(out, "No registered price for {}", model)?,
        }
    }

    Ok(())
}

fn document_tokens(
    path: &Path,
    document: String,
    encoding: Encoding,
) -> Result<DocumentTokens, RedpenError> {
    let mut annotated = String::new();
    let mut content_lines = 0;
    let mut units = 0;
    for line in LineReader::open(path, 0, ReadOptions::default())? {
        let line = line?;
        let text = format!("L{}\t{}", line.number, line.text);
        units += estimate_units(&text);
        annotated.push_str(&text);
        annotated.push('\n');
        content_lines += 1;
    }
    Ok(DocumentTokens {
        document,
        lines: count_lines(path)?,
        content_lines,
        units,
        tokens: count_tokens_with_encoding(&annotated, encoding),
    })
}
