use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use scriptbridge::{FetchRequest, FetchResponse, FnHandler, RuntimeConfig, RuntimeError, ScriptRuntime};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `scriptbridge=debug`.
/// Falls back to `RUST_LOG`.
const LOG_ENV: &str = "SCRIPTBRIDGE_LOG";

/// scriptbridge - run a script that binds `res` and print what it settles to
#[derive(Parser, Debug)]
#[command(name = "scriptbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Script file, or `-` for stdin
    script: PathBuf,

    /// Seconds to wait for `res` to settle
    #[arg(long, default_value_t = 15)]
    timeout: u64,

    /// Largest response body, in bytes, delivered inline instead of streamed
    #[arg(long)]
    inline_limit: Option<u64>,

    /// Interpreter heap limit in bytes
    #[arg(long)]
    memory_limit: Option<usize>,

    /// Serve PATH locally with BODY instead of using the network (repeatable)
    #[arg(long = "stub", value_name = "PATH=BODY", value_parser = parse_stub)]
    stubs: Vec<(String, String)>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("formatting result: {0}")]
    Json(#[from] serde_json::Error),
}

fn parse_stub(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((path, body)) if path.starts_with('/') => Ok((path.to_string(), body.to_string())),
        Some(_) => Err("stub path must start with '/'".to_string()),
        None => Err("expected PATH=BODY".to_string()),
    }
}

fn read_script(path: &Path) -> Result<String, CliError> {
    let read_error = |source| CliError::Read {
        path: path.display().to_string(),
        source,
    };
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .map_err(read_error)?;
        return Ok(source);
    }
    std::fs::read_to_string(path).map_err(read_error)
}

fn build_runtime(args: &Args) -> Result<ScriptRuntime, CliError> {
    let mut config = RuntimeConfig::default().with_default_timeout(Duration::from_secs(args.timeout));
    if let Some(limit) = args.inline_limit {
        config = config.with_inline_body_limit(limit);
    }
    if let Some(limit) = args.memory_limit {
        config = config.with_memory_limit(limit);
    }

    let mut builder = ScriptRuntime::builder().config(config);
    if !args.stubs.is_empty() {
        let stubs: HashMap<String, String> = args.stubs.iter().cloned().collect();
        let lookup = stubs.clone();
        builder = builder.local_handler(FnHandler::new(
            move |request: &FetchRequest| stubs.contains_key(&request.path()),
            move |request: &FetchRequest| {
                let body = lookup.get(&request.path()).cloned().unwrap_or_default();
                Ok(FetchResponse::ok(body).with_url(request.url.clone()))
            },
        ));
    }
    Ok(builder.build()?)
}

fn run(args: &Args) -> Result<String, CliError> {
    let source = read_script(&args.script)?;
    let runtime = build_runtime(args)?;
    tracing::debug!(script = %args.script.display(), stubs = args.stubs.len(), "running script");
    let value = runtime.run(&source)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV)
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
