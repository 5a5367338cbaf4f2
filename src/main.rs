//! nrepl
//!
//! Reads Clojure code from standard input, evaluates it on an nREPL server
//! and writes the value to standard output. Exceptions and captured
//! stdout/stderr go to standard error.
//!
//! Exit status: 0 on success, 1 on an evaluation error, 2 when the server
//! could not be reached or the exchange failed.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use nrepl_client::config::Config;
use nrepl_client::output::Printer;
use nrepl_client::{Client, Op, Outcome, Request};

const EXIT_EVAL_ERROR: u8 = 1;
const EXIT_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "nrepl")]
#[command(about = "Evaluate code from stdin on a running nREPL server")]
struct Args {
    /// nREPL address (host:port or port). Defaults to localhost:$LEIN_REPL_PORT,
    /// then the nearest .nrepl-port file
    #[arg(short = 'a', long)]
    addr: Option<String>,

    /// Session id to evaluate in
    #[arg(short = 's', long)]
    session: Option<String>,

    /// Clone a new session and print its id
    #[arg(long, conflicts_with_all = ["close", "format"])]
    clone: bool,

    /// Close the session given with --session
    #[arg(long, conflicts_with = "format")]
    close: bool,

    /// Format the code from stdin instead of evaluating it
    #[arg(long)]
    format: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Args {
    const fn op(&self) -> Op {
        if self.clone {
            Op::Clone
        } else if self.close {
            Op::Close
        } else if self.format {
            Op::FormatCode
        } else {
            Op::Eval
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs share stderr with evaluation output, so default to quiet
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args).await {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::EvalError { code }) => {
            debug!(code_len = code.len(), "Evaluation failed");
            ExitCode::from(EXIT_EVAL_ERROR)
        }
        Err(e) => {
            error!(error = %e, "Request failed");
            eprintln!("nrepl: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(args: &Args) -> Result<Outcome> {
    let op = args.op();

    let code = if op.takes_code() {
        let mut code = String::new();
        tokio::io::stdin()
            .read_to_string(&mut code)
            .await
            .context("Error reading standard input")?;
        Some(code)
    } else {
        None
    };

    let mut request = Request::new(op, code)?;
    if let Some(session) = &args.session {
        request = request.with_session(session.as_str());
    }
    if op == Op::Close && request.session.is_none() {
        warn!("Closing without --session; the server decides which session is closed");
    }

    let config = Config::from_env(args.addr.as_deref()).context("Failed to resolve nREPL address")?;
    let mut client = Client::connect(&config.addr).await?;

    let mut printer = Printer::stdio();
    let outcome = client
        .send(&request, |resp| {
            if let Err(e) = printer.print(&resp) {
                warn!(error = %e, "Failed to write response");
            }
        })
        .await?;

    client.close().await;
    Ok(outcome)
}
