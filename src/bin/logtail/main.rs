// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::select;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use logtail::init::args::TailArgs;
use logtail::tail::{Error as TailError, FileTailer};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Parser)]
#[command(name = "logtail")]
#[command(bin_name = "logtail")]
#[command(version, about, long_about = None)]
struct Arguments {
    #[arg(value_enum, long, env = "LOGTAIL_LOG_FORMAT", default_value = "text")]
    /// Log format
    log_format: LogFormatArg,

    #[command(flatten)]
    tail: TailArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let _guard = match setup_logging(&opt.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(opt.tail) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Tailing failed.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run(args: TailArgs) -> Result<(), BoxError> {
    let config = args.build_config()?;
    let tailer = Arc::new(FileTailer::new(config)?);
    info!(path = ?tailer.filename(), "Started tailing.");

    let reader = Arc::clone(&tailer);
    let print_offsets = args.print_offsets;
    let mut lines = tokio::task::spawn_blocking(move || print_lines(&reader, print_offsets));

    select! {
        _ = signal_wait() => {
            info!("Shutdown signal received.");
            tailer.stop()?;
            lines.await??;
        },
        res = &mut lines => {
            res??;
        },
    }

    Ok(())
}

/// Print lines until the tailer is stopped or the file ends.
fn print_lines(tailer: &FileTailer, print_offsets: bool) -> Result<(), BoxError> {
    let stdout = io::stdout();
    loop {
        let line = match tailer.next() {
            Ok(line) => line,
            Err(TailError::Cancelled) | Err(TailError::Eof) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut out = stdout.lock();
        if print_offsets {
            writeln!(out, "{}\t{}", line.offset, line.text)?;
        } else {
            writeln!(out, "{}", line.text)?;
        }
        out.flush()?;
    }
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    // Tailed lines own stdout.
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // Skip color codes when not in a terminal
        let use_ansi = io::stderr().is_terminal();

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

#[cfg(unix)]
async fn signal_wait() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sig_term, mut sig_int) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            error!("Unable to install signal handlers, falling back to Ctrl-C.");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
}

#[cfg(not(unix))]
async fn signal_wait() {
    let _ = tokio::signal::ctrl_c().await;
}
