//! Queue command implementations.
//!
//! Handles enqueueing, inspecting and replaying the offline queue.

use colored::Colorize;

use super::Context;
use crate::cli::args::{OutputFormat, RequestArgs};
use crate::error::SyncError;
use crate::features::sync::{
    format_pass_report, parse_header, sort_for_replay, ConnectivityProbe, DispatchOutcome,
    Dispatcher, NewRequest, PassReport, ProcessorConfig, QueueProcessor, Watcher,
};
use crate::output::{format_requests, format_stats, to_json};

/// Build a request from command-line arguments.
fn build_request(args: RequestArgs) -> Result<NewRequest, SyncError> {
    let mut request = NewRequest::new(args.method, args.url);

    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        request = request.header(name, value);
    }

    if let Some(path) = &args.body_file {
        let body = std::fs::read_to_string(path).map_err(|e| {
            SyncError::InvalidRequest(format!(
                "Failed to read body file {}: {e}",
                path.display()
            ))
        })?;
        request = request.body(body);
    } else if let Some(body) = args.body {
        request = request.body(body);
    }

    request.priority = args.priority;
    request.max_retries = args.max_retries;
    request.conflict_resolution = args.conflict;

    Ok(request)
}

/// Queue a request without sending it.
///
/// # Errors
///
/// Returns an error if the request is invalid or cannot be stored.
pub fn enqueue(ctx: &Context, args: RequestArgs) -> Result<String, SyncError> {
    let mut queue = ctx.open_queue()?;
    let queued = queue.add_to_queue(build_request(args)?)?;

    match ctx.format {
        OutputFormat::Json => to_json(&queued),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} {} (ID: {})",
            queued.method,
            queued.url,
            queued.id
        )),
    }
}

/// Send a request now, queueing it on failure.
///
/// # Errors
///
/// Returns an error if the request is invalid or cannot be stored.
pub fn send(ctx: &Context, args: RequestArgs) -> Result<String, SyncError> {
    let request = build_request(args)?;
    let mut queue = ctx.open_queue()?;
    let probe = ctx.probe()?;
    let transport = ctx.transport()?;

    let outcome = Dispatcher::new(&probe, &transport, &mut queue).send_or_queue(request)?;

    match ctx.format {
        OutputFormat::Json => to_json(&outcome),
        OutputFormat::Pretty => Ok(match outcome {
            DispatchOutcome::Delivered { status } => {
                format!("{} Delivered (HTTP {status})", "✓".green())
            }
            DispatchOutcome::Queued { request, reason } => format!(
                "{} Queued for later: {} (ID: {})",
                "↻".yellow(),
                reason,
                request.id
            ),
            DispatchOutcome::Skipped { status } => {
                format!("{} Skipped after conflict (HTTP {status})", "✗".red())
            }
        }),
    }
}

/// List queued requests in replay order.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn list(ctx: &Context) -> Result<String, SyncError> {
    let queue = ctx.open_queue()?;
    let mut requests = queue.requests().to_vec();
    sort_for_replay(&mut requests);

    format_requests(&requests, "Queued requests", ctx.format)
}

/// Show queue counts.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn status(ctx: &Context) -> Result<String, SyncError> {
    let queue = ctx.open_queue()?;
    format_stats(&queue.stats()?, ctx.format)
}

/// Remove one request.
///
/// # Errors
///
/// Returns `NotFound` if no request has the id.
pub fn remove(ctx: &Context, id: &str) -> Result<String, SyncError> {
    let mut queue = ctx.open_queue()?;

    if !queue.remove(id)? {
        return Err(SyncError::NotFound(format!("Request {id}")));
    }

    match ctx.format {
        OutputFormat::Json => to_json(&serde_json::json!({ "removed": id })),
        OutputFormat::Pretty => Ok(format!("Removed request {id}")),
    }
}

/// Remove every queued request.
///
/// # Errors
///
/// Returns an error without `--force` or if the delete fails.
pub fn clear(ctx: &Context, force: bool) -> Result<String, SyncError> {
    if !force {
        return Err(SyncError::Config(
            "Use --force to clear all queued requests".to_string(),
        ));
    }

    let mut queue = ctx.open_queue()?;
    let count = queue.len();
    queue.clear()?;

    match ctx.format {
        OutputFormat::Json => to_json(&serde_json::json!({ "cleared": count })),
        OutputFormat::Pretty => Ok(format!("Cleared {count} queued requests")),
    }
}

fn render_report(report: Option<&PassReport>, format: OutputFormat) -> Result<String, SyncError> {
    match (format, report) {
        (OutputFormat::Json, Some(report)) => to_json(report),
        (OutputFormat::Json, None) => to_json(&serde_json::json!({ "processed": false })),
        (OutputFormat::Pretty, Some(report)) => Ok(format_pass_report(report)),
        (OutputFormat::Pretty, None) => Ok("No queued requests to process.".to_string()),
    }
}

/// Run one processing pass.
///
/// Nothing is sent while the device is offline; the queue is left as is.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or the HTTP clients cannot be built.
pub fn process(ctx: &Context, dry_run: bool) -> Result<String, SyncError> {
    let mut queue = ctx.open_queue()?;

    let online = dry_run || ctx.probe()?.is_online();
    if !online {
        tracing::info!(probe = %ctx.config.sync.probe_url, "offline, skipping pass");
        return match ctx.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "online": false,
                "queued": queue.len(),
            })),
            OutputFormat::Pretty => Ok(format!(
                "Device is offline; nothing processed ({} requests queued)",
                queue.len()
            )),
        };
    }

    let config = ProcessorConfig {
        dry_run,
        ..ProcessorConfig::from(&ctx.config.sync)
    };
    let mut processor = QueueProcessor::with_config(ctx.transport()?, config);
    let report = processor.process(&mut queue, online)?;

    render_report(report.as_ref(), ctx.format)
}

/// Replay the queue whenever the device is online.
///
/// # Errors
///
/// Returns an error if the queue or HTTP clients cannot be set up.
pub fn watch(ctx: &Context, max_ticks: Option<u64>) -> Result<String, SyncError> {
    let queue = ctx.open_queue()?;
    let processor =
        QueueProcessor::with_config(ctx.transport()?, ProcessorConfig::from(&ctx.config.sync));
    let mut watcher = Watcher::new(ctx.probe()?, processor, queue, &ctx.config.sync);

    let format = ctx.format;
    let mut passes = 0_usize;
    watcher.run(max_ticks, |report| {
        passes += 1;
        match render_report(Some(report), format) {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::error!(error = %e, "failed to render pass report"),
        }
    });

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "passes": passes,
            "remaining": watcher.queue().len(),
        })),
        OutputFormat::Pretty => Ok(format!(
            "Watcher stopped after {passes} passes; {} requests remain queued",
            watcher.queue().len()
        )),
    }
}
