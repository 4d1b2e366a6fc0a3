//! Watch command: index the plan root, then stream change events.
//!
//! Each event is printed to stdout as one JSON line (`{type, payload}`)
//! until interrupted with Ctrl-C.

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::watch::{self, Reindexer};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::open_context;

/// Execute the watch command.
///
/// # Errors
///
/// Returns `PLAN_ROOT_MISSING`, a watch backend error, or a runtime error.
pub fn execute(project: Option<&Path>) -> Result<()> {
    let ctx = Arc::new(open_context(project)?);
    let printer = spawn_printer(&ctx);

    let reindexer = Arc::new(Reindexer::new(Arc::clone(&ctx)));
    let summary = reindexer.index_all()?;
    info!(indexed = summary.indexed, failed = summary.failed, "Initial index complete");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    let cancel = CancellationToken::new();
    let result = rt.block_on(async {
        let subscription = watch::subscribe(&ctx, cancel.clone())?;

        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping watch");
            }
            shutdown.cancel();
        });

        watch::run(reindexer, subscription).await;
        Ok::<(), Error>(())
    });
    drop(rt);

    match Arc::try_unwrap(ctx) {
        Ok(ctx) => ctx.dispose(),
        Err(ctx) => ctx.notifier().close(),
    }
    if printer.join().is_err() {
        warn!("Event printer panicked");
    }
    result
}

/// Print every notifier message as a line on stdout until the notifier
/// closes.
fn spawn_printer(ctx: &AppContext) -> std::thread::JoinHandle<()> {
    let rx = ctx.notifier().subscribe();
    std::thread::spawn(move || {
        let stdout = std::io::stdout();
        for line in rx {
            let mut out = stdout.lock();
            if writeln!(out, "{line}").and_then(|()| out.flush()).is_err() {
                // Reader went away (e.g. closed pipe)
                break;
            }
        }
    })
}
