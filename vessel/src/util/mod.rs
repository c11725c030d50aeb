//! Internal utilities: logging bootstrap.

use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use vessel_shared::errors::{VesselError, VesselResult};

use crate::runtime::layout::FilesystemLayout;

// Keep the non-blocking writer's flush thread alive for the process
// lifetime.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Route engine logs to a daily-rolling file under the layout's logs dir.
///
/// Honors `RUST_LOG` and defaults to `info`. If the embedding application
/// already installed a tracing subscriber, that one wins. Safe to call
/// more than once.
pub(crate) fn init_logging_for(layout: &FilesystemLayout) -> VesselResult<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(layout.logs_dir())
        .map_err(|e| VesselError::Storage(format!("failed to create logs dir: {e}")))?;

    let appender = tracing_appender::rolling::daily(layout.logs_dir(), "vessel.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| VesselError::Internal(format!("failed to build log filter: {e}")))?;

    register_to_tracing(writer, filter);

    let _ = LOG_GUARD.set(guard);
    Ok(())
}

/// Install the subscriber. An already-registered global subscriber takes
/// precedence.
pub(crate) fn register_to_tracing(writer: NonBlocking, filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init();
}
