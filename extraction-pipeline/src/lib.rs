pub mod extractor;
pub mod resolver;
pub mod runtime;
pub mod state;

use std::time::Duration;

use state_machines::core::GuardError;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use common::error::AppError;

use crate::extractor::{ExtractionEngine, PassReport};
use crate::resolver::{PlanResolver, PlanSnapshot, Resolution};
use crate::state::idle;

/// Drive resolve/extract cycles at the configured interval until the
/// shutdown signal flips, an unrecoverable store error occurs, or no plan
/// can be obtained at all on startup.
///
/// Resolution failures after the first successful cycle are logged and the
/// last good plan is reused. Extraction runs every cycle even when the
/// plan is unchanged, because mutable image tags drift upstream.
pub async fn run_extractor_loop(
    resolver: PlanResolver,
    engine: ExtractionEngine,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    info!(interval_secs = interval.as_secs(), "starting extractor loop");
    let mut snapshot: Option<PlanSnapshot> = None;

    loop {
        if *shutdown.borrow() {
            let _stopped = idle()
                .stop()
                .map_err(|(_, guard)| map_guard_error("stop", guard))?;
            info!("extractor loop stopped");
            return Ok(());
        }

        if let Err(err) = run_cycle(&resolver, &engine, &mut snapshot).await {
            error!(error = %err, "extraction pass aborted");
            return Err(err);
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// One full cycle: Idle → Resolving → Extracting → Idle.
///
/// Returns the pass report when a pass ran. An `Err` is fatal to the loop:
/// either the content store failed mid-pass, or startup never obtained any
/// plan to work from.
pub async fn run_cycle(
    resolver: &PlanResolver,
    engine: &ExtractionEngine,
    snapshot: &mut Option<PlanSnapshot>,
) -> Result<Option<PassReport>, AppError> {
    let machine = idle()
        .resolve()
        .map_err(|(_, guard)| map_guard_error("resolve", guard))?;

    match resolver.resolve(snapshot.as_ref()).await {
        Ok(Resolution::Updated(next)) => {
            info!(networks = next.plan.networks.len(), "extraction plan updated");
            *snapshot = Some(next);
        }
        Ok(Resolution::Unchanged) => {
            debug!("extraction plan unchanged");
        }
        Err(err) if snapshot.is_none() => {
            // Nothing has ever been resolved; there is no last good plan to
            // fall back to.
            error!(error = %err, "no extraction plan could be obtained");
            return Err(err);
        }
        Err(err) => {
            warn!(error = %err, "plan resolution failed; keeping the last good plan");
        }
    }

    let machine = machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", guard))?;

    let report = match snapshot.as_ref() {
        Some(snapshot) => Some(engine.run_pass(&snapshot.plan).await?),
        None => None,
    };

    let _machine = machine
        .finish()
        .map_err(|(_, guard)| map_guard_error("finish", guard))?;
    Ok(report)
}

fn map_guard_error(event: &str, err: GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid poll loop transition during {event}: guard={}, event={}, kind={:?}",
        err.guard, err.event, err.kind
    ))
}
