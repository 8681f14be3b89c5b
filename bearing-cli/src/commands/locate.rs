//! `locate` and `track`: acquire fixes from a recording.

use std::path::Path;
use std::sync::Arc;

use bearing::location::{
    BackendSet, DirectBackend, Fix, LocationEvent, LocationTask, PositionBackend,
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{CliContext, OutputFormat};
use crate::error::CliError;
use crate::replay::{ReplayHost, ReplayLocationManager};

/// Bind a task to a direct backend playing back `fixes`.
fn replay_task(ctx: &CliContext, fixes: &Path) -> Result<LocationTask, CliError> {
    let manager = ReplayLocationManager::from_file(fixes, Handle::current())?;
    info!(path = %fixes.display(), fixes = manager.fix_count(), "Loaded fix recording");

    let backend = Arc::new(DirectBackend::new(manager)) as Arc<dyn PositionBackend>;
    let backends = BackendSet::new().with_direct(backend);

    Ok(LocationTask::new(&backends, &ReplayHost)?.request(ctx.location_request()))
}

fn print_fix(fix: &Fix, output: OutputFormat) {
    match output {
        OutputFormat::Text => println!("{}", fix),
        OutputFormat::Json => match serde_json::to_string(fix) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to encode fix: {}", e),
        },
    }
}

/// Print a single fix.
pub async fn locate(ctx: &CliContext, fixes: &Path) -> Result<(), CliError> {
    let task = replay_task(ctx, fixes)?;
    let mut handle = task.current()?;

    let mut timed_out = false;
    while let Some(event) = handle.next_event().await {
        match event {
            LocationEvent::Update(fix) => {
                print_fix(&fix, ctx.options.output);
                return Ok(());
            }
            // With the cache fallback a fix may still follow.
            LocationEvent::Timeout => timed_out = true,
            LocationEvent::Failure => break,
        }
    }

    Err(CliError::NoFix(if timed_out {
        format!(
            "timed out after {}ms",
            task.policy().fallback_timeout.as_millis()
        )
    } else {
        "location source failed".to_string()
    }))
}

/// Print fixes until the recording ends or Ctrl-C is pressed.
pub async fn track(
    ctx: &CliContext,
    fixes: &Path,
    displacement: Option<f64>,
) -> Result<(), CliError> {
    let mut task = replay_task(ctx, fixes)?;
    if let Some(metres) = displacement {
        let policy = task.policy().clone();
        task = task.tracking(metres, policy.tracking_rate, policy.tracking_fallback);
    }

    let interrupted = CancellationToken::new();
    let token = interrupted.clone();
    ctrlc::set_handler(move || token.cancel())
        .map_err(|e| CliError::Config(format!("failed to install Ctrl-C handler: {}", e)))?;

    let mut handle = task.track()?;
    let mut delivered = 0usize;

    loop {
        tokio::select! {
            _ = interrupted.cancelled() => {
                handle.cancel();
                eprintln!("Stopped after {} fixes", delivered);
                return Ok(());
            }
            event = handle.next_event() => match event {
                Some(LocationEvent::Update(fix)) => {
                    delivered += 1;
                    print_fix(&fix, ctx.options.output);
                }
                Some(LocationEvent::Timeout) if delivered == 0 => {
                    return Err(CliError::NoFix("no fix before the first-fix timeout".to_string()));
                }
                Some(LocationEvent::Timeout) => {}
                Some(LocationEvent::Failure) | None if delivered > 0 => {
                    eprintln!("Recording finished after {} fixes", delivered);
                    return Ok(());
                }
                Some(LocationEvent::Failure) | None => {
                    return Err(CliError::NoFix("location source failed".to_string()));
                }
            }
        }
    }
}
