//! Sync command implementation.

use super::{cancel_on_interrupt, open_hosts, ReplicationArgs, StdinConfirmation};
use std::sync::Arc;
use thinker_sync::{RunReport, SyncOrchestrator};
use tracing::info;

/// Runs the sync command.
pub async fn run(args: &ReplicationArgs) -> Result<RunReport, Box<dyn std::error::Error>> {
    let (source, target) = open_hosts(&args.source_host, &args.target_host).await?;
    info!(
        source = %args.source_host.display(),
        target = %args.target_host.display(),
        "syncing `{}` into `{}`",
        args.source_db,
        args.target_db
    );

    let orchestrator = SyncOrchestrator::new(source, target, args.config())
        .with_confirmation(Arc::new(StdinConfirmation))
        .with_observer(args.observer());
    let token = orchestrator.cancellation_token();
    cancel_on_interrupt(move || token.cancel());

    Ok(orchestrator.run().await?)
}
