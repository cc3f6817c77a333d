//! Clone command implementation.

use super::{cancel_on_interrupt, open_hosts, ReplicationArgs, StdinConfirmation};
use std::sync::Arc;
use thinker_sync::{ClonePipeline, ExistingTables, RunReport};
use tracing::info;

/// Runs the clone command.
pub async fn run(
    args: &ReplicationArgs,
    sync_existing: bool,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let (source, target) = open_hosts(&args.source_host, &args.target_host).await?;
    let existing = if sync_existing {
        ExistingTables::Sync
    } else {
        ExistingTables::Skip
    };
    info!(
        source = %args.source_host.display(),
        target = %args.target_host.display(),
        "cloning `{}` into `{}`",
        args.source_db,
        args.target_db
    );

    let pipeline = ClonePipeline::new(source, target, args.config().with_existing_tables(existing))
        .with_confirmation(Arc::new(StdinConfirmation))
        .with_observer(args.observer());
    let token = pipeline.cancellation_token();
    cancel_on_interrupt(move || token.cancel());

    Ok(pipeline.run().await?)
}
