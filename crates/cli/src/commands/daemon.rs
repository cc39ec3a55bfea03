//! `openloop daemon`: scheduled check-ins and reminders until Ctrl+C.

use crate::runtime::{Runtime, load_config};
use openloop_channels::notifier_for;
use openloop_scheduler::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let runtime = Runtime::build(&config).await?;

    let notifier = notifier_for(config.scheduler.webhook_url.as_deref());
    info!(notifier = notifier.name(), "Scheduled output destination");

    let scheduler = Scheduler::new(
        runtime.store.clone(),
        runtime.agent.clone(),
        notifier,
        config.scheduler.clone(),
    )
    .with_event_bus(runtime.event_bus.clone());

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            on_signal.cancel();
        }
    });

    println!("openloop daemon running. Press Ctrl+C to stop.");
    scheduler.run(shutdown).await?;

    Ok(())
}
