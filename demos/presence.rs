//! Presence demo - publish an activity to the local host and keep it alive.
//!
//! This example demonstrates:
//! - Building a client bound to the platform pipe
//! - Running the loop on its own task
//! - Publishing an activity and reacting to lifecycle events
//! - Clearing the activity and shutting down on Ctrl-C
//!
//! # Running
//!
//! ```text
//! RUST_LOG=presence_client=debug cargo run --example presence -- <client id>
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use presence_client::activity::{Activity, ActivityType, Button, Party};
use presence_client::transport::PipeTransport;
use presence_client::{Client, LifecycleEvent};
use tracing_subscriber::EnvFilter;

const DEFAULT_CLIENT_ID: &str = "1355907951155740785";

fn activity() -> Result<Activity, Box<dyn std::error::Error>> {
    let started = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let mut activity = Activity::new();
    activity.set_name("drpc")?;
    activity.set_type(ActivityType::Playing);
    activity.set_details("Line 1");
    activity.set_state("Party");
    activity.timestamps_mut().set_start(i64::try_from(started)?);
    activity.set_party(Some(Party::new("demo-lobby", 1, 4)?));
    activity.assets_mut().set_large_image("my_image");
    activity.assets_mut().set_large_text("Hovering");
    activity.add_button(Button::new("Website", "https://example.com")?)?;
    Ok(activity)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let client_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());

    let client = Client::builder(client_id).build(PipeTransport::new());
    let handle = client.handle();
    let mut events = handle.subscribe();
    let engine = tokio::spawn(client.run());

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                LifecycleEvent::Connected => tracing::info!("Host connected"),
                LifecycleEvent::Disconnected => tracing::warn!("Host disconnected"),
            }
        }
    });

    // Queued until the first connection succeeds, then resubmitted after
    // every reconnect.
    handle.submit_activity(activity()?, |outcome| match outcome {
        Ok(reply) => tracing::info!(%reply, "Activity published"),
        Err(e) => tracing::error!(error = %e, "Activity rejected"),
    });

    tokio::signal::ctrl_c().await?;

    // The clear never completes while the host is away; don't wait forever.
    match tokio::time::timeout(Duration::from_secs(2), handle.clear()).await {
        Ok(Ok(_)) => tracing::info!("Activity cleared"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to clear activity"),
        Err(_) => tracing::warn!("Host did not answer the clear"),
    }
    handle.shutdown();
    engine.await??;
    Ok(())
}
