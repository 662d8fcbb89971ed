use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ctf_tracker::bootstrap::{self, BootstrapGate};
use ctf_tracker::config::Config;
use ctf_tracker::metrics;
use ctf_tracker::notify::{self, log::LogNotifier, queue::NotificationQueue, traits::Notifier};
use ctf_tracker::platform::rootme::RootMeClient;
use ctf_tracker::platform::source::PlatformSource;
use ctf_tracker::store::Store;
use ctf_tracker::sync::{self, SyncEngine};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    metrics::prometheus::init_metrics_server();

    info!(store = %config.store_path.display(), "ctf-tracker starting");

    let store = Store::open(&config.store_path)?;
    let source: Arc<dyn PlatformSource> = Arc::new(RootMeClient::new(&config)?);
    let queue = NotificationQueue::new();
    let gate = BootstrapGate::new();
    let engine = SyncEngine::new(source.clone(), store.clone(), queue.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let bootstrap_handle = tokio::spawn(bootstrap::run_bootstrap(
        engine.clone(),
        gate.clone(),
        config.bootstrap_threshold,
    ));
    let challenge_handle = tokio::spawn(sync::run_challenge_cycle(
        engine.clone(),
        gate.clone(),
        config.challenge_poll,
    ));
    let user_handle = tokio::spawn(sync::run_user_refresh_cycle(
        engine.clone(),
        gate.clone(),
        config.user_poll,
    ));
    let dispatch_handle = tokio::spawn(notify::run_dispatch_loop(
        gate.clone(),
        queue.clone(),
        notifier,
        config.dispatch_poll,
    ));

    tokio::select! {
        res = bootstrap_handle => report("bootstrap", res),
        res = challenge_handle => report("challenge cycle", res),
        res = user_handle => report("user refresh cycle", res),
        res = dispatch_handle => report("dispatch loop", res),
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}

fn report(task: &str, res: Result<Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => warn!(task, "task exited"),
        Ok(Err(err)) => warn!(task, error = %err, "task returned error"),
        Err(err) => warn!(task, error = %err, "task panicked"),
    }
}
