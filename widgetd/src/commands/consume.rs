//! Entrypoint for the widget reconciliation daemon

use crate::logging::LoggingConfig;
use crate::object_store::ObjectStoreConfig;
use anyhow::{bail, Context};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use widgetd_consumer::{
    router::Dispatcher,
    selector::OrderingPolicy,
    sink::{ObjectSink, ObjectStoreTable, TableStore},
    source::ObjectStoreSource,
    Consumer,
};

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// object store options
    #[clap(flatten)]
    object_store_config: ObjectStoreConfig,

    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    /// Source container holding pending change events. Without it there is
    /// nothing to consume and the command exits immediately.
    #[clap(
        long = "read-bucket",
        alias = "read_bucket",
        env = "WIDGETD_READ_BUCKET",
        action
    )]
    read_bucket: Option<String>,

    /// Destination container for mirrored widget records. Absent disables
    /// the object sink.
    #[clap(
        long = "write-bucket",
        alias = "write_bucket",
        env = "WIDGETD_WRITE_BUCKET",
        action
    )]
    write_bucket: Option<String>,

    /// Destination table for flattened widget rows. Absent disables the
    /// table sink.
    #[clap(
        long = "write-table",
        aliases = ["write-database", "write_database"],
        env = "WIDGETD_WRITE_TABLE",
        action
    )]
    write_table: Option<String>,

    /// Alternate message-queue source. Declared but not supported yet;
    /// selecting it fails at startup.
    #[clap(
        long = "read-queue",
        alias = "read_queue",
        env = "WIDGETD_READ_QUEUE",
        action
    )]
    read_queue: Option<String>,

    /// Delay between polling cycles
    #[clap(
        long = "poll-interval",
        env = "WIDGETD_POLL_INTERVAL",
        default_value = "1s",
        action
    )]
    poll_interval: humantime::Duration,

    /// Ordering policy for pending events: "oldest-first" or
    /// "lexicographic-batch"
    #[clap(
        long = "ordering",
        env = "WIDGETD_ORDERING",
        default_value = "oldest-first",
        action
    )]
    ordering: OrderingPolicy,
}

pub(crate) async fn command(config: Config) -> Result<(), anyhow::Error> {
    if let Some(queue) = &config.read_queue {
        // Fail fast instead of silently polling nothing.
        bail!("queue source {queue:?} is not supported yet, use --read-bucket");
    }
    let Some(read_bucket) = &config.read_bucket else {
        info!("no read bucket configured, nothing to consume");
        return Ok(());
    };

    let source = ObjectStoreSource::new(
        config
            .object_store_config
            .make_store(read_bucket)
            .context("cannot open source container")?,
    );

    let object_sink = match &config.write_bucket {
        Some(bucket) => Some(ObjectSink::new(
            config
                .object_store_config
                .make_store(bucket)
                .context("cannot open mirror container")?,
        )),
        None => None,
    };
    let table: Option<Arc<dyn TableStore>> = match &config.write_table {
        Some(table) => Some(Arc::new(ObjectStoreTable::new(
            config
                .object_store_config
                .make_store(table)
                .context("cannot open table container")?,
            table,
        ))),
        None => None,
    };

    info!(
        read_bucket = %read_bucket,
        write_bucket = ?config.write_bucket,
        write_table = ?config.write_table,
        ordering = %config.ordering,
        poll_interval = %config.poll_interval,
        "starting consumer"
    );

    let shutdown = CancellationToken::new();
    let consumer = Consumer::new(
        Arc::new(source),
        Dispatcher::new(object_sink, table),
        config.ordering,
        *config.poll_interval,
        shutdown.clone(),
    );
    let consumer_task = tokio::spawn(consumer.run());

    wait_for_signal().await;
    info!("shutdown requested, finishing in-flight work");
    shutdown.cancel();
    consumer_task.await.context("consumer task panicked")?;

    Ok(())
}

/// Wait for a `SIGTERM` or `SIGINT` to stop the process on UNIX systems
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("failed to register signal handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to register signal handler");

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
    }
}

/// Wait for a `ctrl+c` to stop the process on Windows systems
#[cfg(windows)]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received SIGINT");
}
