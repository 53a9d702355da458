//! Write buffer for access log batch inserts
//!
//! The request path only ever `try_send`s into a bounded channel; a single
//! consumer task flushes entries to the database in batches. When every sender
//! is gone the consumer drains what is left and exits, so awaiting its handle
//! after the server stops flushes the tail of the log.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AccessLogEntry, Database};
use crate::config::AccessLogConfig;

/// Sender handle for queueing entries
#[derive(Clone)]
pub struct WriteSender {
    tx: mpsc::Sender<AccessLogEntry>,
}

impl WriteSender {
    pub fn new(tx: mpsc::Sender<AccessLogEntry>) -> Self {
        Self { tx }
    }

    /// Queue an entry without waiting. A full or closed queue drops it.
    pub fn record(&self, entry: AccessLogEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!("Access log queue full, dropping entry for {}", entry.path);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Access log writer stopped, dropping entry");
            }
        }
    }
}

/// Start the write buffer background task.
/// Returns the sender for the request path and the consumer's handle.
pub fn start_write_buffer(db: Arc<Database>, config: &AccessLogConfig) -> (WriteSender, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.queue_capacity);

    let handle = tokio::spawn(write_buffer_task(
        db,
        rx,
        config.batch_size,
        Duration::from_millis(config.flush_interval_ms.max(1)),
    ));

    (WriteSender::new(tx), handle)
}

/// Background task that collects entries and writes them in batches
async fn write_buffer_task(
    db: Arc<Database>,
    mut rx: mpsc::Receiver<AccessLogEntry>,
    batch_size: usize,
    flush_every: Duration,
) {
    let mut buffer: Vec<AccessLogEntry> = Vec::with_capacity(batch_size);
    let mut flush_interval = tokio::time::interval(flush_every);

    info!("Access log writer started (batch_size={}, flush_interval={:?})", batch_size, flush_every);

    loop {
        tokio::select! {
            entry = rx.recv() => {
                match entry {
                    Some(e) => {
                        buffer.push(e);
                        // Flush immediately if batch is full
                        if buffer.len() >= batch_size {
                            flush_batch(&db, &mut buffer).await;
                        }
                    }
                    None => {
                        // Channel closed, flush remaining and exit
                        if !buffer.is_empty() {
                            flush_batch(&db, &mut buffer).await;
                        }
                        info!("Access log writer shutting down");
                        break;
                    }
                }
            }
            // Periodic flush for low-traffic periods
            _ = flush_interval.tick() => {
                if !buffer.is_empty() {
                    flush_batch(&db, &mut buffer).await;
                }
            }
        }
    }
}

/// Flush buffered entries to database in a single transaction
async fn flush_batch(db: &Database, buffer: &mut Vec<AccessLogEntry>) {
    let count = buffer.len();
    debug!("Flushing {} access log entries", count);

    let result = match buffer.as_slice() {
        [single] => db.insert_log(single).await.map(|_| ()),
        entries => db.batch_insert_logs(entries).await,
    };
    if let Err(e) = result {
        // Entries are lost on failure; nobody is waiting on them
        error!("Failed to flush {} access log entries: {}", count, e);
    }

    buffer.clear();
}
