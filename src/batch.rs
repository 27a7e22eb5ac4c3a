//! Buffered, batched appends to the evaluation sheet.
//!
//! A single worker task owns the pending rows. Submitters hand rows over a bounded
//! channel and return as soon as the row is queued. After every accepted row the
//! worker checks the flush thresholds (row count, time since the last flush) and
//! appends the whole buffer in one call when either is crossed.
//!
//! A flush empties the buffer whatever the store answers. Rows of a failed append
//! are dropped, logged and counted in [`WriterStats`]; there is no retry.

use std::mem;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::FlushPolicy;
use crate::error::{BatchError, StoreError};
use crate::store::SheetStore;

pub type Row = Vec<String>;

/// Pending rows plus the thresholds that decide when they go out.
#[derive(Debug)]
pub struct WriteBuffer {
    pending: Vec<Row>,
    last_flush: Instant,
    policy: FlushPolicy,
}

impl WriteBuffer {
    pub fn new(policy: FlushPolicy, now: Instant) -> Self {
        Self {
            pending: Vec::with_capacity(policy.batch_size),
            last_flush: now,
            policy,
        }
    }

    /// Queues a row and reports whether a flush is due.
    pub fn push(&mut self, row: Row, now: Instant) -> bool {
        self.pending.push(row);
        self.should_flush(now)
    }

    pub fn should_flush(&self, now: Instant) -> bool {
        self.pending.len() >= self.policy.batch_size
            || now.saturating_duration_since(self.last_flush) > self.policy.flush_interval
    }

    pub fn take(&mut self) -> Vec<Row> {
        mem::take(&mut self.pending)
    }

    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = now;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub flushes: usize,
    pub failed_flushes: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
}

#[derive(Debug)]
pub struct FlushReport {
    pub rows: usize,
    pub result: Result<(), StoreError>,
}

enum WriteRequest {
    Append(Row),
    Flush(oneshot::Sender<FlushReport>),
    Pending(oneshot::Sender<usize>),
    Shutdown,
}

/// Cloneable handle to the flush worker.
#[derive(Clone)]
pub struct BatchWriter {
    tx: mpsc::Sender<WriteRequest>,
}

/// Owns the worker task; consumed by [`BatchWriterTask::shutdown`].
pub struct BatchWriterTask {
    writer: BatchWriter,
    handle: JoinHandle<WriterStats>,
}

impl BatchWriter {
    pub fn spawn<S: SheetStore>(
        store: S,
        policy: FlushPolicy,
        queue_capacity: usize,
    ) -> BatchWriterTask {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let buffer = WriteBuffer::new(policy, Instant::now());
        let handle = tokio::spawn(run_writer(store, buffer, rx));
        BatchWriterTask {
            writer: BatchWriter { tx },
            handle,
        }
    }

    /// Hands a row to the worker. Returns once the row is queued, not once it is stored.
    pub async fn enqueue(&self, row: Row) -> Result<(), BatchError> {
        self.tx
            .send(WriteRequest::Append(row))
            .await
            .map_err(|_| BatchError::Closed)
    }

    /// Flushes whatever is buffered and reports the store's answer.
    pub async fn flush(&self) -> Result<FlushReport, BatchError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(WriteRequest::Flush(reply))
            .await
            .map_err(|_| BatchError::Closed)?;
        response.await.map_err(|_| BatchError::Closed)
    }

    /// Rows buffered once every earlier request has been handled.
    pub async fn pending(&self) -> Result<usize, BatchError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(WriteRequest::Pending(reply))
            .await
            .map_err(|_| BatchError::Closed)?;
        response.await.map_err(|_| BatchError::Closed)
    }
}

impl BatchWriterTask {
    pub fn writer(&self) -> BatchWriter {
        self.writer.clone()
    }

    /// Flushes the remaining rows and stops the worker. Rows other handles queued
    /// before the worker saw the request are written too; later ones get `Closed`.
    pub async fn shutdown(self) -> Result<WriterStats, BatchError> {
        // A closed channel means the worker already stopped; the join below still reports.
        let _ = self.writer.tx.send(WriteRequest::Shutdown).await;
        self.handle.await.map_err(|_| BatchError::Closed)
    }
}

async fn run_writer<S: SheetStore>(
    store: S,
    mut buffer: WriteBuffer,
    mut rx: mpsc::Receiver<WriteRequest>,
) -> WriterStats {
    let mut stats = WriterStats::default();

    while let Some(request) = rx.recv().await {
        if !handle_request(&store, &mut buffer, &mut stats, request).await {
            break;
        }
    }

    // Requests already queued behind the shutdown are still served; new sends fail.
    rx.close();
    while let Some(request) = rx.recv().await {
        handle_request(&store, &mut buffer, &mut stats, request).await;
    }

    if !buffer.is_empty() {
        flush(&store, &mut buffer, &mut stats).await;
    }
    info!(
        flushes = stats.flushes,
        rows_written = stats.rows_written,
        rows_dropped = stats.rows_dropped,
        "batch writer stopped"
    );
    stats
}

/// Applies one request to the buffer. Returns `false` once shutdown was requested.
async fn handle_request<S: SheetStore>(
    store: &S,
    buffer: &mut WriteBuffer,
    stats: &mut WriterStats,
    request: WriteRequest,
) -> bool {
    match request {
        WriteRequest::Append(row) => {
            if buffer.push(row, Instant::now()) {
                flush(store, buffer, stats).await;
            }
        }
        WriteRequest::Flush(reply) => {
            let report = flush(store, buffer, stats).await;
            let _ = reply.send(report);
        }
        WriteRequest::Pending(reply) => {
            let _ = reply.send(buffer.len());
        }
        WriteRequest::Shutdown => return false,
    }
    true
}

async fn flush<S: SheetStore>(
    store: &S,
    buffer: &mut WriteBuffer,
    stats: &mut WriterStats,
) -> FlushReport {
    let batch = buffer.take();
    let rows = batch.len();
    let result = if batch.is_empty() {
        Ok(())
    } else {
        store.append_rows(&batch).await
    };
    buffer.mark_flushed(Instant::now());

    if rows == 0 {
        return FlushReport { rows, result };
    }
    stats.flushes += 1;
    match &result {
        Ok(()) => {
            stats.rows_written += rows;
            debug!(sheet = store.sheet_name(), rows, "batch appended");
        }
        Err(err) => {
            stats.failed_flushes += 1;
            stats.rows_dropped += rows;
            error!(sheet = store.sheet_name(), rows, error = %err, "batch append failed, rows dropped");
        }
    }
    FlushReport { rows, result }
}
