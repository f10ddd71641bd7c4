//! Batched write queue.
//!
//! All mutations of the `mappings` table flow through a single worker task
//! as [`WriteOp`] values. The worker accumulates operations and commits
//! them in one transaction per batch; callers never wait for the disk.
//! A lost batch costs nothing but reference hints, so individual operation
//! failures are logged and skipped.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, Transaction};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Queue depth before `save_mapping` starts dropping writes.
pub(crate) const QUEUE_DEPTH: usize = 2000;

/// Commit once this many operations accumulate.
const BATCH_MAX: usize = 100;

/// Commit at least this often while operations are pending.
const BATCH_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

/// A pending database mutation.
pub(crate) enum WriteOp {
    SaveMapping {
        src_platform: String,
        src_msg: String,
        dst_platform: String,
        dst_msg: String,
        bridge_id: i64,
        ts: i64,
    },
    PurgeBefore {
        cutoff: i64,
    },
    /// Barrier: commit everything queued ahead of this op, then ack.
    Flush(oneshot::Sender<()>),
}

/// Spawn the single writer task. It exits after a final commit once every
/// sender has been dropped.
pub(crate) fn spawn_writer(
    conn: Arc<Mutex<Connection>>,
    mut rx: mpsc::Receiver<WriteOp>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut batch: Vec<WriteOp> = Vec::with_capacity(BATCH_MAX);
        let mut interval = tokio::time::interval(BATCH_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                op = rx.recv() => match op {
                    Some(WriteOp::Flush(ack)) => {
                        commit(&conn, std::mem::take(&mut batch)).await;
                        let _ = ack.send(());
                    }
                    Some(op) => {
                        batch.push(op);
                        if batch.len() >= BATCH_MAX {
                            commit(&conn, std::mem::take(&mut batch)).await;
                        }
                    }
                    None => {
                        commit(&conn, std::mem::take(&mut batch)).await;
                        break;
                    }
                },
                _ = interval.tick() => {
                    if !batch.is_empty() {
                        commit(&conn, std::mem::take(&mut batch)).await;
                    }
                }
            }
        }
        debug!("store writer stopped");
    })
}

/// Commit a batch in one transaction on the blocking pool.
async fn commit(conn: &Arc<Mutex<Connection>>, batch: Vec<WriteOp>) {
    if batch.is_empty() {
        return;
    }

    let conn = Arc::clone(conn);
    let result = tokio::task::spawn_blocking(move || -> rusqlite::Result<()> {
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        for op in &batch {
            if let Err(e) = apply(&tx, op) {
                warn!(error = %e, "write operation failed");
            }
        }
        tx.commit()
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "committing write batch failed"),
        Err(e) => error!(error = %e, "write batch task failed"),
    }
}

fn apply(tx: &Transaction<'_>, op: &WriteOp) -> rusqlite::Result<()> {
    match op {
        WriteOp::SaveMapping {
            src_platform,
            src_msg,
            dst_platform,
            dst_msg,
            bridge_id,
            ts,
        } => {
            tx.execute(
                "INSERT OR IGNORE INTO mappings
                 (src_platform, src_msg, dst_platform, dst_msg, bridge_id, ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![src_platform, src_msg, dst_platform, dst_msg, bridge_id, ts],
            )?;
        }
        WriteOp::PurgeBefore { cutoff } => {
            let purged = tx.execute("DELETE FROM mappings WHERE ts < ?1", [cutoff])?;
            if purged > 0 {
                debug!(purged, cutoff, "expired mappings purged");
            }
        }
        WriteOp::Flush(_) => {}
    }
    Ok(())
}
