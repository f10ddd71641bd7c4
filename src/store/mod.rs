//! Persistent and cached relay state.
//!
//! The store keeps two kinds of state in one SQLite file:
//! - **bridges**: which rooms mirror each other, preloaded into an
//!   in-memory cache at open so the dispatch hot path never hits the disk;
//! - **mappings**: message ID translations between platforms, written
//!   through a batched background queue and read synchronously.
//!
//! Store failures never fail dispatch. A read error degrades to "not
//! found"; a dropped write only costs a reference hint.

mod schema;
mod writer;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::sync::Cache;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::event::{BridgeGroup, Node};
use writer::WriteOp;

/// How often the retention purger wakes up.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// How long a freshly produced destination ID stays in the in-memory echo
/// set. Covers the window where its mapping row is still queued.
const ECHO_TTL: Duration = Duration::from_secs(600);

const ECHO_CAPACITY: u64 = 65_536;

fn cache_key(platform: &str, room: &str) -> String {
    format!("{platform}:{room}")
}

/// Persistent + cached state: bridge groups and message ID mappings.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    cache: RwLock<HashMap<String, Arc<BridgeGroup>>>,
    recent_echo: Cache<(String, String), ()>,
    ops: Mutex<Option<mpsc::Sender<WriteOp>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    purger: Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    /// Open (or create) the database at `path`, preload the bridge cache,
    /// and start the writer and retention tasks.
    ///
    /// Mapping rows older than `retention` are purged periodically. Must be
    /// called within a tokio runtime.
    pub fn open(path: impl AsRef<Path>, retention: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        schema::init(&conn)?;
        let conn = Arc::new(Mutex::new(conn));

        let (ops_tx, ops_rx) = mpsc::channel(writer::QUEUE_DEPTH);
        let writer_handle = writer::spawn_writer(Arc::clone(&conn), ops_rx);
        let purger_handle = spawn_purger(ops_tx.clone(), retention);

        let store = Self {
            conn,
            cache: RwLock::new(HashMap::new()),
            recent_echo: Cache::builder()
                .max_capacity(ECHO_CAPACITY)
                .time_to_live(ECHO_TTL)
                .build(),
            ops: Mutex::new(Some(ops_tx)),
            writer: Mutex::new(Some(writer_handle)),
            purger: Mutex::new(Some(purger_handle)),
        };
        store.preload()?;
        Ok(store)
    }

    /// Scan the bridge table and populate the cache with an entry for every
    /// node.
    fn preload(&self) -> StoreResult<()> {
        let mut groups: HashMap<i64, BridgeGroup> = HashMap::new();
        {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT b.id, b.platform, b.room, b.cfg_json, COALESCE(g.name, '')
                 FROM bridges b LEFT JOIN groups g ON g.id = b.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            for row in rows {
                let (id, platform, room, cfg_json, name) = row?;
                let cfg = if cfg_json.is_empty() {
                    None
                } else {
                    serde_json::from_str(&cfg_json).ok()
                };
                groups
                    .entry(id)
                    .or_insert_with(|| BridgeGroup {
                        id,
                        name,
                        nodes: Vec::new(),
                    })
                    .nodes
                    .push(Node {
                        platform,
                        room,
                        cfg,
                    });
            }
        }

        let count = groups.len();
        let mut cache = self.cache.write();
        for (_, group) in groups {
            let group = Arc::new(group);
            for node in &group.nodes {
                cache.insert(cache_key(&node.platform, &node.room), Arc::clone(&group));
            }
        }
        if count > 0 {
            info!(bridges = count, "bridge cache preloaded");
        }
        Ok(())
    }

    /// Register a new bridge group transactionally and publish it to the
    /// cache before returning.
    pub fn create_bridge(&self, name: &str, nodes: Vec<Node>) -> StoreResult<Arc<BridgeGroup>> {
        if nodes.len() < 2 {
            return Err(StoreError::InvalidBridge(format!(
                "need at least 2 nodes, got {}",
                nodes.len()
            )));
        }
        for (i, a) in nodes.iter().enumerate() {
            if nodes[i + 1..].iter().any(|b| b.platform == a.platform) {
                return Err(StoreError::InvalidBridge(format!(
                    "duplicate platform '{}'",
                    a.platform
                )));
            }
        }
        for node in &nodes {
            if let Some(existing) = self.find_bridge(&node.platform, &node.room) {
                return Err(StoreError::AlreadyBridged {
                    platform: node.platform.clone(),
                    room: node.room.clone(),
                    bridge_id: existing.id,
                });
            }
        }

        let id = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        let group = Arc::new(BridgeGroup {
            id,
            name: name.to_string(),
            nodes,
        });

        // Holding the connection lock across commit + cache publication
        // keeps concurrent creators from observing the gap between them.
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO groups (id, name) VALUES (?1, ?2)",
            params![group.id, group.name],
        )?;
        for node in &group.nodes {
            let cfg_json = match &node.cfg {
                Some(v) => v.to_string(),
                None => String::new(),
            };
            tx.execute(
                "INSERT INTO bridges (id, platform, room, cfg_json) VALUES (?1, ?2, ?3, ?4)",
                params![group.id, node.platform, node.room, cfg_json],
            )?;
        }
        tx.commit()?;

        let mut cache = self.cache.write();
        for node in &group.nodes {
            cache.insert(cache_key(&node.platform, &node.room), Arc::clone(&group));
        }

        info!(
            bridge_id = group.id,
            name = %group.name,
            nodes = group.nodes.len(),
            "bridge created"
        );
        Ok(group)
    }

    /// Hot-path bridge lookup, served entirely from the cache.
    pub fn find_bridge(&self, platform: &str, room: &str) -> Option<Arc<BridgeGroup>> {
        self.cache.read().get(&cache_key(platform, room)).cloned()
    }

    /// Queue a message ID mapping. Non-blocking: a full queue drops the
    /// write. The destination ID is primed into the echo set immediately so
    /// a fast echo cannot outrun the batch commit.
    pub fn save_mapping(
        &self,
        src_platform: &str,
        src_msg: &str,
        dst_platform: &str,
        dst_msg: &str,
        bridge_id: i64,
    ) {
        if dst_msg.is_empty() {
            return;
        }
        self.recent_echo
            .insert((dst_platform.to_string(), dst_msg.to_string()), ());

        let Some(tx) = self.ops.lock().clone() else {
            debug!("store closed, dropping mapping");
            return;
        };
        let op = WriteOp::SaveMapping {
            src_platform: src_platform.to_string(),
            src_msg: src_msg.to_string(),
            dst_platform: dst_platform.to_string(),
            dst_msg: dst_msg.to_string(),
            bridge_id,
            ts: Utc::now().timestamp(),
        };
        match tx.try_send(op) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(src_platform, src_msg, "write queue full, dropping mapping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("store closed, dropping mapping");
            }
        }
    }

    /// Translate a source message ID into `dst_platform`'s ID space.
    pub fn find_mapping(
        &self,
        src_platform: &str,
        src_msg: &str,
        dst_platform: &str,
    ) -> Option<String> {
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT dst_msg FROM mappings
                 WHERE src_platform = ?1 AND src_msg = ?2 AND dst_platform = ?3",
                params![src_platform, src_msg, dst_platform],
                |row| row.get::<_, String>(0),
            )
            .optional();
        match result {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "mapping lookup failed");
                None
            }
        }
    }

    /// True iff `(dst_platform, dst_msg)` appears on the destination side
    /// of any mapping, i.e. the engine itself produced that message.
    pub fn is_echo(&self, dst_platform: &str, dst_msg: &str) -> bool {
        if self
            .recent_echo
            .contains_key(&(dst_platform.to_string(), dst_msg.to_string()))
        {
            return true;
        }
        let conn = self.conn.lock();
        let result = conn
            .query_row(
                "SELECT 1 FROM mappings WHERE dst_platform = ?1 AND dst_msg = ?2 LIMIT 1",
                params![dst_platform, dst_msg],
                |_| Ok(()),
            )
            .optional();
        match result {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(error = %e, "echo lookup failed");
                false
            }
        }
    }

    /// Queue deletion of mapping rows with `ts < cutoff`.
    pub fn purge_before(&self, cutoff: i64) {
        let Some(tx) = self.ops.lock().clone() else {
            return;
        };
        if let Err(e) = tx.try_send(WriteOp::PurgeBefore { cutoff }) {
            warn!(error = %e, "failed to queue retention purge");
        }
    }

    /// Wait until every operation queued so far has been committed.
    pub async fn flush(&self) {
        let Some(tx) = self.ops.lock().clone() else {
            return;
        };
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        if tx.send(WriteOp::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Drain the write queue and stop the background tasks. Idempotent.
    pub async fn close(&self) {
        let purger = self.purger.lock().take();
        if let Some(handle) = purger {
            handle.abort();
            let _ = handle.await;
        }

        // Dropping the last sender lets the writer finish its final batch.
        drop(self.ops.lock().take());

        let writer = self.writer.lock().take();
        if let Some(handle) = writer {
            if let Err(e) = handle.await {
                warn!(error = %e, "store writer did not stop cleanly");
            }
        }
        debug!("store closed");
    }
}

fn spawn_purger(tx: mpsc::Sender<WriteOp>, retention: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let cutoff = Utc::now().timestamp() - retention.as_secs() as i64;
            if tx.send(WriteOp::PurgeBefore { cutoff }).await.is_err() {
                break;
            }
        }
    })
}
