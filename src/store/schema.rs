//! Schema setup and connection tuning.

use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreResult;

/// Bridge nodes, keyed by endpoint. `id` groups the nodes of one bridge.
const DDL_BRIDGES: &str = "CREATE TABLE IF NOT EXISTS bridges (
    id       INTEGER NOT NULL,
    platform TEXT NOT NULL,
    room     TEXT NOT NULL,
    cfg_json TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (platform, room)
)";

/// Human-readable bridge names.
const DDL_GROUPS: &str = "CREATE TABLE IF NOT EXISTS groups (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL DEFAULT ''
)";

/// Cross-platform message ID translations. The leftmost triple is the
/// primary key, so re-inserting a relay result is a no-op.
const DDL_MAPPINGS: &str = "CREATE TABLE IF NOT EXISTS mappings (
    src_platform TEXT NOT NULL,
    src_msg      TEXT NOT NULL,
    dst_platform TEXT NOT NULL,
    dst_msg      TEXT NOT NULL,
    bridge_id    INTEGER NOT NULL,
    ts           INTEGER NOT NULL,
    PRIMARY KEY (src_platform, src_msg, dst_platform)
)";

const DDL_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_bridge_id ON bridges(id);
CREATE INDEX IF NOT EXISTS idx_mapping_ts ON mappings(ts);
CREATE INDEX IF NOT EXISTS idx_mapping_echo ON mappings(dst_platform, dst_msg);
";

/// Apply pragmas and create tables on a fresh connection.
pub(crate) fn init(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(DDL_BRIDGES, [])?;
    conn.execute(DDL_GROUPS, [])?;
    conn.execute(DDL_MAPPINGS, [])?;
    conn.execute_batch(DDL_INDEXES)?;
    Ok(())
}
