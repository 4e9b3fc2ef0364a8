// 导航状态：当前路径、序号表与回退栈。序号只对最近一次列目录有效。
use serde::Serialize;

use crate::error::{AlistError, Result};
use crate::path_utils::normalize_remote;
use crate::types::{Entry, Listing, ServerIdentity};

/// Freshness of the index table relative to the listing TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Never listed in this path context; an implicit list is safe.
    Absent,
    /// Invalidated by descend/ascend/jump/cache-clear. Previously shown
    /// indices must fail with StaleIndex, never resolve against new data.
    Invalidated,
    /// Present but older than its TTL; refresh before resolving.
    Expired,
    Fresh,
}

#[derive(Debug, Clone)]
struct IndexTable {
    entries: Vec<Entry>,
    shown_at: f64,
    ttl_secs: f64,
}

#[derive(Debug, Clone)]
enum Table {
    Absent,
    Invalidated,
    Active(IndexTable),
}

/// One user's navigation state. All methods are called with the per-user
/// session lock held, so they are plain synchronous state transitions;
/// fetching goes through the listing cache in the ops layer.
#[derive(Debug, Clone)]
pub struct NavigatorState {
    server: ServerIdentity,
    current_path: String,
    path_stack: Vec<String>,
    table: Table,
    epoch: u64,
}

/// Snapshot handed to the presentation layer after a list. The epoch
/// identifies which generation of indices the entries belong to; it moves
/// forward on every relist and invalidation.
#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    pub path: String,
    pub entries: Vec<Entry>,
    pub total_entries: usize,
    pub dir_count: usize,
    pub file_count: usize,
    pub stack_depth: usize,
    pub epoch: u64,
    pub from_cache: bool,
}

impl NavigatorState {
    pub fn new(server: ServerIdentity) -> Self {
        Self {
            server,
            current_path: "/".to_string(),
            path_stack: Vec::new(),
            table: Table::Absent,
            epoch: 0,
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn stack_depth(&self) -> usize {
        self.path_stack.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn server(&self) -> &ServerIdentity {
        &self.server
    }

    /// Credentials changed since this state was built: indices, path and
    /// history all belong to the old server and must not survive.
    pub fn ensure_server(&mut self, server: &ServerIdentity) {
        if self.server != *server {
            *self = NavigatorState::new(server.clone());
        }
    }

    pub fn table_status(&self, now: f64) -> TableStatus {
        match &self.table {
            Table::Absent => TableStatus::Absent,
            Table::Invalidated => TableStatus::Invalidated,
            Table::Active(table) => {
                if now - table.shown_at > table.ttl_secs {
                    TableStatus::Expired
                } else {
                    TableStatus::Fresh
                }
            }
        }
    }

    /// Rebuild the index table from a fetched listing. Only the first
    /// `max_display` entries receive numbers; the rest stay reachable by
    /// path. Bumps the epoch: earlier indices are gone.
    pub fn apply_listing(&mut self, listing: &Listing, now: f64, max_display: usize) {
        debug_assert_eq!(listing.normalized_path, self.current_path);
        let entries: Vec<Entry> = listing.entries.iter().take(max_display).cloned().collect();
        self.table = Table::Active(IndexTable {
            entries,
            shown_at: now,
            ttl_secs: listing.ttl_secs,
        });
        self.epoch += 1;
    }

    /// 1-based lookup into the current index table.
    pub fn resolve_index(&self, index: usize) -> Result<Entry> {
        let table = match &self.table {
            Table::Absent => return Err(AlistError::NoActiveListing),
            Table::Invalidated => return Err(AlistError::StaleIndex),
            Table::Active(table) => table,
        };
        if index < 1 || index > table.entries.len() {
            return Err(AlistError::IndexOutOfRange {
                index,
                count: table.entries.len(),
            });
        }
        Ok(table.entries[index - 1].clone())
    }

    pub fn indexed_entries(&self) -> &[Entry] {
        match &self.table {
            Table::Active(table) => &table.entries,
            _ => &[],
        }
    }

    /// Enter a directory entry: the old path goes on the stack and every
    /// previously shown index becomes stale.
    pub fn descend_into(&mut self, entry: &Entry) -> Result<()> {
        if !entry.is_dir {
            return Err(AlistError::NotFound(format!(
                "{} is not a directory",
                entry.name
            )));
        }
        self.path_stack.push(self.current_path.clone());
        self.current_path = normalize_remote(&entry.raw_path);
        self.invalidate_table();
        Ok(())
    }

    /// Pop back to the previous directory ("quit").
    pub fn ascend(&mut self) -> Result<String> {
        let previous = self.path_stack.pop().ok_or(AlistError::AtRoot)?;
        self.current_path = previous.clone();
        self.invalidate_table();
        Ok(previous)
    }

    /// Explicit path jump. The stack is deliberately kept: "quit" still
    /// walks the descent history recorded before the jump. Compatibility
    /// behavior, do not "fix".
    pub fn set_path(&mut self, path: &str) {
        self.current_path = normalize_remote(path);
        self.invalidate_table();
    }

    /// Called when the user clears the cache: shown indices may no longer
    /// match what a refetch would return.
    pub fn invalidate_table(&mut self) {
        if matches!(self.table, Table::Active(_)) || matches!(self.table, Table::Invalidated) {
            self.table = Table::Invalidated;
        }
        self.epoch += 1;
    }
}
