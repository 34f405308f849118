//! Tumbling-window lifecycle management.
//!
//! Each window owns an in-memory SQLite database covering the half-open
//! interval `[start, start + duration)`, where `start` is wall-clock time
//! truncated to the window duration. At most two windows are retained:
//! the current one and its immediate predecessor, which absorbs
//! late-arriving records during the boundary transition.

use crate::fluxsql::sql::error::{SqlError, SqlResult};
use crate::fluxsql::sql::execution::planner::STATIC_SCHEMA;
use crate::fluxsql::sql::execution::types::IndexKey;
use crate::fluxsql::sql::translator::{quote_ident, quote_literal};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum number of windows retained (current + predecessor).
const MAX_WINDOWS: usize = 2;

/// A database file ATTACHed to every window under a schema prefix.
#[derive(Debug, Clone)]
pub struct AttachInfo {
    pub schema: String,
    pub path: PathBuf,
}

/// A time-partitioned in-memory SQLite database.
pub struct Window {
    conn: Connection,
    start: SystemTime,
    end: SystemTime,
    /// table → set of probe keys whose matching indexed rows are present
    materialized_keys: HashMap<String, HashSet<IndexKey>>,
}

impl Window {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn start(&self) -> SystemTime {
        self.start
    }

    pub fn end(&self) -> SystemTime {
        self.end
    }

    /// True when the matching rows for this table/key pair are already in
    /// this window's database.
    pub fn has_key(&self, table: &str, key: &IndexKey) -> bool {
        self.materialized_keys
            .get(table)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Record that the matching rows for this table/key pair have been
    /// inserted.
    pub fn mark_key(&mut self, table: &str, key: IndexKey) {
        self.materialized_keys
            .entry(table.to_string())
            .or_default()
            .insert(key);
    }
}

/// Owns the sequence of tumbling windows and their attachments.
pub struct WindowManager {
    duration: Duration,
    /// URI of the shared static database, when any full-scan source exists
    static_db_uri: Option<String>,
    attachments: Vec<AttachInfo>,
    windows: Mutex<Vec<Window>>,
}

/// Guard handed out by [`WindowManager::current`]; dereferences to the
/// current window while holding the manager's lock.
pub struct WindowGuard<'a> {
    guard: MutexGuard<'a, Vec<Window>>,
}

impl Deref for WindowGuard<'_> {
    type Target = Window;

    fn deref(&self) -> &Window {
        self.guard.last().expect("window set is never empty here")
    }
}

impl DerefMut for WindowGuard<'_> {
    fn deref_mut(&mut self) -> &mut Window {
        self.guard
            .last_mut()
            .expect("window set is never empty here")
    }
}

impl WindowManager {
    pub fn new(
        duration: Duration,
        static_db_uri: Option<String>,
        attachments: Vec<AttachInfo>,
    ) -> Self {
        Self {
            duration,
            static_db_uri,
            attachments,
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Return the window for the current wall-clock instant, creating it
    /// and evicting the oldest beyond the retention limit when the clock
    /// has crossed a window boundary.
    pub fn current(&self) -> SqlResult<WindowGuard<'_>> {
        let mut windows = self.windows.lock().unwrap();

        let start = truncate_to_window(SystemTime::now(), self.duration)?;
        let matches = windows
            .last()
            .map(|w| w.start == start)
            .unwrap_or(false);

        if !matches {
            let window = self.create_window(start)?;
            windows.push(window);
            while windows.len() > MAX_WINDOWS {
                let old = windows.remove(0);
                debug!(
                    "evicting window starting {}",
                    format_instant(old.start)
                );
            }
        }

        Ok(WindowGuard { guard: windows })
    }

    fn create_window(&self, start: SystemTime) -> SqlResult<Window> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SqlError::window_error(format!("open window database: {}", e))
        })?;

        if let Some(uri) = &self.static_db_uri {
            conn.execute(
                &format!(
                    "ATTACH DATABASE {} AS {}",
                    quote_literal(uri),
                    quote_ident(STATIC_SCHEMA)
                ),
                [],
            )
            .map_err(|e| SqlError::window_error(format!("attach static database: {}", e)))?;
        }

        for attach in &self.attachments {
            conn.execute(
                &format!(
                    "ATTACH DATABASE {} AS {}",
                    quote_literal(&attach.path.to_string_lossy()),
                    quote_ident(&attach.schema)
                ),
                [],
            )
            .map_err(|e| {
                SqlError::window_error(format!("attach '{}': {}", attach.schema, e))
            })?;
        }

        info!("opened window starting {}", format_instant(start));
        Ok(Window {
            conn,
            start,
            end: start + self.duration,
            materialized_keys: HashMap::new(),
        })
    }

    /// Number of windows currently open.
    pub fn open_windows(&self) -> usize {
        self.windows.lock().unwrap().len()
    }

    /// Close every open window's database.
    pub fn close(&self) {
        let mut windows = self.windows.lock().unwrap();
        windows.clear();
    }
}

/// Truncate an instant to the enclosing window start:
/// `floor(t / duration) * duration` over the Unix epoch.
fn truncate_to_window(at: SystemTime, duration: Duration) -> SqlResult<SystemTime> {
    if duration.is_zero() {
        return Err(SqlError::window_error("window duration must be non-zero"));
    }
    let since_epoch = at
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SqlError::window_error(format!("system clock before epoch: {}", e)))?;
    let nanos = since_epoch.as_nanos();
    let step = duration.as_nanos();
    let truncated = nanos - (nanos % step);
    Ok(UNIX_EPOCH + Duration::from_nanos(truncated as u64))
}

fn format_instant(at: SystemTime) -> String {
    DateTime::<Utc>::from(at).to_rfc3339()
}
