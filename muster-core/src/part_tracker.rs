use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checksum::Checksum;
use crate::error::{CoordinationError, Result};

/// Identifies a table by database and table name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId {
    pub database: String,
    pub table: String,
}

impl TableId {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self { database: database.into(), table: table.into() }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// A data part as announced by one replica.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PartNameAndChecksum {
    pub part_name: String,
    pub checksum: Checksum,
}

/// What `finalize` does when two replicas claim one part name with
/// different checksums.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Fail the whole backup.
    #[default]
    Abort,
    /// Drop the offending table from ownership and keep going; excluded
    /// tables are reported through `excluded_tables`.
    ExcludeTable,
}

#[derive(Default)]
struct HostEntry {
    /// Set when the host's first `add_part_names` call completes; ownership
    /// tie-breaks run over this sequence, never over map iteration order.
    seq: Option<u64>,
    parts: Vec<PartNameAndChecksum>,
    data_paths: Vec<String>,
    /// Part names this host owns after finalization.
    owned: Vec<String>,
}

#[derive(Default)]
struct TableEntry {
    zk_path: String,
    hosts: BTreeMap<String, HostEntry>,
}

#[derive(Default)]
enum TrackerState {
    #[default]
    Open,
    Finalizing,
    Finalized,
}

#[derive(Default)]
struct TrackerInner {
    state: TrackerState,
    next_seq: u64,
    tables: BTreeMap<TableId, TableEntry>,
    excluded: Vec<TableId>,
}

/// Tracks which data parts each replica has claimed for backup, per table,
/// and resolves claims to a single owning host when finalized. States run
/// `Open` -> `Finalizing` -> `Finalized`; mutation after finalization is a
/// protocol error.
#[derive(Default)]
pub struct ReplicatedPartTracker {
    inner: Mutex<TrackerInner>,
}

/// Resolves one table: first host in registration order wins each part
/// name; a later claim with a matching checksum is a duplicate replica
/// copy, a differing checksum is divergence. Err carries the offending
/// part name.
fn resolve_owners(entry: &TableEntry) -> std::result::Result<BTreeMap<String, Vec<String>>, String> {
    let mut hosts: Vec<(&String, &HostEntry)> =
        entry.hosts.iter().filter(|(_, h)| h.seq.is_some()).collect();
    hosts.sort_by_key(|(_, h)| h.seq);

    let mut claims: HashMap<&str, &Checksum> = HashMap::new();
    let mut owned: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (host, host_entry) in hosts {
        for part in &host_entry.parts {
            match claims.get(part.part_name.as_str()) {
                None => {
                    claims.insert(part.part_name.as_str(), &part.checksum);
                    owned.entry(host.clone()).or_default().push(part.part_name.clone());
                }
                Some(cs) if **cs == part.checksum => {}
                Some(_) => return Err(part.part_name.clone()),
            }
        }
    }
    for parts in owned.values_mut() {
        parts.sort();
    }
    Ok(owned)
}

impl ReplicatedPartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends part claims for `host`. The host's position in the ownership
    /// tie-break is the completion order of its first call here, which this
    /// lock serializes.
    pub fn add_part_names(
        &self,
        host: &str,
        table: &TableId,
        parts: &[PartNameAndChecksum],
        table_zk_path: &str,
    ) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if !matches!(inner.state, TrackerState::Open) {
            return Err(CoordinationError::LateRegistration { table: table.to_string() });
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        let entry = inner.tables.entry(table.clone()).or_default();
        if entry.zk_path.is_empty() {
            entry.zk_path = table_zk_path.to_string();
        }
        let host_entry = entry.hosts.entry(host.to_string()).or_default();
        if host_entry.seq.is_none() {
            host_entry.seq = Some(seq);
        }
        host_entry.parts.extend_from_slice(parts);
        Ok(())
    }

    /// True iff `host` has registered part names for `table`. Data paths
    /// alone do not count as a registration.
    pub fn has_part_names(&self, host: &str, table: &TableId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .and_then(|t| t.hosts.get(host))
            .is_some_and(|h| h.seq.is_some())
    }

    /// Records a data path for the host's contribution to `table`; several
    /// hosts may contribute distinct paths for the same table.
    pub fn add_data_path(&self, host: &str, table: &TableId, data_path: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !matches!(inner.state, TrackerState::Open) {
            return Err(CoordinationError::LateRegistration { table: table.to_string() });
        }
        let entry = inner.tables.entry(table.clone()).or_default();
        let host_entry = entry.hosts.entry(host.to_string()).or_default();
        host_entry.data_paths.push(data_path.to_string());
        Ok(())
    }

    /// Resolves part ownership across hosts. First-claim-wins per part
    /// name; divergent checksums are handled per `policy`. Runs once: a
    /// failed `Abort` finalize leaves the tracker finalized with no
    /// ownership assigned, and repeat calls are no-ops.
    pub fn finalize(&self, policy: MismatchPolicy) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if !matches!(inner.state, TrackerState::Open) {
            return Ok(());
        }
        inner.state = TrackerState::Finalizing;

        let mut resolved = Vec::new();
        let mut excluded = Vec::new();
        for (table_id, entry) in &inner.tables {
            match resolve_owners(entry) {
                Ok(owned) => resolved.push((table_id.clone(), owned)),
                Err(part_name) => match policy {
                    MismatchPolicy::Abort => {
                        inner.state = TrackerState::Finalized;
                        return Err(CoordinationError::PartChecksumMismatch {
                            table: table_id.to_string(),
                            part_name,
                        });
                    }
                    MismatchPolicy::ExcludeTable => {
                        warn!(table = %table_id, part = %part_name,
                            "replica checksums diverge, excluding table from backup");
                        excluded.push(table_id.clone());
                    }
                },
            }
        }
        for (table_id, owned) in resolved {
            if let Some(entry) = inner.tables.get_mut(&table_id) {
                for (host, parts) in owned {
                    if let Some(host_entry) = entry.hosts.get_mut(&host) {
                        host_entry.owned = parts;
                    }
                }
            }
        }
        debug!(tables = inner.tables.len(), excluded = excluded.len(), "part ownership finalized");
        inner.excluded = excluded;
        inner.state = TrackerState::Finalized;
        Ok(())
    }

    /// Part names owned by `host` for `table`. Empty until `finalize` has
    /// assigned ownership.
    pub fn get_part_names(&self, host: &str, table: &TableId) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .and_then(|t| t.hosts.get(host))
            .map(|h| h.owned.clone())
            .unwrap_or_default()
    }

    pub fn get_data_paths(&self, host: &str, table: &TableId) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .and_then(|t| t.hosts.get(host))
            .map(|h| h.data_paths.clone())
            .unwrap_or_default()
    }

    /// The zk-style logical path replicas registered for `table`.
    pub fn get_table_zk_path(&self, table: &TableId) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .filter(|t| !t.zk_path.is_empty())
            .map(|t| t.zk_path.clone())
    }

    /// Tables dropped by `MismatchPolicy::ExcludeTable` during finalize.
    pub fn excluded_tables(&self) -> Vec<TableId> {
        self.inner.lock().unwrap().excluded.clone()
    }
}
