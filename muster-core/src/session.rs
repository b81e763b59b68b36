use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::checksum::SizeAndChecksum;
use crate::error::Result;
use crate::file_registry::{FileInfo, FileRegistry};
use crate::part_tracker::{MismatchPolicy, PartNameAndChecksum, ReplicatedPartTracker, TableId};
use crate::stage_sync::StageSync;
use crate::suffix::SuffixAllocator;

/// Name of the stage after which replicated part ownership is queryable.
pub const PREPARE_STAGE: &str = "prepare";

/// Coordination façade shared by every worker participating in one backup.
/// One session per backup operation; the registries it owns do not outlive
/// it. `wait_for_stage` is the only call that may block.
pub trait BackupCoordination: Send + Sync {
    fn add_file_info(&self, info: FileInfo) -> bool;
    fn update_file_info(&self, key: &SizeAndChecksum, archive_suffix: &str) -> Result<()>;
    fn get_file_info_by_name(&self, file_name: &str) -> Option<FileInfo>;
    fn get_file_info(&self, key: &SizeAndChecksum) -> Option<FileInfo>;
    fn get_file_size_and_checksum(&self, file_name: &str) -> Option<SizeAndChecksum>;
    fn list_files(&self, prefix: &str, terminator: &str) -> Vec<String>;
    fn get_all_file_infos(&self) -> Vec<FileInfo>;

    fn add_replicated_part_names(
        &self,
        host: &str,
        table: &TableId,
        parts: &[PartNameAndChecksum],
        table_zk_path: &str,
    ) -> Result<()>;
    fn has_replicated_part_names(&self, host: &str, table: &TableId) -> bool;
    fn add_replicated_table_data_path(&self, host: &str, table: &TableId, data_path: &str)
        -> Result<()>;
    fn get_replicated_part_names(&self, host: &str, table: &TableId) -> Vec<String>;
    fn get_replicated_table_data_paths(&self, host: &str, table: &TableId) -> Vec<String>;

    fn get_next_archive_suffix(&self) -> String;
    fn get_all_archive_suffixes(&self) -> Vec<String>;

    /// Marks `host` done with `stage`; a non-empty error makes the host's
    /// contribution a failure that propagates to every waiter.
    fn report_stage_complete(&self, host: &str, stage: &str, error: Option<&str>) -> Result<()>;

    /// Blocks until every expected host has reported `stage`, or fails with
    /// a timeout naming the outstanding hosts.
    fn wait_for_stage(&self, stage: &str, expected_hosts: &[String], timeout: Duration)
        -> Result<()>;
}

/// Single-host session. The caller is the only expected host, so stage
/// waits return immediately and completing the prepare stage finalizes
/// part ownership on the spot.
pub struct LocalCoordination {
    files: FileRegistry,
    parts: ReplicatedPartTracker,
    suffixes: SuffixAllocator,
    mismatch_policy: MismatchPolicy,
}

impl LocalCoordination {
    pub fn new() -> Self {
        Self::with_policy(MismatchPolicy::default())
    }

    pub fn with_policy(mismatch_policy: MismatchPolicy) -> Self {
        Self {
            files: FileRegistry::new(),
            parts: ReplicatedPartTracker::new(),
            suffixes: SuffixAllocator::new(),
            mismatch_policy,
        }
    }

    /// Tables dropped by `MismatchPolicy::ExcludeTable` during finalize.
    pub fn excluded_tables(&self) -> Vec<TableId> {
        self.parts.excluded_tables()
    }
}

impl Default for LocalCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupCoordination for LocalCoordination {
    fn add_file_info(&self, info: FileInfo) -> bool {
        self.files.add_file_info(info)
    }

    fn update_file_info(&self, key: &SizeAndChecksum, archive_suffix: &str) -> Result<()> {
        self.files.update_file_info(key, archive_suffix)
    }

    fn get_file_info_by_name(&self, file_name: &str) -> Option<FileInfo> {
        self.files.get_file_info_by_name(file_name)
    }

    fn get_file_info(&self, key: &SizeAndChecksum) -> Option<FileInfo> {
        self.files.get_file_info(key)
    }

    fn get_file_size_and_checksum(&self, file_name: &str) -> Option<SizeAndChecksum> {
        self.files.get_size_and_checksum(file_name)
    }

    fn list_files(&self, prefix: &str, terminator: &str) -> Vec<String> {
        self.files.list_files(prefix, terminator)
    }

    fn get_all_file_infos(&self) -> Vec<FileInfo> {
        self.files.all_file_infos()
    }

    fn add_replicated_part_names(
        &self,
        host: &str,
        table: &TableId,
        parts: &[PartNameAndChecksum],
        table_zk_path: &str,
    ) -> Result<()> {
        self.parts.add_part_names(host, table, parts, table_zk_path)
    }

    fn has_replicated_part_names(&self, host: &str, table: &TableId) -> bool {
        self.parts.has_part_names(host, table)
    }

    fn add_replicated_table_data_path(
        &self,
        host: &str,
        table: &TableId,
        data_path: &str,
    ) -> Result<()> {
        self.parts.add_data_path(host, table, data_path)
    }

    fn get_replicated_part_names(&self, host: &str, table: &TableId) -> Vec<String> {
        self.parts.get_part_names(host, table)
    }

    fn get_replicated_table_data_paths(&self, host: &str, table: &TableId) -> Vec<String> {
        self.parts.get_data_paths(host, table)
    }

    fn get_next_archive_suffix(&self) -> String {
        self.suffixes.next_suffix()
    }

    fn get_all_archive_suffixes(&self) -> Vec<String> {
        self.suffixes.all_issued()
    }

    fn report_stage_complete(&self, host: &str, stage: &str, error: Option<&str>) -> Result<()> {
        debug!(host, stage, error, "stage complete");
        if stage == PREPARE_STAGE && error.is_none() {
            self.parts.finalize(self.mismatch_policy)?;
        }
        Ok(())
    }

    fn wait_for_stage(
        &self,
        _stage: &str,
        _expected_hosts: &[String],
        _timeout: Duration,
    ) -> Result<()> {
        Ok(())
    }
}

/// Multi-host session over shared in-process state: the barrier, fail-fast
/// fan-out, and exactly-once finalize semantics a distributed deployment
/// must provide. The transport that would back this with a coordination
/// service belongs to the orchestration layer.
pub struct DistributedCoordination {
    files: FileRegistry,
    parts: ReplicatedPartTracker,
    suffixes: SuffixAllocator,
    sync: StageSync,
    mismatch_policy: MismatchPolicy,
    /// Finalize runs once; its outcome is replayed to every later waiter.
    finalize_result: Mutex<Option<Result<()>>>,
}

impl DistributedCoordination {
    pub fn new() -> Self {
        Self::with_policy(MismatchPolicy::default())
    }

    pub fn with_policy(mismatch_policy: MismatchPolicy) -> Self {
        Self {
            files: FileRegistry::new(),
            parts: ReplicatedPartTracker::new(),
            suffixes: SuffixAllocator::new(),
            sync: StageSync::new(),
            mismatch_policy,
            finalize_result: Mutex::new(None),
        }
    }

    /// Cancels every outstanding `wait_for_stage` promptly.
    pub fn abort(&self, reason: &str) {
        self.sync.abort(reason);
    }

    /// Tables dropped by `MismatchPolicy::ExcludeTable` during finalize.
    pub fn excluded_tables(&self) -> Vec<TableId> {
        self.parts.excluded_tables()
    }

    fn finalize_once(&self) -> Result<()> {
        let mut slot = self.finalize_result.lock().unwrap();
        slot.get_or_insert_with(|| self.parts.finalize(self.mismatch_policy)).clone()
    }
}

impl Default for DistributedCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupCoordination for DistributedCoordination {
    fn add_file_info(&self, info: FileInfo) -> bool {
        self.files.add_file_info(info)
    }

    fn update_file_info(&self, key: &SizeAndChecksum, archive_suffix: &str) -> Result<()> {
        self.files.update_file_info(key, archive_suffix)
    }

    fn get_file_info_by_name(&self, file_name: &str) -> Option<FileInfo> {
        self.files.get_file_info_by_name(file_name)
    }

    fn get_file_info(&self, key: &SizeAndChecksum) -> Option<FileInfo> {
        self.files.get_file_info(key)
    }

    fn get_file_size_and_checksum(&self, file_name: &str) -> Option<SizeAndChecksum> {
        self.files.get_size_and_checksum(file_name)
    }

    fn list_files(&self, prefix: &str, terminator: &str) -> Vec<String> {
        self.files.list_files(prefix, terminator)
    }

    fn get_all_file_infos(&self) -> Vec<FileInfo> {
        self.files.all_file_infos()
    }

    fn add_replicated_part_names(
        &self,
        host: &str,
        table: &TableId,
        parts: &[PartNameAndChecksum],
        table_zk_path: &str,
    ) -> Result<()> {
        self.parts.add_part_names(host, table, parts, table_zk_path)
    }

    fn has_replicated_part_names(&self, host: &str, table: &TableId) -> bool {
        self.parts.has_part_names(host, table)
    }

    fn add_replicated_table_data_path(
        &self,
        host: &str,
        table: &TableId,
        data_path: &str,
    ) -> Result<()> {
        self.parts.add_data_path(host, table, data_path)
    }

    fn get_replicated_part_names(&self, host: &str, table: &TableId) -> Vec<String> {
        self.parts.get_part_names(host, table)
    }

    fn get_replicated_table_data_paths(&self, host: &str, table: &TableId) -> Vec<String> {
        self.parts.get_data_paths(host, table)
    }

    fn get_next_archive_suffix(&self) -> String {
        self.suffixes.next_suffix()
    }

    fn get_all_archive_suffixes(&self) -> Vec<String> {
        self.suffixes.all_issued()
    }

    fn report_stage_complete(&self, host: &str, stage: &str, error: Option<&str>) -> Result<()> {
        self.sync.report(host, stage, error);
        Ok(())
    }

    fn wait_for_stage(
        &self,
        stage: &str,
        expected_hosts: &[String],
        timeout: Duration,
    ) -> Result<()> {
        self.sync.wait(stage, expected_hosts, timeout)?;
        if stage == PREPARE_STAGE {
            self.finalize_once()?;
        }
        Ok(())
    }
}
