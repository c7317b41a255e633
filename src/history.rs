//! Command history for console clients
//!
//! Every attached client process gets a [`HistoryRecord`] keyed by its
//! executable name. Records live in a host-wide [`HistoryPool`] that keeps
//! them in most-recently-used order. When a process exits its record is only
//! released, so the next process with the same executable name picks its
//! commands back up; under pressure the least recently used free record is
//! recycled for a different executable.

use bitflags::bitflags;

use crate::core::process::ProcessHandle;
use crate::error::{ApiError, Result};

/// Default number of commands kept per record
pub const DEFAULT_BUFFER_SIZE: usize = 25;
/// Default number of records in the pool
pub const DEFAULT_BUFFER_COUNT: usize = 4;
/// Largest accepted value for either history setting
pub const MAX_HISTORY_SETTING: usize = i16::MAX as usize;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct HistoryFlags: u8 {
        /// Owned by a live process
        const ALLOCATED = 0b01;
        /// Next "previous" retrieval shows the cursor entry without moving
        const RESET     = 0b10;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MatchOptions: u8 {
        /// Lengths must be equal, not just a prefix match
        const EXACT_MATCH  = 0b01;
        /// Never consume the reset flag
        const JUST_LOOKING = 0b10;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchDirection {
    Previous,
    Next,
}

/// History settings shared by every record in the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryInfo {
    /// Commands kept per record
    pub buffer_size: usize,
    /// Maximum number of records
    pub buffer_count: usize,
    /// Drop older duplicates when a command is added
    pub no_duplicates: bool,
}

impl Default for HistoryInfo {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_count: DEFAULT_BUFFER_COUNT,
            no_duplicates: false,
        }
    }
}

fn eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Whether `stored` starts with `given` (or equals it, for exact matches),
/// ignoring case.
fn matches_command(stored: &str, given: &str, exact: bool) -> bool {
    let mut stored_chars = stored.chars();
    for g in given.chars() {
        match stored_chars.next() {
            Some(s) if eq_ignore_case(s, g) => {}
            _ => return false,
        }
    }
    !exact || stored_chars.next().is_none()
}

/// Command history of one executable (newest last)
#[derive(Clone, Debug)]
pub struct HistoryRecord {
    app_name: String,
    commands: Vec<String>,
    max_commands: usize,
    last_displayed: Option<usize>,
    flags: HistoryFlags,
    process: Option<ProcessHandle>,
}

impl HistoryRecord {
    fn new(app_name: &str, max_commands: usize, process: ProcessHandle) -> Self {
        Self {
            app_name: app_name.to_string(),
            commands: Vec::new(),
            max_commands,
            last_displayed: None,
            flags: HistoryFlags::ALLOCATED,
            process: Some(process),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn process(&self) -> Option<ProcessHandle> {
        self.process
    }

    pub fn flags(&self) -> HistoryFlags {
        self.flags
    }

    pub fn is_allocated(&self) -> bool {
        self.flags.contains(HistoryFlags::ALLOCATED)
    }

    pub fn max_commands(&self) -> usize {
        self.max_commands
    }

    /// Index of the most recently surfaced command
    pub fn last_displayed(&self) -> Option<usize> {
        self.last_displayed
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// All commands, oldest first
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn nth(&self, index: usize) -> Option<&str> {
        self.commands.get(index).map(String::as_str)
    }

    pub fn last_displayed_command(&self) -> Option<&str> {
        self.last_displayed.and_then(|i| self.nth(i))
    }

    pub fn is_app_name_match(&self, other: &str) -> bool {
        self.app_name.chars().count() == other.chars().count()
            && matches_command(&self.app_name, other, true)
    }

    fn reset(&mut self) {
        self.last_displayed = self.commands.len().checked_sub(1);
        self.flags.insert(HistoryFlags::RESET);
    }

    fn prev(&self, index: Option<usize>) -> Option<usize> {
        match index {
            Some(i) if i > 0 => Some(i - 1),
            _ => self.commands.len().checked_sub(1),
        }
    }

    fn next(&self, index: Option<usize>) -> Option<usize> {
        let i = index.map_or(0, |i| i + 1);
        if i >= self.commands.len() {
            Some(0)
        } else {
            Some(i)
        }
    }

    /// Append a command as the newest entry.
    pub fn add(&mut self, command: &str, suppress_duplicates: bool) -> Result<()> {
        if self.max_commands == 0 {
            return Err(ApiError::OutOfMemory);
        }
        if command.is_empty() {
            return Ok(());
        }

        if self.commands.last().map(String::as_str) != Some(command) {
            let mut reuse = None;
            if suppress_duplicates {
                if let Some(index) =
                    self.find_matching_command(command, self.last_displayed, MatchOptions::EXACT_MATCH)
                {
                    reuse = Some(self.remove(index));
                }
            }

            if self.commands.len() >= self.max_commands {
                self.commands.remove(0);
                // Keep pointing at the same logical command.
                if let Some(i) = self.last_displayed {
                    self.last_displayed = Some(i.saturating_sub(1));
                }
            }

            self.commands.push(match reuse {
                Some(text) if !text.is_empty() => text,
                _ => command.to_string(),
            });

            let cursor_matches = self
                .last_displayed
                .and_then(|i| self.commands.get(i))
                .is_some_and(|c| c == command);
            if !cursor_matches {
                self.reset();
            }
        }

        self.flags.insert(HistoryFlags::RESET);
        Ok(())
    }

    /// Remove and return the command at `index`; empty if out of range.
    pub fn remove(&mut self, index: usize) -> String {
        if index >= self.commands.len() {
            return String::new();
        }

        let removed = self.commands.remove(index);
        match self.last_displayed {
            Some(i) if i == index => self.last_displayed = None,
            Some(i) if i > index => self.last_displayed = Some(i - 1),
            _ => {}
        }
        removed
    }

    /// Move the cursor to `index` and return that command.
    pub fn retrieve_nth(&mut self, index: usize) -> Option<&str> {
        if index >= self.commands.len() {
            return None;
        }
        self.last_displayed = Some(index);
        self.nth(index)
    }

    /// Walk the cursor one step, wrapping around the ends.
    pub fn retrieve(&mut self, direction: SearchDirection) -> Option<&str> {
        if self.commands.is_empty() {
            return None;
        }

        if self.commands.len() == 1 {
            self.last_displayed = Some(0);
        } else {
            match direction {
                SearchDirection::Previous => {
                    // First press after a reset shows the cursor entry itself.
                    if self.flags.contains(HistoryFlags::RESET) {
                        self.flags.remove(HistoryFlags::RESET);
                    } else {
                        self.last_displayed = self.prev(self.last_displayed);
                    }
                }
                SearchDirection::Next => {
                    self.last_displayed = self.next(self.last_displayed);
                }
            }
        }

        let index = self.last_displayed?;
        self.retrieve_nth(index)
    }

    pub fn retrieve_previous(&mut self) -> Option<&str> {
        self.retrieve(SearchDirection::Previous)
    }

    pub fn retrieve_next(&mut self) -> Option<&str> {
        self.retrieve(SearchDirection::Next)
    }

    /// Most recent command, searching backward from `start`, that begins with
    /// `given` (case-insensitive).
    pub fn find_matching_command(
        &mut self,
        given: &str,
        start: Option<usize>,
        options: MatchOptions,
    ) -> Option<usize> {
        if self.commands.is_empty() {
            return None;
        }

        let mut index = start;
        if !options.contains(MatchOptions::JUST_LOOKING) && self.flags.contains(HistoryFlags::RESET) {
            self.flags.remove(HistoryFlags::RESET);
            // No cursor: start from the newest command.
            index = index.or_else(|| self.commands.len().checked_sub(1));
        } else {
            index = self.prev(index);
        }

        if given.is_empty() {
            return index;
        }

        let exact = options.contains(MatchOptions::EXACT_MATCH);
        for _ in 0..self.commands.len() {
            let i = index?;
            if matches_command(self.commands.get(i)?, given, exact) {
                return Some(i);
            }
            index = self.prev(index);
        }
        None
    }

    /// Drop every command.
    pub fn empty(&mut self) {
        self.commands.clear();
        self.last_displayed = None;
        self.flags.insert(HistoryFlags::RESET);
    }

    pub fn at_first_command(&self) -> bool {
        if self.flags.contains(HistoryFlags::RESET) {
            return false;
        }
        let n = self.commands.len();
        let previous = match self.last_displayed {
            Some(i) if i > 0 => Some(i - 1),
            _ => n.checked_sub(1),
        };
        previous == n.checked_sub(1)
    }

    pub fn at_last_command(&self) -> bool {
        self.last_displayed == self.commands.len().checked_sub(1)
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        let n = self.commands.len();
        if a != b && a < n && b < n {
            self.commands.swap(a, b);
        }
    }

    /// Change the capacity, keeping the newest commands.
    fn realloc(&mut self, max_commands: usize) {
        if self.max_commands == max_commands {
            return;
        }
        let excess = self.commands.len().saturating_sub(max_commands);
        self.commands.drain(..excess);
        self.flags.insert(HistoryFlags::RESET);
        self.last_displayed = self.commands.len().checked_sub(1);
        self.max_commands = max_commands;
    }
}

/// Recency-ordered set of history records (front is most recently used)
#[derive(Debug, Default)]
pub struct HistoryPool {
    records: Vec<HistoryRecord>,
    info: HistoryInfo,
}

impl HistoryPool {
    pub fn new(info: HistoryInfo) -> Self {
        Self {
            records: Vec::new(),
            info,
        }
    }

    pub fn info(&self) -> HistoryInfo {
        self.info
    }

    /// Apply new settings; the per-record size is applied to every record.
    pub fn set_info(&mut self, info: HistoryInfo) -> Result<()> {
        if info.buffer_size > MAX_HISTORY_SETTING || info.buffer_count > MAX_HISTORY_SETTING {
            return Err(ApiError::InvalidArgument);
        }
        self.resize_all(info.buffer_size);
        self.info.buffer_count = info.buffer_count;
        self.info.no_duplicates = info.no_duplicates;
        Ok(())
    }

    /// Number of records, allocated or free
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Records in recency order
    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    fn promote(&mut self, index: usize) -> Option<&mut HistoryRecord> {
        let record = self.records.remove(index);
        self.records.insert(0, record);
        self.records.first_mut()
    }

    /// Hand out a record for a newly attached process.
    pub fn allocate(&mut self, app_name: &str, process: ProcessHandle) -> Option<&mut HistoryRecord> {
        if let Some(index) = self.records.iter().position(|h| h.process == Some(process)) {
            return self.promote(index);
        }

        let same_app = self
            .records
            .iter()
            .position(|h| !h.is_allocated() && h.is_app_name_match(app_name));

        if same_app.is_none() && self.records.len() < self.info.buffer_count {
            tracing::debug!("history: new record for {}", app_name);
            self.records
                .insert(0, HistoryRecord::new(app_name, self.info.buffer_size, process));
            return self.records.first_mut();
        }

        let Some(index) = same_app.or_else(|| self.least_recently_used_free()) else {
            tracing::debug!("history: no free record for {}", app_name);
            return None;
        };

        let record = &mut self.records[index];
        if same_app.is_none() {
            tracing::debug!("history: recycling record of {} for {}", record.app_name, app_name);
            record.commands.clear();
            record.last_displayed = None;
            record.app_name = app_name.to_string();
        }
        record.process = Some(process);
        record.flags.insert(HistoryFlags::ALLOCATED);

        self.promote(index)
    }

    /// Oldest free record, preferring one without commands.
    fn least_recently_used_free(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, record) in self.records.iter().enumerate() {
            if record.is_allocated() {
                continue;
            }
            let replace = match best {
                None => true,
                Some(b) => record.commands.is_empty() || !self.records[b].commands.is_empty(),
            };
            if replace {
                best = Some(i);
            }
        }
        best
    }

    pub fn find(&mut self, process: ProcessHandle) -> Option<&mut HistoryRecord> {
        self.records.iter_mut().find(|h| h.process == Some(process))
    }

    /// Allocated record whose executable name matches
    pub fn find_by_exe_name(&mut self, app_name: &str) -> Option<&mut HistoryRecord> {
        self.records
            .iter_mut()
            .find(|h| h.is_allocated() && h.is_app_name_match(app_name))
    }

    /// Release the record of an exiting process; its commands are kept.
    pub fn free(&mut self, process: ProcessHandle) {
        if let Some(record) = self.find(process) {
            tracing::debug!("history: released record of {}", record.app_name);
            record.flags.remove(HistoryFlags::ALLOCATED);
            record.process = None;
        }
    }

    /// Change the per-record capacity everywhere.
    pub fn resize_all(&mut self, commands: usize) {
        if commands > MAX_HISTORY_SETTING {
            tracing::warn!("history: ignoring capacity {}", commands);
            return;
        }
        if commands == self.info.buffer_size && self.records.iter().all(|h| h.max_commands == commands) {
            return;
        }
        self.info.buffer_size = commands;
        for record in &mut self.records {
            record.realloc(commands);
        }
    }

    /// Resize the record of `app_name` and make it most recently used.
    pub fn realloc_to_front(&mut self, app_name: &str, commands: usize) {
        if commands > MAX_HISTORY_SETTING {
            tracing::warn!("history: ignoring capacity {} for {}", commands, app_name);
            return;
        }
        let found = self
            .records
            .iter()
            .position(|h| h.is_allocated() && h.is_app_name_match(app_name));
        if let Some(index) = found {
            self.records[index].realloc(commands);
            self.promote(index);
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(max: usize) -> HistoryRecord {
        HistoryRecord::new("cmd.exe", max, ProcessHandle(1))
    }

    fn pool(size: usize, count: usize) -> HistoryPool {
        HistoryPool::new(HistoryInfo {
            buffer_size: size,
            buffer_count: count,
            no_duplicates: false,
        })
    }

    #[test]
    fn test_add_and_capacity() {
        let mut h = record(3);
        for cmd in ["a", "b", "c", "d"] {
            h.add(cmd, false).unwrap();
        }
        assert_eq!(h.commands(), &["b", "c", "d"]);
        assert_eq!(h.last_displayed(), Some(2));
        assert!(h.flags().contains(HistoryFlags::RESET));
    }

    #[test]
    fn test_add_empty_is_noop() {
        let mut h = record(3);
        h.add("", false).unwrap();
        assert!(h.is_empty());
        assert_eq!(h.last_displayed(), None);
    }

    #[test]
    fn test_zero_capacity_fails() {
        let mut h = record(0);
        assert_eq!(h.add("dir", false), Err(ApiError::OutOfMemory));
    }

    #[test]
    fn test_suppress_duplicates_moves_to_newest() {
        let mut h = record(5);
        for cmd in ["dir", "cd ..", "echo"] {
            h.add(cmd, true).unwrap();
        }
        h.add("DIR", true).unwrap();
        assert_eq!(h.len(), 3);
        assert_eq!(h.commands(), &["cd ..", "echo", "dir"]);
        assert_eq!(h.last_displayed(), Some(2));
    }

    #[test]
    fn test_suppress_duplicates_after_cursor_removed() {
        let mut h = record(5);
        for cmd in ["a", "b", "c"] {
            h.add(cmd, true).unwrap();
        }
        assert_eq!(h.remove(2), "c");
        assert_eq!(h.last_displayed(), None);

        h.add("a", true).unwrap();
        assert_eq!(h.commands(), &["b", "a"]);
        assert_eq!(h.last_displayed(), Some(1));
    }

    #[test]
    fn test_eviction_keeps_cursor_on_same_command() {
        let mut h = record(3);
        for cmd in ["a", "b", "c"] {
            h.add(cmd, false).unwrap();
        }
        assert_eq!(h.retrieve_nth(1), Some("b"));

        h.add("b", false).unwrap();
        assert_eq!(h.commands(), &["b", "c", "b"]);
        assert_eq!(h.last_displayed(), Some(0));
        assert_eq!(h.last_displayed_command(), Some("b"));
    }

    #[test]
    fn test_eviction_pins_cursor_at_oldest() {
        let mut h = record(3);
        for cmd in ["a", "b", "c"] {
            h.add(cmd, false).unwrap();
        }
        assert_eq!(h.retrieve_nth(0), Some("a"));

        h.add("b", false).unwrap();
        assert_eq!(h.commands(), &["b", "c", "b"]);
        assert_eq!(h.last_displayed(), Some(0));
    }

    #[test]
    fn test_without_suppression_keeps_duplicates() {
        let mut h = record(5);
        for cmd in ["dir", "cd ..", "dir"] {
            h.add(cmd, false).unwrap();
        }
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn test_repeated_newest_is_not_added() {
        let mut h = record(5);
        h.add("dir", false).unwrap();
        h.add("dir", false).unwrap();
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn test_remove_adjusts_cursor() {
        let mut h = record(5);
        for cmd in ["a", "b", "c"] {
            h.add(cmd, false).unwrap();
        }
        assert_eq!(h.remove(0), "a");
        assert_eq!(h.last_displayed(), Some(1));
        assert_eq!(h.last_displayed_command(), Some("c"));

        assert_eq!(h.remove(1), "c");
        assert_eq!(h.last_displayed(), None);

        assert_eq!(h.remove(7), "");
    }

    #[test]
    fn test_retrieve_previous_after_reset() {
        let mut h = record(5);
        for cmd in ["a", "b", "c"] {
            h.add(cmd, false).unwrap();
        }
        assert_eq!(h.retrieve_previous(), Some("c"));
        assert_eq!(h.retrieve_previous(), Some("b"));
        assert_eq!(h.retrieve_previous(), Some("a"));
        assert_eq!(h.retrieve_previous(), Some("c"));
        assert_eq!(h.retrieve_next(), Some("a"));
        assert_eq!(h.retrieve_next(), Some("b"));
    }

    #[test]
    fn test_retrieve_single_and_empty() {
        let mut h = record(5);
        assert_eq!(h.retrieve_previous(), None);
        h.add("only", false).unwrap();
        assert_eq!(h.retrieve_next(), Some("only"));
        assert_eq!(h.retrieve_previous(), Some("only"));
    }

    #[test]
    fn test_find_matching_prefix() {
        let mut h = record(5);
        for cmd in ["git status", "ls", "git log"] {
            h.add(cmd, false).unwrap();
        }
        let found = h.find_matching_command("GIT", Some(2), MatchOptions::JUST_LOOKING);
        assert_eq!(found, Some(0));
        let found = h.find_matching_command("git", Some(2), MatchOptions::empty());
        assert_eq!(found, Some(2));
        let found = h.find_matching_command("git", Some(2), MatchOptions::EXACT_MATCH);
        assert_eq!(found, None);
    }

    #[test]
    fn test_swap_and_empty() {
        let mut h = record(5);
        for cmd in ["a", "b"] {
            h.add(cmd, false).unwrap();
        }
        h.swap(0, 1);
        assert_eq!(h.commands(), &["b", "a"]);
        h.swap(0, 9);
        assert_eq!(h.commands(), &["b", "a"]);
        h.empty();
        assert!(h.is_empty());
        assert_eq!(h.last_displayed(), None);
    }

    #[test]
    fn test_at_first_and_last() {
        let mut h = record(5);
        for cmd in ["a", "b", "c"] {
            h.add(cmd, false).unwrap();
        }
        assert!(h.at_last_command());
        assert!(!h.at_first_command());
        h.retrieve_previous();
        h.retrieve_previous();
        h.retrieve_previous();
        assert_eq!(h.last_displayed(), Some(0));
        assert!(h.at_first_command());
    }

    #[test]
    fn test_allocate_prefers_same_name() {
        let mut p = pool(10, 2);
        p.allocate("cmd.exe", ProcessHandle(1)).unwrap().add("dir", false).unwrap();
        p.allocate("pwsh.exe", ProcessHandle(2)).unwrap();
        p.free(ProcessHandle(1));
        p.free(ProcessHandle(2));

        let h = p.allocate("CMD.EXE", ProcessHandle(3)).unwrap();
        assert_eq!(h.app_name(), "cmd.exe");
        assert_eq!(h.commands(), &["dir"]);
        assert_eq!(p.count(), 2);
    }

    #[test]
    fn test_allocate_recycles_lru() {
        let mut p = pool(10, 2);
        p.allocate("a.exe", ProcessHandle(1)).unwrap().add("one", false).unwrap();
        p.allocate("b.exe", ProcessHandle(2)).unwrap().add("two", false).unwrap();
        p.free(ProcessHandle(1));
        p.free(ProcessHandle(2));

        let h = p.allocate("c.exe", ProcessHandle(3)).unwrap();
        assert_eq!(h.app_name(), "c.exe");
        assert!(h.is_empty());
        assert!(p.iter().any(|h| h.app_name() == "b.exe"));
        assert!(!p.iter().any(|h| h.app_name() == "a.exe"));
        assert_eq!(p.iter().next().map(HistoryRecord::app_name), Some("c.exe"));
    }

    #[test]
    fn test_allocate_full_pool() {
        let mut p = pool(10, 1);
        assert!(p.allocate("a.exe", ProcessHandle(1)).is_some());
        assert!(p.allocate("b.exe", ProcessHandle(2)).is_none());
    }

    #[test]
    fn test_find_by_exe_name_skips_free() {
        let mut p = pool(10, 4);
        p.allocate("a.exe", ProcessHandle(1));
        assert!(p.find_by_exe_name("A.EXE").is_some());
        p.free(ProcessHandle(1));
        assert!(p.find_by_exe_name("a.exe").is_none());
        assert!(p.find(ProcessHandle(1)).is_none());
    }

    #[test]
    fn test_resize_all_keeps_newest() {
        let mut p = pool(5, 4);
        let h = p.allocate("a.exe", ProcessHandle(1)).unwrap();
        for cmd in ["1", "2", "3", "4"] {
            h.add(cmd, false).unwrap();
        }
        p.resize_all(2);
        let h = p.find(ProcessHandle(1)).unwrap();
        assert_eq!(h.commands(), &["3", "4"]);
        assert_eq!(h.last_displayed(), Some(1));
        assert_eq!(h.max_commands(), 2);
        assert_eq!(p.info().buffer_size, 2);

        p.resize_all(MAX_HISTORY_SETTING + 1);
        assert_eq!(p.info().buffer_size, 2);
    }

    #[test]
    fn test_realloc_to_front() {
        let mut p = pool(5, 4);
        p.allocate("a.exe", ProcessHandle(1));
        p.allocate("b.exe", ProcessHandle(2));
        p.realloc_to_front("a.exe", 9);
        let first = p.iter().next().unwrap();
        assert_eq!(first.app_name(), "a.exe");
        assert_eq!(first.max_commands(), 9);
    }

    #[test]
    fn test_set_info_validates() {
        let mut p = pool(5, 4);
        let info = HistoryInfo {
            buffer_size: MAX_HISTORY_SETTING + 1,
            ..HistoryInfo::default()
        };
        assert_eq!(p.set_info(info), Err(ApiError::InvalidArgument));
        let info = HistoryInfo {
            buffer_size: 7,
            buffer_count: 2,
            no_duplicates: true,
        };
        p.set_info(info).unwrap();
        assert_eq!(p.info(), info);
    }
}
