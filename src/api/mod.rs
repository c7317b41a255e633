//! Client API dispatcher.
//!
//! [`Host`] is the public surface console clients call into. All host state
//! (aliases, history, the grid, the input queue, parked waiters) lives in one
//! [`HostState`] behind a single lock; every call takes the lock once and
//! runs to completion or parks a waiter before releasing it.
//!
//! Calls ending in `_a` are 8-bit adapters: they convert their arguments
//! through the input or output codepage, call the wide logic, and convert
//! the results back.

pub mod two_phase;
pub mod wait;

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::alias::{AliasStore, Expansion};
use crate::codepage;
use crate::config::Config;
use crate::core::{
    ByteCell, Cell, CellAttributes, InputBuffer, InputEvent, InputQueue, KeyEvent, Point, ProcessHandle,
    ProcessList, ProcessRegistry, Rect, ScreenBuffer, Size, TextGrid,
};
use crate::error::{ApiError, Result};
use crate::history::{HistoryInfo, HistoryPool, SearchDirection, MAX_HISTORY_SETTING};
use crate::transfer;

pub use wait::{Completion, ReadData, ReadOutcome, WaitId, WaitOutcome, WaitQueue, WaitReason, Waiter};

/// Everything the host lock protects
pub struct HostState {
    aliases: AliasStore,
    history: HistoryPool,
    grid: Box<dyn TextGrid + Send>,
    input: Box<dyn InputQueue + Send>,
    processes: Box<dyn ProcessRegistry + Send>,
    waiters: WaitQueue,
    input_codepage: u32,
    output_codepage: u32,
    /// Converted bytes that did not fit a previous 8-bit text read
    pending_bytes: HashMap<ProcessHandle, Vec<u8>>,
    /// Byte events split off a double-byte key that did not fit a previous
    /// 8-bit event read
    cached_events: HashMap<ProcessHandle, Vec<InputEvent>>,
}

fn unit_to_char(unit: u16) -> char {
    char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn char_to_unit(ch: char) -> u16 {
    let mut units = [0u16; 2];
    ch.encode_utf16(&mut units)[0]
}

impl HostState {
    fn check_process(&self, process: ProcessHandle) -> Result<()> {
        if self.processes.is_alive(process) {
            Ok(())
        } else {
            Err(ApiError::InvalidArgument)
        }
    }

    /// Split a wide key event into one event per codepage byte.
    fn key_to_bytes(&self, event: InputEvent) -> Result<Vec<InputEvent>> {
        let InputEvent::Key(key) = event else {
            return Ok(vec![event]);
        };
        if key.ch == 0 {
            return Ok(vec![event]);
        }
        let bytes = codepage::char_to_bytes(self.input_codepage, unit_to_char(key.ch))?;
        Ok(bytes
            .into_iter()
            .map(|byte| InputEvent::Key(KeyEvent { ch: byte as u16, ..key }))
            .collect())
    }

    /// Raw event read; `None` when there is nothing to return yet.
    pub(crate) fn try_read_input(
        &mut self,
        process: ProcessHandle,
        count: usize,
        peek: bool,
        unicode: bool,
    ) -> Result<Option<ReadData>> {
        self.check_process(process)?;
        if count == 0 {
            return Ok(Some(ReadData::Events(Vec::new())));
        }
        let mut events = Vec::with_capacity(count);
        if let Some(cached) = self.cached_events.get_mut(&process) {
            let take = cached.len().min(count);
            if peek {
                events.extend_from_slice(&cached[..take]);
            } else {
                events.extend(cached.drain(..take));
                if cached.is_empty() {
                    self.cached_events.remove(&process);
                }
            }
        }
        if events.len() == count {
            return Ok(Some(ReadData::Events(events)));
        }
        if events.is_empty() && self.input.is_empty() {
            return Ok(None);
        }

        let candidates = self.input.read(count - events.len(), true);
        let mut consumed = 0;
        for event in candidates {
            let converted = if unicode {
                vec![event]
            } else {
                self.key_to_bytes(event)?
            };
            let room = count - events.len();
            if converted.len() > room {
                // A double-byte character split across reads: the bytes that
                // do not fit are served first by the next read.
                if room > 0 && !peek {
                    let mut bytes = converted.into_iter();
                    events.extend(bytes.by_ref().take(room));
                    self.cached_events.entry(process).or_default().extend(bytes);
                    consumed += 1;
                } else if room > 0 {
                    events.extend(converted.into_iter().take(room));
                }
                break;
            }
            events.extend(converted);
            consumed += 1;
        }

        if !peek {
            self.input.read(consumed, false);
        }
        Ok(Some(ReadData::Events(events)))
    }

    /// Character read from key-down events; `None` when nothing was typed.
    pub(crate) fn try_read_text(&mut self, process: ProcessHandle, count: usize, unicode: bool) -> Result<Option<ReadData>> {
        self.check_process(process)?;
        if count == 0 {
            return Ok(Some(if unicode {
                ReadData::Text(String::new())
            } else {
                ReadData::Bytes(Vec::new())
            }));
        }

        if unicode {
            let mut units = Vec::with_capacity(count);
            while units.len() < count {
                let Some(event) = self.input.read(1, false).pop() else { break };
                if let Some(key) = event.key().filter(|k| k.key_down && k.ch != 0) {
                    units.push(key.ch);
                }
            }
            if units.is_empty() {
                return Ok(None);
            }
            return Ok(Some(ReadData::Text(String::from_utf16_lossy(&units))));
        }

        let mut bytes = Vec::with_capacity(count);
        if let Some(pending) = self.pending_bytes.get_mut(&process) {
            let take = pending.len().min(count);
            bytes.extend(pending.drain(..take));
            if pending.is_empty() {
                self.pending_bytes.remove(&process);
            }
        }

        while bytes.len() < count {
            let Some(event) = self.input.read(1, false).pop() else { break };
            let Some(key) = event.key().filter(|k| k.key_down && k.ch != 0) else {
                continue;
            };
            let encoded = codepage::char_to_bytes(self.input_codepage, unit_to_char(key.ch))?;
            let room = count - bytes.len();
            if encoded.len() > room {
                bytes.extend_from_slice(&encoded[..room]);
                self.pending_bytes.entry(process).or_default().extend_from_slice(&encoded[room..]);
            } else {
                bytes.extend(encoded);
            }
        }

        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(ReadData::Bytes(bytes)))
    }

    /// Convert 8-bit key events to wide ones, pairing double-byte sequences.
    fn widen_input(&mut self, events: Vec<InputEvent>) -> Result<Vec<InputEvent>> {
        let cp = self.input_codepage;
        if !codepage::is_supported(cp) {
            return Err(ApiError::InvalidArgument);
        }

        let mut lead = match self.input.take_partial_byte_carry() {
            Some(InputEvent::Key(key)) => Some(key),
            _ => None,
        };
        let mut out = Vec::with_capacity(events.len());

        for event in events {
            let InputEvent::Key(key) = event else {
                out.push(event);
                continue;
            };
            let byte = key.ch as u8;
            if let Some(first) = lead.take() {
                let ch = codepage::bytes_to_char(cp, &[first.ch as u8, byte])?;
                out.push(InputEvent::Key(KeyEvent {
                    ch: char_to_unit(ch),
                    ..first
                }));
                continue;
            }
            if codepage::is_lead_byte(cp, byte) {
                lead = Some(key);
                continue;
            }
            let ch = codepage::bytes_to_char(cp, &[byte])?;
            out.push(InputEvent::Key(KeyEvent {
                ch: char_to_unit(ch),
                ..key
            }));
        }

        if let Some(first) = lead {
            tracing::trace!("carrying lead byte {:#04x}", first.ch);
            self.input.store_partial_byte_carry(InputEvent::Key(first));
        }
        Ok(out)
    }

    fn expunge_history(&mut self, exe_name: &str) {
        if let Some(record) = self.history.find_by_exe_name(exe_name) {
            record.empty();
        }
    }

    fn set_number_of_commands(&mut self, commands: usize, exe_name: &str) -> Result<()> {
        if commands > MAX_HISTORY_SETTING {
            return Err(ApiError::InvalidArgument);
        }
        self.history.realloc_to_front(exe_name, commands);
        Ok(())
    }

    fn history_commands(&mut self, exe_name: &str) -> Vec<String> {
        self.history
            .find_by_exe_name(exe_name)
            .map(|record| record.commands().to_vec())
            .unwrap_or_default()
    }
}

/// The console host's client API
pub struct Host {
    state: Mutex<HostState>,
}

impl Host {
    pub fn new(
        grid: Box<dyn TextGrid + Send>,
        input: Box<dyn InputQueue + Send>,
        processes: Box<dyn ProcessRegistry + Send>,
        history: HistoryInfo,
    ) -> Self {
        Self {
            state: Mutex::new(HostState {
                aliases: AliasStore::new(),
                history: HistoryPool::new(history),
                grid,
                input,
                processes,
                waiters: WaitQueue::new(),
                input_codepage: codepage::CP_UTF8,
                output_codepage: codepage::CP_UTF8,
                pending_bytes: HashMap::new(),
                cached_events: HashMap::new(),
            }),
        }
    }

    /// Build a host with in-memory collaborators from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut grid = ScreenBuffer::new(config.screen.width, config.screen.height);
        grid.set_scalable_font(config.screen.scalable_font);

        let info = config.history.info();
        if info.buffer_size > MAX_HISTORY_SETTING || info.buffer_count > MAX_HISTORY_SETTING {
            return Err(ApiError::InvalidArgument);
        }

        let host = Self::new(
            Box::new(grid),
            Box::new(InputBuffer::new()),
            Box::new(ProcessList::new()),
            info,
        );
        host.set_input_codepage(config.codepage)?;
        host.set_output_codepage(config.output_codepage)?;
        for alias in &config.aliases {
            host.add_alias_w(&alias.source, &alias.target, &alias.exe)?;
        }
        Ok(host)
    }

    // Codepages

    pub fn input_codepage(&self) -> u32 {
        self.state.lock().input_codepage
    }

    pub fn set_input_codepage(&self, cp: u32) -> Result<()> {
        if !codepage::is_supported(cp) {
            return Err(ApiError::InvalidArgument);
        }
        self.state.lock().input_codepage = cp;
        Ok(())
    }

    pub fn output_codepage(&self) -> u32 {
        self.state.lock().output_codepage
    }

    pub fn set_output_codepage(&self, cp: u32) -> Result<()> {
        if !codepage::is_supported(cp) {
            return Err(ApiError::InvalidArgument);
        }
        self.state.lock().output_codepage = cp;
        Ok(())
    }

    // Processes

    /// Attach a client process and give it a history record.
    pub fn connect_process(&self, exe_name: &str) -> ProcessHandle {
        let mut state = self.state.lock();
        let handle = state.processes.register(exe_name);
        if state.history.allocate(exe_name, handle).is_none() {
            tracing::warn!("no history record available for {}", exe_name);
        }
        tracing::info!("process {:?} ({}) connected", handle, exe_name);
        handle
    }

    /// Detach a client process, cancelling its parked reads.
    pub fn disconnect_process(&self, process: ProcessHandle) -> Vec<Completion> {
        let mut state = self.state.lock();
        let parked = state.waiters.take_for(process);
        let completions = wait::resume(&mut state, parked, WaitReason::ProcessExited);
        state.history.free(process);
        state.pending_bytes.remove(&process);
        state.cached_events.remove(&process);
        if let Some(info) = state.processes.unregister(process) {
            tracing::info!("process {:?} ({}) disconnected", process, info.exe_name);
        }
        completions
    }

    pub fn process_exe_name(&self, process: ProcessHandle) -> Option<String> {
        self.state.lock().processes.get(process).map(|info| info.exe_name.clone())
    }

    // Aliases

    pub fn add_alias_w(&self, source: &str, target: &str, exe_name: &str) -> Result<()> {
        self.state.lock().aliases.set(exe_name, source, target)
    }

    pub fn add_alias_a(&self, source: &[u8], target: &[u8], exe_name: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let cp = state.input_codepage;
        state.aliases.set_a(cp, exe_name, source, target)
    }

    /// Target of one alias as `target\0`.
    pub fn get_alias_w(&self, source: &str, exe_name: &str, buffer: &mut [u16]) -> Result<usize> {
        let state = self.state.lock();
        let target = state.aliases.get(exe_name, source)?;
        two_phase::copy_out(&two_phase::wide_records([target]), buffer)
    }

    pub fn get_alias_a(&self, source: &[u8], exe_name: &[u8], buffer: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();
        let cp = state.input_codepage;
        let source = codepage::to_wide(cp, source)?;
        let exe_name = codepage::to_wide(cp, exe_name)?;
        let target = state.aliases.get(&exe_name, &source)?;
        two_phase::copy_out(&two_phase::byte_records(cp, [target])?, buffer)
    }

    fn alias_records(state: &HostState, exe_name: &str) -> Vec<String> {
        state
            .aliases
            .aliases(exe_name)
            .map(|(source, target)| format!("{}={}", source, target))
            .collect()
    }

    pub fn get_aliases_length_w(&self, exe_name: &str) -> Result<usize> {
        let state = self.state.lock();
        let records = Self::alias_records(&state, exe_name);
        two_phase::wide_len(records.iter().map(String::as_str))
    }

    pub fn get_aliases_length_a(&self, exe_name: &[u8]) -> Result<usize> {
        let state = self.state.lock();
        let cp = state.input_codepage;
        let records = Self::alias_records(&state, &codepage::to_wide(cp, exe_name)?);
        two_phase::byte_len(cp, records.iter().map(String::as_str))
    }

    /// All aliases of `exe_name` as `source=target\0` records.
    pub fn get_aliases_w(&self, exe_name: &str, buffer: &mut [u16]) -> Result<usize> {
        let state = self.state.lock();
        let records = Self::alias_records(&state, exe_name);
        two_phase::copy_out(&two_phase::wide_records(records.iter().map(String::as_str)), buffer)
    }

    pub fn get_aliases_a(&self, exe_name: &[u8], buffer: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();
        let cp = state.input_codepage;
        let records = Self::alias_records(&state, &codepage::to_wide(cp, exe_name)?);
        two_phase::copy_out(&two_phase::byte_records(cp, records.iter().map(String::as_str))?, buffer)
    }

    pub fn get_alias_exes_length_w(&self) -> Result<usize> {
        two_phase::wide_len(self.state.lock().aliases.exe_names())
    }

    pub fn get_alias_exes_length_a(&self) -> Result<usize> {
        let state = self.state.lock();
        two_phase::byte_len(state.input_codepage, state.aliases.exe_names())
    }

    /// Every executable with an alias table as `name\0` records.
    pub fn get_alias_exes_w(&self, buffer: &mut [u16]) -> Result<usize> {
        let state = self.state.lock();
        two_phase::copy_out(&two_phase::wide_records(state.aliases.exe_names()), buffer)
    }

    pub fn get_alias_exes_a(&self, buffer: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();
        let records = two_phase::byte_records(state.input_codepage, state.aliases.exe_names())?;
        two_phase::copy_out(&records, buffer)
    }

    pub fn expand_alias_w(&self, source_text: &str, exe_name: &str) -> Result<Expansion> {
        self.state.lock().aliases.expand(source_text, exe_name)
    }

    pub fn expand_alias_a(&self, source_text: &[u8], exe_name: &[u8]) -> Result<(Vec<u8>, usize)> {
        let state = self.state.lock();
        state.aliases.expand_a(state.input_codepage, source_text, exe_name)
    }

    pub fn clear_aliases(&self, exe_name: &str) {
        self.state.lock().aliases.clear_namespace(exe_name);
    }

    // Command history

    pub fn history_info(&self) -> HistoryInfo {
        self.state.lock().history.info()
    }

    pub fn set_history_info(&self, info: HistoryInfo) -> Result<()> {
        self.state.lock().history.set_info(info)
    }

    /// Record a finished input line in the process's history.
    pub fn add_history(&self, process: ProcessHandle, command: &str) -> Result<()> {
        let mut state = self.state.lock();
        let suppress = state.history.info().no_duplicates;
        let record = state.history.find(process).ok_or(ApiError::NotFound)?;
        record.add(command, suppress)
    }

    /// Walk the process's history one step.
    pub fn recall_history(&self, process: ProcessHandle, direction: SearchDirection) -> Option<String> {
        let mut state = self.state.lock();
        let record = state.history.find(process)?;
        record.retrieve(direction).map(str::to_string)
    }

    pub fn expunge_command_history_w(&self, exe_name: &str) -> Result<()> {
        self.state.lock().expunge_history(exe_name);
        Ok(())
    }

    pub fn expunge_command_history_a(&self, exe_name: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let exe_name = codepage::to_wide(state.input_codepage, exe_name)?;
        state.expunge_history(&exe_name);
        Ok(())
    }

    pub fn set_number_of_commands_w(&self, commands: usize, exe_name: &str) -> Result<()> {
        self.state.lock().set_number_of_commands(commands, exe_name)
    }

    pub fn set_number_of_commands_a(&self, commands: usize, exe_name: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let exe_name = codepage::to_wide(state.input_codepage, exe_name)?;
        state.set_number_of_commands(commands, &exe_name)
    }

    pub fn get_command_history_length_w(&self, exe_name: &str) -> Result<usize> {
        let commands = self.state.lock().history_commands(exe_name);
        two_phase::wide_len(commands.iter().map(String::as_str))
    }

    pub fn get_command_history_length_a(&self, exe_name: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let cp = state.input_codepage;
        let commands = state.history_commands(&codepage::to_wide(cp, exe_name)?);
        two_phase::byte_len(cp, commands.iter().map(String::as_str))
    }

    /// Commands of `exe_name`, oldest first, as `command\0` records.
    pub fn get_command_history_w(&self, exe_name: &str, buffer: &mut [u16]) -> Result<usize> {
        let commands = self.state.lock().history_commands(exe_name);
        two_phase::copy_out(&two_phase::wide_records(commands.iter().map(String::as_str)), buffer)
    }

    pub fn get_command_history_a(&self, exe_name: &[u8], buffer: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let cp = state.input_codepage;
        let commands = state.history_commands(&codepage::to_wide(cp, exe_name)?);
        two_phase::copy_out(&two_phase::byte_records(cp, commands.iter().map(String::as_str))?, buffer)
    }

    // Screen buffer

    pub fn screen_size(&self) -> Size {
        self.state.lock().grid.dimensions()
    }

    pub fn read_output_w(&self, buffer: &mut [Cell], region: Rect) -> Result<Rect> {
        let state = self.state.lock();
        transfer::read_region(state.grid.as_ref(), buffer, region)
    }

    pub fn read_output_a(&self, buffer: &mut [ByteCell], region: Rect) -> Result<Rect> {
        let state = self.state.lock();
        transfer::read_region_a(state.grid.as_ref(), state.output_codepage, buffer, region)
    }

    pub fn write_output_w(&self, buffer: &[Cell], region: Rect) -> Result<Rect> {
        let mut state = self.state.lock();
        transfer::write_region(state.grid.as_mut(), buffer, region)
    }

    pub fn write_output_a(&self, buffer: &[ByteCell], region: Rect) -> Result<Rect> {
        let mut state = self.state.lock();
        let cp = state.output_codepage;
        transfer::write_region_a(state.grid.as_mut(), cp, buffer, region)
    }

    pub fn read_output_attributes(&self, origin: Point, count: usize) -> Vec<CellAttributes> {
        let state = self.state.lock();
        transfer::read_attributes(state.grid.as_ref(), origin, count)
    }

    pub fn read_output_characters_w(&self, origin: Point, count: usize) -> String {
        let state = self.state.lock();
        transfer::read_characters(state.grid.as_ref(), origin, count)
    }

    pub fn read_output_characters_a(&self, origin: Point, count: usize) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let text = transfer::read_characters(state.grid.as_ref(), origin, count);
        codepage::to_bytes(state.output_codepage, &text)
    }

    pub fn write_output_attributes(&self, origin: Point, attributes: &[CellAttributes]) -> usize {
        let mut state = self.state.lock();
        transfer::write_attributes(state.grid.as_mut(), origin, attributes)
    }

    /// Returns the number of chars written.
    pub fn write_output_characters_w(&self, origin: Point, text: &str) -> usize {
        let mut state = self.state.lock();
        transfer::write_characters(state.grid.as_mut(), origin, text)
    }

    /// Returns the number of bytes written.
    pub fn write_output_characters_a(&self, origin: Point, text: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let cp = state.output_codepage;
        let wide = codepage::to_wide(cp, text)?;
        let written = transfer::write_characters(state.grid.as_mut(), origin, &wide);
        if written == wide.chars().count() {
            return Ok(text.len());
        }
        let prefix: String = wide.chars().take(written).collect();
        codepage::byte_len(cp, &prefix)
    }

    pub fn fill_output_attribute(&self, origin: Point, attribute: CellAttributes, count: usize) -> usize {
        let mut state = self.state.lock();
        transfer::fill_attribute(state.grid.as_mut(), origin, attribute, count)
    }

    pub fn fill_output_character_w(&self, origin: Point, glyph: char, count: usize) -> usize {
        let mut state = self.state.lock();
        transfer::fill_character(state.grid.as_mut(), origin, glyph, count)
    }

    pub fn fill_output_character_a(&self, origin: Point, byte: u8, count: usize) -> Result<usize> {
        let mut state = self.state.lock();
        let glyph = codepage::bytes_to_char(state.output_codepage, &[byte])?;
        Ok(transfer::fill_character(state.grid.as_mut(), origin, glyph, count))
    }

    // Input

    /// Queue wide events. Parked readers are resumed by
    /// [`Host::notify_input_ready`].
    pub fn write_input_w(&self, events: Vec<InputEvent>, at_front: bool) -> Result<usize> {
        Ok(self.state.lock().input.enqueue(events, at_front))
    }

    /// Queue 8-bit events; a trailing lead byte is held until the next call.
    pub fn write_input_a(&self, events: Vec<InputEvent>, at_front: bool) -> Result<usize> {
        let count = events.len();
        let mut state = self.state.lock();
        let wide = state.widen_input(events)?;
        state.input.enqueue(wide, at_front);
        Ok(count)
    }

    pub fn read_input(
        &self,
        process: ProcessHandle,
        count: usize,
        peek: bool,
        wait_allowed: bool,
        unicode: bool,
    ) -> Result<ReadOutcome> {
        let mut state = self.state.lock();
        match state.try_read_input(process, count, peek, unicode)? {
            Some(data) => Ok(ReadOutcome::Ready(data)),
            None if wait_allowed && !peek => Ok(ReadOutcome::Pending(state.waiters.park(Waiter::DirectRead {
                process,
                count,
                peek,
                unicode,
            }))),
            None => Ok(ReadOutcome::Ready(ReadData::Events(Vec::new()))),
        }
    }

    /// Read typed characters: `count` UTF-16 units, or bytes for 8-bit callers.
    pub fn read_text(&self, process: ProcessHandle, count: usize, unicode: bool) -> Result<ReadOutcome> {
        let mut state = self.state.lock();
        match state.try_read_text(process, count, unicode)? {
            Some(data) => Ok(ReadOutcome::Ready(data)),
            None => Ok(ReadOutcome::Pending(state.waiters.park(Waiter::TextRead {
                process,
                count,
                unicode,
            }))),
        }
    }

    /// Resume parked reads after input arrived.
    pub fn notify_input_ready(&self) -> Vec<Completion> {
        let mut state = self.state.lock();
        let parked = state.waiters.take_all();
        wait::resume(&mut state, parked, WaitReason::DataReady)
    }

    /// Cancel one parked read.
    pub fn cancel_wait(&self, id: WaitId) -> Option<Completion> {
        let mut state = self.state.lock();
        let waiter = state.waiters.take(id)?;
        wait::resume(&mut state, vec![(id, waiter)], WaitReason::Cancelled).pop()
    }

    /// Drop a process's input handle: parked reads end, carried bytes go.
    pub fn close_input_handle(&self, process: ProcessHandle) -> Vec<Completion> {
        let mut state = self.state.lock();
        state.pending_bytes.remove(&process);
        state.cached_events.remove(&process);
        let parked = state.waiters.take_for(process);
        wait::resume(&mut state, parked, WaitReason::HandleClosed)
    }

    pub fn pending_waits(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Host {
        Host::from_config(&Config::default()).unwrap()
    }

    fn typed(text: &str) -> Vec<InputEvent> {
        text.encode_utf16().map(|u| InputEvent::Key(KeyEvent::typed(u))).collect()
    }

    fn typed_bytes(bytes: &[u8]) -> Vec<InputEvent> {
        bytes.iter().map(|&b| InputEvent::Key(KeyEvent::typed(b as u16))).collect()
    }

    #[test]
    fn test_alias_two_phase() {
        let host = host();
        host.add_alias_w("ll", "dir /w", "cmd.exe").unwrap();
        host.add_alias_w("gs", "git status", "cmd.exe").unwrap();

        let needed = host.get_aliases_length_w("cmd.exe").unwrap();
        assert_eq!(host.get_aliases_w("cmd.exe", &mut []), Ok(needed));

        let mut exact = vec![0u16; needed];
        assert_eq!(host.get_aliases_w("cmd.exe", &mut exact), Ok(needed));
        assert_eq!(String::from_utf16_lossy(&exact), "gs=git status\0ll=dir /w\0");

        let mut short = vec![0u16; needed - 1];
        assert_eq!(host.get_aliases_w("cmd.exe", &mut short), Err(ApiError::BufferTooSmall));
        assert!(short.iter().all(|&u| u == 0));
    }

    #[test]
    fn test_get_alias_single() {
        let host = host();
        host.add_alias_a(b"ll", b"dir", b"CMD.EXE").unwrap();
        let mut buffer = [0u8; 4];
        assert_eq!(host.get_alias_a(b"LL", b"cmd.exe", &mut buffer), Ok(4));
        assert_eq!(&buffer, b"dir\0");
        assert_eq!(host.get_alias_w("none", "cmd.exe", &mut []), Err(ApiError::NotFound));
    }

    #[test]
    fn test_alias_exes() {
        let host = host();
        host.add_alias_w("a", "b", "pwsh.exe").unwrap();
        host.add_alias_w("a", "b", "cmd.exe").unwrap();
        let mut buffer = vec![0u8; host.get_alias_exes_length_a().unwrap()];
        host.get_alias_exes_a(&mut buffer).unwrap();
        assert_eq!(buffer, b"cmd.exe\0pwsh.exe\0".to_vec());
    }

    #[test]
    fn test_history_by_exe() {
        let host = host();
        let process = host.connect_process("cmd.exe");
        host.add_history(process, "dir").unwrap();
        host.add_history(process, "cd ..").unwrap();

        let needed = host.get_command_history_length_w("CMD.EXE").unwrap();
        let mut buffer = vec![0u16; needed];
        host.get_command_history_w("cmd.exe", &mut buffer).unwrap();
        assert_eq!(String::from_utf16_lossy(&buffer), "dir\0cd ..\0");

        host.expunge_command_history_a(b"cmd.exe").unwrap();
        assert_eq!(host.get_command_history_length_w("cmd.exe"), Ok(0));
    }

    #[test]
    fn test_history_survives_reconnect() {
        let host = host();
        let first = host.connect_process("cmd.exe");
        host.add_history(first, "echo hi").unwrap();
        host.disconnect_process(first);

        let second = host.connect_process("cmd.exe");
        assert_eq!(
            host.recall_history(second, SearchDirection::Previous),
            Some("echo hi".to_string())
        );
    }

    #[test]
    fn test_set_number_of_commands() {
        let host = host();
        let process = host.connect_process("cmd.exe");
        for cmd in ["1", "2", "3"] {
            host.add_history(process, cmd).unwrap();
        }
        host.set_number_of_commands_w(2, "cmd.exe").unwrap();
        let mut buffer = [0u8; 4];
        host.get_command_history_a(b"cmd.exe", &mut buffer).unwrap();
        assert_eq!(&buffer, b"2\03\0");
        assert_eq!(
            host.set_number_of_commands_w(MAX_HISTORY_SETTING + 1, "cmd.exe"),
            Err(ApiError::InvalidArgument)
        );
    }

    #[test]
    fn test_history_a_adapters_use_input_codepage() {
        let host = host();
        host.set_input_codepage(codepage::CP_JAPANESE).unwrap();
        let process = host.connect_process("あ.exe");
        for cmd in ["1", "2", "3"] {
            host.add_history(process, cmd).unwrap();
        }

        host.set_number_of_commands_a(1, &[0x82, 0xA0, b'.', b'e', b'x', b'e']).unwrap();
        assert_eq!(host.get_command_history_length_w("あ.exe"), Ok(2));
        assert_eq!(
            host.set_number_of_commands_a(MAX_HISTORY_SETTING + 1, b"x.exe"),
            Err(ApiError::InvalidArgument)
        );

        host.expunge_command_history_a(&[0x82, 0xA0, b'.', b'e', b'x', b'e']).unwrap();
        assert_eq!(host.get_command_history_length_w("あ.exe"), Ok(0));
    }

    #[test]
    fn test_text_read_waits_for_input() {
        let host = host();
        let process = host.connect_process("cmd.exe");
        let ReadOutcome::Pending(id) = host.read_text(process, 8, true).unwrap() else {
            panic!("expected a parked read");
        };
        assert!(host.notify_input_ready().is_empty());
        assert_eq!(host.pending_waits(), 1);

        host.write_input_w(typed("hi"), false).unwrap();
        let completions = host.notify_input_ready();
        assert_eq!(
            completions,
            vec![Completion {
                id,
                process,
                outcome: WaitOutcome::Completed(Ok(ReadData::Text("hi".to_string()))),
            }]
        );
        assert_eq!(host.pending_waits(), 0);
    }

    #[test]
    fn test_disconnect_cancels_waiters() {
        let host = host();
        let process = host.connect_process("cmd.exe");
        host.read_input(process, 1, false, true, true).unwrap();
        let completions = host.disconnect_process(process);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].outcome, WaitOutcome::Cancelled(WaitReason::ProcessExited));
        assert_eq!(host.read_input(process, 1, false, true, true), Err(ApiError::InvalidArgument));
    }

    #[test]
    fn test_cancel_wait() {
        let host = host();
        let process = host.connect_process("cmd.exe");
        let ReadOutcome::Pending(id) = host.read_text(process, 1, true).unwrap() else {
            panic!("expected a parked read");
        };
        let completion = host.cancel_wait(id).unwrap();
        assert_eq!(completion.outcome, WaitOutcome::Cancelled(WaitReason::Cancelled));
        assert!(host.cancel_wait(id).is_none());
    }

    #[test]
    fn test_read_input_without_wait() {
        let host = host();
        let process = host.connect_process("cmd.exe");
        assert_eq!(
            host.read_input(process, 4, false, false, true),
            Ok(ReadOutcome::Ready(ReadData::Events(Vec::new())))
        );
        host.write_input_w(typed("ab"), false).unwrap();
        let peeked = host.read_input(process, 4, true, false, true).unwrap();
        assert_eq!(peeked, ReadOutcome::Ready(ReadData::Events(typed("ab"))));
        let read = host.read_input(process, 1, false, false, true).unwrap();
        assert_eq!(read, ReadOutcome::Ready(ReadData::Events(typed("a"))));
    }

    #[test]
    fn test_write_input_a_carries_lead_byte() {
        let host = host();
        host.set_input_codepage(codepage::CP_JAPANESE).unwrap();
        let process = host.connect_process("cmd.exe");

        host.write_input_a(typed_bytes(&[b'x', 0x82]), false).unwrap();
        host.write_input_a(typed_bytes(&[0xA0]), false).unwrap();

        let outcome = host.read_text(process, 8, true).unwrap();
        assert_eq!(outcome, ReadOutcome::Ready(ReadData::Text("xあ".to_string())));
    }

    #[test]
    fn test_read_text_a_keeps_overflow() {
        let host = host();
        host.set_input_codepage(codepage::CP_JAPANESE).unwrap();
        let process = host.connect_process("cmd.exe");
        host.write_input_w(typed("aあ"), false).unwrap();

        let first = host.read_text(process, 2, false).unwrap();
        assert_eq!(first, ReadOutcome::Ready(ReadData::Bytes(vec![b'a', 0x82])));
        let second = host.read_text(process, 2, false).unwrap();
        assert_eq!(second, ReadOutcome::Ready(ReadData::Bytes(vec![0xA0])));
    }

    #[test]
    fn test_read_input_a_splits_double_byte() {
        let host = host();
        host.set_input_codepage(codepage::CP_JAPANESE).unwrap();
        let process = host.connect_process("cmd.exe");
        host.write_input_w(typed("あb"), false).unwrap();

        let outcome = host.read_input(process, 3, false, false, false).unwrap();
        assert_eq!(outcome, ReadOutcome::Ready(ReadData::Events(typed_bytes(&[0x82, 0xA0, b'b']))));
    }

    #[test]
    fn test_read_input_a_caches_trail_byte() {
        let host = host();
        host.set_input_codepage(codepage::CP_JAPANESE).unwrap();
        let process = host.connect_process("cmd.exe");
        host.write_input_w(typed("あ"), false).unwrap();

        let first = host.read_input(process, 1, false, false, false).unwrap();
        assert_eq!(first, ReadOutcome::Ready(ReadData::Events(typed_bytes(&[0x82]))));
        let peeked = host.read_input(process, 1, true, false, false).unwrap();
        assert_eq!(peeked, ReadOutcome::Ready(ReadData::Events(typed_bytes(&[0xA0]))));
        let second = host.read_input(process, 1, false, false, false).unwrap();
        assert_eq!(second, ReadOutcome::Ready(ReadData::Events(typed_bytes(&[0xA0]))));
        let third = host.read_input(process, 1, false, false, false).unwrap();
        assert_eq!(third, ReadOutcome::Ready(ReadData::Events(Vec::new())));
    }

    #[test]
    fn test_cached_bytes_lead_next_read() {
        let host = host();
        host.set_input_codepage(codepage::CP_JAPANESE).unwrap();
        let process = host.connect_process("cmd.exe");
        host.write_input_w(typed("aあb"), false).unwrap();

        let first = host.read_input(process, 2, false, false, false).unwrap();
        assert_eq!(first, ReadOutcome::Ready(ReadData::Events(typed_bytes(&[b'a', 0x82]))));
        let second = host.read_input(process, 4, false, false, false).unwrap();
        assert_eq!(second, ReadOutcome::Ready(ReadData::Events(typed_bytes(&[0xA0, b'b']))));
    }

    #[test]
    fn test_close_input_handle_drops_cached_bytes() {
        let host = host();
        host.set_input_codepage(codepage::CP_JAPANESE).unwrap();
        let process = host.connect_process("cmd.exe");
        host.write_input_w(typed("あ"), false).unwrap();
        host.read_input(process, 1, false, false, false).unwrap();

        host.close_input_handle(process);
        let outcome = host.read_input(process, 1, false, false, false).unwrap();
        assert_eq!(outcome, ReadOutcome::Ready(ReadData::Events(Vec::new())));
    }

    #[test]
    fn test_output_round_trip_a() {
        let host = host();
        host.set_output_codepage(codepage::CP_JAPANESE).unwrap();
        assert_eq!(host.write_output_characters_a(Point::new(0, 0), &[0x82, 0xA0, b'z']), Ok(3));
        assert_eq!(host.read_output_characters_w(Point::new(0, 0), 3), "あz");
        assert_eq!(host.read_output_characters_a(Point::new(0, 0), 3), Ok(vec![0x82, 0xA0, b'z']));
    }

    #[test]
    fn test_unsupported_codepage() {
        let host = host();
        assert_eq!(host.set_input_codepage(12345), Err(ApiError::InvalidArgument));
        assert_eq!(host.input_codepage(), codepage::CP_UTF8);
    }
}
