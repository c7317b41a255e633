//! Attached client processes.

use std::collections::BTreeMap;

/// Opaque handle naming one attached client process
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessHandle(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessInfo {
    pub handle: ProcessHandle,
    pub exe_name: String,
}

/// Maps handles to live client processes
pub trait ProcessRegistry {
    fn register(&mut self, exe_name: &str) -> ProcessHandle;

    /// Forget a process; `None` if it was not registered.
    fn unregister(&mut self, handle: ProcessHandle) -> Option<ProcessInfo>;

    fn get(&self, handle: ProcessHandle) -> Option<&ProcessInfo>;

    fn is_alive(&self, handle: ProcessHandle) -> bool {
        self.get(handle).is_some()
    }

    fn handles(&self) -> Vec<ProcessHandle>;
}

/// In-memory process registry
#[derive(Debug, Default)]
pub struct ProcessList {
    next_handle: u32,
    processes: BTreeMap<ProcessHandle, ProcessInfo>,
}

impl ProcessList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl ProcessRegistry for ProcessList {
    fn register(&mut self, exe_name: &str) -> ProcessHandle {
        self.next_handle = self.next_handle.wrapping_add(1);
        while self.processes.contains_key(&ProcessHandle(self.next_handle)) {
            self.next_handle = self.next_handle.wrapping_add(1);
        }
        let handle = ProcessHandle(self.next_handle);
        self.processes.insert(
            handle,
            ProcessInfo {
                handle,
                exe_name: exe_name.to_string(),
            },
        );
        handle
    }

    fn unregister(&mut self, handle: ProcessHandle) -> Option<ProcessInfo> {
        self.processes.remove(&handle)
    }

    fn get(&self, handle: ProcessHandle) -> Option<&ProcessInfo> {
        self.processes.get(&handle)
    }

    fn handles(&self) -> Vec<ProcessHandle> {
        self.processes.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let mut list = ProcessList::new();
        let a = list.register("cmd.exe");
        let b = list.register("pwsh.exe");
        assert_ne!(a, b);
        assert!(list.is_alive(a));
        assert_eq!(list.get(b).map(|p| p.exe_name.as_str()), Some("pwsh.exe"));

        assert_eq!(list.unregister(a).map(|p| p.handle), Some(a));
        assert!(!list.is_alive(a));
        assert!(list.unregister(a).is_none());
        assert_eq!(list.handles(), vec![b]);
    }
}
