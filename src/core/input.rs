//! Input event queue collaborator.

use std::collections::VecDeque;

use super::geometry::Size;

/// Keyboard event. `ch` holds a UTF-16 unit, or a codepage byte in the low
/// eight bits when it comes from an 8-bit client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_down: bool,
    pub repeat_count: u16,
    pub virtual_key_code: u16,
    pub virtual_scan_code: u16,
    pub ch: u16,
    pub control_key_state: u32,
}

impl KeyEvent {
    /// Key-down event typing `ch`
    pub fn typed(ch: u16) -> Self {
        Self {
            key_down: true,
            repeat_count: 1,
            ch,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Focus(bool),
    WindowResize(Size),
}

impl InputEvent {
    pub fn key(&self) -> Option<&KeyEvent> {
        match self {
            InputEvent::Key(key) => Some(key),
            _ => None,
        }
    }
}

/// Storage for pending input events
pub trait InputQueue {
    /// Append (or prepend) events; returns how many were accepted.
    fn enqueue(&mut self, events: Vec<InputEvent>, at_front: bool) -> usize;

    /// Remove (or with `peek`, copy) up to `count` events from the front.
    fn read(&mut self, count: usize, peek: bool) -> Vec<InputEvent>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_partial_byte_carry(&self) -> bool;

    fn take_partial_byte_carry(&mut self) -> Option<InputEvent>;

    fn store_partial_byte_carry(&mut self, event: InputEvent);
}

/// In-memory input queue
#[derive(Debug, Default)]
pub struct InputBuffer {
    events: VecDeque<InputEvent>,
    carry: Option<InputEvent>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush(&mut self) {
        self.events.clear();
        self.carry = None;
    }
}

impl InputQueue for InputBuffer {
    fn enqueue(&mut self, events: Vec<InputEvent>, at_front: bool) -> usize {
        let count = events.len();
        if at_front {
            for event in events.into_iter().rev() {
                self.events.push_front(event);
            }
        } else {
            self.events.extend(events);
        }
        count
    }

    fn read(&mut self, count: usize, peek: bool) -> Vec<InputEvent> {
        let count = count.min(self.events.len());
        if peek {
            self.events.iter().take(count).copied().collect()
        } else {
            self.events.drain(..count).collect()
        }
    }

    fn len(&self) -> usize {
        self.events.len()
    }

    fn has_partial_byte_carry(&self) -> bool {
        self.carry.is_some()
    }

    fn take_partial_byte_carry(&mut self) -> Option<InputEvent> {
        self.carry.take()
    }

    fn store_partial_byte_carry(&mut self, event: InputEvent) {
        self.carry = Some(event);
    }
}
