//! Collaborators the client API layer works against.
//!
//! - **geometry**: points, sizes and inclusive rectangles
//! - **cell**: grid cells, legacy attributes and full-width roles
//! - **grid**: the text grid interface and an in-memory screen buffer
//! - **input**: input events, the input queue interface and its buffer
//! - **process**: attached client processes
//!
//! # Architecture
//!
//! ```text
//! Host
//! ├── TextGrid      (cells read/written by region and by run)
//! ├── InputQueue    (events plus the 8-bit partial-byte carry)
//! └── ProcessRegistry
//! ```

pub mod cell;
pub mod geometry;
pub mod grid;
pub mod input;
pub mod process;

pub use cell::{ByteCell, Cell, CellAttributes, WidthRole};
pub use geometry::{Point, Rect, Size};
pub use grid::{ScreenBuffer, TextGrid};
pub use input::{InputBuffer, InputEvent, InputQueue, KeyEvent};
pub use process::{ProcessHandle, ProcessInfo, ProcessList, ProcessRegistry};
