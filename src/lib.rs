//! wconhost - the client API layer of a console host
//!
//! Many client processes share one text grid and one input stream through a
//! [`Host`]. On top of plain buffer and input access the host keeps two
//! long-lived conveniences console clients expect: per-executable command
//! aliases and per-executable command history.
//!
//! # Modules
//!
//! - **codepage**: wide text to and from Windows codepages, lead-byte tables
//! - **alias**: alias tables and `$`-macro expansion
//! - **history**: history records and their recency-ordered pool
//! - **transfer**: region and run transfers between client buffers and the grid
//! - **api**: the locked dispatcher, two-phase buffers and parked reads
//! - **core**: grid, input queue and process registry collaborators
//!
//! # Example
//!
//! ```
//! use wconhost::{Config, Host};
//!
//! let host = Host::from_config(&Config::default()).unwrap();
//! host.add_alias_w("ll", "dir /w $*", "cmd.exe").unwrap();
//!
//! let expansion = host.expand_alias_w("ll c:\\", "cmd.exe").unwrap();
//! assert_eq!(expansion.text, "dir /w c:\\\r\n");
//! ```

pub mod alias;
pub mod api;
pub mod codepage;
pub mod config;
pub mod core;
pub mod error;
pub mod history;
pub mod transfer;

pub use alias::{AliasStore, Expansion};
pub use api::{Completion, Host, ReadData, ReadOutcome, WaitId, WaitOutcome, WaitReason};
pub use config::Config;
pub use error::{ApiError, Result};
pub use history::{HistoryInfo, HistoryPool, HistoryRecord, SearchDirection};
