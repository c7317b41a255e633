//! Per-executable command aliases and macro expansion.
//!
//! Aliases are grouped by the executable that owns them. Both the executable
//! name and the alias source are matched case-insensitively; the target text
//! keeps whatever case it was set with.
//!
//! # Macro syntax
//!
//! A target may contain `$` escapes, each consuming exactly one following
//! character:
//!
//! | Escape | Expansion |
//! |--------|-----------|
//! | `$1`..`$9` | positional argument |
//! | `$*` | everything after the alias name, original spacing kept |
//! | `$L` `$G` `$B` | `<` `>` `|` |
//! | `$T` | line separator (starts another command) |
//! | `$$` | `$` |
//!
//! Anything else after `$` is emitted untouched, `$` included.

use std::collections::BTreeMap;

use crate::codepage;
use crate::error::{ApiError, Result};

/// Line separator emitted by `$T` and after every expansion.
pub const LINE_SEPARATOR: &str = "\r\n";

/// Alias name plus at most nine positional arguments.
const MAX_TOKENS: usize = 10;

/// Result of a successful alias expansion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expansion {
    /// Expanded text, always ending with [`LINE_SEPARATOR`]
    pub text: String,
    /// Number of logical command lines in `text`
    pub lines: usize,
}

/// Alias tables for every executable known to the host
#[derive(Debug, Default)]
pub struct AliasStore {
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

pub(crate) fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

impl AliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add, replace or (with an empty `target`) delete an alias.
    pub fn set(&mut self, exe_name: &str, source: &str, target: &str) -> Result<()> {
        if source.is_empty() {
            return Err(ApiError::InvalidArgument);
        }

        let exe_key = fold_case(exe_name);
        let source_key = fold_case(source);

        if target.is_empty() {
            if let Some(namespace) = self.namespaces.get_mut(&exe_key) {
                if namespace.remove(&source_key).is_some() {
                    tracing::debug!("alias {}:{} removed", exe_key, source_key);
                }
            }
        } else {
            tracing::debug!("alias {}:{} set", exe_key, source_key);
            self.namespaces
                .entry(exe_key)
                .or_default()
                .insert(source_key, target.to_string());
        }
        Ok(())
    }

    /// 8-bit form of [`AliasStore::set`].
    pub fn set_a(&mut self, codepage: u32, exe_name: &[u8], source: &[u8], target: &[u8]) -> Result<()> {
        let exe_name = codepage::to_wide(codepage, exe_name)?;
        let source = codepage::to_wide(codepage, source)?;
        let target = codepage::to_wide(codepage, target)?;
        self.set(&exe_name, &source, &target)
    }

    /// Target text stored for `source`.
    pub fn get(&self, exe_name: &str, source: &str) -> Result<&str> {
        let namespace = self
            .namespaces
            .get(&fold_case(exe_name))
            .ok_or(ApiError::NotFound)?;
        let target = namespace.get(&fold_case(source)).ok_or(ApiError::NotFound)?;
        if target.is_empty() {
            return Err(ApiError::NotFound);
        }
        Ok(target)
    }

    /// All `(source, target)` pairs for one executable, sorted by source.
    pub fn aliases<'a>(&'a self, exe_name: &str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.namespaces
            .get(&fold_case(exe_name))
            .into_iter()
            .flat_map(|namespace| namespace.iter().map(|(s, t)| (s.as_str(), t.as_str())))
    }

    /// Every executable name that has (or had) an alias table.
    pub fn exe_names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Drop all aliases of one executable, keeping its (empty) table.
    pub fn clear_namespace(&mut self, exe_name: &str) {
        if let Some(namespace) = self.namespaces.get_mut(&fold_case(exe_name)) {
            namespace.clear();
        }
    }

    pub fn clear(&mut self) {
        self.namespaces.clear();
    }

    /// Expand `source_text` if its first token names an alias of `exe_name`.
    pub fn expand(&self, source_text: &str, exe_name: &str) -> Result<Expansion> {
        let namespace = self
            .namespaces
            .get(&fold_case(exe_name))
            .ok_or(ApiError::NotFound)?;
        if namespace.is_empty() {
            return Err(ApiError::NotFound);
        }

        let args = tokenize(source_text);
        let &(name_start, name_end) = args.first().ok_or(ApiError::NotFound)?;
        let target = namespace
            .get(&fold_case(&source_text[name_start..name_end]))
            .ok_or(ApiError::NotFound)?;
        if target.is_empty() {
            return Err(ApiError::NotFound);
        }

        let mut text = String::with_capacity(target.len() + source_text.len());
        let mut lines = 0;
        let mut chars = target.chars();

        while let Some(ch) = chars.next() {
            if ch != '$' {
                text.push(ch);
                continue;
            }
            let Some(escaped) = chars.next() else {
                text.push('$');
                break;
            };

            match escaped.to_ascii_lowercase() {
                digit @ '1'..='9' => {
                    let index = digit as usize - '0' as usize;
                    if let Some(&(start, end)) = args.get(index) {
                        text.push_str(&source_text[start..end]);
                    }
                }
                '*' => {
                    if let Some(&(start, _)) = args.get(1) {
                        text.push_str(&source_text[start..]);
                    }
                }
                'l' => text.push('<'),
                'g' => text.push('>'),
                'b' => text.push('|'),
                't' => {
                    text.push_str(LINE_SEPARATOR);
                    lines += 1;
                }
                // Legacy: a doubled dollar collapses to one.
                '$' => text.push('$'),
                _ => {
                    text.push('$');
                    text.push(escaped);
                }
            }
        }

        text.push_str(LINE_SEPARATOR);
        lines += 1;

        Ok(Expansion { text, lines })
    }

    /// 8-bit form of [`AliasStore::expand`]; the expansion is returned as
    /// bytes in `codepage`.
    pub fn expand_a(&self, codepage: u32, source_text: &[u8], exe_name: &[u8]) -> Result<(Vec<u8>, usize)> {
        let source_text = codepage::to_wide(codepage, source_text)?;
        let exe_name = codepage::to_wide(codepage, exe_name)?;
        let expansion = self.expand(&source_text, &exe_name)?;
        Ok((codepage::to_bytes(codepage, &expansion.text)?, expansion.lines))
    }
}

/// Byte ranges of up to [`MAX_TOKENS`] space-separated tokens.
///
/// Tokenizing stops at the first empty token, so text with a leading space
/// has no alias name at all.
fn tokenize(text: &str) -> Vec<(usize, usize)> {
    let mut tokens = Vec::with_capacity(MAX_TOKENS);
    let mut start = 0;

    while start < text.len() {
        let end = text[start..].find(' ').map_or(text.len(), |i| start + i);
        if end == start {
            break;
        }
        tokens.push((start, end));
        if tokens.len() >= MAX_TOKENS {
            break;
        }
        match text[end..].find(|c: char| c != ' ') {
            Some(offset) => start = end + offset,
            None => break,
        }
    }
    tokens
}
