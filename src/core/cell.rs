//! Grid cells as seen by console clients.

use bitflags::bitflags;

bitflags! {
    /// Legacy console character attributes
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CellAttributes: u16 {
        const FOREGROUND_BLUE      = 0x0001;
        const FOREGROUND_GREEN     = 0x0002;
        const FOREGROUND_RED       = 0x0004;
        const FOREGROUND_INTENSITY = 0x0008;
        const BACKGROUND_BLUE      = 0x0010;
        const BACKGROUND_GREEN     = 0x0020;
        const BACKGROUND_RED       = 0x0040;
        const BACKGROUND_INTENSITY = 0x0080;
        const LEADING_BYTE         = 0x0100;
        const TRAILING_BYTE        = 0x0200;
        const GRID_HORIZONTAL      = 0x0400;
        const GRID_LVERTICAL       = 0x0800;
        const GRID_RVERTICAL       = 0x1000;
        const REVERSE_VIDEO        = 0x4000;
        const UNDERSCORE           = 0x8000;
    }
}

impl CellAttributes {
    /// Light grey on black
    pub const DEFAULT_COLORS: Self = Self::FOREGROUND_BLUE
        .union(Self::FOREGROUND_GREEN)
        .union(Self::FOREGROUND_RED);

    const ROLE_MASK: Self = Self::LEADING_BYTE.union(Self::TRAILING_BYTE);

    /// The same attributes with the width-role bits cleared
    pub fn without_role(self) -> Self {
        self.difference(Self::ROLE_MASK)
    }

    /// Role encoded in the leading/trailing bits
    pub fn role(self) -> WidthRole {
        if self.contains(Self::LEADING_BYTE) {
            WidthRole::Leading
        } else if self.contains(Self::TRAILING_BYTE) {
            WidthRole::Trailing
        } else {
            WidthRole::Single
        }
    }
}

/// Which half of a full-width glyph a cell holds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WidthRole {
    #[default]
    Single,
    Leading,
    Trailing,
}

impl WidthRole {
    fn flags(self) -> CellAttributes {
        match self {
            WidthRole::Single => CellAttributes::empty(),
            WidthRole::Leading => CellAttributes::LEADING_BYTE,
            WidthRole::Trailing => CellAttributes::TRAILING_BYTE,
        }
    }
}

/// One grid position in the host's wide representation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub glyph: char,
    /// Colors and line drawing; role bits live in `role`
    pub attributes: CellAttributes,
    pub role: WidthRole,
}

impl Default for Cell {
    fn default() -> Self {
        Self::blank(CellAttributes::DEFAULT_COLORS)
    }
}

impl Cell {
    pub const fn new(glyph: char, attributes: CellAttributes) -> Self {
        Self {
            glyph,
            attributes,
            role: WidthRole::Single,
        }
    }

    pub const fn blank(attributes: CellAttributes) -> Self {
        Self::new(' ', attributes)
    }

    /// Zero-filled cell used to pad a collapsed row
    pub const fn zeroed() -> Self {
        Self::new('\0', CellAttributes::empty())
    }

    pub fn with_role(mut self, role: WidthRole) -> Self {
        self.role = role;
        self
    }

    /// Attributes with the role bits set, as legacy clients see them
    pub fn legacy_attributes(&self) -> CellAttributes {
        self.attributes.without_role() | self.role.flags()
    }

    /// Build a cell from a client's glyph and legacy attributes.
    pub fn from_legacy(glyph: char, attributes: CellAttributes) -> Self {
        Self {
            glyph,
            attributes: attributes.without_role(),
            role: attributes.role(),
        }
    }

    /// Replace with a blank of the same colors
    pub fn clear(&mut self) {
        self.glyph = ' ';
        self.role = WidthRole::Single;
    }
}

/// One grid position projected into an 8-bit codepage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteCell {
    pub byte: u8,
    pub attributes: CellAttributes,
    pub role: WidthRole,
}

impl Default for ByteCell {
    fn default() -> Self {
        Self::new(b' ', CellAttributes::DEFAULT_COLORS)
    }
}

impl ByteCell {
    pub const fn new(byte: u8, attributes: CellAttributes) -> Self {
        Self {
            byte,
            attributes,
            role: WidthRole::Single,
        }
    }

    pub fn with_role(mut self, role: WidthRole) -> Self {
        self.role = role;
        self
    }
}
