//! Text grid collaborator.
//!
//! The host never owns the storage engine; it reads and writes cells through
//! [`TextGrid`]. [`ScreenBuffer`] is the in-memory grid used by the binary
//! and by tests.

use super::cell::{Cell, CellAttributes, WidthRole};
use super::geometry::{Point, Size};

/// Storage the cell transfer code reads and writes through
pub trait TextGrid {
    fn dimensions(&self) -> Size;

    /// Cells from `origin` to the end of the grid in row-major order.
    ///
    /// Empty when `origin` is outside the grid.
    fn read_cells(&self, origin: Point) -> Box<dyn Iterator<Item = Cell> + '_>;

    /// Store `cells` starting at `origin`, never past the end of that row.
    ///
    /// Returns how many cells were consumed. The grid keeps full-width
    /// pairs intact: a leading half that lands on the last column, or a
    /// trailing half with no leading partner, is stored as a blank.
    fn write_cells(&mut self, cells: &[Cell], origin: Point) -> usize;

    fn font_is_scalable(&self) -> bool;
}

/// A single row
#[derive(Clone, Debug)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cols: usize) -> Self {
        Self {
            cells: vec![Cell::default(); cols],
        }
    }

    /// Blank any half of a full-width pair that lost its partner.
    fn repair(&mut self, start: usize, end: usize) {
        let last = self.cells.len().saturating_sub(1);
        let lo = start.saturating_sub(1);
        let hi = (end + 1).min(last);

        for col in lo..=hi {
            let orphaned = match self.cells[col].role {
                WidthRole::Single => false,
                WidthRole::Leading => col == last || self.cells[col + 1].role != WidthRole::Trailing,
                WidthRole::Trailing => col == 0 || self.cells[col - 1].role != WidthRole::Leading,
            };
            if orphaned {
                self.cells[col].clear();
            }
        }
    }

    pub fn text(&self) -> String {
        self.cells
            .iter()
            .filter(|c| c.role != WidthRole::Trailing)
            .map(|c| c.glyph)
            .collect()
    }
}

/// In-memory screen buffer
#[derive(Clone, Debug)]
pub struct ScreenBuffer {
    rows: Vec<Row>,
    size: Size,
    scalable_font: bool,
}

impl ScreenBuffer {
    pub fn new(width: i16, height: i16) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            rows: (0..height).map(|_| Row::new(width as usize)).collect(),
            size: Size::new(width, height),
            scalable_font: true,
        }
    }

    /// Switch between a scalable and a raster font.
    pub fn set_scalable_font(&mut self, scalable: bool) {
        self.scalable_font = scalable;
    }

    pub fn row(&self, y: usize) -> Option<&Row> {
        self.rows.get(y)
    }

    pub fn cell(&self, at: Point) -> Option<&Cell> {
        if !self.size.contains(at) {
            return None;
        }
        self.rows[at.y as usize].cells.get(at.x as usize)
    }

    /// Fill the whole grid with blanks of `attributes`.
    pub fn clear(&mut self, attributes: CellAttributes) {
        for row in &mut self.rows {
            row.cells.fill(Cell::blank(attributes));
        }
    }
}

impl TextGrid for ScreenBuffer {
    fn dimensions(&self) -> Size {
        self.size
    }

    fn read_cells(&self, origin: Point) -> Box<dyn Iterator<Item = Cell> + '_> {
        if !self.size.contains(origin) {
            return Box::new(std::iter::empty());
        }
        let (x, y) = (origin.x as usize, origin.y as usize);
        let first = self.rows[y].cells[x..].iter();
        let rest = self.rows[y + 1..].iter().flat_map(|row| row.cells.iter());
        Box::new(first.chain(rest).copied())
    }

    fn write_cells(&mut self, cells: &[Cell], origin: Point) -> usize {
        if !self.size.contains(origin) || cells.is_empty() {
            return 0;
        }
        let row = &mut self.rows[origin.y as usize];
        let start = origin.x as usize;
        let count = cells.len().min(row.cells.len() - start);

        row.cells[start..start + count].copy_from_slice(&cells[..count]);
        row.repair(start, start + count - 1);
        count
    }

    fn font_is_scalable(&self) -> bool {
        self.scalable_font
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(role: WidthRole) -> Cell {
        Cell::new('あ', CellAttributes::DEFAULT_COLORS).with_role(role)
    }

    #[test]
    fn test_read_cells_row_major() {
        let mut grid = ScreenBuffer::new(3, 2);
        grid.write_cells(&[Cell::new('a', CellAttributes::DEFAULT_COLORS)], Point::new(2, 0));
        grid.write_cells(&[Cell::new('b', CellAttributes::DEFAULT_COLORS)], Point::new(0, 1));
        let glyphs: String = grid.read_cells(Point::new(2, 0)).map(|c| c.glyph).collect();
        assert_eq!(glyphs, "ab  ");
        assert_eq!(grid.read_cells(Point::new(3, 0)).count(), 0);
    }

    #[test]
    fn test_write_stops_at_row_end() {
        let mut grid = ScreenBuffer::new(3, 2);
        let cells = vec![Cell::new('x', CellAttributes::DEFAULT_COLORS); 5];
        assert_eq!(grid.write_cells(&cells, Point::new(1, 0)), 2);
        assert_eq!(grid.row(0).unwrap().text(), " xx");
        assert_eq!(grid.row(1).unwrap().text(), "   ");
    }

    #[test]
    fn test_leading_at_last_column_becomes_blank() {
        let mut grid = ScreenBuffer::new(3, 1);
        grid.write_cells(&[wide(WidthRole::Leading)], Point::new(2, 0));
        assert_eq!(grid.cell(Point::new(2, 0)), Some(&Cell::default()));
    }

    #[test]
    fn test_overwriting_half_a_pair() {
        let mut grid = ScreenBuffer::new(4, 1);
        grid.write_cells(&[wide(WidthRole::Leading), wide(WidthRole::Trailing)], Point::new(1, 0));
        assert_eq!(grid.row(0).unwrap().text(), " あ ");

        grid.write_cells(&[Cell::new('z', CellAttributes::DEFAULT_COLORS)], Point::new(2, 0));
        assert_eq!(grid.row(0).unwrap().text(), "  z ");
        assert_eq!(grid.cell(Point::new(1, 0)).unwrap().role, WidthRole::Single);
    }

    #[test]
    fn test_orphan_trailing_becomes_blank() {
        let mut grid = ScreenBuffer::new(4, 1);
        grid.write_cells(&[wide(WidthRole::Trailing)], Point::new(0, 0));
        assert_eq!(grid.cell(Point::new(0, 0)), Some(&Cell::default()));
    }
}
