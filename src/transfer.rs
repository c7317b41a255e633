//! Cell transfer between client buffers and the text grid.
//!
//! Region calls move a rectangle of cells. The caller's buffer is laid out
//! row-major with a stride equal to the requested width; the requested
//! rectangle is clipped to the grid and only the clipped part of the buffer
//! is touched. Run calls read or write a number of cells starting at one
//! position, continuing onto following rows until the end of the grid.
//!
//! 8-bit callers see one byte per cell: a full-width glyph's two cells carry
//! the two bytes of its double-byte encoding.
//!
//! When the grid's font is not scalable, the wide region calls collapse
//! full-width pairs on read and expand full-width glyphs on write.

use std::ops::Range;

use crate::codepage;
use crate::core::{ByteCell, Cell, CellAttributes, Point, Rect, Size, TextGrid, WidthRole};
use crate::error::{self, ApiError, Result};

/// Byte used where a glyph cannot be projected.
const FALLBACK_BYTE: u8 = b'?';

fn clip(bounds: Size, request: Rect) -> Option<Rect> {
    if !request.is_valid() {
        return None;
    }
    let clipped = request.clamp(bounds);
    clipped.is_valid().then_some(clipped)
}

/// Grid origin and buffer range of every clipped row.
fn row_spans(request: Rect, clipped: Rect, buffer_len: usize) -> Result<Vec<(Point, Range<usize>)>> {
    let stride = request.width() as usize;
    let width = clipped.width() as usize;
    let skip = (clipped.left as i32 - request.left as i32) as usize;
    let last_row = (clipped.bottom as i32 - request.top as i32) as usize;

    let needed = error::add(error::add(error::mul(last_row, stride)?, skip)?, width)?;
    if buffer_len < needed {
        tracing::debug!("region buffer holds {} cells, {} needed", buffer_len, needed);
        return Err(ApiError::InvalidArgument);
    }

    let mut spans = Vec::with_capacity(clipped.height() as usize);
    for y in clipped.top..=clipped.bottom {
        let start = (y as i32 - request.top as i32) as usize * stride + skip;
        spans.push((Point::new(clipped.left, y), start..start + width));
    }
    Ok(spans)
}

fn log_clip(request: Rect, clipped: Option<Rect>) {
    match clipped {
        Some(rect) if rect == request => {}
        Some(rect) => tracing::trace!("region {:?} clipped to {:?}", request, rect),
        None => tracing::trace!("region {:?} is outside the grid", request),
    }
}

/// Read `request` into `buffer`; returns the rectangle actually read.
pub fn read_region(grid: &dyn TextGrid, buffer: &mut [Cell], request: Rect) -> Result<Rect> {
    let clipped = clip(grid.dimensions(), request);
    log_clip(request, clipped);
    let Some(clipped) = clipped else {
        return Ok(Rect::empty_at(request.origin()));
    };

    let munge = !grid.font_is_scalable();
    for (origin, range) in row_spans(request, clipped, buffer.len())? {
        let row = &mut buffer[range];
        for (slot, cell) in row.iter_mut().zip(grid.read_cells(origin)) {
            *slot = cell;
        }
        if munge {
            collapse_full_width(row);
        }
    }
    Ok(clipped)
}

/// Write `buffer` into `request`; returns the rectangle actually written.
pub fn write_region(grid: &mut dyn TextGrid, buffer: &[Cell], request: Rect) -> Result<Rect> {
    let clipped = clip(grid.dimensions(), request);
    log_clip(request, clipped);
    let Some(clipped) = clipped else {
        return Ok(Rect::empty_at(request.origin()));
    };

    let spans = row_spans(request, clipped, buffer.len())?;
    let munge = !grid.font_is_scalable();
    for (origin, range) in spans {
        let row = &buffer[range];
        if munge {
            grid.write_cells(&expand_full_width(row), origin);
        } else {
            grid.write_cells(row, origin);
        }
    }
    Ok(clipped)
}

/// 8-bit form of [`read_region`].
pub fn read_region_a(
    grid: &dyn TextGrid,
    codepage: u32,
    buffer: &mut [ByteCell],
    request: Rect,
) -> Result<Rect> {
    let clipped = clip(grid.dimensions(), request);
    log_clip(request, clipped);
    let Some(clipped) = clipped else {
        return Ok(Rect::empty_at(request.origin()));
    };

    let spans = row_spans(request, clipped, buffer.len())?;
    let mut rows = Vec::with_capacity(spans.len());
    for (origin, range) in spans {
        let cells: Vec<Cell> = grid.read_cells(origin).take(range.len()).collect();
        rows.push((range, project_to_bytes(codepage, &cells)?));
    }
    for (range, bytes) in rows {
        buffer[range].copy_from_slice(&bytes);
    }
    Ok(clipped)
}

/// 8-bit form of [`write_region`].
pub fn write_region_a(
    grid: &mut dyn TextGrid,
    codepage: u32,
    buffer: &[ByteCell],
    request: Rect,
) -> Result<Rect> {
    let clipped = clip(grid.dimensions(), request);
    log_clip(request, clipped);
    let Some(clipped) = clipped else {
        return Ok(Rect::empty_at(request.origin()));
    };

    let spans = row_spans(request, clipped, buffer.len())?;
    let mut rows = Vec::with_capacity(spans.len());
    for (origin, range) in spans {
        rows.push((origin, project_from_bytes(codepage, &buffer[range])?));
    }
    for (origin, cells) in rows {
        grid.write_cells(&cells, origin);
    }
    Ok(clipped)
}

/// Project one row of cells to one byte per cell.
pub fn project_to_bytes(codepage: u32, row: &[Cell]) -> Result<Vec<ByteCell>> {
    let mut out = Vec::with_capacity(row.len());
    let mut col = 0;

    while col < row.len() {
        let cell = row[col];
        let attributes = cell.attributes;
        match cell.role {
            WidthRole::Leading if col + 1 < row.len() => {
                let bytes = codepage::char_to_bytes(codepage, cell.glyph)?;
                let lead = bytes.first().copied().unwrap_or(FALLBACK_BYTE);
                let trail = bytes.get(1).copied().unwrap_or(b' ');
                out.push(ByteCell::new(lead, attributes).with_role(WidthRole::Leading));
                out.push(ByteCell::new(trail, row[col + 1].attributes).with_role(WidthRole::Trailing));
                col += 2;
                continue;
            }
            // Half of a pair with no partner in this row.
            WidthRole::Leading | WidthRole::Trailing => out.push(ByteCell::new(b' ', attributes)),
            WidthRole::Single => {
                let bytes = codepage::char_to_bytes(codepage, cell.glyph)?;
                let byte = match bytes.as_slice() {
                    [byte] => *byte,
                    _ => FALLBACK_BYTE,
                };
                out.push(ByteCell::new(byte, attributes));
            }
        }
        col += 1;
    }
    Ok(out)
}

/// Rebuild one row of cells from one byte per cell.
pub fn project_from_bytes(codepage: u32, row: &[ByteCell]) -> Result<Vec<Cell>> {
    let mut out = Vec::with_capacity(row.len());
    let mut col = 0;

    while col < row.len() {
        let byte_cell = row[col];
        let attributes = byte_cell.attributes.without_role();
        if codepage::is_lead_byte(codepage, byte_cell.byte) {
            if col + 1 < row.len() {
                let pair = [byte_cell.byte, row[col + 1].byte];
                let glyph = codepage::bytes_to_char(codepage, &pair)?;
                out.push(Cell::new(glyph, attributes).with_role(WidthRole::Leading));
                out.push(
                    Cell::new(glyph, row[col + 1].attributes.without_role()).with_role(WidthRole::Trailing),
                );
                col += 2;
                continue;
            }
            out.push(Cell::blank(attributes));
        } else {
            let glyph = codepage::bytes_to_char(codepage, &[byte_cell.byte])?;
            out.push(Cell::new(glyph, attributes));
        }
        col += 1;
    }
    Ok(out)
}

/// Drop trailing halves so each full-width glyph takes one cell; the freed
/// tail of the row is zero-filled.
pub fn collapse_full_width(row: &mut [Cell]) {
    let mut write = 0;
    for read in 0..row.len() {
        let mut cell = row[read];
        match cell.role {
            WidthRole::Trailing => continue,
            WidthRole::Leading => cell.role = WidthRole::Single,
            WidthRole::Single => {}
        }
        row[write] = cell;
        write += 1;
    }
    row[write..].fill(Cell::zeroed());
}

/// Split every full-width glyph into a leading and trailing cell, keeping
/// at most `row.len()` cells.
pub fn expand_full_width(row: &[Cell]) -> Vec<Cell> {
    let mut out = Vec::with_capacity(row.len());
    for cell in row {
        if out.len() >= row.len() {
            break;
        }
        if cell.role == WidthRole::Single && codepage::is_full_width(cell.glyph) {
            out.push(cell.with_role(WidthRole::Leading));
            out.push(cell.with_role(WidthRole::Trailing));
        } else {
            out.push(*cell);
        }
    }
    out.truncate(row.len());
    out
}

/// Attributes of `count` cells from `origin`.
///
/// A trailing half at the start or a leading half at the end is reported
/// without its role bits.
pub fn read_attributes(grid: &dyn TextGrid, origin: Point, count: usize) -> Vec<CellAttributes> {
    let cells: Vec<Cell> = grid.read_cells(origin).take(count).collect();
    let last = cells.len().saturating_sub(1);
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let split = (i == 0 && cell.role == WidthRole::Trailing) || (i == last && cell.role == WidthRole::Leading);
            if split {
                cell.attributes.without_role()
            } else {
                cell.legacy_attributes()
            }
        })
        .collect()
}

/// Text of `count` cells from `origin`, one char per glyph.
pub fn read_characters(grid: &dyn TextGrid, origin: Point, count: usize) -> String {
    let cells: Vec<Cell> = grid.read_cells(origin).take(count).collect();
    let last = cells.len().saturating_sub(1);
    let mut text = String::with_capacity(cells.len());
    for (i, cell) in cells.iter().enumerate() {
        match cell.role {
            WidthRole::Trailing if i == 0 => text.push(' '),
            WidthRole::Trailing => {}
            WidthRole::Leading if i == last => text.push(' '),
            _ => text.push(cell.glyph),
        }
    }
    text
}

/// Apply `update` to `count` cells from `origin`, row by row.
fn update_run(grid: &mut dyn TextGrid, origin: Point, count: usize, mut update: impl FnMut(usize, &mut Cell)) -> usize {
    let size = grid.dimensions();
    if !size.contains(origin) {
        return 0;
    }

    let mut done = 0;
    let mut at = origin;
    while done < count && at.y < size.height {
        let room = (size.width - at.x) as usize;
        let mut row: Vec<Cell> = grid.read_cells(at).take(room.min(count - done)).collect();
        for (i, cell) in row.iter_mut().enumerate() {
            update(done + i, cell);
        }
        let written = grid.write_cells(&row, at);
        if written == 0 {
            break;
        }
        done += written;
        at = Point::new(0, at.y + 1);
    }
    done
}

/// Overwrite attributes from `origin`, keeping full-width roles.
pub fn write_attributes(grid: &mut dyn TextGrid, origin: Point, attributes: &[CellAttributes]) -> usize {
    update_run(grid, origin, attributes.len(), |i, cell| {
        cell.attributes = attributes[i].without_role();
    })
}

pub fn fill_attribute(grid: &mut dyn TextGrid, origin: Point, attribute: CellAttributes, count: usize) -> usize {
    update_run(grid, origin, count, |_, cell| {
        cell.attributes = attribute.without_role();
    })
}

/// Store glyphs from `origin` keeping existing attributes; returns
/// `(glyphs consumed, cells written)`.
fn write_glyphs(
    grid: &mut dyn TextGrid,
    origin: Point,
    glyphs: impl Iterator<Item = char>,
    cell_limit: usize,
) -> (usize, usize) {
    let size = grid.dimensions();
    if !size.contains(origin) {
        return (0, 0);
    }

    let mut glyphs = glyphs.peekable();
    let mut consumed = 0;
    let mut cells = 0;
    let mut at = origin;

    while at.y < size.height && cells < cell_limit && glyphs.peek().is_some() {
        let room = (size.width - at.x) as usize;
        let mut row: Vec<Cell> = grid.read_cells(at).take(room).collect();
        let mut col = 0;
        let mut limited = false;

        while col < row.len() {
            let Some(&glyph) = glyphs.peek() else { break };
            let remaining = cell_limit - cells - col;
            if remaining == 0 {
                limited = true;
                break;
            }
            if codepage::is_full_width(glyph) {
                if col + 1 >= row.len() {
                    // Pad the last column and continue on the next row.
                    row[col].clear();
                    col += 1;
                    break;
                }
                if remaining < 2 {
                    limited = true;
                    break;
                }
                row[col] = Cell::new(glyph, row[col].attributes).with_role(WidthRole::Leading);
                row[col + 1] = Cell::new(glyph, row[col + 1].attributes).with_role(WidthRole::Trailing);
                col += 2;
            } else {
                row[col] = Cell::new(glyph, row[col].attributes);
                col += 1;
            }
            glyphs.next();
            consumed += 1;
        }

        cells += grid.write_cells(&row[..col], at);
        if limited {
            break;
        }
        at = Point::new(0, at.y + 1);
    }
    (consumed, cells)
}

/// Write `text` from `origin`; returns the number of chars consumed.
pub fn write_characters(grid: &mut dyn TextGrid, origin: Point, text: &str) -> usize {
    write_glyphs(grid, origin, text.chars(), usize::MAX).0
}

/// Repeat `glyph` over `count` cells; returns the number of cells written.
pub fn fill_character(grid: &mut dyn TextGrid, origin: Point, glyph: char, count: usize) -> usize {
    write_glyphs(grid, origin, std::iter::repeat(glyph), count).1
}
