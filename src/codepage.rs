//! Codepage conversion between the host's wide text and client 8-bit text.
//!
//! The host stores text as Unicode. Clients using the 8-bit ("A") entry
//! points pick a Windows codepage; everything they send or receive passes
//! through here. Double-byte codepages are detected through a lead-byte
//! table per codepage, the same way the console's `CPINFO` describes them.

use encoding_rs::{Encoding, EncoderResult};
use unicode_width::UnicodeWidthChar;

use crate::error::{ApiError, Result};

pub const CP_OEM_US: u32 = 437;
pub const CP_UTF8: u32 = 65001;
pub const CP_JAPANESE: u32 = 932;
pub const CP_CHINESE_SIMPLIFIED: u32 = 936;
pub const CP_KOREAN: u32 = 949;
pub const CP_CHINESE_TRADITIONAL: u32 = 950;

/// Byte emitted for characters the target codepage cannot represent.
const DEFAULT_CHAR: u8 = b'?';

/// Inclusive lead-byte ranges. Each table ends with a `(0, 0)` entry.
const LEAD_BYTES_932: &[(u8, u8)] = &[(0x81, 0x9F), (0xE0, 0xFC), (0, 0)];
const LEAD_BYTES_DBCS: &[(u8, u8)] = &[(0x81, 0xFE), (0, 0)];
const LEAD_BYTES_NONE: &[(u8, u8)] = &[(0, 0)];

/// OEM 437 glyphs for bytes `0x80..=0xFF`. The low half is ASCII.
const OEM_437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];

/// How a codepage is converted
#[derive(Clone, Copy)]
enum Codec {
    Table(&'static Encoding),
    /// Single-byte OEM table `encoding_rs` does not carry
    Oem437,
}

fn oem_437_char(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        OEM_437_HIGH[(byte - 0x80) as usize]
    }
}

fn oem_437_byte(ch: char) -> u8 {
    if ch.is_ascii() {
        return ch as u8;
    }
    OEM_437_HIGH
        .iter()
        .position(|&c| c == ch)
        .map_or(DEFAULT_CHAR, |i| 0x80 + i as u8)
}

fn codec_for(codepage: u32) -> Result<Codec> {
    if codepage == CP_OEM_US {
        return Ok(Codec::Oem437);
    }
    let encoding = match codepage {
        CP_UTF8 => encoding_rs::UTF_8,
        CP_JAPANESE => encoding_rs::SHIFT_JIS,
        CP_CHINESE_SIMPLIFIED => encoding_rs::GBK,
        CP_KOREAN => encoding_rs::EUC_KR,
        CP_CHINESE_TRADITIONAL => encoding_rs::BIG5,
        866 => encoding_rs::IBM866,
        874 => encoding_rs::WINDOWS_874,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1252 | 28591 => encoding_rs::WINDOWS_1252,
        1253 => encoding_rs::WINDOWS_1253,
        1254 | 28599 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        20866 => encoding_rs::KOI8_R,
        21866 => encoding_rs::KOI8_U,
        28592 => encoding_rs::ISO_8859_2,
        28593 => encoding_rs::ISO_8859_3,
        28594 => encoding_rs::ISO_8859_4,
        28595 => encoding_rs::ISO_8859_5,
        28596 => encoding_rs::ISO_8859_6,
        28597 => encoding_rs::ISO_8859_7,
        28598 => encoding_rs::ISO_8859_8,
        28603 => encoding_rs::ISO_8859_13,
        28605 => encoding_rs::ISO_8859_15,
        _ => {
            tracing::debug!("unsupported codepage {}", codepage);
            return Err(ApiError::InvalidArgument);
        }
    };
    Ok(Codec::Table(encoding))
}

/// Whether `codepage` is one this host can convert.
pub fn is_supported(codepage: u32) -> bool {
    codec_for(codepage).is_ok()
}

fn lead_byte_table(codepage: u32) -> &'static [(u8, u8)] {
    match codepage {
        CP_JAPANESE => LEAD_BYTES_932,
        CP_CHINESE_SIMPLIFIED | CP_KOREAN | CP_CHINESE_TRADITIONAL => LEAD_BYTES_DBCS,
        _ => LEAD_BYTES_NONE,
    }
}

/// Whether `byte` starts a two-byte sequence in `codepage`.
pub fn is_lead_byte(codepage: u32, byte: u8) -> bool {
    for &(low, high) in lead_byte_table(codepage) {
        if low == 0 && high == 0 {
            break;
        }
        if (low..=high).contains(&byte) {
            return true;
        }
    }
    false
}

/// Whether `ch` occupies two columns on the grid.
pub fn is_full_width(ch: char) -> bool {
    (ch as u32) >= 0x80 && ch.width() == Some(2)
}

/// Decode `bytes` completely. Invalid sequences become U+FFFD.
pub fn to_wide(codepage: u32, bytes: &[u8]) -> Result<String> {
    let encoding = match codec_for(codepage)? {
        Codec::Table(encoding) => encoding,
        Codec::Oem437 => return Ok(bytes.iter().map(|&b| oem_437_char(b)).collect()),
    };
    if bytes.is_empty() {
        return Ok(String::new());
    }
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    Ok(text.into_owned())
}

/// Decode the longest prefix of `bytes` that does not end in the middle of
/// a multi-byte sequence.
///
/// Returns the text and the number of bytes consumed. The unconsumed tail is
/// the caller's partial-byte carry.
pub fn decode_prefix(codepage: u32, bytes: &[u8]) -> Result<(String, usize)> {
    let complete = if codepage == CP_UTF8 {
        utf8_complete_len(bytes)
    } else {
        dbcs_complete_len(codepage, bytes)
    };
    let text = to_wide(codepage, &bytes[..complete])?;
    Ok((text, complete))
}

fn dbcs_complete_len(codepage: u32, bytes: &[u8]) -> usize {
    let mut i = 0;
    while i < bytes.len() {
        if is_lead_byte(codepage, bytes[i]) {
            if i + 1 >= bytes.len() {
                return i;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    bytes.len()
}

fn utf8_complete_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let b = bytes[len - back];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let need = if b >= 0xF0 {
            4
        } else if b >= 0xE0 {
            3
        } else if b >= 0xC0 {
            2
        } else {
            1
        };
        return if need > back { len - back } else { len };
    }
    len
}

/// Encode `text` into `codepage`. Unmappable characters become `?`.
pub fn to_bytes(codepage: u32, text: &str) -> Result<Vec<u8>> {
    let encoding = match codec_for(codepage)? {
        Codec::Table(encoding) => encoding,
        Codec::Oem437 => return Ok(text.chars().map(oem_437_byte).collect()),
    };
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut encoder = encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len());
    let mut rest = text;
    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_without_replacement(rest.len())
            .ok_or(ApiError::Overflow)?;
        out.reserve(needed);

        let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(rest, &mut out, true);
        rest = &rest[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => continue,
            EncoderResult::Unmappable(_) => out.push(DEFAULT_CHAR),
        }
    }
    Ok(out)
}

/// Length of `text` once encoded in `codepage`.
pub fn byte_len(codepage: u32, text: &str) -> Result<usize> {
    Ok(to_bytes(codepage, text)?.len())
}

/// Encode a single glyph, the way a cell's character is projected.
pub fn char_to_bytes(codepage: u32, ch: char) -> Result<Vec<u8>> {
    let mut tmp = [0u8; 4];
    to_bytes(codepage, ch.encode_utf8(&mut tmp))
}

/// Decode one or two bytes into a single glyph, falling back to a space.
pub fn bytes_to_char(codepage: u32, bytes: &[u8]) -> Result<char> {
    let text = to_wide(codepage, bytes)?;
    Ok(text.chars().next().unwrap_or(' '))
}
