//! Output encodings
//!
//! Two fixed single-byte code pages plus UTF-8 passthrough. Both tables are
//! injective so every byte survives a byte -> char -> byte round trip. The C0
//! controls a terminal acts on (NUL, BEL, BS, HT, LF, CR, ESC) map to
//! themselves so escape sequences still work in code-page mode.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// Output encoding of a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Unicode passthrough
    #[default]
    Utf8,
    /// IBM PC code page 437
    Cp437,
    /// DOS Latin-1 code page 850
    Cp850,
}

impl OutputMode {
    /// Parse a mode name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "UTF8" | "UTF-8" => Some(Self::Utf8),
            "CP437" => Some(Self::Cp437),
            "CP850" => Some(Self::Cp850),
            _ => None,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF8",
            Self::Cp437 => "CP437",
            Self::Cp850 => "CP850",
        }
    }

    /// Byte -> char table, `None` for passthrough
    pub fn table(&self) -> Option<&'static [char; 256]> {
        match self {
            Self::Utf8 => None,
            Self::Cp437 => Some(&CP437),
            Self::Cp850 => Some(&CP850),
        }
    }

    /// Encode a single char, `None` if the code page has no byte for it
    pub fn encode_char(&self, c: char) -> Option<u8> {
        match self {
            Self::Utf8 => None,
            Self::Cp437 => CP437_REVERSE.get(&c).copied(),
            Self::Cp850 => CP850_REVERSE.get(&c).copied(),
        }
    }

    /// Encode text for the wire. Chars a code page cannot represent become
    /// `unmapped`.
    pub fn encode(&self, text: &str, unmapped: u8) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            _ => text
                .chars()
                .map(|c| self.encode_char(c).unwrap_or(unmapped))
                .collect(),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode CP437 bytes (ANSI art files) into text
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| CP437[b as usize]).collect()
}

pub static CP437: [char; 256] = [
    // 0x00
    '\u{0000}', '\u{263A}', '\u{263B}', '\u{2665}', '\u{2666}', '\u{2663}', '\u{2660}', '\u{0007}',
    '\u{0008}', '\u{0009}', '\u{000A}', '\u{2642}', '\u{2640}', '\u{000D}', '\u{266B}', '\u{263C}',
    // 0x10
    '\u{25BA}', '\u{25C4}', '\u{2195}', '\u{203C}', '\u{00B6}', '\u{00A7}', '\u{25AC}', '\u{21A8}',
    '\u{2191}', '\u{2193}', '\u{2192}', '\u{001B}', '\u{221F}', '\u{2194}', '\u{25B2}', '\u{25BC}',
    // 0x20
    ' ', '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '@', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '[', '\\', ']', '^', '_',
    '`', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '{', '|', '}', '~', '\u{2302}',
    // 0x80
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

pub static CP850: [char; 256] = [
    // 0x00
    '\u{0000}', '\u{263A}', '\u{263B}', '\u{2665}', '\u{2666}', '\u{2663}', '\u{2660}', '\u{0007}',
    '\u{0008}', '\u{0009}', '\u{000A}', '\u{2642}', '\u{2640}', '\u{000D}', '\u{266B}', '\u{263C}',
    // 0x10: pilcrow and section sign live at 0xF4/0xF5 in this page
    '\u{25BA}', '\u{25C4}', '\u{2195}', '\u{203C}', '\u{0014}', '\u{0015}', '\u{25AC}', '\u{21A8}',
    '\u{2191}', '\u{2193}', '\u{2192}', '\u{001B}', '\u{221F}', '\u{2194}', '\u{25B2}', '\u{25BC}',
    // 0x20
    ' ', '!', '"', '#', '$', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '@', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '[', '\\', ']', '^', '_',
    '`', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '{', '|', '}', '~', '\u{2302}',
    // 0x80
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', 'ø', '£', 'Ø', '×', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '®', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', 'Á', 'Â', 'À', '©', '╣', '║', '╗', '╝', '¢', '¥', '┐',
    '└', '┴', '┬', '├', '─', '┼', 'ã', 'Ã', '╚', '╔', '╩', '╦', '╠', '═', '╬', '¤',
    'ð', 'Ð', 'Ê', 'Ë', 'È', 'ı', 'Í', 'Î', 'Ï', '┘', '┌', '█', '▄', '¦', 'Ì', '▀',
    'Ó', 'ß', 'Ô', 'Ò', 'õ', 'Õ', 'µ', 'þ', 'Þ', 'Ú', 'Û', 'Ù', 'ý', 'Ý', '¯', '´',
    '\u{00AD}', '±', '‗', '¾', '¶', '§', '÷', '¸', '°', '¨', '·', '¹', '³', '²', '■', '\u{00A0}',
];

fn reverse(table: &[char; 256]) -> HashMap<char, u8> {
    table
        .iter()
        .enumerate()
        .map(|(byte, &c)| (c, byte as u8))
        .collect()
}

lazy_static! {
    static ref CP437_REVERSE: HashMap<char, u8> = reverse(&CP437);
    static ref CP850_REVERSE: HashMap<char, u8> = reverse(&CP850);
}
