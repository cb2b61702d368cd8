//! Board-native character codes.
//!
//! The board understands integer codes, not text: 0 is blank, 1-26 the
//! uppercase alphabet, and so on up to the reserved color-chip codes 63-70.
//! Everything rendered has to pass through this table, which doubles as the
//! sanitization boundary for untrusted provider output: a character with no
//! code becomes a blank, never an error.

/// Supported board geometries. The two models share code numbering; code 62
/// renders as a heart on the Note and a degree sign on the Flagship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardModel {
    /// 3 rows × 15 columns.
    Note,
    /// 6 rows × 22 columns.
    Flagship,
}

impl BoardModel {
    pub fn rows(&self) -> usize {
        match self {
            BoardModel::Note => 3,
            BoardModel::Flagship => 6,
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            BoardModel::Note => 15,
            BoardModel::Flagship => 22,
        }
    }
}

pub const BLANK: u8 = 0;

/// Multi-purpose code 62: heart on the Note, degree sign on the Flagship.
pub const HEART: u8 = 62;

/// The two-codepoint heart emoji (U+2764 + variation selector) occupies one
/// board cell, like the bare '❤'.
const HEART_EMOJI: &str = "\u{2764}\u{fe0f}";

/// Bracketed color tags, matched literally and consumed as one cell each.
const COLOR_TAGS: [(&str, u8); 8] = [
    ("[R]", 63), // red
    ("[O]", 64), // orange
    ("[Y]", 65), // yellow
    ("[G]", 66), // green
    ("[B]", 67), // blue
    ("[V]", 68), // violet
    ("[W]", 69), // white
    ("[K]", 70), // black
];

fn tag_code(s: &str) -> Option<u8> {
    COLOR_TAGS
        .iter()
        .find(|(tag, _)| *tag == s)
        .map(|(_, code)| *code)
}

/// Code for a single character, or None if the board has no flap for it.
fn char_code(c: char) -> Option<u8> {
    let c = c.to_ascii_uppercase();
    Some(match c {
        ' ' => 0,
        'A'..='Z' => c as u8 - b'A' + 1,
        '1'..='9' => c as u8 - b'1' + 27,
        '0' => 36,
        '!' => 37,
        '@' => 38,
        '#' => 39,
        '$' => 40,
        '(' => 41,
        ')' => 42,
        '-' => 44,
        '+' => 46,
        '&' => 47,
        '=' => 48,
        ';' => 49,
        ':' => 50,
        '\'' => 52,
        '"' => 53,
        '%' => 54,
        ',' => 55,
        '.' => 56,
        '/' => 59,
        '?' => 60,
        '❤' | '°' => HEART,
        _ => return None,
    })
}

/// Split text into display cells: each color tag and the heart emoji is one
/// cell, every other char is its own cell.
pub fn cells(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.starts_with(HEART_EMOJI) {
            let (cell, tail) = rest.split_at(HEART_EMOJI.len());
            out.push(cell);
            rest = tail;
        } else if rest.len() >= 3 && rest.is_char_boundary(3) && tag_code(&rest[..3]).is_some() {
            let (cell, tail) = rest.split_at(3);
            out.push(cell);
            rest = tail;
        } else {
            let ch_len = rest.chars().next().map_or(1, char::len_utf8);
            let (cell, tail) = rest.split_at(ch_len);
            out.push(cell);
            rest = tail;
        }
    }
    out
}

/// Number of board cells the text occupies.
pub fn display_len(text: &str) -> usize {
    cells(text).len()
}

/// Code for one display cell. Unknown input encodes to blank.
pub fn cell_code(cell: &str) -> u8 {
    if let Some(code) = tag_code(cell) {
        return code;
    }
    if cell == HEART_EMOJI {
        return HEART;
    }
    cell.chars().next().and_then(char_code).unwrap_or(BLANK)
}

/// Canonical character for a code, for console/log output. Color chips all
/// come back as a filled block; code 62 follows the model's glyph.
pub fn code_char(code: u8, model: BoardModel) -> char {
    match code {
        0 => ' ',
        1..=26 => (b'A' + code - 1) as char,
        27..=35 => (b'1' + code - 27) as char,
        36 => '0',
        37 => '!',
        38 => '@',
        39 => '#',
        40 => '$',
        41 => '(',
        42 => ')',
        44 => '-',
        46 => '+',
        47 => '&',
        48 => '=',
        49 => ';',
        50 => ':',
        52 => '\'',
        53 => '"',
        54 => '%',
        55 => ',',
        56 => '.',
        59 => '/',
        60 => '?',
        62 => match model {
            BoardModel::Note => '❤',
            BoardModel::Flagship => '°',
        },
        63..=71 => '▉',
        _ => '?',
    }
}

/// Decode a row of codes back into text, for logging.
pub fn row_text(row: &[u8], model: BoardModel) -> String {
    row.iter().map(|&c| code_char(c, model)).collect()
}

/// Encode a line into exactly `cols` codes: truncated at the column limit,
/// zero-padded on the right.
pub fn encode_line(text: &str, cols: usize) -> Vec<u8> {
    let mut codes: Vec<u8> = cells(text).into_iter().take(cols).map(cell_code).collect();
    codes.resize(cols, BLANK);
    codes
}
