//! Byte-level keystroke classification.
//!
//! The terminal delivers raw bytes in raw mode; this module turns them into
//! [`Keystroke`] values. Control byte 27 (ESC) begins a variable-length escape
//! sequence; remaining bytes are consumed until a terminating byte class is
//! seen. Single-byte controls (backspace, tab, enter) are table-driven so both
//! POSIX and Windows-console byte mappings are accepted.

/// A decoded keystroke, ready for an editor transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    /// A printable character to insert at the cursor.
    Insert(char),
    Enter,
    Backspace,
    /// The Delete key (forward delete).
    Delete,
    Tab,
    CursorLeft,
    CursorRight,
    HistoryPrev,
    HistoryNext,
    Home,
    End,
    /// A recognized but unhandled sequence; dropped without effect.
    Ignored,
}

/// Backspace bytes: DEL on POSIX terminals, BS on the Windows console.
const BACKSPACE_BYTES: &[u8] = &[0x7f, 0x08];

/// Enter bytes: CR in raw mode, LF when input is piped.
const ENTER_BYTES: &[u8] = &[0x0d, 0x0a];

const TAB_BYTE: u8 = 0x09;
const ESC_BYTE: u8 = 0x1b;

/// Incremental keystroke decoder.
///
/// Feed one byte at a time; a `Some` result is a complete keystroke. Escape
/// sequences and multi-byte UTF-8 characters span several `feed` calls and
/// return `None` until the final byte arrives.
#[derive(Debug, Default)]
pub struct Decoder {
    /// Bytes of an escape sequence in progress (starts with ESC).
    escape: Vec<u8>,
    /// Bytes of a UTF-8 character in progress.
    utf8: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one input byte, returning a keystroke when one completes.
    pub fn feed(&mut self, byte: u8) -> Option<Keystroke> {
        if !self.escape.is_empty() {
            return self.feed_escape(byte);
        }
        if !self.utf8.is_empty() {
            return self.feed_utf8(byte);
        }

        if byte == ESC_BYTE {
            self.escape.push(byte);
            return None;
        }
        if BACKSPACE_BYTES.contains(&byte) {
            return Some(Keystroke::Backspace);
        }
        if ENTER_BYTES.contains(&byte) {
            return Some(Keystroke::Enter);
        }
        if byte == TAB_BYTE {
            return Some(Keystroke::Tab);
        }
        if byte < 0x20 {
            // Unhandled control byte (Ctrl-combos and friends)
            return Some(Keystroke::Ignored);
        }
        if byte < 0x80 {
            return Some(Keystroke::Insert(char::from(byte)));
        }

        // Lead byte of a multi-byte UTF-8 character
        self.utf8.push(byte);
        self.try_finish_utf8()
    }

    fn feed_escape(&mut self, byte: u8) -> Option<Keystroke> {
        // ESC alone followed by an introducer continues the sequence
        if self.escape.len() == 1 {
            if byte == b'[' || byte == b'O' {
                self.escape.push(byte);
                return None;
            }
            // Bare ESC followed by anything else: drop both
            self.escape.clear();
            return Some(Keystroke::Ignored);
        }

        // Parameter bytes (digits and ';') accumulate until a terminator
        if byte.is_ascii_digit() || byte == b';' {
            self.escape.push(byte);
            return None;
        }

        let params: Vec<u8> = self.escape[2..].to_vec();
        self.escape.clear();

        let key = match byte {
            b'A' => Keystroke::HistoryPrev,
            b'B' => Keystroke::HistoryNext,
            b'C' => Keystroke::CursorRight,
            b'D' => Keystroke::CursorLeft,
            b'H' => Keystroke::Home,
            b'F' => Keystroke::End,
            b'~' => match params.as_slice() {
                b"1" | b"7" => Keystroke::Home,
                b"3" => Keystroke::Delete,
                b"4" | b"8" => Keystroke::End,
                _ => Keystroke::Ignored,
            },
            _ => Keystroke::Ignored,
        };
        Some(key)
    }

    fn feed_utf8(&mut self, byte: u8) -> Option<Keystroke> {
        // A non-continuation byte aborts the pending character
        if byte & 0xc0 != 0x80 {
            self.utf8.clear();
            return self.feed(byte);
        }
        self.utf8.push(byte);
        self.try_finish_utf8()
    }

    fn try_finish_utf8(&mut self) -> Option<Keystroke> {
        let expected = utf8_len(self.utf8[0]);
        if self.utf8.len() < expected {
            return None;
        }
        let bytes = std::mem::take(&mut self.utf8);
        match std::str::from_utf8(&bytes) {
            Ok(s) => s.chars().next().map(Keystroke::Insert),
            Err(_) => Some(Keystroke::Ignored),
        }
    }
}

/// Expected byte length of a UTF-8 character from its lead byte.
fn utf8_len(lead: u8) -> usize {
    if lead >= 0xf0 {
        4
    } else if lead >= 0xe0 {
        3
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Keystroke> {
        let mut decoder = Decoder::new();
        bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
    }

    #[test]
    fn test_plain_characters() {
        assert_eq!(
            decode_all(b"ab"),
            vec![Keystroke::Insert('a'), Keystroke::Insert('b')]
        );
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(decode_all(b"\x1b[A"), vec![Keystroke::HistoryPrev]);
        assert_eq!(decode_all(b"\x1b[B"), vec![Keystroke::HistoryNext]);
        assert_eq!(decode_all(b"\x1b[C"), vec![Keystroke::CursorRight]);
        assert_eq!(decode_all(b"\x1b[D"), vec![Keystroke::CursorLeft]);
    }

    #[test]
    fn test_home_end_variants() {
        assert_eq!(decode_all(b"\x1b[H"), vec![Keystroke::Home]);
        assert_eq!(decode_all(b"\x1b[F"), vec![Keystroke::End]);
        assert_eq!(decode_all(b"\x1b[1~"), vec![Keystroke::Home]);
        assert_eq!(decode_all(b"\x1b[4~"), vec![Keystroke::End]);
    }

    #[test]
    fn test_delete_sequence() {
        assert_eq!(decode_all(b"\x1b[3~"), vec![Keystroke::Delete]);
    }

    #[test]
    fn test_backspace_both_platforms() {
        assert_eq!(decode_all(&[0x7f]), vec![Keystroke::Backspace]);
        assert_eq!(decode_all(&[0x08]), vec![Keystroke::Backspace]);
    }

    #[test]
    fn test_enter_both_platforms() {
        assert_eq!(decode_all(&[0x0d]), vec![Keystroke::Enter]);
        assert_eq!(decode_all(&[0x0a]), vec![Keystroke::Enter]);
    }

    #[test]
    fn test_utf8_two_byte_character() {
        assert_eq!(
            decode_all("é".as_bytes()),
            vec![Keystroke::Insert('é')]
        );
    }

    #[test]
    fn test_unknown_tilde_sequence_ignored() {
        assert_eq!(decode_all(b"\x1b[5~"), vec![Keystroke::Ignored]);
    }

    #[test]
    fn test_bare_escape_dropped() {
        assert_eq!(decode_all(b"\x1bq"), vec![Keystroke::Ignored]);
        // Decoder recovers afterward
        assert_eq!(decode_all(b"\x1bqz"), vec![
            Keystroke::Ignored,
            Keystroke::Insert('z')
        ]);
    }
}
