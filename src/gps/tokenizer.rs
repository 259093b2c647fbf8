// src/gps/tokenizer.rs
//! Character-level NMEA field tokenizer
//!
//! Splits a `$...*hh\r\n` sentence into fields one byte at a time while
//! accumulating the XOR checksum. It knows nothing about sentence meaning;
//! the decoder interprets the tokens it emits.

use std::fmt;

use tinyvec::ArrayVec;

/// Usable bytes in a single field. Longer fields abandon the sentence.
pub const FIELD_CAPACITY: usize = 24;

/// Text of one field, copied out of the tokenizer's buffer
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldText(ArrayVec<[u8; FIELD_CAPACITY]>);

impl FieldText {
    /// Field contents; only printable ASCII ever reaches the buffer
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(self.0.as_slice()).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for FieldText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// Boundary events produced while feeding bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `$` seen; any sentence in progress was dropped
    Start,
    /// A `,` or `*` terminated field `index`
    Field { index: u8, text: FieldText },
    /// `\r` closed the sentence. `checksum` is the text after `*`
    End {
        checksum: FieldText,
        parity: u8,
        checksum_seen: bool,
    },
    /// A field outgrew the buffer and the sentence was abandoned
    Overflow,
}

#[derive(Debug, Default)]
pub struct Tokenizer {
    open: bool,
    parity: u8,
    field_index: u8,
    field: FieldText,
    in_checksum: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a sentence is currently being accumulated
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Running XOR of the payload seen so far
    pub fn parity(&self) -> u8 {
        self.parity
    }

    /// Drop any sentence in progress
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by one input byte
    pub fn feed(&mut self, byte: u8) -> Option<Token> {
        // Line noise
        if !(b' '..=b'~').contains(&byte) && byte != b'\r' && byte != b'\n' {
            return None;
        }

        if byte == b'$' {
            self.open = true;
            self.parity = 0;
            self.field_index = 0;
            self.field = FieldText::default();
            self.in_checksum = false;
            return Some(Token::Start);
        }

        if !self.open {
            return None;
        }

        match byte {
            b',' => {
                self.parity ^= byte;
                Some(self.terminate_field(false))
            }
            b'*' => Some(self.terminate_field(true)),
            b'\r' => {
                self.open = false;
                let token = Token::End {
                    checksum: self.field,
                    parity: self.parity,
                    checksum_seen: self.in_checksum,
                };
                self.field = FieldText::default();
                Some(token)
            }
            b'\n' => None,
            _ => {
                if !self.in_checksum {
                    self.parity ^= byte;
                }
                if self.field.0.try_push(byte).is_some() {
                    self.open = false;
                    self.field = FieldText::default();
                    return Some(Token::Overflow);
                }
                None
            }
        }
    }

    fn terminate_field(&mut self, checksum_follows: bool) -> Token {
        let token = Token::Field {
            index: self.field_index,
            text: self.field,
        };
        self.field_index = self.field_index.saturating_add(1);
        self.field = FieldText::default();
        self.in_checksum = checksum_follows;
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(tokenizer: &mut Tokenizer, input: &str) -> Vec<Token> {
        input.bytes().filter_map(|b| tokenizer.feed(b)).collect()
    }

    fn fields(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Field { text, .. } => Some(text.as_str().to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_splits_fields_and_checksum() {
        let mut tokenizer = Tokenizer::new();
        let tokens = feed_all(&mut tokenizer, "$PMTK001,161,3*36\r\n");

        assert_eq!(tokens[0], Token::Start);
        assert_eq!(fields(&tokens), vec!["PMTK001", "161", "3"]);

        match tokens.last() {
            Some(Token::End { checksum, parity, checksum_seen }) => {
                assert_eq!(checksum.as_str(), "36");
                assert_eq!(*parity, 0x36);
                assert!(checksum_seen);
            }
            other => panic!("expected end token, got {:?}", other),
        }
        assert!(!tokenizer.is_open());
    }

    #[test]
    fn test_field_indices_increase() {
        let mut tokenizer = Tokenizer::new();
        let tokens = feed_all(&mut tokenizer, "$A,B,,C*00\r");
        let indices: Vec<u8> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Field { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(fields(&tokens), vec!["A", "B", "", "C"]);
    }

    #[test]
    fn test_ignores_bytes_outside_sentence() {
        let mut tokenizer = Tokenizer::new();
        assert!(feed_all(&mut tokenizer, "garbage,*\r\n").is_empty());
        assert!(!tokenizer.is_open());
    }

    #[test]
    fn test_line_noise_does_not_touch_state() {
        let mut clean = Tokenizer::new();
        let mut noisy = Tokenizer::new();
        feed_all(&mut clean, "$GPGGA,1");
        for &b in b"$GP\x00\x07GGA,\x7f\x1b1\xff\x80" {
            assert!(noisy.feed(b).is_none() || b == b'$' || b == b',');
        }
        assert_eq!(clean.parity(), noisy.parity());
    }

    #[test]
    fn test_dollar_restarts_sentence() {
        let mut tokenizer = Tokenizer::new();
        let tokens = feed_all(&mut tokenizer, "$GPRMC,12$PMTK001,161,3*36\r");
        assert_eq!(tokens.iter().filter(|t| **t == Token::Start).count(), 2);
        match tokens.last() {
            Some(Token::End { parity, .. }) => assert_eq!(*parity, 0x36),
            other => panic!("expected end token, got {:?}", other),
        }
    }

    #[test]
    fn test_overflow_abandons_sentence() {
        let mut tokenizer = Tokenizer::new();
        let long = "X".repeat(FIELD_CAPACITY + 1);
        let tokens = feed_all(&mut tokenizer, &format!("$GPRMC,{},A*00\r\n", long));

        assert!(tokens.contains(&Token::Overflow));
        assert!(!tokens.iter().any(|t| matches!(t, Token::End { .. })));
        assert_eq!(fields(&tokens), vec!["GPRMC"]);
        assert!(!tokenizer.is_open());
    }

    #[test]
    fn test_field_at_capacity_fits() {
        let mut tokenizer = Tokenizer::new();
        let exact = "Y".repeat(FIELD_CAPACITY);
        let tokens = feed_all(&mut tokenizer, &format!("${},Z*00\r", exact));
        assert_eq!(fields(&tokens)[0], exact);
        assert!(!tokens.contains(&Token::Overflow));
    }

    #[test]
    fn test_missing_asterisk_reported() {
        let mut tokenizer = Tokenizer::new();
        let tokens = feed_all(&mut tokenizer, "$GPRMC,1\r");
        match tokens.last() {
            Some(Token::End { checksum_seen, checksum, .. }) => {
                assert!(!checksum_seen);
                assert_eq!(checksum.as_str(), "1");
            }
            other => panic!("expected end token, got {:?}", other),
        }
    }
}
