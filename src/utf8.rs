//! # UTF-8 validation
//!
//! Incremental validation of text payloads that arrive in pieces.
//!
//! Fragmented text messages may split a multi-byte code point across two frames, so a validator
//! that only looks at complete buffers would have to wait for the whole message. [`Utf8Validator`]
//! instead carries a tiny DFA state between calls: each fragment is fed as it arrives and the
//! first offending octet is reported immediately, without buffering anything.
//!
//! The automaton is Björn Höhrmann's "Flexible and Economical UTF-8 Decoder": every byte is first
//! mapped to one of 12 character classes, then the class and the current state select the next
//! state. State `0` accepts, state `1` rejects and is absorbing.
//!
//! ```rust
//! use securews::Utf8Validator;
//!
//! let mut validator = Utf8Validator::new();
//! // "€" is E2 82 AC, split across two fragments
//! assert!(validator.validate(&[0xE2, 0x82]));
//! assert!(!validator.is_valid());
//! assert!(validator.validate(&[0xAC]));
//! assert!(validator.is_valid());
//! ```

const ACCEPT: u8 = 0;
const REJECT: u8 = 1;

/// Maps every octet to its character class.
#[rustfmt::skip]
static CLASS: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 00..0f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 10..1f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 20..2f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 30..3f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 40..4f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 50..5f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 60..6f
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // 70..7f
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 80..8f
    9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, // 90..9f
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, // a0..af
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, // b0..bf
    8, 8, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, // c0..cf
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, // d0..df
    10, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 3, 3, // e0..ef
    11, 6, 6, 6, 5, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, // f0..ff
];

/// Next state, indexed by `state * 16 + class`.
#[rustfmt::skip]
static TRANSITION: [u8; 144] = [
    0, 1, 2, 3, 5, 8, 7, 1, 1, 1, 4, 6, 1, 1, 1, 1, // accept
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // reject
    1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 1, // one continuation left
    1, 2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 1, // two left
    1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 1, // after e0: a0..bf
    1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, // after ed: 80..9f
    1, 1, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1, 1, // after f0: 90..bf
    1, 3, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1, 1, // three left
    1, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // after f4: 80..8f
];

/// Incremental UTF-8 validator with constant memory.
///
/// Feed consecutive pieces of one text message with [`validate`](Self::validate), then check
/// [`is_valid`](Self::is_valid) once the message is complete: a message that ends in the middle
/// of a code point passes every `validate` call but is not valid.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    state: u8,
    pos: usize,
}

impl Utf8Validator {
    /// Creates a validator in the accepting state at position 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the validator to start a new message.
    pub fn reset(&mut self) {
        self.state = ACCEPT;
        self.pos = 0;
    }

    /// Feeds the next piece of the message.
    ///
    /// Returns `false` as soon as an octet cannot continue a well-formed sequence; the
    /// [`position`](Self::position) then points at that octet, counted from the last reset.
    /// Once rejected, every later call returns `false` until [`reset`](Self::reset).
    pub fn validate(&mut self, data: &[u8]) -> bool {
        if self.state == REJECT {
            return false;
        }

        for (i, &byte) in data.iter().enumerate() {
            let class = CLASS[byte as usize] as usize;
            self.state = TRANSITION[self.state as usize * 16 + class];
            if self.state == REJECT {
                self.pos += i;
                return false;
            }
        }

        self.pos += data.len();
        true
    }

    /// Returns `true` when everything fed so far ends on a code point boundary.
    pub fn is_valid(&self) -> bool {
        self.state == ACCEPT
    }

    /// Octets consumed since the last reset, or the offset of the offending octet after a
    /// rejection.
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(data: &[u8]) -> bool {
        let mut validator = Utf8Validator::new();
        validator.validate(data) && validator.is_valid()
    }

    #[test]
    fn test_agrees_with_std() {
        let samples: &[&[u8]] = &[
            b"",
            b"hello",
            "ünïcödé".as_bytes(),
            "日本語".as_bytes(),
            "🦀 crab".as_bytes(),
            &[0xC0, 0x80],
            &[0xC1, 0xBF],
            &[0xE0, 0x80, 0x80],
            &[0xE0, 0xA0, 0x80],
            &[0xED, 0x9F, 0xBF],
            &[0xED, 0xA0, 0x80],
            &[0xF0, 0x8F, 0xBF, 0xBF],
            &[0xF0, 0x90, 0x80, 0x80],
            &[0xF4, 0x8F, 0xBF, 0xBF],
            &[0xF4, 0x90, 0x80, 0x80],
            &[0xF5, 0x80, 0x80, 0x80],
            &[0xFF],
            &[0x80],
            &[0xE2, 0x82],
        ];

        for sample in samples {
            assert_eq!(
                check(sample),
                std::str::from_utf8(sample).is_ok(),
                "mismatch for {sample:x?}"
            );
        }
    }

    #[test]
    fn test_exhaustive_two_byte_sequences() {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                let data = [a, b];
                assert_eq!(check(&data), std::str::from_utf8(&data).is_ok());
            }
        }
    }

    #[test]
    fn test_split_anywhere() {
        let text = "a€b𝄞c ÿ 日本".as_bytes();
        for split in 0..=text.len() {
            let mut validator = Utf8Validator::new();
            assert!(validator.validate(&text[..split]));
            assert!(validator.validate(&text[split..]));
            assert!(validator.is_valid());
            assert_eq!(validator.position(), text.len());
        }
    }

    #[test]
    fn test_incomplete_sequence_is_not_valid() {
        let mut validator = Utf8Validator::new();
        assert!(validator.validate(&[b'o', b'k', 0xF0, 0x9F]));
        assert!(!validator.is_valid());
        assert_eq!(validator.position(), 4);
    }

    #[test]
    fn test_reject_reports_offending_position() {
        let mut validator = Utf8Validator::new();
        assert!(validator.validate(b"abc"));
        assert!(!validator.validate(&[b'd', 0xFF, b'e']));
        assert_eq!(validator.position(), 4);
        assert!(!validator.is_valid());
    }

    #[test]
    fn test_reject_in_continuation() {
        let mut validator = Utf8Validator::new();
        assert!(validator.validate(&[0xE2]));
        assert!(!validator.validate(&[0x41]));
        assert_eq!(validator.position(), 1);
    }

    #[test]
    fn test_reject_is_absorbing() {
        let mut validator = Utf8Validator::new();
        assert!(!validator.validate(&[0xC0]));
        assert!(!validator.validate(b"plain ascii"));
        assert!(!validator.validate(&[]));
        assert!(!validator.is_valid());
    }

    #[test]
    fn test_reset() {
        let mut validator = Utf8Validator::new();
        assert!(!validator.validate(&[0xFE]));
        validator.reset();
        assert!(validator.is_valid());
        assert_eq!(validator.position(), 0);
        assert!(validator.validate("ok".as_bytes()));
        assert!(validator.is_valid());
    }

    #[test]
    fn test_empty_input_keeps_state() {
        let mut validator = Utf8Validator::new();
        assert!(validator.validate(&[0xE2, 0x82]));
        assert!(validator.validate(&[]));
        assert!(!validator.is_valid());
        assert_eq!(validator.position(), 2);
    }
}
