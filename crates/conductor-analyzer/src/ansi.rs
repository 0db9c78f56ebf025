//! Terminal control-sequence stripping.
//!
//! Worker output arrives full of escape sequences for colors, cursor
//! movement, and window titles. The rule and LLM detectors both match
//! against clean text, so sequences are removed first. Stripping is
//! idempotent: running it over already-clean text changes nothing.

/// Parser state while walking the input.
#[derive(Clone, Copy, PartialEq)]
enum State {
    /// Ordinary text.
    Ground,
    /// Just saw ESC; the next byte decides the sequence form.
    Escape,
    /// Inside `ESC [` (or bare 0x9B): parameter and intermediate bytes
    /// until a final byte in 0x40..=0x7E.
    Csi,
    /// Inside `ESC ]`: consumed until BEL or `ESC \`.
    Osc,
}

/// Strip CSI and OSC control sequences (plus simple two-byte escapes and
/// carriage returns) from raw terminal bytes, returning clean text.
///
/// Invalid UTF-8 in the remaining bytes is replaced with the Unicode
/// replacement character.
pub fn strip_controls(input: &[u8]) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut state = State::Ground;
    let mut prev_esc = false; // inside OSC: was the previous byte ESC?

    for &byte in input {
        match state {
            State::Ground => match byte {
                0x1B => state = State::Escape,
                0x9B => state = State::Csi,
                b'\r' => {}
                _ => out.push(byte),
            },
            State::Escape => {
                state = match byte {
                    b'[' => State::Csi,
                    b']' => {
                        prev_esc = false;
                        State::Osc
                    }
                    // Two-byte escape (ESC 7, ESC M, ...): drop and return.
                    _ => State::Ground,
                };
            }
            State::Csi => {
                // Parameter bytes 0x30..=0x3F and intermediates 0x20..=0x2F
                // continue the sequence; a final byte 0x40..=0x7E ends it.
                // Anything else aborts the sequence without emitting it.
                if !(0x20..=0x3F).contains(&byte) {
                    state = State::Ground;
                }
            }
            State::Osc => {
                if byte == 0x07 || (prev_esc && byte == b'\\') {
                    state = State::Ground;
                }
                prev_esc = byte == 0x1B;
            }
        }
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Convenience wrapper for text that is already a string.
pub fn strip_controls_str(input: &str) -> String {
    strip_controls(input.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(strip_controls(b"hello world"), "hello world");
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_controls(b"\x1b[1;31merror\x1b[0m"), "error");
    }

    #[test]
    fn strips_cursor_movement() {
        assert_eq!(strip_controls(b"\x1b[2A\x1b[Khello"), "hello");
    }

    #[test]
    fn strips_osc_title_with_bel() {
        assert_eq!(strip_controls(b"\x1b]0;My Terminal\x07rest"), "rest");
    }

    #[test]
    fn strips_osc_title_with_st() {
        assert_eq!(strip_controls(b"\x1b]0;title\x1b\\rest"), "rest");
    }

    #[test]
    fn strips_bare_csi() {
        assert_eq!(strip_controls(b"\x9b31mred\x9b0m"), "red");
    }

    #[test]
    fn drops_carriage_returns() {
        assert_eq!(strip_controls(b"progress 50%\rprogress 100%\r\n"), "progress 50%progress 100%\n");
    }

    #[test]
    fn truncated_escape_at_end() {
        assert_eq!(strip_controls(b"text\x1b"), "text");
        assert_eq!(strip_controls(b"text\x1b["), "text");
    }

    #[test]
    fn preserves_newlines_between_sequences() {
        assert_eq!(
            strip_controls(b"\x1b[32mline1\n\x1b[0mline2\n"),
            "line1\nline2\n"
        );
    }

    #[test]
    fn stripping_is_idempotent() {
        let inputs: &[&[u8]] = &[
            b"\x1b[1m\x1b[36mbold cyan\x1b[0m plain",
            b"\x1b]0;title\x07text \x1b[31mred\x1b[0m\n",
            b"no sequences at all",
            b"\x9b1mbare\x9b0m",
        ];
        for input in inputs {
            let once = strip_controls(input);
            let twice = strip_controls(once.as_bytes());
            assert_eq!(once, twice, "stripping not idempotent for {input:?}");
        }
    }

    #[test]
    fn agent_style_output() {
        let input = b"\x1b[1m\x1b[36m\xe2\x97\x8f\x1b[0m Visit \x1b[4mhttps://railway.app\x1b[0m to continue";
        let clean = strip_controls(input);
        assert!(clean.contains("Visit https://railway.app to continue"));
    }
}
