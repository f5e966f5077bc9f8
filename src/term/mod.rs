//! Terminal renderer: raw CLI byte streams to clean text.
//!
//! Several target CLIs redraw their usage screens in place with cursor
//! repositioning and screen-clear sequences. Parsing the raw byte stream
//! would see stale or duplicated characters, so every CLI capture is fed
//! through a terminal emulator first and the final grid is linearized.

use tracing::trace;

/// Grid height for the emulated terminal. Usage screens fit comfortably;
/// anything scrolled past the top was redrawn and is not wanted anyway.
const SCREEN_ROWS: u16 = 500;

/// Grid width. Wide enough that no target CLI line wraps.
const SCREEN_COLS: u16 = 400;

/// Render raw terminal output to the text a real terminal would display.
///
/// Cursor movement, line/screen clearing, and color/attribute sequences are
/// interpreted (colors discarded). The final grid is serialized
/// top-to-bottom with per-line trailing padding and trailing blank lines
/// removed. Idempotent on already-clean text.
pub fn render(raw: &[u8]) -> String {
    let mut parser = vt100::Parser::new(SCREEN_ROWS, SCREEN_COLS, 0);
    parser.process(raw);
    let contents = parser.screen().contents();

    let mut lines: Vec<&str> = contents.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    trace!(rows = lines.len(), "rendered terminal capture");
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_text_passes_through() {
        let out = render(b"Current session\n72% used\n");
        assert_eq!(out, "Current session\n72% used");
    }

    #[test]
    fn test_render_is_idempotent_on_clean_text() {
        let once = render(b"alpha\nbeta\ngamma\n");
        let twice = render(once.as_bytes());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_color_sequences_are_discarded() {
        let out = render(b"\x1b[31mError\x1b[0m: none really\n");
        assert_eq!(out, "Error: none really");
    }

    #[test]
    fn test_in_place_redraw_keeps_final_frame() {
        // Draw "Loading...", return to column 1, overwrite with final text
        let raw = b"Loading...\r\x1b[KDone   12%\n";
        let out = render(raw);
        assert_eq!(out, "Done   12%");
    }

    #[test]
    fn test_cursor_home_overwrite() {
        // First frame, then cursor-home + clear-screen + second frame
        let raw = b"old frame line 1\nold frame line 2\n\x1b[H\x1b[2Jfresh 45% left\n";
        let out = render(raw);
        assert_eq!(out, "fresh 45% left");
    }

    #[test]
    fn test_trailing_blank_lines_trimmed() {
        let out = render(b"only line\n\n\n\n");
        assert_eq!(out, "only line");
    }
}
