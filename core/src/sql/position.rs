//! Character offsets to line and column

use crate::models::Position;

/// Convert a 0-based character offset in `source` into a 0-based line and column.
///
/// Offsets past the last character are clamped to it, so the result always
/// names a character that exists in a non-empty source. Offsets count
/// characters, not bytes, matching how the engine reports error positions.
pub fn offset_to_line_col(source: &str, offset: usize) -> Position {
    let len = source.chars().count();
    let target = offset.min(len.saturating_sub(1));

    let mut line = 0;
    let mut col = 0;
    for c in source.chars().take(target) {
        if c == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    Position::new(line, col)
}

/// Convert a 1-based engine error position into a source position
pub fn engine_position_to_line_col(source: &str, position: u32) -> Position {
    offset_to_line_col(source, (position as usize).saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_origin() {
        assert_eq!(offset_to_line_col("SELECT 1", 0), Position::new(0, 0));
        assert_eq!(offset_to_line_col("", 0), Position::new(0, 0));
        assert_eq!(offset_to_line_col("", 10), Position::new(0, 0));
    }

    #[test]
    fn test_lines_and_columns() {
        let source = "SELECT *\nFROM t\nWHERE x";
        assert_eq!(offset_to_line_col(source, 7), Position::new(0, 7));
        assert_eq!(offset_to_line_col(source, 9), Position::new(1, 0));
        assert_eq!(offset_to_line_col(source, 14), Position::new(1, 5));
        assert_eq!(offset_to_line_col(source, 16), Position::new(2, 0));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let source = "SELECT 'ñandú', x";
        // 'x' is the 17th character but sits further in bytes
        assert_eq!(offset_to_line_col(source, 16), Position::new(0, 16));
    }

    #[test]
    fn test_clamps_past_end() {
        let source = "ab\ncd";
        assert_eq!(offset_to_line_col(source, 100), Position::new(1, 1));
        assert_eq!(engine_position_to_line_col(source, 6), Position::new(1, 1));
    }

    #[test]
    fn test_engine_position_is_one_based() {
        assert_eq!(engine_position_to_line_col("SELECT x FROM t", 8), Position::new(0, 7));
        assert_eq!(engine_position_to_line_col("SELECT x FROM t", 0), Position::new(0, 0));
    }

    proptest! {
        #[test]
        fn prop_monotonic(source in "[a-z \\n;']{0,60}", a in 0usize..80, b in 0usize..80) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(offset_to_line_col(&source, lo) <= offset_to_line_col(&source, hi));
        }

        #[test]
        fn prop_names_existing_character(source in "[a-z \\n]{1,60}", offset in 0usize..80) {
            let position = offset_to_line_col(&source, offset);
            let line = source.split('\n').nth(position.line);
            prop_assert!(line.is_some());
            // the column may point at the newline that ends the line
            prop_assert!(position.col <= line.unwrap().chars().count());
        }
    }
}
