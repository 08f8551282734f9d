/// Calculates the 1-based line and column for a byte offset in the source text.
/// Columns count characters, not bytes. Offsets past the end resolve to the end.
/// Meant for diagnostics only, as it walks the source from the start.
#[must_use]
pub fn get_line_and_column(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}
