use crate::span::Span;

/// Cursor over a single source line.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    /// Text of the line, without terminator
    chars: &'a str,
    /// Index that the cursor is pointing to in the line
    curr_pt: usize,
    /// Zero-based line number
    line: usize,
    /// Offset of the line from the start of the program text
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str, line: usize, base: usize) -> Cursor<'a> {
        Cursor {
            chars: input,
            curr_pt: 0,
            line,
            base,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns current cursor position
    pub fn curr_pt(&self) -> usize {
        self.curr_pt
    }

    /// Return slice of input starting at the current point of the cursor
    pub fn at_curr_pt(&self) -> &'a str {
        &self.chars[self.curr_pt..]
    }

    /// Nothing but an optional comment remains.
    pub fn is_eol(&self) -> bool {
        let rest = self.at_curr_pt();
        rest.is_empty() || rest.starts_with(';')
    }

    pub fn first(&self) -> Option<char> {
        self.at_curr_pt().chars().next()
    }

    /// Move cursor ahead in the input by given amount of bytes
    pub fn advance(&mut self, amt: usize) {
        self.curr_pt = (self.curr_pt + amt).min(self.chars.len());
    }

    /// Advance past a run of whitespace and return the new position.
    pub fn skip_spaces(&mut self) -> usize {
        self.take_while(char::is_whitespace);
        self.curr_pt
    }

    /// Consume characters while `pred` holds, returning them.
    pub fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) -> &'a str {
        let start = self.curr_pt;
        let len = self
            .at_curr_pt()
            .find(|c| !pred(c))
            .unwrap_or(self.chars.len() - start);
        self.advance(len);
        &self.chars[start..self.curr_pt]
    }

    /// Span of the line-local byte range `start..end`.
    pub fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.base + start, end.saturating_sub(start))
    }

    /// Span from `start` to the end of meaningful input (comment excluded).
    pub fn span_to_eol(&self, start: usize) -> Span {
        let end = self.chars[start..]
            .find(';')
            .map_or(self.chars.len(), |i| start + i);
        self.span(start, self.chars[..end].trim_end().len().max(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_spaces_leaves_content() {
        let mut cur = Cursor::new("  \tpush", 0, 0);
        assert_eq!(cur.skip_spaces(), 3);
        assert_eq!(cur.at_curr_pt(), "push");
        assert_eq!(cur.skip_spaces(), 3);
    }

    #[test]
    fn comment_is_end_of_line() {
        let mut cur = Cursor::new("hlt ; stop", 0, 0);
        cur.take_while(|c| !c.is_whitespace());
        cur.skip_spaces();
        assert!(cur.is_eol());
    }

    #[test]
    fn spans_are_absolute() {
        let cur = Cursor::new("push 5", 3, 20);
        assert_eq!(cur.span(5, 6), Span::new(25, 1));
        assert_eq!(cur.line(), 3);
    }
}
