use crate::error::{AsmError, AsmErrorKind, BracketError};
use crate::span::Span;
use crate::symbol::Register;

pub use self::cursor::Cursor;

pub mod cursor;

/// Whitespace-delimited piece of a line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Word<'a> {
    pub text: &'a str,
    pub span: Span,
}

/// Classified operand token.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Arg<'a> {
    Reg(Register),
    Int(i32),
    Label(&'a str),
}

/// Operand as written in source, before an instruction decides whether it is acceptable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RawOperand<'a> {
    pub arg: Arg<'a>,
    /// Token text, without brackets.
    pub text: &'a str,
    /// Written inside `[` `]`.
    pub indirect: bool,
    pub span: Span,
}

/// Test if a character can appear in a label.
pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

pub(crate) fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some('a'..='z' | 'A'..='Z' | '_')) && chars.all(is_id)
}

fn ends_word(c: char) -> bool {
    c.is_whitespace() || c == ';'
}

/// Decide what a token names: a register, a decimal literal or a label.
pub fn classify(text: &str) -> Result<Arg<'_>, AsmErrorKind> {
    let numeric = match text.as_bytes() {
        [b'0'..=b'9', ..] => true,
        [b'-' | b'+', b'0'..=b'9', ..] => true,
        _ => false,
    };
    if numeric {
        return text
            .parse::<i32>()
            .map(Arg::Int)
            .map_err(|_| AsmErrorKind::InvalidLiteral(text.to_string()));
    }
    if let Ok(reg) = text.parse::<Register>() {
        return Ok(Arg::Reg(reg));
    }
    if is_ident(text) {
        return Ok(Arg::Label(text));
    }
    Err(AsmErrorKind::InvalidLabel(text.to_string()))
}

impl<'a> Cursor<'a> {
    fn error(&self, kind: AsmErrorKind, span: Span) -> AsmError {
        AsmError::new(kind, self.line(), span)
    }

    /// Next whitespace-delimited word, stopping at a comment. `None` at end of line.
    pub fn next_word(&mut self) -> Option<Word<'a>> {
        self.skip_spaces();
        if self.is_eol() {
            return None;
        }
        let start = self.curr_pt();
        let text = self.take_while(|c| !ends_word(c));
        Some(Word {
            text,
            span: self.span(start, self.curr_pt()),
        })
    }

    /// If positioned at `[`, consume through the matching `]` and return the enclosed token.
    pub fn detect_brackets(&mut self) -> Result<Option<Word<'a>>, AsmError> {
        self.skip_spaces();
        if self.first() != Some('[') {
            return Ok(None);
        }
        let open = self.curr_pt();
        let rest = self.at_curr_pt();
        let limit = rest.find(';').unwrap_or(rest.len());
        let close = match rest[..limit].find(']') {
            // A second `[` before the close means the first one is never closed.
            Some(close) if !rest[1..close].contains('[') => close,
            _ => {
                return Err(self.error(
                    AsmErrorKind::Bracket(BracketError::Unclosed),
                    self.span_to_eol(open),
                ))
            }
        };
        let inner = &rest[1..close];
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            return Err(self.error(
                AsmErrorKind::Bracket(BracketError::Empty),
                self.span(open, open + close + 1),
            ));
        }
        let lead = inner.len() - inner.trim_start().len();
        let start = open + 1 + lead;
        self.advance(close + 1);
        Ok(Some(Word {
            text: trimmed,
            span: self.span(start, start + trimmed.len()),
        }))
    }

    /// Reject a bare word holding a stray `[` or `]`.
    pub fn check_brackets(&self, word: Word<'a>) -> Result<(), AsmError> {
        if let Some(i) = word.text.find(']') {
            let at = word.span.offs() + i;
            return Err(self.error(
                AsmErrorKind::Bracket(BracketError::Unopened),
                Span::new(at, 1),
            ));
        }
        if let Some(i) = word.text.find('[') {
            let at = word.span.offs() + i;
            return Err(self.error(
                AsmErrorKind::Bracket(BracketError::Unclosed),
                Span::new(at, word.span.len() - i),
            ));
        }
        Ok(())
    }

    /// Read and classify the next operand, if any.
    pub fn read_operand(&mut self) -> Result<Option<RawOperand<'a>>, AsmError> {
        let (word, indirect) = match self.detect_brackets()? {
            Some(word) => (word, true),
            None => match self.next_word() {
                Some(word) => (word, false),
                None => return Ok(None),
            },
        };
        if !indirect {
            self.check_brackets(word)?;
        }
        let arg = classify(word.text).map_err(|kind| self.error(kind, word.span))?;
        Ok(Some(RawOperand {
            arg,
            text: word.text,
            indirect,
            span: word.span,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operand(line: &str) -> Result<Option<RawOperand<'_>>, AsmError> {
        Cursor::new(line, 0, 0).read_operand()
    }

    fn bracket_error(line: &str) -> BracketError {
        match operand(line) {
            Err(AsmError {
                kind: AsmErrorKind::Bracket(e),
                ..
            }) => e,
            other => panic!("expected bracket error for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn classify_tokens() {
        assert_eq!(classify("rax"), Ok(Arg::Reg(Register::Rax)));
        assert_eq!(classify("RDX"), Ok(Arg::Reg(Register::Rdx)));
        assert_eq!(classify("42"), Ok(Arg::Int(42)));
        assert_eq!(classify("-7"), Ok(Arg::Int(-7)));
        assert_eq!(classify("+7"), Ok(Arg::Int(7)));
        assert_eq!(classify("loop_1"), Ok(Arg::Label("loop_1")));
        assert_eq!(classify("_start"), Ok(Arg::Label("_start")));
    }

    #[test]
    fn classify_rejects_bad_tokens() {
        assert_eq!(
            classify("99999999999"),
            Err(AsmErrorKind::InvalidLiteral("99999999999".into()))
        );
        assert_eq!(
            classify("12ab"),
            Err(AsmErrorKind::InvalidLiteral("12ab".into()))
        );
        assert_eq!(
            classify("a$b"),
            Err(AsmErrorKind::InvalidLabel("a$b".into()))
        );
        assert_eq!(classify("-"), Err(AsmErrorKind::InvalidLabel("-".into())));
    }

    #[test]
    fn plain_operand() {
        let op = operand("  17 ; comment").unwrap().unwrap();
        assert_eq!(op.arg, Arg::Int(17));
        assert!(!op.indirect);
        assert_eq!(op.span, Span::new(2, 2));
    }

    #[test]
    fn bracketed_operand() {
        let op = operand("[ rbx ]").unwrap().unwrap();
        assert_eq!(op.arg, Arg::Reg(Register::Rbx));
        assert!(op.indirect);
        assert_eq!(op.span, Span::new(2, 3));

        let op = operand("[12]").unwrap().unwrap();
        assert_eq!(op.arg, Arg::Int(12));
        assert!(op.indirect);
    }

    #[test]
    fn no_operand() {
        assert_eq!(operand("").unwrap(), None);
        assert_eq!(operand("   ; only a comment").unwrap(), None);
    }

    #[test]
    fn unclosed_bracket() {
        assert_eq!(bracket_error("[rax"), BracketError::Unclosed);
        assert_eq!(bracket_error("[rax ; ]"), BracketError::Unclosed);
        assert_eq!(bracket_error("[[rax]"), BracketError::Unclosed);
        assert_eq!(bracket_error("rax["), BracketError::Unclosed);
    }

    #[test]
    fn empty_bracket() {
        assert_eq!(bracket_error("[]"), BracketError::Empty);
        assert_eq!(bracket_error("[   ]"), BracketError::Empty);
    }

    #[test]
    fn close_without_open() {
        assert_eq!(bracket_error("rax]"), BracketError::Unopened);
        assert_eq!(bracket_error("]"), BracketError::Unopened);
    }

    #[test]
    fn brackets_advance_cursor() {
        let mut cur = Cursor::new("[rcx] rest", 0, 0);
        let word = cur.detect_brackets().unwrap().unwrap();
        assert_eq!(word.text, "rcx");
        assert_eq!(cur.at_curr_pt(), " rest");
        assert_eq!(cur.detect_brackets().unwrap(), None);
        assert_eq!(cur.next_word().map(|w| w.text), Some("rest"));
    }
}
