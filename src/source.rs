use std::io::{self, BufRead};

use crate::error::SourceError;

/// Source text split into owned lines, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    lines: Vec<String>,
}

impl Program {
    /// Read every line of `reader`. Line terminators (`\n` or `\r\n`) are not kept.
    ///
    /// Storage is reserved fallibly so running out of memory is reported instead of aborting.
    pub fn read(mut reader: impl BufRead) -> Result<Program, SourceError> {
        let mut lines: Vec<String> = Vec::new();
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let read = reader.read_until(b'\n', &mut raw).map_err(SourceError::Read)?;
            if read == 0 {
                break;
            }
            let text = std::str::from_utf8(&raw)
                .map_err(|e| SourceError::Read(io::Error::new(io::ErrorKind::InvalidData, e)))?;
            let text = text.strip_suffix('\n').unwrap_or(text);
            let text = text.strip_suffix('\r').unwrap_or(text);

            if lines.len() == lines.capacity() {
                lines
                    .try_reserve(lines.len().max(8))
                    .map_err(|_| SourceError::ProgramStorage)?;
            }
            let mut line = String::new();
            line.try_reserve_exact(text.len())
                .map_err(|_| SourceError::LineStorage { line: lines.len() })?;
            line.push_str(text);
            lines.push(line);
        }

        lines.shrink_to_fit();
        Ok(Program { lines })
    }

    pub fn from_text(text: &str) -> Result<Program, SourceError> {
        Self::read(text.as_bytes())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Byte offset of each line within [`Program::text`].
    pub fn line_offsets(&self) -> Vec<usize> {
        let mut offs = 0;
        self.lines
            .iter()
            .map(|line| {
                let start = offs;
                offs += line.len() + 1;
                start
            })
            .collect()
    }

    /// Lines joined with `\n`, used as diagnostic source.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}
