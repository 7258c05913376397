use crate::code::CodeWriter;
use crate::error::{AsmError, AsmErrorKind, CompileError};
use crate::image::BinaryImage;
use crate::lexer::{is_ident, Arg, Cursor, RawOperand};
use crate::ops::{Instruction, Opcode, Operand, OperandClass};
use crate::source::Program;
use crate::span::Span;
use crate::symbol::{Register, SymbolTable};

/// Compile a whole program into a header-prefixed image.
pub fn compile(program: &Program) -> Result<BinaryImage, CompileError> {
    compile_with_names_table(program).map(|(image, _)| image)
}

/// Compile a program, also returning the labels collected in the first pass.
///
/// Pass 1 records the offset of every label definition and encodes references with a
/// placeholder of the same width. Pass 2 re-walks the lines and writes resolved offsets, so a
/// label may be used before it is defined.
pub fn compile_with_names_table(
    program: &Program,
) -> Result<(BinaryImage, SymbolTable), CompileError> {
    let parser = AsmParser::new(program);
    let mut table = SymbolTable::new();

    let (_, errors) = parser.pass(Labels::Deferred, |name, ip, line, span| {
        table.insert(name, ip, line).map_err(|first| {
            AsmError::new(
                AsmErrorKind::DuplicateLabel {
                    name: name.to_string(),
                    first_line: first.line,
                },
                line,
                span,
            )
        })
    });
    if !errors.is_empty() {
        return Err(parser.reject(errors));
    }

    let (code, errors) = parser.pass(Labels::Resolved(&table), |_, _, _, _| Ok(()));
    if !errors.is_empty() {
        return Err(parser.reject(errors));
    }

    let image = BinaryImage::add_info(code.as_slice())?;
    Ok((image, table))
}

/// Whether label references can be resolved yet.
#[derive(Clone, Copy)]
enum Labels<'t> {
    /// First pass: emit a placeholder.
    Deferred,
    Resolved(&'t SymbolTable),
}

/// Turns source lines into encoded instructions.
struct AsmParser<'p> {
    program: &'p Program,
    /// Offset of each line within the joined program text, for diagnostics
    offsets: Vec<usize>,
}

impl<'p> AsmParser<'p> {
    fn new(program: &'p Program) -> Self {
        AsmParser {
            program,
            offsets: program.line_offsets(),
        }
    }

    fn reject(&self, errors: Vec<AsmError>) -> CompileError {
        CompileError::Rejected {
            errors,
            src: self.program.text(),
        }
    }

    /// Walk every line once. `define` is called for each label definition with the offset of the
    /// next instruction. Returns the emitted code and every error encountered.
    fn pass(
        &self,
        labels: Labels,
        mut define: impl FnMut(&str, u32, usize, Span) -> Result<(), AsmError>,
    ) -> (CodeWriter, Vec<AsmError>) {
        let mut encoder = Encoder {
            out: CodeWriter::new(),
            labels,
        };
        let mut errors = Vec::new();

        for (idx, line) in self.program.lines().iter().enumerate() {
            let mut cur = Cursor::new(line, idx, self.offsets[idx]);
            if let Err(e) = self.line(&mut cur, &mut encoder, &mut define) {
                errors.push(e);
            }
        }
        (encoder.out, errors)
    }

    fn line(
        &self,
        cur: &mut Cursor,
        encoder: &mut Encoder,
        define: &mut impl FnMut(&str, u32, usize, Span) -> Result<(), AsmError>,
    ) -> Result<(), AsmError> {
        // Blank and comment-only lines
        let Some(mut word) = cur.next_word() else {
            return Ok(());
        };

        if let Some(name) = word.text.strip_suffix(':') {
            let span = Span::new(word.span.offs(), name.len());
            if !is_ident(name) || name.parse::<Register>().is_ok() {
                return Err(AsmError::new(
                    AsmErrorKind::InvalidLabel(name.to_string()),
                    cur.line(),
                    span,
                ));
            }
            define(name, encoder.out.len() as u32, cur.line(), span)?;
            // Label may share the line with an instruction
            match cur.next_word() {
                Some(next) => word = next,
                None => return Ok(()),
            }
        }

        let opcode = Opcode::from_mnemonic(word.text).ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::UnknownMnemonic(word.text.to_string()),
                cur.line(),
                word.span,
            )
        })?;
        encoder.put_args(opcode, word.span, cur)?;
        Ok(())
    }
}

/// Output stream of one pass.
struct Encoder<'t> {
    out: CodeWriter,
    labels: Labels<'t>,
}

impl Encoder<'_> {
    /// Parse the operands `opcode` expects from the rest of the line and emit the instruction.
    ///
    /// Nothing is written if the line is rejected, so offsets stay consistent between passes.
    fn put_args(
        &mut self,
        opcode: Opcode,
        at: Span,
        cur: &mut Cursor,
    ) -> Result<Instruction, AsmError> {
        let mnemonic = opcode.mnemonic();
        let line = cur.line();
        let class = opcode.class();

        let operand = match (class, cur.read_operand()?) {
            (OperandClass::Nullary | OperandClass::Sink, None) => Operand::None,
            (_, None) => {
                return Err(AsmError::new(
                    AsmErrorKind::MissingOperand { mnemonic },
                    line,
                    at,
                ))
            }
            (OperandClass::Nullary, Some(raw)) => {
                return Err(AsmError::new(
                    AsmErrorKind::UnexpectedOperand { mnemonic },
                    line,
                    raw.span,
                ))
            }
            (OperandClass::Target, Some(raw)) => self.target(mnemonic, raw, line)?,
            (OperandClass::Source | OperandClass::Sink, Some(raw)) => {
                let operand = match (raw.arg, raw.indirect) {
                    (Arg::Int(val), false) => Some(Operand::Imm(val)),
                    (Arg::Int(addr), true) => Some(Operand::MemImm(addr)),
                    (Arg::Reg(reg), false) => Some(Operand::Reg(reg)),
                    (Arg::Reg(reg), true) => Some(Operand::MemReg(reg)),
                    (Arg::Label(_), _) => None,
                };
                match operand {
                    Some(operand) if class.accepts(operand.mode()) => operand,
                    _ => return Err(invalid_operand(mnemonic, raw, line)),
                }
            }
        };

        if let Some(extra) = cur.next_word() {
            cur.check_brackets(extra)?;
            return Err(AsmError::new(
                AsmErrorKind::TrailingInput(extra.text.to_string()),
                line,
                extra.span,
            ));
        }

        let instr = Instruction::new(opcode, operand);
        instr.encode(&mut self.out);
        Ok(instr)
    }

    /// Jump and call targets: a label or a literal offset.
    fn target(
        &self,
        mnemonic: &'static str,
        raw: RawOperand,
        line: usize,
    ) -> Result<Operand, AsmError> {
        if raw.indirect {
            return Err(invalid_operand(mnemonic, raw, line));
        }
        match raw.arg {
            Arg::Int(offs) => Ok(Operand::Imm(offs)),
            Arg::Reg(_) => Err(invalid_operand(mnemonic, raw, line)),
            Arg::Label(name) => match self.labels {
                Labels::Deferred => Ok(Operand::Imm(0)),
                Labels::Resolved(table) => match table.get(name) {
                    Some(ip) => Ok(Operand::Imm(ip as i32)),
                    None => Err(AsmError::new(
                        AsmErrorKind::UnresolvedLabel(name.to_string()),
                        line,
                        raw.span,
                    )),
                },
            },
        }
    }
}

fn invalid_operand(mnemonic: &'static str, raw: RawOperand, line: usize) -> AsmError {
    AsmError::new(
        AsmErrorKind::InvalidOperand {
            mnemonic,
            found: raw.text.to_string(),
        },
        line,
        raw.span,
    )
}
