use std::fmt::{self, Display};
use std::io;

use miette::{Diagnostic, LabeledSpan, Severity, SourceCode};

use crate::span::Span;
use crate::stack::StackError;

// Loader errors

/// Failure to turn raw input into a [`Program`](crate::Program).
#[derive(Debug)]
pub enum SourceError {
    /// Could not reserve room for the line array.
    ProgramStorage,
    /// Could not reserve room for the text of a line.
    LineStorage { line: usize },
    Read(io::Error),
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(e) => Some(e),
            _ => None,
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramStorage => write!(f, "Cannot allocate memory for program lines"),
            Self::LineStorage { line } => {
                write!(f, "Cannot allocate memory for line {}", line + 1)
            }
            Self::Read(e) => write!(f, "Failed to read source: {e}"),
        }
    }
}

impl Diagnostic for SourceError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let code = match self {
            Self::ProgramStorage => "source::program_storage",
            Self::LineStorage { .. } => "source::line_storage",
            Self::Read(_) => "source::read",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        match self {
            Self::Read(_) => Some(Box::new("check that the source is a readable text file")),
            _ => None,
        }
    }
}

// Assembler errors

/// Malformed use of `[` and `]` on a line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BracketError {
    /// `[` without a matching `]`.
    Unclosed,
    /// `[]` with nothing inside.
    Empty,
    /// `]` without a preceding `[`.
    Unopened,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AsmErrorKind {
    UnknownMnemonic(String),
    MissingOperand { mnemonic: &'static str },
    UnexpectedOperand { mnemonic: &'static str },
    /// Operand is well-formed but not accepted by this instruction.
    InvalidOperand { mnemonic: &'static str, found: String },
    InvalidLiteral(String),
    InvalidLabel(String),
    Bracket(BracketError),
    UnresolvedLabel(String),
    /// Second definition of a label. `first_line` is zero-based.
    DuplicateLabel { name: String, first_line: usize },
    TrailingInput(String),
}

impl AsmErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownMnemonic(_) => "asm::unknown_mnemonic",
            Self::MissingOperand { .. } => "asm::missing_operand",
            Self::UnexpectedOperand { .. } => "asm::unexpected_operand",
            Self::InvalidOperand { .. } => "asm::invalid_operand",
            Self::InvalidLiteral(_) => "asm::bad_lit",
            Self::InvalidLabel(_) => "asm::bad_label",
            Self::Bracket(_) => "asm::bracket",
            Self::UnresolvedLabel(_) => "asm::unresolved_label",
            Self::DuplicateLabel { .. } => "asm::duplicate_label",
            Self::TrailingInput(_) => "asm::trailing_input",
        }
    }

    fn help(&self) -> Option<String> {
        let help = match self {
            Self::UnknownMnemonic(_) => {
                "lines should start with an instruction or a `label:` definition".to_string()
            }
            Self::MissingOperand { mnemonic } => format!("`{mnemonic}` requires an operand"),
            Self::UnexpectedOperand { mnemonic } => format!("`{mnemonic}` takes no operand"),
            Self::InvalidOperand { mnemonic, .. } => {
                format!("check the type of operands allowed for `{mnemonic}`")
            }
            Self::InvalidLiteral(_) => {
                "literals are decimal and range from -2,147,483,648 to 2,147,483,647".to_string()
            }
            Self::InvalidLabel(_) => {
                "labels are letters, digits and `_`, and cannot be register names".to_string()
            }
            Self::Bracket(BracketError::Unclosed) => "close the operand with `]`".to_string(),
            Self::Bracket(BracketError::Empty) => {
                "put a register or an address inside the brackets".to_string()
            }
            Self::Bracket(BracketError::Unopened) => {
                "open the indirect operand with `[`".to_string()
            }
            Self::UnresolvedLabel(_) => "define the label with `name:` on some line".to_string(),
            Self::DuplicateLabel { first_line, .. } => {
                format!("labels may only be defined once; first defined on line {}", first_line + 1)
            }
            Self::TrailingInput(_) => "put a single instruction on each line".to_string(),
        };
        Some(help)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::UnknownMnemonic(_) => "unknown mnemonic",
            Self::MissingOperand { .. } => "operand expected after this",
            Self::UnexpectedOperand { .. } => "unexpected operand",
            Self::InvalidOperand { .. } => "invalid operand",
            Self::InvalidLiteral(_) => "incorrect literal",
            Self::InvalidLabel(_) => "incorrect label",
            Self::Bracket(_) => "bracket mismatch",
            Self::UnresolvedLabel(_) => "undefined label",
            Self::DuplicateLabel { .. } => "duplicate label",
            Self::TrailingInput(_) => "unexpected token",
        }
    }
}

impl Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMnemonic(name) => write!(f, "Unknown mnemonic `{name}`"),
            Self::MissingOperand { mnemonic } => write!(f, "Missing operand for `{mnemonic}`"),
            Self::UnexpectedOperand { mnemonic } => {
                write!(f, "Unexpected operand for `{mnemonic}`")
            }
            Self::InvalidOperand { mnemonic, found } => {
                write!(f, "Invalid operand `{found}` for `{mnemonic}`")
            }
            Self::InvalidLiteral(lit) => write!(f, "Encountered an invalid literal `{lit}`"),
            Self::InvalidLabel(name) => write!(f, "Invalid label name `{name}`"),
            Self::Bracket(BracketError::Unclosed) => write!(f, "Unclosed bracket"),
            Self::Bracket(BracketError::Empty) => write!(f, "Empty brackets"),
            Self::Bracket(BracketError::Unopened) => {
                write!(f, "Closing bracket without opening bracket")
            }
            Self::UnresolvedLabel(name) => write!(f, "Unresolved label `{name}`"),
            Self::DuplicateLabel { name, .. } => write!(f, "Duplicate label `{name}`"),
            Self::TrailingInput(rest) => write!(f, "Unexpected trailing input `{rest}`"),
        }
    }
}

/// Error on a single source line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    /// Zero-based source line.
    pub line: usize,
    pub span: Span,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, line: usize, span: Span) -> Self {
        AsmError { kind, line, span }
    }
}

impl std::error::Error for AsmError {}

impl Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line + 1, self.kind)
    }
}

impl Diagnostic for AsmError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn severity(&self) -> Option<Severity> {
        Some(Severity::Error)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        self.kind
            .help()
            .map(|help| Box::new(help) as Box<dyn Display + 'a>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(LabeledSpan::at(
            self.span,
            self.kind.label(),
        ))))
    }
}

/// Failure of a whole compilation run. No partial output is produced.
#[derive(Debug)]
pub enum CompileError {
    /// Every error found in the pass that failed, in source order.
    Rejected { errors: Vec<AsmError>, src: String },
    /// Could not allocate the exact-sized output image.
    ImageStorage { len: usize },
}

impl CompileError {
    /// Errors attached to source lines. Empty for storage failures.
    pub fn errors(&self) -> &[AsmError] {
        match self {
            Self::Rejected { errors, .. } => errors,
            Self::ImageStorage { .. } => &[],
        }
    }
}

impl std::error::Error for CompileError {}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { errors, .. } if errors.len() == 1 => {
                write!(f, "Compilation failed: {}", errors[0])
            }
            Self::Rejected { errors, .. } => {
                write!(f, "Compilation failed with {} errors", errors.len())
            }
            Self::ImageStorage { len } => {
                write!(f, "Cannot allocate {len} bytes for the compiled image")
            }
        }
    }
}

impl Diagnostic for CompileError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let code = match self {
            Self::Rejected { .. } => "asm::compilation_failed",
            Self::ImageStorage { .. } => "asm::image_storage",
        };
        Some(Box::new(code))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        match self {
            Self::Rejected { src, .. } => Some(src as &dyn SourceCode),
            Self::ImageStorage { .. } => None,
        }
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        match self {
            Self::Rejected { errors, .. } => Some(Box::new(
                errors.iter().map(|e| e as &dyn Diagnostic),
            )),
            Self::ImageStorage { .. } => None,
        }
    }
}

// Binary format errors

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImageError {
    /// Fewer bytes than the header needs.
    Truncated { len: usize },
    BadMagic { found: usize },
    BadVersion { found: usize },
    /// Header length field disagrees with the bytes present.
    LengthMismatch { declared: usize, actual: usize },
}

impl std::error::Error for ImageError {}

impl Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len } => write!(f, "Image of {len} bytes is too short for a header"),
            Self::BadMagic { found } => write!(f, "Bad image signature {found:#x}"),
            Self::BadVersion { found } => write!(f, "Unsupported image version {found}"),
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "Image declares {declared} payload bytes but contains {actual}"
            ),
        }
    }
}

impl Diagnostic for ImageError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let code = match self {
            Self::Truncated { .. } => "image::truncated",
            Self::BadMagic { .. } => "image::magic",
            Self::BadVersion { .. } => "image::version",
            Self::LengthMismatch { .. } => "image::length",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new("recompile the source with a matching `asm`"))
    }
}

// Decoding and runtime errors

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecodeError {
    UnknownOpcode { byte: u8 },
    /// Mode bits not accepted by the opcode.
    InvalidMode { byte: u8 },
    BadRegister { id: u32 },
    /// Operand runs past the end of the payload.
    Truncated { at: usize },
}

impl std::error::Error for DecodeError {}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { byte } => write!(f, "unknown opcode byte {byte:#04x}"),
            Self::InvalidMode { byte } => write!(f, "invalid addressing mode in {byte:#04x}"),
            Self::BadRegister { id } => write!(f, "invalid register id {id}"),
            Self::Truncated { at } => write!(f, "operand truncated at offset {at}"),
        }
    }
}

impl Diagnostic for DecodeError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        let code = match self {
            Self::UnknownOpcode { .. } => "decode::unknown_opcode",
            Self::InvalidMode { .. } => "decode::invalid_mode",
            Self::BadRegister { .. } => "decode::bad_register",
            Self::Truncated { .. } => "decode::truncated",
        };
        Some(Box::new(code))
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RunError {
    Decode(DecodeError),
    Stack(StackError),
    /// `ret` without a matching `call`.
    ReturnUnderflow,
    JumpOutOfBounds { target: i64 },
    /// Instruction pointer ran past the last instruction without `hlt`.
    UnexpectedEnd,
    DivisionByZero,
    MemoryOutOfBounds { addr: i64 },
    Input(String),
    Output(String),
}

impl RunError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "cpu::decode",
            Self::Stack(_) => "cpu::stack_underflow",
            Self::ReturnUnderflow => "cpu::return_underflow",
            Self::JumpOutOfBounds { .. } => "cpu::jump_bounds",
            Self::UnexpectedEnd => "cpu::unexpected_end",
            Self::DivisionByZero => "cpu::division_by_zero",
            Self::MemoryOutOfBounds { .. } => "cpu::memory_bounds",
            Self::Input(_) => "cpu::input",
            Self::Output(_) => "cpu::output",
        }
    }
}

impl From<DecodeError> for RunError {
    fn from(value: DecodeError) -> Self {
        RunError::Decode(value)
    }
}

impl From<StackError> for RunError {
    fn from(value: StackError) -> Self {
        RunError::Stack(value)
    }
}

impl std::error::Error for RunError {}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "cannot decode instruction: {e}"),
            Self::Stack(e) => write!(f, "{e}"),
            Self::ReturnUnderflow => write!(f, "`ret` without a pending `call`"),
            Self::JumpOutOfBounds { target } => {
                write!(f, "control transfer to {target} is outside the payload")
            }
            Self::UnexpectedEnd => write!(f, "reached end of payload without `hlt`"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::MemoryOutOfBounds { addr } => write!(f, "memory address {addr} out of range"),
            Self::Input(e) => write!(f, "cannot read input: {e}"),
            Self::Output(e) => write!(f, "cannot write output: {e}"),
        }
    }
}

/// Fatal condition that ended a run.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Fault {
    pub error: RunError,
    /// Offset of the instruction that faulted.
    pub ip: usize,
    /// Stack depth at the moment of the fault.
    pub stack_len: usize,
}

impl std::error::Error for Fault {}

impl Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Execution failed at ip {}: {} (stack size: {})",
            self.ip, self.error, self.stack_len
        )
    }
}

impl Diagnostic for Fault {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(self.error.code()))
    }

    fn severity(&self) -> Option<Severity> {
        Some(Severity::Error)
    }
}
