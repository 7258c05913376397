// Loading
mod source;
pub use source::Program;
mod span;
pub use span::Span;

// Assembling
mod lexer;
mod parser;
pub use parser::{compile, compile_with_names_table};
mod symbol;
pub use symbol::{LabelDef, Register, SymbolTable};

// Binary format
mod code;
mod image;
pub use image::{BinaryImage, HEADER_LEN, MAGIC, VERSION};
mod ops;
pub use ops::{disassemble, Instruction, Opcode, Operand};

// Running
mod runtime;
pub use runtime::{Cpu, CpuOptions, Flow, DEFAULT_RAM_CELLS};
mod stack;
pub use stack::{Stack, StackError};

pub mod error;
pub use error::{CompileError, Fault, ImageError, SourceError};

pub mod env;
pub mod output;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
