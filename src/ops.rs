use std::fmt;

use crate::code::{CodeReader, CodeWriter};
use crate::error::DecodeError;
use crate::symbol::Register;

/// Low bits of the opcode byte hold the base command id.
pub const BASE_MASK: u8 = 0x3F;
/// Operand is a register id.
pub const REG_MODE: u8 = 0x40;
/// Operand is a memory address (bracket syntax).
pub const MEM_MODE: u8 = 0x80;
/// Width of an encoded operand.
pub const OPERAND_LEN: usize = 4;

/// Base command ids, as stored in the low bits of the opcode byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Opcode {
    Hlt = 0,
    Push,
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    /// Print the top of the stack without removing it
    Out,
    In,
    Jmp,
    Ja,
    Jae,
    Jb,
    Jbe,
    Je,
    Jne,
    Call,
    Ret,
}

/// Which operands an opcode accepts.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandClass {
    /// No operand.
    Nullary,
    /// A value to read: immediate, register, `[addr]` or `[reg]`.
    Source,
    /// Optional place to write: register, `[addr]` or `[reg]`.
    Sink,
    /// A code offset, written as a label or a literal.
    Target,
}

impl OperandClass {
    pub fn accepts(self, mode: AddrMode) -> bool {
        use AddrMode as M;
        match self {
            OperandClass::Nullary => mode == M::None,
            OperandClass::Source => matches!(mode, M::Imm | M::Reg | M::MemImm | M::MemReg),
            OperandClass::Sink => matches!(mode, M::None | M::Reg | M::MemImm | M::MemReg),
            OperandClass::Target => mode == M::Imm,
        }
    }
}

impl Opcode {
    pub const ALL: [Opcode; 18] = [
        Opcode::Hlt,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Out,
        Opcode::In,
        Opcode::Jmp,
        Opcode::Ja,
        Opcode::Jae,
        Opcode::Jb,
        Opcode::Jbe,
        Opcode::Je,
        Opcode::Jne,
        Opcode::Call,
        Opcode::Ret,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Opcode> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlt => "hlt",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Out => "out",
            Opcode::In => "in",
            Opcode::Jmp => "jmp",
            Opcode::Ja => "ja",
            Opcode::Jae => "jae",
            Opcode::Jb => "jb",
            Opcode::Jbe => "jbe",
            Opcode::Je => "je",
            Opcode::Jne => "jne",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
        }
    }

    /// Case-insensitive lookup of a mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }

    pub fn class(self) -> OperandClass {
        match self {
            Opcode::Push => OperandClass::Source,
            Opcode::Pop => OperandClass::Sink,
            Opcode::Jmp
            | Opcode::Ja
            | Opcode::Jae
            | Opcode::Jb
            | Opcode::Jbe
            | Opcode::Je
            | Opcode::Jne
            | Opcode::Call => OperandClass::Target,
            Opcode::Hlt
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Out
            | Opcode::In
            | Opcode::Ret => OperandClass::Nullary,
        }
    }
}

/// How an operand is interpreted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AddrMode {
    None,
    Imm,
    Reg,
    /// `[addr]`
    MemImm,
    /// `[reg]`
    MemReg,
}

impl AddrMode {
    /// Bits OR-ed into the opcode byte.
    pub fn bits(self) -> u8 {
        match self {
            AddrMode::None | AddrMode::Imm => 0,
            AddrMode::Reg => REG_MODE,
            AddrMode::MemImm => MEM_MODE,
            AddrMode::MemReg => MEM_MODE | REG_MODE,
        }
    }

    pub fn has_operand(self) -> bool {
        self != AddrMode::None
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    None,
    Imm(i32),
    Reg(Register),
    MemImm(i32),
    MemReg(Register),
}

impl Operand {
    pub fn mode(&self) -> AddrMode {
        match self {
            Operand::None => AddrMode::None,
            Operand::Imm(_) => AddrMode::Imm,
            Operand::Reg(_) => AddrMode::Reg,
            Operand::MemImm(_) => AddrMode::MemImm,
            Operand::MemReg(_) => AddrMode::MemReg,
        }
    }
}

/// Decoded instruction. Mode bits only exist in the encoded form.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        debug_assert!(opcode.class().accepts(operand.mode()));
        Instruction { opcode, operand }
    }

    pub fn mode(&self) -> AddrMode {
        self.operand.mode()
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        if self.mode().has_operand() {
            1 + OPERAND_LEN
        } else {
            1
        }
    }

    pub fn encode(&self, out: &mut CodeWriter) {
        out.put_u8(self.opcode.id() | self.mode().bits());
        match self.operand {
            Operand::None => {}
            Operand::Imm(val) | Operand::MemImm(val) => out.put_i32(val),
            Operand::Reg(reg) | Operand::MemReg(reg) => out.put_u32(reg.id()),
        }
    }

    /// Decode one instruction, leaving `reader` just past it.
    pub fn decode(reader: &mut CodeReader) -> Result<Instruction, DecodeError> {
        let byte = reader.u8()?;
        let opcode =
            Opcode::from_id(byte & BASE_MASK).ok_or(DecodeError::UnknownOpcode { byte })?;
        let mode = decode_mode(opcode.class(), byte & !BASE_MASK)
            .ok_or(DecodeError::InvalidMode { byte })?;

        let operand = match mode {
            AddrMode::None => Operand::None,
            AddrMode::Imm => Operand::Imm(reader.i32()?),
            AddrMode::MemImm => Operand::MemImm(reader.i32()?),
            AddrMode::Reg => Operand::Reg(read_register(reader)?),
            AddrMode::MemReg => Operand::MemReg(read_register(reader)?),
        };
        Ok(Instruction { opcode, operand })
    }
}

fn read_register(reader: &mut CodeReader) -> Result<Register, DecodeError> {
    let id = reader.u32()?;
    Register::from_id(id).ok_or(DecodeError::BadRegister { id })
}

fn decode_mode(class: OperandClass, bits: u8) -> Option<AddrMode> {
    let mode = match (class, bits) {
        (OperandClass::Nullary | OperandClass::Sink, 0) => AddrMode::None,
        (OperandClass::Source | OperandClass::Target, 0) => AddrMode::Imm,
        (_, REG_MODE) => AddrMode::Reg,
        (_, MEM_MODE) => AddrMode::MemImm,
        (_, bits) if bits == MEM_MODE | REG_MODE => AddrMode::MemReg,
        _ => return None,
    };
    class.accepts(mode).then_some(mode)
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        match self.operand {
            Operand::None => Ok(()),
            Operand::Imm(val) => write!(f, " {val}"),
            Operand::Reg(reg) => write!(f, " {reg}"),
            Operand::MemImm(addr) => write!(f, " [{addr}]"),
            Operand::MemReg(reg) => write!(f, " [{reg}]"),
        }
    }
}

/// Decode a whole payload into `(offset, instruction)` pairs.
pub fn disassemble(payload: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut reader = CodeReader::new(payload);
    let mut listing = Vec::new();
    while !reader.is_at_end() {
        let at = reader.pos();
        listing.push((at, Instruction::decode(&mut reader)?));
    }
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(instr: Instruction) -> Vec<u8> {
        let mut out = CodeWriter::new();
        instr.encode(&mut out);
        out.into_inner()
    }

    #[test]
    fn mnemonic_table_is_consistent() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_id(op.id()), Some(op));
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(op));
            assert!(op.id() <= BASE_MASK);
        }
        assert_eq!(Opcode::from_mnemonic("PUSH"), Some(Opcode::Push));
        assert_eq!(Opcode::from_mnemonic("mov"), None);
    }

    #[test]
    fn mode_bits_in_opcode_byte() {
        let bytes = encoded(Instruction::new(Opcode::Push, Operand::MemReg(Register::Rcx)));
        assert_eq!(bytes[0], Opcode::Push.id() | MEM_MODE | REG_MODE);
        assert_eq!(&bytes[1..], &2u32.to_ne_bytes());

        let bytes = encoded(Instruction::new(Opcode::Add, Operand::None));
        assert_eq!(bytes, [Opcode::Add.id()]);
    }

    #[test]
    fn operand_widths() {
        assert_eq!(Instruction::new(Opcode::Hlt, Operand::None).len(), 1);
        assert_eq!(Instruction::new(Opcode::Push, Operand::Imm(1)).len(), 5);
        assert_eq!(Instruction::new(Opcode::Pop, Operand::None).len(), 1);
        assert_eq!(
            Instruction::new(Opcode::Pop, Operand::Reg(Register::Rax)).len(),
            5
        );
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        let bytes = [0x3F];
        assert_eq!(
            Instruction::decode(&mut CodeReader::new(&bytes)),
            Err(DecodeError::UnknownOpcode { byte: 0x3F })
        );
    }

    #[test]
    fn decode_rejects_modes_the_opcode_cannot_take() {
        for byte in [
            Opcode::Add.id() | REG_MODE,
            Opcode::Jmp.id() | MEM_MODE,
            Opcode::Hlt.id() | MEM_MODE | REG_MODE,
        ] {
            let bytes = [byte, 0, 0, 0, 0];
            assert_eq!(
                Instruction::decode(&mut CodeReader::new(&bytes)),
                Err(DecodeError::InvalidMode { byte })
            );
        }
    }

    #[test]
    fn decode_rejects_bad_register() {
        let mut bytes = vec![Opcode::Push.id() | REG_MODE];
        bytes.extend_from_slice(&9u32.to_ne_bytes());
        assert_eq!(
            Instruction::decode(&mut CodeReader::new(&bytes)),
            Err(DecodeError::BadRegister { id: 9 })
        );
    }

    #[test]
    fn decode_truncated_operand() {
        let bytes = [Opcode::Push.id(), 1, 0];
        assert_eq!(
            Instruction::decode(&mut CodeReader::new(&bytes)),
            Err(DecodeError::Truncated { at: 1 })
        );
    }

    #[test]
    fn display_uses_source_syntax() {
        let cases = [
            (Instruction::new(Opcode::Push, Operand::Imm(-4)), "push -4"),
            (Instruction::new(Opcode::Push, Operand::Reg(Register::Rbx)), "push rbx"),
            (Instruction::new(Opcode::Pop, Operand::MemImm(3)), "pop [3]"),
            (Instruction::new(Opcode::Pop, Operand::MemReg(Register::Rdx)), "pop [rdx]"),
            (Instruction::new(Opcode::Ret, Operand::None), "ret"),
        ];
        for (instr, text) in cases {
            assert_eq!(instr.to_string(), text);
        }
    }

    #[test]
    fn disassemble_walks_payload() {
        let mut out = CodeWriter::new();
        Instruction::new(Opcode::Push, Operand::Imm(2)).encode(&mut out);
        Instruction::new(Opcode::Out, Operand::None).encode(&mut out);
        Instruction::new(Opcode::Hlt, Operand::None).encode(&mut out);
        let listing = disassemble(out.as_slice()).unwrap();
        let offsets: Vec<_> = listing.iter().map(|(at, _)| *at).collect();
        assert_eq!(offsets, [0, 5, 6]);
        assert_eq!(listing[1].1.opcode, Opcode::Out);
    }
}
