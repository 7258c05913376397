use std::io::{BufRead, Write};

use crate::code::CodeReader;
use crate::error::{Fault, RunError};
use crate::image::BinaryImage;
use crate::ops::{Instruction, Opcode, Operand};
use crate::output;
use crate::stack::Stack;
use crate::symbol::Register;

/// Default amount of addressable memory cells for `[addr]` operands.
pub const DEFAULT_RAM_CELLS: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct CpuOptions {
    /// Print every executed instruction to stderr.
    pub trace: bool,
    /// Size of RAM in `i32` cells.
    pub ram_cells: usize,
}

impl Default for CpuOptions {
    fn default() -> Self {
        CpuOptions {
            trace: false,
            ram_cells: DEFAULT_RAM_CELLS,
        }
    }
}

/// Execution state of a single run over a validated image.
pub struct Cpu<'a> {
    /// Opcode stream, header already stripped
    code: &'a [u8],
    /// Operand stack, owned by the caller
    stack: &'a mut Stack,
    /// Instruction pointer, as byte offset into `code`
    ip: usize,
    /// 4x general purpose registers
    reg: [i32; 4],
    ram: Vec<i32>,
    /// Return addresses pushed by `call`
    calls: Vec<usize>,
    trace: bool,
}

/// What the loop does after an instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flow {
    Continue,
    Halt,
}

impl<'a> Cpu<'a> {
    pub fn new(image: &'a BinaryImage, stack: &'a mut Stack, options: CpuOptions) -> Self {
        Cpu {
            code: image.payload(),
            stack,
            ip: 0,
            reg: [0; 4],
            ram: vec![0; options.ram_cells],
            calls: Vec::new(),
            trace: options.trace,
        }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn reg(&self, reg: Register) -> i32 {
        self.reg[reg as usize]
    }

    pub fn ram(&self) -> &[i32] {
        &self.ram
    }

    pub fn stack(&self) -> &Stack {
        self.stack
    }

    /// Run until `hlt` or the first fatal condition.
    pub fn run(&mut self, input: &mut impl BufRead, output: &mut impl Write) -> Result<(), Fault> {
        loop {
            let at = self.ip;
            match self.step(input, output) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => return Ok(()),
                Err(error) => {
                    return Err(Fault {
                        error,
                        ip: at,
                        stack_len: self.stack.len(),
                    })
                }
            }
        }
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(
        &mut self,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<Flow, RunError> {
        if self.ip >= self.code.len() {
            return Err(RunError::UnexpectedEnd);
        }
        let mut reader = CodeReader::at(self.code, self.ip);
        let instr = Instruction::decode(&mut reader)?;
        if self.trace {
            output::trace(self.ip, &instr, self.stack.len());
        }
        // IP advanced before instruction is performed
        self.ip = reader.pos();

        match instr.opcode {
            Opcode::Hlt => return Ok(Flow::Halt),
            Opcode::Push => {
                let val = self.load(instr.operand)?;
                self.stack.push(val);
            }
            Opcode::Pop => {
                // Value stays on the stack if the destination is rejected
                let val = self.stack.peek()?;
                self.store(instr.operand, val)?;
                self.stack.pop()?;
            }
            Opcode::Add => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
            Opcode::Sub => self.binary(|a, b| Ok(a.wrapping_sub(b)))?,
            Opcode::Mul => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
            Opcode::Div => self.binary(|a, b| {
                if b == 0 {
                    return Err(RunError::DivisionByZero);
                }
                Ok(a.wrapping_div(b))
            })?,
            Opcode::Out => {
                let val = self.stack.peek()?;
                writeln!(output, "{val}")
                    .and_then(|_| output.flush())
                    .map_err(|e| RunError::Output(e.to_string()))?;
            }
            Opcode::In => {
                let val = read_value(input)?;
                self.stack.push(val);
            }
            Opcode::Jmp => self.jump(instr.operand)?,
            Opcode::Ja => self.jump_if(instr.operand, |a, b| a > b)?,
            Opcode::Jae => self.jump_if(instr.operand, |a, b| a >= b)?,
            Opcode::Jb => self.jump_if(instr.operand, |a, b| a < b)?,
            Opcode::Jbe => self.jump_if(instr.operand, |a, b| a <= b)?,
            Opcode::Je => self.jump_if(instr.operand, |a, b| a == b)?,
            Opcode::Jne => self.jump_if(instr.operand, |a, b| a != b)?,
            Opcode::Call => {
                let ret = self.ip;
                self.jump(instr.operand)?;
                self.calls.push(ret);
            }
            Opcode::Ret => {
                self.ip = self.calls.pop().ok_or(RunError::ReturnUnderflow)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Pop `b`, pop `a`, push `op(a, b)`.
    fn binary(&mut self, op: impl Fn(i32, i32) -> Result<i32, RunError>) -> Result<(), RunError> {
        let (a, b) = self.stack.pop_pair()?;
        let res = match op(a, b) {
            Ok(res) => res,
            Err(e) => {
                // Leave the operands where they were for diagnostics
                self.stack.push(a);
                self.stack.push(b);
                return Err(e);
            }
        };
        self.stack.push(res);
        Ok(())
    }

    fn jump_if(&mut self, target: Operand, cond: impl Fn(i32, i32) -> bool) -> Result<(), RunError> {
        let (a, b) = self.stack.pop_pair()?;
        if cond(a, b) {
            self.jump(target)?;
        }
        Ok(())
    }

    fn jump(&mut self, target: Operand) -> Result<(), RunError> {
        let Operand::Imm(target) = target else {
            unreachable!("decoder only produces immediate jump targets")
        };
        match usize::try_from(target) {
            Ok(ip) if ip < self.code.len() => {
                self.ip = ip;
                Ok(())
            }
            _ => Err(RunError::JumpOutOfBounds {
                target: target as i64,
            }),
        }
    }

    fn cell(&mut self, addr: i32) -> Result<&mut i32, RunError> {
        usize::try_from(addr)
            .ok()
            .and_then(|addr| self.ram.get_mut(addr))
            .ok_or(RunError::MemoryOutOfBounds { addr: addr as i64 })
    }

    fn load(&mut self, operand: Operand) -> Result<i32, RunError> {
        match operand {
            Operand::Imm(val) => Ok(val),
            Operand::Reg(reg) => Ok(self.reg(reg)),
            Operand::MemImm(addr) => Ok(*self.cell(addr)?),
            Operand::MemReg(reg) => Ok(*self.cell(self.reg(reg))?),
            Operand::None => unreachable!("decoder rejects push without operand"),
        }
    }

    fn store(&mut self, operand: Operand, val: i32) -> Result<(), RunError> {
        match operand {
            Operand::None => {}
            Operand::Reg(reg) => self.reg[reg as usize] = val,
            Operand::MemImm(addr) => *self.cell(addr)? = val,
            Operand::MemReg(reg) => *self.cell(self.reg(reg))? = val,
            Operand::Imm(_) => unreachable!("decoder rejects pop into an immediate"),
        }
        Ok(())
    }
}

/// Read one decimal integer per line.
fn read_value(input: &mut impl BufRead) -> Result<i32, RunError> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|e| RunError::Input(e.to_string()))?;
    if read == 0 {
        return Err(RunError::Input("end of input".to_string()));
    }
    line.trim()
        .parse()
        .map_err(|_| RunError::Input(format!("`{}` is not an integer", line.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::parser::compile;
    use crate::stack::StackError;
    use crate::Program;

    struct Outcome {
        result: Result<(), Fault>,
        stack: Vec<i32>,
        stdout: String,
    }

    fn run_with_input(src: &str, input: &str) -> Outcome {
        let image = compile(&Program::from_text(src).unwrap()).unwrap();
        run_image(&image, input)
    }

    fn run(src: &str) -> Outcome {
        run_with_input(src, "")
    }

    fn run_image(image: &BinaryImage, input: &str) -> Outcome {
        let mut stack = Stack::new();
        let mut stdout = Vec::new();
        let result = {
            let mut cpu = Cpu::new(image, &mut stack, CpuOptions::default());
            cpu.run(&mut input.as_bytes(), &mut stdout)
        };
        Outcome {
            result,
            stack: stack.as_slice().to_vec(),
            stdout: String::from_utf8(stdout).unwrap(),
        }
    }

    fn raw_image(payload: &[u8]) -> BinaryImage {
        BinaryImage::add_info(payload).unwrap()
    }

    #[test]
    fn sum_prints_and_keeps_value() {
        let out = run("push 5\npush 3\nadd\nout\nhlt");
        assert_eq!(out.result, Ok(()));
        assert_eq!(out.stdout, "8\n");
        assert_eq!(out.stack, [8]);
    }

    #[test]
    fn arithmetic_operand_order() {
        let out = run("push 10\npush 3\nsub\npush 4\nmul\npush 5\ndiv\nhlt");
        assert_eq!(out.result, Ok(()));
        // (10 - 3) * 4 / 5
        assert_eq!(out.stack, [5]);
    }

    #[test]
    fn arithmetic_wraps() {
        let out = run("push 2147483647\npush 1\nadd\nhlt");
        assert_eq!(out.stack, [i32::MIN]);
    }

    #[test]
    fn underflow_reports_stack_size() {
        let out = run("push 1\nadd\nhlt");
        assert_eq!(
            out.result,
            Err(Fault {
                error: RunError::Stack(StackError::Underflow {
                    needed: 2,
                    available: 1
                }),
                ip: 5,
                stack_len: 1,
            })
        );
        assert_eq!(out.stack, [1]);
    }

    #[test]
    fn pop_and_out_on_empty_stack() {
        for src in ["pop\nhlt", "out\nhlt"] {
            let out = run(src);
            let fault = out.result.unwrap_err();
            assert!(matches!(fault.error, RunError::Stack(_)), "{src}");
            assert_eq!(fault.stack_len, 0);
        }
    }

    #[test]
    fn division_by_zero_keeps_operands() {
        let out = run("push 1\npush 0\ndiv\nhlt");
        let fault = out.result.unwrap_err();
        assert_eq!(fault.error, RunError::DivisionByZero);
        assert_eq!(fault.stack_len, 2);
    }

    #[test]
    fn registers_and_memory() {
        let out = run(
            "push 7\npop rax\n\
             push 100\npop [3]\n\
             push 3\npop rbx\n\
             push [rbx]\npush rax\nadd\n\
             pop [rax]\npush [7]\nhlt",
        );
        assert_eq!(out.result, Ok(()));
        assert_eq!(out.stack, [107]);
    }

    #[test]
    fn memory_bounds() {
        let out = run("push [1024]\nhlt");
        assert_eq!(
            out.result.unwrap_err().error,
            RunError::MemoryOutOfBounds { addr: 1024 }
        );
        let out = run("push -1\npop rcx\npush 0\npop [rcx]\nhlt");
        assert_eq!(
            out.result.unwrap_err().error,
            RunError::MemoryOutOfBounds { addr: -1 }
        );
    }

    #[test]
    fn rejected_store_keeps_value() {
        let out = run("push 9\npop [5000]\nhlt");
        let fault = out.result.unwrap_err();
        assert_eq!(fault.error, RunError::MemoryOutOfBounds { addr: 5000 });
        assert_eq!(fault.stack_len, 1);
        assert_eq!(out.stack, [9]);
    }

    #[test]
    fn countdown_loop() {
        let out = run(
            "    push 3\n\
             loop:\n\
             \x20   out\n\
             \x20   push 1\n\
             \x20   sub\n\
             \x20   pop rax\n\
             \x20   push rax\n\
             \x20   push rax\n\
             \x20   push 0\n\
             \x20   ja loop\n\
             \x20   hlt",
        );
        assert_eq!(out.result, Ok(()));
        assert_eq!(out.stdout, "3\n2\n1\n");
        assert_eq!(out.stack, [0]);
    }

    #[test]
    fn conditional_jumps() {
        // (a, b, mnemonic, taken)
        let cases = [
            (2, 1, "ja", true),
            (1, 1, "ja", false),
            (1, 1, "jae", true),
            (0, 1, "jae", false),
            (0, 1, "jb", true),
            (1, 1, "jb", false),
            (1, 1, "jbe", true),
            (2, 1, "jbe", false),
            (4, 4, "je", true),
            (4, 5, "je", false),
            (4, 5, "jne", true),
            (5, 5, "jne", false),
        ];
        for (a, b, mnemonic, taken) in cases {
            let src = format!(
                "push {a}\npush {b}\n{mnemonic} yes\npush 0\nhlt\nyes: push 1\nhlt"
            );
            let out = run(&src);
            assert_eq!(out.result, Ok(()), "{src}");
            assert_eq!(out.stack, [taken as i32], "{src}");
        }
    }

    #[test]
    fn call_and_return() {
        let out = run(
            "    push 4\n\
             \x20   call square\n\
             \x20   out\n\
             \x20   hlt\n\
             square:\n\
             \x20   pop rax\n\
             \x20   push rax\n\
             \x20   push rax\n\
             \x20   mul\n\
             \x20   ret",
        );
        assert_eq!(out.result, Ok(()));
        assert_eq!(out.stdout, "16\n");
    }

    #[test]
    fn ret_without_call() {
        let out = run("ret");
        assert_eq!(out.result.unwrap_err().error, RunError::ReturnUnderflow);
    }

    #[test]
    fn input_is_pushed() {
        let out = run_with_input("in\nin\nadd\nout\nhlt", "40\n 2 \n");
        assert_eq!(out.result, Ok(()));
        assert_eq!(out.stdout, "42\n");
    }

    #[test]
    fn bad_input_is_fatal() {
        let out = run_with_input("in\nhlt", "forty\n");
        assert!(matches!(out.result.unwrap_err().error, RunError::Input(_)));
        let out = run_with_input("in\nhlt", "");
        assert!(matches!(out.result.unwrap_err().error, RunError::Input(_)));
    }

    #[test]
    fn jump_outside_payload() {
        let out = run("jmp 100\nhlt");
        assert_eq!(
            out.result.unwrap_err().error,
            RunError::JumpOutOfBounds { target: 100 }
        );
        let out = run("call -5\nhlt");
        assert_eq!(
            out.result.unwrap_err().error,
            RunError::JumpOutOfBounds { target: -5 }
        );
    }

    #[test]
    fn running_off_the_end() {
        let out = run("push 1");
        let fault = out.result.unwrap_err();
        assert_eq!(fault.error, RunError::UnexpectedEnd);
        assert_eq!(fault.ip, 5);
        assert_eq!(fault.stack_len, 1);
    }

    #[test]
    fn unknown_opcode_stops_immediately() {
        let out = run_image(&raw_image(&[Opcode::Push.id(), 1, 0, 0, 0, 0x3A, 0]), "");
        let fault = out.result.unwrap_err();
        assert_eq!(
            fault.error,
            RunError::Decode(DecodeError::UnknownOpcode { byte: 0x3A })
        );
        assert_eq!(fault.ip, 5);
        assert_eq!(fault.stack_len, 1);
    }

    #[test]
    fn truncated_operand_is_fatal() {
        let out = run_image(&raw_image(&[Opcode::Push.id(), 1]), "");
        assert_eq!(
            out.result.unwrap_err().error,
            RunError::Decode(DecodeError::Truncated { at: 1 })
        );
    }

    #[test]
    fn step_by_step() {
        let image = compile(&Program::from_text("push 2\npop rdx\nhlt").unwrap()).unwrap();
        let mut stack = Stack::new();
        let mut cpu = Cpu::new(&image, &mut stack, CpuOptions::default());
        let (mut input, mut output) = (&b""[..], Vec::new());

        assert_eq!(cpu.step(&mut input, &mut output), Ok(Flow::Continue));
        assert_eq!(cpu.ip(), 5);
        assert_eq!(cpu.stack().as_slice(), &[2]);
        assert_eq!(cpu.step(&mut input, &mut output), Ok(Flow::Continue));
        assert_eq!(cpu.reg(Register::Rdx), 2);
        assert_eq!(cpu.step(&mut input, &mut output), Ok(Flow::Halt));
    }
}
