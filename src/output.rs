use std::fmt::Display;
use std::path::Path;

use colored::Colorize;

use crate::ops::Instruction;

#[derive(Clone, Copy, Debug)]
pub enum MsgColor {
    Green,
    Red,
}

/// Print a status line with a right-aligned, colored verb.
pub fn message(color: MsgColor, left: &str, right: impl Display) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

pub fn file_message(color: MsgColor, left: &str, path: &Path) {
    message(color, left, format_args!("target {}", path.display()));
}

/// Trace line for a single executed instruction. Goes to stderr so program output stays clean.
pub(crate) fn trace(ip: usize, instr: &Instruction, depth: usize) {
    let ip = format!("{ip:04x}");
    eprintln!(
        "{} {:<12} {}",
        ip.cyan(),
        instr.to_string(),
        format!("depth {depth}").dimmed()
    );
}
