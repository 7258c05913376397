use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use stackvm::output::{file_message, message, MsgColor};
use stackvm::{env, BinaryImage, Cpu, CpuOptions, Stack};

/// Execute a binary image produced by `asm`.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Binary image to run
    #[arg(default_value = "data.code")]
    path: PathBuf,
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(stackvm::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    file_message(Green, "Loading", &args.path);
    let bytes = fs::read(&args.path).into_diagnostic()?;
    let image = BinaryImage::from_bytes(bytes)?;

    let options = CpuOptions {
        trace: env::is_trace_enabled(),
        ram_cells: env::ram_cells(),
    };
    let mut stack = Stack::new();
    message(Green, "Running", format_args!("{} bytes", image.payload().len()));

    let result = {
        let mut cpu = Cpu::new(&image, &mut stack, options);
        let stdin = io::stdin();
        let mut stdout = BufWriter::new(io::stdout().lock());
        cpu.run(&mut stdin.lock(), &mut stdout)
    };
    match result {
        Ok(()) => {
            message(Green, "Halted", format_args!("stack size {}", stack.len()));
            Ok(())
        }
        Err(fault) => {
            message(Red, "Faulted", format_args!("stack size {}", fault.stack_len));
            Err(fault.into())
        }
    }
}
