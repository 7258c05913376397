use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use stackvm::output::{file_message, message, MsgColor};
use stackvm::{compile_with_names_table, disassemble, Program, SymbolTable};

/// Assemble a stack-machine source file into a binary image.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Source file to assemble
    input: PathBuf,
    /// Destination of the binary image
    #[arg(default_value = "data.code")]
    output: PathBuf,
    /// Check the source for errors without writing an image
    #[arg(short, long)]
    check: bool,
    /// Print the assembled instructions with their offsets
    #[arg(short, long)]
    listing: bool,
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(stackvm::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    file_message(Green, "Assembling", &args.input);
    let file = File::open(&args.input).into_diagnostic()?;
    let program = Program::read(BufReader::new(file))?;
    let (image, names) = compile_with_names_table(&program)?;
    message(
        Green,
        "Finished",
        format_args!("{} bytes, {} labels", image.payload().len(), names.len()),
    );

    if args.listing {
        print_listing(image.payload(), &names)?;
    }

    if args.check {
        message(Green, "Success", "no errors found!");
        return Ok(());
    }

    fs::write(&args.output, image.as_bytes()).into_diagnostic()?;
    file_message(Green, "Saved", &args.output);
    Ok(())
}

fn print_listing(payload: &[u8], names: &SymbolTable) -> Result<()> {
    let listing = disassemble(payload)?;
    for (at, instr) in listing {
        for (name, def) in names.iter() {
            if def.ip as usize == at {
                println!("{name}:");
            }
        }
        println!("{at:>6}    {instr}");
    }
    Ok(())
}
