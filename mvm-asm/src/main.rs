use clap::{Parser as CParser, Subcommand};
use mvm_lang::runtime::disasm;
use mvm_lang::{VM, translate};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(CParser)]
#[command(name = "mvm")]
#[command(about = "MVM assembler, disassembler, interpreter and x86-64 translator")]
struct Args {
    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a source file into bytecode
    Compile {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Turn bytecode back into assembly source
    Decompile {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print an address annotated listing instead of source
        #[arg(long)]
        listing: bool,
    },

    /// Execute a bytecode file
    Run { input: PathBuf },

    /// Translate bytecode into x86-64 assembly
    Translate {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile, decompile and run a source file without writing anything
    Check { input: PathBuf },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e).into())
}

fn read_program(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    fs::read(path).map_err(|e| format!("failed to read {}: {}", path.display(), e).into())
}

fn execute(vm: &mut VM) -> CliResult {
    if let Err(fault) = vm.run() {
        // Post-mortem goes to stderr ahead of the error line
        eprintln!("{}", vm.dump_ctx());
        return Err(Box::new(fault));
    }
    Ok(())
}

fn compile(input: &Path, output: Option<PathBuf>) -> CliResult {
    let source = read_source(input)?;
    let bc = mvm_asm::assemble(&source)?;

    let output_path = output.unwrap_or_else(|| input.with_extension("bin"));
    fs::write(&output_path, &bc)?;

    info!("Assembled bytecode written to {}", output_path.display());
    info!("Bytecode size: {} bytes", bc.len());
    Ok(())
}

fn decompile(input: &Path, output: Option<PathBuf>, listing: bool) -> CliResult {
    let program = read_program(input)?;
    let text = if listing {
        disasm::dump_memory(&program, 0, program.len())
    } else {
        disasm::disassemble(&program)
    };

    match output {
        Some(path) => {
            fs::write(&path, text)?;
            info!("Disassembly written to {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn run(input: &Path) -> CliResult {
    let mut vm = VM::new();
    vm.load_file(input)?;
    execute(&mut vm)
}

fn translate_file(input: &Path, output: Option<PathBuf>) -> CliResult {
    let program = read_program(input)?;
    let asm = translate(&program)?;

    let output_path = output.unwrap_or_else(|| input.with_extension("s"));
    fs::write(&output_path, asm)?;

    info!("Native assembly written to {}", output_path.display());
    Ok(())
}

fn check(input: &Path) -> CliResult {
    let source = read_source(input)?;

    println!("compiling {}", input.display());
    let bc = mvm_asm::assemble(&source)?;
    println!("{} bytes", bc.len());

    println!("\ndecompiling");
    print!("{}", disasm::disassemble(&bc));

    println!("\nrunning");
    let mut vm = VM::new();
    vm.load(bc)?;
    execute(&mut vm)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = match args.command {
        Command::Compile { input, output } => compile(&input, output),
        Command::Decompile {
            input,
            output,
            listing,
        } => decompile(&input, output, listing),
        Command::Run { input } => run(&input),
        Command::Translate { input, output } => translate_file(&input, output),
        Command::Check { input } => check(&input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
