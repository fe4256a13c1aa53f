use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use bramble::{Machine, DEFAULT_MAX_DEPTH};
use bramble_expr::flags::SUCCESS;
use bramble_frontend::{parse_statements, Printed};
use clap::Parser;

#[derive(Parser)]
#[command(name = "bramble")]
#[command(about = "Evaluates pattern-matching scripts")]
#[command(version)]
struct Cli {
    /// Script of `;`-separated statements
    file: Option<PathBuf>,
    /// Statements evaluated after the script
    #[arg(short = 'e', long = "eval")]
    exprs: Vec<String>,
    /// Nesting limit for matching and evaluation
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: u32,
    /// Prefix each result with S or F
    #[arg(long)]
    echo: bool,
}

fn run(m: &mut Machine, src: &[u8], echo: bool) -> Result<(), Box<dyn std::error::Error>> {
    for statement in parse_statements(src)? {
        let value = m.eval(&statement)?;
        if echo {
            println!("{} {}", if value.has(SUCCESS) { 'S' } else { 'F' }, Printed(&value));
        } else {
            println!("{}", Printed(&value));
        }
    }
    Ok(())
}

/// Stack of the evaluator thread. Most of it is handed to the machine as its budget.
const STACK_SIZE: usize = 64 << 20;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let worker = std::thread::Builder::new()
        .name("bramble".into())
        .stack_size(STACK_SIZE)
        .spawn(move || execute(&cli));
    match worker {
        Ok(handle) => handle.join().unwrap_or(ExitCode::FAILURE),
        Err(e) => {
            eprintln!("cannot start the evaluator: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> ExitCode {
    let mut m = Machine::new()
        .with_max_depth(cli.max_depth)
        .with_stack_budget(STACK_SIZE - (STACK_SIZE >> 3));

    if let Some(path) = &cli.file {
        let script = match File::open(path).and_then(|f| unsafe { memmap2::Mmap::map(&f) }) {
            Ok(script) => script,
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                return ExitCode::FAILURE
            }
        };
        if let Err(e) = run(&mut m, script.as_ref(), cli.echo) {
            eprintln!("{}: {}", path.display(), e);
            return ExitCode::FAILURE
        }
    }
    for expr in &cli.exprs {
        if let Err(e) = run(&mut m, expr.as_bytes(), cli.echo) {
            eprintln!("-e {}: {}", expr, e);
            return ExitCode::FAILURE
        }
    }
    ExitCode::SUCCESS
}
