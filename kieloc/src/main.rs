use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(version, about = "Compiler for the Kielo expression language")]
struct Args {
    /// Source file to compile.
    input: PathBuf,

    /// Stop after the given stage and print its output.
    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Write the output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Evaluate the program in the interpreter instead of compiling it.
    #[arg(long)]
    run: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Ir,
    Asm,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match try_main(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn try_main(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let src = fs::read_to_string(&args.input)?;

    if args.run {
        let tokens = kielo::lexer::lex(&src)?;
        let module = kielo::parser::parse(&tokens)?;
        let module = kielo::type_checker::check_module(module)?;
        kielo::interpreter::run(&module, io::stdin().lock(), io::stdout().lock())?;
        return Ok(());
    }

    let text = match args.emit {
        Emit::Tokens => {
            let tokens = kielo::lexer::lex(&src)?;
            let mut out = String::new();
            for token in &tokens {
                out.push_str(&format!("{} {:?}\n", token.loc, token.kind));
            }
            out
        }
        Emit::Ast => {
            let tokens = kielo::lexer::lex(&src)?;
            let module = kielo::parser::parse(&tokens)?;
            kielo::util::fmt::print_module_string(&module)
        }
        Emit::Ir => {
            let tokens = kielo::lexer::lex(&src)?;
            let module = kielo::parser::parse(&tokens)?;
            let module = kielo::type_checker::check_module(module)?;
            let functions = kielo::ir_generator::generate(&module)?;
            functions.iter().map(ToString::to_string).collect()
        }
        Emit::Asm => kielo::compile(&src)?,
    };

    match &args.output {
        Some(path) => fs::write(path, text)?,
        None => io::stdout().write_all(text.as_bytes())?,
    }
    Ok(())
}
