use dusk::{CliReporter, InterpretResult, Vm};
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::{fs, process};

fn main() {
    let mut args = std::env::args().skip(1);
    let path = args.next();
    if args.next().is_some() {
        eprintln!("Usage: dusk [path]");
        process::exit(exitcode::USAGE);
    }

    match path {
        Some(path) => run_file(&path),
        None => run_prompt(),
    }
}

fn run_file(path: &str) {
    let source = fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("Could not read file '{path}': {err}");
        process::exit(exitcode::IOERR);
    });

    let mut vm = Vm::new();
    let mut reporter = CliReporter::new();
    match vm.interpret(&source, &mut reporter) {
        InterpretResult::Ok => {}
        InterpretResult::CompileError => process::exit(exitcode::DATAERR),
        InterpretResult::RuntimeError => process::exit(exitcode::SOFTWARE),
    }
}

fn run_prompt() {
    let mut vm = Vm::new();
    let mut editor = Editor::<()>::new();

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                editor.add_history_entry(line.as_str());
                let mut reporter = CliReporter::new();
                vm.interpret(&line, &mut reporter);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Readline error: {err}");
                break;
            }
        }
    }
}
