//! Interactive expression shell.
//!
//! Reads one expression per line and prints its value. Colon commands
//! manage the session: `:load <file>` flattens a JSON document into the
//! global table, `:vars` lists what is defined, `:help` and `:quit` do
//! what they say.

use propexpr::document::load_document;
use propexpr::{create_builtin_registry, create_global_table, Evaluator};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

fn print_help() {
    println!("Enter an expression to evaluate it, or a command:");
    println!("  :help          show this help");
    println!("  :vars          list defined variables");
    println!("  :load <file>   flatten a JSON document into the variable table");
    println!("  :quit          exit (also :exit, Ctrl-D)");
}

fn main() -> Result<(), ReadlineError> {
    let mut editor = DefaultEditor::new()?;
    let mut globals = create_global_table();
    let registry = create_builtin_registry();

    println!("propexpr interactive shell. Type :help for commands.");
    loop {
        match editor.readline("expr> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;

                if line == ":quit" || line == ":exit" {
                    break;
                }
                if line == ":help" {
                    print_help();
                    continue;
                }
                if line == ":vars" {
                    let mut entries: Vec<_> = globals.iter().collect();
                    entries.sort_by(|a, b| a.0.cmp(b.0));
                    for (name, value) in entries {
                        println!("  {} = {}", name, value);
                    }
                    continue;
                }
                if let Some(path) = line.strip_prefix(":load ") {
                    load_file(&mut globals, path.trim());
                    continue;
                }
                if line.starts_with(':') {
                    println!("Unknown command '{}'. Type :help for commands.", line);
                    continue;
                }

                let evaluator = Evaluator::new(&globals, &registry);
                match evaluator.evaluate(line) {
                    Ok(value) => println!("{}", value),
                    Err(err) => println!("{}", err),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type :quit to exit.");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Input error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

fn load_file(globals: &mut propexpr::VariableTable, path: &str) {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            println!("Cannot read '{}': {}", path, err);
            return;
        }
    };
    match load_document(&text) {
        Ok(table) => {
            let count = table.len();
            match globals.merge(&table) {
                Ok(()) => println!("Loaded {} variable(s) from '{}'.", count, path),
                Err(err) => println!("{}", err),
            }
        }
        Err(err) => println!("{}", err),
    }
}
