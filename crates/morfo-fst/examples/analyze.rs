// Minimal analyzer loop: load a transducer, read words from stdin, print
// every analysis with its weight.
//
// Usage:
//   cargo run --example analyze -- path/to/transducer.kfst
//   cargo run --example analyze -- path/to/transducer.att

use std::io::BufRead;

use morfo_fst::{LookupOptions, Transducer};

fn main() {
    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: analyze <transducer.kfst | transducer.att>");
            std::process::exit(2);
        }
    };

    let fst = if path.ends_with(".att") {
        Transducer::from_tabular_path(&path)
    } else {
        Transducer::from_binary_path(&path)
    };
    let fst = match fst {
        Ok(fst) => fst,
        Err(err) => {
            eprintln!("failed to load {path}: {err}");
            std::process::exit(1);
        }
    };
    eprintln!(
        "loaded {path}: {} states, {} transitions, {} symbols",
        fst.state_count(),
        fst.transition_count(),
        fst.symbols().len(),
    );

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let word = match line {
            Ok(line) => line.trim().to_string(),
            Err(_) => break,
        };
        if word.is_empty() {
            continue;
        }
        match fst.lookup(&word, LookupOptions::default()) {
            Ok(analyses) if analyses.is_empty() => println!("{word}: no analyses"),
            Ok(analyses) => {
                for (index, (output, weight)) in analyses.iter().enumerate() {
                    println!("{word} [{}]: {output} ({weight})", index + 1);
                }
            }
            Err(err) => println!("{word}: {err}"),
        }
    }
}
