use endless_markup::{extract_label, sanitize_with_report, try_extract_metadata};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

fn main() {
    let files: Vec<String> = env::args().skip(1).collect();

    if files.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: fragment-sanitize [file.html ...]");
        eprintln!();
        eprintln!("Sanitizes each file (or stdin when no file is given) and prints the");
        eprintln!("canonical markup, the derived label and any static metadata.");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  fragment-sanitize scene.html");
        eprintln!("  curl -s $URL | fragment-sanitize");
        process::exit(1);
    }

    let mut exit_code = 0;

    if files.is_empty() {
        let mut raw = String::new();
        if let Err(e) = io::stdin().read_to_string(&mut raw) {
            eprintln!("✗ failed to read stdin: {}", e);
            process::exit(1);
        }
        report("<stdin>", &raw);
    } else {
        for file_path in files {
            match fs::read_to_string(&file_path) {
                Ok(raw) => report(&file_path, &raw),
                Err(e) => {
                    eprintln!("✗ {}: failed to read file: {}", file_path, e);
                    exit_code = 1;
                }
            }
        }
    }

    process::exit(exit_code);
}

fn report(name: &str, raw: &str) {
    let (safe, stats) = sanitize_with_report(raw);
    println!("── {} ──", name);
    println!("label: {}", extract_label(&safe));
    match try_extract_metadata(&safe) {
        Ok(meta) if meta.is_empty() => {}
        Ok(meta) => println!(
            "metadata: {}",
            serde_json::to_string(&meta).unwrap_or_default()
        ),
        Err(e) => eprintln!("  warning: {}", e),
    }
    if !stats.is_clean() {
        eprintln!(
            "  removed {} element(s), {} attribute(s), {} comment(s); neutralized {} url(s); {} directive(s)",
            stats.removed_elements,
            stats.removed_attributes,
            stats.removed_comments,
            stats.neutralized_urls,
            stats.directives
        );
    }
    println!("{}", safe);
}
