#[macro_use]
extern crate log;

mod cli;

use std::{
    error::Error,
    fs::{self, File},
    io::{self, BufWriter, Write},
    process,
};

use dfagen_gen::compile_definition;

fn compile_file(cli: &cli::Cli, src: &str, out: &mut dyn Write) -> io::Result<()> {
    for (index, line) in src.lines().enumerate() {
        // everything after '#' is a comment
        let line = line.split_once('#').map_or(line, |(head, _)| head).trim();
        if line.is_empty() {
            continue;
        }

        match compile_definition(line, cli.mode, cli.bitness) {
            Ok(lines) => {
                if lines.is_empty() {
                    debug!("{}:{}: skipped for this target", cli.path, index + 1);
                }
                for grammar in lines {
                    writeln!(out, "{grammar}")?;
                }
            }
            Err(err) => {
                eprintln!("error: {}:{}: {err}", cli.path, index + 1);
                process::exit(1);
            }
        }
    }
    out.flush()
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = cli::parse_cli();
    let src = fs::read_to_string(&cli.path)?;

    debug!(
        "compiling {} for {}-bit {:?}",
        cli.path, cli.bitness, cli.mode
    );

    match &cli.output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(path)?);
            compile_file(&cli, &src, &mut out)?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            compile_file(&cli, &src, &mut out)?;
        }
    }

    Ok(())
}
