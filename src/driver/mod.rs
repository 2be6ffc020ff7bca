//! Ties the stages together: load, parse, validate, then optionally emit,
//! assemble and link.


use ariadne::{Color, Fmt};
use yansi::Paint;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::ast::Block;
use crate::codegen::{CodegenOptions, generate};
use crate::error::{Error, ErrorKind};
use crate::parser::parse_file;
use crate::source::{SourceMap, Span};
use crate::validation::{StatesLog, validate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub print_states: bool,
    pub compile: bool,
    pub assemble: bool,
    pub link: bool,
    pub top_main: bool,
}

impl Settings {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Settings {
            input: input.into(),
            output: None,
            print_states: false,
            compile: false,
            assemble: false,
            link: false,
            top_main: true,
        }
    }

    fn codegen_options(&self) -> CodegenOptions {
        CodegenOptions {
            top_main: self.top_main,
        }
    }
}

/// Parses and validates `text` as if it were the file `name`. Includes are
/// resolved from disk relative to `name`.
pub fn check_source(name: &str, text: &str) -> Result<StatesLog, Error> {
    let mut sources = SourceMap::new();
    let (_, log) = check(&mut sources, name, text)?;
    Ok(log)
}

pub fn compile_source(name: &str, text: &str, options: &CodegenOptions) -> Result<String, Error> {
    let mut sources = SourceMap::new();
    let (root, _) = check(&mut sources, name, text)?;
    generate(&root, options)
}

fn check(sources: &mut SourceMap, name: &str, text: &str) -> Result<(Block, StatesLog), Error> {
    sources.insert(name, text);
    let root = parse_file(sources, name)?;
    let log = validate(&root)?;
    Ok((root, log))
}

/// Runs the whole pipeline for `settings`. Files read along the way are kept
/// in `sources` so the caller can render diagnostics.
pub fn process(settings: &Settings, sources: &mut SourceMap) -> Result<(), Error> {
    let name = settings.input.to_string_lossy().into_owned();
    let root = parse_file(sources, &name)?;
    log::info!("parsed {} ({} top-level statements)", name, root.statements.len());

    let log = validate(&root)?;
    if settings.print_states {
        print_states(&log);
    }
    if !settings.compile {
        return Ok(());
    }

    let asm = generate(&root, &settings.codegen_options())?;
    let stem = settings.input.with_extension("");
    let asm_path = stem.with_extension("asm");
    fs::write(&asm_path, asm).map_err(|err| io_error(err, &asm_path))?;
    log::info!("wrote {}", asm_path.display());

    if !settings.assemble {
        return deliver(&asm_path, settings.output.as_deref());
    }

    let object_path = stem.with_extension("o");
    run_tool(
        Command::new("nasm")
            .args(["-f", "elf32"])
            .arg(&asm_path)
            .arg("-o")
            .arg(&object_path),
    )?;
    remove(&asm_path)?;

    if !settings.link {
        return deliver(&object_path, settings.output.as_deref());
    }

    run_tool(
        Command::new("gcc")
            .arg("-m32")
            .arg(&object_path)
            .arg("-no-pie")
            .arg("-o")
            .arg(&stem),
    )?;
    remove(&object_path)?;
    deliver(&stem, settings.output.as_deref())
}

pub fn print_states(log: &StatesLog) {
    for (file, entries) in log.files() {
        println!("{}", Fmt::fg(file, Color::Cyan).bold());
        for (line, states) in entries {
            let color = if *states > 1 { Color::Yellow } else { Color::Green };
            println!("{:>5}: {}", line, Fmt::fg(states, color));
        }
    }
}

fn run_tool(command: &mut Command) -> Result<(), Error> {
    let program = command.get_program().to_string_lossy().into_owned();
    log::info!("running {:?}", command);
    let status = command.status().map_err(|err| {
        Error::new(
            ErrorKind::Io,
            format!("Failed to run {}: {}", program, err),
            Span::dummy(),
        )
    })?;
    if !status.success() {
        return Err(Error::new(
            ErrorKind::Io,
            format!("{} exited with {}", program, status),
            Span::dummy(),
        ));
    }
    Ok(())
}

fn deliver(produced: &Path, output: Option<&Path>) -> Result<(), Error> {
    let Some(output) = output else {
        return Ok(());
    };
    fs::rename(produced, output).map_err(|err| io_error(err, output))
}

fn remove(path: &Path) -> Result<(), Error> {
    fs::remove_file(path).map_err(|err| io_error(err, path))
}

fn io_error(err: std::io::Error, path: &Path) -> Error {
    Error::new(
        ErrorKind::Io,
        format!("{}: {}", path.display(), err),
        Span::dummy(),
    )
}
