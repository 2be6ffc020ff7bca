//! 32-bit NASM emission for validated programs.
//!
//! Every function uses a plain cdecl frame: locals live at `[ebp - 4(i+1)]`
//! and arguments at `[ebp + 4(i+2)]`. An expression leaves its value in the
//! word just below the stack top, `[esp - 4]`.

pub mod function;
pub mod statement;

#[cfg(test)]
pub mod test;

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::rc::Rc;

use crate::ast::{Block, FunctionDefinition, FunctionSignature, Type};
use crate::error::{Error, ErrorKind};
use crate::source::Span;
use crate::validation::Metavariables;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    pub top_main: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions { top_main: true }
    }
}

#[derive(Debug, Clone)]
enum Symbol<'ast> {
    Defined {
        name: String,
        index: usize,
        definition: &'ast FunctionDefinition,
        scope: Rc<Vec<Symbol<'ast>>>,
    },
    // Declared with `proto`; resolved by the linker.
    Extern {
        name: String,
        signature: &'ast FunctionSignature,
    },
}

impl Symbol<'_> {
    fn name(&self) -> &str {
        match self {
            Symbol::Defined { name, .. } | Symbol::Extern { name, .. } => name,
        }
    }
}

struct Pending<'ast> {
    label: String,
    definition: &'ast FunctionDefinition,
    functions: Vec<Symbol<'ast>>,
    metavariables: Metavariables,
}

#[derive(Default)]
struct Frame<'ast> {
    /// Stack words below `ebp`, in push order. Spill slots have no name.
    locals: Vec<(Option<String>, Type)>,
    arguments: Vec<(String, Type)>,
    functions: Vec<Symbol<'ast>>,
    metavariables: Metavariables,
}

pub struct AsmCodegen<'ast> {
    options: CodegenOptions,
    text: String,
    frame: Frame<'ast>,
    labels: usize,
    functions: usize,
    queue: VecDeque<Pending<'ast>>,
    requested: HashSet<String>,
    externs: BTreeSet<String>,
    globals: BTreeSet<String>,
}

pub fn generate(root: &Block, options: &CodegenOptions) -> Result<String, Error> {
    let mut codegen = AsmCodegen::new(options.clone());
    codegen.generate_program(root)?;
    Ok(codegen.finish())
}

impl<'ast> AsmCodegen<'ast> {
    pub fn new(options: CodegenOptions) -> Self {
        AsmCodegen {
            options,
            text: String::new(),
            frame: Frame::default(),
            labels: 0,
            functions: 0,
            queue: VecDeque::new(),
            requested: HashSet::new(),
            externs: BTreeSet::from(["free".to_string(), "malloc".to_string()]),
            globals: BTreeSet::new(),
        }
    }

    pub fn generate_program(&mut self, root: &'ast Block) -> Result<(), Error> {
        self.emit("main:");
        self.emit("push ebp");
        self.emit("mov ebp, esp");
        self.compile_block(root)?;
        self.emit("mov eax, 0");
        self.emit("leave");
        self.emit("ret");

        if !self.options.top_main {
            self.text.clear();
        }

        while let Some(pending) = self.queue.pop_front() {
            self.compile_function_body(pending)?;
        }

        if self.options.top_main {
            if self.globals.contains("main") {
                return Err(Error::new(
                    ErrorKind::Codegen,
                    "External function main clashes with the generated entry point",
                    root.span.clone(),
                ));
            }
            self.globals.insert("main".to_string());
        }
        Ok(())
    }

    pub fn finish(self) -> String {
        let mut out = String::from("; generated by aliaslang\n");
        for name in &self.externs {
            out.push_str(&format!("extern {}\n", name));
        }
        for name in &self.globals {
            out.push_str(&format!("global {}\n", name));
        }
        out.push_str("section .text\n");
        out.push_str(&self.text);
        out
    }

    fn emit(&mut self, line: impl AsRef<str>) {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    fn next_label(&mut self) -> usize {
        self.labels += 1;
        self.labels - 1
    }

    /// Pushes a word onto the frame, keeping `esp = ebp - 4 * locals`.
    fn push_local(&mut self, name: Option<String>, ty: Type) {
        self.frame.locals.push((name, ty));
        self.emit("sub esp, 4");
    }

    fn pop_locals(&mut self, len: usize) {
        let released = self.frame.locals.len().saturating_sub(len);
        if released > 0 {
            self.emit(format!("add esp, {}", released * 4));
        }
        self.frame.locals.truncate(len);
    }

    fn slot(&self, name: &str, span: &Span) -> Result<(String, Type), Error> {
        if let Some((index, (_, ty))) = self
            .frame
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, (local, _))| local.as_deref() == Some(name))
        {
            return Ok((format!("[ebp - {}]", (index + 1) * 4), *ty));
        }
        if let Some((index, (_, ty))) = self
            .frame
            .arguments
            .iter()
            .enumerate()
            .find(|(_, (argument, _))| argument == name)
        {
            return Ok((format!("[ebp + {}]", (index + 2) * 4), *ty));
        }
        Err(Error::new(
            ErrorKind::Codegen,
            format!("Unknown variable {}", name),
            span.clone(),
        ))
    }

    fn symbol(&self, name: &str, span: &Span) -> Result<Symbol<'ast>, Error> {
        self.frame
            .functions
            .iter()
            .rev()
            .find(|symbol| symbol.name() == name)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Codegen,
                    format!("Unknown function {}", name),
                    span.clone(),
                )
            })
    }
}
