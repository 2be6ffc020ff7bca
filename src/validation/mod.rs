//! Abstract interpretation of a parsed program.
//!
//! Every program point is described by the set of aliasing configurations
//! ([`State`]s) that can reach it. Statements transform that set; a program
//! is accepted only if no reachable configuration leaks a buffer, touches a
//! dead or out-of-bounds word, or breaks a function contract.

pub mod expression;
pub mod function;
pub mod log;
pub mod metavariable;
pub mod state;
pub mod statement;

#[cfg(test)]
pub mod test;

use std::collections::HashSet;
use std::mem;

use crate::ast::{Block, FunctionSignature, Statement, StatementKind, Type};
use crate::error::{Error, ErrorKind};
use crate::source::Span;

pub use self::log::StatesLog;
pub use self::metavariable::Metavariables;
pub use self::state::{Packet, Packets, Reference, State, StateSet};

pub const MAX_LOOP_ITERATIONS: usize = 100;

pub const MAX_STATES: usize = 1 << 16;

const STATES_WARNING_THRESHOLD: usize = 4096;

/// Nested generic instantiations allowed before recursion is declared divergent.
pub const MAX_INSTANTIATION_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub constant: bool,
}

#[derive(Debug, Clone)]
pub struct Callable<'ast> {
    pub name: String,
    pub metavariables: Vec<String>,
    pub signature: &'ast FunctionSignature,
    pub body: Option<&'ast Block>,
    pub external: bool,
    pub span: Span,
}

pub struct Context<'ast> {
    variables: Vec<Variable>,
    functions: Vec<Callable<'ast>>,
    packets: Packets,
    metavariables: Metavariables,
    states: StateSet,
    log: StatesLog,
    instantiated: HashSet<(Span, Vec<i64>)>,
    depth: usize,
}

/// Validates a whole program. Returns the per-line state-set log on success
/// and the first violation found otherwise.
pub fn validate(root: &Block) -> Result<StatesLog, Error> {
    let mut context = Context::new();
    context.validate_block(root)?;
    ::log::debug!(
        "validation finished with {} state(s) and {} packet(s)",
        context.states.len(),
        context.packets.len()
    );
    Ok(context.log)
}

impl Default for Context<'_> {
    fn default() -> Self {
        Context::new()
    }
}

impl<'ast> Context<'ast> {
    pub fn new() -> Self {
        Context {
            variables: vec![],
            functions: vec![],
            packets: Packets::default(),
            metavariables: Metavariables::new(),
            states: StateSet::from([State::default()]),
            log: StatesLog::default(),
            instantiated: HashSet::new(),
            depth: 0,
        }
    }

    pub fn states(&self) -> &StateSet {
        &self.states
    }

    pub fn packets(&self) -> &Packets {
        &self.packets
    }

    pub fn log(&self) -> &StatesLog {
        &self.log
    }

    pub fn validate_statement(&mut self, statement: &'ast Statement) -> Result<(), Error> {
        let span = &statement.span;
        match &statement.kind {
            StatementKind::Block(block) => self.validate_block(block),
            StatementKind::Asm(_) => Ok(()),
            StatementKind::If(branch) => self.validate_if(branch, span),
            StatementKind::While(looping) => self.validate_while(looping, span),
            StatementKind::Function(function) => self.validate_function_definition(function, span),
            StatementKind::Prototype(prototype) => self.register_prototype(prototype, span),
            StatementKind::Definition { identifier, ty } => {
                self.define(identifier, *ty, false);
                Ok(())
            }
            StatementKind::Assignment { identifier, value } => {
                self.validate_assignment(identifier, value, span)
            }
            StatementKind::Movement { identifier, value } => {
                self.validate_movement(identifier, value, span)
            }
            StatementKind::MovementString { identifier, value } => {
                self.validate_movement_string(identifier, value, span)
            }
            StatementKind::Assumption(assumption) => self.validate_assumption(assumption, span),
            StatementKind::Free(argument) => self.validate_free(argument, span),
            StatementKind::Call(call) => self.validate_call(call, span),
            StatementKind::Expression(expression) => self.validate_expression(expression),
        }
    }

    pub fn define(&mut self, name: &str, ty: Type, constant: bool) {
        self.variables.push(Variable {
            name: name.to_string(),
            ty,
            constant,
        });
        self.map_states(|state| state.slots.push(Reference::Null));
    }

    pub fn variable(&self, name: &str, span: &Span) -> Result<(usize, &Variable), Error> {
        self.variables
            .iter()
            .enumerate()
            .rev()
            .find(|(_, variable)| variable.name == name)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Scope,
                    format!("Identifier {} was not declared in this scope", name),
                    span.clone(),
                )
            })
    }

    pub fn pointer(&self, name: &str, span: &Span, usage: &str) -> Result<usize, Error> {
        let (index, variable) = self.variable(name, span)?;
        if variable.ty != Type::Ptr {
            return Err(Error::new(
                ErrorKind::Type,
                format!("Pointer expected in {}, but {} is {}", usage, name, variable.ty),
                span.clone(),
            ));
        }
        Ok(index)
    }

    pub fn function(&self, name: &str, span: &Span) -> Result<&Callable<'ast>, Error> {
        self.functions
            .iter()
            .rev()
            .find(|function| function.name == name)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Scope,
                    format!("Function {} was not declared in this scope", name),
                    span.clone(),
                )
            })
    }

    fn map_states(&mut self, mut f: impl FnMut(&mut State)) {
        self.states = mem::take(&mut self.states)
            .into_iter()
            .map(|mut state| {
                f(&mut state);
                state
            })
            .collect();
    }

    fn leave_scope(&mut self, variables: usize, functions: usize) {
        self.variables.truncate(variables);
        self.functions.truncate(functions);
        self.map_states(|state| state.slots.truncate(variables));
    }

    fn check_leaks(&self, span: &Span) -> Result<(), Error> {
        for state in &self.states {
            let referenced = state.referenced_packets();
            if let Some((_, packet)) = self.packets.live().find(|(id, _)| !referenced.contains(id)) {
                return Err(Error::new(
                    ErrorKind::MemoryLeak,
                    format!(
                        "Memory leak: buffer allocated at {}:{} is no longer referenced",
                        packet.origin.file, packet.origin.start
                    ),
                    span.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Fails if some state still points at a packet that no longer exists in
    /// the table (created in a branch and erased at the join).
    fn check_escapes(&self, span: &Span) -> Result<(), Error> {
        let escaped = self
            .states
            .iter()
            .flat_map(|state| state.slots.iter())
            .filter_map(Reference::packet)
            .any(|id| id >= self.packets.len());
        if escaped {
            return Err(Error::new(
                ErrorKind::MemoryLeak,
                "Memory leak: buffer allocated inside a branch outlives it",
                span.clone(),
            ));
        }
        Ok(())
    }

    fn check_state_count(&self, span: &Span) -> Result<(), Error> {
        let count = self.states.len();
        if count > MAX_STATES {
            return Err(Error::new(
                ErrorKind::Divergence,
                format!("State set explosion: more than {} aliasing configurations", MAX_STATES),
                span.clone(),
            ));
        }
        if count > STATES_WARNING_THRESHOLD {
            ::log::warn!("{} aliasing configurations reachable at {}", count, span);
        }
        Ok(())
    }
}
