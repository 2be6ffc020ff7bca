use std::collections::BTreeSet;
use std::mem;

use crate::ast::{Assumption, BinaryOperator, Block, Expression, ExpressionKind, If, Type, While};
use crate::error::{Error, ErrorKind};
use crate::source::Span;
use crate::validation::{
    Context, MAX_LOOP_ITERATIONS, MAX_STATES, Packets, Reference, State, StateSet,
};

/// `left op right + offset` between two pointer slots, as stated by an assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Relation {
    operator: BinaryOperator,
    left: usize,
    right: usize,
    offset: i64,
}

impl Relation {
    fn holds(&self, state: &State) -> bool {
        match (state.slots[self.left], state.slots[self.right]) {
            (Reference::Null, Reference::Null) => {
                self.operator == BinaryOperator::Equal && self.offset == 0
            }
            (
                Reference::Packet { id: a, offset: x },
                Reference::Packet { id: b, offset: y },
            ) if a == b => {
                let y = y.saturating_add(self.offset);
                match self.operator {
                    BinaryOperator::Equal => x == y,
                    _ => x < y,
                }
            }
            _ => false,
        }
    }
}

impl<'ast> Context<'ast> {
    pub fn validate_block(&mut self, block: &'ast Block) -> Result<(), Error> {
        let variables = self.variables.len();
        let functions = self.functions.len();
        ::log::debug!("entering block at {}", block.span);

        for statement in &block.statements {
            self.validate_statement(statement)?;
            self.log.record(&statement.span, self.states.len());
            ::log::trace!("{}: {} state(s)", statement.span, self.states.len());
        }

        self.leave_scope(variables, functions);
        self.check_leaks(&block.span)?;
        ::log::debug!("leaving block at {}", block.span);
        Ok(())
    }

    /// Only the first branch and the else block take part; later branches
    /// are kept in the tree but not analysed.
    pub fn validate_if(&mut self, branch: &'ast If, span: &Span) -> Result<(), Error> {
        let Some((condition, then_body)) = branch.branches.first() else {
            return Ok(());
        };
        self.validate_expression(condition)?;

        let input = self.states.clone();
        self.validate_branches(
            [
                (input.clone(), Some(then_body)),
                (input, branch.else_body.as_ref()),
            ],
            span,
        )
    }

    /// Runs each branch from its own input set against the packet table as it
    /// was before the branches, then joins the results. Branches with an empty
    /// input are unreachable and skipped.
    fn validate_branches(
        &mut self,
        branches: [(StateSet, Option<&'ast Block>); 2],
        span: &Span,
    ) -> Result<(), Error> {
        let before = self.packets.clone();
        let mut states = StateSet::new();
        let mut joined: Option<Packets> = None;

        for (input, body) in branches {
            if input.is_empty() {
                continue;
            }
            self.packets = before.clone();
            self.states = input;
            if let Some(body) = body {
                self.validate_block(body)?;
            }
            states.append(&mut mem::take(&mut self.states));
            joined = Some(match joined {
                None => before.join(&self.packets, &self.packets),
                Some(previous) => before.join(&previous, &self.packets),
            });
        }

        self.packets = joined.unwrap_or(before);
        self.states = states;
        self.check_state_count(span)?;
        self.check_escapes(span)?;
        self.check_leaks(span)
    }

    pub fn validate_while(&mut self, looping: &'ast While, span: &Span) -> Result<(), Error> {
        let entry = self.packets.clone();
        let mut accumulated = self.states.clone();
        let mut previous: Option<StateSet> = None;

        for iteration in 1..=MAX_LOOP_ITERATIONS {
            self.states = accumulated.clone();
            self.validate_expression(&looping.condition)?;
            self.validate_block(&looping.body)?;
            self.settle(&entry, span)?;

            let output = mem::take(&mut self.states);
            if previous.as_ref() == Some(&output) {
                ::log::debug!("loop at {} stable after {} iteration(s)", span, iteration);
                accumulated.extend(output);
                self.states = accumulated;
                self.check_state_count(span)?;
                return self.check_leaks(span);
            }

            accumulated.extend(output.iter().cloned());
            if accumulated.len() > MAX_STATES {
                self.states = accumulated;
                return self.check_state_count(span);
            }
            previous = Some(output);
        }

        Err(Error::new(
            ErrorKind::Divergence,
            format!(
                "Loop does not reach a fixpoint within {} iterations",
                MAX_LOOP_ITERATIONS
            ),
            span.clone(),
        ))
    }

    /// After one loop iteration: packets allocated in the body must be dead
    /// again and the ones from before the loop must be exactly as they were.
    fn settle(&mut self, entry: &Packets, span: &Span) -> Result<(), Error> {
        if let Some((_, packet)) = self.packets.live().find(|(id, _)| *id >= entry.len()) {
            return Err(Error::new(
                ErrorKind::Divergence,
                format!(
                    "Unexpected allocation in loop body: buffer allocated at {}:{} survives the iteration",
                    packet.origin.file, packet.origin.start
                ),
                span.clone(),
            ));
        }
        self.packets.truncate(entry.len());

        let changed = (0..entry.len()).any(|id| self.packets.capacity(id) != entry.capacity(id));
        if changed {
            return Err(Error::new(
                ErrorKind::Divergence,
                "Loop body changes the set of live buffers",
                span.clone(),
            ));
        }
        self.check_escapes(span)
    }

    pub fn validate_assignment(
        &mut self,
        identifier: &str,
        value: &'ast Expression,
        span: &Span,
    ) -> Result<(), Error> {
        let (index, variable) = self.variable(identifier, span)?;
        let (ty, constant) = (variable.ty, variable.constant);
        if constant {
            return Err(Error::new(
                ErrorKind::Type,
                format!("Cannot assign to const variable {}", identifier),
                span.clone(),
            ));
        }

        match ty {
            Type::Ptr => self.assign_pointer(index, value, span),
            Type::Int => {
                if let ExpressionKind::Alloc(_) = value.kind {
                    return Err(Error::new(
                        ErrorKind::Type,
                        format!("Cannot assign alloc to {}, which is int", identifier),
                        value.span.clone(),
                    ));
                }
                self.validate_expression(value)
            }
        }
    }

    fn assign_pointer(
        &mut self,
        index: usize,
        value: &'ast Expression,
        span: &Span,
    ) -> Result<(), Error> {
        if let ExpressionKind::Alloc(size) = &value.kind {
            let capacity = self.metavariables.evaluate(size)?;
            if capacity <= 0 {
                return Err(Error::new(
                    ErrorKind::Type,
                    format!("Allocation size must be positive, got {}", capacity),
                    size.span.clone(),
                ));
            }
            let id = self.packets.allocate(capacity, value.span.clone());
            self.map_states(|state| state.slots[index] = Reference::Packet { id, offset: 0 });
            return Ok(());
        }

        if let Some((source, offset)) = value.as_offset_of() {
            let (source_index, variable) = self.variable(source, &value.span)?;
            if variable.ty == Type::Ptr {
                self.map_states(|state| state.slots[index] = state.slots[source_index].shifted(offset));
                return Ok(());
            }
            return self.case_split(index, span);
        }

        match &value.kind {
            ExpressionKind::Binary {
                operator: BinaryOperator::Addition | BinaryOperator::Subtraction,
                left,
                ..
            } if left.as_identifier().is_some() => {
                self.validate_expression(value)?;
                self.case_split(index, span)
            }
            ExpressionKind::Dereference(_) => {
                self.validate_expression(value)?;
                self.case_split(index, span)
            }
            _ => Err(Error::new(
                ErrorKind::Shape,
                "Pointer assignment expects alloc(n), p + k or a pointer-valued expression",
                value.span.clone(),
            )),
        }
    }

    /// The assigned pointer may be anything: null or any word of any live buffer.
    fn case_split(&mut self, index: usize, span: &Span) -> Result<(), Error> {
        let explosion = || {
            Error::new(
                ErrorKind::Divergence,
                format!(
                    "State set explosion: more than {} aliasing configurations",
                    MAX_STATES
                ),
                span.clone(),
            )
        };

        let words = self
            .packets
            .live()
            .fold(0i64, |total, (_, packet)| total.saturating_add(packet.capacity));
        if words >= MAX_STATES as i64 {
            return Err(explosion());
        }

        let candidates: Vec<Reference> = std::iter::once(Reference::Null)
            .chain(self.packets.live().flat_map(|(id, packet)| {
                (0..packet.capacity).map(move |offset| Reference::Packet { id, offset })
            }))
            .collect();

        let mut states = StateSet::new();
        for state in &self.states {
            for candidate in &candidates {
                let mut split = state.clone();
                split.slots[index] = *candidate;
                states.insert(split);
                if states.len() > MAX_STATES {
                    return Err(explosion());
                }
            }
        }

        ::log::trace!(
            "case split at {}: {} candidate(s), {} state(s)",
            span,
            candidates.len(),
            states.len()
        );
        self.states = states;
        self.check_state_count(span)
    }

    pub fn validate_movement(
        &mut self,
        identifier: &str,
        value: &'ast Expression,
        span: &Span,
    ) -> Result<(), Error> {
        let index = self.pointer(identifier, span, "movement")?;
        self.validate_expression(value)?;
        self.check_access(index, 1, identifier, span)
    }

    pub fn validate_movement_string(
        &mut self,
        identifier: &str,
        value: &str,
        span: &Span,
    ) -> Result<(), Error> {
        let index = self.pointer(identifier, span, "movement")?;
        let words = value.len().div_ceil(4).max(1) as i64;
        self.check_access(index, words, identifier, span)
    }

    pub fn validate_assumption(
        &mut self,
        assumption: &'ast Assumption,
        span: &Span,
    ) -> Result<(), Error> {
        match assumption {
            Assumption::Condition(condition) => {
                let relation = self.relation(condition)?;
                let kept: StateSet = self
                    .states
                    .iter()
                    .filter(|state| relation.holds(state))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    return Err(Error::new(
                        ErrorKind::Assumption,
                        "Assumption contradicts every reachable state",
                        condition.span.clone(),
                    ));
                }
                self.states = kept;
                Ok(())
            }
            Assumption::Guard { condition, body } => {
                let relation = self.relation(condition)?;
                let (holding, rest): (StateSet, StateSet) = mem::take(&mut self.states)
                    .into_iter()
                    .partition(|state| relation.holds(state));
                self.validate_branches([(holding, Some(body)), (rest, None)], span)
            }
        }
    }

    fn relation(&self, condition: &Expression) -> Result<Relation, Error> {
        let shape = || {
            Error::new(
                ErrorKind::Shape,
                "Assumption expects x = y + k or x < y + k on pointer variables",
                condition.span.clone(),
            )
        };

        let ExpressionKind::Binary {
            operator: operator @ (BinaryOperator::Equal | BinaryOperator::Less),
            left,
            right,
        } = &condition.kind
        else {
            return Err(shape());
        };
        let left_name = left.as_identifier().ok_or_else(shape)?;
        let (right_name, offset) = right.as_offset_of().ok_or_else(shape)?;

        Ok(Relation {
            operator: *operator,
            left: self.pointer(left_name, &left.span, "assumption")?,
            right: self.pointer(right_name, &right.span, "assumption")?,
            offset,
        })
    }

    pub fn validate_free(&mut self, argument: &'ast Expression, span: &Span) -> Result<(), Error> {
        let Some(name) = argument.as_identifier() else {
            return Err(Error::new(
                ErrorKind::Shape,
                "free expects a pointer variable",
                argument.span.clone(),
            ));
        };
        let (_, variable) = self.variable(name, &argument.span)?;
        if variable.constant {
            return Err(Error::new(
                ErrorKind::Type,
                format!("Cannot free const variable {}", name),
                argument.span.clone(),
            ));
        }
        let index = self.pointer(name, &argument.span, "free")?;

        let mut ids = BTreeSet::new();
        for state in &self.states {
            let problem = match state.slots[index] {
                Reference::Null => format!("freeing {}, which may be null", name),
                Reference::Packet { offset, .. } if offset != 0 => {
                    format!("freeing {} at offset {}", name, offset)
                }
                Reference::Packet { id, .. } if !self.packets.is_live(id) => {
                    format!("freeing {}, whose buffer is already freed", name)
                }
                Reference::Packet { id, .. } => {
                    ids.insert(id);
                    continue;
                }
            };
            return Err(Error::new(
                ErrorKind::AccessViolation,
                format!("Access violation: {}", problem),
                span.clone(),
            ));
        }

        let mut ids = ids.into_iter();
        let (Some(id), None) = (ids.next(), ids.next()) else {
            return Err(Error::new(
                ErrorKind::UnpredictableFree,
                format!("Unpredictable free: {} may refer to different buffers", name),
                span.clone(),
            ));
        };

        self.packets.kill(id);
        self.map_states(|state| state.forget(id));
        Ok(())
    }
}
