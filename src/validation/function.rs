use std::collections::{BTreeSet, HashMap};
use std::mem;

use crate::ast::{
    FunctionCall, FunctionDefinition, FunctionSignature, FunctionSignatureEvaluated, Prototype,
    Type,
};
use crate::error::{Error, ErrorKind};
use crate::source::Span;
use crate::validation::{
    Callable, Context, MAX_INSTANTIATION_DEPTH, Metavariables, Packets, Reference, State,
    StateSet, Variable,
};

/// A `const ptr` is only borrowed, so it must come back with the size it came in with.
fn check_const_sizes(
    evaluated: &FunctionSignatureEvaluated,
    declared: &FunctionSignature,
) -> Result<(), Error> {
    for (parameter, source) in evaluated.parameters.iter().zip(&declared.parameters) {
        if parameter.constant && parameter.ty == Type::Ptr && parameter.size_in != parameter.size_out
        {
            return Err(Error::new(
                ErrorKind::Type,
                format!(
                    "Const parameter {} cannot change size ({}:{})",
                    parameter.name, parameter.size_in, parameter.size_out
                ),
                source.span.clone(),
            ));
        }
    }
    Ok(())
}

impl<'ast> Context<'ast> {
    pub fn validate_function_definition(
        &mut self,
        function: &'ast FunctionDefinition,
        span: &Span,
    ) -> Result<(), Error> {
        if function.external && !function.metavariables.is_empty() {
            return Err(Error::new(
                ErrorKind::Type,
                format!("External function {} cannot take metavariables", function.name),
                span.clone(),
            ));
        }

        // Registered before the body is checked so recursive calls see the contract.
        let callable = Callable {
            name: function.name.clone(),
            metavariables: function.metavariables.clone(),
            signature: &function.signature,
            body: Some(&function.body),
            external: function.external,
            span: span.clone(),
        };
        self.functions.push(callable.clone());

        if function.metavariables.is_empty() {
            let metavariables = self.metavariables.clone();
            self.validate_function_body(&callable, metavariables)?;
        }
        Ok(())
    }

    pub fn register_prototype(
        &mut self,
        prototype: &'ast Prototype,
        span: &Span,
    ) -> Result<(), Error> {
        self.functions.push(Callable {
            name: prototype.name.clone(),
            metavariables: prototype.metavariables.clone(),
            signature: &prototype.signature,
            body: None,
            external: false,
            span: span.clone(),
        });
        Ok(())
    }

    /// Checks a function body in an isolated context seeded from the
    /// signature, then checks the post-condition on every exit state.
    fn validate_function_body(
        &mut self,
        callable: &Callable<'ast>,
        metavariables: Metavariables,
    ) -> Result<(), Error> {
        let Some(body) = callable.body else {
            return Ok(());
        };
        let signature = metavariables.evaluate_signature(callable.signature)?;
        check_const_sizes(&signature, callable.signature)?;

        ::log::debug!(
            "validating body of {}{:?}",
            callable.name,
            metavariables.values()
        );

        let mut child = Context {
            variables: vec![],
            functions: self.functions.clone(),
            packets: Packets::default(),
            metavariables,
            states: StateSet::new(),
            log: mem::take(&mut self.log),
            instantiated: mem::take(&mut self.instantiated),
            depth: self.depth + 1,
        };

        let mut seed = State::default();
        for (parameter, declared) in signature.parameters.iter().zip(&callable.signature.parameters) {
            child.variables.push(Variable {
                name: parameter.name.clone(),
                ty: parameter.ty,
                constant: parameter.constant,
            });
            let reference = if parameter.ty == Type::Ptr && parameter.size_in > 0 {
                let id = child.packets.allocate(parameter.size_in, declared.span.clone());
                Reference::Packet { id, offset: 0 }
            } else {
                Reference::Null
            };
            seed.slots.push(reference);
        }
        child.states.insert(seed);

        let result = child
            .validate_block(body)
            .and_then(|()| child.check_postcondition(&signature, &callable.name, &body.span));

        self.log = mem::take(&mut child.log);
        self.instantiated = mem::take(&mut child.instantiated);
        result
    }

    fn check_postcondition(
        &mut self,
        signature: &FunctionSignatureEvaluated,
        function: &str,
        span: &Span,
    ) -> Result<(), Error> {
        let failed = |message: String| {
            Error::new(
                ErrorKind::Contract,
                format!("Function post-condition failed in {}: {}", function, message),
                span.clone(),
            )
        };

        let mut owners: HashMap<usize, &str> = HashMap::new();
        for (index, parameter) in signature.parameters.iter().enumerate() {
            if parameter.ty != Type::Ptr {
                continue;
            }
            let required = if parameter.constant {
                parameter.size_in
            } else {
                parameter.size_out
            };

            if required == 0 {
                if self.states.iter().any(|state| state.slots[index] != Reference::Null) {
                    return Err(failed(format!("{} must be null on exit", parameter.name)));
                }
                continue;
            }

            let mut ids = BTreeSet::new();
            for state in &self.states {
                match state.slots[index] {
                    Reference::Packet { id, offset: 0 } if self.packets.capacity(id) >= required => {
                        ids.insert(id);
                    }
                    _ => {
                        return Err(failed(format!(
                            "{} must hold {} word(s) at offset 0 on exit",
                            parameter.name, required
                        )));
                    }
                }
            }
            if ids.len() > 1 {
                return Err(failed(format!("{} has several packets", parameter.name)));
            }
            for id in ids {
                if let Some(other) = owners.insert(id, &parameter.name) {
                    return Err(failed(format!(
                        "{} and {} share a buffer",
                        other, parameter.name
                    )));
                }
            }
        }

        for id in owners.into_keys() {
            self.packets.kill(id);
        }
        if let Some((_, packet)) = self.packets.live().next() {
            return Err(Error::new(
                ErrorKind::MemoryLeak,
                format!(
                    "Memory leak: buffer allocated at {}:{} is still live when {} returns",
                    packet.origin.file, packet.origin.start, function
                ),
                span.clone(),
            ));
        }
        Ok(())
    }

    pub fn validate_call(&mut self, call: &'ast FunctionCall, span: &Span) -> Result<(), Error> {
        let callable = self.function(&call.name, span)?.clone();

        if call.metavariables.len() != callable.metavariables.len() {
            return Err(Error::new(
                ErrorKind::Type,
                format!(
                    "Function {} expects {} metavariable(s), got {}",
                    call.name,
                    callable.metavariables.len(),
                    call.metavariables.len()
                ),
                span.clone(),
            ));
        }

        // Step 1: bind metavariables and resolve the contract
        let values = call
            .metavariables
            .iter()
            .map(|expression| self.metavariables.evaluate(expression))
            .collect::<Result<Vec<_>, Error>>()?;
        let depth = self.metavariables.len();
        for (name, value) in callable.metavariables.iter().zip(&values) {
            self.metavariables.push(name.clone(), *value);
        }
        let signature = self.metavariables.evaluate_signature(callable.signature);
        self.metavariables.truncate(depth);
        let signature = signature?;
        check_const_sizes(&signature, callable.signature)?;

        if call.arguments.len() != signature.parameters.len() {
            return Err(Error::new(
                ErrorKind::Type,
                format!(
                    "Function {} expects {} argument(s), got {}",
                    call.name,
                    signature.parameters.len(),
                    call.arguments.len()
                ),
                span.clone(),
            ));
        }

        // Step 2: argument types
        let mut slots = Vec::with_capacity(call.arguments.len());
        for ((name, argument_span), parameter) in call.arguments.iter().zip(&signature.parameters) {
            let (index, variable) = self.variable(name, argument_span)?;
            if variable.ty != parameter.ty {
                return Err(Error::new(
                    ErrorKind::Type,
                    format!(
                        "Parameter {} of {} is {}, but {} is {}",
                        parameter.name, call.name, parameter.ty, name, variable.ty
                    ),
                    argument_span.clone(),
                ));
            }
            if variable.constant && !parameter.constant {
                return Err(Error::new(
                    ErrorKind::Type,
                    format!(
                        "Const variable {} cannot be passed as non-const parameter {}",
                        name, parameter.name
                    ),
                    argument_span.clone(),
                ));
            }
            slots.push(index);
        }

        // Step 3: generic bodies are checked once per distinct binding
        if !callable.metavariables.is_empty()
            && self
                .instantiated
                .insert((callable.span.clone(), values.clone()))
        {
            if self.depth >= MAX_INSTANTIATION_DEPTH {
                return Err(Error::new(
                    ErrorKind::Divergence,
                    format!(
                        "Generic instantiation of {} does not terminate within {} levels",
                        call.name, MAX_INSTANTIATION_DEPTH
                    ),
                    span.clone(),
                ));
            }
            let bindings = Metavariables::from_bindings(&callable.metavariables, &values);
            self.validate_function_body(&callable, bindings)?;
        }

        // Step 4: pre-conditions
        let mut consumed: Vec<Option<usize>> = vec![None; slots.len()];
        let mut claimed: HashMap<usize, &str> = HashMap::new();
        for (position, parameter) in signature.parameters.iter().enumerate() {
            if parameter.ty != Type::Ptr {
                continue;
            }
            let index = slots[position];
            let (argument, argument_span) = &call.arguments[position];
            let failed = |message: String| {
                Error::new(
                    ErrorKind::Contract,
                    format!("Function pre-condition failed for {}: {}", call.name, message),
                    argument_span.clone(),
                )
            };

            if parameter.size_in == 0 {
                if self.states.iter().any(|state| state.slots[index] != Reference::Null) {
                    return Err(failed(format!(
                        "{} must be null when passed as {}",
                        argument, parameter.name
                    )));
                }
                continue;
            }

            let mut ids = BTreeSet::new();
            for state in &self.states {
                match state.slots[index] {
                    Reference::Packet { id, offset: 0 }
                        if self.packets.capacity(id) >= parameter.size_in =>
                    {
                        ids.insert(id);
                    }
                    _ => {
                        return Err(failed(format!(
                            "{} must hold {} word(s) at offset 0",
                            argument, parameter.size_in
                        )));
                    }
                }
            }
            let mut ids = ids.into_iter();
            let (Some(id), None) = (ids.next(), ids.next()) else {
                return Err(failed(format!("{} has several packets", argument)));
            };
            if let Some(other) = claimed.insert(id, argument) {
                return Err(failed(format!("{} and {} share a buffer", other, argument)));
            }
            consumed[position] = Some(id);
        }

        // Step 5: apply the post-condition to the caller's states
        for (position, parameter) in signature.parameters.iter().enumerate() {
            if parameter.ty != Type::Ptr || parameter.constant {
                continue;
            }
            let index = slots[position];
            let target = match consumed[position] {
                Some(id) => {
                    self.map_states(|state| state.forget(id));
                    if parameter.size_out > 0 {
                        self.packets.resize(id, parameter.size_out);
                        Some(id)
                    } else {
                        self.packets.kill(id);
                        None
                    }
                }
                None if parameter.size_out > 0 => {
                    Some(self.packets.allocate(parameter.size_out, span.clone()))
                }
                None => None,
            };
            if let Some(id) = target {
                self.map_states(|state| state.slots[index] = Reference::Packet { id, offset: 0 });
            }
        }
        Ok(())
    }
}
