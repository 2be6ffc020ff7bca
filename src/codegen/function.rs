use std::rc::Rc;

use crate::ast::{FunctionCall, FunctionDefinition};
use crate::codegen::{AsmCodegen, Frame, Pending, Symbol};
use crate::error::{Error, ErrorKind};
use crate::source::Span;
use crate::validation::Metavariables;

/// `_fun3` for plain functions, `_fun3_4_m1` for `[4, -1]`.
pub fn instance_label(index: usize, values: &[i64]) -> String {
    let mut label = format!("_fun{}", index);
    for value in values {
        label.push('_');
        if *value < 0 {
            label.push('m');
        }
        label.push_str(&value.unsigned_abs().to_string());
    }
    label
}

impl<'ast> AsmCodegen<'ast> {
    pub fn compile_function_definition(
        &mut self,
        definition: &'ast FunctionDefinition,
        span: &Span,
    ) -> Result<(), Error> {
        let index = self.functions;
        self.functions += 1;

        let symbol = Symbol::Defined {
            name: definition.name.clone(),
            index,
            definition,
            scope: Rc::new(self.frame.functions.clone()),
        };
        self.frame.functions.push(symbol.clone());

        if definition.metavariables.is_empty() {
            let metavariables = self.frame.metavariables.clone();
            self.request(instance_label(index, &[]), &symbol, metavariables);
        }
        log::trace!("function {} at {} is _fun{}", definition.name, span, index);
        Ok(())
    }

    fn request(&mut self, label: String, symbol: &Symbol<'ast>, metavariables: Metavariables) {
        let Symbol::Defined {
            definition, scope, ..
        } = symbol
        else {
            return;
        };
        if !self.requested.insert(label.clone()) {
            return;
        }
        let mut functions = scope.as_ref().clone();
        functions.push(symbol.clone());
        self.queue.push_back(Pending {
            label,
            definition: *definition,
            functions,
            metavariables,
        });
    }

    pub(super) fn compile_function_body(&mut self, pending: Pending<'ast>) -> Result<(), Error> {
        let Pending {
            label,
            definition,
            functions,
            metavariables,
        } = pending;

        self.frame = Frame {
            locals: vec![],
            arguments: definition
                .signature
                .parameters
                .iter()
                .map(|parameter| (parameter.name.clone(), parameter.ty))
                .collect(),
            functions,
            metavariables,
        };

        self.emit(format!("; function {}", definition.name));
        self.emit(format!("{}:", label));
        if definition.external {
            if !self.globals.insert(definition.name.clone()) {
                return Err(Error::new(
                    ErrorKind::Codegen,
                    format!("External function {} is defined twice", definition.name),
                    definition.body.span.clone(),
                ));
            }
            self.emit(format!("{}:", definition.name));
        }
        self.emit("push ebp");
        self.emit("mov ebp, esp");
        self.compile_block(&definition.body)?;
        self.emit("leave");
        self.emit("ret");
        Ok(())
    }

    /// Pushes the argument words right to left, calls, then copies the words
    /// the callee may have updated back into non-const argument variables.
    pub fn compile_call(&mut self, call: &FunctionCall, span: &Span) -> Result<(), Error> {
        let symbol = self.symbol(&call.name, span)?;
        self.emit(format!("; call {}", call.name));

        let slots = call
            .arguments
            .iter()
            .map(|(name, argument_span)| self.slot(name, argument_span).map(|(slot, _)| slot))
            .collect::<Result<Vec<_>, Error>>()?;

        let (target, signature) = match &symbol {
            Symbol::Defined {
                index, definition, ..
            } => {
                let definition: &'ast FunctionDefinition = definition;
                let values = call
                    .metavariables
                    .iter()
                    .map(|expression| self.frame.metavariables.evaluate(expression))
                    .collect::<Result<Vec<_>, Error>>()?;
                let label = instance_label(*index, &values);
                if !definition.metavariables.is_empty() {
                    let bindings = Metavariables::from_bindings(&definition.metavariables, &values);
                    self.request(label.clone(), &symbol, bindings);
                }
                (label, &definition.signature)
            }
            Symbol::Extern { name, signature } => (name.clone(), *signature),
        };

        for slot in slots.iter().rev() {
            self.emit(format!("push dword {}", slot));
        }
        self.emit(format!("call {}", target));
        if slots.is_empty() {
            return Ok(());
        }
        self.emit(format!("add esp, {}", slots.len() * 4));

        for (i, slot) in slots.iter().enumerate() {
            let constant = signature
                .parameters
                .get(i)
                .is_some_and(|parameter| parameter.constant);
            if constant {
                continue;
            }
            self.emit(format!("mov eax, [esp - {}]", (slots.len() - i) * 4));
            self.emit(format!("mov {}, eax", slot));
        }
        Ok(())
    }
}
