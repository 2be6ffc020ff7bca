use crate::ast::{Expression, ExpressionKind};
use crate::error::{Error, ErrorKind};
use crate::source::Span;
use crate::validation::{Context, Reference};

impl Context<'_> {
    /// Expressions never change the state set; this only checks that every
    /// name resolves and every dereference is in bounds in every state.
    pub fn validate_expression(&self, expression: &Expression) -> Result<(), Error> {
        match &expression.kind {
            ExpressionKind::Integer(_) => Ok(()),
            ExpressionKind::Identifier(name) => {
                if self.metavariables.lookup(name).is_some()
                    && !self.variables.iter().any(|variable| &variable.name == name)
                {
                    return Ok(());
                }
                self.variable(name, &expression.span).map(|_| ())
            }
            ExpressionKind::Alloc(_) => Err(Error::new(
                ErrorKind::Shape,
                "alloc is only allowed as the whole right-hand side of a pointer assignment",
                expression.span.clone(),
            )),
            ExpressionKind::Dereference(operand) => {
                let Some(name) = operand.as_identifier() else {
                    return Err(Error::new(
                        ErrorKind::Shape,
                        "Only a pointer variable can be dereferenced",
                        operand.span.clone(),
                    ));
                };
                let index = self.pointer(name, &operand.span, "dereference")?;
                self.check_access(index, 1, name, &expression.span)
            }
            ExpressionKind::Binary { left, right, .. } => {
                self.validate_expression(left)?;
                self.validate_expression(right)
            }
        }
    }

    pub(super) fn check_access(
        &self,
        index: usize,
        words: i64,
        name: &str,
        span: &Span,
    ) -> Result<(), Error> {
        let Some(state) = self
            .states
            .iter()
            .find(|state| !state.slots[index].fits(&self.packets, words))
        else {
            return Ok(());
        };

        let message = match state.slots[index] {
            Reference::Null => format!("Access violation: {} may be null", name),
            Reference::Packet { id, .. } if !self.packets.is_live(id) => {
                format!("Access violation: {} points into a freed buffer", name)
            }
            Reference::Packet { id, offset } => format!(
                "Access violation: {} word(s) at offset {} of {} exceed its buffer of {} word(s)",
                words,
                offset,
                name,
                self.packets.capacity(id)
            ),
        };
        Err(Error::new(ErrorKind::AccessViolation, message, span.clone()))
    }
}
