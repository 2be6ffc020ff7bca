use crate::ast::{
    Assumption, BinaryOperator, Block, Expression, ExpressionKind, If, Statement, StatementKind,
    Type, While,
};
use crate::codegen::{AsmCodegen, Symbol};
use crate::error::Error;

/// Packs `text` into little-endian words, zero padded. An empty string still
/// takes one word.
pub fn pack_words(text: &str) -> Vec<u32> {
    let mut words: Vec<u32> = text
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            let mut bytes = [0u8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(bytes)
        })
        .collect();
    if words.is_empty() {
        words.push(0);
    }
    words
}

impl<'ast> AsmCodegen<'ast> {
    pub fn compile_block(&mut self, block: &'ast Block) -> Result<(), Error> {
        let locals = self.frame.locals.len();
        let functions = self.frame.functions.len();
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        self.pop_locals(locals);
        self.frame.functions.truncate(functions);
        Ok(())
    }

    pub fn compile_statement(&mut self, statement: &'ast Statement) -> Result<(), Error> {
        let span = &statement.span;
        match &statement.kind {
            StatementKind::Block(block) => self.compile_block(block),
            StatementKind::Asm(code) => {
                self.emit("; asm");
                self.emit(code);
                Ok(())
            }
            StatementKind::If(branch) => self.compile_if(branch),
            StatementKind::While(looping) => self.compile_while(looping),
            StatementKind::Function(function) => self.compile_function_definition(function, span),
            StatementKind::Prototype(prototype) => {
                self.externs.insert(prototype.name.clone());
                self.frame.functions.push(Symbol::Extern {
                    name: prototype.name.clone(),
                    signature: &prototype.signature,
                });
                Ok(())
            }
            StatementKind::Definition { identifier, ty } => {
                self.emit(format!("; def {}", identifier));
                self.push_local(Some(identifier.clone()), *ty);
                Ok(())
            }
            StatementKind::Assignment { identifier, value } => {
                self.emit(format!("; {} :=", identifier));
                self.compile_expression(value)?;
                let (slot, _) = self.slot(identifier, span)?;
                self.emit("mov eax, [esp - 4]");
                self.emit(format!("mov {}, eax", slot));
                Ok(())
            }
            StatementKind::Movement { identifier, value } => {
                self.emit(format!("; {} <-", identifier));
                self.compile_expression(value)?;
                let (slot, _) = self.slot(identifier, span)?;
                self.emit("mov eax, [esp - 4]");
                self.emit(format!("mov ebx, {}", slot));
                self.emit("mov [ebx], eax");
                Ok(())
            }
            StatementKind::MovementString { identifier, value } => {
                self.emit(format!("; {} <- string", identifier));
                let (slot, _) = self.slot(identifier, span)?;
                self.emit(format!("mov ebx, {}", slot));
                for (i, word) in pack_words(value).into_iter().enumerate() {
                    self.emit(format!("mov dword [ebx + {}], 0x{:08x}", i * 4, word));
                }
                Ok(())
            }
            // Plain assumptions are facts for the validator only.
            StatementKind::Assumption(Assumption::Condition(_)) => Ok(()),
            StatementKind::Assumption(Assumption::Guard { condition, body }) => {
                self.emit("; assume");
                self.compile_expression(condition)?;
                let label = self.next_label();
                self.emit("cmp dword [esp - 4], 0");
                self.emit(format!("je _assume_end{}", label));
                self.compile_block(body)?;
                self.emit(format!("_assume_end{}:", label));
                Ok(())
            }
            StatementKind::Free(argument) => {
                self.emit("; free");
                self.compile_expression(argument)?;
                self.emit("mov eax, [esp - 4]");
                self.emit("push eax");
                self.emit("call free");
                self.emit("add esp, 4");
                Ok(())
            }
            StatementKind::Call(call) => self.compile_call(call, span),
            StatementKind::Expression(expression) => self.compile_expression(expression),
        }
    }

    fn compile_if(&mut self, branch: &'ast If) -> Result<(), Error> {
        let Some((condition, then_body)) = branch.branches.first() else {
            return Ok(());
        };
        self.emit("; if");
        self.compile_expression(condition)?;
        let label = self.next_label();
        self.emit("cmp dword [esp - 4], 0");
        self.emit(format!("je _if_else{}", label));
        self.compile_block(then_body)?;
        self.emit(format!("jmp _if_end{}", label));
        self.emit(format!("_if_else{}:", label));
        if let Some(else_body) = &branch.else_body {
            self.compile_block(else_body)?;
        }
        self.emit(format!("_if_end{}:", label));
        Ok(())
    }

    fn compile_while(&mut self, looping: &'ast While) -> Result<(), Error> {
        self.emit("; while");
        let label = self.next_label();
        self.emit(format!("_while{}:", label));
        self.compile_expression(&looping.condition)?;
        self.emit("cmp dword [esp - 4], 0");
        self.emit(format!("je _while_end{}", label));
        self.compile_block(&looping.body)?;
        self.emit(format!("jmp _while{}", label));
        self.emit(format!("_while_end{}:", label));
        Ok(())
    }

    pub fn compile_expression(&mut self, expression: &Expression) -> Result<(), Error> {
        match &expression.kind {
            ExpressionKind::Integer(value) => {
                self.emit(format!("mov dword [esp - 4], {}", value));
            }
            ExpressionKind::Identifier(name) => match self.slot(name, &expression.span) {
                Ok((slot, _)) => {
                    self.emit(format!("mov eax, {}", slot));
                    self.emit("mov [esp - 4], eax");
                }
                Err(error) => {
                    let value = self.frame.metavariables.lookup(name).ok_or(error)?;
                    self.emit(format!("mov dword [esp - 4], {}", value));
                }
            },
            ExpressionKind::Alloc(size) => {
                let words = self.frame.metavariables.evaluate(size)?;
                self.emit(format!("push dword {}", words.saturating_mul(4)));
                self.emit("call malloc");
                self.emit("add esp, 4");
                self.emit("mov [esp - 4], eax");
            }
            ExpressionKind::Dereference(operand) => {
                self.compile_expression(operand)?;
                self.emit("mov eax, [esp - 4]");
                self.emit("mov eax, [eax]");
                self.emit("mov [esp - 4], eax");
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => self.compile_binary(*operator, left, right)?,
        }
        Ok(())
    }

    fn compile_binary(
        &mut self,
        operator: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), Error> {
        // Offsets from a pointer count words.
        let scaled = matches!(
            operator,
            BinaryOperator::Addition | BinaryOperator::Subtraction
        ) && left
            .as_identifier()
            .and_then(|name| self.slot(name, &left.span).ok())
            .is_some_and(|(_, ty)| ty == Type::Ptr);

        let depth = self.frame.locals.len();
        self.compile_expression(left)?;
        self.push_local(None, Type::Int);
        self.compile_expression(right)?;
        if scaled {
            self.emit("shl dword [esp - 4], 2");
        }
        self.pop_locals(depth);

        self.emit("mov eax, [esp - 4]");
        match operator {
            BinaryOperator::Addition => self.emit("add eax, [esp - 8]"),
            BinaryOperator::Subtraction => self.emit("sub eax, [esp - 8]"),
            BinaryOperator::Multiplication => self.emit("imul eax, [esp - 8]"),
            BinaryOperator::Division => {
                self.emit("cdq");
                self.emit("idiv dword [esp - 8]");
            }
            BinaryOperator::Less | BinaryOperator::Equal => {
                self.emit("cmp eax, [esp - 8]");
                self.emit(if operator == BinaryOperator::Less {
                    "setl al"
                } else {
                    "sete al"
                });
                self.emit("movzx eax, al");
            }
        }
        self.emit("mov [esp - 4], eax");
        Ok(())
    }
}
