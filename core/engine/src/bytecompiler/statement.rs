//! Statement lowering.

use super::{collect_lexical_scope, ByteCompiler, LoopContext};
use crate::ast;
use crate::context::Context;
use crate::environments::ScopeShape;
use crate::string::JsString;
use crate::vm::{CodeBlockFlags, Opcode, NO_LABEL};
use crate::JsResult;

impl ByteCompiler {
    pub(super) fn compile_statements(
        &mut self,
        statements: &[ast::Statement],
        completion: Option<u8>,
        context: &mut Context,
    ) -> JsResult<()> {
        for statement in statements {
            self.compile_statement(statement, completion, context)?;
        }
        Ok(())
    }

    pub(super) fn compile_statement(
        &mut self,
        statement: &ast::Statement,
        completion: Option<u8>,
        context: &mut Context,
    ) -> JsResult<()> {
        use ast::StatementKind as S;
        self.mark_line(statement.line);
        match &statement.kind {
            S::Empty | S::Function(_) => {
                // Function declarations were bound during hoisting.
            }
            S::Debugger => self.emit(Opcode::Debugger),
            S::Expression(expression) => {
                let dst = match completion {
                    Some(register) => register,
                    None => self.alloc_register()?,
                };
                self.compile_expression(expression, dst, context)?;
                if completion.is_none() {
                    self.free_register(dst);
                }
            }
            S::Block(statements) => self.compile_block(statements, completion, context)?,
            S::Var(declarators) => {
                for declarator in declarators {
                    if let Some(init) = &declarator.init {
                        let value = self.alloc_register()?;
                        self.compile_expression(init, value, context)?;
                        self.compile_binding(&declarator.binding, value, false, context)?;
                        self.free_register(value);
                    }
                }
            }
            S::Let(declarators) => {
                for declarator in declarators {
                    let value = self.alloc_register()?;
                    match &declarator.init {
                        Some(init) => self.compile_expression(init, value, context)?,
                        None => {
                            self.emit(Opcode::LoadUndefined);
                            self.emit_u8(value);
                        }
                    }
                    self.compile_binding(&declarator.binding, value, true, context)?;
                    self.free_register(value);
                }
            }
            S::Const(declarators) => {
                for declarator in declarators {
                    let value = self.alloc_register()?;
                    let init = declarator
                        .init
                        .as_ref()
                        .ok_or_else(|| {
                            crate::error::JsNativeError::syntax()
                                .with_message("missing initializer in const declaration")
                        })?;
                    self.compile_expression(init, value, context)?;
                    self.compile_binding(&declarator.binding, value, true, context)?;
                    self.free_register(value);
                }
            }
            S::If {
                condition,
                then,
                otherwise,
            } => {
                let cond = self.alloc_register()?;
                self.compile_expression(condition, cond, context)?;
                let take_else = self.emit_jump_if(Opcode::JumpIfFalse, cond);
                self.free_register(cond);
                self.compile_statement(then, completion, context)?;
                match otherwise {
                    Some(otherwise) => {
                        let done = self.emit_jump();
                        self.patch_label(take_else)?;
                        self.compile_statement(otherwise, completion, context)?;
                        self.patch_label(done)?;
                    }
                    None => self.patch_label(take_else)?,
                }
            }
            S::While { condition, body } => {
                let loop_start = self.code.len();
                self.enter_loop(self.state_depth, self.state_depth);
                let cond = self.alloc_register()?;
                self.compile_expression(condition, cond, context)?;
                let exit = self.emit_jump_if(Opcode::JumpIfFalse, cond);
                self.free_register(cond);
                self.compile_statement(body, None, context)?;
                self.emit_jump_to(loop_start)?;
                self.patch_label(exit)?;
                self.exit_loop(loop_start)?;
            }
            S::DoWhile { body, condition } => {
                let loop_start = self.code.len();
                self.enter_loop(self.state_depth, self.state_depth);
                self.compile_statement(body, None, context)?;
                let continue_target = self.code.len();
                let cond = self.alloc_register()?;
                self.compile_expression(condition, cond, context)?;
                self.emit(Opcode::JumpIfTrue);
                self.emit_u8(cond);
                self.emit_backward_label(loop_start)?;
                self.free_register(cond);
                self.exit_loop(continue_target)?;
            }
            S::For {
                init,
                condition,
                update,
                body,
            } => self.compile_for(init, condition, update, body, context)?,
            S::ForIn {
                binding,
                object,
                body,
            } => self.compile_for_in(binding, object, body, context)?,
            S::ForOf {
                binding,
                iterable,
                body,
                awaited,
            } => self.compile_for_of(binding, iterable, body, *awaited, context)?,
            S::Continue => self.compile_loop_exit(true)?,
            S::Break => self.compile_loop_exit(false)?,
            S::Return(expression) => self.compile_return(expression.as_ref(), context)?,
            S::With { object, body } => {
                let object_reg = self.alloc_register()?;
                self.compile_expression(object, object_reg, context)?;
                self.emit(Opcode::PushWithEnv);
                self.emit_u8(object_reg);
                self.free_register(object_reg);
                self.state_depth += 1;
                self.compile_statement(body, completion, context)?;
                self.emit(Opcode::PopState);
                self.state_depth -= 1;
            }
            S::Throw(expression) => {
                let value = self.alloc_register()?;
                self.compile_expression(expression, value, context)?;
                self.emit(Opcode::Throw);
                self.emit_u8(value);
                self.free_register(value);
            }
            S::Try {
                block,
                catch,
                finally,
            } => self.compile_try(block, catch.as_ref(), finally.as_deref(), completion, context)?,
            S::Class(node) => {
                let class = self.alloc_register()?;
                self.compile_class(node, class, context)?;
                if let Some(name) = &node.name {
                    let index = self.binding_ref(name)?;
                    self.emit(Opcode::InitName);
                    self.emit_u8(class);
                    self.emit_u16(index);
                }
                self.free_register(class);
            }
        }
        Ok(())
    }

    fn compile_block(
        &mut self,
        statements: &[ast::Statement],
        completion: Option<u8>,
        context: &mut Context,
    ) -> JsResult<()> {
        let lexical = collect_lexical_scope(statements, self.strict());
        let block_functions: Vec<&ast::FunctionNode> = statements
            .iter()
            .filter_map(|s| match &s.kind {
                ast::StatementKind::Function(node) => Some(node),
                _ => None,
            })
            .collect();

        let mut entries = lexical;
        for node in &block_functions {
            if let Some(name) = &node.name {
                if !entries.iter().any(|e| &e.name == name) {
                    entries.push(crate::environments::BindingEntry {
                        name: name.clone(),
                        mutable: true,
                        strict: self.strict(),
                    });
                }
            }
        }

        let scoped = !entries.is_empty();
        if scoped {
            let index = self.scope(ScopeShape::new(entries))?;
            self.emit(Opcode::PushLexEnv);
            self.emit_u16(index);
            self.state_depth += 1;

            // Block-level function declarations hoist within the block.
            for node in &block_functions {
                let register = self.alloc_register()?;
                self.compile_function_value(node, CodeBlockFlags::empty(), register, context)?;
                let name = node.name.clone().unwrap_or_else(JsString::empty);
                let index = self.binding_ref(&name)?;
                self.emit(Opcode::InitName);
                self.emit_u8(register);
                self.emit_u16(index);
                self.free_register(register);
            }
        }

        self.compile_statements(statements, completion, context)?;

        if scoped {
            self.emit(Opcode::PopState);
            self.state_depth -= 1;
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: &Option<ast::ForInit>,
        condition: &Option<ast::Expression>,
        update: &Option<ast::Expression>,
        body: &ast::Statement,
        context: &mut Context,
    ) -> JsResult<()> {
        // Lexical loop heads get a per-iteration environment.
        let lexical = match init {
            Some(ast::ForInit::Let(declarators)) => Some((declarators, true)),
            Some(ast::ForInit::Const(declarators)) => Some((declarators, false)),
            _ => None,
        };
        let scoped = if let Some((declarators, mutable)) = lexical {
            let mut entries = Vec::new();
            for declarator in &*declarators {
                for name in super::binding_names(&declarator.binding) {
                    entries.push(crate::environments::BindingEntry {
                        name,
                        mutable,
                        strict: self.strict(),
                    });
                }
            }
            let index = self.scope(ScopeShape::new(entries))?;
            self.emit(Opcode::PushLexEnv);
            self.emit_u16(index);
            self.state_depth += 1;
            true
        } else {
            false
        };

        match init {
            Some(ast::ForInit::Var(declarators)) => {
                for declarator in declarators {
                    if let Some(init) = &declarator.init {
                        let value = self.alloc_register()?;
                        self.compile_expression(init, value, context)?;
                        self.compile_binding(&declarator.binding, value, false, context)?;
                        self.free_register(value);
                    }
                }
            }
            Some(ast::ForInit::Let(declarators) | ast::ForInit::Const(declarators)) => {
                for declarator in declarators {
                    let value = self.alloc_register()?;
                    match &declarator.init {
                        Some(init) => self.compile_expression(init, value, context)?,
                        None => {
                            self.emit(Opcode::LoadUndefined);
                            self.emit_u8(value);
                        }
                    }
                    self.compile_binding(&declarator.binding, value, true, context)?;
                    self.free_register(value);
                }
            }
            Some(ast::ForInit::Expression(expression)) => {
                let value = self.alloc_register()?;
                self.compile_expression(expression, value, context)?;
                self.free_register(value);
            }
            None => {}
        }

        let loop_start = self.code.len();
        self.enter_loop(self.state_depth, self.state_depth);

        let mut exit = None;
        if let Some(condition) = condition {
            let cond = self.alloc_register()?;
            self.compile_expression(condition, cond, context)?;
            exit = Some(self.emit_jump_if(Opcode::JumpIfFalse, cond));
            self.free_register(cond);
        }

        self.compile_statement(body, None, context)?;

        let continue_target = self.code.len();
        if scoped {
            self.emit(Opcode::NextLexEnv);
        }
        if let Some(update) = update {
            let value = self.alloc_register()?;
            self.compile_expression(update, value, context)?;
            self.free_register(value);
        }
        self.emit_jump_to(loop_start)?;
        if let Some(exit) = exit {
            self.patch_label(exit)?;
        }
        self.exit_loop(continue_target)?;

        if scoped {
            self.emit(Opcode::PopState);
            self.state_depth -= 1;
        }
        Ok(())
    }

    fn compile_for_in(
        &mut self,
        binding: &ast::ForBinding,
        object: &ast::Expression,
        body: &ast::Statement,
        context: &mut Context,
    ) -> JsResult<()> {
        let object_reg = self.alloc_register()?;
        self.compile_expression(object, object_reg, context)?;
        self.emit(Opcode::PushEnumerator);
        self.emit_u8(object_reg);
        self.free_register(object_reg);
        self.state_depth += 1;

        let loop_start = self.code.len();
        self.enter_loop(self.state_depth - 1, self.state_depth);

        let key = self.alloc_register()?;
        self.emit(Opcode::EnumStep);
        self.emit_u8(key);
        let exit = self.reserve_label();
        let scoped = self.compile_for_binding(binding, key, context)?;
        self.free_register(key);

        self.compile_statement(body, None, context)?;
        if scoped {
            self.emit(Opcode::PopState);
            self.state_depth -= 1;
        }
        self.emit_jump_to(loop_start)?;
        self.patch_label(exit)?;

        self.emit(Opcode::PopState);
        self.state_depth -= 1;
        self.exit_loop(loop_start)?;
        Ok(())
    }

    fn compile_for_of(
        &mut self,
        binding: &ast::ForBinding,
        iterable: &ast::Expression,
        body: &ast::Statement,
        awaited: bool,
        context: &mut Context,
    ) -> JsResult<()> {
        let iterable_reg = self.alloc_register()?;
        self.compile_expression(iterable, iterable_reg, context)?;
        if awaited {
            self.emit(Opcode::PushAsyncIterator);
        } else {
            self.emit(Opcode::PushIterator);
        }
        self.emit_u8(iterable_reg);
        self.free_register(iterable_reg);
        self.state_depth += 1;

        let loop_start = self.code.len();
        self.enter_loop(self.state_depth - 1, self.state_depth);

        let value = self.alloc_register()?;
        let exit;
        if awaited {
            self.emit(Opcode::AsyncForStep);
            self.emit_u8(value);
            self.emit(Opcode::AsyncForStepResume);
            self.emit_u8(value);
            self.emit_u8(value);
            exit = self.reserve_label();
        } else {
            self.emit(Opcode::ForStep);
            self.emit_u8(value);
            exit = self.reserve_label();
        }
        let scoped = self.compile_for_binding(binding, value, context)?;
        self.free_register(value);

        self.compile_statement(body, None, context)?;
        if scoped {
            self.emit(Opcode::PopState);
            self.state_depth -= 1;
        }
        self.emit_jump_to(loop_start)?;
        self.patch_label(exit)?;

        self.emit(Opcode::PopState);
        self.state_depth -= 1;
        self.exit_loop(loop_start)?;
        Ok(())
    }

    /// Binds one iteration value of a `for..in`/`for..of` head. Returns
    /// `true` when a per-iteration environment was pushed; the loop pops it
    /// after the body.
    fn compile_for_binding(
        &mut self,
        binding: &ast::ForBinding,
        value: u8,
        context: &mut Context,
    ) -> JsResult<bool> {
        match binding {
            ast::ForBinding::Var(binding) => {
                self.compile_binding(binding, value, false, context)?;
                Ok(false)
            }
            ast::ForBinding::Let(binding) | ast::ForBinding::Const(binding) => {
                // A fresh environment per iteration keeps closures in the
                // body from sharing the binding.
                let mut entries = Vec::new();
                for name in super::binding_names(binding) {
                    entries.push(crate::environments::BindingEntry {
                        name,
                        mutable: matches!(binding, ast::Binding::Pattern(_))
                            || matches!(binding, ast::Binding::Identifier(_)),
                        strict: self.strict(),
                    });
                }
                let index = self.scope(ScopeShape::new(entries))?;
                self.emit(Opcode::PushLexEnv);
                self.emit_u16(index);
                self.state_depth += 1;
                self.compile_binding(binding, value, true, context)?;
                Ok(true)
            }
            ast::ForBinding::Assign(target) => {
                match target {
                    ast::AssignTarget::Identifier(name) => {
                        let init = self.binding_ref(name)?;
                        self.emit(Opcode::SetName);
                        self.emit_u8(value);
                        self.emit_u16(init);
                    }
                    ast::AssignTarget::Member { base, access } => {
                        let base_reg = self.alloc_register()?;
                        self.compile_expression(base, base_reg, context)?;
                        self.compile_member_set(base_reg, access, value, context)?;
                        self.free_register(base_reg);
                    }
                    ast::AssignTarget::Pattern(pattern) => {
                        self.compile_pattern(pattern, value, false, context)?;
                    }
                }
                Ok(false)
            }
        }
    }

    fn compile_return(
        &mut self,
        expression: Option<&ast::Expression>,
        context: &mut Context,
    ) -> JsResult<()> {
        // Tail position: a strict-mode call with no live state frames keeps
        // the frame count flat.
        if let Some(ast::Expression::Call {
            callee,
            args,
            optional: false,
        }) = expression
        {
            let tail_ok = self.strict()
                && self.state_depth == 0
                && !self
                    .flags
                    .intersects(CodeBlockFlags::ASYNC | CodeBlockFlags::GENERATOR);
            if tail_ok {
                let dst = self.alloc_register()?;
                self.compile_call(callee, args, false, dst, true, context)?;
                // A non-reusable callee returned a value instead; return it.
                self.emit(Opcode::Return);
                self.emit_u8(dst);
                self.free_register(dst);
                return Ok(());
            }
        }

        let value = self.alloc_register()?;
        match expression {
            Some(expression) => self.compile_expression(expression, value, context)?,
            None => {
                self.emit(Opcode::LoadUndefined);
                self.emit_u8(value);
            }
        }
        self.emit(Opcode::Return);
        self.emit_u8(value);
        self.free_register(value);
        Ok(())
    }

    fn compile_try(
        &mut self,
        block: &[ast::Statement],
        catch: Option<&ast::Catch>,
        finally: Option<&[ast::Statement]>,
        completion: Option<u8>,
        context: &mut Context,
    ) -> JsResult<()> {
        debug_assert!(catch.is_some() || finally.is_some());

        self.emit(Opcode::PushTry);
        let catch_label = if catch.is_some() {
            Some(self.reserve_label())
        } else {
            self.emit_i16(NO_LABEL);
            None
        };
        let finally_label = if finally.is_some() {
            Some(self.reserve_label())
        } else {
            self.emit_i16(NO_LABEL);
            None
        };
        self.state_depth += 1;
        if finally.is_some() {
            self.finally_depths.push(self.state_depth - 1);
        }

        // Protected block.
        self.compile_block(block, completion, context)?;
        self.emit(Opcode::TryEnd);
        let after_try = if finally.is_none() {
            // No finally: TryEnd popped the frame, skip the catch body.
            Some(self.emit_jump())
        } else {
            // TryEnd transferred into the finally body.
            None
        };

        // Catch clause.
        if let Some(catch) = catch {
            self.patch_label(catch_label.expect("catch label reserved"))?;
            let error = self.alloc_register()?;
            self.emit(Opcode::CatchError);
            self.emit_u8(error);
            if let Some(parameter) = &catch.parameter {
                let mut entries = Vec::new();
                for name in super::binding_names(parameter) {
                    entries.push(crate::environments::BindingEntry {
                        name,
                        mutable: true,
                        strict: self.strict(),
                    });
                }
                let index = self.scope(ScopeShape::new(entries))?;
                self.emit(Opcode::PushLexEnv);
                self.emit_u16(index);
                self.state_depth += 1;
                self.compile_binding(parameter, error, true, context)?;
                self.free_register(error);
                self.compile_block(&catch.block, completion, context)?;
                self.emit(Opcode::PopState);
                self.state_depth -= 1;
            } else {
                self.free_register(error);
                self.compile_block(&catch.block, completion, context)?;
            }
            self.emit(Opcode::TryEnd);
        }

        // Finally block.
        if let Some(finally) = finally {
            self.finally_depths.pop();
            self.patch_label(finally_label.expect("finally label reserved"))?;
            self.compile_block(finally, None, context)?;
            self.emit(Opcode::FinallyEnd);
        }
        self.state_depth -= 1;

        if let Some(after_try) = after_try {
            self.patch_label(after_try)?;
        }
        Ok(())
    }

    // ==================== loops & abrupt edges ====================

    pub(super) fn enter_loop(&mut self, break_depth: usize, continue_depth: usize) {
        self.loops.push(LoopContext {
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
            break_depth,
            continue_depth,
        });
    }

    /// Closes the innermost loop: patches breaks here, continues to
    /// `continue_target` (or the collected patches).
    pub(super) fn exit_loop(&mut self, continue_target: usize) -> JsResult<()> {
        let context = self.loops.pop().expect("loop stack imbalance");
        for label in context.break_patches {
            self.patch_label(label)?;
        }
        for label in context.continue_patches {
            // Continue patches jump backward to a known target; point them
            // there by rewriting the operand.
            let end = label.operand + 2;
            let offset = continue_target as i64 - end as i64;
            let offset =
                i16::try_from(offset).map_err(|_| super::jump_too_far())?;
            self.code[label.operand..end].copy_from_slice(&offset.to_le_bytes());
        }
        Ok(())
    }

    /// Emits a `break` (or `continue`) edge, balancing the state stack and
    /// detouring through pending finally blocks.
    fn compile_loop_exit(&mut self, is_continue: bool) -> JsResult<()> {
        let (target_depth, crosses_finally) = {
            let Some(context) = self.loops.last() else {
                return Err(crate::error::JsNativeError::syntax()
                    .with_message(if is_continue {
                        "continue outside of a loop"
                    } else {
                        "break outside of a loop"
                    })
                    .into());
            };
            let depth = if is_continue {
                context.continue_depth
            } else {
                context.break_depth
            };
            let crosses = self.finally_depths.iter().any(|&d| d >= depth);
            (depth, crosses)
        };

        if crosses_finally {
            self.emit(Opcode::FinallyJump);
            let label = self.reserve_label();
            self.emit_u16(target_depth as u16);
            let context = self.loops.last_mut().expect("checked above");
            if is_continue {
                context.continue_patches.push(label);
            } else {
                context.break_patches.push(label);
            }
            return Ok(());
        }

        for _ in target_depth..self.state_depth {
            self.emit(Opcode::PopState);
        }
        self.emit(Opcode::Jump);
        let label = self.reserve_label();
        let context = self.loops.last_mut().expect("checked above");
        if is_continue {
            context.continue_patches.push(label);
        } else {
            context.break_patches.push(label);
        }
        Ok(())
    }

    // ==================== bindings & patterns ====================

    /// Stores `value` into a binding: `init` selects initialization
    /// (ending a dead zone) over assignment.
    pub(super) fn compile_binding(
        &mut self,
        binding: &ast::Binding,
        value: u8,
        init: bool,
        context: &mut Context,
    ) -> JsResult<()> {
        match binding {
            ast::Binding::Identifier(name) => {
                let index = self.binding_ref(name)?;
                self.emit(if init { Opcode::InitName } else { Opcode::SetName });
                self.emit_u8(value);
                self.emit_u16(index);
                Ok(())
            }
            ast::Binding::Pattern(pattern) => self.compile_pattern(pattern, value, init, context),
        }
    }

    /// Destructures `value` through `pattern`.
    pub(super) fn compile_pattern(
        &mut self,
        pattern: &ast::Pattern,
        value: u8,
        init: bool,
        context: &mut Context,
    ) -> JsResult<()> {
        match pattern {
            ast::Pattern::Array { elements, rest } => {
                self.emit(Opcode::PushArrayPattern);
                self.emit_u8(value);
                self.state_depth += 1;
                let element_reg = self.alloc_register()?;
                for element in elements {
                    self.emit(Opcode::PatternNext);
                    self.emit_u8(element_reg);
                    if let ast::ArrayPatternElement::Binding { binding, default } = element {
                        if let Some(default) = default {
                            let skip =
                                self.emit_jump_if(Opcode::JumpIfNotUndefined, element_reg);
                            self.compile_expression(default, element_reg, context)?;
                            self.patch_label(skip)?;
                        }
                        self.compile_binding(binding, element_reg, init, context)?;
                    }
                }
                if let Some(rest) = rest {
                    self.emit(Opcode::PatternRest);
                    self.emit_u8(element_reg);
                    self.compile_binding(rest, element_reg, init, context)?;
                }
                self.free_register(element_reg);
                self.emit(Opcode::PopState);
                self.state_depth -= 1;
                Ok(())
            }
            ast::Pattern::Object { properties, rest } => {
                self.emit(Opcode::PushObjectPattern);
                self.emit_u8(value);
                self.state_depth += 1;
                let property_reg = self.alloc_register()?;
                for property in properties {
                    match &property.name {
                        ast::PropertyName::Literal(name) => {
                            let slot = self.property_ref(name)?;
                            self.emit(Opcode::PatternGetByName);
                            self.emit_u8(property_reg);
                            self.emit_u16(slot);
                        }
                        ast::PropertyName::Computed(key) => {
                            let key_reg = self.alloc_register()?;
                            self.compile_expression(key, key_reg, context)?;
                            self.emit(Opcode::PatternGetByValue);
                            self.emit_u8(property_reg);
                            self.emit_u8(key_reg);
                            self.free_register(key_reg);
                        }
                    }
                    if let Some(default) = &property.default {
                        let skip = self.emit_jump_if(Opcode::JumpIfNotUndefined, property_reg);
                        self.compile_expression(default, property_reg, context)?;
                        self.patch_label(skip)?;
                    }
                    self.compile_binding(&property.binding, property_reg, init, context)?;
                }
                if let Some(rest) = rest {
                    self.emit(Opcode::PatternRestObject);
                    self.emit_u8(property_reg);
                    let index = self.binding_ref(rest)?;
                    self.emit(if init { Opcode::InitName } else { Opcode::SetName });
                    self.emit_u8(property_reg);
                    self.emit_u16(index);
                }
                self.free_register(property_reg);
                self.emit(Opcode::PopState);
                self.state_depth -= 1;
                Ok(())
            }
        }
    }
}
