//! Expression lowering.

use super::ByteCompiler;
use crate::ast;
use crate::context::Context;
use crate::string::JsString;
use crate::value::JsValue;
use crate::vm::{CodeBlockFlags, Opcode};
use crate::JsResult;

impl ByteCompiler {
    /// Compiles `expression`, leaving the result in `dst`.
    pub(super) fn compile_expression(
        &mut self,
        expression: &ast::Expression,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        use ast::Expression as E;
        match expression {
            E::Literal(literal) => self.compile_literal(literal, dst),
            E::Identifier(name) => {
                let index = self.binding_ref(name)?;
                self.emit(Opcode::GetName);
                self.emit_u8(dst);
                self.emit_u16(index);
                Ok(())
            }
            E::This => {
                self.emit(Opcode::LoadThis);
                self.emit_u8(dst);
                Ok(())
            }
            E::NewTarget => {
                self.emit(Opcode::LoadNewTarget);
                self.emit_u8(dst);
                Ok(())
            }
            E::Array(elements) => self.compile_array_literal(elements, dst, context),
            E::Object(properties) => self.compile_object_literal(properties, dst, context),
            E::Template(parts) => self.compile_template(parts, dst, context),
            E::Function(node) => self.compile_function_value(node, CodeBlockFlags::empty(), dst, context),
            E::Class(node) => self.compile_class(node, dst, context),
            E::Unary { op, operand } => self.compile_unary(*op, operand, dst, context),
            E::Update { op, prefix, target } => {
                self.compile_update(*op, *prefix, target, dst, context)
            }
            E::Binary { op, lhs, rhs } => {
                self.compile_expression(lhs, dst, context)?;
                let rhs_reg = self.alloc_register()?;
                self.compile_expression(rhs, rhs_reg, context)?;
                self.emit(binary_opcode(*op));
                self.emit_u8(dst);
                self.emit_u8(dst);
                self.emit_u8(rhs_reg);
                self.free_register(rhs_reg);
                Ok(())
            }
            E::Logical { op, lhs, rhs } => {
                self.compile_expression(lhs, dst, context)?;
                let skip = match op {
                    ast::LogicalOp::And => self.emit_jump_if(Opcode::JumpIfFalse, dst),
                    ast::LogicalOp::Or => self.emit_jump_if(Opcode::JumpIfTrue, dst),
                    ast::LogicalOp::Coalesce => {
                        // Evaluate the rhs only on a nullish lhs.
                        let take_rhs = self.emit_jump_if(Opcode::JumpIfNullOrUndefined, dst);
                        let done = self.emit_jump();
                        self.patch_label(take_rhs)?;
                        self.compile_expression(rhs, dst, context)?;
                        self.patch_label(done)?;
                        return Ok(());
                    }
                };
                self.compile_expression(rhs, dst, context)?;
                self.patch_label(skip)?;
                Ok(())
            }
            E::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.compile_expression(condition, dst, context)?;
                let take_else = self.emit_jump_if(Opcode::JumpIfFalse, dst);
                self.compile_expression(then, dst, context)?;
                let done = self.emit_jump();
                self.patch_label(take_else)?;
                self.compile_expression(otherwise, dst, context)?;
                self.patch_label(done)?;
                Ok(())
            }
            E::Assign { op, target, value } => {
                self.compile_assignment(op.as_ref().copied(), target, value, dst, context)
            }
            E::Member {
                base,
                access,
                optional,
            } => {
                self.compile_expression(base, dst, context)?;
                let mut skip = None;
                if *optional {
                    let nil = self.emit_jump_if(Opcode::JumpIfNullOrUndefined, dst);
                    let go = self.emit_jump();
                    self.patch_label(nil)?;
                    self.emit(Opcode::LoadUndefined);
                    self.emit_u8(dst);
                    skip = Some(self.emit_jump());
                    self.patch_label(go)?;
                }
                self.compile_member_get(dst, access, dst, context)?;
                if let Some(skip) = skip {
                    self.patch_label(skip)?;
                }
                Ok(())
            }
            E::SuperMember { access } => match access {
                ast::MemberAccess::Field(name) => {
                    let slot = self.property_ref(name)?;
                    self.emit(Opcode::GetPropertyOfSuperByName);
                    self.emit_u8(dst);
                    self.emit_u16(slot);
                    Ok(())
                }
                ast::MemberAccess::Index(key) => {
                    let key_reg = self.alloc_register()?;
                    self.compile_expression(key, key_reg, context)?;
                    self.emit(Opcode::GetPropertyOfSuperByValue);
                    self.emit_u8(dst);
                    self.emit_u8(key_reg);
                    self.free_register(key_reg);
                    Ok(())
                }
                ast::MemberAccess::Private(_) => Err(crate::error::JsNativeError::syntax()
                    .with_message("private member access on 'super'")
                    .into()),
            },
            E::Call {
                callee,
                args,
                optional,
            } => self.compile_call(callee, args, *optional, dst, false, context),
            E::New { callee, args } => {
                self.compile_expression(callee, dst, context)?;
                self.emit(Opcode::PushNew);
                self.emit_u8(dst);
                self.state_depth += 1;
                self.compile_arguments(args, context)?;
                self.emit(Opcode::New);
                self.emit_u8(dst);
                self.state_depth -= 1;
                Ok(())
            }
            E::SuperCall(args) => {
                self.emit(Opcode::PushSuperCall);
                self.state_depth += 1;
                self.compile_arguments(args, context)?;
                self.emit(Opcode::SuperCall);
                self.emit_u8(dst);
                self.state_depth -= 1;
                Ok(())
            }
            E::Yield { argument, delegate } => {
                if *delegate {
                    return self.compile_yield_delegate(
                        argument.as_deref().expect("yield* always has an operand"),
                        dst,
                        context,
                    );
                }
                let value = self.alloc_register()?;
                match argument {
                    Some(argument) => self.compile_expression(argument, value, context)?,
                    None => {
                        self.emit(Opcode::LoadUndefined);
                        self.emit_u8(value);
                    }
                }
                self.emit(Opcode::Yield);
                self.emit_u8(dst);
                self.emit_u8(value);
                self.free_register(value);
                Ok(())
            }
            E::Await(argument) => {
                let value = self.alloc_register()?;
                self.compile_expression(argument, value, context)?;
                self.emit(Opcode::Await);
                self.emit_u8(dst);
                self.emit_u8(value);
                self.free_register(value);
                Ok(())
            }
            E::Sequence(expressions) => {
                for expression in expressions {
                    self.compile_expression(expression, dst, context)?;
                }
                Ok(())
            }
            E::PrivateIn { name, object } => {
                self.compile_expression(object, dst, context)?;
                let index = self.private_ref(name)?;
                self.emit(Opcode::HasPrivateField);
                self.emit_u8(dst);
                self.emit_u8(dst);
                self.emit_u16(index);
                Ok(())
            }
        }
    }

    fn compile_literal(&mut self, literal: &ast::Literal, dst: u8) -> JsResult<()> {
        match literal {
            ast::Literal::Undefined => {
                self.emit(Opcode::LoadUndefined);
                self.emit_u8(dst);
            }
            ast::Literal::Null => {
                self.emit(Opcode::LoadNull);
                self.emit_u8(dst);
            }
            ast::Literal::Bool(true) => {
                self.emit(Opcode::LoadTrue);
                self.emit_u8(dst);
            }
            ast::Literal::Bool(false) => {
                self.emit(Opcode::LoadFalse);
                self.emit_u8(dst);
            }
            ast::Literal::Number(number) => self.compile_number(*number, dst)?,
            ast::Literal::String(string) => {
                let index = self.literal(JsValue::from(string.clone()))?;
                self.emit(Opcode::LoadConstant);
                self.emit_u8(dst);
                self.emit_u16(index);
            }
            ast::Literal::BigInt(bigint) => {
                let index = self.literal(JsValue::from(bigint.clone()))?;
                self.emit(Opcode::LoadConstant);
                self.emit_u8(dst);
                self.emit_u16(index);
            }
        }
        Ok(())
    }

    /// Numbers pick the narrowest immediate encoding.
    fn compile_number(&mut self, number: f64, dst: u8) -> JsResult<()> {
        if number == 0.0 && number.is_sign_positive() {
            self.emit(Opcode::LoadZero);
            self.emit_u8(dst);
            return Ok(());
        }
        if number == 1.0 {
            self.emit(Opcode::LoadOne);
            self.emit_u8(dst);
            return Ok(());
        }
        if number.fract() == 0.0 && !(number == 0.0 && number.is_sign_negative()) {
            if let Ok(int) = i32::try_from(number as i64) {
                if (int as f64).to_bits() == number.to_bits() {
                    if let Ok(small) = i8::try_from(int) {
                        self.emit(Opcode::LoadInt8);
                        self.emit_u8(dst);
                        self.emit_u8(small as u8);
                    } else {
                        self.emit(Opcode::LoadInt32);
                        self.emit_u8(dst);
                        self.emit_i32(int);
                    }
                    return Ok(());
                }
            }
        }
        self.emit(Opcode::LoadRational);
        self.emit_u8(dst);
        self.emit_f64(number);
        Ok(())
    }

    fn compile_array_literal(
        &mut self,
        elements: &[ast::ArrayElement],
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        self.emit(Opcode::PushNewArray);
        self.emit_u8(dst);
        self.state_depth += 1;
        let value = self.alloc_register()?;
        for element in elements {
            match element {
                ast::ArrayElement::Elision => {
                    self.emit(Opcode::LoadUndefined);
                    self.emit_u8(value);
                    self.emit(Opcode::AddArrayElement);
                    self.emit_u8(value);
                }
                ast::ArrayElement::Expr(expression) => {
                    self.compile_expression(expression, value, context)?;
                    self.emit(Opcode::AddArrayElement);
                    self.emit_u8(value);
                }
                ast::ArrayElement::Spread(expression) => {
                    self.compile_expression(expression, value, context)?;
                    self.emit(Opcode::AddArraySpread);
                    self.emit_u8(value);
                }
            }
        }
        self.free_register(value);
        self.emit(Opcode::PopState);
        self.state_depth -= 1;
        Ok(())
    }

    fn compile_object_literal(
        &mut self,
        properties: &[ast::PropertyDefinition],
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        self.emit(Opcode::NewObject);
        self.emit_u8(dst);
        for property in properties {
            match property {
                ast::PropertyDefinition::Property { name, value } => match name {
                    ast::PropertyName::Literal(name) => {
                        let value_reg = self.alloc_register()?;
                        self.compile_expression(value, value_reg, context)?;
                        let slot = self.property_ref(name)?;
                        self.emit(Opcode::DefineOwnPropertyByName);
                        self.emit_u8(dst);
                        self.emit_u8(value_reg);
                        self.emit_u16(slot);
                        self.free_register(value_reg);
                    }
                    ast::PropertyName::Computed(key) => {
                        let key_reg = self.alloc_register()?;
                        self.compile_expression(key, key_reg, context)?;
                        let value_reg = self.alloc_register()?;
                        self.compile_expression(value, value_reg, context)?;
                        self.emit(Opcode::DefineOwnPropertyByValue);
                        self.emit_u8(dst);
                        self.emit_u8(key_reg);
                        self.emit_u8(value_reg);
                        self.free_register(value_reg);
                        self.free_register(key_reg);
                    }
                },
                ast::PropertyDefinition::Shorthand(name) => {
                    let value_reg = self.alloc_register()?;
                    let index = self.binding_ref(name)?;
                    self.emit(Opcode::GetName);
                    self.emit_u8(value_reg);
                    self.emit_u16(index);
                    let slot = self.property_ref(name)?;
                    self.emit(Opcode::DefineOwnPropertyByName);
                    self.emit_u8(dst);
                    self.emit_u8(value_reg);
                    self.emit_u16(slot);
                    self.free_register(value_reg);
                }
                ast::PropertyDefinition::Method {
                    name,
                    kind,
                    function,
                } => {
                    let func_reg = self.alloc_register()?;
                    self.compile_function_value(
                        function,
                        CodeBlockFlags::METHOD,
                        func_reg,
                        context,
                    )?;
                    self.emit(Opcode::SetHomeObject);
                    self.emit_u8(func_reg);
                    self.emit_u8(dst);
                    match name {
                        ast::PropertyName::Literal(name) => {
                            let slot = self.property_ref(name)?;
                            let opcode = match kind {
                                ast::MethodKind::Method => Opcode::DefineOwnPropertyByName,
                                ast::MethodKind::Get => Opcode::DefineGetterByName,
                                ast::MethodKind::Set => Opcode::DefineSetterByName,
                            };
                            self.emit(opcode);
                            self.emit_u8(dst);
                            self.emit_u8(func_reg);
                            self.emit_u16(slot);
                        }
                        ast::PropertyName::Computed(key) => {
                            let key_reg = self.alloc_register()?;
                            self.compile_expression(key, key_reg, context)?;
                            let opcode = match kind {
                                ast::MethodKind::Method => Opcode::DefineOwnPropertyByValue,
                                ast::MethodKind::Get => Opcode::DefineGetterByValue,
                                ast::MethodKind::Set => Opcode::DefineSetterByValue,
                            };
                            self.emit(opcode);
                            self.emit_u8(dst);
                            self.emit_u8(key_reg);
                            self.emit_u8(func_reg);
                            self.free_register(key_reg);
                        }
                    }
                    self.free_register(func_reg);
                }
                ast::PropertyDefinition::Spread(expression) => {
                    let value_reg = self.alloc_register()?;
                    self.compile_expression(expression, value_reg, context)?;
                    self.emit(Opcode::CopyDataProperties);
                    self.emit_u8(dst);
                    self.emit_u8(value_reg);
                    self.free_register(value_reg);
                }
            }
        }
        Ok(())
    }

    fn compile_template(
        &mut self,
        parts: &[ast::TemplatePart],
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        // Seed with the empty string so `+` below always concatenates.
        let index = self.literal(JsValue::from(JsString::empty()))?;
        self.emit(Opcode::LoadConstant);
        self.emit_u8(dst);
        self.emit_u16(index);

        let piece = self.alloc_register()?;
        for part in parts {
            match part {
                ast::TemplatePart::String(string) => {
                    let index = self.literal(JsValue::from(string.clone()))?;
                    self.emit(Opcode::LoadConstant);
                    self.emit_u8(piece);
                    self.emit_u16(index);
                }
                ast::TemplatePart::Expr(expression) => {
                    self.compile_expression(expression, piece, context)?;
                    self.emit(Opcode::ToString);
                    self.emit_u8(piece);
                    self.emit_u8(piece);
                }
            }
            self.emit(Opcode::Add);
            self.emit_u8(dst);
            self.emit_u8(dst);
            self.emit_u8(piece);
        }
        self.free_register(piece);
        Ok(())
    }

    fn compile_unary(
        &mut self,
        op: ast::UnaryOp,
        operand: &ast::Expression,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        use ast::UnaryOp as U;
        match op {
            U::TypeOf => {
                // `typeof ident` tolerates unresolvable names.
                if let ast::Expression::Identifier(name) = operand {
                    let index = self.binding_ref(name)?;
                    self.emit(Opcode::GetNameOrUndefined);
                    self.emit_u8(dst);
                    self.emit_u16(index);
                } else {
                    self.compile_expression(operand, dst, context)?;
                }
                self.emit(Opcode::TypeOf);
                self.emit_u8(dst);
                self.emit_u8(dst);
            }
            U::Void => {
                self.compile_expression(operand, dst, context)?;
                self.emit(Opcode::LoadUndefined);
                self.emit_u8(dst);
            }
            U::Delete => match operand {
                ast::Expression::Member { base, access, .. } => {
                    self.compile_expression(base, dst, context)?;
                    match access {
                        ast::MemberAccess::Field(name) => {
                            let slot = self.property_ref(name)?;
                            self.emit(Opcode::DeletePropertyByName);
                            self.emit_u8(dst);
                            self.emit_u8(dst);
                            self.emit_u16(slot);
                        }
                        ast::MemberAccess::Index(key) => {
                            let key_reg = self.alloc_register()?;
                            self.compile_expression(key, key_reg, context)?;
                            self.emit(Opcode::DeletePropertyByValue);
                            self.emit_u8(dst);
                            self.emit_u8(dst);
                            self.emit_u8(key_reg);
                            self.free_register(key_reg);
                        }
                        ast::MemberAccess::Private(_) => {
                            return Err(crate::error::JsNativeError::syntax()
                                .with_message("private members cannot be deleted")
                                .into())
                        }
                    }
                }
                ast::Expression::Identifier(name) => {
                    if self.strict() {
                        return Err(crate::error::JsNativeError::syntax()
                            .with_message("cannot delete a variable in strict mode")
                            .into());
                    }
                    let index = self.binding_ref(name)?;
                    self.emit(Opcode::DeleteName);
                    self.emit_u8(dst);
                    self.emit_u16(index);
                }
                _ => {
                    self.compile_expression(operand, dst, context)?;
                    self.emit(Opcode::LoadTrue);
                    self.emit_u8(dst);
                }
            },
            U::Minus | U::Plus | U::Not | U::BitNot => {
                self.compile_expression(operand, dst, context)?;
                let opcode = match op {
                    U::Minus => Opcode::Neg,
                    U::Plus => Opcode::Pos,
                    U::Not => Opcode::LogicalNot,
                    _ => Opcode::BitNot,
                };
                self.emit(opcode);
                self.emit_u8(dst);
                self.emit_u8(dst);
            }
        }
        Ok(())
    }

    fn compile_update(
        &mut self,
        op: ast::UpdateOp,
        prefix: bool,
        target: &ast::AssignTarget,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        let step = match op {
            ast::UpdateOp::Increment => Opcode::Inc,
            ast::UpdateOp::Decrement => Opcode::Dec,
        };
        let undo = match op {
            ast::UpdateOp::Increment => Opcode::Dec,
            ast::UpdateOp::Decrement => Opcode::Inc,
        };

        match target {
            ast::AssignTarget::Identifier(name) => {
                let old = self.alloc_register()?;
                let get = self.binding_ref(name)?;
                self.emit(Opcode::GetName);
                self.emit_u8(old);
                self.emit_u16(get);
                self.emit(step);
                self.emit_u8(dst);
                self.emit_u8(old);
                let set = self.binding_ref(name)?;
                self.emit(Opcode::SetName);
                self.emit_u8(dst);
                self.emit_u16(set);
                if !prefix {
                    // The old value, coerced: step then undo round-trips
                    // through ToNumeric.
                    self.emit(undo);
                    self.emit_u8(dst);
                    self.emit_u8(dst);
                }
                self.free_register(old);
            }
            ast::AssignTarget::Member { base, access } => {
                let base_reg = self.alloc_register()?;
                self.compile_expression(base, base_reg, context)?;
                let old = self.alloc_register()?;
                self.compile_member_get(old, access, base_reg, context)?;
                self.emit(step);
                self.emit_u8(dst);
                self.emit_u8(old);
                self.compile_member_set(base_reg, access, dst, context)?;
                if !prefix {
                    self.emit(undo);
                    self.emit_u8(dst);
                    self.emit_u8(dst);
                }
                self.free_register(old);
                self.free_register(base_reg);
            }
            ast::AssignTarget::Pattern(_) => {
                return Err(crate::error::JsNativeError::syntax()
                    .with_message("invalid update target")
                    .into())
            }
        }
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        op: Option<ast::BinaryOp>,
        target: &ast::AssignTarget,
        value: &ast::Expression,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        match target {
            ast::AssignTarget::Identifier(name) => {
                if let Some(op) = op {
                    let index = self.binding_ref(name)?;
                    self.emit(Opcode::GetName);
                    self.emit_u8(dst);
                    self.emit_u16(index);
                    let rhs = self.alloc_register()?;
                    self.compile_expression(value, rhs, context)?;
                    self.emit(binary_opcode(op));
                    self.emit_u8(dst);
                    self.emit_u8(dst);
                    self.emit_u8(rhs);
                    self.free_register(rhs);
                } else {
                    self.compile_expression(value, dst, context)?;
                }
                let index = self.binding_ref(name)?;
                self.emit(Opcode::SetName);
                self.emit_u8(dst);
                self.emit_u16(index);
            }
            ast::AssignTarget::Member { base, access } => {
                let base_reg = self.alloc_register()?;
                self.compile_expression(base, base_reg, context)?;
                if let Some(op) = op {
                    self.compile_member_get(dst, access, base_reg, context)?;
                    let rhs = self.alloc_register()?;
                    self.compile_expression(value, rhs, context)?;
                    self.emit(binary_opcode(op));
                    self.emit_u8(dst);
                    self.emit_u8(dst);
                    self.emit_u8(rhs);
                    self.free_register(rhs);
                } else {
                    self.compile_expression(value, dst, context)?;
                }
                self.compile_member_set(base_reg, access, dst, context)?;
                self.free_register(base_reg);
            }
            ast::AssignTarget::Pattern(pattern) => {
                self.compile_expression(value, dst, context)?;
                self.compile_pattern(pattern, dst, false, context)?;
            }
        }
        Ok(())
    }

    pub(super) fn compile_member_get(
        &mut self,
        dst: u8,
        access: &ast::MemberAccess,
        base: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        match access {
            ast::MemberAccess::Field(name) => {
                let slot = self.property_ref(name)?;
                self.emit(Opcode::GetPropertyByName);
                self.emit_u8(dst);
                self.emit_u8(base);
                self.emit_u16(slot);
            }
            ast::MemberAccess::Index(key) => {
                let key_reg = self.alloc_register()?;
                self.compile_expression(key, key_reg, context)?;
                self.emit(Opcode::GetPropertyByValue);
                self.emit_u8(dst);
                self.emit_u8(base);
                self.emit_u8(key_reg);
                self.free_register(key_reg);
            }
            ast::MemberAccess::Private(name) => {
                let index = self.private_ref(name)?;
                self.emit(Opcode::GetPrivateField);
                self.emit_u8(dst);
                self.emit_u8(base);
                self.emit_u16(index);
            }
        }
        Ok(())
    }

    pub(super) fn compile_member_set(
        &mut self,
        base: u8,
        access: &ast::MemberAccess,
        value: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        match access {
            ast::MemberAccess::Field(name) => {
                let slot = self.property_ref(name)?;
                self.emit(Opcode::SetPropertyByName);
                self.emit_u8(base);
                self.emit_u8(value);
                self.emit_u16(slot);
            }
            ast::MemberAccess::Index(key) => {
                let key_reg = self.alloc_register()?;
                self.compile_expression(key, key_reg, context)?;
                self.emit(Opcode::SetPropertyByValue);
                self.emit_u8(base);
                self.emit_u8(key_reg);
                self.emit_u8(value);
                self.free_register(key_reg);
            }
            ast::MemberAccess::Private(name) => {
                let index = self.private_ref(name)?;
                self.emit(Opcode::SetPrivateField);
                self.emit_u8(base);
                self.emit_u8(value);
                self.emit_u16(index);
            }
        }
        Ok(())
    }

    /// Compiles a call. `tail` selects the frame-reusing opcodes; the
    /// caller only sets it in tail position.
    pub(super) fn compile_call(
        &mut self,
        callee: &ast::Expression,
        args: &[ast::Argument],
        optional: bool,
        dst: u8,
        tail: bool,
        context: &mut Context,
    ) -> JsResult<()> {
        // Evaluate callee and this.
        let func = self.alloc_register()?;
        let this = self.alloc_register()?;
        let mut is_eval = false;
        match callee {
            ast::Expression::Member {
                base,
                access,
                optional: base_optional,
            } => {
                self.compile_expression(base, this, context)?;
                if *base_optional {
                    // A nullish base short-circuits the whole call.
                    let nil = self.emit_jump_if(Opcode::JumpIfNullOrUndefined, this);
                    let go = self.emit_jump();
                    self.patch_label(nil)?;
                    self.emit(Opcode::LoadUndefined);
                    self.emit_u8(dst);
                    let done = self.emit_jump();
                    self.patch_label(go)?;
                    self.compile_member_get(func, access, this, context)?;
                    self.finish_call(func, this, args, optional, dst, tail, false, context)?;
                    self.patch_label(done)?;
                    self.free_register(this);
                    self.free_register(func);
                    return Ok(());
                }
                self.compile_member_get(func, access, this, context)?;
            }
            ast::Expression::SuperMember { access } => {
                self.emit(Opcode::LoadThis);
                self.emit_u8(this);
                match access {
                    ast::MemberAccess::Field(name) => {
                        let slot = self.property_ref(name)?;
                        self.emit(Opcode::GetPropertyOfSuperByName);
                        self.emit_u8(func);
                        self.emit_u16(slot);
                    }
                    ast::MemberAccess::Index(key) => {
                        let key_reg = self.alloc_register()?;
                        self.compile_expression(key, key_reg, context)?;
                        self.emit(Opcode::GetPropertyOfSuperByValue);
                        self.emit_u8(func);
                        self.emit_u8(key_reg);
                        self.free_register(key_reg);
                    }
                    ast::MemberAccess::Private(_) => {
                        return Err(crate::error::JsNativeError::syntax()
                            .with_message("private member access on 'super'")
                            .into())
                    }
                }
            }
            ast::Expression::Identifier(name) => {
                self.compile_expression(callee, func, context)?;
                self.emit(Opcode::LoadUndefined);
                self.emit_u8(this);
                is_eval = name == "eval";
            }
            _ => {
                self.compile_expression(callee, func, context)?;
                self.emit(Opcode::LoadUndefined);
                self.emit_u8(this);
            }
        }
        self.finish_call(func, this, args, optional, dst, tail, is_eval, context)?;
        self.free_register(this);
        self.free_register(func);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_call(
        &mut self,
        func: u8,
        this: u8,
        args: &[ast::Argument],
        optional: bool,
        dst: u8,
        tail: bool,
        is_eval: bool,
        context: &mut Context,
    ) -> JsResult<()> {
        let mut done = None;
        if optional {
            let nil = self.emit_jump_if(Opcode::JumpIfNullOrUndefined, func);
            let go = self.emit_jump();
            self.patch_label(nil)?;
            self.emit(Opcode::LoadUndefined);
            self.emit_u8(dst);
            done = Some(self.emit_jump());
            self.patch_label(go)?;
        }

        self.emit(Opcode::PushCall);
        self.emit_u8(func);
        self.emit_u8(this);
        self.state_depth += 1;
        self.compile_arguments(args, context)?;
        match (is_eval, tail) {
            (true, true) => self.emit(Opcode::TailEval),
            (true, false) => {
                self.emit(Opcode::Eval);
                self.emit_u8(dst);
            }
            (false, true) => self.emit(Opcode::TailCall),
            (false, false) => {
                self.emit(Opcode::Call);
                self.emit_u8(dst);
            }
        }
        self.state_depth -= 1;

        if let Some(done) = done {
            self.patch_label(done)?;
        }
        Ok(())
    }

    fn compile_arguments(
        &mut self,
        args: &[ast::Argument],
        context: &mut Context,
    ) -> JsResult<()> {
        let value = self.alloc_register()?;
        for argument in args {
            match argument {
                ast::Argument::Ordinary(expression) => {
                    self.compile_expression(expression, value, context)?;
                    self.emit(Opcode::PushArg);
                    self.emit_u8(value);
                }
                ast::Argument::Spread(expression) => {
                    self.compile_expression(expression, value, context)?;
                    self.emit(Opcode::PushSpreadArg);
                    self.emit_u8(value);
                }
            }
        }
        self.free_register(value);
        Ok(())
    }

    /// Lowers `yield*` into an explicit iteration that forwards each value.
    ///
    /// The resume value sent into the delegating generator is not threaded
    /// back into the inner iterator's `next`; delegation is value-forwarding
    /// only.
    fn compile_yield_delegate(
        &mut self,
        argument: &ast::Expression,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        let value = self.alloc_register()?;
        self.compile_expression(argument, value, context)?;
        self.emit(Opcode::PushIterator);
        self.emit_u8(value);
        self.state_depth += 1;

        let loop_start = self.code.len();
        self.emit(Opcode::ForStep);
        self.emit_u8(value);
        let exit = self.reserve_label();
        self.emit(Opcode::Yield);
        self.emit_u8(dst);
        self.emit_u8(value);
        self.emit_jump_to(loop_start)?;
        self.patch_label(exit)?;

        self.free_register(value);
        self.emit(Opcode::PopState);
        self.state_depth -= 1;
        self.emit(Opcode::LoadUndefined);
        self.emit_u8(dst);
        Ok(())
    }
}

pub(super) fn binary_opcode(op: ast::BinaryOp) -> Opcode {
    use ast::BinaryOp as B;
    match op {
        B::Add => Opcode::Add,
        B::Sub => Opcode::Sub,
        B::Mul => Opcode::Mul,
        B::Div => Opcode::Div,
        B::Mod => Opcode::Mod,
        B::Exp => Opcode::Pow,
        B::BitAnd => Opcode::BitAnd,
        B::BitOr => Opcode::BitOr,
        B::BitXor => Opcode::BitXor,
        B::Shl => Opcode::ShiftLeft,
        B::Shr => Opcode::ShiftRight,
        B::Ushr => Opcode::UnsignedShiftRight,
        B::Eq => Opcode::Eq,
        B::NotEq => Opcode::NotEq,
        B::StrictEq => Opcode::StrictEq,
        B::StrictNotEq => Opcode::StrictNotEq,
        B::Lt => Opcode::LessThan,
        B::Le => Opcode::LessThanOrEq,
        B::Gt => Opcode::GreaterThan,
        B::Ge => Opcode::GreaterThanOrEq,
        B::In => Opcode::In,
        B::InstanceOf => Opcode::InstanceOf,
    }
}
