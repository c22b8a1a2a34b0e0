//! The bytecode compiler: lowers AST functions into [`CodeBlock`]s.
//!
//! Lowering is single pass with back-patched forward jumps. Registers are
//! allocated with stack discipline and capped at 256; bytecode segments are
//! capped at 64 KiB; both limits surface as `SyntaxError`s. Structured
//! constructs (scopes, `try`, iteration, argument accumulation,
//! destructuring) lower to paired push/pop operations on the interpreter's
//! state stack, and every abnormal edge (break, continue, return) balances
//! the static depth before it jumps.

mod class;
mod expression;
mod statement;

use std::rc::Rc;

use kestrel_gc::Gc;
use rustc_hash::FxHashMap;

use crate::ast;
use crate::context::Context;
use crate::environments::{BindingEntry, ScopeShape};
use crate::error::JsNativeError;
use crate::string::JsString;
use crate::value::JsValue;
use crate::vm::{
    BindingRef, CodeBlock, CodeBlockFlags, Opcode, PropertyRef, MAX_CODE_SIZE, MAX_REGISTERS,
    NO_INDEX,
};
use crate::JsResult;

/// A forward jump waiting for its target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Label {
    /// Offset of the `i16` operand to patch.
    operand: usize,
}

/// Where `var` declarations land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarMode {
    /// Slots of the function (or module) scope.
    Local,
    /// Properties of the global object.
    Global,
}

/// An enclosing breakable/continuable construct.
#[derive(Debug)]
struct LoopContext {
    /// Forward patches for `break`.
    break_patches: Vec<Label>,
    /// Forward patches for `continue`.
    continue_patches: Vec<Label>,
    /// State-stack depth at the break target.
    break_depth: usize,
    /// State-stack depth at the continue target.
    continue_depth: usize,
}

/// The per-function compiler.
pub(crate) struct ByteCompiler {
    name: JsString,
    length: u32,
    flags: CodeBlockFlags,
    code: Vec<u8>,
    literals: Vec<JsValue>,
    bindings: Vec<BindingRef>,
    property_refs: Vec<PropertyRef>,
    scopes: Vec<Rc<ScopeShape>>,
    private_scopes: Vec<Vec<JsString>>,
    private_names: Vec<JsString>,
    private_name_map: FxHashMap<JsString, u16>,
    functions: Vec<Gc<CodeBlock>>,
    line_info: Vec<(u32, u32)>,
    current_line: u32,
    register_top: u16,
    register_max: u16,
    /// Static depth of the interpreter state stack.
    state_depth: usize,
    /// State depths of active `try` frames that carry a `finally`.
    finally_depths: Vec<usize>,
    loops: Vec<LoopContext>,
    var_mode: VarMode,
}

impl ByteCompiler {
    fn new(name: JsString, length: u32, flags: CodeBlockFlags, var_mode: VarMode) -> Self {
        Self {
            name,
            length,
            flags,
            code: Vec::new(),
            literals: Vec::new(),
            bindings: Vec::new(),
            property_refs: Vec::new(),
            scopes: Vec::new(),
            private_scopes: Vec::new(),
            private_names: Vec::new(),
            private_name_map: FxHashMap::default(),
            functions: Vec::new(),
            line_info: Vec::new(),
            current_line: 0,
            register_top: 0,
            register_max: 0,
            state_depth: 0,
            finally_depths: Vec::new(),
            loops: Vec::new(),
            var_mode,
        }
    }

    fn strict(&self) -> bool {
        self.flags.contains(CodeBlockFlags::STRICT)
    }

    // ==================== emitter ====================

    fn emit(&mut self, opcode: Opcode) {
        self.code.push(opcode as u8);
    }

    fn emit_u8(&mut self, value: u8) {
        self.code.push(value);
    }

    fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn emit_i16(&mut self, value: i16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn emit_i32(&mut self, value: i32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn emit_f64(&mut self, value: f64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Reserves a label operand to be patched later.
    fn reserve_label(&mut self) -> Label {
        let operand = self.code.len();
        self.emit_i16(0);
        Label { operand }
    }

    /// Points a reserved label at the current position.
    fn patch_label(&mut self, label: Label) -> JsResult<()> {
        let end = label.operand + 2;
        let offset = self.code.len() as i64 - end as i64;
        let offset = i16::try_from(offset).map_err(|_| jump_too_far())?;
        self.code[label.operand..end].copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    /// Emits a label operand pointing backward at `target`.
    fn emit_backward_label(&mut self, target: usize) -> JsResult<()> {
        let end = self.code.len() + 2;
        let offset = target as i64 - end as i64;
        let offset = i16::try_from(offset).map_err(|_| jump_too_far())?;
        self.emit_i16(offset);
        Ok(())
    }

    /// `Jump` to a known (usually backward) target.
    fn emit_jump_to(&mut self, target: usize) -> JsResult<()> {
        self.emit(Opcode::Jump);
        self.emit_backward_label(target)
    }

    /// `Jump` forward; returns the patch handle.
    fn emit_jump(&mut self) -> Label {
        self.emit(Opcode::Jump);
        self.reserve_label()
    }

    /// A conditional forward jump on a register.
    fn emit_jump_if(&mut self, opcode: Opcode, register: u8) -> Label {
        self.emit(opcode);
        self.emit_u8(register);
        self.reserve_label()
    }

    // ==================== registers ====================

    fn alloc_register(&mut self) -> JsResult<u8> {
        if self.register_top as usize >= MAX_REGISTERS {
            return Err(JsNativeError::syntax()
                .with_message("function needs more than 256 registers")
                .into());
        }
        let register = self.register_top as u8;
        self.register_top += 1;
        self.register_max = self.register_max.max(self.register_top);
        Ok(register)
    }

    fn free_register(&mut self, register: u8) {
        debug_assert_eq!(
            u16::from(register) + 1,
            self.register_top,
            "registers must be freed in stack order"
        );
        self.register_top -= 1;
    }

    // ==================== tables ====================

    fn literal(&mut self, value: JsValue) -> JsResult<u16> {
        let index = self.literals.len();
        self.literals.push(value);
        table_index(index)
    }

    /// Binding references are per-site, so each site caches its own
    /// resolution.
    fn binding_ref(&mut self, name: &JsString) -> JsResult<u16> {
        let index = self.bindings.len();
        self.bindings.push(BindingRef::new(name.clone()));
        table_index(index)
    }

    fn property_ref(&mut self, name: &JsString) -> JsResult<u16> {
        let index = self.property_refs.len();
        self.property_refs.push(PropertyRef::new(name.clone()));
        table_index(index)
    }

    fn private_ref(&mut self, description: &JsString) -> JsResult<u16> {
        if let Some(&index) = self.private_name_map.get(description) {
            return Ok(index);
        }
        let index = table_index(self.private_names.len())?;
        self.private_names.push(description.clone());
        self.private_name_map.insert(description.clone(), index);
        Ok(index)
    }

    fn scope(&mut self, shape: ScopeShape) -> JsResult<u16> {
        let index = self.scopes.len();
        self.scopes.push(Rc::new(shape));
        table_index(index)
    }

    fn function(&mut self, code: Gc<CodeBlock>) -> JsResult<u16> {
        let index = self.functions.len();
        self.functions.push(code);
        table_index(index)
    }

    // ==================== lines ====================

    fn mark_line(&mut self, line: u32) {
        if line != 0 && line != self.current_line {
            self.current_line = line;
            self.line_info.push((self.code.len() as u32, line));
        }
    }

    // ==================== finish ====================

    fn finish(self, context: &mut Context) -> JsResult<Gc<CodeBlock>> {
        if self.code.len() > MAX_CODE_SIZE {
            return Err(JsNativeError::syntax()
                .with_message("function body exceeds the 64 KiB bytecode limit")
                .into());
        }
        Ok(context.heap().alloc(CodeBlock {
            name: self.name,
            length: self.length,
            flags: self.flags,
            register_count: self.register_max,
            code: self.code,
            literals: self.literals,
            bindings: self.bindings,
            property_refs: self.property_refs,
            scopes: self.scopes,
            private_scopes: self.private_scopes,
            private_names: self.private_names,
            functions: self.functions,
            line_info: self.line_info,
        }))
    }
}

fn table_index(index: usize) -> JsResult<u16> {
    u16::try_from(index)
        .ok()
        .filter(|&i| i != NO_INDEX)
        .ok_or_else(|| {
            JsNativeError::syntax()
                .with_message("function exceeds a 16-bit side table")
                .into()
        })
}

fn jump_too_far() -> crate::error::JsError {
    JsNativeError::syntax()
        .with_message("jump exceeds the 32 KiB label range")
        .into()
}

/// Compiles a script's top level.
///
/// Top-level `var`s and function declarations go to the global object;
/// top-level lexical declarations live in a script-scoped environment.
pub(crate) fn compile_script(
    script: &ast::Script,
    context: &mut Context,
) -> JsResult<Gc<CodeBlock>> {
    let mut compiler = ByteCompiler::new(
        JsString::from("<main>"),
        0,
        CodeBlockFlags::empty(),
        VarMode::Global,
    );

    // Script lexical scope.
    let lexical = collect_lexical_scope(&script.statements, compiler.strict());
    let has_lexical = !lexical.is_empty();
    if has_lexical {
        let index = compiler.scope(ScopeShape::new(lexical))?;
        compiler.emit(Opcode::PushLexEnv);
        compiler.emit_u16(index);
        compiler.state_depth += 1;
    }

    // Hoisting: vars become global properties, functions bind eagerly.
    let vars = collect_var_names(&script.statements);
    if !vars.is_empty() {
        let undef = compiler.alloc_register()?;
        compiler.emit(Opcode::LoadUndefined);
        compiler.emit_u8(undef);
        for name in &vars {
            let index = compiler.binding_ref(name)?;
            compiler.emit(Opcode::InitName);
            compiler.emit_u8(undef);
            compiler.emit_u16(index);
        }
        compiler.free_register(undef);
    }
    compiler.hoist_functions(&script.statements, context)?;

    let completion = compiler.alloc_register()?;
    compiler.emit(Opcode::LoadUndefined);
    compiler.emit_u8(completion);
    compiler.compile_statements(&script.statements, Some(completion), context)?;

    if has_lexical {
        compiler.emit(Opcode::PopState);
        compiler.state_depth -= 1;
    }
    compiler.emit(Opcode::Return);
    compiler.emit_u8(completion);
    compiler.free_register(completion);

    compiler.finish(context)
}

/// Compiles a module body. Import bindings resolve through the module
/// environment's redirection table; the body itself compiles like a strict
/// function over the module scope, with top-level `await` flagging the
/// block async.
pub(crate) fn compile_module(
    module: &ast::Module,
    context: &mut Context,
) -> JsResult<Gc<CodeBlock>> {
    let mut flags = CodeBlockFlags::MODULE | CodeBlockFlags::STRICT;

    // The statements of the body, with export wrappers peeled off.
    let mut statements: Vec<ast::Statement> = Vec::new();
    let mut default_export: Option<&ast::Expression> = None;
    for item in &module.items {
        match item {
            ast::ModuleItem::Statement(statement) => statements.push(statement.clone()),
            ast::ModuleItem::Export(ast::ExportDeclaration::Declaration(statement)) => {
                statements.push(statement.clone());
            }
            ast::ModuleItem::Export(ast::ExportDeclaration::Default(expression)) => {
                default_export = Some(expression);
            }
            _ => {}
        }
    }
    if statements_contain_await(&statements) {
        flags |= CodeBlockFlags::ASYNC;
    }

    let mut compiler = ByteCompiler::new(JsString::from("<module>"), 0, flags, VarMode::Local);

    // The module scope: every top-level declaration, plus the synthetic
    // default-export binding.
    let mut entries = collect_lexical_scope(&statements, true);
    for name in collect_var_names(&statements) {
        if !entries.iter().any(|e| e.name == name) {
            entries.push(BindingEntry {
                name,
                mutable: true,
                strict: true,
            });
        }
    }
    if default_export.is_some() {
        entries.push(BindingEntry {
            name: JsString::from("*default*"),
            mutable: true,
            strict: true,
        });
    }
    compiler.scopes.push(Rc::new(ScopeShape::new(entries)));

    // Hoisting.
    let vars = collect_var_names(&statements);
    if !vars.is_empty() {
        let undef = compiler.alloc_register()?;
        compiler.emit(Opcode::LoadUndefined);
        compiler.emit_u8(undef);
        for name in &vars {
            let index = compiler.binding_ref(name)?;
            compiler.emit(Opcode::InitName);
            compiler.emit_u8(undef);
            compiler.emit_u16(index);
        }
        compiler.free_register(undef);
    }
    compiler.hoist_functions(&statements, context)?;

    compiler.compile_statements(&statements, None, context)?;

    if let Some(expression) = default_export {
        let value = compiler.alloc_register()?;
        compiler.compile_expression(expression, value, context)?;
        let index = compiler.binding_ref(&JsString::from("*default*"))?;
        compiler.emit(Opcode::InitName);
        compiler.emit_u8(value);
        compiler.emit_u16(index);
        compiler.free_register(value);
    }

    let undef = compiler.alloc_register()?;
    compiler.emit(Opcode::LoadUndefined);
    compiler.emit_u8(undef);
    compiler.emit(Opcode::Return);
    compiler.emit_u8(undef);
    compiler.free_register(undef);

    compiler.finish(context)
}

/// Whether any statement at this level awaits (functions don't count).
fn statements_contain_await(statements: &[ast::Statement]) -> bool {
    fn statement_has_await(kind: &ast::StatementKind) -> bool {
        use ast::StatementKind as S;
        match kind {
            S::Expression(e) | S::Throw(e) => expression_has_await(e),
            S::Return(Some(e)) => expression_has_await(e),
            S::Var(ds) | S::Let(ds) | S::Const(ds) => ds
                .iter()
                .any(|d| d.init.as_ref().is_some_and(expression_has_await)),
            S::Block(ss) => ss.iter().any(|s| statement_has_await(&s.kind)),
            S::If {
                condition,
                then,
                otherwise,
            } => {
                expression_has_await(condition)
                    || statement_has_await(&then.kind)
                    || otherwise.as_ref().is_some_and(|s| statement_has_await(&s.kind))
            }
            S::While { condition, body } | S::DoWhile { body, condition } => {
                expression_has_await(condition) || statement_has_await(&body.kind)
            }
            S::For {
                init,
                condition,
                update,
                body,
            } => {
                init.as_ref().is_some_and(|init| match init {
                    ast::ForInit::Expression(e) => expression_has_await(e),
                    ast::ForInit::Var(ds) | ast::ForInit::Let(ds) | ast::ForInit::Const(ds) => {
                        ds.iter()
                            .any(|d| d.init.as_ref().is_some_and(expression_has_await))
                    }
                }) || condition.as_ref().is_some_and(expression_has_await)
                    || update.as_ref().is_some_and(expression_has_await)
                    || statement_has_await(&body.kind)
            }
            S::ForIn { object, body, .. } => {
                expression_has_await(object) || statement_has_await(&body.kind)
            }
            S::ForOf {
                iterable,
                body,
                awaited,
                ..
            } => *awaited || expression_has_await(iterable) || statement_has_await(&body.kind),
            S::With { object, body } => {
                expression_has_await(object) || statement_has_await(&body.kind)
            }
            S::Try {
                block,
                catch,
                finally,
            } => {
                block.iter().any(|s| statement_has_await(&s.kind))
                    || catch
                        .as_ref()
                        .is_some_and(|c| c.block.iter().any(|s| statement_has_await(&s.kind)))
                    || finally
                        .as_ref()
                        .is_some_and(|f| f.iter().any(|s| statement_has_await(&s.kind)))
            }
            _ => false,
        }
    }

    fn expression_has_await(expression: &ast::Expression) -> bool {
        use ast::Expression as E;
        match expression {
            E::Await(_) => true,
            E::Unary { operand, .. } => expression_has_await(operand),
            E::Binary { lhs, rhs, .. } | E::Logical { lhs, rhs, .. } => {
                expression_has_await(lhs) || expression_has_await(rhs)
            }
            E::Conditional {
                condition,
                then,
                otherwise,
            } => {
                expression_has_await(condition)
                    || expression_has_await(then)
                    || expression_has_await(otherwise)
            }
            E::Assign { value, .. } => expression_has_await(value),
            E::Member { base, .. } => expression_has_await(base),
            E::Call { callee, args, .. } | E::New { callee, args } => {
                expression_has_await(callee)
                    || args.iter().any(|a| match a {
                        ast::Argument::Ordinary(e) | ast::Argument::Spread(e) => {
                            expression_has_await(e)
                        }
                    })
            }
            E::Sequence(expressions) => expressions.iter().any(expression_has_await),
            E::Array(elements) => elements.iter().any(|e| match e {
                ast::ArrayElement::Expr(e) | ast::ArrayElement::Spread(e) => {
                    expression_has_await(e)
                }
                ast::ArrayElement::Elision => false,
            }),
            E::Template(parts) => parts.iter().any(|p| match p {
                ast::TemplatePart::Expr(e) => expression_has_await(e),
                ast::TemplatePart::String(_) => false,
            }),
            _ => false,
        }
    }

    statements.iter().any(|s| statement_has_await(&s.kind))
}

/// Compiles a function node into a code block, for `CreateFunction`.
pub(crate) fn compile_function(
    node: &ast::FunctionNode,
    extra_flags: CodeBlockFlags,
    context: &mut Context,
) -> JsResult<Gc<CodeBlock>> {
    let mut flags = extra_flags;
    if node.strict {
        flags |= CodeBlockFlags::STRICT;
    }
    if node.is_async {
        flags |= CodeBlockFlags::ASYNC;
    }
    if node.is_generator {
        flags |= CodeBlockFlags::GENERATOR;
    }
    match node.flavor {
        ast::FunctionFlavor::Arrow => flags |= CodeBlockFlags::ARROW,
        ast::FunctionFlavor::Method => flags |= CodeBlockFlags::METHOD,
        ast::FunctionFlavor::Ordinary => {}
    }
    if simple_parameters(&node.parameters) {
        flags |= CodeBlockFlags::SIMPLE_PARAMETERS;
    }

    let name = node.name.clone().unwrap_or_else(JsString::empty);
    let length = node
        .parameters
        .iter()
        .take_while(|p| !p.rest && p.default.is_none())
        .count() as u32;

    let mut compiler = ByteCompiler::new(name, length, flags, VarMode::Local);
    compiler.compile_function_body(node, context)?;
    compiler.finish(context)
}

impl ByteCompiler {
    /// The prologue and body of a function: parameter scope, parameter
    /// binding, arguments object, `var` and function hoisting, then the
    /// statements.
    fn compile_function_body(
        &mut self,
        node: &ast::FunctionNode,
        context: &mut Context,
    ) -> JsResult<()> {
        let shape = function_scope_shape(node, self.strict());
        let binds_arguments = shape.slot(&JsString::from("arguments")).is_some();
        let mapped_count = node.parameters.len();
        self.scopes.push(Rc::new(shape));

        // Parameters, in slot order.
        for (i, parameter) in node.parameters.iter().enumerate() {
            let value = self.alloc_register()?;
            if parameter.rest {
                self.emit(Opcode::RestArguments);
                self.emit_u8(value);
                self.emit_u8(i as u8);
            } else {
                self.emit(Opcode::GetArgument);
                self.emit_u8(value);
                self.emit_u8(i as u8);
                if let Some(default) = &parameter.default {
                    let skip = self.emit_jump_if(Opcode::JumpIfNotUndefined, value);
                    self.compile_expression(default, value, context)?;
                    self.patch_label(skip)?;
                }
            }
            self.compile_binding(&parameter.binding, value, true, context)?;
            self.free_register(value);
        }

        // The arguments object.
        if binds_arguments {
            let value = self.alloc_register()?;
            if self.flags.contains(CodeBlockFlags::SIMPLE_PARAMETERS) && !self.strict() {
                self.emit(Opcode::CreateMappedArguments);
                self.emit_u8(value);
                self.emit_u8(mapped_count as u8);
            } else {
                self.emit(Opcode::CreateUnmappedArguments);
                self.emit_u8(value);
            }
            let index = self.binding_ref(&JsString::from("arguments"))?;
            self.emit(Opcode::InitName);
            self.emit_u8(value);
            self.emit_u16(index);
            self.free_register(value);
        }

        // `var` hoisting (skipping parameter names, which already hold the
        // argument values).
        let param_names: Vec<JsString> = node
            .parameters
            .iter()
            .flat_map(|p| binding_names(&p.binding))
            .collect();
        let vars: Vec<JsString> = collect_var_names(&node.body)
            .into_iter()
            .filter(|name| !param_names.contains(name))
            .collect();
        if !vars.is_empty() {
            let undef = self.alloc_register()?;
            self.emit(Opcode::LoadUndefined);
            self.emit_u8(undef);
            for name in &vars {
                let index = self.binding_ref(name)?;
                self.emit(Opcode::InitName);
                self.emit_u8(undef);
                self.emit_u16(index);
            }
            self.free_register(undef);
        }
        self.hoist_functions(&node.body, context)?;

        if self.flags.contains(CodeBlockFlags::GENERATOR) {
            self.emit(Opcode::GeneratorStart);
        }

        self.compile_statements(&node.body, None, context)?;

        let undef = self.alloc_register()?;
        self.emit(Opcode::LoadUndefined);
        self.emit_u8(undef);
        self.emit(Opcode::Return);
        self.emit_u8(undef);
        self.free_register(undef);
        Ok(())
    }

    /// Binds top-level function declarations eagerly.
    fn hoist_functions(
        &mut self,
        statements: &[ast::Statement],
        context: &mut Context,
    ) -> JsResult<()> {
        for statement in statements {
            if let ast::StatementKind::Function(node) = &statement.kind {
                let register = self.alloc_register()?;
                self.compile_function_value(node, CodeBlockFlags::empty(), register, context)?;
                let name = node.name.clone().unwrap_or_else(JsString::empty);
                let index = self.binding_ref(&name)?;
                // `SetName` both here and at the global scope: function
                // hoisting overwrites earlier bindings of the same name.
                if self.var_mode == VarMode::Global {
                    self.emit(Opcode::SetName);
                } else {
                    self.emit(Opcode::InitName);
                }
                self.emit_u8(register);
                self.emit_u16(index);
                self.free_register(register);
            }
        }
        Ok(())
    }

    /// Compiles a nested function and leaves the closure in `dst`.
    fn compile_function_value(
        &mut self,
        node: &ast::FunctionNode,
        extra_flags: CodeBlockFlags,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        let mut extra = extra_flags;
        if self.strict() {
            extra |= CodeBlockFlags::STRICT;
        }
        let code = compile_function(node, extra, context)?;
        let index = self.function(code)?;
        self.emit(Opcode::CreateFunction);
        self.emit_u8(dst);
        self.emit_u16(index);
        Ok(())
    }
}

// ==================== declaration analysis ====================

/// Whether every parameter is a plain name with no default and no rest.
fn simple_parameters(parameters: &[ast::FormalParameter]) -> bool {
    parameters.iter().all(|p| {
        !p.rest && p.default.is_none() && matches!(p.binding, ast::Binding::Identifier(_))
    })
}

/// The names a binding introduces.
pub(crate) fn binding_names(binding: &ast::Binding) -> Vec<JsString> {
    let mut names = Vec::new();
    collect_binding_names(binding, &mut names);
    names
}

fn collect_binding_names(binding: &ast::Binding, names: &mut Vec<JsString>) {
    match binding {
        ast::Binding::Identifier(name) => names.push(name.clone()),
        ast::Binding::Pattern(pattern) => collect_pattern_names(pattern, names),
    }
}

fn collect_pattern_names(pattern: &ast::Pattern, names: &mut Vec<JsString>) {
    match pattern {
        ast::Pattern::Array { elements, rest } => {
            for element in elements {
                if let ast::ArrayPatternElement::Binding { binding, .. } = element {
                    collect_binding_names(binding, names);
                }
            }
            if let Some(rest) = rest {
                collect_binding_names(rest, names);
            }
        }
        ast::Pattern::Object { properties, rest } => {
            for property in properties {
                collect_binding_names(&property.binding, names);
            }
            if let Some(rest) = rest {
                names.push(rest.clone());
            }
        }
    }
}

/// Collects `var`-scoped names (including function declaration names),
/// descending through blocks and control flow but not into nested
/// functions.
pub(crate) fn collect_var_names(statements: &[ast::Statement]) -> Vec<JsString> {
    let mut names = Vec::new();
    for statement in statements {
        collect_var_names_statement(&statement.kind, &mut names);
    }
    let mut deduped = Vec::new();
    for name in names {
        if !deduped.contains(&name) {
            deduped.push(name);
        }
    }
    deduped
}

fn collect_var_names_statement(kind: &ast::StatementKind, names: &mut Vec<JsString>) {
    use ast::StatementKind as S;
    match kind {
        S::Var(declarators) => {
            for declarator in declarators {
                collect_binding_names(&declarator.binding, names);
            }
        }
        S::Function(node) => {
            if let Some(name) = &node.name {
                names.push(name.clone());
            }
        }
        S::Block(statements) => {
            for statement in statements {
                // Function declarations in blocks are block scoped.
                if !matches!(statement.kind, S::Function(_)) {
                    collect_var_names_statement(&statement.kind, names);
                }
            }
        }
        S::If {
            then, otherwise, ..
        } => {
            collect_var_names_statement(&then.kind, names);
            if let Some(otherwise) = otherwise {
                collect_var_names_statement(&otherwise.kind, names);
            }
        }
        S::While { body, .. } | S::DoWhile { body, .. } | S::With { body, .. } => {
            collect_var_names_statement(&body.kind, names);
        }
        S::For { init, body, .. } => {
            if let Some(ast::ForInit::Var(declarators)) = init {
                for declarator in declarators {
                    collect_binding_names(&declarator.binding, names);
                }
            }
            collect_var_names_statement(&body.kind, names);
        }
        S::ForIn { binding, body, .. } | S::ForOf { binding, body, .. } => {
            if let ast::ForBinding::Var(binding) = binding {
                collect_binding_names(binding, names);
            }
            collect_var_names_statement(&body.kind, names);
        }
        S::Try {
            block,
            catch,
            finally,
        } => {
            for statement in block {
                collect_var_names_statement(&statement.kind, names);
            }
            if let Some(catch) = catch {
                for statement in &catch.block {
                    collect_var_names_statement(&statement.kind, names);
                }
            }
            if let Some(finally) = finally {
                for statement in finally {
                    collect_var_names_statement(&statement.kind, names);
                }
            }
        }
        _ => {}
    }
}

/// Collects the lexical declarations of one scope level: `let`, `const`,
/// `class` and (inside blocks) function declarations.
pub(crate) fn collect_lexical_scope(
    statements: &[ast::Statement],
    strict: bool,
) -> Vec<BindingEntry> {
    let mut entries = Vec::new();
    for statement in statements {
        match &statement.kind {
            ast::StatementKind::Let(declarators) => {
                for declarator in declarators {
                    for name in binding_names(&declarator.binding) {
                        entries.push(BindingEntry {
                            name,
                            mutable: true,
                            strict,
                        });
                    }
                }
            }
            ast::StatementKind::Const(declarators) => {
                for declarator in declarators {
                    for name in binding_names(&declarator.binding) {
                        entries.push(BindingEntry {
                            name,
                            mutable: false,
                            strict,
                        });
                    }
                }
            }
            ast::StatementKind::Class(node) => {
                if let Some(name) = &node.name {
                    entries.push(BindingEntry {
                        name: name.clone(),
                        mutable: true,
                        strict,
                    });
                }
            }
            _ => {}
        }
    }
    entries
}

/// Builds the function-level scope shape: parameters first (their slot
/// order is what mapped arguments objects rely on), then `arguments`, then
/// `var`s and hoisted functions.
fn function_scope_shape(node: &ast::FunctionNode, strict: bool) -> ScopeShape {
    let mut entries: Vec<BindingEntry> = Vec::new();
    let mut push = |name: JsString, entries: &mut Vec<BindingEntry>| {
        if !entries.iter().any(|e| e.name == name) {
            entries.push(BindingEntry {
                name,
                mutable: true,
                strict,
            });
        }
    };

    for parameter in &node.parameters {
        for name in binding_names(&parameter.binding) {
            push(name, &mut entries);
        }
    }
    if node.flavor != ast::FunctionFlavor::Arrow {
        push(JsString::from("arguments"), &mut entries);
    }
    for name in collect_var_names(&node.body) {
        push(name, &mut entries);
    }
    // Body-level lexical declarations live in the function scope too; their
    // slots stay uninitialized (dead) until the declaration runs.
    for entry in collect_lexical_scope(&node.body, strict) {
        if !entries.iter().any(|e| e.name == entry.name) {
            entries.push(entry);
        }
    }
    ScopeShape::new(entries)
}
