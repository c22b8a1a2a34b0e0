//! Class lowering.

use super::ByteCompiler;
use crate::ast;
use crate::context::Context;
use crate::string::JsString;
use crate::vm::{class_element_flags, CodeBlockFlags, Opcode};
use crate::JsResult;

impl ByteCompiler {
    /// `ClassDefinitionEvaluation`: leaves the constructor in `dst`.
    pub(super) fn compile_class(
        &mut self,
        node: &ast::ClassNode,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        // Class bodies are strict code.
        let derived = node.super_class.is_some();

        // The private scope of the class body.
        let private_declarations = collect_private_names(node);
        let has_private_scope = !private_declarations.is_empty();
        if has_private_scope {
            let index = super::table_index(self.private_scopes.len())?;
            self.private_scopes.push(private_declarations);
            self.emit(Opcode::PushPrivateEnv);
            self.emit_u16(index);
            self.state_depth += 1;
        }

        // The constructor's code block, synthesized when absent.
        let mut ctor_flags = CodeBlockFlags::STRICT | CodeBlockFlags::CLASS_CONSTRUCTOR;
        if derived {
            ctor_flags |= CodeBlockFlags::DERIVED_CONSTRUCTOR;
        }
        let ctor_code = match &node.constructor {
            Some(ctor) => {
                let mut ctor = ctor.clone();
                ctor.name = node.name.clone();
                ctor.strict = true;
                super::compile_function(&ctor, ctor_flags, context)?
            }
            None => {
                let default = ast::FunctionNode {
                    name: node.name.clone(),
                    strict: true,
                    ..ast::FunctionNode::default()
                };
                super::compile_function(
                    &default,
                    ctor_flags | CodeBlockFlags::DEFAULT_CONSTRUCTOR,
                    context,
                )?
            }
        };
        let ctor_index = self.function(ctor_code)?;

        let proto = self.alloc_register()?;
        match &node.super_class {
            Some(super_class) => {
                let superclass = self.alloc_register()?;
                self.compile_expression(super_class, superclass, context)?;
                self.emit(Opcode::CreateDerivedClass);
                self.emit_u8(dst);
                self.emit_u8(proto);
                self.emit_u8(superclass);
                self.emit_u16(ctor_index);
                self.free_register(superclass);
            }
            None => {
                self.emit(Opcode::CreateClass);
                self.emit_u8(dst);
                self.emit_u8(proto);
                self.emit_u16(ctor_index);
            }
        }

        for element in &node.elements {
            self.compile_class_element(element, dst, proto, context)?;
        }

        self.free_register(proto);
        if has_private_scope {
            self.emit(Opcode::PopPrivateEnv);
            self.state_depth -= 1;
        }
        Ok(())
    }

    fn compile_class_element(
        &mut self,
        element: &ast::ClassElement,
        ctor: u8,
        proto: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        match element {
            ast::ClassElement::Method {
                name,
                kind,
                function,
                is_static,
            } => {
                let target = if *is_static { ctor } else { proto };
                let func = self.alloc_register()?;
                self.compile_class_function(function, method_name(name), func, context)?;
                let key = self.alloc_register()?;
                self.compile_property_name(name, key, context)?;
                let opcode = match kind {
                    ast::MethodKind::Method => Opcode::DefineClassMethod,
                    ast::MethodKind::Get => Opcode::DefineClassGetter,
                    ast::MethodKind::Set => Opcode::DefineClassSetter,
                };
                self.emit(opcode);
                self.emit_u8(target);
                self.emit_u8(func);
                self.emit_u8(key);
                self.free_register(key);
                self.free_register(func);
            }
            ast::ClassElement::PrivateMethod {
                name,
                kind,
                function,
                is_static,
            } => {
                let func = self.alloc_register()?;
                self.compile_class_function(function, Some(name.clone()), func, context)?;
                let home = if *is_static { ctor } else { proto };
                self.emit(Opcode::SetHomeObject);
                self.emit_u8(func);
                self.emit_u8(home);
                let mut flags = 0u8;
                if *is_static {
                    flags |= class_element_flags::STATIC;
                }
                match kind {
                    ast::MethodKind::Get => flags |= class_element_flags::GETTER,
                    ast::MethodKind::Set => flags |= class_element_flags::SETTER,
                    ast::MethodKind::Method => {}
                }
                let index = self.private_ref(name)?;
                self.emit(Opcode::ClassPrivateMethod);
                self.emit_u8(ctor);
                self.emit_u8(flags);
                self.emit_u8(func);
                self.emit_u16(index);
                self.free_register(func);
            }
            ast::ClassElement::Field {
                name,
                initializer,
                is_static,
            } => {
                let func = self.alloc_register()?;
                self.compile_field_initializer(initializer.as_ref(), func, context)?;
                if initializer.is_some() {
                    let home = if *is_static { ctor } else { proto };
                    self.emit(Opcode::SetHomeObject);
                    self.emit_u8(func);
                    self.emit_u8(home);
                }
                let key = self.alloc_register()?;
                self.compile_property_name(name, key, context)?;
                let flags = if *is_static {
                    class_element_flags::STATIC
                } else {
                    0
                };
                self.emit(Opcode::ClassField);
                self.emit_u8(ctor);
                self.emit_u8(flags);
                self.emit_u8(key);
                self.emit_u8(func);
                self.free_register(key);
                self.free_register(func);
            }
            ast::ClassElement::PrivateField {
                name,
                initializer,
                is_static,
            } => {
                let func = self.alloc_register()?;
                self.compile_field_initializer(initializer.as_ref(), func, context)?;
                if initializer.is_some() {
                    let home = if *is_static { ctor } else { proto };
                    self.emit(Opcode::SetHomeObject);
                    self.emit_u8(func);
                    self.emit_u8(home);
                }
                let flags = if *is_static {
                    class_element_flags::STATIC
                } else {
                    0
                };
                let index = self.private_ref(name)?;
                self.emit(Opcode::ClassPrivateField);
                self.emit_u8(ctor);
                self.emit_u8(flags);
                self.emit_u8(func);
                self.emit_u16(index);
                self.free_register(func);
            }
            ast::ClassElement::StaticBlock(statements) => {
                let block = ast::FunctionNode {
                    name: None,
                    parameters: Vec::new(),
                    body: statements.clone(),
                    flavor: ast::FunctionFlavor::Method,
                    is_async: false,
                    is_generator: false,
                    strict: true,
                };
                let func = self.alloc_register()?;
                self.compile_class_function(&block, None, func, context)?;
                self.emit(Opcode::SetHomeObject);
                self.emit_u8(func);
                self.emit_u8(ctor);
                self.emit(Opcode::ClassStaticBlock);
                self.emit_u8(ctor);
                self.emit_u8(func);
                self.free_register(func);
            }
        }
        Ok(())
    }

    /// Class member bodies are strict methods.
    fn compile_class_function(
        &mut self,
        node: &ast::FunctionNode,
        name: Option<JsString>,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        let mut node = node.clone();
        node.strict = true;
        if node.flavor == ast::FunctionFlavor::Ordinary {
            node.flavor = ast::FunctionFlavor::Method;
        }
        if node.name.is_none() {
            node.name = name;
        }
        self.compile_function_value(&node, CodeBlockFlags::METHOD, dst, context)
    }

    /// An initializer thunk: `function () { return <initializer>; }`,
    /// evaluated with `this` bound to the instance (or the constructor for
    /// static members).
    fn compile_field_initializer(
        &mut self,
        initializer: Option<&ast::Expression>,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        match initializer {
            None => {
                self.emit(Opcode::LoadUndefined);
                self.emit_u8(dst);
                Ok(())
            }
            Some(initializer) => {
                let thunk = ast::FunctionNode {
                    name: None,
                    parameters: Vec::new(),
                    body: vec![ast::StatementKind::Return(Some(initializer.clone())).into()],
                    flavor: ast::FunctionFlavor::Method,
                    is_async: false,
                    is_generator: false,
                    strict: true,
                };
                self.compile_function_value(&thunk, CodeBlockFlags::METHOD, dst, context)
            }
        }
    }

    fn compile_property_name(
        &mut self,
        name: &ast::PropertyName,
        dst: u8,
        context: &mut Context,
    ) -> JsResult<()> {
        match name {
            ast::PropertyName::Literal(name) => {
                let index = self.literal(crate::value::JsValue::from(name.clone()))?;
                self.emit(Opcode::LoadConstant);
                self.emit_u8(dst);
                self.emit_u16(index);
                Ok(())
            }
            ast::PropertyName::Computed(expression) => {
                self.compile_expression(expression, dst, context)
            }
        }
    }
}

fn method_name(name: &ast::PropertyName) -> Option<JsString> {
    match name {
        ast::PropertyName::Literal(name) => Some(name.clone()),
        ast::PropertyName::Computed(_) => None,
    }
}

/// The `#names` a class body declares.
fn collect_private_names(node: &ast::ClassNode) -> Vec<JsString> {
    let mut names: Vec<JsString> = Vec::new();
    for element in &node.elements {
        let name = match element {
            ast::ClassElement::PrivateMethod { name, .. }
            | ast::ClassElement::PrivateField { name, .. } => Some(name),
            _ => None,
        };
        if let Some(name) = name {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}
