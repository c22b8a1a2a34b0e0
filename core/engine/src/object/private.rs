//! Private names and private elements.
//!
//! A private name is a pure identity cell: two `#x` declarations in
//! different classes produce two distinct names even though their
//! descriptions collide. The elements installed under a name on an object
//! live in a table parallel to the ordinary property table and are invisible
//! to every meta-object operation.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

use kestrel_gc::{custom_trace, empty_trace, Finalize, Trace};

use crate::error::JsNativeError;
use crate::object::JsObject;
use crate::value::JsValue;
use crate::JsResult;

/// A private name: identity plus a diagnostic description.
#[derive(Debug, Clone)]
pub struct PrivateName {
    inner: Rc<str>,
}

impl PrivateName {
    /// Creates a fresh private name with the given description.
    pub fn new(description: &str) -> Self {
        Self {
            inner: Rc::from(description),
        }
    }

    /// The description of the name (`#x` spells the description `x`).
    pub fn description(&self) -> &str {
        &self.inner
    }
}

impl PartialEq for PrivateName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PrivateName {}

impl Hash for PrivateName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as *const u8 as usize).hash(state);
    }
}

impl Finalize for PrivateName {}

// SAFETY: a private name is pure identity with no cell edges.
unsafe impl Trace for PrivateName {
    empty_trace!();
}

/// A private element installed on an object.
#[derive(Debug, Clone)]
pub enum PrivateElement {
    /// A private field, created per instance.
    Field(JsValue),
    /// A private method; write-once, shared between instances.
    Method(JsObject),
    /// A private accessor pair.
    Accessor {
        /// The getter, if any.
        getter: Option<JsObject>,
        /// The setter, if any.
        setter: Option<JsObject>,
    },
}

impl Finalize for PrivateElement {}

// SAFETY: all contained objects and values are traced.
unsafe impl Trace for PrivateElement {
    custom_trace!(this, mark, {
        match this {
            PrivateElement::Field(value) => mark(value),
            PrivateElement::Method(method) => mark(method),
            PrivateElement::Accessor { getter, setter } => {
                if let Some(getter) = getter {
                    mark(getter);
                }
                if let Some(setter) = setter {
                    mark(setter);
                }
            }
        }
    });
}

impl JsObject {
    /// Finds the private element for `name`, if installed.
    pub(crate) fn private_element(&self, name: &PrivateName) -> Option<PrivateElement> {
        self.borrow()
            .private_elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, element)| element.clone())
    }

    /// `PrivateFieldAdd`/`PrivateMethodOrAccessorAdd`: installs an element,
    /// refusing duplicates.
    pub(crate) fn install_private_element(
        &self,
        name: PrivateName,
        element: PrivateElement,
    ) -> JsResult<()> {
        let mut object = self.borrow_mut();
        if let Some((_, existing)) = object
            .private_elements
            .iter_mut()
            .find(|(n, _)| *n == name)
        {
            // Accessor halves may merge; anything else is a duplicate.
            if let (
                PrivateElement::Accessor { getter, setter },
                PrivateElement::Accessor {
                    getter: new_getter,
                    setter: new_setter,
                },
            ) = (existing, &element)
            {
                if getter.is_none() && new_getter.is_some() {
                    *getter = new_getter.clone();
                    return Ok(());
                }
                if setter.is_none() && new_setter.is_some() {
                    *setter = new_setter.clone();
                    return Ok(());
                }
            }
            return Err(JsNativeError::typ()
                .with_message(format!(
                    "cannot install private element #{} twice",
                    name.description()
                ))
                .into());
        }
        object.private_elements.push((name, element));
        Ok(())
    }

    /// `PrivateGet ( O, P )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-privateget
    pub(crate) fn private_get(
        &self,
        name: &PrivateName,
        context: &mut crate::Context,
    ) -> JsResult<JsValue> {
        match self.private_element(name) {
            Some(PrivateElement::Field(value)) => Ok(value),
            Some(PrivateElement::Method(method)) => Ok(method.into()),
            Some(PrivateElement::Accessor {
                getter: Some(getter),
                ..
            }) => getter.call(&self.clone().into(), &[], context),
            Some(PrivateElement::Accessor { getter: None, .. }) => Err(JsNativeError::typ()
                .with_message(format!("#{} has no getter", name.description()))
                .into()),
            None => Err(JsNativeError::typ()
                .with_message(format!(
                    "cannot read private member #{} from an object whose class did not declare it",
                    name.description()
                ))
                .into()),
        }
    }

    /// `PrivateSet ( O, P, value )`
    ///
    /// More information:
    ///  - [ECMAScript reference][spec]
    ///
    /// [spec]: https://tc39.es/ecma262/#sec-privateset
    pub(crate) fn private_set(
        &self,
        name: &PrivateName,
        value: JsValue,
        context: &mut crate::Context,
    ) -> JsResult<()> {
        match self.private_element(name) {
            Some(PrivateElement::Field(_)) => {
                let mut object = self.borrow_mut();
                if let Some((_, element)) = object
                    .private_elements
                    .iter_mut()
                    .find(|(n, _)| n == name)
                {
                    *element = PrivateElement::Field(value);
                }
                Ok(())
            }
            Some(PrivateElement::Method(_)) => Err(JsNativeError::typ()
                .with_message(format!("cannot assign to private method #{}", name.description()))
                .into()),
            Some(PrivateElement::Accessor {
                setter: Some(setter),
                ..
            }) => {
                setter.call(&self.clone().into(), &[value], context)?;
                Ok(())
            }
            Some(PrivateElement::Accessor { setter: None, .. }) => Err(JsNativeError::typ()
                .with_message(format!("#{} has no setter", name.description()))
                .into()),
            None => Err(JsNativeError::typ()
                .with_message(format!(
                    "cannot write private member #{} to an object whose class did not declare it",
                    name.description()
                ))
                .into()),
        }
    }

    /// The `#x in o` brand check.
    pub(crate) fn has_private_element(&self, name: &PrivateName) -> bool {
        self.private_element(name).is_some()
    }
}
