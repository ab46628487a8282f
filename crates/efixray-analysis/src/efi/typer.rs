//! The single mutation point of the retyping pass.

use crate::decompiler::{DecompiledFunction, LocalVariable};
use crate::error::{Error, Result};
use efixray_types::CType;

/// Persisted per-function variable metadata.
pub trait VariableStore {
    /// Records `ty` as the declared type of `variable` in `function`.
    ///
    /// Returns false if the store rejects the change.
    fn set_type(&mut self, function: u64, variable: &LocalVariable, ty: &CType) -> bool;
}

/// Applies variable types through a [`VariableStore`].
pub struct VariableTyper<'s> {
    store: &'s mut dyn VariableStore,
}

impl<'s> VariableTyper<'s> {
    pub fn new(store: &'s mut dyn VariableStore) -> Self {
        Self { store }
    }

    /// Sets the type of `variable` in `function`.
    pub fn set_variable_type(
        &mut self,
        function: u64,
        variable: &LocalVariable,
        ty: &CType,
    ) -> Result<()> {
        if self.store.set_type(function, variable, ty) {
            tracing::info!(function = function, variable = %variable.name, ty = %ty, "variable retyped");
            Ok(())
        } else {
            Err(Error::Retype {
                function,
                variable: variable.name.clone(),
            })
        }
    }

    /// Sets the type of the local named `name` in `function`.
    ///
    /// Fails with [`Error::Retype`] if the function has no such local.
    pub fn set_local_type(
        &mut self,
        function: &DecompiledFunction,
        name: &str,
        ty: &CType,
    ) -> Result<()> {
        let variable = function.local(name).ok_or_else(|| Error::Retype {
            function: function.address,
            variable: name.to_string(),
        })?;
        self.set_variable_type(function.address, variable, ty)
    }
}
