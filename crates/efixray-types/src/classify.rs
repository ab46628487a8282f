//! Scalar and plain-old-data array classification.
//!
//! Two independent rules decide whether a type is "primitive-like":
//!
//! - [`ScalarRule::RealType`] resolves typedefs and named references through
//!   the database and accepts integers, floats, enums and void.
//! - [`ScalarRule::DeclOrder`] looks only at the type as declared, following
//!   inline typedef chains but never the database, and accepts integers,
//!   floats and void.
//!
//! The rules disagree on synthesized types: a named `UINTN` is scalar by its
//! real type but not by declaration, and an unregistered name fails both.
//! Callers take the two as alternatives through [`ScalarClass::any_of`].

use crate::database::TypeDatabase;
use crate::types::CType;

/// Which classification rule accepted a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarRule {
    RealType,
    DeclOrder,
}

/// Outcome of a scalar classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarClass {
    Scalar(ScalarRule),
    NotScalar,
}

impl ScalarClass {
    pub fn is_scalar(self) -> bool {
        matches!(self, ScalarClass::Scalar(_))
    }

    /// The first scalar outcome, or `NotScalar` when no rule accepted.
    pub fn any_of(outcomes: impl IntoIterator<Item = ScalarClass>) -> ScalarClass {
        outcomes
            .into_iter()
            .find(|c| c.is_scalar())
            .unwrap_or(ScalarClass::NotScalar)
    }
}

impl TypeDatabase {
    /// Classify by the resolved ("real") type.
    pub fn classify_real_type(&self, ty: &CType) -> ScalarClass {
        match self.resolve(ty) {
            Some(CType::Int(_) | CType::Float(_) | CType::Enum(_) | CType::Void) => {
                ScalarClass::Scalar(ScalarRule::RealType)
            }
            _ => ScalarClass::NotScalar,
        }
    }

    /// Classify by the declared type, without consulting the database.
    pub fn classify_decl_order(&self, ty: &CType) -> ScalarClass {
        let mut current = ty;
        loop {
            match current {
                CType::Int(_) | CType::Float(_) | CType::Void => {
                    return ScalarClass::Scalar(ScalarRule::DeclOrder)
                }
                CType::Typedef(t) => current = &t.target,
                _ => return ScalarClass::NotScalar,
            }
        }
    }

    /// Classify with both rules; either one is sufficient.
    pub fn classify_scalar(&self, ty: &CType) -> ScalarClass {
        ScalarClass::any_of([self.classify_real_type(ty), self.classify_decl_order(ty)])
    }

    /// Whether `ty` is an array of primitive-like elements, allowing up to
    /// `max_pointer_depth` levels of pointer indirection on the element.
    ///
    /// The element is checked `max_pointer_depth + 1` times, stripping one
    /// pointer between checks, so depth 0 checks the bare element once.
    /// `int*[10]` passes at depth 1 and `int**[10]` at depth 2.
    pub fn is_pod_array(&self, ty: &CType, max_pointer_depth: u32) -> bool {
        let Some(CType::Array(array)) = self.resolve(ty) else {
            return false;
        };

        let mut element: &CType = &array.element;
        for remaining in (0..=max_pointer_depth).rev() {
            if self.classify_scalar(element).is_scalar() {
                return true;
            }
            if remaining == 0 {
                break;
            }
            match self.resolve(element) {
                Some(CType::Pointer(inner)) => element = inner,
                _ => return false,
            }
        }
        false
    }
}
