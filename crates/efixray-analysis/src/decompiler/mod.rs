//! Decompiled function model.
//!
//! The decompiler itself belongs to the host. This module holds what the
//! host hands back: a structured body of expressions, the function's local
//! variables with their declared types, and the data sections constant
//! references point into.

pub mod expression;
pub mod structurer;

pub use expression::{BinOpKind, CallTarget, Expr, ExprKind, UnaryOpKind, VarKind, Variable};
pub use structurer::{walk_exprs, BlockId, StructuredNode};

use crate::error::{Error, Result};
use efixray_types::CType;
use std::collections::BTreeMap;
use uguid::Guid;

/// A local variable (or global referenced by the function) with its
/// declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub kind: VarKind,
    /// Storage size in bytes.
    pub size: usize,
    pub ty: CType,
}

impl LocalVariable {
    pub fn new(name: impl Into<String>, kind: VarKind, size: usize, ty: CType) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            ty,
        }
    }

    /// Creates a stack variable named like `Variable::stack` would name it.
    pub fn stack(offset: i64, ty: CType, size: usize) -> Self {
        let var = Variable::stack(offset, size.min(u8::MAX as usize) as u8);
        Self::new(var.name, var.kind, size, ty)
    }
}

/// A decompiled function.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompiledFunction {
    /// Entry address.
    pub address: u64,
    pub name: String,
    pub locals: Vec<LocalVariable>,
    pub body: Vec<StructuredNode>,
}

impl DecompiledFunction {
    pub fn new(address: u64, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            locals: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_local(mut self, local: LocalVariable) -> Self {
        self.locals.push(local);
        self
    }

    pub fn with_body(mut self, body: Vec<StructuredNode>) -> Self {
        self.body = body;
        self
    }

    /// Looks up a local by name.
    pub fn local(&self, name: &str) -> Option<&LocalVariable> {
        self.locals.iter().find(|l| l.name == name)
    }

    /// Looks up the local an expression variable refers to.
    ///
    /// Names are matched first; storage is the fallback so renamed
    /// variables still resolve.
    pub fn local_for(&self, var: &Variable) -> Option<&LocalVariable> {
        self.local(&var.name)
            .or_else(|| self.locals.iter().find(|l| l.kind == var.kind))
    }

    /// Visits every expression of the body in pre-order.
    pub fn walk_exprs<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        walk_exprs(&self.body, visit);
    }
}

/// Source of decompiled functions.
pub trait FunctionSource {
    /// Entry address of the function containing `address`.
    fn function_containing(&self, address: u64) -> Option<u64>;

    /// Decompiles the function starting at `function`.
    fn decompile(&self, function: u64) -> Result<DecompiledFunction>;

    /// Data sections for resolving constant references.
    fn data(&self) -> &BinaryDataContext;
}

/// Data sections of the binary, used to read constant values such as
/// GUID literals.
#[derive(Debug, Clone, Default)]
pub struct BinaryDataContext {
    /// Pairs of (base_address, data) for each data section.
    sections: Vec<(u64, Vec<u8>)>,
}

impl BinaryDataContext {
    /// Creates a new empty binary data context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a data section.
    pub fn add_section(&mut self, base: u64, data: Vec<u8>) {
        self.sections.push((base, data));
    }

    /// Returns the section containing the given address.
    pub fn section_containing(&self, addr: u64) -> Option<(&[u8], u64)> {
        self.sections
            .iter()
            .find(|(base, data)| addr >= *base && addr - *base < data.len() as u64)
            .map(|(base, data)| (data.as_slice(), *base))
    }

    /// Reads `len` bytes at `addr`, if they lie within one section.
    pub fn read_bytes(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let (data, base) = self.section_containing(addr)?;
        let start = usize::try_from(addr - base).ok()?;
        data.get(start..start.checked_add(len)?)
    }

    /// Reads the 16-byte GUID stored at `addr` (little-endian fields).
    pub fn read_guid(&self, addr: u64) -> Option<Guid> {
        let bytes: [u8; 16] = self.read_bytes(addr, 16)?.try_into().ok()?;
        Some(Guid::from_bytes(bytes))
    }

    /// Returns true if the context contains no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Outcome the host reported for one function.
#[derive(Debug, Clone)]
enum Decompilation {
    Ok(DecompiledFunction),
    Failed(String),
}

#[derive(Debug, Clone)]
struct ProgramFunction {
    end: u64,
    decompilation: Decompilation,
}

/// An in-memory program: function ranges, their decompiled bodies and
/// the binary's data sections.
#[derive(Debug, Clone, Default)]
pub struct DecompiledProgram {
    functions: BTreeMap<u64, ProgramFunction>,
    data: BinaryDataContext,
}

impl DecompiledProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function covering `[function.address, end)`.
    pub fn add_function(&mut self, function: DecompiledFunction, end: u64) {
        self.functions.insert(
            function.address,
            ProgramFunction {
                end,
                decompilation: Decompilation::Ok(function),
            },
        );
    }

    /// Adds a function the host failed to decompile.
    pub fn add_failed_function(&mut self, start: u64, end: u64, reason: impl Into<String>) {
        self.functions.insert(
            start,
            ProgramFunction {
                end,
                decompilation: Decompilation::Failed(reason.into()),
            },
        );
    }

    /// Stores a GUID at `addr` in its own data section.
    pub fn add_guid(&mut self, addr: u64, guid: Guid) {
        self.data.add_section(addr, guid.to_bytes().to_vec());
    }

    pub fn data_mut(&mut self) -> &mut BinaryDataContext {
        &mut self.data
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

impl FunctionSource for DecompiledProgram {
    fn function_containing(&self, address: u64) -> Option<u64> {
        self.functions
            .range(..=address)
            .next_back()
            .filter(|(_, f)| address < f.end)
            .map(|(start, _)| *start)
    }

    fn decompile(&self, function: u64) -> Result<DecompiledFunction> {
        let entry = self
            .functions
            .get(&function)
            .ok_or(Error::FunctionNotFound(function))?;
        match &entry.decompilation {
            Decompilation::Ok(f) => Ok(f.clone()),
            Decompilation::Failed(reason) => Err(Error::DecompilationFailed {
                function,
                reason: reason.clone(),
            }),
        }
    }

    fn data(&self) -> &BinaryDataContext {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    #[test]
    fn test_read_guid_little_endian() {
        let g = guid!("5b1b31a1-9562-11d2-8e3f-00a0c969723b");
        let mut ctx = BinaryDataContext::new();
        let mut section = vec![0u8; 8];
        section.extend_from_slice(&g.to_bytes());
        ctx.add_section(0x4000, section);

        assert_eq!(ctx.read_guid(0x4008), Some(g));
        assert_eq!(ctx.read_bytes(0x4008, 4), Some(&[0xa1, 0x31, 0x1b, 0x5b][..]));
        // Straddles the end of the section
        assert_eq!(ctx.read_guid(0x4010), None);
        assert_eq!(ctx.read_guid(0x9000), None);
    }

    #[test]
    fn test_function_containing() {
        let mut program = DecompiledProgram::new();
        program.add_function(DecompiledFunction::new(0x1000, "a"), 0x1100);
        program.add_failed_function(0x2000, 0x2100, "bad stack frame");

        assert_eq!(program.function_containing(0x1000), Some(0x1000));
        assert_eq!(program.function_containing(0x10ff), Some(0x1000));
        assert_eq!(program.function_containing(0x1100), None);
        assert_eq!(program.function_containing(0x0fff), None);
        assert_eq!(program.function_containing(0x2050), Some(0x2000));
    }

    #[test]
    fn test_decompile_outcomes() {
        let mut program = DecompiledProgram::new();
        program.add_function(DecompiledFunction::new(0x1000, "a"), 0x1100);
        program.add_failed_function(0x2000, 0x2100, "bad stack frame");

        assert_eq!(program.decompile(0x1000).map(|f| f.name), Ok("a".to_string()));
        assert!(matches!(
            program.decompile(0x2000),
            Err(Error::DecompilationFailed { function: 0x2000, .. })
        ));
        assert_eq!(program.decompile(0x3000), Err(Error::FunctionNotFound(0x3000)));
    }

    #[test]
    fn test_local_lookup() {
        let func = DecompiledFunction::new(0x1000, "a")
            .with_local(LocalVariable::stack(-0x18, CType::ptr(CType::void()), 8));

        assert!(func.local("var_18").is_some());
        let renamed = Variable::stack(-0x18, 8).named("Interface");
        assert_eq!(func.local_for(&renamed).map(|l| l.name.as_str()), Some("var_18"));
        assert!(func.local_for(&Variable::stack(-0x20, 8)).is_none());
    }
}
