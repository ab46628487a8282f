//! GUID-driven retyping of protocol interface variables.
//!
//! A [`GuidRetyper`] walks one decompiled function looking for indirect
//! calls through a firmware service table. For each call whose table
//! offset matches a catalog entry it reads the GUID argument, finds the
//! protocol, and retypes the variable receiving the interface pointer to
//! a pointer to the protocol's interface structure.
//!
//! Sites that cannot be resolved are reported and skipped; the walk always
//! continues with the next call.

use super::config::RetypeConfig;
use super::protocols::{interface_type_for, ProtocolRegistry, ProtocolUsageRecord};
use super::report::{RetypeReport, SiteOutcome, SiteReport};
use super::services::{CallDescriptor, ServiceTable};
use super::typer::{VariableStore, VariableTyper};
use crate::decompiler::{
    BinOpKind, BinaryDataContext, CallTarget, DecompiledFunction, Expr, ExprKind,
};
use crate::error::{Error, Result};
use efixray_types::{CType, TypeDatabase};
use std::sync::Arc;

/// Read-only state shared by every traversal.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub types: &'a TypeDatabase,
    pub protocols: &'a ProtocolRegistry,
    pub data: &'a BinaryDataContext,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        types: &'a TypeDatabase,
        protocols: &'a ProtocolRegistry,
        data: &'a BinaryDataContext,
    ) -> Self {
        Self {
            types,
            protocols,
            data,
        }
    }
}

/// How the interface argument of a matched call names its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationShape {
    /// `&v` where `v` holds a pointer or a pointer-sized scalar.
    PointerSlot { variable: String },
    /// `v` or `&v` where `v` is a stack array of primitive-like elements.
    PodArray {
        variable: String,
        count: Option<usize>,
    },
    /// `(T **)&v`, with the same storage rule as `PointerSlot`.
    PointerToPointer { variable: String },
    /// Anything else, including the address of an aggregate; left untouched.
    Unsupported { expr: String },
}

impl DestinationShape {
    /// Classifies the interface argument of a call.
    ///
    /// `depth` is the descriptor's pointer depth, used to decide whether an
    /// array local holds primitive-like elements.
    pub fn classify(
        arg: &Expr,
        function: &DecompiledFunction,
        types: &TypeDatabase,
        depth: u32,
    ) -> Self {
        let unsupported = || DestinationShape::Unsupported {
            expr: arg.to_string(),
        };

        let (cast, target) = match &arg.kind {
            ExprKind::Cast { expr, .. } => (true, expr.strip_casts()),
            _ => (false, arg),
        };

        let (var, address_taken) = match &target.kind {
            ExprKind::AddressOf(inner) => match &inner.strip_casts().kind {
                ExprKind::Var(var) => (var, true),
                _ => return unsupported(),
            },
            ExprKind::Var(var) => (var, false),
            _ => return unsupported(),
        };
        let Some(local) = function.local_for(var) else {
            return unsupported();
        };

        if types.is_pod_array(&local.ty, depth) {
            let count = types
                .resolve(&local.ty)
                .and_then(CType::array_parts)
                .and_then(|(_, count)| count);
            return DestinationShape::PodArray {
                variable: local.name.clone(),
                count,
            };
        }

        if !address_taken || !holds_pointer(&local.ty, types) {
            return unsupported();
        }
        match cast {
            true => DestinationShape::PointerToPointer {
                variable: local.name.clone(),
            },
            false => DestinationShape::PointerSlot {
                variable: local.name.clone(),
            },
        }
    }

    /// The variable to retype and its new type, given the interface
    /// structure name.
    pub fn retyped(
        &self,
        types: &TypeDatabase,
        interface: &str,
        depth: u32,
    ) -> Option<(&str, CType)> {
        let iface = CType::named(interface);
        match self {
            DestinationShape::PointerSlot { variable }
            | DestinationShape::PointerToPointer { variable } => {
                Some((variable, types.pointer_to(&iface)))
            }
            DestinationShape::PodArray { variable, count } => {
                let element = (0..depth).fold(iface, |ty, _| types.pointer_to(&ty));
                Some((variable, types.array_of(&element, *count)))
            }
            DestinationShape::Unsupported { .. } => None,
        }
    }
}

/// Whether a variable of type `ty` is storage for one pointer.
///
/// Structs, unions, arrays and unresolvable names are not.
fn holds_pointer(ty: &CType, types: &TypeDatabase) -> bool {
    match types.resolve(ty) {
        Some(CType::Pointer(_)) => true,
        Some(resolved) => {
            types.classify_scalar(ty).is_scalar()
                && types.size_of(resolved) == Some(types.arch().pointer_size)
        }
        None => false,
    }
}

/// A protocol resolved at one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedProtocol {
    name: String,
    interface_type: String,
}

/// Splits an indirect call target into the table base expression and the
/// byte offset of the loaded function pointer.
///
/// Recognizes `base->Field` and `*(base + offset)`. A base that is itself a
/// constant address is not a table pointer.
fn table_slot(target: &Expr) -> Option<(&Expr, u64)> {
    match &target.strip_casts().kind {
        ExprKind::FieldAccess { base, offset, .. } => Some((base, *offset as u64)),
        ExprKind::Deref { addr, .. } => {
            let addr = addr.strip_casts();
            let (base, offset) = match &addr.kind {
                ExprKind::BinOp {
                    op: BinOpKind::Add,
                    left,
                    right,
                } => {
                    let (left, right) = (left.strip_casts(), right.strip_casts());
                    match (&left.kind, &right.kind) {
                        (_, ExprKind::IntLit(off)) => (left, *off),
                        (ExprKind::IntLit(off), _) => (right, *off),
                        _ => return None,
                    }
                }
                _ => (addr, 0),
            };
            if base.constant_address().is_some() {
                return None;
            }
            Some((base, u64::try_from(offset).ok()?))
        }
        _ => None,
    }
}

/// Retypes interface variables for the calls of one service table.
#[derive(Debug, Clone)]
pub struct GuidRetyper {
    table: Arc<ServiceTable>,
    protocols: Arc<[ProtocolUsageRecord]>,
    code_ea: u64,
    func_ea: u64,
}

impl GuidRetyper {
    pub fn new(table: Arc<ServiceTable>) -> Self {
        Self {
            table,
            protocols: Vec::new().into(),
            code_ea: 0,
            func_ea: 0,
        }
    }

    pub fn table(&self) -> &ServiceTable {
        &self.table
    }

    /// Usage records consulted when resolving GUIDs.
    pub fn set_protocols(&mut self, records: Arc<[ProtocolUsageRecord]>) {
        self.protocols = records;
    }

    /// Address of the usage record being processed. Used as the site of
    /// calls whose own address is unknown.
    pub fn set_code_ea(&mut self, ea: u64) {
        self.code_ea = ea;
    }

    /// Entry of the function being processed.
    pub fn set_func_ea(&mut self, ea: u64) {
        self.func_ea = ea;
    }

    /// Walks `function` and retypes the destination of every matched call.
    pub fn apply(
        &self,
        function: &DecompiledFunction,
        ctx: &AnalysisContext<'_>,
        store: &mut dyn VariableStore,
        config: &RetypeConfig,
    ) -> RetypeReport {
        let _span = tracing::debug_span!(
            "guid_retype",
            table = %self.table.name,
            func_ea = self.func_ea,
            code_ea = self.code_ea,
        )
        .entered();

        let mut report = RetypeReport::new();
        report.stats.traversals += 1;

        let mut calls: Vec<&Expr> = Vec::new();
        function.walk_exprs(&mut |expr| {
            if matches!(expr.kind, ExprKind::Call { .. }) {
                calls.push(expr);
            }
        });

        let mut typer = VariableTyper::new(store);
        for call in calls {
            self.visit_call(call, function, ctx, &mut typer, config, &mut report);
        }
        report
    }

    fn visit_call(
        &self,
        call: &Expr,
        function: &DecompiledFunction,
        ctx: &AnalysisContext<'_>,
        typer: &mut VariableTyper<'_>,
        config: &RetypeConfig,
        report: &mut RetypeReport,
    ) {
        let ExprKind::Call {
            target: CallTarget::Indirect(target),
            args,
            address,
        } = &call.kind
        else {
            return;
        };
        let Some((base, offset)) = table_slot(target) else {
            return;
        };
        let Some(desc) = u32::try_from(offset)
            .ok()
            .and_then(|offset| self.table.find_by_offset(offset))
        else {
            return;
        };
        if !self.base_matches_table(base, function, ctx.types) {
            tracing::debug!(service = desc.name, base = %base, "call base is a different table");
            return;
        }

        let site = address.unwrap_or(self.code_ea);
        report.stats.matched_calls += 1;

        if args.len() != desc.arg_count as usize {
            tracing::debug!(
                site = site,
                service = desc.name,
                expected = desc.arg_count,
                found = args.len(),
                "argument count mismatch"
            );
            report.stats.arg_count_mismatches += 1;
            return;
        }

        let (protocol, outcome) = match self.resolve_protocol(desc, site, args, ctx, config) {
            Ok(protocol) => {
                let outcome = self
                    .retype_destination(desc, site, args, &protocol, function, ctx, typer, config)
                    .unwrap_or_else(SiteOutcome::Failed);
                (Some(protocol.name), outcome)
            }
            Err(err) => (None, SiteOutcome::Failed(err)),
        };

        if let SiteOutcome::Failed(err) = &outcome {
            tracing::warn!(site = site, service = desc.name, error = %err, "site skipped");
        }
        report.push(SiteReport {
            function: function.address,
            site,
            service: desc.name,
            protocol,
            outcome,
        });
    }

    /// Whether the table pointer the call loads from can be this table.
    ///
    /// Only a base whose declared type is a pointer to a different
    /// structure rules the call out.
    fn base_matches_table(
        &self,
        base: &Expr,
        function: &DecompiledFunction,
        types: &TypeDatabase,
    ) -> bool {
        let declared = match &base.kind {
            ExprKind::Cast { to, .. } => Some(to),
            _ => match &base.strip_casts().kind {
                ExprKind::Var(var) => function.local_for(var).map(|l| &l.ty),
                _ => None,
            },
        };
        let Some(CType::Pointer(pointee)) = declared.and_then(|ty| types.resolve(ty)) else {
            return true;
        };
        match types.resolve(pointee) {
            Some(CType::Struct(st)) => {
                st.name.as_deref() == Some(self.table.name.as_str())
                    || pointee.type_name() == Some(self.table.name.as_str())
            }
            _ => true,
        }
    }

    fn resolve_protocol(
        &self,
        desc: &CallDescriptor,
        site: u64,
        args: &[Expr],
        ctx: &AnalysisContext<'_>,
        config: &RetypeConfig,
    ) -> Result<ResolvedProtocol> {
        let guid_arg = &args[desc.guid_arg_index as usize];
        let guid = guid_arg
            .clone()
            .simplify()
            .constant_address()
            .and_then(|addr| ctx.data.read_guid(addr))
            .ok_or_else(|| Error::UnresolvedGuid {
                site,
                expr: guid_arg.to_string(),
            })?;

        let at_site = |r: &&ProtocolUsageRecord| r.code_address == site && r.matches_guid(&guid);
        if config.require_usage_site && !self.protocols.iter().any(|r| at_site(&r)) {
            return Err(Error::UnknownProtocol { site, guid });
        }

        // The registry entry for the literal wins; a record name only
        // stands in for GUIDs the registry lacks, and only when the record
        // carries that same GUID.
        let (name, interface_type) = match ctx.protocols.lookup(&guid) {
            Some(entry) => (
                entry.protocol_name.clone(),
                entry.interface_type_name.clone(),
            ),
            None => {
                let name = self
                    .protocols
                    .iter()
                    .filter(at_site)
                    .find(|r| r.guid == Some(guid))
                    .and_then(|r| r.protocol_name.clone())
                    .ok_or(Error::UnknownProtocol { site, guid })?;
                let interface_type = interface_type_for(&name).to_string();
                (name, interface_type)
            }
        };
        if !ctx.types.has_type(&interface_type) {
            return Err(Error::UnknownInterfaceType {
                protocol: name,
                type_name: interface_type,
            });
        }

        tracing::debug!(site = site, guid = %guid, protocol = %name, "protocol resolved");
        Ok(ResolvedProtocol {
            name,
            interface_type,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn retype_destination(
        &self,
        desc: &CallDescriptor,
        site: u64,
        args: &[Expr],
        protocol: &ResolvedProtocol,
        function: &DecompiledFunction,
        ctx: &AnalysisContext<'_>,
        typer: &mut VariableTyper<'_>,
        config: &RetypeConfig,
    ) -> Result<SiteOutcome> {
        let arg = &args[desc.interface_arg_index as usize];
        let shape = DestinationShape::classify(arg, function, ctx.types, desc.dest_pointer_depth);
        let (variable, ty) = shape
            .retyped(ctx.types, &protocol.interface_type, desc.dest_pointer_depth)
            .ok_or_else(|| Error::UnsupportedDestinationShape {
                site,
                expr: arg.to_string(),
            })?;

        if config.dry_run {
            return Ok(SiteOutcome::Planned {
                variable: variable.to_string(),
                ty,
            });
        }

        typer.set_local_type(function, variable, &ty)?;
        Ok(SiteOutcome::Retyped {
            variable: variable.to_string(),
            ty,
        })
    }
}
