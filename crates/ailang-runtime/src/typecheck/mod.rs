//! Hindley–Milner type and effect checking over Core
//!
//! Algorithm-W style inference with a substitution and fresh-variable
//! supply. Class constraints are collected per use site, solved against
//! the instance table after each binding group, defaulted when
//! ambiguous, and recorded as resolved constraints keyed by `NodeId` for
//! the OpLowering pass. Effect rows are inferred as the union of the
//! rows of every operation a body invokes; a declared row is an upper
//! bound. Interface synthesis preserves effect rows verbatim.

pub mod instances;
pub mod oplower;
pub mod unify;

use crate::core::{CoreExpr, CoreKind, CorePattern, CoreProgram, IntrinsicOp, Lit, NodeId};
use crate::diagnostic::{Diagnostic, Phase};
use crate::elaborate::{CtorDef, ElaboratedModule, FuncSig};
use crate::iface::{Iface, IfaceCtor, IfaceExport, IfaceRef, IFACE_SCHEMA};
use crate::link::builtins;
use crate::types::{Constraint, EffectRow, RecordRow, Scheme, Subst, Type};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use unify::{UnifyError, VarSupply};

/// A solved class constraint, keyed by its use-site node
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConstraint {
    /// Class name
    pub class: String,
    /// Canonical instance type name, or `poly` for generalized
    /// constraints dispatched at runtime
    pub ty: String,
    /// Use-site node
    pub node: NodeId,
}

/// The result of checking one module
#[derive(Debug)]
pub struct CheckedModule {
    /// Core program, post-OpLowering
    pub core: CoreProgram,
    /// The module's interface
    pub iface: Iface,
    /// Schemes of every top-level binding
    pub schemes: HashMap<String, Scheme>,
    /// Resolved constraints by use site
    pub resolved: HashMap<NodeId, ResolvedConstraint>,
    /// Non-fatal diagnostics (the elaborator's plus this phase's)
    pub warnings: Vec<Diagnostic>,
}

/// Type-check an elaborated module and run OpLowering on its Core
pub fn typecheck_module(
    elab: ElaboratedModule,
    dep_ifaces: &HashMap<String, Iface>,
) -> Result<CheckedModule, Vec<Diagnostic>> {
    let mut infer = Infer::new(&elab, dep_ifaces);
    infer.check_program(&elab.core);

    if !infer.errors.is_empty() {
        return Err(infer.errors);
    }

    // Final schemes with the finished substitution applied
    let mut schemes = HashMap::new();
    for (name, scheme) in &infer.toplevel {
        schemes.insert(name.clone(), infer.subst.apply_scheme(scheme));
    }

    let resolved = infer.resolved.clone();
    let mut warnings = elab.warnings.clone();
    warnings.extend(std::mem::take(&mut infer.warnings));
    drop(infer);

    let iface = build_iface(&elab, &schemes);

    // OpLowering: every Intrinsic either becomes a dictionary
    // application or a direct builtin reference
    let core = oplower::lower_program(elab.core, &resolved)?;

    Ok(CheckedModule {
        core,
        iface,
        schemes,
        resolved,
        warnings,
    })
}

fn build_iface(elab: &ElaboratedModule, schemes: &HashMap<String, Scheme>) -> Iface {
    let mut exports = BTreeMap::new();
    for name in &elab.exports {
        let Some(scheme) = schemes.get(name) else {
            continue;
        };
        let purity = scheme
            .ty
            .effect_row()
            .map(|row| row.is_pure())
            .unwrap_or(true);
        exports.insert(
            name.clone(),
            IfaceExport {
                scheme: scheme.clone(),
                purity,
                global_ref: IfaceRef {
                    module: elab.core.module.clone(),
                    name: name.clone(),
                },
            },
        );
    }
    let mut constructors = BTreeMap::new();
    for ctor in &elab.ctors {
        constructors.insert(
            ctor.ctor.clone(),
            IfaceCtor {
                type_name: ctor.type_name.clone(),
                ctor_name: ctor.ctor.clone(),
                arity: ctor.arity(),
                type_params: ctor.type_params.clone(),
                field_types: ctor.field_types.clone(),
                result_type: ctor.result_type.clone(),
            },
        );
    }
    Iface::new(elab.core.module.clone(), IFACE_SCHEMA, exports, constructors)
}

#[derive(Debug, Clone)]
struct Pending {
    class: String,
    ty: Type,
    node: NodeId,
}

struct Infer<'a> {
    subst: Subst,
    supply: VarSupply,
    pending: Vec<Pending>,
    resolved: HashMap<NodeId, ResolvedConstraint>,
    /// Finished top-level schemes
    toplevel: HashMap<String, Scheme>,
    /// Lexical scopes for the binding being checked
    scopes: Vec<HashMap<String, Scheme>>,
    sigs: &'a HashMap<String, FuncSig>,
    declared_effects: &'a HashMap<NodeId, BTreeSet<String>>,
    let_annotations: &'a HashMap<NodeId, Type>,
    ctor_index: &'a HashMap<String, CtorDef>,
    dep_ifaces: &'a HashMap<String, Iface>,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

impl<'a> Infer<'a> {
    fn new(elab: &'a ElaboratedModule, dep_ifaces: &'a HashMap<String, Iface>) -> Self {
        Self {
            subst: Subst::new(),
            supply: VarSupply::new(),
            pending: Vec::new(),
            resolved: HashMap::new(),
            toplevel: HashMap::new(),
            scopes: Vec::new(),
            sigs: &elab.sigs,
            declared_effects: &elab.declared_effects,
            let_annotations: &elab.let_annotations,
            ctor_index: &elab.ctor_index,
            dep_ifaces,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn check_program(&mut self, program: &CoreProgram) {
        for group in &program.groups {
            match group {
                crate::core::BindingGroup::Single(binding) => {
                    if let Some(ty) = self.check_binding(&binding.name, &binding.expr) {
                        self.finish_binding(&binding.name, ty, binding.expr.span);
                    }
                }
                crate::core::BindingGroup::Rec(bindings) => {
                    // Pre-bind every member monomorphically so mutual
                    // references check against the declared signatures
                    let mut assumed: Vec<(String, Type)> = Vec::new();
                    for binding in bindings {
                        let ty = self.assumed_type(&binding.name);
                        assumed.push((binding.name.clone(), ty));
                    }
                    let frame: HashMap<String, Scheme> = assumed
                        .iter()
                        .map(|(name, ty)| (name.clone(), Scheme::mono(ty.clone())))
                        .collect();
                    self.scopes.push(frame);
                    let mut results: Vec<(String, Type, crate::span::Span)> = Vec::new();
                    for (binding, (_, assumed_ty)) in bindings.iter().zip(assumed.iter()) {
                        if let Some(ty) = self.check_binding(&binding.name, &binding.expr) {
                            self.unify_at(&ty, assumed_ty, binding.expr.span);
                            results.push((binding.name.clone(), ty, binding.expr.span));
                        }
                    }
                    self.scopes.pop();
                    for (name, ty, span) in results {
                        self.finish_binding(&name, ty, span);
                    }
                }
            }
        }
    }

    /// A monomorphic placeholder type for a recursive binding, shaped by
    /// its signature
    fn assumed_type(&mut self, name: &str) -> Type {
        match self.sigs.get(name) {
            Some(sig) => {
                let mut fresh = HashMap::new();
                let params = sig
                    .params
                    .iter()
                    .map(|t| self.freshen(t, &mut fresh))
                    .collect();
                let ret = self.freshen(&sig.ret, &mut fresh);
                Type::Func {
                    params,
                    ret: Box::new(ret),
                    effects: sig.effects.clone(),
                }
            }
            None => Type::Var(self.supply.fresh_ty()),
        }
    }

    /// Check one top-level binding (always a lambda) against its
    /// signature; returns the binding's type
    fn check_binding(&mut self, name: &str, expr: &CoreExpr) -> Option<Type> {
        let CoreKind::Lambda { params, body } = &expr.kind else {
            // Not a function: infer directly
            return self.infer(expr).map(|(ty, _)| ty);
        };

        let sig = self.sigs.get(name);
        let mut fresh = HashMap::new();
        let (param_tys, ret_ty, declared) = match sig {
            Some(sig) => {
                let params: Vec<Type> = sig
                    .params
                    .iter()
                    .map(|t| self.freshen(t, &mut fresh))
                    .collect();
                let ret = self.freshen(&sig.ret, &mut fresh);
                (params, ret, sig.effects.clone())
            }
            None => {
                let params: Vec<Type> = params
                    .iter()
                    .map(|_| Type::Var(self.supply.fresh_ty()))
                    .collect();
                (params, Type::Var(self.supply.fresh_ty()), EffectRow::pure())
            }
        };

        if param_tys.len() != params.len() {
            self.error(
                "TC_TYP_001",
                format!(
                    "`{}` declares {} parameter(s) but binds {}",
                    name,
                    param_tys.len(),
                    params.len()
                ),
                expr.span,
            );
            return None;
        }

        let frame: HashMap<String, Scheme> = params
            .iter()
            .cloned()
            .zip(param_tys.iter().map(|t| Scheme::mono(t.clone())))
            .collect();
        self.scopes.push(frame);
        let result = self.infer(body);
        self.scopes.pop();
        let (body_ty, body_row) = result?;

        self.unify_at(&body_ty, &ret_ty, body.span);
        self.check_effect_bound(&body_row, &declared, expr);

        Some(Type::Func {
            params: param_tys,
            ret: Box::new(ret_ty),
            effects: declared,
        })
    }

    /// The declared row is an upper bound on the body's inferred row
    fn check_effect_bound(&mut self, inferred: &EffectRow, declared: &EffectRow, expr: &CoreExpr) {
        let mut inferred = self.subst.apply_row(inferred);
        // A leftover open tail is unconstrained; close it empty
        if let Some(tail) = inferred.tail.take() {
            self.subst.insert_row(tail, EffectRow::pure());
        }
        let missing: Vec<String> = inferred
            .labels
            .difference(&declared.labels)
            .cloned()
            .collect();
        if !missing.is_empty() {
            let extra: Vec<String> = declared
                .labels
                .difference(&inferred.labels)
                .cloned()
                .collect();
            self.errors.push(
                Diagnostic::error(
                    "TC_ROW_001",
                    Phase::Typecheck,
                    format!(
                        "effect row mismatch: body performs {{{}}} not covered by the declared row {}",
                        missing.join(", "),
                        declared
                    ),
                )
                .with_span(expr.span)
                .with_data("missing", serde_json::json!(missing))
                .with_data("extra", serde_json::json!(extra))
                .with_data("declared_closed", serde_json::json!(declared.tail.is_none()))
                .with_data("inferred_closed", serde_json::json!(true))
                .with_fix(
                    format!("add the missing label(s) to the `!` annotation: {}", missing.join(", ")),
                    0.9,
                ),
            );
        }
        // Check against the declaration recorded at elaboration time
        if let Some(labels) = self.declared_effects.get(&expr.id) {
            debug_assert_eq!(labels, &declared.labels);
        }
    }

    /// Solve pending constraints and generalize, then record the scheme
    fn finish_binding(&mut self, name: &str, ty: Type, span: crate::span::Span) {
        let scheme = self.solve_and_generalize(ty, span, false);
        self.toplevel.insert(name.to_string(), scheme);
    }

    fn env_free_vars(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        for frame in &self.scopes {
            for scheme in frame.values() {
                let applied = self.subst.apply_scheme(scheme);
                for v in applied.ty.free_vars() {
                    if !applied.vars.contains(&v) {
                        vars.insert(v);
                    }
                }
            }
        }
        vars
    }

    /// Resolve concrete constraints, default ambiguous ones, lift the
    /// rest into the scheme. With `restrict` set (the monomorphism
    /// restriction: non-lambda let values), constrained variables are
    /// never generalized; they default instead.
    fn solve_and_generalize(&mut self, ty: Type, span: crate::span::Span, restrict: bool) -> Scheme {
        let env_vars = self.env_free_vars();

        // First pass: resolve what is already concrete, collect the rest
        let mut by_var: BTreeMap<String, Vec<Pending>> = BTreeMap::new();
        let mut deferred = Vec::new();
        for pending in std::mem::take(&mut self.pending) {
            let applied = self.subst.apply(&pending.ty);
            match &applied {
                Type::Var(var) => {
                    if env_vars.contains(var) {
                        // Owned by an enclosing scope
                        deferred.push(Pending {
                            ty: applied.clone(),
                            ..pending
                        });
                    } else {
                        by_var.entry(var.clone()).or_default().push(Pending {
                            ty: applied.clone(),
                            ..pending
                        });
                    }
                }
                _ => self.resolve_concrete(&pending.class, &applied, pending.node),
            }
        }
        self.pending = deferred;

        let ty = self.subst.apply(&ty);
        let mut gen_vars: Vec<String> = ty
            .free_vars()
            .into_iter()
            .filter(|v| !env_vars.contains(v))
            .collect();
        if restrict {
            gen_vars.retain(|v| !by_var.contains_key(v));
        }

        let mut constraints = Vec::new();
        for (var, group) in by_var {
            if gen_vars.contains(&var) {
                // Generalized: the constraint joins the scheme and its
                // use sites dispatch through runtime dictionaries
                for pending in &group {
                    self.resolved.insert(
                        pending.node,
                        ResolvedConstraint {
                            class: pending.class.clone(),
                            ty: instances::POLY.to_string(),
                            node: pending.node,
                        },
                    );
                }
                for pending in group {
                    constraints.push(Constraint {
                        class: pending.class,
                        ty: Type::Var(var.clone()),
                    });
                }
            } else {
                // Ambiguous: defaulting
                let classes: BTreeSet<&str> =
                    group.iter().map(|p| p.class.as_str()).collect();
                let default = if classes.contains("Fractional") {
                    Some(Type::float())
                } else if classes.contains("Num") {
                    Some(Type::int())
                } else {
                    None
                };
                match default {
                    Some(default) => {
                        self.subst.insert_type(var.clone(), default.clone());
                        for pending in group {
                            self.resolve_concrete(&pending.class, &default, pending.node);
                        }
                    }
                    None => {
                        self.errors.push(
                            Diagnostic::error(
                                "TC_AMB",
                                Phase::Typecheck,
                                format!(
                                    "ambiguous type variable constrained by {}",
                                    classes.into_iter().collect::<Vec<_>>().join(", ")
                                ),
                            )
                            .with_span(span),
                        );
                    }
                }
            }
        }

        constraints.sort_by(|a, b| (&a.class, a.ty.to_string()).cmp(&(&b.class, b.ty.to_string())));
        constraints.dedup();

        Scheme {
            vars: gen_vars,
            constraints,
            ty: self.subst.apply(&ty),
        }
    }

    fn resolve_concrete(&mut self, class: &str, ty: &Type, node: NodeId) {
        if instances::has_instance(class, ty) {
            let Type::Con(name) = ty else { unreachable!() };
            self.resolved.insert(
                node,
                ResolvedConstraint {
                    class: class.to_string(),
                    ty: name.clone(),
                    node,
                },
            );
        } else {
            self.errors.push(Diagnostic::error(
                "TC_TYP_004",
                Phase::Typecheck,
                format!("no instance `{} {}`", class, ty),
            ));
        }
    }

    /// Replace annotation variables with fresh unification variables,
    /// consistently within one signature
    fn freshen(&mut self, ty: &Type, map: &mut HashMap<String, String>) -> Type {
        match ty {
            Type::Var(name) => {
                let fresh = map
                    .entry(name.clone())
                    .or_insert_with(|| self.supply.fresh_ty());
                Type::Var(fresh.clone())
            }
            Type::Con(name) => Type::Con(name.clone()),
            Type::Func {
                params,
                ret,
                effects,
            } => Type::Func {
                params: params.iter().map(|t| self.freshen(t, map)).collect(),
                ret: Box::new(self.freshen(ret, map)),
                effects: effects.clone(),
            },
            Type::List(elem) => Type::List(Box::new(self.freshen(elem, map))),
            Type::Tuple(items) => {
                Type::Tuple(items.iter().map(|t| self.freshen(t, map)).collect())
            }
            Type::Record(row) => Type::Record(RecordRow {
                fields: row
                    .fields
                    .iter()
                    .map(|(name, t)| (name.clone(), self.freshen(t, map)))
                    .collect(),
                tail: row.tail.clone(),
            }),
            Type::App(head, args) => Type::App(
                Box::new(self.freshen(head, map)),
                args.iter().map(|t| self.freshen(t, map)).collect(),
            ),
        }
    }

    /// Instantiate a scheme at a use site, re-emitting its constraints
    fn instantiate(&mut self, scheme: &Scheme, node: NodeId) -> Type {
        let mut map = HashMap::new();
        for var in &scheme.vars {
            map.insert(var.clone(), self.supply.fresh_ty());
        }
        let mut local = Subst::new();
        for (var, fresh) in &map {
            local.insert_type(var.clone(), Type::Var(fresh.clone()));
        }
        for constraint in &scheme.constraints {
            self.pending.push(Pending {
                class: constraint.class.clone(),
                ty: local.apply(&constraint.ty),
                node,
            });
        }
        local.apply(&scheme.ty)
    }

    fn unify_at(&mut self, a: &Type, b: &Type, span: crate::span::Span) -> bool {
        match unify::unify(&mut self.subst, &mut self.supply, a, b) {
            Ok(()) => true,
            Err(err) => {
                self.push_unify_error(err, span);
                false
            }
        }
    }

    fn push_unify_error(&mut self, err: UnifyError, span: crate::span::Span) {
        let mut diag = Diagnostic::error(err.code(), Phase::Typecheck, err.message()).with_span(span);
        if let UnifyError::RowMismatch {
            missing,
            extra,
            left_closed,
            right_closed,
        } = &err
        {
            diag = diag
                .with_data("missing", serde_json::json!(missing))
                .with_data("extra", serde_json::json!(extra))
                .with_data("left_closed", serde_json::json!(left_closed))
                .with_data("right_closed", serde_json::json!(right_closed));
        }
        self.errors.push(diag);
    }

    fn error(&mut self, code: &str, message: impl Into<String>, span: crate::span::Span) {
        self.errors
            .push(Diagnostic::error(code, Phase::Typecheck, message).with_span(span));
    }

    fn lookup(&self, name: &str) -> Option<Scheme> {
        for frame in self.scopes.iter().rev() {
            if let Some(scheme) = frame.get(name) {
                return Some(scheme.clone());
            }
        }
        self.toplevel.get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Inference proper
    // ------------------------------------------------------------------

    fn infer(&mut self, expr: &CoreExpr) -> Option<(Type, EffectRow)> {
        match &expr.kind {
            CoreKind::Lit(lit) => Some(self.infer_lit(lit, expr.id)),
            CoreKind::Var(name) => {
                let Some(scheme) = self.lookup(name) else {
                    self.error(
                        "TC_TYP_003",
                        format!("unbound variable `{}`", name),
                        expr.span,
                    );
                    return None;
                };
                Some((self.instantiate(&scheme, expr.id), EffectRow::pure()))
            }
            CoreKind::Global(global) => {
                let scheme = self.global_scheme(global, expr)?;
                Some((self.instantiate(&scheme, expr.id), EffectRow::pure()))
            }
            CoreKind::Lambda { params, body } => {
                let param_tys: Vec<Type> = params
                    .iter()
                    .map(|_| Type::Var(self.supply.fresh_ty()))
                    .collect();
                let frame: HashMap<String, Scheme> = params
                    .iter()
                    .cloned()
                    .zip(param_tys.iter().map(|t| Scheme::mono(t.clone())))
                    .collect();
                self.scopes.push(frame);
                let result = self.infer(body);
                self.scopes.pop();
                let (body_ty, body_row) = result?;
                let mut row = self.subst.apply_row(&body_row);
                if let Some(tail) = row.tail.take() {
                    self.subst.insert_row(tail, EffectRow::pure());
                }
                Some((
                    Type::Func {
                        params: param_tys,
                        ret: Box::new(body_ty),
                        effects: row,
                    },
                    EffectRow::pure(),
                ))
            }
            CoreKind::Let { name, value, body } => {
                let (value_ty, value_row) = self.infer(value)?;
                if let Some(ann) = self.let_annotations.get(&expr.id).cloned() {
                    let mut map = HashMap::new();
                    let ann = self.freshen(&ann, &mut map);
                    self.unify_at(&value_ty, &ann, value.span);
                }
                // Monomorphism restriction: only lambda-valued lets
                // generalize their constrained variables
                let restrict = !matches!(value.kind, CoreKind::Lambda { .. });
                let scheme = self.solve_and_generalize(value_ty, value.span, restrict);
                if self.scopes.is_empty() {
                    self.scopes.push(HashMap::new());
                }
                self.scopes
                    .last_mut()
                    .expect("scope frame")
                    .insert(name.clone(), scheme);
                let (body_ty, body_row) = self.infer(body)?;
                Some((body_ty, value_row.union(&body_row)))
            }
            CoreKind::LetRec { bindings, body } => {
                let mut frame = HashMap::new();
                let mut placeholders = Vec::new();
                for (name, _) in bindings {
                    let ty = Type::Var(self.supply.fresh_ty());
                    frame.insert(name.clone(), Scheme::mono(ty.clone()));
                    placeholders.push(ty);
                }
                self.scopes.push(frame);
                let mut row = EffectRow::pure();
                for ((_, value), placeholder) in bindings.iter().zip(placeholders.iter()) {
                    if let Some((ty, value_row)) = self.infer(value) {
                        self.unify_at(&ty, placeholder, value.span);
                        row = row.union(&value_row);
                    }
                }
                let result = self.infer(body);
                self.scopes.pop();
                let (body_ty, body_row) = result?;
                Some((body_ty, row.union(&body_row)))
            }
            CoreKind::App { func, args } => {
                let (func_ty, _) = self.infer(func)?;
                let mut arg_tys = Vec::new();
                let mut row = EffectRow::pure();
                for arg in args {
                    let (ty, arg_row) = self.infer(arg)?;
                    arg_tys.push(ty);
                    row = row.union(&arg_row);
                }
                let ret = Type::Var(self.supply.fresh_ty());
                let latent = EffectRow::open(Vec::<String>::new(), self.supply.fresh_row());
                let expected = Type::Func {
                    params: arg_tys,
                    ret: Box::new(ret.clone()),
                    effects: latent.clone(),
                };
                if !self.unify_at(&func_ty, &expected, expr.span) {
                    return None;
                }
                // The callee's effects happen at this application
                let latent = self.subst.apply_row(&latent);
                Some((self.subst.apply(&ret), row.union(&latent)))
            }
            CoreKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let (cond_ty, cond_row) = self.infer(cond)?;
                self.unify_at(&cond_ty, &Type::bool(), cond.span);
                let (then_ty, then_row) = self.infer(then_branch)?;
                let (else_ty, else_row) = self.infer(else_branch)?;
                self.unify_at(&then_ty, &else_ty, else_branch.span);
                Some((
                    self.subst.apply(&then_ty),
                    cond_row.union(&then_row).union(&else_row),
                ))
            }
            CoreKind::Match { scrutinee, arms } => {
                let (scrutinee_ty, mut row) = self.infer(scrutinee)?;
                let result_ty = Type::Var(self.supply.fresh_ty());
                for arm in arms {
                    let bindings = self.check_pattern(&arm.pattern, &scrutinee_ty, arm.body.span)?;
                    let frame: HashMap<String, Scheme> = bindings
                        .into_iter()
                        .map(|(name, ty)| (name, Scheme::mono(ty)))
                        .collect();
                    self.scopes.push(frame);
                    if let Some(guard) = &arm.guard {
                        if let Some((guard_ty, guard_row)) = self.infer(guard) {
                            self.unify_at(&guard_ty, &Type::bool(), guard.span);
                            row = row.union(&guard_row);
                        }
                    }
                    let body = self.infer(&arm.body);
                    self.scopes.pop();
                    let (body_ty, body_row) = body?;
                    self.unify_at(&body_ty, &result_ty, arm.body.span);
                    row = row.union(&body_row);
                }
                Some((self.subst.apply(&result_ty), row))
            }
            CoreKind::Intrinsic { op, args } => self.infer_intrinsic(*op, args, expr),
            CoreKind::Record(fields) => {
                let mut tys = BTreeMap::new();
                let mut row = EffectRow::pure();
                for (name, value) in fields {
                    let (ty, value_row) = self.infer(value)?;
                    tys.insert(name.clone(), ty);
                    row = row.union(&value_row);
                }
                Some((
                    Type::Record(RecordRow {
                        fields: tys,
                        tail: None,
                    }),
                    row,
                ))
            }
            CoreKind::RecordAccess { expr: target, field } => {
                let (target_ty, row) = self.infer(target)?;
                let field_ty = Type::Var(self.supply.fresh_ty());
                let expected = Type::Record(RecordRow {
                    fields: BTreeMap::from([(field.clone(), field_ty.clone())]),
                    tail: Some(self.supply.fresh_row()),
                });
                self.unify_at(&target_ty, &expected, expr.span);
                Some((self.subst.apply(&field_ty), row))
            }
            CoreKind::List(items) => {
                let elem = Type::Var(self.supply.fresh_ty());
                let mut row = EffectRow::pure();
                for item in items {
                    let (ty, item_row) = self.infer(item)?;
                    self.unify_at(&ty, &elem, item.span);
                    row = row.union(&item_row);
                }
                Some((Type::List(Box::new(self.subst.apply(&elem))), row))
            }
            CoreKind::Tuple(items) => {
                let mut tys = Vec::new();
                let mut row = EffectRow::pure();
                for item in items {
                    let (ty, item_row) = self.infer(item)?;
                    tys.push(ty);
                    row = row.union(&item_row);
                }
                Some((Type::Tuple(tys), row))
            }
            CoreKind::DictAbs { body, .. } => self.infer(body),
            CoreKind::DictApp { args, .. } => {
                // Only present post-lowering; trust the recorded types
                for arg in args {
                    self.infer(arg)?;
                }
                Some((Type::Var(self.supply.fresh_ty()), EffectRow::pure()))
            }
            CoreKind::DictRef { .. } => {
                Some((Type::Var(self.supply.fresh_ty()), EffectRow::pure()))
            }
        }
    }

    fn infer_lit(&mut self, lit: &Lit, node: NodeId) -> (Type, EffectRow) {
        let ty = match lit {
            Lit::Int(_) => {
                let var = Type::Var(self.supply.fresh_ty());
                self.pending.push(Pending {
                    class: "Num".to_string(),
                    ty: var.clone(),
                    node,
                });
                var
            }
            Lit::Float(_) => {
                let var = Type::Var(self.supply.fresh_ty());
                self.pending.push(Pending {
                    class: "Num".to_string(),
                    ty: var.clone(),
                    node,
                });
                self.pending.push(Pending {
                    class: "Fractional".to_string(),
                    ty: var.clone(),
                    node,
                });
                var
            }
            Lit::Str(_) => Type::string(),
            Lit::Bool(_) => Type::bool(),
            Lit::Unit => Type::unit(),
        };
        (ty, EffectRow::pure())
    }

    fn infer_intrinsic(
        &mut self,
        op: IntrinsicOp,
        args: &[CoreExpr],
        expr: &CoreExpr,
    ) -> Option<(Type, EffectRow)> {
        let mut arg_results = Vec::new();
        let mut row = EffectRow::pure();
        for arg in args {
            let (ty, arg_row) = self.infer(arg)?;
            arg_results.push((ty, arg.span));
            row = row.union(&arg_row);
        }

        let result = match op {
            IntrinsicOp::Add | IntrinsicOp::Sub | IntrinsicOp::Mul | IntrinsicOp::Div => {
                let operand = Type::Var(self.supply.fresh_ty());
                for (ty, span) in &arg_results {
                    self.unify_at(ty, &operand, *span);
                }
                self.pending.push(Pending {
                    class: "Num".to_string(),
                    ty: operand.clone(),
                    node: expr.id,
                });
                operand
            }
            IntrinsicOp::Neg => {
                let operand = Type::Var(self.supply.fresh_ty());
                self.unify_at(&arg_results[0].0, &operand, arg_results[0].1);
                self.pending.push(Pending {
                    class: "Num".to_string(),
                    ty: operand.clone(),
                    node: expr.id,
                });
                operand
            }
            IntrinsicOp::Eq | IntrinsicOp::Ne => {
                let operand = Type::Var(self.supply.fresh_ty());
                for (ty, span) in &arg_results {
                    self.unify_at(ty, &operand, *span);
                }
                self.pending.push(Pending {
                    class: "Eq".to_string(),
                    ty: operand,
                    node: expr.id,
                });
                Type::bool()
            }
            IntrinsicOp::Lt | IntrinsicOp::Le | IntrinsicOp::Gt | IntrinsicOp::Ge => {
                let operand = Type::Var(self.supply.fresh_ty());
                for (ty, span) in &arg_results {
                    self.unify_at(ty, &operand, *span);
                }
                self.pending.push(Pending {
                    class: "Ord".to_string(),
                    ty: operand,
                    node: expr.id,
                });
                Type::bool()
            }
            IntrinsicOp::Concat => {
                for (ty, span) in &arg_results {
                    self.unify_at(ty, &Type::string(), *span);
                }
                Type::string()
            }
            IntrinsicOp::Not => {
                self.unify_at(&arg_results[0].0, &Type::bool(), arg_results[0].1);
                Type::bool()
            }
        };
        Some((result, row))
    }

    fn global_scheme(&mut self, global: &crate::core::GlobalRef, expr: &CoreExpr) -> Option<Scheme> {
        match global.module.as_str() {
            "$builtin" => match builtins::spec(&global.name) {
                Some(spec) => Some(spec.scheme.clone()),
                None => {
                    self.error(
                        "TC_TYP_003",
                        format!("unknown builtin `{}`", global.name),
                        expr.span,
                    );
                    None
                }
            },
            "$adt" => match self.ctor_index.get(&global.name) {
                Some(def) => Some(ctor_scheme(def)),
                None => {
                    self.error(
                        "TC_TYP_003",
                        format!("unknown constructor factory `{}`", global.name),
                        expr.span,
                    );
                    None
                }
            },
            module => match self
                .dep_ifaces
                .get(module)
                .and_then(|iface| iface.exports.get(&global.name))
            {
                Some(export) => Some(export.scheme.clone()),
                None => {
                    self.error(
                        "TC_TYP_005",
                        format!("module `{}` has no export `{}`", module, global.name),
                        expr.span,
                    );
                    None
                }
            },
        }
    }

    /// Check a pattern against the scrutinee type, returning bindings
    fn check_pattern(
        &mut self,
        pattern: &CorePattern,
        expected: &Type,
        span: crate::span::Span,
    ) -> Option<Vec<(String, Type)>> {
        let mut bindings = Vec::new();
        self.check_pattern_inner(pattern, expected, span, &mut bindings)?;
        Some(bindings)
    }

    fn check_pattern_inner(
        &mut self,
        pattern: &CorePattern,
        expected: &Type,
        span: crate::span::Span,
        bindings: &mut Vec<(String, Type)>,
    ) -> Option<()> {
        match pattern {
            CorePattern::Wildcard => Some(()),
            CorePattern::Var(name) => {
                bindings.push((name.clone(), self.subst.apply(expected)));
                Some(())
            }
            CorePattern::Lit(lit) => {
                let ty = match lit {
                    Lit::Int(_) => Type::int(),
                    Lit::Float(_) => Type::float(),
                    Lit::Str(_) => Type::string(),
                    Lit::Bool(_) => Type::bool(),
                    Lit::Unit => Type::unit(),
                };
                self.unify_at(expected, &ty, span);
                Some(())
            }
            CorePattern::Tuple(items) => {
                let item_tys: Vec<Type> = items
                    .iter()
                    .map(|_| Type::Var(self.supply.fresh_ty()))
                    .collect();
                self.unify_at(expected, &Type::Tuple(item_tys.clone()), span);
                for (item, ty) in items.iter().zip(item_tys.iter()) {
                    self.check_pattern_inner(item, ty, span, bindings)?;
                }
                Some(())
            }
            CorePattern::List { items, rest } => {
                let elem = Type::Var(self.supply.fresh_ty());
                self.unify_at(expected, &Type::List(Box::new(elem.clone())), span);
                for item in items {
                    self.check_pattern_inner(item, &elem, span, bindings)?;
                }
                if let Some(rest) = rest {
                    let list_ty = Type::List(Box::new(elem));
                    self.check_pattern_inner(rest, &list_ty, span, bindings)?;
                }
                Some(())
            }
            CorePattern::Record { fields, rest } => {
                let mut field_tys = BTreeMap::new();
                for (name, _) in fields {
                    field_tys.insert(name.clone(), Type::Var(self.supply.fresh_ty()));
                }
                let tail = if *rest {
                    Some(self.supply.fresh_row())
                } else {
                    None
                };
                self.unify_at(
                    expected,
                    &Type::Record(RecordRow {
                        fields: field_tys.clone(),
                        tail,
                    }),
                    span,
                );
                for (name, pat) in fields {
                    let ty = field_tys.get(name).expect("field registered").clone();
                    self.check_pattern_inner(pat, &ty, span, bindings)?;
                }
                Some(())
            }
            CorePattern::Ctor {
                type_name,
                ctor,
                args,
                ..
            } => {
                let factory = format!("make_{}_{}", type_name, ctor);
                let Some(def) = self.ctor_index.get(&factory).cloned() else {
                    self.error(
                        "TC_TYP_003",
                        format!("unknown constructor `{}` in pattern", ctor),
                        span,
                    );
                    return None;
                };
                let mut map = HashMap::new();
                for var in &def.type_params {
                    map.insert(var.clone(), self.supply.fresh_ty());
                }
                let mut local = Subst::new();
                for (var, fresh) in &map {
                    local.insert_type(var.clone(), Type::Var(fresh.clone()));
                }
                let result = local.apply(&def.result_type);
                self.unify_at(expected, &result, span);
                for (arg, field) in args.iter().zip(def.field_types.iter()) {
                    let field_ty = local.apply(field);
                    self.check_pattern_inner(arg, &field_ty, span, bindings)?;
                }
                Some(())
            }
        }
    }
}

/// The scheme of a constructor's `$adt` factory: a function for
/// non-nullary constructors, the bare result type for nullary ones
pub fn ctor_scheme(def: &CtorDef) -> Scheme {
    if def.field_types.is_empty() {
        Scheme {
            vars: def.type_params.clone(),
            constraints: Vec::new(),
            ty: def.result_type.clone(),
        }
    } else {
        Scheme {
            vars: def.type_params.clone(),
            constraints: Vec::new(),
            ty: Type::Func {
                params: def.field_types.clone(),
                ret: Box::new(def.result_type.clone()),
                effects: EffectRow::pure(),
            },
        }
    }
}
