//! Surface-to-Core elaboration
//!
//! Lowers the surface AST into Core ANF: fresh `NodeId` per node,
//! non-atomic subexpressions hoisted into `$tmpN` lets, `&&`/`||`
//! desugared into `if`, operators lowered to `Intrinsic` nodes,
//! constructors rewritten to `$adt` factory references, and `_`-prefixed
//! names resolved against the builtin registry. Top-level functions are
//! grouped by SCC so mutual recursion becomes `LetRec`.

pub mod exhaustiveness;
pub mod scc;

use crate::ast::{self, Decl, ExprKind, PatternKind, TypeExprKind};
use crate::core::{
    BindingGroup, CoreArm, CoreBinding, CoreExpr, CoreKind, CorePattern, CoreProgram, GlobalRef,
    IntrinsicOp, Lit, NodeId, NodeIdGen,
};
use crate::diagnostic::{Diagnostic, Phase};
use crate::iface::Iface;
use crate::link::{builtins, GlobalEnv};
use crate::loader::LoadedModule;
use crate::span::Span;
use crate::types::{EffectRow, RecordRow, Type};
use exhaustiveness::TypeUniverse;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A registered constructor definition
#[derive(Debug, Clone, PartialEq)]
pub struct CtorDef {
    /// Owning module path
    pub module: String,
    /// Declaring type name
    pub type_name: String,
    /// Constructor name
    pub ctor: String,
    /// Type parameters of the declaring type
    pub type_params: Vec<String>,
    /// Field types
    pub field_types: Vec<Type>,
    /// Constructor result type
    pub result_type: Type,
    /// Whether the declaring type was exported
    pub exported: bool,
}

impl CtorDef {
    /// Number of fields
    pub fn arity(&self) -> usize {
        self.field_types.len()
    }

    /// The `$adt` factory export name
    pub fn factory_name(&self) -> String {
        format!("make_{}_{}", self.type_name, self.ctor)
    }
}

/// A top-level function's declared signature
#[derive(Debug, Clone)]
pub struct FuncSig {
    /// Parameter types, from annotations
    pub params: Vec<Type>,
    /// Declared return type
    pub ret: Type,
    /// Declared effect row; empty (pure) when unannotated
    pub effects: EffectRow,
}

/// The result of elaborating one module
#[derive(Debug)]
pub struct ElaboratedModule {
    /// Core ANF program, SCC-grouped
    pub core: CoreProgram,
    /// Top-level function signatures by name
    pub sigs: HashMap<String, FuncSig>,
    /// Declared effect labels keyed by the function lambda's node
    pub declared_effects: HashMap<NodeId, BTreeSet<String>>,
    /// `let` annotations keyed by the let node
    pub let_annotations: HashMap<NodeId, Type>,
    /// Locally declared constructors
    pub ctors: Vec<CtorDef>,
    /// Constructor index by `$adt` factory name (local and imported)
    pub ctor_index: HashMap<String, CtorDef>,
    /// Exported binding names
    pub exports: Vec<String>,
    /// Non-fatal diagnostics
    pub warnings: Vec<Diagnostic>,
}

/// Elaborate a loaded module against its import environment.
/// `dep_ifaces` supplies the full constructor universe for
/// exhaustiveness, beyond what was selectively imported.
pub fn elaborate_module(
    loaded: &LoadedModule,
    env: &GlobalEnv,
    dep_ifaces: &HashMap<String, Iface>,
) -> Result<ElaboratedModule, Vec<Diagnostic>> {
    let mut elab = Elaborator::new(loaded.path.clone(), env, dep_ifaces);
    elab.run(loaded)
}

struct Elaborator<'a> {
    module: String,
    env: &'a GlobalEnv,
    ids: NodeIdGen,
    next_tmp: u64,
    toplevel: Vec<String>,
    local_ctors: HashMap<String, CtorDef>,
    universe: TypeUniverse,
    scopes: Vec<HashSet<String>>,
    edges: HashMap<String, BTreeSet<String>>,
    current_func: Option<String>,
    declared_effects: HashMap<NodeId, BTreeSet<String>>,
    let_annotations: HashMap<NodeId, Type>,
    warnings: Vec<Diagnostic>,
    errors: Vec<Diagnostic>,
}

impl<'a> Elaborator<'a> {
    fn new(module: String, env: &'a GlobalEnv, dep_ifaces: &HashMap<String, Iface>) -> Self {
        let mut universe = TypeUniverse::new();
        for iface in dep_ifaces.values() {
            for ctor in iface.constructors.values() {
                universe
                    .entry(ctor.type_name.clone())
                    .or_default()
                    .push((ctor.ctor_name.clone(), ctor.arity));
            }
        }
        for ctors in universe.values_mut() {
            ctors.sort();
            ctors.dedup();
        }
        Self {
            module,
            env,
            ids: NodeIdGen::new(),
            next_tmp: 0,
            toplevel: Vec::new(),
            local_ctors: HashMap::new(),
            universe,
            scopes: Vec::new(),
            edges: HashMap::new(),
            current_func: None,
            declared_effects: HashMap::new(),
            let_annotations: HashMap::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self, loaded: &LoadedModule) -> Result<ElaboratedModule, Vec<Diagnostic>> {
        // Pass 1: register types and collect top-level names
        let mut seen_names: HashSet<String> = HashSet::new();
        for decl in &loaded.ast.decls {
            match decl {
                Decl::Type(ty) => self.register_type(ty),
                Decl::Func(func) => {
                    if !seen_names.insert(func.name.name.clone()) {
                        self.errors.push(
                            Diagnostic::error(
                                "ELA_001",
                                Phase::Elaborate,
                                format!("duplicate binding `{}`", func.name.name),
                            )
                            .with_span(func.name.span),
                        );
                        continue;
                    }
                    self.toplevel.push(func.name.name.clone());
                }
            }
        }

        // Pass 2: lower bodies
        let mut lowered: HashMap<String, CoreBinding> = HashMap::new();
        let mut sigs = HashMap::new();
        let mut exports = Vec::new();
        for decl in &loaded.ast.decls {
            let Decl::Func(func) = decl else { continue };
            self.current_func = Some(func.name.name.clone());
            self.edges.entry(func.name.name.clone()).or_default();

            let sig = self.convert_signature(func);
            let Some(binding) = self.lower_func(func, &sig) else {
                continue;
            };
            if func.exported {
                exports.push(func.name.name.clone());
            }
            sigs.insert(func.name.name.clone(), sig);
            lowered.insert(func.name.name.clone(), binding);
        }
        self.current_func = None;

        if !self.errors.is_empty() {
            let mut all = std::mem::take(&mut self.errors);
            all.extend(std::mem::take(&mut self.warnings));
            return Err(all);
        }

        // Pass 3: SCC grouping in dependency order
        let components = scc::strongly_connected_components(&self.toplevel, &self.edges);
        let mut groups = Vec::new();
        for component in components {
            if component.len() == 1 {
                let name = &component[0];
                let Some(binding) = lowered.remove(name) else {
                    continue;
                };
                if scc::is_self_recursive(name, &self.edges) {
                    groups.push(BindingGroup::Rec(vec![binding]));
                } else {
                    groups.push(BindingGroup::Single(binding));
                }
            } else {
                let bindings: Vec<CoreBinding> = component
                    .iter()
                    .filter_map(|name| lowered.remove(name))
                    .collect();
                groups.push(BindingGroup::Rec(bindings));
            }
        }

        let mut ctors: Vec<CtorDef> = self.local_ctors.values().cloned().collect();
        ctors.sort_by(|a, b| (&a.type_name, &a.ctor).cmp(&(&b.type_name, &b.ctor)));

        let mut ctor_index: HashMap<String, CtorDef> = HashMap::new();
        for ctor in &ctors {
            ctor_index.insert(ctor.factory_name(), ctor.clone());
        }
        for imported in self.env.ctors.values() {
            let def = CtorDef {
                module: imported.module.clone(),
                type_name: imported.ctor.type_name.clone(),
                ctor: imported.ctor.ctor_name.clone(),
                type_params: imported.ctor.type_params.clone(),
                field_types: imported.ctor.field_types.clone(),
                result_type: imported.ctor.result_type.clone(),
                exported: true,
            };
            ctor_index.insert(def.factory_name(), def);
        }

        Ok(ElaboratedModule {
            core: CoreProgram {
                module: self.module,
                groups,
            },
            sigs,
            declared_effects: self.declared_effects,
            let_annotations: self.let_annotations,
            ctors,
            ctor_index,
            exports,
            warnings: self.warnings,
        })
    }

    fn register_type(&mut self, decl: &ast::TypeDecl) {
        let type_params: Vec<String> = decl.params.iter().map(|p| p.name.clone()).collect();
        let result_type = if type_params.is_empty() {
            Type::Con(decl.name.name.clone())
        } else {
            Type::App(
                Box::new(Type::Con(decl.name.name.clone())),
                type_params.iter().map(|p| Type::Var(p.clone())).collect(),
            )
        };
        let mut entries = Vec::new();
        for ctor in &decl.ctors {
            if self.local_ctors.contains_key(&ctor.name.name)
                || self.env.ctors.contains_key(&ctor.name.name)
            {
                self.errors.push(
                    Diagnostic::error(
                        "ELA_001",
                        Phase::Elaborate,
                        format!("duplicate constructor `{}`", ctor.name.name),
                    )
                    .with_span(ctor.name.span),
                );
                continue;
            }
            let field_types: Vec<Type> =
                ctor.fields.iter().map(|f| self.convert_type(f)).collect();
            entries.push((ctor.name.name.clone(), field_types.len()));
            self.local_ctors.insert(
                ctor.name.name.clone(),
                CtorDef {
                    module: self.module.clone(),
                    type_name: decl.name.name.clone(),
                    ctor: ctor.name.name.clone(),
                    type_params: type_params.clone(),
                    field_types,
                    result_type: result_type.clone(),
                    exported: decl.exported,
                },
            );
        }
        let universe = self.universe.entry(decl.name.name.clone()).or_default();
        universe.extend(entries);
        universe.sort();
        universe.dedup();
    }

    fn convert_signature(&mut self, func: &ast::FuncDecl) -> FuncSig {
        let params = func
            .params
            .iter()
            .map(|p| self.convert_type(&p.ty))
            .collect();
        let ret = self.convert_type(&func.ret);
        let effects = match &func.effects {
            Some(labels) => EffectRow::closed(labels.iter().map(|l| l.name.clone())),
            None => EffectRow::pure(),
        };
        FuncSig {
            params,
            ret,
            effects,
        }
    }

    fn convert_type(&mut self, te: &ast::TypeExpr) -> Type {
        match &te.kind {
            TypeExprKind::Name(name) => Type::Con(name.clone()),
            TypeExprKind::Var(name) => Type::Var(name.clone()),
            TypeExprKind::Unit => Type::unit(),
            TypeExprKind::List(elem) => Type::List(Box::new(self.convert_type(elem))),
            TypeExprKind::Tuple(items) => {
                Type::Tuple(items.iter().map(|t| self.convert_type(t)).collect())
            }
            TypeExprKind::Record(fields) => Type::Record(RecordRow {
                fields: fields
                    .iter()
                    .map(|(name, ty)| (name.name.clone(), self.convert_type(ty)))
                    .collect(),
                tail: None,
            }),
            TypeExprKind::Func {
                params,
                ret,
                effects,
            } => Type::Func {
                params: params.iter().map(|t| self.convert_type(t)).collect(),
                ret: Box::new(self.convert_type(ret)),
                effects: EffectRow::closed(effects.iter().cloned()),
            },
            TypeExprKind::App(name, args) => Type::App(
                Box::new(Type::Con(name.clone())),
                args.iter().map(|t| self.convert_type(t)).collect(),
            ),
        }
    }

    fn lower_func(&mut self, func: &ast::FuncDecl, sig: &FuncSig) -> Option<CoreBinding> {
        self.scopes.push(func.params.iter().map(|p| p.name.name.clone()).collect());
        let body = self.lower_expr(&func.body);
        self.scopes.pop();
        let body = body?;

        let lambda_id = self.ids.fresh();
        self.declared_effects
            .insert(lambda_id, sig.effects.labels.clone());
        let lambda = CoreExpr {
            id: lambda_id,
            span: func.span,
            kind: CoreKind::Lambda {
                params: func.params.iter().map(|p| p.name.name.clone()).collect(),
                body: Box::new(body),
            },
        };
        Some(CoreBinding {
            name: func.name.name.clone(),
            expr: lambda,
            exported: func.exported,
            span: func.span,
        })
    }

    // ------------------------------------------------------------------
    // Expression lowering
    // ------------------------------------------------------------------

    fn node(&mut self, span: Span, kind: CoreKind) -> CoreExpr {
        CoreExpr {
            id: self.ids.fresh(),
            span,
            kind,
        }
    }

    fn fresh_tmp(&mut self) -> String {
        let name = format!("$tmp{}", self.next_tmp);
        self.next_tmp += 1;
        name
    }

    /// Lower to an atomic expression, hoisting into `binds` if necessary
    fn lower_atom(
        &mut self,
        expr: &ast::Expr,
        binds: &mut Vec<(String, CoreExpr)>,
    ) -> Option<CoreExpr> {
        let core = self.lower_expr(expr)?;
        if core.is_atomic() {
            return Some(core);
        }
        let span = core.span;
        let name = self.fresh_tmp();
        binds.push((name.clone(), core));
        Some(self.node(span, CoreKind::Var(name)))
    }

    /// Wrap hoisted bindings around a tail expression
    fn wrap(&mut self, binds: Vec<(String, CoreExpr)>, tail: CoreExpr) -> CoreExpr {
        let mut result = tail;
        for (name, value) in binds.into_iter().rev() {
            let span = value.span.merge(result.span);
            result = self.node(
                span,
                CoreKind::Let {
                    name,
                    value: Box::new(value),
                    body: Box::new(result),
                },
            );
        }
        result
    }

    fn lower_expr(&mut self, expr: &ast::Expr) -> Option<CoreExpr> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int(n) => Some(self.node(span, CoreKind::Lit(Lit::Int(*n)))),
            ExprKind::Float(f) => Some(self.node(span, CoreKind::Lit(Lit::Float(*f)))),
            ExprKind::Str(s) => Some(self.node(span, CoreKind::Lit(Lit::Str(s.clone())))),
            ExprKind::Bool(b) => Some(self.node(span, CoreKind::Lit(Lit::Bool(*b)))),
            ExprKind::Unit => Some(self.node(span, CoreKind::Lit(Lit::Unit))),
            ExprKind::Var(name) => self.lower_var(name, span),
            ExprKind::Lambda { params, body } => {
                self.scopes
                    .push(params.iter().map(|p| p.name.clone()).collect());
                let body = self.lower_expr(body);
                self.scopes.pop();
                let body = body?;
                Some(self.node(
                    span,
                    CoreKind::Lambda {
                        params: params.iter().map(|p| p.name.clone()).collect(),
                        body: Box::new(body),
                    },
                ))
            }
            ExprKind::Call { func, args } => {
                let mut binds = Vec::new();
                let func = self.lower_atom(func, &mut binds)?;
                let mut core_args = Vec::new();
                for arg in args {
                    core_args.push(self.lower_atom(arg, &mut binds)?);
                }
                let app = self.node(
                    span,
                    CoreKind::App {
                        func: Box::new(func),
                        args: core_args,
                    },
                );
                Some(self.wrap(binds, app))
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, span),
            ExprKind::Unary { op, expr: operand } => {
                let mut binds = Vec::new();
                let operand = self.lower_atom(operand, &mut binds)?;
                let intrinsic_op = match op {
                    ast::UnOp::Neg => IntrinsicOp::Neg,
                    ast::UnOp::Not => IntrinsicOp::Not,
                };
                let intrinsic = self.node(
                    span,
                    CoreKind::Intrinsic {
                        op: intrinsic_op,
                        args: vec![operand],
                    },
                );
                Some(self.wrap(binds, intrinsic))
            }
            ExprKind::Let {
                name,
                ann,
                value,
                body,
            } => {
                let value = self.lower_expr(value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.name.clone());
                }
                let body = self.lower_expr(body)?;
                let ann = ann.as_ref().map(|a| self.convert_type(a));
                let let_expr = self.node(
                    span,
                    CoreKind::Let {
                        name: name.name.clone(),
                        value: Box::new(value),
                        body: Box::new(body),
                    },
                );
                if let Some(ann) = ann {
                    self.let_annotations.insert(let_expr.id, ann);
                }
                Some(let_expr)
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut binds = Vec::new();
                let cond = self.lower_atom(cond, &mut binds)?;
                let then_branch = self.lower_expr(then_branch)?;
                let else_branch = self.lower_expr(else_branch)?;
                let if_expr = self.node(
                    span,
                    CoreKind::If {
                        cond: Box::new(cond),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    },
                );
                Some(self.wrap(binds, if_expr))
            }
            ExprKind::Match { scrutinee, arms } => {
                let mut binds = Vec::new();
                let scrutinee = self.lower_atom(scrutinee, &mut binds)?;
                let mut core_arms = Vec::new();
                for arm in arms {
                    let pattern = self.lower_pattern(&arm.pattern)?;
                    let bound: HashSet<String> = pattern.bound_names().into_iter().collect();
                    self.scopes.push(bound);
                    let guard = match &arm.guard {
                        Some(guard) => self.lower_expr(guard).map(Some),
                        None => Some(None),
                    };
                    let body = self.lower_expr(&arm.body);
                    self.scopes.pop();
                    core_arms.push(CoreArm {
                        pattern,
                        guard: guard?,
                        body: body?,
                    });
                }
                self.warnings
                    .extend(exhaustiveness::check_match(&core_arms, &self.universe, span));
                let match_expr = self.node(
                    span,
                    CoreKind::Match {
                        scrutinee: Box::new(scrutinee),
                        arms: core_arms,
                    },
                );
                Some(self.wrap(binds, match_expr))
            }
            ExprKind::List(items) => {
                let mut binds = Vec::new();
                let mut core_items = Vec::new();
                for item in items {
                    core_items.push(self.lower_atom(item, &mut binds)?);
                }
                let list = self.node(span, CoreKind::List(core_items));
                Some(self.wrap(binds, list))
            }
            ExprKind::Tuple(items) => {
                let mut binds = Vec::new();
                let mut core_items = Vec::new();
                for item in items {
                    core_items.push(self.lower_atom(item, &mut binds)?);
                }
                let tuple = self.node(span, CoreKind::Tuple(core_items));
                Some(self.wrap(binds, tuple))
            }
            ExprKind::Record(fields) => {
                let mut binds = Vec::new();
                let mut core_fields = Vec::new();
                for (name, value) in fields {
                    let value = self.lower_atom(value, &mut binds)?;
                    core_fields.push((name.name.clone(), value));
                }
                let record = self.node(span, CoreKind::Record(core_fields));
                Some(self.wrap(binds, record))
            }
            ExprKind::FieldAccess { expr: target, field } => {
                let mut binds = Vec::new();
                let target = self.lower_atom(target, &mut binds)?;
                let access = self.node(
                    span,
                    CoreKind::RecordAccess {
                        expr: Box::new(target),
                        field: field.name.clone(),
                    },
                );
                Some(self.wrap(binds, access))
            }
            ExprKind::Ctor { name, args } => self.lower_ctor(name, args, span),
        }
    }

    fn lower_var(&mut self, name: &str, span: Span) -> Option<CoreExpr> {
        if self.scopes.iter().any(|scope| scope.contains(name)) {
            return Some(self.node(span, CoreKind::Var(name.to_string())));
        }
        if self.toplevel.iter().any(|t| t == name) {
            if let Some(current) = self.current_func.clone() {
                self.edges
                    .entry(current)
                    .or_default()
                    .insert(name.to_string());
            }
            return Some(self.node(span, CoreKind::Var(name.to_string())));
        }
        if let Some(imported) = self.env.values.get(name) {
            let global = imported.global_ref.clone();
            return Some(self.node(span, CoreKind::Global(global)));
        }
        if name.starts_with('_') {
            if builtins::spec(name).is_some() {
                return Some(self.node(
                    span,
                    CoreKind::Global(GlobalRef {
                        module: "$builtin".to_string(),
                        name: name.to_string(),
                    }),
                ));
            }
            self.errors.push(
                Diagnostic::error(
                    "ELA_004",
                    Phase::Elaborate,
                    format!("unknown builtin `{}`", name),
                )
                .with_span(span),
            );
            return None;
        }
        self.errors.push(
            Diagnostic::error(
                "ELA_004",
                Phase::Elaborate,
                format!("unknown name `{}`", name),
            )
            .with_span(span),
        );
        None
    }

    fn lower_binary(
        &mut self,
        op: ast::BinOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> Option<CoreExpr> {
        // Short-circuit operators desugar to `if`
        if op == ast::BinOp::And {
            let mut binds = Vec::new();
            let lhs = self.lower_atom(lhs, &mut binds)?;
            let rhs = self.lower_expr(rhs)?;
            let lit_false = self.node(span, CoreKind::Lit(Lit::Bool(false)));
            let if_expr = self.node(
                span,
                CoreKind::If {
                    cond: Box::new(lhs),
                    then_branch: Box::new(rhs),
                    else_branch: Box::new(lit_false),
                },
            );
            return Some(self.wrap(binds, if_expr));
        }
        if op == ast::BinOp::Or {
            let mut binds = Vec::new();
            let lhs = self.lower_atom(lhs, &mut binds)?;
            let rhs = self.lower_expr(rhs)?;
            let lit_true = self.node(span, CoreKind::Lit(Lit::Bool(true)));
            let if_expr = self.node(
                span,
                CoreKind::If {
                    cond: Box::new(lhs),
                    then_branch: Box::new(lit_true),
                    else_branch: Box::new(rhs),
                },
            );
            return Some(self.wrap(binds, if_expr));
        }

        let intrinsic_op = match op {
            ast::BinOp::Add => IntrinsicOp::Add,
            ast::BinOp::Sub => IntrinsicOp::Sub,
            ast::BinOp::Mul => IntrinsicOp::Mul,
            ast::BinOp::Div => IntrinsicOp::Div,
            ast::BinOp::Concat => IntrinsicOp::Concat,
            ast::BinOp::Eq => IntrinsicOp::Eq,
            ast::BinOp::Ne => IntrinsicOp::Ne,
            ast::BinOp::Lt => IntrinsicOp::Lt,
            ast::BinOp::Le => IntrinsicOp::Le,
            ast::BinOp::Gt => IntrinsicOp::Gt,
            ast::BinOp::Ge => IntrinsicOp::Ge,
            ast::BinOp::And | ast::BinOp::Or => unreachable!("desugared above"),
        };
        let mut binds = Vec::new();
        let lhs = self.lower_atom(lhs, &mut binds)?;
        let rhs = self.lower_atom(rhs, &mut binds)?;
        let intrinsic = self.node(
            span,
            CoreKind::Intrinsic {
                op: intrinsic_op,
                args: vec![lhs, rhs],
            },
        );
        Some(self.wrap(binds, intrinsic))
    }

    fn lower_ctor(&mut self, name: &ast::Ident, args: &[ast::Expr], span: Span) -> Option<CoreExpr> {
        let def = self.resolve_ctor(name)?;
        if args.len() != def.arity() {
            self.errors.push(
                Diagnostic::error(
                    "ELA_003",
                    Phase::Elaborate,
                    format!(
                        "constructor `{}` expects {} argument(s), got {}",
                        def.ctor,
                        def.arity(),
                        args.len()
                    ),
                )
                .with_span(span),
            );
            return None;
        }
        let factory = GlobalRef {
            module: "$adt".to_string(),
            name: def.factory_name(),
        };
        if args.is_empty() {
            // Nullary constructors resolve directly to the cached value
            return Some(self.node(span, CoreKind::Global(factory)));
        }
        let mut binds = Vec::new();
        let func = self.node(span, CoreKind::Global(factory));
        let mut core_args = Vec::new();
        for arg in args {
            core_args.push(self.lower_atom(arg, &mut binds)?);
        }
        let app = self.node(
            span,
            CoreKind::App {
                func: Box::new(func),
                args: core_args,
            },
        );
        Some(self.wrap(binds, app))
    }

    fn resolve_ctor(&mut self, name: &ast::Ident) -> Option<CtorDef> {
        if let Some(def) = self.local_ctors.get(&name.name) {
            return Some(def.clone());
        }
        if let Some(imported) = self.env.ctors.get(&name.name) {
            return Some(CtorDef {
                module: imported.module.clone(),
                type_name: imported.ctor.type_name.clone(),
                ctor: imported.ctor.ctor_name.clone(),
                type_params: imported.ctor.type_params.clone(),
                field_types: imported.ctor.field_types.clone(),
                result_type: imported.ctor.result_type.clone(),
                exported: true,
            });
        }
        self.errors.push(
            Diagnostic::error(
                "ELA_002",
                Phase::Elaborate,
                format!("unknown constructor `{}`", name.name),
            )
            .with_span(name.span),
        );
        None
    }

    fn lower_pattern(&mut self, pattern: &ast::Pattern) -> Option<CorePattern> {
        let lowered = self.lower_pattern_inner(pattern)?;
        // Reject duplicate binders within one pattern
        let mut seen = HashSet::new();
        for name in lowered.bound_names() {
            if name != "_" && !seen.insert(name.clone()) {
                self.errors.push(
                    Diagnostic::error(
                        "ELA_001",
                        Phase::Elaborate,
                        format!("duplicate binding `{}` in pattern", name),
                    )
                    .with_span(pattern.span),
                );
                return None;
            }
        }
        Some(lowered)
    }

    fn lower_pattern_inner(&mut self, pattern: &ast::Pattern) -> Option<CorePattern> {
        match &pattern.kind {
            PatternKind::Wildcard => Some(CorePattern::Wildcard),
            PatternKind::Var(name) => Some(CorePattern::Var(name.clone())),
            PatternKind::Int(n) => Some(CorePattern::Lit(Lit::Int(*n))),
            PatternKind::Float(f) => Some(CorePattern::Lit(Lit::Float(*f))),
            PatternKind::Str(s) => Some(CorePattern::Lit(Lit::Str(s.clone()))),
            PatternKind::Bool(b) => Some(CorePattern::Lit(Lit::Bool(*b))),
            PatternKind::Unit => Some(CorePattern::Lit(Lit::Unit)),
            PatternKind::Tuple(items) => {
                let items: Option<Vec<CorePattern>> =
                    items.iter().map(|p| self.lower_pattern_inner(p)).collect();
                Some(CorePattern::Tuple(items?))
            }
            PatternKind::List { items, rest } => {
                let items: Option<Vec<CorePattern>> =
                    items.iter().map(|p| self.lower_pattern_inner(p)).collect();
                let rest = match rest {
                    Some(rest) => Some(Box::new(self.lower_pattern_inner(rest)?)),
                    None => None,
                };
                Some(CorePattern::List {
                    items: items?,
                    rest,
                })
            }
            PatternKind::Record { fields, rest } => {
                let mut core_fields = Vec::new();
                for (name, pat) in fields {
                    core_fields.push((name.name.clone(), self.lower_pattern_inner(pat)?));
                }
                Some(CorePattern::Record {
                    fields: core_fields,
                    rest: *rest,
                })
            }
            PatternKind::Ctor { name, args } => {
                let def = self.resolve_ctor(name)?;
                if args.len() != def.arity() {
                    self.errors.push(
                        Diagnostic::error(
                            "ELA_003",
                            Phase::Elaborate,
                            format!(
                                "constructor `{}` expects {} argument(s) in pattern, got {}",
                                def.ctor,
                                def.arity(),
                                args.len()
                            ),
                        )
                        .with_span(pattern.span),
                    );
                    return None;
                }
                let args: Option<Vec<CorePattern>> =
                    args.iter().map(|p| self.lower_pattern_inner(p)).collect();
                Some(CorePattern::Ctor {
                    module: def.module,
                    type_name: def.type_name,
                    ctor: def.ctor,
                    args: args?,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verify::verify_program;
    use crate::loader::LoadedModule;
    use crate::parser::parse_module;

    fn load(source: &str) -> LoadedModule {
        let (ast, diags) = parse_module(source);
        assert!(diags.is_empty(), "parse diagnostics: {:#?}", diags);
        LoadedModule {
            path: ast.path.clone(),
            imports: ast.imports.iter().map(|i| i.module.clone()).collect(),
            ast,
            source: source.to_string(),
            file: None,
        }
    }

    fn elaborate(source: &str) -> ElaboratedModule {
        let loaded = load(source);
        elaborate_module(&loaded, &GlobalEnv::default(), &HashMap::new())
            .expect("elaboration should succeed")
    }

    #[test]
    fn test_anf_holds_for_nested_calls() {
        let elab = elaborate(
            "module m\nfunc g(x: int) -> int { x }\nfunc f(x: int) -> int { g(g(x) + 1) }\n",
        );
        assert!(verify_program(&elab.core).is_ok());
    }

    #[test]
    fn test_operators_lower_to_intrinsics() {
        let elab = elaborate("module m\nfunc f(x: int, y: int) -> int { x + y }\n");
        let binding = elab.core.binding("f").unwrap();
        let CoreKind::Lambda { body, .. } = &binding.expr.kind else {
            panic!("expected lambda");
        };
        assert!(matches!(
            body.kind,
            CoreKind::Intrinsic {
                op: IntrinsicOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_and_desugars_to_if() {
        let elab = elaborate("module m\nfunc f(a: bool, b: bool) -> bool { a && b }\n");
        let binding = elab.core.binding("f").unwrap();
        let CoreKind::Lambda { body, .. } = &binding.expr.kind else {
            panic!("expected lambda");
        };
        let CoreKind::If { else_branch, .. } = &body.kind else {
            panic!("expected if, got {:?}", body.kind);
        };
        assert!(matches!(else_branch.kind, CoreKind::Lit(Lit::Bool(false))));
    }

    #[test]
    fn test_self_recursion_becomes_letrec() {
        let elab = elaborate(
            "module m\nfunc count(n: int) -> int { match n { 0 => 0, _ => count(n - 1) } }\n",
        );
        assert!(matches!(elab.core.groups[0], BindingGroup::Rec(_)));
    }

    #[test]
    fn test_mutual_recursion_grouped() {
        let elab = elaborate(
            "module m\n\
             func even(n: int) -> bool { match n { 0 => true, _ => odd(n - 1) } }\n\
             func odd(n: int) -> bool { match n { 0 => false, _ => even(n - 1) } }\n\
             func f() -> bool { even(4) }\n",
        );
        let BindingGroup::Rec(bindings) = &elab.core.groups[0] else {
            panic!("expected recursive group first");
        };
        assert_eq!(bindings.len(), 2);
        assert!(matches!(&elab.core.groups[1], BindingGroup::Single(b) if b.name == "f"));
    }

    #[test]
    fn test_helpers_ordered_before_callers() {
        let elab = elaborate(
            "module m\nfunc f() -> int { helper() }\nfunc helper() -> int { 1 }\n",
        );
        let names: Vec<&str> = elab.core.bindings().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "f"]);
    }

    #[test]
    fn test_local_ctor_lowered_to_adt_factory() {
        let elab = elaborate(
            "module m\ntype Color = Red | Green | Blue\nfunc f() -> Color { Red }\n",
        );
        let binding = elab.core.binding("f").unwrap();
        let CoreKind::Lambda { body, .. } = &binding.expr.kind else {
            panic!("expected lambda");
        };
        let CoreKind::Global(global) = &body.kind else {
            panic!("expected global, got {:?}", body.kind);
        };
        assert_eq!(global.module, "$adt");
        assert_eq!(global.name, "make_Color_Red");
    }

    #[test]
    fn test_ctor_arity_mismatch_is_fatal() {
        let loaded = load("module m\ntype Pair = MkPair(int, int)\nfunc f() -> Pair { MkPair(1) }\n");
        let errs = elaborate_module(&loaded, &GlobalEnv::default(), &HashMap::new()).unwrap_err();
        assert!(errs.iter().any(|e| e.code == "ELA_003"));
    }

    #[test]
    fn test_unknown_ctor_is_fatal() {
        let loaded = load("module m\nfunc f() -> int { match 1 { _ => 0 } }\nfunc g() -> int { match Nope { _ => 0 } }\n");
        let errs = elaborate_module(&loaded, &GlobalEnv::default(), &HashMap::new()).unwrap_err();
        assert!(errs.iter().any(|e| e.code == "ELA_002"));
    }

    #[test]
    fn test_unknown_name_is_fatal() {
        let loaded = load("module m\nfunc f() -> int { missing }\n");
        let errs = elaborate_module(&loaded, &GlobalEnv::default(), &HashMap::new()).unwrap_err();
        assert!(errs.iter().any(|e| e.code == "ELA_004"));
    }

    #[test]
    fn test_duplicate_func_is_fatal() {
        let loaded = load("module m\nfunc f() -> int { 1 }\nfunc f() -> int { 2 }\n");
        let errs = elaborate_module(&loaded, &GlobalEnv::default(), &HashMap::new()).unwrap_err();
        assert!(errs.iter().any(|e| e.code == "ELA_001"));
    }

    #[test]
    fn test_builtin_reference_resolves() {
        let elab = elaborate("module m\nfunc f(s: string) -> () ! {IO} { _io_println(s) }\n");
        let binding = elab.core.binding("f").unwrap();
        let CoreKind::Lambda { body, .. } = &binding.expr.kind else {
            panic!("expected lambda");
        };
        let CoreKind::App { func, .. } = &body.kind else {
            panic!("expected app, got {:?}", body.kind);
        };
        let CoreKind::Global(global) = &func.kind else {
            panic!("expected global");
        };
        assert_eq!(global.module, "$builtin");
        assert_eq!(global.name, "_io_println");
    }

    #[test]
    fn test_non_exhaustive_bool_match_warns() {
        let elab = elaborate("module m\nfunc f(x: bool) -> int { match x { true => 1 } }\n");
        assert!(elab.warnings.iter().any(|w| w.code == "ELA_W01"));
    }

    #[test]
    fn test_declared_effects_recorded() {
        let elab = elaborate("module m\nfunc f(s: string) -> () ! {IO} { _io_println(s) }\n");
        let binding = elab.core.binding("f").unwrap();
        let labels = elab.declared_effects.get(&binding.expr.id).unwrap();
        assert!(labels.contains("IO"));
    }

    #[test]
    fn test_node_ids_unique() {
        let elab = elaborate(
            "module m\nfunc f(x: int) -> int { let y = x + 1; y * 2 }\nfunc g() -> int { f(3) }\n",
        );
        let mut ids = Vec::new();
        for binding in elab.core.bindings() {
            collect_ids(&binding.expr, &mut ids);
        }
        let unique: HashSet<NodeId> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
    }

    fn collect_ids(expr: &CoreExpr, ids: &mut Vec<NodeId>) {
        ids.push(expr.id);
        match &expr.kind {
            CoreKind::Lambda { body, .. } => collect_ids(body, ids),
            CoreKind::Let { value, body, .. } => {
                collect_ids(value, ids);
                collect_ids(body, ids);
            }
            CoreKind::LetRec { bindings, body } => {
                for (_, value) in bindings {
                    collect_ids(value, ids);
                }
                collect_ids(body, ids);
            }
            CoreKind::App { func, args } => {
                collect_ids(func, ids);
                for arg in args {
                    collect_ids(arg, ids);
                }
            }
            CoreKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                collect_ids(cond, ids);
                collect_ids(then_branch, ids);
                collect_ids(else_branch, ids);
            }
            CoreKind::Match { scrutinee, arms } => {
                collect_ids(scrutinee, ids);
                for arm in arms {
                    if let Some(guard) = &arm.guard {
                        collect_ids(guard, ids);
                    }
                    collect_ids(&arm.body, ids);
                }
            }
            CoreKind::Intrinsic { args, .. } => {
                for arg in args {
                    collect_ids(arg, ids);
                }
            }
            CoreKind::Record(fields) => {
                for (_, value) in fields {
                    collect_ids(value, ids);
                }
            }
            CoreKind::RecordAccess { expr: target, .. } => collect_ids(target, ids),
            CoreKind::List(items) | CoreKind::Tuple(items) => {
                for item in items {
                    collect_ids(item, ids);
                }
            }
            CoreKind::DictAbs { body, .. } => collect_ids(body, ids),
            CoreKind::DictApp { dict, args, .. } => {
                collect_ids(dict, ids);
                for arg in args {
                    collect_ids(arg, ids);
                }
            }
            _ => {}
        }
    }
}
