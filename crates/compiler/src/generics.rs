//! Generic templates and hygienic instantiation by deep copy.
//!
//! A generic declaration is stored as a template: its formal list plus the
//! spec AST, with the body attached when it is seen later. Instantiation
//! clones the whole template subtree with fresh node identities, replacing
//! every identifier that names a formal with a copy of the corresponding
//! actual. Resolved type/symbol slots are reset by the copy, so resolution
//! re-runs on the instance in its lexical position.

use crate::arena::{Arena, NodeId, SymbolId};
use crate::ast::{Node, NodeKind};
use std::collections::HashMap;

/// Clone-depth cap; malformed or adversarial inputs fail instead of
/// exhausting the stack.
pub const MAX_CLONE_DEPTH: u32 = 100;

#[derive(Debug, Clone)]
pub struct Template {
    pub formals: Vec<NodeId>,
    /// The generic unit's spec node (`SubprogDecl` or `PackageSpec`).
    pub unit: NodeId,
    /// The matching body, attached when encountered after the declaration.
    pub body: Option<NodeId>,
}

#[derive(Default)]
pub struct GenericEnv {
    templates: HashMap<SymbolId, Template>,
}

impl GenericEnv {
    pub fn new() -> Self {
        GenericEnv {
            templates: HashMap::new(),
        }
    }

    pub fn register(&mut self, sym: SymbolId, template: Template) {
        self.templates.insert(sym, template);
    }

    pub fn get(&self, sym: SymbolId) -> Option<&Template> {
        self.templates.get(&sym)
    }

    pub fn is_template(&self, sym: SymbolId) -> bool {
        self.templates.contains_key(&sym)
    }

    /// Attach a body to a registered template; returns false when the symbol
    /// is unknown or already has a body.
    pub fn attach_body(&mut self, sym: SymbolId, body: NodeId) -> bool {
        match self.templates.get_mut(&sym) {
            Some(t) if t.body.is_none() => {
                t.body = Some(body);
                true
            }
            _ => false,
        }
    }
}

/// Formal-name → actual-subtree substitution, keys lower-cased.
pub type Substitution = HashMap<String, NodeId>;

/// Deep-copy `n`, substituting formal names and resetting resolution state.
pub fn clone_subtree(
    arena: &mut Arena,
    n: NodeId,
    subst: &Substitution,
    depth: u32,
) -> Result<NodeId, String> {
    if depth > MAX_CLONE_DEPTH {
        return Err(format!(
            "generic instantiation exceeds depth limit {}",
            MAX_CLONE_DEPTH
        ));
    }
    let node = arena.node(n).clone();

    // An identifier naming a formal is replaced by a fresh copy of the
    // actual (copied so each use site gets its own node identities).
    if let NodeKind::Ident(name) = &node.kind {
        if let Some(&actual) = subst.get(&name.to_ascii_lowercase()) {
            return clone_subtree(arena, actual, &Substitution::new(), depth + 1);
        }
    }

    let kind = clone_kind(arena, &node.kind, subst, depth)?;
    Ok(arena.alloc_node(Node::new(kind, node.loc)))
}

fn clone_vec(
    arena: &mut Arena,
    ids: &[NodeId],
    subst: &Substitution,
    depth: u32,
) -> Result<Vec<NodeId>, String> {
    let mut out = Vec::with_capacity(ids.len());
    for &id in ids {
        out.push(clone_subtree(arena, id, subst, depth + 1)?);
    }
    Ok(out)
}

fn clone_opt(
    arena: &mut Arena,
    id: Option<NodeId>,
    subst: &Substitution,
    depth: u32,
) -> Result<Option<NodeId>, String> {
    match id {
        Some(id) => Ok(Some(clone_subtree(arena, id, subst, depth + 1)?)),
        None => Ok(None),
    }
}

fn clone_kind(
    arena: &mut Arena,
    kind: &NodeKind,
    subst: &Substitution,
    depth: u32,
) -> Result<NodeKind, String> {
    use NodeKind::*;
    let d = depth;
    Ok(match kind {
        Error => Error,
        IntLit(v) => IntLit(v.clone()),
        RealLit(v) => RealLit(*v),
        CharLit(c) => CharLit(*c),
        StrLit(s) => StrLit(s.clone()),
        NullLit => NullLit,
        Ident(s) => Ident(s.clone()),
        Unary { op, operand } => Unary {
            op: *op,
            operand: clone_subtree(arena, *operand, subst, d + 1)?,
        },
        Binary { op, lhs, rhs } => Binary {
            op: *op,
            lhs: clone_subtree(arena, *lhs, subst, d + 1)?,
            rhs: clone_subtree(arena, *rhs, subst, d + 1)?,
        },
        Indexed { prefix, args } => Indexed {
            prefix: clone_subtree(arena, *prefix, subst, d + 1)?,
            args: clone_vec(arena, args, subst, d)?,
        },
        Slice { prefix, range } => Slice {
            prefix: clone_subtree(arena, *prefix, subst, d + 1)?,
            range: clone_subtree(arena, *range, subst, d + 1)?,
        },
        Selected { prefix, selector } => Selected {
            prefix: clone_subtree(arena, *prefix, subst, d + 1)?,
            selector: selector.clone(),
        },
        Attr { prefix, name, args } => Attr {
            prefix: clone_subtree(arena, *prefix, subst, d + 1)?,
            name: name.clone(),
            args: clone_vec(arena, args, subst, d)?,
        },
        Qualified { mark, expr } => Qualified {
            mark: clone_subtree(arena, *mark, subst, d + 1)?,
            expr: clone_subtree(arena, *expr, subst, d + 1)?,
        },
        Conversion { mark, expr } => Conversion {
            mark: clone_subtree(arena, *mark, subst, d + 1)?,
            expr: clone_subtree(arena, *expr, subst, d + 1)?,
        },
        Call { callee, args } => Call {
            callee: clone_subtree(arena, *callee, subst, d + 1)?,
            args: clone_vec(arena, args, subst, d)?,
        },
        ParamAssoc { formal, actual } => ParamAssoc {
            formal: formal.clone(),
            actual: clone_subtree(arena, *actual, subst, d + 1)?,
        },
        Aggregate { items } => Aggregate {
            items: clone_vec(arena, items, subst, d)?,
        },
        AggItem { choices, expr } => AggItem {
            choices: clone_vec(arena, choices, subst, d)?,
            expr: clone_subtree(arena, *expr, subst, d + 1)?,
        },
        OthersChoice => OthersChoice,
        Allocator { subtype } => Allocator {
            subtype: clone_subtree(arena, *subtype, subst, d + 1)?,
        },
        Range { lo, hi } => Range {
            lo: clone_subtree(arena, *lo, subst, d + 1)?,
            hi: clone_subtree(arena, *hi, subst, d + 1)?,
        },
        Deref { prefix } => Deref {
            prefix: clone_subtree(arena, *prefix, subst, d + 1)?,
        },
        Check { kind, expr } => Check {
            kind: *kind,
            expr: clone_subtree(arena, *expr, subst, d + 1)?,
        },
        ObjectDecl {
            names,
            subtype,
            init,
            constant,
        } => ObjectDecl {
            names: names.clone(),
            subtype: clone_subtree(arena, *subtype, subst, d + 1)?,
            init: clone_opt(arena, *init, subst, d)?,
            constant: *constant,
        },
        NumberDecl { names, expr } => NumberDecl {
            names: names.clone(),
            expr: clone_subtree(arena, *expr, subst, d + 1)?,
        },
        TypeDecl {
            name,
            discriminants,
            def,
        } => TypeDecl {
            name: name.clone(),
            discriminants: clone_vec(arena, discriminants, subst, d)?,
            def: clone_opt(arena, *def, subst, d)?,
        },
        SubtypeDecl { name, indication } => SubtypeDecl {
            name: name.clone(),
            indication: clone_subtree(arena, *indication, subst, d + 1)?,
        },
        EnumDef { literals } => EnumDef {
            literals: clone_vec(arena, literals, subst, d)?,
        },
        IntegerDef { range } => IntegerDef {
            range: clone_subtree(arena, *range, subst, d + 1)?,
        },
        FloatDef { digits, range } => FloatDef {
            digits: clone_subtree(arena, *digits, subst, d + 1)?,
            range: clone_opt(arena, *range, subst, d)?,
        },
        FixedDef { delta, range } => FixedDef {
            delta: clone_subtree(arena, *delta, subst, d + 1)?,
            range: clone_opt(arena, *range, subst, d)?,
        },
        RecordDef { components, variant } => RecordDef {
            components: clone_vec(arena, components, subst, d)?,
            variant: clone_opt(arena, *variant, subst, d)?,
        },
        ComponentDecl {
            names,
            subtype,
            init,
        } => ComponentDecl {
            names: names.clone(),
            subtype: clone_subtree(arena, *subtype, subst, d + 1)?,
            init: clone_opt(arena, *init, subst, d)?,
        },
        VariantPart { discr, variants } => VariantPart {
            discr: discr.clone(),
            variants: clone_vec(arena, variants, subst, d)?,
        },
        Variant {
            choices,
            components,
            variant,
        } => Variant {
            choices: clone_vec(arena, choices, subst, d)?,
            components: clone_vec(arena, components, subst, d)?,
            variant: clone_opt(arena, *variant, subst, d)?,
        },
        ArrayDef {
            indexes,
            unconstrained,
            elem,
        } => ArrayDef {
            indexes: clone_vec(arena, indexes, subst, d)?,
            unconstrained: *unconstrained,
            elem: clone_subtree(arena, *elem, subst, d + 1)?,
        },
        AccessDef { designated } => AccessDef {
            designated: clone_subtree(arena, *designated, subst, d + 1)?,
        },
        DerivedDef { parent } => DerivedDef {
            parent: clone_subtree(arena, *parent, subst, d + 1)?,
        },
        PrivateDef { limited } => PrivateDef { limited: *limited },
        SubtypeInd { mark, constraint } => SubtypeInd {
            mark: clone_subtree(arena, *mark, subst, d + 1)?,
            constraint: clone_opt(arena, *constraint, subst, d)?,
        },
        RangeConstraint { range } => RangeConstraint {
            range: clone_subtree(arena, *range, subst, d + 1)?,
        },
        DigitsConstraint { digits, range } => DigitsConstraint {
            digits: clone_subtree(arena, *digits, subst, d + 1)?,
            range: clone_opt(arena, *range, subst, d)?,
        },
        DeltaConstraint { delta, range } => DeltaConstraint {
            delta: clone_subtree(arena, *delta, subst, d + 1)?,
            range: clone_opt(arena, *range, subst, d)?,
        },
        IndexConstraint { ranges } => IndexConstraint {
            ranges: clone_vec(arena, ranges, subst, d)?,
        },
        DiscriminantConstraint { assocs } => DiscriminantConstraint {
            assocs: clone_vec(arena, assocs, subst, d)?,
        },
        DiscriminantSpec {
            names,
            subtype,
            default,
        } => DiscriminantSpec {
            names: names.clone(),
            subtype: clone_subtree(arena, *subtype, subst, d + 1)?,
            default: clone_opt(arena, *default, subst, d)?,
        },
        SubprogSpec {
            name,
            is_function,
            params,
            ret,
        } => SubprogSpec {
            name: name.clone(),
            is_function: *is_function,
            params: clone_vec(arena, params, subst, d)?,
            ret: clone_opt(arena, *ret, subst, d)?,
        },
        ParamSpec {
            names,
            mode,
            subtype,
            default,
        } => ParamSpec {
            names: names.clone(),
            mode: *mode,
            subtype: clone_subtree(arena, *subtype, subst, d + 1)?,
            default: clone_opt(arena, *default, subst, d)?,
        },
        SubprogDecl { spec } => SubprogDecl {
            spec: clone_subtree(arena, *spec, subst, d + 1)?,
        },
        SubprogBody {
            spec,
            decls,
            stmts,
            handlers,
        } => SubprogBody {
            spec: clone_subtree(arena, *spec, subst, d + 1)?,
            decls: clone_vec(arena, decls, subst, d)?,
            stmts: clone_vec(arena, stmts, subst, d)?,
            handlers: clone_vec(arena, handlers, subst, d)?,
        },
        BodyStub { spec } => BodyStub {
            spec: clone_subtree(arena, *spec, subst, d + 1)?,
        },
        PackageSpec {
            name,
            decls,
            privates,
        } => PackageSpec {
            name: name.clone(),
            decls: clone_vec(arena, decls, subst, d)?,
            privates: clone_vec(arena, privates, subst, d)?,
        },
        PackageBody {
            name,
            decls,
            stmts,
            handlers,
        } => PackageBody {
            name: name.clone(),
            decls: clone_vec(arena, decls, subst, d)?,
            stmts: clone_vec(arena, stmts, subst, d)?,
            handlers: clone_vec(arena, handlers, subst, d)?,
        },
        GenericDecl { formals, unit } => GenericDecl {
            formals: clone_vec(arena, formals, subst, d)?,
            unit: clone_subtree(arena, *unit, subst, d + 1)?,
        },
        GenericTypeFormal { name, kind } => GenericTypeFormal {
            name: name.clone(),
            kind: *kind,
        },
        GenericObjectFormal {
            names,
            mode,
            subtype,
            default,
        } => GenericObjectFormal {
            names: names.clone(),
            mode: *mode,
            subtype: clone_subtree(arena, *subtype, subst, d + 1)?,
            default: clone_opt(arena, *default, subst, d)?,
        },
        GenericSubpFormal { spec, default_name } => GenericSubpFormal {
            spec: clone_subtree(arena, *spec, subst, d + 1)?,
            default_name: clone_opt(arena, *default_name, subst, d)?,
        },
        GenericInst {
            name,
            template,
            actuals,
        } => GenericInst {
            name: name.clone(),
            template: clone_subtree(arena, *template, subst, d + 1)?,
            actuals: clone_vec(arena, actuals, subst, d)?,
        },
        ExceptionDecl { names } => ExceptionDecl {
            names: names.clone(),
        },
        RenamingDecl {
            name,
            kind,
            renamed,
            spec,
        } => RenamingDecl {
            name: name.clone(),
            kind: *kind,
            renamed: clone_subtree(arena, *renamed, subst, d + 1)?,
            spec: clone_opt(arena, *spec, subst, d)?,
        },
        UseClause { names } => UseClause {
            names: clone_vec(arena, names, subst, d)?,
        },
        WithClause { names } => WithClause {
            names: names.clone(),
        },
        Pragma { name, args } => Pragma {
            name: name.clone(),
            args: clone_vec(arena, args, subst, d)?,
        },
        TaskDecl { name } => TaskDecl { name: name.clone() },
        TaskBody { name, decls, stmts } => TaskBody {
            name: name.clone(),
            decls: clone_vec(arena, decls, subst, d)?,
            stmts: clone_vec(arena, stmts, subst, d)?,
        },
        Assign { target, value } => Assign {
            target: clone_subtree(arena, *target, subst, d + 1)?,
            value: clone_subtree(arena, *value, subst, d + 1)?,
        },
        If {
            cond,
            then_stmts,
            else_stmts,
        } => If {
            cond: clone_subtree(arena, *cond, subst, d + 1)?,
            then_stmts: clone_vec(arena, then_stmts, subst, d)?,
            else_stmts: clone_vec(arena, else_stmts, subst, d)?,
        },
        CaseStmt { selector, alts } => CaseStmt {
            selector: clone_subtree(arena, *selector, subst, d + 1)?,
            alts: clone_vec(arena, alts, subst, d)?,
        },
        CaseAlt { choices, stmts } => CaseAlt {
            choices: clone_vec(arena, choices, subst, d)?,
            stmts: clone_vec(arena, stmts, subst, d)?,
        },
        Loop {
            label,
            scheme,
            stmts,
        } => {
            let scheme = match scheme {
                crate::ast::LoopScheme::Plain => crate::ast::LoopScheme::Plain,
                crate::ast::LoopScheme::While(c) => {
                    crate::ast::LoopScheme::While(clone_subtree(arena, *c, subst, d + 1)?)
                }
                crate::ast::LoopScheme::For {
                    var,
                    reverse,
                    range,
                } => crate::ast::LoopScheme::For {
                    var: var.clone(),
                    reverse: *reverse,
                    range: clone_subtree(arena, *range, subst, d + 1)?,
                },
            };
            Loop {
                label: label.clone(),
                scheme,
                stmts: clone_vec(arena, stmts, subst, d)?,
            }
        }
        Block {
            label,
            decls,
            stmts,
            handlers,
        } => Block {
            label: label.clone(),
            decls: clone_vec(arena, decls, subst, d)?,
            stmts: clone_vec(arena, stmts, subst, d)?,
            handlers: clone_vec(arena, handlers, subst, d)?,
        },
        Exit { label, cond } => Exit {
            label: label.clone(),
            cond: clone_opt(arena, *cond, subst, d)?,
        },
        Return { expr } => Return {
            expr: clone_opt(arena, *expr, subst, d)?,
        },
        Goto { label } => Goto {
            label: label.clone(),
        },
        Label { name } => Label { name: name.clone() },
        Raise { name } => Raise {
            name: clone_opt(arena, *name, subst, d)?,
        },
        NullStmt => NullStmt,
        CallStmt { call } => CallStmt {
            call: clone_subtree(arena, *call, subst, d + 1)?,
        },
        DelayStmt { expr } => DelayStmt {
            expr: clone_subtree(arena, *expr, subst, d + 1)?,
        },
        Handler { choices, stmts } => Handler {
            choices: clone_vec(arena, choices, subst, d)?,
            stmts: clone_vec(arena, stmts, subst, d)?,
        },
        CompUnit { context, units } => CompUnit {
            context: clone_vec(arena, context, subst, d)?,
            units: clone_vec(arena, units, subst, d)?,
        },
    })
}

/// Give the cloned instance root the instantiation's user-supplied name.
pub fn rename_unit(arena: &mut Arena, unit: NodeId, new_name: &str) {
    let spec = match &arena.node(unit).kind {
        NodeKind::SubprogDecl { spec } | NodeKind::SubprogBody { spec, .. } => Some(*spec),
        NodeKind::PackageSpec { .. } | NodeKind::PackageBody { .. } => None,
        _ => None,
    };
    match spec {
        Some(spec) => {
            if let NodeKind::SubprogSpec { name, .. } = &mut arena.node_mut(spec).kind {
                *name = new_name.to_string();
            }
        }
        None => match &mut arena.node_mut(unit).kind {
            NodeKind::PackageSpec { name, .. } | NodeKind::PackageBody { name, .. } => {
                *name = new_name.to_string();
            }
            _ => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Loc;
    use crate::parser::Parser;

    fn parse_unit(arena: &mut Arena, source: &str) -> NodeId {
        let mut parser = Parser::new(source, "g.adb", arena);
        let root = parser.parse_compilation().expect("parse failed");
        match &arena.node(root).kind {
            NodeKind::CompUnit { units, .. } => units[0],
            _ => panic!("no unit"),
        }
    }

    #[test]
    fn test_clone_substitutes_formal_names() {
        let mut arena = Arena::new();
        let body = parse_unit(
            &mut arena,
            "procedure Swap (A, B : in out T) is Tmp : T; begin Tmp := A; end;",
        );
        let int_mark = arena.alloc_node(Node::new(
            NodeKind::Ident("Integer".to_string()),
            Loc::new(1, 1),
        ));
        let mut subst = Substitution::new();
        subst.insert("t".to_string(), int_mark);
        let cloned = clone_subtree(&mut arena, body, &subst, 0).expect("clone failed");

        // Every Ident("T") in the clone became Ident("Integer").
        fn count_idents(arena: &Arena, n: NodeId, target: &str, hits: &mut usize) {
            let node = arena.node(n).clone();
            if let NodeKind::Ident(name) = &node.kind {
                if name.eq_ignore_ascii_case(target) {
                    *hits += 1;
                }
            }
            for child in children_of(&node.kind) {
                count_idents(arena, child, target, hits);
            }
        }
        fn children_of(kind: &NodeKind) -> Vec<NodeId> {
            match kind {
                NodeKind::SubprogBody {
                    spec,
                    decls,
                    stmts,
                    handlers,
                } => {
                    let mut v = vec![*spec];
                    v.extend(decls);
                    v.extend(stmts);
                    v.extend(handlers);
                    v
                }
                NodeKind::SubprogSpec { params, ret, .. } => {
                    let mut v = params.clone();
                    v.extend(*ret);
                    v
                }
                NodeKind::ParamSpec { subtype, .. } => vec![*subtype],
                NodeKind::ObjectDecl { subtype, init, .. } => {
                    let mut v = vec![*subtype];
                    v.extend(*init);
                    v
                }
                NodeKind::SubtypeInd { mark, constraint } => {
                    let mut v = vec![*mark];
                    v.extend(*constraint);
                    v
                }
                NodeKind::Assign { target, value } => vec![*target, *value],
                _ => Vec::new(),
            }
        }

        let mut t_hits = 0;
        count_idents(&arena, cloned, "t", &mut t_hits);
        assert_eq!(t_hits, 0, "formal T must be substituted away");
        let mut int_hits = 0;
        count_idents(&arena, cloned, "integer", &mut int_hits);
        assert!(int_hits >= 3, "got {} Integer references", int_hits);
    }

    #[test]
    fn test_clone_produces_fresh_ids() {
        let mut arena = Arena::new();
        let unit = parse_unit(&mut arena, "procedure P is begin null; end;");
        let before = arena.node_count();
        let cloned = clone_subtree(&mut arena, unit, &Substitution::new(), 0).unwrap();
        assert!(cloned.index() >= before);
        assert_ne!(cloned, unit);
    }

    #[test]
    fn test_clone_resets_resolution_state() {
        let mut arena = Arena::new();
        let unit = parse_unit(&mut arena, "procedure P is begin null; end;");
        // Pretend the original was resolved.
        let fake_sym = arena.alloc_symbol(crate::symbols::Symbol::new(
            "p",
            crate::symbols::SymKind::Procedure,
        ));
        arena.node_mut(unit).sym = Some(fake_sym);
        let cloned = clone_subtree(&mut arena, unit, &Substitution::new(), 0).unwrap();
        assert!(arena.node(cloned).sym.is_none());
        assert!(arena.node(cloned).ty.is_none());
    }

    #[test]
    fn test_depth_cap() {
        let mut arena = Arena::new();
        // Build a chain of nested unary nodes deeper than the cap.
        let mut n = arena.alloc_node(Node::new(NodeKind::NullLit, Loc::new(1, 1)));
        for _ in 0..(MAX_CLONE_DEPTH + 10) {
            n = arena.alloc_node(Node::new(
                NodeKind::Unary {
                    op: crate::ast::UnOp::Minus,
                    operand: n,
                },
                Loc::new(1, 1),
            ));
        }
        let err = clone_subtree(&mut arena, n, &Substitution::new(), 0).unwrap_err();
        assert!(err.contains("depth limit"), "got {}", err);
    }

    #[test]
    fn test_rename_unit() {
        let mut arena = Arena::new();
        let unit = parse_unit(&mut arena, "procedure Swap (A : Integer) is begin null; end;");
        rename_unit(&mut arena, unit, "IS_Swap");
        match &arena.node(unit).kind {
            NodeKind::SubprogBody { spec, .. } => match &arena.node(*spec).kind {
                NodeKind::SubprogSpec { name, .. } => assert_eq!(name, "IS_Swap"),
                _ => panic!(),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn test_template_body_attach() {
        let mut arena = Arena::new();
        let mut env = GenericEnv::new();
        let sym = arena.alloc_symbol(crate::symbols::Symbol::new(
            "swap",
            crate::symbols::SymKind::Generic,
        ));
        let unit = parse_unit(&mut arena, "procedure Swap (A : Integer) is begin null; end;");
        env.register(
            sym,
            Template {
                formals: Vec::new(),
                unit,
                body: None,
            },
        );
        assert!(env.attach_body(sym, unit));
        assert!(!env.attach_body(sym, unit), "second attach must fail");
        assert!(env.get(sym).unwrap().body.is_some());
    }
}
