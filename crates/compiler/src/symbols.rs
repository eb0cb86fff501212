//! Symbol records, the scoped symbol table, and external-name mangling.
//!
//! Names are bucketed case-insensitively per scope, newest declaration first,
//! so overload chains are scanned in reverse declaration order. Visibility is
//! two bits per symbol: bit 0 directly visible (cleared when the declaring
//! scope closes), bit 1 use-visible (set when a package scope closes into its
//! enclosing scope, or by an explicit use clause).

use crate::arena::{Arena, NodeId, SymbolId, TypeId, Visited};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Object,
    Constant,
    Type,
    Exception,
    Procedure,
    Function,
    Package,
    Task,
    Entry,
    Label,
    Generic,
    Discriminant,
}

impl SymKind {
    pub fn is_subprogram(self) -> bool {
        matches!(self, SymKind::Procedure | SymKind::Function)
    }
}

/// Compiler-synthesized operators attached to composite types at freeze time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitOp {
    Equal,
    NotEqual,
    Assign,
    DefaultInit,
}

pub const VIS_DIRECT: u8 = 1;
pub const VIS_USE: u8 = 2;

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymKind,
    /// Object/constant type, function return type, or the described type for
    /// a type symbol. `None` for procedures and packages.
    pub ty: Option<TypeId>,
    pub decl: Option<NodeId>,
    pub scope_depth: u32,
    /// Static nesting level; 0 = library level.
    pub level: u32,
    /// Elaboration ordinal, dense within the declaring scope. Doubles as the
    /// frame slot index for locals of nested subprograms.
    pub ordinal: u32,
    /// Frame slot count for subprogram symbols (max local ordinal + 1).
    pub frame_size: u32,
    /// Previous symbol with the same name in the same declarative region.
    pub next_overload: Option<SymbolId>,
    pub parent_pkg: Option<SymbolId>,
    pub vis: u8,
    pub external_name: Option<String>,
    pub external_lang: Option<String>,
    /// Stable hash of qualified name + signature, assigned at declaration.
    pub uid: u64,
    /// Static integer value (enumeration literal position, folded constant).
    pub value: Option<i64>,
    pub fvalue: Option<f64>,
    /// Direct declarations of a package, in elaboration order.
    pub exports: Vec<SymbolId>,
    /// Formal parameter symbols of a subprogram.
    pub params: Vec<SymbolId>,
    pub renamed: Option<SymbolId>,
    /// Declared in a with'd unit (or imported from an .ali stub).
    pub imported: bool,
    pub inline: bool,
    pub builtin_op: Option<ImplicitOp>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymKind) -> Self {
        Symbol {
            name: name.into(),
            kind,
            ty: None,
            decl: None,
            scope_depth: 0,
            level: 0,
            ordinal: 0,
            frame_size: 0,
            next_overload: None,
            parent_pkg: None,
            vis: VIS_DIRECT,
            external_name: None,
            external_lang: None,
            uid: 0,
            value: None,
            fvalue: None,
            exports: Vec::new(),
            params: Vec::new(),
            renamed: None,
            imported: false,
            inline: false,
            builtin_op: None,
        }
    }

    pub fn directly_visible(&self) -> bool {
        self.vis & VIS_DIRECT != 0
    }

    pub fn use_visible(&self) -> bool {
        self.vis & VIS_USE != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Library,
    Package(SymbolId),
    Subprogram,
    /// Blocks and loop bodies share the enclosing subprogram's ordinal
    /// counter so every local lands in one frame.
    Block,
}

pub struct Scope {
    /// Lower-cased name -> symbols, newest first.
    names: HashMap<String, Vec<SymbolId>>,
    pub order: Vec<SymbolId>,
    next_ordinal: u32,
    pub kind: ScopeKind,
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                names: HashMap::new(),
                order: Vec::new(),
                next_ordinal: 1,
                kind: ScopeKind::Library,
            }],
        }
    }

    pub fn depth(&self) -> u32 {
        self.scopes.len() as u32
    }

    pub fn open_scope(&mut self, kind: ScopeKind) {
        let next_ordinal = match kind {
            ScopeKind::Block => self.scopes.last().map(|s| s.next_ordinal).unwrap_or(1),
            _ => 1,
        };
        self.scopes.push(Scope {
            names: HashMap::new(),
            order: Vec::new(),
            next_ordinal,
            kind,
        });
    }

    /// Close the innermost scope. Direct visibility is cleared on every
    /// symbol declared there. A package scope additionally records its
    /// exports on the package symbol and leaves the declarations use-visible
    /// in the enclosing scope; a block scope propagates its ordinal counter
    /// back so the subprogram frame stays dense.
    pub fn close_scope(&mut self, arena: &mut Arena) -> Vec<SymbolId> {
        let scope = self.scopes.pop().expect("scope underflow");
        for &id in &scope.order {
            arena.sym_mut(id).vis &= !VIS_DIRECT;
        }
        match scope.kind {
            ScopeKind::Package(pkg) => {
                for &id in &scope.order {
                    arena.sym_mut(id).vis |= VIS_USE;
                }
                arena.sym_mut(pkg).exports = scope.order.clone();
                if let Some(parent) = self.scopes.last_mut() {
                    for (name, ids) in scope.names {
                        parent.names.entry(name).or_default().extend(ids);
                    }
                }
            }
            ScopeKind::Block => {
                if let Some(parent) = self.scopes.last_mut() {
                    if matches!(parent.kind, ScopeKind::Subprogram | ScopeKind::Block) {
                        parent.next_ordinal = parent.next_ordinal.max(scope.next_ordinal);
                    }
                }
            }
            _ => {}
        }
        scope.order
    }

    /// Largest ordinal handed out in the innermost scope so far.
    pub fn current_max_ordinal(&self) -> u32 {
        self.scopes.last().map(|s| s.next_ordinal).unwrap_or(1)
    }

    pub fn current_symbols(&self) -> &[SymbolId] {
        self.scopes.last().map(|s| s.order.as_slice()).unwrap_or(&[])
    }

    /// Innermost enclosing package scope, if any.
    pub fn enclosing_package(&self) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|s| match s.kind {
            ScopeKind::Package(p) => Some(p),
            _ => None,
        })
    }

    /// Install a symbol in the innermost scope, prepending to its overload
    /// chain and assigning the next elaboration ordinal.
    pub fn add(&mut self, arena: &mut Arena, id: SymbolId) {
        let depth = self.depth();
        let pkg = self.enclosing_package();
        let scope = self.scopes.last_mut().expect("no open scope");
        let ordinal = scope.next_ordinal;
        scope.next_ordinal += 1;
        let key = arena.sym(id).name.to_ascii_lowercase();
        let bucket = scope.names.entry(key).or_default();
        let prev = bucket.first().copied();
        bucket.insert(0, id);
        scope.order.push(id);
        let sym = arena.sym_mut(id);
        sym.scope_depth = depth;
        sym.ordinal = ordinal;
        sym.next_overload = prev;
        sym.vis |= VIS_DIRECT;
        if sym.parent_pkg.is_none() {
            sym.parent_pkg = pkg;
        }
    }

    /// Innermost directly-visible symbol; a direct symbol anywhere beats a
    /// use-visible one, and names compare case-insensitively.
    pub fn lookup(&self, arena: &Arena, name: &str) -> Option<SymbolId> {
        let key = name.to_ascii_lowercase();
        for scope in self.scopes.iter().rev() {
            if let Some(bucket) = scope.names.get(&key) {
                for &id in bucket {
                    if arena.sym(id).directly_visible() {
                        return Some(id);
                    }
                }
            }
        }
        for scope in self.scopes.iter().rev() {
            if let Some(bucket) = scope.names.get(&key) {
                for &id in bucket {
                    if arena.sym(id).use_visible() {
                        return Some(id);
                    }
                }
            }
        }
        None
    }

    /// All visible candidates for `name`, innermost scope first, chain order
    /// within a scope (newest declaration first).
    pub fn lookup_all(&self, arena: &Arena, name: &str) -> Vec<SymbolId> {
        let key = name.to_ascii_lowercase();
        let mut out = Vec::new();
        for scope in self.scopes.iter().rev() {
            if let Some(bucket) = scope.names.get(&key) {
                for &id in bucket {
                    let s = arena.sym(id);
                    if (s.directly_visible() || s.use_visible()) && !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }

    /// Best overload of `name` for a call with `arg_tys` and an optional
    /// expected result type. Scoring per candidate: +1000 for an exact arity
    /// match, plus the return-type compatibility score, plus per-parameter
    /// compatibility scores. Highest total wins; the first candidate in chain
    /// order wins ties.
    pub fn lookup_overload(
        &self,
        arena: &Arena,
        name: &str,
        arg_tys: &[Option<TypeId>],
        expected: Option<TypeId>,
    ) -> Option<SymbolId> {
        let candidates = self.lookup_all(arena, name);
        best_overload(arena, &candidates, arg_tys, expected)
    }

    /// Re-export a package's direct declarations into the current scope with
    /// the use-visible bit set. A visited bitmap gates the walk so a package
    /// used twice (or re-exported through a rename chain) is processed once.
    pub fn make_use_visible(&mut self, arena: &mut Arena, pkg: SymbolId) {
        let mut visited = Visited::new();
        self.use_visible_inner(arena, pkg, &mut visited);
    }

    fn use_visible_inner(&mut self, arena: &mut Arena, pkg: SymbolId, visited: &mut Visited) {
        if !visited.insert(pkg.index()) {
            return;
        }
        let target = match arena.sym(pkg).renamed {
            Some(r) => r,
            None => pkg,
        };
        if target != pkg {
            self.use_visible_inner(arena, target, visited);
            return;
        }
        let exports = arena.sym(pkg).exports.clone();
        for id in exports {
            if !visited.insert(id.index()) {
                continue;
            }
            arena.sym_mut(id).vis |= VIS_USE;
            let key = arena.sym(id).name.to_ascii_lowercase();
            let scope = self.scopes.last_mut().expect("no open scope");
            let bucket = scope.names.entry(key).or_default();
            if !bucket.contains(&id) {
                bucket.push(id);
            }
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Overload scoring over an explicit candidate list (also used for selected
/// names, where candidates come from a package's export list).
pub fn best_overload(
    arena: &Arena,
    candidates: &[SymbolId],
    arg_tys: &[Option<TypeId>],
    expected: Option<TypeId>,
) -> Option<SymbolId> {
    use crate::types::conversion_score;
    let argc = arg_tys.len();
    let mut best: Option<(i32, SymbolId)> = None;
    for &id in candidates {
        let sym = arena.sym(id);
        let mut score = 0i32;
        match sym.kind {
            SymKind::Procedure | SymKind::Function => {
                let max_args = sym.params.len();
                let min_args = sym
                    .params
                    .iter()
                    .filter(|&&p| !param_has_default(arena, p))
                    .count();
                if argc == max_args {
                    score += 1000;
                } else if argc >= min_args && argc < max_args {
                    score += 500;
                } else {
                    continue;
                }
                if let (Some(expected), Some(ret)) = (expected, sym.ty) {
                    score += conversion_score(arena, ret, expected);
                }
                for (i, &p) in sym.params.iter().enumerate().take(argc) {
                    if let (Some(at), Some(pt)) = (arg_tys[i], arena.sym(p).ty) {
                        let s = conversion_score(arena, at, pt);
                        if s == 0 {
                            score -= 2000;
                        }
                        score += s;
                    }
                }
            }
            SymKind::Constant if argc == 0 => {
                // Enumeration literal or named constant in call position.
                score += 1000;
                if let (Some(expected), Some(t)) = (expected, sym.ty) {
                    score += conversion_score(arena, t, expected);
                }
            }
            _ => continue,
        }
        match best {
            Some((b, _)) if b >= score => {}
            _ => best = Some((score, id)),
        }
    }
    best.map(|(_, id)| id)
}

fn param_has_default(arena: &Arena, p: SymbolId) -> bool {
    use crate::ast::NodeKind;
    match arena.sym(p).decl {
        Some(n) => matches!(
            &arena.node(n).kind,
            NodeKind::ParamSpec { default: Some(_), .. }
        ),
        None => false,
    }
}

/// 64-bit FNV-1a, the hash behind symbol uids and mangled-name components.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(0x1_0000_0000_01b3);
    }
    h
}

/// Upper-case an Ada name and encode every non-alphanumeric byte as `_HH`.
pub fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.to_ascii_uppercase().bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' {
            out.push(b as char);
        } else {
            out.push('_');
            out.push_str(&format!("{:02X}", b));
        }
    }
    out
}

fn type_tag(arena: &Arena, t: Option<TypeId>) -> String {
    match t {
        Some(t) => arena.ty(t).name.to_ascii_lowercase(),
        None => "void".to_string(),
    }
}

/// A symbol's link-level name:
/// `<PARENT>_S<scope>E<ordinal>__<NAME>.<argc>.<sig>.<uid>.<params>`.
/// A `pragma Import` external name overrides the scheme unchanged.
pub fn external_name(arena: &Arena, id: SymbolId) -> String {
    let sym = arena.sym(id);
    if let Some(ext) = &sym.external_name {
        return ext.clone();
    }
    let parent = sym
        .parent_pkg
        .map(|p| encode_name(&arena.sym(p).name))
        .unwrap_or_default();
    let mut sig = String::new();
    for &p in &sym.params {
        sig.push_str(&type_tag(arena, arena.sym(p).ty));
        sig.push(',');
    }
    sig.push_str(&type_tag(arena, sym.ty));
    let sig_hash = fnv1a(sig.as_bytes()) & 0xffff_ffff;
    let mut pnames = String::new();
    for &p in &sym.params {
        pnames.push_str(&arena.sym(p).name.to_ascii_lowercase());
        pnames.push(',');
    }
    let param_hash = fnv1a(pnames.as_bytes()) & 0xffff_ffff;
    format!(
        "{}_S{}E{}__{}.{}.{:x}.{:x}.{:x}",
        parent,
        sym.scope_depth,
        sym.ordinal,
        encode_name(&sym.name),
        sym.params.len(),
        sig_hash,
        sym.uid & 0xffff_ffff,
        param_hash
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn add_sym(arena: &mut Arena, table: &mut SymbolTable, name: &str, kind: SymKind) -> SymbolId {
        let id = arena.alloc_symbol(Symbol::new(name, kind));
        table.add(arena, id);
        id
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let x = add_sym(&mut arena, &mut table, "Counter", SymKind::Object);
        assert_eq!(table.lookup(&arena, "COUNTER"), Some(x));
        assert_eq!(table.lookup(&arena, "counter"), Some(x));
        assert_eq!(table.lookup(&arena, "other"), None);
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let outer = add_sym(&mut arena, &mut table, "x", SymKind::Object);
        table.open_scope(ScopeKind::Subprogram);
        let inner = add_sym(&mut arena, &mut table, "X", SymKind::Object);
        assert_eq!(table.lookup(&arena, "x"), Some(inner));
        table.close_scope(&mut arena);
        assert_eq!(table.lookup(&arena, "x"), Some(outer));
    }

    #[test]
    fn test_ordinals_dense_within_scope() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        table.open_scope(ScopeKind::Subprogram);
        let a = add_sym(&mut arena, &mut table, "a", SymKind::Object);
        let b = add_sym(&mut arena, &mut table, "b", SymKind::Object);
        assert_eq!(arena.sym(a).ordinal, 1);
        assert_eq!(arena.sym(b).ordinal, 2);
        // Block scopes continue the subprogram's counter.
        table.open_scope(ScopeKind::Block);
        let c = add_sym(&mut arena, &mut table, "c", SymKind::Object);
        assert_eq!(arena.sym(c).ordinal, 3);
        table.close_scope(&mut arena);
        assert_eq!(table.current_max_ordinal(), 4);
    }

    #[test]
    fn test_package_close_leaves_use_visibility() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let pkg = arena.alloc_symbol(Symbol::new("p", SymKind::Package));
        table.add(&mut arena, pkg);
        table.open_scope(ScopeKind::Package(pkg));
        let member = add_sym(&mut arena, &mut table, "item", SymKind::Object);
        table.close_scope(&mut arena);
        assert!(!arena.sym(member).directly_visible());
        assert!(arena.sym(member).use_visible());
        assert_eq!(table.lookup(&arena, "item"), Some(member));
        assert_eq!(arena.sym(pkg).exports, vec![member]);
    }

    #[test]
    fn test_direct_beats_use_visible() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let pkg = arena.alloc_symbol(Symbol::new("p", SymKind::Package));
        table.add(&mut arena, pkg);
        table.open_scope(ScopeKind::Package(pkg));
        let hidden = add_sym(&mut arena, &mut table, "v", SymKind::Object);
        table.close_scope(&mut arena);
        let direct = add_sym(&mut arena, &mut table, "v", SymKind::Object);
        assert_eq!(table.lookup(&arena, "v"), Some(direct));
        assert!(arena.sym(hidden).use_visible());
    }

    #[test]
    fn test_overload_chain_is_newest_first() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let f1 = add_sym(&mut arena, &mut table, "f", SymKind::Function);
        let f2 = add_sym(&mut arena, &mut table, "f", SymKind::Function);
        assert_eq!(arena.sym(f2).next_overload, Some(f1));
        let all = table.lookup_all(&arena, "f");
        assert_eq!(all, vec![f2, f1]);
    }

    #[test]
    fn test_encode_name() {
        assert_eq!(encode_name("Swap"), "SWAP");
        assert_eq!(encode_name("+"), "_2B");
        assert_eq!(encode_name("P.Q"), "P_2EQ");
    }

    #[test]
    fn test_external_name_shape() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let p = add_sym(&mut arena, &mut table, "P", SymKind::Procedure);
        let name = external_name(&arena, p);
        assert!(name.starts_with("_S1E1__P."), "got {}", name);
        assert!(name.contains(".0."), "zero-arg marker missing in {}", name);
    }

    #[test]
    fn test_pragma_import_overrides_mangling() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let p = add_sym(&mut arena, &mut table, "puts", SymKind::Procedure);
        arena.sym_mut(p).external_name = Some("puts".to_string());
        assert_eq!(external_name(&arena, p), "puts");
    }
}
