//! Type descriptors and compatibility rules.
//!
//! Every nominal type and every constrained subtype gets its own [`TypeInfo`]
//! record in the arena. Subtypes point at their base through `base`; derived
//! types at their parent through `parent`. Compatibility between two types is
//! decided by walking those links down to a semantic base, never by identity
//! alone, and overload candidates are ordered by the numeric score
//! [`conversion_score`] assigns to each argument.

use crate::arena::{Arena, SymbolId, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Integer,
    Unsigned,
    Float,
    UniversalFloat,
    Fixed,
    Enum,
    Char,
    Bool,
    Array,
    Record,
    Access,
    Str,
    FatPointer,
    Derived,
    Private,
}

impl TypeKind {
    pub fn is_discrete(self) -> bool {
        matches!(
            self,
            TypeKind::Integer | TypeKind::Unsigned | TypeKind::Enum | TypeKind::Char | TypeKind::Bool
        )
    }

    pub fn is_scalar(self) -> bool {
        self.is_discrete()
            || matches!(self, TypeKind::Float | TypeKind::UniversalFloat | TypeKind::Fixed)
    }

    pub fn is_composite(self) -> bool {
        matches!(self, TypeKind::Array | TypeKind::Record | TypeKind::Str)
    }
}

// Suppressed-check mask bits, set by pragma Suppress.
pub const CHECK_OVERFLOW: u32 = 1 << 0;
pub const CHECK_RANGE: u32 = 1 << 1;
pub const CHECK_INDEX: u32 = 1 << 2;
pub const CHECK_DISCRIMINANT: u32 = 1 << 3;
pub const CHECK_LENGTH: u32 = 1 << 4;
pub const CHECK_DIVISION: u32 = 1 << 5;
pub const CHECK_ELABORATION: u32 = 1 << 6;
pub const CHECK_ACCESS: u32 = 1 << 7;
pub const CHECK_STORAGE: u32 = 1 << 8;

/// Map a pragma Suppress argument to its mask bit.
pub fn check_bit(name: &str) -> Option<u32> {
    match name.to_ascii_lowercase().as_str() {
        "overflow_check" => Some(CHECK_OVERFLOW),
        "range_check" => Some(CHECK_RANGE),
        "index_check" => Some(CHECK_INDEX),
        "discriminant_check" => Some(CHECK_DISCRIMINANT),
        "length_check" => Some(CHECK_LENGTH),
        "division_check" => Some(CHECK_DIVISION),
        "elaboration_check" => Some(CHECK_ELABORATION),
        "access_check" => Some(CHECK_ACCESS),
        "storage_check" => Some(CHECK_STORAGE),
        _ => None,
    }
}

/// Type descriptor.
///
/// A constrained subtype copies `elem`/`index`/`components`/`discriminants`
/// from its base and narrows `lo`/`hi` (or `discr_values`). Freezing fills in
/// `size`/`align` and the implicit operators, and is monotonic: a frozen
/// descriptor never changes layout again.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub name: String,
    pub base: Option<TypeId>,
    pub parent: Option<TypeId>,
    pub elem: Option<TypeId>,
    pub index: Option<TypeId>,
    /// Static scalar bounds, or first-dimension array bounds.
    pub lo: i64,
    pub hi: i64,
    /// Float bounds when a real range constraint applies.
    pub flo: f64,
    pub fhi: f64,
    /// All array dimensions, first mirrored in `lo`/`hi`.
    pub dims: Vec<(i64, i64)>,
    pub digits: u32,
    pub delta: f64,
    pub components: Vec<SymbolId>,
    pub discriminants: Vec<SymbolId>,
    /// Per-subtype static discriminant constraints, aligned with `discriminants`.
    pub discr_values: Vec<Option<i64>>,
    /// Size in bytes once frozen.
    pub size: u32,
    pub align: u32,
    pub packed: bool,
    pub suppressed: u32,
    /// Implicit operators attached at first freeze (and inherited on derivation).
    pub ops: Vec<SymbolId>,
    pub frozen: bool,
    /// Reentry guard while a freeze is in progress.
    pub freezing: bool,
    pub literals: Vec<SymbolId>,
}

impl TypeInfo {
    pub fn new(kind: TypeKind, name: impl Into<String>) -> Self {
        TypeInfo {
            kind,
            name: name.into(),
            base: None,
            parent: None,
            elem: None,
            index: None,
            lo: 0,
            hi: 0,
            flo: 0.0,
            fhi: 0.0,
            dims: Vec::new(),
            digits: 0,
            delta: 0.0,
            components: Vec::new(),
            discriminants: Vec::new(),
            discr_values: Vec::new(),
            size: 0,
            align: 0,
            packed: false,
            suppressed: 0,
            ops: Vec::new(),
            frozen: false,
            freezing: false,
            literals: Vec::new(),
        }
    }

    /// Fresh constrained subtype over `base`, copying the structural links.
    pub fn subtype_of(base_id: TypeId, base: &TypeInfo, name: impl Into<String>) -> Self {
        let mut t = TypeInfo::new(base.kind, name);
        t.base = Some(base_id);
        t.elem = base.elem;
        t.index = base.index;
        t.lo = base.lo;
        t.hi = base.hi;
        t.flo = base.flo;
        t.fhi = base.fhi;
        t.dims = base.dims.clone();
        t.digits = base.digits;
        t.delta = base.delta;
        t.components = base.components.clone();
        t.discriminants = base.discriminants.clone();
        t.discr_values = base.discr_values.clone();
        t.packed = base.packed;
        t.suppressed = base.suppressed;
        t.literals = base.literals.clone();
        t
    }

    pub fn is_constrained_scalar(&self) -> bool {
        self.kind.is_scalar() && self.base.is_some()
    }
}

/// Strip subtype and derivation layers down to the root descriptor.
pub fn root_type(arena: &Arena, mut t: TypeId) -> TypeId {
    let mut hops = 0;
    loop {
        let info = arena.ty(t);
        let next = info.base.or(info.parent);
        match next {
            Some(n) if n != t && hops < 64 => {
                t = n;
                hops += 1;
            }
            _ => return t,
        }
    }
}

/// Semantic base used for compatibility: base/parent links are walked,
/// unsigned folds to integer, universal-float and fixed-point fold to float.
pub fn semantic_kind(arena: &Arena, t: TypeId) -> TypeKind {
    let root = root_type(arena, t);
    match arena.ty(root).kind {
        TypeKind::Unsigned => TypeKind::Integer,
        TypeKind::UniversalFloat | TypeKind::Fixed => TypeKind::Float,
        k => k,
    }
}

fn is_char_array(arena: &Arena, t: TypeId) -> bool {
    let root = root_type(arena, t);
    let info = arena.ty(root);
    if info.kind == TypeKind::Str {
        return true;
    }
    if info.kind != TypeKind::Array {
        return false;
    }
    info.elem
        .map(|e| matches!(semantic_kind(arena, e), TypeKind::Char))
        .unwrap_or(false)
}

/// Whether a value of `a` may appear where `b` is expected (or vice versa).
pub fn compatible(arena: &Arena, a: TypeId, b: TypeId) -> bool {
    compatible_depth(arena, a, b, 0)
}

fn compatible_depth(arena: &Arena, a: TypeId, b: TypeId, depth: u32) -> bool {
    if depth > 16 {
        return false;
    }
    if a == b {
        return true;
    }
    let ra = root_type(arena, a);
    let rb = root_type(arena, b);
    if ra == rb {
        return true;
    }
    let ka = semantic_kind(arena, a);
    let kb = semantic_kind(arena, b);
    match (ka, kb) {
        (TypeKind::Integer, TypeKind::Integer)
        | (TypeKind::Float, TypeKind::Float)
        | (TypeKind::Bool, TypeKind::Bool)
        | (TypeKind::Char, TypeKind::Char) => true,
        (TypeKind::Enum, TypeKind::Enum) => ra == rb,
        (TypeKind::Array, TypeKind::Array) => {
            let ia = arena.ty(ra);
            let ib = arena.ty(rb);
            match (ia.elem, ib.elem) {
                (Some(ea), Some(eb)) => compatible_depth(arena, ea, eb, depth + 1),
                _ => false,
            }
        }
        (TypeKind::Access, TypeKind::Access) => {
            let ia = arena.ty(ra);
            let ib = arena.ty(rb);
            match (ia.elem, ib.elem) {
                (Some(da), Some(db)) => compatible_depth(arena, da, db, depth + 1),
                // An untyped `null` carries an access type with no designated type.
                _ => true,
            }
        }
        (TypeKind::Str, _) if is_char_array(arena, b) => true,
        (_, TypeKind::Str) if is_char_array(arena, a) => true,
        (TypeKind::Record, TypeKind::Record) => ra == rb,
        _ => false,
    }
}

/// Numeric score ordering overload candidates: 1000 identical, 900 derived,
/// 800 based-on, 600 array-element, 500 access-designated, 0 incompatible.
pub fn conversion_score(arena: &Arena, from: TypeId, to: TypeId) -> i32 {
    if from == to {
        return 1000;
    }
    // Derived-type transitive compatibility.
    let mut t = from;
    let mut hops = 0;
    while let Some(p) = arena.ty(t).parent {
        if p == to {
            return 900;
        }
        t = p;
        hops += 1;
        if hops > 16 {
            break;
        }
    }
    let mut t = to;
    let mut hops = 0;
    while let Some(p) = arena.ty(t).parent {
        if p == from {
            return 900;
        }
        t = p;
        hops += 1;
        if hops > 16 {
            break;
        }
    }
    if root_type(arena, from) == root_type(arena, to) {
        return 800;
    }
    let kf = semantic_kind(arena, from);
    let kt = semantic_kind(arena, to);
    if kf == kt && matches!(kf, TypeKind::Integer | TypeKind::Float | TypeKind::Bool | TypeKind::Char)
    {
        return 800;
    }
    if (kf == TypeKind::Str && is_char_array(arena, to))
        || (kt == TypeKind::Str && is_char_array(arena, from))
    {
        return 600;
    }
    if kf == TypeKind::Array && kt == TypeKind::Array && compatible(arena, from, to) {
        return 600;
    }
    if kf == TypeKind::Access && kt == TypeKind::Access && compatible(arena, from, to) {
        return 500;
    }
    0
}

/// True when subtype `t` carries scalar bounds strictly narrower than its base.
pub fn narrower_than_base(arena: &Arena, t: TypeId) -> bool {
    let info = arena.ty(t);
    if !info.kind.is_discrete() {
        return false;
    }
    match info.base {
        Some(b) => {
            let base = arena.ty(root_type(arena, b));
            info.lo > base.lo || info.hi < base.hi
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn scalar(arena: &mut Arena, kind: TypeKind, name: &str, lo: i64, hi: i64) -> TypeId {
        let mut t = TypeInfo::new(kind, name);
        t.lo = lo;
        t.hi = hi;
        arena.alloc_type(t)
    }

    #[test]
    fn test_subtype_is_compatible_with_base() {
        let mut arena = Arena::new();
        let int = scalar(&mut arena, TypeKind::Integer, "integer", i64::MIN, i64::MAX);
        let mut sub = TypeInfo::subtype_of(int, arena.ty(int), "small");
        sub.lo = 1;
        sub.hi = 10;
        let small = arena.alloc_type(sub);
        assert!(compatible(&arena, small, int));
        assert!(compatible(&arena, int, small));
        assert_eq!(conversion_score(&arena, small, int), 800);
        assert_eq!(conversion_score(&arena, small, small), 1000);
    }

    #[test]
    fn test_distinct_enums_incompatible() {
        let mut arena = Arena::new();
        let a = scalar(&mut arena, TypeKind::Enum, "color", 0, 2);
        let b = scalar(&mut arena, TypeKind::Enum, "day", 0, 6);
        assert!(!compatible(&arena, a, b));
        assert_eq!(conversion_score(&arena, a, b), 0);
    }

    #[test]
    fn test_derived_scores_above_based() {
        let mut arena = Arena::new();
        let int = scalar(&mut arena, TypeKind::Integer, "integer", i64::MIN, i64::MAX);
        let mut d = TypeInfo::new(TypeKind::Derived, "counter");
        d.parent = Some(int);
        let derived = arena.alloc_type(d);
        assert_eq!(conversion_score(&arena, derived, int), 900);
        assert!(compatible(&arena, derived, int));
    }

    #[test]
    fn test_string_matches_char_array() {
        let mut arena = Arena::new();
        let ch = scalar(&mut arena, TypeKind::Char, "character", 0, 127);
        let mut s = TypeInfo::new(TypeKind::Str, "string");
        s.elem = Some(ch);
        let string = arena.alloc_type(s);
        let mut a = TypeInfo::new(TypeKind::Array, "name_t");
        a.elem = Some(ch);
        let arr = arena.alloc_type(a);
        assert!(compatible(&arena, string, arr));
        assert_eq!(conversion_score(&arena, string, arr), 600);
    }

    #[test]
    fn test_narrower_than_base() {
        let mut arena = Arena::new();
        let int = scalar(&mut arena, TypeKind::Integer, "integer", -2147483648, 2147483647);
        let mut sub = TypeInfo::subtype_of(int, arena.ty(int), "pct");
        sub.lo = 0;
        sub.hi = 100;
        let pct = arena.alloc_type(sub);
        assert!(narrower_than_base(&arena, pct));
        assert!(!narrower_than_base(&arena, int));
    }

    #[test]
    fn test_check_bits() {
        assert_eq!(check_bit("Range_Check"), Some(CHECK_RANGE));
        assert_eq!(check_bit("DIVISION_CHECK"), Some(CHECK_DIVISION));
        assert_eq!(check_bit("no_such_check"), None);
    }
}
