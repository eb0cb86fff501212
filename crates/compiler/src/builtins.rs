//! Predefined environment: package STANDARD and the TEXT_IO intrinsics.
//!
//! STANDARD's types and exceptions are installed directly into the library
//! scope before any unit is resolved. TEXT_IO is installed on demand when a
//! `with TEXT_IO` finds no source on the include path; its subprograms carry
//! the `__text_io_*` runtime symbols as their external names, so calls lower
//! straight to the runtime ABI.

use crate::arena::{Arena, SymbolId, TypeId};
use crate::symbols::{ScopeKind, SymKind, Symbol, SymbolTable, fnv1a};
use crate::types::{TypeInfo, TypeKind};

/// Handles to the predefined types and exceptions every pass needs.
pub struct Standard {
    pub integer: TypeId,
    pub long_integer: TypeId,
    pub float: TypeId,
    pub long_float: TypeId,
    pub universal_float: TypeId,
    pub boolean: TypeId,
    pub character: TypeId,
    pub string: TypeId,
    pub natural: TypeId,
    pub positive: TypeId,
    pub duration: TypeId,
    pub constraint_error: SymbolId,
    pub program_error: SymbolId,
    pub storage_error: SymbolId,
    pub tasking_error: SymbolId,
}

fn install_type(
    arena: &mut Arena,
    table: &mut SymbolTable,
    name: &str,
    info: TypeInfo,
) -> TypeId {
    let id = arena.alloc_type(info);
    let mut sym = Symbol::new(name, SymKind::Type);
    sym.ty = Some(id);
    sym.uid = fnv1a(name.to_ascii_lowercase().as_bytes());
    let sid = arena.alloc_symbol(sym);
    table.add(arena, sid);
    id
}

fn install_exception(arena: &mut Arena, table: &mut SymbolTable, name: &str) -> SymbolId {
    let mut sym = Symbol::new(name, SymKind::Exception);
    sym.uid = fnv1a(name.as_bytes());
    let sid = arena.alloc_symbol(sym);
    table.add(arena, sid);
    sid
}

/// Install package STANDARD's declarations into the library scope.
pub fn install_standard(arena: &mut Arena, table: &mut SymbolTable) -> Standard {
    let mut int_info = TypeInfo::new(TypeKind::Integer, "integer");
    int_info.lo = i32::MIN as i64;
    int_info.hi = i32::MAX as i64;
    int_info.size = 8;
    int_info.align = 8;
    let integer = install_type(arena, table, "Integer", int_info);

    let mut long_info = TypeInfo::new(TypeKind::Integer, "long_integer");
    long_info.lo = i64::MIN;
    long_info.hi = i64::MAX;
    long_info.size = 8;
    long_info.align = 8;
    let long_integer = install_type(arena, table, "Long_Integer", long_info);

    let mut float_info = TypeInfo::new(TypeKind::Float, "float");
    float_info.digits = 6;
    float_info.size = 8;
    float_info.align = 8;
    let float = install_type(arena, table, "Float", float_info);

    let mut lf_info = TypeInfo::new(TypeKind::Float, "long_float");
    lf_info.digits = 15;
    lf_info.size = 8;
    lf_info.align = 8;
    let long_float = install_type(arena, table, "Long_Float", lf_info);

    let mut uf_info = TypeInfo::new(TypeKind::UniversalFloat, "universal_float");
    uf_info.digits = 15;
    uf_info.size = 8;
    uf_info.align = 8;
    let universal_float = arena.alloc_type(uf_info);

    let mut bool_info = TypeInfo::new(TypeKind::Bool, "boolean");
    bool_info.lo = 0;
    bool_info.hi = 1;
    bool_info.size = 1;
    bool_info.align = 1;
    let boolean = install_type(arena, table, "Boolean", bool_info);
    for (pos, lit) in ["False", "True"].iter().enumerate() {
        let mut sym = Symbol::new(*lit, SymKind::Constant);
        sym.ty = Some(boolean);
        sym.value = Some(pos as i64);
        sym.uid = fnv1a(lit.to_ascii_lowercase().as_bytes());
        let sid = arena.alloc_symbol(sym);
        table.add(arena, sid);
        arena.ty_mut(boolean).literals.push(sid);
    }

    let mut char_info = TypeInfo::new(TypeKind::Char, "character");
    char_info.lo = 0;
    char_info.hi = 127;
    char_info.size = 1;
    char_info.align = 1;
    let character = install_type(arena, table, "Character", char_info);

    let mut nat_info = TypeInfo::subtype_of(integer, arena.ty(integer), "natural");
    nat_info.lo = 0;
    let natural = install_type(arena, table, "Natural", nat_info);

    let mut pos_info = TypeInfo::subtype_of(integer, arena.ty(integer), "positive");
    pos_info.lo = 1;
    let positive = install_type(arena, table, "Positive", pos_info);

    let mut str_info = TypeInfo::new(TypeKind::Str, "string");
    str_info.elem = Some(character);
    str_info.index = Some(positive);
    str_info.size = 16;
    str_info.align = 8;
    let string = install_type(arena, table, "String", str_info);

    let mut dur_info = TypeInfo::new(TypeKind::Fixed, "duration");
    dur_info.delta = 0.001;
    dur_info.size = 8;
    dur_info.align = 8;
    let duration = install_type(arena, table, "Duration", dur_info);

    let constraint_error = install_exception(arena, table, "CONSTRAINT_ERROR");
    let program_error = install_exception(arena, table, "PROGRAM_ERROR");
    let storage_error = install_exception(arena, table, "STORAGE_ERROR");
    let tasking_error = install_exception(arena, table, "TASKING_ERROR");
    // NUMERIC_ERROR is a renaming of CONSTRAINT_ERROR in practice.
    let mut numeric = Symbol::new("NUMERIC_ERROR", SymKind::Exception);
    numeric.renamed = Some(constraint_error);
    numeric.uid = fnv1a(b"numeric_error");
    let numeric = arena.alloc_symbol(numeric);
    table.add(arena, numeric);

    Standard {
        integer,
        long_integer,
        float,
        long_float,
        universal_float,
        boolean,
        character,
        string,
        natural,
        positive,
        duration,
        constraint_error,
        program_error,
        storage_error,
        tasking_error,
    }
}

struct Intrinsic {
    name: &'static str,
    external: &'static str,
    /// Parameter types by index into a small palette; `None` ends the list.
    params: &'static [IntrinsicParam],
}

#[derive(Clone, Copy)]
enum IntrinsicParam {
    Int,
    Float,
    Char,
    Str,
    OutInt,
    OutStr,
}

/// TEXT_IO's visible subprograms and the runtime symbols they bind to.
/// The runtime entry points are variadic over the value kind, so every
/// overload of Put shares one external symbol.
const TEXT_IO_INTRINSICS: &[Intrinsic] = &[
    Intrinsic { name: "Put", external: "__text_io_put", params: &[IntrinsicParam::Int] },
    Intrinsic { name: "Put", external: "__text_io_put", params: &[IntrinsicParam::Float] },
    Intrinsic { name: "Put", external: "__text_io_put", params: &[IntrinsicParam::Char] },
    Intrinsic { name: "Put", external: "__text_io_put", params: &[IntrinsicParam::Str] },
    Intrinsic {
        name: "Put_Line",
        external: "__text_io_put_line",
        params: &[IntrinsicParam::Str],
    },
    Intrinsic { name: "New_Line", external: "__text_io_new_line", params: &[] },
    Intrinsic {
        name: "New_Line",
        external: "__text_io_new_line",
        params: &[IntrinsicParam::Int],
    },
    Intrinsic { name: "Get", external: "__text_io_get", params: &[IntrinsicParam::OutInt] },
    Intrinsic { name: "Get_Line", external: "__text_io_get", params: &[IntrinsicParam::OutStr] },
];

/// Install an intrinsic TEXT_IO package, used when no `text_io.ads` exists on
/// the include path. Returns the package symbol.
pub fn install_text_io(arena: &mut Arena, table: &mut SymbolTable, std: &Standard) -> SymbolId {
    let mut pkg = Symbol::new("TEXT_IO", SymKind::Package);
    pkg.uid = fnv1a(b"text_io");
    pkg.imported = true;
    let pkg = arena.alloc_symbol(pkg);
    table.add(arena, pkg);
    table.open_scope(ScopeKind::Package(pkg));
    for intrinsic in TEXT_IO_INTRINSICS {
        let mut sym = Symbol::new(intrinsic.name, SymKind::Procedure);
        sym.external_name = Some(intrinsic.external.to_string());
        sym.external_lang = Some("Intrinsic".to_string());
        sym.imported = true;
        sym.uid = fnv1a(format!("text_io.{}", intrinsic.name.to_ascii_lowercase()).as_bytes());
        for (i, p) in intrinsic.params.iter().enumerate() {
            let ty = match p {
                IntrinsicParam::Int | IntrinsicParam::OutInt => std.integer,
                IntrinsicParam::Float => std.float,
                IntrinsicParam::Char => std.character,
                IntrinsicParam::Str | IntrinsicParam::OutStr => std.string,
            };
            let mut param = Symbol::new(format!("item_{}", i), SymKind::Object);
            param.ty = Some(ty);
            let param = arena.alloc_symbol(param);
            sym.params.push(param);
        }
        let sid = arena.alloc_symbol(sym);
        table.add(arena, sid);
    }
    table.close_scope(arena);
    pkg
}

/// Whether a with'd unit name is satisfied by the intrinsic TEXT_IO package.
pub fn is_text_io_unit(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "text_io" || lower == "ada.text_io"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn test_standard_types_visible() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let std = install_standard(&mut arena, &mut table);
        let int_sym = table.lookup(&arena, "integer").expect("Integer missing");
        assert_eq!(arena.sym(int_sym).ty, Some(std.integer));
        assert!(table.lookup(&arena, "BOOLEAN").is_some());
        assert!(table.lookup(&arena, "Constraint_Error").is_some());
        assert_eq!(arena.ty(std.positive).lo, 1);
        assert_eq!(arena.ty(std.natural).base, Some(std.integer));
    }

    #[test]
    fn test_boolean_literals() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let std = install_standard(&mut arena, &mut table);
        let t = table.lookup(&arena, "true").expect("True missing");
        assert_eq!(arena.sym(t).value, Some(1));
        assert_eq!(arena.ty(std.boolean).literals.len(), 2);
    }

    #[test]
    fn test_text_io_intrinsics() {
        let mut arena = Arena::new();
        let mut table = SymbolTable::new();
        let std = install_standard(&mut arena, &mut table);
        let pkg = install_text_io(&mut arena, &mut table, &std);
        let exports = &arena.sym(pkg).exports;
        assert!(!exports.is_empty());
        // Put is visible after the package scope closed (use-visible).
        let put = table.lookup(&arena, "put").expect("Put missing");
        assert_eq!(
            arena.sym(put).external_name.as_deref(),
            Some("__text_io_put")
        );
        assert!(is_text_io_unit("TEXT_IO"));
        assert!(is_text_io_unit("Ada.Text_IO"));
        assert!(!is_text_io_unit("sequential_io"));
    }
}
