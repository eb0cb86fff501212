//! Recursive-descent parser for Ada 83.
//!
//! Builds arena-allocated AST nodes straight from the lexer's two-token
//! lookahead. Syntactic errors are immediately fatal and reported as
//! `file:line:col: expected ...` strings; lexical errors accumulated by the
//! lexer are surfaced when the compilation unit finishes parsing.
//!
//! Ambiguities Ada resolves semantically are kept syntactic here and
//! reinterpreted by the resolver: `Name(Args)` always parses as a call,
//! becoming an index, slice, or conversion later; a parenthesized constraint
//! parses as a discriminant constraint unless a range appears in it.

use crate::arena::{Arena, NodeId};
use crate::ast::{
    BinOp, GenericFormalKind, Loc, LoopScheme, Mode, Node, NodeKind, RenameKind, UnOp,
};
use crate::lexer::{Kw, Lexer, Token, TokenKind};

pub struct Parser<'a> {
    lexer: Lexer,
    arena: &'a mut Arena,
    file: String,
}

type PResult<T> = Result<T, String>;

impl<'a> Parser<'a> {
    pub fn new(source: &str, file: impl Into<String>, arena: &'a mut Arena) -> Self {
        Parser {
            lexer: Lexer::new(source),
            arena,
            file: file.into(),
        }
    }

    /// Lexical diagnostics collected while scanning (reported, not fatal).
    pub fn lex_errors(&self) -> &[String] {
        &self.lexer.errors
    }

    fn alloc(&mut self, kind: NodeKind, loc: Loc) -> NodeId {
        self.arena.alloc_node(Node::new(kind, loc))
    }

    fn loc(&mut self) -> Loc {
        self.lexer.peek().loc
    }

    fn fail<T>(&mut self, msg: impl std::fmt::Display) -> PResult<T> {
        let loc = self.loc();
        Err(format!("{}:{}: {}", self.file, loc, msg))
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.lexer.peek().kind.clone()
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        &self.lexer.peek().kind == kind
    }

    fn check_kw(&mut self, kw: Kw) -> bool {
        self.lexer.peek().is_kw(kw)
    }

    fn check2_kw(&mut self, kw: Kw) -> bool {
        self.lexer.peek2().is_kw(kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.lexer.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.check_kw(kw) {
            self.lexer.bump();
            true
        } else {
            false
        }
    }

    fn bump(&mut self) -> Token {
        self.lexer.bump()
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.lexer.bump())
        } else {
            let got = self.peek_kind();
            self.fail(format!("expected '{}', found '{}'", kind, got))
        }
    }

    fn expect_kw(&mut self, kw: Kw) -> PResult<Token> {
        if self.check_kw(kw) {
            Ok(self.lexer.bump())
        } else {
            let got = self.peek_kind();
            self.fail(format!("expected '{:?}', found '{}'", kw, got))
        }
    }

    fn expect_semi(&mut self) -> PResult<()> {
        self.expect(&TokenKind::Semi)?;
        Ok(())
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek_kind() {
            TokenKind::Ident(_) => match self.bump().kind {
                TokenKind::Ident(s) => Ok(s),
                _ => unreachable!(),
            },
            got => self.fail(format!("expected identifier, found '{}'", got)),
        }
    }

    /// A defining name: identifier or operator string (`function "+"`).
    fn expect_designator(&mut self) -> PResult<String> {
        match self.peek_kind() {
            TokenKind::Ident(_) | TokenKind::Str(_) => match self.bump().kind {
                TokenKind::Ident(s) | TokenKind::Str(s) => Ok(s),
                _ => unreachable!(),
            },
            got => self.fail(format!("expected designator, found '{}'", got)),
        }
    }

    /// Consume an optional closing designator after `end` (possibly dotted).
    fn skip_end_name(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Ident(_) | TokenKind::Str(_) | TokenKind::Dot => {
                    self.bump();
                }
                _ => break,
            }
        }
    }

    fn ident_list(&mut self) -> PResult<Vec<String>> {
        let mut names = vec![self.expect_ident()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_ident()?);
        }
        Ok(names)
    }

    /// A dotted name as a flat string (`Text_IO`, `P.Q.R`).
    fn dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_ident()?;
        while self.check(&TokenKind::Dot) {
            if matches!(self.lexer.peek2().kind, TokenKind::Ident(_)) {
                self.bump();
                name.push('.');
                name.push_str(&self.expect_ident()?);
            } else {
                break;
            }
        }
        Ok(name)
    }

    // ------------------------------------------------------------------
    // Compilation units
    // ------------------------------------------------------------------

    pub fn parse_compilation(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let mut context = Vec::new();
        let mut units = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.check_kw(Kw::With) {
                context.push(self.parse_with_clause()?);
            } else if self.check_kw(Kw::Use) {
                context.push(self.parse_use_clause()?);
            } else if self.check_kw(Kw::Pragma) {
                context.push(self.parse_pragma()?);
            } else if self.check_kw(Kw::Separate) {
                self.bump();
                self.expect(&TokenKind::LParen)?;
                let parent_loc = self.loc();
                let parent = self.dotted_name()?;
                self.expect(&TokenKind::RParen)?;
                let arg = self.alloc(NodeKind::Ident(parent), parent_loc);
                context.push(self.alloc(
                    NodeKind::Pragma {
                        name: "separate".to_string(),
                        args: vec![arg],
                    },
                    parent_loc,
                ));
            } else {
                units.push(self.parse_library_item()?);
            }
        }
        Ok(self.alloc(NodeKind::CompUnit { context, units }, loc))
    }

    fn parse_with_clause(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::With)?;
        let mut names = vec![self.dotted_name()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.dotted_name()?);
        }
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::WithClause { names }, loc))
    }

    fn parse_use_clause(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Use)?;
        let mut names = vec![self.parse_name()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.parse_name()?);
        }
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::UseClause { names }, loc))
    }

    fn parse_pragma(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Pragma)?;
        let name = self.expect_ident()?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                args.push(self.parse_assoc()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::Pragma { name, args }, loc))
    }

    fn parse_library_item(&mut self) -> PResult<NodeId> {
        if self.check_kw(Kw::Generic) {
            self.parse_generic_decl()
        } else if self.check_kw(Kw::Package) {
            self.parse_package()
        } else if self.check_kw(Kw::Procedure) || self.check_kw(Kw::Function) {
            self.parse_subprogram()
        } else if self.check_kw(Kw::Task) {
            self.parse_task()
        } else {
            let got = self.peek_kind();
            self.fail(format!("expected compilation unit, found '{}'", got))
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Parse declarative items until one of the terminating keywords.
    fn parse_decls(&mut self) -> PResult<Vec<NodeId>> {
        let mut decls = Vec::new();
        loop {
            if self.check_kw(Kw::Begin)
                || self.check_kw(Kw::End)
                || self.check_kw(Kw::Private)
                || self.check(&TokenKind::Eof)
            {
                return Ok(decls);
            }
            decls.push(self.parse_decl()?);
        }
    }

    fn parse_decl(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::Kw(Kw::Type) => self.parse_type_decl(),
            TokenKind::Kw(Kw::Subtype) => self.parse_subtype_decl(),
            TokenKind::Kw(Kw::Procedure) | TokenKind::Kw(Kw::Function) => self.parse_subprogram(),
            TokenKind::Kw(Kw::Package) => self.parse_package(),
            TokenKind::Kw(Kw::Task) => self.parse_task(),
            TokenKind::Kw(Kw::Generic) => self.parse_generic_decl(),
            TokenKind::Kw(Kw::Use) => self.parse_use_clause(),
            TokenKind::Kw(Kw::Pragma) => self.parse_pragma(),
            TokenKind::Kw(Kw::For) => {
                // Representation clause: parsed and ignored.
                while !self.check(&TokenKind::Semi) && !self.check(&TokenKind::Eof) {
                    self.bump();
                }
                self.expect_semi()?;
                Ok(self.alloc(
                    NodeKind::Pragma {
                        name: "representation_clause".to_string(),
                        args: Vec::new(),
                    },
                    loc,
                ))
            }
            TokenKind::Ident(_) => self.parse_object_like_decl(),
            got => self.fail(format!("expected declaration, found '{}'", got)),
        }
    }

    /// Declarations that start with an identifier list: objects, constants,
    /// named numbers, exceptions, and object/exception renamings.
    fn parse_object_like_decl(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let names = self.ident_list()?;
        self.expect(&TokenKind::Colon)?;

        if self.eat_kw(Kw::Exception) {
            if self.eat_kw(Kw::Renames) {
                let renamed = self.parse_name()?;
                self.expect_semi()?;
                return Ok(self.alloc(
                    NodeKind::RenamingDecl {
                        name: names[0].clone(),
                        kind: RenameKind::Exception,
                        renamed,
                        spec: None,
                    },
                    loc,
                ));
            }
            self.expect_semi()?;
            return Ok(self.alloc(NodeKind::ExceptionDecl { names }, loc));
        }

        let constant = self.eat_kw(Kw::Constant);
        if constant && self.check(&TokenKind::Assign) {
            // Named number: N : constant := expr;
            self.bump();
            let expr = self.parse_expr()?;
            self.expect_semi()?;
            return Ok(self.alloc(NodeKind::NumberDecl { names, expr }, loc));
        }

        let subtype = if self.check_kw(Kw::Array) {
            self.parse_array_def()?
        } else {
            self.parse_subtype_indication()?
        };

        if self.eat_kw(Kw::Renames) {
            let renamed = self.parse_name()?;
            self.expect_semi()?;
            return Ok(self.alloc(
                NodeKind::RenamingDecl {
                    name: names[0].clone(),
                    kind: RenameKind::Object,
                    renamed,
                    spec: Some(subtype),
                },
                loc,
            ));
        }

        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_semi()?;
        Ok(self.alloc(
            NodeKind::ObjectDecl {
                names,
                subtype,
                init,
                constant,
            },
            loc,
        ))
    }

    fn parse_type_decl(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Type)?;
        let name = self.expect_ident()?;

        let mut discriminants = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                discriminants.push(self.parse_discriminant_spec()?);
                if !self.eat(&TokenKind::Semi) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }

        if self.eat(&TokenKind::Semi) {
            // Incomplete type declaration.
            return Ok(self.alloc(
                NodeKind::TypeDecl {
                    name,
                    discriminants,
                    def: None,
                },
                loc,
            ));
        }

        self.expect_kw(Kw::Is)?;
        let def = self.parse_type_def()?;
        self.expect_semi()?;
        Ok(self.alloc(
            NodeKind::TypeDecl {
                name,
                discriminants,
                def: Some(def),
            },
            loc,
        ))
    }

    fn parse_discriminant_spec(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let names = self.ident_list()?;
        self.expect(&TokenKind::Colon)?;
        let subtype = self.parse_subtype_indication()?;
        let default = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(self.alloc(
            NodeKind::DiscriminantSpec {
                names,
                subtype,
                default,
            },
            loc,
        ))
    }

    fn parse_type_def(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::LParen => {
                self.bump();
                let mut literals = Vec::new();
                loop {
                    let lloc = self.loc();
                    match self.peek_kind() {
                        TokenKind::Ident(_) => {
                            let name = self.expect_ident()?;
                            literals.push(self.alloc(NodeKind::Ident(name), lloc));
                        }
                        TokenKind::Char(c) => {
                            self.bump();
                            literals.push(self.alloc(NodeKind::CharLit(c), lloc));
                        }
                        got => return self.fail(format!(
                            "expected enumeration literal, found '{}'",
                            got
                        )),
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen)?;
                Ok(self.alloc(NodeKind::EnumDef { literals }, loc))
            }
            TokenKind::Kw(Kw::Range) => {
                self.bump();
                let range = self.parse_range_expr()?;
                Ok(self.alloc(NodeKind::IntegerDef { range }, loc))
            }
            TokenKind::Kw(Kw::Digits) => {
                self.bump();
                let digits = self.parse_simple_expr()?;
                let range = if self.eat_kw(Kw::Range) {
                    Some(self.parse_range_expr()?)
                } else {
                    None
                };
                Ok(self.alloc(NodeKind::FloatDef { digits, range }, loc))
            }
            TokenKind::Kw(Kw::Delta) => {
                self.bump();
                let delta = self.parse_simple_expr()?;
                let range = if self.eat_kw(Kw::Range) {
                    Some(self.parse_range_expr()?)
                } else {
                    None
                };
                Ok(self.alloc(NodeKind::FixedDef { delta, range }, loc))
            }
            TokenKind::Kw(Kw::Array) => self.parse_array_def(),
            TokenKind::Kw(Kw::Record) => self.parse_record_def(),
            TokenKind::Kw(Kw::Access) => {
                self.bump();
                let designated = self.parse_subtype_indication()?;
                Ok(self.alloc(NodeKind::AccessDef { designated }, loc))
            }
            TokenKind::Kw(Kw::New) => {
                self.bump();
                let parent = self.parse_subtype_indication()?;
                Ok(self.alloc(NodeKind::DerivedDef { parent }, loc))
            }
            TokenKind::Kw(Kw::Limited) => {
                self.bump();
                self.expect_kw(Kw::Private)?;
                Ok(self.alloc(NodeKind::PrivateDef { limited: true }, loc))
            }
            TokenKind::Kw(Kw::Private) => {
                self.bump();
                Ok(self.alloc(NodeKind::PrivateDef { limited: false }, loc))
            }
            got => self.fail(format!("expected type definition, found '{}'", got)),
        }
    }

    fn parse_array_def(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Array)?;
        self.expect(&TokenKind::LParen)?;
        let mut indexes = Vec::new();
        let mut unconstrained = false;
        loop {
            let iloc = self.loc();
            // `Mark range <>` marks the array unconstrained.
            if matches!(self.peek_kind(), TokenKind::Ident(_)) && self.check2_kw(Kw::Range) {
                let mark = self.parse_name()?;
                self.expect_kw(Kw::Range)?;
                if self.eat(&TokenKind::Box) {
                    unconstrained = true;
                    indexes.push(mark);
                } else {
                    let range = self.parse_range_expr()?;
                    let constraint = self.alloc(NodeKind::RangeConstraint { range }, iloc);
                    indexes.push(self.alloc(
                        NodeKind::SubtypeInd {
                            mark,
                            constraint: Some(constraint),
                        },
                        iloc,
                    ));
                }
            } else {
                indexes.push(self.parse_discrete_range()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.expect_kw(Kw::Of)?;
        let elem = self.parse_subtype_indication()?;
        Ok(self.alloc(
            NodeKind::ArrayDef {
                indexes,
                unconstrained,
                elem,
            },
            loc,
        ))
    }

    fn parse_record_def(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Record)?;
        let (components, variant) = self.parse_component_list()?;
        self.expect_kw(Kw::End)?;
        self.expect_kw(Kw::Record)?;
        Ok(self.alloc(NodeKind::RecordDef { components, variant }, loc))
    }

    fn parse_component_list(&mut self) -> PResult<(Vec<NodeId>, Option<NodeId>)> {
        let mut components = Vec::new();
        let mut variant = None;
        loop {
            if self.check_kw(Kw::End) || self.check_kw(Kw::When) {
                break;
            }
            if self.eat_kw(Kw::Null) {
                self.expect_semi()?;
                continue;
            }
            if self.check_kw(Kw::Case) {
                variant = Some(self.parse_variant_part()?);
                break;
            }
            let loc = self.loc();
            let names = self.ident_list()?;
            self.expect(&TokenKind::Colon)?;
            let subtype = self.parse_subtype_indication()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect_semi()?;
            components.push(self.alloc(
                NodeKind::ComponentDecl { names, subtype, init },
                loc,
            ));
        }
        Ok((components, variant))
    }

    fn parse_variant_part(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Case)?;
        let discr = self.expect_ident()?;
        self.expect_kw(Kw::Is)?;
        let mut variants = Vec::new();
        while self.check_kw(Kw::When) {
            let vloc = self.loc();
            self.bump();
            let choices = self.parse_choice_list()?;
            self.expect(&TokenKind::Arrow)?;
            let (components, variant) = self.parse_component_list()?;
            variants.push(self.alloc(
                NodeKind::Variant {
                    choices,
                    components,
                    variant,
                },
                vloc,
            ));
        }
        self.expect_kw(Kw::End)?;
        self.expect_kw(Kw::Case)?;
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::VariantPart { discr, variants }, loc))
    }

    fn parse_subtype_decl(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Subtype)?;
        let name = self.expect_ident()?;
        self.expect_kw(Kw::Is)?;
        let indication = self.parse_subtype_indication()?;
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::SubtypeDecl { name, indication }, loc))
    }

    fn parse_subtype_indication(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let mark = self.parse_name_no_call()?;
        let constraint = if self.check_kw(Kw::Range) {
            self.bump();
            let range = self.parse_range_expr()?;
            Some(self.alloc(NodeKind::RangeConstraint { range }, loc))
        } else if self.check_kw(Kw::Digits) {
            self.bump();
            let digits = self.parse_simple_expr()?;
            let range = if self.eat_kw(Kw::Range) {
                Some(self.parse_range_expr()?)
            } else {
                None
            };
            Some(self.alloc(NodeKind::DigitsConstraint { digits, range }, loc))
        } else if self.check_kw(Kw::Delta) {
            self.bump();
            let delta = self.parse_simple_expr()?;
            let range = if self.eat_kw(Kw::Range) {
                Some(self.parse_range_expr()?)
            } else {
                None
            };
            Some(self.alloc(NodeKind::DeltaConstraint { delta, range }, loc))
        } else if self.check(&TokenKind::LParen) {
            self.bump();
            let mut items = Vec::new();
            let mut saw_range = false;
            loop {
                let item = self.parse_assoc()?;
                if matches!(self.arena.node(item).kind, NodeKind::Range { .. }) {
                    saw_range = true;
                }
                items.push(item);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
            if saw_range {
                Some(self.alloc(NodeKind::IndexConstraint { ranges: items }, loc))
            } else {
                Some(self.alloc(NodeKind::DiscriminantConstraint { assocs: items }, loc))
            }
        } else {
            None
        };
        Ok(self.alloc(NodeKind::SubtypeInd { mark, constraint }, loc))
    }

    // ------------------------------------------------------------------
    // Subprograms, packages, generics, tasks
    // ------------------------------------------------------------------

    fn parse_subprogram_spec(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let is_function = self.check_kw(Kw::Function);
        if is_function {
            self.expect_kw(Kw::Function)?;
        } else {
            self.expect_kw(Kw::Procedure)?;
        }
        let name = self.expect_designator()?;
        let mut params = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                params.push(self.parse_param_spec()?);
                if !self.eat(&TokenKind::Semi) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
        }
        let ret = if self.eat_kw(Kw::Return) {
            Some(self.parse_name_no_call()?)
        } else {
            None
        };
        Ok(self.alloc(
            NodeKind::SubprogSpec {
                name,
                is_function,
                params,
                ret,
            },
            loc,
        ))
    }

    fn parse_param_spec(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let names = self.ident_list()?;
        self.expect(&TokenKind::Colon)?;
        let mode = if self.eat_kw(Kw::In) {
            if self.eat_kw(Kw::Out) {
                Mode::InOut
            } else {
                Mode::In
            }
        } else if self.eat_kw(Kw::Out) {
            Mode::Out
        } else {
            Mode::In
        };
        let subtype = self.parse_subtype_indication()?;
        let default = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(self.alloc(
            NodeKind::ParamSpec {
                names,
                mode,
                subtype,
                default,
            },
            loc,
        ))
    }

    fn parse_subprogram(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let spec = self.parse_subprogram_spec()?;

        if self.eat(&TokenKind::Semi) {
            return Ok(self.alloc(NodeKind::SubprogDecl { spec }, loc));
        }

        if self.eat_kw(Kw::Renames) {
            let renamed = self.parse_name()?;
            self.expect_semi()?;
            let name = match &self.arena.node(spec).kind {
                NodeKind::SubprogSpec { name, .. } => name.clone(),
                _ => String::new(),
            };
            return Ok(self.alloc(
                NodeKind::RenamingDecl {
                    name,
                    kind: RenameKind::Subprogram,
                    renamed,
                    spec: Some(spec),
                },
                loc,
            ));
        }

        self.expect_kw(Kw::Is)?;

        if self.eat_kw(Kw::Separate) {
            self.expect_semi()?;
            return Ok(self.alloc(NodeKind::BodyStub { spec }, loc));
        }

        if self.eat_kw(Kw::New) {
            // Generic instantiation: procedure X is new Template (Actuals);
            let template = self.parse_name_no_call()?;
            let mut actuals = Vec::new();
            if self.eat(&TokenKind::LParen) {
                loop {
                    actuals.push(self.parse_assoc()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen)?;
            }
            self.expect_semi()?;
            let name = match &self.arena.node(spec).kind {
                NodeKind::SubprogSpec { name, .. } => name.clone(),
                _ => String::new(),
            };
            return Ok(self.alloc(
                NodeKind::GenericInst {
                    name,
                    template,
                    actuals,
                },
                loc,
            ));
        }

        let decls = self.parse_decls()?;
        self.expect_kw(Kw::Begin)?;
        let stmts = self.parse_stmts()?;
        let handlers = if self.eat_kw(Kw::Exception) {
            self.parse_handlers()?
        } else {
            Vec::new()
        };
        self.expect_kw(Kw::End)?;
        self.skip_end_name();
        self.expect_semi()?;
        Ok(self.alloc(
            NodeKind::SubprogBody {
                spec,
                decls,
                stmts,
                handlers,
            },
            loc,
        ))
    }

    fn parse_package(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Package)?;

        if self.eat_kw(Kw::Body) {
            let name = self.dotted_name()?;
            self.expect_kw(Kw::Is)?;
            if self.eat_kw(Kw::Separate) {
                self.expect_semi()?;
                let spec = self.alloc(
                    NodeKind::SubprogSpec {
                        name: name.clone(),
                        is_function: false,
                        params: Vec::new(),
                        ret: None,
                    },
                    loc,
                );
                return Ok(self.alloc(NodeKind::BodyStub { spec }, loc));
            }
            let decls = self.parse_decls()?;
            let (stmts, handlers) = if self.eat_kw(Kw::Begin) {
                let stmts = self.parse_stmts()?;
                let handlers = if self.eat_kw(Kw::Exception) {
                    self.parse_handlers()?
                } else {
                    Vec::new()
                };
                (stmts, handlers)
            } else {
                (Vec::new(), Vec::new())
            };
            self.expect_kw(Kw::End)?;
            self.skip_end_name();
            self.expect_semi()?;
            return Ok(self.alloc(
                NodeKind::PackageBody {
                    name,
                    decls,
                    stmts,
                    handlers,
                },
                loc,
            ));
        }

        let name = self.dotted_name()?;

        if self.eat_kw(Kw::Renames) {
            let renamed = self.parse_name()?;
            self.expect_semi()?;
            return Ok(self.alloc(
                NodeKind::RenamingDecl {
                    name,
                    kind: RenameKind::Package,
                    renamed,
                    spec: None,
                },
                loc,
            ));
        }

        self.expect_kw(Kw::Is)?;

        if self.eat_kw(Kw::New) {
            let template = self.parse_name_no_call()?;
            let mut actuals = Vec::new();
            if self.eat(&TokenKind::LParen) {
                loop {
                    actuals.push(self.parse_assoc()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen)?;
            }
            self.expect_semi()?;
            return Ok(self.alloc(
                NodeKind::GenericInst {
                    name,
                    template,
                    actuals,
                },
                loc,
            ));
        }

        let decls = self.parse_decls()?;
        let privates = if self.eat_kw(Kw::Private) {
            self.parse_decls()?
        } else {
            Vec::new()
        };
        self.expect_kw(Kw::End)?;
        self.skip_end_name();
        self.expect_semi()?;
        Ok(self.alloc(
            NodeKind::PackageSpec {
                name,
                decls,
                privates,
            },
            loc,
        ))
    }

    fn parse_generic_decl(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Generic)?;
        let mut formals = Vec::new();
        loop {
            if self.check_kw(Kw::Type) {
                formals.push(self.parse_generic_type_formal()?);
            } else if self.check_kw(Kw::With) {
                let floc = self.loc();
                self.bump();
                let spec = self.parse_subprogram_spec()?;
                let default_name = if self.eat_kw(Kw::Is) {
                    if self.eat(&TokenKind::Box) {
                        None
                    } else {
                        Some(self.parse_name_no_call()?)
                    }
                } else {
                    None
                };
                self.expect_semi()?;
                formals.push(self.alloc(
                    NodeKind::GenericSubpFormal { spec, default_name },
                    floc,
                ));
            } else if matches!(self.peek_kind(), TokenKind::Ident(_)) {
                let floc = self.loc();
                let names = self.ident_list()?;
                self.expect(&TokenKind::Colon)?;
                let mode = if self.eat_kw(Kw::In) {
                    if self.eat_kw(Kw::Out) {
                        Mode::InOut
                    } else {
                        Mode::In
                    }
                } else {
                    Mode::In
                };
                let subtype = self.parse_subtype_indication()?;
                let default = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect_semi()?;
                formals.push(self.alloc(
                    NodeKind::GenericObjectFormal {
                        names,
                        mode,
                        subtype,
                        default,
                    },
                    floc,
                ));
            } else {
                break;
            }
        }
        let unit = if self.check_kw(Kw::Package) {
            self.parse_package()?
        } else {
            let spec = self.parse_subprogram_spec()?;
            self.expect_semi()?;
            let sloc = self.arena.node(spec).loc;
            self.alloc(NodeKind::SubprogDecl { spec }, sloc)
        };
        Ok(self.alloc(NodeKind::GenericDecl { formals, unit }, loc))
    }

    fn parse_generic_type_formal(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Type)?;
        let name = self.expect_ident()?;
        self.expect_kw(Kw::Is)?;
        let kind = if self.eat(&TokenKind::LParen) {
            self.expect(&TokenKind::Box)?;
            self.expect(&TokenKind::RParen)?;
            GenericFormalKind::Discrete
        } else if self.eat_kw(Kw::Range) {
            self.expect(&TokenKind::Box)?;
            GenericFormalKind::Range
        } else if self.eat_kw(Kw::Digits) {
            self.expect(&TokenKind::Box)?;
            GenericFormalKind::Digits
        } else if self.eat_kw(Kw::Limited) {
            self.expect_kw(Kw::Private)?;
            GenericFormalKind::Private
        } else {
            self.expect_kw(Kw::Private)?;
            GenericFormalKind::Private
        };
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::GenericTypeFormal { name, kind }, loc))
    }

    fn parse_task(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Task)?;
        if self.eat_kw(Kw::Body) {
            let name = self.expect_ident()?;
            self.expect_kw(Kw::Is)?;
            let decls = self.parse_decls()?;
            self.expect_kw(Kw::Begin)?;
            let stmts = self.parse_stmts()?;
            if self.eat_kw(Kw::Exception) {
                self.parse_handlers()?;
            }
            self.expect_kw(Kw::End)?;
            self.skip_end_name();
            self.expect_semi()?;
            return Ok(self.alloc(NodeKind::TaskBody { name, decls, stmts }, loc));
        }
        self.eat_kw(Kw::Type);
        let name = self.expect_ident()?;
        if self.eat_kw(Kw::Is) {
            // Entry declarations are parsed and dropped.
            while !self.check_kw(Kw::End) && !self.check(&TokenKind::Eof) {
                self.bump();
            }
            self.expect_kw(Kw::End)?;
            self.skip_end_name();
        }
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::TaskDecl { name }, loc))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_stmts(&mut self) -> PResult<Vec<NodeId>> {
        let mut stmts = Vec::new();
        loop {
            if self.check_kw(Kw::End)
                || self.check_kw(Kw::Elsif)
                || self.check_kw(Kw::Else)
                || self.check_kw(Kw::When)
                || self.check_kw(Kw::Exception)
                || self.check(&TokenKind::Eof)
            {
                return Ok(stmts);
            }
            stmts.push(self.parse_stmt()?);
        }
    }

    fn parse_stmt(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::LLabel => {
                self.bump();
                let name = self.expect_ident()?;
                self.expect(&TokenKind::RLabel)?;
                Ok(self.alloc(NodeKind::Label { name }, loc))
            }
            TokenKind::Kw(Kw::Null) => {
                self.bump();
                self.expect_semi()?;
                Ok(self.alloc(NodeKind::NullStmt, loc))
            }
            TokenKind::Kw(Kw::If) => self.parse_if(),
            TokenKind::Kw(Kw::Case) => self.parse_case(),
            TokenKind::Kw(Kw::Loop) | TokenKind::Kw(Kw::While) | TokenKind::Kw(Kw::For) => {
                self.parse_loop(None)
            }
            TokenKind::Kw(Kw::Declare) | TokenKind::Kw(Kw::Begin) => self.parse_block(None),
            TokenKind::Kw(Kw::Exit) => {
                self.bump();
                let label = match self.peek_kind() {
                    TokenKind::Ident(_) => Some(self.expect_ident()?),
                    _ => None,
                };
                let cond = if self.eat_kw(Kw::When) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect_semi()?;
                Ok(self.alloc(NodeKind::Exit { label, cond }, loc))
            }
            TokenKind::Kw(Kw::Return) => {
                self.bump();
                let expr = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect_semi()?;
                Ok(self.alloc(NodeKind::Return { expr }, loc))
            }
            TokenKind::Kw(Kw::Goto) => {
                self.bump();
                let label = self.expect_ident()?;
                self.expect_semi()?;
                Ok(self.alloc(NodeKind::Goto { label }, loc))
            }
            TokenKind::Kw(Kw::Raise) => {
                self.bump();
                let name = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_name()?)
                };
                self.expect_semi()?;
                Ok(self.alloc(NodeKind::Raise { name }, loc))
            }
            TokenKind::Kw(Kw::Delay) => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect_semi()?;
                Ok(self.alloc(NodeKind::DelayStmt { expr }, loc))
            }
            TokenKind::Kw(Kw::Pragma) => self.parse_pragma(),
            TokenKind::Kw(Kw::Accept)
            | TokenKind::Kw(Kw::Select)
            | TokenKind::Kw(Kw::Abort)
            | TokenKind::Kw(Kw::Terminate) => {
                // Tasking statements reduce to no-ops.
                self.skip_tasking_stmt()?;
                Ok(self.alloc(NodeKind::NullStmt, loc))
            }
            TokenKind::Ident(_) => {
                // A label introduces a loop or block.
                if self.lexer.peek2().kind == TokenKind::Colon {
                    let label = self.expect_ident()?;
                    self.expect(&TokenKind::Colon)?;
                    if self.check_kw(Kw::Declare) || self.check_kw(Kw::Begin) {
                        return self.parse_block(Some(label));
                    }
                    return self.parse_loop(Some(label));
                }
                let target = self.parse_name()?;
                if self.eat(&TokenKind::Assign) {
                    let value = self.parse_expr()?;
                    self.expect_semi()?;
                    Ok(self.alloc(NodeKind::Assign { target, value }, loc))
                } else {
                    self.expect_semi()?;
                    Ok(self.alloc(NodeKind::CallStmt { call: target }, loc))
                }
            }
            got => self.fail(format!("expected statement, found '{}'", got)),
        }
    }

    /// Consume an accept/select/abort statement, balancing nested
    /// `do`/`select` ... `end` pairs.
    fn skip_tasking_stmt(&mut self) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Kw(Kw::Do) | TokenKind::Kw(Kw::Select) => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Kw(Kw::End) => {
                    self.bump();
                    self.skip_end_name();
                    if depth > 0 {
                        depth -= 1;
                    }
                    if depth == 0 {
                        if self.check(&TokenKind::Semi) {
                            self.bump();
                        }
                        return Ok(());
                    }
                }
                TokenKind::Semi if depth == 0 => {
                    self.bump();
                    return Ok(());
                }
                TokenKind::Eof => return self.fail("unterminated tasking statement"),
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_if(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::If)?;
        let node = self.parse_if_tail(loc)?;
        self.expect_kw(Kw::End)?;
        self.expect_kw(Kw::If)?;
        self.expect_semi()?;
        Ok(node)
    }

    fn parse_if_tail(&mut self, loc: Loc) -> PResult<NodeId> {
        let cond = self.parse_expr()?;
        self.expect_kw(Kw::Then)?;
        let then_stmts = self.parse_stmts()?;
        let else_stmts = if self.check_kw(Kw::Elsif) {
            let eloc = self.loc();
            self.bump();
            vec![self.parse_if_tail(eloc)?]
        } else if self.eat_kw(Kw::Else) {
            self.parse_stmts()?
        } else {
            Vec::new()
        };
        Ok(self.alloc(
            NodeKind::If {
                cond,
                then_stmts,
                else_stmts,
            },
            loc,
        ))
    }

    fn parse_case(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect_kw(Kw::Case)?;
        let selector = self.parse_expr()?;
        self.expect_kw(Kw::Is)?;
        let mut alts = Vec::new();
        while self.check_kw(Kw::When) {
            let aloc = self.loc();
            self.bump();
            let choices = self.parse_choice_list()?;
            self.expect(&TokenKind::Arrow)?;
            let stmts = self.parse_stmts()?;
            alts.push(self.alloc(NodeKind::CaseAlt { choices, stmts }, aloc));
        }
        self.expect_kw(Kw::End)?;
        self.expect_kw(Kw::Case)?;
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::CaseStmt { selector, alts }, loc))
    }

    fn parse_choice_list(&mut self) -> PResult<Vec<NodeId>> {
        let mut choices = Vec::new();
        loop {
            let loc = self.loc();
            if self.eat_kw(Kw::Others) {
                choices.push(self.alloc(NodeKind::OthersChoice, loc));
            } else {
                let expr = self.parse_simple_expr()?;
                if self.eat(&TokenKind::DotDot) {
                    let hi = self.parse_simple_expr()?;
                    choices.push(self.alloc(NodeKind::Range { lo: expr, hi }, loc));
                } else {
                    choices.push(expr);
                }
            }
            if !self.eat(&TokenKind::Bar) {
                break;
            }
        }
        Ok(choices)
    }

    fn parse_loop(&mut self, label: Option<String>) -> PResult<NodeId> {
        let loc = self.loc();
        let scheme = if self.eat_kw(Kw::While) {
            LoopScheme::While(self.parse_expr()?)
        } else if self.eat_kw(Kw::For) {
            let var = self.expect_ident()?;
            self.expect_kw(Kw::In)?;
            let reverse = self.eat_kw(Kw::Reverse);
            let range = self.parse_discrete_range()?;
            LoopScheme::For { var, reverse, range }
        } else {
            LoopScheme::Plain
        };
        self.expect_kw(Kw::Loop)?;
        let stmts = self.parse_stmts()?;
        self.expect_kw(Kw::End)?;
        self.expect_kw(Kw::Loop)?;
        self.skip_end_name();
        self.expect_semi()?;
        Ok(self.alloc(NodeKind::Loop { label, scheme, stmts }, loc))
    }

    fn parse_block(&mut self, label: Option<String>) -> PResult<NodeId> {
        let loc = self.loc();
        let decls = if self.eat_kw(Kw::Declare) {
            self.parse_decls()?
        } else {
            Vec::new()
        };
        self.expect_kw(Kw::Begin)?;
        let stmts = self.parse_stmts()?;
        let handlers = if self.eat_kw(Kw::Exception) {
            self.parse_handlers()?
        } else {
            Vec::new()
        };
        self.expect_kw(Kw::End)?;
        self.skip_end_name();
        self.expect_semi()?;
        Ok(self.alloc(
            NodeKind::Block {
                label,
                decls,
                stmts,
                handlers,
            },
            loc,
        ))
    }

    fn parse_handlers(&mut self) -> PResult<Vec<NodeId>> {
        let mut handlers = Vec::new();
        while self.check_kw(Kw::When) {
            let loc = self.loc();
            self.bump();
            let choices = self.parse_choice_list()?;
            self.expect(&TokenKind::Arrow)?;
            let stmts = self.parse_stmts()?;
            handlers.push(self.alloc(NodeKind::Handler { choices, stmts }, loc));
        }
        Ok(handlers)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let mut lhs = self.parse_relation()?;
        loop {
            let op = if self.check_kw(Kw::And) {
                self.bump();
                if self.eat_kw(Kw::Then) {
                    BinOp::AndThen
                } else {
                    BinOp::And
                }
            } else if self.check_kw(Kw::Or) {
                self.bump();
                if self.eat_kw(Kw::Else) {
                    BinOp::OrElse
                } else {
                    BinOp::Or
                }
            } else if self.check_kw(Kw::Xor) {
                self.bump();
                BinOp::Xor
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_relation()?;
            lhs = self.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
    }

    fn parse_relation(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let lhs = self.parse_simple_expr()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Kw(Kw::In) => {
                self.bump();
                let rhs = self.parse_membership_choice()?;
                return Ok(self.alloc(NodeKind::Binary { op: BinOp::In, lhs, rhs }, loc));
            }
            TokenKind::Kw(Kw::Not) if self.check2_kw(Kw::In) => {
                self.bump();
                self.bump();
                let rhs = self.parse_membership_choice()?;
                return Ok(self.alloc(
                    NodeKind::Binary {
                        op: BinOp::NotIn,
                        lhs,
                        rhs,
                    },
                    loc,
                ));
            }
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_simple_expr()?;
        Ok(self.alloc(NodeKind::Binary { op, lhs, rhs }, loc))
    }

    /// Right operand of `in` / `not in`: a range or a subtype mark.
    fn parse_membership_choice(&mut self) -> PResult<NodeId> {
        self.parse_discrete_range()
    }

    fn parse_simple_expr(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let unary = if self.eat(&TokenKind::Minus) {
            Some(UnOp::Minus)
        } else if self.eat(&TokenKind::Plus) {
            Some(UnOp::Plus)
        } else {
            None
        };
        let mut lhs = self.parse_term()?;
        if let Some(op) = unary {
            lhs = self.alloc(NodeKind::Unary { op, operand: lhs }, loc);
        }
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Amp => BinOp::Concat,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_term()?;
            lhs = self.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
    }

    fn parse_term(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Kw(Kw::Mod) => BinOp::Mod,
                TokenKind::Kw(Kw::Rem) => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_factor()?;
            lhs = self.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
    }

    fn parse_factor(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        if self.eat_kw(Kw::Abs) {
            let operand = self.parse_primary()?;
            return Ok(self.alloc(NodeKind::Unary { op: UnOp::Abs, operand }, loc));
        }
        if self.eat_kw(Kw::Not) {
            let operand = self.parse_primary()?;
            return Ok(self.alloc(NodeKind::Unary { op: UnOp::Not, operand }, loc));
        }
        let base = self.parse_primary()?;
        if self.eat(&TokenKind::StarStar) {
            let exp = self.parse_primary()?;
            return Ok(self.alloc(
                NodeKind::Binary {
                    op: BinOp::Pow,
                    lhs: base,
                    rhs: exp,
                },
                loc,
            ));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::Int(_) => match self.bump().kind {
                TokenKind::Int(v) => Ok(self.alloc(NodeKind::IntLit(v), loc)),
                _ => unreachable!(),
            },
            TokenKind::Real(_) => match self.bump().kind {
                TokenKind::Real(v) => Ok(self.alloc(NodeKind::RealLit(v), loc)),
                _ => unreachable!(),
            },
            TokenKind::Char(_) => match self.bump().kind {
                TokenKind::Char(c) => Ok(self.alloc(NodeKind::CharLit(c), loc)),
                _ => unreachable!(),
            },
            TokenKind::Str(_) => match self.bump().kind {
                TokenKind::Str(s) => {
                    let lit = self.alloc(NodeKind::StrLit(s), loc);
                    self.parse_name_suffix(lit)
                }
                _ => unreachable!(),
            },
            TokenKind::Kw(Kw::Null) => {
                self.bump();
                Ok(self.alloc(NodeKind::NullLit, loc))
            }
            TokenKind::Kw(Kw::New) => {
                self.bump();
                let subtype = self.parse_name()?;
                Ok(self.alloc(NodeKind::Allocator { subtype }, loc))
            }
            TokenKind::LParen => self.parse_paren_or_aggregate(),
            TokenKind::Ident(_) => self.parse_name(),
            got => self.fail(format!("expected expression, found '{}'", got)),
        }
    }

    /// `( ... )`: a parenthesized expression or an aggregate.
    fn parse_paren_or_aggregate(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        self.expect(&TokenKind::LParen)?;
        let mut items = Vec::new();
        let mut named = false;
        loop {
            let iloc = self.loc();
            if self.check_kw(Kw::Others) {
                self.bump();
                self.expect(&TokenKind::Arrow)?;
                let others = self.alloc(NodeKind::OthersChoice, iloc);
                let expr = self.parse_expr()?;
                items.push(self.alloc(
                    NodeKind::AggItem {
                        choices: vec![others],
                        expr,
                    },
                    iloc,
                ));
                named = true;
            } else {
                let first = self.parse_expr()?;
                if self.check(&TokenKind::DotDot)
                    || self.check(&TokenKind::Arrow)
                    || self.check(&TokenKind::Bar)
                {
                    let mut choices = Vec::new();
                    let mut choice = first;
                    loop {
                        if self.eat(&TokenKind::DotDot) {
                            let hi = self.parse_simple_expr()?;
                            choice = self.alloc(NodeKind::Range { lo: choice, hi }, iloc);
                        }
                        choices.push(choice);
                        if self.eat(&TokenKind::Bar) {
                            choice = self.parse_expr()?;
                        } else {
                            break;
                        }
                    }
                    self.expect(&TokenKind::Arrow)?;
                    let expr = self.parse_expr()?;
                    items.push(self.alloc(NodeKind::AggItem { choices, expr }, iloc));
                    named = true;
                } else {
                    items.push(self.alloc(
                        NodeKind::AggItem {
                            choices: Vec::new(),
                            expr: first,
                        },
                        iloc,
                    ));
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        if items.len() == 1 && !named {
            // Plain parenthesized expression.
            if let NodeKind::AggItem { expr, .. } = self.arena.node(items[0]).kind.clone() {
                return self.parse_name_suffix(expr);
            }
        }
        Ok(self.alloc(NodeKind::Aggregate { items }, loc))
    }

    /// A name with call/index suffixes allowed.
    pub fn parse_name(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let name = self.expect_designator()?;
        let base = self.alloc(NodeKind::Ident(name), loc);
        self.parse_name_suffix(base)
    }

    /// A name where a parenthesized suffix must not be consumed (type marks,
    /// instantiation templates).
    fn parse_name_no_call(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let name = self.expect_designator()?;
        let mut node = self.alloc(NodeKind::Ident(name), loc);
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    if matches!(self.lexer.peek2().kind, TokenKind::Ident(_) | TokenKind::Str(_)) {
                        self.bump();
                        let selector = self.expect_designator()?;
                        node = self.alloc(NodeKind::Selected { prefix: node, selector }, loc);
                    } else {
                        return Ok(node);
                    }
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_name_suffix(&mut self, mut node: NodeId) -> PResult<NodeId> {
        loop {
            let loc = self.loc();
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.bump();
                    if self.eat_kw(Kw::All) {
                        node = self.alloc(NodeKind::Deref { prefix: node }, loc);
                    } else {
                        let selector = self.expect_designator()?;
                        node = self.alloc(NodeKind::Selected { prefix: node, selector }, loc);
                    }
                }
                TokenKind::Tick => {
                    self.bump();
                    if self.check(&TokenKind::LParen) {
                        // Qualified expression: Mark'(expr) or Mark'(aggregate).
                        let expr = self.parse_paren_or_aggregate()?;
                        node = self.alloc(NodeKind::Qualified { mark: node, expr }, loc);
                    } else {
                        let name = match self.peek_kind() {
                            TokenKind::Ident(_) => self.expect_ident()?,
                            TokenKind::Kw(Kw::Range) => {
                                self.bump();
                                "range".to_string()
                            }
                            TokenKind::Kw(Kw::Digits) => {
                                self.bump();
                                "digits".to_string()
                            }
                            TokenKind::Kw(Kw::Delta) => {
                                self.bump();
                                "delta".to_string()
                            }
                            TokenKind::Kw(Kw::Access) => {
                                self.bump();
                                "access".to_string()
                            }
                            got => {
                                return self.fail(format!(
                                    "expected attribute name, found '{}'",
                                    got
                                ))
                            }
                        };
                        let mut args = Vec::new();
                        if self.check(&TokenKind::LParen) {
                            self.bump();
                            loop {
                                args.push(self.parse_expr()?);
                                if !self.eat(&TokenKind::Comma) {
                                    break;
                                }
                            }
                            self.expect(&TokenKind::RParen)?;
                        }
                        node = self.alloc(
                            NodeKind::Attr {
                                prefix: node,
                                name,
                                args,
                            },
                            loc,
                        );
                    }
                }
                TokenKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    loop {
                        args.push(self.parse_assoc()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    node = self.alloc(NodeKind::Call { callee: node, args }, loc);
                }
                _ => return Ok(node),
            }
        }
    }

    /// One association in a call, constraint, or instantiation:
    /// `[Formal =>] expr` where expr may be a discrete range.
    fn parse_assoc(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let formal = if matches!(self.peek_kind(), TokenKind::Ident(_))
            && self.lexer.peek2().kind == TokenKind::Arrow
        {
            let name = self.expect_ident()?;
            self.bump(); // =>
            Some(name)
        } else {
            None
        };
        let expr = self.parse_expr()?;
        let actual = if self.eat(&TokenKind::DotDot) {
            let hi = self.parse_simple_expr()?;
            self.alloc(NodeKind::Range { lo: expr, hi }, loc)
        } else {
            expr
        };
        if formal.is_some() {
            Ok(self.alloc(NodeKind::ParamAssoc { formal, actual }, loc))
        } else {
            Ok(actual)
        }
    }

    /// `expr .. expr` or a subtype mark (possibly `Mark'Range`).
    fn parse_discrete_range(&mut self) -> PResult<NodeId> {
        let loc = self.loc();
        let lo = self.parse_simple_expr()?;
        if self.eat(&TokenKind::DotDot) {
            let hi = self.parse_simple_expr()?;
            Ok(self.alloc(NodeKind::Range { lo, hi }, loc))
        } else {
            Ok(lo)
        }
    }

    /// A range after the `range` keyword: `lo .. hi` or `Name'Range`.
    fn parse_range_expr(&mut self) -> PResult<NodeId> {
        self.parse_discrete_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn parse(source: &str) -> (Arena, NodeId) {
        let mut arena = Arena::new();
        let root = {
            let mut parser = Parser::new(source, "test.adb", &mut arena);
            parser.parse_compilation().expect("parse failed")
        };
        (arena, root)
    }

    fn unit_of(arena: &Arena, root: NodeId) -> NodeId {
        match &arena.node(root).kind {
            NodeKind::CompUnit { units, .. } => units[0],
            other => panic!("not a compilation unit: {:?}", other),
        }
    }

    #[test]
    fn test_parse_null_procedure() {
        let (arena, root) = parse("procedure P is begin null; end P;");
        let unit = unit_of(&arena, root);
        match &arena.node(unit).kind {
            NodeKind::SubprogBody { spec, stmts, .. } => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(arena.node(stmts[0]).kind, NodeKind::NullStmt));
                match &arena.node(*spec).kind {
                    NodeKind::SubprogSpec { name, is_function, .. } => {
                        assert_eq!(name, "P");
                        assert!(!*is_function);
                    }
                    other => panic!("bad spec {:?}", other),
                }
            }
            other => panic!("expected body, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_object_with_range() {
        let (arena, root) = parse(
            "procedure P is X : Integer range 1..10 := 0; begin null; end;",
        );
        let unit = unit_of(&arena, root);
        let decls = match &arena.node(unit).kind {
            NodeKind::SubprogBody { decls, .. } => decls.clone(),
            other => panic!("{:?}", other),
        };
        match &arena.node(decls[0]).kind {
            NodeKind::ObjectDecl { names, init, constant, subtype } => {
                assert_eq!(names, &vec!["X".to_string()]);
                assert!(init.is_some());
                assert!(!*constant);
                match &arena.node(*subtype).kind {
                    NodeKind::SubtypeInd { constraint: Some(c), .. } => {
                        assert!(matches!(
                            arena.node(*c).kind,
                            NodeKind::RangeConstraint { .. }
                        ));
                    }
                    other => panic!("{:?}", other),
                }
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_operator_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let (arena, root) = parse("procedure P is X : Integer := 1 + 2 * 3; begin null; end;");
        let unit = unit_of(&arena, root);
        let decls = match &arena.node(unit).kind {
            NodeKind::SubprogBody { decls, .. } => decls.clone(),
            _ => panic!(),
        };
        let init = match &arena.node(decls[0]).kind {
            NodeKind::ObjectDecl { init: Some(i), .. } => *i,
            _ => panic!(),
        };
        match &arena.node(init).kind {
            NodeKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(
                    arena.node(*rhs).kind,
                    NodeKind::Binary { op: BinOp::Mul, .. }
                ));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_enum_type() {
        let (arena, root) = parse("procedure P is type E is (A, B, C); begin null; end;");
        let unit = unit_of(&arena, root);
        let decls = match &arena.node(unit).kind {
            NodeKind::SubprogBody { decls, .. } => decls.clone(),
            _ => panic!(),
        };
        match &arena.node(decls[0]).kind {
            NodeKind::TypeDecl { name, def: Some(d), .. } => {
                assert_eq!(name, "E");
                match &arena.node(*d).kind {
                    NodeKind::EnumDef { literals } => assert_eq!(literals.len(), 3),
                    other => panic!("{:?}", other),
                }
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_record_with_variant() {
        let src = "
procedure P is
  type Shape (Kind : Integer) is record
    Area : Integer;
    case Kind is
      when 1 => Radius : Integer;
      when others => Side : Integer;
    end case;
  end record;
begin null; end;";
        let (arena, root) = parse(src);
        let unit = unit_of(&arena, root);
        let decls = match &arena.node(unit).kind {
            NodeKind::SubprogBody { decls, .. } => decls.clone(),
            _ => panic!(),
        };
        match &arena.node(decls[0]).kind {
            NodeKind::TypeDecl { discriminants, def: Some(d), .. } => {
                assert_eq!(discriminants.len(), 1);
                match &arena.node(*d).kind {
                    NodeKind::RecordDef { components, variant } => {
                        assert_eq!(components.len(), 1);
                        assert!(variant.is_some());
                    }
                    other => panic!("{:?}", other),
                }
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_for_loop_and_call() {
        let (arena, root) =
            parse("procedure P is begin for I in 1..3 loop Put(I); end loop; end;");
        let unit = unit_of(&arena, root);
        let stmts = match &arena.node(unit).kind {
            NodeKind::SubprogBody { stmts, .. } => stmts.clone(),
            _ => panic!(),
        };
        match &arena.node(stmts[0]).kind {
            NodeKind::Loop { scheme: LoopScheme::For { var, reverse, .. }, stmts, .. } => {
                assert_eq!(var, "I");
                assert!(!*reverse);
                assert!(matches!(
                    arena.node(stmts[0]).kind,
                    NodeKind::CallStmt { .. }
                ));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_generic_and_instantiation() {
        let src = "
generic
  type T is private;
procedure Swap (A, B : in out T);
procedure Swap (A, B : in out T) is
  Tmp : T;
begin
  Tmp := A; A := B; B := Tmp;
end Swap;
procedure IS_Swap is new Swap (Integer);
";
        let (arena, root) = parse(src);
        match &arena.node(root).kind {
            NodeKind::CompUnit { units, .. } => {
                assert_eq!(units.len(), 3);
                assert!(matches!(
                    arena.node(units[0]).kind,
                    NodeKind::GenericDecl { .. }
                ));
                assert!(matches!(
                    arena.node(units[1]).kind,
                    NodeKind::SubprogBody { .. }
                ));
                match &arena.node(units[2]).kind {
                    NodeKind::GenericInst { name, actuals, .. } => {
                        assert_eq!(name, "IS_Swap");
                        assert_eq!(actuals.len(), 1);
                    }
                    other => panic!("{:?}", other),
                }
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_parse_package_with_context() {
        let src = "
with TEXT_IO; use TEXT_IO;
package Store is
  Capacity : constant := 100;
  procedure Push (V : Integer);
end Store;
";
        let (arena, root) = parse(src);
        match &arena.node(root).kind {
            NodeKind::CompUnit { context, units } => {
                assert_eq!(context.len(), 2);
                match &arena.node(units[0]).kind {
                    NodeKind::PackageSpec { name, decls, .. } => {
                        assert_eq!(name, "Store");
                        assert_eq!(decls.len(), 2);
                    }
                    other => panic!("{:?}", other),
                }
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_parse_aggregate_forms() {
        let (arena, root) = parse(
            "procedure P is A : V := (1, 2, others => 0); begin null; end;",
        );
        let unit = unit_of(&arena, root);
        let decls = match &arena.node(unit).kind {
            NodeKind::SubprogBody { decls, .. } => decls.clone(),
            _ => panic!(),
        };
        let init = match &arena.node(decls[0]).kind {
            NodeKind::ObjectDecl { init: Some(i), .. } => *i,
            _ => panic!(),
        };
        match &arena.node(init).kind {
            NodeKind::Aggregate { items } => assert_eq!(items.len(), 3),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_case_statement() {
        let src = "
procedure P is
begin
  case X is
    when 1 | 2 => null;
    when 3..5 => null;
    when others => null;
  end case;
end;";
        let (arena, root) = parse(src);
        let unit = unit_of(&arena, root);
        let stmts = match &arena.node(unit).kind {
            NodeKind::SubprogBody { stmts, .. } => stmts.clone(),
            _ => panic!(),
        };
        match &arena.node(stmts[0]).kind {
            NodeKind::CaseStmt { alts, .. } => {
                assert_eq!(alts.len(), 3);
                match &arena.node(alts[0]).kind {
                    NodeKind::CaseAlt { choices, .. } => assert_eq!(choices.len(), 2),
                    _ => panic!(),
                }
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_parse_exception_block() {
        let src = "
procedure P is
begin
  begin
    null;
  exception
    when Constraint_Error => null;
    when others => null;
  end;
end;";
        let (arena, root) = parse(src);
        let unit = unit_of(&arena, root);
        let stmts = match &arena.node(unit).kind {
            NodeKind::SubprogBody { stmts, .. } => stmts.clone(),
            _ => panic!(),
        };
        match &arena.node(stmts[0]).kind {
            NodeKind::Block { handlers, .. } => assert_eq!(handlers.len(), 2),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let mut arena = Arena::new();
        let mut parser = Parser::new("procedure is begin null; end;", "t.adb", &mut arena);
        let err = parser.parse_compilation().unwrap_err();
        assert!(err.contains("t.adb:1:"), "got {}", err);
        assert!(err.contains("expected"), "got {}", err);
    }

    #[test]
    fn test_parse_attribute_and_qualified() {
        let (arena, root) = parse(
            "procedure P is X : Integer := Integer'(3) + V'First; begin null; end;",
        );
        let unit = unit_of(&arena, root);
        let decls = match &arena.node(unit).kind {
            NodeKind::SubprogBody { decls, .. } => decls.clone(),
            _ => panic!(),
        };
        let init = match &arena.node(decls[0]).kind {
            NodeKind::ObjectDecl { init: Some(i), .. } => *i,
            _ => panic!(),
        };
        match &arena.node(init).kind {
            NodeKind::Binary { lhs, rhs, .. } => {
                assert!(matches!(arena.node(*lhs).kind, NodeKind::Qualified { .. }));
                assert!(matches!(arena.node(*rhs).kind, NodeKind::Attr { .. }));
            }
            other => panic!("{:?}", other),
        }
    }
}
