//! Recursive-descent parser for AILANG surface syntax
//!
//! Produces a `Module` plus diagnostics. On a parse error the parser
//! records a `PAR_###` diagnostic and synchronizes to the next declaration
//! boundary, so a single bad declaration does not hide the rest of the
//! file. Blocks are desugared here: statement sequences become nested
//! `Let` expressions.

use crate::ast::*;
use crate::diagnostic::{Diagnostic, Phase};
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Parser state
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    /// Create a parser over a token stream (must end with `Eof`)
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Parse a complete module file
    pub fn parse(mut self) -> (Module, Vec<Diagnostic>) {
        let module = self.module();
        (module, self.diagnostics)
    }

    fn module(&mut self) -> Module {
        let start = self.peek_span();
        let (path, path_span) = if self.eat(&TokenKind::Module) {
            self.module_path()
        } else {
            self.error_here("PAR_010", "expected `module` declaration at start of file");
            (String::new(), start)
        };

        let mut imports = Vec::new();
        let mut decls = Vec::new();

        while !self.check(&TokenKind::Eof) {
            if self.eat(&TokenKind::Import) {
                if let Some(import) = self.import_decl() {
                    imports.push(import);
                }
            } else {
                let exported = self.eat(&TokenKind::Export);
                if self.eat(&TokenKind::Type) {
                    if let Some(decl) = self.type_decl(exported) {
                        decls.push(Decl::Type(decl));
                    } else {
                        self.synchronize();
                    }
                } else if self.eat(&TokenKind::Func) {
                    if let Some(decl) = self.func_decl(exported) {
                        decls.push(Decl::Func(decl));
                    } else {
                        self.synchronize();
                    }
                } else {
                    self.error_here(
                        "PAR_011",
                        format!("expected declaration, found {}", self.peek().kind.describe()),
                    );
                    self.synchronize();
                }
            }
        }

        Module {
            path,
            path_span,
            imports,
            decls,
        }
    }

    /// `a/b/c`; segments are lowercase identifiers separated by `/`
    fn module_path(&mut self) -> (String, Span) {
        let mut span = self.peek_span();
        let mut segments = Vec::new();
        loop {
            match self.ident() {
                Some(ident) => {
                    span = span.merge(ident.span);
                    segments.push(ident.name);
                }
                None => break,
            }
            if !self.eat(&TokenKind::Slash) {
                break;
            }
        }
        (segments.join("/"), span)
    }

    fn import_decl(&mut self) -> Option<ImportDecl> {
        let start = self.previous_span();
        let (module, path_span) = self.module_path();
        if module.is_empty() {
            self.error_here("PAR_012", "expected module path after `import`");
            self.synchronize();
            return None;
        }

        let mut symbols = Vec::new();
        let mut namespace = true;
        if self.eat(&TokenKind::LeftParen) {
            namespace = false;
            if !self.check(&TokenKind::RightParen) {
                loop {
                    match self.import_symbol() {
                        Some(sym) => symbols.push(sym),
                        None => break,
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::RightParen, "PAR_013", "expected `)` after import list")?;
        }

        Some(ImportDecl {
            module,
            symbols,
            namespace,
            span: start.merge(path_span).merge(self.previous_span()),
        })
    }

    /// Import selectors may name values (`println`) or constructors (`Some`)
    fn import_symbol(&mut self) -> Option<Ident> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Some(Ident { name, span })
            }
            TokenKind::UpperIdent(name) => {
                let span = self.advance().span;
                Some(Ident { name, span })
            }
            _ => {
                self.error_here("PAR_013", "expected symbol name in import list");
                None
            }
        }
    }

    fn type_decl(&mut self, exported: bool) -> Option<TypeDecl> {
        let start = self.previous_span();
        let name = self.upper_ident("PAR_020", "expected type name after `type`")?;

        let mut params = Vec::new();
        if self.eat(&TokenKind::LeftParen) {
            loop {
                let param = self.ident_expected("PAR_020", "expected type parameter name")?;
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RightParen, "PAR_020", "expected `)` after type parameters")?;
        }

        self.expect(&TokenKind::Equal, "PAR_021", "expected `=` in type declaration")?;

        let mut ctors = Vec::new();
        loop {
            let ctor = self.ctor_decl()?;
            ctors.push(ctor);
            if !self.eat(&TokenKind::Pipe) {
                break;
            }
        }

        Some(TypeDecl {
            name,
            params,
            ctors,
            exported,
            span: start.merge(self.previous_span()),
        })
    }

    fn ctor_decl(&mut self) -> Option<CtorDecl> {
        let name = self.upper_ident("PAR_022", "expected constructor name")?;
        let start = name.span;
        let mut fields = Vec::new();
        if self.eat(&TokenKind::LeftParen) {
            if !self.check(&TokenKind::RightParen) {
                loop {
                    fields.push(self.type_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::RightParen, "PAR_022", "expected `)` after constructor fields")?;
        }
        Some(CtorDecl {
            name,
            fields,
            span: start.merge(self.previous_span()),
        })
    }

    fn func_decl(&mut self, exported: bool) -> Option<FuncDecl> {
        let start = self.previous_span();
        let name = self.ident_expected("PAR_030", "expected function name after `func`")?;

        self.expect(&TokenKind::LeftParen, "PAR_030", "expected `(` after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let pname = self.ident_expected("PAR_031", "expected parameter name")?;
                self.expect(&TokenKind::Colon, "PAR_031", "expected `:` after parameter name")?;
                let ty = self.type_expr()?;
                params.push(Param { name: pname, ty });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen, "PAR_031", "expected `)` after parameters")?;
        self.expect(&TokenKind::Arrow, "PAR_032", "expected `->` before return type")?;
        let ret = self.type_expr()?;

        let effects = if self.eat(&TokenKind::Bang) {
            Some(self.effect_set()?)
        } else {
            None
        };

        let body = self.block()?;

        Some(FuncDecl {
            name,
            params,
            ret,
            effects,
            body,
            exported,
            span: start.merge(self.previous_span()),
        })
    }

    /// `{IO, FS}` after `!`
    fn effect_set(&mut self) -> Option<Vec<Ident>> {
        self.expect(&TokenKind::LeftBrace, "PAR_033", "expected `{` after `!`")?;
        let mut effects = Vec::new();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                let label = self.upper_ident("PAR_033", "expected effect label")?;
                effects.push(label);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace, "PAR_033", "expected `}` after effect labels")?;
        Some(effects)
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn type_expr(&mut self) -> Option<TypeExpr> {
        let start = self.peek_span();
        match self.peek().kind.clone() {
            TokenKind::LeftParen => {
                self.advance();
                if self.eat(&TokenKind::RightParen) {
                    // `()` or `() -> T`
                    return self.maybe_func_type(Vec::new(), start);
                }
                let mut items = vec![self.type_expr()?];
                while self.eat(&TokenKind::Comma) {
                    items.push(self.type_expr()?);
                }
                self.expect(&TokenKind::RightParen, "PAR_040", "expected `)` in type")?;
                if self.check(&TokenKind::Arrow) {
                    return self.maybe_func_type(items, start);
                }
                let span = start.merge(self.previous_span());
                if items.len() == 1 {
                    let mut only = items.pop().expect("one item");
                    only.span = span;
                    Some(only)
                } else {
                    Some(TypeExpr {
                        kind: TypeExprKind::Tuple(items),
                        span,
                    })
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let elem = self.type_expr()?;
                self.expect(&TokenKind::RightBracket, "PAR_040", "expected `]` in list type")?;
                Some(TypeExpr {
                    kind: TypeExprKind::List(Box::new(elem)),
                    span: start.merge(self.previous_span()),
                })
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut fields = Vec::new();
                if !self.check(&TokenKind::RightBrace) {
                    loop {
                        let field = self.ident_expected("PAR_041", "expected field name in record type")?;
                        self.expect(&TokenKind::Colon, "PAR_041", "expected `:` in record type")?;
                        let ty = self.type_expr()?;
                        fields.push((field, ty));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBrace, "PAR_041", "expected `}` in record type")?;
                Some(TypeExpr {
                    kind: TypeExprKind::Record(fields),
                    span: start.merge(self.previous_span()),
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                let kind = match name.as_str() {
                    "int" | "float" | "string" | "bool" => TypeExprKind::Name(name),
                    _ => TypeExprKind::Var(name),
                };
                Some(TypeExpr {
                    kind,
                    span: start,
                })
            }
            TokenKind::UpperIdent(name) => {
                self.advance();
                if self.eat(&TokenKind::LeftParen) {
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RightParen) {
                        loop {
                            args.push(self.type_expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RightParen, "PAR_040", "expected `)` in type application")?;
                    Some(TypeExpr {
                        kind: TypeExprKind::App(name, args),
                        span: start.merge(self.previous_span()),
                    })
                } else {
                    Some(TypeExpr {
                        kind: TypeExprKind::Name(name),
                        span: start,
                    })
                }
            }
            other => {
                self.error_here("PAR_040", format!("expected type, found {}", other.describe()));
                None
            }
        }
    }

    /// After a parenthesized group, `-> T ! {E}` makes it a function type
    fn maybe_func_type(&mut self, params: Vec<TypeExpr>, start: Span) -> Option<TypeExpr> {
        if self.eat(&TokenKind::Arrow) {
            let ret = self.type_expr()?;
            let effects = if self.eat(&TokenKind::Bang) {
                self.effect_set()?
                    .into_iter()
                    .map(|e| e.name)
                    .collect()
            } else {
                Vec::new()
            };
            Some(TypeExpr {
                kind: TypeExprKind::Func {
                    params,
                    ret: Box::new(ret),
                    effects,
                },
                span: start.merge(self.previous_span()),
            })
        } else if params.is_empty() {
            Some(TypeExpr {
                kind: TypeExprKind::Unit,
                span: start.merge(self.previous_span()),
            })
        } else {
            // Unreachable from type_expr, which checks for `->` first
            None
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// `{ stmt* tail }` desugared to nested lets
    fn block(&mut self) -> Option<Expr> {
        self.expect(&TokenKind::LeftBrace, "PAR_050", "expected `{` to open block")?;
        let expr = self.block_tail()?;
        self.expect(&TokenKind::RightBrace, "PAR_050", "expected `}` to close block")?;
        Some(expr)
    }

    fn block_tail(&mut self) -> Option<Expr> {
        if self.eat(&TokenKind::Let) {
            let start = self.previous_span();
            let name = self.ident_expected("PAR_051", "expected name after `let`")?;
            let ann = if self.eat(&TokenKind::Colon) {
                Some(self.type_expr()?)
            } else {
                None
            };
            self.expect(&TokenKind::Equal, "PAR_051", "expected `=` in let binding")?;
            let value = self.expr()?;
            self.expect(&TokenKind::Semicolon, "PAR_051", "expected `;` after let binding")?;
            let body = self.block_tail()?;
            let span = start.merge(body.span);
            return Some(Expr {
                kind: ExprKind::Let {
                    name,
                    ann,
                    value: Box::new(value),
                    body: Box::new(body),
                },
                span,
            });
        }

        let expr = self.expr()?;
        if self.eat(&TokenKind::Semicolon) {
            // Expression statement: sequence via a discarded binding
            let body = self.block_tail()?;
            let span = expr.span.merge(body.span);
            return Some(Expr {
                kind: ExprKind::Let {
                    name: Ident {
                        name: "_".to_string(),
                        span: expr.span,
                    },
                    ann: None,
                    value: Box::new(expr),
                    body: Box::new(body),
                },
                span,
            });
        }
        Some(expr)
    }

    /// Entry point for expression parsing
    pub fn expr(&mut self) -> Option<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Option<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokenKind::PipePipe) {
            let rhs = self.and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Some(lhs)
    }

    fn and_expr(&mut self) -> Option<Expr> {
        let mut lhs = self.equality()?;
        while self.eat(&TokenKind::AmpAmp) {
            let rhs = self.equality()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Some(lhs)
    }

    fn equality(&mut self) -> Option<Expr> {
        let mut lhs = self.comparison()?;
        loop {
            let op = if self.eat(&TokenKind::EqualEqual) {
                BinOp::Eq
            } else if self.eat(&TokenKind::BangEqual) {
                BinOp::Ne
            } else {
                break;
            };
            let rhs = self.comparison()?;
            lhs = binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn comparison(&mut self) -> Option<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = if self.eat(&TokenKind::Less) {
                BinOp::Lt
            } else if self.eat(&TokenKind::LessEqual) {
                BinOp::Le
            } else if self.eat(&TokenKind::Greater) {
                BinOp::Gt
            } else if self.eat(&TokenKind::GreaterEqual) {
                BinOp::Ge
            } else {
                break;
            };
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn additive(&mut self) -> Option<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat(&TokenKind::Plus) {
                BinOp::Add
            } else if self.eat(&TokenKind::Minus) {
                BinOp::Sub
            } else if self.eat(&TokenKind::PlusPlus) {
                BinOp::Concat
            } else {
                break;
            };
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn term(&mut self) -> Option<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat(&TokenKind::Star) {
                BinOp::Mul
            } else if self.eat(&TokenKind::Slash) {
                BinOp::Div
            } else {
                break;
            };
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<Expr> {
        let start = self.peek_span();
        if self.eat(&TokenKind::Minus) {
            let expr = self.unary()?;
            let span = start.merge(expr.span);
            return Some(Expr {
                kind: ExprKind::Unary {
                    op: UnOp::Neg,
                    expr: Box::new(expr),
                },
                span,
            });
        }
        if self.eat(&TokenKind::Bang) {
            let expr = self.unary()?;
            let span = start.merge(expr.span);
            return Some(Expr {
                kind: ExprKind::Unary {
                    op: UnOp::Not,
                    expr: Box::new(expr),
                },
                span,
            });
        }
        self.call_expr()
    }

    fn call_expr(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::LeftParen) {
                let mut args = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        args.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightParen, "PAR_052", "expected `)` after arguments")?;
                let span = expr.span.merge(self.previous_span());
                expr = match expr.kind {
                    // `Some(x)` is constructor application, not a call
                    ExprKind::Ctor { name, args: prev } if prev.is_empty() => Expr {
                        kind: ExprKind::Ctor { name, args },
                        span,
                    },
                    _ => Expr {
                        kind: ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        span,
                    },
                };
            } else if self.eat(&TokenKind::Dot) {
                let field = self.ident_expected("PAR_053", "expected field name after `.`")?;
                let span = expr.span.merge(field.span);
                expr = Expr {
                    kind: ExprKind::FieldAccess {
                        expr: Box::new(expr),
                        field,
                    },
                    span,
                };
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn primary(&mut self) -> Option<Expr> {
        let start = self.peek_span();
        match self.peek().kind.clone() {
            TokenKind::Int(n) => {
                self.advance();
                Some(expr(ExprKind::Int(n), start))
            }
            TokenKind::Float(f) => {
                self.advance();
                Some(expr(ExprKind::Float(f), start))
            }
            TokenKind::Str(s) => {
                self.advance();
                Some(expr(ExprKind::Str(s), start))
            }
            TokenKind::True => {
                self.advance();
                Some(expr(ExprKind::Bool(true), start))
            }
            TokenKind::False => {
                self.advance();
                Some(expr(ExprKind::Bool(false), start))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Some(expr(ExprKind::Var(name), start))
            }
            TokenKind::UpperIdent(name) => {
                let span = self.advance().span;
                Some(expr(
                    ExprKind::Ctor {
                        name: Ident { name, span },
                        args: Vec::new(),
                    },
                    start,
                ))
            }
            TokenKind::Backslash => self.lambda(),
            TokenKind::If => self.if_expr(),
            TokenKind::Match => self.match_expr(),
            TokenKind::Let => {
                // `let` outside a block tail: treat as a block tail here
                self.block_tail()
            }
            TokenKind::LeftParen => {
                self.advance();
                if self.eat(&TokenKind::RightParen) {
                    return Some(expr(ExprKind::Unit, start.merge(self.previous_span())));
                }
                let mut items = vec![self.expr()?];
                while self.eat(&TokenKind::Comma) {
                    items.push(self.expr()?);
                }
                self.expect(&TokenKind::RightParen, "PAR_054", "expected `)`")?;
                let span = start.merge(self.previous_span());
                if items.len() == 1 {
                    let mut only = items.pop().expect("one item");
                    only.span = span;
                    Some(only)
                } else {
                    Some(expr(ExprKind::Tuple(items), span))
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        items.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBracket, "PAR_055", "expected `]`")?;
                Some(expr(ExprKind::List(items), start.merge(self.previous_span())))
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut fields = Vec::new();
                if !self.check(&TokenKind::RightBrace) {
                    loop {
                        let name = self.ident_expected("PAR_056", "expected field name in record")?;
                        self.expect(&TokenKind::Colon, "PAR_056", "expected `:` in record field")?;
                        let value = self.expr()?;
                        fields.push((name, value));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBrace, "PAR_056", "expected `}` after record")?;
                Some(expr(
                    ExprKind::Record(fields),
                    start.merge(self.previous_span()),
                ))
            }
            other => {
                self.error_here(
                    "PAR_057",
                    format!("expected expression, found {}", other.describe()),
                );
                None
            }
        }
    }

    fn lambda(&mut self) -> Option<Expr> {
        let start = self.peek_span();
        self.advance(); // `\`
        let mut params = Vec::new();
        if self.eat(&TokenKind::LeftParen) {
            if !self.check(&TokenKind::RightParen) {
                loop {
                    params.push(self.ident_expected("PAR_058", "expected lambda parameter")?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::RightParen, "PAR_058", "expected `)` after lambda parameters")?;
        } else {
            params.push(self.ident_expected("PAR_058", "expected lambda parameter")?);
        }
        self.expect(&TokenKind::Dot, "PAR_058", "expected `.` after lambda parameters")?;
        let body = self.expr()?;
        let span = start.merge(body.span);
        Some(Expr {
            kind: ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        })
    }

    fn if_expr(&mut self) -> Option<Expr> {
        let start = self.peek_span();
        self.advance(); // `if`
        let cond = self.expr()?;
        self.expect(&TokenKind::Then, "PAR_059", "expected `then` in if expression")?;
        let then_branch = self.expr()?;
        self.expect(&TokenKind::Else, "PAR_059", "expected `else` in if expression")?;
        let else_branch = self.expr()?;
        let span = start.merge(else_branch.span);
        Some(Expr {
            kind: ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        })
    }

    fn match_expr(&mut self) -> Option<Expr> {
        let start = self.peek_span();
        self.advance(); // `match`
        let scrutinee = self.expr()?;
        self.expect(&TokenKind::LeftBrace, "PAR_060", "expected `{` after match scrutinee")?;

        let mut arms = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let arm_start = self.peek_span();
            let pattern = self.pattern()?;
            let guard = if self.eat(&TokenKind::If) {
                Some(self.expr()?)
            } else {
                None
            };
            self.expect(&TokenKind::FatArrow, "PAR_060", "expected `=>` in match arm")?;
            let body = self.expr()?;
            let span = arm_start.merge(body.span);
            arms.push(MatchArm {
                pattern,
                guard,
                body,
                span,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace, "PAR_060", "expected `}` after match arms")?;
        let span = start.merge(self.previous_span());
        Some(Expr {
            kind: ExprKind::Match {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            span,
        })
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn pattern(&mut self) -> Option<Pattern> {
        let start = self.peek_span();
        match self.peek().kind.clone() {
            TokenKind::Underscore => {
                self.advance();
                Some(pattern(PatternKind::Wildcard, start))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Some(pattern(PatternKind::Var(name), start))
            }
            TokenKind::Int(n) => {
                self.advance();
                Some(pattern(PatternKind::Int(n), start))
            }
            TokenKind::Minus => {
                self.advance();
                match self.peek().kind.clone() {
                    TokenKind::Int(n) => {
                        self.advance();
                        Some(pattern(PatternKind::Int(-n), start.merge(self.previous_span())))
                    }
                    TokenKind::Float(f) => {
                        self.advance();
                        Some(pattern(
                            PatternKind::Float(-f),
                            start.merge(self.previous_span()),
                        ))
                    }
                    other => {
                        self.error_here(
                            "PAR_061",
                            format!("expected numeric literal after `-`, found {}", other.describe()),
                        );
                        None
                    }
                }
            }
            TokenKind::Float(f) => {
                self.advance();
                Some(pattern(PatternKind::Float(f), start))
            }
            TokenKind::Str(s) => {
                self.advance();
                Some(pattern(PatternKind::Str(s), start))
            }
            TokenKind::True => {
                self.advance();
                Some(pattern(PatternKind::Bool(true), start))
            }
            TokenKind::False => {
                self.advance();
                Some(pattern(PatternKind::Bool(false), start))
            }
            TokenKind::LeftParen => {
                self.advance();
                if self.eat(&TokenKind::RightParen) {
                    return Some(pattern(PatternKind::Unit, start.merge(self.previous_span())));
                }
                let mut items = vec![self.pattern()?];
                while self.eat(&TokenKind::Comma) {
                    items.push(self.pattern()?);
                }
                self.expect(&TokenKind::RightParen, "PAR_061", "expected `)` in pattern")?;
                let span = start.merge(self.previous_span());
                if items.len() == 1 {
                    let mut only = items.pop().expect("one item");
                    only.span = span;
                    Some(only)
                } else {
                    Some(pattern(PatternKind::Tuple(items), span))
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut items = Vec::new();
                let mut rest = None;
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        if self.eat(&TokenKind::DotDotDot) {
                            let rest_span = self.previous_span();
                            rest = Some(Box::new(match self.peek().kind.clone() {
                                TokenKind::Ident(name) => {
                                    self.advance();
                                    pattern(PatternKind::Var(name), self.previous_span())
                                }
                                _ => pattern(PatternKind::Wildcard, rest_span),
                            }));
                            break;
                        }
                        items.push(self.pattern()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBracket, "PAR_062", "expected `]` in list pattern")?;
                Some(pattern(
                    PatternKind::List { items, rest },
                    start.merge(self.previous_span()),
                ))
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut fields = Vec::new();
                let mut rest = false;
                if !self.check(&TokenKind::RightBrace) {
                    loop {
                        if self.eat(&TokenKind::DotDotDot) {
                            rest = true;
                            break;
                        }
                        let name = self.ident_expected("PAR_063", "expected field name in record pattern")?;
                        let pat = if self.eat(&TokenKind::Colon) {
                            self.pattern()?
                        } else {
                            // Shorthand `{x}` binds the field to `x`
                            pattern(PatternKind::Var(name.name.clone()), name.span)
                        };
                        fields.push((name, pat));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBrace, "PAR_063", "expected `}` in record pattern")?;
                Some(pattern(
                    PatternKind::Record { fields, rest },
                    start.merge(self.previous_span()),
                ))
            }
            TokenKind::UpperIdent(name) => {
                let span = self.advance().span;
                let ident = Ident { name, span };
                let mut args = Vec::new();
                if self.eat(&TokenKind::LeftParen) {
                    if !self.check(&TokenKind::RightParen) {
                        loop {
                            args.push(self.pattern()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RightParen, "PAR_064", "expected `)` in constructor pattern")?;
                }
                Some(pattern(
                    PatternKind::Ctor { name: ident, args },
                    start.merge(self.previous_span()),
                ))
            }
            other => {
                self.error_here(
                    "PAR_061",
                    format!("expected pattern, found {}", other.describe()),
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    fn ident(&mut self) -> Option<Ident> {
        if let TokenKind::Ident(name) = self.peek().kind.clone() {
            let span = self.advance().span;
            Some(Ident { name, span })
        } else {
            None
        }
    }

    fn ident_expected(&mut self, code: &str, message: &str) -> Option<Ident> {
        match self.ident() {
            Some(ident) => Some(ident),
            None => {
                self.error_here(code, message);
                None
            }
        }
    }

    fn upper_ident(&mut self, code: &str, message: &str) -> Option<Ident> {
        if let TokenKind::UpperIdent(name) = self.peek().kind.clone() {
            let span = self.advance().span;
            Some(Ident { name, span })
        } else {
            self.error_here(code, message);
            None
        }
    }

    fn expect(&mut self, kind: &TokenKind, code: &str, message: &str) -> Option<()> {
        if self.eat(kind) {
            Some(())
        } else {
            self.error_here(code, message);
            None
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn peek_span(&self) -> Span {
        self.peek().span
    }

    fn previous_span(&self) -> Span {
        if self.current == 0 {
            self.peek_span()
        } else {
            self.tokens[self.current - 1].span
        }
    }

    fn advance(&mut self) -> &Token {
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn error_here(&mut self, code: &str, message: impl Into<String>) {
        let span = self.peek_span();
        self.diagnostics
            .push(Diagnostic::error(code, Phase::Parse, message).with_span(span));
    }

    /// Skip tokens until the next declaration boundary
    fn synchronize(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::Eof
                | TokenKind::Import
                | TokenKind::Export
                | TokenKind::Type
                | TokenKind::Func => break,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

fn expr(kind: ExprKind, span: Span) -> Expr {
    Expr { kind, span }
}

fn pattern(kind: PatternKind, span: Span) -> Pattern {
    Pattern { kind, span }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.merge(rhs.span);
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    }
}

/// Parse a full module from source text
pub fn parse_module(source: &str) -> (Module, Vec<Diagnostic>) {
    let (tokens, mut diags) = crate::lexer::Lexer::new(source).tokenize();
    let (module, parse_diags) = Parser::new(tokens).parse();
    diags.extend(parse_diags);
    (module, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> Module {
        let (module, diags) = parse_module(source);
        assert!(diags.is_empty(), "unexpected diagnostics: {:#?}", diags);
        module
    }

    #[test]
    fn test_module_header_and_import() {
        let m = parse_ok("module app/main\nimport std/io (println, print)\n");
        assert_eq!(m.path, "app/main");
        assert_eq!(m.imports.len(), 1);
        assert_eq!(m.imports[0].module, "std/io");
        assert_eq!(m.imports[0].symbols.len(), 2);
        assert!(!m.imports[0].namespace);
    }

    #[test]
    fn test_namespace_import_flagged() {
        let m = parse_ok("module m\nimport std/io\n");
        assert!(m.imports[0].namespace);
    }

    #[test]
    fn test_type_decl() {
        let m = parse_ok("module m\ntype Color = Red | Green | Blue\n");
        let Decl::Type(decl) = &m.decls[0] else {
            panic!("expected type decl");
        };
        assert_eq!(decl.name.name, "Color");
        assert_eq!(decl.ctors.len(), 3);
        assert!(decl.ctors.iter().all(|c| c.fields.is_empty()));
    }

    #[test]
    fn test_parameterized_type_decl() {
        let m = parse_ok("module m\nexport type Option(a) = None | Some(a)\n");
        let Decl::Type(decl) = &m.decls[0] else {
            panic!("expected type decl");
        };
        assert!(decl.exported);
        assert_eq!(decl.params.len(), 1);
        assert_eq!(decl.ctors[1].fields.len(), 1);
    }

    #[test]
    fn test_func_decl_with_effects() {
        let m = parse_ok(
            "module m\nexport func main() -> () ! {IO} {\n  println(\"hi\")\n}\n",
        );
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        assert!(f.exported);
        assert_eq!(f.effects.as_ref().unwrap()[0].name, "IO");
        assert!(matches!(f.ret.kind, TypeExprKind::Unit));
    }

    #[test]
    fn test_block_desugars_to_lets() {
        let m = parse_ok("module m\nfunc f(x: int) -> int {\n  let y = x + 1;\n  y * 2\n}\n");
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        let ExprKind::Let { name, body, .. } = &f.body.kind else {
            panic!("expected let, got {:?}", f.body.kind);
        };
        assert_eq!(name.name, "y");
        assert!(matches!(body.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_statement_sequencing() {
        let m = parse_ok(
            "module m\nfunc f() -> () ! {IO} {\n  println(\"a\");\n  println(\"b\")\n}\n",
        );
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        let ExprKind::Let { name, .. } = &f.body.kind else {
            panic!("expected sequencing let");
        };
        assert_eq!(name.name, "_");
    }

    #[test]
    fn test_match_with_guard() {
        let m = parse_ok(
            "module m\nfunc f(x: int) -> int {\n  match x { 0 => 0, n if n > 10 => 10, _ => x }\n}\n",
        );
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        let ExprKind::Match { arms, .. } = &f.body.kind else {
            panic!("expected match");
        };
        assert_eq!(arms.len(), 3);
        assert!(arms[1].guard.is_some());
    }

    #[test]
    fn test_ctor_application() {
        let m = parse_ok("module m\nfunc f(x: int) -> Option(int) {\n  Some(x)\n}\n");
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        let ExprKind::Ctor { name, args } = &f.body.kind else {
            panic!("expected ctor, got {:?}", f.body.kind);
        };
        assert_eq!(name.name, "Some");
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_list_pattern_with_rest() {
        let m = parse_ok(
            "module m\nfunc f(xs: [int]) -> int {\n  match xs { [] => 0, [x, ...rest] => x }\n}\n",
        );
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        let ExprKind::Match { arms, .. } = &f.body.kind else {
            panic!("expected match");
        };
        let PatternKind::List { items, rest } = &arms[1].pattern.kind else {
            panic!("expected list pattern");
        };
        assert_eq!(items.len(), 1);
        assert!(rest.is_some());
    }

    #[test]
    fn test_lambda_and_higher_order_type() {
        let m = parse_ok(
            "module m\nfunc apply(f: (int) -> int, x: int) -> int {\n  f(x)\n}\nfunc g() -> int {\n  apply(\\n. n + 1, 41)\n}\n",
        );
        assert_eq!(m.decls.len(), 2);
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        assert!(matches!(f.params[0].ty.kind, TypeExprKind::Func { .. }));
    }

    #[test]
    fn test_record_literal_and_access() {
        let m = parse_ok("module m\nfunc f() -> int {\n  let p = {x: 1, y: 2};\n  p.x\n}\n");
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        let ExprKind::Let { value, body, .. } = &f.body.kind else {
            panic!("expected let");
        };
        assert!(matches!(value.kind, ExprKind::Record(_)));
        assert!(matches!(body.kind, ExprKind::FieldAccess { .. }));
    }

    #[test]
    fn test_error_recovers_at_decl_boundary() {
        let (m, diags) = parse_module("module m\nfunc bad( -> int { 1 }\nfunc good() -> int { 2 }\n");
        assert!(!diags.is_empty());
        assert_eq!(m.decls.len(), 1);
    }

    #[test]
    fn test_operator_precedence() {
        let m = parse_ok("module m\nfunc f() -> bool {\n  1 + 2 * 3 == 7\n}\n");
        let Decl::Func(f) = &m.decls[0] else {
            panic!("expected func decl");
        };
        let ExprKind::Binary { op: BinOp::Eq, lhs, .. } = &f.body.kind else {
            panic!("expected ==");
        };
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinOp::Add, .. }));
    }
}
