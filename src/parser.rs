use std::rc::Rc;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunDef, LoopControl, Module, Param, UnaryOp, Untyped},
    error::{CompileError, Result},
    token::{Location, Token, TokenKind},
    types::Ty,
};

/// Parses a token list (as produced by [`crate::lexer::lex`]) into an
/// untyped module. The first syntax error aborts the parse.
pub fn parse(tokens: &[Token]) -> Result<Module<Untyped>> {
    let mut parser = Parser { tokens, cursor: 0 };
    parser.parse_module()
}

/// Binary operator tiers, loosest binding first. All tiers are
/// left-associative; assignment is not an operator (it is handled in
/// factor position and is right-associative).
const TIER_COUNT: u8 = 6;

fn binary_op(kind: &TokenKind) -> Option<(u8, BinaryOp)> {
    use TokenKind::*;
    let tiered = match kind {
        Or => (0, BinaryOp::Or),
        And => (1, BinaryOp::And),
        EqEq => (2, BinaryOp::Eq),
        NotEq => (2, BinaryOp::NotEq),
        Less => (3, BinaryOp::Less),
        LessEq => (3, BinaryOp::LessEq),
        Greater => (3, BinaryOp::Greater),
        GreaterEq => (3, BinaryOp::GreaterEq),
        Plus => (4, BinaryOp::Add),
        Minus => (4, BinaryOp::Sub),
        Star => (5, BinaryOp::Mul),
        Slash => (5, BinaryOp::Div),
        Percent => (5, BinaryOp::Rem),
        _ => return None,
    };
    Some(tiered)
}

struct Parser<'tok> {
    tokens: &'tok [Token],
    cursor: usize,
}

impl Parser<'_> {
    fn parse_module(&mut self) -> Result<Module<Untyped>> {
        let mut funs = Vec::new();
        let exprs = self.parse_statements(TokenKind::Eof, Some(&mut funs))?;
        Ok(Module { funs, exprs })
    }

    /// Parses a `;`-separated statement sequence up to `until`.
    ///
    /// A `;` is optional after expressions that end in a block. A trailing
    /// `;` (or an empty sequence) appends an implicit unit literal, which is
    /// what makes trailing semicolons decide a block's type.
    fn parse_statements(
        &mut self,
        until: TokenKind,
        mut funs: Option<&mut Vec<FunDef<Untyped>>>,
    ) -> Result<Vec<Expr<Untyped>>> {
        let mut exprs = Vec::new();
        let mut trailing_semi = true;
        while self.peek().kind != until {
            if let Some(funs) = funs.as_deref_mut() {
                if self.peek().kind == TokenKind::Fun {
                    funs.push(self.parse_fun()?);
                    continue;
                }
            }
            let expr = if self.peek().kind == TokenKind::Var {
                self.parse_var()?
            } else {
                self.parse_expression(0)?
            };
            let ends_in_block = ends_in_block(&expr);
            exprs.push(expr);
            if self.take(&TokenKind::Semicolon) {
                trailing_semi = true;
                continue;
            }
            trailing_semi = false;
            if ends_in_block {
                continue;
            }
            if self.peek().kind != until {
                return Err(CompileError::Syntax {
                    loc: self.peek().loc,
                    message: format!("expected `;` but found {}", self.peek().kind.describe()),
                });
            }
        }
        if trailing_semi {
            exprs.push(Expr::unit(self.peek().loc));
        }
        Ok(exprs)
    }

    fn parse_fun(&mut self) -> Result<FunDef<Untyped>> {
        let loc = self.consume(&TokenKind::Fun)?.loc;
        let (name, _) = self.parse_ident()?;
        self.consume(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                let (name, loc) = self.parse_ident()?;
                self.consume(&TokenKind::Colon)?;
                let ty = self.parse_type()?;
                params.push(Param { name, ty, loc });
                if !self.take(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen)?;
        let ret = if self.take(&TokenKind::Colon) {
            self.parse_type()?
        } else {
            Ty::Unit
        };
        let body = self.parse_block()?;
        Ok(FunDef {
            name,
            params,
            ret,
            body,
            loc,
        })
    }

    fn parse_var(&mut self) -> Result<Expr<Untyped>> {
        let loc = self.consume(&TokenKind::Var)?.loc;
        let (name, _) = self.parse_ident()?;
        let annotation = if self.take(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.consume(&TokenKind::Assign)?;
        let value = self.parse_expression(0)?;
        Ok(Expr::new(
            ExprKind::VarDec {
                name,
                annotation,
                value: Box::new(value),
            },
            loc,
        ))
    }

    fn parse_type(&mut self) -> Result<Ty> {
        let (name, loc) = self.parse_ident()?;
        Ty::from_name(&name).ok_or_else(|| CompileError::Syntax {
            loc,
            message: format!("unknown type `{name}`"),
        })
    }

    /// Left-associative chains of operators of the given tier or tighter.
    fn parse_expression(&mut self, tier: u8) -> Result<Expr<Untyped>> {
        if tier == TIER_COUNT {
            return self.parse_factor();
        }
        let mut lhs = self.parse_expression(tier + 1)?;
        while let Some((op_tier, op)) = binary_op(&self.peek().kind) {
            if op_tier != tier {
                break;
            }
            self.advance();
            let rhs = self.parse_expression(tier + 1)?;
            let loc = lhs.loc;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                loc,
            );
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr<Untyped>> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression(0)?;
                self.consume(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Not => self.parse_unary(UnaryOp::Not),
            TokenKind::Minus => self.parse_unary(UnaryOp::Neg),
            TokenKind::Break => {
                self.advance();
                Ok(Expr::new(ExprKind::Loop(LoopControl::Break), token.loc))
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Expr::new(ExprKind::Loop(LoopControl::Continue), token.loc))
            }
            TokenKind::Return => self.parse_return(),
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(value), token.loc))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), token.loc))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), token.loc))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                let name: Rc<str> = name.into();
                match self.peek().kind {
                    TokenKind::LParen => self.parse_call(name, token.loc),
                    TokenKind::Assign => self.parse_assignment(name, token.loc),
                    _ => Ok(Expr::new(ExprKind::Id(name), token.loc)),
                }
            }
            TokenKind::Var => Err(CompileError::Syntax {
                loc: token.loc,
                message: "variable declaration is only allowed inside blocks".to_owned(),
            }),
            kind => Err(CompileError::Syntax {
                loc: token.loc,
                message: format!("unexpected {}", kind.describe()),
            }),
        }
    }

    fn parse_unary(&mut self, op: UnaryOp) -> Result<Expr<Untyped>> {
        let loc = self.advance().loc;
        let operand = self.parse_factor()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            loc,
        ))
    }

    /// `=` is right-associative: the value of `a = b = c` is `b = c`.
    fn parse_assignment(&mut self, target: Rc<str>, loc: Location) -> Result<Expr<Untyped>> {
        self.consume(&TokenKind::Assign)?;
        let value = self.parse_expression(0)?;
        Ok(Expr::new(
            ExprKind::Assign {
                target,
                value: Box::new(value),
            },
            loc,
        ))
    }

    fn parse_if(&mut self) -> Result<Expr<Untyped>> {
        let loc = self.consume(&TokenKind::If)?.loc;
        let cond = self.parse_expression(0)?;
        self.consume(&TokenKind::Then)?;
        let then_arm = self.parse_expression(0)?;
        let else_arm = if self.take(&TokenKind::Else) {
            Some(Box::new(self.parse_expression(0)?))
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_arm: Box::new(then_arm),
                else_arm,
            },
            loc,
        ))
    }

    fn parse_while(&mut self) -> Result<Expr<Untyped>> {
        let loc = self.consume(&TokenKind::While)?.loc;
        let cond = self.parse_expression(0)?;
        self.consume(&TokenKind::Do)?;
        let body = self.parse_block()?;
        Ok(Expr::new(
            ExprKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            loc,
        ))
    }

    fn parse_block(&mut self) -> Result<Expr<Untyped>> {
        let loc = self.consume(&TokenKind::LBrace)?.loc;
        let body = self.parse_statements(TokenKind::RBrace, None)?;
        self.consume(&TokenKind::RBrace)?;
        Ok(Expr::new(ExprKind::Block { body }, loc))
    }

    fn parse_return(&mut self) -> Result<Expr<Untyped>> {
        let loc = self.consume(&TokenKind::Return)?.loc;
        // A bare `return` returns unit.
        let value = match self.peek().kind {
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => Expr::unit(loc),
            _ => self.parse_expression(0)?,
        };
        Ok(Expr::new(
            ExprKind::Return {
                value: Box::new(value),
            },
            loc,
        ))
    }

    fn parse_call(&mut self, callee: Rc<str>, loc: Location) -> Result<Expr<Untyped>> {
        self.consume(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek().kind != TokenKind::RParen {
            loop {
                args.push(self.parse_expression(0)?);
                if !self.take(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen)?;
        Ok(Expr::new(ExprKind::Call { callee, args }, loc))
    }
}

/// Cursor helpers.
impl Parser<'_> {
    fn peek(&self) -> &Token {
        // The lexer always terminates the list with `Eof`.
        self.tokens
            .get(self.cursor)
            .unwrap_or_else(|| self.tokens.last().expect("token list may not be empty"))
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    /// Consumes the next token if it matches.
    fn take(&mut self, kind: &TokenKind) -> bool {
        if self.peek().kind == *kind {
            self.advance();
            return true;
        }
        false
    }

    fn consume(&mut self, kind: &TokenKind) -> Result<Token> {
        if self.peek().kind == *kind {
            return Ok(self.advance());
        }
        Err(CompileError::Syntax {
            loc: self.peek().loc,
            message: format!(
                "expected {} but found {}",
                kind.describe(),
                self.peek().kind.describe()
            ),
        })
    }

    fn parse_ident(&mut self) -> Result<(Rc<str>, Location)> {
        let token = self.peek().clone();
        if let TokenKind::Identifier(name) = token.kind {
            self.advance();
            return Ok((name.into(), token.loc));
        }
        Err(CompileError::Syntax {
            loc: token.loc,
            message: format!("expected an identifier but found {}", token.kind.describe()),
        })
    }
}

/// Whether a `;` may be omitted after the expression.
fn ends_in_block(expr: &Expr<Untyped>) -> bool {
    match &expr.kind {
        ExprKind::Block { .. } | ExprKind::While { .. } => true,
        ExprKind::If {
            then_arm, else_arm, ..
        } => match else_arm {
            Some(else_arm) => ends_in_block(else_arm),
            None => ends_in_block(then_arm),
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{lexer, util::fmt::print_module_string};

    #[track_caller]
    fn parse_tree(src: &str) -> String {
        let tokens = lexer::lex(src).expect("failed to lex");
        let module = parse(&tokens).expect("failed to parse");
        print_module_string(&module)
    }

    #[track_caller]
    fn parse_error(src: &str) -> String {
        let tokens = lexer::lex(src).expect("failed to lex");
        parse(&tokens).expect_err("expected a parse error").to_string()
    }

    #[test]
    fn precedence_is_left_associative() {
        assert_eq!(
            parse_tree("1 + 2 + 3"),
            indoc! {"
                binary +
                  binary +
                    int 1
                    int 2
                  int 3
            "}
        );
        assert_eq!(
            parse_tree("100 + 5 * 25"),
            indoc! {"
                binary +
                  int 100
                  binary *
                    int 5
                    int 25
            "}
        );
        assert_eq!(
            parse_tree("1 < 2 or 2 < 3 and not false"),
            indoc! {"
                binary or
                  binary <
                    int 1
                    int 2
                  binary and
                    binary <
                      int 2
                      int 3
                    unary not
                      bool false
            "}
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(
            parse_tree("(1 + 2) * 3"),
            indoc! {"
                binary *
                  binary +
                    int 1
                    int 2
                  int 3
            "}
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        assert_eq!(
            parse_tree("a = b = 1 + 2"),
            indoc! {"
                assign a
                  assign b
                    binary +
                      int 1
                      int 2
            "}
        );
    }

    #[test]
    fn if_with_and_without_else() {
        assert_eq!(
            parse_tree("if 10 < 12 then 1 else 0"),
            indoc! {"
                if
                  binary <
                    int 10
                    int 12
                  int 1
                  int 0
            "}
        );
        assert_eq!(
            parse_tree("if x then f(x)"),
            indoc! {"
                if
                  ident x
                  call f
                    ident x
            "}
        );
    }

    #[test]
    fn trailing_semicolon_appends_unit() {
        assert_eq!(
            parse_tree("{ 1; }"),
            indoc! {"
                block
                  int 1
                  unit
            "}
        );
        assert_eq!(
            parse_tree("{ 1 }"),
            indoc! {"
                block
                  int 1
            "}
        );
        assert_eq!(
            parse_tree("{}"),
            indoc! {"
                block
                  unit
            "}
        );
    }

    #[test]
    fn semicolon_optional_after_block_enders() {
        assert_eq!(
            parse_tree("{ while x do { f(x); } var y = 1; y }"),
            indoc! {"
                block
                  while
                    ident x
                    block
                      call f
                        ident x
                      unit
                  var y
                    int 1
                  ident y
            "}
        );
    }

    #[test]
    fn missing_semicolon_is_fatal() {
        assert_eq!(parse_error("{ 1 2 }"), "(1, 5): expected `;` but found integer `2`");
    }

    #[test]
    fn var_with_annotation() {
        assert_eq!(
            parse_tree("var x: Int = 5;"),
            indoc! {"
                var x: Int
                  int 5
                unit
            "}
        );
        assert_eq!(
            parse_error("1 + var x = 2"),
            "(1, 5): variable declaration is only allowed inside blocks"
        );
        assert_eq!(parse_error("var x: Foo = 2"), "(1, 8): unknown type `Foo`");
    }

    #[test]
    fn function_definitions() {
        assert_eq!(
            parse_tree("fun square(x: Int): Int { return x * x } square(3)"),
            indoc! {"
                fun square(x: Int): Int
                  block
                    return
                      binary *
                        ident x
                        ident x
                call square
                  int 3
            "}
        );
        // The return type annotation defaults to Unit.
        assert_eq!(
            parse_tree("fun shout(x: Int) { print_int(x); }"),
            indoc! {"
                fun shout(x: Int): Unit
                  block
                    call print_int
                      ident x
                    unit
                unit
            "}
        );
    }

    #[test]
    fn bare_return_returns_unit() {
        assert_eq!(
            parse_tree("fun f() { return; }"),
            indoc! {"
                fun f(): Unit
                  block
                    return
                      unit
                    unit
                unit
            "}
        );
    }

    #[test]
    fn loop_control_keywords() {
        assert_eq!(
            parse_tree("while true do { break; continue; }"),
            indoc! {"
                while
                  bool true
                  block
                    break
                    continue
                    unit
            "}
        );
    }

    #[test]
    fn single_expression_module_has_no_trailing_unit() {
        assert_eq!(
            parse_tree("1 + 2 + 3"),
            indoc! {"
                binary +
                  binary +
                    int 1
                    int 2
                  int 3
            "}
        );
        assert_eq!(
            parse_tree("1 + 2 + 3;"),
            indoc! {"
                binary +
                  binary +
                    int 1
                    int 2
                  int 3
                unit
            "}
        );
    }
}
