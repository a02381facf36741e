use tracing::debug;

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::Tokenizer;
use crate::token::{Token, TokenKind};

const LOWEST: u8 = 1;

const IF_TERMINATORS: &[TokenKind] = &[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndIf];
const FOREACH_TERMINATORS: &[TokenKind] = &[TokenKind::ForeachElse, TokenKind::EndForeach];

/// Parse `source`. A non-empty error list means the program must not be
/// rendered.
pub fn parse(source: &str) -> (Program, Vec<ParseError>) {
    let mut parser = Parser::new(source);
    let program = parser.parse_program();
    (program, parser.into_errors())
}

/// Append-only list of parse errors.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<ParseError>,
}

impl Diagnostics {
    pub fn push(&mut self, token: &Token<'_>, message: impl Into<String>) {
        self.errors.push(ParseError {
            message: message.into(),
            line: token.line,
            column: token.column,
        });
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }
}

#[derive(Default)]
struct ForeachAttributes {
    from: Option<Expr>,
    item: Option<String>,
    key: Option<String>,
    name: Option<String>,
}

pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    current: Token<'a>,
    peek: Token<'a>,
    diagnostics: Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Tokenizer::new(input);
        let current = lexer.next_token();
        let peek = lexer.next_token();
        Self {
            lexer,
            current,
            peek,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.diagnostics.into_errors()
    }

    fn advance(&mut self) {
        self.current = self.peek;
        self.peek = self.lexer.next_token();
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current.is(kind)
    }

    fn error(&mut self, message: impl Into<String>) {
        let token = self.current;
        self.diagnostics.push(&token, message);
    }

    fn error_at(&mut self, token: Token<'a>, message: impl Into<String>) {
        self.diagnostics.push(&token, message);
    }

    fn expect(&mut self, kind: TokenKind) -> Option<()> {
        if self.at(kind) {
            self.advance();
            Some(())
        } else {
            self.error(format!("expected `{kind}`, got {}", describe(&self.current)));
            None
        }
    }

    /// Skips to just past the next `}` (or to end of input).
    fn skip_tag(&mut self) {
        while !self.at(TokenKind::RightDelim) && !self.at(TokenKind::Eof) {
            self.advance();
        }
        if self.at(TokenKind::RightDelim) {
            self.advance();
        }
    }

    /// Consumes the `}` that closes a keyword-only tag such as `{else}`.
    fn close_tag(&mut self) {
        if self.expect(TokenKind::RightDelim).is_none() {
            self.skip_tag();
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let (root, _) = self.parse_block(&[]);
        let program = Program { root };

        debug!(
            nodes = program.root.nodes.len(),
            errors = self.diagnostics.errors().len(),
            "parsed template"
        );
        for err in self.diagnostics.errors() {
            debug!(line = err.line, column = err.column, "parse error: {}", err.message);
        }
        program
    }

    /// Parses nodes until end of input or a `{` followed by one of
    /// `terminators`. The terminating tag is left unconsumed and its keyword
    /// returned.
    fn parse_block(&mut self, terminators: &[TokenKind]) -> (ListNode, Option<TokenKind>) {
        let mut list = ListNode::default();
        loop {
            match self.current.kind {
                TokenKind::Eof => return (list, None),
                TokenKind::Text => {
                    list.nodes.push(Node::Text(self.current.literal.to_owned()));
                    self.advance();
                }
                TokenKind::LeftDelim if terminators.contains(&self.peek.kind) => {
                    return (list, Some(self.peek.kind));
                }
                TokenKind::LeftDelim => {
                    if let Some(node) = self.parse_tag() {
                        list.nodes.push(node);
                    }
                }
                // Comments and stray tokens.
                _ => self.advance(),
            }
        }
    }

    fn parse_tag(&mut self) -> Option<Node> {
        match self.peek.kind {
            TokenKind::Dollar => {
                self.advance();
                self.parse_action()
            }
            TokenKind::If => self.parse_if().map(Node::If),
            TokenKind::Foreach => self.parse_foreach().map(Node::Foreach),
            TokenKind::Literal => self.parse_literal(),
            TokenKind::ForeachElse => {
                self.advance();
                self.error("{foreachelse} outside of {foreach}");
                self.skip_tag();
                None
            }
            _ => {
                self.advance();
                self.error(format!("unknown tag: {}", describe(&self.current)));
                None
            }
        }
    }

    /// `{$expr|mod|mod}`; current token is `$`.
    fn parse_action(&mut self) -> Option<Node> {
        let Some(mut expr) = self.parse_expression(LOWEST) else {
            self.skip_tag();
            return None;
        };

        while self.at(TokenKind::Pipe) {
            self.advance();
            if !self.current.kind.is_word() {
                self.error(format!(
                    "expected modifier name after `|`, got {}",
                    describe(&self.current)
                ));
                self.skip_tag();
                return None;
            }
            expr = Expr::Pipe(Box::new(expr), self.current.literal.to_owned());
            self.advance();
        }

        if self.expect(TokenKind::RightDelim).is_none() {
            self.skip_tag();
            return None;
        }
        Some(Node::Action(expr))
    }

    /// An expression followed by `}`. The tag is consumed either way.
    fn parse_tag_expression(&mut self) -> Option<Expr> {
        let expr = self.parse_expression(LOWEST);
        if expr.is_some() && self.expect(TokenKind::RightDelim).is_some() {
            return expr;
        }
        self.skip_tag();
        None
    }

    fn parse_if(&mut self) -> Option<IfNode> {
        let start = self.peek;
        self.advance();
        self.advance();

        let condition = self.parse_tag_expression();
        let (consequence, mut terminator) = self.parse_block(IF_TERMINATORS);
        let mut else_ifs = Vec::new();
        let mut alternative = None;
        let mut valid = condition.is_some();

        loop {
            match terminator {
                Some(TokenKind::ElseIf) => {
                    self.advance();
                    self.advance();
                    let condition = self.parse_tag_expression();
                    let (block, next) = self.parse_block(IF_TERMINATORS);
                    match condition {
                        Some(condition) => else_ifs.push(ElseIf { condition, block }),
                        None => valid = false,
                    }
                    terminator = next;
                }
                Some(TokenKind::Else) => {
                    self.advance();
                    self.advance();
                    self.close_tag();
                    let (block, next) = self.parse_block(&[TokenKind::EndIf]);
                    alternative = Some(block);
                    terminator = next;
                }
                Some(TokenKind::EndIf) => {
                    self.advance();
                    self.advance();
                    self.close_tag();
                    break;
                }
                _ => {
                    self.error_at(start, "unterminated {if}: missing {/if}");
                    break;
                }
            }
        }

        if !valid {
            return None;
        }
        Some(IfNode {
            condition: condition?,
            consequence,
            else_ifs,
            alternative,
        })
    }

    fn parse_foreach(&mut self) -> Option<ForeachNode> {
        let start = self.peek;
        self.advance();
        self.advance();

        let attributes = self.parse_foreach_attributes(start);
        let (body, mut terminator) = self.parse_block(FOREACH_TERMINATORS);
        let mut alternative = None;

        if terminator == Some(TokenKind::ForeachElse) {
            self.advance();
            self.advance();
            self.close_tag();
            let (block, next) = self.parse_block(&[TokenKind::EndForeach]);
            alternative = Some(block);
            terminator = next;
        }

        if terminator == Some(TokenKind::EndForeach) {
            self.advance();
            self.advance();
            self.close_tag();
        } else {
            self.error_at(start, "unterminated {foreach}: missing {/foreach}");
        }

        let attributes = attributes?;
        Some(ForeachNode {
            source: attributes.from?,
            item: attributes.item?,
            key: attributes.key,
            name: attributes.name,
            body,
            alternative,
        })
    }

    /// Parses `name=value` pairs up to and including the closing `}`.
    fn parse_foreach_attributes(&mut self, start: Token<'a>) -> Option<ForeachAttributes> {
        let mut attributes = ForeachAttributes::default();

        while !self.at(TokenKind::RightDelim) {
            if self.at(TokenKind::Eof) {
                self.error("unterminated {foreach} tag");
                return None;
            }
            if !self.at(TokenKind::Ident) {
                self.error(format!(
                    "expected foreach attribute, got {}",
                    describe(&self.current)
                ));
                self.skip_tag();
                return None;
            }

            let attribute = self.current;
            let duplicate = match attribute.literal {
                "from" => attributes.from.is_some(),
                "item" => attributes.item.is_some(),
                "key" => attributes.key.is_some(),
                "name" => attributes.name.is_some(),
                other => {
                    self.error(format!("unsupported foreach attribute `{other}`"));
                    self.skip_tag();
                    return None;
                }
            };
            if duplicate {
                self.error(format!("duplicate foreach attribute `{}`", attribute.literal));
                self.skip_tag();
                return None;
            }

            self.advance();
            if self.expect(TokenKind::Assign).is_none() {
                self.skip_tag();
                return None;
            }

            let parsed = match attribute.literal {
                "from" => self
                    .parse_expression(LOWEST)
                    .map(|expr| attributes.from = Some(expr)),
                "item" => self
                    .parse_loop_variable()
                    .map(|name| attributes.item = Some(name)),
                "key" => self
                    .parse_loop_variable()
                    .map(|name| attributes.key = Some(name)),
                _ => self
                    .parse_loop_name()
                    .map(|name| attributes.name = Some(name)),
            };
            if parsed.is_none() {
                self.skip_tag();
                return None;
            }
        }
        self.advance();

        if attributes.from.is_none() {
            self.error_at(start, "{foreach} requires a `from` attribute");
            return None;
        }
        if attributes.item.is_none() {
            self.error_at(start, "{foreach} requires an `item` attribute");
            return None;
        }
        Some(attributes)
    }

    /// `item=x` or `item=$x`.
    fn parse_loop_variable(&mut self) -> Option<String> {
        if self.at(TokenKind::Dollar) {
            self.advance();
        }
        if !self.current.kind.is_word() {
            self.error(format!(
                "expected loop variable name, got {}",
                describe(&self.current)
            ));
            return None;
        }
        let name = self.current.literal.to_owned();
        self.advance();
        Some(name)
    }

    /// `name=loop` or `name="loop"`.
    fn parse_loop_name(&mut self) -> Option<String> {
        if !self.current.kind.is_word() && !self.at(TokenKind::String) {
            self.error(format!("expected loop name, got {}", describe(&self.current)));
            return None;
        }
        let name = self.current.literal.to_owned();
        self.advance();
        Some(name)
    }

    /// `{literal}...{/literal}`; the body arrives as raw text.
    fn parse_literal(&mut self) -> Option<Node> {
        let start = self.peek;
        self.advance();
        self.advance();
        if self.expect(TokenKind::RightDelim).is_none() {
            self.skip_tag();
            return None;
        }

        let mut text = String::new();
        while self.at(TokenKind::Text) {
            text.push_str(self.current.literal);
            self.advance();
        }

        if self.at(TokenKind::LeftDelim) && self.peek.is(TokenKind::EndLiteral) {
            self.advance();
            self.advance();
            self.close_tag();
        } else {
            self.error_at(start, "unterminated {literal}: missing {/literal}");
        }
        Some(Node::Text(text))
    }

    /// Precedence climbing over `or`, `and` and the comparisons.
    fn parse_expression(&mut self, min_precedence: u8) -> Option<Expr> {
        let mut left = self.parse_postfix()?;
        while let Some((precedence, op)) = infix_operator(self.current.kind) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_expression(precedence + 1)?;
            left = Expr::Infix(Box::new(left), op, Box::new(right));
        }
        Some(left)
    }

    /// A primary followed by any chain of `.name` and `[expr]`.
    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    if !self.current.kind.is_word() {
                        self.error(format!(
                            "expected property name after `.`, got {}",
                            describe(&self.current)
                        ));
                        return None;
                    }
                    expr = Expr::FieldAccess(Box::new(expr), self.current.literal.to_owned());
                    self.advance();
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression(LOWEST)?;
                    self.expect(TokenKind::RightBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Some(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let token = self.current;
        match token.kind {
            TokenKind::Dollar => {
                self.advance();
                if !self.current.kind.is_word() {
                    self.error(format!(
                        "expected variable name after `$`, got {}",
                        describe(&self.current)
                    ));
                    return None;
                }
                let name = self.current.literal.to_owned();
                self.advance();
                Some(Expr::Identifier(name))
            }
            TokenKind::Number => match token.literal.parse::<f64>() {
                Ok(n) => {
                    self.advance();
                    Some(Expr::NumberLiteral(n))
                }
                Err(_) => {
                    self.error(format!("invalid number `{}`", token.literal));
                    None
                }
            },
            TokenKind::String => {
                self.advance();
                Some(Expr::StringLiteral(token.literal.to_owned()))
            }
            _ => {
                self.error(format!("expected expression, got {}", describe(&token)));
                None
            }
        }
    }
}

fn infix_operator(kind: TokenKind) -> Option<(u8, InfixOp)> {
    let op = match kind {
        TokenKind::Or => (1, InfixOp::Or),
        TokenKind::And => (2, InfixOp::And),
        TokenKind::Eq => (3, InfixOp::Eq),
        TokenKind::NotEq => (3, InfixOp::NotEq),
        TokenKind::Lt => (3, InfixOp::Lt),
        TokenKind::Lte => (3, InfixOp::Lte),
        TokenKind::Gt => (3, InfixOp::Gt),
        TokenKind::Gte => (3, InfixOp::Gte),
        _ => return None,
    };
    Some(op)
}

fn describe(token: &Token<'_>) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_owned(),
        kind if kind.to_string() == token.literal => format!("`{}`", token.literal),
        kind => format!("{kind} `{}`", token.literal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors for {source:?}: {errors:?}");
        program
    }

    fn errors(source: &str) -> Vec<String> {
        parse(source).1.into_iter().map(|e| e.message).collect()
    }

    fn action(source: &str) -> Expr {
        match parse_ok(source).root.nodes.into_iter().next() {
            Some(Node::Action(expr)) => expr,
            other => panic!("expected action, got {other:?}"),
        }
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Identifier(name.into()))
    }

    #[test]
    fn text_and_action() {
        let program = parse_ok("Hello {$name}!");
        assert_eq!(
            program.root.nodes,
            vec![
                Node::Text("Hello ".into()),
                Node::Action(Expr::Identifier("name".into())),
                Node::Text("!".into()),
            ]
        );
    }

    #[test]
    fn postfix_chains_left_to_right() {
        assert_eq!(
            action("{$user.comments[1].text}"),
            Expr::FieldAccess(
                Box::new(Expr::Index(
                    Box::new(Expr::FieldAccess(ident("user"), "comments".into())),
                    Box::new(Expr::NumberLiteral(1.0)),
                )),
                "text".into(),
            )
        );
    }

    #[test]
    fn index_takes_a_full_expression() {
        assert_eq!(
            action("{$ids[$pos.n]}"),
            Expr::Index(
                ident("ids"),
                Box::new(Expr::FieldAccess(ident("pos"), "n".into()))
            )
        );
    }

    #[test]
    fn keywords_are_valid_property_names() {
        assert_eq!(
            action("{$smarty.foreach.l.first}").to_string(),
            "((($smarty.foreach).l).first)"
        );
    }

    #[test]
    fn precedence_or_and_comparison() {
        assert_eq!(
            action("{$a > 50 and $b or $c == 1}").to_string(),
            "((($a > 50) and $b) or ($c == 1))"
        );
        assert_eq!(
            action("{$a or $b and $c}").to_string(),
            "($a or ($b and $c))"
        );
        assert_eq!(action("{$a and $b and $c}").to_string(), "(($a and $b) and $c)");
    }

    #[test]
    fn pipeline_is_left_associative() {
        assert_eq!(
            action("{$name | a | b|c}"),
            Expr::Pipe(
                Box::new(Expr::Pipe(Box::new(Expr::Pipe(ident("name"), "a".into())), "b".into())),
                "c".into()
            )
        );
    }

    #[test]
    fn string_literal_operand() {
        assert_eq!(
            action(r#"{$role == "admin"}"#),
            Expr::Infix(ident("role"), InfixOp::Eq, Box::new(Expr::StringLiteral("admin".into())))
        );
    }

    #[test]
    fn if_elseif_else() {
        let program = parse_ok("{if $a}A{elseif $b}B{elseif $c}C{else}D{/if}");
        let Node::If(node) = &program.root.nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(node.condition, Expr::Identifier("a".into()));
        assert_eq!(node.consequence.nodes, vec![Node::Text("A".into())]);
        assert_eq!(node.else_ifs.len(), 2);
        assert_eq!(node.else_ifs[1].condition, Expr::Identifier("c".into()));
        assert_eq!(node.else_ifs[1].block.nodes, vec![Node::Text("C".into())]);
        assert_eq!(node.alternative.as_ref().unwrap().nodes, vec![Node::Text("D".into())]);
    }

    #[test]
    fn nested_blocks_do_not_confuse_terminators() {
        let program = parse_ok(
            "{if $a}{if $b}x{else}y{/if}{foreach from=$l item=i}{if $i}z{/if}{/foreach}{else}w{/if}",
        );
        assert_eq!(program.root.nodes.len(), 1);
        let Node::If(outer) = &program.root.nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(outer.consequence.nodes.len(), 2);
        assert!(matches!(outer.consequence.nodes[1], Node::Foreach(_)));
        assert_eq!(outer.alternative.as_ref().unwrap().nodes, vec![Node::Text("w".into())]);
    }

    #[test]
    fn foreach_attributes_in_any_order() {
        let program =
            parse_ok("{foreach name=\"loop\" key=$k item=v from=$m.list}{$v}{foreachelse}none{/foreach}");
        let Node::Foreach(node) = &program.root.nodes[0] else {
            panic!("expected foreach");
        };
        assert_eq!(node.source, Expr::FieldAccess(ident("m"), "list".into()));
        assert_eq!(node.item, "v");
        assert_eq!(node.key.as_deref(), Some("k"));
        assert_eq!(node.name.as_deref(), Some("loop"));
        assert_eq!(node.alternative.as_ref().unwrap().nodes, vec![Node::Text("none".into())]);
    }

    #[test]
    fn comments_are_dropped() {
        let program = parse_ok("a{* {$x} *}b");
        assert_eq!(program.root.nodes, vec![Node::Text("a".into()), Node::Text("b".into())]);
    }

    #[test]
    fn literal_block_becomes_text() {
        let program = parse_ok("{literal}{$x} { color: red }{/literal}");
        assert_eq!(program.root.nodes, vec![Node::Text("{$x} { color: red }".into())]);
    }

    #[test]
    fn unknown_tag_is_reported() {
        assert_eq!(errors("a{include file=x}b"), vec!["unknown tag: IDENT `include`"]);
    }

    #[test]
    fn bare_foreachelse_is_reported() {
        assert_eq!(errors("{foreachelse}x"), vec!["{foreachelse} outside of {foreach}"]);
    }

    #[test]
    fn missing_end_if_keeps_partial_tree() {
        let (program, errs) = parse("{if $a}yes");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].message, "unterminated {if}: missing {/if}");
        assert_eq!((errs[0].line, errs[0].column), (1, 2));
        assert!(matches!(program.root.nodes[0], Node::If(_)));
    }

    #[test]
    fn foreach_attribute_errors() {
        assert_eq!(
            errors("{foreach from=$a item=x item=y}{/foreach}"),
            vec!["duplicate foreach attribute `item`"]
        );
        assert_eq!(
            errors("{foreach from=$a item=x key=k key=j}{/foreach}"),
            vec!["duplicate foreach attribute `key`"]
        );
        assert_eq!(
            errors("{foreach from=$a item=x step=2}{/foreach}"),
            vec!["unsupported foreach attribute `step`"]
        );
        assert_eq!(
            errors("{foreach item=x}{/foreach}"),
            vec!["{foreach} requires a `from` attribute"]
        );
        assert_eq!(
            errors("{foreach from=$a}{/foreach}"),
            vec!["{foreach} requires an `item` attribute"]
        );
        assert_eq!(
            errors("{foreach from=$a item=x}body"),
            vec!["unterminated {foreach}: missing {/foreach}"]
        );
    }

    #[test]
    fn expression_errors() {
        assert_eq!(errors("{$a +}"), vec!["expected `}`, got ILLEGAL `+`"]);
        assert_eq!(errors("{$}"), vec!["expected variable name after `$`, got `}`"]);
        assert_eq!(errors("{$a.}"), vec!["expected property name after `.`, got `}`"]);
        assert_eq!(errors("{$a[0}"), vec!["expected `]`, got `}`"]);
        assert_eq!(errors("{$a|}"), vec!["expected modifier name after `|`, got `}`"]);
        assert_eq!(errors("{if }x{/if}"), vec!["expected expression, got `}`"]);
    }

    #[test]
    fn multiple_errors_in_one_pass() {
        let errs = errors("{$a +} ok {bogus} {foreachelse} {$b}");
        assert_eq!(
            errs,
            vec![
                "expected `}`, got ILLEGAL `+`",
                "unknown tag: IDENT `bogus`",
                "{foreachelse} outside of {foreach}",
            ]
        );
    }

    #[test]
    fn recovery_keeps_following_nodes() {
        let (program, errs) = parse("{bogus}tail {$x}");
        assert_eq!(errs.len(), 1);
        assert_eq!(
            program.root.nodes,
            vec![Node::Text("tail ".into()), Node::Action(Expr::Identifier("x".into()))]
        );
    }
}
