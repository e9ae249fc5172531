use std::rc::Rc;

use crate::{
    common::{
        config::Config,
        lit::Lit,
        source::Source,
        span::{Span, Spanned},
    },
    compiler::{
        ast::{BinOp, AST},
        module::Modules,
        syntax::{Kind as SyntaxKind, Note, Syntax},
        token::{Kind, Token, Tokens},
    },
};

/// The result of a single production.
/// `Ok(None)` means the production doesn't match here,
/// and another one should be tried.
/// `Err` is a hard error that stops parsing altogether.
type Production = Result<Option<Spanned<AST>>, Syntax>;

/// A recursive descent parser.
/// At each position productions are tried in a fixed order,
/// and the first that matches is committed to.
/// Each production is all-or-nothing: when it doesn't match,
/// the parser is rewound to where the production started.
pub struct Parser<'m> {
    tokens: Tokens,
    index: usize,
    source: Rc<Source>,
    modules: &'m mut Modules,
}

impl<'m> Parser<'m> {
    /// Parses a token stream into a sequence of top level nodes.
    /// `require`s are resolved against `config` and spliced in place.
    pub fn parse(
        tokens: Tokens,
        source: Rc<Source>,
        config: &Config,
    ) -> Result<Vec<Spanned<AST>>, Syntax> {
        let mut modules = Modules::new(config, &source);
        Parser::parse_module(tokens, source, &mut modules)
    }

    /// Parses the tokens of a single module.
    pub fn parse_module(
        tokens: Tokens,
        source: Rc<Source>,
        modules: &'m mut Modules,
    ) -> Result<Vec<Spanned<AST>>, Syntax> {
        let mut parser = Parser {
            tokens,
            index: 0,
            source,
            modules,
        };

        let mut nodes = vec![];
        while parser.peek().is_some() {
            match parser.expr()? {
                Some(node) => splice(&mut nodes, node),
                None => return Err(parser.unexpected()),
            }
        }
        Ok(nodes)
    }

    fn peek(&self) -> Option<&Spanned<Token>> {
        self.tokens.get(self.index)
    }

    fn peek_kind(&self, ahead: usize) -> Option<Kind> {
        self.tokens.get(self.index + ahead).map(|t| t.item.kind)
    }

    /// Consumes the next token if it is of the given kind.
    fn eat(&mut self, kind: Kind) -> Option<Spanned<Token>> {
        if self.peek_kind(0) == Some(kind) {
            self.index += 1;
            Some(self.tokens[self.index - 1].clone())
        } else {
            None
        }
    }

    /// The span covering every token consumed since `start`.
    fn span_since(&self, start: usize) -> Span {
        let first = self.tokens.get(start).map(|t| &t.span);
        let last = self.tokens.get(self.index.saturating_sub(1)).map(|t| &t.span);
        match (first, last) {
            (Some(first), Some(last)) => Span::combine(first, last),
            _ => self.end_of_source(),
        }
    }

    fn end_of_source(&self) -> Span {
        Span::point(&self.source, self.source.contents.len())
    }

    /// An error for the token the parser is stuck on.
    fn unexpected(&self) -> Syntax {
        match self.peek() {
            Some(token) => Syntax::error(&format!("Unexpected {}", token.item), &token.span),
            None => Syntax::error("Unexpected end of source", &self.end_of_source()),
        }
    }

    /// Runs a production, rewinding if it doesn't match.
    fn attempt(&mut self, production: fn(&mut Self) -> Production) -> Production {
        let start = self.index;
        let result = production(self)?;
        if result.is_none() {
            self.index = start;
        }
        Ok(result)
    }

    /// Tries each production in order, committing to the first that matches.
    fn first_of(&mut self, productions: &[fn(&mut Self) -> Production]) -> Production {
        for production in productions {
            if let Some(node) = self.attempt(*production)? {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    fn node(&self, item: AST, start: usize) -> Option<Spanned<AST>> {
        Some(Spanned::new(item, self.span_since(start)))
    }

    pub fn expr(&mut self) -> Production {
        self.first_of(&[Self::op, Self::return_])
    }

    /// Parses a chain of the loose tier, nesting to the right:
    /// `a - b - c` is `a - (b - c)`.
    fn op(&mut self) -> Production {
        self.binary(Kind::AddOp, Self::term, Self::op)
    }

    /// Parses a chain of the tight tier, nesting to the right.
    fn term(&mut self) -> Production {
        self.binary(Kind::MulOp, Self::factor, Self::term)
    }

    fn binary(
        &mut self,
        kind: Kind,
        operand: fn(&mut Self) -> Production,
        rest: fn(&mut Self) -> Production,
    ) -> Production {
        let start = self.index;
        let lhs = match self.attempt(operand)? {
            Some(lhs) => lhs,
            None => return Ok(None),
        };

        let before = self.index;
        let op = match self.eat(kind) {
            Some(token) => match BinOp::from_symbol(&token.item.lexeme) {
                Some(op) => op,
                None => return Err(Syntax::error("Unknown operator", &token.span)),
            },
            None => return Ok(Some(lhs)),
        };

        match self.attempt(rest)? {
            Some(rhs) => Ok(self.node(AST::op(op, lhs, rhs), start)),
            // the operator stays for the caller to trip over
            None => {
                self.index = before;
                Ok(Some(lhs))
            }
        }
    }

    fn factor(&mut self) -> Production {
        self.first_of(&[
            Self::call,
            Self::require,
            Self::new_,
            Self::object,
            Self::fn_,
            Self::assign,
            Self::literal,
            Self::if_,
            Self::while_,
            Self::for_,
        ])
    }

    fn literal(&mut self) -> Production {
        self.first_of(&[
            Self::block,
            Self::bool,
            Self::float,
            Self::name,
            Self::number,
            Self::list,
            Self::string,
            Self::nil,
            Self::parens,
        ])
    }

    /// Parses `(a, b, ...)`, the opening paren already eaten.
    fn args(&mut self) -> Result<Option<Vec<Spanned<AST>>>, Syntax> {
        let mut args = vec![];
        if self.eat(Kind::RParen).is_some() {
            return Ok(Some(args));
        }

        loop {
            match self.expr()? {
                Some(arg) => args.push(arg),
                None => return Ok(None),
            }
            if self.eat(Kind::RParen).is_some() {
                return Ok(Some(args));
            }
            if self.eat(Kind::Comma).is_none() {
                return Ok(None);
            }
        }
    }

    /// Parses `(a, b, ...)` where each item is a plain name.
    fn params(&mut self) -> Option<Vec<String>> {
        self.eat(Kind::LParen)?;
        let mut params = vec![];
        if self.eat(Kind::RParen).is_some() {
            return Some(params);
        }

        loop {
            let name = self.eat(Kind::Name)?.item.lexeme;
            if name.contains(&['.', ':'][..]) {
                return None;
            }
            params.push(name);
            if self.eat(Kind::RParen).is_some() {
                return Some(params);
            }
            self.eat(Kind::Comma)?;
        }
    }

    /// `callee(args...)`, possibly chained: `f(1)(2)`.
    /// A literal that isn't followed by arguments is returned as is,
    /// unless it is a name, which may still start an assignment.
    fn call(&mut self) -> Production {
        let start = self.index;
        let mut callee = match self.literal()? {
            Some(callee) => callee,
            None => return Ok(None),
        };
        if self.peek_kind(0) != Some(Kind::LParen) && self.tokens[start].item.kind != Kind::Name {
            return Ok(Some(callee));
        }

        let mut calls = 0;
        while self.peek_kind(0) == Some(Kind::LParen) {
            let before = self.index;
            self.index += 1;
            match self.args()? {
                Some(args) => {
                    let call = AST::Call {
                        callee: Box::new(callee),
                        args,
                    };
                    callee = Spanned::new(call, self.span_since(start));
                    calls += 1;
                }
                None if calls > 0 => {
                    self.index = before;
                    break;
                }
                None => return Ok(None),
            }
        }

        Ok(if calls > 0 { Some(callee) } else { None })
    }

    /// `new Callee(args...)`
    fn new_(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::New).is_none() {
            return Ok(None);
        }
        let callee = match self.literal()? {
            Some(callee) => callee,
            None => return Ok(None),
        };
        if self.eat(Kind::LParen).is_none() {
            return Ok(None);
        }
        let args = match self.args()? {
            Some(args) => args,
            None => return Ok(None),
        };

        let new = AST::New {
            callee: Box::new(callee),
            args,
        };
        Ok(self.node(new, start))
    }

    /// `require "module"`, resolved on the spot.
    fn require(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::Require).is_none() {
            return Ok(None);
        }
        let token = match self.eat(Kind::String) {
            Some(token) => token,
            None => return Ok(None),
        };

        let module = decode_string(&token)?;
        let body = self.modules.load(&module, &token.span)?;
        Ok(self.node(AST::Require { module, body }, start))
    }

    fn return_(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::Return).is_none() {
            return Ok(None);
        }
        let value = match self.expr()? {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(self.node(AST::Return(Box::new(value)), start))
    }

    /// `object Name(params...) body`, the parameters being optional.
    fn object(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::Object).is_none() {
            return Ok(None);
        }
        let name = match self.eat(Kind::Name) {
            Some(name) => name.item.lexeme,
            None => return Ok(None),
        };
        let params = if self.peek_kind(0) == Some(Kind::LParen) {
            match self.params() {
                Some(params) => params,
                None => return Ok(None),
            }
        } else {
            vec![]
        };
        let body = match self.expr()? {
            Some(body) => body,
            None => return Ok(None),
        };

        let object = AST::Object {
            name,
            params,
            body: Box::new(body),
        };
        Ok(self.node(object, start))
    }

    /// `fn name(params...) body`
    fn fn_(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::Fn).is_none() {
            return Ok(None);
        }
        let name = match self.eat(Kind::Name) {
            Some(name) => name.item.lexeme,
            None => return Ok(None),
        };
        let params = match self.params() {
            Some(params) => params,
            None => return Ok(None),
        };
        let body = match self.expr()? {
            Some(body) => body,
            None => return Ok(None),
        };

        let function = AST::Fn {
            name,
            params,
            body: Box::new(body),
        };
        Ok(self.node(function, start))
    }

    /// `name = expr`, or a compound assignment like `name += expr`.
    fn assign(&mut self) -> Production {
        let start = self.index;
        let name = match self.eat(Kind::Name) {
            Some(name) => name.item.lexeme,
            None => return Ok(None),
        };
        let op = match self.eat(Kind::Assign) {
            Some(token) => {
                let symbol = token.item.lexeme.trim_end_matches('=');
                if symbol.is_empty() {
                    None
                } else {
                    Some(
                        BinOp::from_symbol(symbol)
                            .ok_or_else(|| Syntax::error("Unknown assignment", &token.span))?,
                    )
                }
            }
            None => return Ok(None),
        };
        let expr = match self.expr()? {
            Some(expr) => expr,
            None => return Ok(None),
        };

        let assign = AST::Assign {
            name,
            op,
            expr: Box::new(expr),
        };
        Ok(self.node(assign, start))
    }

    /// `if cond then`, optionally followed by `else other`.
    fn if_(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::If).is_none() {
            return Ok(None);
        }
        let cond = match self.expr()? {
            Some(cond) => cond,
            None => return Ok(None),
        };
        let then = match self.expr()? {
            Some(then) => then,
            None => return Ok(None),
        };
        let other = if self.eat(Kind::Else).is_some() {
            match self.expr()? {
                Some(other) => Some(Box::new(other)),
                None => return Ok(None),
            }
        } else {
            None
        };

        let branch = AST::If {
            cond: Box::new(cond),
            then: Box::new(then),
            other,
        };
        Ok(self.node(branch, start))
    }

    fn while_(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::While).is_none() {
            return Ok(None);
        }
        let cond = match self.expr()? {
            Some(cond) => cond,
            None => return Ok(None),
        };
        let body = match self.expr()? {
            Some(body) => body,
            None => return Ok(None),
        };

        let loop_ = AST::While {
            cond: Box::new(cond),
            body: Box::new(body),
        };
        Ok(self.node(loop_, start))
    }

    /// `for x in source body`, or `for source body`.
    fn for_(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::For).is_none() {
            return Ok(None);
        }
        let binding = if self.peek_kind(0) == Some(Kind::Name) && self.peek_kind(1) == Some(Kind::In)
        {
            let name = self.tokens[self.index].item.lexeme.clone();
            self.index += 2;
            Some(name)
        } else {
            None
        };
        let source = match self.expr()? {
            Some(source) => source,
            None => return Ok(None),
        };
        let body = match self.expr()? {
            Some(body) => body,
            None => return Ok(None),
        };

        let loop_ = AST::For {
            binding,
            source: Box::new(source),
            body: Box::new(body),
        };
        Ok(self.node(loop_, start))
    }

    /// `{ expr... }`.
    /// Once the brace is open, anything that isn't an expression
    /// is a hard error.
    fn block(&mut self) -> Production {
        let start = self.index;
        let open = match self.eat(Kind::LBrace) {
            Some(open) => open,
            None => return Ok(None),
        };

        let mut body = vec![];
        loop {
            if self.eat(Kind::RBrace).is_some() {
                return Ok(self.node(AST::Block(body), start));
            }
            if self.peek().is_none() {
                return Err(Syntax::error_with_note(
                    "Unexpected end of source, expected `}`",
                    Note::new_with_hint("block opened here", &open.span),
                ));
            }
            match self.expr()? {
                Some(node) => splice(&mut body, node),
                None => return Err(self.unexpected()),
            }
        }
    }

    fn list(&mut self) -> Production {
        let start = self.index;
        if self.eat(Kind::LBrack).is_none() {
            return Ok(None);
        }

        let mut items = vec![];
        loop {
            if self.eat(Kind::RBrack).is_some() {
                break;
            }
            match self.expr()? {
                Some(item) => items.push(item),
                None => return Ok(None),
            }
            if self.eat(Kind::RBrack).is_some() {
                break;
            }
            if self.eat(Kind::Comma).is_none() {
                return Ok(None);
            }
        }

        Ok(self.node(AST::List(items), start))
    }

    fn parens(&mut self) -> Production {
        if self.eat(Kind::LParen).is_none() {
            return Ok(None);
        }
        let inner = match self.expr()? {
            Some(inner) => inner,
            None => return Ok(None),
        };
        Ok(self.eat(Kind::RParen).map(|_| inner))
    }

    fn name(&mut self) -> Production {
        let start = self.index;
        Ok(match self.eat(Kind::Name) {
            Some(token) => self.node(AST::Name(token.item.lexeme), start),
            None => None,
        })
    }

    fn bool(&mut self) -> Production {
        let start = self.index;
        Ok(match self.eat(Kind::Bool) {
            Some(token) => self.node(AST::Lit(Lit::Boolean(token.item.lexeme == "true")), start),
            None => None,
        })
    }

    fn nil(&mut self) -> Production {
        let start = self.index;
        Ok(self.eat(Kind::Nil).and_then(|_| self.node(AST::Lit(Lit::Nil), start)))
    }

    /// Eats a leading `-`, if any.
    fn sign(&mut self) -> bool {
        match self.peek() {
            Some(token) if token.item.kind == Kind::AddOp && token.item.lexeme == "-" => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    fn float(&mut self) -> Production {
        let start = self.index;
        let negative = self.sign();
        let token = match self.eat(Kind::Float) {
            Some(token) => token,
            None => return Ok(None),
        };
        let float = token
            .item
            .lexeme
            .parse::<f64>()
            .map_err(|_| Syntax::error("Malformed float literal", &token.span))?;
        let float = if negative { -float } else { float };
        Ok(self.node(AST::Lit(Lit::Float(float)), start))
    }

    fn number(&mut self) -> Production {
        let start = self.index;
        let negative = self.sign();
        let token = match self.eat(Kind::Number) {
            Some(token) => token,
            None => return Ok(None),
        };
        let text = if negative {
            format!("-{}", token.item.lexeme)
        } else {
            token.item.lexeme.clone()
        };
        let integer = text.parse::<i64>().map_err(|_| {
            Syntax::lex(
                "Integer literal too large to fit in a signed 64-bit integer",
                &token.span,
            )
        })?;
        Ok(self.node(AST::Lit(Lit::Integer(integer)), start))
    }

    fn string(&mut self) -> Production {
        let start = self.index;
        let token = match self.eat(Kind::String) {
            Some(token) => token,
            None => return Ok(None),
        };
        let string = decode_string(&token)?;
        Ok(self.node(AST::Lit(Lit::String(string)), start))
    }
}

/// Adds a node to a statement sequence.
/// Resolved modules are spliced in place of their `require`.
fn splice(nodes: &mut Vec<Spanned<AST>>, node: Spanned<AST>) {
    match node.item {
        AST::Require { body, .. } => nodes.extend(body),
        item => nodes.push(Spanned::new(item, node.span)),
    }
}

/// Strips the quotes off a string token and decodes its escapes.
fn decode_string(token: &Spanned<Token>) -> Result<String, Syntax> {
    let lexeme = &token.item.lexeme;
    let inner = &lexeme[1..lexeme.len() - 1];
    let mut string = String::new();
    let mut chars = inner.char_indices();

    while let Some((index, c)) = chars.next() {
        if c != '\\' {
            string.push(c);
            continue;
        }

        let (_, escaped) = chars.next().unwrap_or((index, '\\'));
        string.push(match escaped {
            '"' => '"',
            '\\' => '\\',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            other => {
                let span = &token.span;
                let offset = span.offset() + 1 + index;
                return Err(Syntax::error_with_note(
                    &format!("Unknown escape code `\\{}` in string literal", other),
                    Note::new_with_hint(
                        "to include a single backslash `\\`, escape it first: `\\\\`",
                        &Span::new(span.source(), offset, 1 + other.len_utf8()),
                    ),
                )
                .with_kind(SyntaxKind::Lex));
            }
        });
    }

    Ok(string)
}
