use std::mem;

use log::debug;

use crate::{
    common::{
        bytecode::Bytecode,
        lit::Lit,
        number::width,
        opcode::{Marker, Opcode, ARGS_END, ARG_SEP, TERM},
        span::{Span, Spanned},
    },
    compiler::{
        ast::{BinOp, AST},
        syntax::Syntax,
    },
};

/// Name bound by a `for` loop without a binding,
/// and the parameter of a block called as a function.
pub const ANONYMOUS: &str = "_";

/// Compiles a sequence of top level nodes into a self-terminating program.
pub fn gen(nodes: &[Spanned<AST>]) -> Result<Bytecode, Syntax> {
    let mut compiler = Compiler::base();
    compiler.sequence(nodes)?;
    compiler.code.emit(Opcode::End);
    debug!("compiled program to {} bytes", compiler.code.len());
    Ok(compiler.code)
}

/// Compiler is a bytecode generator that walks an AST and produces
/// (unoptimized) bytecode.
/// Note that this struct should not be controlled manually,
/// use the `gen` function instead.
pub struct Compiler {
    /// The current bytecode emission target.
    code: Bytecode,
    /// Counts hidden loop cursors, so each gets a unique name.
    hidden: usize,
}

impl Compiler {
    fn base() -> Compiler {
        Compiler {
            code: Bytecode::empty(),
            hidden: 0,
        }
    }

    /// Compiles into a fresh emission target,
    /// returning what was emitted and restoring the enclosing target.
    fn region(
        &mut self,
        build: impl FnOnce(&mut Compiler) -> Result<(), Syntax>,
    ) -> Result<Bytecode, Syntax> {
        let enclosing = mem::replace(&mut self.code, Bytecode::empty());
        let result = build(self);
        let region = mem::replace(&mut self.code, enclosing);
        result.map(|_| region)
    }

    /// Walks each node in order.
    fn sequence(&mut self, nodes: &[Spanned<AST>]) -> Result<(), Syntax> {
        for node in nodes {
            self.walk(node)?;
        }
        Ok(())
    }

    /// Walks a node in statement position:
    /// blocks and resolved modules are inlined rather than becoming values.
    fn inline(&mut self, node: &Spanned<AST>) -> Result<(), Syntax> {
        match &node.item {
            AST::Block(nodes) | AST::Require { body: nodes, .. } => self.sequence(nodes),
            _ => self.walk(node),
        }
    }

    /// Compiles a function, object or block body as an independent program.
    fn body(&mut self, node: &Spanned<AST>) -> Result<Bytecode, Syntax> {
        self.region(|compiler| {
            compiler.inline(node)?;
            compiler.code.emit(Opcode::End);
            Ok(())
        })
    }

    /// Walks an AST to generate bytecode.
    fn walk(&mut self, node: &Spanned<AST>) -> Result<(), Syntax> {
        self.code.emit_span(&node.span);
        let span = &node.span;

        match &node.item {
            AST::Lit(lit) => self.lit(lit, span),
            AST::Name(name) => {
                self.code.emit(Opcode::Get);
                self.name(name, span)
            }
            AST::Assign { name, op, expr } => self.assign(name, *op, expr, span),
            AST::Call { callee, args } => self.call(callee, args, Opcode::Call, span),
            AST::New { callee, args } => self.call(callee, args, Opcode::New, span),
            AST::Op { op, lhs, rhs } => {
                self.walk(lhs)?;
                self.walk(rhs)?;
                self.code.emit_span(span);
                self.code.emit(op.opcode());
                Ok(())
            }
            AST::If { cond, then, other } => self.if_(cond, then, other.as_deref(), span),
            AST::While { cond, body } => {
                let cond = self.region(|c| c.walk(cond))?;
                let body = self.region(|c| c.inline(body))?;
                self.loop_(cond, body, span);
                Ok(())
            }
            AST::For {
                binding,
                source,
                body,
            } => self.for_(binding.as_deref(), source, body, span),
            AST::Fn { name, params, body } => self.define(Marker::Fn, name, params, body, span),
            AST::Object { name, params, body } => {
                self.define(Marker::Object, name, params, body, span)
            }
            AST::List(items) => {
                self.sequence(items)?;
                self.code.emit_span(span);
                self.code.emit(Opcode::Const);
                self.code.emit_marker(Marker::List);
                self.code.emit_number(items.len() as i64);
                Ok(())
            }
            AST::Block(_) => {
                let body = self.body(node)?;
                self.code.emit_span(span);
                self.code.emit(Opcode::Const);
                self.code.emit_marker(Marker::Block);
                self.code.emit_number(body.len() as i64);
                self.code.append(body);
                Ok(())
            }
            AST::Require { body, .. } => self.sequence(body),
            AST::Return(value) => {
                self.walk(value)?;
                self.code.emit_span(span);
                self.code.emit(Opcode::Return);
                Ok(())
            }
        }
    }

    /// Emits a terminated name operand.
    fn name(&mut self, name: &str, span: &Span) -> Result<(), Syntax> {
        if name.is_empty() || name.bytes().any(|b| b == TERM || b == ARG_SEP || b == ARGS_END) {
            return Err(Syntax::encoding(
                &format!("The name `{}` can't be encoded", name.escape_debug()),
                span,
            ));
        }
        self.code.emit_str(name);
        Ok(())
    }

    fn lit(&mut self, lit: &Lit, span: &Span) -> Result<(), Syntax> {
        self.code.emit(Opcode::Const);
        let marker = match lit {
            Lit::Integer(_) => Marker::Int,
            Lit::Float(_) => Marker::Num,
            Lit::String(_) => Marker::Str,
            Lit::Boolean(_) => Marker::Bool,
            Lit::Nil => Marker::Nil,
        };
        self.code.emit_marker(marker);

        if let Some(operand) = lit.operand() {
            if operand.as_bytes().contains(&TERM) {
                return Err(Syntax::encoding(
                    "String literal contains the reserved byte 0x18",
                    span,
                ));
            }
            self.code.emit_str(&operand);
        }
        Ok(())
    }

    /// `name = expr` binds the value and leaves it on the stack.
    /// `name op= expr` reads the old binding first.
    fn assign(
        &mut self,
        name: &str,
        op: Option<BinOp>,
        expr: &Spanned<AST>,
        span: &Span,
    ) -> Result<(), Syntax> {
        if let Some(op) = op {
            self.code.emit(Opcode::Get);
            self.name(name, span)?;
            self.walk(expr)?;
            self.code.emit_span(span);
            self.code.emit(op.opcode());
        } else {
            self.walk(expr)?;
            self.code.emit_span(span);
        }

        self.code.emit(Opcode::Set);
        self.name(name, span)
    }

    /// Arguments in source order, then the callee, then the call itself.
    fn call(
        &mut self,
        callee: &Spanned<AST>,
        args: &[Spanned<AST>],
        op: Opcode,
        span: &Span,
    ) -> Result<(), Syntax> {
        self.sequence(args)?;
        self.walk(callee)?;
        self.code.emit_span(span);
        self.code.emit(op);
        Ok(())
    }

    /// ```plain
    /// <cond> Unless(then) <then> [Jump(other) <other>]
    /// ```
    fn if_(
        &mut self,
        cond: &Spanned<AST>,
        then: &Spanned<AST>,
        other: Option<&Spanned<AST>>,
        span: &Span,
    ) -> Result<(), Syntax> {
        self.walk(cond)?;
        let mut then = self.region(|c| c.inline(then))?;

        let other = match other {
            Some(other) => {
                let other = self.region(|c| c.inline(other))?;
                then.emit_span(span);
                then.emit(Opcode::Jump);
                then.emit_number(other.len() as i64);
                Some(other)
            }
            None => None,
        };

        self.code.emit_span(span);
        self.code.emit(Opcode::JumpUnless);
        self.code.emit_number(then.len() as i64);
        self.code.append(then);
        if let Some(other) = other {
            self.code.append(other);
        }
        Ok(())
    }

    /// Lays out a loop:
    /// ```plain
    /// <cond> Unless(body + back) <body> Jump(-(cond + guard + body + back))
    /// ```
    /// The back jump's operand counts its own encoding,
    /// whose width depends on the operand.
    fn loop_(&mut self, cond: Bytecode, body: Bytecode, span: &Span) {
        let (guard, back) = loop_jumps(cond.len(), body.len());

        self.code.append(cond);
        self.code.emit_span(span);
        self.code.emit(Opcode::JumpUnless);
        self.code.emit_number(guard);
        self.code.append(body);
        self.code.emit_span(span);
        self.code.emit(Opcode::Jump);
        self.code.emit_number(back);
    }

    /// Desugars `for x in source body` into a loop over a hidden cursor:
    /// ```plain
    /// <source> Reset Set(__forN)
    /// loop: Get(__forN) Iter Set(x) Unless(..) <body> Jump(loop)
    /// ```
    fn for_(
        &mut self,
        binding: Option<&str>,
        source: &Spanned<AST>,
        body: &Spanned<AST>,
        span: &Span,
    ) -> Result<(), Syntax> {
        let hidden = format!("__for{}", self.hidden);
        self.hidden += 1;

        self.walk(source)?;
        self.code.emit_span(span);
        self.code.emit(Opcode::Reset);
        self.code.emit(Opcode::Set);
        self.name(&hidden, span)?;

        let cond = self.region(|c| {
            c.code.emit_span(span);
            c.code.emit(Opcode::Get);
            c.name(&hidden, span)?;
            c.code.emit(Opcode::Iter);
            c.code.emit(Opcode::Set);
            c.name(binding.unwrap_or(ANONYMOUS), span)
        })?;
        let body = self.region(|c| c.inline(body))?;
        self.loop_(cond, body, span);
        Ok(())
    }

    /// ```plain
    /// Define <kind> name TERM a SEP b ARGS_END size TERM <body>
    /// ```
    fn define(
        &mut self,
        kind: Marker,
        name: &str,
        params: &[String],
        body: &Spanned<AST>,
        span: &Span,
    ) -> Result<(), Syntax> {
        let body = self.body(body)?;

        self.code.emit_span(span);
        self.code.emit(Opcode::Define);
        self.code.emit_marker(kind);
        self.name(name, span)?;
        for (index, param) in params.iter().enumerate() {
            if index > 0 {
                self.code.emit_bytes(&[ARG_SEP]);
            }
            if param.bytes().any(|b| b == TERM || b == ARG_SEP || b == ARGS_END) {
                return Err(Syntax::encoding("Parameter name can't be encoded", span));
            }
            self.code.emit_bytes(param.as_bytes());
        }
        self.code.emit_bytes(&[ARGS_END]);
        self.code.emit_number(body.len() as i64);
        self.code.append(body);
        Ok(())
    }
}

/// Computes the guard and back jump operands of a loop,
/// given the sizes of its condition and body.
///
/// The back jump has to skip over itself,
/// so its size depends on its own operand.
/// Starting from the smallest possible encoding,
/// the size is grown until it stops changing.
pub fn loop_jumps(cond: usize, body: usize) -> (i64, i64) {
    // opcode byte plus the operand
    let jump_len = |operand: i64| 1 + width(operand) as i64;
    let (cond, body) = (cond as i64, body as i64);

    let mut back_len = jump_len(-1);
    loop {
        let guard = body + back_len;
        let back = -(cond + jump_len(guard) + body + back_len);
        if jump_len(back) == back_len {
            return (guard, back);
        }
        back_len = jump_len(back);
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;
    use crate::{
        common::{
            bytecode::{Constant, Instruction},
            config::Config,
            source::Source,
        },
        compiler::{lex::Lexer, parse::Parser},
    };

    fn compile(source: &str) -> Bytecode {
        let source = Source::source(source);
        let tokens = Lexer::lex(Rc::clone(&source)).unwrap();
        let ast = Parser::parse(tokens, source, &Config::default()).unwrap();
        gen(&ast).unwrap()
    }

    /// Decodes a whole program, instruction by instruction,
    /// skipping over bodies.
    fn decode(code: &Bytecode) -> Vec<(usize, Instruction, usize)> {
        let mut offset = 0;
        let mut instructions = vec![];
        while offset < code.len() {
            let (instruction, next) = code.decode(offset).unwrap();
            let after = match &instruction {
                Instruction::DefineFn { body, .. }
                | Instruction::DefineObject { body, .. }
                | Instruction::Const(Constant::Block(body)) => body.end,
                _ => next,
            };
            instructions.push((offset, instruction, after));
            offset = after;
        }
        instructions
    }

    #[test]
    fn literals() {
        assert_eq!(compile("1").code, b"\x21\x131\x18\x16");
        assert_eq!(compile("2.5").code, b"\x21\x152.5\x18\x16");
        assert_eq!(compile("\"hi\"").code, b"\x21\x14hi\x18\x16");
        assert_eq!(compile("true").code, b"\x21\x12true\x18\x16");
        assert_eq!(compile("nil").code, b"\x21\x2f\x16");
    }

    #[test]
    fn assign() {
        assert_eq!(compile("x = 1").code, b"\x21\x131\x18\x04x\x18\x16");
    }

    #[test]
    fn compound_assign() {
        assert_eq!(
            compile("x += 1").code,
            b"\x20x\x18\x21\x131\x18\x23\x04x\x18\x16"
        );
    }

    #[test]
    fn operators() {
        // 2 + 3 * 4 => 2 3 4 * +
        assert_eq!(
            compile("2 + 3 * 4").code,
            b"\x21\x132\x18\x21\x133\x18\x21\x134\x18\x25\x23\x16"
        );
        assert_eq!(compile("a <= b").code, b"\x20a\x18\x20b\x18\x38\x16");
    }

    #[test]
    fn call_order() {
        // arguments in source order, then the callee
        assert_eq!(
            compile("f(1, 2)").code,
            b"\x21\x131\x18\x21\x132\x18\x20f\x18\x02\x16"
        );
        assert_eq!(compile("new P()").code, b"\x20P\x18\x31\x16");
    }

    #[test]
    fn list() {
        assert_eq!(
            compile("[1, 2]").code,
            b"\x21\x131\x18\x21\x132\x18\x21\x2c2\x18\x16"
        );
    }

    #[test]
    fn fn_definition() {
        assert_eq!(
            compile("fn id(a, b) a").code,
            b"\x01\x17id\x18a\x07b\x084\x18\x20a\x18\x16\x16"
        );
    }

    #[test]
    fn object_without_params() {
        assert_eq!(
            compile("object O { x = nil }").code,
            b"\x01\x30O\x18\x086\x18\x21\x2f\x04x\x18\x16\x16"
        );
    }

    #[test]
    fn block_value() {
        assert_eq!(compile("{ 1 }").code, b"\x21\x326\x18\x21\x131\x18\x16\x16");
    }

    #[test]
    fn return_() {
        assert_eq!(compile("return 1").code, b"\x21\x131\x18\x03\x16");
    }

    #[test]
    fn if_without_else() {
        // cond, Unless(5), then (5 bytes)
        assert_eq!(
            compile("if c { 1 }").code,
            b"\x20c\x18\x2b5\x18\x21\x131\x18\x16"
        );
    }

    #[test]
    fn if_with_else() {
        // then gets a jump over the else branch appended
        assert_eq!(
            compile("if c { 1 } else { 2 }").code,
            b"\x20c\x18\x2b8\x18\x21\x131\x18\x2a5\x18\x21\x132\x18\x16"
        );
    }

    #[test]
    fn while_lands_exactly() {
        // c: 3 bytes, body: 5 bytes
        let code = compile("while c { 1 }");
        let instructions = decode(&code);
        let (_, guard, guard_next) = instructions[1].clone();
        let (_, back, back_next) = instructions[3].clone();
        let end = code.len() - 1;

        assert_eq!(guard, Instruction::JumpUnless((end - guard_next) as i64));
        assert_eq!(back, Instruction::Jump(-(back_next as i64)));
    }

    #[test]
    fn for_desugaring() {
        let code = compile("for x in xs { }");
        let names: Vec<_> = decode(&code)
            .into_iter()
            .map(|(_, instruction, _)| instruction)
            .collect();
        assert_eq!(names[0], Instruction::Get("xs".into()));
        assert_eq!(names[1], Instruction::Reset);
        assert_eq!(names[2], Instruction::Set("__for0".into()));
        assert_eq!(names[3], Instruction::Get("__for0".into()));
        assert_eq!(names[4], Instruction::Iter);
        assert_eq!(names[5], Instruction::Set("x".into()));
        assert!(matches!(names[6], Instruction::JumpUnless(_)));
        assert!(matches!(names[7], Instruction::Jump(_)));
    }

    #[test]
    fn hidden_names_are_unique() {
        let code = compile("for a { } for b { }");
        let sets: Vec<_> = decode(&code)
            .into_iter()
            .filter_map(|(_, instruction, _)| match instruction {
                Instruction::Set(name) if name.starts_with("__for") => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(sets, vec!["__for0".to_string(), "__for1".to_string()]);
    }

    #[test]
    fn anonymous_for_binds_underscore() {
        let code = compile("for xs { }");
        assert!(decode(&code)
            .iter()
            .any(|(_, instruction, _)| instruction == &Instruction::Set(ANONYMOUS.into())));
    }

    #[test]
    fn loop_jump_digit_boundaries() {
        // the back jump operand crosses from 2 to 3 digits
        // right around a total size of 100 bytes
        for body in 80..120 {
            let (guard, back) = loop_jumps(3, body);
            let guard_len = 1 + width(guard) as i64;
            let back_len = 1 + width(back) as i64;
            assert_eq!(guard, body as i64 + back_len);
            assert_eq!(-back, 3 + guard_len + body as i64 + back_len);
        }
        // and from 3 to 4 digits around 1000
        for body in 980..1010 {
            let (guard, back) = loop_jumps(10, body);
            let back_len = 1 + width(back) as i64;
            let guard_len = 1 + width(guard) as i64;
            assert_eq!(-back, 10 + guard_len + body as i64 + back_len);
        }
    }

    #[test]
    fn string_with_terminator() {
        let source = Source::source("\"a\u{18}b\"");
        let tokens = Lexer::lex(Rc::clone(&source)).unwrap();
        let ast = Parser::parse(tokens, source, &Config::default()).unwrap();
        let error = gen(&ast).unwrap_err();
        assert_eq!(error.kind, crate::compiler::syntax::Kind::Encoding);
    }

    #[test]
    fn spans_point_at_operators() {
        let source = "x = 1\ny = x / 0";
        let code = compile(source);
        let div = code
            .code
            .iter()
            .position(|b| *b == Opcode::Div as u8)
            .unwrap();
        assert_eq!(code.span_at(div).unwrap().contents(), "x / 0");
    }

    proptest! {
        #[test]
        fn loops_of_any_size_land(statements in 0usize..60) {
            let body = "x = 1 ".repeat(statements);
            let code = compile(&format!("while c {{ {} }}", body));
            let instructions = decode(&code);
            let end = code.len() - 1;

            let (_, guard, guard_next) = instructions[1].clone();
            let (_, back, back_next) = instructions[instructions.len() - 2].clone();
            prop_assert_eq!(guard, Instruction::JumpUnless((end - guard_next) as i64));
            prop_assert_eq!(back, Instruction::Jump(-(back_next as i64)));
        }
    }
}
