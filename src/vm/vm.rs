use std::{mem, rc::Rc};

use log::trace;

use crate::{
    common::{
        bytecode::{Bytecode, Constant, Instruction, Malformed},
        config::Config,
    },
    kernel::{self, Output},
    vm::{
        env::{self, Env},
        scope::Scope,
        trace::{Fault, Trace},
        value::{Function, Value, Variable},
    },
};

/// Whether the interpreter loop keeps going.
enum Flow {
    Continue,
    Stop,
}

/// A `VM` executes bytecode.
/// Each VM's state is self-contained:
/// calls, blocks and object construction spin up a nested VM
/// over the callee's body, seeded with a copy of this VM's scope.
#[derive(Debug)]
pub struct VM {
    code: Rc<Bytecode>,
    ip: usize,
    stack: Vec<Variable>,
    scope: Scope,
    depth: usize,
    config: Rc<Config>,
    output: Output,
}

impl VM {
    /// Initialize a new top level VM, writing to stdout.
    /// To run the VM, bytecode must be passed to it through `load`.
    pub fn new(config: Config) -> VM {
        VM::with_output(config, Output::Stdout)
    }

    pub fn with_output(config: Config, output: Output) -> VM {
        let mut scope = Scope::new();
        kernel::install(&mut scope);
        VM::nested(Rc::new(Bytecode::empty()), scope, 0, Rc::new(config), output)
    }

    pub(crate) fn nested(
        code: Rc<Bytecode>,
        scope: Scope,
        depth: usize,
        config: Rc<Config>,
        output: Output,
    ) -> VM {
        VM {
            code,
            ip: 0,
            stack: vec![],
            scope,
            depth,
            config,
            output,
        }
    }

    /// Replaces the program, keeping the stack and scope.
    pub fn load(&mut self, code: Bytecode) {
        self.code = Rc::new(code);
        self.ip = 0;
    }

    /// The value on top of the stack, if any.
    pub fn top(&self) -> Option<&Value> {
        self.stack.last().map(|v| &v.value)
    }

    /// Bottom to top.
    pub fn stack(&self) -> impl Iterator<Item = &Value> {
        self.stack.iter().map(|v| &v.value)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn into_scope(self) -> Scope {
        self.scope
    }

    /// Resolves a (possibly dotted) name in the global scope.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.scope.resolve(path).map(|v| v.value)
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    fn env(&self) -> Env {
        Env {
            scope: &self.scope,
            owner: None,
            config: &self.config,
            depth: self.depth,
            output: &self.output,
        }
    }

    /// The code string form of the top of the stack,
    /// honoring a user `__as_code_string`.
    pub fn show_top(&self) -> Result<Option<String>, Trace> {
        match self.stack.last() {
            Some(top) => self.env().codify(top).map(Some),
            None => Ok(None),
        }
    }

    fn push(&mut self, variable: impl Into<Variable>) {
        self.stack.push(variable.into())
    }

    fn pop(&mut self) -> Result<Variable, Trace> {
        self.stack
            .pop()
            .ok_or_else(|| Trace::fault(Fault::StackUnderflow, "Nothing on the stack to pop"))
    }

    /// Takes `count` values off the stack, in the order they were pushed.
    fn pop_args(&mut self, count: usize) -> Result<Vec<Variable>, Trace> {
        let len = self.stack.len();
        if len < count {
            return Err(Trace::fault(
                Fault::ArityMismatch,
                &format!("Not enough arguments: expected {}, got {}", count, len),
            ));
        }
        Ok(self.stack.split_off(len - count))
    }

    fn malformed(malformed: Malformed) -> Trace {
        Trace::fault(
            Fault::Malformed,
            &format!("{} at byte {}", malformed.reason, malformed.offset),
        )
    }

    /// Moves the cursor relative to the end of the jump.
    fn jump(&mut self, delta: i64) -> Result<(), Trace> {
        let target = self.ip as i64 + delta;
        if target < 0 || target as usize > self.code.len() {
            return Err(Trace::fault(
                Fault::Malformed,
                &format!("Jump to {} lands outside of the bytecode", target),
            ));
        }
        self.ip = target as usize;
        Ok(())
    }

    /// Runs until the program ends or returns.
    /// On error, the trace points at the failing instruction.
    pub fn run(&mut self) -> Result<(), Trace> {
        loop {
            let offset = self.ip;
            let (instruction, next) = self
                .code
                .decode(offset)
                .map_err(VM::malformed)
                .map_err(|e| e.with_context(self.code.span_at(offset)))?;
            trace!("{:>3} {:>5}  {:?}", self.depth, offset, instruction);
            self.ip = next;

            let flow = self
                .step(instruction)
                .map_err(|e| e.with_context(self.code.span_at(offset)))?;

            if let Flow::Stop = flow {
                return Ok(());
            }
        }
    }

    fn step(&mut self, instruction: Instruction) -> Result<Flow, Trace> {
        match instruction {
            Instruction::End | Instruction::Return => return Ok(Flow::Stop),
            Instruction::DefineVar(name) | Instruction::Set(name) => self.set(&name)?,
            Instruction::DefineFn { name, params, body } => {
                let body = Rc::new(self.code.slice(body));
                let function = Function { name, params, body };
                self.scope.bind(
                    &function.name.clone(),
                    Value::Function(Rc::new(function)).into(),
                );
            }
            Instruction::DefineObject { name, params, body } => {
                let body = Rc::new(self.code.slice(body));
                self.define_object(name, params, body)?;
            }
            Instruction::Get(name) => self.get_var(&name)?,
            Instruction::Const(constant) => self.constant(constant)?,
            Instruction::Binary(op) => self.binary(op)?,
            Instruction::Call => self.call()?,
            Instruction::New => self.new_()?,
            Instruction::JumpIf(delta) => {
                let condition = self.pop()?;
                if self.env().truthy(&condition)? {
                    self.jump(delta)?;
                }
            }
            Instruction::JumpUnless(delta) => {
                let condition = self.pop()?;
                if !self.env().truthy(&condition)? {
                    self.jump(delta)?;
                }
            }
            Instruction::Jump(delta) => self.jump(delta)?,
            Instruction::Reset => self.reset()?,
            Instruction::Iter => self.iter()?,
        }

        Ok(Flow::Continue)
    }

    /// Binds the top of the stack, leaving it there:
    /// assignments evaluate to their value.
    fn set(&mut self, name: &str) -> Result<(), Trace> {
        let value = self.pop()?;
        self.scope.bind(name, value.clone());
        self.push(value);
        Ok(())
    }

    fn get_var(&mut self, name: &str) -> Result<(), Trace> {
        let variable = self.scope.resolve(name).ok_or_else(|| {
            Trace::fault(
                Fault::NoSuchVariable,
                &format!("No such variable `{}`", name),
            )
        })?;
        self.push(variable);
        Ok(())
    }

    fn constant(&mut self, constant: Constant) -> Result<(), Trace> {
        let value = match constant {
            Constant::Bool(b) => Value::Bool(b),
            Constant::Int(i) => Value::Int(i),
            Constant::Num(n) => Value::Num(n),
            Constant::Str(s) => Value::str(&s),
            Constant::Nil => Value::Nil,
            Constant::List(count) => {
                let len = self.stack.len();
                if len < count {
                    return Err(Trace::fault(
                        Fault::StackUnderflow,
                        &format!("List of {} items, but only {} on the stack", count, len),
                    ));
                }
                let items = self.stack.split_off(len - count);
                Value::list(items.into_iter().map(|v| v.value).collect())
            }
            Constant::Block(body) => Value::Block(Rc::new(self.code.slice(body))),
        };
        self.push(value);
        Ok(())
    }

    /// Objects without parameters are built right away,
    /// every binding of their final scope bound as `Name:field`.
    /// Others wait for `new`.
    fn define_object(
        &mut self,
        name: String,
        params: Vec<String>,
        body: Rc<Bytecode>,
    ) -> Result<(), Trace> {
        if !params.is_empty() {
            let object = Function { name, params, body };
            self.scope.bind(
                &object.name.clone(),
                Value::Object(Rc::new(object)).into(),
            );
            return Ok(());
        }

        let fields = self.env().construct(body, vec![])?;
        let fields = fields.share();
        for (field, variable) in fields.bindings() {
            let variable = Variable {
                value: variable.value.clone(),
                owner: Some(Rc::clone(&fields)),
            };
            self.scope.bind(&format!("{}:{}", name, field), variable);
        }
        Ok(())
    }

    fn binary(&mut self, op: crate::common::opcode::Opcode) -> Result<(), Trace> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let name = op.capability().ok_or_else(|| {
            Trace::fault(Fault::Malformed, &format!("{:?} is not an operator", op))
        })?;

        let capability = lhs.capability(name).ok_or_else(|| {
            Trace::fault(
                Fault::UnsupportedOperation,
                &format!("Can't `{}` on {}", name, lhs.value.type_name()),
            )
        })?;
        let result = self.env().invoke(&capability, &[rhs])?;
        self.push(result.unwrap_or(Value::Nil));
        Ok(())
    }

    /// Pops the callee, then as many arguments as it takes.
    fn call(&mut self) -> Result<(), Trace> {
        let callee = self.pop()?;
        let arity = env::arity(&callee)
            .filter(|_| env::callable(&callee))
            .ok_or_else(|| {
                Trace::fault(
                    Fault::NotCallable,
                    &format!("Cannot call {}", callee.value.as_code_string()),
                )
            })?;

        let args = self.pop_args(arity)?;
        if let Some(result) = self.env().invoke(&callee, &args)? {
            self.push(result);
        }
        Ok(())
    }

    fn new_(&mut self) -> Result<(), Trace> {
        let callee = self.pop()?;
        let (new, arity) = callee
            .capability("__new")
            .and_then(|new| env::arity(&new).map(|arity| (new, arity)))
            .ok_or_else(|| {
                Trace::fault(
                    Fault::NotCallable,
                    &format!("Cannot instantiate {}", callee.value.as_code_string()),
                )
            })?;

        let args = self.pop_args(arity)?;
        if let Some(instance) = self.env().invoke(&new, &args)? {
            self.push(instance);
        }
        Ok(())
    }

    fn not_iterable(value: &Variable) -> Trace {
        Trace::fault(
            Fault::UnsupportedOperation,
            &format!("Can't iterate over {}", value.value.type_name()),
        )
    }

    /// Rewinds the top of the stack through `__reset`.
    /// A value returned by `__reset` replaces the original.
    fn reset(&mut self) -> Result<(), Trace> {
        let value = self.pop()?;
        let reset = value
            .capability("__reset")
            .ok_or_else(|| VM::not_iterable(&value))?;
        match self.env().invoke(&reset, &[])? {
            Some(rewound) => self.push(rewound),
            None => self.push(value),
        }
        Ok(())
    }

    /// Replaces the top of the stack with its next item, `nil` once exhausted.
    fn iter(&mut self) -> Result<(), Trace> {
        let value = self.pop()?;
        let iter = value
            .capability("__iter")
            .ok_or_else(|| VM::not_iterable(&value))?;
        let item = self.env().invoke(&iter, &[])?;
        self.push(item.unwrap_or(Value::Nil));
        Ok(())
    }

    /// Takes the stack, leaving it empty.
    pub fn take_stack(&mut self) -> Vec<Value> {
        mem::take(&mut self.stack)
            .into_iter()
            .map(|v| v.value)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        common::{opcode::Opcode, source::Source},
        compiler,
    };

    fn vm(source: &str) -> (VM, Result<(), Trace>) {
        let config = Config::default();
        let code = compiler::gen(Source::source(source), &config).unwrap();
        let mut vm = VM::with_output(config, Output::buffer());
        vm.load(code);
        let result = vm.run();
        (vm, result)
    }

    fn top(source: &str) -> Value {
        let (vm, result) = vm(source);
        result.unwrap();
        vm.top().cloned().unwrap()
    }

    fn fault(source: &str) -> Fault {
        let (_, result) = vm(source);
        result.unwrap_err().kind
    }

    #[test]
    fn arithmetic() {
        assert_eq!(top("2 + 3 * 4"), Value::Int(14));
        assert_eq!(top("10 - 3 - 2"), Value::Int(9));
        assert_eq!(top("(10 - 3) - 2"), Value::Int(5));
        assert_eq!(top("7 / 2"), Value::Int(3));
        assert_eq!(top("1.5 * 2"), Value::Num(3.0));
        assert_eq!(top("\"ab\" + \"cd\""), Value::str("abcd"));
    }

    #[test]
    fn assignment_evaluates_to_value() {
        let (vm, result) = vm("x = 4");
        result.unwrap();
        assert_eq!(vm.top(), Some(&Value::Int(4)));
        assert_eq!(vm.get("x"), Some(Value::Int(4)));
    }

    #[test]
    fn compound_assignment() {
        let (vm, result) = vm("x = 4\nx += 3\nx *= 2");
        result.unwrap();
        assert_eq!(vm.get("x"), Some(Value::Int(14)));
    }

    #[test]
    fn branches() {
        assert_eq!(top("if true {1} else {2}"), Value::Int(1));
        assert_eq!(top("if false {1} else {2}"), Value::Int(2));
        assert_eq!(top("if nil {1} else {2}"), Value::Int(2));
        assert_eq!(top("if 0 {1} else {2}"), Value::Int(1));

        let (vm, result) = vm("if false { y = 1 }\nx = 0");
        result.unwrap();
        assert_eq!(vm.get("y"), None);
    }

    #[test]
    fn while_counts() {
        let (vm, result) = vm("i = 0\nn = 0\nwhile i < 3 { i = i + 1\nn = n + 1 }");
        result.unwrap();
        assert_eq!(vm.get("i"), Some(Value::Int(3)));
        assert_eq!(vm.get("n"), Some(Value::Int(3)));
    }

    #[test]
    fn for_binds_in_order() {
        let (vm, result) = vm("seen = []\nfor x in [1, 2, 3] { seen = seen + x }");
        result.unwrap();
        assert_eq!(
            vm.get("seen"),
            Some(Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
        assert_eq!(vm.get("x"), Some(Value::Nil));
    }

    #[test]
    fn functions() {
        assert_eq!(top("fn add(a, b) a + b\nadd(2, 5)"), Value::Int(7));
        assert_eq!(top("fn sub(a, b) a - b\nsub(2, 5)"), Value::Int(-3));
        assert_eq!(
            top("fn fact(n) if n <= 1 {1} else {n * fact(n - 1)}\nfact(10)"),
            Value::Int(3628800)
        );
    }

    #[test]
    fn return_stops_early() {
        assert_eq!(top("fn f(a) { return a\n a + 1 }\nf(3)"), Value::Int(3));
    }

    #[test]
    fn blocks_bind_underscore() {
        assert_eq!(top("double = { _ * 2 }\ndouble(21)"), Value::Int(42));
    }

    #[test]
    fn lists_index() {
        assert_eq!(top("xs = [5, 6, 7]\nxs(1)"), Value::Int(6));
        assert_eq!(top("xs = [5, 6, 7]\nxs(-1)"), Value::Int(7));
        assert_eq!(top("xs = [5, 6, 7]\nxs(9)"), Value::Nil);
    }

    #[test]
    fn call_faults() {
        assert_eq!(fault("fn f(a, b) a\nf(1)"), Fault::ArityMismatch);
        assert_eq!(fault("x = 1\nx()"), Fault::NotCallable);
        assert_eq!(fault("y"), Fault::NoSuchVariable);
        assert_eq!(fault("1 / 0"), Fault::Arithmetic);
        assert_eq!(fault("nil < 1"), Fault::UnsupportedOperation);
        assert_eq!(fault("for x in 3 { }"), Fault::UnsupportedOperation);
    }

    #[test]
    fn objects() {
        let (vm, result) = vm("object Point(x, y) { sum = x + y }\np = new Point(1, 2)");
        result.unwrap();
        assert_eq!(vm.get("p.x"), Some(Value::Int(1)));
        assert_eq!(vm.get("p.sum"), Some(Value::Int(3)));
        assert_eq!(vm.get("p.z"), None);
    }

    #[test]
    fn singletons_flatten() {
        let (vm, result) = vm("outer = 1\nobject Config { debug = true\nlevel = 3 }");
        result.unwrap();
        assert_eq!(vm.get("Config:debug"), Some(Value::Bool(true)));
        assert_eq!(vm.get("Config:level"), Some(Value::Int(3)));
        assert_eq!(vm.get("Config:outer"), Some(Value::Int(1)));
    }

    #[test]
    fn instances_keep_inherited_bindings() {
        let source = "\
            outer = 1\n\
            object P(x) { y = 2 }\n\
            p = new P(5)\n\
            [p.outer, p.x, p.y]";
        assert_eq!(
            top(source),
            Value::list(vec![Value::Int(1), Value::Int(5), Value::Int(2)])
        );
    }

    #[test]
    fn leftover_values_become_arguments() {
        let source = "x = 1\nfn f(a, b) [a, b]\nf(2)";
        assert_eq!(
            top(source),
            Value::list(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn recursion_near_the_default_limit() {
        let source = "fn down(n) if n < 195 { down(n + 1) } else { n }\ndown(0)";
        assert_eq!(top(source), Value::Int(195));
        assert_eq!(fault("fn down(n) down(n + 1)\ndown(0)"), Fault::RecursionLimit);
    }

    #[test]
    fn methods_see_fields() {
        let source = "\
            object Counter(start) { fn next() start + 1 }\n\
            c = new Counter(41)\n\
            c.next()";
        assert_eq!(top(source), Value::Int(42));
    }

    #[test]
    fn operator_overloading() {
        let source = "\
            object V(x) { fn __add(other) new V(x + other.x) }\n\
            a = new V(1)\n\
            b = new V(2)\n\
            c = a + b\n\
            c.x";
        let (vm, result) = vm(source);
        result.unwrap();
        assert_eq!(vm.top(), Some(&Value::Int(3)));
    }

    #[test]
    fn snapshots_not_references() {
        let (vm, result) = vm("x = 1\nfn get() x\nx = 2\nold = get()\nx = 3");
        result.unwrap();
        assert_eq!(vm.get("old"), Some(Value::Int(2)));
        assert_eq!(vm.get("x"), Some(Value::Int(3)));
    }

    #[test]
    fn recursion_limit() {
        let config = Config::default().with_recursion_limit(10);
        let code = compiler::gen(Source::source("fn loop(n) loop(n)\nloop(1)"), &config).unwrap();
        let mut vm = VM::with_output(config, Output::buffer());
        vm.load(code);
        let trace = vm.run().unwrap_err();
        assert_eq!(trace.kind, Fault::RecursionLimit);
        // one span per nested call site, plus the innermost
        assert_eq!(trace.spans().len(), 11);
    }

    #[test]
    fn print_writes_output() {
        let (vm, result) = vm("print(\"hi\")\nprint([1, \"a\"])\nprint(repr(\"q\"))");
        result.unwrap();
        assert_eq!(
            vm.output().contents(),
            Some("hi\n[1, a]\n\"q\"\n".to_string())
        );
    }

    #[test]
    fn load_keeps_state() {
        let config = Config::default();
        let mut vm = VM::with_output(config.clone(), Output::buffer());
        for line in ["x = 2", "y = x * 5"] {
            vm.load(compiler::gen(Source::source(line), &config).unwrap());
            vm.run().unwrap();
        }
        assert_eq!(vm.get("y"), Some(Value::Int(10)));
        assert_eq!(vm.stack().count(), 2);
        assert_eq!(vm.take_stack().len(), 2);
        assert_eq!(vm.top(), None);
    }

    #[test]
    fn hand_written_bytecode() {
        // Const <condition> JumpIf(3) Const nil End End
        let guarded = |condition: &str| {
            let mut code = Bytecode::empty();
            code.emit(Opcode::Const);
            code.emit_marker(crate::common::opcode::Marker::Bool);
            code.emit_str(condition);
            code.emit(Opcode::JumpIf);
            code.emit_number(3);
            code.emit(Opcode::Const);
            code.emit_marker(crate::common::opcode::Marker::Nil);
            code.emit(Opcode::End);
            code.emit(Opcode::End);

            let mut vm = VM::with_output(Config::default(), Output::buffer());
            vm.load(code);
            vm.run().unwrap();
            vm.top().cloned()
        };

        assert_eq!(guarded("false"), Some(Value::Nil));
        // the condition is consumed and `Const nil` skipped
        assert_eq!(guarded("true"), None);
    }

    #[test]
    fn malformed_bytecode() {
        let mut vm = VM::with_output(Config::default(), Output::buffer());
        vm.load(Bytecode::from_bytes(vec![0xff]));
        assert_eq!(vm.run().unwrap_err().kind, Fault::Malformed);

        vm.load(Bytecode::from_bytes(vec![Opcode::Jump as u8, b'9', b'9', 0x18]));
        assert_eq!(vm.run().unwrap_err().kind, Fault::Malformed);
    }
}
