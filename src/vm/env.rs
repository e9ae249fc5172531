use std::rc::Rc;

use log::debug;

use crate::{
    common::{bytecode::Bytecode, config::Config},
    kernel::Output,
    vm::{
        capability::Conversion,
        scope::Scope,
        trace::{Fault, Trace},
        value::{Value, Variable},
        vm::VM,
    },
};

// every nested VM runs a few frames deep on the native stack,
// so deep recursion moves onto fresh segments
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// What a capability sees of the VM invoking it:
/// the caller's scope (copied, never shared, into nested VMs),
/// the scope of the object the capability was found on, if any,
/// and how deep the nesting already is.
pub struct Env<'a> {
    pub scope: &'a Scope,
    pub owner: Option<&'a Rc<Scope>>,
    pub config: &'a Rc<Config>,
    pub depth: usize,
    pub output: &'a Output,
}

/// Whether `callee` can be called at all.
pub fn callable(callee: &Variable) -> bool {
    matches!(callee.value, Value::Native(_)) || callee.capability("__call").is_some()
}

/// The number of arguments `callee` takes off the stack.
/// Falls back to the arity of `__call` when `__arity` isn't given.
pub fn arity(callee: &Variable) -> Option<usize> {
    if let Value::Native(native) = &callee.value {
        return Some(native.arity);
    }

    match callee.capability("__arity").map(|a| a.value) {
        Some(Value::Int(n)) => usize::try_from(n).ok(),
        Some(_) => None,
        None => callee.capability("__call").and_then(|call| arity(&call)),
    }
}

fn not_callable(callee: &Variable) -> Trace {
    Trace::fault(
        Fault::NotCallable,
        &format!("Cannot call {}", callee.value.as_code_string()),
    )
}

impl<'a> Env<'a> {
    /// Calls `callee` with arguments in source order.
    /// Natives run directly; anything else goes through its `__call`.
    pub fn invoke(&self, callee: &Variable, args: &[Variable]) -> Result<Option<Value>, Trace> {
        match &callee.value {
            Value::Native(native) => {
                let env = Env {
                    owner: callee.owner.as_ref(),
                    ..*self
                };
                native.call(args, &env)
            }
            _ => {
                let call = callee
                    .capability("__call")
                    .ok_or_else(|| not_callable(callee))?;
                self.invoke(&call, args)
            }
        }
    }

    /// Invokes the capability `name` of `value` with no arguments,
    /// if it has one.
    fn convert(&self, value: &Variable, name: &str) -> Result<Option<Value>, Trace> {
        match value.capability(name) {
            Some(capability) => self.invoke(&capability, &[]),
            None => Ok(None),
        }
    }

    /// Truthiness, by way of `__as_bool`.
    /// Values without it are truthy.
    pub fn truthy(&self, value: &Variable) -> Result<bool, Trace> {
        if let Value::Bool(b) = value.value {
            return Ok(b);
        }

        Ok(match self.convert(value, "__as_bool")? {
            Some(result) => result.truthy(),
            None => true,
        })
    }

    /// The `__as_string` form of a value.
    pub fn stringify(&self, value: &Variable) -> Result<String, Trace> {
        Ok(match self.convert(value, "__as_string")? {
            Some(Value::Str(s)) => s.to_string(),
            Some(other) => other.to_string_form(),
            None => value.value.to_string_form(),
        })
    }

    /// The `__as_code_string` form of a value.
    pub fn codify(&self, value: &Variable) -> Result<String, Trace> {
        Ok(match self.convert(value, "__as_code_string")? {
            Some(Value::Str(s)) => s.to_string(),
            Some(other) => other.to_code_form(),
            None => value.value.to_code_form(),
        })
    }

    /// Spins up a VM for a body.
    /// Its scope starts as a copy of the caller's bindings,
    /// then the owner's fields, then `bindings` (the parameters).
    fn nested(&self, body: Rc<Bytecode>, bindings: Vec<(String, Variable)>) -> Result<VM, Trace> {
        let depth = self.depth + 1;
        if depth > self.config.recursion_limit {
            return Err(Trace::fault(
                Fault::RecursionLimit,
                &format!(
                    "Maximum recursion depth of {} exceeded",
                    self.config.recursion_limit
                ),
            ));
        }

        let mut scope = self.scope.snapshot();
        if let Some(owner) = self.owner {
            scope.inherit(owner);
        }
        for (name, variable) in bindings {
            scope.bind(&name, variable);
        }

        debug!("entering nested vm at depth {}", depth);
        let mut vm = VM::nested(
            body,
            scope,
            depth,
            Rc::clone(self.config),
            self.output.clone(),
        );
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || vm.run())?;
        Ok(vm)
    }

    /// Runs a function or block body, resulting in the top of its stack.
    pub fn run_nested(
        &self,
        body: Rc<Bytecode>,
        bindings: Vec<(String, Variable)>,
    ) -> Result<Option<Value>, Trace> {
        let vm = self.nested(body, bindings)?;
        Ok(vm.top().cloned())
    }

    /// Runs an object body, resulting in its entire final scope:
    /// what it inherited as well as the bindings it made.
    pub fn construct(
        &self,
        body: Rc<Bytecode>,
        bindings: Vec<(String, Variable)>,
    ) -> Result<Scope, Trace> {
        let vm = self.nested(body, bindings)?;
        Ok(vm.into_scope())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::value::Native;

    fn env_with<T>(scope: &Scope, f: impl FnOnce(&Env) -> T) -> T {
        let config = Rc::new(Config::default());
        let output = Output::buffer();
        let env = Env {
            scope,
            owner: None,
            config: &config,
            depth: 0,
            output: &output,
        };
        f(&env)
    }

    #[test]
    fn arities() {
        let native = Variable::new(Value::Native(Native::new("two", 2, |_, _| Ok(None))));
        assert_eq!(arity(&native), Some(2));
        assert_eq!(arity(&Variable::new(Value::list(vec![]))), Some(1));
        assert_eq!(arity(&Variable::new(Value::Int(3))), None);
        assert!(!callable(&Variable::new(Value::Int(3))));
    }

    #[test]
    fn invoking_builtins() {
        let scope = Scope::new();
        env_with(&scope, |env| {
            let add = Variable::new(Value::Int(2)).capability("__add").unwrap();
            let result = env.invoke(&add, &[Variable::new(Value::Int(3))]);
            assert_eq!(result, Ok(Some(Value::Int(5))));

            let list = Variable::new(Value::list(vec![Value::Int(7), Value::Int(8)]));
            let result = env.invoke(&list, &[Variable::new(Value::Int(-1))]);
            assert_eq!(result, Ok(Some(Value::Int(8))));

            let error = env.invoke(&Variable::new(Value::Nil), &[]).unwrap_err();
            assert_eq!(error.kind, Fault::NotCallable);
        });
    }

    #[test]
    fn conversions() {
        let scope = Scope::new();
        env_with(&scope, |env| {
            assert_eq!(env.truthy(&Variable::new(Value::Nil)), Ok(false));
            assert_eq!(env.truthy(&Variable::new(Value::Int(0))), Ok(true));
            assert_eq!(env.stringify(&Variable::new(Value::str("hi"))), Ok("hi".to_string()));
            assert_eq!(env.codify(&Variable::new(Value::str("hi"))), Ok("\"hi\"".to_string()));

            // instances without `__as_bool` are truthy
            let empty = Variable::new(Value::Instance(Scope::new().share()));
            assert_eq!(env.truthy(&empty), Ok(true));
        });
    }
}
