//! Native functions bound in every top level scope.

use std::{cell::RefCell, rc::Rc};

use crate::vm::{
    env::Env,
    scope::Scope,
    trace::Trace,
    value::{Native, Value, Variable},
};

/// Where `print` writes to.
#[derive(Debug, Clone)]
pub enum Output {
    Stdout,
    /// Collected in memory, for embedding and tests.
    Buffer(Rc<RefCell<String>>),
}

impl Default for Output {
    fn default() -> Output {
        Output::Stdout
    }
}

impl Output {
    pub fn buffer() -> Output {
        Output::Buffer(Rc::new(RefCell::new(String::new())))
    }

    pub fn write_line(&self, line: &str) {
        match self {
            Output::Stdout => println!("{}", line),
            Output::Buffer(buffer) => {
                let mut buffer = buffer.borrow_mut();
                buffer.push_str(line);
                buffer.push('\n');
            }
        }
    }

    /// Everything written so far, if buffered.
    pub fn contents(&self) -> Option<String> {
        match self {
            Output::Stdout => None,
            Output::Buffer(buffer) => Some(buffer.borrow().clone()),
        }
    }
}

fn argument(args: &[Variable]) -> Variable {
    args.first()
        .cloned()
        .unwrap_or_else(|| Variable::new(Value::Nil))
}

fn print(args: &[Variable], env: &Env) -> Result<Option<Value>, Trace> {
    let line = env.stringify(&argument(args))?;
    env.output.write_line(&line);
    Ok(None)
}

fn repr(args: &[Variable], env: &Env) -> Result<Option<Value>, Trace> {
    Ok(Some(Value::str(&env.codify(&argument(args))?)))
}

fn type_of(args: &[Variable], _env: &Env) -> Result<Option<Value>, Trace> {
    Ok(Some(Value::str(argument(args).value.type_name())))
}

/// Binds the kernel functions into `scope`.
pub fn install(scope: &mut Scope) {
    let natives = [
        Native::new("print", 1, print),
        Native::new("repr", 1, repr),
        Native::new("type", 1, type_of),
    ];

    for native in natives {
        let name = native.name.clone();
        scope.bind(&name, Variable::new(Value::Native(native)));
    }
}
