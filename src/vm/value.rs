use std::{
    cell::Cell,
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

use crate::{
    common::bytecode::Bytecode,
    vm::{env::Env, scope::Scope, trace::Trace},
};

/// A user function or a deferred object definition:
/// parameters and a self-terminating body.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Bytecode>,
}

/// A list and the position of its iteration cursor.
/// Clones share the cursor, so a list can be advanced
/// through any variable holding it.
#[derive(Debug, Clone)]
pub struct List {
    pub items: Rc<Vec<Value>>,
    cursor: Rc<Cell<usize>>,
}

impl List {
    pub fn new(items: Vec<Value>) -> List {
        List {
            items: Rc::new(items),
            cursor: Rc::new(Cell::new(0)),
        }
    }

    /// The same items behind a cursor at the start.
    pub fn rewound(&self) -> List {
        List {
            items: Rc::clone(&self.items),
            cursor: Rc::new(Cell::new(0)),
        }
    }

    /// The item under the cursor, advancing it.
    pub fn advance(&self) -> Option<Value> {
        let position = self.cursor.get();
        let item = self.items.get(position).cloned();
        if item.is_some() {
            self.cursor.set(position + 1);
        }
        item
    }
}

pub type NativeFn = dyn Fn(&[Variable], &Env) -> Result<Option<Value>, Trace>;

/// A function implemented in Rust.
/// Returning `None` means the call has no result.
#[derive(Clone)]
pub struct Native {
    pub name: String,
    pub arity: usize,
    fun: Rc<NativeFn>,
}

impl Native {
    pub fn new(
        name: &str,
        arity: usize,
        fun: impl Fn(&[Variable], &Env) -> Result<Option<Value>, Trace> + 'static,
    ) -> Native {
        Native {
            name: name.to_string(),
            arity,
            fun: Rc::new(fun),
        }
    }

    pub fn call(&self, args: &[Variable], env: &Env) -> Result<Option<Value>, Trace> {
        (self.fun)(args, env)
    }
}

impl Debug for Native {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Native({}/{})", self.name, self.arity)
    }
}

/// Every value the VM can hold.
/// What a value can do is looked up by name in its capability table,
/// see `vm::capability`.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Num(f64),
    Str(Rc<str>),
    Bool(bool),
    Nil,
    List(List),
    Function(Rc<Function>),
    /// A block literal; called with one argument bound to `_`.
    Block(Rc<Bytecode>),
    /// An object definition waiting for `new`.
    Object(Rc<Function>),
    /// The fields of a constructed object.
    Instance(Rc<Scope>),
    Native(Native),
}

impl Value {
    pub fn str(string: &str) -> Value {
        Value::Str(Rc::from(string))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(List::new(items))
    }

    /// The name `type` reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Num(_) => "num",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Nil => "nil",
            Value::List(_) => "list",
            Value::Function(_) => "fn",
            Value::Block(_) => "block",
            Value::Object(_) => "object",
            Value::Instance(_) => "instance",
            Value::Native(_) => "native",
        }
    }
}

/// Structural equality; callables compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Int(a), Value::Num(b)) | (Value::Num(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::List(a), Value::List(b)) => a.items == b.items,
            (Value::Function(a), Value::Function(b)) | (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.fun, &b.fun),
            _ => false,
        }
    }
}

/// A value as bound to a name.
/// `owner` is set when the value was found in an object's scope,
/// so calling it sees that object's fields.
#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub owner: Option<Rc<Scope>>,
}

impl Variable {
    pub fn new(value: Value) -> Variable {
        Variable { value, owner: None }
    }

    /// Looks up a capability (or, on an instance, a field) by name.
    pub fn capability(&self, name: &str) -> Option<Variable> {
        match &self.value {
            Value::Instance(scope) => scope.get(name).map(|field| Variable {
                value: field.value.clone(),
                owner: Some(Rc::clone(scope)),
            }),
            value => value.builtin(name).map(|value| Variable {
                value,
                owner: self.owner.clone(),
            }),
        }
    }
}

impl From<Value> for Variable {
    fn from(value: Value) -> Variable {
        Variable::new(value)
    }
}

/// Formats a float so it always reads back as one.
fn float(n: f64) -> String {
    format!("{:?}", n)
}

/// Quotes a string the way it would be written in source.
fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\0' => quoted.push_str("\\0"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

impl Value {
    /// The builtin `__as_string` form.
    pub fn as_string(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::List(list) => {
                let items: Vec<_> = list.items.iter().map(|i| i.as_string()).collect();
                format!("[{}]", items.join(", "))
            }
            other => other.as_code_string(),
        }
    }

    /// The builtin `__as_code_string` form.
    pub fn as_code_string(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Num(n) => float(*n),
            Value::Str(s) => quote(s),
            Value::Bool(b) => b.to_string(),
            Value::Nil => "nil".to_string(),
            Value::List(list) => {
                let items: Vec<_> = list.items.iter().map(|i| i.as_code_string()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Function(f) => format!("<fn {}({})>", f.name, f.params.join(", ")),
            Value::Block(_) => "<block>".to_string(),
            Value::Object(o) => format!("<object {}({})>", o.name, o.params.join(", ")),
            Value::Instance(scope) => {
                let fields: Vec<_> = scope
                    .own_bindings()
                    .map(|(name, field)| format!("{}: {}", name, field.value.as_code_string()))
                    .collect();
                format!("{{{}}}", fields.join(", "))
            }
            Value::Native(n) => format!("<native {}>", n.name),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_strings() {
        assert_eq!(Value::Int(-3).as_code_string(), "-3");
        assert_eq!(Value::Num(2.0).as_code_string(), "2.0");
        assert_eq!(Value::str("a\"b\n").as_code_string(), "\"a\\\"b\\n\"");
        assert_eq!(Value::str("plain").as_string(), "plain");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::str("x"), Value::Nil]).as_code_string(),
            "[1, \"x\", nil]"
        );
        assert_eq!(
            Value::list(vec![Value::str("x")]).as_string(),
            "[x]"
        );
    }

    #[test]
    fn numeric_equality_promotes() {
        assert_eq!(Value::Int(2), Value::Num(2.0));
        assert_ne!(Value::Int(2), Value::str("2"));
        assert_ne!(Value::Nil, Value::Bool(false));
    }

    #[test]
    fn cursors() {
        let list = List::new(vec![Value::Int(1), Value::Int(2)]);
        let alias = list.clone();
        assert_eq!(list.advance(), Some(Value::Int(1)));
        assert_eq!(alias.advance(), Some(Value::Int(2)));
        assert_eq!(list.advance(), None);

        let fresh = list.rewound();
        assert_eq!(fresh.advance(), Some(Value::Int(1)));
        assert_eq!(list.advance(), None);
    }

    #[test]
    fn instance_fields() {
        let mut scope = Scope::new();
        scope.bind("x", Variable::new(Value::Int(1)));
        let point = Variable::new(Value::Instance(scope.share()));

        let x = point.capability("x").map(|v| v.value);
        assert_eq!(x, Some(Value::Int(1)));
        assert!(point.capability("__add").is_none());
        assert_eq!(point.value.as_code_string(), "{x: 1}");
    }
}
