//! Capability tables.
//! Every operation the VM performs on a value
//! is looked up here by its name (`__add`, `__call`, ...).
//! The VM only looks at a value's kind for two shortcuts:
//! a `Bool` condition is read directly,
//! and a native is called directly, being its own `__call`.

use std::rc::Rc;

use crate::vm::{
    env::Env,
    trace::{Fault, Trace},
    value::{Native, Value, Variable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// A capability name, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    Arith(Arith),
    Compare(Compare),
    AsString,
    AsCodeString,
    AsBool,
    Call,
    Arity,
    New,
    Iter,
    Reset,
}

impl Cap {
    pub fn from_name(name: &str) -> Option<Cap> {
        Some(match name {
            "__add" => Cap::Arith(Arith::Add),
            "__sub" => Cap::Arith(Arith::Sub),
            "__mul" => Cap::Arith(Arith::Mul),
            "__div" => Cap::Arith(Arith::Div),
            "__mod" => Cap::Arith(Arith::Mod),
            "__pow" => Cap::Arith(Arith::Pow),
            "__eq" => Cap::Compare(Compare::Eq),
            "__neq" => Cap::Compare(Compare::Ne),
            "__lt" => Cap::Compare(Compare::Lt),
            "__gt" => Cap::Compare(Compare::Gt),
            "__le" => Cap::Compare(Compare::Le),
            "__ge" => Cap::Compare(Compare::Ge),
            "__as_string" => Cap::AsString,
            "__as_code_string" => Cap::AsCodeString,
            "__as_bool" => Cap::AsBool,
            "__call" => Cap::Call,
            "__arity" => Cap::Arity,
            "__new" => Cap::New,
            "__iter" => Cap::Iter,
            "__reset" => Cap::Reset,
            _ => return None,
        })
    }
}

fn unsupported(op: &str, lhs: &Value, rhs: &Value) -> Trace {
    Trace::fault(
        Fault::UnsupportedOperation,
        &format!(
            "Can't {} {} and {}",
            op,
            lhs.type_name(),
            rhs.type_name()
        ),
    )
}

fn arithmetic_fault(message: &str) -> Trace {
    Trace::fault(Fault::Arithmetic, message)
}

/// `__add` through `__pow`.
pub trait Arithmetic {
    fn arithmetic(&self, op: Arith, other: &Value) -> Result<Value, Trace>;
}

/// `__eq` through `__ge`.
pub trait Comparison {
    fn compare(&self, op: Compare, other: &Value) -> Result<bool, Trace>;
}

/// `__as_string`, `__as_code_string` and `__as_bool`.
pub trait Conversion {
    fn to_string_form(&self) -> String;
    fn to_code_form(&self) -> String;
    fn truthy(&self) -> bool;
}

/// `__call`, `__arity` and `__new`.
pub trait Callable {
    fn arity(&self) -> Option<usize>;
    fn call(&self, args: &[Variable], env: &Env) -> Result<Option<Value>, Trace>;
    fn instantiate(&self, args: &[Variable], env: &Env) -> Result<Value, Trace>;
}

/// `__reset` and `__iter`.
pub trait Iterable {
    fn reset(&self) -> Option<Value>;
    fn next_item(&self) -> Option<Value>;
}

/// Floors like the quotient of the integers, not towards zero.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn ints(op: Arith, a: i64, b: i64) -> Result<Value, Trace> {
    let overflow = || arithmetic_fault("Integer overflow");
    let result = match op {
        Arith::Add => a.checked_add(b).ok_or_else(overflow)?,
        Arith::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        Arith::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        Arith::Div | Arith::Mod if b == 0 => {
            return Err(arithmetic_fault("Division by zero"));
        }
        Arith::Div => floor_div(a, b).ok_or_else(overflow)?,
        Arith::Mod => floor_mod(a, b).ok_or_else(overflow)?,
        Arith::Pow => match u32::try_from(b) {
            Ok(exp) => a.checked_pow(exp).ok_or_else(overflow)?,
            Err(_) if b < 0 => return Ok(Value::Num((a as f64).powf(b as f64))),
            Err(_) => return Err(overflow()),
        },
    };
    Ok(Value::Int(result))
}

fn nums(op: Arith, a: f64, b: f64) -> Value {
    Value::Num(match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => a / b,
        Arith::Mod => a - b * (a / b).floor(),
        Arith::Pow => a.powf(b),
    })
}

/// Longest string (in bytes) or list (in items) a repeat may build.
pub const MAX_REPEAT: usize = 1 << 24;

/// How many times to repeat something `len` long,
/// refusing negative counts and results past `MAX_REPEAT`.
fn count(len: usize, times: i64) -> Result<usize, Trace> {
    let times = usize::try_from(times).map_err(|_| arithmetic_fault("Negative repeat count"))?;
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT => Ok(times),
        _ => Err(arithmetic_fault(&format!(
            "Repeating {} by {} would exceed {} elements",
            len, times, MAX_REPEAT
        ))),
    }
}

impl Arithmetic for Value {
    fn arithmetic(&self, op: Arith, other: &Value) -> Result<Value, Trace> {
        use Value::*;
        let name = format!("{:?}", op).to_lowercase();

        match (self, other) {
            (Int(a), Int(b)) => ints(op, *a, *b),
            (Int(a), Num(b)) => Ok(nums(op, *a as f64, *b)),
            (Num(a), Int(b)) => Ok(nums(op, *a, *b as f64)),
            (Num(a), Num(b)) => Ok(nums(op, *a, *b)),
            (Str(a), Str(b)) if op == Arith::Add => Ok(Value::str(&format!("{}{}", a, b))),
            (Str(a), Int(b)) if op == Arith::Mul => Ok(Value::str(&a.repeat(count(a.len(), *b)?))),
            (List(a), item) if op == Arith::Add => {
                let mut items = a.items.to_vec();
                items.push(item.clone());
                Ok(Value::list(items))
            }
            (List(a), Int(b)) if op == Arith::Mul => {
                let times = count(a.items.len(), *b)?;
                let items = (0..times).flat_map(|_| a.items.iter().cloned());
                Ok(Value::list(items.collect()))
            }
            (lhs, rhs) => Err(unsupported(&name, lhs, rhs)),
        }
    }
}

impl Comparison for Value {
    fn compare(&self, op: Compare, other: &Value) -> Result<bool, Trace> {
        use std::cmp::Ordering;
        use Value::*;

        match op {
            Compare::Eq => return Ok(self == other),
            Compare::Ne => return Ok(self != other),
            _ => (),
        }

        let ordering = match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(a), Num(b)) => (*a as f64).partial_cmp(b),
            (Num(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Num(a), Num(b)) => a.partial_cmp(b),
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (lhs, rhs) => return Err(unsupported("compare", lhs, rhs)),
        };

        // NaN compares false either way
        Ok(match ordering {
            None => false,
            Some(ordering) => match op {
                Compare::Lt => ordering == Ordering::Less,
                Compare::Gt => ordering == Ordering::Greater,
                Compare::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            },
        })
    }
}

impl Conversion for Value {
    fn to_string_form(&self) -> String {
        self.as_string()
    }

    fn to_code_form(&self) -> String {
        self.as_code_string()
    }

    fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl Callable for Value {
    fn arity(&self) -> Option<usize> {
        match self {
            Value::Function(f) | Value::Object(f) => Some(f.params.len()),
            Value::Block(_) | Value::List(_) => Some(1),
            Value::Native(n) => Some(n.arity),
            _ => None,
        }
    }

    fn call(&self, args: &[Variable], env: &Env) -> Result<Option<Value>, Trace> {
        match self {
            Value::Function(f) => {
                let bindings = f.params.iter().cloned().zip(args.iter().cloned());
                env.run_nested(Rc::clone(&f.body), bindings.collect())
            }
            Value::Block(body) => {
                let argument = args.first().cloned().unwrap_or_else(|| Value::Nil.into());
                env.run_nested(
                    Rc::clone(body),
                    vec![(crate::compiler::gen::ANONYMOUS.to_string(), argument)],
                )
            }
            Value::List(list) => {
                let index = match args.first().map(|a| &a.value) {
                    Some(Value::Int(i)) => *i,
                    Some(other) => {
                        return Err(Trace::fault(
                            Fault::UnsupportedOperation,
                            &format!("Can't index a list with {}", other.type_name()),
                        ))
                    }
                    None => return Ok(Some(Value::Nil)),
                };
                let len = list.items.len() as i64;
                let index = if index < 0 { len + index } else { index };
                let item = usize::try_from(index)
                    .ok()
                    .and_then(|i| list.items.get(i).cloned());
                Ok(Some(item.unwrap_or(Value::Nil)))
            }
            Value::Native(native) => native.call(args, env),
            other => Err(Trace::fault(
                Fault::NotCallable,
                &format!("Cannot call {}", other.as_code_string()),
            )),
        }
    }

    fn instantiate(&self, args: &[Variable], env: &Env) -> Result<Value, Trace> {
        match self {
            Value::Object(o) => {
                let bindings = o.params.iter().cloned().zip(args.iter().cloned());
                let scope = env.construct(Rc::clone(&o.body), bindings.collect())?;
                Ok(Value::Instance(scope.share()))
            }
            other => Err(Trace::fault(
                Fault::NotCallable,
                &format!("Cannot instantiate {}", other.as_code_string()),
            )),
        }
    }
}

impl Iterable for Value {
    fn reset(&self) -> Option<Value> {
        match self {
            Value::List(list) => Some(Value::List(list.rewound())),
            _ => None,
        }
    }

    fn next_item(&self) -> Option<Value> {
        match self {
            Value::List(list) => Some(list.advance().unwrap_or(Value::Nil)),
            _ => None,
        }
    }
}

impl Value {
    /// Whether this kind of value has the capability at all.
    fn supports(&self, cap: Cap) -> bool {
        let equality = matches!(cap, Cap::Compare(Compare::Eq) | Cap::Compare(Compare::Ne));
        let conversion = matches!(cap, Cap::AsString | Cap::AsCodeString | Cap::AsBool);
        let concat = matches!(cap, Cap::Arith(Arith::Add) | Cap::Arith(Arith::Mul));

        match self {
            Value::Int(_) | Value::Num(_) => {
                matches!(cap, Cap::Arith(_) | Cap::Compare(_)) || conversion
            }
            Value::Str(_) => concat || matches!(cap, Cap::Compare(_)) || conversion,
            Value::Bool(_) | Value::Nil => equality || conversion,
            Value::List(_) => {
                concat
                    || matches!(cap, Cap::Call | Cap::Arity | Cap::Iter | Cap::Reset)
                    || equality
                    || conversion
            }
            Value::Function(_) | Value::Block(_) => {
                matches!(cap, Cap::Call | Cap::Arity) || equality || conversion
            }
            Value::Object(_) => matches!(cap, Cap::New | Cap::Arity) || equality || conversion,
            Value::Native(_) => matches!(cap, Cap::Call | Cap::Arity | Cap::AsString | Cap::AsBool),
            // an instance's table is its scope
            Value::Instance(_) => false,
        }
    }

    /// Runs a capability of this value.
    fn dispatch(&self, cap: Cap, args: &[Variable], env: &Env) -> Result<Option<Value>, Trace> {
        let other = || args.first().map(|a| a.value.clone()).unwrap_or(Value::Nil);

        Ok(Some(match cap {
            Cap::Arith(op) => self.arithmetic(op, &other())?,
            Cap::Compare(op) => Value::Bool(self.compare(op, &other())?),
            Cap::AsString => Value::str(&self.to_string_form()),
            Cap::AsCodeString => Value::str(&self.to_code_form()),
            Cap::AsBool => Value::Bool(self.truthy()),
            Cap::Call => return self.call(args, env),
            Cap::New => self.instantiate(args, env)?,
            Cap::Iter => self.next_item().unwrap_or(Value::Nil),
            Cap::Reset => return Ok(self.reset()),
            Cap::Arity => Value::Int(self.arity().unwrap_or(0) as i64),
        }))
    }

    /// The builtin capability table entry `name`, if this value has one.
    /// Operations come back as natives bound to this value;
    /// `__arity` comes back as an `Int`.
    pub fn builtin(&self, name: &str) -> Option<Value> {
        let cap = Cap::from_name(name)?;
        if !self.supports(cap) {
            return None;
        }

        if let Value::Native(native) = self {
            // a native is its own `__call`
            if cap == Cap::Call {
                return Some(Value::Native(native.clone()));
            }
        }

        Some(match cap {
            Cap::Arity => Value::Int(self.arity().unwrap_or(0) as i64),
            _ => {
                let arity = match cap {
                    Cap::Arith(_) | Cap::Compare(_) => 1,
                    Cap::Call | Cap::New => self.arity().unwrap_or(0),
                    _ => 0,
                };
                let receiver = self.clone();
                Value::Native(Native::new(name, arity, move |args, env| {
                    receiver.dispatch(cap, args, env)
                }))
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn arith(a: Value, op: Arith, b: Value) -> Result<Value, Trace> {
        a.arithmetic(op, &b)
    }

    #[test]
    fn names_round_trip() {
        for name in ["__add", "__neq", "__as_code_string", "__arity", "__reset"] {
            assert!(Cap::from_name(name).is_some(), "{}", name);
        }
        assert_eq!(Cap::from_name("__ne"), None);
        assert_eq!(Cap::from_name("add"), None);
    }

    #[test]
    fn integer_arithmetic_floors() {
        assert_eq!(arith(Value::Int(-7), Arith::Div, Value::Int(2)), Ok(Value::Int(-4)));
        assert_eq!(arith(Value::Int(7), Arith::Div, Value::Int(-2)), Ok(Value::Int(-4)));
        assert_eq!(arith(Value::Int(-7), Arith::Mod, Value::Int(2)), Ok(Value::Int(1)));
        assert_eq!(arith(Value::Int(7), Arith::Mod, Value::Int(-2)), Ok(Value::Int(-1)));
        assert_eq!(arith(Value::Int(6), Arith::Div, Value::Int(3)), Ok(Value::Int(2)));
    }

    #[test]
    fn arithmetic_faults() {
        let zero = arith(Value::Int(1), Arith::Div, Value::Int(0)).unwrap_err();
        assert_eq!(zero.kind, Fault::Arithmetic);
        let overflow = arith(Value::Int(i64::MAX), Arith::Add, Value::Int(1)).unwrap_err();
        assert_eq!(overflow.kind, Fault::Arithmetic);
        let min = arith(Value::Int(i64::MIN), Arith::Div, Value::Int(-1)).unwrap_err();
        assert_eq!(min.kind, Fault::Arithmetic);
    }

    #[test]
    fn promotion_and_powers() {
        assert_eq!(arith(Value::Int(1), Arith::Add, Value::Num(0.5)), Ok(Value::Num(1.5)));
        assert_eq!(arith(Value::Int(2), Arith::Pow, Value::Int(10)), Ok(Value::Int(1024)));
        assert_eq!(arith(Value::Int(2), Arith::Pow, Value::Int(-1)), Ok(Value::Num(0.5)));
    }

    #[test]
    fn strings_and_lists() {
        assert_eq!(
            arith(Value::str("ab"), Arith::Add, Value::str("c")),
            Ok(Value::str("abc"))
        );
        assert_eq!(
            arith(Value::str("ab"), Arith::Mul, Value::Int(3)),
            Ok(Value::str("ababab"))
        );
        let err = arith(Value::str("a"), Arith::Add, Value::Int(1)).unwrap_err();
        assert_eq!(err.kind, Fault::UnsupportedOperation);

        let list = Value::list(vec![Value::Int(1)]);
        assert_eq!(
            arith(list.clone(), Arith::Add, Value::Int(2)),
            Ok(Value::list(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(
            arith(list, Arith::Mul, Value::Int(2)),
            Ok(Value::list(vec![Value::Int(1), Value::Int(1)]))
        );
    }

    #[test]
    fn repeats_are_bounded() {
        let huge = arith(Value::str("ab"), Arith::Mul, Value::Int(i64::MAX)).unwrap_err();
        assert_eq!(huge.kind, Fault::Arithmetic);
        let long = Value::Int(MAX_REPEAT as i64);
        assert_eq!(arith(Value::str("ab"), Arith::Mul, long.clone()).unwrap_err().kind, Fault::Arithmetic);
        let negative = arith(Value::str("ab"), Arith::Mul, Value::Int(-1)).unwrap_err();
        assert_eq!(negative.kind, Fault::Arithmetic);

        let pair = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let huge = arith(pair.clone(), Arith::Mul, Value::Int(1 << 62)).unwrap_err();
        assert_eq!(huge.kind, Fault::Arithmetic);
        assert_eq!(arith(pair.clone(), Arith::Mul, long).unwrap_err().kind, Fault::Arithmetic);
        assert_eq!(arith(pair, Arith::Mul, Value::Int(0)), Ok(Value::list(vec![])));
        assert_eq!(
            arith(Value::str(""), Arith::Mul, Value::Int(i64::MAX)),
            Ok(Value::str(""))
        );
    }

    #[test]
    fn comparisons() {
        assert_eq!(Value::Int(1).compare(Compare::Lt, &Value::Num(1.5)), Ok(true));
        assert_eq!(Value::str("b").compare(Compare::Ge, &Value::str("a")), Ok(true));
        assert_eq!(Value::Nil.compare(Compare::Eq, &Value::Nil), Ok(true));
        assert_eq!(Value::Int(1).compare(Compare::Ne, &Value::str("1")), Ok(true));
        assert!(Value::Bool(true).compare(Compare::Lt, &Value::Bool(false)).is_err());
    }

    #[test]
    fn tables() {
        assert!(Value::Int(1).builtin("__add").is_some());
        assert!(Value::Int(1).builtin("__call").is_none());
        assert!(Value::str("s").builtin("__sub").is_none());
        assert!(Value::Nil.builtin("__lt").is_none());
        assert!(Value::Nil.builtin("__as_bool").is_some());
        assert_eq!(
            Value::list(vec![]).builtin("__arity"),
            Some(Value::Int(1))
        );
        assert!(Value::list(vec![]).builtin("__iter").is_some());
        assert!(Value::Int(1).builtin("__iter").is_none());
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(0).truthy());
        assert!(Value::str("").truthy());
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
    }
}
