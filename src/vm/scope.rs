use std::rc::Rc;

use crate::vm::value::{Value, Variable};

#[derive(Debug, Clone)]
struct Binding {
    name: String,
    variable: Variable,
    /// Bound in this scope, rather than copied in from a caller.
    own: bool,
}

/// An ordered mapping from names to variables.
/// Binding a name replaces its variable outright;
/// a variable that was already read is never changed.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: Vec<Binding>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    /// A copy of every binding, all marked as inherited.
    pub fn snapshot(&self) -> Scope {
        Scope {
            bindings: self
                .bindings
                .iter()
                .map(|b| Binding {
                    own: false,
                    ..b.clone()
                })
                .collect(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.bindings.iter().position(|b| b.name == name)
    }

    /// Binds `name`, keeping its original position if it was already bound.
    pub fn bind(&mut self, name: &str, variable: Variable) {
        self.insert(name, variable, true)
    }

    /// Copies bindings in without claiming them.
    pub fn inherit(&mut self, other: &Scope) {
        for binding in other.bindings.iter() {
            self.insert(&binding.name, binding.variable.clone(), false);
        }
    }

    fn insert(&mut self, name: &str, variable: Variable, own: bool) {
        let binding = Binding {
            name: name.to_string(),
            variable,
            own,
        };
        match self.position(name) {
            Some(index) => self.bindings[index] = binding,
            None => self.bindings.push(binding),
        }
    }

    /// Looks up a single name.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.position(name).map(|i| &self.bindings[i].variable)
    }

    /// Resolves a dotted path like `a.b.c`.
    /// The first segment is looked up here;
    /// each following segment is looked up on the value found so far,
    /// descending into an object's scope or its capability table.
    pub fn resolve(&self, path: &str) -> Option<Variable> {
        let mut segments = path.split('.');
        let mut found = self.get(segments.next()?)?.clone();
        for segment in segments {
            found = found.capability(segment)?;
        }
        Some(found)
    }

    /// The bindings this scope created itself, in order.
    pub fn own_bindings(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.bindings
            .iter()
            .filter(|b| b.own)
            .map(|b| (b.name.as_str(), &b.variable))
    }

    /// Every binding, inherited or not, in order.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.bindings
            .iter()
            .map(|b| (b.name.as_str(), &b.variable))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Freezes this scope so values can share it.
    pub fn share(self) -> Rc<Scope> {
        Rc::new(self)
    }
}
