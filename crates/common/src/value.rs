//! Runtime value representation for the eazy VM.
//!
//! Lists and Maps are shared, mutable objects: copying a `Value` copies the
//! reference, so `is` compares identity while `equals` compares structure.
//! Closures are immutable once built.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::ValueError;
use crate::type_tag::TypeTag;

/// Runtime value representation.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nothing,
    Boolean(bool),
    /// IEEE 754 double.
    Number(f64),
    /// Immutable text.
    String(Rc<str>),
    List(Rc<List>),
    Map(Rc<Map>),
    Closure(Rc<Closure>),
}

/// An ordered, mutable, 0-indexed sequence of values.
#[derive(Default)]
pub struct List {
    items: RefCell<Vec<Value>>,
    frozen: Cell<bool>,
}

/// A key-unique association of values.
///
/// Keys compare by [`Value::same_key`]: primitives by value, collections
/// and closures by reference.
#[derive(Default)]
pub struct Map {
    entries: RefCell<Vec<(Value, Value)>>,
    frozen: Cell<bool>,
}

/// A code address paired with the values captured when it was created.
#[derive(Debug)]
pub struct Closure {
    pub address: usize,
    pub environment: Vec<Value>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RefCell::new(items),
            frozen: Cell::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Borrow the elements. Do not hold across a mutation of this list.
    pub fn items(&self) -> Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), ValueError> {
        self.check_mutable()?;
        let mut items = self.items.borrow_mut();
        let length = items.len();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ValueError::IndexOutOfBounds { index, length }),
        }
    }

    pub fn push(&self, value: Value) -> Result<(), ValueError> {
        self.check_mutable()?;
        self.items.borrow_mut().push(value);
        Ok(())
    }

    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    fn check_mutable(&self) -> Result<(), ValueError> {
        if self.is_frozen() {
            Err(ValueError::Frozen(TypeTag::List))
        } else {
            Ok(())
        }
    }
}

impl Map {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        let map = Self::default();
        for (key, value) in entries {
            map.upsert(key, value);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .borrow()
            .iter()
            .find(|(k, _)| k.same_key(key))
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.borrow().iter().any(|(k, _)| k.same_key(key))
    }

    /// Borrow the entries in insertion order.
    pub fn entries(&self) -> Ref<'_, Vec<(Value, Value)>> {
        self.entries.borrow()
    }

    pub fn insert(&self, key: Value, value: Value) -> Result<(), ValueError> {
        if self.is_frozen() {
            return Err(ValueError::Frozen(TypeTag::Map));
        }
        self.upsert(key, value);
        Ok(())
    }

    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    fn upsert(&self, key: Value, value: Value) {
        let mut entries = self.entries.borrow_mut();
        match entries.iter_mut().find(|(k, _)| k.same_key(&key)) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key, value)),
        }
    }
}

impl Value {
    pub fn string(text: &str) -> Value {
        Value::String(Rc::from(text))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(List::new(items)))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(Rc::new(Map::new(entries)))
    }

    pub fn closure(address: usize, environment: Vec<Value>) -> Value {
        Value::Closure(Rc::new(Closure {
            address,
            environment,
        }))
    }

    /// Returns the type tag for this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Nothing => TypeTag::Nothing,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Number(_) => TypeTag::Number,
            Value::String(_) => TypeTag::String,
            Value::List(_) => TypeTag::List,
            Value::Map(_) => TypeTag::Map,
            Value::Closure(_) => TypeTag::Closure,
        }
    }

    /// Identity comparison (the `is` operator).
    ///
    /// Primitives and Strings compare by value; Lists, Maps, and Closures
    /// by reference. NaN is not identical to itself.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Map key comparison: identity, except that NaN keys find each other.
    pub fn same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.identical(other),
        }
    }

    /// Length of a String (in chars), List, or Map.
    pub fn count(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::List(list) => Some(list.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Shallow copy: unfrozen collections get a fresh outer object sharing
    /// their elements; everything else is returned as is.
    pub fn shallow_copy(&self) -> Value {
        match self {
            Value::List(list) if !list.is_frozen() => Value::list(list.items().clone()),
            Value::Map(map) if !map.is_frozen() => Value::map(map.entries().clone()),
            other => other.clone(),
        }
    }

    /// Concatenate two Strings or Lists, or union two Maps with entries of
    /// `other` taking precedence. Returns `None` for any other pairing.
    pub fn merge(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Some(Value::String(Rc::from(joined)))
            }
            (Value::List(a), Value::List(b)) => {
                let mut items = a.items().clone();
                items.extend(b.items().iter().cloned());
                Some(Value::list(items))
            }
            (Value::Map(a), Value::Map(b)) => {
                let mut entries = a.entries().clone();
                entries.extend(b.entries().iter().cloned());
                Some(Value::map(entries))
            }
            _ => None,
        }
    }

    /// Look up a `String`-keyed field of a Map value.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(&Value::string(name)),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Address used to key the visited map during structural comparison.
fn address<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Structural equality over values.
///
/// Lists compare element-wise and Maps key/value-wise; Closures compare by
/// identity only. Each collection on the current comparison path is
/// recorded with its depth. When both sides meet a collection that is
/// their own ancestor, they are equal only if those ancestors sit at the
/// same depth, so cyclic structures terminate.
pub fn equals(a: &Value, b: &Value) -> bool {
    equals_at(a, b, &mut HashMap::new(), 0)
}

fn equals_at(a: &Value, b: &Value, visited: &mut HashMap<usize, usize>, depth: usize) -> bool {
    if a.identical(b) {
        return true;
    }
    if a.type_tag() != b.type_tag() {
        return false;
    }

    match (a, b) {
        (Value::List(x), Value::List(y)) => {
            if let Some(same) = revisit(visited, address(x), address(y)) {
                return same;
            }
            if x.len() != y.len() {
                return false;
            }
            within(visited, address(x), address(y), depth, |visited| {
                let xs = x.items();
                let ys = y.items();
                xs.iter()
                    .zip(ys.iter())
                    .all(|(p, q)| equals_at(p, q, visited, depth + 1))
            })
        }
        (Value::Map(x), Value::Map(y)) => {
            if let Some(same) = revisit(visited, address(x), address(y)) {
                return same;
            }
            if x.len() != y.len() {
                return false;
            }
            within(visited, address(x), address(y), depth, |visited| {
                let xs = x.entries();
                xs.iter().all(|(key, p)| match y.get(key) {
                    Some(q) => equals_at(p, &q, visited, depth + 1),
                    None => false,
                })
            })
        }
        // Primitives that failed `identical` differ; closures never compare
        // structurally.
        _ => false,
    }
}

/// Compare children with `x` and `y` marked as ancestors at `depth`.
///
/// The marks are removed afterwards, so a collection shared between
/// siblings is compared again rather than mistaken for a cycle.
fn within(
    visited: &mut HashMap<usize, usize>,
    x: usize,
    y: usize,
    depth: usize,
    compare: impl FnOnce(&mut HashMap<usize, usize>) -> bool,
) -> bool {
    visited.insert(x, depth);
    visited.insert(y, depth);
    let same = compare(visited);
    visited.remove(&x);
    visited.remove(&y);
    same
}

/// Resolve a comparison that reached a collection on the current path.
fn revisit(visited: &HashMap<usize, usize>, x: usize, y: usize) -> Option<bool> {
    match (visited.get(&x), visited.get(&y)) {
        (Some(dx), Some(dy)) => Some(dx == dy),
        (None, None) => None,
        _ => Some(false),
    }
}

/// Membership test (the `in` operator).
///
/// Substring test for Strings, element test (structural) for Lists, key
/// test for Maps.
pub fn contains(needle: &Value, haystack: &Value) -> Result<bool, ValueError> {
    match haystack {
        Value::String(text) => match needle {
            Value::String(part) => Ok(text.contains(&**part)),
            _ => Err(ValueError::NeedleNotString),
        },
        Value::List(list) => Ok(list.items().iter().any(|item| equals(needle, item))),
        Value::Map(map) => Ok(map.contains_key(needle)),
        _ => Err(ValueError::NotAContainer),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{n}")
    }
}

/// Renders a value, printing `...` for a collection already being rendered.
struct Render<'a> {
    value: &'a Value,
    path: &'a RefCell<Vec<usize>>,
}

impl Render<'_> {
    fn nested<'b>(&'b self, value: &'b Value) -> Render<'b> {
        Render {
            value,
            path: self.path,
        }
    }

    fn enter(&self, id: usize) -> bool {
        let mut path = self.path.borrow_mut();
        if path.contains(&id) {
            false
        } else {
            path.push(id);
            true
        }
    }

    fn leave(&self) {
        self.path.borrow_mut().pop();
    }
}

impl fmt::Display for Render<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Nothing => f.write_str("nothing"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write_number(f, *n),
            Value::String(s) => write!(f, "{:?}", &**s),
            Value::Closure(c) => write!(f, "<closure @{}>", c.address),
            Value::List(list) => {
                if !self.enter(address(list)) {
                    return f.write_str("[...]");
                }
                f.write_str("[")?;
                for (i, item) in list.items().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", self.nested(item))?;
                }
                self.leave();
                f.write_str("]")
            }
            Value::Map(map) => {
                if !self.enter(address(map)) {
                    return f.write_str("{...}");
                }
                f.write_str("{")?;
                for (i, (key, value)) in map.entries().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", self.nested(key), self.nested(value))?;
                }
                self.leave();
                f.write_str("}")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = RefCell::new(Vec::new());
        write!(f, "{}", Render { value: self, path: &path })
    }
}

// Debug goes through the cycle-safe renderer; a derived impl would recurse
// forever on self-referential lists.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("len", &self.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("len", &self.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
