//! Dynamically typed call surface.
//!
//! [`Host`] exposes the module and handle operations under their binding
//! names (`initSync`, `openAsync`, `lookupSync`, ...) to callers that pass
//! loosely typed [`HostValue`]s, such as script bindings or the JSON-lines
//! driver. All argument checks happen here, synchronously: wrong arity, wrong
//! types, a `this` that is not a handle and malformed hex are reported as
//! [`UsageError`]s before any task is created or any guard is touched.
//!
//! Asynchronous calls take a trailing [`HostValue::Function`] and return
//! [`HostValue::Undefined`]; the callback later receives the outcome on the
//! delivery thread.

use std::collections::BTreeMap;
use std::fmt;

use engine::OpenMode;
use serde_json::{Map, Number, Value};

use crate::database::{Database, Match};
use crate::delivery::Completion;
use crate::error::{Error, HmResult, UsageError};
use crate::module::Module;

/// Single-shot host callback.
pub struct Callback(Completion<HostValue>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(HmResult<HostValue>) + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn call(self, outcome: HmResult<HostValue>) {
        (self.0)(outcome)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

#[derive(Debug)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<HostValue>),
    Object(BTreeMap<String, HostValue>),
    Handle(Database),
    Function(Callback),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::Handle(_) => "hmsearch",
            HostValue::Function(_) => "function",
        }
    }

    pub fn function<F>(f: F) -> Self
    where
        F: FnOnce(HmResult<HostValue>) + Send + 'static,
    {
        HostValue::Function(Callback::new(f))
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(b),
            Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => HostValue::String(s),
            Value::Array(items) => {
                HostValue::Array(items.into_iter().map(HostValue::from_json).collect())
            }
            Value::Object(fields) => HostValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, HostValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON rendering. Handles, functions and `undefined` have no JSON form
    /// and render as `null`.
    pub fn to_json(&self) -> Value {
        match self {
            HostValue::Undefined
            | HostValue::Null
            | HostValue::Handle(_)
            | HostValue::Function(_) => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Value::Number(Number::from(*n as i64))
                } else {
                    Number::from_f64(*n).map_or(Value::Null, Value::Number)
                }
            }
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::Array(items) => Value::Array(items.iter().map(HostValue::to_json).collect()),
            HostValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<Vec<Match>> for HostValue {
    fn from(matches: Vec<Match>) -> Self {
        HostValue::Array(
            matches
                .into_iter()
                .map(|m| {
                    let mut entry = BTreeMap::new();
                    entry.insert("hash".to_string(), HostValue::String(m.hash));
                    entry.insert("distance".to_string(), HostValue::Number(m.distance.into()));
                    HostValue::Object(entry)
                })
                .collect(),
        )
    }
}

/// Binding-named entry points over a [`Module`].
#[derive(Clone)]
pub struct Host {
    module: Module,
}

impl Host {
    pub fn new(module: Module) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Module-level constants.
    pub fn constant(name: &str) -> Option<HostValue> {
        match name {
            "READONLY" => Some(HostValue::Number(OpenMode::ReadOnly.as_raw() as f64)),
            "READWRITE" => Some(HostValue::Number(OpenMode::ReadWrite.as_raw() as f64)),
            _ => None,
        }
    }

    /// Call a module-level function.
    pub fn call(&self, function: &str, args: Vec<HostValue>) -> HmResult<HostValue> {
        match function {
            "initSync" => {
                let mut args = Args::exact(args, 4, "4")?;
                let path = args.string("path")?;
                let hash_bits = args.u32("hash_bits")?;
                let max_error = args.u32("max_error")?;
                let num_hashes = args.u64("num_hashes")?;
                self.module
                    .init_sync(path, hash_bits, max_error, num_hashes)?;
                Ok(HostValue::Undefined)
            }
            "initAsync" => {
                let mut args = Args::exact(args, 5, "5")?;
                let path = args.string("path")?;
                let hash_bits = args.u32("hash_bits")?;
                let max_error = args.u32("max_error")?;
                let num_hashes = args.u64("num_hashes")?;
                let callback = args.callback()?;
                self.module
                    .init_async(path, hash_bits, max_error, num_hashes, move |outcome| {
                        callback.call(outcome.map(|()| HostValue::Undefined))
                    });
                Ok(HostValue::Undefined)
            }
            "openSync" => {
                let mut args = Args::exact(args, 2, "2")?;
                let path = args.string("path")?;
                let mode = args.mode()?;
                let db = self.module.open_sync(path, mode)?;
                Ok(HostValue::Handle(db))
            }
            "openAsync" => {
                let mut args = Args::exact(args, 3, "3")?;
                let path = args.string("path")?;
                let mode = args.mode()?;
                let callback = args.callback()?;
                self.module.open_async(path, mode, move |outcome| {
                    callback.call(outcome.map(HostValue::Handle))
                });
                Ok(HostValue::Undefined)
            }
            other => Err(UsageError::UnknownFunction(other.to_string()).into()),
        }
    }

    /// Call a method on a handle.
    pub fn call_method(
        &self,
        this: &HostValue,
        method: &str,
        args: Vec<HostValue>,
    ) -> HmResult<HostValue> {
        let db = unwrap_handle(this)?;
        match method {
            "insertSync" => {
                let mut args = Args::exact(args, 1, "1")?;
                let hash = args.string("hash")?;
                db.insert_sync(&hash)?;
                Ok(HostValue::Undefined)
            }
            "insertAsync" => {
                let mut args = Args::exact(args, 2, "2")?;
                let hash = args.string("hash")?;
                let callback = args.callback()?;
                db.insert_async(&hash, move |outcome| {
                    callback.call(outcome.map(|()| HostValue::Undefined))
                })?;
                Ok(HostValue::Undefined)
            }
            "lookupSync" => {
                let mut args = Args::between(args, 1, 2, "1 or 2")?;
                let hash = args.string("hash")?;
                let max_error = args.optional_integer("max_error")?;
                Ok(db.lookup_sync(&hash, max_error)?.into())
            }
            "lookupAsync" => {
                let mut args = Args::between(args, 2, 3, "2 or 3")?;
                let callback = args.trailing_callback()?;
                let hash = args.string("hash")?;
                let max_error = args.optional_integer("max_error")?;
                db.lookup_async(&hash, max_error, move |outcome| {
                    callback.call(outcome.map(HostValue::from))
                })?;
                Ok(HostValue::Undefined)
            }
            "closeSync" => {
                Args::exact(args, 0, "0")?;
                db.close_sync()?;
                Ok(HostValue::Undefined)
            }
            "closeAsync" => {
                let mut args = Args::exact(args, 1, "1")?;
                let callback = args.callback()?;
                db.close_async(move |outcome| callback.call(outcome.map(|()| HostValue::Undefined)));
                Ok(HostValue::Undefined)
            }
            other => Err(UsageError::UnknownFunction(other.to_string()).into()),
        }
    }

    /// Read a handle property.
    pub fn get_property(&self, this: &HostValue, name: &str) -> HmResult<HostValue> {
        let db = unwrap_handle(this)?;
        match name {
            "isOpen" => Ok(HostValue::Bool(db.is_open())),
            _ => Ok(HostValue::Undefined),
        }
    }
}

fn unwrap_handle(this: &HostValue) -> Result<&Database, Error> {
    match this {
        HostValue::Handle(db) => Ok(db),
        _ => Err(UsageError::NotAHandle.into()),
    }
}

/// Positional argument reader.
struct Args {
    values: std::vec::IntoIter<HostValue>,
    position: usize,
}

impl Args {
    fn exact(values: Vec<HostValue>, n: usize, expected: &'static str) -> Result<Self, UsageError> {
        Self::between(values, n, n, expected)
    }

    fn between(
        values: Vec<HostValue>,
        min: usize,
        max: usize,
        expected: &'static str,
    ) -> Result<Self, UsageError> {
        if values.len() < min || values.len() > max {
            return Err(UsageError::WrongArity {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            values: values.into_iter(),
            position: 0,
        })
    }

    fn next(&mut self) -> Option<HostValue> {
        self.position += 1;
        self.values.next()
    }

    fn wrong(&self, name: &str, want: &str, got: &HostValue) -> UsageError {
        UsageError::WrongArguments(format!(
            "argument {} ({name}) must be {want}, got {}",
            self.position,
            got.type_name()
        ))
    }

    fn string(&mut self, name: &str) -> Result<String, UsageError> {
        match self.next() {
            Some(HostValue::String(s)) => Ok(s),
            other => Err(self.wrong(name, "a string", &other.unwrap_or(HostValue::Undefined))),
        }
    }

    fn integer(&mut self, name: &str) -> Result<i64, UsageError> {
        match self.next() {
            Some(HostValue::Number(n)) if n.is_finite() => Ok(n.trunc() as i64),
            other => Err(self.wrong(name, "a number", &other.unwrap_or(HostValue::Undefined))),
        }
    }

    fn u32(&mut self, name: &str) -> Result<u32, UsageError> {
        let n = self.integer(name)?;
        u32::try_from(n).map_err(|_| {
            UsageError::WrongArguments(format!("{name} out of range: {n}"))
        })
    }

    fn u64(&mut self, name: &str) -> Result<u64, UsageError> {
        let n = self.integer(name)?;
        u64::try_from(n).map_err(|_| {
            UsageError::WrongArguments(format!("{name} out of range: {n}"))
        })
    }

    /// A number if one remains; absent, `undefined` and `null` read as `None`.
    fn optional_integer(&mut self, name: &str) -> Result<Option<i64>, UsageError> {
        if self.values.len() == 0 {
            return Ok(None);
        }
        match self.next() {
            Some(HostValue::Number(n)) if n.is_finite() => Ok(Some(n.trunc() as i64)),
            None | Some(HostValue::Undefined) | Some(HostValue::Null) => Ok(None),
            Some(other) => Err(self.wrong(name, "a number", &other)),
        }
    }

    fn mode(&mut self) -> Result<OpenMode, UsageError> {
        let raw = self.integer("mode")?;
        OpenMode::from_raw(raw).ok_or(UsageError::InvalidMode(raw))
    }

    fn callback(&mut self) -> Result<Callback, UsageError> {
        match self.next() {
            Some(HostValue::Function(cb)) => Ok(cb),
            other => Err(self.wrong(
                "callback",
                "a function",
                &other.unwrap_or(HostValue::Undefined),
            )),
        }
    }

    /// Take the last argument as the callback, leaving the rest in order.
    fn trailing_callback(&mut self) -> Result<Callback, UsageError> {
        let total = self.values.len();
        match self.values.next_back() {
            Some(HostValue::Function(cb)) => Ok(cb),
            other => Err(UsageError::WrongArguments(format!(
                "argument {total} (callback) must be a function, got {}",
                other.unwrap_or(HostValue::Undefined).type_name()
            ))),
        }
    }
}
