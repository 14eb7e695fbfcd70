//! Capability-typed access to numeric host attributes.
//!
//! The engine never sees the host model itself. It reads (and for parameters
//! writes) named numbers through [`AttributeProvider`] and
//! [`WritableAttributeProvider`], wrapped in an [`AttributeView`] that carries
//! the declared domain and the per-cycle value cache.

use crate::error::EngineError;
use std::collections::HashMap;
use std::fmt;

/// Numeric type a host attribute may be stored as.
pub trait NumericValue: Copy + fmt::Debug + 'static {
    fn to_f64(self) -> f64;
    /// Convert back from the engine's working precision. Integers round to nearest.
    fn from_f64(value: f64) -> Self;
}

impl NumericValue for f64 {
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(value: f64) -> Self {
        value
    }
}

impl NumericValue for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

macro_rules! impl_integer_value {
    ($($ty:ty),*) => {
        $(
            impl NumericValue for $ty {
                fn to_f64(self) -> f64 {
                    self as f64
                }
                fn from_f64(value: f64) -> Self {
                    value.round() as $ty
                }
            }
        )*
    };
}

impl_integer_value!(i32, i64, u32, u64);

/// Read capability over one host attribute.
pub trait AttributeProvider {
    type Value: NumericValue;
    fn get(&self) -> Self::Value;
}

/// Read/write capability over one host attribute.
pub trait WritableAttributeProvider: AttributeProvider {
    fn set(&mut self, value: Self::Value);
}

/// Read-only provider backed by a getter closure.
pub struct FnAttribute<G> {
    getter: G,
}

impl<G> FnAttribute<G> {
    pub fn new(getter: G) -> Self {
        Self { getter }
    }
}

impl<G, T> AttributeProvider for FnAttribute<G>
where
    G: Fn() -> T,
    T: NumericValue,
{
    type Value = T;

    fn get(&self) -> T {
        (self.getter)()
    }
}

/// Read/write provider backed by a getter and a setter closure.
pub struct FnWritableAttribute<G, S> {
    getter: G,
    setter: S,
}

impl<G, S> FnWritableAttribute<G, S> {
    pub fn new(getter: G, setter: S) -> Self {
        Self { getter, setter }
    }
}

impl<G, S, T> AttributeProvider for FnWritableAttribute<G, S>
where
    G: Fn() -> T,
    T: NumericValue,
{
    type Value = T;

    fn get(&self) -> T {
        (self.getter)()
    }
}

impl<G, S, T> WritableAttributeProvider for FnWritableAttribute<G, S>
where
    G: Fn() -> T,
    S: FnMut(T),
    T: NumericValue,
{
    fn set(&mut self, value: T) {
        (self.setter)(value)
    }
}

/// Closed interval of admissible values. Invariant: `min <= max`, both finite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Domain {
    min: f64,
    max: f64,
}

impl Domain {
    pub fn new(min: f64, max: f64) -> Option<Self> {
        (min.is_finite() && max.is_finite() && min <= max).then_some(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// A named attribute, its domain and the provider that reaches the host.
pub struct AttributeView<P> {
    name: String,
    domain: Domain,
    provider: P,
    cached: Option<f64>,
}

impl<P: AttributeProvider> AttributeView<P> {
    pub fn new(name: impl Into<String>, min: f64, max: f64, provider: P) -> Result<Self, EngineError> {
        let name = name.into();
        let domain = Domain::new(min, max).ok_or_else(|| EngineError::InvalidDomain {
            name: name.clone(),
            min,
            max,
        })?;
        Ok(Self {
            name,
            domain,
            provider,
            cached: None,
        })
    }
}

/// Object-safe view the engine stores for every registered attribute.
pub trait ReadableView {
    fn name(&self) -> &str;
    fn domain(&self) -> Domain;
    /// Read the host value once and cache it until [`ReadableView::invalidate`].
    fn perceive(&mut self) -> f64;
    fn cached(&self) -> Option<f64>;
    fn invalidate(&mut self);
    /// Current host value, bypassing and leaving the cache alone.
    fn read(&self) -> f64;
}

/// Object-safe writable view, used by parameter agents.
pub trait WritableView: ReadableView {
    /// Write `value` clamped to the domain and return what was written.
    ///
    /// The cache is left untouched: later readers in the same cycle see the
    /// value perceived at the start of the cycle.
    fn write(&mut self, value: f64) -> f64;
}

impl<P: AttributeProvider> ReadableView for AttributeView<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> Domain {
        self.domain
    }

    fn perceive(&mut self) -> f64 {
        if let Some(value) = self.cached {
            return value;
        }
        let value = self.provider.get().to_f64();
        self.cached = Some(value);
        value
    }

    fn cached(&self) -> Option<f64> {
        self.cached
    }

    fn invalidate(&mut self) {
        self.cached = None;
    }

    fn read(&self) -> f64 {
        self.provider.get().to_f64()
    }
}

impl<P: WritableAttributeProvider> WritableView for AttributeView<P> {
    fn write(&mut self, value: f64) -> f64 {
        let native = P::Value::from_f64(self.domain.clamp(value));
        self.provider.set(native);
        native.to_f64()
    }
}

/// Handle to a view held by the [`AttributeRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Read(usize),
    Write(usize),
}

/// Owns every registered view; agents refer to theirs by [`ViewKey`].
#[derive(Default)]
pub struct AttributeRegistry {
    readable: Vec<Box<dyn ReadableView>>,
    writable: Vec<Box<dyn WritableView>>,
    by_name: HashMap<String, ViewKey>,
}

impl AttributeRegistry {
    pub fn insert_readable(&mut self, view: Box<dyn ReadableView>) -> Result<ViewKey, EngineError> {
        let key = ViewKey::Read(self.readable.len());
        self.claim_name(view.name(), key)?;
        self.readable.push(view);
        Ok(key)
    }

    pub fn insert_writable(&mut self, view: Box<dyn WritableView>) -> Result<ViewKey, EngineError> {
        let key = ViewKey::Write(self.writable.len());
        self.claim_name(view.name(), key)?;
        self.writable.push(view);
        Ok(key)
    }

    fn claim_name(&mut self, name: &str, key: ViewKey) -> Result<(), EngineError> {
        if self.by_name.contains_key(name) {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        self.by_name.insert(name.to_string(), key);
        Ok(())
    }

    pub fn key(&self, name: &str) -> Option<ViewKey> {
        self.by_name.get(name).copied()
    }

    pub fn perceive(&mut self, key: ViewKey) -> f64 {
        match key {
            ViewKey::Read(i) => self.readable[i].perceive(),
            ViewKey::Write(i) => self.writable[i].perceive(),
        }
    }

    /// Uncached read, used for reporting after a cycle.
    pub fn read(&self, key: ViewKey) -> f64 {
        match key {
            ViewKey::Read(i) => self.readable[i].read(),
            ViewKey::Write(i) => self.writable[i].read(),
        }
    }

    pub fn domain(&self, key: ViewKey) -> Domain {
        match key {
            ViewKey::Read(i) => self.readable[i].domain(),
            ViewKey::Write(i) => self.writable[i].domain(),
        }
    }

    /// Write through a writable view. Read-only keys are ignored and return `None`.
    pub fn write(&mut self, key: ViewKey, value: f64) -> Option<f64> {
        match key {
            ViewKey::Read(_) => None,
            ViewKey::Write(i) => Some(self.writable[i].write(value)),
        }
    }

    /// Drop every cached value; the next cycle reads the host afresh.
    pub fn invalidate_all(&mut self) {
        self.readable.iter_mut().for_each(|v| v.invalidate());
        self.writable.iter_mut().for_each(|v| v.invalidate());
    }

    pub fn len(&self) -> usize {
        self.readable.len() + self.writable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
