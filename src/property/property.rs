use super::supplier::Supplier;
use super::value::{TypeDescriptor, Value, ValueKind};
use crate::address::Address;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Errors raised when reading or writing properties
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    /// No value was assigned
    #[error("{}", describe(.subject, .message, "is empty"))]
    Empty {
        subject: String,
        message: Option<String>,
    },

    /// The value will only be known after the producing task has executed
    #[error("{}", describe(.subject, .message, "will be known at a later time"))]
    Deferred {
        subject: String,
        message: Option<String>,
    },

    #[error("{subject}: {reason}")]
    TypeMismatch { subject: String, reason: String },

    #[error("{0} is finalized")]
    Finalized(String),

    #[error("{0}")]
    Other(String),
}

fn describe(subject: &str, message: &Option<String>, default: &str) -> String {
    match message {
        Some(message) => format!("{message} ({subject})"),
        None => format!("the value of {subject} {default}"),
    }
}

impl PropertyError {
    pub fn empty(subject: impl Into<String>) -> Self {
        PropertyError::Empty {
            subject: subject.into(),
            message: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PropertyError::Empty { .. })
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, PropertyError::Deferred { .. })
    }
}

thread_local! {
    /// Properties currently being read on this thread.
    static READING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Marks a property as being read until dropped.
struct ReadGuard(usize);

impl ReadGuard {
    fn enter(identity: usize) -> Option<Self> {
        READING
            .with(|reading| reading.borrow_mut().insert(identity))
            .then(|| Self(identity))
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        READING.with(|reading| {
            reading.borrow_mut().remove(&self.0);
        });
    }
}

/// Default applied to each new property instance.
#[derive(Clone)]
pub enum PropertyDefault {
    /// Cloned into every instance
    Value(Value),
    /// Called once per instance
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl fmt::Debug for PropertyDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyDefault::Value(value) => write!(f, "Value({value:?})"),
            PropertyDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Declaration of a property in a task's schema.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub kind: TypeDescriptor,
    pub output: bool,
    pub default: Option<PropertyDefault>,
    pub help: Option<String>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, kind: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            kind,
            output: false,
            default: None,
            help: None,
        }
    }

    /// An output property, deferred until its task assigns it.
    pub fn output(name: impl Into<String>, kind: TypeDescriptor) -> Self {
        Self {
            output: true,
            ..Self::new(name, kind)
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(PropertyDefault::Value(value.into()));
        self
    }

    pub fn with_default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(PropertyDefault::Factory(Arc::new(factory)));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Create the property instance for `owner`, applying the default if there is one.
    pub fn instantiate(&self, owner: &Address) -> Result<Property, PropertyError> {
        let property = Property::new(owner.clone(), self.name.clone(), self.kind.clone(), self.output);
        if let Some(help) = &self.help {
            property.write().help = Some(help.clone());
        }
        match &self.default {
            Some(PropertyDefault::Value(value)) => property.setdefault(value.clone())?,
            Some(PropertyDefault::Factory(factory)) => property.setdefault(factory())?,
            None => {}
        }
        Ok(property)
    }
}

/// A typed, lazily resolved value slot owned by a task.
///
/// Cloning yields another handle to the same slot. Storage is guarded by a lock so a value
/// written by a task on its worker thread is visible to dependants scheduled after it.
#[derive(Clone)]
pub struct Property(Arc<PropertyInner>);

struct PropertyInner {
    owner: Address,
    name: String,
    kind: TypeDescriptor,
    output: bool,
    state: RwLock<PropertyState>,
}

struct PropertyState {
    value: Supplier,
    derived_from: Vec<Supplier>,
    finalized: bool,
    error_message: Option<String>,
    help: Option<String>,
}

impl Property {
    /// Create an unset property. Output properties start out deferred.
    pub fn new(owner: Address, name: impl Into<String>, kind: TypeDescriptor, output: bool) -> Self {
        let name = name.into();
        let value = if output {
            Supplier::deferred(format!("Property({owner}.{name})"))
        } else {
            Supplier::void()
        };
        Self(Arc::new(PropertyInner {
            owner,
            name,
            kind,
            output,
            state: RwLock::new(PropertyState {
                value,
                derived_from: Vec::new(),
                finalized: false,
                error_message: None,
                help: None,
            }),
        }))
    }

    fn read(&self) -> RwLockReadGuard<'_, PropertyState> {
        self.0.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PropertyState> {
        self.0.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn owner(&self) -> &Address {
        &self.0.owner
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &TypeDescriptor {
        &self.0.kind
    }

    pub fn is_output(&self) -> bool {
        self.0.output
    }

    pub fn help(&self) -> Option<String> {
        self.read().help.clone()
    }

    /// The supplier currently backing this property.
    pub fn value(&self) -> Supplier {
        self.read().value.clone()
    }

    /// Resolve the value. Reads an empty property as [`PropertyError::Empty`] and an output that
    /// was not produced yet as [`PropertyError::Deferred`].
    pub fn get(&self) -> Result<Value, PropertyError> {
        let Some(_guard) = ReadGuard::enter(self.identity()) else {
            return Err(PropertyError::Other(format!("{self} refers back to itself")));
        };
        let (value, error_message) = {
            let state = self.read();
            (state.value.clone(), state.error_message.clone())
        };
        match value.get() {
            Ok(value) => self.adapt(value),
            Err(PropertyError::Empty { .. }) => Err(PropertyError::Empty {
                subject: self.to_string(),
                message: error_message,
            }),
            Err(err) => Err(err),
        }
    }

    /// Return the value, or `fallback` if the property is empty or deferred.
    pub fn get_or(&self, fallback: impl Into<Value>) -> Result<Value, PropertyError> {
        match self.get() {
            Err(PropertyError::Empty { .. }) | Err(PropertyError::Deferred { .. }) => {
                Ok(fallback.into())
            }
            other => other,
        }
    }

    fn adapt(&self, value: Value) -> Result<Value, PropertyError> {
        self.0
            .kind
            .adapt(value)
            .map_err(|reason| PropertyError::TypeMismatch {
                subject: self.to_string(),
                reason,
            })
    }

    fn ensure_mutable(&self, state: &PropertyState) -> Result<(), PropertyError> {
        if state.finalized {
            return Err(PropertyError::Finalized(self.to_string()));
        }
        Ok(())
    }

    /// Assign a concrete value, validated against the declared type.
    pub fn set(&self, value: impl Into<Value>) -> Result<(), PropertyError> {
        self.set_derived(value, Vec::new())
    }

    /// Assign a concrete value whose lineage includes `derived_from`.
    pub fn set_derived(&self, value: impl Into<Value>, derived_from: Vec<Supplier>) -> Result<(), PropertyError> {
        let adapted = self.adapt(value.into())?;
        let mut state = self.write();
        self.ensure_mutable(&state)?;
        state.value = Supplier::of_derived(adapted, derived_from);
        state.derived_from = Vec::new();
        Ok(())
    }

    /// Back this property by another supplier, e.g. another task's property. Rejects a
    /// supplier whose lineage already leads back to this property.
    pub fn set_supplier(&self, supplier: impl Into<Supplier>) -> Result<(), PropertyError> {
        let supplier = supplier.into();
        if supplier.reaches(self) {
            return Err(PropertyError::Other(format!(
                "setting {self} to {supplier} would create a cycle"
            )));
        }
        let mut state = self.write();
        self.ensure_mutable(&state)?;
        state.value = supplier;
        state.derived_from = Vec::new();
        Ok(())
    }

    pub fn setcallable<F>(&self, func: F, derived_from: Vec<Supplier>) -> Result<(), PropertyError>
    where
        F: Fn() -> Result<Value, PropertyError> + Send + Sync + 'static,
    {
        self.set_supplier(Supplier::of_callable(func, derived_from))
    }

    /// Compose a transform over the current value, evaluated lazily.
    pub fn setmap<F>(&self, func: F) -> Result<(), PropertyError>
    where
        F: Fn(Value) -> Result<Value, PropertyError> + Send + Sync + 'static,
    {
        let mut state = self.write();
        self.ensure_mutable(&state)?;
        state.value = state.value.map(func);
        Ok(())
    }

    /// Assign `value` only if nothing was assigned yet.
    pub fn setdefault(&self, value: impl Into<Value>) -> Result<(), PropertyError> {
        if self.read().value.is_void() {
            self.set(value)?;
        }
        Ok(())
    }

    pub fn setfinal(&self, value: impl Into<Value>) -> Result<(), PropertyError> {
        self.set(value)?;
        self.finalize();
        Ok(())
    }

    /// Attach a message to the error raised when the property is read while empty.
    pub fn seterror(&self, message: impl Into<String>) {
        self.write().error_message = Some(message.into());
    }

    pub fn clear(&self) -> Result<(), PropertyError> {
        self.set_supplier(Supplier::void())
    }

    /// Prevent further modification.
    pub fn finalize(&self) {
        self.write().finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.read().finalized
    }

    /// Whether a value other than void or deferred was assigned. Does not evaluate the value.
    pub fn is_set(&self) -> bool {
        !self.read().value.is_void()
    }

    /// A deferred property counts as empty.
    pub fn is_empty(&self) -> bool {
        let value = self.value();
        value.is_deferred() || value.is_empty()
    }

    pub fn is_filled(&self) -> bool {
        !self.is_empty()
    }

    /// Whether this property may provide values of `kind`, directly or as sequence elements.
    pub fn provides(&self, kind: ValueKind) -> bool {
        self.0.kind.provides(kind)
    }

    /// The constituent values of `kind`: the value itself if it is of that kind, or the
    /// matching elements of a sequence value.
    pub fn get_of_type(&self, kind: ValueKind) -> Result<Vec<Value>, PropertyError> {
        let value = self.get()?;
        if value.kind() == kind {
            return Ok(vec![value]);
        }
        Ok(match value {
            Value::List(items) => items.into_iter().filter(|v| v.kind() == kind).collect(),
            _ => Vec::new(),
        })
    }

    /// The current supplier followed by any explicit lineage. Deeper links are reached by
    /// walking [`Property::lineage`].
    pub fn derived_from(&self) -> Vec<Supplier> {
        let state = self.read();
        let mut out = vec![state.value.clone()];
        out.extend(state.derived_from.iter().cloned());
        out
    }

    pub fn lineage(&self) -> Vec<(Supplier, Vec<Supplier>)> {
        Supplier::property(self.clone()).lineage()
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Property) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({}.{})", self.0.owner, self.0.name)
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
