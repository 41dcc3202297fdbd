use super::property::{Property, PropertyError};
use super::value::Value;
use crate::address::Address;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};

type ValueFn = Arc<dyn Fn() -> Result<Value, PropertyError> + Send + Sync>;
type MapFn = Arc<dyn Fn(Value) -> Result<Value, PropertyError> + Send + Sync>;

/// A lazily evaluated value that records which other suppliers it was derived from.
///
/// The `derived_from` links form the lineage graph that task relationships are inferred from.
#[derive(Clone)]
pub struct Supplier(Arc<SupplierKind>);

enum SupplierKind {
    Of {
        value: Value,
        derived_from: Vec<Supplier>,
    },
    Callable {
        func: ValueFn,
        derived_from: Vec<Supplier>,
    },
    Map {
        func: MapFn,
        inner: Supplier,
    },
    Once {
        inner: Supplier,
        cache: OnceLock<Result<Value, PropertyError>>,
    },
    Void {
        derived_from: Vec<Supplier>,
    },
    Deferred {
        subject: String,
    },
    Property(Property),
    Task(Address),
}

impl Supplier {
    fn wrap(kind: SupplierKind) -> Self {
        Self(Arc::new(kind))
    }

    /// A supplier of a fixed value.
    pub fn of(value: impl Into<Value>) -> Self {
        Self::of_derived(value, Vec::new())
    }

    /// A supplier of a fixed value whose lineage includes `derived_from`.
    pub fn of_derived(value: impl Into<Value>, derived_from: Vec<Supplier>) -> Self {
        Self::wrap(SupplierKind::Of {
            value: value.into(),
            derived_from,
        })
    }

    /// A supplier that calls `func` on every read.
    pub fn of_callable<F>(func: F, derived_from: Vec<Supplier>) -> Self
    where
        F: Fn() -> Result<Value, PropertyError> + Send + Sync + 'static,
    {
        Self::wrap(SupplierKind::Callable {
            func: Arc::new(func),
            derived_from,
        })
    }

    /// A supplier that is always empty.
    pub fn void() -> Self {
        Self::void_derived(Vec::new())
    }

    pub fn void_derived(derived_from: Vec<Supplier>) -> Self {
        Self::wrap(SupplierKind::Void { derived_from })
    }

    /// Placeholder for a value that will only be produced later, e.g. by executing a task.
    pub fn deferred(subject: impl Into<String>) -> Self {
        Self::wrap(SupplierKind::Deferred {
            subject: subject.into(),
        })
    }

    /// Alias to another property. Reads resolve through the property.
    pub fn property(property: Property) -> Self {
        Self::wrap(SupplierKind::Property(property))
    }

    /// Marks a dependency on a task without going through one of its properties.
    pub fn task(address: Address) -> Self {
        Self::wrap(SupplierKind::Task(address))
    }

    /// Lazily apply `func` to this supplier's value.
    pub fn map<F>(&self, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, PropertyError> + Send + Sync + 'static,
    {
        Self::wrap(SupplierKind::Map {
            func: Arc::new(func),
            inner: self.clone(),
        })
    }

    /// Cache the first result of this supplier forever.
    pub fn once(&self) -> Self {
        Self::wrap(SupplierKind::Once {
            inner: self.clone(),
            cache: OnceLock::new(),
        })
    }

    pub fn get(&self) -> Result<Value, PropertyError> {
        match self.0.as_ref() {
            SupplierKind::Of { value, .. } => Ok(value.clone()),
            SupplierKind::Callable { func, .. } => func(),
            SupplierKind::Map { func, inner } => match inner.get() {
                Ok(value) => func(value),
                Err(PropertyError::Empty { .. }) => Err(PropertyError::empty(self.to_string())),
                Err(err) => Err(err),
            },
            SupplierKind::Once { inner, cache } => {
                if let Some(cached) = cache.get() {
                    return cached.clone();
                }
                match inner.get() {
                    Ok(value) => cache.get_or_init(|| Ok(value)).clone(),
                    Err(PropertyError::Empty { .. }) => cache
                        .get_or_init(|| Err(PropertyError::empty(self.to_string())))
                        .clone(),
                    // Deferred values may still arrive, so they are not cached.
                    Err(err) => Err(err),
                }
            }
            SupplierKind::Void { .. } => Err(PropertyError::empty(self.to_string())),
            SupplierKind::Deferred { subject } => Err(PropertyError::Deferred {
                subject: subject.clone(),
                message: None,
            }),
            SupplierKind::Property(property) => property.get(),
            SupplierKind::Task(address) => Ok(Value::Str(address.to_string())),
        }
    }

    /// Return the value, or `fallback` if the supplier is empty or deferred.
    pub fn get_or(&self, fallback: impl Into<Value>) -> Result<Value, PropertyError> {
        match self.get() {
            Err(PropertyError::Empty { .. }) | Err(PropertyError::Deferred { .. }) => {
                Ok(fallback.into())
            }
            other => other,
        }
    }

    /// The suppliers this one is directly derived from.
    pub fn derived_from(&self) -> Vec<Supplier> {
        match self.0.as_ref() {
            SupplierKind::Of { derived_from, .. }
            | SupplierKind::Callable { derived_from, .. }
            | SupplierKind::Void { derived_from } => derived_from.clone(),
            SupplierKind::Map { inner, .. } | SupplierKind::Once { inner, .. } => {
                vec![inner.clone()]
            }
            SupplierKind::Deferred { .. } | SupplierKind::Task(_) => Vec::new(),
            SupplierKind::Property(property) => property.derived_from(),
        }
    }

    /// Breadth-first walk over this supplier and everything it is transitively derived from.
    /// Each entry carries the supplier and its direct `derived_from` list.
    pub fn lineage(&self) -> Vec<(Supplier, Vec<Supplier>)> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.clone()]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.identity()) {
                continue;
            }
            let derived = current.derived_from();
            queue.extend(derived.iter().cloned());
            out.push((current, derived));
        }
        out
    }

    /// Whether `property` appears anywhere in this supplier's lineage.
    pub fn reaches(&self, property: &Property) -> bool {
        self.lineage()
            .iter()
            .any(|(supplier, _)| supplier.identity() == property.identity())
    }

    /// True for void and deferred suppliers, i.e. nothing was ever assigned.
    pub fn is_void(&self) -> bool {
        matches!(
            self.0.as_ref(),
            SupplierKind::Void { .. } | SupplierKind::Deferred { .. }
        )
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.0.as_ref(), SupplierKind::Deferred { .. })
    }

    /// Empty or not yet available.
    pub fn is_empty(&self) -> bool {
        matches!(
            self.get(),
            Err(PropertyError::Empty { .. }) | Err(PropertyError::Deferred { .. })
        )
    }

    pub fn is_filled(&self) -> bool {
        !self.is_empty()
    }

    /// The property this supplier aliases, if any.
    pub fn as_property(&self) -> Option<&Property> {
        match self.0.as_ref() {
            SupplierKind::Property(property) => Some(property),
            _ => None,
        }
    }

    /// The task this supplier marks a dependency on, if any.
    pub fn as_task(&self) -> Option<&Address> {
        match self.0.as_ref() {
            SupplierKind::Task(address) => Some(address),
            _ => None,
        }
    }

    fn identity(&self) -> usize {
        match self.0.as_ref() {
            SupplierKind::Property(property) => property.identity(),
            _ => Arc::as_ptr(&self.0) as *const () as usize,
        }
    }
}

impl From<Property> for Supplier {
    fn from(property: Property) -> Self {
        Supplier::property(property)
    }
}

impl From<&Property> for Supplier {
    fn from(property: &Property) -> Self {
        Supplier::property(property.clone())
    }
}

impl fmt::Display for Supplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref() {
            SupplierKind::Of { value, .. } => write!(f, "Supplier.of({value})"),
            SupplierKind::Callable { .. } => f.write_str("Supplier.of_callable(..)"),
            SupplierKind::Map { inner, .. } => write!(f, "{inner}.map(..)"),
            SupplierKind::Once { inner, .. } => write!(f, "{inner}.once()"),
            SupplierKind::Void { .. } => f.write_str("Supplier.void()"),
            SupplierKind::Deferred { subject } => write!(f, "Supplier.deferred({subject})"),
            SupplierKind::Property(property) => write!(f, "{property}"),
            SupplierKind::Task(address) => write!(f, "Supplier.task({address})"),
        }
    }
}

impl fmt::Debug for Supplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
