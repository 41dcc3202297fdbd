use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, LazyLock, OnceLock};

/// Separator between the elements of an address.
pub const SEPARATOR: &str = ":";

/// Characters permitted in an address element (regex character class body).
pub const VALID_CHARACTERS: &str = r"a-zA-Z0-9/_\-\.\*";

static ELEMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^[{VALID_CHARACTERS}]+$")).expect("element pattern is a valid regex")
});

static INVALID_RUNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("[^{VALID_CHARACTERS}]+")).expect("invalid-run pattern is a valid regex")
});

/// Upper bound on the number of interned addresses. Texts parsed once the table is full are
/// still parsed, just not shared.
pub const MAX_INTERNED: usize = 16 * 1024;

/// Parsed addresses keyed by their source text, so equal inputs share one allocation.
static INTERNED: LazyLock<DashMap<String, Address>> = LazyLock::new(DashMap::new);

static ROOT: LazyLock<Address> = LazyLock::new(|| Address::create(true, true, Vec::new()));
static EMPTY: LazyLock<Address> = LazyLock::new(|| Address::create(false, false, Vec::new()));
static CURRENT: LazyLock<Address> =
    LazyLock::new(|| Address::create(false, false, vec![Element::current()]));

/// Raised when address text does not follow the address grammar
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: '{input}' (reason: {reason})")]
pub struct AddressParseError {
    pub input: String,
    pub reason: String,
}

/// Misuse of an address operation that has no meaningful result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("root address has no parent")]
    RootHasNoParent,

    #[error("empty address has no parent")]
    EmptyHasNoParent,

    #[error("cannot set container status to false for root address")]
    RootIsAlwaysContainer,

    #[error("cannot set container status for empty address")]
    EmptyContainer,

    #[error("address '{0}' has no elements, and thus no name")]
    NoName(String),
}

/// The text between two separators of an address.
///
/// Elements containing `*` carry their glob compiled to an anchored regex. Equality, ordering
/// and hashing only look at the value and the fallible marker.
#[derive(Debug, Clone)]
pub struct Element {
    value: String,
    fallible: bool,
    glob: Option<Regex>,
}

/// Translate a shell glob into an anchored regex. Only `*` is a metacharacter in the element
/// alphabet, each one becomes `.*`.
fn compile_glob(value: &str) -> Result<Option<Regex>, regex::Error> {
    if !value.contains('*') {
        return Ok(None);
    }
    let pattern = value.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
    Regex::new(&format!("^{pattern}$")).map(Some)
}

impl Element {
    pub const CURRENT: &'static str = ".";
    pub const PARENT: &'static str = "..";
    pub const WILDCARD: &'static str = "*";
    pub const RECURSIVE_WILDCARD: &'static str = "**";

    /// Create an element, validating its value against the element character class
    pub fn new(value: impl Into<String>, fallible: bool) -> Result<Self, AddressParseError> {
        let value = value.into();
        if !ELEMENT_PATTERN.is_match(&value) {
            let shown = if fallible { format!("{value}?") } else { value };
            return Err(AddressParseError {
                reason: format!("invalid address element: '{shown}'"),
                input: shown,
            });
        }
        let glob = compile_glob(&value).map_err(|err| AddressParseError {
            input: value.clone(),
            reason: format!("invalid glob: {err}"),
        })?;
        Ok(Self {
            value,
            fallible,
            glob,
        })
    }

    /// One of the well-known element values, which are always valid.
    fn builtin(value: &str) -> Self {
        Self {
            glob: compile_glob(value).ok().flatten(),
            value: value.to_string(),
            fallible: false,
        }
    }

    /// Parse an element, treating one trailing `?` as the fallible marker
    pub fn parse(text: &str) -> Result<Self, AddressParseError> {
        match text.strip_suffix('?') {
            Some(value) => Self::new(value, true),
            None => Self::new(text, false),
        }
    }

    fn current() -> Self {
        Self::builtin(Self::CURRENT)
    }

    fn parent() -> Self {
        Self::builtin(Self::PARENT)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_fallible(&self) -> bool {
        self.fallible
    }

    pub fn is_current(&self) -> bool {
        self.value == Self::CURRENT
    }

    pub fn is_parent(&self) -> bool {
        self.value == Self::PARENT
    }

    pub fn is_recursive_wildcard(&self) -> bool {
        self.value == Self::RECURSIVE_WILDCARD
    }

    /// A concrete element has exactly one match: it has no glob characters and is not fallible.
    pub fn is_concrete(&self) -> bool {
        !(self.fallible || self.value.contains('*'))
    }

    /// Shell-glob match of `name` against this element's value.
    pub fn matches(&self, name: &str) -> bool {
        match &self.glob {
            Some(glob) => glob.is_match(name),
            None => self.value == name,
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.fallible == other.fallible
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.fallible.hash(state);
    }
}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.value, self.fallible).cmp(&(&other.value, other.fallible))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fallible {
            write!(f, "{}?", self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}

/// Returns true if `name` is a valid address element value without a fallible marker.
pub fn is_valid_name(name: &str) -> bool {
    ELEMENT_PATTERN.is_match(name)
}

/// Collapse every run of characters outside the element alphabet into a single `-`.
pub fn normalize_name(name: &str) -> String {
    INVALID_RUNS.replace_all(name, "-").into_owned()
}

/// An immutable hierarchical name, comparable to a filesystem path.
///
/// Elements are separated by `:`. A leading separator makes the address absolute, a trailing
/// separator makes it a container reference. `.` refers to the current node and `..` to its
/// parent. `*` globs one level, `**` any number of levels, and a trailing `?` on an element
/// permits resolution to fail at that element.
///
/// Cloning is cheap. Addresses parsed from identical text share their allocation, and the hash
/// is computed once on first use.
#[derive(Clone)]
pub struct Address(Arc<Inner>);

struct Inner {
    absolute: bool,
    container: bool,
    elements: Vec<Element>,
    hash: OnceLock<u64>,
}

impl Address {
    /// Parse address text. Identical inputs return the same shared instance while the intern
    /// table has room, see [`MAX_INTERNED`].
    pub fn parse(text: &str) -> Result<Self, AddressParseError> {
        if let Some(existing) = INTERNED.get(text) {
            return Ok(existing.clone());
        }
        let address = Self::parse_uncached(text)?;
        if INTERNED.len() < MAX_INTERNED {
            INTERNED.insert(text.to_string(), address.clone());
        }
        Ok(address)
    }

    /// Number of addresses currently held by the intern table.
    pub fn interned_count() -> usize {
        INTERNED.len()
    }

    fn parse_uncached(text: &str) -> Result<Self, AddressParseError> {
        let mut parts: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else if text == SEPARATOR {
            vec![""]
        } else {
            text.split(SEPARATOR).collect()
        };

        let mut absolute = false;
        if parts.first().is_some_and(|p| p.is_empty()) {
            absolute = true;
            parts.remove(0);
        }
        let mut container = false;
        if parts.last().is_some_and(|p| p.is_empty()) {
            container = true;
            parts.pop();
        }

        let elements = parts
            .iter()
            .map(|part| Element::parse(part))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| AddressParseError {
                input: text.to_string(),
                reason: err.reason,
            })?;

        Ok(Self::create(absolute, container, elements))
    }

    /// Build an address from its parts.
    ///
    /// An address without elements that is absolute or a container is always both, since
    /// pathological inputs like `:a:..` are equivalent to the root.
    pub fn create(absolute: bool, container: bool, elements: Vec<Element>) -> Self {
        let (absolute, container) = if elements.is_empty() && (absolute || container) {
            (true, true)
        } else {
            (absolute, container)
        };
        Self(Arc::new(Inner {
            absolute,
            container,
            elements,
            hash: OnceLock::new(),
        }))
    }

    /// The root address `:`.
    pub fn root() -> Self {
        ROOT.clone()
    }

    /// The empty address, the only invalid state of an address.
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// The current-node address `.`.
    pub fn current() -> Self {
        CURRENT.clone()
    }

    /// The parent address `..`.
    pub fn parent_dir() -> Self {
        Self::create(
            false,
            false,
            vec![Element::builtin(Element::PARENT)],
        )
    }

    /// The single-level wildcard `*`.
    pub fn wildcard() -> Self {
        Self::create(
            false,
            false,
            vec![Element::builtin(Element::WILDCARD)],
        )
    }

    /// The recursive wildcard `**`.
    pub fn recursive_wildcard() -> Self {
        Self::create(
            false,
            false,
            vec![Element::builtin(Element::RECURSIVE_WILDCARD)],
        )
    }

    pub fn elements(&self) -> &[Element] {
        &self.0.elements
    }

    pub fn len(&self) -> usize {
        self.0.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.0.absolute && self.0.elements.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.0.absolute
    }

    pub fn is_root(&self) -> bool {
        self.0.absolute && self.0.elements.is_empty()
    }

    pub fn is_container(&self) -> bool {
        self.0.container
    }

    /// Absolute and free of globbing or fallible elements.
    pub fn is_concrete(&self) -> bool {
        self.0.absolute && self.0.elements.iter().all(Element::is_concrete)
    }

    /// Cancel `element, ..` pairs and drop `.` elements without consulting any tree.
    ///
    /// The result is not a container unless `keep_container` is set. A relative address that
    /// normalizes to nothing becomes `.`.
    pub fn normalize(&self, keep_container: bool) -> Self {
        let mut elements: Vec<Element> = Vec::with_capacity(self.len());
        for element in self.elements() {
            if element.is_parent() && !elements.is_empty() {
                elements.pop();
            } else if element.is_current() {
                continue;
            } else {
                elements.push(element.clone());
            }
        }
        if !self.is_absolute() && elements.is_empty() {
            elements.push(Element::current());
        }
        Self::create(self.is_absolute(), self.is_container() && keep_container, elements)
    }

    /// Join `other` onto this address. An absolute `other` is returned unchanged.
    pub fn concat(&self, other: &Address) -> Self {
        if other.is_absolute() {
            return other.clone();
        }
        let mut elements = self.0.elements.clone();
        elements.extend(other.elements().iter().cloned());
        Self::create(self.is_absolute(), other.is_container(), elements)
    }

    /// Return a new non-container address with one element appended.
    pub fn append(&self, element: Element) -> Self {
        let mut elements = self.0.elements.clone();
        elements.push(element);
        Self::create(self.is_absolute(), false, elements)
    }

    /// Parse `name` as an element and append it.
    pub fn join(&self, name: &str) -> Result<Self, AddressParseError> {
        Ok(self.append(Element::parse(name)?))
    }

    pub fn set_container(&self, container: bool) -> Result<Self, AddressError> {
        if self.is_root() {
            if !container {
                return Err(AddressError::RootIsAlwaysContainer);
            }
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Err(AddressError::EmptyContainer);
        }
        Ok(Self::create(self.is_absolute(), container, self.0.elements.clone()))
    }

    /// Value of the last element.
    pub fn name(&self) -> Result<&str, AddressError> {
        self.0
            .elements
            .last()
            .map(Element::value)
            .ok_or_else(|| AddressError::NoName(self.to_string()))
    }

    /// The address one level up. The container flag is preserved.
    pub fn parent(&self) -> Result<Self, AddressError> {
        let elements = self.elements();
        if elements.is_empty() {
            return Err(if self.is_absolute() {
                AddressError::RootHasNoParent
            } else {
                AddressError::EmptyHasNoParent
            });
        }
        if !self.is_absolute() {
            let last = &elements[elements.len() - 1];
            if last.is_current() {
                return Ok(Self::create(false, self.is_container(), vec![Element::parent()]));
            }
            if last.is_parent() {
                let mut up = elements.to_vec();
                up.push(Element::parent());
                return Ok(Self::create(false, self.is_container(), up));
            }
            if elements.len() == 1 {
                return Ok(Self::current());
            }
        }
        Ok(Self::create(
            self.is_absolute(),
            self.is_container(),
            elements[..elements.len() - 1].to_vec(),
        ))
    }

    fn hash_key(&self) -> u64 {
        *self.0.hash.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.0.absolute.hash(&mut hasher);
            self.0.elements.hash(&mut hasher);
            hasher.finish()
        })
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.absolute == other.0.absolute
                && self.0.container == other.0.container
                && self.0.elements == other.0.elements)
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_key());
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.0.absolute, &self.0.elements, self.0.container).cmp(&(
            other.0.absolute,
            &other.0.elements,
            other.0.container,
        ))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_absolute() {
            f.write_str(SEPARATOR)?;
        }
        for (idx, element) in self.elements().iter().enumerate() {
            if idx > 0 {
                f.write_str(SEPARATOR)?;
            }
            write!(f, "{element}")?;
        }
        if self.is_container() && !self.is_root() {
            f.write_str(SEPARATOR)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address('{self}')")
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
