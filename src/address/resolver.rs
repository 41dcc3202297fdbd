use super::address::{Address, Element};
use std::fmt;

/// A tree that addresses can be resolved against.
///
/// Children must be returned in the order they were registered with their parent; resolution
/// order is derived from it.
pub trait AddressSpace {
    type Node: Clone;

    fn root(&self) -> Self::Node;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

    fn address(&self, node: &Self::Node) -> Address;
}

/// Raised when a concrete element of a query has no match in the address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResolutionError {
    /// Address of the node the resolution started from
    pub origin: Address,
    /// The query as passed by the caller
    pub query: Address,
    /// Address of the last node that was matched before the failure
    pub failed_at: Address,
    /// The part of the query that could not be resolved from `failed_at`
    pub remainder: Address,
}

impl AddressResolutionError {
    /// Whether the failure was at the element right after a recursive wildcard.
    pub fn is_recursive_wildcard_failure(&self) -> bool {
        self.remainder
            .elements()
            .first()
            .is_some_and(Element::is_recursive_wildcard)
    }

    /// The absolute address that does not exist. For recursive wildcard failures this keeps
    /// the `**` element, e.g. `:**:d` when nothing named `d` exists anywhere.
    pub fn nonexistent_address(&self) -> Address {
        let shift = usize::from(self.is_recursive_wildcard_failure());
        let take = shift + usize::from(!self.remainder.is_absolute());
        let elements = self.remainder.elements();
        let clipped = Address::create(
            self.remainder.is_absolute(),
            self.remainder.is_container(),
            elements[..take.min(elements.len())].to_vec(),
        );
        self.failed_at.concat(&clipped)
    }
}

impl fmt::Display for AddressResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not resolve address '{}' in context '{}'. The failure occurred at address '{}' \
             trying to resolve the remainder '{}'. The address '{}' does not exist.",
            self.query,
            self.origin,
            self.failed_at,
            self.remainder,
            self.nonexistent_address()
        )
    }
}

impl std::error::Error for AddressResolutionError {}

/// Errors from [`resolve_address`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("An empty address query cannot be resolved")]
    EmptyQuery,

    #[error(transparent)]
    Unresolved(#[from] AddressResolutionError),
}

/// One step of a resolution: the node it started at, the remaining query, and either the
/// final matches (leaf step) or the steps branching from it.
#[derive(Debug, Clone)]
pub struct ResolutionStep<N> {
    pub entity: N,
    pub query: Address,
    pub matches: Vec<N>,
    pub next_steps: Vec<ResolutionStep<N>>,
}

impl<N> ResolutionStep<N> {
    /// A leaf step is the root query or a single relative element.
    pub fn is_leaf(&self) -> bool {
        self.query.is_root() || (!self.query.is_absolute() && self.query.len() == 1)
    }

    fn collect_matches<'a>(&'a self, out: &mut Vec<&'a N>) {
        out.extend(self.matches.iter());
        for step in &self.next_steps {
            step.collect_matches(out);
        }
    }
}

/// The tree of steps produced by [`resolve_address`].
#[derive(Debug, Clone)]
pub struct Resolution<N> {
    root: ResolutionStep<N>,
}

impl<N: Clone> Resolution<N> {
    pub fn root_step(&self) -> &ResolutionStep<N> {
        &self.root
    }

    /// All matched nodes in resolution order. Each call walks the step tree again.
    pub fn matches(&self) -> impl Iterator<Item = &N> {
        let mut out = Vec::new();
        self.root.collect_matches(&mut out);
        out.into_iter()
    }

    pub fn into_matches(self) -> Vec<N> {
        self.matches().cloned().collect()
    }
}

struct Walk<'a, S: AddressSpace> {
    space: &'a S,
    origin: &'a S::Node,
    query: &'a Address,
}

impl<S: AddressSpace> Walk<'_, S> {
    fn error(&self, entity: &S::Node, remainder: &Address) -> AddressResolutionError {
        AddressResolutionError {
            origin: self.space.address(self.origin),
            query: self.query.clone(),
            failed_at: self.space.address(entity),
            remainder: remainder.clone(),
        }
    }

    fn recurse_tree(&self, entity: &S::Node, include_root: bool, out: &mut Vec<S::Node>) {
        if include_root {
            out.push(entity.clone());
        }
        for child in self.space.children(entity) {
            self.recurse_tree(&child, true, out);
        }
    }

    fn has_children(&self, node: &S::Node) -> bool {
        !self.space.children(node).is_empty()
    }

    fn step(
        &self,
        previous: Option<&Address>,
        entity: S::Node,
        query: Address,
        restrict_to_containers: bool,
    ) -> Result<ResolutionStep<S::Node>, AddressResolutionError> {
        let element: Option<&Element>;
        let next_entities: Vec<S::Node>;
        let remainder: Option<Address>;

        if query.is_absolute() {
            element = None;
            next_entities = vec![self.space.root()];
            remainder = if query.elements().is_empty() {
                None
            } else {
                Some(Address::create(false, query.is_container(), query.elements().to_vec()))
            };
        } else {
            let first = &query.elements()[0];
            let rest = if query.len() > 1 {
                Address::create(false, query.is_container(), query.elements()[1..].to_vec())
            } else {
                Address::empty()
            };
            next_entities = if first.is_current() {
                vec![entity.clone()]
            } else if first.is_parent() {
                self.space.parent(&entity).into_iter().collect()
            } else if first.is_recursive_wildcard() {
                // `:a:**` must not include `:a` itself
                let mut out = Vec::new();
                self.recurse_tree(&entity, !rest.is_empty(), &mut out);
                out
            } else {
                self.space
                    .children(&entity)
                    .into_iter()
                    .filter(|child| {
                        self.space
                            .address(child)
                            .name()
                            .is_ok_and(|name| first.matches(name))
                    })
                    .collect()
            };
            element = Some(first);
            remainder = Some(rest);
        }

        // Only a concrete element may fail. Elements after `**` and fallible or globbing
        // elements are allowed to produce nothing.
        let after_recursive = previous
            .and_then(|p| p.elements().first())
            .is_some_and(Element::is_recursive_wildcard);
        let concrete = !after_recursive
            && (query.is_absolute() || query.elements().first().is_some_and(Element::is_concrete));
        if concrete && next_entities.is_empty() {
            return Err(self.error(&entity, &query));
        }

        let mut step = ResolutionStep {
            entity: entity.clone(),
            query: query.clone(),
            matches: Vec::new(),
            next_steps: Vec::new(),
        };

        match remainder {
            Some(rest) if !rest.is_empty() => {
                for next in next_entities {
                    let next_step = self.step(Some(&query), next, rest.clone(), restrict_to_containers)?;
                    step.next_steps.push(next_step);
                }
                let last_fallible = rest.elements().last().is_some_and(Element::is_fallible);
                if !last_fallible
                    && element.is_some_and(Element::is_recursive_wildcard)
                    && !step
                        .next_steps
                        .iter()
                        .any(|s| !s.next_steps.is_empty() || !s.matches.is_empty())
                {
                    return Err(self.error(&entity, &query));
                }
            }
            _ => {
                if restrict_to_containers {
                    step.matches = next_entities
                        .into_iter()
                        .filter(|node| self.has_children(node))
                        .collect();
                } else {
                    step.matches = next_entities;
                }
            }
        }

        Ok(step)
    }
}

/// Resolve `query` in `space` starting from `origin`.
///
/// Absolute queries start at the root of the space. The walk branches at wildcards and yields
/// matches in deterministic order: `**` expands depth-first (and may match the empty suffix),
/// `*` iterates children in registration order. A failed fallible element ends its branch
/// silently; a failed concrete element fails the whole resolution. A container query only
/// matches nodes that have children.
pub fn resolve_address<S: AddressSpace>(
    space: &S,
    origin: &S::Node,
    query: &Address,
) -> Result<Resolution<S::Node>, ResolveError> {
    if query.is_empty() {
        return Err(ResolveError::EmptyQuery);
    }
    let walk = Walk {
        space,
        origin,
        query,
    };
    let root = walk.step(None, origin.clone(), query.clone(), query.is_container())?;
    Ok(Resolution { root })
}
