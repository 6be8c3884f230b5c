// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Link Registry.
//!
//! Links come from three places:
//! - [`declared`]: `links` / `x-links` in the schema
//! - [`inference`]: static analysis of response schemas and path parameters
//! - [`location`]: `Location` headers observed at runtime
//!
//! The registry keeps them in an immutable [`LinkSet`] behind an `ArcSwap`.
//! Writers publish a new set with a copy-on-write update; readers take a
//! snapshot and never wait for writers.

pub mod declared;
pub mod inference;
pub mod location;
pub mod naming;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use statewalk_dsl::{Link, LinkKey, LinkParameter, OperationKey, ParameterLocation};
use tracing::debug;

pub use declared::declared_links;
pub use inference::{Cardinality, ResourceDescriptor, infer_static, resource_descriptors};
pub use location::LocationLearner;

use crate::catalog::Catalog;
use crate::error::SchemaError;

/// An immutable, deduplicated set of links.
#[derive(Debug, Clone, Default)]
pub struct LinkSet {
    links: Vec<Arc<Link>>,
    by_key: HashMap<LinkKey, usize>,
    by_target: HashMap<OperationKey, Vec<usize>>,
}

impl LinkSet {
    pub fn new(links: impl IntoIterator<Item = Link>) -> Self {
        let mut set = Self::default();
        for link in links {
            set.insert(link);
        }
        set
    }

    /// Add a link, returning whether the set changed.
    ///
    /// A link with the same `(source, target, parameter-set)` as an existing
    /// one only replaces it when its origin takes precedence.
    pub fn insert(&mut self, link: Link) -> bool {
        let key = link.key();
        if let Some(&index) = self.by_key.get(&key) {
            if link.origin.precedence() <= self.links[index].origin.precedence() {
                return false;
            }
            self.links[index] = Arc::new(link);
            return true;
        }
        let index = self.links.len();
        self.by_target
            .entry(link.target.clone())
            .or_default()
            .push(index);
        self.by_key.insert(key, index);
        self.links.push(Arc::new(link));
        true
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().map(AsRef::as_ref)
    }

    /// Links whose target is `target`, in insertion order.
    pub fn links_to(&self, target: &OperationKey) -> impl Iterator<Item = &Link> {
        self.by_target
            .get(target)
            .into_iter()
            .flatten()
            .map(|&i| self.links[i].as_ref())
    }

    pub fn links_from(&self, source: &OperationKey) -> impl Iterator<Item = &Link> {
        self.iter().filter(move |l| &l.source == source)
    }

    /// Links able to fill one parameter of `target`, strongest first.
    ///
    /// Declared links come before learned ones, newer learned links before
    /// older ones, and statically inferred links last.
    pub fn candidates(
        &self,
        target: &OperationKey,
        location: ParameterLocation,
        name: &str,
    ) -> Vec<(&Link, &LinkParameter)> {
        let mut candidates: Vec<(&Link, &LinkParameter)> = self
            .links_to(target)
            .filter_map(|link| link.parameter(location, name).map(|p| (link, p)))
            .collect();
        candidates.sort_by(|a, b| b.0.origin.precedence().cmp(&a.0.origin.precedence()));
        candidates
    }

    /// Links carrying a request body for `target`, strongest first.
    pub fn body_candidates(&self, target: &OperationKey) -> Vec<&Link> {
        let mut candidates: Vec<&Link> = self
            .links_to(target)
            .filter(|link| link.request_body.is_some())
            .collect();
        candidates.sort_by(|a, b| b.origin.precedence().cmp(&a.origin.precedence()));
        candidates
    }
}

/// Process-wide registry of links.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    current: ArcSwap<LinkSet>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the declared and statically inferred links of `catalog`.
    pub fn from_catalog(catalog: &Catalog) -> Result<Self, SchemaError> {
        let registry = Self::new();
        registry.extend(declared_links(catalog)?);
        registry.extend(infer_static(catalog));
        Ok(registry)
    }

    /// Add links, returning how many changed the registry.
    pub fn extend(&self, links: impl IntoIterator<Item = Link>) -> usize {
        let links: Vec<Link> = links.into_iter().collect();
        if links.is_empty() {
            return 0;
        }
        let mut added = 0;
        self.current.rcu(|current| {
            let mut next = LinkSet::clone(current);
            added = links
                .iter()
                .filter(|link| next.insert(Link::clone(link)))
                .count();
            next
        });
        added
    }

    /// Record links learned at runtime.
    pub fn learn(&self, links: Vec<Link>) -> usize {
        // Skip the copy when nothing would change
        let snapshot = self.snapshot();
        let fresh: Vec<Link> = links
            .into_iter()
            .filter(|link| match snapshot.by_key.get(&link.key()) {
                Some(&i) => snapshot.links[i].origin.precedence() < link.origin.precedence()
                    && snapshot.links[i].parameters != link.parameters,
                None => true,
            })
            .collect();
        let added = self.extend(fresh);
        if added > 0 {
            debug!(added, total = self.len(), "Learned links registered");
        }
        added
    }

    /// The current set. Later updates are not visible through it.
    pub fn snapshot(&self) -> Arc<LinkSet> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
