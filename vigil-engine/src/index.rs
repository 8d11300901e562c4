//! Domain indexes over the loaded feature graphs.
//!
//! The fusion engine translates between two namespaces: the per-user one,
//! where the same host name contacted by two users is two distinct
//! domains, and the aggregate one, unique by name across users. Both maps
//! are explicit here and keep insertion order, which downstream stages
//! rely on for deterministic output.

use std::sync::Arc;

use indexmap::IndexMap;

use vigil_core::Domain;

#[derive(Debug, Clone, Default)]
pub struct DomainIndex {
    /// user id -> domain name -> that user's domain.
    by_users: IndexMap<String, IndexMap<String, Arc<Domain>>>,
    /// domain name -> aggregate domain (requests unioned across users).
    all: IndexMap<String, Arc<Domain>>,
}

impl DomainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one user's domain. The aggregate entry starts as an alias
    /// of the first user's domain and is replaced by a merged copy as soon
    /// as another user contributes a differing request set.
    pub fn insert_user_domain(&mut self, user: &str, domain: Arc<Domain>) {
        self.by_users
            .entry(user.to_string())
            .or_default()
            .insert(domain.name().to_string(), domain.clone());

        let replacement = match self.all.get(domain.name()) {
            None => Some(domain.clone()),
            Some(existing) if !existing.deep_equals(&domain) => {
                Some(Arc::new(existing.merge(&domain)))
            }
            Some(_) => None,
        };
        if let Some(aggregate) = replacement {
            self.all.insert(domain.name().to_string(), aggregate);
        }
    }

    pub fn user_domain(&self, user: &str, name: &str) -> Option<&Arc<Domain>> {
        self.by_users.get(user)?.get(name)
    }

    /// All domains of one user, in insertion order.
    pub fn user_domains(&self, user: &str) -> Option<&IndexMap<String, Arc<Domain>>> {
        self.by_users.get(user)
    }

    pub fn aggregate(&self, name: &str) -> Option<&Arc<Domain>> {
        self.all.get(name)
    }

    /// The aggregate namespace, in insertion order.
    pub fn aggregates(&self) -> &IndexMap<String, Arc<Domain>> {
        &self.all
    }

    /// Number of unique-by-name domains across the selected users.
    pub fn total_domains(&self) -> usize {
        self.all.len()
    }
}
