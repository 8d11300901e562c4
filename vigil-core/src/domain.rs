//! A contacted domain and the requests observed for it.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::request::Request;

/// A host name plus the ordered sequence of HTTP requests observed for it.
///
/// When viewed per user the domain carries the owning client identifier;
/// the aggregated view carries the union of requests across users (built
/// via [`Domain::merge`]).
///
/// Graph keying identity is `(client, name)` only; full-content comparison
/// is [`Domain::deep_equals`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Domain {
    name: String,
    client: String,
    requests: Vec<Request>,
}

impl Domain {
    pub fn new(name: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: client.into(),
            requests: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning client identifier (first owner for an aggregated domain).
    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn push_request(&mut self, request: Request) {
        self.requests.push(request);
    }

    /// Merge two same-named domains. Set semantics over request identity:
    /// the receiver's sequence comes first, then every request of `other`
    /// not already present, in `other`'s order. Differing names leave the
    /// receiver unchanged.
    pub fn merge(&self, other: &Domain) -> Domain {
        let mut out = self.clone();
        if self.name == other.name {
            for request in &other.requests {
                if !out.requests.contains(request) {
                    out.requests.push(request.clone());
                }
            }
        }
        out
    }

    /// Compare name plus requests-as-set (order insensitive).
    pub fn deep_equals(&self, other: &Domain) -> bool {
        self.name == other.name
            && self.requests.len() == other.requests.len()
            && self.requests.iter().all(|r| other.requests.contains(r))
    }
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        self.client == other.client && self.name == other.name
    }
}

impl Eq for Domain {}

impl Hash for Domain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.client.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
