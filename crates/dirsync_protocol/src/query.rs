//! Request parameters for differential and point queries.

use crate::envelope::TOKEN_QUERY_PARAMETER;

/// Resource set queried when none is configured.
pub const DEFAULT_RESOURCE_SET: &str = "directoryObjects";

const API_VERSION_PARAMETER: &str = "api-version";
const SELECT_PARAMETER: &str = "$select";
const FILTER_PARAMETER: &str = "$filter";

/// A differential query for one batch of changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaQuery {
    /// Resource set to query.
    pub resource_set: String,
    /// Continuation token; empty for an initial full sync.
    pub token: String,
    /// Object kinds to include (empty = all).
    pub object_kinds: Vec<String>,
    /// Properties to project (empty = all).
    pub properties: Vec<String>,
}

impl DeltaQuery {
    /// Creates a query over `resource_set` resuming from `token`.
    pub fn new(resource_set: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            resource_set: resource_set.into(),
            token: token.into(),
            object_kinds: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Restricts the query to the given object kinds.
    pub fn with_object_kinds(mut self, kinds: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.object_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Projects the given properties.
    pub fn with_properties(mut self, properties: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if this query starts a full sync.
    pub fn is_initial(&self) -> bool {
        self.token.is_empty()
    }

    /// Path of the query relative to the tenant root.
    pub fn path(&self) -> &str {
        &self.resource_set
    }

    /// Builds the query-string parameters, unencoded.
    pub fn query_pairs(&self, api_version: &str) -> Vec<(String, String)> {
        let mut pairs = vec![
            (API_VERSION_PARAMETER.to_string(), api_version.to_string()),
            (TOKEN_QUERY_PARAMETER.to_string(), self.token.clone()),
        ];

        if !self.properties.is_empty() {
            pairs.push((SELECT_PARAMETER.to_string(), self.properties.join(",")));
        }

        if let Some(filter) = self.kind_filter() {
            pairs.push((FILTER_PARAMETER.to_string(), filter));
        }

        pairs
    }

    /// Disjunction of kind predicates, e.g. `isof('User') or isof('Group')`.
    pub fn kind_filter(&self) -> Option<String> {
        if self.object_kinds.is_empty() {
            return None;
        }
        Some(
            self.object_kinds
                .iter()
                .map(|kind| format!("isof('{kind}')"))
                .collect::<Vec<_>>()
                .join(" or "),
        )
    }
}

/// A point query for a single directory object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectQuery {
    /// Object ID to retrieve.
    pub object_id: String,
}

impl ObjectQuery {
    /// Creates a point query.
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
        }
    }

    /// Path of the object relative to the tenant root.
    pub fn path(&self) -> String {
        format!("{DEFAULT_RESOURCE_SET}('{}')", self.object_id)
    }

    /// Builds the query-string parameters, unencoded.
    pub fn query_pairs(&self, api_version: &str) -> Vec<(String, String)> {
        vec![(API_VERSION_PARAMETER.to_string(), api_version.to_string())]
    }
}
