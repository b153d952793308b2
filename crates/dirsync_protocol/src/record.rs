//! Change records delivered by the differential query service.
//!
//! A raw record is a JSON object. Classification turns it into a
//! [`ChangeRecord`]: a node change keyed by `objectId`, a link change keyed by
//! the (`sourceObjectId`, `targetObjectId`) pair, or an unknown kind that
//! callers skip.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An untyped change record as it appears on the wire.
pub type RawRecord = Map<String, Value>;

/// Field carrying the entity-kind discriminator.
pub const DISCRIMINATOR_FIELD: &str = "odata.type";
/// Identity field of node records.
pub const OBJECT_ID_FIELD: &str = "objectId";
/// Source identity field of link records.
pub const SOURCE_OBJECT_ID_FIELD: &str = "sourceObjectId";
/// Target identity field of link records.
pub const TARGET_OBJECT_ID_FIELD: &str = "targetObjectId";
/// Instance annotation marking a hard-deleted entry.
pub const HARD_DELETE_MARKER: &str = "aad.isDeleted";
/// Instance annotation marking a soft-deleted entry.
pub const SOFT_DELETE_MARKER: &str = "aad.isSoftDeleted";
/// Discriminator (final segment) of link changes.
pub const LINK_CHANGE_KIND: &str = "DirectoryLinkChange";

const ANNOTATION_PREFIX: &str = "aad.";
const OBJECT_TYPE_FIELD: &str = "objectType";

/// Directory object kinds replicated as nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A user account.
    User,
    /// An external contact.
    Contact,
    /// A group.
    Group,
}

impl NodeKind {
    /// Parses a kind from a discriminator, qualified or not.
    ///
    /// `Microsoft.WindowsAzure.ActiveDirectory.User` and `User` both yield
    /// [`NodeKind::User`].
    pub fn from_discriminator(discriminator: &str) -> Option<Self> {
        match short_kind(discriminator) {
            "User" => Some(NodeKind::User),
            "Contact" => Some(NodeKind::Contact),
            "Group" => Some(NodeKind::Group),
            _ => None,
        }
    }

    /// Returns the unqualified kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::User => "User",
            NodeKind::Contact => "Contact",
            NodeKind::Group => "Group",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a link: the ordered (source, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    /// Source object ID.
    pub source: String,
    /// Target object ID.
    pub target: String,
}

impl EdgeKey {
    /// Creates a new edge key.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Returns true if the link points back at its own source.
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// A change to a directory object.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeChange {
    /// Object kind, when known.
    pub kind: Option<NodeKind>,
    /// Object ID.
    pub object_id: String,
    /// Whether a hard or soft deletion marker is set.
    pub deleted: bool,
    /// Remaining attributes (identity, discriminator and markers removed).
    pub attributes: RawRecord,
}

impl NodeChange {
    /// Parses a node change whose kind has already been classified.
    pub fn parse(raw: &RawRecord, kind: Option<NodeKind>) -> ProtocolResult<Self> {
        let object_id = identity_field(raw, OBJECT_ID_FIELD)?;
        let deleted =
            deletion_marker(raw, HARD_DELETE_MARKER)? || deletion_marker(raw, SOFT_DELETE_MARKER)?;

        Ok(Self {
            kind,
            object_id,
            deleted,
            attributes: strip_fields(raw, &[OBJECT_ID_FIELD]),
        })
    }

    /// Builds a node from an object retrieved by a point fetch.
    ///
    /// The kind comes from the discriminator or the `objectType` attribute and
    /// is left unset when neither names a replicated kind.
    pub fn from_fetched(raw: &RawRecord) -> ProtocolResult<Self> {
        let kind = raw
            .get(DISCRIMINATOR_FIELD)
            .or_else(|| raw.get(OBJECT_TYPE_FIELD))
            .and_then(Value::as_str)
            .and_then(NodeKind::from_discriminator);

        let mut change = Self::parse(raw, kind)?;
        change.deleted = false;
        Ok(change)
    }
}

/// A change to a link between two directory objects.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeChange {
    /// Link identity.
    pub key: EdgeKey,
    /// Whether a deletion marker is set.
    pub deleted: bool,
    /// Link metadata (identity, discriminator and markers removed).
    pub attributes: RawRecord,
}

impl EdgeChange {
    /// Parses a link change.
    pub fn parse(raw: &RawRecord) -> ProtocolResult<Self> {
        let source = identity_field(raw, SOURCE_OBJECT_ID_FIELD)?;
        let target = identity_field(raw, TARGET_OBJECT_ID_FIELD)?;
        let deleted =
            deletion_marker(raw, HARD_DELETE_MARKER)? || deletion_marker(raw, SOFT_DELETE_MARKER)?;

        Ok(Self {
            key: EdgeKey::new(source, target),
            deleted,
            attributes: strip_fields(raw, &[SOURCE_OBJECT_ID_FIELD, TARGET_OBJECT_ID_FIELD]),
        })
    }
}

/// A classified change record.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRecord {
    /// Directory object change.
    Node(NodeChange),
    /// Link change.
    Edge(EdgeChange),
    /// A discriminator this client does not replicate.
    Unknown {
        /// The discriminator as received.
        kind: String,
    },
}

impl ChangeRecord {
    /// Classifies a raw record by its discriminator.
    ///
    /// A missing or non-string discriminator is an invalid record. An
    /// unrecognised discriminator is not an error: it yields
    /// [`ChangeRecord::Unknown`].
    pub fn classify(raw: &RawRecord) -> ProtocolResult<Self> {
        let discriminator = raw
            .get(DISCRIMINATOR_FIELD)
            .ok_or_else(|| ProtocolError::invalid_record("missing discriminator"))?
            .as_str()
            .ok_or_else(|| ProtocolError::invalid_record("discriminator is not a string"))?;

        if let Some(kind) = NodeKind::from_discriminator(discriminator) {
            return NodeChange::parse(raw, Some(kind)).map(ChangeRecord::Node);
        }

        if short_kind(discriminator) == LINK_CHANGE_KIND {
            return EdgeChange::parse(raw).map(ChangeRecord::Edge);
        }

        Ok(ChangeRecord::Unknown {
            kind: discriminator.to_string(),
        })
    }

    /// Returns true for deletions.
    pub fn is_delete(&self) -> bool {
        match self {
            ChangeRecord::Node(change) => change.deleted,
            ChangeRecord::Edge(change) => change.deleted,
            ChangeRecord::Unknown { .. } => false,
        }
    }
}

/// Final dotted segment of a discriminator.
fn short_kind(discriminator: &str) -> &str {
    discriminator
        .rsplit_once('.')
        .map(|(_, name)| name)
        .unwrap_or(discriminator)
}

fn identity_field(raw: &RawRecord, field: &str) -> ProtocolResult<String> {
    match raw.get(field) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(_) => Err(ProtocolError::invalid_record(format!(
            "{field} is not a non-empty string"
        ))),
        None => Err(ProtocolError::invalid_record(format!("missing {field}"))),
    }
}

/// Reads a deletion annotation, accepting it with or without the `aad.` prefix.
fn deletion_marker(raw: &RawRecord, marker: &str) -> ProtocolResult<bool> {
    let bare = marker.strip_prefix(ANNOTATION_PREFIX).unwrap_or(marker);
    match raw.get(marker).or_else(|| raw.get(bare)) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(Value::String(text)) if text.eq_ignore_ascii_case("true") => Ok(true),
        Some(Value::String(text)) if text.eq_ignore_ascii_case("false") => Ok(false),
        Some(other) => Err(ProtocolError::invalid_record(format!(
            "{marker} has non-boolean value {other}"
        ))),
    }
}

fn strip_fields(raw: &RawRecord, identity: &[&str]) -> RawRecord {
    let bare_hard = HARD_DELETE_MARKER.trim_start_matches(ANNOTATION_PREFIX);
    let bare_soft = SOFT_DELETE_MARKER.trim_start_matches(ANNOTATION_PREFIX);
    raw.iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            !identity.contains(&key)
                && key != DISCRIMINATOR_FIELD
                && key != HARD_DELETE_MARKER
                && key != SOFT_DELETE_MARKER
                && key != bare_hard
                && key != bare_soft
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn classify_qualified_user() {
        let record = raw(json!({
            "odata.type": "Microsoft.WindowsAzure.ActiveDirectory.User",
            "objectId": "a1",
            "displayName": "Ada",
        }));

        match ChangeRecord::classify(&record).unwrap() {
            ChangeRecord::Node(change) => {
                assert_eq!(change.kind, Some(NodeKind::User));
                assert_eq!(change.object_id, "a1");
                assert!(!change.deleted);
                assert_eq!(change.attributes.get("displayName"), Some(&json!("Ada")));
                assert!(change.attributes.get("objectId").is_none());
                assert!(change.attributes.get("odata.type").is_none());
            }
            other => panic!("expected node change, got {other:?}"),
        }
    }

    #[test]
    fn classify_short_link_kind() {
        let record = raw(json!({
            "odata.type": "DirectoryLinkChange",
            "sourceObjectId": "g1",
            "targetObjectId": "u1",
            "associationType": "Member",
        }));

        match ChangeRecord::classify(&record).unwrap() {
            ChangeRecord::Edge(change) => {
                assert_eq!(change.key, EdgeKey::new("g1", "u1"));
                assert!(!change.deleted);
                assert_eq!(change.attributes.len(), 1);
            }
            other => panic!("expected edge change, got {other:?}"),
        }
    }

    #[test]
    fn missing_discriminator_is_invalid() {
        let record = raw(json!({ "objectId": "a1" }));
        let err = ChangeRecord::classify(&record).unwrap_err();
        assert!(err.is_record_error());
    }

    #[test]
    fn unknown_discriminator_is_not_an_error() {
        let record = raw(json!({
            "odata.type": "Microsoft.WindowsAzure.ActiveDirectory.Device",
            "objectId": "d1",
        }));
        let change = ChangeRecord::classify(&record).unwrap();
        assert_eq!(
            change,
            ChangeRecord::Unknown {
                kind: "Microsoft.WindowsAzure.ActiveDirectory.Device".into()
            }
        );
        assert!(!change.is_delete());
    }

    #[test]
    fn node_without_object_id_is_invalid() {
        let record = raw(json!({ "odata.type": "Group", "displayName": "Ops" }));
        assert_eq!(
            ChangeRecord::classify(&record).unwrap_err(),
            ProtocolError::invalid_record("missing objectId")
        );
    }

    #[test]
    fn link_without_target_is_invalid() {
        let record = raw(json!({
            "odata.type": "DirectoryLinkChange",
            "sourceObjectId": "g1",
        }));
        assert!(ChangeRecord::classify(&record).unwrap_err().is_record_error());
    }

    #[test]
    fn deletion_markers() {
        let hard = raw(json!({ "odata.type": "User", "objectId": "a", "aad.isDeleted": true }));
        let soft = raw(json!({ "odata.type": "User", "objectId": "a", "aad.isSoftDeleted": "True" }));
        let bare = raw(json!({ "odata.type": "User", "objectId": "a", "isDeleted": false }));

        assert!(ChangeRecord::classify(&hard).unwrap().is_delete());
        assert!(ChangeRecord::classify(&soft).unwrap().is_delete());
        assert!(!ChangeRecord::classify(&bare).unwrap().is_delete());
    }

    #[test]
    fn unparsable_deletion_marker_is_invalid() {
        let record = raw(json!({ "odata.type": "User", "objectId": "a", "aad.isDeleted": 1 }));
        assert!(ChangeRecord::classify(&record).unwrap_err().is_record_error());
    }

    #[test]
    fn fetched_object_kind_from_object_type() {
        let record = raw(json!({ "objectId": "b", "objectType": "Group" }));
        let change = NodeChange::from_fetched(&record).unwrap();
        assert_eq!(change.kind, Some(NodeKind::Group));
        assert!(!change.deleted);

        let record = raw(json!({ "objectId": "sp", "objectType": "ServicePrincipal" }));
        assert_eq!(NodeChange::from_fetched(&record).unwrap().kind, None);
    }

    #[test]
    fn self_loop_key() {
        assert!(EdgeKey::new("a", "a").is_self_loop());
        assert!(!EdgeKey::new("a", "b").is_self_loop());
        assert_eq!(EdgeKey::new("a", "b").to_string(), "a -> b");
    }
}
