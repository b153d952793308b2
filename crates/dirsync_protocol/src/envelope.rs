//! Response envelope of a differential query.
//!
//! The service answers with a JSON object holding the record array and one of
//! two link annotations. A next link means more changes are ready now; a delta
//! link means the caller is caught up and should resume after a polling
//! interval. Both links carry the continuation token as the value of the
//! `deltaLink` query parameter.

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::RawRecord;
use serde_json::Value;

/// Annotation holding the link to call immediately for more changes.
pub const NEXT_LINK_ANNOTATION: &str = "aad.nextLink";
/// Annotation holding the link to call after the polling interval.
pub const DELTA_LINK_ANNOTATION: &str = "aad.deltaLink";
/// Query parameter carrying the continuation token.
pub const TOKEN_QUERY_PARAMETER: &str = "deltaLink";
/// Field holding the record array.
pub const RECORDS_FIELD: &str = "value";

/// One batch of changes returned by a differential query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    /// Change records in delivery order.
    pub records: Vec<RawRecord>,
    /// Continuation token to send with the next query.
    pub token: String,
    /// True if another batch is available immediately.
    pub more: bool,
}

impl Batch {
    /// Creates a batch.
    pub fn new(records: Vec<RawRecord>, token: impl Into<String>, more: bool) -> Self {
        Self {
            records,
            token: token.into(),
            more,
        }
    }

    /// Decodes a batch from a JSON response body.
    pub fn decode(body: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ProtocolError::malformed(format!("response is not JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Builds a batch from a parsed response envelope.
    pub fn from_value(envelope: &Value) -> ProtocolResult<Self> {
        let envelope = envelope
            .as_object()
            .ok_or_else(|| ProtocolError::malformed("response is not an object"))?;

        let (link, more) = if let Some(link) = envelope.get(NEXT_LINK_ANNOTATION) {
            (link, true)
        } else if let Some(link) = envelope.get(DELTA_LINK_ANNOTATION) {
            (link, false)
        } else {
            return Err(ProtocolError::malformed("missing nextLink/deltaLink"));
        };

        let link = link
            .as_str()
            .ok_or_else(|| ProtocolError::malformed("continuation link is not a string"))?;
        let token = extract_token(link)?;

        let records = envelope
            .get(RECORDS_FIELD)
            .ok_or_else(|| ProtocolError::malformed("missing changes"))?
            .as_array()
            .ok_or_else(|| ProtocolError::malformed("changes are not an array"))?
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record.as_object().cloned().ok_or_else(|| {
                    ProtocolError::malformed(format!("change at index {index} is not an object"))
                })
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        Ok(Self {
            records,
            token,
            more,
        })
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Extracts the continuation token from a next or delta link.
///
/// The token is everything after the first `deltaLink=` in the link,
/// percent-decoded. Request builders encode query values again, so the
/// decoded form is what travels back to the service unchanged.
pub fn extract_token(link: &str) -> ProtocolResult<String> {
    let marker = format!("{TOKEN_QUERY_PARAMETER}=");
    let encoded = link
        .find(&marker)
        .map(|start| &link[start + marker.len()..])
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ProtocolError::malformed(format!(
                "continuation link has no {TOKEN_QUERY_PARAMETER} parameter"
            ))
        })?;

    urlencoding::decode(encoded)
        .map(|token| token.into_owned())
        .map_err(|e| ProtocolError::malformed(format!("continuation token is not UTF-8: {e}")))
}
