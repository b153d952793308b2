//! # dirsync Protocol
//!
//! Wire types for the directory differential query service.
//!
//! This crate provides:
//! - `ChangeRecord` for classified node and link changes
//! - `Batch` parsing from the response envelope, including continuation tokens
//! - `DeltaQuery` and `ObjectQuery` request parameter builders
//! - `ServiceFault` parsing and classification of service error codes
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod fault;
mod query;
mod record;

pub use envelope::{
    extract_token, Batch, DELTA_LINK_ANNOTATION, NEXT_LINK_ANNOTATION, RECORDS_FIELD,
    TOKEN_QUERY_PARAMETER,
};
pub use error::{ProtocolError, ProtocolResult};
pub use fault::{FaultClass, RejectionKind, ServiceFault, EXPIRED_TOKEN_CODE};
pub use query::{DeltaQuery, ObjectQuery, DEFAULT_RESOURCE_SET};
pub use record::{
    ChangeRecord, EdgeChange, EdgeKey, NodeChange, NodeKind, RawRecord, DISCRIMINATOR_FIELD,
    HARD_DELETE_MARKER, LINK_CHANGE_KIND, OBJECT_ID_FIELD, SOFT_DELETE_MARKER,
    SOURCE_OBJECT_ID_FIELD, TARGET_OBJECT_ID_FIELD,
};
