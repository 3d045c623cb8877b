//! The error type used throughout the persistence/coordination core

use std::fmt;

/// A status-code-flavored error describing what went wrong in the core
///
/// This mirrors an HTTP status without depending on any HTTP crate. There's
/// no RPC transport in this crate's scope to build a response for, but an
/// embedding service can still map `kind` onto whatever wire error shape it
/// needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing `JobID`, a pre-set server-controlled field, or an empty commit ID
    InvalidArgument,
    /// A primary-key lookup or blocking-wait target is absent
    NotFound,
    /// A duplicate primary-key insert
    Conflict,
    /// A transport/connection error to the backing store
    StoreUnavailable,
    /// A change-feed event arrived with neither an old nor a new value
    ProtocolViolation,
    /// The caller's context was canceled mid-operation
    Canceled,
    /// Something unexpected happened internally
    Internal,
}

/// The error type returned by every fallible operation in this core
#[derive(Debug, Serialize)]
pub struct CoreError {
    /// The kind of error this is
    #[serde(skip)]
    pub kind: ErrorKind,
    /// A human readable message describing the error
    pub msg: Option<String>,
}

impl CoreError {
    /// Create a new [`CoreError`]
    ///
    /// # Arguments
    ///
    /// * `kind` - The kind of error this is
    /// * `msg` - The message to attach to this error
    #[must_use]
    pub fn new(kind: ErrorKind, msg: Option<String>) -> CoreError {
        CoreError { kind, msg }
    }
}

/// Missing/invalid argument, or a caller-set field that must be server-controlled
#[macro_export]
macro_rules! bad {
    ($($msg:tt)+) => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::InvalidArgument, Some($($msg)+)))}
}

/// Duplicate primary-key insert
#[macro_export]
macro_rules! conflict {
    ($($msg:tt)+) => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::Conflict, Some($($msg)+)))}
}

/// Primary-key lookup or blocking-wait target absent
#[macro_export]
macro_rules! not_found {
    ($($msg:tt)+) => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::NotFound, Some($($msg)+)))}
}

/// Backing store unreachable or not ready
#[macro_export]
macro_rules! unavailable {
    ($($msg:tt)+) => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::StoreUnavailable, Some($($msg)+)))}
}

/// A change-feed event arrived with neither an old nor a new value
#[macro_export]
macro_rules! protocol_violation {
    ($($msg:tt)+) => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::ProtocolViolation, Some($($msg)+)))}
}

/// The caller's context was canceled mid-operation
#[macro_export]
macro_rules! canceled {
    () => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::Canceled, None))}
}

/// Internal error equivalent
#[macro_export]
macro_rules! internal_err {
    () => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::Internal, None))};
    ($($msg:tt)+) => {Err($crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::Internal, Some($($msg)+)))}
}

/// Internal error without the `Err` wrap, for use in `From` impls
#[macro_export]
macro_rules! internal_bare {
    ($($msg:tt)+) => {$crate::utils::errors::CoreError::new($crate::utils::errors::ErrorKind::Internal, Some($($msg)+))}
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{msg}"),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<crate::models::InvalidEnum> for CoreError {
    fn from(error: crate::models::InvalidEnum) -> Self {
        crate::utils::errors::CoreError::new(
            crate::utils::errors::ErrorKind::InvalidArgument,
            Some(error.inner()),
        )
    }
}

impl From<uuid::Error> for CoreError {
    fn from(error: uuid::Error) -> Self {
        internal_bare!(format!("Failed cast to Uuid {error:#?}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        internal_bare!(format!("Failed to (de)serialize json {error:#?}"))
    }
}

impl From<std::num::ParseIntError> for CoreError {
    fn from(error: std::num::ParseIntError) -> Self {
        internal_bare!(format!("Failed cast to int {error:#?}"))
    }
}

impl From<chrono::format::ParseError> for CoreError {
    fn from(error: chrono::format::ParseError) -> Self {
        internal_bare!(format!("Failed to parse timestamp {error:#?}"))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(error: std::io::Error) -> Self {
        internal_bare!(format!("IO error {error:#?}"))
    }
}

impl From<scylla::transport::errors::NewSessionError> for CoreError {
    fn from(error: scylla::transport::errors::NewSessionError) -> Self {
        unavailable!(format!("Failed to connect to scylla {error:#?}")).unwrap_err()
    }
}

impl From<scylla::transport::errors::QueryError> for CoreError {
    fn from(error: scylla::transport::errors::QueryError) -> Self {
        internal_bare!(format!("Scylla query error {error:#?}"))
    }
}

impl From<scylla::transport::query_result::IntoRowsResultError> for CoreError {
    fn from(error: scylla::transport::query_result::IntoRowsResultError) -> Self {
        internal_bare!(format!("Scylla into rows error {error:#?}"))
    }
}

impl From<scylla::transport::query_result::RowsError> for CoreError {
    fn from(error: scylla::transport::query_result::RowsError) -> Self {
        internal_bare!(format!("Scylla rows error {error:#?}"))
    }
}

impl From<scylla::deserialize::DeserializationError> for CoreError {
    fn from(error: scylla::deserialize::DeserializationError) -> Self {
        internal_bare!(format!("Scylla deserialization error {error:#?}"))
    }
}

impl From<scylla::transport::query_result::MaybeFirstRowError> for CoreError {
    fn from(error: scylla::transport::query_result::MaybeFirstRowError) -> Self {
        internal_bare!(format!("Scylla maybe first row error {error:#?}"))
    }
}

impl From<scylla::transport::iterator::NextRowError> for CoreError {
    fn from(error: scylla::transport::iterator::NextRowError) -> Self {
        internal_bare!(format!("Scylla next row error {error:#?}"))
    }
}

impl From<scylla::deserialize::TypeCheckError> for CoreError {
    fn from(error: scylla::deserialize::TypeCheckError) -> Self {
        internal_bare!(format!("Scylla type check error {error:#?}"))
    }
}

impl From<scylla::transport::errors::PrepareError> for CoreError {
    fn from(error: scylla::transport::errors::PrepareError) -> Self {
        internal_bare!(format!("Scylla prepare error {error:#?}"))
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(error: redis::RedisError) -> Self {
        internal_bare!(format!("Redis error {error:#?}"))
    }
}

impl From<bb8_redis::bb8::RunError<redis::RedisError>> for CoreError {
    fn from(error: bb8_redis::bb8::RunError<redis::RedisError>) -> Self {
        unavailable!(format!("Failed to get a redis connection {error:#?}")).unwrap_err()
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(error: tokio::task::JoinError) -> Self {
        internal_bare!(format!("Tokio task failed to join: {error:#?}"))
    }
}

/// The error produced when a Scylla-stored value fails to (de)serialize
///
/// Surfaced through [`scylla::deserialize::TypeCheckError`]/[`scylla::deserialize::DeserializationError`]
/// from the `ScyllaStoreJson`/`ScyllaStoreAsStr` derives.
#[derive(Debug)]
pub enum DeserializationError {
    /// The column wasn't a `TEXT` column
    ExpectedText,
    /// The column was unexpectedly null
    ExpectedNotNull,
    /// The column's contents couldn't be turned into the target type
    UnknownValue,
}

impl fmt::Display for DeserializationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeserializationError::ExpectedText => write!(f, "expected a text column"),
            DeserializationError::ExpectedNotNull => write!(f, "expected a non-null column"),
            DeserializationError::UnknownValue => write!(f, "failed to parse column value"),
        }
    }
}

impl std::error::Error for DeserializationError {}
