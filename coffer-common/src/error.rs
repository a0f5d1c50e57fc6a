// Copyright 2026 coffer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

/// ErrorKind is all kinds of Error of coffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The key is already present in the store (add of an existing key).
    KeyExists,
    /// The expected item version does not match the stored one.
    VersionMismatch,
    /// The item is pessimistically locked by someone else.
    ItemLocked,
    /// The item belongs to a different data group than the one requested.
    IncompatibleGroup,
    /// A key the new item depends on does not exist.
    DependencyKeyNotFound,
    /// The store is full and eviction could not free enough room.
    NeedsEviction,
    /// The operation was canceled through its cancellation token.
    OperationCanceled,
    /// Catch-all for unexpected failures, usually carrying a source error.
    OperationFailed,
    /// Config error.
    ///
    /// Only raised while building a cache.
    Config,
    /// A bounded wait elapsed.
    Timeout,
    /// The cache has completed shutdown and admits no more operations.
    ShutDown,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }

    /// Races between concurrent clients are expected and are not worth a backtrace or a log line.
    pub fn is_race(self) -> bool {
        matches!(self, ErrorKind::KeyExists | ErrorKind::VersionMismatch | ErrorKind::ItemLocked)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::KeyExists => "Key exists",
            ErrorKind::VersionMismatch => "Version mismatch",
            ErrorKind::ItemLocked => "Item locked",
            ErrorKind::IncompatibleGroup => "Incompatible group",
            ErrorKind::DependencyKeyNotFound => "Dependency key not found",
            ErrorKind::NeedsEviction => "Needs eviction",
            ErrorKind::OperationCanceled => "Operation canceled",
            ErrorKind::OperationFailed => "Operation failed",
            ErrorKind::Config => "Config error",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ShutDown => "Shut down",
        }
    }
}

/// Error is the error struct returned by all coffer functions.
///
/// ## Display
///
/// - Via `Display`, the error is printed in a single line:
///
/// ```shell
/// Item locked, context: { key: k1, lock_id: 42-node-k1-0 } => item is locked
/// ```
///
/// - Via `Debug`, the error is printed in multiple lines with the context, the source and the backtrace (if
///   captured). `{:#?}` falls back to the conventional struct-style representation.
///
/// ## Traceability
///
/// Errors created with [`Error::untraced`] skip backtrace capture and report `false` from
/// [`Error::is_traceable`]. They are used for expected races (locks, versions, existing keys) that must be cheap to
/// construct and must not be logged.
pub struct Error {
    kind: ErrorKind,
    message: String,
    traceable: bool,

    context: Vec<(&'static str, String)>,

    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // If alternate has been specified, we will print like Debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("traceable", &self.traceable);
            de.field("context", &self.context);
            de.field("source", &self.source);
            de.field("backtrace", &self.backtrace);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "  {}: {}", k, v)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "  {source:#}")?;
        }

        if let Some(backtrace) = &self.backtrace {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            let mut iter = self.context.iter().peekable();
            while let Some((k, v)) = iter.next() {
                write!(f, "{}: {}", k, v)?;
                if iter.peek().is_some() {
                    write!(f, ", ")?;
                }
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            traceable: self.traceable,
            context: self.context.clone(),
            source: self.source.clone(),
            backtrace: self.backtrace.clone(),
        }
    }
}

impl Error {
    /// Create a new traceable error with a captured backtrace.
    ///
    /// ```rust
    /// # use coffer_common::error::{Error, ErrorKind};
    /// let io_error = std::io::Error::other("backend unreachable");
    /// Error::new(ErrorKind::OperationFailed, "insert operation failed").with_source(io_error);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceable: true,
            context: Vec::new(),
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Create a cheap non-traceable error without backtrace.
    pub fn untraced(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceable: false,
            context: Vec::new(),
            source: None,
            backtrace: None,
        }
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// If the error should be logged when it reaches the facade boundary.
    pub fn is_traceable(&self) -> bool {
        self.traceable
    }

    /// Get the error context.
    pub fn context(&self) -> &Vec<(&'static str, String)> {
        &self.context
    }

    /// Get a context value by key.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    /// Get the error backtrace.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// Get the error source.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the reference of the source error to a specific error type reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Result type for coffer.
pub type Result<T> = std::result::Result<T, Error>;

/// Helper methods for Error.
impl Error {
    /// Wrap an unexpected failure as [`ErrorKind::OperationFailed`].
    ///
    /// Errors that already carry a kind of the taxonomy are passed through unchanged.
    pub fn operation_failed(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        let source = source.into();
        match source.downcast::<Error>() {
            Ok(e) => e,
            Err(source) => Error::new(ErrorKind::OperationFailed, format!("{operation} operation failed"))
                .with_context("operation", operation)
                .with_source(source),
        }
    }

    /// Helper for creating an [`ErrorKind::ItemLocked`] error carrying the current holder.
    pub fn item_locked(key: impl ToString, lock_id: Option<&str>) -> Self {
        let e = Error::untraced(ErrorKind::ItemLocked, "item is locked").with_context("key", key);
        match lock_id {
            Some(lock_id) => e.with_context("lock_id", lock_id),
            None => e,
        }
    }

    /// Helper for creating an [`ErrorKind::VersionMismatch`] error.
    pub fn version_mismatch(key: impl ToString, expected: u64, actual: u64) -> Self {
        Error::untraced(ErrorKind::VersionMismatch, "item version does not match")
            .with_context("key", key)
            .with_context("expected", expected)
            .with_context("actual", actual)
    }

    /// Helper for creating an [`ErrorKind::KeyExists`] error.
    pub fn key_exists(key: impl ToString) -> Self {
        Error::untraced(ErrorKind::KeyExists, "the specified key already exists").with_context("key", key)
    }

    /// Helper for creating an [`ErrorKind::OperationCanceled`] error.
    pub fn canceled(operation: &'static str, completed: usize, total: usize) -> Self {
        Error::untraced(ErrorKind::OperationCanceled, "operation canceled")
            .with_context("operation", operation)
            .with_context("completed", completed)
            .with_context("total", total)
    }

    /// Helper for creating an [`ErrorKind::NeedsEviction`] error with context.
    pub fn needs_eviction(capacity: usize, count: usize) -> Self {
        Error::new(
            ErrorKind::NeedsEviction,
            "the cache is full and not enough items could be evicted",
        )
        .with_context("capacity", capacity)
        .with_context("count", count)
    }

    /// Helper for creating an [`ErrorKind::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Config, message)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_error_display() {
        let err = Error::item_locked("k1", Some("42-node-k1-0"));
        assert_eq!(
            "Item locked, context: { key: k1, lock_id: 42-node-k1-0 } => item is locked",
            err.to_string()
        );
        assert_eq!(err.context_value("lock_id"), Some("42-node-k1-0"));
    }

    #[test]
    fn test_races_are_untraced() {
        for err in [
            Error::item_locked("k", None),
            Error::version_mismatch("k", 1, 2),
            Error::key_exists("k"),
        ] {
            assert!(!err.is_traceable());
            assert!(err.backtrace().is_none());
            assert!(err.kind().is_race());
        }
        assert!(Error::needs_eviction(1, 1).is_traceable());
    }

    #[test]
    fn test_operation_failed_wraps_foreign_errors() {
        let inner = TestError("backend exploded".to_string());
        let err = Error::operation_failed("insert", inner.clone());
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
        assert_eq!(err.downcast_ref::<TestError>().unwrap(), &inner);
        assert_eq!(err.context_value("operation"), Some("insert"));
    }

    #[test]
    fn test_operation_failed_keeps_taxonomy() {
        let err = Error::operation_failed("insert", Error::key_exists("k"));
        assert_eq!(err.kind(), ErrorKind::KeyExists);
        assert!(err.source().is_none());
    }
}
