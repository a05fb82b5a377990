// Copyright 2026 nearsync Project Authors
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

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid configuration, raised at construction.
    Config,
    /// Encoding or decoding a key or a value failed.
    Codec,
    /// Fetching invalidation metadata from a member failed.
    Fetch,
    /// The component has been shut down.
    Closed,
    /// A near cache of the same name exists with other key or value types.
    TypeMismatch,
    /// A caller-provided operation failed.
    External,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Config => "invalid config",
            ErrorKind::Codec => "codec error",
            ErrorKind::Fetch => "fetch error",
            ErrorKind::Closed => "closed",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::External => "external error",
        };
        f.write_str(s)
    }
}

/// Error returned by nearsync.
///
/// Carries a kind, a message, key/value context and an optional source. `Display` renders one line:
///
/// ```text
/// invalid config => reconciliation interval below floor (interval: 5, floor: 30)
/// ```
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<Arc<anyhow::Error>>,
    backtrace: Arc<Backtrace>,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if !self.context.is_empty() {
            let context = self
                .context
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " ({context})")?;
        }
        if let Some(source) = &self.source {
            write!(f, ", caused by: {source}")?;
        }
        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .finish();
        }
        writeln!(f, "{self}")?;
        if let Some(source) = &self.source {
            writeln!(f, "\nsource: {source:#}")?;
        }
        write!(f, "\nbacktrace:\n{}", self.backtrace)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e.as_ref())
    }
}

impl Error {
    /// Create an error of `kind`.
    ///
    /// ```rust
    /// # use nearsync_common::error::{Error, ErrorKind};
    /// let err = Error::new(ErrorKind::Fetch, "member unreachable").with_context("member", 2);
    /// assert_eq!(err.kind(), ErrorKind::Fetch);
    /// assert_eq!(err.to_string(), "fetch error => member unreachable (member: 2)");
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: vec![],
            source: None,
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    /// Attach a key/value pair describing the failure.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Attach the underlying error. Replaces a previously attached one.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message of the error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context pairs, in the order they were attached.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Backtrace captured at creation. Empty unless enabled by `RUST_BACKTRACE`.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Underlying error.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Get the underlying error as `E`, if it is one.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source()?.downcast_ref()
    }

    /// Invalid configuration.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Operation on a component that has been shut down.
    pub fn closed(component: &'static str) -> Self {
        Self::new(ErrorKind::Closed, "already shut down").with_context("component", component)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::new(ErrorKind::Codec, "bincode").with_source(e)
    }
}

/// Result type of nearsync.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Unreachable(u16);

    impl Display for Unreachable {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "port {} unreachable", self.0)
        }
    }

    impl std::error::Error for Unreachable {}

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn test_display() {
        let err = Error::config("reconciliation interval below floor")
            .with_context("interval", 5)
            .with_context("floor", 30);
        assert_eq!(
            err.to_string(),
            "invalid config => reconciliation interval below floor (interval: 5, floor: 30)"
        );

        let err = Error::new(ErrorKind::Fetch, "metadata").with_source(Unreachable(5701));
        assert_eq!(err.to_string(), "fetch error => metadata, caused by: port 5701 unreachable");

        assert_eq!(
            Error::closed("repairing task").to_string(),
            "closed => already shut down (component: repairing task)"
        );
    }

    #[test]
    fn test_downcast() {
        let err = Error::new(ErrorKind::External, "").with_source(Unreachable(1));
        assert_eq!(err.downcast_ref::<Unreachable>(), Some(&Unreachable(1)));
        assert!(err.downcast_ref::<std::io::Error>().is_none());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_from_bincode() {
        let e = bincode::deserialize::<String>(&[0xff]).unwrap_err();
        let err = Error::from(e);
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert!(err.source().is_some());
    }
}
