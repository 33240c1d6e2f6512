//! Error taxonomy and reporting.
//!
//! Every failure raised inside the engine is a [`SyncError`].  Variants
//! carry their context as named fields rather than baking it into the
//! message, so [`report`] can attach it to the log record as key-values.

use std::num::ParseIntError;

use log::kv::{self, Key, Source, Value, VisitSource};
use log::{log_enabled, Level, Record};
use thiserror::Error;

use crate::types::NetworkAction;

/// Cause of a collaborator failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A container could not be turned into a registry entry.
    Translation,
    RuntimeQuery,
    RegistryQuery,
    Registration,
    Deregistration,
    /// The runtime event subscription failed.
    Stream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Translation => "translation",
            ErrorKind::RuntimeQuery => "runtime_query",
            ErrorKind::RegistryQuery => "registry_query",
            ErrorKind::Registration => "registration",
            ErrorKind::Deregistration => "deregistration",
            ErrorKind::Stream => "stream",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no exposed port")]
    NoExposedPort { container: String, service: String },

    #[error("{value} is not a valid port: {source}")]
    InvalidPort {
        container: String,
        service: String,
        value: String,
        source: ParseIntError,
    },

    #[error("failed to list docker containers: {source}")]
    RuntimeQuery {
        container: Option<String>,
        source: BoxError,
    },

    #[error("failed to list consul services: {source}")]
    RegistryQuery { source: BoxError },

    #[error("failed to register service: {source}")]
    Registration {
        id: String,
        name: String,
        source: BoxError,
    },

    #[error("failed to deregister service: {source}")]
    Deregistration { id: String, source: BoxError },

    #[error("failed to handle network {action} event: {source}")]
    Stream {
        action: NetworkAction,
        source: BoxError,
    },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NoExposedPort { .. } | SyncError::InvalidPort { .. } => {
                ErrorKind::Translation
            }
            SyncError::RuntimeQuery { .. } => ErrorKind::RuntimeQuery,
            SyncError::RegistryQuery { .. } => ErrorKind::RegistryQuery,
            SyncError::Registration { .. } => ErrorKind::Registration,
            SyncError::Deregistration { .. } => ErrorKind::Deregistration,
            SyncError::Stream { .. } => ErrorKind::Stream,
        }
    }

    /// Structured context attached to this error, in a stable order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            SyncError::NoExposedPort { container, service } => {
                vec![
                    ("container", container.as_str()),
                    ("service", service.as_str()),
                ]
            }
            SyncError::InvalidPort {
                container,
                service,
                value,
                ..
            } => vec![
                ("container", container.as_str()),
                ("service", service.as_str()),
                ("port", value.as_str()),
            ],
            SyncError::RuntimeQuery { container, .. } => container
                .as_deref()
                .map(|c| vec![("container", c)])
                .unwrap_or_default(),
            SyncError::RegistryQuery { .. } => Vec::new(),
            SyncError::Registration { id, name, .. } => {
                vec![("id", id.as_str()), ("name", name.as_str())]
            }
            SyncError::Deregistration { id, .. } => vec![("id", id.as_str())],
            SyncError::Stream { action, .. } => vec![("event", action.as_str())],
        }
    }
}

/// Log `err` with its context as key-values.  Never changes control flow.
pub fn report(err: &SyncError) {
    if !log_enabled!(Level::Error) {
        return;
    }
    let pairs = context(err);
    log::logger().log(
        &Record::builder()
            .level(Level::Error)
            .target(module_path!())
            .module_path_static(Some(module_path!()))
            .file_static(Some(file!()))
            .line(Some(line!()))
            .args(format_args!("{}", err))
            .key_values(&Context(&pairs))
            .build(),
    );
}

pub fn report_all(errors: &[SyncError]) {
    for err in errors {
        report(err);
    }
}

/// The error's fields followed by its kind.
fn context(err: &SyncError) -> Vec<(&'static str, &str)> {
    let mut pairs = err.fields();
    pairs.push(("kind", err.kind().as_str()));
    pairs
}

struct Context<'a>(&'a [(&'static str, &'a str)]);

impl Source for Context<'_> {
    fn visit<'kvs>(&'kvs self, visitor: &mut dyn VisitSource<'kvs>) -> Result<(), kv::Error> {
        for (key, value) in self.0 {
            visitor.visit_pair(Key::from_str(key), Value::from(*value))?;
        }
        Ok(())
    }
}
