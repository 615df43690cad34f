//! Advisor port: external capabilities that inspect SQL statements.

use crate::task::domain::{Advice, CheckKind};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Result type for advisor dispatch.
pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// Dialect context handed to an advisor alongside the statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvisorContext {
    /// Character set of the target database, when known.
    pub charset: Option<String>,
    /// Collation of the target database, when known.
    pub collation: Option<String>,
}

/// External capability that inspects a statement and returns advice.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Checks a statement and returns the collected findings.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError`] when the capability itself fails to run;
    /// statement problems are reported as error-severity advice, not as
    /// dispatch errors.
    async fn check(&self, statement: &str, context: &AdvisorContext) -> AdvisorResult<Vec<Advice>>;
}

/// Errors returned by advisor capabilities.
#[derive(Debug, Clone, Error)]
pub enum AdvisorError {
    /// The advisor collaborator could not be reached or crashed.
    #[error("advisor dispatch failed: {0}")]
    Dispatch(Arc<dyn std::error::Error + Send + Sync>),
}

impl AdvisorError {
    /// Wraps a dispatch failure.
    pub fn dispatch(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Dispatch(Arc::new(err))
    }
}

/// Registry of advisor capabilities keyed by check kind.
///
/// Resolved once at startup; the registered kinds define the mandatory
/// check set for statement-bearing task types.
#[derive(Clone, Default)]
pub struct AdvisorRegistry {
    advisors: BTreeMap<CheckKind, Arc<dyn Advisor>>,
}

impl AdvisorRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> AdvisorRegistryBuilder {
        AdvisorRegistryBuilder {
            advisors: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Returns an empty registry (no checks are ever required).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the advisor registered for a kind.
    #[must_use]
    pub fn get(&self, kind: CheckKind) -> Option<Arc<dyn Advisor>> {
        self.advisors.get(&kind).cloned()
    }

    /// Returns the registered kinds in stable order.
    #[must_use]
    pub fn kinds(&self) -> Vec<CheckKind> {
        self.advisors.keys().copied().collect()
    }

    /// Whether no advisors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }
}

/// Builder for [`AdvisorRegistry`].
pub struct AdvisorRegistryBuilder {
    advisors: BTreeMap<CheckKind, Arc<dyn Advisor>>,
    duplicates: Vec<CheckKind>,
}

impl AdvisorRegistryBuilder {
    /// Registers an advisor for a check kind.
    #[must_use]
    pub fn register(mut self, kind: CheckKind, advisor: Arc<dyn Advisor>) -> Self {
        if self.advisors.insert(kind, advisor).is_some() {
            self.duplicates.push(kind);
        }
        self
    }

    /// Finalizes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorRegistryError::Duplicate`] when a kind was
    /// registered more than once.
    pub fn build(self) -> Result<AdvisorRegistry, AdvisorRegistryError> {
        if let Some(kind) = self.duplicates.first() {
            return Err(AdvisorRegistryError::Duplicate(*kind));
        }
        Ok(AdvisorRegistry {
            advisors: self.advisors,
        })
    }
}

/// Errors raised while building an advisor registry.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AdvisorRegistryError {
    /// The same check kind was registered twice.
    #[error("advisor for {0} registered more than once")]
    Duplicate(CheckKind),
}
