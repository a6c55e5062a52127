//! Save policies consulted before a version is written.
//!
//! The store records the `frozen` flag but does not enforce it. Callers that
//! want frozen versions to be immutable install [`RejectFrozenOverwrite`].

use cookbook_store_core::CookbookVersion;

use crate::error::{Result, StoreError};

/// The stored row found by the probe that precedes a version write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingVersion {
    pub id: i64,
    pub frozen: bool,
}

/// Decides whether a version write may proceed.
///
/// Runs inside the write transaction, after the probe and before any
/// statement that modifies a row. An error aborts and rolls back the save.
pub trait SavePolicy {
    fn check(&self, incoming: &CookbookVersion, existing: Option<&ExistingVersion>) -> Result<()>;
}

/// Allows every write, frozen or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowOverwrite;

impl SavePolicy for AllowOverwrite {
    fn check(&self, _incoming: &CookbookVersion, _existing: Option<&ExistingVersion>) -> Result<()> {
        Ok(())
    }
}

/// Refuses to overwrite a stored version whose frozen flag is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectFrozenOverwrite;

impl SavePolicy for RejectFrozenOverwrite {
    fn check(&self, incoming: &CookbookVersion, existing: Option<&ExistingVersion>) -> Result<()> {
        match existing {
            Some(stored) if stored.frozen => Err(StoreError::PolicyViolation(format!(
                "{} is frozen and cannot be overwritten",
                incoming.name()
            ))),
            _ => Ok(()),
        }
    }
}
