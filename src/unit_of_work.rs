//! Unit-of-work capability supplied by the transaction manager.

use crate::error::StoreError;

/// Transaction demarcation for a backing store.
///
/// At most one unit of work is active at a time; nested `begin` calls are
/// rejected rather than silently joined. Use [`transactional`] to run code
/// inside the active unit of work or a fresh one.
pub trait UnitOfWork: Send + Sync {
    /// Returns `true` while a unit of work is open.
    fn is_active(&self) -> bool;

    /// Opens a unit of work.
    fn begin(&self) -> Result<(), StoreError>;

    /// Commits the open unit of work.
    fn commit(&self) -> Result<(), StoreError>;

    /// Discards the open unit of work.
    fn rollback(&self) -> Result<(), StoreError>;
}

/// Runs `f` inside a unit of work.
///
/// If one is already active, `f` joins it and nothing is committed here.
/// Otherwise a unit of work is opened, committed when `f` succeeds and
/// rolled back when it fails.
pub fn transactional<T, E>(
    units: &dyn UnitOfWork,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    if units.is_active() {
        return f();
    }

    units.begin()?;
    match f() {
        Ok(value) => {
            units.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(_rollback_err) = units.rollback() {
                #[cfg(feature = "logging")]
                log::warn!("rollback after failed unit of work also failed: {_rollback_err}");
            }
            Err(err)
        }
    }
}
