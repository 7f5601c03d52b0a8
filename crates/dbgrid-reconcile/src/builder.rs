//! Contracts for the objects a database owns.

use dbgrid_core::DynamicObject;

use crate::aggregate::DatabaseAggregate;

/// Produces one managed object for a database.
pub trait ResourceBuilder: Send + Sync {
    /// Empty object carrying the target kind and key.
    fn placeholder(&self, aggregate: &DatabaseAggregate) -> DynamicObject;

    /// Bring `target` to its desired shape. Runs against the stored object
    /// when one exists, so it must overwrite rather than append.
    fn build(&self, target: &mut DynamicObject) -> anyhow::Result<()>;
}

/// Ordered list of builders for a database. Order is sync order.
pub trait BuilderCatalog: Send + Sync {
    fn builders(&self, aggregate: &DatabaseAggregate) -> Vec<Box<dyn ResourceBuilder>>;
}
