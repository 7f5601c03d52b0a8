//! Pipeline steps, each an `impl Reconciler` block returning a `Flow`.

mod dependency;
mod scale;
mod status;
mod sync;
mod tenant;
