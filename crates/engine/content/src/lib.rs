//! Built-in combat content.
//!
//! Ability, feint, status, and item catalogs plus the cleaner template.
//! Everything here is immutable after construction; the runtime builds a
//! [`rbc_core::CatalogIndex`] once and shares it by reference. Content is
//! never stored in battle state.
mod cleaner;
mod defaults;

pub use cleaner::{CLEANER_ID_BASE, cleaner_snapshot};
pub use defaults::builtin_catalog;
