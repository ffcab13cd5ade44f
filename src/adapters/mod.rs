//! Adapters binding services to the external tools that implement them.

pub mod shims;
