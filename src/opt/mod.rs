//! Graph passes applied by the in-process converter.

pub mod ir_canonical;

pub use ir_canonical::{canonicalize_module, eliminate_noop_resize, prune_dead, CanonicalStats};
