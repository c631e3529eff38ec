//! Operator registry for the traced graph IR.
pub mod registry;
