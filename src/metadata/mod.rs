//! The structured module model: types, fields, methods, resources and their tokens.
//!
//! This is the already-parsed view of a managed binary the resolver detectors work on.
//! Declarations are owned by [`module::Module`]; instructions refer to them through the
//! structural references in [`typesystem`] and [`method`].

pub mod identity;
pub mod method;
pub mod module;
pub mod token;
pub mod typesystem;
