//! Drive markers over program elements
//!
//! Markers are the clients of the body editor: each one is attached to some program element
//! (a method, a parameter, a property, ...) and rewrites the bodies around it through writers
//! handed out by a [`WeavingContext`]. The [`Weaver`] goes through the elements one member at a
//! time and makes sure that a member whose weaving failed is left exactly as it was.

mod context;
mod driver;
mod element;
mod errors;
mod marker;
mod settings;

pub use context::*;
pub use driver::*;
pub use element::*;
pub use errors::*;
pub use marker::*;
pub use settings::*;
