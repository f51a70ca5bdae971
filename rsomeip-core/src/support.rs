//! Internal building blocks shared by the components of an application.

pub mod collections;
pub mod sync;
