//! Application layer: pure transforms over domain records plus the
//! derived share-card service.

pub mod error;
pub mod filters;
pub mod normalize;
pub mod share;
