//! Client-side coordination of deal edits against a [`crate::store::DealStore`].

pub mod controller;
pub mod overrides;

pub use controller::{
    Confirmation, ControllerError, DealController, DealSummary, ErrorKind, WriteOutcome,
};
pub use overrides::{OverrideMap, OverrideStore};
