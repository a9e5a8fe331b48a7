//! Pure computation for deal pricing, ordering and lifecycle rules.

pub mod fee;
pub mod normalizer;
pub mod selector;
pub mod state_machine;

pub use fee::{derive_from_terms, derive_referral_fee, pre_approval_fee};
pub use normalizer::{normalize, normalize_value, parse_raw_deals};
pub use selector::{display_deal, effective_status, select_active};
pub use state_machine::{
    DealStateMachine, Role, TransitionContext, TransitionError, TransitionPlan,
};
