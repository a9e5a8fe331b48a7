pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod store;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AgentAttribution, BasisPoints, Cents, ContractTerms, Deal, DealId, DealPatch, DealStatus,
    RawDeal, Referral, ReferralId, ReferralStatus, Side, TerminatedReason,
};
pub use engine::{DealStateMachine, Role, TransitionContext, TransitionError};
pub use error::AppError;
pub use orchestration::{Confirmation, ControllerError, DealController, WriteOutcome};
pub use store::{DealStore, HttpDealStore, MockDealStore, StoreError};
