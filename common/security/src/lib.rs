pub mod error;
pub mod policy;

pub use error::SecurityError;
pub use policy::{
    authorize, authorize_registration, evaluate, Decision, DenyReason, Principal,
    RegistrationPolicy, UserAction,
};
