//! Entity models
//!
//! User supplied values are validated when the model is built, so a mapper
//! never writes an invalid row.

pub mod extra_credit;
pub mod hackathon;
pub mod pre_registration;
pub mod validation;

pub use extra_credit::{ExtraCreditAssignment, ExtraCreditClass};
pub use hackathon::Hackathon;
pub use pre_registration::{Email, PreRegistration};
pub use validation::ValidationError;
