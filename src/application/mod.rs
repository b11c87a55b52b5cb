//! Application layer: persistence seams and top-level errors.

pub mod error;
pub mod repos;
