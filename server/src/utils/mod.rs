pub mod error;
pub mod extract;
pub mod response;
pub mod tax_id;
pub mod validation;
