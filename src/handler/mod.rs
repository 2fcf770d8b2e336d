pub mod admin;
pub mod affiliate;
