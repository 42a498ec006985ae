pub mod instance;
pub mod org;
pub mod user;
