pub mod application;
pub mod opportunity;
pub mod resume;
pub mod user;
