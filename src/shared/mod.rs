pub mod enums;
pub mod error;
pub mod models;
pub mod state;
