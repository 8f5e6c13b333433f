pub mod chatbot;
pub mod config;
pub mod escalation;
pub mod flow;
pub mod shared;
pub mod store;
