pub mod assigner;
pub mod catalog;
pub mod conflict;
