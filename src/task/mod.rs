pub mod data;
pub mod store;
pub mod views;
