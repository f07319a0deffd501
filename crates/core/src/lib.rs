pub mod menu;
pub mod order;
pub mod prompt;
pub mod session;
pub mod store;
pub mod tools;
