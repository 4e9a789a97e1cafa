pub mod catalog;
pub mod entry;
pub mod event;
pub mod project;
pub mod user;
