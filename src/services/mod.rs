pub mod access;
pub mod digest;
pub mod editor;
pub mod encoding;
pub mod export;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod store;
pub mod suggest;
pub mod token;
pub mod updater;
