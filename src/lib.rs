pub mod backup;
pub mod commands;
pub mod doctor;
pub mod environment;
pub mod error;
pub mod fs_utils;
pub mod host;
pub mod identifier;
pub mod paths;
pub mod registry;
pub mod secrets;
pub mod store;
pub mod switch;
pub mod ui;
pub mod vault;
pub mod wait;

#[cfg(test)]
pub mod test_utils;
