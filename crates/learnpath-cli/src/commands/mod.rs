pub mod check_config;
pub mod init;
pub mod list_models;
pub mod start;
