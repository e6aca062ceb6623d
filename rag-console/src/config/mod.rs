pub mod admin_key;
pub mod console_config;
