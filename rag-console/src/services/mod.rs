pub mod admin_service;
pub mod query_service;
