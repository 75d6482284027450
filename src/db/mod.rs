pub mod billing_repository;
pub mod mock_db;
pub mod postgres_billing_repository;
