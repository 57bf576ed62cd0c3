/// Poll record, queue, settings and lock persistence.
pub mod poll_store;
/// Storage abstraction layer for database operations.
pub mod storage;
