/// Key-value persistence backends for the registry snapshot.
pub mod kv_store;
/// Storage abstraction layer for database operations.
pub mod storage;
