pub mod cache;
pub mod geolocation;
pub mod hashing;
pub mod in_memory;
pub mod mailer;
#[cfg(feature = "cache-redis")]
pub mod redis;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
