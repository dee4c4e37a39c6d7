//! Read repository implementations.

pub mod in_memory_post_repository;
pub mod pg_post_repository;

pub use in_memory_post_repository::InMemoryPostRepository;
pub use pg_post_repository::PgPostRepository;
