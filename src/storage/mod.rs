pub mod buffer_pool;
pub mod space;

pub use buffer_pool::BufferPool;
pub use space::Tablespace;
