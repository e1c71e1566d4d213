//! Package index protocol: repository abstraction, PyPI JSON API client,
//! platform-specific wheel selection, static sdist metadata inspection,
//! and the prioritized repository pool.

pub mod download;
pub mod metadata;
pub mod pool;
pub mod pypi;
pub mod repository;
pub mod sdist;
pub mod wheel;

pub use pool::{Priority, RepositoryPool};
pub use pypi::PypiRepository;
pub use repository::{MemoryRepository, Repository};
