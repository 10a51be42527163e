pub mod entities;
pub mod pool;
pub mod seaorm;
pub mod storage;

pub use pool::PoolManager;
pub use seaorm::SeaOrmStorage;
pub use storage::{
    AuthorizedRow, DeploymentInput, DeploymentRow, EventInput, Storage, StorageError,
    StorageResult, UsageRow,
};
