pub mod file;
pub mod lifecycle;
pub mod post;
pub mod reconcile;
pub mod stats;
pub mod upload;

pub use file::FileService;
pub use lifecycle::LifecycleService;
pub use post::PostService;
pub use reconcile::ReconcileService;
pub use stats::StatsService;
pub use upload::UploadService;
