pub mod bundle_publisher;
pub mod deployment_state;
pub mod invalidation;
pub mod project_lifecycle;

pub use bundle_publisher::{BundlePublisher, PublishOutcome};
pub use invalidation::Invalidator;
pub use project_lifecycle::{enqueue_build, enqueue_deploy, ProjectLifecycle, ProjectSettingsChange};
