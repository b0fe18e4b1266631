mod destroy;
mod lock;

pub use destroy::DestroyCommand;
pub use lock::LockCommand;
