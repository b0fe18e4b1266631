mod enqueue;

pub use enqueue::EnqueueCommand;
