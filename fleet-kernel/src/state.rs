use parking_lot::Mutex;
use std::sync::Arc;

/// Lock-guarded cell shared between request handlers and background tasks.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
