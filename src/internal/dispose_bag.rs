//! Disposal hooks collected while services are constructed.

use std::future::Future;
use std::pin::Pin;

/// Future type for disposal operations.
pub(crate) type BoxFutureUnit = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Disposal hooks run in LIFO order.
///
/// Async hooks run before sync hooks when both are present.
#[derive(Default)]
pub(crate) struct DisposeBag {
    sync: Vec<Box<dyn FnOnce() + Send>>,
    asyncs: Vec<Box<dyn FnOnce() -> BoxFutureUnit + Send>>,
}

impl DisposeBag {
    pub(crate) fn push_sync(&mut self, f: Box<dyn FnOnce() + Send>) {
        self.sync.push(f);
    }

    pub(crate) fn push_async(&mut self, f: Box<dyn FnOnce() -> BoxFutureUnit + Send>) {
        self.asyncs.push(f);
    }

    /// Removes the sync hooks, leaving async hooks in place.
    pub(crate) fn take_sync(&mut self) -> DisposeBag {
        DisposeBag {
            sync: std::mem::take(&mut self.sync),
            asyncs: Vec::new(),
        }
    }

    /// Removes all hooks, leaving the bag empty.
    pub(crate) fn take(&mut self) -> DisposeBag {
        std::mem::take(self)
    }

    pub(crate) fn run_sync_reverse(&mut self) -> usize {
        let mut ran = 0;
        while let Some(f) = self.sync.pop() {
            (f)();
            ran += 1;
        }
        ran
    }

    pub(crate) async fn run_async_reverse(&mut self) -> usize {
        let mut ran = 0;
        while let Some(f) = self.asyncs.pop() {
            (f)().await;
            ran += 1;
        }
        ran
    }

    pub(crate) fn len(&self) -> usize {
        self.sync.len() + self.asyncs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn sync_hooks_run_lifo() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        for i in 0..3 {
            let order = order.clone();
            bag.push_sync(Box::new(move || order.lock().unwrap().push(i)));
        }
        assert_eq!(bag.len(), 3);
        assert_eq!(bag.run_sync_reverse(), 3);
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert_eq!(bag.len(), 0);
    }
}
