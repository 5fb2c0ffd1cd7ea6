//! Circular dependency detection.
//!
//! Each top-level `resolve` call owns a fresh [`ResolutionStack`]; nested
//! resolutions made from factories share it through the
//! [`ResolverContext`](crate::ResolverContext). Nothing is kept in
//! thread-local or global state, so the stack is gone once the call returns.

use std::cell::RefCell;

use crate::error::{AppResult, ApplicationError};
use crate::key::{short_type_name, Key};

const MAX_DEPTH: usize = 256;

/// Interfaces currently being constructed by one resolution call.
#[derive(Default)]
pub(crate) struct ResolutionStack {
    keys: RefCell<Vec<Key>>,
}

impl ResolutionStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pushes `key`, failing if it is already being constructed.
    ///
    /// The returned guard pops the key when dropped, on success, error or
    /// unwind alike.
    pub(crate) fn enter(&self, key: Key) -> AppResult<StackGuard<'_>> {
        let mut keys = self.keys.borrow_mut();

        if keys.contains(&key) {
            let mut chain: Vec<String> = keys
                .iter()
                .skip_while(|k| **k != key)
                .map(|k| short_type_name(k.display_name()))
                .collect();
            chain.push(short_type_name(key.display_name()));
            return Err(ApplicationError::circular_dependency(chain));
        }

        if keys.len() >= MAX_DEPTH {
            return Err(ApplicationError::resolution_failed(
                key.display_name(),
                format!("maximum resolution depth {MAX_DEPTH} exceeded"),
            ));
        }

        keys.push(key);
        Ok(StackGuard { stack: self, key })
    }

    /// The keys from the first occurrence of `key` to the top of the stack.
    pub(crate) fn keys_from(&self, key: &Key) -> Vec<Key> {
        self.keys.borrow().iter().skip_while(|k| *k != key).copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.keys.borrow().len()
    }
}

/// Pops its key from the stack on drop.
pub(crate) struct StackGuard<'s> {
    stack: &'s ResolutionStack,
    key: Key,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let mut keys = self.stack.keys.borrow_mut();
        if let Some(last) = keys.pop() {
            debug_assert_eq!(last, self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of;

    struct A;
    struct B;

    #[test]
    fn guard_pops_on_drop() {
        let stack = ResolutionStack::new();
        {
            let _a = stack.enter(key_of::<A>()).unwrap();
            let _b = stack.enter(key_of::<B>()).unwrap();
            assert_eq!(stack.depth(), 2);
        }
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn reentry_reports_chain_from_first_occurrence() {
        let stack = ResolutionStack::new();
        let _a = stack.enter(key_of::<A>()).unwrap();
        let _b = stack.enter(key_of::<B>()).unwrap();
        let err = stack.enter(key_of::<A>()).err().unwrap();
        assert!(err.message().ends_with("A -> B -> A"), "{}", err.message());
        assert_eq!(stack.depth(), 2);
    }
}
