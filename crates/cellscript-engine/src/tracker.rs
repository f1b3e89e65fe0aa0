//! A thread-local record of which cell is currently being evaluated,
//! pushed/popped around each `eval` call so nested evaluations triggered by
//! accessor calls attribute edges to the right frame.
//!
//! `builtins.rs`'s registered closures already thread a `NativeCallContext`
//! through; this adds an explicit stack on top of that so accessor calls can
//! ask "who is currently evaluating" without pre-extracting a static
//! dependency list before execution.

use std::cell::RefCell;

use crate::address::CellAddress;

thread_local! {
    static STACK: RefCell<Vec<CellAddress>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard: pushes `k` on construction, pops on drop, so an early return
/// or a propagated error during evaluation can never leave a stale frame on
/// the stack.
pub struct Frame {
    _private: (),
}

impl Frame {
    pub fn push(k: CellAddress) -> Frame {
        STACK.with(|s| s.borrow_mut().push(k));
        Frame { _private: () }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// The address currently being evaluated on this thread, if any.
pub fn current() -> Option<CellAddress> {
    STACK.with(|s| s.borrow().last().copied())
}

/// Cycle-detection backstop: true if `k` is already on the tracker stack,
/// meaning evaluation has re-entered it. `add_edge` is expected to have
/// already raised `CircularRefError` by the time this would matter; this
/// exists purely as a last-resort check, called at the top of `eval_code`.
pub fn is_evaluating(k: CellAddress) -> bool {
    STACK.with(|s| s.borrow().contains(&k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_via_raii() {
        let k = CellAddress::new(0, 0, 0);
        assert_eq!(current(), None);
        {
            let _frame = Frame::push(k);
            assert_eq!(current(), Some(k));
            assert!(is_evaluating(k));
        }
        assert_eq!(current(), None);
    }

    #[test]
    fn nested_frames_restore_previous_top() {
        let a = CellAddress::new(0, 0, 0);
        let b = CellAddress::new(0, 1, 0);
        let _outer = Frame::push(a);
        {
            let _inner = Frame::push(b);
            assert_eq!(current(), Some(b));
        }
        assert_eq!(current(), Some(a));
    }
}
