//! Reentrancy guard for the instrumented `htmx.process` entry point.

use std::cell::Cell;
use std::rc::Rc;

/// Counts nested entries into the wrapped function.
#[derive(Debug, Clone)]
pub struct DepthGauge {
    depth: Rc<Cell<u32>>,
    max_depth: u32,
}

impl DepthGauge {
    pub fn new(max_depth: u32) -> Self {
        Self {
            depth: Rc::new(Cell::new(0)),
            max_depth,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Enter one level. `None` once `max_depth` levels are active.
    pub fn enter(&self) -> Option<DepthToken> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return None;
        }
        self.depth.set(depth + 1);
        Some(DepthToken {
            depth: Rc::clone(&self.depth),
        })
    }
}

/// One active level; leaving it (by drop) decrements the gauge, including
/// on unwind.
#[derive(Debug)]
pub struct DepthToken {
    depth: Rc<Cell<u32>>,
}

impl Drop for DepthToken {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}
