//! Frame transforms applied between hardware and the cluster.
//!
//! A [`Middleware`] inspects or rewrites a frame in place and returns false
//! to drop it. A [`MiddlewareChain`] runs middlewares in registration order
//! and stops at the first one that drops the frame.

pub mod scale;
pub mod tare;

use std::fmt;
use std::sync::Arc;

use crate::frame::Frame;

pub use scale::{ChannelScale, Scale, ScaleConfig, ScaleMiddleware};
pub use tare::TareMiddleware;

/// A transform applied to every frame.
///
/// Middlewares are shared between the pipeline worker and the controlling
/// task (for example to trigger a tare), so `handle` takes `&self`.
pub trait Middleware: Send + Sync {
    /// Transforms `frame` in place. Returns false to drop the frame.
    fn handle(&self, frame: &mut Frame) -> bool;
}

/// An ordered list of middlewares.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Creates an empty chain, which passes every frame through unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Appends a middleware, builder style.
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.add(middleware);
        self
    }

    /// Returns the number of middlewares.
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns true if the chain has no middlewares.
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs every middleware in order. Returns false as soon as one drops
    /// the frame.
    pub fn handle(&self, frame: &mut Frame) -> bool {
        self.middlewares.iter().all(|m| m.handle(frame))
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}
