//! Optional pre/post-processing hooks around public operations
//!
//! A hook receives the operation's input (or output) by value and returns a
//! replacement of the same type. The caller re-validates whatever a hook hands
//! back against the contract of the wrapped operation.

use crate::error::CodematchError;
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// A caller supplied transformation of `T`
pub type HookFn<T> = Arc<dyn Fn(T) -> Result<T> + Send + Sync>;

/// Pre-hook over the input `I` and post-hook over the output `O` of one operation
pub struct Hooks<I, O> {
    pre: Option<HookFn<I>>,
    post: Option<HookFn<O>>,
}

impl<I, O> Hooks<I, O> {
    /// No hooks
    pub fn new() -> Self {
        Self {
            pre: None,
            post: None,
        }
    }

    /// Set the pre-processing hook
    pub fn with_pre<F>(mut self, hook: F) -> Self
    where
        F: Fn(I) -> Result<I> + Send + Sync + 'static,
    {
        self.pre = Some(Arc::new(hook));
        self
    }

    /// Set the post-processing hook
    pub fn with_post<F>(mut self, hook: F) -> Self
    where
        F: Fn(O) -> Result<O> + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(hook));
        self
    }

    pub fn has_pre(&self) -> bool {
        self.pre.is_some()
    }

    pub fn has_post(&self) -> bool {
        self.post.is_some()
    }

    /// Run the pre-hook, if any
    pub fn run_pre(&self, operation: &str, input: I) -> Result<I> {
        run_hook(self.pre.as_ref(), operation, "pre", input)
    }

    /// Run the post-hook, if any
    pub fn run_post(&self, operation: &str, output: O) -> Result<O> {
        run_hook(self.post.as_ref(), operation, "post", output)
    }
}

fn run_hook<T>(hook: Option<&HookFn<T>>, operation: &str, stage: &str, value: T) -> Result<T> {
    match hook {
        None => Ok(value),
        Some(hook) => hook(value).map_err(|e| {
            e.classify_with(|msg| {
                CodematchError::hook(format!("{} hook for '{}' failed: {}", stage, operation, msg))
            })
            .with_context("operation", operation)
            .with_context("stage", stage)
        }),
    }
}

impl<I, O> Default for Hooks<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> Clone for Hooks<I, O> {
    fn clone(&self) -> Self {
        Self {
            pre: self.pre.clone(),
            post: self.post.clone(),
        }
    }
}

impl<I, O> fmt::Debug for Hooks<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}
