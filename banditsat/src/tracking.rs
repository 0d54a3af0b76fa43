//! Traits for synchronizing updates that affect multiple solver components.

/// Solver component that holds per-variable data and needs resizing when the
/// number of variables is known or changes.
pub trait Resize {
    /// Resizes the component's per-variable storage.
    fn resize(&mut self, var_count: usize);
}
