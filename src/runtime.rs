/// Symbol lookup in the traced runtime's loaded code.
pub trait CodeImage {
    /// Absolute address of `name` in this process, if the image exports it.
    fn find_symbol(&self, name: &str) -> Option<usize>;
}

/// The managed runtime whose allocations are traced.
pub trait Runtime {
    /// Whether the runtime exposes the introspection tables the tracer relies on.
    fn introspection_available(&self) -> bool;

    fn code_image(&self) -> Option<&dyn CodeImage>;
}
