//! The backend renders an analyzed (and usually optimized) IR program as
//! source text for a target language. Generators never fail: anything that
//! reaches them has already been checked by the analyzer.

pub mod targets;

pub use targets::{CodeGenerator, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Spaces per nesting level in the generated code
    pub indent_width: usize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self { indent_width: 4 }
    }
}
