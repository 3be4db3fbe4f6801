//! Names are resolved and types are checked here, producing the typed IR. The
//! optimizer then simplifies the IR before it is handed to a backend.

pub mod analyzer;
pub mod entity;
pub mod ir;
pub mod optimization;
pub mod primitive;
pub mod scope;
pub mod ty;
