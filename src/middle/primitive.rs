use strum::{Display, EnumIter, EnumString};

use crate::frontend::ast::BinaryOperatorClass;

/// Built-in scalar types. Their names are bound in the root scope as type
/// entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveKind {
    Int,
    Float,
    String,
    Boolean,
    Void,
    Any,
}

impl PrimitiveKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, PrimitiveKind::Int | PrimitiveKind::Float)
    }

    /// Whether both operands of a binary operator of the given class may have
    /// this type. Equality and coalescing are not decided per primitive.
    pub fn supports_binary_op(self, class: BinaryOperatorClass) -> bool {
        match class {
            BinaryOperatorClass::Arithmetic => self.is_numeric(),
            BinaryOperatorClass::Bitwise => self == PrimitiveKind::Int,
            BinaryOperatorClass::Comparison => {
                self.is_numeric() || self == PrimitiveKind::String
            }
            BinaryOperatorClass::Logical => self == PrimitiveKind::Boolean,
            BinaryOperatorClass::Equality | BinaryOperatorClass::Coalesce => true,
        }
    }
}
