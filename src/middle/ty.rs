use std::rc::Rc;

use colored::Colorize;

use crate::middle::{entity::EntityId, primitive::PrimitiveKind};

/// Cheaply clonable handle to a type
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Type(Rc<TypeKind>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// int, float, string, boolean, void, any
    Primitive(PrimitiveKind),
    /// [T]
    Array(Type),
    /// T?
    Optional(Type),
    /// (int, float) -> string
    Function {
        parameters: Rc<[Type]>,
        return_type: Type,
    },
    /// A declared class. Classes are nominal: two class types are the same
    /// only when they come from the same declaration.
    Class { id: EntityId, name: Rc<str> },
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn primitive(primitive: PrimitiveKind) -> Self {
        Self::new(TypeKind::Primitive(primitive))
    }

    pub fn int() -> Self {
        Self::primitive(PrimitiveKind::Int)
    }

    pub fn float() -> Self {
        Self::primitive(PrimitiveKind::Float)
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveKind::String)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveKind::Boolean)
    }

    pub fn void() -> Self {
        Self::primitive(PrimitiveKind::Void)
    }

    pub fn any() -> Self {
        Self::primitive(PrimitiveKind::Any)
    }

    pub fn array(element: Type) -> Self {
        Self::new(TypeKind::Array(element))
    }

    pub fn optional(base: Type) -> Self {
        Self::new(TypeKind::Optional(base))
    }

    pub fn function(parameters: Vec<Type>, return_type: Type) -> Self {
        Self::new(TypeKind::Function {
            parameters: parameters.into(),
            return_type,
        })
    }

    pub fn class(id: EntityId, name: &str) -> Self {
        Self::new(TypeKind::Class {
            id,
            name: name.into(),
        })
    }

    /// Structural equality. Class types compare by declaration identity and
    /// `any` is only equivalent to itself.
    pub fn equivalent(&self, other: &Type) -> bool {
        match (&**self, &**other) {
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => a == b,
            (TypeKind::Array(a), TypeKind::Array(b))
            | (TypeKind::Optional(a), TypeKind::Optional(b)) => a.equivalent(b),
            (
                TypeKind::Function {
                    parameters: a_parameters,
                    return_type: a_return,
                },
                TypeKind::Function {
                    parameters: b_parameters,
                    return_type: b_return,
                },
            ) => {
                a_parameters.len() == b_parameters.len()
                    && a_return.equivalent(b_return)
                    && a_parameters
                        .iter()
                        .zip(b_parameters.iter())
                        .all(|(a, b)| a.equivalent(b))
            }
            (TypeKind::Class { id: a, .. }, TypeKind::Class { id: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Whether a value of this type may be stored in a slot of type `target`.
    /// Functions are covariant in their return type and contravariant in
    /// their parameters.
    pub fn assignable_to(&self, target: &Type) -> bool {
        if target.is_any() {
            return true;
        }

        match (&**self, &**target) {
            (
                TypeKind::Function {
                    parameters: from_parameters,
                    return_type: from_return,
                },
                TypeKind::Function {
                    parameters: to_parameters,
                    return_type: to_return,
                },
            ) => {
                from_parameters.len() == to_parameters.len()
                    && from_return.assignable_to(to_return)
                    && to_parameters
                        .iter()
                        .zip(from_parameters.iter())
                        .all(|(to, from)| to.assignable_to(from))
            }
            _ => self.equivalent(target),
        }
    }

    pub fn colored(&self) -> colored::ColoredString {
        self.to_string().yellow()
    }
}

impl TypeKind {
    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            TypeKind::Primitive(primitive) => Some(*primitive),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        self.as_primitive() == Some(PrimitiveKind::Int)
    }

    pub fn is_float(&self) -> bool {
        self.as_primitive() == Some(PrimitiveKind::Float)
    }

    pub fn is_numeric(&self) -> bool {
        self.as_primitive().is_some_and(PrimitiveKind::is_numeric)
    }

    pub fn is_string(&self) -> bool {
        self.as_primitive() == Some(PrimitiveKind::String)
    }

    pub fn is_boolean(&self) -> bool {
        self.as_primitive() == Some(PrimitiveKind::Boolean)
    }

    pub fn is_void(&self) -> bool {
        self.as_primitive() == Some(PrimitiveKind::Void)
    }

    pub fn is_any(&self) -> bool {
        self.as_primitive() == Some(PrimitiveKind::Any)
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            TypeKind::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn base_type(&self) -> Option<&Type> {
        match self {
            TypeKind::Optional(base) => Some(base),
            _ => None,
        }
    }

    pub fn class_id(&self) -> Option<EntityId> {
        match self {
            TypeKind::Class { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Type({self})")
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl core::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive(primitive) => write!(f, "{primitive}"),
            Self::Array(element) => write!(f, "[{element}]"),
            // `(()->int)?` rather than `()->int?`
            Self::Optional(base) if matches!(**base, Self::Function { .. }) => {
                write!(f, "({base})?")
            }
            Self::Optional(base) => write!(f, "{base}?"),
            Self::Function {
                parameters,
                return_type,
            } => {
                write!(f, "(")?;
                for (i, ty) in parameters.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")->{return_type}")
            }
            Self::Class { name, .. } => write!(f, "{name}"),
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", **self)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::index::Index;

    fn class(n: usize) -> Type {
        Type::class(EntityId::new(n), &format!("C{n}"))
    }

    fn arb_type() -> impl Strategy<Value = Type> {
        let leaf = prop_oneof![
            Just(Type::int()),
            Just(Type::float()),
            Just(Type::string()),
            Just(Type::boolean()),
            Just(Type::void()),
            Just(Type::any()),
            (0usize..3).prop_map(class),
        ];

        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(Type::array),
                inner.clone().prop_map(Type::optional),
                (prop::collection::vec(inner.clone(), 0..3), inner)
                    .prop_map(|(parameters, ret)| Type::function(parameters, ret)),
            ]
        })
    }

    proptest! {
        #[test]
        fn assignability_is_reflexive(ty in arb_type()) {
            prop_assert!(ty.assignable_to(&ty));
            prop_assert!(ty.equivalent(&ty));
        }

        #[test]
        fn everything_is_assignable_to_any(ty in arb_type()) {
            prop_assert!(ty.assignable_to(&Type::any()));
        }

        #[test]
        fn equivalence_implies_assignability(a in arb_type(), b in arb_type()) {
            if a.equivalent(&b) {
                prop_assert!(a.assignable_to(&b));
                prop_assert!(b.assignable_to(&a));
            }
        }
    }

    #[test]
    fn any_is_a_sink_not_an_equivalence() {
        assert!(!Type::int().equivalent(&Type::any()));
        assert!(!Type::any().assignable_to(&Type::int()));
    }

    #[test]
    fn classes_are_nominal() {
        assert!(class(1).equivalent(&class(1)));
        assert!(!class(1).equivalent(&Type::class(EntityId::new(2), "C1")));
    }

    #[test]
    fn function_return_is_covariant() {
        let returns_int = Type::function(vec![], Type::int());
        let returns_any = Type::function(vec![], Type::any());

        assert!(returns_int.assignable_to(&returns_any));
        assert!(!returns_any.assignable_to(&returns_int));
    }

    #[test]
    fn function_parameters_are_contravariant() {
        let takes_any = Type::function(vec![Type::any()], Type::void());
        let takes_int = Type::function(vec![Type::int()], Type::void());

        // A function accepting anything can stand in for one accepting ints
        assert!(takes_any.assignable_to(&takes_int));
        assert!(!takes_int.assignable_to(&takes_any));
    }

    #[test]
    fn function_arity_must_match() {
        let unary = Type::function(vec![Type::int()], Type::void());
        let binary = Type::function(vec![Type::int(), Type::int()], Type::void());

        assert!(!unary.assignable_to(&binary));
        assert!(!unary.equivalent(&binary));
    }

    #[test]
    fn optionals_are_not_unwrapped() {
        assert!(!Type::int().assignable_to(&Type::optional(Type::int())));
        assert!(!Type::optional(Type::int()).assignable_to(&Type::int()));
    }

    #[test]
    fn display() {
        let ty = Type::optional(Type::function(
            vec![Type::array(Type::int()), Type::float()],
            Type::string(),
        ));

        assert_eq!(ty.to_string(), "(([int],float)->string)?");

        let returns_optional = Type::function(vec![], Type::optional(Type::string()));
        assert_eq!(returns_optional.to_string(), "()->string?");
        assert_eq!(
            Type::array(Type::function(vec![], Type::int())).to_string(),
            "[()->int]"
        );
        assert_eq!(class(4).to_string(), "C4");
    }
}
