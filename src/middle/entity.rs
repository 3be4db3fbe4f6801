//! Declared names. Every variable, function, field, class and built-in the
//! analyzer binds lives in one [`Entities`] arena and is referred to by
//! [`EntityId`] from scopes, types and the IR.

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
    index::IndexVec,
    middle::{primitive::PrimitiveKind, ty::Type},
    simple_index,
};

simple_index! {
    /// Handle to an [`Entity`] in the program's entity table
    pub struct EntityId;
}

pub type Entities = IndexVec<EntityId, Entity>;

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Variable {
        read_only: bool,
        ty: Type,
        intrinsic: Option<Intrinsic>,
    },
    /// The type is filled in once the signature has been analyzed so that the
    /// body can refer to the function recursively
    Function {
        ty: Option<Type>,
        intrinsic: Option<Intrinsic>,
    },
    Field {
        ty: Type,
        /// Fields of built-in classes keep their names in generated code
        builtin: bool,
    },
    Class {
        fields: Vec<EntityId>,
        methods: Vec<EntityId>,
        error_kind: Option<ErrorKind>,
    },
    /// A name usable in type position, like `int`
    TypeName(Type),
}

impl Entity {
    pub fn variable(name: impl Into<String>, read_only: bool, ty: Type) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Variable {
                read_only,
                ty,
                intrinsic: None,
            },
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Function {
                ty: None,
                intrinsic: None,
            },
        }
    }

    /// The type of this entity when it is used as a value
    pub fn value_type(&self) -> Option<&Type> {
        match &self.kind {
            EntityKind::Variable { ty, .. } | EntityKind::Field { ty, .. } => Some(ty),
            EntityKind::Function { ty, .. } => ty.as_ref(),
            EntityKind::Class { .. } | EntityKind::TypeName(_) => None,
        }
    }

    pub fn intrinsic(&self) -> Option<Intrinsic> {
        match &self.kind {
            EntityKind::Variable { intrinsic, .. } | EntityKind::Function { intrinsic, .. } => {
                *intrinsic
            }
            _ => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        match &self.kind {
            EntityKind::Variable { read_only, .. } => *read_only,
            EntityKind::Field { .. } => false,
            EntityKind::Function { .. } | EntityKind::Class { .. } | EntityKind::TypeName(_) => {
                true
            }
        }
    }

    pub fn is_builtin(&self) -> bool {
        match &self.kind {
            EntityKind::Field { builtin, .. } => *builtin,
            EntityKind::Class { error_kind, .. } => error_kind.is_some(),
            EntityKind::TypeName(_) => true,
            _ => self.intrinsic().is_some(),
        }
    }
}

/// Standard library functions and constants bound in the root scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Intrinsic {
    Serve,
    Sin,
    Cos,
    Exp,
    Ln,
    Hypot,
    Bytes,
    Codepoints,
    Count,
    #[strum(serialize = "π")]
    Pi,
}

impl Intrinsic {
    pub fn is_constant(self) -> bool {
        self == Intrinsic::Pi
    }

    /// `serve` accepts any number of arguments of any type
    pub fn is_variadic(self) -> bool {
        self == Intrinsic::Serve
    }

    pub fn ty(self) -> Type {
        match self {
            Intrinsic::Serve => Type::function(vec![Type::any()], Type::void()),
            Intrinsic::Sin | Intrinsic::Cos | Intrinsic::Exp | Intrinsic::Ln => {
                Type::function(vec![Type::float()], Type::float())
            }
            Intrinsic::Hypot => Type::function(vec![Type::float(), Type::float()], Type::float()),
            Intrinsic::Bytes | Intrinsic::Codepoints => {
                Type::function(vec![Type::string()], Type::array(Type::int()))
            }
            Intrinsic::Count => Type::function(vec![Type::array(Type::any())], Type::int()),
            Intrinsic::Pi => Type::float(),
        }
    }
}

/// Error kinds that can be thrown and rescued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Display)]
pub enum ErrorKind {
    TypeError,
    ValueError,
    KeyError,
    IndexError,
    RuntimeError,
    Exception,
}

impl ErrorKind {
    /// Whether JavaScript already defines a class with this name
    pub fn is_native_to_javascript(self) -> bool {
        self == ErrorKind::TypeError
    }
}

/// Builds the entity table every program starts from: primitive type names,
/// error kinds and the standard library. Returns the table along with the
/// root bindings in declaration order.
pub fn builtin_entities() -> (Entities, Vec<EntityId>) {
    let mut entities = Entities::new();
    let mut bindings = Vec::new();

    for primitive in PrimitiveKind::iter() {
        bindings.push(entities.push(Entity {
            name: primitive.to_string(),
            kind: EntityKind::TypeName(Type::primitive(primitive)),
        }));
    }

    for error_kind in ErrorKind::iter() {
        let fields = ["message", "stack"]
            .into_iter()
            .map(|name| {
                entities.push(Entity {
                    name: name.to_string(),
                    kind: EntityKind::Field {
                        ty: Type::string(),
                        builtin: true,
                    },
                })
            })
            .collect::<Vec<_>>();

        let class = entities.push(Entity {
            name: error_kind.to_string(),
            kind: EntityKind::Class {
                fields,
                methods: Vec::new(),
                error_kind: Some(error_kind),
            },
        });

        bindings.push(class);
    }

    for intrinsic in Intrinsic::iter() {
        let kind = if intrinsic.is_constant() {
            EntityKind::Variable {
                read_only: true,
                ty: intrinsic.ty(),
                intrinsic: Some(intrinsic),
            }
        } else {
            EntityKind::Function {
                ty: Some(intrinsic.ty()),
                intrinsic: Some(intrinsic),
            }
        };

        bindings.push(entities.push(Entity {
            name: intrinsic.to_string(),
            kind,
        }));
    }

    (entities, bindings)
}
