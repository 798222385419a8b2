//! Realized schema objects.
//!
//! The merger's output is still introspection data; these are the concrete
//! type objects a gateway type-checks and plans against. They are built in
//! two passes (declare shells, then wire references) so the realized
//! graph may be cyclic. The wiring cells are write-once.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// A concrete GraphQL type.
#[derive(Debug, Clone)]
pub enum Type {
    /// A scalar, identified by name.
    Scalar(String),
    /// An output object.
    Object(Arc<Object>),
    /// An input object.
    InputObject(Arc<InputObject>),
    /// A union of objects.
    Union(Arc<UnionType>),
    /// An enum.
    Enum(Arc<EnumType>),
    /// A list of the inner type.
    List(Box<Type>),
    /// A non-null wrapper around the inner type.
    NonNull(Box<Type>),
}

impl Type {
    /// The object behind this type, if it is one.
    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Type::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The type's name, ignoring list and non-null wrappers.
    pub fn name(&self) -> &str {
        match self {
            Type::Scalar(name) => name,
            Type::Object(object) => &object.name,
            Type::InputObject(input_object) => &input_object.name,
            Type::Union(union) => &union.name,
            Type::Enum(enum_type) => &enum_type.name,
            Type::List(inner) | Type::NonNull(inner) => inner.name(),
        }
    }
}

/// A realized output object type.
#[derive(Debug)]
pub struct Object {
    /// The type name.
    pub name: String,
    fields: OnceLock<BTreeMap<String, Arc<Field>>>,
}

impl Object {
    pub(crate) fn shell(name: impl Into<String>) -> Arc<Object> {
        Arc::new(Object {
            name: name.into(),
            fields: OnceLock::new(),
        })
    }

    pub(crate) fn wire(&self, fields: BTreeMap<String, Arc<Field>>) {
        let _ = self.fields.set(fields);
    }

    /// The object's fields by name. Empty until wired.
    pub fn fields(&self) -> &BTreeMap<String, Arc<Field>> {
        static EMPTY: BTreeMap<String, Arc<Field>> = BTreeMap::new();
        self.fields.get().unwrap_or(&EMPTY)
    }
}

/// A realized field: argument types by name plus the result type.
#[derive(Debug)]
pub struct Field {
    /// Argument name to input type.
    pub args: BTreeMap<String, Type>,
    /// The result type.
    pub ty: Type,
}

/// A handle to a realized field with pointer identity.
///
/// Two handles are equal when they refer to the same realized field object,
/// not merely fields of the same name, which makes field handles usable as
/// map keys for per-field annotations.
#[derive(Debug, Clone)]
pub struct FieldRef(pub Arc<Field>);

impl PartialEq for FieldRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FieldRef {}

impl Hash for FieldRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl std::ops::Deref for FieldRef {
    type Target = Field;

    fn deref(&self) -> &Field {
        &self.0
    }
}

/// A realized input object type.
#[derive(Debug)]
pub struct InputObject {
    /// The type name.
    pub name: String,
    input_fields: OnceLock<BTreeMap<String, Type>>,
}

impl InputObject {
    pub(crate) fn shell(name: impl Into<String>) -> Arc<InputObject> {
        Arc::new(InputObject {
            name: name.into(),
            input_fields: OnceLock::new(),
        })
    }

    pub(crate) fn wire(&self, input_fields: BTreeMap<String, Type>) {
        let _ = self.input_fields.set(input_fields);
    }

    /// The input fields by name. Empty until wired.
    pub fn input_fields(&self) -> &BTreeMap<String, Type> {
        static EMPTY: BTreeMap<String, Type> = BTreeMap::new();
        self.input_fields.get().unwrap_or(&EMPTY)
    }
}

/// A realized union type.
#[derive(Debug)]
pub struct UnionType {
    /// The type name.
    pub name: String,
    types: OnceLock<BTreeMap<String, Arc<Object>>>,
}

impl UnionType {
    pub(crate) fn shell(name: impl Into<String>) -> Arc<UnionType> {
        Arc::new(UnionType {
            name: name.into(),
            types: OnceLock::new(),
        })
    }

    pub(crate) fn wire(&self, types: BTreeMap<String, Arc<Object>>) {
        let _ = self.types.set(types);
    }

    /// The member objects by name. Empty until wired.
    pub fn types(&self) -> &BTreeMap<String, Arc<Object>> {
        static EMPTY: BTreeMap<String, Arc<Object>> = BTreeMap::new();
        self.types.get().unwrap_or(&EMPTY)
    }
}

/// A realized enum type.
#[derive(Debug)]
pub struct EnumType {
    /// The type name.
    pub name: String,
    wiring: OnceLock<EnumWiring>,
}

#[derive(Debug)]
struct EnumWiring {
    values: Vec<String>,
    reverse_map: BTreeMap<String, String>,
}

impl EnumType {
    pub(crate) fn shell(name: impl Into<String>) -> Arc<EnumType> {
        Arc::new(EnumType {
            name: name.into(),
            wiring: OnceLock::new(),
        })
    }

    pub(crate) fn wire(&self, values: Vec<String>) {
        let reverse_map = values
            .iter()
            .map(|value| (value.clone(), value.clone()))
            .collect();
        let _ = self.wiring.set(EnumWiring {
            values,
            reverse_map,
        });
    }

    /// The enum's values. Empty until wired.
    pub fn values(&self) -> &[String] {
        self.wiring.get().map(|w| w.values.as_slice()).unwrap_or(&[])
    }

    /// Maps each wire value back to its name (the identity mapping here;
    /// introspection relies on the map existing).
    pub fn reverse_map(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.wiring.get().map(|w| &w.reverse_map).unwrap_or(&EMPTY)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::List(inner) => write!(f, "[{inner}]"),
            Type::NonNull(inner) => write!(f, "{inner}!"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// A realized schema with its operation roots.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// The `Query` root, if the schema has one.
    pub query: Option<Type>,
    /// The `Mutation` root, if the schema has one.
    pub mutation: Option<Type>,
}
