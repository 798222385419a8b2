//! Value types for GraphQL introspection results.
//!
//! This is the subset of the standard `__schema` introspection payload the
//! merger operates on: type kinds, type references, fields, arguments, enum
//! values, and union members. Directives, descriptions, and argument
//! defaults are out of scope.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind discriminator for introspected types and type references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    /// A scalar such as `Int` or `String`.
    Scalar,
    /// An output object type.
    Object,
    /// An input object type.
    InputObject,
    /// A union of object types.
    Union,
    /// An enum type.
    Enum,
    /// A list wrapper; the element type lives in `of_type`.
    List,
    /// A non-null wrapper; the inner type lives in `of_type`.
    NonNull,
    /// Any kind this merger does not understand (e.g. `INTERFACE`). Kept
    /// through deserialization so it can be rejected with a proper error at
    /// merge or realization time.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Scalar => "SCALAR",
            TypeKind::Object => "OBJECT",
            TypeKind::InputObject => "INPUT_OBJECT",
            TypeKind::Union => "UNION",
            TypeKind::Enum => "ENUM",
            TypeKind::List => "LIST",
            TypeKind::NonNull => "NON_NULL",
            TypeKind::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// A type reference from the introspection query.
///
/// `LIST` and `NON_NULL` references carry an inner reference in `of_type`;
/// all other kinds carry a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    /// What kind of reference this is.
    pub kind: TypeKind,
    /// The referenced type's name, for named kinds.
    #[serde(default)]
    pub name: Option<String>,
    /// The wrapped reference, for `LIST` and `NON_NULL`.
    #[serde(default, rename = "ofType")]
    pub of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    /// A named reference (`SCALAR`, `ENUM`, `UNION`, `OBJECT`,
    /// `INPUT_OBJECT`).
    pub fn named(kind: TypeKind, name: impl Into<String>) -> TypeRef {
        TypeRef {
            kind,
            name: Some(name.into()),
            of_type: None,
        }
    }

    /// Wrap a reference in `NON_NULL`.
    pub fn non_null(inner: TypeRef) -> TypeRef {
        TypeRef {
            kind: TypeKind::NonNull,
            name: None,
            of_type: Some(Box::new(inner)),
        }
    }

    /// Wrap a reference in `LIST`.
    pub fn list(inner: TypeRef) -> TypeRef {
        TypeRef {
            kind: TypeKind::List,
            name: None,
            of_type: Some(Box::new(inner)),
        }
    }

    /// Whether the outermost wrapper is `NON_NULL`.
    pub fn is_non_null(&self) -> bool {
        self.kind == TypeKind::NonNull
    }
}

impl fmt::Display for TypeRef {
    /// GraphQL conventions: `Name`, `Name!` for non-null, `[Inner]` for
    /// lists, recursively.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Scalar
            | TypeKind::Enum
            | TypeKind::Union
            | TypeKind::Object
            | TypeKind::InputObject => write!(f, "{}", self.name.as_deref().unwrap_or("<unnamed>")),
            TypeKind::NonNull => match &self.of_type {
                Some(inner) => write!(f, "{inner}!"),
                None => write!(f, "<nil>!"),
            },
            TypeKind::List => match &self.of_type {
                Some(inner) => write!(f, "[{inner}]"),
                None => write!(f, "[<nil>]"),
            },
            TypeKind::Unknown => write!(
                f,
                "<kind=UNKNOWN name={}>",
                self.name.as_deref().unwrap_or("<nil>")
            ),
        }
    }
}

/// An input field of an input object, or an argument of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    /// The field name.
    pub name: String,
    /// The input type.
    #[serde(rename = "type")]
    pub ty: TypeRef,
}

/// An output field of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// The field name.
    pub name: String,
    /// The result type.
    #[serde(rename = "type")]
    pub ty: TypeRef,
    /// The field's arguments.
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<InputField>,
}

/// One value of an enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    /// The value's name.
    pub name: String,
}

/// A top-level introspected type.
///
/// Which of the collections are populated depends on `kind`: objects have
/// `fields`, input objects have `input_fields`, unions have
/// `possible_types`, enums have `enum_values`, and scalars have none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// The type name.
    pub name: String,
    /// The type kind.
    pub kind: TypeKind,
    /// Output fields, for objects.
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<FieldDef>,
    /// Input fields, for input objects.
    #[serde(default, deserialize_with = "null_as_default", rename = "inputFields")]
    pub input_fields: Vec<InputField>,
    /// Member types, for unions.
    #[serde(default, deserialize_with = "null_as_default", rename = "possibleTypes")]
    pub possible_types: Vec<TypeRef>,
    /// Values, for enums.
    #[serde(default, deserialize_with = "null_as_default", rename = "enumValues")]
    pub enum_values: Vec<EnumValue>,
}

impl TypeDef {
    /// An empty type shell of the given name and kind.
    pub fn new(name: impl Into<String>, kind: TypeKind) -> TypeDef {
        TypeDef {
            name: name.into(),
            kind,
            fields: Vec::new(),
            input_fields: Vec::new(),
            possible_types: Vec::new(),
            enum_values: Vec::new(),
        }
    }
}

/// The `__schema` object of an introspection payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntrospectionSchema {
    /// All top-level types.
    #[serde(default, deserialize_with = "null_as_default")]
    pub types: Vec<TypeDef>,
}

/// A full introspection query result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntrospectionQueryResult {
    /// The introspected schema.
    #[serde(rename = "__schema")]
    pub schema: IntrospectionSchema,
}

impl IntrospectionQueryResult {
    /// An introspection result holding the given types.
    pub fn from_types(types: Vec<TypeDef>) -> IntrospectionQueryResult {
        IntrospectionQueryResult {
            schema: IntrospectionSchema { types },
        }
    }
}

/// Introspection payloads use `null` where this model wants an empty list
/// (`"fields": null` on a scalar, for example).
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> TypeRef {
        TypeRef::named(TypeKind::Scalar, "Int")
    }

    #[test]
    fn display_follows_graphql_conventions() {
        assert_eq!(int().to_string(), "Int");
        assert_eq!(TypeRef::non_null(int()).to_string(), "Int!");
        assert_eq!(TypeRef::list(int()).to_string(), "[Int]");
        assert_eq!(
            TypeRef::non_null(TypeRef::list(TypeRef::non_null(int()))).to_string(),
            "[Int!]!"
        );
    }

    #[test]
    fn kind_round_trips_through_wire_spelling() {
        let json = "\"INPUT_OBJECT\"";
        let kind: TypeKind = serde_json::from_str(json).unwrap();
        assert_eq!(kind, TypeKind::InputObject);
        assert_eq!(serde_json::to_string(&kind).unwrap(), json);
    }

    #[test]
    fn unfamiliar_kind_becomes_unknown() {
        let kind: TypeKind = serde_json::from_str("\"INTERFACE\"").unwrap();
        assert_eq!(kind, TypeKind::Unknown);
    }

    #[test]
    fn null_collections_deserialize_empty() {
        let payload = r#"{
            "__schema": {
                "types": [
                    {
                        "name": "Int",
                        "kind": "SCALAR",
                        "fields": null,
                        "inputFields": null,
                        "possibleTypes": null,
                        "enumValues": null
                    }
                ]
            }
        }"#;
        let result: IntrospectionQueryResult = serde_json::from_str(payload).unwrap();
        let typ = &result.schema.types[0];
        assert_eq!(typ.kind, TypeKind::Scalar);
        assert!(typ.fields.is_empty());
        assert!(typ.enum_values.is_empty());
    }
}
