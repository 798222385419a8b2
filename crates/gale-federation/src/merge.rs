//! Merging introspected schemas.
//!
//! Two schemas combine under one of two modes: [`MergeMode::Union`] for
//! independent services, [`MergeMode::Intersection`] for different versions
//! of the same service. Overlapping types must be compatible: identical
//! except for non-null modifiers.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::introspection::{
    EnumValue, FieldDef, InputField, IntrospectionQueryResult, IntrospectionSchema, TypeDef,
    TypeKind, TypeRef,
};

/// Controls how two schemas are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Compute a schema supported by the two services combined: keep every
    /// type and field that appears on either side. Used to combine the
    /// schemas of independent services; a gateway splits queries among the
    /// services that know each field.
    Union,

    /// Compute a schema supported by both services: keep only what appears
    /// on both sides. Used to combine two versions of one service, since
    /// during a deploy either version might serve any given query.
    Intersection,
}

/// A structural incompatibility between schemas being merged.
#[derive(Debug, Error)]
pub enum MergeError {
    /// [`merge_schema_slice`] was handed an empty slice.
    #[error("no schemas")]
    NoSchemas,

    /// Two named type references disagree on the name.
    #[error("types must be identical")]
    TypesMustBeIdentical,

    /// Two type references disagree on the kind.
    #[error("kinds {0} and {1} differ")]
    KindsDiffer(TypeKind, TypeKind),

    /// Two top-level types of the same name disagree on the kind.
    #[error("conflicting kinds {0} and {1}")]
    ConflictingKinds(TypeKind, TypeKind),

    /// A kind this merger does not understand.
    #[error("unknown type kind {0}")]
    UnknownTypeKind(TypeKind),

    /// An input field present on only one side is non-null; the merged type
    /// would be uncallable on the service that lacks it.
    #[error("new field {name} is non-null: {ty}")]
    NewFieldNonNull {
        /// The offending field.
        name: String,
        /// Its rendered type.
        ty: String,
    },

    /// A field's types could not be merged.
    #[error("field {name} has incompatible types {a} and {b}: {source}")]
    IncompatibleFieldTypes {
        /// The offending field.
        name: String,
        /// The rendered type on the first side.
        a: String,
        /// The rendered type on the second side.
        b: String,
        /// Why the types did not merge.
        source: Box<MergeError>,
    },

    /// A field's arguments could not be merged.
    #[error("field {name} has incompatible arguments: {source}")]
    IncompatibleArguments {
        /// The offending field.
        name: String,
        /// Why the arguments did not merge.
        source: Box<MergeError>,
    },

    /// Context wrapper for input-field merging.
    #[error("merging input fields: {source}")]
    InputFields {
        /// The underlying failure.
        source: Box<MergeError>,
    },

    /// Context wrapper for field merging.
    #[error("merging fields: {source}")]
    Fields {
        /// The underlying failure.
        source: Box<MergeError>,
    },

    /// Context wrapper for union-member merging.
    #[error("merging possible types: {source}")]
    PossibleTypes {
        /// The underlying failure.
        source: Box<MergeError>,
    },

    /// Context wrapper for enum-value merging.
    #[error("merging enum values: {source}")]
    EnumValues {
        /// The underlying failure.
        source: Box<MergeError>,
    },

    /// Context wrapper naming the top-level type that failed to merge.
    #[error("can't merge type {name}: {source}")]
    Type {
        /// The type being merged.
        name: String,
        /// The underlying failure.
        source: Box<MergeError>,
    },
}

/// Strip one `NON_NULL` wrapper, remembering whether it was there.
fn strip_non_null(ty: &TypeRef) -> (bool, &TypeRef) {
    if ty.kind == TypeKind::NonNull {
        if let Some(inner) = &ty.of_type {
            return (true, inner);
        }
    }
    (false, ty)
}

/// Merge two type references, checking compatibility.
///
/// Two types are compatible if they are the same apart from non-null
/// modifiers. Nullability of the merged type depends on position: an input
/// type is non-null if either side is (one service will always demand the
/// value), an output type only if both sides are (null can only be ruled
/// out when every service rules it out).
pub(crate) fn merge_type_refs(
    a: &TypeRef,
    b: &TypeRef,
    is_input: bool,
) -> Result<TypeRef, MergeError> {
    let (a_non_null, a) = strip_non_null(a);
    let (b_non_null, b) = strip_non_null(b);
    if a_non_null || b_non_null {
        let merged = merge_type_refs(a, b, is_input)?;
        return Ok(if is_input || (a_non_null && b_non_null) {
            TypeRef::non_null(merged)
        } else {
            merged
        });
    }

    if a.kind != b.kind {
        return Err(MergeError::KindsDiffer(a.kind, b.kind));
    }
    match a.kind {
        // Basic types must be identical.
        TypeKind::Scalar
        | TypeKind::Enum
        | TypeKind::InputObject
        | TypeKind::Union
        | TypeKind::Object => {
            if a.name != b.name {
                return Err(MergeError::TypesMustBeIdentical);
            }
            Ok(TypeRef {
                kind: a.kind,
                name: a.name.clone(),
                of_type: None,
            })
        }

        // Lists must be compatible but not identical.
        TypeKind::List => match (&a.of_type, &b.of_type) {
            (Some(a_inner), Some(b_inner)) => {
                Ok(TypeRef::list(merge_type_refs(a_inner, b_inner, is_input)?))
            }
            _ => Err(MergeError::TypesMustBeIdentical),
        },

        TypeKind::NonNull | TypeKind::Unknown => Err(MergeError::UnknownTypeKind(a.kind)),
    }
}

/// The shared shape of every collection merge: group both sides by name,
/// walk names in sorted order, validate single occurrences (kept only in
/// union mode), and combine pairs.
fn merge_by_name<T>(
    a: Vec<T>,
    b: Vec<T>,
    mode: MergeMode,
    name_of: fn(&T) -> &str,
    check_single: impl Fn(&str, &T) -> Result<(), MergeError>,
    merge_pair: impl Fn(&str, T, T) -> Result<T, MergeError>,
) -> Result<Vec<T>, MergeError> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in a.into_iter().chain(b) {
        groups.entry(name_of(&item).to_owned()).or_default().push(item);
    }

    let mut merged = Vec::with_capacity(groups.len());
    for (name, items) in groups {
        let mut items = items.into_iter();
        match (items.next(), items.next()) {
            (Some(single), None) => {
                check_single(&name, &single)?;
                if mode == MergeMode::Union {
                    merged.push(single);
                }
            }
            (Some(first), Some(second)) => merged.push(merge_pair(&name, first, second)?),
            (None, _) => continue,
        }
    }
    Ok(merged)
}

/// Merge two sets of input fields, checking type compatibility in input
/// position.
fn merge_input_fields(
    a: Vec<InputField>,
    b: Vec<InputField>,
    mode: MergeMode,
) -> Result<Vec<InputField>, MergeError> {
    merge_by_name(
        a,
        b,
        mode,
        |field| &field.name,
        |name, field| {
            // A required input on one side only would make the merged type
            // uncallable on the other.
            if field.ty.is_non_null() {
                return Err(MergeError::NewFieldNonNull {
                    name: name.to_owned(),
                    ty: field.ty.to_string(),
                });
            }
            Ok(())
        },
        |name, first, second| {
            let ty = merge_type_refs(&first.ty, &second.ty, true).map_err(|source| {
                MergeError::IncompatibleFieldTypes {
                    name: name.to_owned(),
                    a: first.ty.to_string(),
                    b: second.ty.to_string(),
                    source: Box::new(source),
                }
            })?;
            Ok(InputField {
                name: name.to_owned(),
                ty,
            })
        },
    )
}

/// Merge two sets of output fields, merging result types in output position
/// and arguments as input fields.
fn merge_fields(
    a: Vec<FieldDef>,
    b: Vec<FieldDef>,
    mode: MergeMode,
) -> Result<Vec<FieldDef>, MergeError> {
    merge_by_name(
        a,
        b,
        mode,
        |field| &field.name,
        |_, _| Ok(()),
        |name, first, second| {
            let ty = merge_type_refs(&first.ty, &second.ty, false).map_err(|source| {
                MergeError::IncompatibleFieldTypes {
                    name: name.to_owned(),
                    a: first.ty.to_string(),
                    b: second.ty.to_string(),
                    source: Box::new(source),
                }
            })?;
            let args = merge_input_fields(first.args, second.args, mode).map_err(|source| {
                MergeError::IncompatibleArguments {
                    name: name.to_owned(),
                    source: Box::new(source),
                }
            })?;
            Ok(FieldDef {
                name: name.to_owned(),
                ty,
                args,
            })
        },
    )
}

/// Merge union members. Members carry no structure beyond the name, so
/// duplicates collapse to the first occurrence.
fn merge_possible_types(
    a: Vec<TypeRef>,
    b: Vec<TypeRef>,
    mode: MergeMode,
) -> Result<Vec<TypeRef>, MergeError> {
    merge_by_name(
        a,
        b,
        mode,
        |member| member.name.as_deref().unwrap_or(""),
        |_, _| Ok(()),
        |_, first, _| Ok(first),
    )
}

/// Merge enum values; duplicates collapse to the first occurrence.
fn merge_enum_values(
    a: Vec<EnumValue>,
    b: Vec<EnumValue>,
    mode: MergeMode,
) -> Result<Vec<EnumValue>, MergeError> {
    merge_by_name(
        a,
        b,
        mode,
        |value| &value.name,
        |_, _| Ok(()),
        |_, first, _| Ok(first),
    )
}

/// Merge two top-level types of the same name.
pub(crate) fn merge_types(a: TypeDef, b: TypeDef, mode: MergeMode) -> Result<TypeDef, MergeError> {
    if a.kind != b.kind {
        return Err(MergeError::ConflictingKinds(a.kind, b.kind));
    }

    let mut merged = TypeDef::new(a.name.clone(), a.kind);
    match a.kind {
        TypeKind::InputObject => {
            merged.input_fields = merge_input_fields(a.input_fields, b.input_fields, mode)
                .map_err(|source| MergeError::InputFields {
                    source: Box::new(source),
                })?;
        }
        TypeKind::Object => {
            merged.fields =
                merge_fields(a.fields, b.fields, mode).map_err(|source| MergeError::Fields {
                    source: Box::new(source),
                })?;
        }
        TypeKind::Union => {
            merged.possible_types = merge_possible_types(a.possible_types, b.possible_types, mode)
                .map_err(|source| MergeError::PossibleTypes {
                    source: Box::new(source),
                })?;
        }
        TypeKind::Enum => {
            merged.enum_values = merge_enum_values(a.enum_values, b.enum_values, mode).map_err(
                |source| MergeError::EnumValues {
                    source: Box::new(source),
                },
            )?;
        }
        TypeKind::Scalar => {}
        TypeKind::List | TypeKind::NonNull | TypeKind::Unknown => {
            return Err(MergeError::UnknownTypeKind(a.kind));
        }
    }
    Ok(merged)
}

/// Merge two schemas under the given mode.
pub fn merge_schemas(
    a: IntrospectionQueryResult,
    b: IntrospectionQueryResult,
    mode: MergeMode,
) -> Result<IntrospectionQueryResult, MergeError> {
    let types = merge_by_name(
        a.schema.types,
        b.schema.types,
        mode,
        |typ| &typ.name,
        |_, _| Ok(()),
        |name, first, second| {
            merge_types(first, second, mode).map_err(|source| MergeError::Type {
                name: name.to_owned(),
                source: Box::new(source),
            })
        },
    )?;
    Ok(IntrospectionQueryResult {
        schema: IntrospectionSchema { types },
    })
}

/// Left-fold [`merge_schemas`] over a slice of schemas.
pub fn merge_schema_slice(
    schemas: Vec<IntrospectionQueryResult>,
    mode: MergeMode,
) -> Result<IntrospectionQueryResult, MergeError> {
    let mut schemas = schemas.into_iter();
    let Some(mut merged) = schemas.next() else {
        return Err(MergeError::NoSchemas);
    };
    for schema in schemas {
        merged = merge_schemas(merged, schema, mode)?;
    }
    Ok(merged)
}
