//! Converting merged introspection results into a realized schema with
//! per-field service provenance.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::introspection::{InputField, IntrospectionQueryResult, TypeKind, TypeRef};
use crate::merge::{merge_schema_slice, MergeError, MergeMode};
use crate::schema::{EnumType, Field, FieldRef, InputObject, Object, Schema, Type, UnionType};

/// A defect in introspection data discovered while realizing it.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Two top-level types share a name.
    #[error("duplicate type {0}")]
    DuplicateType(String),

    /// A reference names a type the schema does not declare.
    #[error("type {0} not found among top-level types")]
    TypeNotFound(String),

    /// A kind the realizer does not understand.
    #[error("unknown type kind {0}")]
    UnknownTypeKind(TypeKind),

    /// A reference is structurally broken (a named kind without a name, or
    /// a wrapper without an inner type).
    #[error("malformed type reference")]
    MalformedTypeRef,

    /// A field's type could not be resolved.
    #[error("type {name} field {field} has bad type: {source}")]
    FieldType {
        /// The enclosing type.
        name: String,
        /// The offending field.
        field: String,
        /// The underlying failure.
        source: Box<SchemaError>,
    },

    /// A field's arguments could not be resolved.
    #[error("field {field} input: {source}")]
    FieldInput {
        /// The offending field.
        field: String,
        /// The underlying failure.
        source: Box<SchemaError>,
    },

    /// An input object's fields could not be resolved.
    #[error("type {name}: {source}")]
    InputObject {
        /// The input object.
        name: String,
        /// The underlying failure.
        source: Box<SchemaError>,
    },

    /// A union lists a member that is not an object.
    #[error("type {name} has possible type that is not an object: {member}")]
    NonObjectMember {
        /// The union.
        name: String,
        /// The rendered member reference.
        member: String,
    },
}

/// Any failure of the federation pipeline.
#[derive(Debug, Error)]
pub enum FederationError {
    /// The schemas could not be merged.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// The merged schema could not be realized.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Federation-specific annotations for one realized field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// An arbitrary service that can resolve this field. Deterministic:
    /// the lexicographically first contributor.
    pub service: String,
    /// Every service that can resolve this field. A service with several
    /// versions counts only if all versions resolve it.
    pub services: BTreeSet<String>,
}

/// Per-field provenance, keyed by realized field identity.
pub type FieldInfoMap = HashMap<FieldRef, FieldInfo, ahash::RandomState>;

/// A realized schema along with federation annotations per field.
#[derive(Debug)]
pub struct FederatedSchema {
    /// The merged, realized schema.
    pub schema: Schema,
    /// Which services can resolve each field.
    pub fields: FieldInfoMap,
}

type TypeIndex = HashMap<String, Type, ahash::RandomState>;

/// Resolve a type reference against the declared top-level types.
fn lookup_type_ref(ty: &TypeRef, all: &TypeIndex) -> Result<Type, SchemaError> {
    match ty.kind {
        TypeKind::Scalar
        | TypeKind::Object
        | TypeKind::Union
        | TypeKind::InputObject
        | TypeKind::Enum => {
            let name = ty.name.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
            all.get(name)
                .cloned()
                .ok_or_else(|| SchemaError::TypeNotFound(name.to_owned()))
        }

        TypeKind::List => {
            let inner = ty.of_type.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
            Ok(Type::List(Box::new(lookup_type_ref(inner, all)?)))
        }

        TypeKind::NonNull => {
            let inner = ty.of_type.as_deref().ok_or(SchemaError::MalformedTypeRef)?;
            Ok(Type::NonNull(Box::new(lookup_type_ref(inner, all)?)))
        }

        TypeKind::Unknown => Err(SchemaError::UnknownTypeKind(ty.kind)),
    }
}

/// Resolve a list of input fields into a name → type map.
fn realize_input_fields(
    source: &[InputField],
    all: &TypeIndex,
) -> Result<BTreeMap<String, Type>, SchemaError> {
    let mut fields = BTreeMap::new();
    for field in source {
        let ty = lookup_type_ref(&field.ty, all).map_err(|source| SchemaError::FieldInput {
            field: field.name.clone(),
            source: Box::new(source),
        })?;
        fields.insert(field.name.clone(), ty);
    }
    Ok(fields)
}

/// Build concrete type objects for an introspected schema.
///
/// The first pass declares an empty shell per type, indexed by name; the
/// second resolves every reference through that index and wires the shells,
/// so mutually recursive types work without special handling.
fn realize(schema: &IntrospectionQueryResult) -> Result<TypeIndex, SchemaError> {
    let mut all = TypeIndex::default();

    for typ in &schema.schema.types {
        let declared = match typ.kind {
            TypeKind::Object => Type::Object(Object::shell(&typ.name)),
            TypeKind::InputObject => Type::InputObject(InputObject::shell(&typ.name)),
            TypeKind::Scalar => Type::Scalar(typ.name.clone()),
            TypeKind::Union => Type::Union(UnionType::shell(&typ.name)),
            TypeKind::Enum => Type::Enum(EnumType::shell(&typ.name)),
            TypeKind::List | TypeKind::NonNull | TypeKind::Unknown => {
                return Err(SchemaError::UnknownTypeKind(typ.kind));
            }
        };
        if all.insert(typ.name.clone(), declared).is_some() {
            return Err(SchemaError::DuplicateType(typ.name.clone()));
        }
    }

    for typ in &schema.schema.types {
        match typ.kind {
            TypeKind::Object => {
                let mut fields = BTreeMap::new();
                for field in &typ.fields {
                    let ty =
                        lookup_type_ref(&field.ty, &all).map_err(|source| SchemaError::FieldType {
                            name: typ.name.clone(),
                            field: field.name.clone(),
                            source: Box::new(source),
                        })?;
                    let args = realize_input_fields(&field.args, &all)?;
                    fields.insert(field.name.clone(), Arc::new(Field { args, ty }));
                }
                if let Some(Type::Object(object)) = all.get(&typ.name) {
                    object.wire(fields);
                }
            }

            TypeKind::InputObject => {
                let input_fields = realize_input_fields(&typ.input_fields, &all).map_err(
                    |source| SchemaError::InputObject {
                        name: typ.name.clone(),
                        source: Box::new(source),
                    },
                )?;
                if let Some(Type::InputObject(input_object)) = all.get(&typ.name) {
                    input_object.wire(input_fields);
                }
            }

            TypeKind::Union => {
                let mut members = BTreeMap::new();
                for member in &typ.possible_types {
                    if member.kind != TypeKind::Object {
                        return Err(SchemaError::NonObjectMember {
                            name: typ.name.clone(),
                            member: member.to_string(),
                        });
                    }
                    let resolved = lookup_type_ref(member, &all)?;
                    let Some(object) = resolved.as_object() else {
                        return Err(SchemaError::NonObjectMember {
                            name: typ.name.clone(),
                            member: member.to_string(),
                        });
                    };
                    members.insert(object.name.clone(), object.clone());
                }
                if let Some(Type::Union(union)) = all.get(&typ.name) {
                    union.wire(members);
                }
            }

            TypeKind::Enum => {
                let values = typ.enum_values.iter().map(|v| v.name.clone()).collect();
                if let Some(Type::Enum(enum_type)) = all.get(&typ.name) {
                    enum_type.wire(values);
                }
            }

            TypeKind::Scalar => {}

            TypeKind::List | TypeKind::NonNull | TypeKind::Unknown => {
                return Err(SchemaError::UnknownTypeKind(typ.kind));
            }
        }
    }

    Ok(all)
}

/// Schemas for every version of every backing service: service name →
/// version → introspection result.
pub type VersionedSchemas = BTreeMap<String, BTreeMap<String, IntrospectionQueryResult>>;

/// Merge one unversioned schema per service into a federated schema.
pub fn convert_schema(
    schemas: BTreeMap<String, IntrospectionQueryResult>,
) -> Result<FederatedSchema, FederationError> {
    let versioned = schemas
        .into_iter()
        .map(|(service, schema)| (service, BTreeMap::from([(String::new(), schema)])))
        .collect();
    convert_versioned_schemas(versioned)
}

/// Merge the schemas of every service version into a federated schema.
///
/// Per service, versions are intersected so only fields every deployed
/// version supports survive; the per-service schemas are then unioned,
/// realized, and annotated with which services can resolve each field.
pub fn convert_versioned_schemas(
    schemas: VersionedSchemas,
) -> Result<FederatedSchema, FederationError> {
    let mut schemas_by_service = BTreeMap::new();
    for (service, versions) in schemas {
        tracing::debug!(service = %service, versions = versions.len(), "intersecting service versions");
        let merged =
            merge_schema_slice(versions.into_values().collect(), MergeMode::Intersection)?;
        schemas_by_service.insert(service, merged);
    }

    tracing::debug!(services = schemas_by_service.len(), "unioning service schemas");
    let merged = merge_schema_slice(
        schemas_by_service.values().cloned().collect(),
        MergeMode::Union,
    )?;
    let types = realize(&merged)?;

    // Iteration is in sorted service order, so the representative `service`
    // recorded on first sight is the lexicographically first contributor.
    let mut fields = FieldInfoMap::default();
    for (service, schema) in &schemas_by_service {
        for typ in &schema.schema.types {
            if typ.kind != TypeKind::Object {
                continue;
            }
            let Some(Type::Object(object)) = types.get(&typ.name) else {
                continue;
            };
            for field in &typ.fields {
                let Some(realized) = object.fields().get(&field.name) else {
                    continue;
                };
                fields
                    .entry(FieldRef(realized.clone()))
                    .or_insert_with(|| FieldInfo {
                        service: service.clone(),
                        services: BTreeSet::new(),
                    })
                    .services
                    .insert(service.clone());
            }
        }
    }

    Ok(FederatedSchema {
        schema: Schema {
            query: types.get("Query").cloned(),
            mutation: types.get("Mutation").cloned(),
        },
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::{FieldDef, TypeDef};

    #[test]
    fn duplicate_type_names_fail() {
        let schema = IntrospectionQueryResult::from_types(vec![
            TypeDef::new("Thing", TypeKind::Scalar),
            TypeDef::new("Thing", TypeKind::Object),
        ]);
        let err = realize(&schema).unwrap_err();
        assert_eq!(err.to_string(), "duplicate type Thing");
    }

    #[test]
    fn named_reference_without_a_name_is_malformed() {
        let schema = IntrospectionQueryResult::from_types(vec![TypeDef {
            fields: vec![FieldDef {
                name: "broken".into(),
                ty: TypeRef {
                    kind: TypeKind::Object,
                    name: None,
                    of_type: None,
                },
                args: Vec::new(),
            }],
            ..TypeDef::new("Query", TypeKind::Object)
        }]);
        let err = realize(&schema).unwrap_err();
        assert!(err.to_string().contains("malformed type reference"));
    }
}
