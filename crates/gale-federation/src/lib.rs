//! Schema federation for a GraphQL gateway.
//!
//! Takes the introspection results of multiple backing services, each
//! possibly deployed in several versions, and produces a single merged
//! schema plus per-field provenance describing which services can resolve
//! each field.
//!
//! Merging is defined by two modes: versions of one service are combined
//! with [`MergeMode::Intersection`] (only what every deployed version
//! supports survives), and the per-service schemas are combined with
//! [`MergeMode::Union`] (the gateway splits queries among the services that
//! know each field). Overlapping types must be identical apart from
//! non-null modifiers: merged input types tighten to non-null if either
//! side requires a value, merged output types stay nullable unless both
//! sides rule null out.
//!
//! # Example
//!
//! ```ignore
//! use gale_federation::convert_schema;
//!
//! let schemas = services
//!     .iter()
//!     .map(|(name, payload)| Ok((name.clone(), serde_json::from_str(payload)?)))
//!     .collect::<Result<_, serde_json::Error>>()?;
//! let federated = convert_schema(schemas)?;
//! let info = &federated.fields[&some_field];
//! assert!(info.services.contains("users"));
//! ```

mod convert;
mod introspection;
mod merge;
mod schema;

pub use convert::{
    convert_schema, convert_versioned_schemas, FederatedSchema, FederationError, FieldInfo,
    FieldInfoMap, SchemaError, VersionedSchemas,
};
pub use introspection::{
    EnumValue, FieldDef, InputField, IntrospectionQueryResult, IntrospectionSchema, TypeDef,
    TypeKind, TypeRef,
};
pub use merge::{merge_schema_slice, merge_schemas, MergeError, MergeMode};
pub use schema::{EnumType, Field, FieldRef, InputObject, Object, Schema, Type, UnionType};
