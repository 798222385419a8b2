//! Realization and provenance tests: turning merged introspection data into
//! concrete schema objects and per-field service annotations.

use std::collections::BTreeMap;

use gale_federation::{
    convert_schema, convert_versioned_schemas, EnumValue, FieldDef, FieldRef, InputField,
    IntrospectionQueryResult, Type, TypeDef, TypeKind, TypeRef,
};

fn scalar_decl(name: &str) -> TypeDef {
    TypeDef::new(name, TypeKind::Scalar)
}

fn scalar(name: &str) -> TypeRef {
    TypeRef::named(TypeKind::Scalar, name)
}

fn field(name: &str, ty: TypeRef) -> FieldDef {
    FieldDef {
        name: name.into(),
        ty,
        args: Vec::new(),
    }
}

fn object(name: &str, fields: Vec<FieldDef>) -> TypeDef {
    TypeDef {
        fields,
        ..TypeDef::new(name, TypeKind::Object)
    }
}

fn one_service(types: Vec<TypeDef>) -> BTreeMap<String, IntrospectionQueryResult> {
    BTreeMap::from([("svc".to_string(), IntrospectionQueryResult::from_types(types))])
}

#[test]
fn realizes_objects_with_wired_fields_and_args() {
    let federated = convert_schema(one_service(vec![
        scalar_decl("Int"),
        scalar_decl("String"),
        object(
            "Query",
            vec![
                FieldDef {
                    name: "user".into(),
                    ty: TypeRef::named(TypeKind::Object, "User"),
                    args: vec![InputField {
                        name: "id".into(),
                        ty: TypeRef::non_null(scalar("Int")),
                    }],
                },
            ],
        ),
        object(
            "User",
            vec![
                field("id", TypeRef::non_null(scalar("Int"))),
                field("name", scalar("String")),
            ],
        ),
    ]))
    .unwrap();

    let Some(Type::Object(query)) = &federated.schema.query else {
        panic!("Query root is an object");
    };
    let user_field = &query.fields()["user"];
    assert_eq!(user_field.args["id"].to_string(), "Int!");

    let Type::Object(user) = &user_field.ty else {
        panic!("user field resolves to an object");
    };
    assert_eq!(user.name, "User");
    assert_eq!(user.fields()["name"].ty.to_string(), "String");
    assert!(federated.schema.mutation.is_none());
}

#[test]
fn realizes_unions_enums_and_input_objects() {
    let federated = convert_schema(one_service(vec![
        scalar_decl("String"),
        object("Cat", vec![field("meow", scalar("String"))]),
        object("Dog", vec![field("bark", scalar("String"))]),
        TypeDef {
            possible_types: vec![
                TypeRef::named(TypeKind::Object, "Cat"),
                TypeRef::named(TypeKind::Object, "Dog"),
            ],
            ..TypeDef::new("Pet", TypeKind::Union)
        },
        TypeDef {
            enum_values: vec![
                EnumValue { name: "RED".into() },
                EnumValue { name: "BLUE".into() },
            ],
            ..TypeDef::new("Color", TypeKind::Enum)
        },
        TypeDef {
            input_fields: vec![InputField {
                name: "color".into(),
                ty: TypeRef::named(TypeKind::Enum, "Color"),
            }],
            ..TypeDef::new("PetFilter", TypeKind::InputObject)
        },
        object(
            "Query",
            vec![
                FieldDef {
                    name: "pets".into(),
                    ty: TypeRef::list(TypeRef::named(TypeKind::Union, "Pet")),
                    args: vec![InputField {
                        name: "filter".into(),
                        ty: TypeRef::named(TypeKind::InputObject, "PetFilter"),
                    }],
                },
            ],
        ),
    ]))
    .unwrap();

    let Some(Type::Object(query)) = &federated.schema.query else {
        panic!("Query root is an object");
    };
    let pets = &query.fields()["pets"];
    assert_eq!(pets.ty.to_string(), "[Pet]");

    let Type::List(inner) = &pets.ty else {
        panic!("pets is a list");
    };
    let Type::Union(pet) = inner.as_ref() else {
        panic!("pets element is a union");
    };
    assert_eq!(
        pet.types().keys().collect::<Vec<_>>(),
        vec!["Cat", "Dog"]
    );

    let Type::InputObject(filter) = &pets.args["filter"] else {
        panic!("filter is an input object");
    };
    let Type::Enum(color) = &filter.input_fields()["color"] else {
        panic!("color is an enum");
    };
    assert_eq!(color.values(), ["RED", "BLUE"]);
    assert_eq!(color.reverse_map()["RED"], "RED");
}

#[test]
fn dangling_reference_fails() {
    let err = convert_schema(one_service(vec![object(
        "Query",
        vec![field("ghost", TypeRef::named(TypeKind::Object, "Missing"))],
    )]))
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("field ghost has bad type"));
    assert!(message.contains("type Missing not found among top-level types"));
}

#[test]
fn non_object_union_member_fails() {
    let err = convert_schema(one_service(vec![
        scalar_decl("String"),
        TypeDef {
            possible_types: vec![scalar("String")],
            ..TypeDef::new("Odd", TypeKind::Union)
        },
    ]))
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "type Odd has possible type that is not an object: String"
    );
}

#[test]
fn unknown_kind_fails_at_realization() {
    let err = convert_schema(one_service(vec![TypeDef::new("Iface", TypeKind::Unknown)]))
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown type kind UNKNOWN");
}

#[test]
fn provenance_records_every_contributing_service() {
    let ping = || {
        vec![
            scalar_decl("String"),
            object("Query", vec![field("ping", scalar("String"))]),
        ]
    };
    let schemas = BTreeMap::from([
        ("alpha".to_string(), IntrospectionQueryResult::from_types(ping())),
        ("beta".to_string(), IntrospectionQueryResult::from_types(ping())),
    ]);

    let federated = convert_schema(schemas).unwrap();
    let Some(Type::Object(query)) = &federated.schema.query else {
        panic!("Query root is an object");
    };
    let ping = FieldRef(query.fields()["ping"].clone());

    let info = &federated.fields[&ping];
    assert_eq!(
        info.services.iter().collect::<Vec<_>>(),
        vec!["alpha", "beta"]
    );
    // The representative service is deterministic: lexicographically first.
    assert_eq!(info.service, "alpha");
}

#[test]
fn provenance_splits_fields_by_resolving_service() {
    let schemas = BTreeMap::from([
        (
            "users".to_string(),
            IntrospectionQueryResult::from_types(vec![
                scalar_decl("String"),
                object("Query", vec![field("user", scalar("String"))]),
            ]),
        ),
        (
            "orders".to_string(),
            IntrospectionQueryResult::from_types(vec![
                scalar_decl("String"),
                object("Query", vec![field("order", scalar("String"))]),
            ]),
        ),
    ]);

    let federated = convert_schema(schemas).unwrap();
    let Some(Type::Object(query)) = &federated.schema.query else {
        panic!("Query root is an object");
    };

    let user = FieldRef(query.fields()["user"].clone());
    assert_eq!(
        federated.fields[&user].services.iter().collect::<Vec<_>>(),
        vec!["users"]
    );
    let order = FieldRef(query.fields()["order"].clone());
    assert_eq!(
        federated.fields[&order].services.iter().collect::<Vec<_>>(),
        vec!["orders"]
    );
}

#[test]
fn versions_intersect_before_services_union() {
    // Version v2 of "api" dropped `old`; only fields present in every
    // version survive. The second service contributes `extra`.
    let v1 = IntrospectionQueryResult::from_types(vec![
        scalar_decl("String"),
        object(
            "Query",
            vec![
                field("stable", scalar("String")),
                field("old", scalar("String")),
            ],
        ),
    ]);
    let v2 = IntrospectionQueryResult::from_types(vec![
        scalar_decl("String"),
        object("Query", vec![field("stable", scalar("String"))]),
    ]);
    let other = IntrospectionQueryResult::from_types(vec![
        scalar_decl("String"),
        object("Query", vec![field("extra", scalar("String"))]),
    ]);

    let schemas = BTreeMap::from([
        (
            "api".to_string(),
            BTreeMap::from([("v1".to_string(), v1), ("v2".to_string(), v2)]),
        ),
        (
            "other".to_string(),
            BTreeMap::from([("".to_string(), other)]),
        ),
    ]);

    let federated = convert_versioned_schemas(schemas).unwrap();
    let Some(Type::Object(query)) = &federated.schema.query else {
        panic!("Query root is an object");
    };
    let names: Vec<_> = query.fields().keys().collect();
    assert_eq!(names, vec!["extra", "stable"]);

    let stable = FieldRef(query.fields()["stable"].clone());
    assert_eq!(
        federated.fields[&stable].services.iter().collect::<Vec<_>>(),
        vec!["api"]
    );
}

#[test]
fn mutation_root_is_located_by_name() {
    let federated = convert_schema(one_service(vec![
        scalar_decl("String"),
        object("Query", vec![field("ping", scalar("String"))]),
        object("Mutation", vec![field("poke", scalar("String"))]),
    ]))
    .unwrap();

    let Some(Type::Object(mutation)) = &federated.schema.mutation else {
        panic!("Mutation root is an object");
    };
    assert!(mutation.fields().contains_key("poke"));
}
