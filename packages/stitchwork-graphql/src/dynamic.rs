use crate::schema::{TypeDef, TypeKind, UpstreamSchema, BUILTIN_SCALARS};
use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Interface,
    InterfaceField, Object, ResolverContext, Scalar, Schema as DynamicSchema,
    SchemaBuilder as DynamicSchemaBuilder, SchemaError, TypeRef, Union,
};
use async_graphql_parser::types::{BaseType, Type};

/// Convert a parsed GraphQL type into a dynamic [`TypeRef`].
///
/// Lists nested more than one level deep cannot be expressed as a [`TypeRef`].
pub fn type_ref(ty: &Type) -> Result<TypeRef, SchemaError> {
    let type_ref = match &ty.base {
        BaseType::Named(named_type) => {
            if ty.nullable {
                TypeRef::named(named_type.to_string())
            } else {
                TypeRef::named_nn(named_type.to_string())
            }
        }
        BaseType::List(list_type) => {
            let inner_base_type = match &list_type.base {
                BaseType::Named(name) => name.to_string(),
                BaseType::List(_) => {
                    return Err(SchemaError(format!(
                        "Nested list type `{ty}` is not supported"
                    )))
                }
            };
            let nullable_inner = list_type.nullable;

            if ty.nullable && nullable_inner {
                TypeRef::named_list(inner_base_type)
            } else if ty.nullable && !nullable_inner {
                TypeRef::named_nn_list(inner_base_type)
            } else if !ty.nullable && nullable_inner {
                TypeRef::named_list_nn(inner_base_type)
            } else {
                TypeRef::named_nn_list_nn(inner_base_type)
            }
        }
    };

    Ok(type_ref)
}

fn input_value(
    name: &str,
    ty: &Type,
    description: Option<&String>,
) -> Result<InputValue, SchemaError> {
    let value = InputValue::new(name, type_ref(ty)?);
    Ok(match description {
        Some(d) => value.description(d),
        None => value,
    })
}

// Introspection never resolves object fields, only the schema itself.
fn null_field(name: &str, ty: TypeRef) -> Field {
    Field::new(name, ty, |_ctx: ResolverContext| {
        FieldFuture::new(async move { Ok(Some(FieldValue::NULL)) })
    })
}

fn object(def: &TypeDef) -> Result<Object, SchemaError> {
    let mut obj = Object::new(def.name.as_str());
    if let Some(d) = &def.description {
        obj = obj.description(d);
    }

    for iface in &def.interfaces {
        obj = obj.implement(iface.as_str());
    }

    for field_def in def.fields.values() {
        let mut field = null_field(&field_def.name, type_ref(&field_def.ty)?);
        if let Some(d) = &field_def.description {
            field = field.description(d);
        }
        for arg in field_def.arguments.values() {
            field = field.argument(input_value(&arg.name, &arg.ty, arg.description.as_ref())?);
        }
        obj = obj.field(field);
    }

    Ok(obj)
}

fn interface(def: &TypeDef) -> Result<Interface, SchemaError> {
    let mut iface = Interface::new(def.name.as_str());
    if let Some(d) = &def.description {
        iface = iface.description(d);
    }

    for field_def in def.fields.values() {
        let mut field = InterfaceField::new(field_def.name.as_str(), type_ref(&field_def.ty)?);
        if let Some(d) = &field_def.description {
            field = field.description(d);
        }
        for arg in field_def.arguments.values() {
            field = field.argument(input_value(&arg.name, &arg.ty, arg.description.as_ref())?);
        }
        iface = iface.field(field);
    }

    Ok(iface)
}

/// Build an introspection-only dynamic schema over a set of upstream types.
///
/// The resulting schema answers `__schema` and `__type` queries so that tooling
/// sees derived fields next to the upstream ones. Data queries are never executed
/// against it.
pub fn build_introspection_schema(schema: &UpstreamSchema) -> Result<DynamicSchema, SchemaError> {
    let mut builder: DynamicSchemaBuilder =
        DynamicSchema::build(schema.query_type(), schema.mutation_type(), None)
            .introspection_only();

    for def in schema.types() {
        builder = match def.kind {
            // These types come pre-included in SchemaBuilder.
            TypeKind::Scalar if BUILTIN_SCALARS.contains(&def.name.as_str()) => builder,
            TypeKind::Scalar => {
                let mut scalar = Scalar::new(def.name.as_str());
                if let Some(d) = &def.description {
                    scalar = scalar.description(d);
                }
                builder.register(scalar)
            }
            TypeKind::Object => builder.register(object(def)?),
            TypeKind::Interface => builder.register(interface(def)?),
            TypeKind::Union => {
                let u = def
                    .possible_types
                    .iter()
                    .fold(Union::new(def.name.as_str()), |u, member| {
                        u.possible_type(member.as_str())
                    });
                builder.register(u)
            }
            TypeKind::Enum => {
                let e = def
                    .enum_values
                    .iter()
                    .fold(Enum::new(def.name.as_str()), |e, value| {
                        e.item(EnumItem::new(value.as_str()))
                    });
                builder.register(e)
            }
            TypeKind::InputObject => {
                let mut io = InputObject::new(def.name.as_str());
                for value in def.input_fields.values() {
                    io = io.field(input_value(
                        &value.name,
                        &value.ty,
                        value.description.as_ref(),
                    )?);
                }
                builder.register(io)
            }
        };
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GITHUB_SDL;

    #[test]
    fn test_type_ref_keeps_nullability() {
        for ty in ["Repository", "Repository!", "[Int]", "[Int!]", "[Int]!", "[Int!]!"] {
            let parsed = Type::new(ty).unwrap();
            assert_eq!(type_ref(&parsed).unwrap().to_string(), ty);
        }
    }

    #[test]
    fn test_type_ref_rejects_nested_lists() {
        let ty = Type::new("[[Int!]]!").unwrap();
        let err = type_ref(&ty).unwrap_err();
        assert!(err.0.contains("[[Int!]]!"));
    }

    #[tokio::test]
    async fn test_introspection_schema_exposes_upstream_types() {
        let schema = UpstreamSchema::from_sdl(GITHUB_SDL).unwrap();
        let dynamic = build_introspection_schema(&schema).unwrap();

        let sdl = dynamic.sdl();
        assert!(sdl.contains("type Organization"));
        assert!(sdl.contains("interface RepositoryOwner"));
        assert!(sdl.contains("enum RepositoryPrivacy"));

        let response = dynamic
            .execute(r#"{ __type(name: "Organization") { fields { name } } }"#)
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let json = response.data.into_json().unwrap();
        let names: Vec<&str> = json["__type"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|f| f["name"].as_str())
            .collect();
        assert!(names.contains(&"login"));
        assert!(names.contains(&"repositories"));
    }
}
