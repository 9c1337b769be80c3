use crate::schema::{
    FieldDef, InputValueDef, TypeDef, TypeKind, UpstreamSchema, UpstreamSchemaError,
    UpstreamSchemaResult,
};
use async_graphql_parser::types::{BaseType, Type};
use async_graphql_value::Name;
use serde::Deserialize;
use serde_json::Value;

/// Standard introspection query sent to the upstream API.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types { ...FullType }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args { ...InputValue }
    type { ...TypeRef }
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) { name }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType { kind name }
            }
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum IntrospectionKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

#[derive(Debug, Deserialize)]
struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: IntrospectionSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
    query_type: NamedRef,
    mutation_type: Option<NamedRef>,
    subscription_type: Option<NamedRef>,
    types: Vec<FullType>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullType {
    kind: IntrospectionKind,
    name: String,
    description: Option<String>,
    fields: Option<Vec<IntrospectionField>>,
    input_fields: Option<Vec<IntrospectionInputValue>>,
    interfaces: Option<Vec<TypeRef>>,
    enum_values: Option<Vec<NamedRef>>,
    possible_types: Option<Vec<TypeRef>>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionField {
    name: String,
    description: Option<String>,
    #[serde(default)]
    args: Vec<IntrospectionInputValue>,
    #[serde(rename = "type")]
    ty: TypeRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionInputValue {
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    ty: TypeRef,
    default_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeRef {
    kind: IntrospectionKind,
    name: Option<String>,
    of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    fn to_type(&self) -> UpstreamSchemaResult<Type> {
        match self.kind {
            IntrospectionKind::NonNull => {
                let inner = self
                    .of_type
                    .as_ref()
                    .ok_or(UpstreamSchemaError::MalformedTypeRef("ofType"))?;
                let mut ty = inner.to_type()?;
                ty.nullable = false;
                Ok(ty)
            }
            IntrospectionKind::List => {
                let inner = self
                    .of_type
                    .as_ref()
                    .ok_or(UpstreamSchemaError::MalformedTypeRef("ofType"))?;
                Ok(Type {
                    base: BaseType::List(Box::new(inner.to_type()?)),
                    nullable: true,
                })
            }
            _ => {
                let name = self
                    .name
                    .as_ref()
                    .ok_or(UpstreamSchemaError::MalformedTypeRef("name"))?;
                Ok(Type {
                    base: BaseType::Named(Name::new(name)),
                    nullable: true,
                })
            }
        }
    }
}

fn input_value(value: IntrospectionInputValue) -> UpstreamSchemaResult<InputValueDef> {
    Ok(InputValueDef {
        ty: value.ty.to_type()?,
        name: value.name,
        description: value.description,
        default_value: value.default_value,
    })
}

fn type_def(full: FullType) -> UpstreamSchemaResult<Option<TypeDef>> {
    let kind = match full.kind {
        IntrospectionKind::Scalar => TypeKind::Scalar,
        IntrospectionKind::Object => TypeKind::Object,
        IntrospectionKind::Interface => TypeKind::Interface,
        IntrospectionKind::Union => TypeKind::Union,
        IntrospectionKind::Enum => TypeKind::Enum,
        IntrospectionKind::InputObject => TypeKind::InputObject,
        IntrospectionKind::List | IntrospectionKind::NonNull => return Ok(None),
    };

    let mut def = TypeDef::new(full.name, kind);
    def.description = full.description;

    for field in full.fields.unwrap_or_default() {
        let mut field_def = FieldDef::new(field.name, field.ty.to_type()?)
            .with_description(field.description);
        for arg in field.args {
            let arg = input_value(arg)?;
            field_def.arguments.insert(arg.name.clone(), arg);
        }
        def.fields.insert(field_def.name.clone(), field_def);
    }

    for value in full.input_fields.unwrap_or_default() {
        let value = input_value(value)?;
        def.input_fields.insert(value.name.clone(), value);
    }

    def.interfaces = full
        .interfaces
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| t.name)
        .collect();
    def.possible_types = full
        .possible_types
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| t.name)
        .collect();
    def.enum_values = full
        .enum_values
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.name)
        .collect();

    Ok(Some(def))
}

impl UpstreamSchema {
    /// Build a schema from the JSON result of [`INTROSPECTION_QUERY`].
    ///
    /// Accepts either the full response (`{"data": {"__schema": ...}}`) or
    /// only its `data` member. Introspection meta types (`__Type`, ...) are skipped.
    pub fn from_introspection(value: Value) -> UpstreamSchemaResult<Self> {
        let value = match value {
            Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };

        let data: IntrospectionData = serde_json::from_value(value)?;
        let IntrospectionSchema {
            query_type,
            mutation_type,
            subscription_type,
            types,
        } = data.schema;

        let mut schema = UpstreamSchema::new(query_type.name.clone());
        for full in types {
            if full.name.starts_with("__") {
                continue;
            }
            if let Some(def) = type_def(full)? {
                schema.insert_type(def);
            }
        }

        schema.set_root_types(
            query_type.name,
            mutation_type.map(|t| t.name),
            subscription_type.map(|t| t.name),
        )?;
        schema.link_possible_types();

        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "data": {
                "__schema": {
                    "queryType": { "name": "Query" },
                    "mutationType": null,
                    "subscriptionType": null,
                    "types": [
                        {
                            "kind": "OBJECT",
                            "name": "Query",
                            "description": null,
                            "fields": [{
                                "name": "organization",
                                "description": "Lookup an organization by login.",
                                "args": [{
                                    "name": "login",
                                    "description": null,
                                    "type": {
                                        "kind": "NON_NULL", "name": null,
                                        "ofType": { "kind": "SCALAR", "name": "String", "ofType": null }
                                    },
                                    "defaultValue": null
                                }],
                                "type": { "kind": "OBJECT", "name": "Organization", "ofType": null }
                            }],
                            "inputFields": null,
                            "interfaces": [],
                            "enumValues": null,
                            "possibleTypes": null
                        },
                        {
                            "kind": "OBJECT",
                            "name": "Organization",
                            "description": null,
                            "fields": [{
                                "name": "tags",
                                "description": null,
                                "args": [],
                                "type": {
                                    "kind": "NON_NULL", "name": null,
                                    "ofType": {
                                        "kind": "LIST", "name": null,
                                        "ofType": { "kind": "SCALAR", "name": "String", "ofType": null }
                                    }
                                }
                            }],
                            "inputFields": null,
                            "interfaces": [],
                            "enumValues": null,
                            "possibleTypes": null
                        },
                        {
                            "kind": "OBJECT",
                            "name": "__Type",
                            "description": null,
                            "fields": [],
                            "inputFields": null,
                            "interfaces": [],
                            "enumValues": null,
                            "possibleTypes": null
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_from_introspection_converts_type_refs() {
        let schema = UpstreamSchema::from_introspection(sample()).unwrap();

        let query = schema.type_def("Query").unwrap();
        let org_field = query.field("organization").unwrap();
        assert_eq!(org_field.ty.to_string(), "Organization");
        assert_eq!(org_field.arguments["login"].ty.to_string(), "String!");

        let tags = schema.type_def("Organization").unwrap().field("tags").unwrap();
        assert_eq!(tags.ty.to_string(), "[String]!");
    }

    #[test]
    fn test_from_introspection_skips_meta_types() {
        let schema = UpstreamSchema::from_introspection(sample()).unwrap();
        assert!(schema.type_def("__Type").is_none());
        assert!(schema.type_def("Int").is_some());
    }

    #[test]
    fn test_from_introspection_rejects_missing_schema() {
        let err = UpstreamSchema::from_introspection(json!({ "data": {} })).unwrap_err();
        assert!(matches!(err, UpstreamSchemaError::IntrospectionQueryError(_)));
    }
}
