use async_graphql_parser::{
    parse_schema,
    types::{
        BaseType, FieldDefinition, InputValueDefinition, Type, TypeDefinition,
        TypeKind as SdlTypeKind, TypeSystemDefinition,
    },
    Positioned,
};
use indexmap::IndexMap;
use thiserror::Error;

/// Scalars every GraphQL schema provides without declaring them.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Result type returned by upstream schema operations.
pub type UpstreamSchemaResult<T> = Result<T, UpstreamSchemaError>;

/// Error type returned when an upstream schema cannot be loaded.
#[derive(Debug, Error)]
pub enum UpstreamSchemaError {
    #[error("GraphQL parser error: {0:?}")]
    ParseError(#[from] async_graphql_parser::Error),
    #[error("Could not parse introspection response: {0:?}")]
    IntrospectionQueryError(#[from] serde_json::Error),
    #[error("Introspection type reference is missing `{0}`")]
    MalformedTypeRef(&'static str),
    #[error("Root operation type `{0}` is not defined")]
    UnknownRootType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

/// An argument or input object field.
#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: Type,
    /// Default value in GraphQL literal syntax.
    pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: Type,
    pub arguments: IndexMap<String, InputValueDef>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// Output fields of objects and interfaces.
    pub fields: IndexMap<String, FieldDef>,
    /// Fields of input objects.
    pub input_fields: IndexMap<String, InputValueDef>,
    /// Interfaces implemented by an object.
    pub interfaces: Vec<String>,
    /// Members of a union, or implementors of an interface.
    pub possible_types: Vec<String>,
    pub enum_values: Vec<String>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            fields: IndexMap::new(),
            input_fields: IndexMap::new(),
            interfaces: Vec::new(),
            possible_types: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Union)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar | TypeKind::Enum)
    }

    /// Whether a selection set can be applied to values of this type.
    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Object | TypeKind::Interface | TypeKind::Union
        )
    }
}

/// The type system of the upstream GraphQL API.
#[derive(Debug, Clone)]
pub struct UpstreamSchema {
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: IndexMap<String, TypeDef>,
}

impl Default for UpstreamSchema {
    fn default() -> Self {
        Self::new("Query")
    }
}

impl UpstreamSchema {
    pub fn new(query_type: impl Into<String>) -> Self {
        let types = BUILTIN_SCALARS
            .iter()
            .map(|name| (name.to_string(), TypeDef::new(*name, TypeKind::Scalar)))
            .collect();

        Self {
            query_type: query_type.into(),
            mutation_type: None,
            subscription_type: None,
            types,
        }
    }

    /// Load a schema from SDL text.
    pub fn from_sdl(sdl: &str) -> UpstreamSchemaResult<Self> {
        let ast = parse_schema(sdl)?;

        let mut schema = UpstreamSchema::default();
        let mut roots = (None, None, None);

        for def in ast.definitions {
            match def {
                TypeSystemDefinition::Schema(schema_def) => {
                    let schema_def = schema_def.node;
                    roots = (
                        schema_def.query.map(|n| n.node.to_string()),
                        schema_def.mutation.map(|n| n.node.to_string()),
                        schema_def.subscription.map(|n| n.node.to_string()),
                    );
                }
                TypeSystemDefinition::Type(typ) => schema.add_type_definition(typ.node),
                TypeSystemDefinition::Directive(_) => {}
            }
        }

        let (query, mutation, subscription) = roots;
        let conventional = |name: &str| schema.types.contains_key(name).then(|| name.to_string());

        let query = query.unwrap_or_else(|| "Query".to_string());
        let mutation = mutation.or_else(|| conventional("Mutation"));
        let subscription = subscription.or_else(|| conventional("Subscription"));

        schema.set_root_types(query, mutation, subscription)?;
        schema.link_possible_types();

        Ok(schema)
    }

    pub fn set_root_types(
        &mut self,
        query: String,
        mutation: Option<String>,
        subscription: Option<String>,
    ) -> UpstreamSchemaResult<()> {
        for name in std::iter::once(&query).chain(&mutation).chain(&subscription) {
            if !self.types.contains_key(name) {
                return Err(UpstreamSchemaError::UnknownRootType(name.clone()));
            }
        }

        self.query_type = query;
        self.mutation_type = mutation;
        self.subscription_type = subscription;

        Ok(())
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> Option<&str> {
        self.mutation_type.as_deref()
    }

    pub fn subscription_type(&self) -> Option<&str> {
        self.subscription_type.as_deref()
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub(crate) fn type_def_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.types.get_mut(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn insert_type(&mut self, def: TypeDef) {
        self.types.insert(def.name.clone(), def);
    }

    /// Whether an object of type `object` satisfies the type condition `condition`.
    pub fn is_possible_type(&self, condition: &str, object: &str) -> bool {
        if condition == object {
            return true;
        }

        self.type_def(condition)
            .map(|def| def.is_abstract() && def.possible_types.iter().any(|t| t == object))
            .unwrap_or(false)
    }

    /// Recompute interface implementors from the objects' `implements` lists.
    pub(crate) fn link_possible_types(&mut self) {
        let implementations: Vec<(String, String)> = self
            .types
            .values()
            .filter(|def| def.kind == TypeKind::Object)
            .flat_map(|def| {
                def.interfaces
                    .iter()
                    .map(move |iface| (iface.clone(), def.name.clone()))
            })
            .collect();

        for (iface, object) in implementations {
            if let Some(def) = self.types.get_mut(&iface) {
                if def.kind == TypeKind::Interface && !def.possible_types.contains(&object) {
                    def.possible_types.push(object);
                }
            }
        }
    }

    fn add_type_definition(&mut self, typ: TypeDefinition) {
        let name = typ.name.node.to_string();
        let description = typ.description.map(|d| d.node);

        let kind = match &typ.kind {
            SdlTypeKind::Scalar => TypeKind::Scalar,
            SdlTypeKind::Object(_) => TypeKind::Object,
            SdlTypeKind::Interface(_) => TypeKind::Interface,
            SdlTypeKind::Union(_) => TypeKind::Union,
            SdlTypeKind::Enum(_) => TypeKind::Enum,
            SdlTypeKind::InputObject(_) => TypeKind::InputObject,
        };

        // `extend type` adds to a previous definition; a bare extension defines the type.
        let def = self
            .types
            .entry(name.clone())
            .or_insert_with(|| TypeDef::new(name, kind));
        if !typ.extend || def.description.is_none() {
            def.description = description.or(def.description.take());
        }

        match typ.kind {
            SdlTypeKind::Scalar => {}
            SdlTypeKind::Object(obj) => {
                def.interfaces
                    .extend(obj.implements.into_iter().map(|i| i.node.to_string()));
                for field in obj.fields {
                    let field = field_def(field);
                    def.fields.insert(field.name.clone(), field);
                }
            }
            SdlTypeKind::Interface(iface) => {
                for field in iface.fields {
                    let field = field_def(field);
                    def.fields.insert(field.name.clone(), field);
                }
            }
            SdlTypeKind::Union(u) => {
                def.possible_types
                    .extend(u.members.into_iter().map(|m| m.node.to_string()));
            }
            SdlTypeKind::Enum(e) => {
                def.enum_values
                    .extend(e.values.into_iter().map(|v| v.node.value.node.to_string()));
            }
            SdlTypeKind::InputObject(io) => {
                for field in io.fields {
                    let value = input_value_def(field);
                    def.input_fields.insert(value.name.clone(), value);
                }
            }
        }
    }
}

fn field_def(field: Positioned<FieldDefinition>) -> FieldDef {
    let field = field.node;
    FieldDef {
        name: field.name.node.to_string(),
        description: field.description.map(|d| d.node),
        ty: field.ty.node,
        arguments: field
            .arguments
            .into_iter()
            .map(|arg| {
                let arg = input_value_def(arg);
                (arg.name.clone(), arg)
            })
            .collect(),
    }
}

fn input_value_def(value: Positioned<InputValueDefinition>) -> InputValueDef {
    let value = value.node;
    InputValueDef {
        name: value.name.node.to_string(),
        description: value.description.map(|d| d.node),
        ty: value.ty.node,
        default_value: value.default_value.map(|v| v.node.to_string()),
    }
}

/// Name of the innermost named type, e.g. `Repository` for `[Repository!]!`.
pub fn named_type(ty: &Type) -> &str {
    match &ty.base {
        BaseType::Named(name) => name.as_str(),
        BaseType::List(inner) => named_type(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GITHUB_SDL;

    #[test]
    fn test_from_sdl_collects_types_and_roots() {
        let schema = UpstreamSchema::from_sdl(GITHUB_SDL).unwrap();

        assert_eq!(schema.query_type(), "Query");
        assert_eq!(schema.mutation_type(), Some("Mutation"));
        assert_eq!(schema.subscription_type(), None);

        let org = schema.type_def("Organization").unwrap();
        assert_eq!(org.kind, TypeKind::Object);
        assert!(org.field("repositories").is_some());
        assert_eq!(
            org.field("repositories").unwrap().ty.to_string(),
            "RepositoryConnection!"
        );
        assert!(org.field("repositories").unwrap().arguments.contains_key("first"));

        assert!(schema.type_def("String").unwrap().is_leaf());
    }

    #[test]
    fn test_interface_possible_types_are_linked() {
        let schema = UpstreamSchema::from_sdl(GITHUB_SDL).unwrap();

        let owner = schema.type_def("RepositoryOwner").unwrap();
        assert!(owner.is_abstract());
        assert!(owner.possible_types.contains(&"Organization".to_string()));
        assert!(owner.possible_types.contains(&"User".to_string()));

        assert!(schema.is_possible_type("RepositoryOwner", "User"));
        assert!(schema.is_possible_type("Organization", "Organization"));
        assert!(!schema.is_possible_type("Organization", "User"));
    }

    #[test]
    fn test_unknown_root_type_is_rejected() {
        let sdl = "schema { query: Root } type Query { a: Int }";
        let err = UpstreamSchema::from_sdl(sdl).unwrap_err();
        assert!(matches!(err, UpstreamSchemaError::UnknownRootType(name) if name == "Root"));
    }

    #[test]
    fn test_named_type_unwraps_lists() {
        let ty = Type::new("[Repository!]!").unwrap();
        assert_eq!(named_type(&ty), "Repository");
    }
}
