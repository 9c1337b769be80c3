use crate::{
    compute::{Aggregate, ComputeRegistry, FieldPath},
    merge::{merge, ComposedSchema, MergeResult},
    schema::UpstreamSchema,
    template::{TemplateError, TemplateRegistry},
};
use async_graphql_parser::{
    parse_schema,
    types::{Type, TypeKind, TypeSystemDefinition},
};
use serde::Deserialize;
use std::{fs::File, path::Path};
use thiserror::Error;

/// Result type returned by loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Error processing file: {0:?}")]
    FileError(#[from] std::io::Error),
    #[error("Error processing YAML manifest: {0:?}")]
    SerdeYamlError(#[from] serde_yaml::Error),
    #[error("Error parsing extension SDL: {0:?}")]
    ParseError(#[from] async_graphql_parser::Error),
    #[error("Unsupported extension definition `{definition}`: {reason}")]
    Unsupported {
        definition: String,
        reason: &'static str,
    },
    #[error("Template error: {0}")]
    TemplateError(#[from] TemplateError),
    #[error("Invalid compute path `{path}` for `{type_name}.{field_name}`")]
    InvalidPath {
        type_name: String,
        field_name: String,
        path: String,
    },
}

/// A field added to an existing upstream type.
#[derive(Debug, Clone)]
pub struct TypeExtension {
    pub type_name: String,
    pub field_name: String,
    pub ty: Type,
    pub description: Option<String>,
}

/// Parse `extend type` declarations from an SDL fragment.
///
/// Only object type extensions are accepted, and derived fields take no arguments.
pub fn parse_type_extensions(sdl: &str) -> LoaderResult<Vec<TypeExtension>> {
    let ast = parse_schema(sdl)?;
    let mut extensions = Vec::new();

    for def in ast.definitions {
        let typ = match def {
            TypeSystemDefinition::Type(t) => t.node,
            TypeSystemDefinition::Schema(_) => {
                return Err(LoaderError::Unsupported {
                    definition: "schema".to_string(),
                    reason: "schema definitions cannot be extended",
                })
            }
            TypeSystemDefinition::Directive(d) => {
                return Err(LoaderError::Unsupported {
                    definition: format!("@{}", d.node.name.node),
                    reason: "directive definitions are not supported",
                })
            }
        };

        let type_name = typ.name.node.to_string();
        if !typ.extend {
            return Err(LoaderError::Unsupported {
                definition: type_name,
                reason: "only `extend type` declarations are accepted",
            });
        }

        let obj = match typ.kind {
            TypeKind::Object(obj) => obj,
            _ => {
                return Err(LoaderError::Unsupported {
                    definition: type_name,
                    reason: "only object types can be extended",
                })
            }
        };

        if !obj.implements.is_empty() {
            return Err(LoaderError::Unsupported {
                definition: type_name,
                reason: "extensions cannot add interfaces",
            });
        }

        for field in obj.fields {
            let field = field.node;
            let field_name = field.name.node.to_string();
            if !field.arguments.is_empty() {
                return Err(LoaderError::Unsupported {
                    definition: format!("{type_name}.{field_name}"),
                    reason: "derived fields cannot take arguments",
                });
            }

            extensions.push(TypeExtension {
                type_name: type_name.clone(),
                field_name,
                ty: field.ty.node,
                description: field.description.map(|d| d.node),
            });
        }
    }

    Ok(extensions)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub selection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComputeDecl {
    pub aggregate: Aggregate,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDecl {
    #[serde(rename = "type")]
    pub type_name: String,
    pub field: String,
    pub template: String,
    /// Declarative aggregation. Fields without one need a compute function
    /// registered in code before the schema is composed.
    pub compute: Option<ComputeDecl>,
}

/// YAML document declaring derived fields, their templates and computations.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionManifest {
    pub schema: String,
    #[serde(default)]
    pub templates: Vec<TemplateDecl>,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl ExtensionManifest {
    pub fn from_file(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let file = File::open(path)?;
        let manifest: ExtensionManifest = serde_yaml::from_reader(file)?;
        Ok(manifest)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> LoaderResult<Self> {
        let manifest: ExtensionManifest = serde_yaml::from_str(yaml)?;
        Ok(manifest)
    }

    /// Parse the SDL and populate the template and compute registries.
    pub fn into_registries(self) -> LoaderResult<ExtensionSet> {
        let extensions = parse_type_extensions(&self.schema)?;

        let mut templates = TemplateRegistry::new();
        for decl in &self.templates {
            templates.register(&decl.type_name, &decl.name, &decl.selection)?;
        }

        let mut computes = ComputeRegistry::new();
        for decl in self.fields {
            templates.bind(&decl.type_name, &decl.field, &decl.template);

            if let Some(compute) = decl.compute {
                let path =
                    FieldPath::parse(&compute.path).ok_or_else(|| LoaderError::InvalidPath {
                        type_name: decl.type_name.clone(),
                        field_name: decl.field.clone(),
                        path: compute.path.clone(),
                    })?;
                computes.register_aggregate(
                    &decl.type_name,
                    &decl.field,
                    compute.aggregate,
                    path,
                );
            }
        }

        Ok(ExtensionSet {
            extensions,
            templates,
            computes,
        })
    }
}

/// Everything needed to compose an upstream schema with derived fields.
#[derive(Debug, Default)]
pub struct ExtensionSet {
    pub extensions: Vec<TypeExtension>,
    pub templates: TemplateRegistry,
    pub computes: ComputeRegistry,
}

impl ExtensionSet {
    pub fn from_manifest_file(path: impl AsRef<Path>) -> LoaderResult<Self> {
        ExtensionManifest::from_file(path)?.into_registries()
    }

    pub fn compose(&self, upstream: UpstreamSchema) -> MergeResult<ComposedSchema> {
        merge(upstream, &self.extensions, &self.templates, &self.computes)
    }
}
