use async_graphql_parser::{
    parse_query,
    types::{DocumentOperations, Selection, SelectionSet},
    Positioned,
};
use async_graphql_value::ConstValue;
use indexmap::IndexMap;
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;

/// Result type returned by template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Could not parse selection of template `{template}`: {source:?}")]
    Parse {
        template: String,
        #[source]
        source: async_graphql_parser::Error,
    },
    #[error("Template name `{0}` may only contain ASCII letters, digits and underscores")]
    InvalidName(String),
    #[error("Template `{template}` uses {feature}, which is not supported in templates")]
    Unsupported {
        template: String,
        feature: &'static str,
    },
    #[error("Template `{0}` has an empty selection")]
    Empty(String),
    #[error("Template `{template}` selects response key `{key}` more than once")]
    DuplicateKey { template: String, key: String },
    #[error("Template `{0}` is already registered")]
    DuplicateTemplate(String),
    #[error("No data-fetch template is bound to `{type_name}.{field_name}`")]
    NotFound {
        type_name: String,
        field_name: String,
    },
}

/// One field of a data-fetch template selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateField {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, ConstValue)>,
    pub selection: Vec<TemplateField>,
}

impl TemplateField {
    /// Key under which this field appears in a response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_leaf(&self) -> bool {
        self.selection.is_empty()
    }
}

/// A named selection tree fetched from the upstream for each parent object
/// of `type_name` on which a derived field is requested.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFetchTemplate {
    pub name: String,
    pub type_name: String,
    pub selection: Vec<TemplateField>,
}

impl DataFetchTemplate {
    /// Parse a template from GraphQL selection text, without the outer braces.
    pub fn parse(
        name: impl Into<String>,
        type_name: impl Into<String>,
        selection: &str,
    ) -> TemplateResult<Self> {
        let name = name.into();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(TemplateError::InvalidName(name));
        }

        let doc = parse_query(format!("{{ {selection} }}")).map_err(|source| {
            TemplateError::Parse {
                template: name.clone(),
                source,
            }
        })?;

        if !doc.fragments.is_empty() {
            return Err(TemplateError::Unsupported {
                template: name,
                feature: "fragment definitions",
            });
        }

        let op = match doc.operations {
            DocumentOperations::Single(op) => op.node,
            DocumentOperations::Multiple(_) => {
                return Err(TemplateError::Unsupported {
                    template: name,
                    feature: "multiple operations",
                })
            }
        };

        let selection = convert_selection_set(&name, op.selection_set)?;
        if selection.is_empty() {
            return Err(TemplateError::Empty(name));
        }

        Ok(Self {
            name,
            type_name: type_name.into(),
            selection,
        })
    }

    /// Top-level response keys, in declaration order.
    pub fn response_keys(&self) -> impl Iterator<Item = &str> {
        self.selection.iter().map(|f| f.response_key())
    }

    /// Whether the dotted response-key path `path` reaches a leaf of this template.
    pub fn covers(&self, path: &str) -> bool {
        let mut fields = &self.selection;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let Some(field) = fields.iter().find(|f| f.response_key() == segment) else {
                return false;
            };

            if segments.peek().is_none() {
                return field.is_leaf();
            }
            fields = &field.selection;
        }

        false
    }
}

fn convert_selection_set(
    template: &str,
    set: Positioned<SelectionSet>,
) -> TemplateResult<Vec<TemplateField>> {
    let mut fields = Vec::with_capacity(set.node.items.len());
    let mut keys = HashSet::new();

    for item in set.node.items {
        let field = match item.node {
            Selection::Field(f) => f.node,
            Selection::FragmentSpread(_) | Selection::InlineFragment(_) => {
                return Err(TemplateError::Unsupported {
                    template: template.to_string(),
                    feature: "fragments",
                })
            }
        };

        if !field.directives.is_empty() {
            return Err(TemplateError::Unsupported {
                template: template.to_string(),
                feature: "directives",
            });
        }

        let mut arguments = Vec::with_capacity(field.arguments.len());
        for (arg_name, value) in field.arguments {
            let value = value
                .node
                .into_const()
                .ok_or_else(|| TemplateError::Unsupported {
                    template: template.to_string(),
                    feature: "variables",
                })?;
            arguments.push((arg_name.node.to_string(), value));
        }

        let converted = TemplateField {
            alias: field.alias.map(|a| a.node.to_string()),
            name: field.name.node.to_string(),
            arguments,
            selection: convert_selection_set(template, field.selection_set)?,
        };

        if !keys.insert(converted.response_key().to_string()) {
            return Err(TemplateError::DuplicateKey {
                template: template.to_string(),
                key: converted.response_key().to_string(),
            });
        }

        fields.push(converted);
    }

    Ok(fields)
}

/// Named templates and the derived fields bound to them.
#[derive(Debug, Default, Clone)]
pub struct TemplateRegistry {
    templates: IndexMap<String, Arc<DataFetchTemplate>>,
    bindings: IndexMap<(String, String), String>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a template for objects of `type_name`.
    pub fn register(
        &mut self,
        type_name: &str,
        template_name: &str,
        selection: &str,
    ) -> TemplateResult<Arc<DataFetchTemplate>> {
        if self.templates.contains_key(template_name) {
            return Err(TemplateError::DuplicateTemplate(template_name.to_string()));
        }

        let template = Arc::new(DataFetchTemplate::parse(
            template_name,
            type_name,
            selection,
        )?);
        self.templates
            .insert(template_name.to_string(), template.clone());

        Ok(template)
    }

    /// Bind a derived field to a template by name. The template is resolved on lookup.
    pub fn bind(&mut self, type_name: &str, field_name: &str, template_name: &str) {
        self.bindings.insert(
            (type_name.to_string(), field_name.to_string()),
            template_name.to_string(),
        );
    }

    pub fn get(&self, template_name: &str) -> Option<Arc<DataFetchTemplate>> {
        self.templates.get(template_name).cloned()
    }

    /// Name of the template bound to `type_name.field_name`, if any.
    pub fn binding(&self, type_name: &str, field_name: &str) -> Option<&str> {
        self.bindings
            .get(&(type_name.to_string(), field_name.to_string()))
            .map(String::as_str)
    }

    pub fn lookup(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> TemplateResult<Arc<DataFetchTemplate>> {
        self.binding(type_name, field_name)
            .and_then(|name| self.get(name))
            .ok_or_else(|| TemplateError::NotFound {
                type_name: type_name.to_string(),
                field_name: field_name.to_string(),
            })
    }

    /// Bound fields as `((type_name, field_name), template_name)`.
    pub fn bindings(&self) -> impl Iterator<Item = (&(String, String), &String)> {
        self.bindings.iter()
    }

    pub fn templates(&self) -> impl Iterator<Item = &Arc<DataFetchTemplate>> {
        self.templates.values()
    }
}
