use crate::{
    compute::{ComputeBinding, ComputeRegistry},
    dynamic::build_introspection_schema,
    loader::TypeExtension,
    query::plan::template_alias,
    schema::{named_type, FieldDef, TypeDef, TypeKind, UpstreamSchema},
    template::{TemplateField, TemplateRegistry},
};
use async_graphql::dynamic::{Schema as DynamicSchema, SchemaError};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use thiserror::Error;
use tracing::debug;

/// Result type returned by schema merging.
pub type MergeResult<T> = Result<T, MergeError>;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Unknown type `{0}`")]
    UnknownType(String),
    #[error("Type `{0}` is not an object type and cannot be extended")]
    NotExtensible(String),
    #[error("Field `{type_name}.{field_name}` is already defined")]
    FieldNameConflict {
        type_name: String,
        field_name: String,
    },
    #[error("No data-fetch template is bound to `{type_name}.{field_name}`")]
    TemplateNotFound {
        type_name: String,
        field_name: String,
    },
    #[error("No compute function is registered for `{type_name}.{field_name}`")]
    ComputeNotFound {
        type_name: String,
        field_name: String,
    },
    #[error("Template `{template}` is bound to `{type_name}.{field_name}`, which is not declared")]
    UndeclaredField {
        type_name: String,
        field_name: String,
        template: String,
    },
    #[error("Template `{template}` fetches from `{template_type}`, but is bound to a field of `{type_name}`")]
    TemplateTypeMismatch {
        template: String,
        template_type: String,
        type_name: String,
    },
    #[error("Template `{template}` does not fetch `{path}` read by `{type_name}.{field_name}`")]
    TemplatePathMissing {
        template: String,
        type_name: String,
        field_name: String,
        path: String,
    },
    #[error("Invalid template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },
    #[error("Template `{template}` response key `{key}` collides with field `{type_name}.{key}`")]
    TemplateFieldConflict {
        template: String,
        type_name: String,
        key: String,
    },
    #[error("Templates `{first}` and `{second}` are both fetched under the alias `{alias}`")]
    TemplateAliasConflict {
        alias: String,
        first: String,
        second: String,
    },
    #[error("Derived field `{type_name}.{field_name}` must return a scalar or enum, found `{ty}`")]
    NonLeafExtension {
        type_name: String,
        field_name: String,
        ty: String,
    },
    #[error("Could not build introspection schema: {0:?}")]
    DynamicSchema(#[from] SchemaError),
}

/// The upstream type system extended with derived fields.
pub struct ComposedSchema {
    types: UpstreamSchema,
    derived: HashMap<(String, String), Arc<ComputeBinding>>,
    introspection: DynamicSchema,
}

impl std::fmt::Debug for ComposedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedSchema")
            .field("query_type", &self.types.query_type())
            .field("derived", &self.derived.values().collect::<Vec<_>>())
            .finish()
    }
}

impl ComposedSchema {
    pub fn types(&self) -> &UpstreamSchema {
        &self.types
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.type_def(name)
    }

    pub fn query_type(&self) -> &str {
        self.types.query_type()
    }

    /// Field names of `type_name`, upstream fields first.
    pub fn field_names(&self, type_name: &str) -> Vec<&str> {
        self.type_def(type_name)
            .map(|def| def.fields.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn derived_field(&self, type_name: &str, field_name: &str) -> Option<&Arc<ComputeBinding>> {
        self.derived
            .get(&(type_name.to_string(), field_name.to_string()))
    }

    pub fn derived_fields(&self) -> impl Iterator<Item = &Arc<ComputeBinding>> {
        self.derived.values()
    }

    pub fn introspection_schema(&self) -> &DynamicSchema {
        &self.introspection
    }

    /// SDL of the composed schema.
    pub fn sdl(&self) -> String {
        self.introspection.sdl()
    }
}

/// Merge type extensions into an upstream schema.
///
/// Every extension must target an existing object type, must not redefine one of
/// its fields and must have both a data-fetch template and a compute function.
pub fn merge(
    upstream: UpstreamSchema,
    extensions: &[TypeExtension],
    templates: &TemplateRegistry,
    computes: &ComputeRegistry,
) -> MergeResult<ComposedSchema> {
    let mut types = upstream;
    let mut derived = HashMap::new();

    for ext in extensions {
        let binding = bind_extension(&types, ext, templates, computes)?;

        let def = types
            .type_def_mut(&ext.type_name)
            .ok_or_else(|| MergeError::UnknownType(ext.type_name.clone()))?;
        def.fields.insert(
            ext.field_name.clone(),
            FieldDef::new(ext.field_name.clone(), ext.ty.clone())
                .with_description(ext.description.clone()),
        );

        debug!(
            "Extended `{}` with derived field `{}` using template `{}`",
            ext.type_name, ext.field_name, binding.template.name
        );
        derived.insert(
            (ext.type_name.clone(), ext.field_name.clone()),
            Arc::new(binding),
        );
    }

    for ((type_name, field_name), template) in templates.bindings() {
        if !derived.contains_key(&(type_name.clone(), field_name.clone())) {
            return Err(MergeError::UndeclaredField {
                type_name: type_name.clone(),
                field_name: field_name.clone(),
                template: template.clone(),
            });
        }
    }

    // Templates of different types can meet under one abstract parent, so
    // spliced aliases must be unique across all of them.
    let mut aliases: HashMap<String, &str> = HashMap::new();
    let mut checked = HashSet::new();
    for binding in derived.values() {
        let template = &binding.template;
        if !checked.insert(template.name.as_str()) {
            continue;
        }

        let parent = types
            .type_def(&template.type_name)
            .ok_or_else(|| MergeError::UnknownType(template.type_name.clone()))?;
        for key in template.response_keys() {
            if parent.fields.contains_key(key) {
                return Err(MergeError::TemplateFieldConflict {
                    template: template.name.clone(),
                    type_name: parent.name.clone(),
                    key: key.to_string(),
                });
            }

            let alias = template_alias(&template.name, key);
            if let Some(first) = aliases.insert(alias.clone(), template.name.as_str()) {
                return Err(MergeError::TemplateAliasConflict {
                    alias,
                    first: first.to_string(),
                    second: template.name.clone(),
                });
            }
        }

        validate_selection(&types, &derived, &template.name, parent, &template.selection)?;
    }

    let introspection = build_introspection_schema(&types)?;

    Ok(ComposedSchema {
        types,
        derived,
        introspection,
    })
}

fn bind_extension(
    types: &UpstreamSchema,
    ext: &TypeExtension,
    templates: &TemplateRegistry,
    computes: &ComputeRegistry,
) -> MergeResult<ComputeBinding> {
    let TypeExtension {
        type_name,
        field_name,
        ty,
        ..
    } = ext;

    let def = types
        .type_def(type_name)
        .ok_or_else(|| MergeError::UnknownType(type_name.clone()))?;
    if def.kind != TypeKind::Object {
        return Err(MergeError::NotExtensible(type_name.clone()));
    }

    let return_type = named_type(ty);
    let return_def = types
        .type_def(return_type)
        .ok_or_else(|| MergeError::UnknownType(return_type.to_string()))?;
    if !return_def.is_leaf() {
        return Err(MergeError::NonLeafExtension {
            type_name: type_name.clone(),
            field_name: field_name.clone(),
            ty: ty.to_string(),
        });
    }

    if def.fields.contains_key(field_name) {
        return Err(MergeError::FieldNameConflict {
            type_name: type_name.clone(),
            field_name: field_name.clone(),
        });
    }

    let template =
        templates
            .lookup(type_name, field_name)
            .map_err(|_| MergeError::TemplateNotFound {
                type_name: type_name.clone(),
                field_name: field_name.clone(),
            })?;
    if &template.type_name != type_name {
        return Err(MergeError::TemplateTypeMismatch {
            template: template.name.clone(),
            template_type: template.type_name.clone(),
            type_name: type_name.clone(),
        });
    }

    let compute = computes
        .get(type_name, field_name)
        .ok_or_else(|| MergeError::ComputeNotFound {
            type_name: type_name.clone(),
            field_name: field_name.clone(),
        })?;

    for path in computes.reads(type_name, field_name) {
        let path = path.to_string();
        if !template.covers(&path) {
            return Err(MergeError::TemplatePathMissing {
                template: template.name.clone(),
                type_name: type_name.clone(),
                field_name: field_name.clone(),
                path,
            });
        }
    }

    Ok(ComputeBinding {
        type_name: type_name.clone(),
        field_name: field_name.clone(),
        template,
        compute,
    })
}

fn validate_selection(
    types: &UpstreamSchema,
    derived: &HashMap<(String, String), Arc<ComputeBinding>>,
    template: &str,
    parent: &TypeDef,
    fields: &[TemplateField],
) -> MergeResult<()> {
    let invalid = |reason: String| MergeError::InvalidTemplate {
        template: template.to_string(),
        reason,
    };

    for field in fields {
        if field.name == "__typename" {
            if !field.is_leaf() {
                return Err(invalid("`__typename` cannot have a selection".to_string()));
            }
            continue;
        }

        if derived.contains_key(&(parent.name.clone(), field.name.clone())) {
            return Err(invalid(format!(
                "derived field `{}.{}` cannot be fetched",
                parent.name, field.name
            )));
        }

        let field_def = parent.field(&field.name).ok_or_else(|| {
            invalid(format!("`{}` has no field `{}`", parent.name, field.name))
        })?;

        for (arg, _) in &field.arguments {
            if !field_def.arguments.contains_key(arg) {
                return Err(invalid(format!(
                    "`{}.{}` has no argument `{arg}`",
                    parent.name, field.name
                )));
            }
        }

        let child_name = named_type(&field_def.ty);
        let child = types
            .type_def(child_name)
            .ok_or_else(|| MergeError::UnknownType(child_name.to_string()))?;

        match (child.is_composite(), field.is_leaf()) {
            (true, true) => {
                return Err(invalid(format!(
                    "`{}.{}` of type `{child_name}` requires a selection",
                    parent.name, field.name
                )))
            }
            (false, false) => {
                return Err(invalid(format!(
                    "`{}.{}` of type `{child_name}` cannot have a selection",
                    parent.name, field.name
                )))
            }
            (true, false) => {
                validate_selection(types, derived, template, child, &field.selection)?
            }
            (false, true) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compute::{Aggregate, FieldPath},
        loader::{parse_type_extensions, ExtensionManifest},
        testing::{GITHUB_SDL, STARGAZER_MANIFEST},
    };
    use assert_matches::assert_matches;

    const REPO_STARS: &str =
        "repos: repositories(first: 100) { nodes { stargazers { totalCount } } }";

    fn upstream() -> UpstreamSchema {
        UpstreamSchema::from_sdl(GITHUB_SDL).unwrap()
    }

    fn stars_registries(fields: &[&str]) -> (TemplateRegistry, ComputeRegistry) {
        let mut templates = TemplateRegistry::new();
        templates
            .register("Organization", "repo_stars", REPO_STARS)
            .unwrap();

        let mut computes = ComputeRegistry::new();
        for field in fields {
            templates.bind("Organization", field, "repo_stars");
            computes.register_aggregate(
                "Organization",
                field,
                Aggregate::Sum,
                FieldPath::parse("repos.nodes.stargazers.totalCount").unwrap(),
            );
        }

        (templates, computes)
    }

    #[test]
    fn test_merged_field_set_is_union() {
        let upstream_fields: Vec<String> = upstream()
            .type_def("Organization")
            .unwrap()
            .fields
            .keys()
            .cloned()
            .collect();

        let composed = ExtensionManifest::from_str(STARGAZER_MANIFEST)
            .unwrap()
            .into_registries()
            .unwrap()
            .compose(upstream())
            .unwrap();

        let mut expected = upstream_fields;
        expected.push("countSum".to_string());
        expected.push("countMax".to_string());

        assert_eq!(composed.field_names("Organization"), expected);
        assert!(composed.derived_field("Organization", "countSum").is_some());
        assert!(composed.derived_field("Organization", "login").is_none());
        assert!(composed.sdl().contains("countSum: Int"));
    }

    #[test]
    fn test_field_name_conflict() {
        let extensions =
            parse_type_extensions("extend type Organization { login: String }").unwrap();
        let (templates, computes) = stars_registries(&["login"]);

        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::FieldNameConflict { type_name, field_name })
                if type_name == "Organization" && field_name == "login"
        );
    }

    #[test]
    fn test_duplicate_extension_conflicts() {
        let extensions = parse_type_extensions(
            "extend type Organization { countSum: Int } extend type Organization { countSum: Int }",
        )
        .unwrap();
        let (templates, computes) = stars_registries(&["countSum"]);

        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::FieldNameConflict { .. })
        );
    }

    #[test]
    fn test_unknown_type() {
        let extensions = parse_type_extensions("extend type Enterprise { countSum: Int }").unwrap();
        let (templates, computes) = stars_registries(&[]);

        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::UnknownType(name)) if name == "Enterprise"
        );

        let extensions =
            parse_type_extensions("extend type Organization { countSum: BigInt }").unwrap();
        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::UnknownType(name)) if name == "BigInt"
        );
    }

    #[test]
    fn test_missing_template_and_compute() {
        let extensions =
            parse_type_extensions("extend type Organization { countSum: Int }").unwrap();

        let (templates, computes) = stars_registries(&[]);
        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::TemplateNotFound { field_name, .. }) if field_name == "countSum"
        );

        let (mut templates, computes) = stars_registries(&[]);
        templates.bind("Organization", "countSum", "repo_stars");
        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::ComputeNotFound { .. })
        );
    }

    #[test]
    fn test_binding_without_declaration() {
        let extensions =
            parse_type_extensions("extend type Organization { countSum: Int }").unwrap();
        let (templates, computes) = stars_registries(&["countSum", "countMax"]);

        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::UndeclaredField { field_name, .. }) if field_name == "countMax"
        );
    }

    #[test]
    fn test_non_leaf_and_non_object_extensions() {
        let (templates, computes) = stars_registries(&["countSum"]);

        let extensions =
            parse_type_extensions("extend type Organization { countSum: Repository }").unwrap();
        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::NonLeafExtension { .. })
        );

        let extensions =
            parse_type_extensions("extend type RepositoryOwner { countSum: Int }").unwrap();
        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::NotExtensible(name)) if name == "RepositoryOwner"
        );
    }

    #[test]
    fn test_template_validation() {
        let extensions =
            parse_type_extensions("extend type Organization { countSum: Int }").unwrap();
        let path = FieldPath::parse("repos.totalCount").unwrap();

        let cases = [
            "repos: repositories(first: 100) { totalCount bogus }",
            "repos: repositories(last: 100) { totalCount }",
            "repos: repositories(first: 100)",
            "repos: repositories(first: 100) { totalCount nodes }",
        ];

        for selection in cases {
            let mut templates = TemplateRegistry::new();
            templates.register("Organization", "t", selection).unwrap();
            templates.bind("Organization", "countSum", "t");
            let mut computes = ComputeRegistry::new();
            computes.register_aggregate("Organization", "countSum", Aggregate::Sum, path.clone());

            let result = merge(upstream(), &extensions, &templates, &computes);
            match selection {
                // The path is not reachable, which is detected first.
                "repos: repositories(first: 100)" => {
                    assert_matches!(result, Err(MergeError::TemplatePathMissing { .. }))
                }
                _ => assert_matches!(result, Err(MergeError::InvalidTemplate { .. })),
            }
        }
    }

    #[test]
    fn test_template_key_conflicts_with_field() {
        let extensions =
            parse_type_extensions("extend type Organization { countSum: Int }").unwrap();

        let mut templates = TemplateRegistry::new();
        templates
            .register(
                "Organization",
                "t",
                "repositories(first: 100) { nodes { stargazers { totalCount } } }",
            )
            .unwrap();
        templates.bind("Organization", "countSum", "t");
        let mut computes = ComputeRegistry::new();
        computes.register_aggregate(
            "Organization",
            "countSum",
            Aggregate::Sum,
            FieldPath::parse("repositories.nodes.stargazers.totalCount").unwrap(),
        );

        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::TemplateFieldConflict { key, .. }) if key == "repositories"
        );
    }

    #[test]
    fn test_template_type_mismatch() {
        let extensions = parse_type_extensions("extend type User { countSum: Int }").unwrap();
        let (mut templates, mut computes) = stars_registries(&[]);
        templates.bind("User", "countSum", "repo_stars");
        computes.register("User", "countSum", |_| Ok(serde_json::json!(0)));

        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::TemplateTypeMismatch { .. })
        );
    }

    #[test]
    fn test_template_aliases_must_be_unique() {
        let extensions = parse_type_extensions(
            "extend type Organization { repoTotal: Int firstTotal: Int }",
        )
        .unwrap();

        let mut templates = TemplateRegistry::new();
        templates
            .register("Organization", "repo", "x_y: repositories(first: 1) { totalCount }")
            .unwrap();
        templates
            .register("Organization", "repo_x", "y: repositories(first: 100) { totalCount }")
            .unwrap();
        templates.bind("Organization", "firstTotal", "repo");
        templates.bind("Organization", "repoTotal", "repo_x");

        let mut computes = ComputeRegistry::new();
        computes.register_aggregate(
            "Organization",
            "firstTotal",
            Aggregate::Sum,
            FieldPath::parse("x_y.totalCount").unwrap(),
        );
        computes.register_aggregate(
            "Organization",
            "repoTotal",
            Aggregate::Sum,
            FieldPath::parse("y.totalCount").unwrap(),
        );

        assert_matches!(
            merge(upstream(), &extensions, &templates, &computes),
            Err(MergeError::TemplateAliasConflict { alias, first, second })
                if alias == "_stitch_repo_x_y" && first != second
        );

        // Distinct aliases compose.
        let mut templates = TemplateRegistry::new();
        templates
            .register("Organization", "repo", "x_y: repositories(first: 1) { totalCount }")
            .unwrap();
        templates
            .register("Organization", "repo_x", "z: repositories(first: 100) { totalCount }")
            .unwrap();
        templates.bind("Organization", "firstTotal", "repo");
        templates.bind("Organization", "repoTotal", "repo_x");
        computes.register_aggregate(
            "Organization",
            "repoTotal",
            Aggregate::Sum,
            FieldPath::parse("z.totalCount").unwrap(),
        );

        assert!(merge(upstream(), &extensions, &templates, &computes).is_ok());
    }
}
