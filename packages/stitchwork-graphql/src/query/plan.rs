use crate::{
    compute::ComputeBinding,
    merge::ComposedSchema,
    response::{ExecutionError, GraphQLRequest},
    schema::{named_type, TypeDef, TypeKind, UpstreamSchema},
    template::DataFetchTemplate,
};
use async_graphql_parser::{
    types::{
        BaseType, Directive, DocumentOperations, ExecutableDocument, Field, FragmentDefinition,
        OperationDefinition, OperationType, Selection, SelectionSet, Type,
    },
    Positioned,
};
use async_graphql_value::{ConstValue, Name, Value};
use std::{collections::HashMap, convert::Infallible, sync::Arc};

/// Prefix of every response key added to a forwarded query.
pub(crate) const RESERVED_PREFIX: &str = "_stitch_";
pub(crate) const TYPENAME_ALIAS: &str = "_stitch_typename";

/// Alias under which a template's top-level field `key` is fetched.
pub(crate) fn template_alias(template: &str, key: &str) -> String {
    format!("{RESERVED_PREFIX}{template}_{key}")
}

#[derive(Debug)]
pub(crate) enum Planned {
    /// Only `__schema` / `__type` were requested.
    Introspection,
    Forward(OperationPlan),
}

#[derive(Debug)]
pub(crate) struct OperationPlan {
    pub ty: OperationType,
    pub name: Option<String>,
    pub selection: SelectionPlan,
}

#[derive(Debug)]
pub(crate) struct TemplateFetch {
    pub conditions: Vec<String>,
    pub template: Arc<DataFetchTemplate>,
}

#[derive(Debug)]
pub(crate) enum PlannedKind {
    Upstream {
        name: String,
        arguments: Vec<(String, ConstValue)>,
        selection: Option<SelectionPlan>,
    },
    Derived(Arc<ComputeBinding>),
}

#[derive(Debug)]
pub(crate) struct PlannedField {
    pub response_key: String,
    /// Type conditions that the runtime type of the parent must satisfy.
    pub conditions: Vec<String>,
    pub ty: Type,
    pub kind: PlannedKind,
}

/// The fields requested on one object, plus the template data they need.
#[derive(Debug)]
pub(crate) struct SelectionPlan {
    pub parent_type: String,
    pub is_abstract: bool,
    pub fields: Vec<PlannedField>,
    pub templates: Vec<TemplateFetch>,
}

impl SelectionPlan {
    fn new(parent: &TypeDef) -> Self {
        Self {
            parent_type: parent.name.clone(),
            is_abstract: parent.is_abstract(),
            fields: Vec::new(),
            templates: Vec::new(),
        }
    }

    /// Whether `__typename` must be fetched to evaluate type conditions.
    pub fn needs_typename(&self) -> bool {
        self.is_abstract
            && (self.fields.iter().any(|f| !f.conditions.is_empty())
                || self.templates.iter().any(|t| !t.conditions.is_empty()))
    }

    fn push(&mut self, field: PlannedField) -> Result<(), ExecutionError> {
        let existing = self
            .fields
            .iter_mut()
            .find(|f| f.response_key == field.response_key && f.conditions == field.conditions);

        let Some(existing) = existing else {
            self.fields.push(field);
            return Ok(());
        };

        match (&mut existing.kind, field.kind) {
            (
                PlannedKind::Upstream {
                    name,
                    arguments,
                    selection,
                },
                PlannedKind::Upstream {
                    name: other_name,
                    arguments: other_arguments,
                    selection: other_selection,
                },
            ) if *name == other_name && *arguments == other_arguments => {
                if let (Some(selection), Some(other)) = (selection.as_mut(), other_selection) {
                    for f in other.fields {
                        selection.push(f)?;
                    }
                    for t in other.templates {
                        selection.push_template(&t.conditions, t.template);
                    }
                }
                Ok(())
            }
            (PlannedKind::Derived(a), PlannedKind::Derived(b)) if Arc::ptr_eq(a, &b) => Ok(()),
            _ => Err(ExecutionError::FieldConflict(existing.response_key.clone())),
        }
    }

    fn push_template(&mut self, conditions: &[String], template: Arc<DataFetchTemplate>) {
        let exists = self
            .templates
            .iter()
            .any(|t| t.template.name == template.name && t.conditions == conditions);
        if !exists {
            self.templates.push(TemplateFetch {
                conditions: conditions.to_vec(),
                template,
            });
        }
    }
}

fn typename_type() -> Type {
    Type {
        base: BaseType::Named(Name::new("String")),
        nullable: false,
    }
}

fn select_operation<'d>(
    operations: &'d DocumentOperations,
    name: Option<&str>,
) -> Result<(Option<String>, &'d OperationDefinition), ExecutionError> {
    match operations {
        DocumentOperations::Single(op) => Ok((None, &op.node)),
        DocumentOperations::Multiple(ops) => match name {
            Some(name) => ops
                .iter()
                .find(|(k, _)| k.as_str() == name)
                .map(|(k, op)| (Some(k.to_string()), &op.node))
                .ok_or_else(|| ExecutionError::OperationNotFound(name.to_string())),
            None if ops.len() == 1 => ops
                .iter()
                .next()
                .map(|(k, op)| (Some(k.to_string()), &op.node))
                .ok_or(ExecutionError::OperationNameRequired),
            None => Err(ExecutionError::OperationNameRequired),
        },
    }
}

/// Validate a request against the composed schema and plan the forwarded query.
pub(crate) fn plan(
    schema: &ComposedSchema,
    doc: &ExecutableDocument,
    request: &GraphQLRequest,
) -> Result<Planned, ExecutionError> {
    let (name, op) = select_operation(&doc.operations, request.operation_name.as_deref())?;

    let root_type = match op.ty {
        OperationType::Query => schema.query_type(),
        OperationType::Mutation => schema
            .types()
            .mutation_type()
            .ok_or(ExecutionError::UnsupportedOperation("mutation"))?,
        OperationType::Subscription => {
            return Err(ExecutionError::UnsupportedOperation("subscription"))
        }
    };

    let provided = request.variables.clone().unwrap_or_default();
    let mut variables = HashMap::new();
    for def in &op.variable_definitions {
        let def = &def.node;
        let var_name = def.name.node.clone();
        match provided.get(var_name.as_str()) {
            Some(value) => {
                let value = ConstValue::from_json(value.clone())
                    .map_err(|_| ExecutionError::InvalidVariable(var_name.to_string()))?;
                variables.insert(var_name, value);
            }
            None => {
                if let Some(default) = &def.default_value {
                    variables.insert(var_name, default.node.clone());
                }
            }
        }
    }

    let mut planner = Planner {
        schema,
        fragments: &doc.fragments,
        variables,
        spreading: Vec::new(),
        introspection: false,
    };

    let selection = planner.selection_set(root_type, &op.selection_set.node, true)?;

    if planner.introspection {
        let has_data = selection.fields.iter().any(|f| match &f.kind {
            PlannedKind::Upstream { name, .. } => name != "__typename",
            PlannedKind::Derived(_) => true,
        });
        if has_data {
            return Err(ExecutionError::MixedIntrospection);
        }
        return Ok(Planned::Introspection);
    }

    Ok(Planned::Forward(OperationPlan {
        ty: op.ty,
        name,
        selection,
    }))
}

struct Planner<'a> {
    schema: &'a ComposedSchema,
    fragments: &'a HashMap<Name, Positioned<FragmentDefinition>>,
    variables: HashMap<Name, ConstValue>,
    spreading: Vec<Name>,
    introspection: bool,
}

impl<'a> Planner<'a> {
    fn type_def(&self, name: &str) -> Result<&'a TypeDef, ExecutionError> {
        self.schema
            .type_def(name)
            .ok_or_else(|| ExecutionError::UnknownType(name.to_string()))
    }

    fn selection_set(
        &mut self,
        parent: &str,
        set: &SelectionSet,
        is_root: bool,
    ) -> Result<SelectionPlan, ExecutionError> {
        let parent_def = self.type_def(parent)?;
        let mut plan = SelectionPlan::new(parent_def);
        self.collect(&mut plan, parent, &[], set, is_root)?;
        Ok(plan)
    }

    fn collect(
        &mut self,
        plan: &mut SelectionPlan,
        scope: &str,
        conditions: &[String],
        set: &SelectionSet,
        is_root: bool,
    ) -> Result<(), ExecutionError> {
        let fragments = self.fragments;

        for item in &set.items {
            match &item.node {
                Selection::Field(f) => {
                    if self.skipped(&f.node.directives)? {
                        continue;
                    }
                    self.field(plan, scope, conditions, &f.node, is_root)?;
                }
                Selection::FragmentSpread(spread) => {
                    if self.skipped(&spread.node.directives)? {
                        continue;
                    }

                    let name = &spread.node.fragment_name.node;
                    if self.spreading.contains(name) {
                        return Err(ExecutionError::FragmentCycle(name.to_string()));
                    }
                    let fragment = fragments
                        .get(name)
                        .ok_or_else(|| ExecutionError::UnknownFragment(name.to_string()))?;
                    if self.skipped(&fragment.node.directives)? {
                        continue;
                    }

                    self.spreading.push(name.clone());
                    self.narrow(
                        plan,
                        conditions,
                        fragment.node.type_condition.node.on.node.as_str(),
                        &fragment.node.selection_set.node,
                        is_root,
                    )?;
                    self.spreading.pop();
                }
                Selection::InlineFragment(inline) => {
                    if self.skipped(&inline.node.directives)? {
                        continue;
                    }

                    match &inline.node.type_condition {
                        Some(tc) => self.narrow(
                            plan,
                            conditions,
                            tc.node.on.node.as_str(),
                            &inline.node.selection_set.node,
                            is_root,
                        )?,
                        None => self.collect(
                            plan,
                            scope,
                            conditions,
                            &inline.node.selection_set.node,
                            is_root,
                        )?,
                    }
                }
            }
        }

        Ok(())
    }

    /// Collect a fragment's selection under the type condition `on`.
    fn narrow(
        &mut self,
        plan: &mut SelectionPlan,
        conditions: &[String],
        on: &str,
        set: &SelectionSet,
        is_root: bool,
    ) -> Result<(), ExecutionError> {
        let cond_def = self.type_def(on)?;
        if !cond_def.is_composite() {
            return Err(ExecutionError::UnknownType(on.to_string()));
        }

        let mut conditions = conditions.to_vec();
        if plan.is_abstract {
            if on != plan.parent_type && !conditions.iter().any(|c| c == on) {
                conditions.push(on.to_string());
            }
        } else if !self.schema.types().is_possible_type(on, &plan.parent_type) {
            // The parent's type is known and never satisfies the condition.
            return Ok(());
        }

        self.collect(plan, on, &conditions, set, is_root)
    }

    fn field(
        &mut self,
        plan: &mut SelectionPlan,
        scope: &str,
        conditions: &[String],
        f: &Field,
        is_root: bool,
    ) -> Result<(), ExecutionError> {
        let schema = self.schema;
        let name = f.name.node.as_str();
        let response_key = f
            .alias
            .as_ref()
            .map(|a| a.node.as_str())
            .unwrap_or(name)
            .to_string();

        if response_key.starts_with(RESERVED_PREFIX) {
            return Err(ExecutionError::ReservedAlias(response_key));
        }

        if is_root && (name == "__schema" || name == "__type") {
            self.introspection = true;
            return Ok(());
        }

        let unknown_argument = |argument: &Name| ExecutionError::UnknownArgument {
            type_name: scope.to_string(),
            field_name: name.to_string(),
            argument: argument.to_string(),
        };

        if name == "__typename" {
            if let Some((arg, _)) = f.arguments.first() {
                return Err(unknown_argument(&arg.node));
            }
            return plan.push(PlannedField {
                response_key,
                conditions: conditions.to_vec(),
                ty: typename_type(),
                kind: PlannedKind::Upstream {
                    name: name.to_string(),
                    arguments: Vec::new(),
                    selection: None,
                },
            });
        }

        let field_def = self
            .type_def(scope)?
            .field(name)
            .ok_or_else(|| ExecutionError::UnknownField {
                type_name: scope.to_string(),
                field_name: name.to_string(),
            })?;
        let has_selection = !f.selection_set.node.items.is_empty();

        if let Some(binding) = schema.derived_field(scope, name) {
            if let Some((arg, _)) = f.arguments.first() {
                return Err(unknown_argument(&arg.node));
            }
            if has_selection {
                return Err(ExecutionError::InvalidSelection {
                    type_name: scope.to_string(),
                    field_name: name.to_string(),
                    reason: "leaf fields cannot have a selection",
                });
            }

            plan.push_template(conditions, binding.template.clone());
            return plan.push(PlannedField {
                response_key,
                conditions: conditions.to_vec(),
                ty: field_def.ty.clone(),
                kind: PlannedKind::Derived(binding.clone()),
            });
        }

        let mut arguments = Vec::with_capacity(f.arguments.len());
        for (arg_name, value) in &f.arguments {
            let arg_def = field_def
                .arguments
                .get(arg_name.node.as_str())
                .ok_or_else(|| unknown_argument(&arg_name.node))?;
            // Arguments bound to absent variables are left to their upstream default.
            if let Some(value) = self.resolve(&value.node) {
                arguments.push((
                    arg_name.node.to_string(),
                    coerce(schema.types(), &arg_def.ty, value),
                ));
            }
        }

        let child_name = named_type(&field_def.ty);
        let child_def = self.type_def(child_name)?;
        let selection = match (child_def.is_composite(), has_selection) {
            (true, true) => Some(self.selection_set(child_name, &f.selection_set.node, false)?),
            (true, false) => {
                return Err(ExecutionError::InvalidSelection {
                    type_name: scope.to_string(),
                    field_name: name.to_string(),
                    reason: "a selection of subfields is required",
                })
            }
            (false, true) => {
                return Err(ExecutionError::InvalidSelection {
                    type_name: scope.to_string(),
                    field_name: name.to_string(),
                    reason: "leaf fields cannot have a selection",
                })
            }
            (false, false) => None,
        };

        plan.push(PlannedField {
            response_key,
            conditions: conditions.to_vec(),
            ty: field_def.ty.clone(),
            kind: PlannedKind::Upstream {
                name: name.to_string(),
                arguments,
                selection,
            },
        })
    }

    /// Evaluate `@skip` and `@include`.
    fn skipped(&self, directives: &[Positioned<Directive>]) -> Result<bool, ExecutionError> {
        for directive in directives {
            let directive = &directive.node;
            let name = directive.name.node.as_str();
            if name != "skip" && name != "include" {
                continue;
            }

            let value = directive
                .get_argument("if")
                .and_then(|v| self.resolve(&v.node));
            let flag = match value {
                Some(ConstValue::Boolean(flag)) => flag,
                _ => return Err(ExecutionError::InvalidDirective(name.to_string())),
            };

            if (name == "skip" && flag) || (name == "include" && !flag) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn resolve(&self, value: &Value) -> Option<ConstValue> {
        match value {
            Value::Variable(name) => self.variables.get(name).cloned(),
            other => other
                .clone()
                .into_const_with(|name| {
                    Ok::<_, Infallible>(
                        self.variables
                            .get(&name)
                            .cloned()
                            .unwrap_or(ConstValue::Null),
                    )
                })
                .ok(),
        }
    }
}

/// Coerce variable values to the argument's type, turning strings into enum values.
fn coerce(schema: &UpstreamSchema, ty: &Type, value: ConstValue) -> ConstValue {
    match (&ty.base, value) {
        (_, ConstValue::Null) => ConstValue::Null,
        (BaseType::List(inner), ConstValue::List(items)) => ConstValue::List(
            items
                .into_iter()
                .map(|item| coerce(schema, inner, item))
                .collect(),
        ),
        (BaseType::List(inner), value) => coerce(schema, inner, value),
        (BaseType::Named(name), value) => match schema.type_def(name) {
            Some(def) if def.kind == TypeKind::Enum => match value {
                ConstValue::String(s) => ConstValue::Enum(Name::new(s)),
                other => other,
            },
            Some(def) if def.kind == TypeKind::InputObject => match value {
                ConstValue::Object(fields) => ConstValue::Object(
                    fields
                        .into_iter()
                        .map(|(key, value)| {
                            let value = match def.input_fields.get(key.as_str()) {
                                Some(field) => coerce(schema, &field.ty, value),
                                None => value,
                            };
                            (key, value)
                        })
                        .collect(),
                ),
                other => other,
            },
            _ => value,
        },
    }
}
