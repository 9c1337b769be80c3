use super::plan::{
    template_alias, OperationPlan, PlannedField, PlannedKind, SelectionPlan, RESERVED_PREFIX,
    TYPENAME_ALIAS,
};
use crate::{
    compute::ComputeBinding,
    merge::ComposedSchema,
    response::{ExecutionError, GraphQLResponse, PathSegment, ResponseError, UPSTREAM_EXECUTION},
    upstream::UpstreamResponse,
};
use async_graphql_parser::types::{BaseType, Type};
use serde_json::{Map, Value};
use tracing::warn;

/// A non-null field resolved to `null`; its parent must become `null` instead.
struct NullBubble;

type ShapeResult<T> = Result<T, NullBubble>;

/// Build the client response from the upstream response to a forwarded query.
pub(crate) fn shape(
    schema: &ComposedSchema,
    op: &OperationPlan,
    response: UpstreamResponse,
) -> GraphQLResponse {
    let mut errors: Vec<ResponseError> = response
        .errors
        .into_iter()
        .map(upstream_error)
        .collect();

    let mut shaper = Shaper {
        schema,
        path: Vec::new(),
        errors: Vec::new(),
    };

    let data = match response.data {
        Some(Value::Object(root)) => shaper
            .shape_object(&op.selection, &root)
            .ok()
            .map(Value::Object),
        _ => None,
    };

    errors.append(&mut shaper.errors);

    GraphQLResponse { data, errors }
}

// Fields fetched for templates are not part of the client's query, so paths
// into them stop at the object that requested the derived field.
fn upstream_error(mut err: ResponseError) -> ResponseError {
    if let Some(pos) = err
        .path
        .iter()
        .position(|s| matches!(s, PathSegment::Key(k) if k.starts_with(RESERVED_PREFIX)))
    {
        err.path.truncate(pos);
    }

    if err.code().is_some() {
        return err;
    }
    err.with_code(UPSTREAM_EXECUTION)
}

struct Shaper<'a> {
    schema: &'a ComposedSchema,
    path: Vec<PathSegment>,
    errors: Vec<ResponseError>,
}

impl<'a> Shaper<'a> {
    fn shape_object(
        &mut self,
        selection: &SelectionPlan,
        raw: &Map<String, Value>,
    ) -> ShapeResult<Map<String, Value>> {
        let typename = raw.get(TYPENAME_ALIAS).and_then(Value::as_str);
        let mut out = Map::new();

        for field in &selection.fields {
            if !self.applies(field, typename) {
                continue;
            }

            self.path.push(PathSegment::Key(field.response_key.clone()));
            let value = match &field.kind {
                PlannedKind::Upstream { selection, .. } => {
                    let value = raw.get(&field.response_key).unwrap_or(&Value::Null);
                    self.shape_value(&field.ty, value, selection.as_ref())
                }
                PlannedKind::Derived(binding) => self.shape_derived(binding, &field.ty, raw),
            };
            self.path.pop();

            merge_into(&mut out, &field.response_key, value?);
        }

        Ok(out)
    }

    fn applies(&self, field: &PlannedField, typename: Option<&str>) -> bool {
        if field.conditions.is_empty() {
            return true;
        }

        match typename {
            Some(typename) => field
                .conditions
                .iter()
                .all(|c| self.schema.types().is_possible_type(c, typename)),
            None => false,
        }
    }

    fn shape_value(
        &mut self,
        ty: &Type,
        raw: &Value,
        selection: Option<&SelectionPlan>,
    ) -> ShapeResult<Value> {
        if raw.is_null() {
            return nullable(ty, Err(NullBubble));
        }

        let result = match (&ty.base, raw) {
            (BaseType::List(inner), Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                let mut result = Ok(());
                for (i, item) in items.iter().enumerate() {
                    self.path.push(PathSegment::Index(i));
                    let value = self.shape_value(inner, item, selection);
                    self.path.pop();

                    match value {
                        Ok(value) => out.push(value),
                        Err(bubble) => {
                            result = Err(bubble);
                            break;
                        }
                    }
                }
                result.map(|_| Value::Array(out))
            }
            (_, Value::Object(map)) => match selection {
                Some(selection) => self.shape_object(selection, map).map(Value::Object),
                None => Ok(raw.clone()),
            },
            (_, other) => Ok(other.clone()),
        };

        nullable(ty, result)
    }

    fn shape_derived(
        &mut self,
        binding: &ComputeBinding,
        ty: &Type,
        raw: &Map<String, Value>,
    ) -> ShapeResult<Value> {
        let template = &binding.template;
        let mut parent = Map::new();
        for key in template.response_keys() {
            if let Some(value) = raw.get(&template_alias(&template.name, key)) {
                parent.insert(key.to_string(), value.clone());
            }
        }

        match binding.compute(&Value::Object(parent)) {
            Ok(value) if value.is_null() => nullable(ty, Err(NullBubble)),
            Ok(value) => Ok(value),
            Err(source) => {
                warn!(
                    "Failed to compute `{}.{}`: {source}",
                    binding.type_name, binding.field_name
                );

                let err = ExecutionError::Computation {
                    type_name: binding.type_name.clone(),
                    field_name: binding.field_name.clone(),
                    source,
                };
                self.errors
                    .push(ResponseError::from(err).with_path(self.path.clone()));

                nullable(ty, Err(NullBubble))
            }
        }
    }
}

/// Absorb a non-null violation when `ty` is nullable.
fn nullable(ty: &Type, result: ShapeResult<Value>) -> ShapeResult<Value> {
    match result {
        Err(NullBubble) if ty.nullable => Ok(Value::Null),
        other => other,
    }
}

/// Insert `value` under `key`, merging objects selected by several fragments.
fn merge_into(out: &mut Map<String, Value>, key: &str, value: Value) {
    match (out.get_mut(key), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (k, v) in incoming {
                merge_into(existing, &k, v);
            }
        }
        (Some(Value::Array(existing)), Value::Array(incoming))
            if existing.len() == incoming.len() =>
        {
            for (slot, v) in existing.iter_mut().zip(incoming) {
                match (slot, v) {
                    (Value::Object(a), Value::Object(b)) => {
                        for (k, v) in b {
                            merge_into(a, &k, v);
                        }
                    }
                    (slot, v) => *slot = v,
                }
            }
        }
        (Some(existing), value) => *existing = value,
        (None, value) => {
            out.insert(key.to_string(), value);
        }
    }
}
