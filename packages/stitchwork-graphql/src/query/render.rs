use super::plan::{template_alias, OperationPlan, PlannedKind, SelectionPlan, TYPENAME_ALIAS};
use crate::template::TemplateField;
use async_graphql_parser::types::OperationType;
use async_graphql_value::ConstValue;
use std::fmt::Write;

/// Print the query sent upstream for a planned operation.
pub(crate) fn render(op: &OperationPlan) -> String {
    let mut out = String::new();

    out.push_str(match op.ty {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    });
    if let Some(name) = &op.name {
        out.push(' ');
        out.push_str(name);
    }
    out.push(' ');
    write_selection(&mut out, &op.selection);

    out
}

fn write_selection(out: &mut String, selection: &SelectionPlan) {
    out.push('{');
    let start = out.len();

    if selection.needs_typename() {
        let _ = write!(out, " {TYPENAME_ALIAS}: __typename");
    }

    for field in &selection.fields {
        let PlannedKind::Upstream {
            name,
            arguments,
            selection: child,
        } = &field.kind
        else {
            continue;
        };

        open_conditions(out, &field.conditions);
        out.push(' ');
        if field.response_key != *name {
            let _ = write!(out, "{}: ", field.response_key);
        }
        out.push_str(name);
        write_arguments(out, arguments);
        if let Some(child) = child {
            out.push(' ');
            write_selection(out, child);
        }
        close_conditions(out, &field.conditions);
    }

    for fetch in &selection.templates {
        open_conditions(out, &fetch.conditions);
        for field in &fetch.template.selection {
            let alias = template_alias(&fetch.template.name, field.response_key());
            write_template_field(out, Some(&alias), field);
        }
        close_conditions(out, &fetch.conditions);
    }

    // Every selection set must select something.
    if out.len() == start {
        out.push_str(" __typename");
    }

    out.push_str(" }");
}

fn open_conditions(out: &mut String, conditions: &[String]) {
    for condition in conditions {
        let _ = write!(out, " ... on {condition} {{");
    }
}

fn close_conditions(out: &mut String, conditions: &[String]) {
    for _ in conditions {
        out.push_str(" }");
    }
}

fn write_arguments(out: &mut String, arguments: &[(String, ConstValue)]) {
    if arguments.is_empty() {
        return;
    }

    out.push('(');
    for (i, (name, value)) in arguments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{name}: {value}");
    }
    out.push(')');
}

fn write_template_field(out: &mut String, alias: Option<&str>, field: &TemplateField) {
    out.push(' ');
    match alias.or(field.alias.as_deref()) {
        Some(alias) => {
            let _ = write!(out, "{alias}: {}", field.name);
        }
        None => out.push_str(&field.name),
    }
    write_arguments(out, &field.arguments);

    if !field.selection.is_empty() {
        out.push_str(" {");
        for child in &field.selection {
            write_template_field(out, None, child);
        }
        out.push_str(" }");
    }
}
