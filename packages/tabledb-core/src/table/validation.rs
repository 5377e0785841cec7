//! Validation methods for table schema and constraints.

use std::collections::HashSet;

use super::constraint::{ConstraintDescriptor, ConstraintKind};
use super::field::{FieldDescriptor, MAX_NAME_LEN};
use super::schema_file::MAX_PARAM_LEN;
use crate::error::DbError;
use crate::types::FieldKind;

/// Validates field names and Varchar widths.
///
/// # Arguments
/// * `table` - Table name, for error messages
/// * `fields` - Field definitions to validate
///
/// # Returns
/// `Result<(), DbError>` indicating success or validation failure.
pub(crate) fn validate_fields(table: &str, fields: &[FieldDescriptor]) -> Result<(), DbError> {
    if fields.is_empty() {
        return Err(DbError::InvalidField {
            field: table.to_string(),
            reason: "a table needs at least one field".to_string(),
        });
    }

    let mut seen_names = HashSet::new();
    for field in fields {
        validate_field(field)?;
        if !seen_names.insert(field.name.as_str()) {
            return Err(DbError::FieldAlreadyExists {
                table: table.to_string(),
                field: field.name.clone(),
            });
        }
    }
    Ok(())
}

/// Validates a single field definition.
pub(crate) fn validate_field(field: &FieldDescriptor) -> Result<(), DbError> {
    validate_name(&field.name)?;
    if field.name.contains('.') || field.name.contains(',') {
        return Err(DbError::InvalidField {
            field: field.name.clone(),
            reason: "field names may not contain '.' or ','".to_string(),
        });
    }
    if field.kind == FieldKind::Varchar && field.param == 0 {
        return Err(DbError::InvalidField {
            field: field.name.clone(),
            reason: "VARCHAR width must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Validates that constraint names are unique and reference existing fields.
pub(crate) fn validate_constraints(
    table: &str,
    fields: &[FieldDescriptor],
    constraints: &[ConstraintDescriptor],
) -> Result<(), DbError> {
    let mut seen_names = HashSet::new();
    for constraint in constraints {
        validate_constraint(table, fields, constraint)?;
        if !seen_names.insert(constraint.name.as_str()) {
            return Err(DbError::ConstraintAlreadyExists {
                table: table.to_string(),
                name: constraint.name.clone(),
            });
        }
    }
    Ok(())
}

/// Validates a single constraint against the table's fields.
pub(crate) fn validate_constraint(
    table: &str,
    fields: &[FieldDescriptor],
    constraint: &ConstraintDescriptor,
) -> Result<(), DbError> {
    validate_name(&constraint.name)?;
    if constraint.param.len() > MAX_PARAM_LEN {
        return Err(DbError::InvalidField {
            field: constraint.name.clone(),
            reason: format!("parameter longer than {} bytes", MAX_PARAM_LEN),
        });
    }

    if constraint.is_table_level() {
        if constraint.kind != ConstraintKind::Check {
            return Err(DbError::InvalidField {
                field: constraint.name.clone(),
                reason: "only CHECK constraints may be table-level".to_string(),
            });
        }
        return Ok(());
    }

    let field = fields
        .iter()
        .find(|f| f.name == constraint.field)
        .ok_or_else(|| DbError::FieldNotFound {
            table: table.to_string(),
            field: constraint.field.clone(),
        })?;

    match constraint.kind {
        ConstraintKind::ForeignKey if constraint.foreign_reference().is_none() => {
            Err(DbError::invalid_expression(
                &constraint.param,
                "foreign key must reference 'table.field'",
            ))
        }
        ConstraintKind::AutoIncrement if field.kind != FieldKind::Int => {
            Err(DbError::TypeMismatch {
                expected: format!("INT field for AUTO_INCREMENT '{}'", constraint.name),
                got: field.kind.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn validate_name(name: &str) -> Result<(), DbError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DbError::InvalidField {
            field: name.to_string(),
            reason: format!("names must be 1 to {} bytes", MAX_NAME_LEN),
        });
    }
    Ok(())
}

/// Validates a table or index name; it becomes part of file names.
pub(crate) fn validate_object_name(name: &str) -> Result<(), DbError> {
    validate_name(name)?;
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(DbError::InvalidField {
            field: name.to_string(),
            reason: "names may only contain letters, digits, '_' and '-'".to_string(),
        });
    }
    Ok(())
}
