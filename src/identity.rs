use crate::config::QueryHelperOptions;
use crate::driver::Driver;
use crate::error::QueryHelperError;
use crate::executor::CallContext;
use crate::query::{Parameters, QueryKind};
use crate::scalar::coerce_scalar;
use crate::types::{DriverFamily, RowValues};

/// Pick the statement that reads back the last generated key.
///
/// An explicit override in the options wins over family detection.
///
/// # Errors
/// Returns `QueryHelperError::ConfigError` when the family is not recognized.
pub(crate) fn identity_statement(
    options: &QueryHelperOptions,
    family: &str,
) -> Result<String, QueryHelperError> {
    if let Some(statement) = &options.identity_statement {
        return Ok(statement.clone());
    }
    DriverFamily::detect(family)
        .map(|family| family.identity_statement().to_string())
        .ok_or_else(|| {
            QueryHelperError::ConfigError(format!(
                "unknown driver family {family:?} for retrieving identity column"
            ))
        })
}

/// Execute an insert and read back its generated key on the caller's
/// connection and transaction.
pub(crate) async fn execute_with_identity<D: Driver>(
    ctx: &CallContext<'_, D>,
    command: &D::Command,
    statement: &str,
) -> Result<(usize, i64), QueryHelperError> {
    ctx.logger
        .log_command(QueryKind::Scalar, statement, &Parameters::new());
    let (rows, raw) = ctx
        .driver
        .execute_non_query_with_identity(ctx.conn, command, statement, ctx.tx)
        .await?;
    Ok((rows, identity_from_value(raw)?))
}

/// SQL Server reports identities as `numeric`, which drivers surface as floats.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn identity_from_value(raw: RowValues) -> Result<i64, QueryHelperError> {
    match raw {
        RowValues::Float(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => {
            Ok(value as i64)
        }
        other => coerce_scalar::<i64>(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_statement_per_family() -> Result<(), QueryHelperError> {
        let opts = QueryHelperOptions::default();
        assert_eq!(identity_statement(&opts, "SqlServerCe")?, "SELECT @@IDENTITY;");
        assert_eq!(identity_statement(&opts, "SqlServer")?, "SELECT SCOPE_IDENTITY();");
        assert_eq!(
            identity_statement(&opts, "System.Data.SQLite")?,
            "SELECT last_insert_rowid();"
        );
        Ok(())
    }

    #[test]
    fn unknown_family_is_config_error() {
        let opts = QueryHelperOptions::default();
        assert!(matches!(
            identity_statement(&opts, "Oracle.DataAccess"),
            Err(QueryHelperError::ConfigError(_))
        ));
    }

    #[test]
    fn override_beats_detection() -> Result<(), QueryHelperError> {
        let opts = QueryHelperOptions {
            identity_statement: Some("SELECT currval('seq');".into()),
            ..QueryHelperOptions::default()
        };
        assert_eq!(identity_statement(&opts, "Oracle")?, "SELECT currval('seq');");
        Ok(())
    }

    #[test]
    fn converts_numeric_identities() -> Result<(), QueryHelperError> {
        assert_eq!(identity_from_value(RowValues::Int(17))?, 17);
        assert_eq!(identity_from_value(RowValues::Float(42.0))?, 42);
        assert_eq!(identity_from_value(RowValues::Null)?, 0);
        assert!(identity_from_value(RowValues::Float(1.5)).is_err());
        Ok(())
    }
}
