//! Small dataframe helpers shared by the transforms

use datafusion::logical_expr::SortExpr;
use datafusion::prelude::*;
use songlake_common::validate_columns;

use crate::error::Result;

/// Keep one row per `key`, projecting `columns` as `(source, output)` pairs
///
/// The surviving row is the first one under `order`, then under every
/// projected source column ascending (nulls last). The extra ordering only
/// makes the choice repeatable; it carries no meaning. Column names are
/// matched case-sensitively, so camelCase input columns work as given.
pub fn first_per_key(
    frame: DataFrame,
    key: &str,
    columns: &[(&str, &str)],
    order: Vec<SortExpr>,
) -> Result<DataFrame> {
    let select = columns
        .iter()
        .map(|(source, output)| {
            if source == output {
                ident(*source)
            } else {
                ident(*source).alias(*output)
            }
        })
        .collect();

    let mut sort = vec![ident(key).sort(true, false)];
    sort.extend(order);
    sort.extend(
        columns
            .iter()
            .filter(|(source, _)| *source != key)
            .map(|(source, _)| ident(*source).sort(true, false)),
    );

    let deduped = frame
        .filter(ident(key).is_not_null())?
        .distinct_on(vec![ident(key)], select, Some(sort))?;
    Ok(deduped)
}

/// Check a derived frame against the declared schema of `table`
pub fn check_table_schema(table: &str, frame: &DataFrame) -> Result<()> {
    let fields = frame.schema().fields();
    validate_columns(
        table,
        fields
            .iter()
            .map(|field| (field.name().as_str(), field.data_type())),
    )?;
    Ok(())
}
