//! Bulk loading through the TDS bulk-insert protocol

use sprocket_core::{BulkCopy, DbType, Result, Row, RowCursor, SprocketError, Value};
use tiberius::{ColumnData, TokenRow};

use crate::connection::{MssqlClient, MssqlConnectionError};
use crate::values::{legacy_datetime, rescale_numeric, small_datetime, to_column_data};

/// Columns of a table in ordinal order
const DESTINATION_COLUMNS_SQL: &str = "SELECT c.name, TYPE_NAME(c.system_type_id), \
     CAST(c.scale AS INT), c.is_identity, c.is_computed \
     FROM sys.columns c WHERE c.object_id = OBJECT_ID(@P1) ORDER BY c.column_id";

/// A column of the destination table
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DestinationColumn {
    pub name: String,
    /// Base T-SQL type name, lowercase (e.g. `nvarchar`)
    pub type_name: String,
    pub scale: u8,
    /// Identity, computed and rowversion columns are filled in by the
    /// server and never receive bulk values
    pub updateable: bool,
}

impl DestinationColumn {
    pub(crate) fn new(name: &str, type_name: &str, scale: u8, updateable: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_ascii_lowercase(),
            scale,
            updateable,
        }
    }

    fn db_type(&self) -> Option<DbType> {
        let db_type = match self.type_name.as_str() {
            "bit" => DbType::Boolean,
            "tinyint" => DbType::TinyInt,
            "smallint" => DbType::SmallInt,
            "int" => DbType::Int,
            "bigint" => DbType::BigInt,
            "real" => DbType::Real,
            "float" => DbType::Float,
            "decimal" | "numeric" => DbType::Decimal,
            "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "xml" => DbType::String,
            "binary" | "varbinary" | "image" => DbType::Binary,
            "uniqueidentifier" => DbType::Guid,
            "date" => DbType::Date,
            "time" => DbType::Time,
            "datetime" | "datetime2" | "smalldatetime" => DbType::DateTime,
            "datetimeoffset" => DbType::DateTimeOffset,
            _ => return None,
        };
        Some(db_type)
    }

    /// Encode `value` the way this column expects it on the wire
    fn column_data(&self, value: Option<&Value>, db_type: DbType) -> Result<ColumnData<'static>> {
        let value = value.filter(|v| !v.is_null());
        match (self.type_name.as_str(), value) {
            ("datetime", Some(Value::DateTime(dt))) => {
                Ok(ColumnData::DateTime(Some(legacy_datetime(*dt))))
            }
            ("datetime", None) => Ok(ColumnData::DateTime(None)),
            ("smalldatetime", Some(Value::DateTime(dt))) => {
                Ok(ColumnData::SmallDateTime(Some(small_datetime(*dt)?)))
            }
            ("smalldatetime", None) => Ok(ColumnData::SmallDateTime(None)),
            _ => match to_column_data(value, db_type)? {
                ColumnData::Numeric(Some(n)) => rescale_numeric(n, self.scale)
                    .map(|n| ColumnData::Numeric(Some(n)))
                    .ok_or_else(|| {
                        SprocketError::TypeCast(format!(
                            "value does not fit column '{}' with scale {}",
                            self.name, self.scale
                        ))
                    }),
                other => Ok(other),
            },
        }
    }
}

#[derive(Debug)]
struct BulkSlot {
    column: DestinationColumn,
    db_type: DbType,
    /// Source field feeding this column; unmapped columns receive NULL
    source: Option<usize>,
}

/// The order and encoding of the values sent for each source row.
///
/// Rows carry one value per updateable destination column, in table order.
#[derive(Debug)]
pub(crate) struct BulkPlan {
    slots: Vec<BulkSlot>,
}

impl BulkPlan {
    pub(crate) fn new(columns: &[DestinationColumn], copy: &BulkCopy) -> Result<Self> {
        for mapping in copy.column_mappings() {
            let column = columns.get(mapping.destination_ordinal).ok_or_else(|| {
                SprocketError::InvalidOperation(format!(
                    "'{}' has no column at ordinal {}",
                    copy.destination_table(),
                    mapping.destination_ordinal
                ))
            })?;
            if !column.updateable {
                return Err(SprocketError::InvalidOperation(format!(
                    "column '{}' of '{}' is generated by the server and cannot be loaded",
                    column.name,
                    copy.destination_table()
                )));
            }
        }

        let positional = copy.column_mappings().is_empty();
        let slots = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.updateable)
            .enumerate()
            .map(|(position, (ordinal, column))| {
                let db_type = column.db_type().ok_or_else(|| {
                    SprocketError::NotSupported(format!(
                        "bulk loading into {} column '{}'",
                        column.type_name, column.name
                    ))
                })?;
                let source = if positional {
                    Some(position)
                } else {
                    copy.column_mappings()
                        .iter()
                        .find(|m| m.destination_ordinal == ordinal)
                        .map(|m| m.source_ordinal)
                };
                Ok(BulkSlot {
                    column: column.clone(),
                    db_type,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { slots })
    }

    /// Number of values sent per row
    pub(crate) fn width(&self) -> usize {
        self.slots.len()
    }

    /// Encode one source row
    pub(crate) fn encode(&self, row: &Row) -> Result<Vec<ColumnData<'static>>> {
        self.slots
            .iter()
            .map(|slot| {
                let value = match slot.source {
                    Some(ordinal) => Some(row.get(ordinal).ok_or_else(|| {
                        SprocketError::InvalidOperation(format!(
                            "source row has no field at ordinal {}",
                            ordinal
                        ))
                    })?),
                    None => None,
                };
                slot.column.column_data(value, slot.db_type)
            })
            .collect()
    }

    fn token_row(&self, row: &Row) -> Result<TokenRow<'static>> {
        let mut token_row = TokenRow::new();
        for data in self.encode(row)? {
            token_row.push(data);
        }
        Ok(token_row)
    }
}

async fn destination_columns(
    client: &mut MssqlClient,
    table: &str,
) -> std::result::Result<Vec<DestinationColumn>, MssqlConnectionError> {
    let rows = client
        .query(DESTINATION_COLUMNS_SQL, &[&table])
        .await?
        .into_first_result()
        .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: &str = row.try_get(0)?.unwrap_or_default();
        let type_name: &str = row.try_get(1)?.unwrap_or_default();
        let scale: i32 = row.try_get(2)?.unwrap_or_default();
        let identity: bool = row.try_get(3)?.unwrap_or_default();
        let computed: bool = row.try_get(4)?.unwrap_or_default();
        let updateable = !identity && !computed && type_name != "timestamp";
        let scale = u8::try_from(scale).map_err(|_| {
            MssqlConnectionError::Protocol(format!("column '{}' reports scale {}", name, scale))
        })?;
        columns.push(DestinationColumn::new(name, type_name, scale, updateable));
    }
    Ok(columns)
}

/// Stream every row of `source` into `table` (already quoted)
pub(crate) async fn bulk_load(
    client: &mut MssqlClient,
    table: &str,
    copy: &BulkCopy,
    source: &mut dyn RowCursor,
) -> std::result::Result<u64, MssqlConnectionError> {
    let columns = destination_columns(client, table).await?;
    if columns.is_empty() {
        return Err(SprocketError::InvalidOperation(format!(
            "destination table '{}' does not exist",
            copy.destination_table()
        ))
        .into());
    }
    let plan = BulkPlan::new(&columns, copy)?;
    tracing::debug!(table, columns = plan.width(), "starting bulk insert");

    let mut request = client.bulk_insert(table).await?;
    let mut sent = 0u64;
    while let Some(row) = source.next_row()? {
        request.send(plan.token_row(&row)?).await?;
        sent += 1;
    }
    request.finalize().await?;

    Ok(sent)
}
