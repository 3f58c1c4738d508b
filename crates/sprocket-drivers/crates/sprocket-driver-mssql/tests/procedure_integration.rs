//! Integration tests for stored-procedure calls against SQL Server
//!
//! These tests require a running SQL Server.
//! They are ignored by default and can be run with:
//! ```
//! cargo test --package sprocket-driver-mssql --test procedure_integration -- --ignored
//! ```
//!
//! To set up a local SQL Server for testing:
//! ```
//! docker run -d --name mssql-test -e ACCEPT_EULA=Y -e MSSQL_SA_PASSWORD='Sprocket!123' \
//!     -p 1433:1433 mcr.microsoft.com/mssql/server:2022-latest
//! ```
//!
//! Every test works inside a transaction that is rolled back, so the
//! procedures and tables it creates never persist.

use sprocket_core::{
    BulkCopy, BufferedCursor, ColumnMeta, ConnectionConfig, ConnectionState, DataTable, DbType,
    Driver, DriverConnection, DriverParameter, DriverTransaction, Parameter, Row, SprocketError,
    Value,
};
use sprocket_driver_mssql::MssqlDriver;

/// Helper to create a test connection config
fn test_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::new("mssql", "SQL Server Test");
    config.host = std::env::var("MSSQL_HOST").unwrap_or_else(|_| "localhost".to_string());
    config.port = std::env::var("MSSQL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(1433);
    config.database =
        Some(std::env::var("MSSQL_DATABASE").unwrap_or_else(|_| "master".to_string()));
    config.username = Some(std::env::var("MSSQL_USER").unwrap_or_else(|_| "sa".to_string()));
    config.password = std::env::var("MSSQL_PASSWORD").ok();
    config.with_param("trust_cert", "true")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_connection() -> Box<dyn DriverConnection> {
    init_tracing();
    let mut conn = MssqlDriver::new()
        .create_connection(&test_config())
        .expect("Failed to create connection");
    conn.open().expect("Failed to connect to SQL Server");
    conn
}

/// Run ad-hoc T-SQL through sp_executesql
fn exec_sql(tx: &mut dyn DriverTransaction, sql: &str) -> u64 {
    let mut params = vec![Parameter::in_param("@stmt", DbType::String, sql).to_driver_parameter()];
    tx.execute_non_query("sp_executesql", &mut params)
        .unwrap_or_else(|e| panic!("statement failed: {e}\n{sql}"))
}

fn driver_params(params: &[Parameter]) -> Vec<DriverParameter> {
    params.iter().map(Parameter::to_driver_parameter).collect()
}

#[test]
#[ignore = "requires running SQL Server"]
fn test_open_and_close() {
    let mut conn = open_connection();
    assert_eq!(conn.state(), ConnectionState::Open);
    conn.close().expect("Failed to close connection");
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
#[ignore = "requires running SQL Server"]
fn test_output_parameter_and_return_value() {
    let mut conn = open_connection();
    let mut tx = conn.begin_transaction().unwrap();

    exec_sql(
        tx.as_mut(),
        "CREATE PROCEDURE dbo.sprocket_it_add \
         @a INT, @b INT, @sum INT OUTPUT, @note NVARCHAR(20) OUTPUT \
         AS BEGIN SET @sum = @a + @b; SET @note = N'added'; RETURN 7; END",
    );

    let mut params = driver_params(&[
        Parameter::in_param("@a", DbType::Int, 40),
        Parameter::in_param("@b", DbType::Int, 2),
        Parameter::out_param("@sum", DbType::Int),
        Parameter::out_param("@note", DbType::String),
        Parameter::return_value_param("@rv", DbType::Int),
    ]);
    tx.execute_non_query("dbo.sprocket_it_add", &mut params).unwrap();

    assert_eq!(params[2].value, Some(Value::Int32(42)));
    assert_eq!(params[3].value, Some(Value::String("added".into())));
    assert_eq!(params[4].value, Some(Value::Int32(7)));

    tx.rollback().unwrap();
}

#[test]
#[ignore = "requires running SQL Server"]
fn test_input_output_parameter() {
    let mut conn = open_connection();
    let mut tx = conn.begin_transaction().unwrap();

    exec_sql(
        tx.as_mut(),
        "CREATE PROCEDURE dbo.sprocket_it_double @n BIGINT OUTPUT AS SET @n = @n * 2",
    );

    let mut params = driver_params(&[Parameter::in_out_param("@n", DbType::BigInt, 21i64)]);
    tx.execute_non_query("dbo.sprocket_it_double", &mut params).unwrap();
    assert_eq!(params[0].value, Some(Value::Int64(42)));

    tx.rollback().unwrap();
}

#[test]
#[ignore = "requires running SQL Server"]
fn test_reader_returns_first_result_set() {
    let mut conn = open_connection();
    let mut tx = conn.begin_transaction().unwrap();

    let mut params = driver_params(&[Parameter::in_param(
        "@stmt",
        DbType::String,
        "SELECT 1 AS id, N'one' AS label UNION ALL SELECT 2, N'two'; SELECT 99 AS ignored;",
    )]);
    let mut cursor = tx.execute_reader("sp_executesql", &mut params).unwrap();
    let table = DataTable::load(cursor.as_mut()).unwrap();

    assert_eq!(table.column_count(), 2);
    assert_eq!(table.row_count(), 2);
    assert_eq!(
        table.rows[1].get_by_name("label"),
        Some(&Value::String("two".into()))
    );

    tx.rollback().unwrap();
}

#[test]
#[ignore = "requires running SQL Server"]
fn test_server_error_is_driver_error() {
    let mut conn = open_connection();
    let mut tx = conn.begin_transaction().unwrap();

    let err = tx
        .execute_non_query("dbo.sprocket_it_does_not_exist", &mut [])
        .unwrap_err();
    assert!(matches!(err, SprocketError::Driver(_)));
    assert_eq!(conn.state(), ConnectionState::Open);

    tx.rollback().unwrap();
}

#[test]
#[ignore = "requires running SQL Server"]
fn test_bulk_copy_skips_identity_column() {
    let mut conn = open_connection();
    let mut tx = conn.begin_transaction().unwrap();

    exec_sql(
        tx.as_mut(),
        "CREATE TABLE dbo.sprocket_it_orders (id INT IDENTITY(1,1) PRIMARY KEY, \
         customer NVARCHAR(50) NOT NULL, total DECIMAL(10, 2) NULL)",
    );

    let columns = vec![
        ColumnMeta::new("customer", "nvarchar", 0),
        ColumnMeta::new("total", "decimal", 1),
    ];
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let rows = vec![
        Row::new(names.clone(), vec![Value::String("Ada".into()), Value::Decimal("12.50".into())]),
        Row::new(names.clone(), vec![Value::String("Grace".into()), Value::Null]),
    ];
    let mut source = BufferedCursor::new(columns, rows);

    let copy = BulkCopy::identity_shifted("dbo.sprocket_it_orders", 2);
    let sent = tx.bulk_copy(&copy, &mut source).unwrap();
    assert_eq!(sent, 2);

    let mut params = driver_params(&[Parameter::in_param(
        "@stmt",
        DbType::String,
        "SELECT id, customer FROM dbo.sprocket_it_orders ORDER BY id",
    )]);
    let mut cursor = tx.execute_reader("sp_executesql", &mut params).unwrap();
    let table = DataTable::load(cursor.as_mut()).unwrap();
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.rows[0].get(0), Some(&Value::Int32(1)));
    assert_eq!(table.rows[1].get(1), Some(&Value::String("Grace".into())));

    tx.rollback().unwrap();
}
