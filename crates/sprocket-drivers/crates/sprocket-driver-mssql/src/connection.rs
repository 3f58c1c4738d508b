//! MS SQL Server connection implementation using tiberius

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::TryStreamExt;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use sprocket_core::{
    BufferedCursor, BulkCopy, ColumnMeta, ConnectionConfig, ConnectionState, DriverConnection,
    DriverParameter, DriverTransaction, Result, Row, RowCursor, SprocketError,
};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, QueryItem};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::batch::{ProcedureBatch, ROWCOUNT_COLUMN};
use crate::bulk::bulk_load;
use crate::dialect::MssqlDialect;
use crate::runtime::block_on;
use crate::values::column_data_to_value;

pub(crate) type MssqlClient = Client<Compat<TcpStream>>;

pub(crate) const DEFAULT_PORT: u16 = 1433;
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// MS SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid connection configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Connection is broken and must be reopened")]
    ConnectionBroken,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] SprocketError),
}

impl MssqlConnectionError {
    /// Whether the link is unusable after this error
    fn breaks_connection(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Io(_) => true,
            Self::Tiberius(err) => matches!(
                err,
                tiberius::error::Error::Io { .. } | tiberius::error::Error::Protocol(_)
            ),
            _ => false,
        }
    }
}

impl From<MssqlConnectionError> for SprocketError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::Core(inner) => inner,
            MssqlConnectionError::Timeout(_) => SprocketError::Timeout(err.to_string()),
            MssqlConnectionError::InvalidConfig(msg) => SprocketError::Configuration(msg),
            MssqlConnectionError::ConnectionClosed | MssqlConnectionError::ConnectionBroken => {
                SprocketError::ConnectionState(err.to_string())
            }
            other => SprocketError::Driver(other.to_string()),
        }
    }
}

type DriverResult<T> = std::result::Result<T, MssqlConnectionError>;

/// The link shared by a connection and the transactions begun on it
#[derive(Default)]
struct Session {
    client: Mutex<Option<MssqlClient>>,
    broken: AtomicBool,
}

impl Session {
    fn state(&self) -> ConnectionState {
        if self.client.lock().is_none() {
            ConnectionState::Closed
        } else if self.broken.load(Ordering::SeqCst) {
            ConnectionState::Broken
        } else {
            ConnectionState::Open
        }
    }

    /// Borrow the open client
    fn client(&self) -> DriverResult<MappedMutexGuard<'_, MssqlClient>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionBroken);
        }
        MutexGuard::try_map(self.client.lock(), Option::as_mut)
            .map_err(|_| MssqlConnectionError::ConnectionClosed)
    }

    /// Record fatal errors and convert the outcome
    fn observe<T>(&self, outcome: DriverResult<T>) -> Result<T> {
        if let Err(err) = &outcome {
            if err.breaks_connection() {
                tracing::warn!(error = %err, "SQL Server connection is broken");
                self.broken.store(true, Ordering::SeqCst);
            }
        }
        outcome.map_err(SprocketError::from)
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, future: F) -> DriverResult<T>
where
    F: Future<Output = DriverResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| MssqlConnectionError::Timeout(limit))?,
        None => future.await,
    }
}

async fn connect(config: Config) -> DriverResult<MssqlClient> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;
    tcp.set_nodelay(true)?;

    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))
}

/// Run a batch without parameters and drain its results
async fn simple(client: &mut MssqlClient, sql: &str) -> DriverResult<()> {
    client.simple_query(sql).await?.into_results().await?;
    Ok(())
}

/// One result set of a batch
struct ResultSet {
    columns: Vec<ColumnMeta>,
    names: Vec<String>,
    rows: Vec<Row>,
}

impl ResultSet {
    fn new(columns: &[tiberius::Column]) -> Self {
        let columns: Vec<ColumnMeta> = columns
            .iter()
            .enumerate()
            .map(|(ordinal, col)| {
                ColumnMeta::new(col.name(), format!("{:?}", col.column_type()), ordinal)
            })
            .collect();
        let names = columns.iter().map(|c| c.name.clone()).collect();
        Self {
            columns,
            names,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: tiberius::Row) -> Result<()> {
        let values = row
            .into_iter()
            .map(column_data_to_value)
            .collect::<Result<Vec<_>>>()?;
        self.rows.push(Row::new(self.names.clone(), values));
        Ok(())
    }

    fn is_output_row(&self) -> bool {
        self.names.first().map(String::as_str) == Some(ROWCOUNT_COLUMN)
    }
}

async fn query_batch(
    client: &mut MssqlClient,
    batch: &ProcedureBatch,
) -> DriverResult<Vec<ResultSet>> {
    let params = batch.params();
    let mut stream = client.query(batch.sql(), &params).await?;

    let mut sets: Vec<ResultSet> = Vec::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => sets.push(ResultSet::new(meta.columns())),
            QueryItem::Row(row) => {
                let set = sets.last_mut().ok_or_else(|| {
                    MssqlConnectionError::Protocol("row received before column metadata".into())
                })?;
                set.push(row)?;
            }
        }
    }
    Ok(sets)
}

/// Split off the trailing output row and store it into `parameters`.
///
/// Returns the remaining result sets and the reported row count.
fn take_outputs(
    mut sets: Vec<ResultSet>,
    batch: &ProcedureBatch,
    parameters: &mut [DriverParameter],
) -> DriverResult<(Vec<ResultSet>, u64)> {
    if !batch.has_outputs() {
        return Ok((sets, 0));
    }
    let row = match sets.pop() {
        Some(set) if set.is_output_row() => set.rows.into_iter().next(),
        _ => None,
    };
    let row = row.ok_or_else(|| {
        MssqlConnectionError::Protocol("procedure batch returned no output row".into())
    })?;
    let affected = batch.apply_outputs(row.values, parameters)?;
    Ok((sets, affected))
}

async fn non_query(
    client: &mut MssqlClient,
    batch: &ProcedureBatch,
    parameters: &mut [DriverParameter],
) -> DriverResult<u64> {
    if !batch.has_outputs() {
        let result = client.execute(batch.sql(), &batch.params()).await?;
        return Ok(result.rows_affected().iter().sum());
    }
    let sets = query_batch(client, batch).await?;
    let (_, affected) = take_outputs(sets, batch, parameters)?;
    Ok(affected)
}

async fn reader(
    client: &mut MssqlClient,
    batch: &ProcedureBatch,
    parameters: &mut [DriverParameter],
) -> DriverResult<BufferedCursor> {
    let sets = query_batch(client, batch).await?;
    let (sets, _) = take_outputs(sets, batch, parameters)?;
    Ok(match sets.into_iter().next() {
        Some(set) => BufferedCursor::new(set.columns, set.rows),
        None => BufferedCursor::empty(),
    })
}

/// MS SQL Server connection using tiberius
pub struct MssqlConnection {
    config: Config,
    session: Arc<Session>,
    command_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl MssqlConnection {
    /// Create an unopened connection
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: Arc::new(Session::default()),
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Limit for each command; `None` waits indefinitely
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Create an unopened connection from a descriptor.
    ///
    /// A `connection_string` (ADO.NET syntax) takes precedence over the
    /// discrete fields. Recognized params: `trust_cert`, `application_name`,
    /// `command_timeout` and `connect_timeout` (seconds, 0 disables).
    pub fn from_config(config: &ConnectionConfig) -> DriverResult<Self> {
        let mut tds = match config.get_string("connection_string") {
            Some(conn_str) => Config::from_ado_string(&conn_str)
                .map_err(|e| MssqlConnectionError::InvalidConfig(e.to_string()))?,
            None => {
                let mut tds = Config::new();
                tds.host(
                    config
                        .get_string("host")
                        .unwrap_or_else(|| "localhost".to_string()),
                );
                tds.port(if config.port > 0 { config.port } else { DEFAULT_PORT });
                if let Some(db) = config.get_string("database") {
                    tds.database(db);
                }
                let user = config.get_string("user").ok_or_else(|| {
                    MssqlConnectionError::InvalidConfig(
                        "a username is required; integrated authentication is not supported"
                            .to_string(),
                    )
                })?;
                let password = config.get_string("password").unwrap_or_default();
                tds.authentication(AuthMethod::sql_server(user, password));
                tds.encryption(EncryptionLevel::Required);
                tds
            }
        };

        if config.get_bool("trust_cert") {
            tds.trust_cert();
        }
        if let Some(app) = config.get_string("application_name") {
            tds.application_name(app);
        }

        Ok(Self {
            command_timeout: timeout_param(config, "command_timeout", DEFAULT_COMMAND_TIMEOUT)?,
            connect_timeout: timeout_param(config, "connect_timeout", DEFAULT_CONNECT_TIMEOUT)?,
            ..Self::new(tds)
        })
    }

    /// The configured per-command limit
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }
}

fn timeout_param(
    config: &ConnectionConfig,
    key: &str,
    default: Duration,
) -> DriverResult<Option<Duration>> {
    let Some(raw) = config.get_string(key) else {
        return Ok(Some(default));
    };
    let seconds: u64 = raw.trim().parse().map_err(|_| {
        MssqlConnectionError::InvalidConfig(format!(
            "{} must be a number of seconds, got '{}'",
            key, raw
        ))
    })?;
    Ok((seconds > 0).then(|| Duration::from_secs(seconds)))
}

impl DriverConnection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    fn state(&self) -> ConnectionState {
        self.session.state()
    }

    #[tracing::instrument(skip(self), fields(addr = %self.config.get_addr()))]
    fn open(&mut self) -> Result<()> {
        let mut slot = self.session.client.lock();
        if slot.is_some() && !self.session.broken.load(Ordering::SeqCst) {
            return Ok(());
        }
        // A broken link is discarded rather than closed gracefully
        slot.take();

        tracing::debug!("connecting to MS SQL Server");
        let client = block_on(with_timeout(self.connect_timeout, connect(self.config.clone())))
            .map_err(SprocketError::from)?;
        *slot = Some(client);
        self.session.broken.store(false, Ordering::SeqCst);
        tracing::debug!("successfully connected to MS SQL Server");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let client = self.session.client.lock().take();
        let was_broken = self.session.broken.swap(false, Ordering::SeqCst);
        match client {
            Some(client) if !was_broken => {
                block_on(client.close())
                    .map_err(|e| SprocketError::from(MssqlConnectionError::from(e)))?;
                tracing::debug!("closed MS SQL Server connection");
            }
            _ => {}
        }
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<Box<dyn DriverTransaction>> {
        let outcome = self.session.client().and_then(|mut client| {
            block_on(with_timeout(
                self.command_timeout,
                simple(&mut client, "BEGIN TRANSACTION"),
            ))
        });
        self.session.observe(outcome)?;
        tracing::debug!("transaction started");

        Ok(Box::new(MssqlTransaction {
            session: Arc::clone(&self.session),
            command_timeout: self.command_timeout,
            finished: false,
        }))
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("addr", &self.config.get_addr())
            .field("state", &self.session.state())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// A transaction on an open SQL Server connection.
///
/// Dropping it without commit or rollback rolls it back.
pub struct MssqlTransaction {
    session: Arc<Session>,
    command_timeout: Option<Duration>,
    finished: bool,
}

impl MssqlTransaction {
    fn end(&mut self, sql: &str) -> Result<()> {
        self.finished = true;
        let outcome = self.session.client().and_then(|mut client| {
            block_on(with_timeout(self.command_timeout, simple(&mut client, sql)))
        });
        self.session.observe(outcome)
    }
}

impl DriverTransaction for MssqlTransaction {
    #[tracing::instrument(skip(self, parameters), fields(param_count = parameters.len()))]
    fn execute_non_query(
        &mut self,
        procedure: &str,
        parameters: &mut [DriverParameter],
    ) -> Result<u64> {
        let batch = ProcedureBatch::build(procedure, parameters)?;
        let outcome = self.session.client().and_then(|mut client| {
            block_on(with_timeout(
                self.command_timeout,
                non_query(&mut client, &batch, parameters),
            ))
        });
        let affected = self.session.observe(outcome)?;
        tracing::debug!(affected_rows = affected, "execute completed");
        Ok(affected)
    }

    #[tracing::instrument(skip(self, parameters), fields(param_count = parameters.len()))]
    fn execute_reader(
        &mut self,
        procedure: &str,
        parameters: &mut [DriverParameter],
    ) -> Result<Box<dyn RowCursor>> {
        let batch = ProcedureBatch::build(procedure, parameters)?;
        let outcome = self.session.client().and_then(|mut client| {
            block_on(with_timeout(
                self.command_timeout,
                reader(&mut client, &batch, parameters),
            ))
        });
        let cursor = self.session.observe(outcome)?;
        tracing::debug!(rows = cursor.remaining(), "query completed");
        Ok(Box::new(cursor))
    }

    #[tracing::instrument(skip(self, copy, source), fields(table = copy.destination_table()))]
    fn bulk_copy(&mut self, copy: &BulkCopy, source: &mut dyn RowCursor) -> Result<u64> {
        let table = MssqlDialect::new().quote_object_name(copy.destination_table())?;
        let outcome = self.session.client().and_then(|mut client| {
            block_on(with_timeout(
                self.command_timeout,
                bulk_load(&mut client, &table, copy, source),
            ))
        });
        let sent = self.session.observe(outcome)?;
        tracing::debug!(rows = sent, "bulk insert completed");
        Ok(sent)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.end("COMMIT TRANSACTION")?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        // The server may already have aborted the transaction
        self.end("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

impl Drop for MssqlTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("transaction dropped without commit or rollback, rolling back");
        if let Err(err) = self.end("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION") {
            tracing::warn!(error = %err, "rollback of abandoned transaction failed");
        }
    }
}

impl std::fmt::Debug for MssqlTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlTransaction")
            .field("finished", &self.finished)
            .finish()
    }
}
