//! Scripted in-memory driver for tests
//!
//! Every boundary call is recorded as an [`Event`]; failures, output values
//! and result rows are scripted through [`Mock::configure`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sprocket_core::{
    BufferedCursor, BulkCopy, ColumnMeta, ConnectionConfig, ConnectionState, Driver,
    DriverConnection, DriverParameter, DriverTransaction, Result, Row, RowCursor, SprocketError,
    Value,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Open,
    Close,
    Begin,
    NonQuery(String),
    Reader(String),
    BulkCopy(BulkCopy),
    Commit,
    Rollback,
}

/// Behaviour of the mock connection
pub(crate) struct Script {
    pub state: ConnectionState,
    pub events: Vec<Event>,
    pub open_error: Option<SprocketError>,
    pub close_error: Option<SprocketError>,
    pub execute_error: Option<SprocketError>,
    /// State the connection falls into when execution fails
    pub state_after_failure: Option<ConnectionState>,
    pub commit_error: Option<SprocketError>,
    pub rollback_error: Option<SprocketError>,
    pub bulk_error: Option<SprocketError>,
    pub rows_affected: u64,
    /// Values written into output slots, by bare parameter name
    pub outputs: HashMap<String, Value>,
    pub result_columns: Vec<ColumnMeta>,
    pub result_rows: Vec<Row>,
    /// Error raised by the result cursor once its rows are exhausted
    pub row_error: Option<SprocketError>,
    pub rows_bulk_loaded: Vec<Row>,
}

impl Script {
    fn new(state: ConnectionState) -> Self {
        Self {
            state,
            events: Vec::new(),
            open_error: None,
            close_error: None,
            execute_error: None,
            state_after_failure: None,
            commit_error: None,
            rollback_error: None,
            bulk_error: None,
            rows_affected: 0,
            outputs: HashMap::new(),
            result_columns: Vec::new(),
            result_rows: Vec::new(),
            row_error: None,
            rows_bulk_loaded: Vec::new(),
        }
    }

    fn fail_execution(&mut self) -> Result<()> {
        match self.execute_error.take() {
            Some(e) => {
                if let Some(state) = self.state_after_failure {
                    self.state = state;
                }
                Err(e)
            }
            None => Ok(()),
        }
    }

    fn fill_outputs(&self, parameters: &mut [DriverParameter]) {
        for param in parameters.iter_mut() {
            if param.direction.receives_output() {
                param.value = Some(
                    self.outputs
                        .get(param.bare_name())
                        .cloned()
                        .unwrap_or(Value::Null),
                );
            }
        }
    }
}

/// Handle shared by the test and every object the mock hands out
#[derive(Clone)]
pub(crate) struct Mock {
    script: Arc<Mutex<Script>>,
}

impl Mock {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::new(state))),
        }
    }

    pub(crate) fn configure(&self, f: impl FnOnce(&mut Script)) -> &Self {
        f(&mut *self.script.lock());
        self
    }

    pub(crate) fn connection(&self) -> Box<dyn DriverConnection> {
        Box::new(MockConnection {
            script: self.script.clone(),
        })
    }

    pub(crate) fn driver(&self) -> MockDriver {
        MockDriver {
            script: self.script.clone(),
        }
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.script.lock().events.clone()
    }

    pub(crate) fn count(&self, event: &Event) -> usize {
        self.script
            .lock()
            .events
            .iter()
            .filter(|e| *e == event)
            .count()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.script.lock().state
    }

    pub(crate) fn rows_bulk_loaded(&self) -> Vec<Row> {
        self.script.lock().rows_bulk_loaded.clone()
    }
}

pub(crate) struct MockDriver {
    script: Arc<Mutex<Script>>,
}

impl Driver for MockDriver {
    fn id(&self) -> &'static str {
        "mock"
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    fn create_connection(&self, _config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>> {
        Ok(Box::new(MockConnection {
            script: self.script.clone(),
        }))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        format!("mock://{}", config.name)
    }
}

struct MockConnection {
    script: Arc<Mutex<Script>>,
}

impl DriverConnection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn state(&self) -> ConnectionState {
        self.script.lock().state
    }

    fn open(&mut self) -> Result<()> {
        let mut script = self.script.lock();
        script.events.push(Event::Open);
        if let Some(e) = script.open_error.take() {
            return Err(e);
        }
        script.state = ConnectionState::Open;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut script = self.script.lock();
        script.events.push(Event::Close);
        script.state = ConnectionState::Closed;
        match script.close_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn begin_transaction(&mut self) -> Result<Box<dyn DriverTransaction>> {
        let mut script = self.script.lock();
        if script.state != ConnectionState::Open {
            return Err(SprocketError::ConnectionState(format!(
                "cannot begin a transaction on a {} connection",
                script.state
            )));
        }
        script.events.push(Event::Begin);
        Ok(Box::new(MockTransaction {
            script: self.script.clone(),
        }))
    }
}

struct MockTransaction {
    script: Arc<Mutex<Script>>,
}

impl DriverTransaction for MockTransaction {
    fn execute_non_query(
        &mut self,
        procedure: &str,
        parameters: &mut [DriverParameter],
    ) -> Result<u64> {
        let mut script = self.script.lock();
        script.events.push(Event::NonQuery(procedure.to_string()));
        script.fail_execution()?;
        script.fill_outputs(parameters);
        Ok(script.rows_affected)
    }

    fn execute_reader(
        &mut self,
        procedure: &str,
        parameters: &mut [DriverParameter],
    ) -> Result<Box<dyn RowCursor>> {
        let mut script = self.script.lock();
        script.events.push(Event::Reader(procedure.to_string()));
        script.fail_execution()?;
        script.fill_outputs(parameters);
        let rows = BufferedCursor::new(script.result_columns.clone(), script.result_rows.clone());
        Ok(Box::new(MockCursor {
            rows,
            error: script.row_error.take(),
        }))
    }

    fn bulk_copy(&mut self, copy: &BulkCopy, source: &mut dyn RowCursor) -> Result<u64> {
        let mut script = self.script.lock();
        script.events.push(Event::BulkCopy(copy.clone()));
        if let Some(e) = script.bulk_error.take() {
            return Err(e);
        }
        let mut sent = 0;
        while let Some(row) = source.next_row()? {
            script.rows_bulk_loaded.push(row);
            sent += 1;
        }
        Ok(sent)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut script = self.script.lock();
        script.events.push(Event::Commit);
        match script.commit_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        let mut script = self.script.lock();
        script.events.push(Event::Rollback);
        match script.rollback_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct MockCursor {
    rows: BufferedCursor,
    error: Option<SprocketError>,
}

impl RowCursor for MockCursor {
    fn columns(&self) -> &[ColumnMeta] {
        self.rows.columns()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        match self.rows.next_row()? {
            Some(row) => Ok(Some(row)),
            None => match self.error.take() {
                Some(e) => Err(e),
                None => Ok(None),
            },
        }
    }
}

/// A source cursor with `field_count` string columns
pub(crate) fn source_cursor(field_count: usize, rows: usize) -> BufferedCursor {
    let names: Vec<String> = (0..field_count).map(|i| format!("f{}", i)).collect();
    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| ColumnMeta::new(name.clone(), "nvarchar", i))
        .collect();
    let rows = (0..rows)
        .map(|r| {
            let values = (0..field_count)
                .map(|f| Value::String(format!("r{}f{}", r, f)))
                .collect();
            Row::new(names.clone(), values)
        })
        .collect();
    BufferedCursor::new(columns, rows)
}

/// Route `tracing` output to the test harness; honours `RUST_LOG`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
