//! Connection lifecycle

use sprocket_core::{
    ConnectionConfig, ConnectionState, Driver, DriverConnection, Result, SprocketError,
};
use sprocket_drivers::DriverRegistry;

/// Owns one driver connection for the lifetime of the context.
///
/// Once disposed the handle is gone for good: every operation other than
/// disposal fails with a connection-state error. Dropping an undisposed
/// context closes the connection.
pub struct ConnectionContext {
    connection: Option<Box<dyn DriverConnection>>,
    disposed: bool,
}

impl ConnectionContext {
    /// Construct a connection with `driver` and open it
    #[tracing::instrument(
        skip(driver, config),
        fields(driver_id = driver.id(), connection_name = %config.name)
    )]
    pub fn create(driver: &dyn Driver, config: &ConnectionConfig) -> Result<Self> {
        let connection = driver.create_connection(config)?;
        let mut context = Self::from_connection(connection);
        context.validate_connection_state()?;
        tracing::debug!("connection context ready");
        Ok(context)
    }

    /// Resolve the driver named by `config.driver` among the built-in
    /// drivers, then [`create`](Self::create)
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let registry = DriverRegistry::with_defaults();
        let driver = registry.get(&config.driver).ok_or_else(|| {
            SprocketError::Configuration(format!("unknown driver '{}'", config.driver))
        })?;
        Self::create(driver.as_ref(), config)
    }

    /// Wrap an existing handle without opening it
    pub fn from_connection(connection: Box<dyn DriverConnection>) -> Self {
        Self {
            connection: Some(connection),
            disposed: false,
        }
    }

    /// State of the wrapped handle, `Absent` once it has been released
    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Absent, |c| c.state())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn driver_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.driver_name())
    }

    /// Make sure the connection is usable, opening it when it is closed or
    /// broken. An open failure is returned as is and not retried.
    pub fn validate_connection_state(&mut self) -> Result<()> {
        let connection = self.connection_mut()?;
        match connection.state() {
            ConnectionState::Open => Ok(()),
            state @ (ConnectionState::Closed | ConnectionState::Broken) => {
                tracing::debug!(%state, driver = connection.driver_name(), "opening connection");
                connection.open().map_err(|e| {
                    tracing::error!(error = %e, "failed to open connection");
                    e
                })
            }
            ConnectionState::Absent => Err(SprocketError::ConnectionState(
                "driver reported no connection handle".into(),
            )),
        }
    }

    /// Close the connection and release the handle. Calling this again is a
    /// no-op.
    pub fn dispose(&mut self) {
        self.teardown(true);
    }

    /// Release the handle exactly once, whether called by [`dispose`] or by
    /// `Drop`. Close errors are logged and swallowed.
    ///
    /// [`dispose`]: Self::dispose
    fn teardown(&mut self, explicit: bool) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                tracing::warn!(
                    error = %e,
                    driver = connection.driver_name(),
                    explicit,
                    "failed to close connection during teardown"
                );
            }
        }
        tracing::debug!(explicit, "connection context disposed");
    }

    pub(crate) fn connection_mut(&mut self) -> Result<&mut Box<dyn DriverConnection>> {
        match self.connection.as_mut() {
            Some(connection) => Ok(connection),
            None if self.disposed => Err(SprocketError::ConnectionState(
                "connection context has been disposed".into(),
            )),
            None => Err(SprocketError::ConnectionState(
                "connection context has no connection".into(),
            )),
        }
    }
}

impl Drop for ConnectionContext {
    fn drop(&mut self) {
        self.teardown(false);
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("driver", &self.driver_name())
            .field("state", &self.state())
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests;
