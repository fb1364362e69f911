use std::fmt;

use async_trait::async_trait;
use tiberius::{AuthMethod, Config as TiberiusConfig};

use super::client::connect;
use super::connection::MssqlConnection;
use crate::backend::Connector;
use crate::error::{Result, SqlCommandError};
use crate::types::DatabaseType;

/// Discrete SQL Server connection settings, for callers without an ADO string.
#[derive(Debug, Clone)]
pub struct MssqlOptions {
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub trust_cert: bool,
}

impl MssqlOptions {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            server,
            database,
            user,
            password,
            port: None,
            instance_name: None,
            trust_cert: false,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    /// Accept the server certificate without validation (development servers).
    #[must_use]
    pub fn with_trust_cert(mut self, trust_cert: bool) -> Self {
        self.trust_cert = trust_cert;
        self
    }
}

/// Fluent builder for [`MssqlOptions`].
#[derive(Debug, Clone)]
pub struct MssqlOptionsBuilder {
    opts: MssqlOptions,
}

impl MssqlOptionsBuilder {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            opts: MssqlOptions::new(server, database, user, password),
        }
    }

    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.opts.port = port;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: Option<String>) -> Self {
        self.opts.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn trust_cert(mut self, trust_cert: bool) -> Self {
        self.opts.trust_cert = trust_cert;
        self
    }

    #[must_use]
    pub fn finish(self) -> MssqlOptions {
        self.opts
    }

    #[must_use]
    pub fn build(self) -> MssqlConnector {
        MssqlConnector::from_options(&self.finish())
    }
}

/// Opens one tiberius connection per call from a fixed configuration.
#[derive(Clone)]
pub struct MssqlConnector {
    config: TiberiusConfig,
}

impl MssqlConnector {
    #[must_use]
    pub fn builder(
        server: String,
        database: String,
        user: String,
        password: String,
    ) -> MssqlOptionsBuilder {
        MssqlOptionsBuilder::new(server, database, user, password)
    }

    /// Parse an ADO.NET style connection string
    /// (`server=tcp:host,1433;database=app;user id=sa;password=...;TrustServerCertificate=true`).
    ///
    /// # Errors
    /// Returns `SqlCommandError::ConfigError` if the string cannot be parsed.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let config = TiberiusConfig::from_ado_string(connection_string).map_err(|e| {
            SqlCommandError::ConfigError(format!("invalid SQL Server connection string: {e}"))
        })?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn from_options(opts: &MssqlOptions) -> Self {
        Self {
            config: build_tiberius_config(opts),
        }
    }

    /// `host:port` the connector dials.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.get_addr()
    }
}

impl fmt::Debug for MssqlConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The tiberius config carries credentials.
        f.debug_struct("MssqlConnector")
            .field("address", &self.config.get_addr())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    type Conn = MssqlConnection;

    async fn open(&self) -> Result<MssqlConnection> {
        let client = connect(self.config.clone()).await?;
        Ok(MssqlConnection::new(client))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mssql
    }
}

fn build_tiberius_config(opts: &MssqlOptions) -> TiberiusConfig {
    let mut config = TiberiusConfig::new();
    config.host(&opts.server);
    config.database(&opts.database);
    config.port(opts.port.unwrap_or(1433));
    config.authentication(AuthMethod::sql_server(&opts.user, &opts.password));
    if let Some(instance) = &opts.instance_name {
        config.instance_name(instance);
    }
    if opts.trust_cert {
        config.trust_cert();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_is_parsed() {
        let connector = MssqlConnector::from_connection_string(
            "server=tcp:db.local,1444;database=app;user id=sa;password=secret;TrustServerCertificate=true",
        )
        .unwrap();
        assert_eq!(connector.address(), "db.local:1444");
        assert!(!format!("{connector:?}").contains("secret"));
    }

    #[test]
    fn options_default_to_port_1433() {
        let connector = MssqlConnector::builder(
            "localhost".into(),
            "app".into(),
            "sa".into(),
            "pw".into(),
        )
        .build();
        assert_eq!(connector.address(), "localhost:1433");
    }
}
