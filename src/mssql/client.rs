use tiberius::{Client, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::error::{Result, SqlCommandError};

/// Type alias for a SQL Server client over tokio TCP.
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Open a SQL Server connection, following one routing redirect if the server asks.
///
/// Named instances are resolved through the SQL Browser service.
///
/// # Errors
/// Returns `SqlCommandError::ConnectionError` if the TCP connect or login fails.
pub async fn connect(mut config: Config) -> Result<MssqlClient> {
    match login(config.clone()).await {
        Err(SqlCommandError::MssqlError(tiberius::error::Error::Routing { host, port })) => {
            debug!(%host, port, "SQL Server routed the login");
            config.host(&host);
            config.port(port);
            login(config).await.map_err(as_connection_error)
        }
        other => other.map_err(as_connection_error),
    }
}

async fn login(config: Config) -> Result<MssqlClient> {
    let tcp = TcpStream::connect_named(&config).await?;
    tcp.set_nodelay(true).map_err(|e| {
        SqlCommandError::ConnectionError(format!("TCP socket configuration error: {e}"))
    })?;
    Ok(Client::connect(config, tcp.compat_write()).await?)
}

fn as_connection_error(err: SqlCommandError) -> SqlCommandError {
    match err {
        SqlCommandError::MssqlError(e) => {
            SqlCommandError::ConnectionError(format!("SQL Server connection error: {e}"))
        }
        other => other,
    }
}
