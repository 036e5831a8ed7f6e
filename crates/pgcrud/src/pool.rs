//! Connection pool construction

use crate::config::DatabaseConfig;
use crate::error::{CrudError, CrudResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use tokio_postgres::Socket;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};

/// Create a pool without TLS.
///
/// Fails with [`CrudError::Config`] when the configuration asks for TLS; use
/// [`create_pool_with_tls`] with a connector in that case.
///
/// # Example
///
/// ```ignore
/// let pool = pgcrud::create_pool(&DatabaseConfig::from_env()?)?;
/// ```
pub fn create_pool(config: &DatabaseConfig) -> CrudResult<Pool> {
    if config.tls {
        return Err(CrudError::Config(
            "tls is enabled; build the pool with create_pool_with_tls".to_string(),
        ));
    }
    create_pool_with_tls(config, NoTls)
}

/// Create a pool using a custom TLS connector.
pub fn create_pool_with_tls<T>(config: &DatabaseConfig, tls: T) -> CrudResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    config.validate()?;

    let mgr = Manager::from_config(config.to_pg_config(), tls, default_manager_config());
    Pool::builder(mgr)
        .max_size(config.max_connections)
        .build()
        .map_err(|e| {
            let err = CrudError::Pool(e.to_string());
            (config.on_pool_error)(&err);
            err
        })
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}
