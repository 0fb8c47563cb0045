use std::sync::LazyLock;

use pgtemp::{PgTempDB, PgTempDBBuilder};
use tokio::sync::OnceCell;

use crate::{PoolConfig, PoolProvider, TxnExecutor};

/// Whether to keep the temporary directory after the database is dropped
///
/// This is set to `false` by default, but can be overridden by the `KEEP_TEMP_DIRS` environment
/// variable.
pub static KEEP_TEMP_DIRS: LazyLock<bool> = LazyLock::new(|| {
    std::env::var("KEEP_TEMP_DIRS")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
});

/// Transaction executor backed by a temporary database
///
/// This is a wrapper around a [`TxnExecutor`] connected to a freshly created
/// database. On drop, the database is deleted.
pub struct TempDb {
    /// Inner executor handle
    inner: TxnExecutor<PoolProvider>,

    /// Connection URL of the temporary database
    url: String,

    /// Temporary database handle
    ///
    /// On drop, the database is deleted.
    _temp_db: PgTempDB,
}

impl TempDb {
    /// Create a new executor backed by a temporary database
    pub async fn new(keep: bool, config: PoolConfig) -> Self {
        // Set C locale. To remove this `unsafe` we need:
        // https://github.com/boustrophedon/pgtemp/pull/21
        unsafe {
            std::env::set_var("LANG", "C");
        }

        let builder = PgTempDBBuilder::new().persist_data(keep);
        let pg_temp = PgTempDB::from_builder(builder);

        let data_dir = pg_temp.data_dir();
        tracing::info!("initializing temp database at: {}", data_dir.display());
        let url = pg_temp.connection_uri();
        tracing::info!("connecting to temp database at: {}", url);

        let executor = TxnExecutor::connect_with_retry(&url, config)
            .await
            .expect("failed to connect to temp database");

        TempDb {
            inner: executor,
            url,
            _temp_db: pg_temp,
        }
    }

    /// Get the URL of the temporary database
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::ops::Deref for TempDb {
    type Target = TxnExecutor<PoolProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Temp database for sharing among tests. It is shared with the reasoning that this helps us
/// catch more bugs, even if it is less deterministic.
static TEMP_DB: OnceCell<TempDb> = OnceCell::const_new();

/// Get the shared temporary database executor
///
/// This is a shared instance of the temporary database that can be used by tests.
///
/// The `keep` parameter controls whether the temporary directory is kept after the database is
/// dropped.
pub async fn temp_db(keep: bool, config: PoolConfig) -> &'static TempDb {
    TEMP_DB
        .get_or_init(|| async { TempDb::new(keep, config).await })
        .await
}
