//! Integration tests against the shared temporary database

use futures::FutureExt as _;

use super::TestError;
use crate::{ConnPool, Outcome, PoolConfig, temp};

#[tokio::test]
async fn shared_database_serves_attempts_across_tests() {
    //* Given
    let shared = temp::temp_db(*temp::KEEP_TEMP_DIRS, PoolConfig::default()).await;
    sqlx::query("CREATE TABLE IF NOT EXISTS shared_tab (col1 VARCHAR NOT NULL)")
        .execute(shared.provider().pool())
        .await
        .expect("Failed to create shared table");

    //* When
    let write: Outcome<(), TestError> = shared
        .execute(|mut ctx| {
            Ok(async move {
                sqlx::query("INSERT INTO shared_tab (col1) VALUES ('shared-value')")
                    .execute(&mut ctx)
                    .await?;
                Ok(())
            }
            .boxed())
        })
        .await;
    write.expect("Failed to commit on the shared database");

    //* Then
    let read: Outcome<String, TestError> = shared
        .execute(|mut ctx| {
            Ok(async move {
                let value = sqlx::query_scalar(
                    "SELECT col1 FROM shared_tab WHERE col1 = 'shared-value' LIMIT 1",
                )
                .fetch_one(&mut ctx)
                .await?;
                Ok(value)
            }
            .boxed())
        })
        .await;
    assert_eq!(
        read.expect("Failed to read back from the shared database"),
        "shared-value"
    );

    // The committed row is also visible to a connection made from the
    // advertised url, outside the executor
    let outside = ConnPool::connect_with_retry(shared.url(), PoolConfig::default())
        .await
        .expect("Failed to connect to the shared database url");
    let seen: String =
        sqlx::query_scalar("SELECT col1 FROM shared_tab WHERE col1 = 'shared-value' LIMIT 1")
            .fetch_one(&outside)
            .await
            .expect("Failed to read through the outside connection");
    assert_eq!(seen, "shared-value");
}
