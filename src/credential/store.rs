//! Credential store seam and its adapters.
//!
//! The store owns durability and the one-record-per-subject rule. `put` replaces
//! a record wholesale (credential reset), `insert` only creates one.

use sqlx::{PgPool, Row};
use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info_span, Instrument};

use super::{CredentialDigest, CredentialRecord, RequiredCount};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a credential already exists for this subject")]
    AlreadyExists,
    #[error("stored credential is corrupt: {0}")]
    Corrupt(String),
    #[error("credential store unavailable: {0}")]
    Backend(String),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

pub trait CredentialStore: Send + Sync {
    fn get<'a>(&'a self, subject_id: &'a str) -> StoreFuture<'a, Option<CredentialRecord>>;
    fn put<'a>(&'a self, record: &'a CredentialRecord) -> StoreFuture<'a, ()>;
    fn insert<'a>(&'a self, record: &'a CredentialRecord) -> StoreFuture<'a, ()>;
    /// Liveness probe for the health endpoint.
    fn ping(&self) -> StoreFuture<'_, ()>;
    /// Short backend name reported by the health endpoint.
    fn kind(&self) -> &'static str;
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore {
    records: Arc<RwLock<HashMap<String, CredentialRecord>>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get<'a>(&'a self, subject_id: &'a str) -> StoreFuture<'a, Option<CredentialRecord>> {
        Box::pin(async move { Ok(self.records.read().await.get(subject_id).cloned()) })
    }

    fn put<'a>(&'a self, record: &'a CredentialRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.records
                .write()
                .await
                .insert(record.subject_id.clone(), record.clone());
            Ok(())
        })
    }

    fn insert<'a>(&'a self, record: &'a CredentialRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            if records.contains_key(&record.subject_id) {
                return Err(StoreError::AlreadyExists);
            }
            records.insert(record.subject_id.clone(), record.clone());
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Postgres-backed store, see `sql/schema.sql`.
#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    error!("Credential store query failed: {}", err);
    StoreError::Backend("database error".to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

impl CredentialStore for PgCredentialStore {
    fn get<'a>(&'a self, subject_id: &'a str) -> StoreFuture<'a, Option<CredentialRecord>> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        Box::pin(
            async move {
                let row = sqlx::query(
                    "SELECT subject_id, required_count, theme, digest \
                     FROM graphical_credentials WHERE subject_id = $1",
                )
                .bind(subject_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

                let Some(row) = row else {
                    return Ok(None);
                };

                let required: i16 = row.try_get("required_count").map_err(backend)?;
                let required_count = RequiredCount::try_from(i64::from(required))
                    .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                let digest: String = row.try_get("digest").map_err(backend)?;

                Ok(Some(CredentialRecord {
                    subject_id: row.try_get("subject_id").map_err(backend)?,
                    required_count,
                    theme: row.try_get("theme").map_err(backend)?,
                    digest: CredentialDigest::from_hex(digest)?,
                }))
            }
            .instrument(span),
        )
    }

    fn put<'a>(&'a self, record: &'a CredentialRecord) -> StoreFuture<'a, ()> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPSERT");
        Box::pin(
            async move {
                sqlx::query(
                    "INSERT INTO graphical_credentials (subject_id, required_count, theme, digest) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (subject_id) DO UPDATE \
                     SET required_count = EXCLUDED.required_count, \
                         theme = EXCLUDED.theme, \
                         digest = EXCLUDED.digest, \
                         updated_at = NOW()",
                )
                .bind(&record.subject_id)
                .bind(i16::from(u8::from(record.required_count)))
                .bind(&record.theme)
                .bind(record.digest.as_str())
                .execute(&self.pool)
                .await
                .map_err(backend)?;
                Ok(())
            }
            .instrument(span),
        )
    }

    fn insert<'a>(&'a self, record: &'a CredentialRecord) -> StoreFuture<'a, ()> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        Box::pin(
            async move {
                let result = sqlx::query(
                    "INSERT INTO graphical_credentials (subject_id, required_count, theme, digest) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(&record.subject_id)
                .bind(i16::from(u8::from(record.required_count)))
                .bind(&record.theme)
                .bind(record.digest.as_str())
                .execute(&self.pool)
                .await;

                match result {
                    Ok(_) => Ok(()),
                    Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists),
                    Err(err) => Err(backend(err)),
                }
            }
            .instrument(span),
        )
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        Box::pin(
            async move {
                sqlx::query("SELECT 1")
                    .execute(&self.pool)
                    .await
                    .map_err(backend)?;
                Ok(())
            }
            .instrument(span),
        )
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}
