//! Caller-facing repository API.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::core::dynamic::Dynamic;
use crate::core::reflect::{Record, Reflect};
use crate::core::traits::{Parameter, Provider};
use crate::drivers::ProviderImpl;
use crate::error::Result;
use crate::executor::Executor;

/// CRUD operations over one configured backend.
///
/// Every operation is fallible except [`is_available`](Self::is_available).
#[async_trait]
pub trait DataRepository: Send + Sync {
    /// Run an insert with `record`'s fields bound and return the generated id.
    async fn create(&self, sql: &str, record: &dyn Reflect) -> Result<i64>;

    /// Bulk-load `records` into the table `target`.
    async fn create_many<T: Record>(&self, records: &[T], target: &str) -> Result<u64>;

    /// Run a query and materialize one `T` per row.
    async fn read<T: Record>(&self, sql: &str, params: &[Parameter]) -> Result<Vec<T>>;

    /// Run a query and stamp one bag per row from `prototype`.
    async fn read_dynamic(
        &self,
        prototype: &Dynamic,
        sql: &str,
        params: &[Parameter],
    ) -> Result<Vec<Dynamic>>;

    /// Run an update. The returned value is 0 unless the command yields an id.
    async fn update(
        &self,
        sql: &str,
        record: Option<&dyn Reflect>,
        params: &[Parameter],
    ) -> Result<i64>;

    /// Run a delete. The returned value is 0 unless the command yields an id.
    async fn delete(
        &self,
        sql: &str,
        record: Option<&dyn Reflect>,
        params: &[Parameter],
    ) -> Result<i64>;

    /// Whether a connection can be opened right now.
    async fn is_available(&self) -> bool;
}

/// [`DataRepository`] over any [`Provider`].
#[derive(Clone)]
pub struct SqlRepository {
    executor: Executor,
}

impl SqlRepository {
    /// Create a repository over `provider`.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            executor: Executor::new(provider),
        }
    }

    /// Create a repository for the provider described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = ProviderImpl::from_config(&config.provider)?;
        Ok(Self::new(Arc::new(provider)))
    }

    /// The underlying executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

#[async_trait]
impl DataRepository for SqlRepository {
    async fn create(&self, sql: &str, record: &dyn Reflect) -> Result<i64> {
        self.executor.execute(sql, &[], Some(record)).await
    }

    async fn create_many<T: Record>(&self, records: &[T], target: &str) -> Result<u64> {
        self.executor.bulk_insert(records, target).await
    }

    async fn read<T: Record>(&self, sql: &str, params: &[Parameter]) -> Result<Vec<T>> {
        self.executor.query(sql, params).await
    }

    async fn read_dynamic(
        &self,
        prototype: &Dynamic,
        sql: &str,
        params: &[Parameter],
    ) -> Result<Vec<Dynamic>> {
        self.executor.query_dynamic(prototype, sql, params).await
    }

    async fn update(
        &self,
        sql: &str,
        record: Option<&dyn Reflect>,
        params: &[Parameter],
    ) -> Result<i64> {
        self.executor.execute(sql, params, record).await
    }

    async fn delete(
        &self,
        sql: &str,
        record: Option<&dyn Reflect>,
        params: &[Parameter],
    ) -> Result<i64> {
        self.executor.execute(sql, params, record).await
    }

    async fn is_available(&self) -> bool {
        self.executor.is_available().await
    }
}
