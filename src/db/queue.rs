//! Serialized access to the SQLite store.
//!
//! A single ractor actor owns the only `SqliteConnection`. Callers hold a cheap
//! [`StoreHandle`] and `submit` an [`Operation`]; the actor runs operations one at a
//! time in mailbox (FIFO) order and replies with the [`Outcome`]. Admission is capped
//! by a semaphore sized `db_queue_size`; see [`QueuePolicy`] for what happens at the cap.

use crate::config::QueuePolicy;
use crate::db::connect::{LinearBuilder, connect_with_retry};
use crate::db::schema::SQLITE_INIT;
use crate::error::LaasError;
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};

/// Positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Integer(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Param::Timestamp(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Execute,
    Fetch,
}

/// One unit of work for the store: a statement, its parameters, and whether rows come back.
#[derive(Debug, Clone)]
pub struct Operation {
    statement: &'static str,
    params: Vec<Param>,
    mode: Mode,
}

impl Operation {
    /// A write; the outcome carries the affected row count.
    pub fn execute(statement: &'static str) -> Self {
        Self {
            statement,
            params: Vec::new(),
            mode: Mode::Execute,
        }
    }

    /// A read; the outcome carries every returned row.
    pub fn fetch(statement: &'static str) -> Self {
        Self {
            statement,
            params: Vec::new(),
            mode: Mode::Fetch,
        }
    }

    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    async fn run(self, conn: &mut SqliteConnection) -> Result<Outcome, LaasError> {
        let mut query = sqlx::query(self.statement);
        for param in self.params {
            query = match param {
                Param::Text(v) => query.bind(v),
                Param::Integer(v) => query.bind(v),
                Param::Timestamp(v) => query.bind(v),
            };
        }
        match self.mode {
            Mode::Execute => {
                let done = query.execute(&mut *conn).await?;
                Ok(Outcome::Affected(done.rows_affected()))
            }
            Mode::Fetch => Ok(Outcome::Rows(query.fetch_all(&mut *conn).await?)),
        }
    }
}

pub enum Outcome {
    Rows(Vec<SqliteRow>),
    Affected(u64),
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Rows(rows) => write!(f, "Rows({})", rows.len()),
            Outcome::Affected(n) => write!(f, "Affected({n})"),
        }
    }
}

impl Outcome {
    pub fn into_rows(self) -> Vec<SqliteRow> {
        match self {
            Outcome::Rows(rows) => rows,
            Outcome::Affected(_) => Vec::new(),
        }
    }

    pub fn rows_affected(&self) -> u64 {
        match self {
            Outcome::Rows(rows) => rows.len() as u64,
            Outcome::Affected(n) => *n,
        }
    }
}

pub enum StoreMessage {
    /// Run an operation. The admission slot is released as soon as it has run.
    Submit(
        Operation,
        OwnedSemaphorePermit,
        RpcReplyPort<Result<Outcome, LaasError>>,
    ),
}

impl std::fmt::Debug for StoreMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreMessage::Submit(op, _, _) => f.debug_tuple("Submit").field(&op.statement).finish(),
        }
    }
}

struct StoreActorState {
    conn: SqliteConnection,
    executed: u64,
}

struct StoreActor;

#[ractor::async_trait]
impl Actor for StoreActor {
    type Msg = StoreMessage;
    type State = StoreActorState;
    type Arguments = SqliteConnection;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        conn: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(StoreActorState { conn, executed: 0 })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            StoreMessage::Submit(op, slot, reply) => {
                let statement = op.statement;
                let result = op.run(&mut state.conn).await;
                state.executed += 1;
                drop(slot);
                if let Err(e) = &result {
                    debug!(error = %e, n = state.executed, "statement failed");
                }
                if reply.send(result).is_err() {
                    debug!(statement, "caller dropped before the result was delivered");
                }
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        info!(executed = state.executed, "store worker stopped");
        Ok(())
    }
}

/// Handle to the store worker. Clones share the same worker and admission limit.
#[derive(Clone)]
pub struct StoreHandle {
    actor: ActorRef<StoreMessage>,
    slots: Arc<Semaphore>,
    capacity: usize,
    policy: QueuePolicy,
}

impl StoreHandle {
    /// Open the database at `database_url` (retrying as startup demands), then create tables.
    pub async fn open(
        database_url: &str,
        capacity: usize,
        policy: QueuePolicy,
    ) -> Result<Self, LaasError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        info!(database_url, "connecting to database");
        Self::open_with(
            move || {
                let options = options.clone();
                async move { options.connect().await }
            },
            LinearBuilder::default(),
            capacity,
            policy,
        )
        .await
    }

    pub async fn open_in_memory() -> Result<Self, LaasError> {
        Self::open("sqlite::memory:", 256, QueuePolicy::Reject).await
    }

    /// Like [`StoreHandle::open`] but with the connection step supplied by the caller.
    /// Schema initialization only runs once a connection has been obtained.
    pub async fn open_with<F, Fut>(
        open: F,
        retry: LinearBuilder,
        capacity: usize,
        policy: QueuePolicy,
    ) -> Result<Self, LaasError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<SqliteConnection, sqlx::Error>>,
    {
        let conn = connect_with_retry(open, retry).await?;
        let handle = Self::spawn(conn, capacity, policy).await?;

        info!("checking tables");
        for stmt in SQLITE_INIT {
            handle.submit(Operation::execute(*stmt)).await?;
        }
        info!(capacity = handle.capacity, policy = ?handle.policy, "database is ready");
        Ok(handle)
    }

    async fn spawn(
        conn: SqliteConnection,
        capacity: usize,
        policy: QueuePolicy,
    ) -> Result<Self, LaasError> {
        let capacity = capacity.max(1);
        let (actor, _jh) = Actor::spawn(None, StoreActor, conn)
            .await
            .map_err(|e| LaasError::RactorError(format!("spawn store worker failed: {e}")))?;
        Ok(Self {
            actor,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            policy,
        })
    }

    /// Run `op` on the store worker and wait for its outcome.
    ///
    /// Store errors come back untouched and nothing is retried. Once admitted, an
    /// operation runs even if this future is dropped.
    pub async fn submit(&self, op: Operation) -> Result<Outcome, LaasError> {
        let slot = match self.policy {
            QueuePolicy::Reject => match self.slots.clone().try_acquire_owned() {
                Ok(slot) => slot,
                Err(TryAcquireError::NoPermits) => {
                    return Err(LaasError::QueueSaturated {
                        capacity: self.capacity,
                    });
                }
                Err(TryAcquireError::Closed) => {
                    return Err(LaasError::RactorError("store queue closed".to_string()));
                }
            },
            QueuePolicy::Wait => self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| LaasError::RactorError(format!("store queue closed: {e}")))?,
        };
        ractor::call!(self.actor, StoreMessage::Submit, op, slot)
            .map_err(|e| LaasError::RactorError(format!("store Submit RPC failed: {e}")))?
    }

    /// Operations admitted but not yet answered.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Take an admission slot without running anything, as a busy caller would.
    #[cfg(test)]
    pub(crate) fn occupy_slot(&self) -> OwnedSemaphorePermit {
        self.slots
            .clone()
            .try_acquire_owned()
            .expect("a free admission slot")
    }

    /// Stop the worker; queued operations are dropped and later submits fail.
    pub fn shutdown(&self) {
        self.actor.stop(None);
        self.slots.close();
    }
}
