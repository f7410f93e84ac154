//! Pending registrations awaiting their emailed verification code.
//!
//! The actor owns every pending record together with its deadline. A single
//! periodic `Sweep` removes records whose deadline has passed, so replacing or
//! promoting a record is just a map mutation and no stale timer can reach a
//! newer record for the same email.

use crate::db::normalize_email;
use crate::error::LaasError;
use crate::service::mailer::Mailer;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const CODE_LETTERS: usize = 16;

/// Account fields held back until the email address is proven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// Sixteen lowercase letters in dash-separated groups of four, e.g. `qwer-tyui-opas-dfgh`.
/// This is a typing aid for humans, not a secret of cryptographic strength.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(CODE_LETTERS + CODE_LETTERS / 4 - 1);
    for i in 0..CODE_LETTERS {
        code.push(rng.gen_range(b'a'..=b'z') as char);
        if i % 4 == 3 && i != CODE_LETTERS - 1 {
            code.push('-');
        }
    }
    code
}

struct PendingEntry {
    account: StagedAccount,
    code: String,
    deadline: Instant,
    generation: u64,
}

/// A record taken out of the registry by a successful `complete`.
///
/// Until the account is persisted it can be handed back with
/// [`PendingAccountsHandle::restore`], keeping its code and deadline.
#[derive(Debug)]
pub struct Verified {
    pub account: StagedAccount,
    code: String,
    deadline: Instant,
    generation: u64,
}

#[derive(Debug)]
pub enum PendingMessage {
    /// Stage an account under a fresh code, superseding any earlier record.
    /// Replies with its generation.
    Stage(StagedAccount, String, RpcReplyPort<u64>),
    /// Promote the record if the code matches and the deadline has not passed.
    Complete(String, String, RpcReplyPort<Result<Verified, LaasError>>),
    /// Put a promoted record back unless a newer one was staged meanwhile.
    Restore(Verified, RpcReplyPort<bool>),
    Contains(String, RpcReplyPort<bool>),
    Len(RpcReplyPort<usize>),

    // Internal messages (sent by the sweeper task)
    Sweep,
}

pub struct PendingArgs {
    pub ttl: Duration,
    pub sweep_every: Duration,
}

struct PendingState {
    entries: HashMap<String, PendingEntry>,
    next_generation: u64,
    ttl: Duration,
    sweeper: JoinHandle<()>,
}

struct PendingActor;

#[ractor::async_trait]
impl Actor for PendingActor {
    type Msg = PendingMessage;
    type State = PendingState;
    type Arguments = PendingArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let me = myself.clone();
        let period = args.sweep_every;
        let sweeper = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if ractor::cast!(me, PendingMessage::Sweep).is_err() {
                    break;
                }
            }
        });
        info!(
            ttl_secs = args.ttl.as_secs(),
            sweep_ms = period.as_millis() as u64,
            "pending account registry started"
        );
        Ok(PendingState {
            entries: HashMap::new(),
            next_generation: 0,
            ttl: args.ttl,
            sweeper,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PendingMessage::Stage(account, code, reply) => {
                let generation = state.stage(account, code);
                let _ = reply.send(generation);
            }
            PendingMessage::Complete(email, code, reply) => {
                let _ = reply.send(state.complete(&email, &code));
            }
            PendingMessage::Restore(verified, reply) => {
                let _ = reply.send(state.restore(verified));
            }
            PendingMessage::Contains(email, reply) => {
                let _ = reply.send(state.entries.contains_key(&email));
            }
            PendingMessage::Len(reply) => {
                let _ = reply.send(state.entries.len());
            }
            PendingMessage::Sweep => state.sweep(),
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.sweeper.abort();
        info!(dropped = state.entries.len(), "pending account registry stopped");
        Ok(())
    }
}

impl PendingState {
    fn stage(&mut self, account: StagedAccount, code: String) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        let email = account.email.clone();
        let entry = PendingEntry {
            account,
            code,
            deadline: Instant::now() + self.ttl,
            generation,
        };
        match self.entries.insert(email.clone(), entry) {
            Some(old) => info!(
                email = %email,
                superseded = old.generation,
                generation,
                "pending registration superseded"
            ),
            None => debug!(email = %email, generation, "pending registration staged"),
        }
        generation
    }

    fn complete(&mut self, email: &str, code: &str) -> Result<Verified, LaasError> {
        let now = Instant::now();
        let Some(entry) = self.entries.get(email) else {
            return Err(LaasError::VerificationFailed);
        };
        if entry.deadline <= now {
            self.entries.remove(email);
            debug!(email, "verification attempted after deadline");
            return Err(LaasError::VerificationFailed);
        }
        if !bool::from(entry.code.as_bytes().ct_eq(code.as_bytes())) {
            debug!(email, "verification code mismatch");
            return Err(LaasError::VerificationFailed);
        }
        let entry = self
            .entries
            .remove(email)
            .ok_or(LaasError::VerificationFailed)?;
        info!(email, generation = entry.generation, "pending registration promoted");
        Ok(Verified {
            account: entry.account,
            code: entry.code,
            deadline: entry.deadline,
            generation: entry.generation,
        })
    }

    fn restore(&mut self, verified: Verified) -> bool {
        let email = verified.account.email.clone();
        if self.entries.contains_key(&email) {
            debug!(email = %email, generation = verified.generation, "newer registration kept");
            return false;
        }
        if verified.deadline <= Instant::now() {
            return false;
        }
        info!(email = %email, generation = verified.generation, "pending registration restored");
        self.entries.insert(
            email,
            PendingEntry {
                account: verified.account,
                code: verified.code,
                deadline: verified.deadline,
                generation: verified.generation,
            },
        );
        true
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.deadline > now);
        let expired = before - self.entries.len();
        if expired > 0 {
            info!(expired, remaining = self.entries.len(), "expired pending registrations removed");
        }
    }
}

/// Handle for the pending-account registry.
#[derive(Clone)]
pub struct PendingAccountsHandle {
    actor: ActorRef<PendingMessage>,
    mailer: Arc<dyn Mailer>,
}

impl PendingAccountsHandle {
    pub async fn spawn(
        ttl: Duration,
        sweep_every: Duration,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, LaasError> {
        let (actor, _jh) = Actor::spawn(None, PendingActor, PendingArgs { ttl, sweep_every })
            .await
            .map_err(|e| LaasError::RactorError(format!("spawn pending registry failed: {e}")))?;
        Ok(Self { actor, mailer })
    }

    /// Mail `account` a verification code, then stage it under that code.
    ///
    /// The record is only staged once the mail went out, so a failed send leaves
    /// any earlier registration for the same email (and its code) untouched.
    pub async fn register(&self, mut account: StagedAccount) -> Result<(), LaasError> {
        account.email = normalize_email(&account.email);
        let email = account.email.clone();
        let code = generate_code();

        if let Err(e) = self.mailer.send_code(&email, &code).await {
            warn!(email = %email, error = %e, "verification mail failed; nothing staged");
            return Err(e);
        }

        let generation = ractor::call!(self.actor, PendingMessage::Stage, account, code)
            .map_err(|e| LaasError::RactorError(format!("Stage RPC failed: {e}")))?;
        info!(email = %email, generation, "verification code sent");
        Ok(())
    }

    /// Exchange a correct, unexpired code for the staged account. Succeeds at most once
    /// unless the result is handed back through [`PendingAccountsHandle::restore`].
    pub async fn complete(&self, email: &str, code: &str) -> Result<Verified, LaasError> {
        ractor::call!(
            self.actor,
            PendingMessage::Complete,
            normalize_email(email),
            code.trim().to_string()
        )
        .map_err(|e| LaasError::RactorError(format!("Complete RPC failed: {e}")))?
    }

    /// Return a promoted record whose account could not be persisted.
    /// Reports whether it was reinstated; a newer registration or a passed deadline wins.
    pub async fn restore(&self, verified: Verified) -> Result<bool, LaasError> {
        ractor::call!(self.actor, PendingMessage::Restore, verified)
            .map_err(|e| LaasError::RactorError(format!("Restore RPC failed: {e}")))
    }

    pub async fn contains(&self, email: &str) -> Result<bool, LaasError> {
        ractor::call!(self.actor, PendingMessage::Contains, normalize_email(email))
            .map_err(|e| LaasError::RactorError(format!("Contains RPC failed: {e}")))
    }

    pub async fn len(&self) -> Result<usize, LaasError> {
        ractor::call!(self.actor, PendingMessage::Len)
            .map_err(|e| LaasError::RactorError(format!("Len RPC failed: {e}")))
    }

    pub fn shutdown(&self) {
        self.actor.stop(None);
    }
}
