//! Ephemeral per-session workflow state.
//!
//! A session lives for the lifetime of this process only; nothing here is
//! persisted. The registry hands out `Arc<Mutex<Session>>` handles so that
//! the orchestrator can hold one session's lock across a whole step
//! execution while other sessions proceed untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::scenarios::Scenario;
use crate::workflow::Step;

/// Which side of the contract a session is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    DataProvider,
    DataConsumer,
}

impl Role {
    /// Environment key whose value names this party's identity username.
    pub fn username_key(&self) -> &'static str {
        match self {
            Role::DataProvider => "TDP_USERNAME",
            Role::DataConsumer => "TDC_USERNAME",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::DataProvider => "data-provider",
            Role::DataConsumer => "data-consumer",
        }
    }
}

/// Per-role flags for identity-document creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidFlags {
    pub provider: bool,
    pub consumer: bool,
}

/// One demo session: accumulated configuration plus the durable facts the
/// steps establish.
///
/// `sequence_number`, once set by a registration step, stays put until a
/// later registration step overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created: DateTime<Utc>,
    pub config: HashMap<String, String>,
    pub scenario: Option<Scenario>,
    pub role: Option<Role>,
    pub sequence_number: Option<u64>,
    pub completed_steps: Vec<Step>,
    pub did_created: DidFlags,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            created: Utc::now(),
            config: HashMap::new(),
            scenario: None,
            role: None,
            sequence_number: None,
            completed_steps: Vec::new(),
            did_created: DidFlags::default(),
        }
    }

    /// Merge configuration keys on top of what the session already holds.
    pub fn update_config(&mut self, overrides: &HashMap<String, String>) {
        for (key, value) in overrides {
            self.config.insert(key.clone(), value.clone());
        }
    }

    /// The configured username for a party, if any.
    pub fn username_for(&self, role: Role) -> Option<&str> {
        self.config.get(role.username_key()).map(String::as_str)
    }

    pub fn record_sequence_number(&mut self, sequence_number: u64) {
        debug!(
            session = %self.id,
            sequence_number,
            previous = ?self.sequence_number,
            "Recording contract sequence number"
        );
        self.sequence_number = Some(sequence_number);
    }

    /// Append to the ordered set of completed steps (idempotent).
    pub fn mark_step_completed(&mut self, step: Step) {
        if !self.completed_steps.contains(&step) {
            self.completed_steps.push(step);
        }
    }

    pub fn mark_did_created(&mut self, role: Role) {
        match role {
            Role::DataProvider => self.did_created.provider = true,
            Role::DataConsumer => self.did_created.consumer = true,
        }
    }
}

/// Shared handle to one session; the orchestrator locks it for the duration
/// of each step execution.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// In-memory session registry.
///
/// Lookup and creation are cheap map operations under a plain mutex; the
/// per-session async mutex is what serializes step execution. Abandoned
/// sessions are tolerated; `expire_older_than` offers an optional sweep.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and return its id together with the shared handle.
    pub fn create(&self) -> (String, SharedSession) {
        // Short ids read better in logs and command lines; the first 8 hex
        // chars of a v4 UUID are plenty for a process-lifetime registry.
        let id = Uuid::new_v4().to_string()[..8].to_string();
        let session: SharedSession = Arc::new(tokio::sync::Mutex::new(Session::new(id.clone())));
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), Arc::clone(&session));
        info!(session = %id, "Created demo session");
        (id, session)
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.lock().unwrap().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions older than `ttl` whose locks are free. A session whose
    /// lock is held is mid-step and is left alone for the next sweep.
    pub fn expire_older_than(&self, ttl: ChronoDuration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|id, handle| match handle.try_lock() {
            Ok(session) => {
                let keep = session.created > cutoff;
                if !keep {
                    debug!(session = %id, created = %session.created, "Expiring idle session");
                }
                keep
            }
            Err(_) => true,
        });
        before - sessions.len()
    }
}
