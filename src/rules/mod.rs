//! Alert rules: parameters, notification targets, lifecycle and storage.

mod lenient;
pub mod notify;
pub mod params;
pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::calendar::MAX_WINDOW_DAYS;

pub use notify::NotificationTargets;
pub use params::{RuleParams, RuleScope, RuleThresholds, percent_to_fraction};
pub use repository::RuleRepository;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule name must not be empty")]
    EmptyName,
    #[error("a rule named {0:?} already exists")]
    DuplicateName(String),
    #[error("no rule with id {0}")]
    NotFound(u64),
    #[error("cannot move a rule from {from} to {to}")]
    InvalidTransition { from: RuleState, to: RuleState },
    #[error("rule {name:?} is {state} and cannot be evaluated")]
    NotEvaluable { name: String, state: RuleState },
    #[error("lookback of {0} days exceeds the {max}-day limit", max = MAX_WINDOW_DAYS)]
    LookbackTooLong(u32),
    #[error("at most {max} e-mail addresses, got {0}", max = notify::MAX_EMAILS)]
    TooManyEmails(usize),
    #[error("at most {max} phone numbers, got {0}", max = notify::MAX_PHONES)]
    TooManyPhones(usize),
    #[error("invalid e-mail address {0:?}")]
    InvalidEmail(String),
    #[error("invalid phone number {0:?}")]
    InvalidPhone(String),
    #[error("rule file I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("rule file format: {0}")]
    Json(#[from] serde_json::Error),
}

/// `Draft -> Saved -> Deleted`. Saving a saved rule is an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    #[default]
    Draft,
    Saved,
    Deleted,
}

impl RuleState {
    pub fn transition(self, to: RuleState) -> Result<RuleState, RuleError> {
        use RuleState::*;
        match (self, to) {
            (Draft, Saved) | (Saved, Saved) | (Draft, Deleted) | (Saved, Deleted) => Ok(to),
            (from, to) => Err(RuleError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleState::Draft => "draft",
            RuleState::Saved => "saved",
            RuleState::Deleted => "deleted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Assigned on save.
    #[serde(default)]
    pub id: Option<u64>,
    pub params: RuleParams,
    #[serde(default)]
    pub notifications: NotificationTargets,
    #[serde(default)]
    pub state: RuleState,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Rule {
    pub fn draft(params: RuleParams) -> Self {
        Self {
            id: None,
            params,
            notifications: NotificationTargets::default(),
            state: RuleState::Draft,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_notifications(mut self, notifications: NotificationTargets) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    /// Only saved rules are evaluated by the scheduler.
    pub fn ensure_evaluable(&self) -> Result<(), RuleError> {
        match self.state {
            RuleState::Saved => Ok(()),
            state => Err(RuleError::NotEvaluable {
                name: self.params.name.clone(),
                state,
            }),
        }
    }
}
