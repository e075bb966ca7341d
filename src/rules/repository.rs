use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{NotificationTargets, Rule, RuleError, RuleParams, RuleState};
use crate::calendar::MAX_WINDOW_DAYS;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RuleDocument {
    next_id: u64,
    rules: Vec<Rule>,
}

/// Saved rules, optionally persisted to a JSON file after every change.
#[derive(Debug)]
pub struct RuleRepository {
    path: Option<PathBuf>,
    doc: RuleDocument,
}

impl RuleRepository {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: RuleDocument {
                next_id: 1,
                rules: Vec::new(),
            },
        }
    }

    /// Opens the rule file, starting empty when it does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            let mut doc: RuleDocument = serde_json::from_str(&fs::read_to_string(&path)?)?;
            let max_id = doc.rules.iter().filter_map(|r| r.id).max().unwrap_or(0);
            doc.next_id = doc.next_id.max(max_id + 1);
            doc
        } else {
            RuleDocument {
                next_id: 1,
                rules: Vec::new(),
            }
        };

        Ok(Self {
            path: Some(path),
            doc,
        })
    }

    /// Saves a draft, assigning it an id.
    pub fn create(&mut self, mut rule: Rule) -> Result<Rule, RuleError> {
        rule.notifications = rule.notifications.normalized();
        self.check(&rule.params, &rule.notifications, None)?;

        rule.state = rule.state.transition(RuleState::Saved)?;
        let id = self.doc.next_id;
        self.doc.next_id += 1;
        rule.id = Some(id);
        rule.created_at = Some(Utc::now());
        rule.updated_at = rule.created_at;

        self.doc.rules.push(rule.clone());
        self.persist()?;
        info!(id, name = %rule.params.name, "Rule created");
        Ok(rule)
    }

    pub fn update(
        &mut self,
        id: u64,
        params: RuleParams,
        notifications: NotificationTargets,
    ) -> Result<Rule, RuleError> {
        let notifications = notifications.normalized();
        self.check(&params, &notifications, Some(id))?;

        let rule = self
            .doc
            .rules
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or(RuleError::NotFound(id))?;
        rule.state = rule.state.transition(RuleState::Saved)?;
        rule.params = params;
        rule.notifications = notifications;
        rule.updated_at = Some(Utc::now());

        let updated = rule.clone();
        self.persist()?;
        info!(id, name = %updated.params.name, "Rule updated");
        Ok(updated)
    }

    /// Removes the rule and returns it in the `Deleted` state.
    pub fn delete(&mut self, id: u64) -> Result<Rule, RuleError> {
        let pos = self
            .doc
            .rules
            .iter()
            .position(|r| r.id == Some(id))
            .ok_or(RuleError::NotFound(id))?;

        let mut rule = self.doc.rules.remove(pos);
        rule.state = rule.state.transition(RuleState::Deleted)?;
        self.persist()?;
        info!(id, name = %rule.params.name, "Rule deleted");
        Ok(rule)
    }

    pub fn get(&self, id: u64) -> Option<&Rule> {
        self.doc.rules.iter().find(|r| r.id == Some(id))
    }

    /// Case-insensitive lookup.
    pub fn get_by_name(&self, name: &str) -> Option<&Rule> {
        let wanted = name.trim().to_lowercase();
        self.doc
            .rules
            .iter()
            .find(|r| r.params.name.trim().to_lowercase() == wanted)
    }

    /// All saved rules, ordered by name.
    pub fn list(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.doc.rules.iter().collect();
        rules.sort_by(|a, b| a.params.name.cmp(&b.params.name));
        rules
    }

    pub fn len(&self) -> usize {
        self.doc.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.rules.is_empty()
    }

    fn check(
        &self,
        params: &RuleParams,
        notifications: &NotificationTargets,
        own_id: Option<u64>,
    ) -> Result<(), RuleError> {
        if params.name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        if let Some(existing) = self.get_by_name(&params.name) {
            if existing.id != own_id {
                return Err(RuleError::DuplicateName(params.name.clone()));
            }
        }
        if params.scope.lookback_days > MAX_WINDOW_DAYS {
            return Err(RuleError::LookbackTooLong(params.scope.lookback_days));
        }
        notifications.validate()
    }

    fn persist(&self) -> Result<(), RuleError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.doc)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
