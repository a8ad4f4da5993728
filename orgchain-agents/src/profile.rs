//! Agent identity and the management hierarchy

use orgchain_core::{AgentError, AgentId, AgentRole, OrgResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Identity and position of an agent in the organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique identifier (e.g. "ceo", "mgr-infra", "sme-incident")
    pub agent_id: AgentId,
    /// Display name
    pub name: String,
    pub role: AgentRole,
    /// Area of expertise (e.g. "incident_management")
    pub specialization: String,
    /// Direct manager; `None` only for the CEO
    pub manager_id: Option<AgentId>,
    /// Direct reports
    pub subordinate_ids: Vec<AgentId>,
}

impl AgentProfile {
    pub fn new(agent_id: impl Into<AgentId>, name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            role,
            specialization: String::new(),
            manager_id: None,
            subordinate_ids: Vec::new(),
        }
    }

    /// Set the specialization.
    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = specialization.into();
        self
    }

    /// Set the direct manager.
    pub fn with_manager(mut self, manager_id: impl Into<AgentId>) -> Self {
        self.manager_id = Some(manager_id.into());
        self
    }

    /// Add a direct report (ignored if already present).
    pub fn with_subordinate(mut self, subordinate_id: impl Into<AgentId>) -> Self {
        let subordinate_id = subordinate_id.into();
        if !self.subordinate_ids.contains(&subordinate_id) {
            self.subordinate_ids.push(subordinate_id);
        }
        self
    }

    /// Check the profile on its own: non-empty id, the CEO has no manager,
    /// every other role has exactly one, and nobody manages themselves.
    pub fn validate(&self) -> OrgResult<()> {
        if self.agent_id.trim().is_empty() {
            return Err(self.invalid("agent id is empty"));
        }

        match (&self.manager_id, self.role.requires_manager()) {
            (Some(_), false) => return Err(self.invalid("the CEO cannot have a manager")),
            (None, true) => {
                return Err(self.invalid(&format!("role {} requires a manager", self.role)))
            }
            _ => {}
        }

        if self.manager_id.as_deref() == Some(self.agent_id.as_str()) {
            return Err(self.invalid("agent cannot manage itself"));
        }
        if self.subordinate_ids.iter().any(|s| *s == self.agent_id) {
            return Err(self.invalid("agent cannot report to itself"));
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> orgchain_core::OrgError {
        AgentError::InvalidHierarchy {
            agent_id: self.agent_id.clone(),
            reason: reason.to_string(),
        }
        .into()
    }
}

/// Validate a complete organisation: every profile is individually valid,
/// ids are unique, every manager exists and the management graph is a tree.
pub fn validate_hierarchy(profiles: &[AgentProfile]) -> OrgResult<()> {
    let mut managers: HashMap<&str, Option<&str>> = HashMap::with_capacity(profiles.len());

    for profile in profiles {
        profile.validate()?;
        if managers
            .insert(profile.agent_id.as_str(), profile.manager_id.as_deref())
            .is_some()
        {
            return Err(AgentError::InvalidHierarchy {
                agent_id: profile.agent_id.clone(),
                reason: "duplicate agent id".to_string(),
            }
            .into());
        }
    }

    for profile in profiles {
        if let Some(manager_id) = profile.manager_id.as_deref() {
            if !managers.contains_key(manager_id) {
                return Err(AgentError::InvalidHierarchy {
                    agent_id: profile.agent_id.clone(),
                    reason: format!("manager {} does not exist", manager_id),
                }
                .into());
            }
        }
    }

    for profile in profiles {
        if let Some(path) = find_cycle(&profile.agent_id, |id| {
            managers.get(id).copied().flatten().map(str::to_string)
        }) {
            return Err(AgentError::HierarchyCycle { path }.into());
        }
    }

    Ok(())
}

/// Walk the manager chain from `start`. Returns the chain up to and
/// including the repeated id if it loops back on itself.
pub fn find_cycle(
    start: &str,
    manager_of: impl Fn(&str) -> Option<AgentId>,
) -> Option<Vec<AgentId>> {
    let mut seen = HashSet::new();
    let mut path = vec![start.to_string()];
    seen.insert(start.to_string());

    let mut current = start.to_string();
    while let Some(next) = manager_of(&current) {
        path.push(next.clone());
        if !seen.insert(next.clone()) {
            return Some(path);
        }
        current = next;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgchain_core::OrgError;

    fn org() -> Vec<AgentProfile> {
        vec![
            AgentProfile::new("ceo", "Chief", AgentRole::Ceo).with_subordinate("mgr"),
            AgentProfile::new("mgr", "Manager", AgentRole::SeniorManager)
                .with_manager("ceo")
                .with_subordinate("sme"),
            AgentProfile::new("sme", "Expert", AgentRole::SubjectMatterExpert)
                .with_specialization("incident_management")
                .with_manager("mgr"),
        ]
    }

    #[test]
    fn test_profile_builder() {
        let profile = AgentProfile::new("mgr", "Manager", AgentRole::SeniorManager)
            .with_manager("ceo")
            .with_subordinate("a")
            .with_subordinate("a")
            .with_subordinate("b");
        assert_eq!(profile.manager_id.as_deref(), Some("ceo"));
        assert_eq!(profile.subordinate_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_validate_role_invariant() {
        assert!(AgentProfile::new("ceo", "Chief", AgentRole::Ceo).validate().is_ok());
        assert!(AgentProfile::new("ceo", "Chief", AgentRole::Ceo)
            .with_manager("board")
            .validate()
            .is_err());
        assert!(AgentProfile::new("sme", "Expert", AgentRole::SubjectMatterExpert)
            .validate()
            .is_err());
        assert!(AgentProfile::new("mgr", "Manager", AgentRole::SeniorManager)
            .with_manager("mgr")
            .validate()
            .is_err());
        assert!(AgentProfile::new("  ", "Blank", AgentRole::Ceo).validate().is_err());
    }

    #[test]
    fn test_validate_hierarchy_accepts_tree() {
        assert!(validate_hierarchy(&org()).is_ok());
    }

    #[test]
    fn test_validate_hierarchy_rejects_dangling_manager() {
        let mut profiles = org();
        profiles[2].manager_id = Some("ghost".to_string());
        let err = validate_hierarchy(&profiles).unwrap_err();
        assert!(matches!(err, OrgError::Agent(AgentError::InvalidHierarchy { .. })));
    }

    #[test]
    fn test_validate_hierarchy_rejects_duplicates() {
        let mut profiles = org();
        profiles.push(profiles[2].clone());
        assert!(validate_hierarchy(&profiles).is_err());
    }

    #[test]
    fn test_validate_hierarchy_rejects_cycle() {
        let profiles = vec![
            AgentProfile::new("a", "A", AgentRole::SeniorManager).with_manager("b"),
            AgentProfile::new("b", "B", AgentRole::SeniorManager).with_manager("a"),
        ];
        let err = validate_hierarchy(&profiles).unwrap_err();
        match err {
            OrgError::Agent(AgentError::HierarchyCycle { path }) => {
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_find_cycle_terminates_on_chain() {
        let chain: HashMap<&str, &str> = [("sme", "mgr"), ("mgr", "ceo")].into_iter().collect();
        assert!(find_cycle("sme", |id| chain.get(id).map(|m| m.to_string())).is_none());
    }
}
