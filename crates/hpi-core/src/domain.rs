//! Domain: an isolated management scope owning one RPT and a session list

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{HpiError, Result};
use crate::rpt::{DuplicatePolicy, Rpt, RptInfo, RESOURCE_ID_BASE};

/// Process-wide domain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub u32);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client session attached to a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settings a domain is created with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default = "default_resource_id_base")]
    pub resource_id_base: u32,
}

fn default_resource_id_base() -> u32 {
    RESOURCE_ID_BASE
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            tag: String::new(),
            duplicate_policy: DuplicatePolicy::default(),
            resource_id_base: default_resource_id_base(),
        }
    }
}

impl DomainConfig {
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }
}

/// Summary of a domain, copied out of the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub id: DomainId,
    pub tag: String,
    pub guid: Uuid,
    pub created: DateTime<Utc>,
    pub duplicate_policy: DuplicatePolicy,
    pub sessions: usize,
    pub rpt: RptInfo,
}

#[derive(Debug)]
pub struct Domain {
    id: DomainId,
    tag: String,
    guid: Uuid,
    created: DateTime<Utc>,
    pub(crate) rpt: Rpt,
    sessions: Vec<SessionId>,
}

impl Domain {
    pub(crate) fn new(id: DomainId, config: DomainConfig) -> Self {
        Self {
            id,
            tag: config.tag,
            guid: Uuid::new_v4(),
            created: Utc::now(),
            rpt: Rpt::new(config.duplicate_policy, config.resource_id_base),
            sessions: Vec::new(),
        }
    }

    pub fn id(&self) -> DomainId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn rpt(&self) -> &Rpt {
        &self.rpt
    }

    pub fn info(&self) -> DomainInfo {
        DomainInfo {
            id: self.id,
            tag: self.tag.clone(),
            guid: self.guid,
            created: self.created,
            duplicate_policy: self.rpt.policy(),
            sessions: self.sessions.len(),
            rpt: self.rpt.info(),
        }
    }

    pub(crate) fn attach_session(&mut self, session: SessionId) -> Result<()> {
        if self.sessions.contains(&session) {
            return Err(HpiError::DuplicateEntity(format!(
                "session {session} in domain {}",
                self.id
            )));
        }
        self.sessions.push(session);
        Ok(())
    }

    pub(crate) fn detach_session(&mut self, session: SessionId) -> Result<()> {
        let index = self
            .sessions
            .iter()
            .position(|s| *s == session)
            .ok_or_else(|| HpiError::not_found(format!("session {session} in domain {}", self.id)))?;
        self.sessions.remove(index);
        Ok(())
    }

    pub fn sessions(&self) -> &[SessionId] {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_domain_is_empty() {
        let domain = Domain::new(DomainId(3), DomainConfig::tagged("chassis"));
        let info = domain.info();
        assert_eq!(info.id, DomainId(3));
        assert_eq!(info.tag, "chassis");
        assert_eq!(info.rpt.resource_count, 0);
        assert_eq!(info.duplicate_policy, DuplicatePolicy::Update);
        assert!(domain.sessions().is_empty());
    }

    #[test]
    fn test_sessions() {
        let mut domain = Domain::new(DomainId(1), DomainConfig::default());
        domain.attach_session(SessionId(10)).unwrap();
        domain.attach_session(SessionId(11)).unwrap();
        assert!(matches!(
            domain.attach_session(SessionId(10)),
            Err(HpiError::DuplicateEntity(_))
        ));

        domain.detach_session(SessionId(10)).unwrap();
        assert_eq!(domain.sessions(), &[SessionId(11)]);
        assert!(domain.detach_session(SessionId(10)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_config_from_toml() {
        let config: DomainConfig = toml::from_str(
            r#"
tag = "shelf"
duplicate_policy = "reject"
"#,
        )
        .unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.resource_id_base, RESOURCE_ID_BASE);
    }
}
