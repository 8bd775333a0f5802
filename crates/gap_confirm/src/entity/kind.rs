//! Attestable entity kinds and their schema payloads.

use serde::{Deserialize, Serialize};

/// One attestable Karma GAP entity, tagged by kind.
///
/// Every variant carries its home chain, an optional UID (set once attested),
/// a reference UID linking it to its parent attestation, and the recipient
/// address, plus the schema-specific payload the flow treats as opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Community(CommunityData),
    Project(ProjectData),
    Grant(GrantData),
    Milestone(MilestoneData),
    ProjectMilestone(ProjectMilestoneData),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Community,
    Project,
    Grant,
    Milestone,
    ProjectMilestone,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Project => "project",
            Self::Grant => "grant",
            Self::Milestone => "milestone",
            Self::ProjectMilestone => "project_milestone",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityData {
    pub chain_id: u64,
    pub uid: Option<String>,
    pub recipient: String,
    pub name: String,
    pub description: String,
    pub slug: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectData {
    pub chain_id: u64,
    pub uid: Option<String>,
    pub recipient: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantData {
    pub chain_id: u64,
    pub uid: Option<String>,
    /// Parent project attestation.
    pub ref_uid: Option<String>,
    pub recipient: String,
    pub community_uid: String,
    pub title: String,
    pub description: String,
    pub season: Option<String>,
    pub cycle: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneData {
    pub chain_id: u64,
    pub uid: Option<String>,
    /// Parent grant attestation.
    pub ref_uid: Option<String>,
    pub recipient: String,
    pub title: String,
    pub description: String,
    pub ends_at: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMilestoneData {
    pub chain_id: u64,
    pub uid: Option<String>,
    /// Parent project attestation.
    pub ref_uid: Option<String>,
    pub recipient: String,
    pub title: String,
    pub text: String,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Community(_) => EntityKind::Community,
            Self::Project(_) => EntityKind::Project,
            Self::Grant(_) => EntityKind::Grant,
            Self::Milestone(_) => EntityKind::Milestone,
            Self::ProjectMilestone(_) => EntityKind::ProjectMilestone,
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Community(d) => d.chain_id,
            Self::Project(d) => d.chain_id,
            Self::Grant(d) => d.chain_id,
            Self::Milestone(d) => d.chain_id,
            Self::ProjectMilestone(d) => d.chain_id,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::Community(d) => d.uid.as_deref(),
            Self::Project(d) => d.uid.as_deref(),
            Self::Grant(d) => d.uid.as_deref(),
            Self::Milestone(d) => d.uid.as_deref(),
            Self::ProjectMilestone(d) => d.uid.as_deref(),
        }
    }

    pub fn ref_uid(&self) -> Option<&str> {
        match self {
            Self::Community(_) | Self::Project(_) => None,
            Self::Grant(d) => d.ref_uid.as_deref(),
            Self::Milestone(d) => d.ref_uid.as_deref(),
            Self::ProjectMilestone(d) => d.ref_uid.as_deref(),
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Community(d) => &d.recipient,
            Self::Project(d) => &d.recipient,
            Self::Grant(d) => &d.recipient,
            Self::Milestone(d) => &d.recipient,
            Self::ProjectMilestone(d) => &d.recipient,
        }
    }

    /// Schema name under which this entity is attested.
    pub fn schema_name(&self) -> &'static str {
        match self {
            Self::Community(_) => "Community",
            Self::Project(_) => "Project",
            Self::Grant(_) => "Grant",
            Self::Milestone(_) => "Milestone",
            Self::ProjectMilestone(_) => "ProjectMilestone",
        }
    }
}
