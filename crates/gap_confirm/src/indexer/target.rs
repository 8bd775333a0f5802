//! Poll targets: which read-API resource a confirmation flow re-fetches.

use serde::{Deserialize, Serialize};

/// Resource polled while waiting for the indexer to reflect a new attestation.
///
/// Each variant maps to one GET endpoint of the indexer. The flow re-fetches
/// the same target every attempt and hands the fresh snapshot to its
/// `is_reflected` predicate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum PollTarget {
    Project { uid: String },
    Community { uid: String },
    Grant { uid: String },
    ProjectMilestones { project_uid: String },
    CommunityGrants { community_uid: String },
}

impl PollTarget {
    /// URL path of the GET endpoint for this target.
    pub fn path(&self) -> String {
        match self {
            Self::Project { uid } => format!("/projects/{}", urlencoding::encode(uid)),
            Self::Community { uid } => format!("/communities/{}", urlencoding::encode(uid)),
            Self::Grant { uid } => format!("/grants/{}", urlencoding::encode(uid)),
            Self::ProjectMilestones { project_uid } => {
                format!("/projects/{}/milestones", urlencoding::encode(project_uid))
            }
            Self::CommunityGrants { community_uid } => {
                format!("/communities/{}/grants", urlencoding::encode(community_uid))
            }
        }
    }

    /// Short label for logs and journal rows.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Project { .. } => "project",
            Self::Community { .. } => "community",
            Self::Grant { .. } => "grant",
            Self::ProjectMilestones { .. } => "project_milestones",
            Self::CommunityGrants { .. } => "community_grants",
        }
    }
}
