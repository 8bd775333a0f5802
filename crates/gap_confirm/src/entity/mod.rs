//! Attestable entities: tagged union of Karma GAP kinds plus the signer boundary.

mod attest;
mod kind;

pub use attest::{AttestPayload, SignError, Signer, TxResult};
pub use kind::{
    CommunityData, Entity, EntityKind, GrantData, MilestoneData, ProjectData,
    ProjectMilestoneData,
};
