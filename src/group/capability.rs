//! Role capability check shared by every gated operation.

use crate::error::{ChamaError, ChamaResult};
use crate::group::types::{Member, MemberStatus, Role};

/// Roles allowed to run admin actions.
pub const PRIVILEGED: &[Role] = &[Role::Admin, Role::Creator];

/// Whether `member` holds one of `roles`.
pub fn has_role(member: &Member, roles: &[Role]) -> bool {
    roles.contains(&member.role)
}

/// Approved member holding admin or creator, else `InsufficientRole`.
pub fn require_privileged(member: &Member, action: &'static str) -> ChamaResult<()> {
    if member.status == MemberStatus::Approved && has_role(member, PRIVILEGED) {
        Ok(())
    } else {
        Err(ChamaError::InsufficientRole {
            member: member.id,
            action,
        })
    }
}

/// Approved member of any role, else `NotEligible`.
pub fn require_approved(member: &Member) -> ChamaResult<()> {
    if member.status == MemberStatus::Approved {
        Ok(())
    } else {
        Err(ChamaError::NotEligible(member.id))
    }
}
