//! Admin nomination tally.
//!
//! Approved members nominate each other for admin. Once a nominee has been
//! nominated by `promotion_threshold` distinct members, their role becomes
//! `admin` in the same mutation that recorded the deciding nomination.
//!
//! Nominations only ever accumulate, so the count is monotonic and no
//! tie-break is needed. Nominating someone who already holds admin or
//! creator is accepted but records nothing.

use crate::error::{ChamaError, ChamaResult};
use crate::group::capability::{has_role, require_approved, PRIVILEGED};
use crate::group::rules::GroupRules;
use crate::group::state::GroupState;
use crate::group::types::{AdminNomination, MemberId, Role, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of a nomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationOutcome {
    pub nominee: MemberId,
    pub distinct_nominators: usize,
    pub threshold: usize,
    /// True only for the nomination that crossed the threshold.
    pub promoted: bool,
    pub role: Role,
}

/// Record a nomination and promote the nominee if the threshold is reached.
pub fn nominate(
    state: &mut GroupState,
    rules: &GroupRules,
    nominator: MemberId,
    nominee: MemberId,
    now: Timestamp,
) -> ChamaResult<NominationOutcome> {
    require_approved(state.member(&nominator)?)?;
    if nominator == nominee {
        return Err(ChamaError::SelfNomination);
    }
    let target = state.member(&nominee)?;
    require_approved(target)?;

    if state
        .nominations
        .iter()
        .any(|n| n.nominator == nominator && n.nominee == nominee)
    {
        return Err(ChamaError::DuplicateNomination { nominator, nominee });
    }

    let threshold = rules.promotion_threshold;
    if has_role(target, PRIVILEGED) {
        debug!(group = %state.id(), nominee = %nominee, "nominee already privileged");
        return Ok(NominationOutcome {
            nominee,
            distinct_nominators: distinct_nominators(state, nominee),
            threshold,
            promoted: false,
            role: target.role,
        });
    }

    state.nominations.push(AdminNomination {
        group: state.id(),
        nominator,
        nominee,
        created_at: now,
    });

    let count = distinct_nominators(state, nominee);
    let promoted = count >= threshold;
    let member = state.member_mut(&nominee)?;
    if promoted {
        member.role = Role::Admin;
    }
    let role = member.role;

    if promoted {
        info!(group = %state.id(), member = %nominee, nominators = count, "member promoted to admin");
    } else {
        debug!(group = %state.id(), nominee = %nominee, nominators = count, threshold, "nomination recorded");
    }

    Ok(NominationOutcome {
        nominee,
        distinct_nominators: count,
        threshold,
        promoted,
        role,
    })
}

/// Number of distinct members that have nominated `nominee`.
pub fn distinct_nominators(state: &GroupState, nominee: MemberId) -> usize {
    state
        .nominations
        .iter()
        .filter(|n| n.nominee == nominee)
        .map(|n| n.nominator)
        .collect::<BTreeSet<_>>()
        .len()
}
