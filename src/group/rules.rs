//! Group rule parameters.
//!
//! These are deployment-wide defaults loaded from the `[rules]` section of
//! the operator config. Per-group capacity (`min_members`/`max_members`) is
//! copied onto the group at creation and never re-read from here.

use serde::{Deserialize, Serialize};

/// Default minimum approved members before a group may be approved.
pub const DEFAULT_MIN_MEMBERS: u32 = 3;

/// Default member capacity.
pub const DEFAULT_MAX_MEMBERS: u32 = 20;

/// Distinct nominators needed to promote a member to admin.
pub const DEFAULT_PROMOTION_THRESHOLD: usize = 2;

/// Approving admin votes needed to authorize a payout.
pub const DEFAULT_PAYOUT_APPROVAL_QUORUM: usize = 2;

/// Invitations expire after 7 days.
pub const DEFAULT_INVITATION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRules {
    #[serde(default = "default_min_members")]
    pub default_min_members: u32,

    #[serde(default = "default_max_members")]
    pub default_max_members: u32,

    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: usize,

    /// Approvals needed to move a payout request to `approved`.
    /// A single rejection always wins regardless of this value.
    #[serde(default = "default_payout_approval_quorum")]
    pub payout_approval_quorum: usize,

    /// When false, a second vote by the same admin is a conflict instead of
    /// replacing the first.
    #[serde(default = "default_allow_vote_overwrite")]
    pub allow_vote_overwrite: bool,

    #[serde(default = "default_invitation_ttl_secs")]
    pub invitation_ttl_secs: u64,
}

fn default_min_members() -> u32 {
    DEFAULT_MIN_MEMBERS
}

fn default_max_members() -> u32 {
    DEFAULT_MAX_MEMBERS
}

fn default_promotion_threshold() -> usize {
    DEFAULT_PROMOTION_THRESHOLD
}

fn default_payout_approval_quorum() -> usize {
    DEFAULT_PAYOUT_APPROVAL_QUORUM
}

fn default_allow_vote_overwrite() -> bool {
    true
}

fn default_invitation_ttl_secs() -> u64 {
    DEFAULT_INVITATION_TTL_SECS
}

impl Default for GroupRules {
    fn default() -> Self {
        Self {
            default_min_members: DEFAULT_MIN_MEMBERS,
            default_max_members: DEFAULT_MAX_MEMBERS,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            payout_approval_quorum: DEFAULT_PAYOUT_APPROVAL_QUORUM,
            allow_vote_overwrite: true,
            invitation_ttl_secs: DEFAULT_INVITATION_TTL_SECS,
        }
    }
}

impl GroupRules {
    /// Same rules with a different payout approval quorum.
    pub fn with_payout_quorum(mut self, quorum: usize) -> Self {
        self.payout_approval_quorum = quorum;
        self
    }

    /// Reject nonsensical combinations before they reach a group.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_min_members == 0 {
            return Err("default_min_members must be at least 1".to_string());
        }
        if self.default_min_members > self.default_max_members {
            return Err(format!(
                "default_min_members ({}) exceeds default_max_members ({})",
                self.default_min_members, self.default_max_members
            ));
        }
        if self.promotion_threshold == 0 {
            return Err("promotion_threshold must be at least 1".to_string());
        }
        if self.payout_approval_quorum == 0 {
            return Err("payout_approval_quorum must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let rules = GroupRules::default();
        assert_eq!(rules.default_min_members, 3);
        assert_eq!(rules.default_max_members, 20);
        assert_eq!(rules.promotion_threshold, 2);
        assert_eq!(rules.payout_approval_quorum, 2);
        assert!(rules.allow_vote_overwrite);
        assert!(rules.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let rules: GroupRules = toml::from_str("payout_approval_quorum = 1").unwrap();
        assert_eq!(rules.payout_approval_quorum, 1);
        assert_eq!(rules.promotion_threshold, 2);
        assert_eq!(rules.invitation_ttl_secs, DEFAULT_INVITATION_TTL_SECS);
    }

    #[test]
    fn test_validate_rejects_zero_quorum() {
        let rules = GroupRules::default().with_payout_quorum(0);
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_capacity() {
        let rules = GroupRules {
            default_min_members: 5,
            default_max_members: 4,
            ..GroupRules::default()
        };
        assert!(rules.validate().is_err());
    }
}
