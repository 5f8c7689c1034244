use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// Kind of principal an eligibility or approver policy is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    /// A single directory user.
    User,
    /// A directory group; membership is resolved at submission time.
    Group,
}

/// Reference to a target account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    /// Account identifier.
    pub id: String,
    /// Account display name.
    pub name: String,
}

/// Reference to a permission set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRef {
    /// Permission-set identifier.
    pub id: String,
    /// Permission-set display name.
    pub name: String,
}

/// Which accounts and permission sets one principal may request.
///
/// Reference data owned by the administrative path; the lifecycle core only
/// consumes it at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityPolicy {
    /// Policy identifier (principal id).
    pub id: String,
    /// Principal display name.
    pub name: String,
    /// Principal kind this policy is keyed on.
    pub principal_type: PrincipalType,
    /// Accounts the principal may request access on.
    pub accounts: Vec<AccountRef>,
    /// Permission sets the principal may request.
    pub permissions: Vec<PermissionRef>,
    /// Per-policy approval override; falls back to the global toggle.
    pub approval_required: Option<bool>,
    /// Upper bound on the requested window, in hours.
    pub max_duration_hours: Option<u32>,
}

impl EligibilityPolicy {
    /// Returns true when the policy covers the given account and role.
    #[must_use]
    pub fn allows(&self, account_id: &str, role_id: &str) -> bool {
        self.accounts.iter().any(|account| account.id == account_id)
            && self
                .permissions
                .iter()
                .any(|permission| permission.id == role_id)
    }

    /// Resolves the effective approval requirement for this policy.
    #[must_use]
    pub fn approval_required_with(&self, settings: &Settings) -> bool {
        self.approval_required
            .unwrap_or(settings.approval_required)
    }
}

/// Who must approve elevation on a given target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverPolicy {
    /// Target identifier (account id or organizational unit id).
    pub id: String,
    /// Target display name.
    pub name: String,
    /// Candidate approver display names.
    pub approvers: Vec<String>,
    /// Candidate approver group ids.
    pub group_ids: Vec<String>,
}

/// Gathers the candidate approvers for one target across policies.
///
/// Evaluated once at submission time; the result is frozen onto the
/// request so later policy edits cannot change who may act on it.
#[must_use]
pub fn candidate_approvers(policies: &[ApproverPolicy], target_id: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for policy in policies.iter().filter(|policy| policy.id == target_id) {
        for approver in &policy.approvers {
            if !candidates.contains(approver) {
                candidates.push(approver.clone());
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use crate::Settings;

    use super::{
        AccountRef, ApproverPolicy, EligibilityPolicy, PermissionRef, PrincipalType,
        candidate_approvers,
    };

    fn policy(approval_required: Option<bool>) -> EligibilityPolicy {
        EligibilityPolicy {
            id: "user-1".to_owned(),
            name: "dev".to_owned(),
            principal_type: PrincipalType::User,
            accounts: vec![AccountRef {
                id: "111122223333".to_owned(),
                name: "Sandbox".to_owned(),
            }],
            permissions: vec![PermissionRef {
                id: "ps-1".to_owned(),
                name: "ReadOnlyAccess".to_owned(),
            }],
            approval_required,
            max_duration_hours: Some(8),
        }
    }

    #[test]
    fn allows_matches_account_and_permission_together() {
        let policy = policy(None);
        assert!(policy.allows("111122223333", "ps-1"));
        assert!(!policy.allows("111122223333", "ps-2"));
        assert!(!policy.allows("444455556666", "ps-1"));
    }

    #[test]
    fn policy_override_wins_over_global_toggle() {
        let settings = Settings {
            approval_required: true,
            ..Settings::default()
        };
        assert!(!policy(Some(false)).approval_required_with(&settings));
        assert!(policy(None).approval_required_with(&settings));
    }

    #[test]
    fn candidate_approvers_merge_without_duplicates() {
        let policies = vec![
            ApproverPolicy {
                id: "111122223333".to_owned(),
                name: "Sandbox".to_owned(),
                approvers: vec!["Approver One".to_owned(), "Approver Two".to_owned()],
                group_ids: Vec::new(),
            },
            ApproverPolicy {
                id: "111122223333".to_owned(),
                name: "Sandbox".to_owned(),
                approvers: vec!["Approver Two".to_owned(), "Approver Three".to_owned()],
                group_ids: Vec::new(),
            },
            ApproverPolicy {
                id: "444455556666".to_owned(),
                name: "Prod".to_owned(),
                approvers: vec!["Approver Four".to_owned()],
                group_ids: Vec::new(),
            },
        ];

        let candidates = candidate_approvers(&policies, "111122223333");
        assert_eq!(
            candidates,
            vec![
                "Approver One".to_owned(),
                "Approver Two".to_owned(),
                "Approver Three".to_owned(),
            ]
        );
    }
}
