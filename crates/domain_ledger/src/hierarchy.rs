//! Structural checks on the chart of accounts

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::error;

use core_kernel::AccountId;

use crate::account::Account;

/// A structural problem in the account tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HierarchyIssue {
    /// Walking the parent chain revisits an account
    Cycle { account_id: AccountId, account_code: String },
    /// The account sits deeper than the allowed maximum
    TooDeep { account_id: AccountId, account_code: String, depth: usize },
    /// The parent id does not exist
    MissingParent { account_id: AccountId, account_code: String, parent_id: AccountId },
    /// A header with no children, or a leaf that has children
    HeaderFlagMismatch { account_id: AccountId, account_code: String, is_header: bool, child_count: usize },
}

/// Validates parent links and header flags
#[derive(Debug, Clone)]
pub struct HierarchyValidator {
    max_depth: usize,
}

impl Default for HierarchyValidator {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

impl HierarchyValidator {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Reports every structural issue in `accounts`
    pub fn validate(&self, accounts: &[Account]) -> Vec<HierarchyIssue> {
        let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
        let mut child_counts: HashMap<AccountId, usize> = HashMap::new();
        for account in accounts {
            if let Some(parent_id) = account.parent_id {
                *child_counts.entry(parent_id).or_default() += 1;
            }
        }

        let mut issues = Vec::new();
        for account in accounts {
            if let Some(parent_id) = account.parent_id {
                if !by_id.contains_key(&parent_id) {
                    issues.push(HierarchyIssue::MissingParent {
                        account_id: account.id,
                        account_code: account.code.clone(),
                        parent_id,
                    });
                }
            }

            let child_count = child_counts.get(&account.id).copied().unwrap_or(0);
            if account.is_header != (child_count > 0) {
                issues.push(HierarchyIssue::HeaderFlagMismatch {
                    account_id: account.id,
                    account_code: account.code.clone(),
                    is_header: account.is_header,
                    child_count,
                });
            }

            match self.depth_of(account, &by_id) {
                Depth::Cycle => {
                    error!(account_code = %account.code, "cycle detected in account hierarchy");
                    issues.push(HierarchyIssue::Cycle {
                        account_id: account.id,
                        account_code: account.code.clone(),
                    });
                }
                Depth::Levels(depth) if depth > self.max_depth => issues.push(HierarchyIssue::TooDeep {
                    account_id: account.id,
                    account_code: account.code.clone(),
                    depth,
                }),
                Depth::Levels(_) => {}
            }
        }
        issues
    }

    /// Depth counted from 1 at a root, bounded so that a cycle terminates
    fn depth_of(&self, account: &Account, by_id: &HashMap<AccountId, &Account>) -> Depth {
        let mut visited = HashSet::from([account.id]);
        let mut depth = 1;
        let mut parent = account.parent_id;
        while let Some(id) = parent {
            if !visited.insert(id) {
                return Depth::Cycle;
            }
            let Some(next) = by_id.get(&id) else {
                break;
            };
            depth += 1;
            parent = next.parent_id;
        }
        Depth::Levels(depth)
    }
}

enum Depth {
    Levels(usize),
    Cycle,
}
