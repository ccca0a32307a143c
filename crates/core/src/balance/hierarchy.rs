//! Chart-of-accounts tree: ancestry, rollup and structural validation.
//!
//! The tree is built from a snapshot of account rows. Every walk is guarded
//! against cycles so a corrupted snapshot yields an issue instead of looping.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tally_shared::types::AccountId;
use thiserror::Error;

use crate::ledger::types::AccountType;

/// One account in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNode {
    /// The account ID.
    pub id: AccountId,
    /// Business key.
    pub code: String,
    /// Parent header, `None` for roots.
    pub parent_id: Option<AccountId>,
    /// Classification.
    pub account_type: AccountType,
    /// Aggregation node.
    pub is_header: bool,
}

/// A structural problem in the chart of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyIssue {
    /// Following parents from this account returns to it.
    #[error("Account {code} is part of a parent cycle")]
    Cycle {
        /// The account on the cycle.
        code: String,
    },

    /// The parent does not exist.
    #[error("Account {code} references missing parent {parent_id}")]
    OrphanedParent {
        /// The child.
        code: String,
        /// The missing parent.
        parent_id: AccountId,
    },

    /// Only header accounts may have children.
    #[error("Account {code} has non-header parent {parent_code}")]
    ParentNotHeader {
        /// The child.
        code: String,
        /// The parent.
        parent_code: String,
    },

    /// A child must share its parent's type.
    #[error("Account {code} is {account_type} but its parent {parent_code} is {parent_type}")]
    TypeMismatch {
        /// The child.
        code: String,
        /// Child type.
        account_type: AccountType,
        /// The parent.
        parent_code: String,
        /// Parent type.
        parent_type: AccountType,
    },

    /// The account sits deeper than allowed.
    #[error("Account {code} is at depth {depth}, maximum is {max_depth}")]
    DepthExceeded {
        /// The account.
        code: String,
        /// Its depth (root = 1).
        depth: usize,
        /// The configured limit.
        max_depth: usize,
    },

    /// A header account has journal lines.
    #[error("Header account {code} has journal lines")]
    HeaderWithLines {
        /// The header.
        code: String,
    },

    /// Account codes are unique.
    #[error("Account code {code} already exists")]
    DuplicateCode {
        /// The code.
        code: String,
    },
}

/// Snapshot of the chart of accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountTree {
    nodes: HashMap<AccountId, AccountNode>,
    children: HashMap<AccountId, Vec<AccountId>>,
}

impl AccountTree {
    /// Builds a tree from account rows. Children are ordered by code.
    #[must_use]
    pub fn new(nodes: impl IntoIterator<Item = AccountNode>) -> Self {
        let nodes: HashMap<AccountId, AccountNode> =
            nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut children: HashMap<AccountId, Vec<AccountId>> = HashMap::new();
        for node in nodes.values() {
            if let Some(parent) = node.parent_id {
                children.entry(parent).or_default().push(node.id);
            }
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| nodes[a].code.cmp(&nodes[b].code));
        }

        Self { nodes, children }
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up an account.
    #[must_use]
    pub fn get(&self, id: AccountId) -> Option<&AccountNode> {
        self.nodes.get(&id)
    }

    /// Looks up an account by code.
    #[must_use]
    pub fn find_by_code(&self, code: &str) -> Option<&AccountNode> {
        self.nodes.values().find(|n| n.code == code)
    }

    /// Direct children, ordered by code.
    #[must_use]
    pub fn children(&self, id: AccountId) -> &[AccountId] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    /// All accounts ordered by code.
    #[must_use]
    pub fn nodes_by_code(&self) -> Vec<&AccountNode> {
        let mut out: Vec<&AccountNode> = self.nodes.values().collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    /// Ancestors of `id`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns `Cycle` or `OrphanedParent` for a corrupted chain.
    pub fn ancestors(&self, id: AccountId) -> Result<Vec<AccountId>, HierarchyIssue> {
        let Some(start) = self.nodes.get(&id) else {
            return Ok(Vec::new());
        };

        let mut seen: HashSet<AccountId> = HashSet::from([id]);
        let mut out = Vec::new();
        let mut current = start;

        while let Some(parent_id) = current.parent_id {
            if !seen.insert(parent_id) {
                return Err(HierarchyIssue::Cycle {
                    code: start.code.clone(),
                });
            }
            let Some(parent) = self.nodes.get(&parent_id) else {
                return Err(HierarchyIssue::OrphanedParent {
                    code: current.code.clone(),
                    parent_id,
                });
            };
            out.push(parent_id);
            current = parent;
        }

        Ok(out)
    }

    /// Depth of `id` (root = 1).
    ///
    /// # Errors
    ///
    /// Returns the `ancestors` issue for a corrupted chain.
    pub fn depth(&self, id: AccountId) -> Result<usize, HierarchyIssue> {
        Ok(self.ancestors(id)?.len() + 1)
    }

    /// `root` and every descendant, pre-order.
    #[must_use]
    pub fn subtree(&self, root: AccountId) -> Vec<AccountId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if !self.nodes.contains_key(&id) || !seen.insert(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }

        out
    }

    /// Non-header accounts in the subtree of `root`.
    #[must_use]
    pub fn leaves_under(&self, root: AccountId) -> Vec<AccountId> {
        self.subtree(root)
            .into_iter()
            .filter(|id| self.nodes.get(id).is_some_and(|n| !n.is_header))
            .collect()
    }

    /// Every distinct ancestor of `leaves`, deepest first.
    ///
    /// Recomputing headers in this order sees each child's new value before
    /// its parent is summed.
    ///
    /// # Errors
    ///
    /// Returns the first corrupted chain met.
    pub fn rollup_order(&self, leaves: &[AccountId]) -> Result<Vec<AccountId>, HierarchyIssue> {
        let mut with_depth: HashMap<AccountId, usize> = HashMap::new();
        for leaf in leaves {
            let ancestors = self.ancestors(*leaf)?;
            let leaf_depth = ancestors.len() + 1;
            for (idx, ancestor) in ancestors.into_iter().enumerate() {
                with_depth.insert(ancestor, leaf_depth - idx - 1);
            }
        }

        let mut out: Vec<(AccountId, usize)> = with_depth.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(out.into_iter().map(|(id, _)| id).collect())
    }

    /// `leaves` plus all their ancestors, ascending by id.
    ///
    /// Every writer locks in this order.
    ///
    /// # Errors
    ///
    /// Returns the first corrupted chain met.
    pub fn lock_order(&self, leaves: &[AccountId]) -> Result<Vec<AccountId>, HierarchyIssue> {
        let mut ids: Vec<AccountId> = leaves.to_vec();
        ids.extend(self.rollup_order(leaves)?);
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Balance of every account given leaf balances.
    ///
    /// Leaves take their value from `leaf_balances` (missing = 0); headers are
    /// the sum of their direct children. Accounts on a cycle are skipped.
    #[must_use]
    pub fn rollup(
        &self,
        leaf_balances: &HashMap<AccountId, Decimal>,
    ) -> HashMap<AccountId, Decimal> {
        let mut by_depth: Vec<(AccountId, usize)> = self
            .nodes
            .keys()
            .filter_map(|id| self.depth(*id).ok().map(|d| (*id, d)))
            .collect();
        by_depth.sort_by(|a, b| b.1.cmp(&a.1));

        let mut out: HashMap<AccountId, Decimal> = HashMap::with_capacity(by_depth.len());
        for (id, _) in by_depth {
            let node = &self.nodes[&id];
            let value = if node.is_header {
                self.children(id)
                    .iter()
                    .filter_map(|child| out.get(child))
                    .copied()
                    .sum()
            } else {
                leaf_balances.get(&id).copied().unwrap_or(Decimal::ZERO)
            };
            out.insert(id, value);
        }
        out
    }

    /// Checks where a new account may be placed.
    ///
    /// # Errors
    ///
    /// - `DuplicateCode` if the code is taken
    /// - `OrphanedParent` if the parent is unknown
    /// - `ParentNotHeader` / `TypeMismatch` for an unsuitable parent
    /// - `DepthExceeded` past `max_depth`
    pub fn check_new_account(
        &self,
        code: &str,
        parent_id: Option<AccountId>,
        account_type: AccountType,
        max_depth: usize,
    ) -> Result<(), HierarchyIssue> {
        if self.find_by_code(code).is_some() {
            return Err(HierarchyIssue::DuplicateCode {
                code: code.to_string(),
            });
        }

        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        let parent = self
            .nodes
            .get(&parent_id)
            .ok_or_else(|| HierarchyIssue::OrphanedParent {
                code: code.to_string(),
                parent_id,
            })?;
        Self::check_parent(code, account_type, parent)?;

        let depth = self.depth(parent_id)? + 1;
        if depth > max_depth {
            return Err(HierarchyIssue::DepthExceeded {
                code: code.to_string(),
                depth,
                max_depth,
            });
        }
        Ok(())
    }

    fn check_parent(
        code: &str,
        account_type: AccountType,
        parent: &AccountNode,
    ) -> Result<(), HierarchyIssue> {
        if !parent.is_header {
            return Err(HierarchyIssue::ParentNotHeader {
                code: code.to_string(),
                parent_code: parent.code.clone(),
            });
        }
        if parent.account_type != account_type {
            return Err(HierarchyIssue::TypeMismatch {
                code: code.to_string(),
                account_type,
                parent_code: parent.code.clone(),
                parent_type: parent.account_type,
            });
        }
        Ok(())
    }

    /// Reports every structural issue in the snapshot, ordered by code.
    ///
    /// `with_lines` holds the accounts referenced by at least one journal line.
    #[must_use]
    pub fn validate(
        &self,
        max_depth: usize,
        with_lines: &HashSet<AccountId>,
    ) -> Vec<HierarchyIssue> {
        let mut issues = Vec::new();

        for node in self.nodes_by_code() {
            if let Some(parent_id) = node.parent_id {
                match self.nodes.get(&parent_id) {
                    None => issues.push(HierarchyIssue::OrphanedParent {
                        code: node.code.clone(),
                        parent_id,
                    }),
                    Some(parent) => {
                        let checked = Self::check_parent(&node.code, node.account_type, parent);
                        if let Err(issue) = checked {
                            issues.push(issue);
                        }
                    }
                }
            }

            match self.depth(node.id) {
                Ok(depth) if depth > max_depth => issues.push(HierarchyIssue::DepthExceeded {
                    code: node.code.clone(),
                    depth,
                    max_depth,
                }),
                Err(issue @ HierarchyIssue::Cycle { .. }) => issues.push(issue),
                // orphans are reported once, at the account that references them
                _ => {}
            }

            if node.is_header && with_lines.contains(&node.id) {
                issues.push(HierarchyIssue::HeaderWithLines {
                    code: node.code.clone(),
                });
            }
        }

        issues
    }
}
