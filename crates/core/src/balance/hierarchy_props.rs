//! Property-based tests for the account tree rollup.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::AccountId;

use super::hierarchy::{AccountNode, AccountTree};
use crate::ledger::types::AccountType;

/// A random forest: node `i` is a header iff it has children; its parent is
/// some earlier node or none.
fn arb_tree() -> impl Strategy<Value = (AccountTree, Vec<AccountId>)> {
    prop::collection::vec(prop::option::of(any::<prop::sample::Index>()), 1..25).prop_map(
        |parents| {
            let ids: Vec<AccountId> = (0..parents.len()).map(|_| AccountId::new()).collect();
            let parent_of: Vec<Option<usize>> = parents
                .iter()
                .enumerate()
                .map(|(i, p)| match p {
                    Some(idx) if i > 0 => Some(idx.index(i)),
                    _ => None,
                })
                .collect();
            let has_children: HashSet<usize> = parent_of.iter().flatten().copied().collect();

            let nodes = ids.iter().enumerate().map(|(i, id)| AccountNode {
                id: *id,
                code: format!("{:04}", i + 1000),
                parent_id: parent_of[i].map(|p| ids[p]),
                account_type: AccountType::Asset,
                is_header: has_children.contains(&i),
            });
            (AccountTree::new(nodes), ids)
        },
    )
}

fn arb_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property 5.1: Every header equals the sum of its direct children.**
    #[test]
    fn prop_header_equals_children(
        (tree, ids) in arb_tree(),
        amounts in prop::collection::vec(arb_amount(), 25),
    ) {
        let leaves: HashMap<AccountId, Decimal> =
            ids.iter().zip(amounts.iter()).map(|(id, a)| (*id, *a)).collect();
        let all = tree.rollup(&leaves);

        for id in &ids {
            let node = tree.get(*id).unwrap();
            if node.is_header {
                let children: Decimal = tree.children(*id).iter().map(|c| all[c]).sum();
                prop_assert_eq!(all[id], children);
            }
        }
    }

    /// **Property 5.2: Every header equals the sum of the leaves beneath it.**
    #[test]
    fn prop_header_equals_descendant_leaves(
        (tree, ids) in arb_tree(),
        amounts in prop::collection::vec(arb_amount(), 25),
    ) {
        let leaves: HashMap<AccountId, Decimal> =
            ids.iter().zip(amounts.iter()).map(|(id, a)| (*id, *a)).collect();
        let all = tree.rollup(&leaves);

        for id in &ids {
            let expected: Decimal = tree.leaves_under(*id).iter().map(|l| leaves[l]).sum();
            prop_assert_eq!(all[id], expected);
        }
    }

    /// **Property 5.3: Lock order is ascending and covers every ancestor.**
    #[test]
    fn prop_lock_order_covers_ancestors(
        (tree, ids) in arb_tree(),
        pick in prop::collection::vec(any::<prop::sample::Index>(), 1..5),
    ) {
        let leaves: Vec<AccountId> = pick.iter().map(|i| ids[i.index(ids.len())]).collect();
        let order = tree.lock_order(&leaves).unwrap();

        prop_assert!(order.windows(2).all(|w| w[0] < w[1]));
        for leaf in &leaves {
            prop_assert!(order.contains(leaf));
            for ancestor in tree.ancestors(*leaf).unwrap() {
                prop_assert!(order.contains(&ancestor));
            }
        }
    }

    /// **Property 5.4: Generated trees are structurally valid.**
    #[test]
    fn prop_generated_tree_valid((tree, _) in arb_tree()) {
        prop_assert!(tree.validate(64, &HashSet::new()).is_empty());
    }
}
