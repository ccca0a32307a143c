//! Approval routing: which roles must sign off on a source transaction.
//!
//! Routes are matched by source type and amount range. When multiple
//! routes match, the one with lowest priority value wins.

use rust_decimal::Decimal;

use super::error::ApprovalError;
use super::types::ApproverRole;
use crate::ledger::types::SourceType;

/// A routing rule.
#[derive(Debug, Clone)]
pub struct ApprovalRoute {
    /// Human-readable name for the route.
    pub name: String,
    /// Source types this route applies to (empty = all that need approval).
    pub source_types: Vec<SourceType>,
    /// Minimum amount (inclusive, None = no minimum).
    pub min_amount: Option<Decimal>,
    /// Maximum amount (inclusive, None = no maximum).
    pub max_amount: Option<Decimal>,
    /// Roles that must approve, in order.
    pub steps: Vec<ApproverRole>,
    /// Priority for route selection (lower = higher priority).
    pub priority: i16,
}

impl ApprovalRoute {
    fn matches(&self, source_type: SourceType, amount: Decimal) -> bool {
        let type_ok = self.source_types.is_empty() || self.source_types.contains(&source_type);
        let above_min = self.min_amount.is_none_or(|min| amount >= min);
        let below_max = self.max_amount.is_none_or(|max| amount <= max);
        type_ok && above_min && below_max
    }
}

/// Stateless router over a set of routes.
pub struct ApprovalRouter;

impl ApprovalRouter {
    /// Determine the approval steps for a source transaction.
    ///
    /// # Errors
    ///
    /// - `ApprovalNotRequired` for manual sources
    /// - `NoRouteFound` when no route matches
    pub fn steps_for(
        routes: &[ApprovalRoute],
        source_type: SourceType,
        amount: Decimal,
    ) -> Result<Vec<ApproverRole>, ApprovalError> {
        if !source_type.requires_approval() {
            return Err(ApprovalError::ApprovalNotRequired(source_type));
        }

        routes
            .iter()
            .filter(|r| r.matches(source_type, amount))
            .min_by_key(|r| r.priority)
            .map(|r| r.steps.clone())
            .filter(|steps| !steps.is_empty())
            .ok_or(ApprovalError::NoRouteFound {
                source_type,
                amount,
            })
    }

    /// Default policy: finance signs off; above 25,000,000 a director
    /// signs off as well.
    #[must_use]
    pub fn default_routes() -> Vec<ApprovalRoute> {
        vec![
            ApprovalRoute {
                name: "large".to_string(),
                source_types: Vec::new(),
                min_amount: Some(Decimal::new(2_500_000_001, 2)),
                max_amount: None,
                steps: vec![ApproverRole::Finance, ApproverRole::Director],
                priority: 10,
            },
            ApprovalRoute {
                name: "standard".to_string(),
                source_types: Vec::new(),
                min_amount: None,
                max_amount: None,
                steps: vec![ApproverRole::Finance],
                priority: 100,
            },
        ]
    }
}
