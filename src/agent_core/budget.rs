//! Budget Allocation Validator.
//!
//! Pure classification of a proposed line item against its parent plan's
//! budget and flight window. Allocation is always recomputed from the
//! current line items; nothing here mutates the plan.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::types::{MediaPlanRef, Money};

/// A constraint a proposed line item would break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation")]
pub enum Violation {
    /// `cost + allocated` would exceed the plan's total budget.
    OverBudget {
        cost: Money,
        allocated: Money,
        total_budget: Money,
    },
    /// The line item's flight falls outside the plan's window.
    DateOutOfRange {
        start_date: NaiveDate,
        end_date: NaiveDate,
        plan_start: NaiveDate,
        plan_end: NaiveDate,
    },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::OverBudget {
                cost,
                allocated,
                total_budget,
            } => write!(
                f,
                "OverBudget: cost {cost} plus allocated {allocated} exceeds budget {total_budget}"
            ),
            Violation::DateOutOfRange {
                start_date,
                end_date,
                plan_start,
                plan_end,
            } => write!(
                f,
                "DateOutOfRange: {start_date}..{end_date} is outside the plan window {plan_start}..{plan_end}"
            ),
        }
    }
}

/// What `create_lineitem` does with a proposed item that has violations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationPolicy {
    /// Reject the item with a `ConflictError`.
    #[default]
    Block,
    /// Add the item and report the violations as warnings.
    Warn,
}

/// Budget figures reported alongside plan and line-item results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub campaign_budget: Money,
    pub allocated_budget: Money,
    pub remaining_budget: Money,
    pub total_lineitems: usize,
}

/// Sum the cost of every current line item.
pub fn recompute_allocated(plan: &MediaPlanRef) -> Money {
    plan.line_items.iter().map(|li| li.cost).sum()
}

/// Total budget minus allocation. Negative when the plan is over-allocated.
pub fn remaining(plan: &MediaPlanRef) -> Money {
    plan.total_budget - recompute_allocated(plan)
}

pub fn summarize(plan: &MediaPlanRef) -> BudgetSummary {
    let allocated = recompute_allocated(plan);
    BudgetSummary {
        campaign_budget: plan.total_budget,
        allocated_budget: allocated,
        remaining_budget: plan.total_budget - allocated,
        total_lineitems: plan.line_items.len(),
    }
}

/// Classify a proposed line item. Returns every violation that applies,
/// in a fixed order (budget first, then dates).
pub fn validate_line_item(
    plan: &MediaPlanRef,
    cost: Money,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    let allocated = recompute_allocated(plan);
    if cost + allocated > plan.total_budget {
        violations.push(Violation::OverBudget {
            cost,
            allocated,
            total_budget: plan.total_budget,
        });
    }

    if start_date < plan.start_date || end_date > plan.end_date {
        violations.push(Violation::DateOutOfRange {
            start_date,
            end_date,
            plan_start: plan.start_date,
            plan_end: plan.end_date,
        });
    }

    violations
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agent_core::types::LineItem;
    use chrono::Utc;

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn plan_with_budget(units: f64) -> MediaPlanRef {
        MediaPlanRef {
            id: "mp_test".into(),
            campaign_id: "cmp_test".into(),
            campaign_name: "Spring Launch".into(),
            campaign_objective: "awareness".into(),
            product_name: None,
            product_description: None,
            target_audience_name: None,
            start_date: date("2025-03-01"),
            end_date: date("2025-05-31"),
            total_budget: Money::from_units(units).unwrap(),
            created_by: "planner@example.com".into(),
            created_at: Utc::now(),
            comments: None,
            schema_version: "v2.0".into(),
            line_items: Vec::new(),
        }
    }

    pub(crate) fn line_item(id: &str, units: f64) -> LineItem {
        LineItem {
            id: id.into(),
            name: format!("Line {id}"),
            channel: "social".into(),
            vehicle: "Meta".into(),
            partner: None,
            kpi: None,
            cost: Money::from_units(units).unwrap(),
            start_date: date("2025-03-01"),
            end_date: date("2025-03-31"),
        }
    }

    #[test]
    fn test_recompute_allocated_sums_all_items() {
        let mut plan = plan_with_budget(50_000.0);
        plan.line_items.push(line_item("a", 20_000.0));
        plan.line_items.push(line_item("b", 20_000.0));
        assert_eq!(recompute_allocated(&plan), Money::from_units(40_000.0).unwrap());
        // Idempotent
        assert_eq!(recompute_allocated(&plan), recompute_allocated(&plan));
        assert_eq!(remaining(&plan), Money::from_units(10_000.0).unwrap());
    }

    #[test]
    fn test_allocation_invariant_under_reordering() {
        let mut plan = plan_with_budget(1_000.0);
        for (i, cost) in [0.1, 0.2, 0.3, 99.99, 0.01].iter().enumerate() {
            plan.line_items.push(line_item(&i.to_string(), *cost));
        }
        let forward = recompute_allocated(&plan);
        plan.line_items.reverse();
        assert_eq!(forward, recompute_allocated(&plan));
        assert_eq!(forward.cents(), 10_060);
    }

    #[test]
    fn test_over_budget_boundary() {
        let mut plan = plan_with_budget(50_000.0);
        plan.line_items.push(line_item("a", 20_000.0));
        plan.line_items.push(line_item("b", 20_000.0));

        // Exactly filling the budget is allowed
        let exact = validate_line_item(
            &plan,
            Money::from_units(10_000.0).unwrap(),
            date("2025-04-01"),
            date("2025-04-30"),
        );
        assert!(exact.is_empty());

        let over = validate_line_item(
            &plan,
            Money::from_units(15_000.0).unwrap(),
            date("2025-04-01"),
            date("2025-04-30"),
        );
        assert_eq!(over.len(), 1);
        assert!(matches!(over[0], Violation::OverBudget { .. }));
    }

    #[test]
    fn test_date_out_of_range_either_end() {
        let plan = plan_with_budget(50_000.0);
        let early = validate_line_item(
            &plan,
            Money::from_units(1.0).unwrap(),
            date("2025-02-28"),
            date("2025-03-10"),
        );
        assert!(matches!(early[0], Violation::DateOutOfRange { .. }));

        let late = validate_line_item(
            &plan,
            Money::from_units(1.0).unwrap(),
            date("2025-05-01"),
            date("2025-06-01"),
        );
        assert!(matches!(late[0], Violation::DateOutOfRange { .. }));

        // Window edges are inclusive
        let edges = validate_line_item(
            &plan,
            Money::from_units(1.0).unwrap(),
            date("2025-03-01"),
            date("2025-05-31"),
        );
        assert!(edges.is_empty());
    }

    #[test]
    fn test_both_violations_fire() {
        let plan = plan_with_budget(100.0);
        let v = validate_line_item(
            &plan,
            Money::from_units(500.0).unwrap(),
            date("2024-01-01"),
            date("2024-02-01"),
        );
        assert_eq!(v.len(), 2);
        assert!(v[0].to_string().starts_with("OverBudget"));
        assert!(v[1].to_string().starts_with("DateOutOfRange"));
    }

    #[test]
    fn test_summary() {
        let mut plan = plan_with_budget(1_000.0);
        plan.line_items.push(line_item("a", 1_200.0));
        let s = summarize(&plan);
        assert_eq!(s.total_lineitems, 1);
        assert!(s.remaining_budget.is_negative());
    }
}
