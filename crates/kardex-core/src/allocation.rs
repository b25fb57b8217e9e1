//! # Cost Allocation Engine
//!
//! Distributes a purchase's shared overhead costs (freight, customs, tax,
//! insurance, other) across its line items, proportionally to each line's
//! share of the item subtotal, and derives the landed unit cost per line.
//!
//! ## The Landed Cost Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  line items                overhead costs                              │
//! │  qty × unit price          freight customs tax insurance other         │
//! │       │                          │                                      │
//! │       ▼                          ▼                                      │
//! │  subtotal (local)      ┌── currency bucketing ──┐                      │
//! │       │                │ local purchase:        │                      │
//! │       │                │   everything is local  │                      │
//! │       │                │ foreign purchase:      │                      │
//! │       │                │   tax local, the rest  │                      │
//! │       │                │   foreign × rate       │                      │
//! │       │                └───────────┬────────────┘                      │
//! │       │                            ▼                                    │
//! │       │                   total costs (local)                          │
//! │       │                            │                                    │
//! │       └──────────┬─────────────────┘                                    │
//! │                  ▼                                                      │
//! │     largest-remainder apportionment                                    │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  per line: distributed cost, final unit cost, total cost               │
//! │            (+ foreign-currency mirrors when a rate exists)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exactness
//! All arithmetic is integer cents widened to i128. The apportionment floors
//! each share, then hands the leftover cents one at a time to the largest
//! fractional remainders (ties broken by line order), so
//! `Σ distributed == total costs` holds exactly, never "within tolerance".
//!
//! The engine is a pure function: callable speculatively while a purchase is
//! being edited (preview) and authoritatively on completion.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{ExchangeRate, Money};

// =============================================================================
// Inputs
// =============================================================================

/// The five shared overhead cost fields of a purchase, in cents.
///
/// For a local-currency purchase every field is local cents. For a
/// foreign-currency purchase, `tax_cents` is local (tax is a
/// local-jurisdiction charge regardless of invoice currency) and the other
/// four are foreign cents.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OverheadCosts {
    pub freight_cents: i64,
    pub customs_cents: i64,
    pub tax_cents: i64,
    pub insurance_cents: i64,
    pub other_cents: i64,
}

impl OverheadCosts {
    /// Sum of the four fields that follow the invoice currency.
    #[inline]
    pub const fn invoice_bucket(&self) -> i64 {
        self.freight_cents + self.customs_cents + self.insurance_cents + self.other_cents
    }

    /// Sum of all five fields.
    #[inline]
    pub const fn grand_total(&self) -> i64 {
        self.invoice_bucket() + self.tax_cents
    }

    fn all_non_negative(&self) -> bool {
        self.freight_cents >= 0
            && self.customs_cents >= 0
            && self.tax_cents >= 0
            && self.insurance_cents >= 0
            && self.other_cents >= 0
    }
}

/// One purchase line as the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationLine {
    pub quantity: i64,
    /// Unit price in local cents (the allocation weight basis).
    pub unit_price_cents: i64,
    /// Unit price in foreign cents, when the invoice is foreign-denominated.
    pub unit_price_foreign_cents: Option<i64>,
}

/// Full input to one allocation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    /// True when the invoice currency differs from the local currency.
    pub is_foreign: bool,
    /// Required when `is_foreign`; ignored otherwise.
    pub exchange_rate: Option<ExchangeRate>,
    pub costs: OverheadCosts,
    pub lines: Vec<AllocationLine>,
}

// =============================================================================
// Outputs
// =============================================================================

/// Computed figures for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedLine {
    /// This line's exact share of the total overhead, local cents.
    pub distributed_cost_cents: i64,
    /// unit price + rounded per-unit share, local cents.
    pub final_unit_cost_cents: i64,
    /// quantity × unit price + distributed share, local cents.
    pub total_cost_cents: i64,
    /// Informational mirror: distributed share in foreign cents.
    pub distributed_cost_foreign_cents: Option<i64>,
    /// Informational mirror: landed unit cost in foreign cents.
    pub final_unit_cost_foreign_cents: Option<i64>,
}

/// Result of one allocation run over a whole purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Σ quantity × local unit price.
    pub subtotal_cents: i64,
    /// Σ quantity × foreign unit price (foreign invoices only).
    pub subtotal_foreign_cents: Option<i64>,
    /// The invoice-currency overhead bucket converted to local cents.
    pub foreign_costs_cents: i64,
    /// All overheads in local cents.
    pub total_costs_cents: i64,
    /// subtotal + total costs.
    pub total_cents: i64,
    /// Same order as the input lines.
    pub lines: Vec<AllocatedLine>,
}

// =============================================================================
// The Engine
// =============================================================================

/// Runs the full allocation for one purchase.
///
/// Pure and deterministic; no side effects. Errors are validation-shaped:
/// non-positive quantity, negative price or cost, missing/invalid exchange
/// rate on a foreign invoice.
///
/// ## Example
/// ```rust
/// use kardex_core::allocation::{allocate, AllocationInput, AllocationLine, OverheadCosts};
///
/// // 5 units at $10.00, freight $10.00, tax $5.00, local currency
/// let input = AllocationInput {
///     is_foreign: false,
///     exchange_rate: None,
///     costs: OverheadCosts { freight_cents: 1000, tax_cents: 500, ..Default::default() },
///     lines: vec![AllocationLine {
///         quantity: 5,
///         unit_price_cents: 1000,
///         unit_price_foreign_cents: None,
///     }],
/// };
/// let result = allocate(&input).unwrap();
/// assert_eq!(result.lines[0].distributed_cost_cents, 1500); // all $15.00
/// assert_eq!(result.lines[0].final_unit_cost_cents, 1300);  // $10 + $15/5
/// ```
pub fn allocate(input: &AllocationInput) -> CoreResult<Allocation> {
    if input.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        }
        .into());
    }
    if !input.costs.all_non_negative() {
        return Err(ValidationError::MustBeNonNegative {
            field: "costs".to_string(),
        }
        .into());
    }
    for line in &input.lines {
        if line.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            }
            .into());
        }
        if line.unit_price_cents < 0 || line.unit_price_foreign_cents.unwrap_or(0) < 0 {
            return Err(ValidationError::MustBeNonNegative {
                field: "unit_price".to_string(),
            }
            .into());
        }
    }

    // The rate only participates for foreign invoices.
    let rate = if input.is_foreign {
        let rate = input
            .exchange_rate
            .ok_or(CoreError::MissingExchangeRate)?;
        if !rate.is_valid() {
            return Err(CoreError::InvalidExchangeRate {
                micros: rate.micros(),
            });
        }
        Some(rate)
    } else {
        None
    };

    // Step 1: subtotals.
    let subtotal_cents: i64 = input
        .lines
        .iter()
        .map(|l| l.quantity * l.unit_price_cents)
        .sum();
    let subtotal_foreign_cents = if input.is_foreign {
        Some(
            input
                .lines
                .iter()
                .map(|l| l.quantity * l.unit_price_foreign_cents.unwrap_or(0))
                .sum(),
        )
    } else {
        None
    };

    // Steps 2-4: bucket the overheads and convert the invoice bucket.
    let (foreign_costs_cents, local_bucket_cents) = match rate {
        Some(rate) => (
            rate.to_local(Money::from_cents(input.costs.invoice_bucket()))
                .cents(),
            input.costs.tax_cents,
        ),
        None => (0, input.costs.grand_total()),
    };
    let total_costs_cents = foreign_costs_cents + local_bucket_cents;

    // Step 5: largest-remainder apportionment over line weights.
    let weights: Vec<i128> = input
        .lines
        .iter()
        .map(|l| (l.quantity * l.unit_price_cents) as i128)
        .collect();
    let distributed = apportion(total_costs_cents, &weights);

    // Steps 5-6: per-line landed figures and foreign mirrors.
    let lines = input
        .lines
        .iter()
        .zip(distributed)
        .map(|(line, distributed_cost_cents)| {
            let share = Money::from_cents(distributed_cost_cents);
            let per_unit_share = share.div_round(line.quantity);
            let final_unit_cost_cents = line.unit_price_cents + per_unit_share.cents();
            let total_cost_cents = line.quantity * line.unit_price_cents + distributed_cost_cents;

            // Mirrors derive from the LOCAL figures divided back through the
            // rate, so both sides agree under the same rate.
            let (distributed_cost_foreign_cents, final_unit_cost_foreign_cents) =
                match (rate, line.unit_price_foreign_cents) {
                    (Some(rate), Some(unit_foreign)) => {
                        let dist_foreign = rate.to_foreign(share);
                        let final_foreign =
                            unit_foreign + dist_foreign.div_round(line.quantity).cents();
                        (Some(dist_foreign.cents()), Some(final_foreign))
                    }
                    _ => (None, None),
                };

            AllocatedLine {
                distributed_cost_cents,
                final_unit_cost_cents,
                total_cost_cents,
                distributed_cost_foreign_cents,
                final_unit_cost_foreign_cents,
            }
        })
        .collect();

    Ok(Allocation {
        subtotal_cents,
        subtotal_foreign_cents,
        foreign_costs_cents,
        total_costs_cents,
        total_cents: subtotal_cents + total_costs_cents,
        lines,
    })
}

/// Splits `total` cents over `weights` by largest remainder.
///
/// Floor each `total × wᵢ / W`, then assign the leftover cents one each to
/// the largest fractional remainders, ties broken by index. All weights
/// zero means no distribution (every share is zero).
///
/// Postcondition (W > 0): the returned shares sum to exactly `total`.
fn apportion(total: i64, weights: &[i128]) -> Vec<i64> {
    let weight_sum: i128 = weights.iter().sum();
    if weight_sum == 0 || total == 0 {
        return vec![0; weights.len()];
    }

    let total = total as i128;
    let mut shares: Vec<i64> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(i128, usize)> = Vec::with_capacity(weights.len());
    let mut assigned: i128 = 0;

    for (index, &weight) in weights.iter().enumerate() {
        let numerator = total * weight;
        let floor = numerator / weight_sum;
        shares.push(floor as i64);
        assigned += floor;
        remainders.push((numerator % weight_sum, index));
    }

    // Largest fractional remainder first; ties keep line order.
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut leftover = total - assigned;
    for &(_, index) in &remainders {
        if leftover == 0 {
            break;
        }
        shares[index] += 1;
        leftover -= 1;
    }

    shares
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, unit_price_cents: i64) -> AllocationLine {
        AllocationLine {
            quantity,
            unit_price_cents,
            unit_price_foreign_cents: None,
        }
    }

    /// The reference scenario: 5 units at $10.00 with freight $10.00 and
    /// tax $5.00 in local currency.
    #[test]
    fn test_local_purchase_single_line() {
        let input = AllocationInput {
            is_foreign: false,
            exchange_rate: None,
            costs: OverheadCosts {
                freight_cents: 1000,
                tax_cents: 500,
                ..Default::default()
            },
            lines: vec![line(5, 1000)],
        };

        let result = allocate(&input).unwrap();
        assert_eq!(result.subtotal_cents, 5000);
        assert_eq!(result.total_costs_cents, 1500);
        assert_eq!(result.total_cents, 6500);
        assert_eq!(result.subtotal_foreign_cents, None);

        let l = &result.lines[0];
        assert_eq!(l.distributed_cost_cents, 1500);
        assert_eq!(l.final_unit_cost_cents, 1300); // $10 + $15/5
        assert_eq!(l.total_cost_cents, 6500);
        assert_eq!(l.distributed_cost_foreign_cents, None);
    }

    #[test]
    fn test_distribution_is_proportional() {
        // $33.00 of costs over lines weighted 6000 / 4000
        let input = AllocationInput {
            is_foreign: false,
            exchange_rate: None,
            costs: OverheadCosts {
                other_cents: 3300,
                ..Default::default()
            },
            lines: vec![line(1, 6000), line(1, 4000)],
        };

        let result = allocate(&input).unwrap();
        assert_eq!(result.lines[0].distributed_cost_cents, 1980);
        assert_eq!(result.lines[1].distributed_cost_cents, 1320);
    }

    #[test]
    fn test_conservation_with_awkward_split() {
        // $10.00 over three equal lines: 334 + 333 + 333
        let input = AllocationInput {
            is_foreign: false,
            exchange_rate: None,
            costs: OverheadCosts {
                freight_cents: 1000,
                ..Default::default()
            },
            lines: vec![line(1, 500), line(1, 500), line(1, 500)],
        };

        let result = allocate(&input).unwrap();
        let shares: Vec<i64> = result
            .lines
            .iter()
            .map(|l| l.distributed_cost_cents)
            .collect();
        assert_eq!(shares, vec![334, 333, 333]);
        assert_eq!(shares.iter().sum::<i64>(), 1000);
    }

    #[test]
    fn test_conservation_over_varied_weights() {
        // Exactness must hold for arbitrary weight shapes, not just neat ones.
        let mut seed: i64 = 7;
        for case in 0..50 {
            let mut lines = Vec::new();
            for _ in 0..(2 + case % 7) {
                seed = (seed * 1103515245 + 12345) % 2147483647;
                let qty = 1 + (seed % 9).abs();
                seed = (seed * 1103515245 + 12345) % 2147483647;
                let price = 1 + (seed % 99_999).abs();
                lines.push(line(qty, price));
            }
            let costs = OverheadCosts {
                freight_cents: 1 + (seed % 1_000_000).abs(),
                tax_cents: 137,
                ..Default::default()
            };
            let total_costs = costs.grand_total();

            let result = allocate(&AllocationInput {
                is_foreign: false,
                exchange_rate: None,
                costs,
                lines,
            })
            .unwrap();

            let distributed: i64 = result.lines.iter().map(|l| l.distributed_cost_cents).sum();
            assert_eq!(distributed, total_costs, "case {}", case);
        }
    }

    #[test]
    fn test_foreign_purchase_with_mirrors() {
        // Rate 2.0: freight $10.00 + customs $5.00 foreign → $30.00 local,
        // tax $3.00 stays local. Total costs $33.00.
        let input = AllocationInput {
            is_foreign: true,
            exchange_rate: Some(ExchangeRate::from_micros(2_000_000)),
            costs: OverheadCosts {
                freight_cents: 1000,
                customs_cents: 500,
                tax_cents: 300,
                ..Default::default()
            },
            lines: vec![
                AllocationLine {
                    quantity: 1,
                    unit_price_cents: 6000,
                    unit_price_foreign_cents: Some(3000),
                },
                AllocationLine {
                    quantity: 1,
                    unit_price_cents: 4000,
                    unit_price_foreign_cents: Some(2000),
                },
            ],
        };

        let result = allocate(&input).unwrap();
        assert_eq!(result.foreign_costs_cents, 3000);
        assert_eq!(result.total_costs_cents, 3300);
        assert_eq!(result.subtotal_cents, 10000);
        assert_eq!(result.subtotal_foreign_cents, Some(5000));

        let a = &result.lines[0];
        assert_eq!(a.distributed_cost_cents, 1980);
        assert_eq!(a.final_unit_cost_cents, 7980);
        assert_eq!(a.distributed_cost_foreign_cents, Some(990));
        assert_eq!(a.final_unit_cost_foreign_cents, Some(3990));

        let b = &result.lines[1];
        assert_eq!(b.distributed_cost_cents, 1320);
        assert_eq!(b.final_unit_cost_cents, 5320);
        assert_eq!(b.distributed_cost_foreign_cents, Some(660));
    }

    #[test]
    fn test_zero_subtotal_distributes_nothing() {
        let input = AllocationInput {
            is_foreign: false,
            exchange_rate: None,
            costs: OverheadCosts {
                freight_cents: 1000,
                ..Default::default()
            },
            lines: vec![line(3, 0)],
        };

        let result = allocate(&input).unwrap();
        assert_eq!(result.lines[0].distributed_cost_cents, 0);
        assert_eq!(result.lines[0].final_unit_cost_cents, 0);
        assert_eq!(result.total_costs_cents, 1000);
    }

    #[test]
    fn test_foreign_requires_rate() {
        let input = AllocationInput {
            is_foreign: true,
            exchange_rate: None,
            costs: OverheadCosts::default(),
            lines: vec![line(1, 100)],
        };
        assert!(matches!(
            allocate(&input),
            Err(CoreError::MissingExchangeRate)
        ));

        let input = AllocationInput {
            is_foreign: true,
            exchange_rate: Some(ExchangeRate::from_micros(0)),
            costs: OverheadCosts::default(),
            lines: vec![line(1, 100)],
        };
        assert!(matches!(
            allocate(&input),
            Err(CoreError::InvalidExchangeRate { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_lines() {
        let input = AllocationInput {
            is_foreign: false,
            exchange_rate: None,
            costs: OverheadCosts::default(),
            lines: vec![line(0, 100)],
        };
        assert!(allocate(&input).is_err());

        let input = AllocationInput {
            is_foreign: false,
            exchange_rate: None,
            costs: OverheadCosts::default(),
            lines: vec![],
        };
        assert!(allocate(&input).is_err());
    }

    #[test]
    fn test_apportion_ties_keep_line_order() {
        // 1 leftover cent, identical remainders: the earlier line gets it.
        assert_eq!(apportion(1000, &[1, 1, 1]), vec![334, 333, 333]);
        // no weights, nothing to do
        assert_eq!(apportion(500, &[0, 0]), vec![0, 0]);
        assert_eq!(apportion(0, &[3, 7]), vec![0, 0]);
    }
}
