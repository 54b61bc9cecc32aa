//! The rollup operator tree and its evaluation.

use soh_types::{SohMonitorType, SohStatus};

/// A leaf operand handed to the resolver during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand<'a> {
    Station(&'a str),
    Channel(&'a str),
    MonitorType(SohMonitorType),
}

/// What an operator operates on: exactly one kind of leaf, or nested operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operands {
    Stations(Vec<String>),
    Channels(Vec<String>),
    MonitorTypes(Vec<SohMonitorType>),
    Operators(Vec<RollupOperator>),
}

impl Operands {
    pub fn len(&self) -> usize {
        match self {
            Operands::Stations(v) => v.len(),
            Operands::Channels(v) => v.len(),
            Operands::MonitorTypes(v) => v.len(),
            Operands::Operators(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A status aggregation rule over a set of operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RollupOperator {
    /// The best operand status.
    BestOf { operands: Operands },
    /// The worst operand status.
    WorstOf { operands: Operands },
    /// GOOD if at least `good_threshold` operands are GOOD, else MARGINAL if
    /// at least `marginal_threshold` are MARGINAL or better, else BAD.
    MinGoodOf {
        good_threshold: usize,
        marginal_threshold: usize,
        operands: Operands,
    },
}

impl RollupOperator {
    pub fn best_of(operands: Operands) -> Self {
        RollupOperator::BestOf { operands }
    }

    pub fn worst_of(operands: Operands) -> Self {
        RollupOperator::WorstOf { operands }
    }

    pub fn min_good_of(good_threshold: usize, marginal_threshold: usize, operands: Operands) -> Self {
        RollupOperator::MinGoodOf {
            good_threshold,
            marginal_threshold,
            operands,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RollupOperator::BestOf { .. } => "BEST_OF",
            RollupOperator::WorstOf { .. } => "WORST_OF",
            RollupOperator::MinGoodOf { .. } => "MIN_GOOD_OF",
        }
    }

    pub fn operands(&self) -> &Operands {
        match self {
            RollupOperator::BestOf { operands }
            | RollupOperator::WorstOf { operands }
            | RollupOperator::MinGoodOf { operands, .. } => operands,
        }
    }

    /// Every leaf operand in the tree, depth first.
    pub fn leaves(&self) -> Vec<Operand<'_>> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<Operand<'a>>) {
        match self.operands() {
            Operands::Stations(names) => leaves.extend(names.iter().map(|n| Operand::Station(n))),
            Operands::Channels(names) => leaves.extend(names.iter().map(|n| Operand::Channel(n))),
            Operands::MonitorTypes(types) => {
                leaves.extend(types.iter().map(|t| Operand::MonitorType(*t)))
            }
            Operands::Operators(operators) => {
                for operator in operators {
                    operator.collect_leaves(leaves);
                }
            }
        }
    }

    /// Evaluate the tree bottom-up, asking `resolve` for the status of each
    /// leaf operand. An operator with no operands is MARGINAL.
    pub fn evaluate<F>(&self, resolve: &mut F) -> SohStatus
    where
        F: FnMut(Operand<'_>) -> SohStatus,
    {
        let statuses: Vec<SohStatus> = match self.operands() {
            Operands::Stations(names) => names.iter().map(|n| resolve(Operand::Station(n))).collect(),
            Operands::Channels(names) => names.iter().map(|n| resolve(Operand::Channel(n))).collect(),
            Operands::MonitorTypes(types) => {
                types.iter().map(|t| resolve(Operand::MonitorType(*t))).collect()
            }
            Operands::Operators(operators) => operators.iter().map(|op| op.evaluate(resolve)).collect(),
        };
        self.combine(&statuses)
    }

    fn combine(&self, statuses: &[SohStatus]) -> SohStatus {
        if statuses.is_empty() {
            return SohStatus::Marginal;
        }

        match self {
            RollupOperator::BestOf { .. } => {
                SohStatus::best(statuses.iter().copied()).unwrap_or(SohStatus::Marginal)
            }
            RollupOperator::WorstOf { .. } => {
                SohStatus::worst(statuses.iter().copied()).unwrap_or(SohStatus::Marginal)
            }
            RollupOperator::MinGoodOf {
                good_threshold,
                marginal_threshold,
                ..
            } => {
                let good = statuses.iter().filter(|s| **s == SohStatus::Good).count();
                let at_least_marginal = statuses
                    .iter()
                    .filter(|s| s.is_at_least(SohStatus::Marginal))
                    .count();
                if good >= *good_threshold {
                    SohStatus::Good
                } else if at_least_marginal >= *marginal_threshold {
                    SohStatus::Marginal
                } else {
                    SohStatus::Bad
                }
            }
        }
    }
}
