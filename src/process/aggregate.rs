// src/process/aggregate.rs
use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Mutex};
use tracing::{debug, warn};

use super::{
    utils::{clean_str, parse_monetary, round_money, Period, Quarter},
    RowBatch,
};
use crate::config::AggregateConfig;

/// Field order gives the output ordering: year, quarter, entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccumulatorKey {
    pub year: u16,
    pub quarter: Quarter,
    pub entity_id: String,
}

impl AccumulatorKey {
    pub fn new(entity_id: impl Into<String>, period: Period) -> Self {
        Self {
            year: period.year,
            quarter: period.quarter,
            entity_id: entity_id.into(),
        }
    }
}

/// Anything a validated row can be committed into.
pub trait AccumulatorSink {
    /// Returns `false`, leaving the sum untouched, when the addition would overflow.
    fn add(&mut self, key: AccumulatorKey, amount: Decimal) -> bool;
}

/// Running sums per (entity, year, quarter). Exact decimal addition keeps the
/// result independent of chunk boundaries and order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Accumulator {
    sums: HashMap<AccumulatorKey, Decimal>,
    rows: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AccumulatorKey) -> Option<Decimal> {
        self.sums.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    /// Rows committed so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Consume into rows sorted by (year, quarter, entity), amounts rounded to cents.
    pub fn drain(self) -> Vec<QuarterlyTotal> {
        let mut entries: Vec<(AccumulatorKey, Decimal)> = self.sums.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
            .into_iter()
            .map(|(key, amount)| QuarterlyTotal {
                entity_id: key.entity_id,
                year: key.year,
                quarter: key.quarter,
                expense_total: round_money(amount),
            })
            .collect()
    }
}

impl AccumulatorSink for Accumulator {
    fn add(&mut self, key: AccumulatorKey, amount: Decimal) -> bool {
        let sum = self.sums.entry(key).or_default();
        match sum.checked_add(amount) {
            Some(next) => {
                *sum = next;
                self.rows += 1;
                true
            }
            None => false,
        }
    }
}

/// Accumulator shared by files processed on different threads.
/// `add` is the only synchronized operation.
#[derive(Debug, Default)]
pub struct SharedAccumulator(Mutex<Accumulator>);

impl SharedAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Accumulator {
        self.0.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AccumulatorSink for &SharedAccumulator {
    fn add(&mut self, key: AccumulatorKey, amount: Decimal) -> bool {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.add(key, amount)
    }
}

/// One row of the consolidated totals file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyTotal {
    pub entity_id: String,
    pub year: u16,
    pub quarter: Quarter,
    pub expense_total: Decimal,
}

/// Per-row outcome counts for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub committed: u64,
    pub rejected: u64,
}

/// Column positions of the aggregation inputs within one file's batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateColumns {
    pub entity: usize,
    pub value: usize,
}

impl AggregateColumns {
    pub fn locate(batch: &RowBatch, cfg: &AggregateConfig) -> Result<Self> {
        let entity = batch
            .find_column(&cfg.entity_columns)
            .ok_or_else(|| anyhow!("no entity column (tried {:?})", cfg.entity_columns))?;
        let value = batch
            .find_column(&cfg.value_columns)
            .ok_or_else(|| anyhow!("no value column (tried {:?})", cfg.value_columns))?;
        Ok(Self { entity, value })
    }
}

/// Commit each qualifying row of an already filtered batch.
/// Rows without an entity, whose value is missing or not positive, or whose
/// amount would overflow the running sum, are rejected.
pub fn aggregate_batch<S: AccumulatorSink>(
    batch: &RowBatch,
    cols: AggregateColumns,
    period: Period,
    sink: &mut S,
) -> AggregateStats {
    let mut stats = AggregateStats::default();
    for row in &batch.rows {
        let entity = clean_str(RowBatch::cell(row, cols.entity));
        let amount = parse_monetary(RowBatch::cell(row, cols.value));
        match amount {
            Some(v) if v > Decimal::ZERO && !entity.is_empty() => {
                if sink.add(AccumulatorKey::new(entity.as_str(), period), v) {
                    stats.committed += 1;
                } else {
                    warn!(entity = %entity, period = %period, "sum overflow; row rejected");
                    stats.rejected += 1;
                }
            }
            _ => stats.rejected += 1,
        }
    }
    debug!(
        period = %period,
        committed = stats.committed,
        rejected = stats.rejected,
        "aggregated batch"
    );
    stats
}
