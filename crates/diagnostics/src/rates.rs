//! Rate calculator: conversion and cost-per-unit metrics derived from raw
//! counters with safe division.

use crate::registry::MetricKey;
use funnel_core::{Counter, FunnelSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `numerator / denominator` when both are present and the denominator is
/// non-zero. Non-finite results are treated as undefined as well.
pub fn safe_divide(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    let ratio = n / d;
    ratio.is_finite().then_some(ratio)
}

/// Same as [`safe_divide`], scaled to a percentage in `[0, 100]` for
/// consistent inputs.
pub fn safe_percent(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    safe_divide(numerator, denominator).map(|r| r * 100.0)
}

/// Derived metric values keyed by metric. Undefined metrics are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivedMetrics {
    values: BTreeMap<MetricKey, f64>,
}

impl DerivedMetrics {
    /// Derive every ratio metric from `snapshot`. Never fails.
    pub fn from_snapshot(snapshot: &FunnelSnapshot) -> Self {
        let c = |counter: Counter| snapshot.get(counter);
        let spend = c(Counter::Spend);

        let computed = [
            (
                MetricKey::LeadToQualifiedRate,
                safe_percent(c(Counter::Qualified), c(Counter::Leads)),
            ),
            (
                MetricKey::QualifiedToSalesQualifiedRate,
                safe_percent(c(Counter::SalesQualified), c(Counter::Qualified)),
            ),
            (
                MetricKey::SalesQualifiedToOpportunityRate,
                safe_percent(c(Counter::Opportunities), c(Counter::SalesQualified)),
            ),
            (
                MetricKey::OpportunityToWonRate,
                safe_percent(c(Counter::Deals), c(Counter::Opportunities)),
            ),
            (MetricKey::LeadToWonRate, safe_percent(c(Counter::Deals), c(Counter::Leads))),
            (
                MetricKey::ClickThroughRate,
                safe_percent(c(Counter::Clicks), c(Counter::Impressions)),
            ),
            (MetricKey::ClickToLeadRate, safe_percent(c(Counter::Leads), c(Counter::Clicks))),
            (MetricKey::CostPerClick, safe_divide(spend, c(Counter::Clicks))),
            (MetricKey::CostPerLead, safe_divide(spend, c(Counter::Leads))),
            (MetricKey::CostPerOpportunity, safe_divide(spend, c(Counter::Opportunities))),
            (MetricKey::CostPerDeal, safe_divide(spend, c(Counter::Deals))),
            (MetricKey::ReturnOnAdSpend, safe_divide(c(Counter::Revenue), spend)),
            (MetricKey::FirstTouchMinutes, finite(snapshot.first_touch_minutes)),
            (MetricKey::ConnectRate, finite(snapshot.connect_rate)),
            (MetricKey::SalesCycleDays, finite(snapshot.sales_cycle_days)),
            (MetricKey::DiscountRate, finite(snapshot.discount_rate)),
        ];

        Self {
            values: computed
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, v)))
                .collect(),
        }
    }

    pub fn get(&self, key: MetricKey) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, &f64)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
