use serde::{Deserialize, Serialize};

/// Raw funnel counters named by the stage and cost tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Leads,
    /// Marketing-qualified leads.
    Qualified,
    /// Sales-qualified leads.
    SalesQualified,
    Opportunities,
    /// Closed-won deals.
    Deals,
    Spend,
    Impressions,
    Clicks,
    Revenue,
}

impl Counter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::Leads => "leads",
            Counter::Qualified => "qualified",
            Counter::SalesQualified => "sales_qualified",
            Counter::Opportunities => "opportunities",
            Counter::Deals => "deals",
            Counter::Spend => "spend",
            Counter::Impressions => "impressions",
            Counter::Clicks => "clicks",
            Counter::Revenue => "revenue",
        }
    }
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single snapshot of aggregate funnel counts.
///
/// Every field is optional: `None` means "not reported", which is not the
/// same as zero. Nothing downstream defaults a missing field to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelSnapshot {
    pub leads: Option<f64>,
    pub qualified: Option<f64>,
    pub sales_qualified: Option<f64>,
    pub opportunities: Option<f64>,
    pub deals: Option<f64>,
    pub spend: Option<f64>,
    pub impressions: Option<f64>,
    pub clicks: Option<f64>,
    pub revenue: Option<f64>,
    /// Minutes from lead creation to first sales touch.
    pub first_touch_minutes: Option<f64>,
    /// Share of call attempts that reached the lead, in percent.
    pub connect_rate: Option<f64>,
    pub sales_cycle_days: Option<f64>,
    /// Average discount granted on closed deals, in percent.
    pub discount_rate: Option<f64>,
}

impl FunnelSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: Counter) -> Option<f64> {
        match counter {
            Counter::Leads => self.leads,
            Counter::Qualified => self.qualified,
            Counter::SalesQualified => self.sales_qualified,
            Counter::Opportunities => self.opportunities,
            Counter::Deals => self.deals,
            Counter::Spend => self.spend,
            Counter::Impressions => self.impressions,
            Counter::Clicks => self.clicks,
            Counter::Revenue => self.revenue,
        }
    }

    /// Builder-style setter; returns a new snapshot with `counter` set.
    pub fn with(mut self, counter: Counter, value: f64) -> Self {
        let slot = match counter {
            Counter::Leads => &mut self.leads,
            Counter::Qualified => &mut self.qualified,
            Counter::SalesQualified => &mut self.sales_qualified,
            Counter::Opportunities => &mut self.opportunities,
            Counter::Deals => &mut self.deals,
            Counter::Spend => &mut self.spend,
            Counter::Impressions => &mut self.impressions,
            Counter::Clicks => &mut self.clicks,
            Counter::Revenue => &mut self.revenue,
        };
        *slot = Some(value);
        self
    }

    /// Present and strictly positive.
    pub fn has_positive(&self, counter: Counter) -> bool {
        matches!(self.get(counter), Some(v) if v > 0.0)
    }
}

/// Where the leads in a snapshot were acquired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionChannel {
    PaidSearch,
    PaidSocial,
    Display,
    Organic,
    Referral,
    Outbound,
    Events,
}

impl AcquisitionChannel {
    /// Channels whose volume is bought, and therefore should report spend.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            AcquisitionChannel::PaidSearch | AcquisitionChannel::PaidSocial | AcquisitionChannel::Display
        )
    }
}

/// Optional host-supplied flags that steer the action rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticContext {
    pub channel: Option<AcquisitionChannel>,
    /// Free-form industry segment label, e.g. "b2b_saas".
    pub segment: Option<String>,
    /// Whether website live chat feeds the CRM. `None` when unknown.
    pub live_chat_integrated: Option<bool>,
}
