//! Optimistic local edits to agent statistics.
//!
//! An edit is applied to the in-memory collection immediately; the next
//! fetch confirms it, or the caller rolls it back when the backend refuses.

use callboard_core::AgentKey;

use crate::agent::AgentStat;

/// Values an hourly-rate edit replaced, kept for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRateEdit {
    pub key: AgentKey,
    pub new_rate: f64,
    previous_rate: f64,
    previous_earnings: f64,
}

/// Set `key`'s hourly rate and recompute estimated earnings from paid hours.
///
/// Returns `None` (and changes nothing) when no agent has that key or the
/// rate is negative or not finite.
pub fn apply_hourly_rate(
    agents: &mut [AgentStat],
    key: &AgentKey,
    rate: f64,
) -> Option<PendingRateEdit> {
    if !rate.is_finite() || rate < 0.0 {
        return None;
    }
    let agent = agents.iter_mut().find(|a| a.has_key(key))?;

    let edit = PendingRateEdit {
        key: key.clone(),
        new_rate: rate,
        previous_rate: agent.hourly_rate,
        previous_earnings: agent.estimated_earnings,
    };
    agent.hourly_rate = rate;
    agent.estimated_earnings = agent.paid_time_hours * rate;
    Some(edit)
}

impl PendingRateEdit {
    /// Restore the values this edit replaced. Returns whether the agent was
    /// still present.
    pub fn rollback(&self, agents: &mut [AgentStat]) -> bool {
        match agents.iter_mut().find(|a| a.has_key(&self.key)) {
            Some(agent) => {
                agent.hourly_rate = self.previous_rate;
                agent.estimated_earnings = self.previous_earnings;
                true
            }
            None => false,
        }
    }
}
