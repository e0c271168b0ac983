//! Resource offers advertised by agents, and the per-node snapshot derived from them

use chrono::{DateTime, Utc};

use super::resources::ResourceVector;

/// A snapshot of free resources on one agent, valid until consumed or withdrawn
///
/// Immutable once constructed. A scheduling pass consumes an offer either by folding it into a
/// node's [`ResourceSet`] or by leaving it unconsumed (implicitly rejected for this tick).
#[derive(Debug, Clone)]
pub struct Offer {
    /// The id this offer was advertised under
    pub offer_id: String,
    /// The agent that advertised this offer
    pub agent_id: String,
    /// The scheduling framework this offer was advertised to
    pub framework_id: String,
    /// The resources this offer grants
    pub resources: ResourceVector,
    /// When this offer was received
    pub received_at: DateTime<Utc>,
}

impl Offer {
    /// Creates a new offer
    ///
    /// # Arguments
    ///
    /// * `offer_id` - The id this offer was advertised under
    /// * `agent_id` - The agent that advertised this offer
    /// * `framework_id` - The scheduling framework this offer was advertised to
    /// * `resources` - The resources this offer grants
    /// * `received_at` - When this offer was received
    pub fn new<T, A, F>(
        offer_id: T,
        agent_id: A,
        framework_id: F,
        resources: ResourceVector,
        received_at: DateTime<Utc>,
    ) -> Self
    where
        T: Into<String>,
        A: Into<String>,
        F: Into<String>,
    {
        Offer {
            offer_id: offer_id.into(),
            agent_id: agent_id.into(),
            framework_id: framework_id.into(),
            resources,
            received_at,
        }
    }

    /// Sums the resources advertised by a slice of offers
    ///
    /// # Arguments
    ///
    /// * `offers` - The offers to sum
    pub fn sum(offers: &[Offer]) -> ResourceVector {
        offers
            .iter()
            .fold(ResourceVector::new(), |acc, offer| acc.add(&offer.resources))
    }
}

/// The per-node view of resources: what's offered, what's already spoken for, and the recent peak
///
/// Invariant: `used_by_existing_tasks + offered <= watermark`, componentwise, within epsilon.
/// `watermark` only grows within its sticky window; it may shrink only on an explicit agent loss.
#[derive(Debug, Clone)]
pub struct ResourceSet {
    /// The resources currently being offered for this tick
    pub offered: ResourceVector,
    /// The resources already consumed by tasks that predate this tick
    pub used_by_existing_tasks: ResourceVector,
    /// The peak `offered + used` vector observed on this agent within the sticky window
    pub watermark: ResourceVector,
}

impl ResourceSet {
    /// Creates a new resource set
    ///
    /// # Arguments
    ///
    /// * `offered` - The resources currently being offered for this tick
    /// * `used_by_existing_tasks` - The resources already consumed by pre-existing tasks
    /// * `watermark` - The peak `offered + used` vector observed within the sticky window
    pub fn new(
        offered: ResourceVector,
        used_by_existing_tasks: ResourceVector,
        watermark: ResourceVector,
    ) -> Self {
        ResourceSet {
            offered,
            used_by_existing_tasks,
            watermark,
        }
    }
}
