//! Dependency wiring.
//!
//! Builds the store, registry, broadcaster, bus, engine and gateway once and
//! hands out shared handles. The scheduler and fill policy are injected so
//! tests can drive ticks by hand.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::settings::{EngineConfig, FillPolicyKind};
use crate::application::ports::{DeliveryPort, FillPolicy, OrderStore, TickScheduler};
use crate::application::services::{
    EventBus, ImmediateFillPolicy, MatchingEngine, OrderGateway, RandomFillPolicy,
};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::http::AppState;
use crate::infrastructure::persistence::InMemoryOrderStore;
use crate::infrastructure::websocket::WebSocketBroadcaster;

/// Every long-lived component of a running engine.
#[derive(Debug, Clone)]
pub struct EngineContainer {
    /// Order and account records.
    pub store: Arc<InMemoryOrderStore>,
    /// Connection interests.
    pub registry: Arc<SubscriptionRegistry>,
    /// Live WebSocket connections.
    pub broadcaster: Arc<WebSocketBroadcaster>,
    /// Sequenced event fan-out.
    pub bus: Arc<EventBus>,
    /// Simulated market.
    pub engine: Arc<MatchingEngine>,
    /// Client command entry point.
    pub gateway: Arc<OrderGateway>,
}

impl EngineContainer {
    /// Wire all components.
    #[must_use]
    pub fn build(
        config: &EngineConfig,
        scheduler: Arc<dyn TickScheduler>,
        policy: Arc<dyn FillPolicy>,
    ) -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Arc::new(WebSocketBroadcaster::new(
            Arc::clone(&registry),
            config.broadcaster_config(),
        ));
        let bus = Arc::new(EventBus::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster) as Arc<dyn DeliveryPort>,
        ));
        let engine = Arc::new(MatchingEngine::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::clone(&bus),
            scheduler,
            policy,
            config.simulation_config(),
        ));
        let gateway = Arc::new(OrderGateway::new(
            Arc::clone(&store) as Arc<dyn OrderStore>,
            Arc::clone(&engine),
            Arc::clone(&bus),
            config.gateway_config(),
        ));

        Self {
            store,
            registry,
            broadcaster,
            bus,
            engine,
            gateway,
        }
    }

    /// The fill policy `config` selects.
    #[must_use]
    pub fn fill_policy(config: &EngineConfig) -> Arc<dyn FillPolicy> {
        match config.simulation.policy {
            FillPolicyKind::Random => Arc::new(RandomFillPolicy::new(config.random_fill_config())),
            FillPolicyKind::Immediate => Arc::new(ImmediateFillPolicy),
        }
    }

    /// HTTP handler state.
    #[must_use]
    pub fn app_state(&self, shutdown: CancellationToken) -> AppState {
        AppState::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.broadcaster),
            Arc::clone(&self.registry),
            shutdown,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::scheduler::ManualTickScheduler;

    #[test]
    fn policy_follows_config() {
        let mut config = EngineConfig::default();
        assert_eq!(EngineContainer::fill_policy(&config).name(), "random");

        config.simulation.policy = FillPolicyKind::Immediate;
        assert_eq!(EngineContainer::fill_policy(&config).name(), "immediate");
    }

    #[test]
    fn components_share_one_registry() {
        let config = EngineConfig::default();
        let container = EngineContainer::build(
            &config,
            Arc::new(ManualTickScheduler::new()),
            EngineContainer::fill_policy(&config),
        );

        assert!(Arc::ptr_eq(container.bus.registry(), &container.registry));
        assert!(Arc::ptr_eq(container.broadcaster.registry(), &container.registry));
        assert!(container.store.is_empty());
    }
}
