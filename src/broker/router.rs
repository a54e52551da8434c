//! Account to gateway routing.

use super::traits::BrokerGateway;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves the gateway serving a strategy's account.
#[derive(Clone, Default)]
pub struct BrokerRouter {
    accounts: HashMap<String, Arc<dyn BrokerGateway>>,
    fallback: Option<Arc<dyn BrokerGateway>>,
}

impl BrokerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router that sends every account to the same gateway.
    pub fn single(gateway: Arc<dyn BrokerGateway>) -> Self {
        Self {
            accounts: HashMap::new(),
            fallback: Some(gateway),
        }
    }

    pub fn with_account(mut self, account: impl Into<String>, gateway: Arc<dyn BrokerGateway>) -> Self {
        self.accounts.insert(account.into(), gateway);
        self
    }

    pub fn resolve(&self, account: &str) -> Option<Arc<dyn BrokerGateway>> {
        self.accounts
            .get(account)
            .or(self.fallback.as_ref())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerGateway;

    #[test]
    fn test_resolve_prefers_account_then_fallback() {
        let dedicated: Arc<dyn BrokerGateway> = Arc::new(MockBrokerGateway::new());
        let shared: Arc<dyn BrokerGateway> = Arc::new(MockBrokerGateway::new());

        let router = BrokerRouter::new().with_account("111-01", dedicated.clone());
        assert!(router.resolve("111-01").is_some());
        assert!(router.resolve("222-01").is_none());

        let router = BrokerRouter::single(shared.clone()).with_account("111-01", dedicated.clone());
        assert!(Arc::ptr_eq(&router.resolve("111-01").unwrap(), &dedicated));
        assert!(Arc::ptr_eq(&router.resolve("222-01").unwrap(), &shared));
    }
}
