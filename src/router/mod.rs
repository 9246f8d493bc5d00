// src/router/mod.rs

//! Process-local publish/subscribe registry for inbound remote events.
//!
//! Handlers register against an [`EventAddress`] with an identifier. Each
//! dispatched event is matched against every registered address using
//! [`EventAddress::matches`], and all matching handlers run in registration
//! order.
//!
//! A failing handler never blocks its siblings: dispatch keeps going and
//! reports every failure at the end as one aggregate error.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::errors::{BridgeError, DispatchFailures, HandlerFailure, Result};
use crate::protocol::{decode_event, EventAddress, RemoteEvent};

/// Callback invoked for each matching event.
pub type Handler = Arc<dyn Fn(&RemoteEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    identifier: String,
    callback: Handler,
}

/// All registrations whose addresses are equivalent.
struct Route {
    address: EventAddress,
    registrations: Vec<Registration>,
}

#[derive(Default)]
pub struct MessageRouter {
    routes: RwLock<Vec<Route>>,
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = f.debug_map();
        for route in routes.iter() {
            let ids: Vec<_> = route
                .registrations
                .iter()
                .map(|r| r.identifier.as_str())
                .collect();
            map.entry(&route.address.to_string(), &ids);
        }
        map.finish()
    }
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `address`.
    ///
    /// Fails with `DuplicateHandler` if an equivalent address already has a
    /// registration with the same identifier.
    pub fn register<F>(
        &self,
        address: EventAddress,
        identifier: impl Into<String>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&RemoteEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);

        let registration = Registration {
            identifier: identifier.clone(),
            callback: Arc::new(handler),
        };

        match routes.iter_mut().find(|r| r.address.matches(&address)) {
            Some(route) => {
                if route
                    .registrations
                    .iter()
                    .any(|r| r.identifier == identifier)
                {
                    return Err(BridgeError::DuplicateHandler {
                        address,
                        identifier,
                    });
                }
                route.registrations.push(registration);
            }
            None => routes.push(Route {
                address: address.clone(),
                registrations: vec![registration],
            }),
        }

        debug!(%address, identifier = %identifier, "registered handler");
        Ok(())
    }

    /// Remove a registration. Returns `true` if one was removed.
    pub fn unregister(&self, address: &EventAddress, identifier: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(route) = routes.iter_mut().find(|r| r.address.matches(address)) else {
            return false;
        };
        let before = route.registrations.len();
        route.registrations.retain(|r| r.identifier != identifier);
        let removed = route.registrations.len() != before;
        routes.retain(|r| !r.registrations.is_empty());
        removed
    }

    pub fn has_handlers(&self, address: &EventAddress) -> bool {
        self.handler_count(address) > 0
    }

    pub fn handler_count(&self, address: &EventAddress) -> usize {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .filter(|r| r.address.matches(address))
            .map(|r| r.registrations.len())
            .sum()
    }

    /// Deliver `event` to every handler registered under an equivalent
    /// address.
    ///
    /// The registry lock is released before any handler runs, so handlers
    /// may register further handlers without deadlocking.
    pub fn dispatch(&self, event: &RemoteEvent) -> Result<()> {
        let address = event.address();
        let matching = self.matching(&address);

        if matching.is_empty() {
            trace!(%address, "no handlers registered; dropping event");
            return Ok(());
        }

        let mut failures = Vec::new();
        for registration in matching {
            if let Err(error) = (registration.callback)(event) {
                debug!(
                    %address,
                    identifier = %registration.identifier,
                    error = %error,
                    "handler failed; continuing dispatch"
                );
                failures.push(HandlerFailure {
                    identifier: registration.identifier,
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchFailures { address, failures }.into())
        }
    }

    /// Decode a raw inbound frame payload and dispatch it.
    pub fn dispatch_frame(&self, payload: &[u8]) -> Result<()> {
        let event = decode_event(payload)?;
        self.dispatch(&event)
    }

    fn matching(&self, address: &EventAddress) -> Vec<Registration> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter()
            .filter(|r| r.address.matches(address))
            .flat_map(|r| r.registrations.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::catalog;
    use crate::protocol::{RemoteStatus, Scope};
    use std::sync::Mutex;

    fn status(scope: Scope) -> RemoteEvent {
        RemoteEvent::Status {
            scope,
            status: RemoteStatus::Running,
        }
    }

    #[test]
    fn duplicate_identifier_under_equivalent_address_fails() {
        let router = MessageRouter::new();
        router
            .register(catalog::operation_status("a"), "h", |_| Ok(()))
            .unwrap();

        let err = router
            .register(catalog::operation_status("a"), "h", |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateHandler { .. }));

        router
            .register(catalog::operation_status("a"), "other", |_| Ok(()))
            .unwrap();
        router
            .register(catalog::operation_status("b"), "h", |_| Ok(()))
            .unwrap();
        assert_eq!(router.handler_count(&catalog::operation_status("a")), 2);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let router = MessageRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            router
                .register(catalog::job_status(), name, move |_| {
                    order.lock().unwrap().push(name);
                    Ok(())
                })
                .unwrap();
        }

        router.dispatch(&status(Scope::JobWide)).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn no_matching_handler_is_silent() {
        let router = MessageRouter::new();
        router
            .register(catalog::operation_status("a"), "h", |_| anyhow::bail!("must not run"))
            .unwrap();
        router.dispatch(&status(Scope::JobWide)).unwrap();
    }

    #[test]
    fn unregister_removes_only_named_handler() {
        let router = MessageRouter::new();
        router.register(catalog::stop(), "a", |_| Ok(())).unwrap();
        router.register(catalog::stop(), "b", |_| Ok(())).unwrap();
        assert!(router.unregister(&catalog::stop(), "a"));
        assert!(!router.unregister(&catalog::stop(), "a"));
        assert_eq!(router.handler_count(&catalog::stop()), 1);
    }

    #[test]
    fn dispatch_frame_rejects_empty_payload() {
        let router = MessageRouter::new();
        assert!(matches!(
            router.dispatch_frame(b""),
            Err(BridgeError::InvalidDispatch(_))
        ));
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let router = Arc::new(MessageRouter::new());
        let inner = Arc::clone(&router);
        router
            .register(catalog::job_status(), "registrar", move |_| {
                inner.register(catalog::job_log(), "late", |_| Ok(()))?;
                Ok(())
            })
            .unwrap();

        router.dispatch(&status(Scope::JobWide)).unwrap();
        assert!(router.has_handlers(&catalog::job_log()));
    }
}
