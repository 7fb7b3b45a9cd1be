//! The hub: peer registry and request fan-out
//!
//! A [`PlasticHub`] owns the registry of peers and delivers requests to
//! them. Every request is fanned out on one Tokio task per target.
//! Synchronous requests wait for all targets and collect their answers;
//! asynchronous ones return at once.
//!
//! The hub announces registrations, unregistrations and its own shutdown
//! to the other peers with the hub event messages, sent asynchronously
//! with the hub's own id as sender.

use crate::agent::{Agent, Transport};
use crate::application::BasicApplication;
use crate::config::HubConfig;
use crate::constants::{EVENT_LOGGER_NAME, VALIDATION_LOGGER_NAME};
use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::listener::{HubService, PlasticListener, ResponseMap};
use crate::logging::{
    HubLifecycleEvent, HubStage, RegistrationEvent, RequestEvent, RequestMode, ResponseEvent,
};
use crate::message_id::{APPLICATION_REGISTERED, APPLICATION_UNREGISTERED, HUB_STOPPING};
use crate::object::RemoteCallback;
use crate::servers::ServerSet;
use crate::validator::MessageValidator;
use crate::value::Value;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Registered name of the hub's own identity agent
pub const HUB_NAME: &str = "hub";

type Worker = JoinHandle<(Arc<Agent>, Result<Value>)>;

pub struct PlasticHub {
    config: HubConfig,
    instance: u32,
    hub_id: Identifier,
    next_seq: AtomicU32,
    next_request: AtomicU64,
    agents: DashMap<Identifier, Arc<Agent>>,
    stopped: AtomicBool,
    validator: Option<MessageValidator>,
    http: reqwest::Client,
    servers: Mutex<Option<ServerSet>>,
}

impl PlasticHub {
    /// Creates a hub without any listening servers.
    ///
    /// Peers can only reach it through direct method calls. Use
    /// [`PlasticHub::start`] for a hub other processes can talk to.
    pub fn new(config: HubConfig) -> Arc<Self> {
        let instance: u32 = rand::random();
        let hub_id = Identifier::for_peer(instance, 0, HUB_NAME);
        let app = BasicApplication::new(HUB_NAME).with_description("PLASTIC hub");
        let hub_agent = Agent::new(
            hub_id.clone(),
            HUB_NAME.to_string(),
            app.supported_messages(),
            Transport::Direct(Arc::new(app)),
        );
        let agents = DashMap::new();
        agents.insert(hub_id.clone(), Arc::new(hub_agent));
        let validator = config.validate.then(MessageValidator::new);

        Arc::new(Self {
            config,
            instance,
            hub_id,
            next_seq: AtomicU32::new(1),
            next_request: AtomicU64::new(1),
            agents,
            stopped: AtomicBool::new(false),
            validator,
            http: reqwest::Client::new(),
            servers: Mutex::new(None),
        })
    }

    /// Creates a hub and starts its object protocol and HTTP-RPC servers.
    ///
    /// Fails if either listener cannot be bound or if another live hub
    /// owns the rendezvous file.
    pub async fn start(config: HubConfig) -> Result<Arc<Self>> {
        let hub = Self::new(config);
        let servers = ServerSet::start(&hub).await?;
        info!(
            target: EVENT_LOGGER_NAME,
            "{}",
            HubLifecycleEvent::new(HubStage::Started, hub.hub_id.to_string())
                .with_extra("object_address".into(), servers.object_address().to_string().into())
                .with_extra("xmlrpc_url".into(), servers.xmlrpc_url().to_string().into())
        );
        *hub.servers.lock().await = Some(servers);
        Ok(hub)
    }

    pub fn hub_id(&self) -> &Identifier {
        &self.hub_id
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Address of the object protocol server, if started
    pub async fn object_address(&self) -> Option<SocketAddr> {
        self.servers.lock().await.as_ref().map(|s| s.object_address())
    }

    /// Base URL of the HTTP-RPC server, if started
    pub async fn xmlrpc_url(&self) -> Option<Url> {
        self.servers.lock().await.as_ref().map(|s| s.xmlrpc_url().clone())
    }

    /// The registry entry for `id`
    pub fn agent(&self, id: &Identifier) -> Option<Arc<Agent>> {
        self.agents.get(id).map(|entry| entry.value().clone())
    }

    /// Registers a listener living in this process
    pub fn register_direct(
        &self,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Identifier> {
        self.register(name, messages.to_vec(), Transport::Direct(listener))
    }

    /// Registers a listener reached over an object protocol connection
    pub fn register_remote(
        &self,
        name: &str,
        messages: &[Identifier],
        callback: RemoteCallback,
    ) -> Result<Identifier> {
        self.register(name, messages.to_vec(), Transport::Remote(callback))
    }

    /// Registers a listener reached at an HTTP-RPC callback URL
    pub fn register_xml_rpc(
        &self,
        name: &str,
        messages: &[Identifier],
        callback: Url,
    ) -> Result<Identifier> {
        let transport = Transport::XmlRpc {
            url: callback,
            client: self.http.clone(),
        };
        self.register(name, messages.to_vec(), transport)
    }

    /// Registers a peer that only sends
    pub fn register_no_callback(&self, name: &str) -> Result<Identifier> {
        self.register(name, Vec::new(), Transport::NoCallBack)
    }

    fn register(
        &self,
        name: &str,
        interest: Vec<Identifier>,
        transport: Transport,
    ) -> Result<Identifier> {
        if self.is_stopped() {
            return Err(PlasticError::Stopped);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let id = Identifier::for_peer(self.instance, seq, name);
        let agent = Arc::new(Agent::new(id.clone(), name.to_string(), interest, transport));
        self.agents.insert(id.clone(), agent.clone());
        // stop() may have taken its hub-stopping snapshot before the insert
        if self.is_stopped() {
            self.agents.remove(&id);
            return Err(PlasticError::Stopped);
        }
        if self.config.verbose {
            info!(target: EVENT_LOGGER_NAME, "{}", RegistrationEvent::registered(&agent));
        }
        self.notify(&APPLICATION_REGISTERED, Value::Uri(id.clone()));
        Ok(id)
    }

    /// Removes a peer and tells the remaining peers. Unknown ids are
    /// ignored, so repeating the call is harmless.
    pub fn unregister(&self, id: &Identifier) {
        if *id == self.hub_id {
            warn!("Ignoring request to unregister the hub itself");
            return;
        }
        if let Some((_, agent)) = self.agents.remove(id) {
            if self.config.verbose {
                info!(target: EVENT_LOGGER_NAME, "{}", RegistrationEvent::unregistered(&agent));
            }
            self.notify(&APPLICATION_UNREGISTERED, Value::Uri(id.clone()));
        }
    }

    pub fn get_registered_ids(&self) -> Vec<Identifier> {
        self.agents.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get_name(&self, id: &Identifier) -> Option<String> {
        self.agents.get(id).map(|agent| agent.name().to_string())
    }

    pub fn get_understood_messages(&self, id: &Identifier) -> Option<Vec<Identifier>> {
        self.agents.get(id).map(|agent| agent.interest().to_vec())
    }

    /// Ids of the peers that would receive `message`
    pub fn get_message_registered_ids(&self, message: &Identifier) -> Vec<Identifier> {
        self.agents
            .iter()
            .filter(|entry| entry.supports_message(message))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Sends to every other interested peer and waits for their answers.
    ///
    /// Targets that fail are left out of the returned map.
    pub async fn request(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> ResponseMap {
        let targets = self.others(sender);
        self.request_to(sender, message, args, targets).await
    }

    /// Like [`request`](Self::request), restricted to `recipients`.
    ///
    /// Recipients that are not registered are dropped.
    pub async fn request_to_subset(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) -> ResponseMap {
        let targets = self.selected(recipients);
        self.request_to(sender, message, args, targets).await
    }

    /// Sends without waiting for answers. Outside a Tokio runtime nothing
    /// can be sent, and the request is logged and dropped.
    pub fn request_asynch(&self, sender: &Identifier, message: &Identifier, args: &[Value]) {
        let targets = self.others(sender);
        self.request_asynch_to(sender, message, args, targets);
    }

    pub fn request_to_subset_asynch(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) {
        let targets = self.selected(recipients);
        self.request_asynch_to(sender, message, args, targets);
    }

    /// Shuts the hub down.
    ///
    /// Peers are sent the hub-stopping message, which is given
    /// `notify_timeout` to arrive, then both servers are closed and the
    /// rendezvous file removed. Only the first call does anything.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            target: EVENT_LOGGER_NAME,
            "{}",
            HubLifecycleEvent::new(HubStage::Stopping, self.hub_id.to_string())
        );

        let targets = self
            .others(&self.hub_id)
            .into_iter()
            .filter(|agent| agent.supports_message(&HUB_STOPPING))
            .collect();
        let workers = self.spawn_workers(&self.hub_id, &HUB_STOPPING, &[], targets);
        let limit = self.config.notify_timeout();
        if tokio::time::timeout(limit, join_all(workers)).await.is_err() {
            debug!("Hub stopping notification still in progress after {:?}", limit);
        }

        if let Some(servers) = self.servers.lock().await.take() {
            servers.shutdown().await;
        }
        info!(
            target: EVENT_LOGGER_NAME,
            "{}",
            HubLifecycleEvent::new(HubStage::Stopped, self.hub_id.to_string())
        );
    }

    /// Renders a value for logs, naming registered peers as `id:<name>`
    pub fn stringify(&self, value: &Value) -> String {
        match value {
            Value::List(items) => bracket(items.iter().map(|v| self.stringify(v))),
            Value::Map(map) => {
                bracket(map.iter().map(|(k, v)| format!("{}={}", k, self.stringify(v))))
            }
            Value::Uri(id) => self.stringify_id(id),
            Value::Str(text) => match Identifier::parse(text) {
                Ok(id) if self.agents.contains_key(&id) => self.stringify_id(&id),
                _ => value.to_string(),
            },
            other => other.to_string(),
        }
    }

    pub fn stringify_id(&self, id: &Identifier) -> String {
        match self.agents.get(id) {
            Some(agent) => format!("id:{}", agent.name()),
            None => id.to_string(),
        }
    }

    fn others(&self, excluded: &Identifier) -> Vec<Arc<Agent>> {
        self.agents
            .iter()
            .filter(|entry| entry.key() != excluded)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn selected(&self, ids: &[Identifier]) -> Vec<Arc<Agent>> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.agent(id))
            .collect()
    }

    fn notify(&self, message: &Identifier, payload: Value) {
        if tokio::runtime::Handle::try_current().is_err() {
            debug!("No runtime; not sending {}", message);
            return;
        }
        let targets = self.others(&self.hub_id);
        self.request_asynch_to(&self.hub_id, message, &[payload], targets);
    }

    async fn request_to(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        agents: Vec<Arc<Agent>>,
    ) -> ResponseMap {
        let mut results = ResponseMap::new();
        if self.is_stopped() {
            return results;
        }
        let targets: Vec<_> = agents
            .into_iter()
            .filter(|agent| agent.supports_message(message))
            .collect();
        let request_id = self.begin_request(RequestMode::Synch, sender, message, args, &targets);

        for joined in join_all(self.spawn_workers(sender, message, args, targets)).await {
            match joined {
                Ok((agent, Ok(value))) => {
                    self.check_response(message, &value);
                    if self.config.verbose {
                        info!(
                            target: EVENT_LOGGER_NAME,
                            "{}",
                            ResponseEvent::success(
                                request_id,
                                self.stringify_id(agent.id()),
                                self.stringify(&value)
                            )
                        );
                    }
                    results.insert(agent.id().clone(), value);
                }
                Ok((agent, Err(e))) => {
                    if self.config.verbose {
                        info!(
                            target: EVENT_LOGGER_NAME,
                            "{}",
                            ResponseEvent::failure(request_id, self.stringify_id(agent.id()), &e)
                        );
                    } else {
                        debug!("Request {} to {} failed: {}", request_id, agent, e);
                    }
                }
                Err(e) => warn!("Request {} worker died: {}", request_id, e),
            }
        }
        results
    }

    fn request_asynch_to(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        agents: Vec<Arc<Agent>>,
    ) {
        if self.is_stopped() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No async runtime; dropping asynch {} from {}", message, sender);
            return;
        }
        let targets: Vec<_> = agents
            .into_iter()
            .filter(|agent| agent.supports_message(message))
            .collect();
        self.begin_request(RequestMode::Asynch, sender, message, args, &targets);
        for agent in &targets {
            agent.request_asynch(sender, message, args);
        }
    }

    fn spawn_workers(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        targets: Vec<Arc<Agent>>,
    ) -> Vec<Worker> {
        let args: Arc<[Value]> = Arc::from(args);
        let limit = self.config.request_timeout();
        targets
            .into_iter()
            .map(|agent| {
                let sender = sender.clone();
                let message = message.clone();
                let args = args.clone();
                tokio::spawn(async move {
                    let outcome = match limit {
                        Some(limit) => {
                            match tokio::time::timeout(limit, agent.request(&sender, &message, &args))
                                .await
                            {
                                Ok(outcome) => outcome,
                                Err(_) => Err(PlasticError::transport(
                                    agent.connection_description(),
                                    format!("no response within {:?}", limit),
                                )),
                            }
                        }
                        None => agent.request(&sender, &message, &args).await,
                    };
                    (agent, outcome)
                })
            })
            .collect()
    }

    /// Logs and validates a request about to be fanned out; returns its
    /// sequence number.
    fn begin_request(
        &self,
        mode: RequestMode,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        targets: &[Arc<Agent>],
    ) -> u64 {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        if self.config.verbose {
            let event = RequestEvent::new(
                request_id,
                mode,
                self.stringify_id(sender),
                message.to_string(),
                bracket(args.iter().map(|v| self.stringify(v))),
                targets.iter().map(|a| self.stringify_id(a.id())).collect(),
            );
            info!(target: EVENT_LOGGER_NAME, "{}", event);
        }
        if let Some(validator) = &self.validator {
            let registered = self.get_registered_ids();
            for warning in validator.validate_request(sender, message, args, Some(&registered)) {
                warn!(target: VALIDATION_LOGGER_NAME, "{}", warning);
            }
        }
        request_id
    }

    fn check_response(&self, message: &Identifier, value: &Value) {
        if let Some(validator) = &self.validator {
            for warning in validator.validate_response(message, value) {
                warn!(target: VALIDATION_LOGGER_NAME, "{}", warning);
            }
        }
    }
}

fn bracket<I: Iterator<Item = String>>(items: I) -> String {
    let items: Vec<_> = items.collect();
    if items.is_empty() {
        "()".to_string()
    } else {
        format!("( {} )", items.join(", "))
    }
}

impl std::fmt::Debug for PlasticHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlasticHub")
            .field("hub_id", &self.hub_id)
            .field("agents", &self.agents.len())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HubService for PlasticHub {
    async fn get_hub_id(&self) -> Result<Identifier> {
        Ok(self.hub_id.clone())
    }

    async fn get_registered_ids(&self) -> Result<Vec<Identifier>> {
        Ok(PlasticHub::get_registered_ids(self))
    }

    async fn get_name(&self, id: &Identifier) -> Result<Option<String>> {
        Ok(PlasticHub::get_name(self, id))
    }

    async fn get_understood_messages(&self, id: &Identifier) -> Result<Option<Vec<Identifier>>> {
        Ok(PlasticHub::get_understood_messages(self, id))
    }

    async fn get_message_registered_ids(&self, message: &Identifier) -> Result<Vec<Identifier>> {
        Ok(PlasticHub::get_message_registered_ids(self, message))
    }

    async fn register_xml_rpc(
        &self,
        name: &str,
        messages: &[Identifier],
        callback: &Url,
    ) -> Result<Identifier> {
        PlasticHub::register_xml_rpc(self, name, messages, callback.clone())
    }

    async fn register_no_callback(&self, name: &str) -> Result<Identifier> {
        PlasticHub::register_no_callback(self, name)
    }

    async fn register_listener(
        &self,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Identifier> {
        self.register_direct(name, messages, listener)
    }

    async fn unregister(&self, id: &Identifier) -> Result<()> {
        PlasticHub::unregister(self, id);
        Ok(())
    }

    async fn request(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<ResponseMap> {
        Ok(PlasticHub::request(self, sender, message, args).await)
    }

    async fn request_asynch(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<()> {
        PlasticHub::request_asynch(self, sender, message, args);
        Ok(())
    }

    async fn request_to_subset(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) -> Result<ResponseMap> {
        Ok(PlasticHub::request_to_subset(self, sender, message, args, recipients).await)
    }

    async fn request_to_subset_asynch(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) -> Result<()> {
        PlasticHub::request_to_subset_asynch(self, sender, message, args, recipients);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FnListener;
    use crate::message_id::ECHO;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn calc() -> Identifier {
        Identifier::parse("ivo://plastic.starlink.ac.uk/test/calc").unwrap()
    }

    /// Keeps a running total and answers with it
    fn adder() -> Arc<FnListener> {
        let total = Arc::new(StdMutex::new(0));
        Arc::new(FnListener::new(move |_, _, args: Vec<Value>| {
            let total = total.clone();
            async move {
                let mut t = total.lock().unwrap();
                *t += args.get(1).and_then(Value::as_int).unwrap_or(0);
                Ok(Value::Int(*t))
            }
        }))
    }

    /// Records every message received
    fn recorder() -> (Arc<FnListener>, Arc<StdMutex<Vec<Identifier>>>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sink = log.clone();
        let listener = FnListener::new(move |_, message, _| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(message);
                Ok(Value::Null)
            }
        });
        (Arc::new(listener), log)
    }

    #[tokio::test]
    async fn test_register_and_unregister_idempotent() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let id = hub.register_no_callback("driver").unwrap();
        let ids = hub.get_registered_ids();
        assert_eq!(ids.iter().filter(|i| **i == id).count(), 1);
        assert!(ids.contains(hub.hub_id()));
        assert_eq!(hub.get_name(&id).as_deref(), Some("driver"));

        hub.unregister(&id);
        assert!(!hub.get_registered_ids().contains(&id));
        hub.unregister(&id);
        assert!(hub.get_name(&id).is_none());
        assert!(hub.get_understood_messages(&id).is_none());
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let a = hub.register_no_callback("same").unwrap();
        hub.unregister(&a);
        let b = hub.register_no_callback("same").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sender_excluded_and_interest_respected() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let other = Identifier::parse("ivo://example.org/other").unwrap();
        let a = hub.register_direct("a", &[], adder()).unwrap();
        let b = hub.register_direct("b", &[calc()], adder()).unwrap();
        let c = hub.register_direct("c", &[other], adder()).unwrap();

        let results = hub
            .request(&a, &calc(), &[Value::from("PLUS"), Value::Int(1)])
            .await;
        assert!(results.contains_key(&b));
        assert!(!results.contains_key(&a));
        assert!(!results.contains_key(&c));
        assert!(!results.contains_key(hub.hub_id()));

        let interested = hub.get_message_registered_ids(&calc());
        assert!(interested.contains(&a));
        assert!(interested.contains(&b));
        assert!(!interested.contains(&c));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_calculator_scenario() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let driver = hub.register_no_callback("driver").unwrap();
        let c1 = hub.register_direct("c1", &[calc()], adder()).unwrap();
        let c2 = hub.register_direct("c2", &[calc()], adder()).unwrap();

        let results = hub
            .request(&driver, &calc(), &[Value::from("PLUS"), Value::Int(10)])
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[&c1], Value::Int(10));
        assert_eq!(results[&c2], Value::Int(10));

        let results = hub
            .request_to_subset(
                &driver,
                &calc(),
                &[Value::from("PLUS"), Value::Int(90)],
                &[c1.clone()],
            )
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[&c1], Value::Int(100));

        hub.unregister(&c1);
        let results = hub
            .request(&driver, &calc(), &[Value::from("PLUS"), Value::Int(0)])
            .await;
        assert!(!results.contains_key(&c1));
        assert_eq!(results[&c2], Value::Int(10));
        assert!(!hub.get_message_registered_ids(&calc()).contains(&c1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subset_drops_unknown_and_uninterested() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let driver = hub.register_no_callback("driver").unwrap();
        let b = hub.register_direct("b", &[calc()], adder()).unwrap();
        let mute = hub.register_no_callback("mute").unwrap();
        let ghost = Identifier::parse("plastic://hub/0-99-ghost").unwrap();

        let results = hub
            .request_to_subset(&driver, &calc(), &[], &[b.clone(), mute, ghost])
            .await;
        assert_eq!(results.keys().collect::<Vec<_>>(), vec![&b]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_target_is_absent() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let driver = hub.register_no_callback("driver").unwrap();
        let good = hub.register_direct("good", &[calc()], adder()).unwrap();
        let bad = hub
            .register_direct(
                "bad",
                &[calc()],
                Arc::new(FnListener::new(|_, _, _| async {
                    Err(PlasticError::Remote("broken".into()))
                })),
            )
            .unwrap();
        let null = hub
            .register_direct(
                "null",
                &[calc()],
                Arc::new(FnListener::new(|_, _, _| async { Ok(Value::Null) })),
            )
            .unwrap();

        let results = hub.request(&driver, &calc(), &[]).await;
        assert!(results.contains_key(&good));
        assert!(!results.contains_key(&bad));
        assert_eq!(results.get(&null), Some(&Value::Null));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_request_timeout_drops_slow_target() {
        let config = HubConfig::ephemeral().with_request_timeout(Some(Duration::from_millis(50)));
        let hub = PlasticHub::new(config);
        let driver = hub.register_no_callback("driver").unwrap();
        let slow = hub
            .register_direct(
                "slow",
                &[calc()],
                Arc::new(FnListener::new(|_, _, _| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Value::Int(1))
                })),
            )
            .unwrap();
        let quick = hub.register_direct("quick", &[calc()], adder()).unwrap();

        let results = hub.request(&driver, &calc(), &[]).await;
        assert!(!results.contains_key(&slow));
        assert!(results.contains_key(&quick));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registration_events_reach_other_peers() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let (listener, log) = recorder();
        hub.register_direct("watcher", &[APPLICATION_REGISTERED.clone()], listener)
            .unwrap();
        let newcomer = hub.register_no_callback("newcomer").unwrap();
        hub.unregister(&newcomer);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let seen = log.lock().unwrap().clone();
        // its own registration plus the newcomer's; unregistration not subscribed
        assert_eq!(seen.iter().filter(|m| **m == *APPLICATION_REGISTERED).count(), 2);
        assert!(!seen.contains(&APPLICATION_UNREGISTERED));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_notifies_once_and_blocks_registration() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let (listener, log) = recorder();
        let peer = hub.register_direct("peer", &[HUB_STOPPING.clone()], listener).unwrap();

        hub.stop().await;
        hub.stop().await;
        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.iter().filter(|m| **m == *HUB_STOPPING).count(), 1);

        assert!(matches!(
            hub.register_no_callback("late"),
            Err(PlasticError::Stopped)
        ));
        assert!(hub.request(&peer, &HUB_STOPPING, &[]).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registration_racing_stop_is_notified_or_refused() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let racers: Vec<_> = (0..64)
            .map(|i| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    let (listener, log) = recorder();
                    let name = format!("racer {}", i);
                    let outcome = hub.register_direct(&name, &[HUB_STOPPING.clone()], listener);
                    (outcome, log)
                })
            })
            .collect();
        hub.stop().await;

        for racer in racers {
            let (outcome, log) = racer.await.unwrap();
            match outcome {
                Ok(id) => {
                    let seen = log.lock().unwrap().clone();
                    let heard = seen.iter().filter(|m| **m == *HUB_STOPPING).count();
                    assert_eq!(heard, 1, "{} registered but missed the hub stopping", id);
                }
                Err(e) => assert!(matches!(e, PlasticError::Stopped)),
            }
        }
    }

    #[test]
    fn test_asynch_requests_without_runtime_are_dropped() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let driver = hub.register_no_callback("driver").unwrap();
        let (listener, log) = recorder();
        let peer = hub.register_direct("peer", &[], listener).unwrap();

        hub.request_asynch(&driver, &calc(), &[Value::Int(1)]);
        hub.request_to_subset_asynch(&driver, &calc(), &[], &[peer.clone()]);
        hub.agent(&peer).unwrap().request_asynch(&driver, &calc(), &[]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hub_answers_echo() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let driver = hub.register_no_callback("driver").unwrap();
        let results = hub
            .request_to_subset(&driver, &ECHO, &[Value::from("ping")], &[hub.hub_id().clone()])
            .await;
        assert_eq!(results[hub.hub_id()], Value::from("ping"));
    }

    #[tokio::test]
    async fn test_stringify_names_peers() {
        let hub = PlasticHub::new(HubConfig::ephemeral());
        let driver = hub.register_no_callback("driver").unwrap();
        let value = Value::List(vec![
            Value::Uri(driver.clone()),
            Value::from(hub.hub_id().to_string()),
            Value::Int(3),
        ]);
        assert_eq!(hub.stringify(&value), "( id:driver, id:hub, 3 )");
        assert_eq!(hub.stringify(&Value::List(vec![])), "()");
    }
}
