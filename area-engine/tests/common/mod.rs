// Shared fixture for the engine integration tests: a scripted service whose
// Action fires whenever the test bumps an external event counter, plus a
// service that demands OAuth.

#![allow(dead_code)]

use area::credentials::CredentialStore;
use area::session::{JwtSessionIssuer, SessionIssuer};
use area::store::{
    ActionDescriptor, AreaResultStore, AreaStore, CatalogStore, NewArea, NewUser,
    ReactionDescriptor, ServiceDescriptor, UserStore,
};
use area::Cursor;
use area_engine::adapter::{
    ActionPoller, AdapterError, OAuthConfig, PollOutcome, PollRequest, ReactionInvoker,
    ReactionRequest, ServiceAdapter,
};
use area_engine::areas::AreaService;
use area_engine::dispatch::{DispatchContext, DispatchEngine};
use area_engine::oauth::{StateManager, StaticClients, TokenLifecycle};
use area_engine::registry::ServiceRegistry;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub const SLOW_ACTION: &str = "script_event";
pub const FAST_ACTION: &str = "script_event_fast";
pub const RECORD_REACTION: &str = "script_record";
pub const LOCKED_ACTION: &str = "locked_event";

/// What the scripted provider has seen and will report.
#[derive(Default)]
pub struct Script {
    /// Number of events that happened "upstream"
    pub events: AtomicU64,
    pub fail_poll: AtomicBool,
    pub fail_reaction: AtomicBool,
    /// The Reaction removes every Area row before it returns
    pub delete_areas_on_fire: AtomicBool,
    pub polls: Mutex<Vec<Instant>>,
    /// Event payloads the Reaction was invoked with (failed calls included)
    pub fires: Mutex<Vec<Value>>,
    /// Persisted cursor of every enabled Area at the moment the Reaction ran
    pub cursors_at_fire: Mutex<Vec<Cursor>>,
}

impl Script {
    pub fn emit(&self) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().clone()
    }

    pub fn fire_count(&self) -> usize {
        self.fires.lock().unwrap().len()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Seen {
    pub seen: u64,
}

struct ScriptedPoller {
    script: Arc<Script>,
}

#[async_trait]
impl ActionPoller for ScriptedPoller {
    async fn poll(&self, request: PollRequest) -> Result<PollOutcome, AdapterError> {
        self.script.polls.lock().unwrap().push(Instant::now());
        if self.script.fail_poll.load(Ordering::SeqCst) {
            return Err(AdapterError::Transient("provider unavailable".to_string()));
        }

        let seen = request.cursor.decode::<Seen>().unwrap_or_default().seen;
        let current = self.script.events.load(Ordering::SeqCst);
        if current <= seen {
            return Ok(PollOutcome::idle());
        }
        Ok(PollOutcome::Event {
            payload: json!({ "event": current }),
            cursor: Cursor::encode(&Seen { seen: current }).unwrap(),
        })
    }
}

struct RecordingReaction {
    script: Arc<Script>,
    areas: Arc<AreaStore>,
}

#[async_trait]
impl ReactionInvoker for RecordingReaction {
    async fn invoke(&self, request: ReactionRequest) -> Result<String, AdapterError> {
        let cursors = self
            .areas
            .find_enabled()
            .unwrap()
            .into_iter()
            .map(|area| area.cursor);
        self.script.cursors_at_fire.lock().unwrap().extend(cursors);
        self.script.fires.lock().unwrap().push(request.event.clone());

        if self.script.delete_areas_on_fire.load(Ordering::SeqCst) {
            for area in self.areas.find_enabled().unwrap() {
                self.areas.delete(area.id).unwrap();
            }
        }
        if self.script.fail_reaction.load(Ordering::SeqCst) {
            return Err(AdapterError::Rejected("reaction refused".to_string()));
        }
        Ok(format!("recorded {}", request.event["event"]))
    }
}

pub struct ScriptedAdapter {
    script: Arc<Script>,
    areas: Arc<AreaStore>,
}

impl ServiceAdapter for ScriptedAdapter {
    fn service(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "script".to_string(),
            description: "Scripted test service".to_string(),
            oauth: false,
            color: "#123456".to_string(),
            icon: "script".to_string(),
        }
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor {
                name: SLOW_ACTION.to_string(),
                description: "Event with a 10s floor".to_string(),
                default_options: json!({}),
                minimum_interval_secs: 10,
            },
            ActionDescriptor {
                name: FAST_ACTION.to_string(),
                description: "Event without a floor".to_string(),
                default_options: json!({}),
                minimum_interval_secs: 0,
            },
        ]
    }

    fn reactions(&self) -> Vec<ReactionDescriptor> {
        vec![ReactionDescriptor {
            name: RECORD_REACTION.to_string(),
            description: "Records the event".to_string(),
            default_options: json!({}),
        }]
    }

    fn action_handler(&self, name: &str) -> Option<Arc<dyn ActionPoller>> {
        match name {
            SLOW_ACTION | FAST_ACTION => Some(Arc::new(ScriptedPoller {
                script: self.script.clone(),
            })),
            _ => None,
        }
    }

    fn reaction_handler(&self, name: &str) -> Option<Arc<dyn ReactionInvoker>> {
        (name == RECORD_REACTION).then(|| {
            Arc::new(RecordingReaction {
                script: self.script.clone(),
                areas: self.areas.clone(),
            }) as Arc<dyn ReactionInvoker>
        })
    }
}

/// A service whose Areas need a connected credential.
pub struct LockedAdapter {
    script: Arc<Script>,
}

impl ServiceAdapter for LockedAdapter {
    fn service(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "locked".to_string(),
            description: "Needs OAuth".to_string(),
            oauth: true,
            color: "#000000".to_string(),
            icon: "lock".to_string(),
        }
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![ActionDescriptor {
            name: LOCKED_ACTION.to_string(),
            description: "Never fires".to_string(),
            default_options: json!({}),
            minimum_interval_secs: 10,
        }]
    }

    fn reactions(&self) -> Vec<ReactionDescriptor> {
        vec![]
    }

    fn action_handler(&self, name: &str) -> Option<Arc<dyn ActionPoller>> {
        (name == LOCKED_ACTION).then(|| {
            Arc::new(ScriptedPoller {
                script: self.script.clone(),
            }) as Arc<dyn ActionPoller>
        })
    }

    fn reaction_handler(&self, _name: &str) -> Option<Arc<dyn ReactionInvoker>> {
        None
    }

    fn oauth_config(&self) -> Option<OAuthConfig> {
        Some(OAuthConfig {
            auth_url: "https://locked.example.com/authorize".to_string(),
            token_url: "https://locked.example.com/token".to_string(),
            scopes: vec![],
        })
    }
}

pub struct Harness {
    pub script: Arc<Script>,
    pub users: Arc<UserStore>,
    pub credentials: Arc<CredentialStore>,
    pub catalog: Arc<CatalogStore>,
    pub areas: Arc<AreaStore>,
    pub results: Arc<AreaResultStore>,
    pub registry: Arc<ServiceRegistry>,
    pub sessions: Arc<dyn SessionIssuer>,
    pub tokens: Arc<TokenLifecycle>,
    pub engine: Arc<DispatchEngine>,
    pub service: Arc<AreaService>,
}

impl Harness {
    pub fn new() -> Self {
        let script = Arc::new(Script::default());
        let key = BASE64.encode([9u8; 32]);

        let users = Arc::new(UserStore::new(":memory:").unwrap());
        let credentials = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
        let catalog = Arc::new(CatalogStore::new(":memory:").unwrap());
        let areas = Arc::new(AreaStore::new(":memory:").unwrap());
        let results = Arc::new(AreaResultStore::new(":memory:").unwrap());

        let adapters: Vec<Arc<dyn ServiceAdapter>> = vec![
            Arc::new(ScriptedAdapter {
                script: script.clone(),
                areas: areas.clone(),
            }),
            Arc::new(LockedAdapter {
                script: script.clone(),
            }),
        ];
        let registry = Arc::new(ServiceRegistry::with_adapters(adapters).unwrap());
        registry.seed(&catalog).unwrap();

        let sessions: Arc<dyn SessionIssuer> = Arc::new(JwtSessionIssuer::new("test-secret"));
        let tokens = Arc::new(TokenLifecycle::new(
            registry.clone(),
            users.clone(),
            credentials.clone(),
            sessions.clone(),
            Arc::new(StaticClients::default()),
            StateManager::new(600),
            "http://localhost:8080",
            chrono::Duration::seconds(90),
        ));

        let engine = Arc::new(DispatchEngine::new(DispatchContext {
            areas: areas.clone(),
            results: results.clone(),
            catalog: catalog.clone(),
            registry: registry.clone(),
            tokens: tokens.clone(),
            failure_alert_threshold: 3,
        }));

        let service = Arc::new(AreaService::new(
            areas.clone(),
            results.clone(),
            catalog.clone(),
            credentials.clone(),
            registry.clone(),
            engine.clone(),
        ));

        Self {
            script,
            users,
            credentials,
            catalog,
            areas,
            results,
            registry,
            sessions,
            tokens,
            engine,
            service,
        }
    }

    /// Registers a user and returns its id with a session token.
    pub fn user(&self, name: &str) -> (i64, String) {
        let user = self
            .users
            .save(&NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: None,
            })
            .unwrap();
        let token = self.sessions.issue(user.id).unwrap();
        (user.id, token)
    }

    pub fn action_id(&self, name: &str) -> i64 {
        self.catalog.action_by_name(name).unwrap().unwrap().id
    }

    pub fn reaction_id(&self, name: &str) -> i64 {
        self.catalog.reaction_by_name(name).unwrap().unwrap().id
    }

    pub fn new_area(&self, action: &str, interval_secs: u64) -> NewArea {
        NewArea {
            title: format!("{} every {}s", action, interval_secs),
            description: String::new(),
            action_id: self.action_id(action),
            action_options: json!({}),
            action_interval_secs: interval_secs,
            reaction_id: self.reaction_id(RECORD_REACTION),
            reaction_options: json!({}),
        }
    }
}
