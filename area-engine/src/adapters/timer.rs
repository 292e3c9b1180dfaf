//! Timer service: clock-driven Action and Reaction, no OAuth.

use crate::adapter::{
    parse_options, ActionPoller, AdapterError, PollOutcome, PollRequest, ReactionInvoker,
    ReactionRequest, ServiceAdapter,
};
use area::store::{ActionDescriptor, ReactionDescriptor, ServiceDescriptor};
use area::Cursor;
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const SERVICE: &str = "timer";
pub const SPECIFIC_TIME: &str = "specific_time";
pub const GIVE_TIME: &str = "give_time";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct SpecificTimeOptions {
    hour: u32,
    minute: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct SpecificTimeCursor {
    last_fired: DateTime<Utc>,
}

pub struct TimerAdapter {
    clock: Clock,
}

impl TimerAdapter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }
}

impl Default for TimerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceAdapter for TimerAdapter {
    fn service(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: SERVICE.to_string(),
            description: "This service is a time service".to_string(),
            oauth: false,
            color: "#BB00FF".to_string(),
            icon: "https://api.iconify.design/mdi:clock.svg?color=%23FFFFFF".to_string(),
        }
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![ActionDescriptor {
            name: SPECIFIC_TIME.to_string(),
            description: "Triggers every day at the given UTC hour and minute".to_string(),
            default_options: json!({"hour": 0, "minute": 0}),
            minimum_interval_secs: 10,
        }]
    }

    fn reactions(&self) -> Vec<ReactionDescriptor> {
        vec![ReactionDescriptor {
            name: GIVE_TIME.to_string(),
            description: "Reports the current time".to_string(),
            default_options: json!({}),
        }]
    }

    fn action_handler(&self, name: &str) -> Option<Arc<dyn ActionPoller>> {
        match name {
            SPECIFIC_TIME => Some(Arc::new(SpecificTime {
                clock: self.clock.clone(),
            })),
            _ => None,
        }
    }

    fn reaction_handler(&self, name: &str) -> Option<Arc<dyn ReactionInvoker>> {
        match name {
            GIVE_TIME => Some(Arc::new(GiveTime {
                clock: self.clock.clone(),
            })),
            _ => None,
        }
    }
}

struct SpecificTime {
    clock: Clock,
}

#[async_trait]
impl ActionPoller for SpecificTime {
    async fn poll(&self, request: PollRequest) -> Result<PollOutcome, AdapterError> {
        let options: SpecificTimeOptions = parse_options(&request.options)?;
        if options.hour > 23 || options.minute > 59 {
            return Err(AdapterError::InvalidOptions(format!(
                "{:02}:{:02} is not a time of day",
                options.hour, options.minute
            )));
        }

        let now = (self.clock)();
        if now.hour() != options.hour || now.minute() != options.minute {
            return Ok(PollOutcome::idle());
        }

        // Several polls land in the same minute; only the first one fires.
        if let Some(previous) = request.cursor.decode::<SpecificTimeCursor>() {
            if now - previous.last_fired < chrono::Duration::seconds(60) {
                return Ok(PollOutcome::idle());
            }
        }

        let cursor = Cursor::encode(&SpecificTimeCursor { last_fired: now })
            .map_err(|e| AdapterError::Rejected(e.to_string()))?;
        Ok(PollOutcome::Event {
            payload: json!({
                "time": now.format("%H:%M").to_string(),
                "fired_at": now.to_rfc3339(),
            }),
            cursor,
        })
    }
}

struct GiveTime {
    clock: Clock,
}

#[async_trait]
impl ReactionInvoker for GiveTime {
    async fn invoke(&self, _request: ReactionRequest) -> Result<String, AdapterError> {
        Ok(format!("current time is {}", (self.clock)().format("%H:%M:%S")))
    }
}
