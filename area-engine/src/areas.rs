//! Area CRUD on behalf of a signed-in user.
//!
//! Every operation is owner-checked: another user's Area is reported as
//! not found. Writes keep the dispatch engine in step (create starts a
//! worker, disable/delete stops it).

use crate::dispatch::DispatchEngine;
use crate::registry::ServiceRegistry;
use area::credentials::CredentialStore;
use area::store::{
    Action, Area, AreaResult, AreaResultStore, AreaStore, CatalogStore, NewArea, Reaction,
    Service,
};
use area::AreaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Partial update; absent fields keep their value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AreaPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub action_options: Option<Value>,
    pub action_interval_secs: Option<u64>,
    pub reaction_options: Option<Value>,
}

/// A service with the capabilities users can bind.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceCatalog {
    #[serde(flatten)]
    pub service: Service,
    pub actions: Vec<Action>,
    pub reactions: Vec<Reaction>,
}

pub struct AreaService {
    areas: Arc<AreaStore>,
    results: Arc<AreaResultStore>,
    catalog: Arc<CatalogStore>,
    credentials: Arc<CredentialStore>,
    registry: Arc<ServiceRegistry>,
    engine: Arc<DispatchEngine>,
}

impl AreaService {
    pub fn new(
        areas: Arc<AreaStore>,
        results: Arc<AreaResultStore>,
        catalog: Arc<CatalogStore>,
        credentials: Arc<CredentialStore>,
        registry: Arc<ServiceRegistry>,
        engine: Arc<DispatchEngine>,
    ) -> Self {
        Self {
            areas,
            results,
            catalog,
            credentials,
            registry,
            engine,
        }
    }

    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// Every seeded service with its Actions and Reactions.
    pub fn services(&self) -> Result<Vec<ServiceCatalog>, AreaError> {
        let mut out = Vec::new();
        for service in self.catalog.list_services()? {
            out.push(ServiceCatalog {
                actions: self.catalog.actions_for_service(service.id)?,
                reactions: self.catalog.reactions_for_service(service.id)?,
                service,
            });
        }
        Ok(out)
    }

    pub fn create(&self, user_id: i64, new: &NewArea) -> Result<Area, AreaError> {
        validate_title(&new.title)?;
        validate_interval(new.action_interval_secs)?;
        validate_options("action", &new.action_options)?;
        validate_options("reaction", &new.reaction_options)?;

        let action = self
            .catalog
            .action_by_id(new.action_id)?
            .ok_or_else(|| AreaError::NotFound(format!("action {}", new.action_id)))?;
        let reaction = self
            .catalog
            .reaction_by_id(new.reaction_id)?
            .ok_or_else(|| AreaError::NotFound(format!("reaction {}", new.reaction_id)))?;
        self.registry.resolve_action(&action.name)?;
        self.registry.resolve_reaction(&reaction.name)?;

        self.require_connected(user_id, action.service_id)?;
        if reaction.service_id != action.service_id {
            self.require_connected(user_id, reaction.service_id)?;
        }

        let area = self.areas.insert(user_id, new)?;
        info!(
            area_id = area.id,
            user_id,
            action = %action.name,
            reaction = %reaction.name,
            "Area created"
        );
        self.engine.start_area(area.id);
        Ok(area)
    }

    pub fn update(&self, user_id: i64, area_id: i64, patch: AreaPatch) -> Result<Area, AreaError> {
        let current = self.get(user_id, area_id)?;
        let mut settings = current.settings();

        if let Some(title) = patch.title {
            validate_title(&title)?;
            settings.title = title;
        }
        if let Some(description) = patch.description {
            settings.description = description;
        }
        if let Some(options) = patch.action_options {
            validate_options("action", &options)?;
            settings.action_options = options;
        }
        if let Some(options) = patch.reaction_options {
            validate_options("reaction", &options)?;
            settings.reaction_options = options;
        }
        if let Some(interval) = patch.action_interval_secs {
            validate_interval(interval)?;
            settings.action_interval_secs = interval;
        }
        if let Some(enabled) = patch.enabled {
            settings.enabled = enabled;
        }

        if !self.areas.update_settings(area_id, &settings)? {
            return Err(AreaError::NotFound(format!("area {}", area_id)));
        }

        // Option edits reach a running worker on its next tick; a new
        // interval or a re-enable needs a fresh worker.
        if !settings.enabled {
            self.engine.stop_area(area_id);
        } else if !current.enabled
            || settings.action_interval_secs != current.action_interval_secs
            || !self.engine.is_running(area_id)
        {
            self.engine.start_area(area_id);
        }

        info!(area_id, user_id, enabled = settings.enabled, "Area updated");
        self.get(user_id, area_id)
    }

    pub fn delete(&self, user_id: i64, area_id: i64) -> Result<(), AreaError> {
        self.get(user_id, area_id)?;

        self.engine.stop_area(area_id);
        // Row before results: a worker that saves after this sees the Area gone
        self.areas.delete(area_id)?;
        let removed_results = self.results.delete_by_area(area_id)?;

        info!(area_id, user_id, removed_results, "Area deleted");
        Ok(())
    }

    pub fn list(&self, user_id: i64) -> Result<Vec<Area>, AreaError> {
        Ok(self.areas.find_by_user(user_id)?)
    }

    pub fn get(&self, user_id: i64, area_id: i64) -> Result<Area, AreaError> {
        self.areas
            .find_by_id(area_id)?
            .filter(|area| area.user_id == user_id)
            .ok_or_else(|| AreaError::NotFound(format!("area {}", area_id)))
    }

    pub fn results(&self, user_id: i64, area_id: i64) -> Result<Vec<AreaResult>, AreaError> {
        self.get(user_id, area_id)?;
        Ok(self.results.find_by_area(area_id)?)
    }

    fn require_connected(&self, user_id: i64, service_id: i64) -> Result<(), AreaError> {
        let service = self
            .catalog
            .service_by_id(service_id)?
            .ok_or_else(|| AreaError::NotFound(format!("service {}", service_id)))?;
        if !self.registry.requires_oauth(&service.name)? {
            return Ok(());
        }
        if self
            .credentials
            .find_by_user_and_service(user_id, &service.name)?
            .is_none()
        {
            return Err(AreaError::Validation(format!(
                "service {} is not connected",
                service.name
            )));
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<(), AreaError> {
    if title.trim().is_empty() {
        return Err(AreaError::Validation("title must not be empty".to_string()));
    }
    Ok(())
}

/// Intervals are stored as SQLite INTEGER (i64).
fn validate_interval(secs: u64) -> Result<(), AreaError> {
    if i64::try_from(secs).is_err() {
        return Err(AreaError::Validation(format!(
            "action interval {} is out of range",
            secs
        )));
    }
    Ok(())
}

fn validate_options(which: &str, options: &Value) -> Result<(), AreaError> {
    if !options.is_object() {
        return Err(AreaError::Validation(format!(
            "{} options must be a JSON object",
            which
        )));
    }
    Ok(())
}
