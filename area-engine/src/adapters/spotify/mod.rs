pub mod api;

use crate::adapter::{
    parse_options, require_credentials, ActionPoller, AdapterError, Identity, OAuthConfig,
    PollOutcome, PollRequest, ReactionInvoker, ReactionRequest, ServiceAdapter,
};
use crate::oauth::exchange::{self, ClientAuth};
use area::config::OAuthClient;
use area::credentials::Credentials;
use area::store::{ActionDescriptor, ReactionDescriptor, ServiceDescriptor};
use area::Cursor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use self::api::{SpotifyClient, BASE_URL};

pub const SERVICE: &str = "spotify";
pub const MUSIC_PLAYED: &str = "music_played";
pub const SKIP_NEXT_MUSIC: &str = "skip_next_music";
pub const SKIP_PREVIOUS_MUSIC: &str = "skip_previous_music";

const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SCOPES: &[&str] = &[
    "user-read-email",
    "user-read-private",
    "user-read-playback-state",
    "user-modify-playback-state",
];

#[derive(Debug, Deserialize)]
struct MusicPlayedOptions {
    name: String,
}

/// Track already reported while it keeps playing.
#[derive(Debug, Default, Serialize, Deserialize)]
struct NowPlaying {
    last_track_id: Option<String>,
}

pub struct SpotifyAdapter {
    base_url: String,
    token_url: String,
}

impl SpotifyAdapter {
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn with_urls(base_url: String, token_url: String) -> Self {
        Self {
            base_url,
            token_url,
        }
    }

    fn client(&self, credentials: &Credentials) -> Result<SpotifyClient, AdapterError> {
        SpotifyClient::with_base_url(credentials.access_token.clone(), self.base_url.clone())
    }
}

impl Default for SpotifyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceAdapter for SpotifyAdapter {
    fn service(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: SERVICE.to_string(),
            description: "This service is a music service".to_string(),
            oauth: true,
            color: "#1DC000".to_string(),
            icon: "https://api.iconify.design/mdi:spotify.svg?color=%23FFFFFF".to_string(),
        }
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![ActionDescriptor {
            name: MUSIC_PLAYED.to_string(),
            description: "Triggers when the named track starts playing".to_string(),
            default_options: json!({"name": ""}),
            minimum_interval_secs: 10,
        }]
    }

    fn reactions(&self) -> Vec<ReactionDescriptor> {
        vec![
            ReactionDescriptor {
                name: SKIP_NEXT_MUSIC.to_string(),
                description: "Skips to the next track".to_string(),
                default_options: json!({}),
            },
            ReactionDescriptor {
                name: SKIP_PREVIOUS_MUSIC.to_string(),
                description: "Skips to the previous track".to_string(),
                default_options: json!({}),
            },
        ]
    }

    fn action_handler(&self, name: &str) -> Option<Arc<dyn ActionPoller>> {
        match name {
            MUSIC_PLAYED => Some(Arc::new(MusicPlayed {
                base_url: self.base_url.clone(),
            })),
            _ => None,
        }
    }

    fn reaction_handler(&self, name: &str) -> Option<Arc<dyn ReactionInvoker>> {
        let direction = match name {
            SKIP_NEXT_MUSIC => Skip::Next,
            SKIP_PREVIOUS_MUSIC => Skip::Previous,
            _ => return None,
        };
        Some(Arc::new(SkipMusic {
            base_url: self.base_url.clone(),
            direction,
        }))
    }

    fn oauth_config(&self) -> Option<OAuthConfig> {
        Some(OAuthConfig {
            auth_url: AUTH_URL.to_string(),
            token_url: self.token_url.clone(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    // Spotify's token endpoint wants the client in an Authorization header.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        client: &OAuthClient,
    ) -> Result<Credentials, AdapterError> {
        exchange::exchange_code_for_token(
            &self.token_url,
            code,
            redirect_uri,
            client,
            ClientAuth::Basic,
        )
        .await
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
        client: &OAuthClient,
    ) -> Result<Credentials, AdapterError> {
        exchange::refresh_access_token(&self.token_url, refresh_token, client, ClientAuth::Basic)
            .await
    }

    async fn fetch_identity(&self, credentials: &Credentials) -> Result<Identity, AdapterError> {
        let me = self.client(credentials)?.me().await?;
        let email = me
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AdapterError::Rejected("account exposes no email".to_string()))?;
        Ok(Identity {
            email,
            display_name: me.display_name.filter(|n| !n.is_empty()).unwrap_or(me.id),
        })
    }
}

struct MusicPlayed {
    base_url: String,
}

#[async_trait]
impl ActionPoller for MusicPlayed {
    async fn poll(&self, request: PollRequest) -> Result<PollOutcome, AdapterError> {
        let options: MusicPlayedOptions = parse_options(&request.options)?;
        let credentials = require_credentials(&request.credentials)?;
        let client =
            SpotifyClient::with_base_url(credentials.access_token.clone(), self.base_url.clone())?;

        let previous = request.cursor.decode::<NowPlaying>().unwrap_or_default();
        let track = client
            .current_playback()
            .await?
            .filter(|p| p.is_playing)
            .and_then(|p| p.item)
            .filter(|t| t.name.eq_ignore_ascii_case(options.name.trim()));

        let Some(track) = track else {
            // The track stopped or changed: arm again for its next play.
            if previous.last_track_id.is_some() {
                let cursor = Cursor::encode(&NowPlaying::default())
                    .map_err(|e| AdapterError::Rejected(e.to_string()))?;
                return Ok(PollOutcome::NoEvent {
                    cursor: Some(cursor),
                });
            }
            return Ok(PollOutcome::idle());
        };

        let track_id = track.id.clone().unwrap_or_else(|| track.name.clone());
        if previous.last_track_id.as_deref() == Some(track_id.as_str()) {
            return Ok(PollOutcome::idle());
        }

        let cursor = Cursor::encode(&NowPlaying {
            last_track_id: Some(track_id.clone()),
        })
        .map_err(|e| AdapterError::Rejected(e.to_string()))?;
        let artists = track.artist_names();
        Ok(PollOutcome::Event {
            payload: json!({
                "track_id": track_id,
                "message": format!("Currently playing: {} by {}", track.name, artists),
                "name": track.name,
                "artists": artists,
            }),
            cursor,
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum Skip {
    Next,
    Previous,
}

struct SkipMusic {
    base_url: String,
    direction: Skip,
}

#[async_trait]
impl ReactionInvoker for SkipMusic {
    async fn invoke(&self, request: ReactionRequest) -> Result<String, AdapterError> {
        let credentials = require_credentials(&request.credentials)?;
        let client =
            SpotifyClient::with_base_url(credentials.access_token.clone(), self.base_url.clone())?;
        match self.direction {
            Skip::Next => {
                client.skip_next().await?;
                Ok("skipped to the next music".to_string())
            }
            Skip::Previous => {
                client.skip_previous().await?;
                Ok("skipped to the previous music".to_string())
            }
        }
    }
}
