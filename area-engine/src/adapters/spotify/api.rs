use crate::adapter::AdapterError;
use crate::adapters::http::{self, check_status};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

pub const BASE_URL: &str = "https://api.spotify.com";

#[derive(Debug, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `GET /v1/me/player`
#[derive(Debug, Deserialize)]
pub struct Playback {
    pub is_playing: bool,
    pub item: Option<Track>,
}

#[derive(Debug, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// HTTP client for the Spotify Web API.
pub struct SpotifyClient {
    access_token: String,
    http_client: Client,
    base_url: String,
}

impl SpotifyClient {
    pub fn with_base_url(access_token: String, base_url: String) -> Result<Self, AdapterError> {
        Ok(Self {
            access_token,
            http_client: http::client()?,
            base_url,
        })
    }

    /// Current playback, `None` when no device is active (204).
    pub async fn current_playback(&self) -> Result<Option<Playback>, AdapterError> {
        let response = self
            .http_client
            .get(format!("{}/v1/me/player", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = check_status(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(response.json::<Playback>().await?))
    }

    pub async fn skip_next(&self) -> Result<(), AdapterError> {
        self.player_command("next").await
    }

    pub async fn skip_previous(&self) -> Result<(), AdapterError> {
        self.player_command("previous").await
    }

    async fn player_command(&self, command: &str) -> Result<(), AdapterError> {
        let response = self
            .http_client
            .post(format!("{}/v1/me/player/{}", self.base_url, command))
            .bearer_auth(&self.access_token)
            .body("")
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<SpotifyUser, AdapterError> {
        let response = self
            .http_client
            .get(format!("{}/v1/me", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check_status(response).await?.json::<SpotifyUser>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_current_playback() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/me/player")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "is_playing": true,
                    "item": {"id": "t1", "name": "Song", "artists": [{"name": "A"}, {"name": "B"}]}
                }"#,
            )
            .create_async()
            .await;

        let client = SpotifyClient::with_base_url("test_token".to_string(), server.url()).unwrap();
        let playback = client.current_playback().await.unwrap().unwrap();
        assert!(playback.is_playing);
        let track = playback.item.unwrap();
        assert_eq!(track.id.as_deref(), Some("t1"));
        assert_eq!(track.artist_names(), "A, B");
    }

    #[tokio::test]
    async fn test_no_active_device() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/me/player")
            .with_status(204)
            .create_async()
            .await;

        let client = SpotifyClient::with_base_url("test_token".to_string(), server.url()).unwrap();
        assert!(client.current_playback().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skip_next() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/me/player/next")
            .with_status(204)
            .create_async()
            .await;

        let client = SpotifyClient::with_base_url("test_token".to_string(), server.url()).unwrap();
        client.skip_next().await.unwrap();
        mock.assert_async().await;
    }
}
