//! `reqwest`-backed implementation of `SatelliteService`.
//!
//! # Responsibility
//! - Issue one HTTP request per logical operation with bearer auth.
//! - Emit `remote_call` log events with duration and status.
//!
//! # Invariants
//! - Access tokens are attached per request and never logged.
//! - Non-success responses are mapped through `wire::status_error`.

use super::wire::{self, SelectionRequest, CATALOG_PATH, POSITIONS_PATH, SELECTIONS_PATH};
use super::{RemoteError, RemoteResult, SatelliteService};
use crate::config::TrackerConfig;
use crate::model::position::PositionHistory;
use crate::model::satellite::{Satellite, SatelliteId, Selection, SelectionId};
use crate::session::UserSession;
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Instant;

/// HTTP client for the tracking REST API.
pub struct HttpSatelliteService<U: UserSession> {
    client: Client,
    base_url: String,
    session: U,
}

impl<U: UserSession> HttpSatelliteService<U> {
    /// Builds a client with the configured request timeout.
    pub fn new(config: &TrackerConfig, session: U) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("sattrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RemoteError::Transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            session,
        })
    }

    pub fn session(&self) -> &U {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        wire::endpoint(&self.base_url, path)
    }

    async fn execute(&self, op: &'static str, request: RequestBuilder) -> RemoteResult<Response> {
        let started_at = Instant::now();
        let request = match self.session.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    "event=remote_call module=remote status=error op={} duration_ms={} error_code=transport error={}",
                    op,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(
                "event=remote_call module=remote status=ok op={} http_status={} duration_ms={}",
                op,
                status.as_u16(),
                started_at.elapsed().as_millis()
            );
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = wire::status_error(status.as_u16(), &body);
        warn!(
            "event=remote_call module=remote status=error op={} http_status={} duration_ms={} error_code=http_status",
            op,
            status.as_u16(),
            started_at.elapsed().as_millis()
        );
        Err(err)
    }

    async fn get_json<T: DeserializeOwned>(&self, op: &'static str, path: &str) -> RemoteResult<T> {
        let response = self.execute(op, self.client.get(self.url(path))).await?;
        decode(op, response).await
    }
}

async fn decode<T: DeserializeOwned>(op: &'static str, response: Response) -> RemoteResult<T> {
    response.json::<T>().await.map_err(|err| {
        error!(
            "event=remote_decode module=remote status=error op={} error_code=decode_failed error={}",
            op, err
        );
        RemoteError::Decode(err.to_string())
    })
}

#[async_trait]
impl<U: UserSession> SatelliteService for HttpSatelliteService<U> {
    async fn list_catalog(&self) -> RemoteResult<Vec<Satellite>> {
        self.get_json("list_catalog", CATALOG_PATH).await
    }

    async fn list_selections(&self) -> RemoteResult<Vec<Selection>> {
        self.get_json("list_selections", SELECTIONS_PATH).await
    }

    async fn create_selection(&self, satellite_id: SatelliteId) -> RemoteResult<Selection> {
        let request = self
            .client
            .post(self.url(SELECTIONS_PATH))
            .json(&SelectionRequest {
                satellite: satellite_id,
            });
        let response = self.execute("create_selection", request).await?;
        decode("create_selection", response).await
    }

    async fn delete_selection(&self, selection_id: SelectionId) -> RemoteResult<()> {
        let request = self
            .client
            .delete(self.url(&wire::selection_path(selection_id)));
        self.execute("delete_selection", request).await?;
        Ok(())
    }

    async fn fetch_positions(&self) -> RemoteResult<PositionHistory> {
        self.get_json("fetch_positions", POSITIONS_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::HttpSatelliteService;
    use crate::config::TrackerConfig;
    use crate::remote::{RemoteError, SatelliteService};
    use crate::session::StaticSession;
    use std::time::Duration;

    #[tokio::test]
    async fn unreachable_service_maps_to_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe port");
        let port = listener.local_addr().expect("probe addr").port();
        drop(listener);

        let config = TrackerConfig {
            api_base_url: format!("http://127.0.0.1:{port}/api"),
            request_timeout: Duration::from_secs(2),
            ..TrackerConfig::default()
        };
        let service = HttpSatelliteService::new(&config, StaticSession::anonymous())
            .expect("client should build");

        let err = service
            .list_catalog()
            .await
            .expect_err("closed port must fail");
        assert!(matches!(err, RemoteError::Transport(_)), "{err:?}");
    }

    #[test]
    fn urls_are_built_from_normalized_base() {
        let config = TrackerConfig::default();
        let service = HttpSatelliteService::new(&config, StaticSession::anonymous())
            .expect("client should build");
        assert_eq!(
            service.url("selections/4/"),
            "http://localhost:8000/api/selections/4/"
        );
    }
}
