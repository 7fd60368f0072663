//! Outbound calls to peer services: user-service for tokens and profiles,
//! recommendation-service for venue occupancy.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{error, instrument};

use crate::config::Config;
use crate::models::{Envelope, OnlineTicket, Profile, TokenValidation};
use crate::utils::{AppError, AppResult};

pub mod breaker;

pub use breaker::{BreakerError, CircuitBreaker, TripPolicy};

const INVALID_TOKEN: &str = "Invalid token";

#[async_trait]
pub trait Collaborators: Send + Sync {
    /// Resolves a bearer token. An invalid token is `BadRequest("Invalid token")`.
    async fn validate_token(&self, token: &str) -> AppResult<TokenValidation>;

    async fn get_profile(&self, user_id: i64) -> AppResult<Profile>;

    async fn get_online_ticket(&self, region_name: &str) -> AppResult<OnlineTicket>;
}

/// HTTP adapter. No retries here; the breaker fails fast once tripped.
#[derive(Clone)]
pub struct HttpCollaborators {
    client: Client,
    breaker: CircuitBreaker,
    user_service_url: String,
    recommendation_service_url: String,
}

impl HttpCollaborators {
    pub fn new(
        client: Client,
        breaker: CircuitBreaker,
        user_service_url: impl Into<String>,
        recommendation_service_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            breaker,
            user_service_url: user_service_url.into(),
            recommendation_service_url: recommendation_service_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.http_client.timeout)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::new(
            client,
            CircuitBreaker::from_config(&config.http_client),
            config.user_service.base_url(),
            config.recommendation_service.base_url(),
        ))
    }

    /// GETs `url` and unwraps the `data` member of the `{meta, data}` body.
    ///
    /// Transport failures and an open circuit are `Unavailable`; any status
    /// other than 200 or an unreadable envelope is `BadRequest(failure)`.
    async fn get_envelope<T>(&self, url: &str, query: &[(&str, String)], failure: &str) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .breaker
            .call(
                || self.client.get(url).query(query).send(),
                |response: &reqwest::Response| response.status().is_server_error(),
            )
            .await
            .map_err(|e| match e {
                BreakerError::Open => AppError::Unavailable("circuit breaker is open".to_string()),
                BreakerError::Inner(e) => {
                    error!(url, error = %e, "Outbound request failed");
                    AppError::Unavailable(format!("{failure}: {e}"))
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            error!(url, status = status.as_u16(), "{failure}");
            return Err(AppError::bad_request(failure));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            error!(url, error = %e, "Invalid response envelope");
            AppError::bad_request(failure)
        })?;

        envelope.data.ok_or_else(|| {
            error!(url, meta = ?envelope.meta, "Response envelope carries no data");
            AppError::bad_request(failure)
        })
    }
}

#[async_trait]
impl Collaborators for HttpCollaborators {
    #[instrument(skip(self, token))]
    async fn validate_token(&self, token: &str) -> AppResult<TokenValidation> {
        let url = format!("{}/api/private/user/validate", self.user_service_url);
        let validation: TokenValidation = self
            .get_envelope(&url, &[("token", token.to_string())], INVALID_TOKEN)
            .await
            .map_err(|e| match e {
                AppError::Unavailable(_) => e,
                _ => AppError::bad_request(INVALID_TOKEN),
            })?;

        if !validation.is_valid {
            error!("Token rejected by user service");
            return Err(AppError::bad_request(INVALID_TOKEN));
        }
        Ok(validation)
    }

    #[instrument(skip(self))]
    async fn get_profile(&self, user_id: i64) -> AppResult<Profile> {
        let url = format!("{}/api/private/user/profile", self.user_service_url);
        self.get_envelope(&url, &[("user_id", user_id.to_string())], "Failed to get profile")
            .await
    }

    #[instrument(skip(self))]
    async fn get_online_ticket(&self, region_name: &str) -> AppResult<OnlineTicket> {
        let url = format!("{}/api/private/online-ticket", self.recommendation_service_url);
        self.get_envelope(
            &url,
            &[("region_name", region_name.to_string())],
            "Failed to get ticket online",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn collaborators(server: &MockServer, policy: TripPolicy) -> HttpCollaborators {
        HttpCollaborators::new(
            Client::new(),
            CircuitBreaker::new(policy, Duration::from_secs(60)),
            server.uri(),
            server.uri(),
        )
    }

    #[tokio::test]
    async fn test_validate_token_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/private/user/validate"))
            .and(query_param("token", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200, "message": "ok"},
                "data": {"is_valid": true, "user_id": 7, "email_user": "a@b.c"}
            })))
            .mount(&server)
            .await;

        let result = collaborators(&server, TripPolicy::Threshold(10))
            .validate_token("abc")
            .await
            .unwrap();
        assert_eq!(result.user_id, 7);
        assert_eq!(result.email, "a@b.c");
    }

    #[tokio::test]
    async fn test_validate_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/private/user/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200},
                "data": {"is_valid": false, "user_id": 0}
            })))
            .mount(&server)
            .await;

        let err = collaborators(&server, TripPolicy::Threshold(10))
            .validate_token("nope")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Invalid token"));
    }

    #[tokio::test]
    async fn test_validate_token_non_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = collaborators(&server, TripPolicy::Threshold(10))
            .validate_token("abc")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Invalid token"));
    }

    #[tokio::test]
    async fn test_get_profile_decodes_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/private/user/profile"))
            .and(query_param("user_id", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200},
                "data": {"id": 1, "user_id": 7, "first_name": "Ana", "region": "Asia"}
            })))
            .mount(&server)
            .await;

        let profile = collaborators(&server, TripPolicy::Threshold(10))
            .get_profile(7)
            .await
            .unwrap();
        assert_eq!(profile.user_id, 7);
        assert_eq!(profile.region, "Asia");
        assert_eq!(profile.last_name, "");
    }

    #[tokio::test]
    async fn test_get_online_ticket_encodes_region() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/private/online-ticket"))
            .and(query_param("region_name", "south east"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200},
                "data": {"is_sold_out": true, "is_first_sold_out": false}
            })))
            .mount(&server)
            .await;

        let venue = collaborators(&server, TripPolicy::Threshold(10))
            .get_online_ticket("south east")
            .await
            .unwrap();
        assert!(venue.is_sold_out);
        assert!(!venue.is_first_sold_out);
    }

    #[tokio::test]
    async fn test_missing_data_is_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"meta": {}})))
            .mount(&server)
            .await;

        let err = collaborators(&server, TripPolicy::Threshold(10))
            .get_online_ticket("online")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_server_errors_open_the_circuit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let client = collaborators(&server, TripPolicy::Consecutive(2));
        for _ in 0..2 {
            let err = client.get_profile(1).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }

        let err = client.get_profile(1).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_unavailable() {
        let client = HttpCollaborators::new(
            Client::new(),
            CircuitBreaker::new(TripPolicy::Threshold(10), Duration::from_secs(60)),
            "http://127.0.0.1:1",
            "http://127.0.0.1:1",
        );
        let err = client.get_online_ticket("online").await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
