//! Request surface.
//!
//! Each operation takes the raw `Authorization` header value and JSON body,
//! and answers with a status code plus JSON body. The transport that carries
//! these (HTTP router, CLI, tests) stays outside this module.
//!
//! | Operation        | Auth   | Success                                   |
//! |------------------|--------|-------------------------------------------|
//! | register_consent | none   | 201 `{status: "consent_recorded", token}` |
//! | start_incident   | bearer | 201 `{status: "incident_started"}`        |
//! | update_location  | bearer | 201 `{status: "location_saved"}`          |
//! | stop_incident    | bearer | 200 `{status: "stopped", report}`         |
//! | get_report       | bearer | 200 `{incident_id, report}`               |
//!
//! Failures are 400 `{error: "bad_payload", reason, field}`,
//! 401 `{error: "unauthorized"}` or 500 `{error: "internal"}`.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::auth::{authenticate, IdentityVerifier, Subject, TokenIssuer};
use crate::engine::{AppendLocation, IncidentEngine, StartIncident};
use crate::error::{Error, Result};
use crate::incident::NewLocation;
use crate::storage::Storage;

/// Status code and JSON body produced by an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body.
    pub body: Value,
}

impl ApiResponse {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Map an error to its response, logging anything that is not the
    /// caller's fault.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::BadRequest { reason, field } => Self::new(
                400,
                json!({"error": "bad_payload", "reason": reason.as_str(), "field": field}),
            ),
            Error::Unauthorized => Self::new(401, json!({"error": "unauthorized"})),
            other => {
                error!("request failed: {}", other);
                Self::new(500, json!({"error": "internal"}))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConsentBody {
    user_id: Option<String>,
    consent_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartBody {
    incident_id: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    incident_id: Option<String>,
    user_id: Option<String>,
    lat: Option<Value>,
    lon: Option<Value>,
    accuracy: Option<Value>,
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StopBody {
    incident_id: Option<String>,
}

/// Authenticating front door over the engine and consent log.
pub struct Service {
    engine: Arc<IncidentEngine>,
    store: Arc<Storage>,
    verifier: Arc<dyn IdentityVerifier>,
    issuer: Arc<dyn TokenIssuer>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("engine", &self.engine)
            .field("store", &self.store.path())
            .finish_non_exhaustive()
    }
}

impl Service {
    /// Create a service.
    #[must_use]
    pub fn new(
        engine: Arc<IncidentEngine>,
        store: Arc<Storage>,
        verifier: Arc<dyn IdentityVerifier>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            engine,
            store,
            verifier,
            issuer,
        }
    }

    /// The engine behind this service.
    #[must_use]
    pub fn engine(&self) -> &Arc<IncidentEngine> {
        &self.engine
    }

    /// Record consent and issue a bearer token for the user.
    pub fn register_consent(&self, body: &[u8]) -> ApiResponse {
        respond(self.try_register_consent(body))
    }

    /// Start or restart an incident.
    pub fn start_incident(&self, authorization: Option<&str>, body: &[u8]) -> ApiResponse {
        respond(self.try_start_incident(authorization, body))
    }

    /// Append a location sample.
    pub async fn update_location(&self, authorization: Option<&str>, body: &[u8]) -> ApiResponse {
        respond(self.try_update_location(authorization, body).await)
    }

    /// Stop an incident and return its report.
    pub fn stop_incident(&self, authorization: Option<&str>, body: &[u8]) -> ApiResponse {
        respond(self.try_stop_incident(authorization, body))
    }

    /// Fetch an incident's report.
    pub fn get_report(&self, authorization: Option<&str>, incident_id: &str) -> ApiResponse {
        respond(self.try_get_report(authorization, incident_id))
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<Subject> {
        authenticate(self.verifier.as_ref(), authorization).inspect_err(|_| {
            warn!("rejected request with missing or invalid credentials");
        })
    }

    fn try_register_consent(&self, body: &[u8]) -> Result<ApiResponse> {
        let body: ConsentBody = parse(body)?;
        let user_id = required_str(body.user_id, "user_id")?;
        let consent_text = required_str(body.consent_text, "consent_text")?;

        self.store.record_consent(&user_id, &consent_text, Utc::now())?;
        let token = self.issuer.issue(&user_id)?;

        Ok(ApiResponse::new(
            201,
            json!({"status": "consent_recorded", "token": token}),
        ))
    }

    fn try_start_incident(&self, authorization: Option<&str>, body: &[u8]) -> Result<ApiResponse> {
        let caller = self.authenticate(authorization)?;
        let body: StartBody = parse(body)?;
        let cmd = StartIncident::new(
            required_str(body.incident_id, "incident_id")?,
            required_str(body.user_id, "user_id")?,
        )?;

        self.engine.start(&caller, &cmd)?;
        Ok(ApiResponse::new(201, json!({"status": "incident_started"})))
    }

    async fn try_update_location(
        &self,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<ApiResponse> {
        let caller = self.authenticate(authorization)?;
        let body: UpdateBody = parse(body)?;

        let incident_id = required_str(body.incident_id, "incident_id")?;
        let user_id = required_str(body.user_id, "user_id")?;
        let lat = required_number(body.lat.as_ref(), "lat")?;
        let lon = required_number(body.lon.as_ref(), "lon")?;
        let accuracy = optional_number(body.accuracy.as_ref(), "accuracy")?;
        let timestamp = required_text(body.timestamp, "timestamp")?;

        let location = NewLocation::new(lat, lon, accuracy, timestamp)?;
        let cmd = AppendLocation::new(incident_id, user_id, location)?;

        self.engine.append_location(&caller, &cmd).await?;
        Ok(ApiResponse::new(201, json!({"status": "location_saved"})))
    }

    fn try_stop_incident(&self, authorization: Option<&str>, body: &[u8]) -> Result<ApiResponse> {
        let caller = self.authenticate(authorization)?;
        let body: StopBody = parse(body)?;
        let incident_id = required_str(body.incident_id, "incident_id")?;

        let outcome = self.engine.stop(&caller, &incident_id)?;
        Ok(ApiResponse::new(
            200,
            json!({"status": "stopped", "report": outcome.report.entries}),
        ))
    }

    fn try_get_report(&self, authorization: Option<&str>, incident_id: &str) -> Result<ApiResponse> {
        let caller = self.authenticate(authorization)?;
        let report = self.engine.report(&caller, incident_id)?;
        Ok(ApiResponse::new(200, serde_json::to_value(&report)?))
    }
}

fn respond(result: Result<ApiResponse>) -> ApiResponse {
    result.unwrap_or_else(|e| ApiResponse::from_error(&e))
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|_| Error::malformed_body())
}

fn required_str(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::missing_field(field)),
    }
}

/// Like [`required_str`], for fields kept as raw JSON; non-strings are invalid.
fn required_text(value: Option<Value>, field: &str) -> Result<String> {
    match value {
        None | Some(Value::Null) => Err(Error::missing_field(field)),
        Some(Value::String(s)) => required_str(Some(s), field),
        Some(_) => Err(Error::invalid_field(field)),
    }
}

fn required_number(value: Option<&Value>, field: &str) -> Result<f64> {
    optional_number(value, field)?.ok_or_else(|| Error::missing_field(field))
}

/// `null` counts as absent; anything else must be a JSON number.
fn optional_number(value: Option<&Value>, field: &str) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::invalid_field(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtIdentity;
    use crate::notify::{Dispatcher, LogNotifier};

    fn service() -> Service {
        crate::logging::init_test_logging();
        let store = Arc::new(Storage::open_in_memory().unwrap());
        let (dispatcher, _worker) = Dispatcher::spawn(Arc::new(LogNotifier), 8);
        let engine = Arc::new(IncidentEngine::new(store.clone(), store.clone(), dispatcher));
        let identity = Arc::new(JwtIdentity::new("test-secret", chrono::Duration::hours(1)).unwrap());
        Service::new(engine, store, identity.clone(), identity)
    }

    fn bearer(service: &Service, user: &str) -> String {
        let resp = service.register_consent(
            json!({"user_id": user, "consent_text": "ok"})
                .to_string()
                .as_bytes(),
        );
        format!("Bearer {}", resp.body["token"].as_str().unwrap())
    }

    #[tokio::test]
    async fn test_register_consent_returns_token() {
        let service = service();
        let resp = service.register_consent(br#"{"user_id":"alice","consent_text":"yes"}"#);
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body["status"], "consent_recorded");
        assert!(resp.body["token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_register_consent_requires_text() {
        let service = service();
        let resp = service.register_consent(br#"{"user_id":"alice"}"#);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["reason"], "missing_field");
        assert_eq!(resp.body["field"], "consent_text");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let service = service();
        let auth = bearer(&service, "alice");
        let resp = service.start_incident(Some(&auth), b"not json");
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "bad_payload");
        assert_eq!(resp.body["reason"], "malformed_body");
    }

    #[tokio::test]
    async fn test_auth_checked_before_body() {
        let service = service();
        let resp = service.start_incident(None, b"not json");
        assert_eq!(resp.status, 401);
        assert_eq!(resp.body, json!({"error": "unauthorized"}));

        let resp = service.get_report(Some("Bearer forged"), "inc-1");
        assert_eq!(resp.status, 401);
    }

    #[tokio::test]
    async fn test_update_rejects_non_numeric_lat() {
        let service = service();
        let auth = bearer(&service, "alice");
        let resp = service
            .update_location(
                Some(&auth),
                br#"{"incident_id":"i","user_id":"alice","lat":"north","lon":1,"timestamp":"t"}"#,
            )
            .await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["reason"], "invalid_field");
        assert_eq!(resp.body["field"], "lat");
    }

    #[tokio::test]
    async fn test_update_rejects_numeric_timestamp() {
        let service = service();
        let auth = bearer(&service, "alice");
        let resp = service
            .update_location(
                Some(&auth),
                br#"{"incident_id":"i","user_id":"alice","lat":1,"lon":2,"timestamp":1700000000}"#,
            )
            .await;
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "bad_payload");
        assert_eq!(resp.body["reason"], "invalid_field");
        assert_eq!(resp.body["field"], "timestamp");

        let resp = service
            .update_location(
                Some(&auth),
                br#"{"incident_id":"i","user_id":"alice","lat":1,"lon":2,"timestamp":null}"#,
            )
            .await;
        assert_eq!(resp.body["reason"], "missing_field");
        assert_eq!(resp.body["field"], "timestamp");
        assert_eq!(service.get_report(Some(&auth), "i").body["report"], json!([]));
    }

    #[tokio::test]
    async fn test_update_null_accuracy_defaults_to_zero() {
        let service = service();
        let auth = bearer(&service, "alice");
        let resp = service
            .update_location(
                Some(&auth),
                br#"{"incident_id":"i","user_id":"alice","lat":1,"lon":2,"accuracy":null,"timestamp":"t"}"#,
            )
            .await;
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body["status"], "location_saved");

        let report = service.get_report(Some(&auth), "i");
        assert_eq!(report.body["report"][0]["accuracy"], 0.0);
    }

    #[tokio::test]
    async fn test_stop_response_shape() {
        let service = service();
        let auth = bearer(&service, "alice");
        let resp = service.stop_incident(Some(&auth), br#"{"incident_id":"none"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, json!({"status": "stopped", "report": []}));
    }

    #[tokio::test]
    async fn test_get_report_shape() {
        let service = service();
        let auth = bearer(&service, "alice");
        let resp = service.get_report(Some(&auth), "inc-9");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, json!({"incident_id": "inc-9", "report": []}));
    }

    #[test]
    fn test_storage_error_maps_to_internal() {
        let resp = ApiResponse::from_error(&Error::StoragePoisoned);
        assert_eq!(resp.status, 500);
        assert_eq!(resp.body, json!({"error": "internal"}));
        assert!(!resp.is_success());
    }
}
