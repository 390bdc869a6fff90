use crate::PickerError;
use crate::config::Listener as ListenerConfig;
use crate::orchestrator::{Picker, ResolveError, Resolution};
use crate::types::AgencyKey;
use axum::{
    Json, Router,
    extract::{RawQuery, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use shared::http::set_no_store;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;

pub const CONTACT_PATH: &str = "/api/get-random-phone";
const DEFAULT_MODE: &str = "normal";

impl IntoResponse for Resolution {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[derive(Clone)]
struct ApiState {
    picker: Picker,
    default_agency: AgencyKey,
}

#[derive(Debug, Default, PartialEq)]
struct Params {
    agency: Option<String>,
    mode: Option<String>,
}

impl Params {
    /// Never rejects a query string. The first value of a repeated key wins
    /// and unknown keys are ignored.
    fn from_query(query: Option<&str>) -> Self {
        let mut params = Params::default();
        let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes());

        for (key, value) in pairs {
            let slot = match &*key {
                "agency" => &mut params.agency,
                "mode" => &mut params.mode,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        params
    }
}

pub fn router(picker: Picker, default_agency: AgencyKey) -> Router {
    Router::new()
        .route(CONTACT_PATH, get(handler))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::map_response(no_store))
        .with_state(ApiState {
            picker,
            default_agency,
        })
}

/// Serves the contact endpoint until Ctrl-C. `ready` flips once the socket is bound.
pub async fn serve(
    listener: &ListenerConfig,
    picker: Picker,
    default_agency: AgencyKey,
    ready: Arc<AtomicBool>,
) -> Result<(), PickerError> {
    let app = router(picker, default_agency);

    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "serving contacts");
    ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ready.store(false, Ordering::Relaxed);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn no_store(mut response: Response) -> Response {
    set_no_store(response.headers_mut());
    response
}

async fn handler(State(state): State<ApiState>, RawQuery(query): RawQuery) -> Resolution {
    let params = Params::from_query(query.as_deref());
    let mode = params
        .mode
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_MODE.to_string());

    // An unreadable agency degrades like any other failure instead of
    // rejecting the request.
    match parse_agency(params.agency.as_deref(), state.default_agency) {
        Ok(agency) => state.picker.handle(agency, mode).await,
        Err(err) => state.picker.handle_unresolved(err, mode),
    }
}

fn parse_agency(raw: Option<&str>, default: AgencyKey) -> Result<AgencyKey, ResolveError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ResolveError::InvalidAgency(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::last_good::InMemoryLastGood;
    use axum::body::Body;
    use axum::http::Request;
    use axum::http::header::{CACHE_CONTROL, PRAGMA};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app(server: &MockServer, fallback_enabled: bool) -> Router {
        let config: Config = serde_json::from_value(json!({
            "upstream": {"base_url": server.uri(), "timeout_ms": 200},
            "support_fallback": {"enabled": fallback_enabled},
        }))
        .unwrap();
        let picker = Picker::new(&config, Arc::new(InMemoryLastGood::new())).unwrap();
        router(picker, config.default_agency)
    }

    async fn send_get(app: Router, uri: &str) -> (StatusCode, Response<Body>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn assert_no_store(response: &Response<Body>) {
        assert_eq!(
            response.headers().get(CACHE_CONTROL).unwrap(),
            "no-store, max-age=0"
        );
        assert_eq!(response.headers().get(PRAGMA).unwrap(), "no-cache");
    }

    #[test]
    fn test_parse_agency() {
        assert_eq!(parse_agency(None, 17).unwrap(), 17);
        assert_eq!(parse_agency(Some(""), 17).unwrap(), 17);
        assert_eq!(parse_agency(Some(" 42 "), 17).unwrap(), 42);
        assert_eq!(parse_agency(Some("-3"), 17).unwrap(), -3);
        assert!(matches!(
            parse_agency(Some("abc"), 17),
            Err(ResolveError::InvalidAgency(v)) if v == "abc"
        ));
        assert!(parse_agency(Some("1.5"), 17).is_err());
    }

    #[test]
    fn test_params_from_query() {
        assert_eq!(Params::from_query(None), Params::default());
        assert_eq!(
            Params::from_query(Some("agency=17&agency=18&mode=VIP%20Mode&x=1")),
            Params {
                agency: Some("17".into()),
                mode: Some("VIP Mode".into()),
            }
        );
        assert_eq!(
            Params::from_query(Some("agency&mode=")),
            Params {
                agency: Some("".into()),
                mode: Some("".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_default_agency_and_mode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agency/17/random-contact"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"whatsapp": ["1123456789"]})),
            )
            .expect(2)
            .mount(&server)
            .await;

        for uri in [CONTACT_PATH, "/api/get-random-phone?agency=&mode="] {
            let (status, response) = send_get(app(&server, true), uri).await;

            assert_eq!(status, StatusCode::OK);
            assert_no_store(&response);
            let body = json_body(response).await;
            assert_eq!(body["number"], "541123456789");
            assert_eq!(body["chosen_from"], "whatsapp");
            assert_eq!(body["agency_id"], 17);
            assert_eq!(body["mode"], "normal");
        }
    }

    #[tokio::test]
    async fn test_explicit_agency_and_mode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agency/42/random-contact"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"whatsapp": ["5491112345678"]})),
            )
            .mount(&server)
            .await;

        let (status, response) = send_get(
            app(&server, true),
            "/api/get-random-phone?agency=42&mode=Express",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["number"], "5491112345678");
        assert_eq!(body["agency_id"], 42);
        assert_eq!(body["mode"], "Express");
    }

    #[tokio::test]
    async fn test_fallback_is_200() {
        let server = MockServer::start().await;

        let (status, response) = send_get(app(&server, true), CONTACT_PATH).await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["number"], "5491169789243");
        assert_eq!(body["fallback"], true);
        assert_eq!(body["name"], "SupportFallback");
    }

    #[tokio::test]
    async fn test_unavailable_is_503() {
        let server = MockServer::start().await;

        let (status, response) = send_get(app(&server, false), CONTACT_PATH).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_no_store(&response);
        let body = json_body(response).await;
        assert_eq!(body["error"], "NO_NUMBER_AVAILABLE");
        assert_eq!(body["agency_id"], 17);
        assert!(body["details"].as_str().unwrap().contains("404"));
        assert!(body["ms"].is_u64());
    }

    #[tokio::test]
    async fn test_invalid_agency_degrades() {
        let server = MockServer::start().await;

        for raw in ["abc", "1.5"] {
            let uri = format!("/api/get-random-phone?agency={raw}&mode=normal");
            let (status, response) = send_get(app(&server, true), &uri).await;

            assert_eq!(status, StatusCode::OK);
            assert_no_store(&response);
            let body = json_body(response).await;
            assert_eq!(body["number"], "5491169789243");
            assert_eq!(body["fallback"], true);
            assert_eq!(body["agency_id"], Value::Null);
            assert_eq!(body["mode"], "normal");
            assert_eq!(
                body["error"],
                format!("agency must be an integer, got \"{raw}\"")
            );
        }

        let (status, response) =
            send_get(app(&server, false), "/api/get-random-phone?agency=abc").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"], "NO_NUMBER_AVAILABLE");
        assert_eq!(body["details"], "agency must be an integer, got \"abc\"");

        // Nothing was fetched for an unreadable agency
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_agency_uses_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/agency/17/random-contact"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"whatsapp": ["1123456789"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (status, response) = send_get(
            app(&server, true),
            "/api/get-random-phone?agency=17&agency=18",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["agency_id"], 17);
        assert_eq!(body["number"], "541123456789");
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let server = MockServer::start().await;

        let (status, response) = send_get(app(&server, true), "/api/other").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_no_store(&response);
    }
}
