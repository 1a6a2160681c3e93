use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, KeepAliveStream, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use relay_kernel::{Relay, RelayError};
use relay_normalize::extract::text_field;
use relay_protocol::{Event, Platform};
use serde_json::{Map, Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub fn router(relay: Relay) -> Router {
    Router::new()
        .route("/events", get(stream_events))
        .route("/health", get(health))
        .route("/send", post(send_whatsapp))
        .route("/webhook", post(whatsapp_webhook))
        .route("/whatsapp/webhook", post(whatsapp_webhook))
        .route("/instagram/bots", get(instagram_bots))
        .route("/instagram/subscribers", get(instagram_subscribers))
        .route("/instagram/send", post(send_instagram))
        .route("/instagram/webhook", post(instagram_webhook))
        .route("/bale/test", get(bale_test))
        .route("/bale/send", post(send_bale))
        .route("/bale/webhook/set", post(set_bale_webhook))
        .route("/bale/webhook/info", get(bale_webhook_info))
        .route("/bale/webhook", post(bale_webhook))
        .route("/bale/subscribers", get(bale_subscribers))
        .with_state(relay)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error: Value,
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        Self {
            status: StatusCode::from_u16(error.status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error: error.detail(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "ok": false, "error": self.error }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// A request body read as JSON or as a urlencoded form. Bodies that decode as
/// neither are treated as an empty object.
#[derive(Debug)]
struct Payload(Value);

impl<S: Send + Sync> FromRequest<S> for Payload {
    type Rejection = BytesRejection;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));
        let bytes = Bytes::from_request(request, state).await?;
        Ok(Self(decode_body(&bytes, is_form)))
    }
}

impl Payload {
    /// A string or numeric parameter, empty when absent.
    fn param(&self, key: &str) -> String {
        text_field(&self.0, key).unwrap_or_default()
    }
}

fn decode_body(bytes: &[u8], is_form: bool) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }
    let decoded = if is_form {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
            .ok()
            .map(|pairs| {
                Value::Object(
                    pairs
                        .into_iter()
                        .map(|(key, value)| (key, Value::String(value)))
                        .collect(),
                )
            })
    } else {
        serde_json::from_slice(bytes).ok()
    };
    decoded.unwrap_or_else(|| {
        warn!(bytes = bytes.len(), is_form, "request body could not be decoded");
        Value::Object(Map::new())
    })
}

async fn stream_events(State(relay): State<Relay>) -> impl IntoResponse {
    let mut subscription = relay.subscribe();
    debug!(
        subscriber = %subscription.id(),
        replayed = subscription.replayed(),
        "event stream opened"
    );

    let stream = stream! {
        while let Some(event) = subscription.recv().await {
            yield Ok::<_, Infallible>(as_sse_event(&event));
        }
    };

    (
        [(CACHE_CONTROL, HeaderValue::from_static("no-cache"))],
        event_stream(stream),
    )
}

fn event_stream<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<SseEvent, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn as_sse_event(event: &Event) -> SseEvent {
    let payload = serde_json::to_string(event)
        .unwrap_or_else(|error| json!({ "error": error.to_string() }).to_string());
    SseEvent::default().data(payload)
}

async fn health(State(relay): State<Relay>) -> Json<Value> {
    Json(json!({ "ok": true, "instance": relay.instance_id() }))
}

async fn send_whatsapp(State(relay): State<Relay>, payload: Payload) -> ApiResult<Json<Value>> {
    let result = relay
        .send_whatsapp(&payload.param("to"), &payload.param("body"))
        .await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

async fn whatsapp_webhook(State(relay): State<Relay>, Payload(raw): Payload) -> Json<Value> {
    relay.ingest(Platform::WhatsApp, raw);
    Json(json!({ "received": true }))
}

async fn instagram_bots(State(relay): State<Relay>) -> ApiResult<Json<Value>> {
    let bots = relay.instagram_bots().await?;
    Ok(Json(json!({ "ok": true, "bots": bots })))
}

async fn instagram_subscribers(State(relay): State<Relay>) -> ApiResult<Json<Value>> {
    let listing = relay.instagram_subscribers().await?;
    let mut body = json!({ "ok": true, "subscribers": listing.subscribers });
    if listing.bot.is_none() {
        body["message"] = json!("No Instagram bot configured");
    }
    Ok(Json(body))
}

async fn send_instagram(State(relay): State<Relay>, payload: Payload) -> ApiResult<Json<Value>> {
    let result = relay
        .send_instagram(&payload.param("contact_id"), &payload.param("message"))
        .await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

async fn instagram_webhook(State(relay): State<Relay>, Payload(raw): Payload) -> Json<Value> {
    relay.ingest(Platform::Instagram, raw);
    Json(json!({ "received": true }))
}

async fn bale_test(State(relay): State<Relay>) -> ApiResult<Json<Value>> {
    let result = relay.bale_get_me().await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

async fn send_bale(State(relay): State<Relay>, payload: Payload) -> ApiResult<Json<Value>> {
    let result = relay
        .send_bale(&payload.param("contact_id"), &payload.param("message"))
        .await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

async fn set_bale_webhook(State(relay): State<Relay>, payload: Payload) -> ApiResult<Json<Value>> {
    let requested = payload.param("url");
    let result = relay
        .set_bale_webhook(Some(requested.as_str()).filter(|url| !url.is_empty()))
        .await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

async fn bale_webhook_info(State(relay): State<Relay>) -> ApiResult<Json<Value>> {
    let result = relay.bale_webhook_info().await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

async fn bale_webhook(State(relay): State<Relay>, Payload(raw): Payload) -> Json<Value> {
    relay.ingest(Platform::Bale, raw);
    Json(json!({ "ok": true }))
}

async fn bale_subscribers(State(relay): State<Relay>) -> Json<Value> {
    Json(json!({ "ok": true, "subscribers": relay.bale_contacts() }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Method;
    use futures_util::StreamExt;
    use relay_kernel::RelayBuilder;
    use relay_providers::{BaleConfig, SendPulseConfig, UltraMsgConfig};
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn relay_for(server: &MockServer) -> Relay {
        RelayBuilder::new()
            .ultramsg(UltraMsgConfig {
                base_url: server.uri(),
                instance_id: Some("instance7".into()),
                token: Some("wa-token".into()),
            })
            .sendpulse(SendPulseConfig {
                base_url: server.uri(),
                client_id: Some("cid".into()),
                client_secret: Some("secret".into()),
            })
            .bale(BaleConfig {
                api_base: server.uri(),
                token: Some("bale-token".into()),
            })
            .build()
            .unwrap()
    }

    fn offline_relay() -> Relay {
        RelayBuilder::new().build().unwrap()
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn call(relay: &Relay, request: Request) -> (StatusCode, Value) {
        let response = router(relay.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_instance() {
        let server = MockServer::start().await;
        let (status, body) = call(&relay_for(&server), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "instance": "instance7" }));
    }

    #[tokio::test]
    async fn whatsapp_webhook_publishes_normalized_event() {
        let relay = offline_relay();
        let (status, body) = call(
            &relay,
            json_request(Method::POST, "/webhook", json!({ "from": "+1555", "body": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "received": true }));

        let events = relay.recent_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].platform, Platform::WhatsApp);
        assert_eq!(events[0].from, "+1555");
    }

    #[tokio::test]
    async fn form_encoded_webhook_is_accepted() {
        let relay = offline_relay();
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/whatsapp/webhook")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("from=%2B98912&body=salam+dost"))
            .unwrap();
        let (status, _) = call(&relay, request).await;
        assert_eq!(status, StatusCode::OK);

        let events = relay.recent_events();
        assert_eq!(events[0].from, "+98912");
        assert_eq!(events[0].body, "salam dost");
    }

    #[tokio::test]
    async fn undecodable_webhook_body_becomes_placeholders() {
        let relay = offline_relay();
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/instagram/webhook")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&relay, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "received": true }));

        let events = relay.recent_events();
        assert_eq!(events[0].platform, Platform::Instagram);
        assert_eq!(events[0].from, "Unknown");
        assert_eq!(events[0].body, "[No text]");
    }

    #[tokio::test]
    async fn bale_webhook_feeds_subscriber_listing() {
        let relay = offline_relay();
        let update = json!({
            "message": {
                "chat": { "id": 501 },
                "from": { "id": 501, "first_name": "Leila", "username": "leila" },
                "text": "hi"
            }
        });
        let (_, body) = call(&relay, json_request(Method::POST, "/bale/webhook", update)).await;
        assert_eq!(body, json!({ "ok": true }));

        let (status, body) = call(&relay, get("/bale/subscribers")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "ok": true,
                "subscribers": [{ "contact_id": "501", "name": "Leila", "username": "leila" }]
            })
        );
    }

    #[tokio::test]
    async fn send_requires_destination_and_body() {
        let relay = offline_relay();
        let (status, body) =
            call(&relay, json_request(Method::POST, "/send", json!({ "to": "+1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({ "ok": false, "error": "Parameters 'to' and 'body' are required." })
        );

        let (status, body) =
            call(&relay, json_request(Method::POST, "/bale/send", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Parameters 'contact_id' and 'message' are required.");
    }

    #[tokio::test]
    async fn send_accepts_numeric_destination() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/instance7/messages/chat"))
            .and(body_string_contains("to=15550001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sent": "true" })))
            .expect(1)
            .mount(&server)
            .await;
        let relay = relay_for(&server);

        let (status, body) = call(
            &relay,
            json_request(Method::POST, "/send", json!({ "to": 15550001, "body": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "result": { "sent": "true" } }));
        assert_eq!(relay.recent_events()[0].to.as_deref(), Some("15550001"));
    }

    #[tokio::test]
    async fn provider_failure_passes_status_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botbale-token/sendMessage"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({ "ok": false, "description": "chat not found" })),
            )
            .mount(&server)
            .await;
        let relay = relay_for(&server);

        let (status, body) = call(
            &relay,
            json_request(Method::POST, "/bale/send", json!({ "contact_id": 9, "message": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["description"], "chat not found");
        assert!(relay.recent_events().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_are_a_server_error() {
        let (status, body) = call(&offline_relay(), get("/bale/test")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["error"], "Bale is not configured: set BALE_TOKEN");
    }

    async fn mount_sendpulse(server: &MockServer, bots: Value) {
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "t", "expires_in": 3600 })),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/chatbots/bots"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": bots })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn instagram_subscribers_without_bot_carry_message() {
        let server = MockServer::start().await;
        mount_sendpulse(&server, json!([{ "id": 1, "channel": "TELEGRAM" }])).await;

        let (status, body) = call(&relay_for(&server), get("/instagram/subscribers")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "ok": true, "subscribers": [], "message": "No Instagram bot configured" })
        );
    }

    #[tokio::test]
    async fn null_bot_listing_is_treated_as_no_bots() {
        let server = MockServer::start().await;
        mount_sendpulse(&server, Value::Null).await;
        let relay = relay_for(&server);

        let (status, body) = call(&relay, get("/instagram/bots")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "bots": [] }));

        let (status, body) = call(
            &relay,
            json_request(
                Method::POST,
                "/instagram/send",
                json!({ "contact_id": "c1", "message": "x" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "ok": false, "error": "No Instagram bot configured" }));
    }

    #[tokio::test]
    async fn webhook_set_uses_url_from_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botbale-token/setWebhook"))
            .and(body_string_contains("https://relay.example/bale/webhook"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (status, body) = call(
            &relay_for(&server),
            json_request(
                Method::POST,
                "/bale/webhook/set",
                json!({ "url": "https://relay.example/bale/webhook" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!({ "ok": true, "result": true }));
    }

    #[tokio::test]
    async fn event_stream_replays_buffer_then_goes_live() {
        let relay = offline_relay();
        relay.ingest(Platform::WhatsApp, json!({ "from": "+1", "body": "first" }));
        relay.ingest(Platform::WhatsApp, json!({ "from": "+2", "body": "second" }));

        let response = router(relay.clone()).oneshot(get("/events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");

        let mut frames = response.into_body().into_data_stream();
        let mut text = String::new();
        let mut published_live = false;
        while text.matches("\n\n").count() < 3 {
            if text.matches("\n\n").count() == 2 && !published_live {
                relay.ingest(Platform::Bale, json!({ "chat_id": 3, "text": "third" }));
                published_live = true;
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), frames.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            text.push_str(std::str::from_utf8(&chunk).unwrap());
        }

        let bodies: Vec<String> = text
            .split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|data| {
                let event: Value = serde_json::from_str(data).unwrap();
                event["body"].as_str().unwrap().to_owned()
            })
            .collect();
        assert_eq!(bodies, ["first", "second", "third"]);
    }

    #[test]
    fn decode_body_falls_back_to_empty_object() {
        assert_eq!(decode_body(b"", false), json!({}));
        assert_eq!(decode_body(b"<xml/>", false), json!({}));
        assert_eq!(decode_body(b"[1]", false), json!([1]));
        assert_eq!(decode_body(b"a=1&b=two", true), json!({ "a": "1", "b": "two" }));
    }
}
