//! Native HTTP server: actix-web in front of the same handlers the Spin
//! component runs, backed by an in-memory store.

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};

use crate::config::Settings;
use crate::core::db::init_test_data;
use crate::core::store::MemoryStore;
use crate::handlers::handle_request;

pub struct AppState {
    pub store: MemoryStore,
    pub settings: Settings,
}

impl AppState {
    pub fn new(settings: Settings) -> web::Data<Self> {
        web::Data::new(Self {
            store: MemoryStore::new(),
            settings,
        })
    }
}

mod adapter {
    use actix_web::http::StatusCode;
    use actix_web::HttpRequest;
    use spin_sdk::http::{Method, Request, Response};

    /// Headers the handlers set on responses.
    const FORWARDED_HEADERS: [&str; 3] = ["Content-Type", "Location", "Cache-Control"];

    pub fn actix_to_spin_request(
        req: &HttpRequest,
        body: actix_web::web::Bytes,
    ) -> anyhow::Result<Request> {
        let method = match req.method().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => anyhow::bail!("unsupported method {}", other),
        };

        let uri = req.uri().to_string();
        let body_vec = body.to_vec();

        let mut req_builder = Request::builder();
        let method_set = req_builder.method(method);
        let uri_set = method_set.uri(&uri);

        // Copy headers
        let mut with_headers = uri_set;
        for (name, value) in req.headers() {
            if let Ok(val_str) = value.to_str() {
                with_headers = with_headers.header(name.as_str(), val_str);
            }
        }

        Ok(with_headers.body(body_vec).build())
    }

    pub fn spin_to_actix_response(spin_resp: Response) -> actix_web::HttpResponse {
        let status = *spin_resp.status();

        let mut response = actix_web::HttpResponse::build(
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        );
        for name in FORWARDED_HEADERS {
            if let Some(value) = spin_resp.header(name).and_then(|v| v.as_str()) {
                response.insert_header((name, value.to_string()));
            }
        }

        response.body(spin_resp.body().to_vec())
    }
}

/// Body limit for the `web::Bytes` extractor in [`handle_all`].
pub fn payload_config(settings: &Settings) -> web::PayloadConfig {
    web::PayloadConfig::new(settings.max_body_bytes)
}

pub async fn handle_all(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let spin_req = match adapter::actix_to_spin_request(&req, body) {
        Ok(r) => r,
        Err(err) => {
            tracing::debug!(error = %err, "request rejected by adapter");
            return HttpResponse::BadRequest()
                .json(serde_json::json!({"error": "Invalid request"}));
        }
    };

    let resp = handle_request(&state.store, &state.settings, &spin_req);
    adapter::spin_to_actix_response(resp)
}

pub async fn run(settings: Settings) -> std::io::Result<()> {
    let state = AppState::new(settings);
    if state.settings.seed_demo_data {
        init_test_data(&state.store).map_err(std::io::Error::other)?;
    }

    let address = state.settings.bind_address.clone();
    tracing::info!(%address, "server listening");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(payload_config(&state.settings))
            .default_service(web::route().to(handle_all))
    })
    .bind(address)?
    .run()
    .await
}
