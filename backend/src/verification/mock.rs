use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{App, HttpResponse, HttpServer, web};

use super::VerificationClient;
use crate::config::VerificationConfig;

/// Local chat-completions stand-in answering every request with one fixed reply.
pub(crate) struct MockUpstream {
    endpoint: String,
    handle: ServerHandle,
}

impl MockUpstream {
    /// Must be called from inside an actix system (e.g. `#[actix_web::test]`).
    pub(crate) fn start(status: StatusCode, body: &'static str) -> Self {
        let server = HttpServer::new(move || {
            App::new().default_service(web::to(move || async move {
                HttpResponse::build(status)
                    .content_type("application/json")
                    .body(body)
            }))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            endpoint: format!("http://{}/v1/chat/completions", addr),
            handle,
        }
    }

    /// Reply shaped like a chat-completions response carrying `content`.
    pub(crate) fn reply(content: &str) -> &'static str {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        });
        Box::leak(body.to_string().into_boxed_str())
    }

    pub(crate) fn client(&self) -> VerificationClient {
        client_for(&self.endpoint)
    }

    pub(crate) async fn stop(self) {
        self.handle.stop(false).await;
    }
}

pub(crate) fn client_for(endpoint: &str) -> VerificationClient {
    let config = VerificationConfig {
        enabled: true,
        endpoint: endpoint.to_string(),
        timeout_secs: 5,
        api_key: Some("test-key".into()),
        ..VerificationConfig::default()
    };
    VerificationClient::from_config(&config).unwrap()
}
