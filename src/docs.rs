//! Interactive API documentation.
//!
//! Swagger UI is served from a CDN and signs users in against the tenant with
//! the authorization code flow and PKCE, using the public `OPENAPI_CLIENT_ID`
//! application. Tokens obtained there can be sent to `/protected` directly.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::{config::Settings, AppState};

pub const TITLE: &str = "Azure Single-Tenant Auth Demo";
const SWAGGER_UI: &str = "https://cdn.jsdelivr.net/npm/swagger-ui-dist@5";
const SECURITY_SCHEME: &str = "AzureAD";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/openapi.json", get(openapi))
        .route("/docs", get(swagger_ui))
        .route("/oauth2-redirect", get(oauth2_redirect))
}

async fn openapi(State(state): State<AppState>) -> Json<Value> {
    Json(openapi_document(&state.settings))
}

async fn swagger_ui(State(state): State<AppState>) -> impl IntoResponse {
    Html(swagger_ui_html(&state.settings))
}

async fn oauth2_redirect() -> impl IntoResponse {
    Html(include_str!("docs/oauth2-redirect.html"))
}

pub fn openapi_document(settings: &Settings) -> Value {
    let error = |description: &str| {
        json!({
            "description": description,
            "content": {"application/json": {"schema": {
                "type": "object",
                "properties": {"error": {"type": "string"}},
            }}},
        })
    };

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": TITLE,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            "/": {"get": {
                "tags": ["Public"],
                "summary": "Public Route",
                "operationId": "public_route",
                "responses": {"200": {"description": "Successful Response"}},
            }},
            "/protected": {"get": {
                "tags": ["Protected"],
                "summary": "Protected Route",
                "operationId": "protected_route",
                "security": [{SECURITY_SCHEME: [settings.scope_name()]}],
                "responses": {
                    "200": {"description": "Successful Response"},
                    "401": error("Missing, malformed or expired token"),
                    "403": error("Token lacks the required scope"),
                },
            }},
        },
        "components": {"securitySchemes": {SECURITY_SCHEME: {
            "type": "oauth2",
            "description": "Azure AD - PKCE, Single-tenant",
            "flows": {"authorizationCode": {
                "authorizationUrl": settings.authorization_url(),
                "tokenUrl": settings.token_url(),
                "scopes": settings.scopes(),
            }},
        }}},
    })
}

pub fn swagger_ui_init_oauth(settings: &Settings) -> Value {
    json!({
        "usePkceWithAuthorizationCodeGrant": true,
        "clientId": settings.openapi_client_id,
        "scopes": [settings.scope_name()],
    })
}

fn swagger_ui_html(settings: &Settings) -> String {
    // Configuration values end up inside a <script> element.
    let init_oauth = swagger_ui_init_oauth(settings)
        .to_string()
        .replace('<', "\\u003c");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<link type="text/css" rel="stylesheet" href="{SWAGGER_UI}/swagger-ui.css">
<title>{TITLE} - Swagger UI</title>
</head>
<body>
<div id="swagger-ui"></div>
<script src="{SWAGGER_UI}/swagger-ui-bundle.js"></script>
<script>
const ui = SwaggerUIBundle({{
    url: '/openapi.json',
    dom_id: '#swagger-ui',
    layout: 'BaseLayout',
    deepLinking: true,
    showExtensions: true,
    showCommonExtensions: true,
    oauth2RedirectUrl: window.location.origin + '/oauth2-redirect',
    presets: [
        SwaggerUIBundle.presets.apis,
        SwaggerUIBundle.SwaggerUIStandalonePreset
    ],
}})
ui.initOAuth({init_oauth})
</script>
</body>
</html>
"#
    )
}
