//! ==============================================================================
//! portal.rs - configuration web portal
//! ==============================================================================
//!
//! purpose:
//!     the operator's only way in before the device has credentials. serves a
//!     single-page form, validates what comes back and drops the result into
//!     the shared state, where the control loop is waiting for it.
//!
//! routes:
//!     GET  /         form (sensor mode also asks for broker and port)
//!     POST /guardar  validate + store credentials
//!     GET  /api      last published record as JSON
//!
//! relationships:
//!     - writes: domain::AppState.credentials (read by main.rs)
//!     - reads:  domain::AppState.last_published (written by main.rs)
//!
//! ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{DeviceConfig, Mode, MqttConfig, NetworkConfig};
use crate::domain::{AppState, Credentials, MetricsRecord};

pub const MIN_PASSWORD_LEN: usize = 8;

/// why a submitted form was refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("SSID must not be empty")]
    EmptySsid,
    #[error("password must be at least 8 characters")]
    ShortPassword,
    #[error("broker address must not be empty")]
    EmptyBroker,
    #[error("port must be a number between 1 and 65535")]
    InvalidPort,
}

/// fields posted by the form; the broker fields are absent in synthetic mode
#[derive(Debug, Default, Deserialize)]
pub struct ConfigForm {
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub broker: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
}

impl From<&NetworkConfig> for ConfigForm {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            ssid: network.ssid.clone().unwrap_or_default(),
            pass: network.password.clone().unwrap_or_default(),
            broker: network.broker.clone(),
            port: network.port.map(|p| p.to_string()),
        }
    }
}

/// Check a submitted form and turn it into credentials.
///
/// In synthetic mode the broker always comes from the configuration file.
pub fn validate_form(form: &ConfigForm, mode: Mode, mqtt: &MqttConfig) -> Result<Credentials, FormError> {
    if form.ssid.trim().is_empty() {
        return Err(FormError::EmptySsid);
    }
    if form.pass.chars().count() < MIN_PASSWORD_LEN {
        return Err(FormError::ShortPassword);
    }

    let (broker_host, broker_port) = match mode {
        Mode::Synthetic => (mqtt.host.clone(), mqtt.port),
        Mode::Sensor => {
            let broker = form.broker.as_deref().map(str::trim).unwrap_or_default();
            if broker.is_empty() {
                return Err(FormError::EmptyBroker);
            }
            let port = form
                .port
                .as_deref()
                .and_then(|p| p.trim().parse::<u16>().ok())
                .filter(|p| *p != 0)
                .ok_or(FormError::InvalidPort)?;
            (broker.to_string(), port)
        }
    };

    Ok(Credentials {
        ssid: form.ssid.trim().to_string(),
        password: form.pass.clone(),
        broker_host,
        broker_port,
    })
}

/// credentials written into `[network]`, if the file carries an SSID
pub fn preseeded_credentials(config: &DeviceConfig) -> Option<Result<Credentials, FormError>> {
    config.network.ssid.as_ref()?;
    Some(validate_form(&ConfigForm::from(&config.network), config.device.mode, &config.mqtt))
}

#[derive(Clone)]
pub struct PortalState {
    pub shared: Arc<RwLock<AppState>>,
    pub mode: Mode,
    pub mqtt: MqttConfig,
}

pub fn router(state: PortalState) -> Router {
    Router::new()
        .route("/", get(form_handler))
        .route("/guardar", post(save_handler))
        .route("/api", get(api_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: PortalState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind portal on {}", bind))?;
    tracing::info!("[PORTAL] Listening on http://{}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn form_handler(State(state): State<PortalState>) -> Html<String> {
    Html(render_form(state.mode))
}

async fn save_handler(
    State(state): State<PortalState>,
    Form(form): Form<ConfigForm>,
) -> (StatusCode, Html<String>) {
    let credentials = match validate_form(&form, state.mode, &state.mqtt) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("[PORTAL] Rejected form: {}", e);
            return (StatusCode::BAD_REQUEST, Html(render_message("Invalid configuration", &e.to_string())));
        }
    };

    let mut shared = state.shared.write().await;

    if state.mqtt.tls.is_some() && !shared.certificates_ready {
        tracing::error!("[PORTAL] Refusing save: certificates not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(render_message("Error", "certificates not configured")),
        );
    }
    if shared.credentials.is_some() {
        return (StatusCode::CONFLICT, Html(render_message("Already configured", "restart the device to change settings")));
    }

    tracing::info!(
        ssid = %credentials.ssid,
        password_len = credentials.password.chars().count(),
        broker = %credentials.broker_host,
        port = credentials.broker_port,
        "[PORTAL] Credentials saved"
    );
    shared.credentials = Some(credentials);

    (StatusCode::OK, Html(render_message("Saved", "connecting...")))
}

/// json api endpoint for programmatic access
async fn api_handler(State(state): State<PortalState>) -> Json<Option<MetricsRecord>> {
    let shared = state.shared.read().await;
    Json(shared.last_published.clone())
}

fn render_form(mode: Mode) -> String {
    let broker_fields = match mode {
        Mode::Sensor => {
            r#"<label>Broker <input name="broker" required></label>
    <label>Port <input name="port" type="number" min="1" max="65535" value="1883" required></label>
"#
        }
        Mode::Synthetic => "",
    };

    format!(
        r#"<!doctype html>
<html>
<head><meta name="viewport" content="width=device-width"><title>Pool monitor setup</title></head>
<body style="font-family: system-ui; padding: 2rem;">
  <h1>Pool monitor setup</h1>
  <form method="post" action="/guardar" style="display: grid; gap: .5rem; max-width: 20rem;">
    <label>SSID <input name="ssid" required></label>
    <label>Password <input name="pass" type="password" minlength="{}" required></label>
    {}<button type="submit">Save</button>
  </form>
</body>
</html>"#,
        MIN_PASSWORD_LEN, broker_fields
    )
}

fn render_message(title: &str, detail: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
<head><title>{0}</title></head>
<body style="font-family: system-ui; padding: 2rem;">
  <h1>{0}</h1>
  <p>{1}</p>
</body>
</html>"#,
        html_escape(title),
        html_escape(detail)
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
