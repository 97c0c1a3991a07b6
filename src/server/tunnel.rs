//! HTTP tunnel endpoint
//!
//! `POST /<endpoint>?<apiKeyName>=<apiKey>` with a JSON command body,
//! answered with a JSON answer. A wrong or missing key is refused with 403.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{self, ServerContext};
use crate::logging::*;
use crate::protocol::{Answer, Command, FailureType};

#[derive(Clone)]
struct TunnelState {
	ctx: Arc<ServerContext>,
	api_key_name: String,
	api_key: String,
}

/// Router serving the tunnel endpoint
///
/// An empty `api_key` disables the key check.
pub fn router(ctx: Arc<ServerContext>, endpoint: &str, api_key_name: &str, api_key: &str) -> Router {
	let state = TunnelState {
		ctx,
		api_key_name: api_key_name.to_string(),
		api_key: api_key.to_string(),
	};
	Router::new().route(&format!("/{}", endpoint), post(handle_command)).with_state(state)
}

async fn handle_command(
	State(state): State<TunnelState>,
	Query(params): Query<HashMap<String, String>>,
	body: String,
) -> Response {
	if !state.api_key.is_empty() && params.get(&state.api_key_name) != Some(&state.api_key) {
		warn!("Tunnel request with missing or wrong {}", state.api_key_name);
		return StatusCode::FORBIDDEN.into_response();
	}

	let answer = match Command::from_json(&body) {
		Ok(cmd) => {
			debug!("Tunnel command {}/{}", cmd.dispatcher_id, cmd.name);
			handler::process(&state.ctx, &cmd).await
		}
		Err(e) => {
			warn!("Undecodable tunnel command: {}", e);
			Answer::error(FailureType::Malformed, e.to_string())
		}
	};
	(StatusCode::OK, Json(answer)).into_response()
}


// vim: ts=4
