//! HTTP Tunnel Tests
//!
//! The client side of the tunnel is checked against a wiremock stand-in for
//! the web tier (headers, query parameter, status handling), then against a
//! real server exposing the tunnel endpoint.

use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cmdlink::communicator::{Communicator, USER_AGENT};
use cmdlink::config::Config;
use cmdlink::error::TransportError;
use cmdlink::logging::LogBuffer;
use cmdlink::protocol::{Answer, AnswerStatus, Command, TransportMode};
use cmdlink::server::Server;

/// Client config routing module commands through a tunnel at `port`
fn web_config(port: u16) -> Config {
	let mut config = Config {
		host: "127.0.0.1".to_string(),
		web_port: port,
		mode: TransportMode::Web,
		..Config::default()
	};
	config.tunnel.api_key = "s3cret".to_string();
	config
}

/// A port nothing listens on
fn closed_port() -> u16 {
	let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
	listener.local_addr().expect("No local address").port()
}

// ===================================================================
// Client against a mocked web tier
// ===================================================================

/// The request carries the API key, the JSON headers and the command body
#[tokio::test]
async fn test_tunnel_request_shape() {
	let mock = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/srvcmd"))
		.and(query_param("apiKey", "s3cret"))
		.and(header("accept", "application/json"))
		.and(header("content-type", "application/json; charset=UTF-8"))
		.and(header("user-agent", USER_AGENT))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_string(Answer::ok("3 rows").to_json().expect("Failed to encode answer")),
		)
		.expect(1)
		.mount(&mock)
		.await;

	let config = web_config(mock.address().port());
	let communicator = Communicator::new(&config).expect("Failed to build communicator");
	let answer = communicator
		.send_command(&config.new_command("crm", "LIST"))
		.await
		.expect("Tunnel call failed");
	assert_eq!(answer.status, AnswerStatus::Ok);
	assert_eq!(answer.entity, "3 rows");

	let requests = mock.received_requests().await.expect("Request recording disabled");
	let body: serde_json::Value =
		serde_json::from_slice(&requests[0].body).expect("Body is not JSON");
	assert_eq!(body["dispatcherId"], "crm");
	assert_eq!(body["name"], "LIST");
}

/// Statuses other than 200 and 204 are transport errors
#[tokio::test]
async fn test_tunnel_rejects_unexpected_status() {
	let mock = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(500))
		.mount(&mock)
		.await;

	let config = web_config(mock.address().port());
	let communicator = Communicator::new(&config).expect("Failed to build communicator");
	match communicator.send_command(&config.new_command("crm", "LIST")).await {
		Err(TransportError::HttpStatus { status, .. }) => assert_eq!(status, 500),
		other => panic!("expected HTTP status error, got {:?}", other.map(|a| a.status)),
	}
}

/// STOP never reads the response body
#[tokio::test]
async fn test_tunnel_stop_ignores_body() {
	let mock = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_body_string("<html>bye</html>"))
		.mount(&mock)
		.await;

	let mut config = web_config(mock.address().port());
	config.web_override = true;
	let communicator = Communicator::new(&config).expect("Failed to build communicator");
	let answer = communicator.stop().await.expect("Stop failed");
	assert_eq!(answer.status, AnswerStatus::Stop);
}

/// HEALTH with an empty 204 response is synthesized
#[tokio::test]
async fn test_tunnel_health_no_content() {
	let mock = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(204))
		.mount(&mock)
		.await;

	let mut config = web_config(mock.address().port());
	config.web_override = true;
	let communicator = Communicator::new(&config).expect("Failed to build communicator");
	let answer = communicator.health().await.expect("Health failed");
	assert_eq!(answer.status, AnswerStatus::Health);
}

/// A response slower than the client timeout fails as a timeout
#[tokio::test]
async fn test_tunnel_timeout() {
	let mock = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
		.mount(&mock)
		.await;

	let config = web_config(mock.address().port());
	let communicator = Communicator::new(&config).expect("Failed to build communicator");
	let cmd = config.new_command("crm", "LIST").with_timeout_ms(300);
	match communicator.send_command(&cmd).await {
		Err(TransportError::Timeout { after, .. }) => assert_eq!(after, Duration::from_millis(300)),
		other => panic!("expected timeout, got {:?}", other.map(|a| a.status)),
	}
}

// ===================================================================
// Client against a real server
// ===================================================================

/// Module commands reach the server's tunnel while the admin socket is unreachable
#[tokio::test]
async fn test_commands_through_server_tunnel() {
	let dir = TempDir::new().expect("Failed to create temp dir");
	let mut server_config = Config {
		host: "127.0.0.1".to_string(),
		admin_port: 0,
		web_port: 0,
		..Config::default()
	};
	server_config.tunnel.enabled = true;
	server_config.tunnel.api_key = "s3cret".to_string();
	server_config.file_server.location = dir.path().join("store");

	let server = Server::from_config(server_config, LogBuffer::new(10)).expect("Failed to configure server");
	let running = server.bind().await.expect("Failed to bind server");
	let tunnel_port = running.tunnel_addr().expect("Tunnel not bound").port();

	let mut config = web_config(tunnel_port);
	config.admin_port = closed_port();
	let communicator = Communicator::new(&config).expect("Failed to build communicator");

	let answer = communicator
		.send_command(&config.new_command("log", "limit=1"))
		.await
		.expect("Tunnel call failed");
	assert_eq!(answer.status, AnswerStatus::Ok);

	// internal commands stay on the (unreachable) socket path
	assert!(communicator.send_command(&Command::health()).await.is_err());

	let wrong_key = Config {
		tunnel: cmdlink::config::TunnelSettings { api_key: "nope".to_string(), ..config.tunnel.clone() },
		..config.clone()
	};
	communicator.reload(&wrong_key).expect("Reload failed");
	match communicator.send_command(&config.new_command("log", "LOG")).await {
		Err(TransportError::HttpStatus { status, .. }) => assert_eq!(status, 403),
		other => panic!("expected 403, got {:?}", other.map(|a| a.status)),
	}

	let overridden = Config { web_override: true, ..config.clone() };
	communicator.reload(&overridden).expect("Reload failed");
	let answer = communicator.stop().await.expect("Stop failed");
	assert_eq!(answer.status, AnswerStatus::Stop);
	tokio::time::timeout(Duration::from_secs(15), running.wait())
		.await
		.expect("Server did not stop");
}

// vim: ts=4
