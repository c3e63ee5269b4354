//! Shared helpers for integration tests.

use std::path::Path;
use std::sync::Arc;

use course_sync::{Environment, EnvironmentResolver, LoginSession, StaticEnvironmentResolver};
use url::Url;
use wiremock::MockServer;

pub const SESSION_ID: &str = "session-1";

/// Builds a resolver pointing every course at the mock server, with the
/// offline store rooted at `root`.
#[allow(clippy::unwrap_used)]
pub fn resolver(server: &MockServer, root: &Path) -> Arc<dyn EnvironmentResolver> {
    init_tracing();
    let env = Environment::new(
        Url::parse(&server.uri()).unwrap(),
        Some(LoginSession {
            unique_id: SESSION_ID.into(),
        }),
        root.to_path_buf(),
    );
    StaticEnvironmentResolver::shared(env)
}

/// Routes engine logs through the test harness; `RUST_LOG` filters apply.
/// Safe to call from every test, only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
