//! Built-in health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can the process serve traffic? |
//!
//! ```rust,no_run
//! use tsu_bridge::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```

use crate::{Request, Response};

/// Liveness probe. Always `200 OK` with body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// Readiness probe (default implementation). `200 OK` with body `"ready"`;
/// replace it if readiness depends on downstream services.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
