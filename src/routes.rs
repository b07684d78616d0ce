//! Route table.
//!
//! Business endpoints are mounted by [`setup`]; today that is only the two
//! Kubernetes probes.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |

use crate::{Request, Response, Router};

/// Registers every application route on `router`.
pub fn setup(router: Router) -> Router {
    router
        .get("/healthz", liveness)
        .get("/readyz", readiness)
}

/// Always `200 OK` with body `"ok"`. If the process can answer HTTP at all,
/// it is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"`. Replace it once startup needs to wait on a
/// dependency.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}
