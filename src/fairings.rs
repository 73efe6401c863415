use crate::state::AppState;
use log::{error, info, warn};
use rocket::fairing::{self, Fairing, Info, Kind};
use rocket::{Build, Data, Orbit, Request, Response, Rocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct RequestLogger;

#[derive(Clone, Copy)]
struct RequestStart(Instant);

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _: &mut Data<'_>) {
        req.local_cache(|| RequestStart(Instant::now()));
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let started = req.local_cache(|| RequestStart(Instant::now()));
        info!(
            "{} {} {} {}ms {}",
            req.method(),
            req.uri(),
            res.status().code,
            started.0.elapsed().as_millis(),
            req.headers().get_one("User-Agent").unwrap_or("Unknown")
        );
    }
}

/// Starts the webhook and access-ledger workers on ignition and drains them at shutdown.
pub struct BackgroundWorkers;

#[rocket::async_trait]
impl Fairing for BackgroundWorkers {
    fn info(&self) -> Info {
        Info {
            name: "Background Workers",
            kind: Kind::Ignite | Kind::Shutdown,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let Some(state) = rocket.state::<AppState>() else {
            error!("Application state missing, background workers not started");
            return Err(rocket);
        };

        state.webhooks.start();
        state.access.start(Arc::clone(&state.database));

        match state.gc.reconcile() {
            Ok(0) => {}
            Ok(finished) => info!("Reconciled {finished} interrupted GC sweep(s)"),
            Err(e) => warn!("GC reconciliation failed: {e}"),
        }

        Ok(rocket)
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        let Some(state) = rocket.state::<AppState>() else {
            return;
        };

        let grace = Duration::from_secs(state.config.shutdown_grace_secs);
        info!(
            "Draining background work ({} webhook, {} access) for up to {}s",
            state.webhooks.pending(),
            state.access.pending(),
            grace.as_secs()
        );

        let drained = tokio::time::timeout(grace, async {
            state.webhooks.wait_idle().await;
            state.access.wait_idle().await;
        })
        .await
        .is_ok();

        if !drained {
            warn!("Shutdown grace period elapsed with background work still pending");
        }
    }
}
