// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Server role: waits for `POST /start` before running the command, and for
//! `POST /stop` before shutting down.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{RunError, SyncError};
use crate::http_utils::{create_html_response, log_and_create_http_response, HttpResponse};
use crate::runner::{interrupt_channel, CommandRunner, InterruptHandle, Interrupts, RunOutcome};

/// Time given to open connections to finish once shutdown starts.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

const INDEX_HTML: &str = r#"<html><body>
<form method="post" action="/start"><button type="submit">/start</button> : Start the command</form>
<form method="post" action="/stop"><button type="submit">/stop</button> : Stop the command</form>
</body></html>"#;

type RunResult = Result<RunOutcome, RunError>;

/// What the single run needs once `/start` is accepted.
struct PendingRun {
    interrupts: Interrupts,
    result_tx: oneshot::Sender<RunResult>,
}

/// Start/stop flags of the one command a server runs in its lifetime.
#[derive(Default)]
struct SyncSession {
    started: bool,
    finished: bool,
    pending: Option<PendingRun>,
}

enum StopDecision {
    NotStarted,
    Finished,
    Running,
}

struct SyncHandler {
    session: Mutex<SyncSession>,
    runner: Arc<CommandRunner>,
    interrupt: InterruptHandle,
    wait_for_stop: bool,
    shutdown: CancellationToken,
}

impl SyncHandler {
    fn session(&self) -> MutexGuard<'_, SyncSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn route<B>(self: &Arc<Self>, req: &Request<B>) -> HttpResponse {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/") => create_html_response(INDEX_HTML),
            (&Method::POST, "/start") => self.start(),
            (&Method::POST, "/stop") => self.stop(),
            (method, path @ ("/start" | "/stop")) => log_and_create_http_response(
                &format!("{method} is not allowed on {path}"),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (_, path) => {
                log_and_create_http_response(&format!("No route for {path}"), StatusCode::NOT_FOUND)
            }
        }
    }

    fn start(self: &Arc<Self>) -> HttpResponse {
        let pending = {
            let mut session = self.session();
            if session.started {
                None
            } else {
                session.started = true;
                session.pending.take()
            }
        };
        let Some(pending) = pending else {
            return log_and_create_http_response("KO", StatusCode::CONFLICT);
        };

        info!("Start sync received, starting command");
        let handler = Arc::clone(self);
        tokio::spawn(async move {
            let result = handler.runner.run(pending.interrupts).await;
            handler.session().finished = true;
            match &result {
                Ok(outcome) => debug!("Command run completed with {}", outcome.exit_status),
                Err(e) => error!("Command run failed: {e}"),
            }
            if !handler.wait_for_stop || result.is_err() {
                handler.shutdown.cancel();
            }
            // the receiver only goes away once the server stopped waiting
            let _ = pending.result_tx.send(result);
        });
        log_and_create_http_response("OK", StatusCode::CREATED)
    }

    fn stop(&self) -> HttpResponse {
        let decision = {
            let session = self.session();
            match (session.started, session.finished) {
                (false, _) => StopDecision::NotStarted,
                (true, true) => StopDecision::Finished,
                (true, false) => StopDecision::Running,
            }
        };
        match decision {
            StopDecision::NotStarted => log_and_create_http_response(
                "Command not started yet",
                StatusCode::PRECONDITION_FAILED,
            ),
            StopDecision::Finished => {
                self.schedule_shutdown();
                log_and_create_http_response("Command already finished", StatusCode::NO_CONTENT)
            }
            StopDecision::Running => {
                if !self.interrupt.interrupt() {
                    debug!("Command finished before the interrupt could be forwarded");
                }
                self.schedule_shutdown();
                log_and_create_http_response("Command stopped", StatusCode::ACCEPTED)
            }
        }
    }

    fn schedule_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stop sync received, shutting down the sync server");
            self.shutdown.cancel();
        }
    }
}

/// HTTP listener for the server role.
pub struct SyncServer {
    listener: TcpListener,
}

impl SyncServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, SyncError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SyncError::Bind { addr, source })?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SyncError> {
        self.listener.local_addr().map_err(SyncError::Accept)
    }

    /// Serves `/`, `/start` and `/stop` until the session ends, then waits for the
    /// command run to complete and returns its outcome.
    pub async fn serve(self, runner: Arc<CommandRunner>) -> Result<RunOutcome, SyncError> {
        let (interrupt, interrupts) = interrupt_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let handler = Arc::new(SyncHandler {
            session: Mutex::new(SyncSession {
                pending: Some(PendingRun {
                    interrupts,
                    result_tx,
                }),
                ..SyncSession::default()
            }),
            wait_for_stop: runner.config().sync_wait_for_stop,
            runner,
            interrupt,
            shutdown: shutdown.clone(),
        });

        if let Ok(addr) = self.local_addr() {
            info!("Waiting for start sync on http://{addr}/start");
        }

        let service = service_fn(move |req| {
            let handler = Arc::clone(&handler);
            async move { Ok::<_, Infallible>(handler.route(&req)) }
        });

        serve_tcp(self.listener, service, shutdown).await?;

        match result_rx.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::RunTask(
                "command task ended without reporting a result".to_string(),
            )),
        }
    }
}

async fn serve_tcp<S>(
    listener: TcpListener,
    service: S,
    shutdown: CancellationToken,
) -> Result<(), SyncError>
where
    S: hyper::service::Service<Request<hyper::body::Incoming>, Response = HttpResponse>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = JoinSet::new();

    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(SyncError::Accept(e));
                }
                Ok((conn, _)) => conn,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
            _ = shutdown.cancelled() => break,
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let service = service.clone();
        let shutdown = shutdown.clone();
        joinset.spawn(async move {
            let mut conn = std::pin::pin!(server.serve_connection(conn, service));
            tokio::select! {
                res = conn.as_mut() => {
                    if let Err(e) = res {
                        debug!("Connection error: {e}");
                    }
                }
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    if let Err(e) = conn.await {
                        debug!("Connection error during shutdown: {e}");
                    }
                }
            }
        });
    }

    drop(listener);
    let drained = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
        while joinset.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!("Grace period elapsed, closing remaining connections");
        joinset.abort_all();
    }
    Ok(())
}
