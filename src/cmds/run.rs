// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Subcommand to run the daemon: load config, bind sockets, wire the
//! subsystems together, and serve until SIGINT/SIGTERM.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use base::clock::{Clocks, RealClocks};
use base::rng::{Rng, SystemRng};
use base::shutdown;
use base::{Error, ResultExt as _};
use bpaf::Bpaf;
use conf::{storage, ConfigRuntime, LoadOutcome};
use nix::sys::signal::{self, SigHandler, Signal};
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::hal::Hal;
use crate::httpx::metrics::HttpMetrics;
use crate::httpx::Service;
use crate::net::conn::ConnTable;
use crate::net::pool::BufferPool;
use crate::net::reactor::Reactor;
use crate::net::workers::WorkerPool;
use crate::net::{process_connection, NetEnv};
use crate::router::StreamRouter;
use crate::rtsp::{self, RtspServer};
use crate::soap::{Ctx, Dispatcher};
use crate::telemetry::MemoryBudget;
use crate::{autoir, discovery, services};

/// Run the camera daemon.
#[derive(Bpaf, Debug)]
#[bpaf(command("run"))]
pub struct Args {
    /// Path to the INI configuration file.
    #[bpaf(long("config"), argument("PATH"))]
    config: Option<PathBuf>,
}

static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: libc::c_int) {
    SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
}

pub fn run(args: Args) -> Result<i32, Error> {
    let config_path = super::config_path(args.config);
    let clocks: Arc<dyn Clocks> = Arc::new(RealClocks::default());
    let rng: Arc<dyn Rng> = Arc::new(SystemRng::new());

    let rt = Arc::new(ConfigRuntime::new());
    let mut degraded = false;
    match storage::load(&config_path, &rt) {
        Ok(LoadOutcome::Clean) => info!("loaded {}", config_path.display()),
        Ok(LoadOutcome::DefaultsApplied) => info!("no config file; defaults in effect"),
        Ok(LoadOutcome::Degraded) => {
            warn!("config loaded with errors; continuing degraded");
            degraded = true;
        }
        Err(e) => {
            // Corruption recovery: defaults are already installed.
            warn!(err = %e, "config unusable; continuing with defaults");
            degraded = true;
        }
    }
    rt.ensure_bootstrap_user(rng.as_ref())?;

    // Real encoder/sensor drivers are platform packages; this build carries
    // the loopback HAL.
    let hal = Hal::loopback(clocks.clone());
    let router = Arc::new(StreamRouter::new(hal.video.clone(), rt.clone()));
    let metrics = Arc::new(HttpMetrics::new());
    let budget = Arc::new(MemoryBudget::default());
    let auth = Arc::new(Authenticator::new(rt.clone(), clocks.clone(), rng.clone()));

    let mut dispatcher = Dispatcher::new(Ctx {
        rt: rt.clone(),
        hal: hal.clone(),
        router: router.clone(),
        clocks: clocks.clone(),
        rng: rng.clone(),
    });
    services::register_all(&mut dispatcher)?;

    let service = Arc::new(Service::new(
        rt.clone(),
        auth,
        Arc::new(dispatcher),
        metrics.clone(),
        budget.clone(),
        hal.snapshot.clone(),
        rng.clone(),
    ));
    if degraded {
        service.set_degraded();
    }

    // Startup failures (binds, schema wiring) exit with code 1 via `Err`.
    let snapshot = rt.snapshot();
    let http_listener = TcpListener::bind((snapshot.bind_addr.as_str(), snapshot.http_port))
        .err_kind(base::ErrorKind::Io)?;
    let rtsp_listener = TcpListener::bind((snapshot.bind_addr.as_str(), snapshot.rtsp_port))
        .err_kind(base::ErrorKind::Io)?;
    info!(
        http = snapshot.http_port,
        rtsp = snapshot.rtsp_port,
        "listening on {}",
        snapshot.bind_addr
    );

    unsafe {
        signal::signal(Signal::SIGINT, SigHandler::Handler(on_signal))
            .err_kind(base::ErrorKind::Io)?;
        signal::signal(Signal::SIGTERM, SigHandler::Handler(on_signal))
            .err_kind(base::ErrorKind::Io)?;
    }

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let mut joins: Vec<(&'static str, thread::JoinHandle<()>)> = Vec::new();

    // HTTP engine: reactor + worker pool.
    let env = NetEnv {
        pool: Arc::new(BufferPool::new()),
        table: Arc::new(ConnTable::new()),
        epoll: Arc::new(
            nix::sys::epoll::Epoll::new(nix::sys::epoll::EpollCreateFlags::EPOLL_CLOEXEC)
                .err_kind(base::ErrorKind::Io)?,
        ),
        clocks: clocks.clone(),
        metrics: metrics.clone(),
        budget: budget.clone(),
        service,
    };
    let worker_env = env.clone();
    let workers = Arc::new(WorkerPool::new(
        snapshot.http_workers.max(1) as usize,
        move |conn| process_connection(&worker_env, conn),
    ));
    let reactor = Reactor::new(env, http_listener, workers.clone(), shutdown_rx.clone())
        .err_kind(base::ErrorKind::Io)?;
    joins.push((
        "reactor",
        thread::Builder::new()
            .name("reactor".to_owned())
            .spawn(move || reactor.run())
            .err_kind(base::ErrorKind::Internal)?,
    ));

    // RTSP engine.
    let rtsp_server = RtspServer::new(rtsp::Deps {
        rt: rt.clone(),
        router: router.clone(),
        hal: hal.clone(),
        clocks: clocks.clone(),
        rng: rng.clone(),
        budget: budget.clone(),
        shutdown_rx: shutdown_rx.clone(),
    });
    joins.push((
        "rtsp",
        thread::Builder::new()
            .name("rtsp-accept".to_owned())
            .spawn(move || rtsp_server.run(rtsp_listener))
            .err_kind(base::ErrorKind::Internal)?,
    ));

    // WS-Discovery responder.
    if snapshot.discoverable {
        let (rt2, rng2, rx2) = (rt.clone(), rng.clone(), shutdown_rx.clone());
        joins.push((
            "discovery",
            thread::Builder::new()
                .name("ws-discovery".to_owned())
                .spawn(move || discovery::run(rt2, rng2, rx2))
                .err_kind(base::ErrorKind::Internal)?,
        ));
    }

    // Auto day/night.
    {
        let (rt2, hal2, rx2) = (rt.clone(), hal.clone(), shutdown_rx.clone());
        joins.push((
            "autoir",
            thread::Builder::new()
                .name("autoir".to_owned())
                .spawn(move || autoir::run(rt2, hal2, rx2))
                .err_kind(base::ErrorKind::Internal)?,
        ));
    }

    // Config flusher: drains the persistence queue to flash.
    {
        let (rt2, rx2, path) = (rt.clone(), shutdown_rx.clone(), config_path.clone());
        joins.push((
            "flusher",
            thread::Builder::new()
                .name("conf-flush".to_owned())
                .spawn(move || loop {
                    let stopping = rx2.wait_for(Duration::from_secs(2)).is_err();
                    match storage::flush(&path, &rt2) {
                        Ok(true) => info!("configuration saved"),
                        Ok(false) => {}
                        Err(e) => warn!(err = %e, "configuration save failed; will retry"),
                    }
                    if stopping {
                        break;
                    }
                })
                .err_kind(base::ErrorKind::Internal)?,
        ));
    }

    info!(generation = rt.generation(), "startup complete");
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        clocks.sleep(Duration::from_millis(200));
    }
    info!("shutting down");
    drop(shutdown_tx);

    let mut fatal = false;
    for (name, handle) in joins {
        if handle.join().is_err() {
            warn!(thread = name, "thread panicked");
            fatal = true;
        }
    }
    match Arc::try_unwrap(workers) {
        Ok(pool) => pool.shutdown(),
        Err(_) => warn!("worker pool still referenced at shutdown"),
    }

    Ok(if fatal { 2 } else { 0 })
}
