mod engine;
mod hl7800;
mod modem;
mod storage;
mod swmgmt;
mod workqueue;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use engine::LocalEngine;
use hl7800::{Hl7800Config, Hl7800SwMgmt};
use modem::SimModem;
use std::sync::Arc;
use storage::FsStorage;
use swmgmt::{Agent, Registry};
use swmgmt_shared::SwMgmtEvent;
use tokio::time::{interval, timeout, Duration};
use workqueue::WorkQueue;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Settings for the loopback management session
#[derive(Debug, Clone)]
struct SessionConfig {
    /// Size of the generated firmware package
    package_size: usize,
    /// Block size used for the package write
    block_size: usize,
    /// Give up waiting for the install outcome after this long
    install_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            package_size: 20 * 1024,
            block_size: 1024,
            install_timeout: Duration::from_secs(30),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Hl7800Config {
        obj_inst: 0,
        install_delay: Duration::from_secs(2),
        mount_point: std::env::temp_dir().join("swmgmt-lfs"),
        ..Default::default()
    };
    let session = SessionConfig::default();

    info!("Software management agent starting");
    info!("  Package: {} on 9/{}", config.pkg_name, config.obj_inst);
    info!("  Staging file: {}", config.update_file_path().display());

    let (queue, _queue_task) = WorkQueue::start("swmgmt");
    let engine = Arc::new(LocalEngine::new());
    let storage = Arc::new(FsStorage::new());
    let modem = Arc::new(SimModem::new(
        "HL7800.4.4.14.0",
        "HL7800.4.6.9.4",
        storage.clone(),
        Duration::from_millis(50),
    ));
    let registry = Registry::new();

    let driver = Hl7800SwMgmt::init(
        config.clone(),
        &registry,
        engine.clone(),
        storage,
        modem,
        queue,
    )?;
    info!("HL7800 software management initialized");

    // Second subsystem observing the same instance
    registry.register_event_callback(
        config.obj_inst,
        Arc::new(Agent::listener(|event| {
            info!("[AUDIT] Software management event: {}", event);
            Ok(())
        })),
    );

    info!("Registry holds {} agent(s)", registry.agent_count());

    run_session(&engine, config.obj_inst, &session).await?;

    info!(
        "Package state {:?}, {} bytes pending in {}",
        driver.state(),
        driver.bytes_downloaded(),
        driver.update_file_path().display()
    );
    Ok(())
}

/// Play the management server's part: download, install, verify
async fn run_session(engine: &LocalEngine, obj_inst: u16, session: &SessionConfig) -> Result<()> {
    let version = engine
        .read_package_version(obj_inst)
        .map(|v| String::from_utf8_lossy(&v).into_owned())
        .unwrap_or_default();
    info!("[SESSION] Installed version: {}", version);

    let status = engine.execute(obj_inst, SwMgmtEvent::Activate);
    info!("[SESSION] Activate -> {} (firmware is always active)", status);

    let payload = Bytes::from(
        (0..session.package_size)
            .map(|i| (i % 251) as u8)
            .collect::<Vec<u8>>(),
    );
    let total = payload.len();
    let mut offset = 0;
    while offset < total {
        let end = (offset + session.block_size).min(total);
        let block = payload.slice(offset..end);
        engine.write_package(obj_inst, &block, end == total, total)?;
        offset = end;
    }
    info!("[SESSION] Package delivered ({} bytes)", total);

    let status = engine.execute(obj_inst, SwMgmtEvent::Install);
    if status != 0 {
        return Err(anyhow!("Install rejected: {}", status));
    }

    let report = timeout(session.install_timeout, async {
        let mut ticker = interval(Duration::from_millis(100));
        loop {
            ticker.tick().await;
            if let Some(report) = engine.install_reports().last().copied() {
                return report;
            }
            debug!("[SESSION] Waiting for install result");
        }
    })
    .await
    .map_err(|_| anyhow!("No install result after {:?}", session.install_timeout))?;

    if report.status == 0 {
        info!("[SESSION] Install succeeded");
    } else {
        error!("[SESSION] Install failed: {}", report.status);
    }
    info!(
        "[SESSION] Update state={:?} result={:?}",
        engine.update_state(obj_inst),
        engine.update_result(obj_inst)
    );

    let version = engine
        .read_package_version(obj_inst)
        .map(|v| String::from_utf8_lossy(&v).into_owned())
        .unwrap_or_default();
    info!("[SESSION] Installed version: {}", version);

    // Reset the object so another install can follow
    let status = engine.execute(obj_inst, SwMgmtEvent::Uninstall);
    if status != 0 {
        warn!("[SESSION] Uninstall returned {}", status);
    }
    Ok(())
}
