// src/monitor.rs
//! Runs one MT3339 session over a serial port

use crate::{
    config::GpsConfig,
    error::{GpsError, Result},
    gps::{
        clock::SystemClock,
        data::GpsFix,
        link::{SerialLink, Transport},
        mt3339::{LifecycleState, Mt3339},
        nmea::NmeaDecoder,
    },
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::watch, time::interval};
use tracing::{debug, info};

/// Drives the controller and publishes every committed fix
pub struct GpsMonitor {
    config: GpsConfig,
    fix: watch::Sender<GpsFix>,
    running: Arc<AtomicBool>,
}

impl GpsMonitor {
    pub fn new(config: GpsConfig) -> Self {
        let (fix, _) = watch::channel(GpsFix::new());
        Self {
            config,
            fix,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Receiver that sees each newly committed fix
    pub fn subscribe(&self) -> watch::Receiver<GpsFix> {
        self.fix.subscribe()
    }

    /// Handle that stops the session when cleared
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Request a graceful stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Latest committed fix
    pub fn get_fix(&self) -> GpsFix {
        self.fix.borrow().clone()
    }

    /// Open the configured serial port and run until stopped
    pub async fn run(&self) -> Result<()> {
        let port = self
            .config
            .serial_port
            .as_deref()
            .ok_or_else(|| GpsError::Connection("No serial port configured".to_string()))?;

        let link = SerialLink::open(
            port,
            self.config.serial_baudrate,
            self.config.receive_queue_capacity,
        )?;
        self.run_with(link).await
    }

    /// Run a session on an already opened transport
    pub async fn run_with<T: Transport>(&self, transport: T) -> Result<()> {
        let decoder = NmeaDecoder::new(self.config.commit_policy, Arc::new(SystemClock));
        let mut gps = Mt3339::new(decoder, self.config.standby_grace());
        gps.begin(transport)?;

        let mut ticker = interval(self.config.poll_interval());

        loop {
            ticker.tick().await;

            if !self.is_running() && gps.state() == LifecycleState::Active {
                info!("stopping, putting receiver in standby");
                gps.standby()?;
            }

            let commits = gps.consume()?;
            if commits > 0 {
                debug!(commits, "fix committed");
                self.fix.send_replace(gps.fix().clone());
            }

            gps.check_link();

            if gps.state() == LifecycleState::Idle {
                info!(reason = ?gps.last_shutdown(), "session finished");
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::{mt3339::Command, nmea::tests::sentence};
    use std::{
        collections::VecDeque,
        sync::Mutex,
    };

    #[derive(Clone, Default)]
    struct ScriptedLink {
        incoming: Arc<Mutex<VecDeque<u8>>>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for ScriptedLink {
        fn available(&self) -> bool {
            !self.incoming.lock().unwrap().is_empty()
        }

        fn read_byte(&mut self) -> Option<u8> {
            self.incoming.lock().unwrap().pop_front()
        }

        fn write_line(&mut self, line: &str) -> Result<()> {
            self.written.lock().unwrap().push(line.to_string());
            // The receiver acknowledges standby straight away
            if line == Command::Standby.line() {
                self.incoming
                    .lock()
                    .unwrap()
                    .extend(sentence("PMTK001,161,3").bytes());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_monitor_missing_port() {
        let monitor = GpsMonitor::new(GpsConfig::default());
        assert!(matches!(monitor.run().await, Err(GpsError::Connection(_))));
    }

    #[tokio::test]
    async fn test_session_publishes_fix_and_stops() {
        let mut config = GpsConfig::default();
        config.poll_interval_ms = 1;
        let monitor = Arc::new(GpsMonitor::new(config));
        let mut fixes = monitor.subscribe();

        let link = ScriptedLink::default();
        link.incoming.lock().unwrap().extend(
            format!(
                "{}{}",
                sentence("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W"),
                sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,")
            )
            .bytes(),
        );

        let session = {
            let monitor = Arc::clone(&monitor);
            let link = link.clone();
            tokio::spawn(async move { monitor.run_with(link).await })
        };

        fixes.changed().await.unwrap();
        assert_eq!(fixes.borrow().satellites, 8);
        assert!(monitor.get_fix().is_valid());

        monitor.stop();
        session.await.unwrap().unwrap();

        let written = link.written.lock().unwrap().clone();
        assert_eq!(written.first().map(String::as_str), Some(Command::Wake.line()));
        assert!(written.iter().any(|l| l == Command::SelectSentences.line()));
        assert_eq!(written.last().map(String::as_str), Some(Command::Standby.line()));
    }
}
