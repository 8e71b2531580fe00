//! The ingest loop: read lines, reassemble cycles, persist completed ones.
//!
//! Single-threaded by design apart from the logger thread. The loop polls
//! the shutdown flag between reads; the transport read timeout bounds how
//! long a shutdown request can go unnoticed.

#![allow(missing_docs)]

use std::thread;
use std::time::Instant;

use chrono::Utc;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::signals::SignalHandler;
use crate::ingest::cycle::CycleAccumulator;
use crate::ingest::extract::{Extraction, FieldExtractor};
use crate::logger::events::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::store::sink::{CommitOutcome, CycleSink};
use crate::store::sqlite::RecordStore;
use crate::transport::{LineRead, LineSource, open_line_source};

/// Consecutive transport read failures tolerated before giving up.
const MAX_READ_ERRORS: u32 = 5;

/// The long-running ingest process.
pub struct IngestDaemon {
    config: Config,
    extractor: FieldExtractor,
    accumulator: CycleAccumulator,
    sink: CycleSink,
    signals: SignalHandler,
    logger: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    started_at: Instant,
    records_persisted: u64,
    cycles_discarded: u64,
}

impl IngestDaemon {
    /// Open the store, spawn the logger thread, and compile the extractor.
    pub fn init(config: Config, signals: SignalHandler) -> Result<Self> {
        let extractor = FieldExtractor::new()?;
        let store = RecordStore::open(&config.storage.db_path)?;
        let sink = CycleSink::new(
            store,
            config.ingest.min_fields,
            config.ingest.persist_retries,
        );
        let (logger, logger_join) = spawn_logger(config.storage.jsonl_log.clone())?;

        logger.send(ActivityEvent::IngestStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            port: config.transport.port.clone(),
            db_path: config.storage.db_path.display().to_string(),
            config_hash: config.stable_hash()?,
        });

        Ok(Self {
            config,
            extractor,
            accumulator: CycleAccumulator::new(),
            sink,
            signals,
            logger,
            logger_join: Some(logger_join),
            started_at: Instant::now(),
            records_persisted: 0,
            cycles_discarded: 0,
        })
    }

    /// Open the configured transport and run until shutdown or stream end.
    pub fn run(&mut self) -> Result<()> {
        let mut source = match open_line_source(&self.config.transport) {
            Ok(source) => source,
            Err(err) => {
                self.logger.send(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                self.finish("transport_open_failed");
                return Err(err);
            }
        };
        self.run_with_source(source.as_mut())
    }

    /// Drive the loop against an already-open source (also the test entry).
    pub fn run_with_source(&mut self, source: &mut dyn LineSource) -> Result<()> {
        let mut read_errors: u32 = 0;

        let outcome = loop {
            if self.signals.should_shutdown() {
                break Ok("signal");
            }

            match source.read_line() {
                Ok(LineRead::Line(line)) => {
                    read_errors = 0;
                    if let Err(err) = self.handle_line(&line) {
                        self.logger.send(ActivityEvent::Error {
                            code: err.code().to_string(),
                            message: err.to_string(),
                        });
                        break Err(err);
                    }
                }
                Ok(LineRead::Timeout) => {
                    // No data inside the window. Cycle state is untouched.
                }
                Ok(LineRead::Eof) => break Ok("end_of_stream"),
                Err(err) => {
                    read_errors += 1;
                    self.logger.send(ActivityEvent::Error {
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                    if read_errors >= MAX_READ_ERRORS {
                        break Err(err);
                    }
                }
            }
        };

        if !self.accumulator.is_empty() {
            // A cycle without its end marker never reaches the store.
            self.cycles_discarded += 1;
            self.logger.send(ActivityEvent::CycleDiscarded {
                fields_received: self.accumulator.len(),
                min_fields: self.config.ingest.min_fields,
            });
        }

        match outcome {
            Ok(reason) => {
                self.finish(reason);
                Ok(())
            }
            Err(err) => {
                self.finish("fatal_error");
                Err(err)
            }
        }
    }

    /// Records persisted since startup.
    pub fn records_persisted(&self) -> u64 {
        self.records_persisted
    }

    /// Cycles dropped for missing the completeness threshold.
    pub fn cycles_discarded(&self) -> u64 {
        self.cycles_discarded
    }

    // ──────────────────── internals ────────────────────

    fn handle_line(&mut self, line: &str) -> Result<()> {
        if self.config.ingest.log_raw_lines {
            self.logger.send(ActivityEvent::RawLine {
                line: line.to_string(),
            });
        }

        match self.extractor.classify(line) {
            Extraction::Fields { tag, updates } => {
                self.logger.send(ActivityEvent::PatternMatched {
                    pattern: tag.label().to_string(),
                    line: line.to_string(),
                });
                self.accumulator.apply(&updates);
                Ok(())
            }
            Extraction::CycleEnd => self.commit_cycle(),
            Extraction::Unrecognized => Ok(()),
        }
    }

    fn commit_cycle(&mut self) -> Result<()> {
        let fields = self.accumulator.snapshot_and_clear();
        match self.sink.commit(&fields, Utc::now())? {
            CommitOutcome::Persisted { row_id } => {
                self.records_persisted += 1;
                self.logger.send(ActivityEvent::CycleCommitted {
                    row_id,
                    fields: fields.len(),
                });
            }
            CommitOutcome::Discarded { fields_received } => {
                self.cycles_discarded += 1;
                self.logger.send(ActivityEvent::CycleDiscarded {
                    fields_received,
                    min_fields: self.config.ingest.min_fields,
                });
            }
        }
        Ok(())
    }

    fn finish(&mut self, reason: &str) {
        self.logger.send(ActivityEvent::IngestStopped {
            reason: reason.to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            records_persisted: self.records_persisted,
        });
        self.logger.shutdown();
        if let Some(join) = self.logger_join.take() {
            if join.join().is_err() {
                eprintln!("[SCR-DAEMON] logger thread panicked during shutdown");
            }
        }
    }
}

/// Build a daemon from config and run it to completion.
pub fn run_daemon(config: Config) -> Result<()> {
    let signals = SignalHandler::new();
    let mut daemon = IngestDaemon::init(config, signals)?;
    daemon.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn test_config(dir: &tempfile::TempDir, capture: &std::path::Path) -> Config {
        let mut cfg = Config::default();
        cfg.transport.port = capture.display().to_string();
        cfg.storage.db_path = dir.path().join("cycles.db");
        cfg.storage.jsonl_log = dir.path().join("ingest.jsonl");
        cfg
    }

    fn write_capture(path: &std::path::Path, lines: &[&str]) {
        let mut f = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
    }

    const FULL_CYCLE: [&str; 7] = [
        "Humedad: 42% (Valor crudo: 512) Bomba: Encendida",
        "Luz: 80% (Valor crudo: 3210) LED: Apagado",
        "PIR: Detectado Buzzer: Encendido",
        "Flama: No Detectada Bomba: Apagada",
        "Temp: 23.5C Humedad Amb: 41.0% Cooler: Apagado",
        "Modo: Manual",
        "---FIN_CICLO---",
    ];

    #[test]
    fn full_cycle_is_persisted_from_file_replay() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        write_capture(&capture, &FULL_CYCLE);

        let cfg = test_config(&dir, &capture);
        let db_path = cfg.storage.db_path.clone();
        let mut daemon = IngestDaemon::init(cfg, SignalHandler::detached()).unwrap();
        daemon.run().unwrap();

        assert_eq!(daemon.records_persisted(), 1);
        assert_eq!(daemon.cycles_discarded(), 0);

        let store = RecordStore::open(&db_path).unwrap();
        let rows = store.recent(1).unwrap();
        assert_eq!(rows[0].soil_moisture_pct, Some(42));
        assert_eq!(rows[0].pump_state, Some(0), "Encendida is active-low 0");
        assert_eq!(rows[0].led_state, Some(0));
        assert_eq!(rows[0].motion, Some(1));
        assert_eq!(rows[0].flame, Some(1), "No Detectada maps to 1");
        assert_eq!(rows[0].temperature_c, Some(23.5));
        assert_eq!(rows[0].mode, Some(1));
    }

    #[test]
    fn incomplete_cycle_is_discarded_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        write_capture(
            &capture,
            &["Modo: Manual", "PIR: Detectado Buzzer: Encendido", "---FIN_CICLO---"],
        );

        let cfg = test_config(&dir, &capture);
        let db_path = cfg.storage.db_path.clone();
        let mut daemon = IngestDaemon::init(cfg, SignalHandler::detached()).unwrap();
        daemon.run().unwrap();

        assert_eq!(daemon.records_persisted(), 0);
        assert_eq!(daemon.cycles_discarded(), 1);
        let store = RecordStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn pending_fields_at_eof_never_reach_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        // Full set of fields but the marker never arrives.
        write_capture(&capture, &FULL_CYCLE[..6].to_vec());

        let cfg = test_config(&dir, &capture);
        let db_path = cfg.storage.db_path.clone();
        let mut daemon = IngestDaemon::init(cfg, SignalHandler::detached()).unwrap();
        daemon.run().unwrap();

        assert_eq!(daemon.records_persisted(), 0);
        let store = RecordStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn two_cycles_produce_two_independent_records() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        let mut lines: Vec<&str> = FULL_CYCLE.to_vec();
        let second = [
            "Humedad: 10% (Valor crudo: 100) Bomba: Apagada",
            "Luz: 5% (Valor crudo: 200) LED: Encendido",
            "PIR: No Detectado Buzzer: Apagado",
            "Flama: Detectada Bomba: Encendida",
            "Temp: -2.0C Humedad Amb: 90.5% Cooler: Encendido",
            "Modo: Automático",
            "---FIN_CICLO---",
        ];
        lines.extend_from_slice(&second);
        write_capture(&capture, &lines);

        let cfg = test_config(&dir, &capture);
        let db_path = cfg.storage.db_path.clone();
        let mut daemon = IngestDaemon::init(cfg, SignalHandler::detached()).unwrap();
        daemon.run().unwrap();

        assert_eq!(daemon.records_persisted(), 2);
        let store = RecordStore::open(&db_path).unwrap();
        let rows = store.recent(2).unwrap();
        // Newest first.
        assert_eq!(rows[0].soil_moisture_pct, Some(10));
        assert_eq!(rows[0].flame, Some(0), "Detectada maps to 0");
        assert_eq!(rows[0].temperature_c, Some(-2.0));
        assert_eq!(rows[0].mode, Some(0));
        assert_eq!(rows[1].soil_moisture_pct, Some(42));
    }

    #[test]
    fn unrecognized_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        let mut lines: Vec<&str> = vec!["boot: esp32 ready", "??? garbage ???"];
        lines.extend_from_slice(&FULL_CYCLE);
        write_capture(&capture, &lines);

        let cfg = test_config(&dir, &capture);
        let mut daemon = IngestDaemon::init(cfg, SignalHandler::detached()).unwrap();
        daemon.run().unwrap();
        assert_eq!(daemon.records_persisted(), 1);
    }

    #[test]
    fn jsonl_log_records_the_commit() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        write_capture(&capture, &FULL_CYCLE);

        let cfg = test_config(&dir, &capture);
        let jsonl = cfg.storage.jsonl_log.clone();
        let mut daemon = IngestDaemon::init(cfg, SignalHandler::detached()).unwrap();
        daemon.run().unwrap();

        let contents = fs::read_to_string(&jsonl).unwrap();
        assert!(contents.contains("\"event\":\"ingest_start\""));
        assert!(contents.contains("\"event\":\"cycle_commit\""));
        assert!(contents.contains("\"event\":\"ingest_stop\""));
        assert!(contents.contains("reason=end_of_stream"));
    }

    #[test]
    fn persistent_read_faults_terminate_after_the_bound() {
        use crate::core::errors::ScrError;

        struct FailingSource {
            calls: u32,
        }

        impl LineSource for FailingSource {
            fn read_line(&mut self) -> crate::core::errors::Result<LineRead> {
                self.calls += 1;
                Err(ScrError::TransportRead {
                    port: "/dev/ttyUSB0".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"),
                })
            }

            fn describe(&self) -> String {
                "/dev/ttyUSB0".to_string()
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("unused.log");
        write_capture(&capture, &[]);

        let cfg = test_config(&dir, &capture);
        let mut daemon = IngestDaemon::init(cfg, SignalHandler::detached()).unwrap();
        let mut source = FailingSource { calls: 0 };

        let err = daemon
            .run_with_source(&mut source)
            .expect_err("persistent read faults must end the run");
        assert_eq!(err.code(), "SCR-2002");
        assert_eq!(source.calls, MAX_READ_ERRORS);
    }

    #[test]
    fn shutdown_flag_stops_the_loop_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        write_capture(&capture, &FULL_CYCLE);

        let cfg = test_config(&dir, &capture);
        let signals = SignalHandler::detached();
        signals.request_shutdown();
        let mut daemon = IngestDaemon::init(cfg, signals).unwrap();
        daemon.run().unwrap();
        assert_eq!(daemon.records_persisted(), 0);
    }
}
