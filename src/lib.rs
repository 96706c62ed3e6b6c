//! Event-log to CBS conversion crate.
//!
//! Implemented scope:
//! - delimited event-log loading (CDNOW-style transaction files)
//! - calibration/holdout CBS aggregation for probabilistic CLV models
//! - shared logging configuration

mod cbs;
mod elog;
mod observability;

pub use cbs::{elog_to_cbs, CbsConfig, CbsError, CbsReport, CbsRow};
pub use elog::{load_event_log, ElogCsvConfig, ElogLoadError, Event};
pub use observability::{
    init_logging, logging_config_from_env, LogFormat, LoggingConfig, LoggingInitError,
};
