//! Logging bootstrap for binaries and integration tests that embed this crate.
//!
//! The storage core itself only emits `log` facade calls (`debug!`, `trace!`,
//! `warn!`, `error!`); it never initializes a backend on its own, since a
//! library must not install global state behind its caller's back. Callers
//! that want output wire up a backend through the helpers here: a
//! programmatic `log4rs::Config` builder, so there is no required config
//! file on disk at library-use time.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use once_cell::sync::OnceCell;

static INIT: OnceCell<()> = OnceCell::new();

/// Initialize a simple stderr logger at the given level. Safe to call more
/// than once; subsequent calls are no-ops if a logger is already installed.
pub fn init_stderr(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let mut result = Ok(());
    INIT.get_or_init(|| {
        let encoder = Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}"));
        let appender = ConsoleAppender::builder().encoder(encoder).build();
        result = Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(appender)))
            .build(Root::builder().appender("stderr").build(level))
            .map(|config| {
                let _ = log4rs::init_config(config);
            })
            .map_err(|e| -> Box<dyn std::error::Error> { Box::new(e) });
    });
    result
}

/// Initialize logging from a caller-supplied `log4rs` config file path.
pub fn init_from_file(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}
