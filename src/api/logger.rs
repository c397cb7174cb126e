use flutter_rust_bridge::frb;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use lazy_static::lazy_static;

/// Callback receiving every formatted log line (host console, file, etc.).
pub type LogSink = Box<dyn Fn(String) + Send + Sync>;

lazy_static! {
    static ref HOST_LOG_SINK: RwLock<Option<LogSink>> = RwLock::new(None);
}

/// Track whether the logger has been initialized to avoid double initialization errors.
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

use log::{Level, Metadata, Record};

struct CombinedLogger;

impl log::Log for CombinedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        #[cfg(debug_assertions)]
        {
            metadata.level() <= Level::Debug
        }
        #[cfg(not(debug_assertions))]
        {
            metadata.level() <= Level::Info
        }
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let msg = format_record(record.level(), record.target(), &record.args().to_string());

            // Only use println if no host sink is connected (avoid duplication)
            if !try_send_to_sink(&msg) {
                println!("{}", msg);
            }
        }
    }

    fn flush(&self) {}
}

static LOGGER: CombinedLogger = CombinedLogger;

fn format_record(level: Level, target: &str, message: &str) -> String {
    format!("[{}][{}] {}", level, target, message)
}

/// Map a logger install result, clearing `initialized` on failure so a later
/// call may retry.
fn finish_init(result: Result<(), log::SetLoggerError>, initialized: &AtomicBool) -> anyhow::Result<()> {
    result.map_err(|e| {
        initialized.store(false, Ordering::SeqCst);
        anyhow::anyhow!("Logger init failed: {}", e)
    })
}

/// Initialize the global logger.
///
/// This function is idempotent - calling it multiple times is safe and will
/// simply return Ok(()) if the logger is already initialized.
///
/// Log levels:
/// - Debug builds: DEBUG and above
/// - Release builds: INFO and above
pub fn init_logger() -> anyhow::Result<()> {
    if LOGGER_INITIALIZED.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
        return Ok(());
    }

    #[cfg(debug_assertions)]
    let level = log::LevelFilter::Debug;
    #[cfg(not(debug_assertions))]
    let level = log::LevelFilter::Info;

    #[cfg(target_os = "android")]
    {
        android_logger::init_once(android_logger::Config::default().with_max_level(level));
        return Ok(());
    }

    #[cfg(target_os = "ios")]
    {
        return finish_init(
            oslog::OsLogger::new("com.example.note_rag_engine").level_filter(level).init(),
            &LOGGER_INITIALIZED,
        );
    }

    #[cfg(not(any(target_os = "android", target_os = "ios")))]
    finish_init(log::set_logger(&LOGGER).map(|()| log::set_max_level(level)), &LOGGER_INITIALIZED)
}

/// Route formatted log lines to a host-provided sink instead of stdout.
pub fn set_log_sink(sink: LogSink) -> anyhow::Result<()> {
    let mut guard = HOST_LOG_SINK.write().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
    *guard = Some(sink);
    Ok(())
}

/// Disconnect the host sink. Call this when the host tears down its log view.
#[frb(sync)]
pub fn clear_log_sink() -> anyhow::Result<()> {
    let mut guard = HOST_LOG_SINK.write().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
    *guard = None;
    Ok(())
}

/// Returns true if the message was delivered to a host sink.
fn try_send_to_sink(msg: &str) -> bool {
    match HOST_LOG_SINK.read() {
        Ok(guard) => {
            if let Some(sink) = &*guard {
                sink(msg.to_string());
                true
            } else {
                false
            }
        }
        Err(_) => {
            #[cfg(debug_assertions)]
            eprintln!("[WARNING] Host log sink lock is poisoned");
            false
        }
    }
}
