use slog::{Logger, o, Drain};
use slog_async::Async;
use slog_term::{FullFormat, TermDecorator};

pub fn create_logger(session_id: &str) -> Logger {
    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator)
        .use_utc_timestamp()
        .use_original_order()
        .build()
        .fuse();
    let async_drain = Async::new(drain).build().fuse();
    Logger::root(async_drain, o!("component" => "PvcCore", "session" => session_id.to_string()))
}

/// Swallows everything. Used by tests and by callers that bring no terminal.
pub fn discard_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
