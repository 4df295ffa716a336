/// `tracing_subscriber` init plus a panic hook that logs before the default
/// panic behavior runs. `LOG_FORMAT=json` switches to structured output for
/// container log collectors; anything else (including unset) is human text.
pub fn init() {
    let json_logging = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
    }

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("PANIC: {info}");
    }));
}
