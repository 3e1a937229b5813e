use copilot_lib::Config;

fn main() {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config {
        server_url: std::env::var("SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string()),
        stt_api_key: std::env::var("DEEPGRAM_API_KEY")
            .ok()
            .filter(|k| !k.is_empty()),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    if let Err(e) = runtime.block_on(copilot_lib::run(config)) {
        log::error!("Session ended with error: {}", e);
        std::process::exit(1);
    }
}
