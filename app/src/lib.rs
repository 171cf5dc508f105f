pub mod cli;
pub mod commands;
pub mod error;

pub use pantry_core::{AppState, Config};

/// Initialize tracing/logging with the given directives
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring invalid log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run a CLI command to completion
pub fn run(command: cli::Command) {
    init_logging(&["pantry=info", "pantry_lib=info", "pantry_core=info"]);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(cli::execute(command)) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
