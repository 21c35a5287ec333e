use bearer_auth::cli::{Args, build_config, init_logging, load_jwt_secret, run_command};
use clap::Parser;
use tracing::{debug, error};

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let config = build_config(&args, jwt_secret).unwrap_or_else(|e| {
        error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    debug!(?config, "Configuration loaded");

    match run_command(&args.command, &config) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!(error = %e, "Command failed");
            std::process::exit(1);
        }
    }
}
