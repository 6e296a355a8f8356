use std::process::ExitCode;

use tessera_client::ClientError;
use tessera_errors::{Categorized, CodedError, ErrorCategory};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let coded = coded(&err);
            eprintln!("Error: {coded}");
            if coded.category.is_caller_recoverable() {
                eprintln!("Hint: nothing was changed; correct the input or signer and retry");
            }
            ExitCode::from(u8::try_from(coded.code()).unwrap_or(1))
        }
    }
}

async fn run() -> anyhow::Result<()> {
    tessera_client::cli::run().await?;
    Ok(())
}

/// Classify a failed command; anything outside the client error tree is internal
fn coded(err: &anyhow::Error) -> CodedError {
    match err.downcast_ref::<ClientError>() {
        Some(client) => CodedError::from_categorized(client),
        None => CodedError::new(ErrorCategory::Internal, format!("{err:#}")),
    }
}
